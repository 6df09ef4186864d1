//! Terminal presentation for the single-shot and interactive modes.
//!
//! - [`display`]: answers, citations, usage tables, notices and errors.
//! - [`markdown`]: ANSI rendering of markdown answers for `--render`.
//! - [`spinner`]: progress indicator while waiting for the first byte.
//! - [`repl`]: the interactive loop that feeds input to [`crate::commands`].
//!
//! Ownership boundary: this layer only presents; [`crate::core`] owns the
//! conversation and the API client.

pub mod display;
pub mod markdown;
pub mod repl;
pub mod spinner;
