//! A command-line client for the Perplexity chat completions API.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the resilient API client (key rotation, transient-error
//!   retry, request pacing, buffered and streamed completions) together with
//!   configuration, conversation state and saved history.
//! - [`ui`] prints answers and notices and runs the interactive loop.
//! - [`commands`] implements slash-command parsing and execution used by the
//!   interactive loop.
//! - [`api`] defines the chat payloads and the model catalogue.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod logging;
pub mod ui;
pub mod utils;
