//! Diagnostic logging to stderr.

use tracing_subscriber::EnvFilter;

/// Filter used for `--verbose`.
const VERBOSE_FILTER: &str = "perplexity_cli=debug,perplexity=debug";

/// Build the filter: `--verbose` turns on debug output for this crate;
/// otherwise `RUST_LOG` applies, and logging stays off when it is unset.
pub fn filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_FILTER);
    }
    match rust_log.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("off"))
        }
        None => EnvFilter::new("off"),
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
