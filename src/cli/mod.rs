//! Command-line interface parsing and handling
//!
//! This module parses arguments and dispatches to the single-shot query, the
//! interactive session or the `config` subcommand.

pub mod query;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::models::DEFAULT_MODEL;
use crate::cli::query::{cancel_on_interrupt, read_piped_query, run_query, QueryOptions};
use crate::core::client::ApiClient;
use crate::core::config::data::path_display;
use crate::core::config::{Config, ConfigError, ConfigKey, Overrides, Settings};
use crate::core::history::History;
use crate::core::session::Session;
use crate::core::validation::{sanitize_prompt, validate_prompt};
use crate::logging;
use crate::ui::display::{
    color_enabled, eprint_notice, key_rotation_notice, retry_notice, Display,
};
use crate::ui::repl;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "perplexity", version = VERSION)]
#[command(about = "A CLI client for the Perplexity API")]
#[command(
    long_about = "Perplexity CLI is a simple and convenient command-line client \
for the Perplexity API, allowing users to quickly ask questions \
and receive answers directly from the terminal.\n\n\
Output is in markdown format for easy copying.\n\n\
Environment Variables:\n\
  PERPLEXITY_API_KEYS      Comma-separated API keys, rotated on failure\n\
  PERPLEXITY_API_KEY       Single API key (used when the list is unset)\n\
  PERPLEXITY_TIMEOUT       Request timeout in seconds\n\
  PERPLEXITY_RATE_LIMIT    Requests per minute (0 disables pacing)\n\
  PERPLEXITY_API_URL       Custom API endpoint\n\
  PERPLEXITY_HISTORY_PATH  Location of the saved conversations\n\
  NO_COLOR                 Disable colored output",
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Show token usage statistics
    #[arg(short, long)]
    pub usage: bool,

    /// Show citations
    #[arg(short, long)]
    pub citations: bool,

    /// Stream output in real-time
    #[arg(short, long)]
    pub stream: bool,

    /// Render markdown with colors and formatting
    #[arg(short, long)]
    pub render: bool,

    /// Interactive chat mode
    #[arg(short, long)]
    pub interactive: bool,

    /// API key (defaults to PERPLEXITY_API_KEYS or PERPLEXITY_API_KEY env var)
    #[arg(short, long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model to use (see --list-models)
    #[arg(short, long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Save response to file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// List available models
    #[arg(long)]
    pub list_models: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Maximum requests per minute (0 disables pacing)
    #[arg(long, value_name = "RPM")]
    pub rate_limit: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Question to ask; read from stdin when piped
    pub query: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or change the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print every setting
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set (can be multiple words for system-prompt)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
    /// Print the configuration file location
    Path,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout_secs: self.timeout,
            rate_limit: self.rate_limit,
            stream: self.stream,
            render: self.render,
            citations: self.citations,
            usage: self.usage,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Some(Commands::Config { action }) = &args.command {
        if let Err(err) = run_config(action) {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let color = color_enabled(args.no_color);

    if args.list_models {
        let current = args
            .model
            .clone()
            .or_else(|| Config::load().ok().and_then(|config| config.model))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Display::stdout(color).models(&current);
        return Ok(());
    }

    let config = Config::load().unwrap_or_else(|err| exit_with(&err));
    let overrides = args.overrides();
    let settings = Settings::from_env(&config, &overrides).unwrap_or_else(|err| exit_with(&err));
    for warning in &settings.warnings {
        eprint_notice(&format!("⚠️  Warning: {warning}"), color);
    }

    let mut client = ApiClient::new(settings.client_config(), Arc::clone(&settings.keys))
        .unwrap_or_else(|err| exit_with(&err));
    client.on_key_rotation(move |rotation| eprint_notice(&key_rotation_notice(rotation), color));
    client.on_retry(move |info| eprint_notice(&retry_notice(info), color));

    if args.interactive {
        let session = build_session(client, &settings, color);
        repl::run(session).await;
        return Ok(());
    }

    let query = match args.query.clone() {
        Some(query) => query,
        None => read_piped_query()
            .await
            .unwrap_or_else(|err| {
                Display::stdout(color).error(&format!("Failed to read from stdin: {err}"), None);
                std::process::exit(1);
            })
            .unwrap_or_default(),
    };
    if query.trim().is_empty() {
        Args::command().print_help()?;
        std::process::exit(1);
    }

    let query = sanitize_prompt(&query);
    let query = match validate_prompt(&query) {
        Ok(cleaned) => cleaned.to_string(),
        Err(err) => {
            Display::stdout(color).error(&err.to_string(), None);
            std::process::exit(1);
        }
    };
    debug!(chars = query.chars().count(), model = %settings.model, "query ready");

    let options = QueryOptions {
        stream: settings.stream,
        render: settings.render,
        citations: settings.citations,
        usage: settings.usage,
        output: args.output.clone(),
        spinner: true,
    };
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut display = Display::stdout(color);
    match run_query(&client, &query, &options, &mut display, &cancel).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => {
            display.client_error(&err);
            std::process::exit(1);
        }
    }
}

fn build_session(client: ApiClient, settings: &Settings, color: bool) -> Session {
    let mut session = Session::new(client, Display::stdout(color), &settings.system_prompt);
    session.stream = settings.stream;
    session.render = settings.render;
    session.citations = settings.citations;
    session.usage = settings.usage;

    if let Some(path) = &settings.history_path {
        let history = History::load(path).unwrap_or_else(|err| {
            warn!(error = %err, "starting with empty history");
            eprint_notice(&format!("Warning: Could not load history: {err}"), color);
            History::new(path)
        });
        session = session.with_history(history);
    }
    session
}

fn exit_with(err: &dyn Error) -> ! {
    eprintln!("❌ {err}");
    std::process::exit(1);
}

fn run_config(action: &ConfigAction) -> Result<(), ConfigError> {
    match action {
        ConfigAction::Show => {
            Config::load()?.print_all();
        }
        ConfigAction::Set { key, value } => {
            let key: ConfigKey = key.parse()?;
            let value = value.join(" ");
            let mut config = Config::load()?;
            config.set_value(key, &value)?;
            config.save()?;
            println!("✅ Set {key} to: {}", config.display_value(key));
        }
        ConfigAction::Unset { key } => {
            let key: ConfigKey = key.parse()?;
            let mut config = Config::load()?;
            config.unset_value(key);
            config.save()?;
            println!("✅ Unset {key}");
        }
        ConfigAction::Path => match Config::config_path() {
            Some(path) => println!("{}", path_display(path)),
            None => return Err(ConfigError::NoConfigDir),
        },
    }
    Ok(())
}
