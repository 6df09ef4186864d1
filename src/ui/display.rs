//! Everything the CLI prints about a response or a failure.

use crate::api::models::AVAILABLE_MODELS;
use crate::api::Usage;
use crate::core::error::ClientError;
use crate::core::keys::KeyRotation;
use crate::core::retry::RetryInfo;
use crate::ui::markdown::render_markdown;
use crossterm::style::{Color, ContentStyle, Stylize};
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Write};

/// Color is on unless disabled by flag, `NO_COLOR`, or a non-terminal stdout.
pub fn color_enabled(no_color_flag: bool) -> bool {
    !no_color_flag && std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal()
}

fn paint(text: &str, style: ContentStyle, color: bool) -> String {
    if color {
        style.apply(text).to_string()
    } else {
        text.to_string()
    }
}

fn header_style() -> ContentStyle {
    ContentStyle::new().with(Color::Yellow).bold()
}

/// `⚠️  API key 1/3 failed, switching to key 2/3`
pub fn key_rotation_notice(rotation: KeyRotation) -> String {
    format!(
        "⚠️  API key {}/{} failed, switching to key {}/{}",
        rotation.from, rotation.total, rotation.to, rotation.total
    )
}

/// `Network error, retrying (1/3) in 0.5s...`
pub fn retry_notice(info: &RetryInfo) -> String {
    format!(
        "Network error, retrying ({}/{}) in {:.1}s...",
        info.attempt,
        info.max_retries,
        info.next_backoff.as_secs_f64()
    )
}

/// Print a notice on stderr; used from client callbacks.
pub fn eprint_notice(text: &str, color: bool) {
    let style = ContentStyle::new().with(Color::Yellow);
    eprintln!("{}", paint(text, style, color));
}

fn chain_mentions(err: &(dyn StdError + 'static), needles: &[&str]) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if needles.iter().any(|needle| text.contains(needle)) {
            return true;
        }
        current = err.source();
    }
    false
}

/// A short message and an optional hint for a failed request.
pub fn friendly_error(err: &ClientError) -> (String, Option<&'static str>) {
    match err {
        ClientError::Cancelled => ("Request cancelled".to_string(), None),
        ClientError::MissingApiKey => (
            "No API key configured".to_string(),
            Some("Set PERPLEXITY_API_KEY or PERPLEXITY_API_KEYS, or pass --api-key"),
        ),
        ClientError::KeysExhausted(_) => (
            err.to_string(),
            Some("Every configured API key was rejected. Check your keys and credits"),
        ),
        ClientError::Api(api) => {
            let hint = match api.status {
                401 | 403 => Some("Check that your API key is valid"),
                402 => Some("Your account may be out of credits"),
                429 => Some("Rate limited. Wait a moment or lower --rate-limit"),
                500..=599 => Some("The service is having trouble. Try again shortly"),
                _ => None,
            };
            (api.to_string(), hint)
        }
        ClientError::Transport(source) if source.is_timeout() => (
            "Request timed out".to_string(),
            Some("Try again, or raise the limit with --timeout"),
        ),
        ClientError::Transport(_)
            if chain_mentions(err, &["dns error", "no such host", "failed to lookup"]) =>
        {
            (
                "Could not resolve the API host".to_string(),
                Some("Check your internet connection"),
            )
        }
        ClientError::Transport(source) if source.is_connect() => (
            "Could not connect to the API".to_string(),
            Some("Check your internet connection or proxy settings"),
        ),
        ClientError::Stream(_) => (
            err.to_string(),
            Some("The connection dropped mid-response. Use /retry to ask again"),
        ),
        _ => (err.to_string(), None),
    }
}

/// Buffered terminal writer with optional ANSI styling.
pub struct Display {
    out: Box<dyn Write + Send>,
    color: bool,
}

impl Display {
    pub fn new(out: Box<dyn Write + Send>, color: bool) -> Self {
        Self { out, color }
    }

    pub fn stdout(color: bool) -> Self {
        Self::new(Box::new(io::stdout()), color)
    }

    pub fn color(&self) -> bool {
        self.color
    }

    fn emit(&mut self, text: &str) {
        // A closed stdout (e.g. `| head`) is not worth failing a request for.
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.emit(text.as_ref());
    }

    pub fn blank(&mut self) {
        self.emit("");
    }

    /// Write streamed text without a newline.
    pub fn chunk(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    pub fn success(&mut self, text: impl AsRef<str>) {
        let text = paint(
            text.as_ref(),
            ContentStyle::new().with(Color::Green),
            self.color,
        );
        self.emit(&text);
    }

    pub fn warning(&mut self, text: impl AsRef<str>) {
        let text = paint(
            text.as_ref(),
            ContentStyle::new().with(Color::Yellow),
            self.color,
        );
        self.emit(&text);
    }

    pub fn dim(&mut self, text: impl AsRef<str>) {
        let text = paint(
            text.as_ref(),
            ContentStyle::new().with(Color::DarkGrey),
            self.color,
        );
        self.emit(&text);
    }

    /// `Error: <message>` followed by an optional hint line.
    pub fn error(&mut self, message: &str, hint: Option<&str>) {
        let text = paint(
            &format!("Error: {message}"),
            ContentStyle::new().with(Color::Red),
            self.color,
        );
        self.emit(&text);
        if let Some(hint) = hint {
            let hint = paint(
                &format!("💡 {hint}"),
                ContentStyle::new().with(Color::DarkGrey),
                self.color,
            );
            self.emit(&hint);
        }
    }

    pub fn client_error(&mut self, err: &ClientError) {
        let (message, hint) = friendly_error(err);
        self.error(&message, hint);
    }

    pub fn content(&mut self, content: &str, render: bool) {
        let content = content.trim();
        if render {
            let rendered = render_markdown(content, self.color);
            self.emit(&rendered);
        } else {
            self.emit(content);
        }
    }

    pub fn citations(&mut self, citations: &[String]) {
        if citations.is_empty() {
            return;
        }
        self.blank();
        let header = paint("## Citations", header_style(), self.color);
        self.emit(&header);
        for (index, citation) in citations.iter().enumerate() {
            self.emit(&format!("{}. {}", index + 1, citation));
        }
    }

    pub fn usage(&mut self, usage: &Usage) {
        self.blank();
        let header = paint("## Tokens", header_style(), self.color);
        self.emit(&header);
        self.emit("| Type | Count |");
        self.emit("|------|-------|");
        self.emit(&format!("| Prompt | {} |", usage.prompt_tokens));
        self.emit(&format!("| Completion | {} |", usage.completion_tokens));
        self.emit(&format!("| **Total** | **{}** |", usage.total_tokens));
    }

    pub fn models(&mut self, current: &str) {
        let header = paint("Available models:", header_style(), self.color);
        self.emit(&header);
        for model in AVAILABLE_MODELS {
            if *model == current {
                let line = paint(
                    &format!("  * {model} (current)"),
                    ContentStyle::new().with(Color::Green),
                    self.color,
                );
                self.emit(&line);
            } else {
                self.emit(&format!("    {model}"));
            }
        }
    }
}
