//! Interactive chat loop.

use crate::commands::{process_input, CommandResult};
use crate::core::session::Session;
use crate::core::validation::{sanitize_prompt, validate_prompt};
use crossterm::style::{Color, ContentStyle, Stylize};
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "... ";

/// Joins lines ending in `\` into one input.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<String>,
}

impl LineBuffer {
    /// Add a line. Returns the full input once a line without a trailing
    /// backslash arrives.
    pub fn push(&mut self, line: &str) -> Option<String> {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(partial) = line.strip_suffix('\\') {
            self.pending.push(partial.to_string());
            return None;
        }
        if self.pending.is_empty() {
            return Some(line.to_string());
        }
        self.pending.push(line.to_string());
        Some(std::mem::take(&mut self.pending).join("\n"))
    }

    pub fn is_continuing(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// Run one complete input: a command, or a message to send.
pub async fn handle_input(
    session: &mut Session,
    input: &str,
    cancel: &CancellationToken,
) -> LoopControl {
    let input = input.trim();
    if input.is_empty() {
        return LoopControl::Continue;
    }

    match process_input(session, input) {
        CommandResult::Continue => LoopControl::Continue,
        CommandResult::Exit => LoopControl::Exit,
        CommandResult::Retry => {
            session.retry(cancel).await;
            LoopControl::Continue
        }
        CommandResult::SendMessage(message) => {
            let message = sanitize_prompt(&message);
            match validate_prompt(&message) {
                Ok(cleaned) => {
                    session.send_message(cleaned, cancel).await;
                }
                Err(err) => session.display.error(&err.to_string(), None),
            }
            LoopControl::Continue
        }
    }
}

pub fn banner(model: &str, color: bool) -> String {
    let paint = |text: &str, style: ContentStyle| {
        if color {
            style.apply(text).to_string()
        } else {
            text.to_string()
        }
    };
    let title = paint(
        "Perplexity CLI",
        ContentStyle::new().with(Color::Cyan).bold(),
    );
    let dim = ContentStyle::new().with(Color::DarkGrey);
    [
        String::new(),
        format!("  {title}"),
        paint(
            "  Type /help for commands, use Ctrl+D to quit the session",
            dim,
        ),
        paint("  End a line with \\ for multiline input", dim),
        String::new(),
        format!("{}{model}", paint("Model: ", dim)),
        String::new(),
    ]
    .join("\n")
}

/// Read stdin on a plain thread so the async loop can race it against
/// Ctrl+C.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Cancel `cancel` on Ctrl+C until `done` fires.
fn watch_interrupt(cancel: CancellationToken, done: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = done.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    eprintln!("\nOperation cancelled");
                    cancel.cancel();
                }
            }
        }
    });
}

fn show_prompt(continuing: bool) {
    let mut stdout = io::stdout();
    let _ = write!(
        stdout,
        "{}",
        if continuing { CONTINUATION_PROMPT } else { PROMPT }
    );
    let _ = stdout.flush();
}

/// Run the session until `/exit`, end of input or Ctrl+C at the prompt.
pub async fn run(mut session: Session) {
    let banner = banner(session.model(), session.display.color());
    session.display.line(banner);

    let mut lines = spawn_line_reader();
    let mut buffer = LineBuffer::default();

    loop {
        show_prompt(buffer.is_continuing());
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                session.display.line("\nGoodbye!");
                session.save_history();
                return;
            }
        };

        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                debug!(error = %err, "stdin read failed");
                session.display.line("Goodbye!");
                session.save_history();
                return;
            }
            None => {
                session.display.line("\nGoodbye!");
                session.save_history();
                return;
            }
        };

        let Some(input) = buffer.push(&line) else {
            continue;
        };

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        watch_interrupt(cancel.clone(), done.clone());
        let control = handle_input(&mut session, &input, &cancel).await;
        done.cancel();

        if control == LoopControl::Exit {
            return;
        }
    }
}
