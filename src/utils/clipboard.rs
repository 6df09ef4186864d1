use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

/// A failed copy, with an install hint when a tool is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardError {
    pub message: String,
    pub hint: Option<&'static str>,
}

impl ClipboardError {
    fn new(message: impl Into<String>, hint: Option<&'static str>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hint {
            Some(hint) => write!(f, "{}. {}", self.message, hint),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ClipboardError {}

pub fn copy_to_clipboard(text: &str) -> Result<(), ClipboardError> {
    #[cfg(target_os = "macos")]
    {
        return run_with_stdin("pbcopy", &[], text);
    }
    #[cfg(target_os = "windows")]
    {
        return run_with_stdin("cmd", &["/C", "clip"], text);
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let candidates: [(&str, &[&str]); 3] = [
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ];
        for (cmd, args) in candidates {
            match run_with_stdin(cmd, args, text) {
                Ok(()) => return Ok(()),
                Err(Spawn::Missing) => continue,
                Err(Spawn::Failed(err)) => return Err(err),
            }
        }
        Err(ClipboardError::new(
            "no clipboard tool found",
            Some("Install one of: wl-copy (wl-clipboard), xclip, or xsel"),
        ))
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
enum Spawn {
    Missing,
    Failed(ClipboardError),
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
impl From<ClipboardError> for Spawn {
    fn from(err: ClipboardError) -> Self {
        Spawn::Failed(err)
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
type Spawn = ClipboardError;

fn run_with_stdin(cmd: &str, args: &[&str], input: &str) -> Result<(), Spawn> {
    let mut child = match Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => return Err(missing(cmd)),
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(err) = stdin.write_all(input.as_bytes()) {
            return Err(ClipboardError::new(
                format!("failed to copy to clipboard: {err}"),
                Some("Make sure the clipboard tool is working correctly"),
            )
            .into());
        }
    }
    match child.wait() {
        Ok(status) if status.success() => Ok(()),
        _ => Err(ClipboardError::new(
            format!("clipboard command `{cmd}` failed"),
            Some("Make sure the clipboard tool is working correctly"),
        )
        .into()),
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn missing(_cmd: &str) -> Spawn {
    Spawn::Missing
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn missing(cmd: &str) -> Spawn {
    ClipboardError::new(format!("clipboard command `{cmd}` not available"), None)
}
