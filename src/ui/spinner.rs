use crossterm::{
    cursor::MoveToColumn,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct SpinnerState {
    active: bool,
    message: String,
}

/// Progress indicator drawn on stderr while waiting for the first bytes of
/// a response. Drawing and clearing share one lock, so once [`Spinner::stop`]
/// returns no further frame can appear.
#[derive(Debug)]
pub struct Spinner {
    state: Arc<Mutex<SpinnerState>>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    /// Start drawing. Must be called inside a tokio runtime. Nothing is
    /// drawn when stderr is not a terminal.
    pub fn start(message: &str) -> Self {
        Self::start_on(message, io::stderr().is_terminal())
    }

    fn start_on(message: &str, enabled: bool) -> Self {
        let state = Arc::new(Mutex::new(SpinnerState {
            active: enabled,
            message: message.to_string(),
        }));
        if !enabled {
            return Self {
                state,
                handle: None,
            };
        }

        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(FRAME_INTERVAL);
            let mut frame = 0usize;
            loop {
                interval.tick().await;
                let Ok(state) = task_state.lock() else {
                    return;
                };
                if !state.active {
                    return;
                }
                let line = format!(
                    "{} {} ({:.1}s)",
                    FRAMES[frame],
                    state.message,
                    started.elapsed().as_secs_f32()
                );
                let mut stderr = io::stderr();
                let _ = queue!(
                    stderr,
                    MoveToColumn(0),
                    Clear(ClearType::CurrentLine),
                    Print(line)
                );
                let _ = stderr.flush();
                frame = (frame + 1) % FRAMES.len();
            }
        });

        Self {
            state,
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().map(|state| state.active).unwrap_or(false)
    }

    pub fn set_message(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.message = message.to_string();
        }
    }

    /// Stop and erase the spinner line. Safe to call more than once.
    pub fn stop(&mut self) {
        let was_drawing = self.handle.take().is_some();
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.active {
            return;
        }
        state.active = false;
        if was_drawing {
            let mut stderr = io::stderr();
            let _ = queue!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine));
            let _ = stderr.flush();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}
