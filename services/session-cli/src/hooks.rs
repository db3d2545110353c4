//! Console rendition of the session hooks
//!
//! Messages go to stderr so stdout carries only command output. "Going to
//! the entry point" means telling the user to log in again.

use std::sync::atomic::{AtomicBool, Ordering};

use session_pipeline::{MessageLevel, SessionHooks};
use tracing::debug;

#[derive(Default)]
pub struct ConsoleHooks {
    at_entry: AtomicBool,
}

impl ConsoleHooks {
    pub fn new() -> Self {
        Self::default()
    }
}

fn prefix(level: MessageLevel) -> &'static str {
    match level {
        MessageLevel::Success => "ok",
        MessageLevel::Warning => "warning",
        MessageLevel::Error => "error",
    }
}

impl SessionHooks for ConsoleHooks {
    fn loading_started(&self, reason: &str) {
        debug!(reason, "loading started");
    }

    fn loading_finished(&self, reason: &str) {
        debug!(reason, "loading finished");
    }

    fn show_message(&self, level: MessageLevel, message: &str) {
        eprintln!("{}: {message}", prefix(level));
    }

    fn at_entry_point(&self) -> bool {
        self.at_entry.load(Ordering::SeqCst)
    }

    fn go_to_entry_point(&self) {
        if !self.at_entry.swap(true, Ordering::SeqCst) {
            eprintln!("run `sessionctl login <username>` to start a new session");
        }
    }
}
