//! Execution event hooks.

use tokio::sync::mpsc;

use execd_core::SessionId;

use crate::engine::CommandOutcome;

/// Callbacks invoked while a command runs.
///
/// Output callbacks are called once per record, in file order per stream.
/// Calls may come from different tasks, so implementations must be `Sync`.
pub trait ExecutionHooks: Send + Sync {
    /// Session registered and about to spawn.
    fn on_init(&self, _session_id: &SessionId) {}

    /// One stdout record (background runs: one combined-output record).
    fn on_stdout(&self, _line: &str) {}

    /// One stderr record.
    fn on_stderr(&self, _line: &str) {}

    /// Execution failed without an exit code.
    fn on_error(&self, _message: &str) {}

    /// Process exited and output was drained.
    fn on_complete(&self, _outcome: &CommandOutcome) {}
}

/// A hook call captured as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Session started
    Init(SessionId),
    /// Stdout record
    Stdout(String),
    /// Stderr record
    Stderr(String),
    /// Execution error
    Error(String),
    /// Terminal event
    Complete(CommandOutcome),
}

/// Forwards every hook call into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHooks {
    tx: mpsc::UnboundedSender<CommandEvent>,
}

impl ChannelHooks {
    /// Create hooks and the receiving end of their events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CommandEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: CommandEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl ExecutionHooks for ChannelHooks {
    fn on_init(&self, session_id: &SessionId) {
        self.send(CommandEvent::Init(session_id.clone()));
    }

    fn on_stdout(&self, line: &str) {
        self.send(CommandEvent::Stdout(line.to_string()));
    }

    fn on_stderr(&self, line: &str) {
        self.send(CommandEvent::Stderr(line.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.send(CommandEvent::Error(message.to_string()));
    }

    fn on_complete(&self, outcome: &CommandOutcome) {
        self.send(CommandEvent::Complete(outcome.clone()));
    }
}
