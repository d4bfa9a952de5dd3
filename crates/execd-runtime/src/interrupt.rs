//! Interrupting running commands.

use std::io;

use tracing::{debug, info, warn};

use execd_core::{Error, Result, SessionId};

use crate::engine::ExecutionEngine;
use crate::kernel::StopSignal;
use crate::registry::SessionRegistryExt;

#[cfg(unix)]
fn is_already_gone(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn is_already_gone(_err: &io::Error) -> bool {
    false
}

impl ExecutionEngine {
    /// Ask a running command to stop.
    ///
    /// Sends SIGTERM to the command's process group. When an interrupt
    /// grace period is configured and the command is still running after
    /// it, SIGKILL follows. Interrupting a finished command is a no-op.
    pub fn interrupt(&self, session_id: &SessionId) -> Result<()> {
        let delivered = match self
            .registry()
            .modify(session_id, |kernel| kernel.signal(StopSignal::Terminate))?
        {
            Ok(delivered) => delivered,
            Err(e) if is_already_gone(&e) => {
                debug!("Process already exited: session={}", session_id);
                false
            }
            Err(e) => {
                return Err(Error::Runtime(format!(
                    "failed to interrupt session {session_id}: {e}"
                )))
            }
        };

        if !delivered {
            debug!("Interrupt ignored, session not running: {}", session_id);
            return Ok(());
        }
        info!("Interrupted session: {}", session_id);

        if let Some(grace) = self.config().interrupt_grace {
            self.escalate(session_id.clone(), grace);
        }
        Ok(())
    }

    fn escalate(&self, session_id: SessionId, grace: std::time::Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, skipping kill escalation: {}", session_id);
            return;
        };

        let registry = std::sync::Arc::clone(self.registry());
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            match registry.modify(&session_id, |kernel| kernel.signal(StopSignal::Kill)) {
                Ok(Ok(true)) => warn!("Force-killed session after grace period: {}", session_id),
                Ok(Ok(false)) | Err(_) => {}
                Ok(Err(e)) if is_already_gone(&e) => {}
                Ok(Err(e)) => warn!("Failed to kill session {}: {}", session_id, e),
            }
        });
    }
}
