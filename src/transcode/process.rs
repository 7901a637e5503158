//! Supervision of a single transcoder process.
//!
//! The child handle is owned by a waiter task that publishes the exit status
//! on a [`watch`] channel. Everything else (stop requests, exit checks, the
//! exit reaction) talks to the process through [`TranscoderProcess`], so no
//! caller ever needs a `&mut Child`.

use std::time::Duration;

use hlsrelay_common::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::invocation::Invocation;

/// How long a graceful quit may take before the process group is killed.
pub const STOP_GRACE: Duration = Duration::from_millis(1500);

/// Final state of a transcoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

/// Handle to a running (or finished) transcoder process.
#[derive(Debug)]
pub struct TranscoderProcess {
    pid: Option<u32>,
    stdin: Mutex<Option<ChildStdin>>,
    exit: watch::Receiver<Option<ProcessExit>>,
    kill: CancellationToken,
}

impl TranscoderProcess {
    /// Spawn `invocation` and start its waiter task.
    ///
    /// Returns the handle together with the process's stderr for the
    /// diagnostics pump.
    pub fn spawn(invocation: &Invocation) -> Result<(Self, Option<ChildStderr>)> {
        let mut child = invocation
            .command()
            .spawn()
            .map_err(|e| Error::spawn(format!("{}: {e}", invocation.program_name())))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let (tx, exit) = watch::channel(None);
        let kill = CancellationToken::new();

        tokio::spawn(wait_for_exit(child, pid, kill.clone(), tx));

        tracing::debug!(pid = ?pid, program = %invocation.program_name(), "Transcoder spawned");

        Ok((
            Self {
                pid,
                stdin: Mutex::new(stdin),
                exit,
                kill,
            },
            stderr,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Exit code once the process has finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit.borrow().and_then(|exit| exit.code)
    }

    /// Wait until the process has exited.
    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.exit.clone();
        let exit = match rx.wait_for(Option::is_some).await {
            Ok(state) => state.unwrap_or(ProcessExit { code: None }),
            // Waiter task gone without publishing; treat as exited.
            Err(_) => ProcessExit { code: None },
        };
        exit
    }

    /// Ask the transcoder to quit by writing `q` to its stdin.
    pub async fn request_quit(&self) -> bool {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return false;
        };
        let sent = pipe.write_all(b"q\n").await.is_ok() && pipe.flush().await.is_ok();
        // Closing stdin doubles as an EOF signal.
        stdin.take();
        sent
    }

    /// Kill the whole process group without waiting.
    pub fn force_kill(&self) {
        self.kill.cancel();
    }

    /// Stop the process: quit request, then a forced kill if it has not
    /// exited within `grace`. Returns once the exit has been observed.
    pub async fn stop(&self, grace: Duration) -> ProcessExit {
        if self.has_exited() {
            return self.wait().await;
        }

        if self.request_quit().await {
            if let Ok(exit) = tokio::time::timeout(grace, self.wait()).await {
                return exit;
            }
            tracing::debug!(pid = ?self.pid, "Transcoder ignored quit request, killing");
        }

        self.force_kill();
        self.wait().await
    }
}

async fn wait_for_exit(
    mut child: Child,
    pid: Option<u32>,
    kill: CancellationToken,
    tx: watch::Sender<Option<ProcessExit>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill.cancelled() => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            kill_process_group(pid);
            if let Err(e) = child.start_kill() {
                tracing::debug!(pid = ?pid, "Kill after group signal failed: {}", e);
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(pid = ?pid, "Failed to wait for transcoder: {}", e);
            None
        }
    };

    let _ = tx.send(Some(ProcessExit { code }));
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid, "killpg failed: {}", e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
