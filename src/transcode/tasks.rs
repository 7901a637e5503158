//! Background tasks that run for the life of each job record.
//!
//! Every task exits when the record's cancellation token fires, so retiring
//! a record (stop, cleanup or seek) winds all of them down.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::process::ChildStderr;
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{Decoder, FramedRead};

use super::job::{Job, LOG_LINE_MAX_CHARS};
use super::orchestrator::Orchestrator;

/// Interval between idle checks.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Bytes buffered for a single unterminated diagnostic line.
const MAX_PENDING_LINE_BYTES: usize = LOG_LINE_MAX_CHARS * 4;

/// Splits transcoder diagnostics on `\r` as well as `\n`.
///
/// Progress updates are CR-terminated and arrive without a newline for the
/// whole life of the job. A line longer than `max_len` bytes is emitted
/// truncated and the rest of it, up to the next terminator, is dropped.
#[derive(Debug)]
pub(crate) struct DiagnosticLines {
    max_len: usize,
    discarding: bool,
}

impl DiagnosticLines {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            max_len,
            discarding: false,
        }
    }
}

impl Decoder for DiagnosticLines {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        loop {
            match buf.iter().position(|b| *b == b'\r' || *b == b'\n') {
                Some(end) => {
                    let line = buf.split_to(end + 1);
                    if std::mem::take(&mut self.discarding) || end == 0 {
                        continue;
                    }
                    return Ok(Some(String::from_utf8_lossy(&line[..end]).into_owned()));
                }
                None if self.discarding => {
                    buf.clear();
                    return Ok(None);
                }
                None if buf.len() > self.max_len => {
                    let line = buf.split_to(self.max_len);
                    self.discarding = true;
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

/// Copy the transcoder's stderr into the job log until the stream ends.
pub(crate) async fn pump_diagnostics(job: Arc<Job>, stderr: ChildStderr) {
    let mut lines = FramedRead::new(stderr, DiagnosticLines::new(MAX_PENDING_LINE_BYTES));

    loop {
        let next = tokio::select! {
            biased;
            next = lines.next() => next,
            _ = job.cancel_token().cancelled() => break,
        };

        match next {
            Some(Ok(line)) => {
                tracing::debug!(job_id = %job.id(), "transcoder: {}", line.trim_end());
                job.log().push(&line);
            }
            Some(Err(e)) => {
                tracing::debug!(job_id = %job.id(), "Diagnostics stream error: {}", e);
                break;
            }
            None => break,
        }
    }

    tracing::debug!(job_id = %job.id(), "Diagnostics pump ended");
}

/// Stop the job once it has gone unrequested for longer than the idle timeout.
pub(crate) async fn watch_idle(orchestrator: Orchestrator, job: Arc<Job>) {
    let mut tick = tokio::time::interval(WATCHDOG_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = job.cancel_token().cancelled() => return,
            _ = job.process().wait() => return,
            _ = tick.tick() => {}
        }

        let timeout = orchestrator.idle_timeout();
        let idle = job.idle_for();
        if idle >= timeout {
            tracing::info!(
                job_id = %job.id(),
                idle_secs = idle.as_secs(),
                timeout_secs = timeout.as_secs(),
                "Stopping idle job"
            );
            orchestrator.stop_job(&job, true).await;
            return;
        }
    }
}

/// Clean up after a transcoder that exits on its own.
pub(crate) async fn react_to_exit(orchestrator: Orchestrator, job: Arc<Job>) {
    let exit = tokio::select! {
        _ = job.cancel_token().cancelled() => return,
        exit = job.process().wait() => exit,
    };

    if !job.cleans_up_on_exit() {
        return;
    }

    match exit.code {
        Some(0) => tracing::info!(job_id = %job.id(), "Transcoder finished"),
        code => tracing::warn!(
            job_id = %job.id(),
            exit_code = ?code,
            last_line = ?job.log().snapshot().last(),
            "Transcoder exited unexpectedly"
        ),
    }

    orchestrator.cleanup(&job).await;
}
