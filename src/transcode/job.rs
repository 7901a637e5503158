//! Job records and their diagnostic log.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use hlsrelay_common::JobId;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::context::StartContext;
use super::process::TranscoderProcess;

/// Maximum number of diagnostic lines kept per job.
pub const LOG_CAPACITY: usize = 200;
/// Maximum length of a single diagnostic line, in characters.
pub const LOG_LINE_MAX_CHARS: usize = 2000;

/// Bounded buffer of the transcoder's most recent diagnostic lines.
#[derive(Debug, Default)]
pub struct JobLog {
    lines: Mutex<VecDeque<String>>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`, splitting on embedded CR/LF. Blank pieces are dropped,
    /// long lines truncated and the oldest lines evicted beyond capacity.
    pub fn push(&self, text: &str) {
        let mut lines = self.lines.lock();
        for piece in text.split(|c: char| c == '\r' || c == '\n') {
            if piece.trim().is_empty() {
                continue;
            }
            if lines.len() == LOG_CAPACITY {
                lines.pop_front();
            }
            lines.push_back(truncate_chars(piece, LOG_LINE_MAX_CHARS));
        }
    }

    /// Copy of the current lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

fn truncate_chars(line: &str, max: usize) -> String {
    match line.char_indices().nth(max) {
        Some((end, _)) => line[..end].to_string(),
        None => line.to_string(),
    }
}

/// Serializable point-in-time view of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub token: String,
    pub source: String,
    pub workspace: PathBuf,
    pub started_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub seek_secs: u32,
    pub exited: bool,
    pub exit_code: Option<i32>,
    pub log: Vec<String>,
}

/// One running transcode.
///
/// A seek replaces the registry entry with a fresh `Job` that keeps the id,
/// token, workspace and log of its predecessor; everything tied to the old
/// process (cancellation token, task set) stays with the old record.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    token: String,
    context: StartContext,
    process: TranscoderProcess,
    log: Arc<JobLog>,
    started_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
    final_exit: Mutex<Option<i32>>,
    cancel: CancellationToken,
    cleanup_on_exit: AtomicBool,
    seeking: AtomicBool,
    tasks: TaskTracker,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        token: String,
        context: StartContext,
        process: TranscoderProcess,
    ) -> Self {
        Self::with_history(
            id,
            token,
            context,
            process,
            Arc::new(JobLog::new()),
            Utc::now(),
        )
    }

    /// Successor record for a seek-restart.
    pub(crate) fn restarted(&self, context: StartContext, process: TranscoderProcess) -> Self {
        Self::with_history(
            self.id,
            self.token.clone(),
            context,
            process,
            Arc::clone(&self.log),
            self.started_at,
        )
    }

    fn with_history(
        id: JobId,
        token: String,
        context: StartContext,
        process: TranscoderProcess,
        log: Arc<JobLog>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            token,
            context,
            process,
            log,
            started_at,
            last_access: Mutex::new(Instant::now()),
            final_exit: Mutex::new(None),
            cancel: CancellationToken::new(),
            cleanup_on_exit: AtomicBool::new(true),
            seeking: AtomicBool::new(false),
            tasks: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Public stream token.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn context(&self) -> &StartContext {
        &self.context
    }

    pub fn workspace(&self) -> &Path {
        &self.context.workspace
    }

    pub fn playlist(&self) -> &Path {
        &self.context.playlist
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn log(&self) -> &JobLog {
        &self.log
    }

    pub(crate) fn process(&self) -> &TranscoderProcess {
        &self.process
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Tracker for this record's background tasks. Closed once the record
    /// is retired.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Refresh liveness. Never moves `last_access` backwards.
    pub fn touch(&self) {
        let now = Instant::now();
        let mut last = self.last_access.lock();
        if now > *last {
            *last = now;
        }
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    /// Time since the last successful touch.
    pub fn idle_for(&self) -> Duration {
        self.last_access().elapsed()
    }

    pub fn has_exited(&self) -> bool {
        self.process.has_exited()
    }

    /// Exit code of the transcoder, once known.
    pub fn exit_code(&self) -> Option<i32> {
        (*self.final_exit.lock()).or_else(|| self.process.exit_code())
    }

    pub(crate) fn record_exit(&self) {
        if let Some(code) = self.process.exit_code() {
            *self.final_exit.lock() = Some(code);
        }
    }

    pub(crate) fn begin_seek(&self) -> bool {
        self.seeking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_seek(&self) {
        self.seeking.store(false, Ordering::Release);
    }

    pub fn is_seeking(&self) -> bool {
        self.seeking.load(Ordering::Acquire)
    }

    /// Stop treating the process's exit as the end of the job.
    pub(crate) fn disarm_exit_cleanup(&self) {
        self.cleanup_on_exit.store(false, Ordering::Release);
    }

    pub(crate) fn cleans_up_on_exit(&self) -> bool {
        self.cleanup_on_exit.load(Ordering::Acquire)
    }

    /// Cancel this record's background tasks and stop accepting new ones.
    pub(crate) fn retire(&self) {
        self.cancel.cancel();
        self.tasks.close();
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            token: self.token.clone(),
            source: self.context.source.to_string(),
            workspace: self.context.workspace.clone(),
            started_at: self.started_at,
            idle_secs: self.idle_for().as_secs(),
            seek_secs: self.context.seek_secs,
            exited: self.has_exited(),
            exit_code: self.exit_code(),
            log: self.log.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_splits_and_skips_blank_lines() {
        let log = JobLog::new();
        log.push("frame=1\rframe=2\r\n\r\n  \nsize=10kB");
        assert_eq!(log.snapshot(), vec!["frame=1", "frame=2", "size=10kB"]);
    }

    #[test]
    fn log_evicts_oldest_beyond_capacity() {
        let log = JobLog::new();
        for i in 0..(LOG_CAPACITY + 25) {
            log.push(&format!("line {i}"));
        }
        let lines = log.snapshot();
        assert_eq!(lines.len(), LOG_CAPACITY);
        assert_eq!(lines.first().unwrap(), "line 25");
        assert_eq!(
            lines.last().unwrap(),
            &format!("line {}", LOG_CAPACITY + 24)
        );
    }

    #[test]
    fn log_truncates_long_lines_on_char_boundary() {
        let log = JobLog::new();
        log.push(&"é".repeat(LOG_LINE_MAX_CHARS + 10));
        let lines = log.snapshot();
        assert_eq!(lines[0].chars().count(), LOG_LINE_MAX_CHARS);

        log.push(&"x".repeat(LOG_LINE_MAX_CHARS));
        assert_eq!(log.snapshot()[1].len(), LOG_LINE_MAX_CHARS);
    }

    #[cfg(unix)]
    fn job(seek_secs: u32) -> Job {
        use crate::config::{AudioOptions, HlsOptions};
        use crate::transcode::invocation::Invocation;

        let mut inv = Invocation::new("/bin/sh");
        inv.arg("-c").arg("exit 0");
        let (process, _stderr) = TranscoderProcess::spawn(&inv).unwrap();
        let context = StartContext::new(
            url::Url::parse("https://example.com/a.m3u8").unwrap(),
            "Player/1.0".into(),
            None,
            HlsOptions::default(),
            AudioOptions::default(),
            false,
            seek_secs,
            PathBuf::from("/tmp/hlsrelay/job"),
        );
        Job::new(JobId::new(), "token".into(), context, process)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn touch_never_moves_backwards() {
        let job = job(0);
        let first = job.last_access();
        job.touch();
        let second = job.last_access();
        assert!(second >= first);
        job.touch();
        assert!(job.last_access() >= second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn only_one_seek_at_a_time() {
        let job = job(0);
        assert!(job.begin_seek());
        assert!(job.is_seeking());
        assert!(!job.begin_seek());
        job.end_seek();
        assert!(job.begin_seek());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn restarted_keeps_identity_and_log() {
        let old = job(0);
        old.log().push("before seek");
        old.disarm_exit_cleanup();
        old.retire();

        let process = job(45).process;
        let new = old.restarted(old.context().with_seek(45), process);

        assert_eq!(new.id(), old.id());
        assert_eq!(new.token(), old.token());
        assert_eq!(new.started_at(), old.started_at());
        assert_eq!(new.workspace(), old.workspace());
        assert_eq!(new.context().seek_secs, 45);
        assert_eq!(new.log().snapshot(), vec!["before seek"]);
        assert!(new.cleans_up_on_exit());
        assert!(!old.cleans_up_on_exit());
        assert!(!new.cancel_token().is_cancelled());
        assert!(old.cancel_token().is_cancelled());

        new.process().wait().await;
        new.record_exit();
        assert_eq!(new.exit_code(), Some(0));
    }

    #[test]
    fn status_serializes() {
        let status = JobStatus {
            token: "abc.def".into(),
            source: "https://example.com/a.m3u8".into(),
            workspace: PathBuf::from("/tmp/hlsrelay/abc"),
            started_at: Utc::now(),
            idle_secs: 3,
            seek_secs: 30,
            exited: true,
            exit_code: Some(3),
            log: vec!["boom".into()],
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["token"], "abc.def");
        assert_eq!(json["seek_secs"], 30);
        assert_eq!(json["exit_code"], 3);
        assert_eq!(json["log"][0], "boom");
        assert!(json["started_at"].is_string());
    }

    #[test]
    fn empty_log() {
        let log = JobLog::new();
        log.push("");
        log.push("\r\n");
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }
}
