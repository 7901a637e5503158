//! Job registry and lifecycle operations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hlsrelay_common::{Error, JobId, Result};
use tokio::process::ChildStderr;

use super::context::StartContext;
use super::files::resolve_in_workspace;
use super::invocation::Invocation;
use super::job::{Job, JobStatus};
use super::options::{
    header_value, merge_audio_options, merge_hls_options, sanitize_header, validate_source,
    StartRequest, DEFAULT_USER_AGENT,
};
use super::process::{TranscoderProcess, STOP_GRACE};
use super::tasks;
use super::token::TokenCodec;
use crate::config::{ActiveConfig, ConfigStore};

struct Inner {
    config: ConfigStore,
    codec: TokenCodec,
    jobs: DashMap<JobId, Arc<Job>>,
}

/// Owns every transcode job, the token signing key and the active
/// configuration. Cloning is cheap and shares the same registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("jobs", &self.inner.jobs.len())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with a fresh signing key and no jobs.
    pub fn new(config: ActiveConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: ConfigStore::new(config),
                codec: TokenCodec::new(),
                jobs: DashMap::new(),
            }),
        }
    }

    /// Swap in a new configuration and prepare its temp root.
    ///
    /// Running jobs keep the settings they were started with.
    pub async fn configure(&self, config: ActiveConfig) -> Result<()> {
        self.inner.config.replace(config);
        self.prepare().await
    }

    /// Create the temp root and remove job workspaces left behind by a
    /// previous run. Only directories named like a job id and not owned by a
    /// live job are removed.
    pub async fn prepare(&self) -> Result<()> {
        let temp_root = self.inner.config.snapshot().temp_root.clone();
        tokio::fs::create_dir_all(&temp_root).await.map_err(|e| {
            Error::config(format!(
                "cannot create temp root {}: {}",
                temp_root.display(),
                e
            ))
        })?;

        let live: HashSet<String> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.key().to_string())
            .collect();

        let mut entries = tokio::fs::read_dir(&temp_root).await.map_err(|e| {
            Error::config(format!("cannot read temp root {}: {}", temp_root.display(), e))
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.parse::<JobId>().is_err() || live.contains(&name) {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            tracing::info!(path = ?entry.path(), "Removing stale job workspace");
            remove_workspace(&entry.path()).await;
        }

        Ok(())
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ActiveConfig> {
        self.inner.config.snapshot()
    }

    /// Transcoder executable used for new jobs.
    pub fn transcoder_path(&self) -> PathBuf {
        self.inner.config.snapshot().transcoder.clone()
    }

    /// Effective idle timeout (floor applied).
    pub fn idle_timeout(&self) -> Duration {
        self.inner.config.snapshot().settings.idle_timeout()
    }

    /// Validate `request`, spawn a transcoder and register the job.
    ///
    /// On failure nothing is left behind: no registry entry, no workspace and
    /// no running process.
    pub async fn start(&self, request: StartRequest) -> Result<Arc<Job>> {
        let config = self.inner.config.snapshot();
        let settings = &config.settings;

        if !settings.enabled {
            return Err(Error::Disabled);
        }
        let source = validate_source(&request.source, settings)?;

        let limit = settings.job_limit();
        if self.inner.jobs.len() >= limit {
            tracing::warn!(limit, "Rejecting transcode, job limit reached");
            return Err(Error::Capacity { limit });
        }

        let id = JobId::new();
        let token = self.inner.codec.issue(id);
        let workspace = config.temp_root.join(id.to_string());
        tokio::fs::create_dir_all(&workspace).await?;

        let user_agent =
            sanitize_header(header_value(&request.headers, &["user-agent", "useragent"]))
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let referer = sanitize_header(header_value(&request.headers, &["referer"]));

        let context = StartContext::new(
            source,
            user_agent,
            referer,
            merge_hls_options(&settings.hls, request.hls.as_ref()),
            merge_audio_options(&settings.audio, request.audio.as_ref()),
            request.subtitles,
            0,
            workspace,
        );

        let invocation = Invocation::build(&config.transcoder, &context);
        let (process, stderr) = match TranscoderProcess::spawn(&invocation) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::warn!(job_id = %id, "Failed to start transcoder: {}", e);
                remove_workspace(&context.workspace).await;
                return Err(e);
            }
        };

        let job = Arc::new(Job::new(id, token, context, process));
        if !self.insert(&job) {
            job.process().force_kill();
            job.process().wait().await;
            job.retire();
            remove_workspace(job.workspace()).await;
            return Err(Error::registration(format!("duplicate job id {id}")));
        }

        self.launch(&job, stderr);

        tracing::info!(
            job_id = %id,
            source = %job.context().source,
            pid = ?job.process().pid(),
            workspace = ?job.workspace(),
            "Started transcode job"
        );

        Ok(job)
    }

    /// Verify `token` and return its job, refreshing the job's liveness.
    pub fn resolve(&self, token: &str) -> Result<Arc<Job>> {
        let job = self.lookup(token)?;
        self.touch(&job);
        Ok(job)
    }

    /// Refresh a job's liveness.
    pub fn touch(&self, job: &Job) {
        job.touch();
        tracing::trace!(job_id = %job.id(), "Job touched");
    }

    fn lookup(&self, token: &str) -> Result<Arc<Job>> {
        let id = self.inner.codec.verify(token)?;
        self.current(id).ok_or_else(|| Error::job_not_found(id))
    }

    /// Absolute path of a generated file, confined to the job's workspace.
    pub async fn file_path(&self, token: &str, name: &str) -> Result<PathBuf> {
        let job = self.resolve(token)?;
        resolve_in_workspace(job.workspace(), name).await
    }

    /// Contents of a generated file.
    pub async fn read_file(&self, token: &str, name: &str) -> Result<Bytes> {
        let path = self.file_path(token, name).await?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("file", name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Status of a job without refreshing its liveness.
    pub fn status(&self, token: &str) -> Result<JobStatus> {
        Ok(self.lookup(token)?.status())
    }

    /// All registered jobs.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        self.inner
            .jobs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Stop the job behind `token` and delete its workspace.
    ///
    /// Returns `false` when the token is invalid or the job is already gone.
    pub async fn stop(&self, token: &str) -> bool {
        let Ok(mut job) = self.lookup(token) else {
            return false;
        };
        tracing::info!(job_id = %job.id(), "Stopping job");

        loop {
            self.stop_job(&job, true).await;
            // A concurrent seek may have swapped in a successor record.
            match self.current(job.id()) {
                Some(next) if !Arc::ptr_eq(&next, &job) => job = next,
                _ => break,
            }
        }
        true
    }

    /// Restart the job behind `token` at `offset_secs`.
    ///
    /// The token, workspace and output paths stay the same. If the new
    /// transcoder cannot be started the job is removed.
    pub async fn seek(&self, token: &str, offset_secs: u32) -> Result<()> {
        let old = self.resolve(token)?;
        if !old.begin_seek() {
            return Err(Error::SeekInProgress(old.id().to_string()));
        }

        let result = self.restart(&old, offset_secs).await;
        old.end_seek();
        result
    }

    async fn restart(&self, old: &Arc<Job>, offset_secs: u32) -> Result<()> {
        let id = old.id();
        tracing::info!(job_id = %id, offset_secs, "Seeking job");

        old.disarm_exit_cleanup();
        old.process().stop(STOP_GRACE).await;

        if !self.is_current(old) {
            return Err(Error::job_not_found(id));
        }

        let config = self.inner.config.snapshot();
        let context = old.context().with_seek(offset_secs);
        let invocation = Invocation::build(&config.transcoder, &context);
        let (process, stderr) = match TranscoderProcess::spawn(&invocation) {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::warn!(job_id = %id, "Failed to restart transcoder: {}", e);
                self.cleanup(old).await;
                return Err(e);
            }
        };

        let new = Arc::new(old.restarted(context, process));
        if !self.replace(old, &new) {
            new.process().force_kill();
            new.process().wait().await;
            new.retire();
            self.cleanup(old).await;
            return Err(Error::registration(format!(
                "job {id} changed during seek"
            )));
        }

        old.retire();
        self.launch(&new, stderr);

        tracing::info!(job_id = %id, offset_secs, pid = ?new.process().pid(), "Job restarted");
        Ok(())
    }

    /// Force-stop every job and delete their workspaces.
    pub async fn stop_all(&self) {
        let jobs = self.jobs();
        if jobs.is_empty() {
            return;
        }
        tracing::info!(count = jobs.len(), "Stopping all jobs");

        futures::future::join_all(jobs.iter().map(|job| async move {
            job.disarm_exit_cleanup();
            job.process().force_kill();
            job.process().wait().await;
            self.cleanup(job).await;
        }))
        .await;
    }

    /// [`stop_all`](Self::stop_all), then wait for every background task.
    pub async fn shutdown(&self) {
        let trackers: Vec<_> = self.jobs().iter().map(|job| job.tasks().clone()).collect();
        self.stop_all().await;
        for tracker in trackers {
            tracker.close();
            tracker.wait().await;
        }
        tracing::info!("Orchestrator shut down");
    }

    /// Stop `job`'s process and, when `cleanup` is set, remove the job.
    pub(crate) async fn stop_job(&self, job: &Arc<Job>, cleanup: bool) {
        if cleanup {
            job.disarm_exit_cleanup();
        }
        let exit = job.process().stop(STOP_GRACE).await;
        tracing::debug!(job_id = %job.id(), exit_code = ?exit.code, "Transcoder stopped");
        if cleanup {
            self.cleanup(job).await;
        }
    }

    /// Remove `job` from the registry if it is still the current record for
    /// its id, retire it and delete its workspace. Only the caller that
    /// performed the removal deletes anything.
    pub(crate) async fn cleanup(&self, job: &Arc<Job>) -> bool {
        let removed = self
            .inner
            .jobs
            .remove_if(&job.id(), |_, current| Arc::ptr_eq(current, job))
            .is_some();

        job.retire();
        job.record_exit();

        if removed {
            remove_workspace(job.workspace()).await;
            tracing::info!(
                job_id = %job.id(),
                exit_code = ?job.exit_code(),
                "Job removed"
            );
        }
        removed
    }

    fn insert(&self, job: &Arc<Job>) -> bool {
        match self.inner.jobs.entry(job.id()) {
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(job));
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Swap `old` for `new`, only if `old` is still registered.
    fn replace(&self, old: &Arc<Job>, new: &Arc<Job>) -> bool {
        match self.inner.jobs.get_mut(&old.id()) {
            Some(mut entry) if Arc::ptr_eq(entry.value(), old) => {
                *entry.value_mut() = Arc::clone(new);
                true
            }
            _ => false,
        }
    }

    fn current(&self, id: JobId) -> Option<Arc<Job>> {
        self.inner.jobs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn is_current(&self, job: &Arc<Job>) -> bool {
        self.current(job.id())
            .is_some_and(|current| Arc::ptr_eq(&current, job))
    }

    fn launch(&self, job: &Arc<Job>, stderr: Option<ChildStderr>) {
        let tracker = job.tasks();
        if let Some(stderr) = stderr {
            tracker.spawn(tasks::pump_diagnostics(Arc::clone(job), stderr));
        }
        tracker.spawn(tasks::watch_idle(self.clone(), Arc::clone(job)));
        tracker.spawn(tasks::react_to_exit(self.clone(), Arc::clone(job)));
    }
}

async fn remove_workspace(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = ?path, "Failed to remove job workspace: {}", e),
    }
}
