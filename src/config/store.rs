//! Runtime configuration holder.
//!
//! [`ConfigStore`] keeps the active policy as an immutable [`ActiveConfig`]
//! snapshot behind a [`RwLock`]. Readers clone the `Arc` and drop the lock
//! immediately; reconfiguration swaps the whole snapshot, so no reader ever
//! observes a half-applied policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::TranscodeConfig;

/// Executable name searched on `PATH` when no usable path is configured.
const DEFAULT_TRANSCODER: &str = "ffmpeg";

/// Directory under the system temp dir used when no temp root is configured.
const DEFAULT_TEMP_DIR: &str = "hlsrelay";

/// A configuration with its filesystem dependencies resolved.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    pub settings: TranscodeConfig,
    /// Transcoder executable that will be spawned.
    pub transcoder: PathBuf,
    /// Directory holding one workspace per job.
    pub temp_root: PathBuf,
}

impl ActiveConfig {
    /// Resolve the transcoder executable and temp root for `settings`.
    ///
    /// A configured transcoder path is used only if it exists; otherwise
    /// `ffmpeg` is looked up on `PATH` with [`which::which`], and the bare
    /// name is kept as a last resort so the spawn error names the problem.
    pub fn resolve(settings: TranscodeConfig) -> Self {
        let transcoder = resolve_transcoder(settings.transcoder_path.as_deref());
        let temp_root = settings
            .temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_TEMP_DIR));

        Self {
            settings,
            transcoder,
            temp_root,
        }
    }
}

fn resolve_transcoder(custom: Option<&Path>) -> PathBuf {
    if let Some(path) = custom {
        if path.exists() {
            return path.to_path_buf();
        }
    }
    which::which(DEFAULT_TRANSCODER).unwrap_or_else(|_| PathBuf::from(DEFAULT_TRANSCODER))
}

/// Atomically swappable configuration snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ActiveConfig>>,
}

impl ConfigStore {
    pub fn new(config: ActiveConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Read the current snapshot.
    pub fn snapshot(&self) -> Arc<ActiveConfig> {
        self.current.read().clone()
    }

    /// Replace the snapshot wholesale, returning the previous one.
    pub fn replace(&self, config: ActiveConfig) -> Arc<ActiveConfig> {
        std::mem::replace(&mut *self.current.write(), Arc::new(config))
    }
}
