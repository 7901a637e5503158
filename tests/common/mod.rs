//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds an [`Orchestrator`] over a private
//! temp root and a fake transcoder script. The scripts are shell stand-ins
//! for ffmpeg: they record their arguments, write a playlist and then behave
//! according to [`FakeTranscoder`].

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use hlsrelay::config::{ActiveConfig, TranscodeConfig};
use hlsrelay::transcode::{Job, Orchestrator, StartRequest};
use tempfile::TempDir;

/// Source URL used by tests. Never fetched; the fake transcoders ignore it.
pub const SOURCE: &str = "https://example.com/a.m3u8";

/// Behaviour of a fake transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeTranscoder {
    /// Writes the playlist and runs until it reads `q` or stdin closes.
    Cooperative,
    /// Writes the playlist, prints an error and exits with code 3.
    Crashing,
    /// Writes the playlist and ignores stdin and termination signals.
    Stubborn,
    /// Prints 40 CR-terminated progress updates, then behaves like
    /// `Cooperative`.
    Progress,
}

const PREAMBLE: &str = r#"#!/bin/sh
for last; do :; done
dir=$(dirname "$last")
printf '%s\n' "$@" > "$dir/args.txt"
printf '#EXTM3U\n#EXT-X-VERSION:7\n' > "$last"
echo "fake transcoder started" >&2
"#;

const COOPERATIVE: &str = r#"while read line; do
  [ "$line" = q ] && exit 0
done
exit 0
"#;

const CRASHING: &str = r#"sleep 1
echo "boom: connection refused" >&2
exit 3
"#;

const PROGRESS: &str = r#"i=0
while [ $i -lt 40 ]; do
  printf 'frame=%d fps=25\r' $i >&2
  i=$((i+1))
done
while read line; do
  [ "$line" = q ] && exit 0
done
exit 0
"#;

const STUBBORN: &str = r#"trap '' INT TERM
while true; do sleep 1; done
"#;

struct Scripts {
    _dir: PathBuf,
    cooperative: PathBuf,
    crashing: PathBuf,
    stubborn: PathBuf,
    progress: PathBuf,
}

/// Write the scripts once per test binary. Rewriting an executable while
/// another test spawns it fails with ETXTBSY.
fn scripts() -> &'static Scripts {
    static SCRIPTS: OnceLock<Scripts> = OnceLock::new();
    SCRIPTS.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("hlsrelay-fake-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("failed to create script dir");

        let write = |name: &str, body: &str| {
            let path = dir.join(name);
            std::fs::write(&path, format!("{PREAMBLE}{body}")).expect("failed to write script");
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                    .expect("failed to chmod script");
            }
            path
        };

        Scripts {
            cooperative: write("cooperative.sh", COOPERATIVE),
            crashing: write("crashing.sh", CRASHING),
            stubborn: write("stubborn.sh", STUBBORN),
            progress: write("progress.sh", PROGRESS),
            _dir: dir,
        }
    })
}

/// Path of the fake transcoder script for `kind`.
pub fn fake_transcoder(kind: FakeTranscoder) -> PathBuf {
    let scripts = scripts();
    match kind {
        FakeTranscoder::Cooperative => scripts.cooperative.clone(),
        FakeTranscoder::Crashing => scripts.crashing.clone(),
        FakeTranscoder::Stubborn => scripts.stubborn.clone(),
        FakeTranscoder::Progress => scripts.progress.clone(),
    }
}

/// Test harness wrapping an [`Orchestrator`] with its own temp root.
pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub temp_root: TempDir,
}

impl TestHarness {
    /// Harness with default settings and the given fake transcoder.
    pub fn new(kind: FakeTranscoder) -> Self {
        Self::with_settings(kind, TranscodeConfig::default())
    }

    /// Harness with custom settings. The transcoder path and temp root are
    /// always overridden.
    pub fn with_settings(kind: FakeTranscoder, settings: TranscodeConfig) -> Self {
        let temp_root = tempfile::tempdir().expect("failed to create temp root");
        let settings = TranscodeConfig {
            transcoder_path: Some(fake_transcoder(kind)),
            temp_root: Some(temp_root.path().to_path_buf()),
            ..settings
        };
        let orchestrator = Orchestrator::new(ActiveConfig::resolve(settings));
        Self {
            orchestrator,
            temp_root,
        }
    }

    pub fn request(&self) -> StartRequest {
        StartRequest::new(SOURCE)
    }

    /// Number of entries directly under the temp root.
    /// Point the orchestrator at a transcoder that exists but cannot be
    /// executed. Returns the directory holding it.
    pub async fn break_transcoder(&self) -> TempDir {
        let dir = tempfile::tempdir().expect("failed to create dir");
        let path = dir.path().join("not-executable");
        std::fs::write(&path, "").expect("failed to write file");

        let settings = TranscodeConfig {
            transcoder_path: Some(path),
            ..self.orchestrator.config().settings.clone()
        };
        self.orchestrator
            .configure(ActiveConfig::resolve(settings))
            .await
            .expect("failed to reconfigure");
        dir
    }

    pub fn workspace_count(&self) -> usize {
        std::fs::read_dir(self.temp_root.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Poll `check` every 50ms until it returns true or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Arguments recorded by the fake transcoder for `job`, one per entry.
pub async fn recorded_args(job: &Job) -> Vec<String> {
    recorded_args_in(job.workspace()).await
}

/// Wait for `args.txt` in `workspace` and return its lines.
pub async fn recorded_args_in(workspace: &Path) -> Vec<String> {
    let path = workspace.join("args.txt");
    let found = wait_until(Duration::from_secs(5), || path.exists()).await;
    assert!(found, "fake transcoder never wrote {path:?}");

    // The script may still be writing; give it a moment to finish.
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::read_to_string(&path)
        .expect("failed to read args.txt")
        .lines()
        .map(str::to_string)
        .collect()
}

/// True when `args` contains `flag` immediately followed by `value`.
pub fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
    args.windows(2).any(|w| w[0] == flag && w[1] == value)
}
