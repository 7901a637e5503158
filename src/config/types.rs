use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Shortest idle timeout the watchdog will honour.
pub const MIN_IDLE_TIMEOUT_SECS: u64 = 20;
/// Shortest HLS segment duration.
pub const MIN_SEGMENT_SECONDS: u32 = 1;
/// Smallest live playlist window.
pub const MIN_WINDOW_SIZE: u32 = 5;
/// Audio bitrate used when a configured value is out of range.
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 160;
/// Largest accepted audio bitrate.
pub const MAX_AUDIO_BITRATE_KBPS: u32 = 512;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transcode: TranscodeConfig,
}

/// Transcoding policy. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Transcoder executable. Falls back to `ffmpeg` on `PATH` when unset or
    /// missing.
    #[serde(default)]
    pub transcoder_path: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Root for per-job workspaces (default: `<system temp>/hlsrelay`).
    #[serde(default)]
    pub temp_root: Option<PathBuf>,

    /// Source hosts that may be transcoded (empty = allow all)
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    #[serde(default)]
    pub hls: HlsOptions,

    #[serde(default)]
    pub audio: AudioOptions,
}

fn default_enabled() -> bool {
    true
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_idle_timeout() -> u64 {
    60
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            transcoder_path: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            idle_timeout_secs: default_idle_timeout(),
            temp_root: None,
            allowed_hosts: Vec::new(),
            hls: HlsOptions::default(),
            audio: AudioOptions::default(),
        }
    }
}

impl TranscodeConfig {
    /// Concurrency cap with its floor of one job applied.
    pub fn job_limit(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }

    /// Idle timeout with the 20 second floor applied.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.max(MIN_IDLE_TIMEOUT_SECS))
    }

    /// Whether `host` passes the allow-list. Comparison ignores ASCII case.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        self.allowed_hosts.is_empty()
            || self
                .allowed_hosts
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(host))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HlsOptions {
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: u32,

    #[serde(default = "default_window_size")]
    pub window_size: u32,

    /// fMP4 segments when true, MPEG-TS otherwise
    #[serde(default = "default_fragmented_mp4")]
    pub fragmented_mp4: bool,
}

fn default_segment_seconds() -> u32 {
    4
}

fn default_window_size() -> u32 {
    10
}

fn default_fragmented_mp4() -> bool {
    true
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            segment_seconds: default_segment_seconds(),
            window_size: default_window_size(),
            fragmented_mp4: default_fragmented_mp4(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AudioOptions {
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,

    #[serde(default = "default_stereo")]
    pub stereo: bool,

    /// Re-encode to AAC-LC; the source track is copied when false
    #[serde(default = "default_transcode_to_aac")]
    pub transcode_to_aac: bool,

    #[serde(default)]
    pub source_track_index: u32,
}

fn default_bitrate() -> u32 {
    DEFAULT_AUDIO_BITRATE_KBPS
}

fn default_stereo() -> bool {
    true
}

fn default_transcode_to_aac() -> bool {
    true
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            bitrate_kbps: default_bitrate(),
            stereo: default_stereo(),
            transcode_to_aac: default_transcode_to_aac(),
            source_track_index: 0,
        }
    }
}
