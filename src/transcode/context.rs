//! Immutable per-job start parameters.

use std::path::{Path, PathBuf};

use url::Url;

use crate::config::{AudioOptions, HlsOptions};

/// Live playlist written into every workspace.
pub const PLAYLIST_NAME: &str = "index.m3u8";
/// Initialization segment written for fMP4 output.
pub const INIT_SEGMENT_NAME: &str = "init.mp4";

/// Everything needed to (re)build the transcoder invocation for a job.
///
/// Seeking never mutates a context; [`StartContext::with_seek`] produces a new
/// one that differs only in its offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartContext {
    pub source: Url,
    pub user_agent: String,
    pub referer: Option<String>,
    pub hls: HlsOptions,
    pub audio: AudioOptions,
    pub subtitles: bool,
    pub seek_secs: u32,
    pub workspace: PathBuf,
    pub playlist: PathBuf,
}

impl StartContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Url,
        user_agent: String,
        referer: Option<String>,
        hls: HlsOptions,
        audio: AudioOptions,
        subtitles: bool,
        seek_secs: u32,
        workspace: PathBuf,
    ) -> Self {
        let playlist = workspace.join(PLAYLIST_NAME);
        Self {
            source,
            user_agent,
            referer,
            hls,
            audio,
            subtitles,
            seek_secs,
            workspace,
            playlist,
        }
    }

    /// Copy of this context starting at `offset_secs`.
    pub fn with_seek(&self, offset_secs: u32) -> Self {
        Self {
            seek_secs: offset_secs,
            ..self.clone()
        }
    }

    /// File extension of media segments for the selected container.
    pub fn segment_extension(&self) -> &'static str {
        if self.hls.fragmented_mp4 {
            "m4s"
        } else {
            "ts"
        }
    }

    /// `printf`-style segment filename pattern inside the workspace.
    pub fn segment_pattern(&self) -> PathBuf {
        self.workspace
            .join(format!("seg_%05d.{}", self.segment_extension()))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}
