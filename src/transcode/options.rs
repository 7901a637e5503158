//! Start requests and the policy that turns them into resolved options.
//!
//! Overrides fall back field by field: request value, then configured
//! default, then the hard floor.

use std::collections::HashMap;

use hlsrelay_common::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{
    AudioOptions, HlsOptions, TranscodeConfig, DEFAULT_AUDIO_BITRATE_KBPS, MAX_AUDIO_BITRATE_KBPS,
    MIN_SEGMENT_SECONDS, MIN_WINDOW_SIZE,
};

/// User agent sent upstream when the request does not supply one.
pub const DEFAULT_USER_AGENT: &str = concat!("hlsrelay/", env!("CARGO_PKG_VERSION"));

/// A request to start transcoding a remote source.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartRequest {
    /// Absolute http/https URL of the source media.
    pub source: String,
    /// Upstream header overrides (`user-agent`, `referer`), matched
    /// case-insensitively.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub hls: Option<HlsOverrides>,
    #[serde(default)]
    pub audio: Option<AudioOverrides>,
    /// Keep subtitle streams in the output.
    #[serde(default)]
    pub subtitles: bool,
}

impl StartRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Set an upstream header override.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Per-request HLS overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HlsOverrides {
    pub segment_seconds: Option<u32>,
    pub window_size: Option<u32>,
    pub fragmented_mp4: Option<bool>,
}

/// Per-request audio overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AudioOverrides {
    pub bitrate_kbps: Option<u32>,
    pub stereo: Option<bool>,
    pub transcode_to_aac: Option<bool>,
    pub source_track_index: Option<u32>,
}

/// Resolve HLS options for a request.
pub fn merge_hls_options(defaults: &HlsOptions, request: Option<&HlsOverrides>) -> HlsOptions {
    let request = request.cloned().unwrap_or_default();

    HlsOptions {
        segment_seconds: request
            .segment_seconds
            .unwrap_or(defaults.segment_seconds)
            .max(MIN_SEGMENT_SECONDS),
        window_size: request
            .window_size
            .unwrap_or(defaults.window_size)
            .max(MIN_WINDOW_SIZE),
        fragmented_mp4: request.fragmented_mp4.unwrap_or(defaults.fragmented_mp4),
    }
}

/// Resolve audio options for a request.
pub fn merge_audio_options(
    defaults: &AudioOptions,
    request: Option<&AudioOverrides>,
) -> AudioOptions {
    let request = request.cloned().unwrap_or_default();
    let bitrate = request.bitrate_kbps.unwrap_or(defaults.bitrate_kbps);

    AudioOptions {
        bitrate_kbps: if (1..=MAX_AUDIO_BITRATE_KBPS).contains(&bitrate) {
            bitrate
        } else {
            DEFAULT_AUDIO_BITRATE_KBPS
        },
        stereo: request.stereo.unwrap_or(defaults.stereo),
        transcode_to_aac: request.transcode_to_aac.unwrap_or(defaults.transcode_to_aac),
        source_track_index: request
            .source_track_index
            .unwrap_or(defaults.source_track_index),
    }
}

/// Check that `source` is an absolute http(s) URL whose host passes the
/// allow-list.
pub fn validate_source(source: &str, config: &TranscodeConfig) -> Result<Url> {
    let source = source.trim();
    if source.is_empty() {
        return Err(Error::validation("Source URL is required"));
    }

    let url = Url::parse(source)
        .map_err(|_| Error::validation("Only http/https URLs are allowed"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation("Only http/https URLs are allowed"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::validation("Source URL has no host"))?;
    if !config.is_host_allowed(host) {
        return Err(Error::HostNotAllowed(host.to_string()));
    }

    Ok(url)
}

/// Look up a header override by any of `names`, ignoring ASCII case.
pub fn header_value<'a>(headers: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| names.iter().any(|name| key.eq_ignore_ascii_case(name)))
        .map(|(_, value)| value.as_str())
}

/// Strip CR and LF so a value cannot inject extra header lines. Blank results
/// become `None`.
pub fn sanitize_header(value: Option<&str>) -> Option<String> {
    let clean: String = value?.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    let clean = clean.trim();
    (!clean.is_empty()).then(|| clean.to_string())
}
