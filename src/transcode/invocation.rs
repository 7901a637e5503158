//! Mapping from a [`StartContext`] to a transcoder command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::context::{StartContext, INIT_SEGMENT_NAME};

const MIN_AAC_BITRATE_KBPS: u32 = 32;
const MAX_AAC_BITRATE_KBPS: u32 = 512;

/// A fully built transcoder command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
}

impl Invocation {
    /// Create an empty invocation of `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Build the HLS transcode command for `ctx`. Performs no I/O.
    pub fn build(program: &Path, ctx: &StartContext) -> Self {
        let mut inv = Self::new(program);

        inv.arg("-hide_banner");
        inv.args(["-user_agent", ctx.user_agent.as_str()]);
        if let Some(referer) = &ctx.referer {
            inv.arg("-headers").arg(format!("Referer: {referer}\r\n"));
        }
        inv.arg("-re");
        if ctx.seek_secs > 0 {
            inv.arg("-ss").arg(ctx.seek_secs.to_string());
        }
        inv.args(["-threads", "0", "-fflags", "+genpts"]);
        inv.arg("-i").arg(ctx.source.as_str());

        inv.args(["-map", "0:v:0"]);
        inv.arg("-map")
            .arg(format!("0:a:{}", ctx.audio.source_track_index));
        if !ctx.subtitles {
            inv.arg("-sn");
        }
        inv.args(["-dn", "-map_metadata", "-1", "-map_chapters", "-1"]);

        inv.args(["-c:v", "copy"]);
        if ctx.audio.transcode_to_aac {
            let channels = if ctx.audio.stereo { "2" } else { "1" };
            let bitrate = ctx
                .audio
                .bitrate_kbps
                .clamp(MIN_AAC_BITRATE_KBPS, MAX_AAC_BITRATE_KBPS);
            inv.args(["-c:a", "aac", "-ac", channels]);
            inv.arg("-b:a").arg(format!("{bitrate}k"));
            inv.args(["-profile:a", "aac_low"]);
        } else {
            inv.args(["-c:a", "copy"]);
        }

        inv.args(["-avoid_negative_ts", "disabled"]);
        inv.args(["-max_muxing_queue_size", "2048"]);
        inv.args(["-f", "hls", "-max_delay", "5000000"]);

        if ctx.hls.fragmented_mp4 {
            inv.args(["-hls_segment_type", "fmp4"]);
        } else {
            inv.args(["-hls_segment_type", "mpegts", "-bsf:v", "h264_mp4toannexb"]);
        }
        inv.arg("-hls_time").arg(ctx.hls.segment_seconds.to_string());
        inv.args(["-hls_flags", "append_list+omit_endlist+delete_segments"]);
        inv.arg("-hls_list_size").arg(ctx.hls.window_size.to_string());
        if ctx.hls.fragmented_mp4 {
            inv.args(["-hls_fmp4_init_filename", INIT_SEGMENT_NAME]);
        }
        inv.arg("-hls_segment_filename")
            .arg(ctx.segment_pattern().to_string_lossy());
        inv.arg("-y").arg(ctx.playlist.to_string_lossy());

        inv
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Program name for log messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Tokio command with piped stdin/stderr, running in its own process
    /// group on unix.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}
