//! On-demand HLS transcoding.
//!
//! [`Orchestrator`] turns a remote media URL into a live HLS playlist by
//! supervising one transcoder process per job. Jobs are addressed by signed
//! tokens ([`TokenCodec`]), stopped when nobody has requested them for the
//! idle timeout, and can be restarted at a new offset without changing their
//! token or output location.

mod context;
mod files;
mod invocation;
mod job;
mod options;
mod orchestrator;
mod process;
mod tasks;
mod token;

pub use context::{StartContext, INIT_SEGMENT_NAME, PLAYLIST_NAME};
pub use files::{resolve_in_workspace, validate_file_name};
pub use invocation::Invocation;
pub use job::{Job, JobLog, JobStatus, LOG_CAPACITY, LOG_LINE_MAX_CHARS};
pub use options::{
    merge_audio_options, merge_hls_options, sanitize_header, validate_source, AudioOverrides,
    HlsOverrides, StartRequest, DEFAULT_USER_AGENT,
};
pub use orchestrator::Orchestrator;
pub use process::{ProcessExit, TranscoderProcess, STOP_GRACE};
pub use tasks::WATCHDOG_TICK;
pub use token::TokenCodec;
