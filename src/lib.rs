//! hlsrelay - on-demand HLS repackaging of remote media sources
//!
//! This library crate exposes the orchestrator for embedding and integration
//! testing.

pub mod config;
pub mod transcode;
