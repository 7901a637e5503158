//! Typed identifiers for hlsrelay.
//!
//! [`JobId`] wraps 128 random bits. Its canonical text form is 32 lowercase
//! hex characters without separators, which is also the prefix of every public
//! stream token and the name of the job's workspace directory.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of the canonical text form of a [`JobId`].
pub const JOB_ID_LEN: usize = 32;

/// Internal identifier of a transcoding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new job ID from 128 bits of randomness.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::from_bytes(rand::random::<[u8; 16]>()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<JobId> for Uuid {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Error returned when text is not a canonical job id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id")]
pub struct ParseJobIdError;

impl FromStr for JobId {
    type Err = ParseJobIdError;

    /// Parse the canonical 32-character hex form only; hyphenated and braced
    /// UUID forms are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != JOB_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseJobIdError);
        }
        Uuid::parse_str(s).map(Self).map_err(|_| ParseJobIdError)
    }
}
