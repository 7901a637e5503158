//! hlsrelay-common: shared error type and identifiers.
//!
//! This crate provides the pieces used by every layer of hlsrelay:
//!
//! - **Typed IDs**: [`JobId`], the internal identifier of a transcoding job
//! - **Error Handling**: the classified [`Error`] returned by orchestrator
//!   operations and its [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use hlsrelay_common::{Error, JobId, Result};
//!
//! let id = JobId::new();
//! assert_eq!(id.to_string().len(), 32);
//!
//! fn lookup(id: JobId) -> Result<()> {
//!     Err(Error::job_not_found(id))
//! }
//! assert!(lookup(id).is_err());
//! ```

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::*;
