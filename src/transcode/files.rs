//! Safe lookup of generated files inside a job workspace.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use hlsrelay_common::{Error, Result};
use regex::Regex;

const SAFE_NAME_PATTERN: &str = r"^[A-Za-z0-9_.-]+$";

fn safe_name() -> &'static Regex {
    static SAFE_NAME: OnceLock<Regex> = OnceLock::new();
    SAFE_NAME.get_or_init(|| Regex::new(SAFE_NAME_PATTERN).expect("static pattern is valid"))
}

/// Check that `name` is a single plain file name.
///
/// Only ASCII letters, digits, `_`, `.` and `-` are allowed, which rules out
/// separators and percent-encoded sequences. Names made only of dots are
/// rejected as well.
pub fn validate_file_name(name: &str) -> Result<()> {
    if !safe_name().is_match(name) {
        return Err(Error::validation(format!("Invalid file name: {name:?}")));
    }
    if name.chars().all(|c| c == '.') {
        return Err(Error::validation(format!("Invalid file name: {name:?}")));
    }
    Ok(())
}

/// Resolve `name` inside `workspace`, following symlinks, and make sure the
/// result is still under the workspace.
pub async fn resolve_in_workspace(workspace: &Path, name: &str) -> Result<PathBuf> {
    validate_file_name(name)?;

    let root = tokio::fs::canonicalize(workspace)
        .await
        .map_err(|_| Error::not_found("workspace", workspace.display()))?;
    let candidate = tokio::fs::canonicalize(root.join(name))
        .await
        .map_err(|_| Error::not_found("file", name))?;

    if !candidate.starts_with(&root) || candidate == root {
        return Err(Error::validation(format!(
            "File escapes job workspace: {name:?}"
        )));
    }

    Ok(candidate)
}
