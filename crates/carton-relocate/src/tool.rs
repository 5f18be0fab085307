//! Locating the external tools the engine drives.

use std::path::PathBuf;
use std::process::Output;

use crate::error::RelocateError;

/// Locate `tool` on `PATH`.
///
/// A missing tool is a configuration error on the build machine, so the
/// failure carries remediation text rather than a bare lookup error.
pub(crate) fn find_tool(
    tool: &'static str,
    install_hint: &'static str,
) -> Result<PathBuf, RelocateError> {
    which::which(tool).map_err(|err| match err {
        which::Error::CannotFindBinaryPath => RelocateError::ToolNotFound { tool, install_hint },
        err => RelocateError::ToolLookup(err),
    })
}

/// The captured diagnostic text of a finished subprocess.
pub(crate) fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
