//! Dependency listing via the platform's binary introspection tool.
//!
//! The textual output of `otool -L` and `ldd` is not a stable contract:
//! banners, virtual entries, and warnings appear depending on platform and
//! toolchain version. Parsing is therefore line-oriented and tolerant; a line
//! that does not match the expected shape is skipped, never fatal.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};

use crate::error::RelocateError;
use crate::tool::{find_tool, stderr};

/// One dependency edge as declared by a binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    /// The raw reference string embedded in the referencing binary, needed
    /// verbatim for exact-match rewriting.
    pub reference: String,
    /// The on-disk path the reference resolves to.
    pub path: PathBuf,
}

impl DependencyRef {
    /// The file name a dependent would use to load this library.
    pub fn declared_name(&self) -> Option<&str> {
        Path::new(&self.reference)
            .file_name()
            .and_then(|name| name.to_str())
    }
}

/// List the shared-library references declared by a Mach-O binary, via
/// `otool -L`.
pub fn list_darwin(binary: &Path) -> Result<Vec<DependencyRef>, RelocateError> {
    let otool = find_tool("otool", "the Xcode command line tools are installed")?;
    debug!("Listing dependencies of {}", binary.display());

    let output = Command::new(otool).arg("-L").arg(binary).output()?;
    if !output.status.success() {
        return Err(RelocateError::ListFailed {
            path: binary.to_path_buf(),
            stderr: stderr(&output),
        });
    }

    Ok(parse_otool_output(&String::from_utf8_lossy(&output.stdout)))
}

/// List the shared-library references declared by an ELF binary, via `ldd`.
pub fn list_linux(binary: &Path) -> Result<Vec<DependencyRef>, RelocateError> {
    let ldd = find_tool("ldd", "a glibc toolchain is installed")?;
    debug!("Listing dependencies of {}", binary.display());

    let output = Command::new(ldd).arg(binary).output()?;
    if !output.status.success() {
        return Err(RelocateError::ListFailed {
            path: binary.to_path_buf(),
            stderr: stderr(&output),
        });
    }

    Ok(parse_ldd_output(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `otool -L` output.
///
/// Unindented lines are banners naming the inspected binary (one per
/// architecture for fat binaries). Dependency lines are indented and carry a
/// `(compatibility version ...)` suffix.
fn parse_otool_output(stdout: &str) -> Vec<DependencyRef> {
    let mut dependencies = Vec::new();

    for line in stdout.lines() {
        if !line.starts_with(['\t', ' ']) {
            continue;
        }
        let Some((reference, _)) = line.trim().split_once(" (compatibility version") else {
            trace!("Skipping unrecognized otool line: {line:?}");
            continue;
        };
        let reference = reference.trim();
        if reference.is_empty() {
            continue;
        }
        // Install names are paths; loader-relative tokens are resolved (or
        // rejected) downstream by the policy filter.
        dependencies.push(DependencyRef {
            reference: reference.to_string(),
            path: PathBuf::from(reference),
        });
    }

    dependencies
}

/// Parse `ldd` output.
///
/// The expected shape is `<soname> => <resolved path> (<load address>)`.
/// Virtual entries (`linux-vdso`), the dynamic loader's own line, unresolved
/// (`not found`) entries, and `statically linked` notices are all skipped.
fn parse_ldd_output(stdout: &str) -> Vec<DependencyRef> {
    let mut dependencies = Vec::new();

    for line in stdout.lines() {
        let line = line.trim();
        let Some((reference, target)) = line.split_once("=>") else {
            // The loader line (`/lib64/ld-linux-x86-64.so.2 (0x...)`) and any
            // other noise.
            trace!("Skipping unrecognized ldd line: {line:?}");
            continue;
        };

        let target = target.trim();
        if target.starts_with("not found") {
            trace!("Skipping unresolved dependency: {line:?}");
            continue;
        }

        let path = target
            .split(" (")
            .next()
            .unwrap_or(target)
            .trim();
        if path.is_empty() || path.starts_with('(') {
            // vdso entries resolve to an address with no backing file.
            continue;
        }

        let reference = reference.trim();
        if reference.is_empty() {
            continue;
        }

        dependencies.push(DependencyRef {
            reference: reference.to_string(),
            path: PathBuf::from(path),
        });
    }

    dependencies
}
