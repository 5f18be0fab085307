//! Load-path metadata rewriting and code signing via platform tools.
//!
//! All mutations are in-place edits of a binary's embedded metadata, driven
//! through `install_name_tool` and `codesign` on Darwin and `patchelf` on
//! Linux. On Darwin, every successful mutation invalidates the binary's code
//! signature, so each is followed by an ad-hoc re-sign; a mutated, unsigned
//! library fails to load and the breakage would only surface at launch on
//! the target machine.

use std::path::Path;
use std::process::Command;

use tracing::trace;

use crate::binary;
use crate::error::RelocateError;
use crate::tool::{find_tool, stderr};

const XCODE_HINT: &str = "the Xcode command line tools are installed";
const PATCHELF_HINT: &str = "patchelf is installed and on your PATH";

/// Rewrite one dependency reference in a Mach-O binary.
pub fn change_reference(path: &Path, old: &str, new: &str) -> Result<(), RelocateError> {
    trace!("Rewriting {old} -> {new} in {}", path.display());

    let tool = find_tool("install_name_tool", XCODE_HINT)?;
    let output = Command::new(tool)
        .args(["-change", old, new])
        .arg(path)
        .output()?;

    if output.status.success() {
        sign_adhoc(path)
    } else {
        Err(RelocateError::PatchFailed {
            path: path.to_path_buf(),
            old: old.to_string(),
            new: new.to_string(),
            stderr: stderr(&output),
        })
    }
}

/// Change the install id (`LC_ID_DYLIB`) of a Mach-O library.
pub fn change_install_id(path: &Path, new_id: &str) -> Result<(), RelocateError> {
    trace!("Changing install id of {} to {new_id}", path.display());

    let tool = find_tool("install_name_tool", XCODE_HINT)?;
    let output = Command::new(tool).args(["-id", new_id]).arg(path).output()?;

    if output.status.success() {
        sign_adhoc(path)
    } else {
        Err(RelocateError::InstallIdFailed {
            path: path.to_path_buf(),
            id: new_id.to_string(),
            stderr: stderr(&output),
        })
    }
}

/// Add a runtime search path to a Mach-O binary.
///
/// An rpath that is already present is a no-op rather than an error, so
/// re-running a relocation over an existing bundle stays idempotent.
pub fn add_rpath(path: &Path, rpath: &str) -> Result<(), RelocateError> {
    if binary::read_macho_metadata(path)?
        .rpaths
        .iter()
        .any(|existing| existing == rpath)
    {
        return Ok(());
    }

    trace!("Adding rpath {rpath} to {}", path.display());

    let tool = find_tool("install_name_tool", XCODE_HINT)?;
    let output = Command::new(tool)
        .args(["-add_rpath", rpath])
        .arg(path)
        .output()?;

    if output.status.success() {
        sign_adhoc(path)
    } else {
        let stderr = stderr(&output);
        if stderr.contains("would duplicate path") {
            return Ok(());
        }
        Err(RelocateError::SearchPathFailed {
            path: path.to_path_buf(),
            search_path: rpath.to_string(),
            stderr,
        })
    }
}

/// Delete a runtime search path from a Mach-O binary.
pub fn delete_rpath(path: &Path, rpath: &str) -> Result<(), RelocateError> {
    trace!("Deleting rpath {rpath} from {}", path.display());

    let tool = find_tool("install_name_tool", XCODE_HINT)?;
    let output = Command::new(tool)
        .args(["-delete_rpath", rpath])
        .arg(path)
        .output()?;

    if output.status.success() {
        sign_adhoc(path)
    } else {
        Err(RelocateError::SearchPathFailed {
            path: path.to_path_buf(),
            search_path: rpath.to_string(),
            stderr: stderr(&output),
        })
    }
}

/// Remove absolute rpaths from a Mach-O binary.
///
/// Absolute rpaths point at the build machine and are meaningless once the
/// bundle moves; loader-relative (`@`-token) rpaths are kept.
pub fn sanitize_rpaths(path: &Path) -> Result<(), RelocateError> {
    for rpath in binary::read_macho_metadata(path)?.rpaths {
        if !rpath.starts_with('@') && Path::new(&rpath).is_absolute() {
            delete_rpath(path, &rpath)?;
        }
    }
    Ok(())
}

/// Apply an ad-hoc code signature to a binary.
///
/// Forcefully replaces any existing signature; required after any metadata
/// mutation, which invalidates the signature the binary carried.
pub fn sign_adhoc(path: &Path) -> Result<(), RelocateError> {
    trace!("Applying ad-hoc code signature to {}", path.display());

    let tool = find_tool("codesign", XCODE_HINT)?;
    let output = Command::new(tool)
        .args(["--force", "--sign", "-"])
        .arg(path)
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(RelocateError::SignFailed {
            path: path.to_path_buf(),
            stderr: stderr(&output),
        })
    }
}

/// Replace one `DT_NEEDED` entry in an ELF binary.
pub fn replace_needed(path: &Path, old: &str, new: &str) -> Result<(), RelocateError> {
    trace!("Rewriting {old} -> {new} in {}", path.display());

    let tool = find_tool("patchelf", PATCHELF_HINT)?;
    let output = Command::new(tool)
        .args(["--replace-needed", old, new])
        .arg(path)
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(RelocateError::PatchFailed {
            path: path.to_path_buf(),
            old: old.to_string(),
            new: new.to_string(),
            stderr: stderr(&output),
        })
    }
}

/// Set the `DT_RUNPATH` of an ELF binary.
///
/// Skips the rewrite when the binary already carries the requested runpath,
/// so re-running a relocation leaves the bytes untouched.
pub fn set_runpath(path: &Path, runpath: &str) -> Result<(), RelocateError> {
    let tool = find_tool("patchelf", PATCHELF_HINT)?;

    let current = Command::new(&tool).arg("--print-rpath").arg(path).output()?;
    if current.status.success() && String::from_utf8_lossy(&current.stdout).trim() == runpath {
        return Ok(());
    }

    trace!("Setting runpath of {} to {runpath}", path.display());

    let output = Command::new(&tool)
        .args(["--set-rpath", runpath])
        .arg(path)
        .output()?;

    if output.status.success() {
        Ok(())
    } else {
        Err(RelocateError::SearchPathFailed {
            path: path.to_path_buf(),
            search_path: runpath.to_string(),
            stderr: stderr(&output),
        })
    }
}
