//! Composing a finished bundle: skeleton, executable install, relocation.

use std::path::{Path, PathBuf};

use fs_err as fs;
use tracing::debug;
use walkdir::WalkDir;

use carton_relocate::{Platform, Relocator, binary};

use crate::BundleError;
use crate::structure::BundleStructure;

/// Builds a self-contained bundle around a prebuilt executable.
///
/// The caller stages resources and any helper executables into the skeleton
/// between [`BundleStructure::create`] and [`Bundler::bundle`], or simply
/// hands over a single executable; either way, every dynamic binary found in
/// the executable directory is relocated over one shared visited set, so a
/// library referenced by several executables travels once.
#[derive(Debug)]
pub struct Bundler<P> {
    platform: P,
    structure: BundleStructure,
}

impl<P: Platform> Bundler<P> {
    pub fn new(platform: P, structure: BundleStructure) -> Self {
        Self {
            platform,
            structure,
        }
    }

    pub fn structure(&self) -> &BundleStructure {
        &self.structure
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Create the skeleton, install `executable`, and make every dynamic
    /// binary staged in the executable directory self-contained.
    ///
    /// Returns the installed executable's path inside the bundle.
    pub fn bundle(&self, executable: &Path) -> Result<PathBuf, BundleError> {
        debug!(
            "Bundling {} into {}",
            executable.display(),
            self.structure.root().display()
        );

        self.structure.create()?;
        let installed = self.install_executable(executable)?;
        self.relocate_all()?;
        Ok(installed)
    }

    /// Copy `executable` into the executable directory under its own name,
    /// keeping it executable.
    fn install_executable(&self, executable: &Path) -> Result<PathBuf, BundleError> {
        let Some(name) = executable.file_name() else {
            return Err(BundleError::InvalidExecutable {
                path: executable.to_path_buf(),
            });
        };

        let dest = self.structure.executable_dir().join(name);
        fs::copy(executable, &dest)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut permissions = fs::metadata(&dest)?.permissions();
            permissions.set_mode(permissions.mode() | 0o755);
            fs::set_permissions(&dest, permissions)?;
        }

        Ok(dest)
    }

    /// Relocate every dynamic binary under the executable directory.
    fn relocate_all(&self) -> Result<(), BundleError> {
        let mut relocator = Relocator::new(&self.platform, self.structure.library_dir());

        for binary_path in find_binaries(self.structure.executable_dir())? {
            let origin = binary_path
                .parent()
                .unwrap_or_else(|| self.structure.executable_dir())
                .to_path_buf();
            relocator.relocate(&binary_path, &origin)?;
        }

        Ok(())
    }
}

/// Find all dynamic binaries under `dir`, by magic bytes rather than by file
/// extension: bundle executables have none, and staged helper scripts must
/// not be mistaken for binaries.
fn find_binaries(dir: &Path) -> Result<Vec<PathBuf>, BundleError> {
    let mut binaries = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if binary::is_dynamic_binary(entry.path())? {
            binaries.push(entry.path().to_path_buf());
        }
    }

    Ok(binaries)
}

#[cfg(test)]
mod tests {
    use fs_err as fs;
    use tempfile::TempDir;

    use super::*;

    fn write_elf_stub(path: &Path) {
        let mut bytes = [0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[6] = 1;
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn find_binaries_goes_by_magic_not_extension() {
        let temp_dir = TempDir::new().unwrap();
        write_elf_stub(&temp_dir.path().join("app"));
        fs::write(temp_dir.path().join("launcher.sh"), "#!/bin/sh\n").unwrap();
        fs::write(temp_dir.path().join("data.so"), "not a binary").unwrap();

        let binaries = find_binaries(temp_dir.path()).unwrap();
        assert_eq!(binaries, [temp_dir.path().join("app")]);
    }

    #[test]
    fn find_binaries_recurses() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("tools");
        fs::create_dir_all(&nested).unwrap();
        write_elf_stub(&nested.join("helper"));

        let binaries = find_binaries(temp_dir.path()).unwrap();
        assert_eq!(binaries, [nested.join("helper")]);
    }
}
