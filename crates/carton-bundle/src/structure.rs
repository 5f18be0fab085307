//! The on-disk skeleton a relocation run writes into.

use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;

/// The directory layout of an app bundle: an executable directory, a library
/// directory, and a resources directory (opaque to the relocation engine).
///
/// Every search path the engine embeds is expressed relative to the
/// consuming binary's own directory, never to `root`, so the tree stays
/// relocatable as a whole.
#[derive(Debug, Clone)]
pub struct BundleStructure {
    root: PathBuf,
    executable_dir: PathBuf,
    library_dir: PathBuf,
    resources_dir: PathBuf,
}

impl BundleStructure {
    /// The Darwin app-bundle layout:
    /// `Name.app/Contents/{MacOS,Frameworks,Resources}`.
    pub fn darwin(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let contents = root.join("Contents");
        Self {
            executable_dir: contents.join("MacOS"),
            library_dir: contents.join("Frameworks"),
            resources_dir: contents.join("Resources"),
            root,
        }
    }

    /// The Linux application-directory layout: `usr/{bin,lib,share}`.
    pub fn linux(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let usr = root.join("usr");
        Self {
            executable_dir: usr.join("bin"),
            library_dir: usr.join("lib"),
            resources_dir: usr.join("share"),
            root,
        }
    }

    /// Materialize the skeleton on disk. Existing directories are kept.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.executable_dir)?;
        fs::create_dir_all(&self.library_dir)?;
        fs::create_dir_all(&self.resources_dir)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Holds the main binary and any additional executable dependents.
    pub fn executable_dir(&self) -> &Path {
        &self.executable_dir
    }

    /// Holds relocated libraries, flat, under platform-conventional names.
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Opaque to the relocation engine.
    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }
}
