//! Per-platform relocation capabilities.
//!
//! The engine is generic over a [`Platform`]: the surface that differs
//! between targets, i.e. how dependencies are listed, which of them are
//! eligible, how a bundled reference is spelled, and what has to happen to a
//! binary after its metadata changed. One concrete implementation exists per
//! target, selected once at the start of a bundling operation.

use std::path::Path;

use crate::binary;
use crate::error::RelocateError;
use crate::list::{self, DependencyRef};
use crate::patch;
use crate::policy::RelocationPolicy;

pub trait Platform {
    /// List the shared-library references declared by `binary`.
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<DependencyRef>, RelocateError>;

    /// Whether `dep` is eligible for relocation.
    fn eligible(&self, dep: &DependencyRef) -> bool;

    /// The reference a binary uses to reach a bundled library, given the
    /// relative path from the binary's own directory to the library
    /// directory.
    fn format_reference(&self, relative: &Path, name: &str) -> String;

    /// Rewrite one declared reference in `binary`, in place. The old
    /// reference must match exactly; the rewrite is a no-op if it is absent.
    fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<(), RelocateError>;

    /// Record a freshly copied library's own bundled identity and strip
    /// whatever build-machine residue the platform considers harmful.
    fn finish_library(&self, library: &Path, name: &str) -> Result<(), RelocateError>;

    /// Point the binary's default library search path at the library
    /// directory, expressed relative to the binary's own directory. This is
    /// distinct from per-dependency rewriting: it governs where the loader
    /// looks by default.
    fn set_default_search_path(
        &self,
        binary: &Path,
        relative: &Path,
    ) -> Result<(), RelocateError>;
}

/// Darwin: `otool` / `install_name_tool` / `codesign`, system-path exclusion,
/// ad-hoc re-signing after every mutation.
#[derive(Debug, Clone)]
pub struct DarwinPlatform {
    policy: RelocationPolicy,
    sanitize_rpaths: bool,
}

impl DarwinPlatform {
    pub fn new() -> Self {
        Self {
            policy: RelocationPolicy::ExcludeSystem,
            sanitize_rpaths: true,
        }
    }

    /// Bundle every non-internal dependency, system libraries included.
    pub fn standalone() -> Self {
        Self {
            policy: RelocationPolicy::Standalone,
            sanitize_rpaths: true,
        }
    }

    /// Keep absolute rpaths on relocated libraries instead of stripping them.
    #[must_use]
    pub fn keep_rpaths(mut self) -> Self {
        self.sanitize_rpaths = false;
        self
    }
}

impl Default for DarwinPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for DarwinPlatform {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<DependencyRef>, RelocateError> {
        list::list_darwin(binary)
    }

    fn eligible(&self, dep: &DependencyRef) -> bool {
        self.policy.eligible(dep)
    }

    fn format_reference(&self, relative: &Path, name: &str) -> String {
        if relative == Path::new(".") {
            format!("@loader_path/{name}")
        } else {
            format!("@loader_path/{}/{name}", relative.display())
        }
    }

    fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<(), RelocateError> {
        patch::change_reference(binary, old, new)
    }

    fn finish_library(&self, library: &Path, name: &str) -> Result<(), RelocateError> {
        let new_id = format!("@loader_path/{name}");
        if binary::read_macho_metadata(library)?.install_id.as_deref() != Some(new_id.as_str()) {
            patch::change_install_id(library, &new_id)?;
        }
        if self.sanitize_rpaths {
            patch::sanitize_rpaths(library)?;
        }
        Ok(())
    }

    fn set_default_search_path(
        &self,
        binary: &Path,
        relative: &Path,
    ) -> Result<(), RelocateError> {
        let rpath = if relative == Path::new(".") {
            "@loader_path".to_string()
        } else {
            format!("@loader_path/{}", relative.display())
        };
        patch::add_rpath(binary, &rpath)
    }
}

/// Linux: `ldd` / `patchelf`, allow-list policy, no signing requirement.
///
/// Rewritten references stay bare sonames; the "relative to the consuming
/// binary" part lives in the binary's `$ORIGIN`-based runpath, which is how
/// the Linux loader expresses it.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    policy: RelocationPolicy,
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self {
            policy: RelocationPolicy::default_allow_list(),
        }
    }

    /// An allow-list of the caller's own choosing.
    pub fn with_allowed_libraries(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            policy: RelocationPolicy::allow_list(names),
        }
    }
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for LinuxPlatform {
    fn list_dependencies(&self, binary: &Path) -> Result<Vec<DependencyRef>, RelocateError> {
        list::list_linux(binary)
    }

    fn eligible(&self, dep: &DependencyRef) -> bool {
        self.policy.eligible(dep)
    }

    fn format_reference(&self, _relative: &Path, name: &str) -> String {
        name.to_string()
    }

    fn rewrite_reference(&self, binary: &Path, old: &str, new: &str) -> Result<(), RelocateError> {
        patch::replace_needed(binary, old, new)
    }

    fn finish_library(&self, library: &Path, _name: &str) -> Result<(), RelocateError> {
        // Bundled libraries resolve their own bundled dependencies as flat
        // siblings.
        patch::set_runpath(library, "$ORIGIN")
    }

    fn set_default_search_path(
        &self,
        binary: &Path,
        relative: &Path,
    ) -> Result<(), RelocateError> {
        let runpath = if relative == Path::new(".") {
            "$ORIGIN".to_string()
        } else {
            format!("$ORIGIN/{}", relative.display())
        };
        patch::set_runpath(binary, &runpath)
    }
}
