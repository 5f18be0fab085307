//! The relocation engine: walk a binary's dependency graph, copy each
//! eligible library into the bundle exactly once, and rewrite every
//! load-path reference relative to its consumer.

use std::path::{Path, PathBuf};

use fs_err as fs;
use pathdiff::diff_paths;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::RelocateError;
use crate::platform::Platform;

/// The libraries already processed in one relocation run.
///
/// Keyed by resolved real path: the same library may be reachable through
/// several symbolic or relative paths and must be copied exactly once. The
/// reverse map (bundled name to real path) is the collision detector: two
/// distinct real paths claiming the same destination name would silently
/// shadow each other and only fail at launch.
///
/// Grows monotonically over the run and is discarded with it.
#[derive(Debug, Default)]
struct VisitedSet {
    by_path: FxHashMap<PathBuf, String>,
    by_name: FxHashMap<String, PathBuf>,
}

impl VisitedSet {
    /// The bundled name `real` was established under, if already processed.
    fn bundled_name(&self, real: &Path) -> Option<&str> {
        self.by_path.get(real).map(String::as_str)
    }

    /// Record `real` as bundled under `name`.
    fn insert(&mut self, real: PathBuf, name: String) -> Result<(), RelocateError> {
        if let Some(first) = self.by_name.get(&name) {
            if first != &real {
                return Err(RelocateError::NameCollision {
                    name,
                    first: first.clone(),
                    second: real,
                });
            }
        }
        self.by_name.insert(name.clone(), real.clone());
        self.by_path.insert(real, name);
        Ok(())
    }
}

/// One relocation run writing into a single library directory.
///
/// A run may cover several top-level binaries (e.g. every executable in a
/// bundle); the visited set spans all of them, so a library shared between
/// two executables still travels once.
pub struct Relocator<'a, P: Platform> {
    platform: &'a P,
    library_dir: PathBuf,
    visited: VisitedSet,
}

impl<'a, P: Platform> Relocator<'a, P> {
    pub fn new(platform: &'a P, library_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            library_dir: library_dir.into(),
            visited: VisitedSet::default(),
        }
    }

    /// Make `binary` self-contained: copy its eligible transitive
    /// dependencies into the library directory and rewrite its references,
    /// then point its default search path at the library directory.
    ///
    /// `origin` is the directory the rewritten references are expressed
    /// relative to; it is the binary's final parent directory inside the
    /// bundle.
    pub fn relocate(&mut self, binary: &Path, origin: &Path) -> Result<(), RelocateError> {
        debug!("Relocating dependencies of {}", binary.display());

        self.walk(binary, origin)?;

        let relative = self.relative_library_dir(origin)?;
        self.platform.set_default_search_path(binary, &relative)
    }

    /// Depth-first walk over the dependency graph.
    ///
    /// The worklist is explicit and the visited set, not the worklist, is the
    /// termination argument: a library is marked visited before its copy is
    /// queued, so cycles and diamonds converge.
    fn walk(&mut self, binary: &Path, origin: &Path) -> Result<(), RelocateError> {
        let mut worklist: Vec<(PathBuf, PathBuf)> =
            vec![(binary.to_path_buf(), origin.to_path_buf())];

        while let Some((current, origin)) = worklist.pop() {
            let current_real = fs::canonicalize(&current)?;

            for dep in self.platform.list_dependencies(&current)? {
                if !self.platform.eligible(&dep) {
                    trace!("Leaving {} for the host loader", dep.reference);
                    continue;
                }

                let real = fs::canonicalize(&dep.path)?;
                if real == current_real {
                    // A library's own install identity shows up in its
                    // dependency listing on some platforms; not an edge.
                    continue;
                }

                let name = match self.visited.bundled_name(&real) {
                    Some(name) => name.to_string(),
                    None => {
                        let Some(name) = dep.declared_name() else {
                            trace!("Skipping {} (no usable file name)", dep.reference);
                            continue;
                        };
                        let name = name.to_string();
                        // Visited before the copy is walked, so cycles
                        // terminate.
                        self.visited.insert(real.clone(), name.clone())?;

                        let dest = self.library_dir.join(&name);
                        copy_if_changed(&real, &dest)?;
                        self.platform.finish_library(&dest, &name)?;
                        // The copy's own dependencies land in the same
                        // library directory, expressed relative to it.
                        worklist.push((dest, self.library_dir.clone()));
                        name
                    }
                };

                let relative = self.relative_library_dir(&origin)?;
                let new_reference = self.platform.format_reference(&relative, &name);
                if new_reference != dep.reference {
                    self.platform
                        .rewrite_reference(&current, &dep.reference, &new_reference)?;
                }
            }
        }

        Ok(())
    }

    /// The library directory expressed relative to `origin`.
    ///
    /// A library directory that cannot be reached relatively is fatal: the
    /// bundle could not survive being moved, and must not be produced
    /// silently broken.
    fn relative_library_dir(&self, origin: &Path) -> Result<PathBuf, RelocateError> {
        let relative = diff_paths(&self.library_dir, origin).ok_or_else(|| {
            RelocateError::UnrelatablePath {
                target: self.library_dir.clone(),
                origin: origin.to_path_buf(),
            }
        })?;
        if relative.as_os_str().is_empty() {
            Ok(PathBuf::from("."))
        } else {
            Ok(relative)
        }
    }
}

/// Copy `src` to `dest` unless `dest` already has identical contents.
///
/// `src` is a resolved real path, so the file itself travels, never a
/// symlink. Skipping unchanged destinations keeps re-runs byte-identical.
fn copy_if_changed(src: &Path, dest: &Path) -> Result<(), RelocateError> {
    if src == dest {
        return Ok(());
    }

    if dest.exists() {
        if fs::metadata(src)?.len() == fs::metadata(dest)?.len() && fs::read(src)? == fs::read(dest)?
        {
            trace!("Skipping copy of {} (unchanged)", src.display());
            return Ok(());
        }
    }

    trace!("Copying {} to {}", src.display(), dest.display());
    fs::copy(src, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn visited_set_is_keyed_by_real_path() {
        let mut visited = VisitedSet::default();
        visited
            .insert(PathBuf::from("/real/liba.so.1.2"), "liba.so.1".to_string())
            .unwrap();

        assert_eq!(
            visited.bundled_name(Path::new("/real/liba.so.1.2")),
            Some("liba.so.1")
        );
        assert_eq!(visited.bundled_name(Path::new("/real/libb.so.1")), None);
    }

    #[test]
    fn visited_set_accepts_reinsertion_of_same_path() {
        let mut visited = VisitedSet::default();
        visited
            .insert(PathBuf::from("/real/liba.so"), "liba.so".to_string())
            .unwrap();
        visited
            .insert(PathBuf::from("/real/liba.so"), "liba.so".to_string())
            .unwrap();

        assert_eq!(visited.bundled_name(Path::new("/real/liba.so")), Some("liba.so"));
    }

    #[test]
    fn visited_set_rejects_name_collisions() {
        let mut visited = VisitedSet::default();
        visited
            .insert(PathBuf::from("/a/liba.so"), "liba.so".to_string())
            .unwrap();

        let err = visited
            .insert(PathBuf::from("/b/liba.so"), "liba.so".to_string())
            .unwrap_err();
        assert!(matches!(err, RelocateError::NameCollision { .. }));
    }
}
