//! Eligibility policy: which discovered dependencies travel inside the
//! bundle.
//!
//! The policies differ structurally by platform. On Linux, arbitrary
//! third-party libraries frequently break when relocated (hard-coded data
//! paths, GUI toolkit plugin discovery), so only an allow-list of known-safe
//! runtime libraries is ever bundled and everything else is left to the host
//! loader. On Darwin the inverse holds: everything is bundled except the
//! OS-owned trees that every machine provides.

use crate::list::DependencyRef;

/// Libraries the Linux allow-list policy bundles by default: the language
/// runtime's own support libraries and a small set of core dependencies that
/// are known to relocate cleanly.
pub const DEFAULT_ALLOWED_LIBRARIES: &[&str] = &[
    "libstdc++",
    "libgcc_s",
    "libssl",
    "libcrypto",
    "libz",
    "libbz2",
    "liblzma",
    "libzstd",
    "libffi",
    "libpcre2-8",
    "libsqlite3",
    "libcrypt",
    "libuuid",
];

/// Library prefixes that every Darwin machine provides; never bundled.
pub const SYSTEM_PREFIXES: &[&str] = &["/usr/lib", "/System"];

/// References already expressed through a loader-relative token were rewritten
/// by a previous pass and are not candidates again.
//
// TODO: resolve `@rpath/` references through the binary's `LC_RPATH` entries
// instead of treating them as already bundled.
const INTERNAL_MARKERS: &[&str] = &["@executable_path/", "@loader_path/", "@rpath/"];

/// Decides, per discovered dependency, whether it is eligible for relocation.
#[derive(Debug, Clone)]
pub enum RelocationPolicy {
    /// Bundle only libraries whose base name is on the allow-list.
    AllowList { names: Vec<String> },
    /// Bundle everything outside the OS-owned prefixes.
    ExcludeSystem,
    /// Bundle every dependency that is not already inside the bundle, system
    /// libraries included. Trades portability risk for true hermeticity.
    Standalone,
}

impl RelocationPolicy {
    /// The allow-list policy over [`DEFAULT_ALLOWED_LIBRARIES`].
    pub fn default_allow_list() -> Self {
        Self::allow_list(DEFAULT_ALLOWED_LIBRARIES.iter().copied())
    }

    /// An allow-list policy over caller-provided library base names.
    pub fn allow_list(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::AllowList {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `dep` is eligible for relocation under this policy.
    pub fn eligible(&self, dep: &DependencyRef) -> bool {
        if INTERNAL_MARKERS
            .iter()
            .any(|marker| dep.reference.starts_with(marker))
        {
            return false;
        }

        match self {
            Self::AllowList { names } => {
                let Some(file_name) = dep.path.file_name().and_then(|name| name.to_str()) else {
                    return false;
                };
                let base = base_name(file_name);
                names.iter().any(|name| name == base)
            }
            Self::ExcludeSystem => !SYSTEM_PREFIXES
                .iter()
                .any(|prefix| dep.path.starts_with(prefix)),
            Self::Standalone => true,
        }
    }
}

/// The library name with its suffix chain removed: `libssl.so.3`,
/// `libssl.so`, and `libssl.so.1.1` all yield `libssl`.
fn base_name(file_name: &str) -> &str {
    file_name
        .split_once(".so")
        .map_or(file_name, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn dep(reference: &str) -> DependencyRef {
        DependencyRef {
            reference: reference.to_string(),
            path: PathBuf::from(reference),
        }
    }

    fn resolved(reference: &str, path: &str) -> DependencyRef {
        DependencyRef {
            reference: reference.to_string(),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn base_name_strips_version_chains() {
        assert_eq!(base_name("libssl.so.3"), "libssl");
        assert_eq!(base_name("libssl.so"), "libssl");
        assert_eq!(base_name("libstdc++.so.6.0.32"), "libstdc++");
        assert_eq!(base_name("libpcre2-8.so.0"), "libpcre2-8");
        assert_eq!(base_name("app"), "app");
    }

    #[test]
    fn allow_list_matches_base_names_exactly() {
        let policy = RelocationPolicy::allow_list(["libssl", "libz"]);

        assert!(policy.eligible(&resolved("libssl.so.3", "/usr/lib/libssl.so.3")));
        assert!(policy.eligible(&resolved("libz.so.1", "/usr/lib/libz.so.1")));
        // `libzstd` must not match the `libz` entry.
        assert!(!policy.eligible(&resolved("libzstd.so.1", "/usr/lib/libzstd.so.1")));
        assert!(!policy.eligible(&resolved("libgtk-3.so.0", "/usr/lib/libgtk-3.so.0")));
    }

    #[test]
    fn default_allow_list_excludes_libc() {
        let policy = RelocationPolicy::default_allow_list();
        assert!(!policy.eligible(&resolved("libc.so.6", "/lib/x86_64-linux-gnu/libc.so.6")));
        assert!(policy.eligible(&resolved(
            "libstdc++.so.6",
            "/usr/lib/x86_64-linux-gnu/libstdc++.so.6"
        )));
    }

    #[test]
    fn exclude_system_skips_os_prefixes() {
        let policy = RelocationPolicy::ExcludeSystem;

        assert!(!policy.eligible(&dep("/usr/lib/libSystem.B.dylib")));
        assert!(!policy.eligible(&dep(
            "/System/Library/Frameworks/CoreFoundation.framework/Versions/A/CoreFoundation"
        )));
        assert!(policy.eligible(&dep("/usr/local/lib/libfoo.dylib")));
        assert!(policy.eligible(&dep("/opt/homebrew/lib/libbar.dylib")));
    }

    #[test]
    fn standalone_takes_system_libraries() {
        let policy = RelocationPolicy::Standalone;
        assert!(policy.eligible(&dep("/usr/lib/libSystem.B.dylib")));
        assert!(policy.eligible(&dep("/opt/homebrew/lib/libbar.dylib")));
    }

    #[test]
    fn internal_markers_are_never_eligible() {
        for policy in [
            RelocationPolicy::default_allow_list(),
            RelocationPolicy::ExcludeSystem,
            RelocationPolicy::Standalone,
        ] {
            assert!(!policy.eligible(&dep("@executable_path/../Frameworks/libfoo.dylib")));
            assert!(!policy.eligible(&dep("@loader_path/libfoo.dylib")));
            assert!(!policy.eligible(&dep("@rpath/libfoo.dylib")));
        }
    }
}
