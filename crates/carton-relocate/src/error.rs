use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("`{tool}` executable not found. Ensure that {install_hint}.")]
    ToolNotFound {
        tool: &'static str,
        install_hint: &'static str,
    },
    #[error(transparent)]
    ToolLookup(#[from] which::Error),
    #[error("Failed to list the dependencies of `{}`: {stderr}", path.display())]
    ListFailed { path: PathBuf, stderr: String },
    #[error("Failed to rewrite `{old}` to `{new}` in `{}`: {stderr}", path.display())]
    PatchFailed {
        path: PathBuf,
        old: String,
        new: String,
        stderr: String,
    },
    #[error("Failed to set the install id of `{}` to `{id}`: {stderr}", path.display())]
    InstallIdFailed {
        path: PathBuf,
        id: String,
        stderr: String,
    },
    #[error("Failed to set the library search path of `{}` to `{search_path}`: {stderr}", path.display())]
    SearchPathFailed {
        path: PathBuf,
        search_path: String,
        stderr: String,
    },
    #[error("Failed to apply an ad-hoc code signature to `{}`: {stderr}", path.display())]
    SignFailed { path: PathBuf, stderr: String },
    #[error(
        "Cannot express `{}` relative to `{}`; the bundle would not survive being moved",
        target.display(),
        origin.display()
    )]
    UnrelatablePath { target: PathBuf, origin: PathBuf },
    #[error(
        "Library name collision: `{name}` refers to both `{}` and `{}`",
        first.display(),
        second.display()
    )]
    NameCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Failed to parse `{}`: {message}", path.display())]
    BinaryParse { path: PathBuf, message: String },
}
