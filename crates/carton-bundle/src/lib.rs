//! App-bundle structure and composition.
//!
//! [`BundleStructure`] computes and creates the directory skeleton a
//! relocation run writes into; [`Bundler`] composes skeleton creation,
//! executable installation, and dependency relocation into a finished,
//! self-contained bundle tree. Metadata generation (property lists, desktop
//! entries, icons) and archive packaging are the caller's concern: the
//! bundler's output contract is a directory tree whose binaries load
//! correctly after the tree is moved, as a unit, anywhere on a compatible
//! machine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod bundler;
mod structure;

pub use bundler::Bundler;
pub use structure::BundleStructure;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Relocate(#[from] carton_relocate::RelocateError),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error("`{}` has no file name; cannot install it into the bundle", path.display())]
    InvalidExecutable { path: PathBuf },
}
