//! Dynamic-binary detection and Mach-O load-command introspection.
//!
//! Detection goes by magic bytes rather than file extension: bundle trees
//! contain executables without extensions and libraries under versioned
//! names, and neither is a reliable signal.

use std::io::Read;
use std::path::Path;

use fs_err as fs;
use goblin::Hint;
use goblin::mach::{Mach, MachO};

use crate::error::RelocateError;

/// Check if a file is a dynamic binary (Mach-O or ELF) by examining its magic
/// bytes.
pub fn is_dynamic_binary(path: &Path) -> Result<bool, RelocateError> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    let mut bytes = [0u8; 16];
    if file.read_exact(&mut bytes).is_err() {
        return Ok(false);
    }

    Ok(matches!(
        goblin::peek_bytes(&bytes),
        Ok(Hint::Mach(_) | Hint::MachFat(_) | Hint::Elf(_))
    ))
}

/// The load-command metadata the relocation engine reads back from a Mach-O
/// binary.
#[derive(Debug, Default)]
pub struct MachMetadata {
    /// Install name of this library (`LC_ID_DYLIB`), if present.
    pub install_id: Option<String>,
    /// Runtime search paths (`LC_RPATH`).
    pub rpaths: Vec<String>,
}

/// Read the install id and rpaths of a Mach-O binary.
///
/// For fat binaries, rpaths are merged across slices and the first declared
/// install id wins; slices of one library do not disagree in practice.
pub fn read_macho_metadata(path: &Path) -> Result<MachMetadata, RelocateError> {
    let data = fs::read(path)?;
    let mach = Mach::parse(&data).map_err(|err| RelocateError::BinaryParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    match mach {
        Mach::Binary(macho) => Ok(metadata_of(&macho)),
        Mach::Fat(fat) => {
            let mut metadata = MachMetadata::default();
            for arch in fat.iter_arches().flatten() {
                let slice = &data[arch.offset as usize..(arch.offset + arch.size) as usize];
                let macho = MachO::parse(slice, 0).map_err(|err| RelocateError::BinaryParse {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                })?;
                let parsed = metadata_of(&macho);
                metadata.install_id = metadata.install_id.or(parsed.install_id);
                for rpath in parsed.rpaths {
                    if !metadata.rpaths.contains(&rpath) {
                        metadata.rpaths.push(rpath);
                    }
                }
            }
            Ok(metadata)
        }
    }
}

fn metadata_of(macho: &MachO) -> MachMetadata {
    MachMetadata {
        install_id: macho.name.map(ToString::to_string),
        rpaths: macho.rpaths.iter().map(|s| (*s).to_string()).collect(),
    }
}
