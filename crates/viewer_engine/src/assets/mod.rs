//! Asset loading
//!
//! Decoders that turn files on disk into data the renderer can upload:
//! OBJ meshes, RGBA images, and SPIR-V bytecode.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::{MeshData, ObjError, ObjLoader};

use std::path::Path;
use thiserror::Error;

/// SPIR-V magic number, first word of every module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Filesystem error while reading an asset
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed to load
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Failed to decode asset contents
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Mesh parse error
    #[error("OBJ error: {0}")]
    Obj(#[from] ObjError),
}

/// Read a compiled SPIR-V module from disk
///
/// The returned bytes are checked for word alignment and the SPIR-V magic number
/// (either endianness) before being handed to the driver.
pub fn read_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, AssetError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    validate_spirv(&bytes)?;
    log::debug!("Loaded {} bytes of SPIR-V from {:?}", bytes.len(), path);
    Ok(bytes)
}

/// Check that a byte buffer looks like a SPIR-V module
pub fn validate_spirv(bytes: &[u8]) -> Result<(), AssetError> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(AssetError::InvalidData(format!(
            "SPIR-V length {} is not a nonzero multiple of 4",
            bytes.len()
        )));
    }

    let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if u32::from_le_bytes(magic) != SPIRV_MAGIC && u32::from_be_bytes(magic) != SPIRV_MAGIC {
        return Err(AssetError::InvalidData("missing SPIR-V magic number".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_spirv_accepts_magic() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        assert!(validate_spirv(&bytes).is_ok());
    }

    #[test]
    fn test_validate_spirv_rejects_unaligned() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00];
        assert!(matches!(validate_spirv(&bytes), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_validate_spirv_rejects_bad_magic() {
        let bytes = [0u8; 8];
        assert!(validate_spirv(&bytes).is_err());
    }

    #[test]
    fn test_read_spirv_missing_file() {
        let result = read_spirv("definitely/not/here.spv");
        assert!(matches!(result, Err(AssetError::Io { .. })));
    }
}
