//! zstd-compressed tarballs used to ship directory artifacts.

use gantry_core::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

const LEVEL: i32 = 3;

/// Packs `source` (a file or a directory tree) under the archive name `name`.
pub fn create_archive<W: Write>(writer: W, source: &Path, name: &str) -> Result<()> {
    let mut encoder = zstd::stream::write::Encoder::new(writer, LEVEL)
        .map_err(|e| Error::Internal(format!("Zstd init failed: {}", e)))?;
    {
        let mut builder = tar::Builder::new(&mut encoder);
        if source.is_dir() {
            builder
                .append_dir_all(name, source)
                .map_err(|e| Error::Internal(format!("Failed to pack dir: {}", e)))?;
        } else {
            builder
                .append_path_with_name(source, name)
                .map_err(|e| Error::Internal(format!("Failed to pack file: {}", e)))?;
        }
        builder
            .finish()
            .map_err(|e| Error::Internal(format!("Failed to finish tar: {}", e)))?;
    }
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Zstd finish failed: {}", e)))?;
    Ok(())
}

pub fn extract_archive<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let decoder = zstd::stream::read::Decoder::new(reader)
        .map_err(|e| Error::Internal(format!("Failed to create decoder: {}", e)))?;
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(|e| Error::Internal(format!("Failed to unpack archive: {}", e)))?;
    Ok(())
}
