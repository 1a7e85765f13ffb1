// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! NIfTI integrity utilities.
//!
//! Corruption in a partially downloaded BIDS dataset shows up two ways:
//! zero-byte files (truncated transfers) and files that no longer parse as
//! NIfTI-1. The census here is cheap (`stat` only); the parse check loads
//! the volume through the `nifti` crate and is therefore reserved for
//! random spot checks.

use crate::Error;
use nifti::{NiftiObject, NiftiVolume, ReaderOptions};
use std::path::Path;
use walkdir::WalkDir;

/// Load a NIfTI file (`.nii` or `.nii.gz`) and return its shape.
pub fn check_nifti(path: &Path) -> Result<Vec<usize>, Error> {
    let obj = ReaderOptions::new().read_file(path)?;
    let shape: Vec<usize> = obj.volume().dim().iter().map(|&d| d as usize).collect();
    Ok(shape)
}

/// Census of zero-byte `.nii.gz` files under `root`.
///
/// Returns the count and the offending paths relative to `root`, sorted.
/// A zero-byte NIfTI is always corruption; this runs before any expensive
/// check so a broken download fails fast.
pub fn zero_byte_files(root: &Path) -> (usize, Vec<String>) {
    let mut offenders: Vec<String> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(".nii.gz"))
                .unwrap_or(false)
        })
        .filter(|entry| {
            entry
                .metadata()
                .map(|meta| meta.len() == 0)
                .unwrap_or(false)
        })
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    offenders.sort();
    (offenders.len(), offenders)
}

#[cfg(test)]
pub(crate) mod test_support {
    use flate2::{Compression, write::GzEncoder};
    use std::{io::Write as _, path::Path};

    /// Write a minimal valid gzipped NIfTI-1 file: a 2x2x2 uint8 volume.
    pub fn write_minimal_nifti_gz(path: &Path) {
        let mut header = vec![0u8; 352];

        // sizeof_hdr
        header[0..4].copy_from_slice(&348i32.to_le_bytes());
        // dim: ndim=3, 2x2x2
        let dim: [i16; 8] = [3, 2, 2, 2, 1, 1, 1, 1];
        for (i, d) in dim.iter().enumerate() {
            header[40 + i * 2..42 + i * 2].copy_from_slice(&d.to_le_bytes());
        }
        // datatype = 2 (uint8), bitpix = 8
        header[70..72].copy_from_slice(&2i16.to_le_bytes());
        header[72..74].copy_from_slice(&8i16.to_le_bytes());
        // pixdim
        for i in 0..8 {
            header[76 + i * 4..80 + i * 4].copy_from_slice(&1.0f32.to_le_bytes());
        }
        // vox_offset, scl_slope
        header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
        header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
        // magic "n+1\0"
        header[344..348].copy_from_slice(b"n+1\0");
        // bytes 348..352 are the zeroed extension flag

        let voxels = [7u8; 8];

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let file = std::fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::fast());
        encoder.write_all(&header).unwrap();
        encoder.write_all(&voxels).unwrap();
        encoder.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_nifti_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-01_T1w.nii.gz");
        test_support::write_minimal_nifti_gz(&path);

        let shape = check_nifti(&path).unwrap();
        assert_eq!(shape, vec![2, 2, 2]);
    }

    #[test]
    fn test_check_nifti_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub-01_T1w.nii.gz");
        fs::write(&path, b"this is not a nifti file").unwrap();

        assert!(check_nifti(&path).is_err());
    }

    #[test]
    fn test_zero_byte_files() {
        let dir = TempDir::new().unwrap();
        let anat = dir.path().join("sub-01").join("anat");
        fs::create_dir_all(&anat).unwrap();
        fs::write(anat.join("sub-01_T1w.nii.gz"), b"").unwrap();
        fs::write(anat.join("sub-01_T2w.nii.gz"), b"data").unwrap();
        fs::write(dir.path().join("participants.tsv"), b"").unwrap();

        let (count, offenders) = zero_byte_files(dir.path());
        assert_eq!(count, 1);
        assert!(offenders[0].ends_with("sub-01_T1w.nii.gz"));
    }

    #[test]
    fn test_zero_byte_files_clean() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("sub-01_T1w.nii.gz"), b"data").unwrap();

        let (count, offenders) = zero_byte_files(dir.path());
        assert_eq!(count, 0);
        assert!(offenders.is_empty());
    }
}
