// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! ISLES'24 dataset validation.
//!
//! ISLES'24 does not follow the standard BIDS layout (it splits into
//! `raw_data/`, `derivatives/`, and `phenotype/` trees and keeps metadata
//! in XLSX workbooks rather than participants.tsv), so this module uses a
//! custom driver with full-path modality globs instead of the generic
//! [`validate_dataset`](super::validate_dataset).

use super::{
    ValidateOptions, ValidationCheck, ValidationResult, check_count, check_nifti_integrity,
    check_required_files, check_zero_bytes, verify_md5,
};
use crate::bids::matches_pattern;
use std::path::{Path, PathBuf};

/// MD5 checksum of the `train.7z` archive from Zenodo record 17652035 v7.
pub const ISLES24_ARCHIVE_MD5: &str = "4959a5dd2438d53e3c86d6858484e781";

/// Expected counts from Zenodo v7. CTP and the perfusion maps are missing
/// for some subjects; the LVO and CoW masks exist for roughly two thirds.
const ISLES24_EXPECTED_COUNTS: [(&str, usize); 7] = [
    ("subjects", 149),
    ("ncct", 149),
    ("cta", 149),
    ("tmax", 140),
    ("dwi", 149),
    ("lesion_mask", 149),
    ("lvo_mask", 100),
];

/// Full-path modality patterns relative to the dataset root.
const ISLES24_MODALITY_PATTERNS: [(&str, &str); 6] = [
    ("ncct", "raw_data/sub-*/ses-01/*_ncct.nii.gz"),
    ("cta", "raw_data/sub-*/ses-01/*_cta.nii.gz"),
    (
        "tmax",
        "derivatives/sub-*/ses-01/perfusion-maps/*_space-ncct_tmax.nii.gz",
    ),
    ("dwi", "derivatives/sub-*/ses-02/*_space-ncct_dwi.nii.gz"),
    (
        "lesion_mask",
        "derivatives/sub-*/ses-02/*_space-ncct_lesion-msk.nii.gz",
    ),
    (
        "lvo_mask",
        "derivatives/sub-*/ses-01/*_space-ncct_lvo-msk.nii.gz",
    ),
];

fn expected_count(key: &str) -> usize {
    ISLES24_EXPECTED_COUNTS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, count)| *count)
        .unwrap_or(0)
}

/// Expand a `/`-separated pattern against the filesystem, one component at
/// a time; `*` never crosses a path separator.
fn glob_paths(base: &Path, segments: &[&str]) -> Vec<PathBuf> {
    let Some((first, rest)) = segments.split_first() else {
        return vec![base.to_path_buf()];
    };

    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };

    let mut matched: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| matches_pattern(name, first))
                .unwrap_or(false)
        })
        .flat_map(|entry| glob_paths(&entry.path(), rest))
        .collect();
    matched.sort();
    matched
}

/// Count modality files by full-path pattern, excluding zero-byte files.
fn count_isles24_modality(root: &Path, pattern: &str) -> usize {
    let segments: Vec<&str> = pattern.split('/').collect();
    glob_paths(root, &segments)
        .iter()
        .filter(|path| path.is_file())
        .filter(|path| {
            path.metadata()
                .map(|meta| meta.len() > 0)
                .unwrap_or(false)
        })
        .count()
}

/// Spot-check that the phenotype workbooks are readable.
///
/// A missing `phenotype/` tree or an empty one is a skip, not a failure;
/// clinical metadata is then simply absent from the built table. An
/// unreadable workbook is a failure, since it would silently null out
/// metadata for that subject.
pub fn check_phenotype_readable(root: &Path) -> ValidationCheck {
    let phenotype_dir = root.join("phenotype");
    if !phenotype_dir.exists() {
        return ValidationCheck::skipped(
            "phenotype_readable",
            "phenotype/ exists",
            "directory not found",
            "phenotype/ directory not found - may indicate incomplete extraction",
        );
    }

    let mut xlsx_files: Vec<PathBuf> = walkdir::WalkDir::new(&phenotype_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "xlsx"))
        .map(|entry| entry.into_path())
        .collect();
    xlsx_files.sort();

    let Some(sample) = xlsx_files.first() else {
        return ValidationCheck::skipped(
            "phenotype_readable",
            "XLSX files in phenotype/",
            "none found",
            "No XLSX files found in phenotype/ - metadata will be unavailable",
        );
    };

    use calamine::{Reader as _, Xlsx, open_workbook};
    let readable = open_workbook::<Xlsx<_>, _>(sample)
        .ok()
        .and_then(|mut wb| wb.worksheet_range_at(0))
        .and_then(|range| range.ok());

    let sample_name = sample
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match readable {
        Some(range) => ValidationCheck::new(
            "phenotype_readable",
            "readable XLSX",
            &format!("{} rows", range.rows().count().saturating_sub(1)),
            true,
        )
        .with_details(format!("Phenotype XLSX readable: {}", sample_name)),
        None => ValidationCheck::new("phenotype_readable", "readable XLSX", "unreadable", false)
            .with_details(format!("Phenotype XLSX unreadable: {}", sample_name)),
    }
}

/// Validate an ISLES'24 download.
///
/// Checks: zero-byte sweep, the clinical data description workbook, the
/// three top-level trees, subject count in `raw_data/`, per-modality counts
/// with tolerance (optional modalities are genuinely missing for some
/// subjects), NIfTI spot check, and phenotype readability.
pub fn validate_isles24_download(root: &Path, options: &ValidateOptions) -> ValidationResult {
    let mut result = ValidationResult::new(root);

    if !root.exists() {
        result.add(ValidationCheck::new(
            "bids_root",
            "directory exists",
            "MISSING",
            false,
        ));
        return result;
    }

    result.add(check_zero_bytes(root));
    result.add(check_required_files(
        root,
        &["clinical_data-description.xlsx"],
    ));

    for dirname in ["raw_data", "derivatives", "phenotype"] {
        let exists = root.join(dirname).exists();
        result.add(ValidationCheck::new(
            &format!("dir_{}", dirname),
            "exists",
            if exists { "exists" } else { "MISSING" },
            exists,
        ));
    }

    let raw_data = root.join("raw_data");
    if raw_data.exists() {
        let actual = crate::bids::subject_dirs(&raw_data).len();
        result.add(check_count(
            "subjects",
            actual,
            expected_count("subjects"),
            options.tolerance,
        ));
    }

    for (modality, pattern) in ISLES24_MODALITY_PATTERNS {
        let expected = expected_count(modality);
        if expected > 0 {
            let actual = count_isles24_modality(root, pattern);
            result.add(check_count(
                &format!("{}_count", modality),
                actual,
                expected,
                options.tolerance,
            ));
        }
    }

    result.add(check_nifti_integrity(
        root,
        "*.nii.gz",
        options.nifti_sample_size,
    ));
    result.add(check_phenotype_readable(root));

    result
}

/// Verify the MD5 checksum of the ISLES'24 `train.7z` archive.
pub fn verify_isles24_archive(archive_path: &Path) -> ValidationCheck {
    verify_md5(archive_path, ISLES24_ARCHIVE_MD5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_glob_paths_wildcard_per_segment() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path()
                .join("raw_data/sub-stroke0001/ses-01/sub-stroke0001_ses-01_ncct.nii.gz"),
            b"x",
        );
        write(
            &dir.path()
                .join("raw_data/sub-stroke0002/ses-01/sub-stroke0002_ses-01_ncct.nii.gz"),
            b"x",
        );
        // Wrong session is not matched
        write(
            &dir.path()
                .join("raw_data/sub-stroke0003/ses-02/sub-stroke0003_ses-02_ncct.nii.gz"),
            b"x",
        );

        let count =
            count_isles24_modality(dir.path(), "raw_data/sub-*/ses-01/*_ncct.nii.gz");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_count_isles24_modality_excludes_zero_byte() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path()
                .join("raw_data/sub-stroke0001/ses-01/sub-stroke0001_ses-01_cta.nii.gz"),
            b"",
        );

        let count = count_isles24_modality(dir.path(), "raw_data/sub-*/ses-01/*_cta.nii.gz");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_check_phenotype_readable_missing() {
        let dir = TempDir::new().unwrap();
        let check = check_phenotype_readable(dir.path());
        assert!(check.passed);
        assert!(check.skipped);
    }

    #[test]
    fn test_check_phenotype_readable_no_xlsx() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("phenotype/sub-stroke0001/ses-01")).unwrap();

        let check = check_phenotype_readable(dir.path());
        assert!(check.passed);
        assert!(check.skipped);
        assert_eq!(check.actual, "none found");
    }

    #[test]
    fn test_check_phenotype_readable_garbage_xlsx() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path()
                .join("phenotype/sub-stroke0001/ses-01/sub-stroke0001_demographic_baseline.xlsx"),
            b"not a real workbook",
        );

        let check = check_phenotype_readable(dir.path());
        assert!(!check.passed);
        assert!(check.details.contains("unreadable"));
    }

    #[test]
    fn test_validate_isles24_download_structure_checks() {
        let dir = TempDir::new().unwrap();
        write(
            &dir.path()
                .join("raw_data/sub-stroke0001/ses-01/sub-stroke0001_ses-01_ncct.nii.gz"),
            b"x",
        );

        let result = validate_isles24_download(dir.path(), &ValidateOptions::default());
        assert!(!result.all_passed());

        let names: Vec<&str> = result.checks.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"dir_raw_data"));
        assert!(names.contains(&"dir_derivatives"));
        assert!(names.contains(&"dir_phenotype"));
        assert!(names.contains(&"subjects"));
        assert!(names.contains(&"ncct_count"));
        assert!(names.contains(&"phenotype_readable"));

        let raw_dir = result.checks.iter().find(|c| c.name == "dir_raw_data").unwrap();
        assert!(raw_dir.passed);
        let deriv_dir = result
            .checks
            .iter()
            .find(|c| c.name == "dir_derivatives")
            .unwrap();
        assert!(!deriv_dir.passed);
    }

    #[test]
    fn test_validate_isles24_missing_root() {
        let dir = TempDir::new().unwrap();
        let result =
            validate_isles24_download(&dir.path().join("nope"), &ValidateOptions::default());
        assert_eq!(result.checks.len(), 1);
        assert!(!result.all_passed());
    }

    #[test]
    fn test_verify_isles24_archive_missing() {
        let dir = TempDir::new().unwrap();
        let check = verify_isles24_archive(&dir.path().join("train.7z"));
        assert!(!check.passed);
    }
}
