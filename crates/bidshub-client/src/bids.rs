// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! BIDS directory discovery utilities.
//!
//! A BIDS dataset is a directory tree keyed by subject (`sub-*`) and
//! optionally session (`ses-*`), with imaging files named by entity patterns
//! such as `sub-M2001_ses-1_T1w.nii.gz` and a `participants.tsv` table at the
//! root. These helpers walk that structure; the per-dataset builders in
//! [`crate::datasets`] decide which patterns to look for and how rows are
//! assembled.

use crate::Error;
use log::warn;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Match a file name against a glob-lite pattern supporting `*` wildcards.
///
/// Only `*` is supported; BIDS filename patterns never need character
/// classes or `?`. Matching is case-sensitive, as BIDS entities are.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let name = name.as_bytes();
    let pattern = pattern.as_bytes();

    // Iterative two-pointer wildcard match with backtracking to the last `*`
    let (mut n, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_n = 0usize;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == name[n]) {
            n += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            star_n = n;
            p += 1;
        } else if let Some(sp) = star {
            p = sp + 1;
            star_n += 1;
            n = star_n;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Find all files under `search_dir` whose name matches `pattern`, sorted by
/// file name, as absolute paths.
///
/// A missing or non-directory `search_dir` yields an empty list; absent
/// modality directories are expected in BIDS trees.
pub fn find_all_niftis(search_dir: &Path, pattern: &str) -> Vec<String> {
    if !search_dir.is_dir() {
        return Vec::new();
    }

    let mut matches: Vec<PathBuf> = WalkDir::new(search_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| matches_pattern(name, pattern))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    matches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    matches
        .iter()
        .map(|p| absolute_path(p).to_string_lossy().into_owned())
        .collect()
}

/// Find a single file under `search_dir` matching `pattern`.
///
/// Returns the first match in file-name order, or `None` when the directory
/// is missing or nothing matches.
pub fn find_single_nifti(search_dir: &Path, pattern: &str) -> Option<String> {
    find_all_niftis(search_dir, pattern).into_iter().next()
}

/// Enumerate `sub-*` directories directly under `root`, sorted by name.
pub fn subject_dirs(root: &Path) -> Vec<PathBuf> {
    prefixed_dirs(root, "sub-")
}

/// Enumerate `ses-*` directories directly under `subject_dir`, sorted by
/// name.
pub fn session_dirs(subject_dir: &Path) -> Vec<PathBuf> {
    prefixed_dirs(subject_dir, "ses-")
}

fn prefixed_dirs(root: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(prefix))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();

    dirs.sort();
    dirs
}

/// Read `participants.tsv` from the BIDS root into a DataFrame.
///
/// The TSV must exist; per-subject demographic columns beyond
/// `participant_id` vary by dataset and are read as whatever Polars infers.
pub fn read_participants_tsv(bids_root: &Path) -> Result<DataFrame, Error> {
    let path = bids_root.join("participants.tsv");
    if !path.exists() {
        return Err(Error::MissingRequiredFile(format!(
            "participants.tsv not found at {}",
            path.display()
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(200))
        .with_parse_options(CsvParseOptions::default().with_separator(b'\t'))
        .try_into_reader_with_file_path(Some(path))?
        .finish()?;

    Ok(df)
}

fn is_na(value: &str) -> bool {
    // BIDS uses "n/a" for missing tabular values
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a")
}

/// Fetch an optional string cell from a participants table.
///
/// Missing columns, nulls, and BIDS `n/a` markers all yield `None`.
pub fn opt_str_cell(df: &DataFrame, column: &str, row: usize) -> Option<String> {
    let value = df.column(column).ok()?.get(row).ok()?;
    match value {
        AnyValue::String(s) if !is_na(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) if !is_na(s.as_str()) => Some(s.to_string()),
        _ => None,
    }
}

/// Fetch an optional float cell from a participants table.
///
/// Handles numeric columns directly and string columns by parsing; a value
/// that fails to parse is logged and treated as missing, matching the
/// tolerance of the builders toward hand-edited demographic tables.
pub fn opt_f32_cell(df: &DataFrame, column: &str, row: usize, context: &str) -> Option<f32> {
    let value = df.column(column).ok()?.get(row).ok()?;
    match value {
        AnyValue::Null => None,
        AnyValue::Float32(v) => Some(v),
        AnyValue::Float64(v) => Some(v as f32),
        AnyValue::Int32(v) => Some(v as f32),
        AnyValue::Int64(v) => Some(v as f32),
        AnyValue::UInt32(v) => Some(v as f32),
        AnyValue::UInt64(v) => Some(v as f32),
        AnyValue::String(s) => parse_f32(s, column, context),
        AnyValue::StringOwned(s) => parse_f32(s.as_str(), column, context),
        other => {
            warn!("Unexpected {} value for {}: {:?}", column, context, other);
            None
        }
    }
}

fn parse_f32(value: &str, column: &str, context: &str) -> Option<f32> {
    if is_na(value) {
        return None;
    }
    match value.trim().parse::<f32>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Invalid {} for {}: {:?}", column, context, value);
            None
        }
    }
}

/// Read a DWI gradient companion file (`.bval` or `.bvec`) for a NIfTI.
///
/// BIDS places gradients next to the DWI volume with the same base name:
/// `sub-X_ses-Y_dwi.nii.gz` → `sub-X_ses-Y_dwi.bval` / `.bvec`. Returns the
/// whitespace-trimmed file content.
///
/// A missing gradient is an error, not an expected absence: datasets with
/// DWI runs ship a verified 1:1 gradient match, so absence indicates a
/// corrupt or partial download.
pub fn read_gradient_file(nifti_path: &str, extension: &str) -> Result<String, Error> {
    let mut base = PathBuf::from(nifti_path);
    if base.extension().is_some_and(|e| e == "gz") {
        base.set_extension("");
    }
    base.set_extension(extension.trim_start_matches('.'));

    if !base.exists() {
        warn!("Gradient file not found (data corruption?): {:?}", base);
        return Err(Error::MissingGradient(base.display().to_string()));
    }

    Ok(std::fs::read_to_string(&base)?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("sub-01_T1w.nii.gz", "*_T1w.nii.gz"));
        assert!(matches_pattern(
            "sub-01_acq-spc3_run-2_T2w.nii.gz",
            "*_T2w.nii.gz"
        ));
        assert!(matches_pattern("a_dwi.nii.gz", "*_dwi.nii.gz"));
        assert!(!matches_pattern("sub-01_T1w.nii.gz", "*_T2w.nii.gz"));
        assert!(!matches_pattern("sub-01_T1w.nii", "*_T1w.nii.gz"));
        // BIDS entities are case-sensitive
        assert!(!matches_pattern("sub-01_t1w.nii.gz", "*_T1w.nii.gz"));
        // Multiple wildcards
        assert!(matches_pattern(
            "sub-01_task-rest_run-1_bold.nii.gz",
            "*task-rest*_bold.nii.gz"
        ));
        // Exact patterns without wildcards
        assert!(matches_pattern("participants.tsv", "participants.tsv"));
        assert!(!matches_pattern("participants.tsv", "participants.json"));
    }

    #[test]
    fn test_find_all_niftis_sorted_and_recursive() {
        let dir = TempDir::new().unwrap();
        let anat = dir.path().join("anat");
        let nested = anat.join("extra");
        fs::create_dir_all(&nested).unwrap();

        fs::write(anat.join("sub-01_run-2_T1w.nii.gz"), b"x").unwrap();
        fs::write(anat.join("sub-01_run-1_T1w.nii.gz"), b"x").unwrap();
        fs::write(nested.join("sub-01_run-3_T1w.nii.gz"), b"x").unwrap();
        fs::write(anat.join("sub-01_T2w.nii.gz"), b"x").unwrap();

        let found = find_all_niftis(&anat, "*_T1w.nii.gz");
        assert_eq!(found.len(), 3);
        assert!(found[0].ends_with("sub-01_run-1_T1w.nii.gz"));
        assert!(found[1].ends_with("sub-01_run-2_T1w.nii.gz"));
        assert!(found[2].ends_with("sub-01_run-3_T1w.nii.gz"));
        // Paths come back absolute
        assert!(Path::new(&found[0]).is_absolute());
    }

    #[test]
    fn test_find_niftis_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(find_all_niftis(&missing, "*.nii.gz").is_empty());
        assert!(find_single_nifti(&missing, "*.nii.gz").is_none());
    }

    #[test]
    fn test_subject_and_session_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub-02/ses-2")).unwrap();
        fs::create_dir_all(dir.path().join("sub-02/ses-1")).unwrap();
        fs::create_dir_all(dir.path().join("sub-01")).unwrap();
        fs::create_dir_all(dir.path().join("derivatives")).unwrap();
        fs::write(dir.path().join("sub-03"), b"not a dir").unwrap();

        let subjects = subject_dirs(dir.path());
        assert_eq!(subjects.len(), 2);
        assert!(subjects[0].ends_with("sub-01"));
        assert!(subjects[1].ends_with("sub-02"));

        let sessions = session_dirs(&subjects[1]);
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].ends_with("ses-1"));
    }

    #[test]
    fn test_read_participants_tsv() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("participants.tsv"),
            "participant_id\tage\tsex\nsub-01\t42.5\tM\nsub-02\tn/a\tF\n",
        )
        .unwrap();

        let df = read_participants_tsv(dir.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            opt_str_cell(&df, "participant_id", 0),
            Some("sub-01".to_string())
        );
        assert_eq!(opt_f32_cell(&df, "age", 0, "sub-01"), Some(42.5));
        assert_eq!(opt_f32_cell(&df, "age", 1, "sub-02"), None);
        assert_eq!(opt_str_cell(&df, "sex", 1), Some("F".to_string()));
        assert_eq!(opt_str_cell(&df, "handedness", 0), None);
    }

    #[test]
    fn test_read_participants_tsv_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_participants_tsv(dir.path()),
            Err(Error::MissingRequiredFile(_))
        ));
    }

    #[test]
    fn test_read_gradient_file() {
        let dir = TempDir::new().unwrap();
        let nifti = dir.path().join("sub-01_dwi.nii.gz");
        fs::write(&nifti, b"x").unwrap();
        fs::write(dir.path().join("sub-01_dwi.bval"), "0 1000 2000\n").unwrap();

        let bvals = read_gradient_file(nifti.to_str().unwrap(), ".bval").unwrap();
        assert_eq!(bvals, "0 1000 2000");

        let missing = read_gradient_file(nifti.to_str().unwrap(), ".bvec");
        assert!(matches!(missing, Err(Error::MissingGradient(_))));
    }
}
