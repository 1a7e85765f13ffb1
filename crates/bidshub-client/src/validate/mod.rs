// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Declarative validation engine for BIDS downloads.
//!
//! Each supported dataset ships a hand-verified census of expected counts
//! (subjects, sessions, files per modality) taken from its source of truth.
//! A validation run walks the downloaded tree and evaluates that census as
//! a rule table: count checks with optional tolerance, required-file
//! checks, a zero-byte corruption sweep, a random NIfTI parse spot check,
//! and dataset-specific custom checks. Results accumulate into a
//! [`ValidationResult`] whose summary prints every check with its expected
//! and actual values.
//!
//! Built-table checks (schema, row counts, list alignment) live in
//! [`table`](crate::validate::table).

pub mod aomic;
pub mod arc;
pub mod isles24;
pub mod table;

use crate::{
    bids::{find_all_niftis, session_dirs, subject_dirs},
    nifti::{check_nifti, zero_byte_files},
};
use itertools::Itertools as _;
use log::debug;
use md5::{Digest as _, Md5};
use rand::seq::SliceRandom as _;
use std::{
    fmt,
    io::Read as _,
    path::{Path, PathBuf},
    time::Duration,
};

/// Result of a single validation check.
#[derive(Debug, Clone)]
pub struct ValidationCheck {
    /// Check name for reporting (e.g. `"subjects"`, `"t1w_count"`).
    pub name: String,
    /// What was expected.
    pub expected: String,
    /// What was found.
    pub actual: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Check could not run and was skipped (counted as passed but flagged).
    pub skipped: bool,
    /// Additional details about the result.
    pub details: String,
}

impl ValidationCheck {
    /// A passing or failing check with no extra details.
    pub fn new(name: &str, expected: &str, actual: &str, passed: bool) -> Self {
        Self {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            passed,
            skipped: false,
            details: String::new(),
        }
    }

    /// Attach details to a check.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// A skipped check: passed, but flagged in the summary.
    pub fn skipped(name: &str, expected: &str, actual: &str, details: &str) -> Self {
        Self {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            passed: true,
            skipped: true,
            details: details.to_string(),
        }
    }
}

/// Complete validation results for one downloaded dataset.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Root directory the validation ran against.
    pub root: PathBuf,
    /// All check results, in execution order.
    pub checks: Vec<ValidationCheck>,
}

impl ValidationResult {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            checks: Vec::new(),
        }
    }

    /// Add a check result.
    pub fn add(&mut self, check: ValidationCheck) {
        self.checks.push(check);
    }

    /// True when every check passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Number of passed checks.
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Number of failed checks.
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation Results for: {}", self.root.display())?;
        writeln!(f, "{}", "=".repeat(60))?;
        for check in &self.checks {
            let status = if check.skipped {
                "• SKIP"
            } else if check.passed {
                "✓ PASS"
            } else {
                "✗ FAIL"
            };
            writeln!(f, "{} {}", status, check.name)?;
            writeln!(f, "       Expected: {}", check.expected)?;
            writeln!(f, "       Actual:   {}", check.actual)?;
            if !check.details.is_empty() {
                writeln!(f, "       Details:  {}", check.details)?;
            }
        }
        writeln!(f, "{}", "=".repeat(60))?;
        if self.all_passed() {
            writeln!(f, "✓ All validations passed. Data is ready for hub push.")
        } else {
            writeln!(
                f,
                "✗ {}/{} checks failed. Check the download or wait for completion.",
                self.failed_count(),
                self.checks.len()
            )
        }
    }
}

/// Declarative validation rule table for one dataset.
#[derive(Clone)]
pub struct DatasetValidationConfig {
    /// Dataset name.
    pub name: &'static str,
    /// Expected counts keyed by `"subjects"`, `"sessions"`, or a modality
    /// name present in `modality_patterns`.
    pub expected_counts: Vec<(&'static str, usize)>,
    /// Files that must exist relative to the root.
    pub required_files: Vec<&'static str>,
    /// Modality name to filename pattern (e.g. `("t1w", "*_T1w.nii.gz")`).
    pub modality_patterns: Vec<(&'static str, &'static str)>,
    /// Dataset-specific checks run after the generic ones.
    pub custom_checks: Vec<fn(&Path) -> ValidationCheck>,
}

impl DatasetValidationConfig {
    fn expected(&self, key: &str) -> Option<usize> {
        self.expected_counts
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, count)| *count)
    }
}

/// Options shared by the download validators.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Run the external `bids-validator` via npx (slow on large trees).
    pub run_bids_validator: bool,
    /// Number of NIfTI files to spot-check for parseability.
    pub nifti_sample_size: usize,
    /// Allowed missing fraction for count checks (0.0 to 1.0).
    pub tolerance: f32,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            run_bids_validator: false,
            nifti_sample_size: 10,
            tolerance: 0.0,
        }
    }
}

/// Generic count check with minimum-threshold tolerance.
///
/// Passes when `actual >= expected - floor(expected * tolerance)`. With
/// `tolerance == 0.0` this is a lower-bound equality check: extra files do
/// not fail the count, missing ones do.
pub fn check_count(name: &str, actual: usize, expected: usize, tolerance: f32) -> ValidationCheck {
    let allowed_missing = (expected as f32 * tolerance) as usize;
    let threshold = expected - allowed_missing;
    let passed = actual >= threshold;

    let details = if tolerance > 0.0 {
        format!("Tolerance: {:.1}%", tolerance * 100.0)
    } else {
        String::new()
    };

    ValidationCheck::new(
        name,
        &format!(">= {} (target: {})", threshold, expected),
        &actual.to_string(),
        passed,
    )
    .with_details(details)
}

/// Zero-byte NIfTI sweep over the whole tree.
pub fn check_zero_bytes(root: &Path) -> ValidationCheck {
    let (count, offenders) = zero_byte_files(root);
    let details = if count > 0 {
        format!("First 5: {}", offenders.iter().take(5).join(", "))
    } else {
        String::new()
    };
    ValidationCheck::new("zero_byte_files", "0", &count.to_string(), count == 0).with_details(details)
}

/// Required-files check relative to the root.
pub fn check_required_files(root: &Path, required: &[&str]) -> ValidationCheck {
    let missing: Vec<&str> = required
        .iter()
        .filter(|f| !root.join(f).exists())
        .copied()
        .collect();

    if missing.is_empty() {
        ValidationCheck::new("required_files", "all present", "all present", true)
    } else {
        ValidationCheck::new(
            "required_files",
            "all present",
            &format!("missing: {}", missing.len()),
            false,
        )
        .with_details(format!("Missing: {}", missing.join(", ")))
    }
}

/// Verify the MD5 checksum of an archive file, reading in chunks.
pub fn verify_md5(archive_path: &Path, expected_md5: &str) -> ValidationCheck {
    let name = format!(
        "md5_{}",
        archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    );

    let file = match std::fs::File::open(archive_path) {
        Ok(file) => file,
        Err(_) => {
            return ValidationCheck::new(&name, "file exists", "MISSING", false);
        }
    };

    let mut hasher = Md5::new();
    let mut reader = std::io::BufReader::new(file);
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return ValidationCheck::new(
                    &name,
                    expected_md5,
                    &format!("Error reading file: {}", e),
                    false,
                );
            }
        }
    }

    let computed = format!("{:x}", hasher.finalize());
    let passed = computed == expected_md5;
    ValidationCheck::new(&name, expected_md5, &computed, passed)
}

/// Random NIfTI parse spot check.
///
/// Samples up to `sample_size` files matching `pattern` (falling back to
/// any `*.nii.gz` when nothing matches) and fails on the first file the
/// NIfTI reader rejects.
pub fn check_nifti_integrity(root: &Path, pattern: &str, sample_size: usize) -> ValidationCheck {
    let mut files = find_all_niftis(root, pattern);
    if files.is_empty() {
        files = find_all_niftis(root, "*.nii.gz");
        if files.is_empty() {
            return ValidationCheck::new(
                "nifti_integrity",
                "loadable",
                "no NIfTI files found",
                false,
            );
        }
    }

    let mut rng = rand::thread_rng();
    let sample: Vec<&String> = files
        .choose_multiple(&mut rng, sample_size.min(files.len()))
        .collect();

    for file in &sample {
        if let Err(e) = check_nifti(Path::new(file.as_str())) {
            let file_name = Path::new(file.as_str())
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return ValidationCheck::new(
                "nifti_integrity",
                "loadable",
                &format!("ERROR: {}", e),
                false,
            )
            .with_details(format!("Failed on: {}", file_name));
        }
    }

    ValidationCheck::new(
        "nifti_integrity",
        "loadable",
        &format!("{}/{} passed", sample.len(), sample.len()),
        true,
    )
}

/// Count sessions containing at least one file matching `pattern`.
///
/// Session-based trees (`sub-*/ses-*`) count sessions; flat trees count
/// subjects, since each subject is then a single implicit session.
pub fn count_sessions_with_modality(root: &Path, pattern: &str) -> usize {
    let sessions: Vec<PathBuf> = subject_dirs(root)
        .iter()
        .flat_map(|subject| session_dirs(subject))
        .collect();

    if !sessions.is_empty() {
        sessions
            .iter()
            .filter(|session| !find_all_niftis(session, pattern).is_empty())
            .count()
    } else {
        subject_dirs(root)
            .iter()
            .filter(|subject| !find_all_niftis(subject, pattern).is_empty())
            .count()
    }
}

/// Run the external BIDS validator when `npx` is available.
///
/// Returns `None` when npx is missing, the validator errors out, or the run
/// exceeds five minutes; an unavailable validator never fails a download.
pub fn check_bids_validator(root: &Path) -> Option<ValidationCheck> {
    which_npx()?;

    let root = root.to_path_buf();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let output = std::process::Command::new("npx")
            .args(["--yes", "bids-validator"])
            .arg(&root)
            .arg("--json")
            .output();
        let _ = tx.send(output);
    });

    match rx.recv_timeout(Duration::from_secs(300)) {
        Ok(Ok(output)) => {
            if output.status.success() {
                Some(ValidationCheck::new(
                    "bids_validator",
                    "valid BIDS",
                    "passed",
                    true,
                ))
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let details: String = stderr.chars().take(200).collect();
                Some(
                    ValidationCheck::new("bids_validator", "valid BIDS", "errors found", false)
                        .with_details(details),
                )
            }
        }
        _ => {
            debug!("bids-validator timed out or failed to run, skipping check");
            None
        }
    }
}

fn which_npx() -> Option<()> {
    std::process::Command::new("npx")
        .arg("--version")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|_| ())
}

/// Generic download validation using a dataset's rule table.
///
/// Order: root existence (early return), zero-byte sweep, required files,
/// subject/session counts, per-modality counts, custom checks, NIfTI spot
/// check, optional external BIDS validator.
pub fn validate_dataset(
    root: &Path,
    config: &DatasetValidationConfig,
    options: &ValidateOptions,
) -> ValidationResult {
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
    result.add(check_required_files(root, &config.required_files));

    if let Some(expected) = config.expected("subjects") {
        let actual = subject_dirs(root).len();
        result.add(check_count("subjects", actual, expected, options.tolerance));
    }

    if let Some(expected) = config.expected("sessions") {
        let actual: usize = subject_dirs(root)
            .iter()
            .map(|subject| session_dirs(subject).len())
            .sum();
        result.add(check_count("sessions", actual, expected, options.tolerance));
    }

    for (modality, pattern) in &config.modality_patterns {
        if let Some(expected) = config.expected(modality) {
            let actual = count_sessions_with_modality(root, pattern);
            result.add(check_count(
                &format!("{}_count", modality),
                actual,
                expected,
                options.tolerance,
            ));
        }
    }

    for check in &config.custom_checks {
        result.add(check(root));
    }

    result.add(check_nifti_integrity(
        root,
        "*_T1w.nii.gz",
        options.nifti_sample_size,
    ));

    if options.run_bids_validator
        && let Some(check) = check_bids_validator(root)
    {
        result.add(check);
    }

    result
}
