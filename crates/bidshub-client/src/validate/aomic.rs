// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! AOMIC dataset validation.
//!
//! AOMIC-PIOP1 follows standard BIDS, so validation is the generic rule
//! table. Expected counts come from the Scientific Data paper (Snoek et
//! al., 2021, doi:10.1038/s41597-021-00870-6): 248 subjects were recorded,
//! 216 remain after quality control, and five of those lack DWI data.
//!
//! PIOP2 (ds002790) and ID1000 (ds003097) would get their own rule tables
//! here when support is added.

use super::{DatasetValidationConfig, ValidateOptions, ValidationResult, validate_dataset};
use std::path::Path;

/// The AOMIC-PIOP1 download validation rule table.
pub fn aomic_piop1_validation_config() -> DatasetValidationConfig {
    DatasetValidationConfig {
        name: "aomic-piop1",
        expected_counts: vec![
            ("subjects", 216),
            ("t1w", 216),
            ("dwi", 211),
            ("bold", 216),
        ],
        required_files: vec![
            "dataset_description.json",
            "participants.tsv",
            "participants.json",
        ],
        modality_patterns: vec![
            ("t1w", "*_T1w.nii.gz"),
            ("dwi", "*_dwi.nii.gz"),
            ("bold", "*_bold.nii.gz"),
        ],
        custom_checks: vec![],
    }
}

/// Validate an AOMIC-PIOP1 download before pushing.
pub fn validate_aomic_piop1_download(
    bids_root: &Path,
    options: &ValidateOptions,
) -> ValidationResult {
    validate_dataset(bids_root, &aomic_piop1_validation_config(), options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_aomic_piop1_validation_config() {
        let config = aomic_piop1_validation_config();
        assert_eq!(config.name, "aomic-piop1");
        assert_eq!(config.expected_counts.len(), 4);
        assert!(config.custom_checks.is_empty());
    }

    #[test]
    fn test_validate_aomic_piop1_empty_tree() {
        let dir = TempDir::new().unwrap();
        let result = validate_aomic_piop1_download(dir.path(), &ValidateOptions::default());
        assert!(!result.all_passed());

        let names: Vec<&str> = result.checks.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"subjects"));
        assert!(names.contains(&"bold_count"));
        // No session-level tree in PIOP1, so no sessions check is configured
        assert!(!names.contains(&"sessions"));
    }
}
