// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use assert_cmd::Command;
use std::{fs, path::Path};
use tempfile::TempDir;

fn bids_hub() -> Command {
    let mut cmd = Command::cargo_bin("bids-hub").expect("binary builds");
    // Keep the CLI off any token or endpoint from the environment
    cmd.env_remove("BIDS_HUB_TOKEN");
    cmd.env_remove("BIDS_HUB_ENDPOINT");
    cmd
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_help() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("arc"))
        .stdout(predicates::str::contains("isles24"));
    Ok(())
}

#[test]
fn test_list() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .arg("list")
        .assert()
        .success()
        .stdout(predicates::str::contains("Aphasia Recovery Cohort"))
        .stdout(predicates::str::contains("aomic piop1"));
    Ok(())
}

#[test]
fn test_arc_info() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .args(["arc", "info"])
        .assert()
        .success()
        .stdout(predicates::str::contains("ds004884"))
        .stdout(predicates::str::contains("230 chronic stroke patients"));
    Ok(())
}

#[test]
fn test_isles24_info() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .args(["isles24", "info"])
        .assert()
        .success()
        .stdout(predicates::str::contains("Zenodo"))
        .stdout(predicates::str::contains("149 subjects"));
    Ok(())
}

#[test]
fn test_aomic_piop1_info() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .args(["aomic", "piop1", "info"])
        .assert()
        .success()
        .stdout(predicates::str::contains("ds002785"));
    Ok(())
}

#[test]
fn test_arc_validate_missing_root() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let missing = dir.path().join("missing");

    bids_hub()
        .args(["arc", "validate"])
        .arg(&missing)
        .assert()
        .failure()
        .stdout(predicates::str::contains("bids_root"))
        .stdout(predicates::str::contains("MISSING"));
    Ok(())
}

#[test]
fn test_arc_validate_incomplete_tree_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    write(
        &dir.path().join("participants.tsv"),
        "participant_id\nsub-M2001\n",
    );

    bids_hub()
        .args(["arc", "validate"])
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(predicates::str::contains("✗ FAIL"))
        .stdout(predicates::str::contains("checks failed"));
    Ok(())
}

#[test]
fn test_arc_validate_rejects_bad_tolerance() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    bids_hub()
        .args(["arc", "validate"])
        .arg(dir.path())
        .args(["--tolerance", "1.5"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_arc_build_dry_run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    write(
        &dir.path().join("participants.tsv"),
        "participant_id\tage_at_stroke\tsex\trace\twab_aq\twab_days\twab_type\n\
         sub-M2001\t54.3\tM\tb\t63.2\t120\tBroca\n",
    );
    write(
        &dir.path()
            .join("sub-M2001/ses-1/anat/sub-M2001_ses-1_T1w.nii.gz"),
        "t1",
    );

    bids_hub()
        .args(["arc", "build"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("Dry run: true"))
        .stdout(predicates::str::contains("Dry run complete"));
    Ok(())
}

#[test]
fn test_aomic_piop1_build_dry_run() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    write(
        &dir.path().join("participants.tsv"),
        "participant_id\tage\tsex\thandedness\nsub-0001\t22.0\tF\tright\n",
    );
    write(&dir.path().join("sub-0001/anat/sub-0001_T1w.nii.gz"), "t1");

    bids_hub()
        .args(["aomic", "piop1", "build"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicates::str::contains("Dry run complete"));
    Ok(())
}

#[test]
fn test_isles24_build_dry_run_missing_raw_data() -> Result<(), Box<dyn std::error::Error>> {
    // Without a raw_data/ tree the build must fail, dry run or not
    let dir = TempDir::new()?;

    bids_hub()
        .args(["isles24", "build"])
        .arg(dir.path())
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_token_from_env() -> Result<(), Box<dyn std::error::Error>> {
    bids_hub()
        .env("BIDS_HUB_TOKEN", "hf_testtoken")
        .arg("token")
        .assert()
        .success()
        .stdout(predicates::str::contains("hf_testtoken"));
    Ok(())
}
