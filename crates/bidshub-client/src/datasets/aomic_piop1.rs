// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! AOMIC-PIOP1 (Amsterdam Open MRI Collection, PIOP1) dataset builder.
//!
//! Converts the AOMIC-PIOP1 BIDS dataset (OpenNeuro ds002785, CC0) into a
//! hub dataset with one row per subject. PIOP1 has no longitudinal
//! sessions: 216 healthy adults, each with a single T1w structural scan,
//! diffusion imaging, and BOLD fMRI runs (resting state plus tasks), with
//! demographics in `participants.tsv`.

use crate::{
    Error,
    bids::{find_all_niftis, find_single_nifti, opt_f32_cell, opt_str_cell, read_participants_tsv},
    client::{HubClient, Progress},
    datasets::BuilderConfig,
    push::{PushOptions, push_to_hub},
    table::{Feature, Features, build_table, f32_column, str_column, str_list_column},
};
use log::{debug, info, warn};
use polars::prelude::*;
use std::path::Path;
use tokio::sync::mpsc::Sender;

struct Piop1Row {
    subject_id: String,
    t1w: Option<String>,
    dwi: Vec<String>,
    bold: Vec<String>,
    age: Option<f32>,
    sex: Option<String>,
    handedness: Option<String>,
}

/// Build the AOMIC-PIOP1 file table: one row per subject.
///
/// Iterates subjects from `participants.tsv`; a listed subject without a
/// directory is skipped with a warning. The T1w scan is a single file keyed
/// by the subject ID; DWI and BOLD collect all runs.
pub fn build_aomic_piop1_file_table(bids_root: &Path) -> Result<DataFrame, Error> {
    if !bids_root.exists() {
        return Err(Error::InvalidBidsRoot(format!(
            "BIDS root not found: {}",
            bids_root.display()
        )));
    }

    let participants = read_participants_tsv(bids_root)?;
    info!(
        "Found {} subjects in participants.tsv",
        participants.height()
    );

    let mut rows = Vec::new();

    for i in 0..participants.height() {
        let Some(subject_id) = opt_str_cell(&participants, "participant_id", i) else {
            warn!("participants.tsv row {} has no participant_id, skipping", i);
            continue;
        };
        let subject_dir = bids_root.join(&subject_id);

        if !subject_dir.exists() {
            warn!(
                "Subject directory not found: {} (skipping)",
                subject_dir.display()
            );
            continue;
        }
        debug!("Processing subject: {}", subject_id);

        let t1w = find_single_nifti(
            &subject_dir.join("anat"),
            &format!("{}_T1w.nii.gz", subject_id),
        );
        let dwi = find_all_niftis(
            &subject_dir.join("dwi"),
            &format!("{}_dwi.nii.gz", subject_id),
        );
        let bold = find_all_niftis(
            &subject_dir.join("func"),
            &format!("{}_*_bold.nii.gz", subject_id),
        );

        let age = opt_f32_cell(&participants, "age", i, &subject_id);
        let sex = opt_str_cell(&participants, "sex", i);
        let handedness = opt_str_cell(&participants, "handedness", i);

        rows.push(Piop1Row {
            subject_id,
            t1w,
            dwi,
            bold,
            age,
            sex,
            handedness,
        });
    }

    info!("Built file table with {} subjects", rows.len());

    let columns = vec![
        str_column(
            "subject_id",
            rows.iter().map(|r| Some(r.subject_id.clone())).collect(),
        ),
        str_column("t1w", rows.iter().map(|r| r.t1w.clone()).collect()),
        str_list_column("dwi", rows.iter().map(|r| r.dwi.clone()).collect())?,
        str_list_column("bold", rows.iter().map(|r| r.bold.clone()).collect())?,
        f32_column("age", rows.iter().map(|r| r.age).collect()),
        str_column("sex", rows.iter().map(|r| r.sex.clone()).collect()),
        str_column(
            "handedness",
            rows.iter().map(|r| r.handedness.clone()).collect(),
        ),
    ];

    Ok(DataFrame::new(columns)?)
}

/// The AOMIC-PIOP1 schema: 7 columns, one row per subject.
pub fn aomic_piop1_features() -> Features {
    Features::new(vec![
        ("subject_id", Feature::String),
        ("t1w", Feature::Nifti),
        ("dwi", Feature::Sequence(Box::new(Feature::Nifti))),
        ("bold", Feature::Sequence(Box::new(Feature::Nifti))),
        ("age", Feature::Float32),
        ("sex", Feature::String),
        ("handedness", Feature::String),
    ])
}

/// Build the AOMIC-PIOP1 table and push it to the hub unless `dry_run` is
/// set.
pub async fn build_and_push_aomic_piop1(
    client: &HubClient,
    config: &BuilderConfig,
    progress: Option<Sender<Progress>>,
) -> Result<(), Error> {
    info!(
        "Building AOMIC-PIOP1 dataset from {}",
        config.bids_root.display()
    );
    let file_table = build_aomic_piop1_file_table(&config.bids_root)?;
    let features = aomic_piop1_features();
    let table = build_table(&file_table, &features)?;

    if config.dry_run {
        info!("Dry run: skipping push to hub");
        return Ok(());
    }

    let num_shards = table.height();
    info!(
        "Pushing dataset to hub: {} (num_shards={})",
        config.repo_id, num_shards
    );
    let options = PushOptions {
        num_shards,
        split: config.split.clone(),
        ..Default::default()
    };
    push_to_hub(client, &table, &features, &config.repo_id, &options, progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn piop1_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        write(
            &root.join("participants.tsv"),
            "participant_id\tage\tsex\thandedness\n\
             sub-0001\t22.0\tF\tright\n\
             sub-0002\t25.5\tM\tleft\n\
             sub-0003\t31.0\tF\tright\n",
        );

        write(&root.join("sub-0001/anat/sub-0001_T1w.nii.gz"), "t1");
        write(&root.join("sub-0001/dwi/sub-0001_dwi.nii.gz"), "dwi");
        write(
            &root.join("sub-0001/func/sub-0001_task-restingstate_bold.nii.gz"),
            "bold",
        );
        write(
            &root.join("sub-0001/func/sub-0001_task-workingmemory_bold.nii.gz"),
            "bold",
        );

        // sub-0002 has structural only
        write(&root.join("sub-0002/anat/sub-0002_T1w.nii.gz"), "t1");

        // sub-0003 has no directory at all

        dir
    }

    #[test]
    fn test_build_aomic_piop1_file_table() {
        let dir = piop1_tree();
        let df = build_aomic_piop1_file_table(dir.path()).unwrap();

        // sub-0003 is listed but has no directory
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 7);

        let bold = df
            .column("bold")
            .unwrap()
            .list()
            .unwrap()
            .get_as_series(0)
            .unwrap();
        assert_eq!(bold.len(), 2);

        let dwi1 = df
            .column("dwi")
            .unwrap()
            .list()
            .unwrap()
            .get_as_series(1)
            .unwrap();
        assert_eq!(dwi1.len(), 0);

        assert_eq!(df.column("age").unwrap().f32().unwrap().get(1), Some(25.5));
        assert_eq!(
            df.column("handedness").unwrap().str().unwrap().get(1),
            Some("left")
        );
    }

    #[test]
    fn test_build_aomic_piop1_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            build_aomic_piop1_file_table(&dir.path().join("nope")),
            Err(Error::InvalidBidsRoot(_))
        ));
    }

    #[test]
    fn test_aomic_piop1_features_schema() {
        let features = aomic_piop1_features();
        assert_eq!(features.len(), 7);
        assert_eq!(features.get("t1w"), Some(&Feature::Nifti));
        assert_eq!(
            features.get("bold"),
            Some(&Feature::Sequence(Box::new(Feature::Nifti)))
        );
    }

    #[test]
    fn test_aomic_piop1_table_builds_against_features() {
        let dir = piop1_tree();
        let df = build_aomic_piop1_file_table(dir.path()).unwrap();
        let table = crate::table::build_table(&df, &aomic_piop1_features()).unwrap();
        assert_eq!(table.width(), 7);
    }
}
