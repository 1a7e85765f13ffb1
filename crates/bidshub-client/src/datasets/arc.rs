// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! ARC (Aphasia Recovery Cohort) dataset builder.
//!
//! Converts the ARC BIDS dataset (OpenNeuro ds004884, CC0) into a hub
//! dataset with one row per scanning session.
//!
//! The cohort covers 230 chronic stroke patients over 902 longitudinal
//! sessions: structural MRI (T1w/T2w/FLAIR), BOLD fMRI for a picture-naming
//! task and resting state, diffusion imaging with gradient tables,
//! single-band reference images, expert-drawn lesion masks under
//! `derivatives/lesion_masks/`, and demographic/clinical metadata
//! (age at stroke, sex, race, WAB aphasia scores) from `participants.tsv`.

use crate::{
    Error,
    bids::{
        find_all_niftis, find_single_nifti, opt_f32_cell, opt_str_cell, read_gradient_file,
        read_participants_tsv, session_dirs,
    },
    client::{HubClient, Progress},
    datasets::BuilderConfig,
    push::{PushOptions, push_to_hub},
    table::{Feature, Features, build_table, f32_column, str_column, str_list_column},
};
use log::{info, warn};
use polars::prelude::*;
use std::path::Path;
use tokio::sync::mpsc::Sender;

/// ARC T2w acquisition code mapping (exact match, not substring).
const ACQUISITION_MAP: &[(&str, &str)] = &[
    ("spc3p2", "space_2x"),
    ("spc3", "space_no_accel"),
    ("tse3", "turbo_spin_echo"),
];

/// Extract the acquisition type from a BIDS filename.
///
/// BIDS filenames carry an `acq-<label>` entity. Known ARC codes map to
/// readable names; unknown labels pass through unchanged so new acquisition
/// codes don't silently disappear; a path without the entity yields `None`.
fn extract_acquisition_type(filepath: Option<&str>) -> Option<String> {
    let lowered = filepath?.to_lowercase();
    let start = lowered.find("acq-")? + 4;
    let label: String = lowered[start..]
        .chars()
        .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    if label.is_empty() {
        return None;
    }

    // Exact-match lookup: "spc3foo" must stay "spc3foo", not map via "spc3"
    Some(
        ACQUISITION_MAP
            .iter()
            .find(|(code, _)| *code == label)
            .map(|(_, name)| name.to_string())
            .unwrap_or(label),
    )
}

struct ArcRow {
    subject_id: String,
    session_id: String,
    t1w: Vec<String>,
    t2w: Vec<String>,
    t2w_acquisition: Option<String>,
    flair: Vec<String>,
    bold_naming40: Vec<String>,
    bold_rest: Vec<String>,
    dwi: Vec<String>,
    dwi_bvals: Vec<String>,
    dwi_bvecs: Vec<String>,
    sbref: Vec<String>,
    lesion: Option<String>,
    age_at_stroke: Option<f32>,
    sex: Option<String>,
    race: Option<String>,
    wab_aq: Option<f32>,
    wab_days: Option<f32>,
    wab_type: Option<String>,
}

/// Build the ARC file table: one row per session.
///
/// Walks every subject listed in `participants.tsv` and every `ses-*`
/// directory under it, collecting all runs of each modality (sorted by file
/// name, absolute paths) plus per-subject metadata. Subjects without a
/// directory or without sessions are skipped and summarized in a warning.
///
/// DWI rows carry the companion `.bval`/`.bvec` contents aligned index-for-
/// index with the `dwi` paths; a missing gradient file is an error, since
/// the source dataset has a verified 1:1 match.
///
/// BOLD runs are split by task into `bold_naming40` and `bold_rest`; any
/// other task entity aborts the build rather than dropping data silently.
pub fn build_arc_file_table(bids_root: &Path) -> Result<DataFrame, Error> {
    if !bids_root.exists() {
        return Err(Error::InvalidBidsRoot(format!(
            "BIDS root does not exist: {}",
            bids_root.display()
        )));
    }
    if !bids_root.is_dir() {
        return Err(Error::InvalidBidsRoot(format!(
            "BIDS root is not a directory: {}",
            bids_root.display()
        )));
    }

    let participants = read_participants_tsv(bids_root)?;
    let total_in_tsv = participants.height();

    let mut rows: Vec<ArcRow> = Vec::new();
    let mut subjects_found = 0usize;
    let mut subjects_missing_dir = 0usize;
    let mut subjects_no_sessions = 0usize;

    for i in 0..total_in_tsv {
        let Some(subject_id) = opt_str_cell(&participants, "participant_id", i) else {
            warn!("participants.tsv row {} has no participant_id, skipping", i);
            continue;
        };
        let subject_dir = bids_root.join(&subject_id);

        if !subject_dir.exists() {
            subjects_missing_dir += 1;
            continue;
        }

        let sessions = session_dirs(&subject_dir);
        if sessions.is_empty() {
            subjects_no_sessions += 1;
            continue;
        }
        subjects_found += 1;

        // Subject-level metadata, repeated on every session row
        let age_at_stroke = opt_f32_cell(&participants, "age_at_stroke", i, &subject_id);
        let wab_aq = opt_f32_cell(&participants, "wab_aq", i, &subject_id);
        let wab_days = opt_f32_cell(&participants, "wab_days", i, &subject_id);
        let sex = opt_str_cell(&participants, "sex", i);
        let race = opt_str_cell(&participants, "race", i);
        let wab_type = opt_str_cell(&participants, "wab_type", i);

        for session_dir in &sessions {
            let session_id = session_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let anat = session_dir.join("anat");
            let t1w = find_all_niftis(&anat, "*_T1w.nii.gz");
            let t2w = find_all_niftis(&anat, "*_T2w.nii.gz");
            // All runs of a session use the same sequence; the first T2w
            // determines the acquisition type
            let t2w_acquisition = extract_acquisition_type(t2w.first().map(String::as_str));
            let flair = find_all_niftis(&anat, "*_FLAIR.nii.gz");

            // BIDS is case-sensitive; the source has only lowercase task names
            let bold_all = find_all_niftis(&session_dir.join("func"), "*_bold.nii.gz");
            let bold_naming40: Vec<String> = bold_all
                .iter()
                .filter(|p| p.contains("task-naming40"))
                .cloned()
                .collect();
            let bold_rest: Vec<String> = bold_all
                .iter()
                .filter(|p| p.contains("task-rest"))
                .cloned()
                .collect();

            // Guardrail: ARC only has naming40 and rest tasks, so any other
            // task entity means rows would silently lose runs
            let unexpected: Vec<&String> = bold_all
                .iter()
                .filter(|p| !p.contains("task-naming40") && !p.contains("task-rest"))
                .collect();
            if !unexpected.is_empty() {
                let names: Vec<String> = unexpected
                    .iter()
                    .take(3)
                    .filter_map(|p| {
                        Path::new(p)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                    })
                    .collect();
                return Err(Error::UnexpectedBoldTask(format!(
                    "{}/{}: {:?} (showing up to 3)",
                    subject_id, session_id, names
                )));
            }

            let dwi_dir = session_dir.join("dwi");
            let dwi = find_all_niftis(&dwi_dir, "*_dwi.nii.gz");
            let dwi_bvals = dwi
                .iter()
                .map(|p| read_gradient_file(p, ".bval"))
                .collect::<Result<Vec<_>, _>>()?;
            let dwi_bvecs = dwi
                .iter()
                .map(|p| read_gradient_file(p, ".bvec"))
                .collect::<Result<Vec<_>, _>>()?;
            let sbref = find_all_niftis(&dwi_dir, "*_sbref.nii.gz");

            let lesion_dir = bids_root
                .join("derivatives")
                .join("lesion_masks")
                .join(&subject_id)
                .join(&session_id)
                .join("anat");
            let lesion = find_single_nifti(&lesion_dir, "*_desc-lesion_mask.nii.gz");

            rows.push(ArcRow {
                subject_id: subject_id.clone(),
                session_id,
                t1w,
                t2w,
                t2w_acquisition: t2w_acquisition.clone(),
                flair,
                bold_naming40,
                bold_rest,
                dwi,
                dwi_bvals,
                dwi_bvecs,
                sbref,
                lesion,
                age_at_stroke,
                sex: sex.clone(),
                race: race.clone(),
                wab_aq,
                wab_days,
                wab_type: wab_type.clone(),
            });
        }
    }

    let skipped = subjects_missing_dir + subjects_no_sessions;
    if skipped > 0 {
        warn!(
            "Built file table with {} sessions from {} subjects \
             (participants.tsv lists {}; {} missing directories, {} with no sessions)",
            rows.len(),
            subjects_found,
            total_in_tsv,
            subjects_missing_dir,
            subjects_no_sessions
        );
    } else {
        info!(
            "Built file table with {} sessions from {} subjects",
            rows.len(),
            subjects_found
        );
    }

    arc_rows_to_dataframe(rows)
}

fn arc_rows_to_dataframe(rows: Vec<ArcRow>) -> Result<DataFrame, Error> {
    let columns = vec![
        str_column(
            "subject_id",
            rows.iter().map(|r| Some(r.subject_id.clone())).collect(),
        ),
        str_column(
            "session_id",
            rows.iter().map(|r| Some(r.session_id.clone())).collect(),
        ),
        str_list_column("t1w", rows.iter().map(|r| r.t1w.clone()).collect())?,
        str_list_column("t2w", rows.iter().map(|r| r.t2w.clone()).collect())?,
        str_column(
            "t2w_acquisition",
            rows.iter().map(|r| r.t2w_acquisition.clone()).collect(),
        ),
        str_list_column("flair", rows.iter().map(|r| r.flair.clone()).collect())?,
        str_list_column(
            "bold_naming40",
            rows.iter().map(|r| r.bold_naming40.clone()).collect(),
        )?,
        str_list_column(
            "bold_rest",
            rows.iter().map(|r| r.bold_rest.clone()).collect(),
        )?,
        str_list_column("dwi", rows.iter().map(|r| r.dwi.clone()).collect())?,
        str_list_column(
            "dwi_bvals",
            rows.iter().map(|r| r.dwi_bvals.clone()).collect(),
        )?,
        str_list_column(
            "dwi_bvecs",
            rows.iter().map(|r| r.dwi_bvecs.clone()).collect(),
        )?,
        str_list_column("sbref", rows.iter().map(|r| r.sbref.clone()).collect())?,
        str_column("lesion", rows.iter().map(|r| r.lesion.clone()).collect()),
        f32_column(
            "age_at_stroke",
            rows.iter().map(|r| r.age_at_stroke).collect(),
        ),
        str_column("sex", rows.iter().map(|r| r.sex.clone()).collect()),
        str_column("race", rows.iter().map(|r| r.race.clone()).collect()),
        f32_column("wab_aq", rows.iter().map(|r| r.wab_aq).collect()),
        f32_column("wab_days", rows.iter().map(|r| r.wab_days).collect()),
        str_column("wab_type", rows.iter().map(|r| r.wab_type.clone()).collect()),
    ];

    Ok(DataFrame::new(columns)?)
}

/// The ARC schema: 19 columns, one row per session.
///
/// Structural and functional modalities are sequences (multiple runs per
/// session); the lesion mask is a single optional image; `dwi_bvals` and
/// `dwi_bvecs` are string sequences aligned with `dwi`.
pub fn arc_features() -> Features {
    Features::new(vec![
        ("subject_id", Feature::String),
        ("session_id", Feature::String),
        ("t1w", Feature::Sequence(Box::new(Feature::Nifti))),
        ("t2w", Feature::Sequence(Box::new(Feature::Nifti))),
        ("t2w_acquisition", Feature::String),
        ("flair", Feature::Sequence(Box::new(Feature::Nifti))),
        ("bold_naming40", Feature::Sequence(Box::new(Feature::Nifti))),
        ("bold_rest", Feature::Sequence(Box::new(Feature::Nifti))),
        ("dwi", Feature::Sequence(Box::new(Feature::Nifti))),
        ("dwi_bvals", Feature::Sequence(Box::new(Feature::String))),
        ("dwi_bvecs", Feature::Sequence(Box::new(Feature::String))),
        ("sbref", Feature::Sequence(Box::new(Feature::Nifti))),
        ("lesion", Feature::Nifti),
        ("age_at_stroke", Feature::Float32),
        ("sex", Feature::String),
        ("race", Feature::String),
        ("wab_aq", Feature::Float32),
        ("wab_days", Feature::Float32),
        ("wab_type", Feature::String),
    ])
}

/// Build the ARC table and push it to the hub unless `dry_run` is set.
///
/// Pushes with one shard per session: the manifest size estimate is based
/// on file paths, but embedding makes the real table hundreds of gigabytes,
/// so a single in-memory shard would exhaust RAM. One session per shard
/// keeps shards in the hundreds of megabytes.
pub async fn build_and_push_arc(
    client: &HubClient,
    config: &BuilderConfig,
    progress: Option<Sender<Progress>>,
) -> Result<(), Error> {
    let file_table = build_arc_file_table(&config.bids_root)?;
    let features = arc_features();
    let table = build_table(&file_table, &features)?;

    if config.dry_run {
        info!("Dry run complete: {} sessions, push skipped", table.height());
        return Ok(());
    }

    let num_shards = table.height();
    info!("Pushing to hub with num_shards={} to bound memory", num_shards);
    let options = PushOptions {
        num_shards,
        split: config.split.clone(),
        ..Default::default()
    };
    push_to_hub(client, &table, &features, &config.repo_id, &options, progress).await
}
