// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! ISLES'24 (Ischemic Stroke Lesion Segmentation 2024) dataset builder.
//!
//! Converts the ISLES'24 dataset (Zenodo record 17652035, v7, CC BY-NC-SA)
//! into a hub dataset with one row per subject: acute admission imaging
//! (ses-01) and follow-up imaging (ses-02) are flattened into the same row,
//! matching the ML task of predicting the follow-up lesion from acute
//! inputs.
//!
//! Zenodo v7 layout (note `raw_data` with an underscore, sessions `ses-01`
//! and `ses-02`, and per-subject derivative directories):
//!
//! ```text
//! train/
//! ├── clinical_data-description.xlsx
//! ├── raw_data/sub-stroke0001/ses-01/
//! │   ├── sub-stroke0001_ses-01_ncct.nii.gz
//! │   └── perfusion-maps/
//! ├── derivatives/sub-stroke0001/
//! │   ├── ses-01/perfusion-maps/*_space-ncct_tmax.nii.gz   (lowercase)
//! │   └── ses-02/*_space-ncct_{dwi,adc,lesion-msk}.nii.gz
//! └── phenotype/sub-stroke0001/ses-0{1,2}/*.xlsx
//! ```

use crate::{
    Error,
    bids::{find_single_nifti, subject_dirs},
    client::{HubClient, Progress},
    datasets::BuilderConfig,
    push::{PushOptions, push_to_hub},
    table::{Feature, Features, build_table, f32_column, str_column},
};
use calamine::{Data, Reader as _, Xlsx, open_workbook};
use log::{debug, info};
use polars::prelude::*;
use std::path::Path;
use tokio::sync::mpsc::Sender;

/// Exact phenotype column names from the Zenodo v7 workbooks, mapped to
/// schema field names. Exact matching only; substring matching once mapped
/// `mRS at admission` onto the 3-month outcome.
const PHENOTYPE_COLUMNS: &[(&str, &str)] = &[
    ("Age", "age"),
    ("Sex", "sex"),
    ("NIHSS at admission", "nihss_admission"),
    ("mRS at admission", "mrs_admission"),
    ("mRS 3 months", "mrs_3month"),
];

/// Clinical metadata for one subject, parsed from the phenotype workbooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhenotypeMeta {
    pub age: Option<f32>,
    pub sex: Option<String>,
    pub nihss_admission: Option<f32>,
    pub mrs_admission: Option<f32>,
    pub mrs_3month: Option<f32>,
}

fn cell_to_f32(cell: &Data) -> Option<f32> {
    match cell {
        Data::Float(v) => Some(*v as f32),
        Data::Int(v) => Some(*v as f32),
        Data::String(s) => s.trim().parse::<f32>().ok(),
        _ => None,
    }
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Data::Float(v) => Some(v.to_string()),
        Data::Int(v) => Some(v.to_string()),
        _ => None,
    }
}

/// Fold one workbook row into the metadata, first value wins per field.
fn apply_phenotype_row(meta: &mut PhenotypeMeta, headers: &[String], row: &[Data]) {
    for (column, field) in PHENOTYPE_COLUMNS {
        let Some(index) = headers.iter().position(|h| h == column) else {
            continue;
        };
        let Some(cell) = row.get(index) else {
            continue;
        };
        match *field {
            "age" if meta.age.is_none() => meta.age = cell_to_f32(cell),
            "sex" if meta.sex.is_none() => meta.sex = cell_to_string(cell),
            "nihss_admission" if meta.nihss_admission.is_none() => {
                meta.nihss_admission = cell_to_f32(cell)
            }
            "mrs_admission" if meta.mrs_admission.is_none() => {
                meta.mrs_admission = cell_to_f32(cell)
            }
            "mrs_3month" if meta.mrs_3month.is_none() => meta.mrs_3month = cell_to_f32(cell),
            _ => {}
        }
    }
}

fn read_phenotype_xlsx(path: &Path, meta: &mut PhenotypeMeta) -> Result<(), Error> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(());
    };
    let range = range?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(());
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();

    if let Some(first_row) = rows.next() {
        apply_phenotype_row(meta, &headers, first_row);
    }
    Ok(())
}

/// Load phenotype metadata for one subject.
///
/// Zenodo v7 splits the workbooks across sessions: the ses-01 file carries
/// demographics and admission scores, the ses-02 file the 3-month outcome.
/// Missing directories and unreadable workbooks degrade to absent values
/// rather than failing the build; clinical metadata is incomplete for some
/// subjects by design.
pub fn load_phenotype(phenotype_root: &Path, subject_id: &str) -> PhenotypeMeta {
    let mut meta = PhenotypeMeta::default();

    let subject_dir = phenotype_root.join(subject_id);
    if !subject_dir.exists() {
        return meta;
    }

    for session in ["ses-01", "ses-02"] {
        let session_dir = subject_dir.join(session);
        let Ok(entries) = std::fs::read_dir(&session_dir) else {
            continue;
        };
        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "xlsx"))
            .collect();
        files.sort();

        for file in files {
            if let Err(e) = read_phenotype_xlsx(&file, &mut meta) {
                debug!("Error reading {}: {}", file.display(), e);
            }
        }
    }

    meta
}

struct Isles24Row {
    subject_id: String,
    ncct: Option<String>,
    cta: Option<String>,
    ctp: Option<String>,
    tmax: Option<String>,
    mtt: Option<String>,
    cbf: Option<String>,
    cbv: Option<String>,
    dwi: Option<String>,
    adc: Option<String>,
    lesion_mask: Option<String>,
    lvo_mask: Option<String>,
    cow_segmentation: Option<String>,
    meta: PhenotypeMeta,
}

/// Build the ISLES'24 file table: one row per subject.
///
/// Subjects are enumerated from `raw_data/sub-*`. Raw CTA/CTP are preferred
/// with the NCCT-space derivative as fallback; perfusion maps and follow-up
/// imaging come from the derivatives tree. Every imaging column is a single
/// optional file.
pub fn build_isles24_file_table(bids_root: &Path) -> Result<DataFrame, Error> {
    let raw_data_root = bids_root.join("raw_data");
    let derivatives_root = bids_root.join("derivatives");
    let phenotype_root = bids_root.join("phenotype");

    if !raw_data_root.exists() {
        return Err(Error::InvalidBidsRoot(format!(
            "raw_data directory not found at {}",
            raw_data_root.display()
        )));
    }

    let mut rows = Vec::new();

    for subject_dir in subject_dirs(&raw_data_root) {
        let subject_id = subject_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // Session 01, raw: CT files live directly in ses-01/
        let ses01_raw = subject_dir.join("ses-01");
        let ncct = find_single_nifti(&ses01_raw, "*_ncct.nii.gz");
        let cta = find_single_nifti(&ses01_raw, "*_cta.nii.gz");
        let ctp = find_single_nifti(&ses01_raw, "*_ctp.nii.gz");

        // Derivatives, registered to NCCT space
        let deriv_subject = derivatives_root.join(&subject_id);
        let ses01_deriv = deriv_subject.join("ses-01");

        let perf = ses01_deriv.join("perfusion-maps");
        let tmax = find_single_nifti(&perf, "*_space-ncct_tmax.nii.gz");
        let mtt = find_single_nifti(&perf, "*_space-ncct_mtt.nii.gz");
        let cbf = find_single_nifti(&perf, "*_space-ncct_cbf.nii.gz");
        let cbv = find_single_nifti(&perf, "*_space-ncct_cbv.nii.gz");

        let cta_deriv = find_single_nifti(&ses01_deriv, "*_space-ncct_cta.nii.gz");
        let ctp_deriv = find_single_nifti(&ses01_deriv, "*_space-ncct_ctp.nii.gz");
        let lvo_mask = find_single_nifti(&ses01_deriv, "*_space-ncct_lvo-msk.nii.gz");
        let cow_segmentation = find_single_nifti(&ses01_deriv, "*_space-ncct_cow-msk.nii.gz");

        // Session 02, follow-up MRI from derivatives
        let ses02_deriv = deriv_subject.join("ses-02");
        let dwi = find_single_nifti(&ses02_deriv, "*_space-ncct_dwi.nii.gz");
        let adc = find_single_nifti(&ses02_deriv, "*_space-ncct_adc.nii.gz");
        let lesion_mask = find_single_nifti(&ses02_deriv, "*_space-ncct_lesion-msk.nii.gz");

        let meta = load_phenotype(&phenotype_root, &subject_id);

        rows.push(Isles24Row {
            subject_id,
            ncct,
            cta: cta.or(cta_deriv),
            ctp: ctp.or(ctp_deriv),
            tmax,
            mtt,
            cbf,
            cbv,
            dwi,
            adc,
            lesion_mask,
            lvo_mask,
            cow_segmentation,
            meta,
        });
    }

    info!("Built ISLES'24 file table with {} subjects", rows.len());

    let columns = vec![
        str_column(
            "subject_id",
            rows.iter().map(|r| Some(r.subject_id.clone())).collect(),
        ),
        str_column("ncct", rows.iter().map(|r| r.ncct.clone()).collect()),
        str_column("cta", rows.iter().map(|r| r.cta.clone()).collect()),
        str_column("ctp", rows.iter().map(|r| r.ctp.clone()).collect()),
        str_column("tmax", rows.iter().map(|r| r.tmax.clone()).collect()),
        str_column("mtt", rows.iter().map(|r| r.mtt.clone()).collect()),
        str_column("cbf", rows.iter().map(|r| r.cbf.clone()).collect()),
        str_column("cbv", rows.iter().map(|r| r.cbv.clone()).collect()),
        str_column("dwi", rows.iter().map(|r| r.dwi.clone()).collect()),
        str_column("adc", rows.iter().map(|r| r.adc.clone()).collect()),
        str_column(
            "lesion_mask",
            rows.iter().map(|r| r.lesion_mask.clone()).collect(),
        ),
        str_column(
            "lvo_mask",
            rows.iter().map(|r| r.lvo_mask.clone()).collect(),
        ),
        str_column(
            "cow_segmentation",
            rows.iter().map(|r| r.cow_segmentation.clone()).collect(),
        ),
        f32_column("age", rows.iter().map(|r| r.meta.age).collect()),
        str_column("sex", rows.iter().map(|r| r.meta.sex.clone()).collect()),
        f32_column(
            "nihss_admission",
            rows.iter().map(|r| r.meta.nihss_admission).collect(),
        ),
        f32_column(
            "mrs_admission",
            rows.iter().map(|r| r.meta.mrs_admission).collect(),
        ),
        f32_column(
            "mrs_3month",
            rows.iter().map(|r| r.meta.mrs_3month).collect(),
        ),
    ];

    Ok(DataFrame::new(columns)?)
}

/// The flattened ISLES'24 schema: 18 columns, one row per subject.
pub fn isles24_features() -> Features {
    Features::new(vec![
        ("subject_id", Feature::String),
        // Acute (ses-01)
        ("ncct", Feature::Nifti),
        ("cta", Feature::Nifti),
        ("ctp", Feature::Nifti),
        // Perfusion maps
        ("tmax", Feature::Nifti),
        ("mtt", Feature::Nifti),
        ("cbf", Feature::Nifti),
        ("cbv", Feature::Nifti),
        // Follow-up (ses-02)
        ("dwi", Feature::Nifti),
        ("adc", Feature::Nifti),
        // Masks
        ("lesion_mask", Feature::Nifti),
        ("lvo_mask", Feature::Nifti),
        ("cow_segmentation", Feature::Nifti),
        // Clinical metadata from the phenotype workbooks
        ("age", Feature::Float32),
        ("sex", Feature::String),
        ("nihss_admission", Feature::Float32),
        ("mrs_admission", Feature::Float32),
        ("mrs_3month", Feature::Float32),
    ])
}

/// Build the ISLES'24 table and push it to the hub unless `dry_run` is set.
pub async fn build_and_push_isles24(
    client: &HubClient,
    config: &BuilderConfig,
    progress: Option<Sender<Progress>>,
) -> Result<(), Error> {
    info!(
        "Building ISLES'24 file table from {}",
        config.bids_root.display()
    );
    let file_table = build_isles24_file_table(&config.bids_root)?;
    info!("Found {} subjects", file_table.height());

    let features = isles24_features();
    let table = build_table(&file_table, &features)?;

    if config.dry_run {
        info!("Dry run complete: dataset built but not pushed");
        return Ok(());
    }

    // One shard per subject to bound embedding memory
    let num_shards = table.height();
    info!(
        "Pushing to {} with num_shards={}",
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

    fn isles_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        // Subject 1: raw CTA present
        let s1 = "sub-stroke0001";
        write(
            &root.join(format!("raw_data/{s1}/ses-01/{s1}_ses-01_ncct.nii.gz")),
            "ncct",
        );
        write(
            &root.join(format!("raw_data/{s1}/ses-01/{s1}_ses-01_cta.nii.gz")),
            "cta-raw",
        );
        write(
            &root.join(format!(
                "derivatives/{s1}/ses-01/perfusion-maps/{s1}_ses-01_space-ncct_tmax.nii.gz"
            )),
            "tmax",
        );
        write(
            &root.join(format!(
                "derivatives/{s1}/ses-02/{s1}_ses-02_space-ncct_dwi.nii.gz"
            )),
            "dwi",
        );
        write(
            &root.join(format!(
                "derivatives/{s1}/ses-02/{s1}_ses-02_space-ncct_lesion-msk.nii.gz"
            )),
            "lesion",
        );

        // Subject 2: no raw CTA, only the NCCT-space derivative
        let s2 = "sub-stroke0002";
        write(
            &root.join(format!("raw_data/{s2}/ses-01/{s2}_ses-01_ncct.nii.gz")),
            "ncct",
        );
        write(
            &root.join(format!(
                "derivatives/{s2}/ses-01/{s2}_ses-01_space-ncct_cta.nii.gz"
            )),
            "cta-deriv",
        );

        dir
    }

    #[test]
    fn test_build_isles24_file_table() {
        let dir = isles_tree();
        let df = build_isles24_file_table(dir.path()).unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 18);

        let cell = |name: &str, row: usize| {
            df.column(name)
                .unwrap()
                .str()
                .unwrap()
                .get(row)
                .map(|s| s.to_string())
        };

        assert_eq!(cell("subject_id", 0), Some("sub-stroke0001".to_string()));
        assert!(cell("ncct", 0).unwrap().ends_with("_ncct.nii.gz"));
        // Raw CTA preferred for subject 1
        assert!(cell("cta", 0).unwrap().contains("raw_data"));
        // Derivative fallback for subject 2
        assert!(cell("cta", 1).unwrap().contains("derivatives"));
        assert!(cell("tmax", 0).is_some());
        assert!(cell("tmax", 1).is_none());
        assert!(cell("lesion_mask", 0).unwrap().ends_with("lesion-msk.nii.gz"));

        // No phenotype directory: clinical metadata is absent
        assert_eq!(df.column("age").unwrap().f32().unwrap().get(0), None);
    }

    #[test]
    fn test_build_isles24_missing_raw_data() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            build_isles24_file_table(dir.path()),
            Err(Error::InvalidBidsRoot(_))
        ));
    }

    #[test]
    fn test_apply_phenotype_row() {
        let headers: Vec<String> = ["Age", "Sex", "NIHSS at admission", "mRS at admission"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let row = vec![
            Data::Float(71.0),
            Data::String("F".to_string()),
            Data::Int(14),
            Data::Float(3.0),
        ];

        let mut meta = PhenotypeMeta::default();
        apply_phenotype_row(&mut meta, &headers, &row);

        assert_eq!(meta.age, Some(71.0));
        assert_eq!(meta.sex, Some("F".to_string()));
        assert_eq!(meta.nihss_admission, Some(14.0));
        assert_eq!(meta.mrs_admission, Some(3.0));
        assert_eq!(meta.mrs_3month, None);
    }

    #[test]
    fn test_apply_phenotype_row_exact_match_only() {
        // A column that merely contains "mRS" must not map onto either mRS field
        let headers: Vec<String> = ["mRS at discharge".to_string()].to_vec();
        let row = vec![Data::Float(2.0)];

        let mut meta = PhenotypeMeta::default();
        apply_phenotype_row(&mut meta, &headers, &row);
        assert_eq!(meta.mrs_admission, None);
        assert_eq!(meta.mrs_3month, None);
    }

    #[test]
    fn test_apply_phenotype_row_first_value_wins() {
        let headers: Vec<String> = ["Age".to_string()].to_vec();

        let mut meta = PhenotypeMeta::default();
        apply_phenotype_row(&mut meta, &headers, &[Data::Float(70.0)]);
        apply_phenotype_row(&mut meta, &headers, &[Data::Float(99.0)]);
        assert_eq!(meta.age, Some(70.0));
    }

    #[test]
    fn test_load_phenotype_missing_dir() {
        let dir = TempDir::new().unwrap();
        let meta = load_phenotype(&dir.path().join("phenotype"), "sub-stroke0001");
        assert_eq!(meta, PhenotypeMeta::default());
    }

    #[test]
    fn test_isles24_features_schema() {
        let features = isles24_features();
        assert_eq!(features.len(), 18);
        assert_eq!(features.get("ncct"), Some(&Feature::Nifti));
        assert_eq!(features.get("mrs_3month"), Some(&Feature::Float32));
    }
}
