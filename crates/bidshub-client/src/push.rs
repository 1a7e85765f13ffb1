// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Memory-bounded sharded push to the dataset hub.
//!
//! Embedding NIfTI payloads turns a kilobyte-scale file table into a table
//! holding the full dataset (hundreds of gigabytes for longitudinal MRI
//! cohorts). The push therefore never materializes more than one shard:
//! each contiguous row slice is re-materialized, embedded, written to a
//! temporary Parquet file, uploaded, and deleted before the next slice is
//! touched. Peak memory is one embedded shard; peak disk is one shard file.
//!
//! Shard count is chosen by the caller; the dataset builders default to one
//! shard per row, which keeps a shard at the size of a single session's
//! images.

use crate::{
    Error,
    client::{HubClient, Progress},
    table::{Feature, Features},
};
use log::{error, info, warn};
use polars::prelude::*;
use std::path::Path;
use tokio::sync::mpsc::Sender;

/// Options for [`push_to_hub`].
#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Embed NIfTI file contents into the shards. Required for the pushed
    /// dataset to be usable by others; disable only for local testing.
    pub embed_external_files: bool,
    /// Number of Parquet shards. Values of 0 or 1 push a single shard; the
    /// count is clamped to the row count.
    pub num_shards: usize,
    /// Create the repository as private.
    pub private: bool,
    /// Target branch. Defaults to `main`.
    pub revision: Option<String>,
    /// Split name used in shard file names and the manifest.
    pub split: Option<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            embed_external_files: true,
            num_shards: 1,
            private: false,
            revision: None,
            split: None,
        }
    }
}

/// Contiguous shard partition: row offset and length of shard `index`.
///
/// With `r = rows % num_shards`, the first `r` shards carry one extra row,
/// so every row lands in exactly one shard and shard sizes differ by at
/// most one.
pub fn contiguous_shard_bounds(rows: usize, num_shards: usize, index: usize) -> (usize, usize) {
    let div = rows / num_shards;
    let rem = rows % num_shards;
    let len = div + usize::from(index < rem);
    let offset = index * div + index.min(rem);
    (offset, len)
}

/// Re-materialize a table slice as a fresh, single-chunk table.
///
/// Slices share chunked buffers with the parent table; the embed step is
/// defined only over contiguous single-chunk input, so every shard is
/// rebuilt from rechunked columns before embedding.
pub fn rematerialize(df: &DataFrame) -> Result<DataFrame, Error> {
    let columns: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|c| c.as_materialized_series().rechunk().into())
        .collect();
    Ok(DataFrame::new(columns)?)
}

fn read_payload(path: &str) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        error!("Failed to read payload {}: {}", path, e);
        Error::IoError(e)
    })
}

fn embed_path_column(column: &Column) -> Result<Column, Error> {
    let paths = column.str()?;
    let mut builder =
        BinaryChunkedBuilder::new(column.name().clone(), column.len());

    for path in paths.into_iter() {
        match path {
            Some(path) => builder.append_value(&read_payload(path)?),
            None => builder.append_null(),
        }
    }

    Ok(builder.finish().into_series().into())
}

fn embed_path_list_column(column: &Column) -> Result<Column, Error> {
    let lists = column.list()?;
    let mut rows: Vec<Series> = Vec::with_capacity(lists.len());

    for i in 0..lists.len() {
        let mut builder = BinaryChunkedBuilder::new("".into(), 0);
        if let Some(inner) = lists.get_as_series(i) {
            let paths = inner.str()?;
            for path in paths.into_iter() {
                match path {
                    Some(path) => builder.append_value(&read_payload(path)?),
                    None => builder.append_null(),
                }
            }
        }
        rows.push(builder.finish().into_series());
    }

    let series = Series::new(column.name().clone(), rows)
        .cast(&DataType::List(Box::new(DataType::Binary)))?;
    Ok(series.into())
}

/// Replace NIfTI path columns with the files' binary contents.
///
/// Scalar [`Feature::Nifti`] columns become Binary; `Sequence(Nifti)`
/// columns become List(Binary). Null paths stay null and empty lists stay
/// empty, but a non-null path that cannot be read is an error; silently
/// dropping an image would corrupt the pushed dataset.
pub fn embed_table_storage(df: &DataFrame, features: &Features) -> Result<DataFrame, Error> {
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        let feature = features.get(column.name().as_str());
        let embedded = match feature {
            Some(Feature::Nifti) => embed_path_column(column)?,
            Some(Feature::Sequence(inner)) if matches!(**inner, Feature::Nifti) => {
                embed_path_list_column(column)?
            }
            _ => column.clone(),
        };
        columns.push(embedded);
    }

    Ok(DataFrame::new(columns)?)
}

/// Build the dataset manifest describing the pushed table.
pub fn dataset_manifest(
    features: &Features,
    split: &str,
    num_rows: usize,
    shard_lengths: &[usize],
    num_bytes: u64,
) -> serde_json::Value {
    serde_json::json!({
        "features": features.to_manifest(),
        "splits": {
            split: {
                "name": split,
                "num_examples": num_rows,
                "num_bytes": num_bytes,
                "shard_lengths": shard_lengths,
            }
        },
        "download_size": num_bytes,
    })
}

/// Push a typed dataset table to the hub, shard by shard.
///
/// Creates the repository (tolerating prior existence), then for each
/// contiguous shard: re-materialize, embed, write Parquet, upload as
/// `data/{split}-{i:05}-of-{n:05}.parquet`, delete the local file. After
/// all shards, uploads a `dataset_info.json` manifest describing the full
/// table. `progress` receives one tick per completed shard.
///
/// The shard loop is strictly sequential; that sequencing, not any
/// concurrency control, is what bounds peak memory.
pub async fn push_to_hub(
    client: &HubClient,
    table: &DataFrame,
    features: &Features,
    repo_id: &str,
    options: &PushOptions,
    progress: Option<Sender<Progress>>,
) -> Result<(), Error> {
    let rows = table.height();
    let split = options.split.as_deref().unwrap_or("train");
    let revision = options.revision.as_deref();

    let num_shards = if rows == 0 {
        warn!("Table for {} has no rows; pushing manifest only", repo_id);
        0
    } else {
        options.num_shards.clamp(1, rows)
    };
    info!(
        "Pushing {} rows to {} in {} shard(s)",
        rows, repo_id, num_shards
    );

    client.create_repo(repo_id, options.private, true).await?;

    let tmpdir = tempfile::TempDir::new()?;
    let mut shard_lengths = Vec::with_capacity(num_shards);
    let mut total_bytes: u64 = 0;

    for index in 0..num_shards {
        let (offset, len) = contiguous_shard_bounds(rows, num_shards, index);
        shard_lengths.push(len);

        let shard = table.slice(offset as i64, len);
        let fresh = rematerialize(&shard)?;
        drop(shard);

        let mut embedded = if options.embed_external_files {
            embed_table_storage(&fresh, features)?
        } else {
            fresh
        };

        let shard_name = format!("{}-{:05}-of-{:05}.parquet", split, index, num_shards);
        let local_path = tmpdir.path().join(&shard_name);
        write_parquet(&local_path, &mut embedded)?;
        drop(embedded);

        total_bytes += std::fs::metadata(&local_path)?.len();

        let message = format!("Upload shard {}/{}", index + 1, num_shards);
        if let Err(e) = client
            .upload_file(
                repo_id,
                &local_path,
                &format!("data/{}", shard_name),
                revision,
                &message,
                None,
            )
            .await
        {
            error!("Failed to upload shard {}: {}", index, e);
            return Err(e);
        }

        // Remove immediately so local disk holds at most one shard
        std::fs::remove_file(&local_path)?;

        if let Some(ref tx) = progress {
            let _ = tx
                .send(Progress {
                    current: index + 1,
                    total: num_shards,
                })
                .await;
        }
    }

    info!("Generating and uploading dataset manifest");
    let manifest = dataset_manifest(features, split, rows, &shard_lengths, total_bytes);
    let manifest_path = tmpdir.path().join("dataset_info.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    client
        .upload_file(
            repo_id,
            &manifest_path,
            "dataset_info.json",
            revision,
            "Upload dataset metadata",
            None,
        )
        .await?;

    info!("Memory-efficient upload to {} complete", repo_id);
    Ok(())
}

fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<(), Error> {
    let file = std::fs::File::create(path)?;
    ParquetWriter::new(file).finish(df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{f32_column, str_column, str_list_column};
    use std::fs;
    use tempfile::TempDir;

    fn sample_features() -> Features {
        Features::new(vec![
            ("subject_id", Feature::String),
            ("t1w", Feature::Nifti),
            ("dwi", Feature::Sequence(Box::new(Feature::Nifti))),
            ("age", Feature::Float32),
        ])
    }

    #[test]
    fn test_contiguous_shard_bounds_even() {
        let bounds: Vec<_> = (0..5)
            .map(|i| contiguous_shard_bounds(10, 5, i))
            .collect();
        assert_eq!(bounds, vec![(0, 2), (2, 2), (4, 2), (6, 2), (8, 2)]);
    }

    #[test]
    fn test_contiguous_shard_bounds_remainder() {
        // 10 rows over 3 shards: first shard gets the extra row
        let bounds: Vec<_> = (0..3)
            .map(|i| contiguous_shard_bounds(10, 3, i))
            .collect();
        assert_eq!(bounds, vec![(0, 4), (4, 3), (7, 3)]);

        // Every row covered exactly once
        let total: usize = bounds.iter().map(|(_, len)| len).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_contiguous_shard_bounds_one_per_row() {
        for i in 0..4 {
            assert_eq!(contiguous_shard_bounds(4, 4, i), (i, 1));
        }
    }

    #[test]
    fn test_rematerialize_single_chunk() {
        let a = DataFrame::new(vec![str_column("x", vec![Some("a".to_string())])]).unwrap();
        let b = DataFrame::new(vec![str_column("x", vec![Some("b".to_string())])]).unwrap();
        let combined = a.vstack(&b).unwrap();
        let chunks = |df: &DataFrame| df.get_columns()[0].as_materialized_series().n_chunks();
        assert!(chunks(&combined) > 1);

        let fresh = rematerialize(&combined).unwrap();
        assert_eq!(chunks(&fresh), 1);
        assert_eq!(fresh.height(), 2);
    }

    #[test]
    fn test_embed_table_storage() {
        let dir = TempDir::new().unwrap();
        let t1w_path = dir.path().join("sub-01_T1w.nii.gz");
        let dwi_path = dir.path().join("sub-01_dwi.nii.gz");
        fs::write(&t1w_path, b"T1W-PAYLOAD").unwrap();
        fs::write(&dwi_path, b"DWI-PAYLOAD").unwrap();

        let df = DataFrame::new(vec![
            str_column(
                "subject_id",
                vec![Some("sub-01".to_string()), Some("sub-02".to_string())],
            ),
            str_column(
                "t1w",
                vec![Some(t1w_path.to_string_lossy().into_owned()), None],
            ),
            str_list_column(
                "dwi",
                vec![vec![dwi_path.to_string_lossy().into_owned()], vec![]],
            )
            .unwrap(),
            f32_column("age", vec![Some(42.0), Some(39.0)]),
        ])
        .unwrap();

        let embedded = embed_table_storage(&df, &sample_features()).unwrap();

        let t1w = embedded.column("t1w").unwrap();
        assert_eq!(t1w.dtype(), &DataType::Binary);
        let t1w = t1w.binary().unwrap();
        assert_eq!(t1w.get(0), Some(b"T1W-PAYLOAD".as_slice()));
        assert_eq!(t1w.get(1), None);

        let dwi = embedded.column("dwi").unwrap();
        assert_eq!(
            dwi.dtype(),
            &DataType::List(Box::new(DataType::Binary))
        );
        let dwi = dwi.list().unwrap();
        let first = dwi.get_as_series(0).unwrap();
        assert_eq!(
            first.binary().unwrap().get(0),
            Some(b"DWI-PAYLOAD".as_slice())
        );
        assert_eq!(dwi.get_as_series(1).unwrap().len(), 0);

        // Metadata columns pass through untouched
        assert_eq!(
            embedded.column("age").unwrap().dtype(),
            &DataType::Float32
        );
    }

    #[test]
    fn test_embed_table_storage_missing_file() {
        let df = DataFrame::new(vec![
            str_column("subject_id", vec![Some("sub-01".to_string())]),
            str_column("t1w", vec![Some("/nonexistent/file.nii.gz".to_string())]),
            str_list_column("dwi", vec![vec![]]).unwrap(),
            f32_column("age", vec![None]),
        ])
        .unwrap();

        assert!(embed_table_storage(&df, &sample_features()).is_err());
    }

    #[test]
    fn test_dataset_manifest() {
        let manifest = dataset_manifest(&sample_features(), "train", 10, &[4, 3, 3], 1234);
        assert_eq!(manifest["splits"]["train"]["num_examples"], 10);
        assert_eq!(manifest["splits"]["train"]["shard_lengths"][0], 4);
        assert_eq!(manifest["download_size"], 1234);
        assert_eq!(manifest["features"]["t1w"]["_type"], "Nifti");
    }

    #[test]
    fn test_write_parquet_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shard.parquet");

        let mut df = DataFrame::new(vec![
            str_column("subject_id", vec![Some("sub-01".to_string())]),
            f32_column("age", vec![Some(42.0)]),
        ])
        .unwrap();
        write_parquet(&path, &mut df).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let read = ParquetReader::new(file).finish().unwrap();
        assert_eq!(read.height(), 1);
        assert_eq!(read.get_column_names_str(), vec!["subject_id", "age"]);
    }
}
