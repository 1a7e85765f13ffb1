// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! File table and features schema.
//!
//! A dataset builder produces a *file table*: a DataFrame with one row per
//! logical unit (subject or session) whose image columns hold absolute NIfTI
//! paths (or lists of paths) and whose remaining columns hold scalar
//! metadata. The [`Features`] schema describes how each column is typed and,
//! for [`Feature::Nifti`] columns, marks which path columns get their file
//! contents embedded during the push.

use crate::Error;
use polars::prelude::*;

/// Column type in a dataset schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feature {
    /// UTF-8 string scalar.
    String,
    /// 32-bit float scalar.
    Float32,
    /// A NIfTI image: a path column in the file table, a binary column once
    /// embedded.
    Nifti,
    /// Homogeneous list of an inner feature (e.g. multiple runs per
    /// session).
    Sequence(Box<Feature>),
}

impl Feature {
    /// Polars dtype of this feature in the file table (before embedding).
    pub fn dtype(&self) -> DataType {
        match self {
            Feature::String => DataType::String,
            Feature::Float32 => DataType::Float32,
            Feature::Nifti => DataType::String,
            Feature::Sequence(inner) => DataType::List(Box::new(inner.dtype())),
        }
    }

    /// Polars dtype of this feature once binary payloads are embedded.
    pub fn embedded_dtype(&self) -> DataType {
        match self {
            Feature::String => DataType::String,
            Feature::Float32 => DataType::Float32,
            Feature::Nifti => DataType::Binary,
            Feature::Sequence(inner) => DataType::List(Box::new(inner.embedded_dtype())),
        }
    }

    /// True when this feature (or its element type) is a NIfTI payload.
    pub fn holds_nifti(&self) -> bool {
        match self {
            Feature::Nifti => true,
            Feature::Sequence(inner) => inner.holds_nifti(),
            _ => false,
        }
    }

    /// Manifest (dataset_info.json) representation of this feature.
    pub fn to_manifest(&self) -> serde_json::Value {
        match self {
            Feature::String => serde_json::json!({"dtype": "string", "_type": "Value"}),
            Feature::Float32 => serde_json::json!({"dtype": "float32", "_type": "Value"}),
            Feature::Nifti => serde_json::json!({"_type": "Nifti"}),
            Feature::Sequence(inner) => {
                serde_json::json!({"feature": inner.to_manifest(), "_type": "Sequence"})
            }
        }
    }
}

/// Ordered dataset schema: column names mapped to [`Feature`] types.
///
/// Order matters; the pushed table carries columns in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features(Vec<(String, Feature)>);

impl Features {
    /// Build a schema from `(name, feature)` pairs.
    pub fn new(fields: Vec<(&str, Feature)>) -> Self {
        Features(
            fields
                .into_iter()
                .map(|(name, feature)| (name.to_string(), feature))
                .collect(),
        )
    }

    /// Column names in schema order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Iterate `(name, feature)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> {
        self.0.iter().map(|(name, feature)| (name.as_str(), feature))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a feature by column name.
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, feature)| feature)
    }

    /// Manifest (dataset_info.json) representation of the schema.
    pub fn to_manifest(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (name, feature) in &self.0 {
            map.insert(name.clone(), feature.to_manifest());
        }
        serde_json::Value::Object(map)
    }
}

/// Validate that every column the features require exists in the file table.
///
/// Extra file-table columns are allowed (they are dropped by
/// [`build_table`]); missing ones are an error listing the difference.
pub fn validate_file_table_columns(df: &DataFrame, features: &Features) -> Result<(), Error> {
    let actual: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut missing: Vec<&str> = features
        .names()
        .into_iter()
        .filter(|name| !actual.iter().any(|col| col == name))
        .collect();
    missing.sort_unstable();

    if !missing.is_empty() {
        let mut expected: Vec<&str> = features.names();
        expected.sort_unstable();
        let mut actual_sorted = actual.clone();
        actual_sorted.sort_unstable();
        return Err(Error::SchemaMismatch(format!(
            "file table is missing columns required by features: {:?}; expected: {:?}, got: {:?}",
            missing, expected, actual_sorted
        )));
    }

    Ok(())
}

/// Build the typed dataset table from a file table.
///
/// Selects exactly the feature columns, in schema order, and casts each to
/// its declared dtype. NIfTI columns remain path-valued; embedding happens
/// shard by shard during the push.
pub fn build_table(df: &DataFrame, features: &Features) -> Result<DataFrame, Error> {
    validate_file_table_columns(df, features)?;

    let mut columns = Vec::with_capacity(features.len());
    for (name, feature) in features.iter() {
        let series = df
            .column(name)?
            .as_materialized_series()
            .cast(&feature.dtype())?;
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

/// Column of optional strings.
pub fn str_column(name: &str, values: Vec<Option<String>>) -> Column {
    Series::new(name.into(), values).into()
}

/// Column of optional 32-bit floats.
pub fn f32_column(name: &str, values: Vec<Option<f32>>) -> Column {
    Series::new(name.into(), values).into()
}

/// List-of-strings column; an empty inner vec becomes an empty list, not a
/// null.
pub fn str_list_column(name: &str, values: Vec<Vec<String>>) -> Result<Column, Error> {
    let rows: Vec<Series> = values
        .into_iter()
        .map(|row| Series::new("".into(), row))
        .collect();
    let series =
        Series::new(name.into(), rows).cast(&DataType::List(Box::new(DataType::String)))?;
    Ok(series.into())
}
