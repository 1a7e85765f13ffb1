// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Validation checks against a built dataset table.
//!
//! After the file table is assembled and typed, these checks confirm the
//! table matches the dataset's source-of-truth census before anything is
//! pushed: column schema, row and unique-subject counts, non-null counts
//! for optional single-image columns, per-row list counts for multi-run
//! modalities, and cross-column list alignment (a DWI run without its
//! gradient tables is corrupt, not incomplete).

use super::ValidationCheck;
use polars::prelude::*;
use std::fmt;

/// Complete validation results for a built table.
#[derive(Debug, Clone)]
pub struct TableValidationResult {
    /// Dataset or repository name the table was built for.
    pub dataset: String,
    /// All check results, in execution order.
    pub checks: Vec<ValidationCheck>,
}

impl TableValidationResult {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            checks: Vec::new(),
        }
    }

    /// Add a check result.
    pub fn add(&mut self, check: ValidationCheck) {
        self.checks.push(check);
    }

    /// True when every check passed.
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Number of failed checks.
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

impl fmt::Display for TableValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Table Validation Results for: {}", self.dataset)?;
        writeln!(f, "{}", "=".repeat(60))?;
        for check in &self.checks {
            let status = if check.passed { "✓ PASS" } else { "✗ FAIL" };
            writeln!(f, "{} {}", status, check.name)?;
            if !check.passed {
                writeln!(f, "       Expected: {}", check.expected)?;
                writeln!(f, "       Actual:   {}", check.actual)?;
                if !check.details.is_empty() {
                    writeln!(f, "       Details:  {}", check.details)?;
                }
            }
        }
        writeln!(f, "{}", "=".repeat(60))?;
        if self.passed() {
            writeln!(f, "✓ All validations passed. Table matches the census.")
        } else {
            writeln!(
                f,
                "✗ {}/{} checks failed.",
                self.failed_count(),
                self.checks.len()
            )
        }
    }
}

fn error_check(name: &str, expected: &str, err: impl fmt::Display) -> ValidationCheck {
    ValidationCheck::new(name, expected, &format!("ERROR: {}", err), false)
}

/// Verify the table has exactly the expected columns.
pub fn check_schema(df: &DataFrame, expected_columns: &[&str]) -> ValidationCheck {
    let actual: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut missing: Vec<&str> = expected_columns
        .iter()
        .filter(|name| !actual.iter().any(|col| col == *name))
        .copied()
        .collect();
    missing.sort_unstable();

    let mut extra: Vec<&String> = actual
        .iter()
        .filter(|col| !expected_columns.contains(&col.as_str()))
        .collect();
    extra.sort();

    let expected = format!("{} columns", expected_columns.len());
    let found = format!("{} columns", actual.len());

    if missing.is_empty() && extra.is_empty() {
        return ValidationCheck::new("schema", &expected, &found, true);
    }

    let mut details = Vec::new();
    if !missing.is_empty() {
        details.push(format!("Missing: {:?}", missing));
    }
    if !extra.is_empty() {
        details.push(format!("Extra: {:?}", extra));
    }

    ValidationCheck::new("schema", &expected, &found, false).with_details(details.join("; "))
}

/// Verify the table has the expected number of rows.
pub fn check_row_count(df: &DataFrame, expected: usize) -> ValidationCheck {
    let actual = df.height();
    ValidationCheck::new(
        "row_count",
        &expected.to_string(),
        &actual.to_string(),
        actual == expected,
    )
}

/// Count unique values in a column.
pub fn check_unique_values(
    df: &DataFrame,
    column: &str,
    expected: usize,
    check_name: Option<&str>,
) -> ValidationCheck {
    let name = check_name
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("{}_unique", column));

    let actual = match df
        .column(column)
        .and_then(|c| c.as_materialized_series().n_unique().map_err(Into::into))
    {
        Ok(n) => n,
        Err(e) => return error_check(&name, &expected.to_string(), e),
    };

    ValidationCheck::new(
        &name,
        &expected.to_string(),
        &actual.to_string(),
        actual == expected,
    )
}

/// Count non-null values in a column.
pub fn check_non_null_count(df: &DataFrame, column: &str, expected: usize) -> ValidationCheck {
    let name = format!("{}_non_null", column);
    let col = match df.column(column) {
        Ok(col) => col,
        Err(e) => return error_check(&name, &expected.to_string(), e),
    };

    let actual = col.len() - col.null_count();
    ValidationCheck::new(
        &name,
        &expected.to_string(),
        &actual.to_string(),
        actual == expected,
    )
}

fn list_lengths(df: &DataFrame, column: &str) -> PolarsResult<Vec<usize>> {
    let lists = df.column(column)?.list()?.clone();
    Ok((0..lists.len())
        .map(|i| lists.get_as_series(i).map(|s| s.len()).unwrap_or(0))
        .collect())
}

/// Count rows whose list column holds at least one item.
///
/// For multi-run modalities this is the "sessions with modality" count the
/// census records.
pub fn check_list_rows(df: &DataFrame, column: &str, expected: usize) -> ValidationCheck {
    let name = format!("{}_sessions", column);
    let lengths = match list_lengths(df, column) {
        Ok(lengths) => lengths,
        Err(e) => return error_check(&name, &expected.to_string(), e),
    };

    let actual = lengths.iter().filter(|&&len| len > 0).count();
    ValidationCheck::new(
        &name,
        &expected.to_string(),
        &actual.to_string(),
        actual == expected,
    )
}

/// Count total items across every list in a column.
///
/// For multi-run modalities this is the census's raw file count.
pub fn check_total_list_items(df: &DataFrame, column: &str, expected: usize) -> ValidationCheck {
    let name = format!("{}_total", column);
    let lengths = match list_lengths(df, column) {
        Ok(lengths) => lengths,
        Err(e) => return error_check(&name, &expected.to_string(), e),
    };

    let actual: usize = lengths.iter().sum();
    ValidationCheck::new(
        &name,
        &expected.to_string(),
        &actual.to_string(),
        actual == expected,
    )
}

/// Verify that several list columns have equal lengths on every row.
///
/// Used for aligned data like `dwi` + `dwi_bvals` + `dwi_bvecs`. Up to
/// `sample_limit` misaligned rows are reported in the details.
pub fn check_list_alignment(
    df: &DataFrame,
    columns: &[&str],
    sample_limit: usize,
) -> ValidationCheck {
    let name = format!("alignment_{}", columns.join("+"));

    let mut all_lengths = Vec::with_capacity(columns.len());
    for column in columns {
        match list_lengths(df, column) {
            Ok(lengths) => all_lengths.push(lengths),
            Err(e) => return error_check(&name, "All rows aligned", e),
        }
    }

    let mut misaligned = Vec::new();
    for row in 0..df.height() {
        let lengths: Vec<usize> = all_lengths.iter().map(|col| col[row]).collect();
        if lengths.windows(2).any(|w| w[0] != w[1]) {
            let desc: Vec<String> = columns
                .iter()
                .zip(&lengths)
                .map(|(col, len)| format!("{}={}", col, len))
                .collect();
            misaligned.push(format!("Row {}: {}", row, desc.join(", ")));
            if misaligned.len() >= sample_limit {
                break;
            }
        }
    }

    if misaligned.is_empty() {
        ValidationCheck::new(&name, "All rows aligned", "All rows aligned", true)
    } else {
        ValidationCheck::new(
            &name,
            "All rows aligned",
            &format!("{}+ misaligned rows", misaligned.len()),
            false,
        )
        .with_details(misaligned.into_iter().take(3).collect::<Vec<_>>().join("; "))
    }
}
