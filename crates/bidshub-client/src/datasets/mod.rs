// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-dataset builders.
//!
//! Each supported dataset module knows its source's directory layout and
//! exposes three things: a file-table builder walking the BIDS tree into a
//! DataFrame, a [`Features`](crate::Features) schema, and a
//! `build_and_push_*` pipeline wiring both into the sharded hub push with a
//! one-shard-per-row memory guard.
//!
//! Supported datasets:
//!
//! - [`arc`]: Aphasia Recovery Cohort (OpenNeuro ds004884), one row per
//!   session
//! - [`isles24`]: ISLES 2024 stroke (Zenodo 17652035 v7), one row per
//!   subject
//! - [`aomic_piop1`]: AOMIC-PIOP1 (OpenNeuro ds002785), one row per subject

pub mod aomic_piop1;
pub mod arc;
pub mod isles24;

use std::path::PathBuf;

/// Configuration for building and pushing one dataset.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Path to the root of the downloaded dataset.
    pub bids_root: PathBuf,
    /// Hub repository ID (e.g. `"hugging-science/arc-aphasia-bids"`).
    pub repo_id: String,
    /// Split name; defaults to `train` when unset.
    pub split: Option<String>,
    /// Build the table but skip the hub push.
    pub dry_run: bool,
}

impl BuilderConfig {
    /// Create a config with the default split and `dry_run` disabled.
    pub fn new(bids_root: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            bids_root: bids_root.into(),
            repo_id: repo_id.into(),
            split: None,
            dry_run: false,
        }
    }
}
