// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # BIDS Hub Client Library
//!
//! The BIDS Hub Client Library converts neuroimaging datasets organized in
//! the BIDS directory convention into tabular, columnar datasets and
//! uploads them to a remote dataset hub. For each supported source dataset
//! it walks the directory layout to discover per-subject or per-session
//! imaging files, assembles one typed row per logical unit, validates the
//! download against a hand-verified census of expected counts, and pushes
//! the result shard by shard with NIfTI payloads embedded into columnar
//! storage.
//!
//! ## Features
//!
//! - **Dataset builders**: ARC (OpenNeuro ds004884), ISLES'24 (Zenodo
//!   17652035), and AOMIC-PIOP1 (OpenNeuro ds002785) file-table builders
//!   with their schemas
//! - **Memory-bounded push**: a shard-sequential embed-and-upload loop that
//!   never holds more than one embedded shard in memory or on disk
//! - **Validation engine**: declarative count/required-file/integrity rule
//!   tables for downloads, plus schema and alignment checks for built
//!   tables
//! - **Hub client**: repository creation and the preupload/LFS/commit
//!   upload flow, with URL-classified retry policies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bidshub_client::{BuilderConfig, HubClient};
//! use bidshub_client::datasets::arc::build_and_push_arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bidshub_client::Error> {
//!     let client = HubClient::new()?;
//!     let config = BuilderConfig::new(
//!         "data/openneuro/ds004884",
//!         "hugging-science/arc-aphasia-bids",
//!     );
//!     build_and_push_arc(&client, &config, None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Validating a download
//!
//! ```rust,no_run
//! use bidshub_client::validate::{ValidateOptions, arc::validate_arc_download};
//! use std::path::Path;
//!
//! let result = validate_arc_download(
//!     Path::new("data/openneuro/ds004884"),
//!     &ValidateOptions::default(),
//! );
//! println!("{}", result);
//! assert!(result.all_passed());
//! ```

pub mod bids;
mod client;
pub mod datasets;
mod error;
pub mod nifti;
mod push;
mod retry;
mod storage;
mod table;
pub mod validate;

pub use crate::{
    client::{HubClient, Progress, WhoAmI},
    datasets::BuilderConfig,
    error::Error,
    push::{PushOptions, contiguous_shard_bounds, embed_table_storage, push_to_hub},
    retry::{RetryScope, classify_url},
    storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenStorage},
    table::{Feature, Features, build_table, validate_file_table_columns},
};
