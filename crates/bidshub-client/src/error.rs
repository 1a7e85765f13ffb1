// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

/// Comprehensive error type for BIDS Hub client operations.
///
/// Covers every failure mode of the conversion pipeline: filesystem and
/// network I/O, hub API errors, schema mismatches between file tables and
/// features, and corrupt or incomplete BIDS downloads.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred during file operations.
    IoError(std::io::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// HTTP request error from the reqwest client.
    HttpError(reqwest::Error),
    /// URL parsing error.
    UrlParseError(url::ParseError),
    /// Polars dataframe operation error.
    PolarsError(polars::error::PolarsError),
    /// NIfTI parsing error from the nifti crate.
    NiftiError(nifti::NiftiError),
    /// XLSX workbook error from calamine (phenotype metadata).
    XlsxError(calamine::XlsxError),
    /// Async task join error.
    JoinError(tokio::task::JoinError),
    /// Hub API returned an error status with a message body.
    HubError(u16, String),
    /// Server returned an invalid or unexpected response.
    InvalidResponse,
    /// Authentication token is empty or not provided.
    EmptyToken,
    /// User is not authorized to perform the requested operation.
    Unauthorized,
    /// BIDS root directory does not exist or is not a directory.
    InvalidBidsRoot(String),
    /// A required dataset file is missing (e.g. participants.tsv).
    MissingRequiredFile(String),
    /// A DWI gradient companion file (.bval/.bvec) is missing.
    MissingGradient(String),
    /// File table does not provide the columns required by the features.
    SchemaMismatch(String),
    /// A BOLD run carries a task entity the dataset is not known to have.
    UnexpectedBoldTask(String),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParseError(err)
    }
}

impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Error::PolarsError(err)
    }
}

impl From<nifti::NiftiError> for Error {
    fn from(err: nifti::NiftiError) -> Self {
        Error::NiftiError(err)
    }
}

impl From<calamine::XlsxError> for Error {
    fn from(err: calamine::XlsxError) -> Self {
        Error::XlsxError(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::JoinError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Error::UrlParseError(e) => write!(f, "URL parse error: {}", e),
            Error::PolarsError(e) => write!(f, "Polars error: {}", e),
            Error::NiftiError(e) => write!(f, "NIfTI error: {}", e),
            Error::XlsxError(e) => write!(f, "XLSX error: {}", e),
            Error::JoinError(e) => write!(f, "Task join error: {}", e),
            Error::HubError(status, msg) => write!(f, "Hub API error {}: {}", status, msg),
            Error::InvalidResponse => write!(f, "Invalid server response"),
            Error::EmptyToken => write!(f, "Authentication token is empty"),
            Error::Unauthorized => write!(f, "Unauthorized access"),
            Error::InvalidBidsRoot(s) => write!(f, "Invalid BIDS root: {}", s),
            Error::MissingRequiredFile(s) => write!(f, "Missing required file: {}", s),
            Error::MissingGradient(s) => write!(f, "Missing gradient file: {}", s),
            Error::SchemaMismatch(s) => write!(f, "Schema mismatch: {}", s),
            Error::UnexpectedBoldTask(s) => write!(f, "Unexpected BOLD task: {}", s),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::HttpError(e) => Some(e),
            Error::UrlParseError(e) => Some(e),
            Error::PolarsError(e) => Some(e),
            Error::NiftiError(e) => Some(e),
            Error::XlsxError(e) => Some(e),
            Error::JoinError(e) => Some(e),
            _ => None,
        }
    }
}
