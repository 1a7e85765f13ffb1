// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    Error,
    retry::{create_retry_policy, log_retry_configuration},
    storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage},
};
use base64::Engine as _;
use futures::StreamExt as _;
use log::{debug, info, warn};
use reqwest::{Body, header::CONTENT_LENGTH};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    fs::File,
    io::AsyncReadExt as _,
    sync::{RwLock, mpsc::Sender},
};
use tokio_util::codec::{BytesCodec, FramedRead};

/// Files at or below this size are committed inline (base64) rather than
/// going through the LFS upload path.  Parquet shards always exceed this.
static INLINE_LIMIT: u64 = 1024 * 1024;

/// Progress information for long-running operations.
///
/// Tracks the current progress of shard uploads or table builds. For byte
/// streams `current`/`total` are byte counts; for shard loops they are shard
/// counts.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current number of completed items.
    pub current: usize,
    /// Total number of items to process.
    pub total: usize,
}

#[derive(Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    repo_type: &'a str,
    private: bool,
}

#[derive(Serialize)]
struct DeleteRepoRequest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    repo_type: &'a str,
}

#[derive(Serialize)]
struct PreuploadFile<'a> {
    path: &'a str,
    size: u64,
    sample: String,
}

#[derive(Serialize)]
struct PreuploadRequest<'a> {
    files: Vec<PreuploadFile<'a>>,
}

#[derive(Deserialize)]
struct PreuploadResponseFile {
    path: String,
    #[serde(rename = "uploadMode")]
    upload_mode: String,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadResponseFile>,
}

#[derive(Serialize)]
struct LfsObject<'a> {
    oid: &'a str,
    size: u64,
}

#[derive(Serialize)]
struct LfsBatchRequest<'a> {
    operation: &'a str,
    transfers: Vec<&'a str>,
    objects: Vec<LfsObject<'a>>,
}

#[derive(Deserialize)]
struct LfsAction {
    href: String,
    #[serde(default)]
    header: std::collections::HashMap<String, String>,
}

#[derive(Deserialize)]
struct LfsBatchObject {
    #[allow(dead_code)]
    oid: String,
    #[serde(default)]
    actions: Option<std::collections::HashMap<String, LfsAction>>,
}

#[derive(Deserialize)]
struct LfsBatchResponse {
    objects: Vec<LfsBatchObject>,
}

/// Identity of the authenticated hub user.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    /// Account name the token belongs to.
    pub name: String,
    /// Full display name, when the account has one.
    #[serde(default)]
    pub fullname: Option<String>,
}

/// Client for the remote dataset hub.
///
/// Wraps the hub's REST interface: repository creation, the
/// preupload/LFS/commit upload flow for large shard files, and token
/// management. The client never reimplements the hub protocol beyond what
/// the shard-sequential push loop needs.
///
/// # Authentication
///
/// The token is resolved in this order:
///
/// 1. [`with_token`][Self::with_token] (or the CLI's `--token` /
///    `BIDS_HUB_TOKEN`)
/// 2. the token cache written by `huggingface-cli login`
///    (see [`FileTokenStorage`])
///
/// # Examples
///
/// ```rust,no_run
/// use bidshub_client::HubClient;
///
/// # async fn example() -> Result<(), bidshub_client::Error> {
/// let client = HubClient::new()?;
/// let who = client.whoami().await?;
/// println!("Authenticated as {}", who.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HubClient {
    http: reqwest::Client,
    endpoint: String,
    token: Arc<RwLock<String>>,
    storage: Option<Arc<dyn TokenStorage>>,
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("endpoint", &self.endpoint)
            .field("has_storage", &self.storage.is_some())
            .finish()
    }
}

impl HubClient {
    /// Create a new client for the default hub endpoint.
    ///
    /// Settings are layered: built-in defaults, then an optional
    /// `config.toml` under the platform config directory, then `BIDS_HUB_*`
    /// environment variables (`BIDS_HUB_ENDPOINT`, `BIDS_HUB_TIMEOUT`).
    /// Any token already present in the file token cache is loaded.
    pub fn new() -> Result<Self, Error> {
        log_retry_configuration();

        let settings = Self::load_settings()?;
        let endpoint = settings
            .get_string("endpoint")
            .unwrap_or_else(|_| "https://huggingface.co".to_string());
        let timeout_secs = settings.get_int("timeout").unwrap_or(30) as u64;

        // Single HTTP client with URL-classified retries: hub API calls fail
        // fast on auth errors, presigned file uploads retry aggressively.
        // See retry.rs for the classification rules.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .retry(create_retry_policy())
            .build()?;

        let storage: Arc<dyn TokenStorage> = match FileTokenStorage::new() {
            Ok(file_storage) => Arc::new(file_storage),
            Err(e) => {
                warn!(
                    "Could not initialize file token storage: {}. Using memory storage.",
                    e
                );
                Arc::new(MemoryTokenStorage::new())
            }
        };

        let token = match storage.load() {
            Ok(Some(t)) => t,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(
                    "Failed to load token from storage: {}. Starting with empty token.",
                    e
                );
                String::new()
            }
        };

        Ok(HubClient {
            http,
            endpoint: Self::normalize_endpoint(&endpoint),
            token: Arc::new(RwLock::new(token)),
            storage: Some(storage),
        })
    }

    fn load_settings() -> Result<config::Config, Error> {
        let mut builder = config::Config::builder()
            .set_default("endpoint", "https://huggingface.co")?
            .set_default("timeout", 30)?;

        if let Some(dirs) = directories::ProjectDirs::from("ai", "EdgeFirst", "BIDS Hub") {
            let config_file = dirs.config_dir().join("config.toml");
            if config_file.exists() {
                debug!("Loading settings from {:?}", config_file);
                builder = builder.add_source(config::File::from(config_file));
            }
        }

        Ok(builder
            .add_source(config::Environment::with_prefix("BIDS_HUB"))
            .build()?)
    }

    fn normalize_endpoint(endpoint: &str) -> String {
        endpoint.trim_end_matches('/').to_string()
    }

    /// Returns a new client pointed at the given hub endpoint URL.
    ///
    /// Changing the endpoint drops any loaded token, as tokens are specific
    /// to a hub instance.
    pub fn with_endpoint(&self, endpoint: &str) -> Result<Self, Error> {
        url::Url::parse(endpoint)?;
        Ok(HubClient {
            endpoint: Self::normalize_endpoint(endpoint),
            token: Arc::new(RwLock::new(String::new())),
            ..self.clone()
        })
    }

    /// Returns a new client using the provided token.
    pub fn with_token(&self, token: &str) -> Result<Self, Error> {
        if token.trim().is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(HubClient {
            token: Arc::new(RwLock::new(token.trim().to_string())),
            ..self.clone()
        })
    }

    /// Returns a new client with the given token storage backend, loading
    /// any token it holds.
    pub fn with_token_storage(self, storage: Arc<dyn TokenStorage>) -> Self {
        let token = match storage.load() {
            Ok(Some(t)) => t,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("Failed to load token from storage: {}", e);
                String::new()
            }
        };

        HubClient {
            token: Arc::new(RwLock::new(token)),
            storage: Some(storage),
            ..self
        }
    }

    /// Returns a new client with in-memory token storage (no persistence).
    pub fn with_memory_storage(self) -> Self {
        self.with_token_storage(Arc::new(MemoryTokenStorage::new()))
    }

    /// Returns the hub endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the current token, or an empty string when unauthenticated.
    pub async fn token(&self) -> String {
        self.token.read().await.clone()
    }

    /// Persist the current token to the configured storage backend.
    pub async fn save_token(&self) -> Result<(), Error> {
        let token = self.token.read().await;
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        if let Some(ref storage) = self.storage
            && let Err(e) = storage.store(&token)
        {
            warn!("Failed to persist token: {}", e);
        }
        Ok(())
    }

    /// Clear the token from memory and from the storage backend.
    pub async fn logout(&self) -> Result<(), Error> {
        self.token.write().await.clear();
        if let Some(ref storage) = self.storage
            && let Err(e) = storage.clear()
        {
            warn!("Failed to clear stored token: {}", e);
        }
        Ok(())
    }

    async fn auth_header(&self) -> Result<String, Error> {
        let token = self.token.read().await;
        if token.is_empty() {
            return Err(Error::EmptyToken);
        }
        Ok(format!("Bearer {}", token))
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::HubError(status.as_u16(), body))
    }

    /// Validate the token and return the identity it belongs to.
    pub async fn whoami(&self) -> Result<WhoAmI, Error> {
        let response = self
            .http
            .get(format!("{}/api/whoami-v2", self.endpoint))
            .header("authorization", self.auth_header().await?)
            .send()
            .await?;
        Ok(Self::check_response(response).await?.json().await?)
    }

    /// Create a dataset repository on the hub.
    ///
    /// With `exist_ok` an HTTP 409 (repository already exists) is treated as
    /// success, matching the push loop's create-then-upload usage.
    pub async fn create_repo(
        &self,
        repo_id: &str,
        private: bool,
        exist_ok: bool,
    ) -> Result<(), Error> {
        let request = CreateRepoRequest {
            name: repo_id,
            repo_type: "dataset",
            private,
        };

        let response = self
            .http
            .post(format!("{}/api/repos/create", self.endpoint))
            .header("authorization", self.auth_header().await?)
            .json(&request)
            .send()
            .await?;

        if exist_ok && response.status().as_u16() == 409 {
            debug!("Repository {} already exists", repo_id);
            return Ok(());
        }

        Self::check_response(response).await?;
        info!("Created dataset repository {}", repo_id);
        Ok(())
    }

    /// Delete a dataset repository.  Used by tests to clean up after
    /// round-trip uploads.
    pub async fn delete_repo(&self, repo_id: &str) -> Result<(), Error> {
        let request = DeleteRepoRequest {
            name: repo_id,
            repo_type: "dataset",
        };

        let response = self
            .http
            .delete(format!("{}/api/repos/delete", self.endpoint))
            .header("authorization", self.auth_header().await?)
            .json(&request)
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// Upload a local file into a dataset repository as a single commit.
    ///
    /// Large files (shards) go through the LFS flow: preupload query, LFS
    /// batch to obtain a presigned URL, streaming PUT from disk, then a
    /// commit referencing the uploaded object. Small files (the dataset
    /// manifest) are committed inline as base64. Either way the file is
    /// streamed or read once; nothing is buffered beyond the inline limit.
    ///
    /// `progress`, when provided, receives byte-level progress during the
    /// streaming PUT.
    pub async fn upload_file(
        &self,
        repo_id: &str,
        local_path: &Path,
        path_in_repo: &str,
        revision: Option<&str>,
        commit_message: &str,
        progress: Option<Sender<Progress>>,
    ) -> Result<(), Error> {
        let revision = revision.unwrap_or("main");
        let metadata = tokio::fs::metadata(local_path).await?;
        let size = metadata.len();

        debug!(
            "Uploading {:?} ({} bytes) to {}/{} @ {}",
            local_path, size, repo_id, path_in_repo, revision
        );

        let mode = if size <= INLINE_LIMIT {
            self.preupload_mode(repo_id, revision, local_path, path_in_repo, size)
                .await?
        } else {
            // Binary payloads above the inline limit always take the LFS
            // path; skip the preupload round-trip.
            "lfs".to_string()
        };

        if mode == "lfs" {
            let oid = sha256_file(local_path).await?;
            self.upload_lfs_object(repo_id, local_path, &oid, size, progress)
                .await?;
            let line = serde_json::json!({
                "key": "lfsFile",
                "value": {
                    "path": path_in_repo,
                    "algo": "sha256",
                    "oid": oid,
                    "size": size,
                }
            });
            self.commit(repo_id, revision, commit_message, vec![line])
                .await?;
        } else {
            let content = tokio::fs::read(local_path).await?;
            let line = serde_json::json!({
                "key": "file",
                "value": {
                    "path": path_in_repo,
                    "content": base64::engine::general_purpose::STANDARD.encode(&content),
                    "encoding": "base64",
                }
            });
            self.commit(repo_id, revision, commit_message, vec![line])
                .await?;
        }

        Ok(())
    }

    async fn preupload_mode(
        &self,
        repo_id: &str,
        revision: &str,
        local_path: &Path,
        path_in_repo: &str,
        size: u64,
    ) -> Result<String, Error> {
        // The sample is a base64 prefix the server sniffs for text-ness
        let mut file = File::open(local_path).await?;
        let mut prefix = vec![0u8; 512.min(size as usize)];
        file.read_exact(&mut prefix).await?;

        let request = PreuploadRequest {
            files: vec![PreuploadFile {
                path: path_in_repo,
                size,
                sample: base64::engine::general_purpose::STANDARD.encode(&prefix),
            }],
        };

        let response = self
            .http
            .post(format!(
                "{}/api/datasets/{}/preupload/{}",
                self.endpoint, repo_id, revision
            ))
            .header("authorization", self.auth_header().await?)
            .json(&request)
            .send()
            .await?;
        let response: PreuploadResponse = Self::check_response(response).await?.json().await?;

        response
            .files
            .iter()
            .find(|f| f.path == path_in_repo)
            .map(|f| f.upload_mode.clone())
            .ok_or(Error::InvalidResponse)
    }

    async fn upload_lfs_object(
        &self,
        repo_id: &str,
        local_path: &Path,
        oid: &str,
        size: u64,
        progress: Option<Sender<Progress>>,
    ) -> Result<(), Error> {
        let request = LfsBatchRequest {
            operation: "upload",
            transfers: vec!["basic"],
            objects: vec![LfsObject { oid, size }],
        };

        let response = self
            .http
            .post(format!(
                "{}/datasets/{}.git/info/lfs/objects/batch",
                self.endpoint, repo_id
            ))
            .header("authorization", self.auth_header().await?)
            .header("accept", "application/vnd.git-lfs+json")
            .json(&request)
            .send()
            .await?;
        let response: LfsBatchResponse = Self::check_response(response).await?.json().await?;

        let object = response.objects.first().ok_or(Error::InvalidResponse)?;
        let Some(actions) = &object.actions else {
            // No actions means the object is already present on the store
            debug!("LFS object {} already uploaded, skipping PUT", oid);
            return Ok(());
        };
        let upload = actions.get("upload").ok_or(Error::InvalidResponse)?;

        // Stream the shard from disk to the presigned URL so upload memory
        // stays flat regardless of shard size.
        let file = File::open(local_path).await?;
        let sent = Arc::new(AtomicUsize::new(0));
        let counter = sent.clone();
        let total = size as usize;
        let stream = FramedRead::new(file, BytesCodec::new()).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                let current = counter.fetch_add(bytes.len(), Ordering::SeqCst) + bytes.len();
                if let Some(ref tx) = progress {
                    let _ = tx.try_send(Progress { current, total });
                }
            }
        });

        let mut put = self
            .http
            .put(&upload.href)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(stream));
        for (key, value) in &upload.header {
            put = put.header(key.as_str(), value.as_str());
        }

        Self::check_response(put.send().await?).await?;
        debug!("LFS object {} uploaded ({} bytes)", oid, size);
        Ok(())
    }

    async fn commit(
        &self,
        repo_id: &str,
        revision: &str,
        message: &str,
        operations: Vec<serde_json::Value>,
    ) -> Result<(), Error> {
        let header = serde_json::json!({
            "key": "header",
            "value": { "summary": message, "description": "" }
        });

        let mut body = String::new();
        body.push_str(&serde_json::to_string(&header)?);
        for op in &operations {
            body.push('\n');
            body.push_str(&serde_json::to_string(op)?);
        }

        let response = self
            .http
            .post(format!(
                "{}/api/datasets/{}/commit/{}",
                self.endpoint, repo_id, revision
            ))
            .header("authorization", self.auth_header().await?)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        Self::check_response(response).await?;
        debug!("Committed to {} @ {}: {}", repo_id, revision, message);
        Ok(())
    }
}

/// Compute the SHA-256 digest of a file, reading in chunks.
async fn sha256_file(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"abc").unwrap();

        let oid = sha256_file(&path).await.unwrap();
        assert_eq!(
            oid,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            HubClient::normalize_endpoint("https://huggingface.co/"),
            "https://huggingface.co"
        );
        assert_eq!(
            HubClient::normalize_endpoint("https://hub.internal"),
            "https://hub.internal"
        );
    }

    #[tokio::test]
    async fn test_with_token() {
        let client = HubClient::new().unwrap().with_memory_storage();
        assert!(client.with_token("").is_err());

        let client = client.with_token("hf_token").unwrap();
        assert_eq!(client.token().await, "hf_token");
    }

    #[tokio::test]
    async fn test_with_endpoint_drops_token() {
        let client = HubClient::new()
            .unwrap()
            .with_memory_storage()
            .with_token("hf_token")
            .unwrap();
        let client = client.with_endpoint("https://hub.example.org").unwrap();
        assert_eq!(client.endpoint(), "https://hub.example.org");
        assert_eq!(client.token().await, "");
    }

    #[tokio::test]
    async fn test_auth_header_requires_token() {
        let client = HubClient::new().unwrap().with_memory_storage();
        // Force-clear any token picked up from the environment's cache
        client.logout().await.unwrap();
        assert!(matches!(
            client.auth_header().await,
            Err(Error::EmptyToken)
        ));
    }
}
