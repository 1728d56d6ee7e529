//! Timestamped artifact storage + HTTP fetch client for skuflow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "skuflow-storage";

/// Directory of timestamp-named batch artifacts for one pipeline stage.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact filename `<prefix><YYYYMMDD_HHMMSS>.<ext>` for the given UTC instant.
    pub fn timestamped_name(prefix: &str, extension: &str, at: DateTime<Utc>) -> String {
        let ext = extension.trim_start_matches('.').trim();
        let ext = if ext.is_empty() { "bin" } else { ext };
        format!("{prefix}{}.{ext}", at.format("%Y%m%d_%H%M%S"))
    }

    /// Write a new artifact via temp file + atomic rename, creating the
    /// store directory if absent.
    pub async fn write_new(&self, name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating artifact directory {}", self.root.display()))?;

        let final_path = self.root.join(name);
        let temp_path = self.root.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp artifact file {}", temp_path.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("writing temp artifact file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp artifact file {}", temp_path.display()))?;
        drop(file);

        match fs::rename(&temp_path, &final_path).await {
            Ok(()) => {
                debug!(artifact = %final_path.display(), bytes = bytes.len(), "artifact written");
                Ok(final_path)
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err).with_context(|| {
                    format!(
                        "atomically renaming temp artifact {} -> {}",
                        temp_path.display(),
                        final_path.display()
                    )
                })
            }
        }
    }

    /// Most recently *modified* artifact matching `<prefix>*.<ext>`.
    ///
    /// Selection is by filesystem mtime, not by the timestamp embedded in the
    /// filename; a copied or touched artifact can therefore win over a newer
    /// one. Known ambiguity, kept to match the established discovery contract.
    /// Returns `Ok(None)` when the directory is missing or holds no match.
    pub fn latest_matching(
        &self,
        prefix: &str,
        extensions: &[&str],
    ) -> anyhow::Result<Option<PathBuf>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading artifact directory {}", self.root.display()))
            }
        };

        let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("reading entry in {}", self.root.display()))?;
            let path = entry.path();
            if !matches_pattern(&path, prefix, extensions) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .with_context(|| format!("reading mtime of {}", path.display()))?;
            if latest.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
                latest = Some((modified, path));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }
}

fn matches_pattern(path: &Path, prefix: &str, extensions: &[&str]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !name.starts_with(prefix) {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate))
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
}

/// Single-shot GET client. Retrying a failed fetch is the orchestrator's
/// decision, so there is no retry loop here.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    /// Fetch the body behind `url`, treating any non-2xx status as failure.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(url, "http fetch");
        let resp = self.client.get(url).send().await?;
        let status: StatusCode = resp.status();
        let final_url = resp.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::FileTimes;
    use std::time::{Duration as StdDuration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn timestamped_names_embed_the_utc_instant() {
        let at = Utc.with_ymd_and_hms(2026, 8, 29, 6, 30, 15).single().expect("ts");
        assert_eq!(
            ArtifactStore::timestamped_name("products_raw_", "json", at),
            "products_raw_20260829_063015.json"
        );
        assert_eq!(
            ArtifactStore::timestamped_name("products_cleaned_", ".parquet", at),
            "products_cleaned_20260829_063015.parquet"
        );
    }

    #[tokio::test]
    async fn write_new_creates_directory_and_leaves_no_temp_files() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("raw"));

        let path = store
            .write_new("products_raw_20260829_063015.json", b"[]")
            .await
            .expect("write");

        assert!(path.exists());
        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn latest_matching_selects_by_mtime_not_lexical_order() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());

        // Lexically later name gets the earlier mtime.
        let older = store
            .write_new("products_raw_20260829_090000.json", b"[1]")
            .await
            .expect("older");
        let newer = store
            .write_new("products_raw_20260829_080000.json", b"[2]")
            .await
            .expect("newer");

        let t1 = SystemTime::now() - StdDuration::from_secs(120);
        let t2 = SystemTime::now() - StdDuration::from_secs(60);
        std::fs::File::options()
            .write(true)
            .open(&older)
            .expect("open older")
            .set_times(FileTimes::new().set_modified(t1))
            .expect("set t1");
        std::fs::File::options()
            .write(true)
            .open(&newer)
            .expect("open newer")
            .set_times(FileTimes::new().set_modified(t2))
            .expect("set t2");

        let latest = store
            .latest_matching("products_raw_", &["json"])
            .expect("discover")
            .expect("some");
        assert_eq!(latest, newer);
    }

    #[tokio::test]
    async fn latest_matching_filters_prefix_and_extension() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path());

        store
            .write_new("products_cleaned_20260829_063015.parquet", b"x")
            .await
            .expect("cleaned");
        store
            .write_new("products_raw_20260829_063015.json", b"[]")
            .await
            .expect("raw");
        store.write_new("notes.txt", b"n").await.expect("notes");

        let latest = store
            .latest_matching("products_raw_", &["json"])
            .expect("discover")
            .expect("some");
        assert!(latest.to_string_lossy().ends_with("products_raw_20260829_063015.json"));
    }

    #[test]
    fn latest_matching_on_missing_directory_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = ArtifactStore::new(dir.path().join("does-not-exist"));
        assert!(store
            .latest_matching("products_raw_", &["json"])
            .expect("discover")
            .is_none());
    }
}
