//! Fetch stage: snapshot the product listing endpoint into a raw artifact.

use std::path::PathBuf;

use chrono::Utc;
use skuflow_storage::{ArtifactStore, HttpClientConfig, HttpFetcher};
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;

pub const RAW_PREFIX: &str = "products_raw_";

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub artifact: PathBuf,
    pub records: usize,
    pub bytes: usize,
}

/// One bounded-timeout GET, one new raw artifact. No dedup against prior
/// fetches and no internal retry.
pub async fn run(config: &PipelineConfig) -> Result<FetchOutcome> {
    let fetcher = HttpFetcher::new(HttpClientConfig {
        timeout: config.http_timeout,
        user_agent: config.user_agent.clone(),
    })?;
    let body = fetcher.fetch_bytes(&config.api_url).await?;

    let store = ArtifactStore::new(&config.raw_dir);
    persist_raw(&store, &body).await
}

/// Persist the response body as a pretty-printed JSON snapshot named with the
/// current UTC timestamp. A body that is not valid JSON is fatal.
pub(crate) async fn persist_raw(store: &ArtifactStore, body: &[u8]) -> Result<FetchOutcome> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let records = value.as_array().map(|a| a.len()).unwrap_or(0);
    let pretty = serde_json::to_vec_pretty(&value)?;

    let name = ArtifactStore::timestamped_name(RAW_PREFIX, "json", Utc::now());
    let artifact = store.write_new(&name, &pretty).await?;
    info!(artifact = %artifact.display(), records, "raw snapshot written");

    Ok(FetchOutcome {
        artifact,
        records,
        bytes: pretty.len(),
    })
}
