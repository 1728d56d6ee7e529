//! Transform stage: flatten the latest raw snapshot into a cleaned artifact.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use skuflow_core::{processed_at_stamp, CleanedProduct, RawProduct};
use skuflow_storage::ArtifactStore;
use tokio::fs;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Result, StageError};
use crate::fetch::RAW_PREFIX;

pub const CLEANED_PREFIX: &str = "products_cleaned_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanedFormat {
    Parquet,
    Json,
}

impl CleanedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanedFormat::Parquet => "parquet",
            CleanedFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutcome {
    pub artifact: PathBuf,
    pub format: CleanedFormat,
    pub records: usize,
    pub source_file: String,
}

/// Flatten and clean the most recent raw snapshot. Per-record coercion never
/// fails the batch; missing input and malformed JSON do.
pub async fn run(config: &PipelineConfig) -> Result<TransformOutcome> {
    let raw_store = ArtifactStore::new(&config.raw_dir);
    let raw_path = raw_store
        .latest_matching(RAW_PREFIX, &["json"])?
        .ok_or_else(|| StageError::InputNotFound {
            expected: "raw product",
            dir: config.raw_dir.clone(),
            remedy: "fetch",
        })?;
    info!(artifact = %raw_path.display(), "using latest raw snapshot");

    let text = fs::read_to_string(&raw_path)
        .await
        .with_context(|| format!("reading {}", raw_path.display()))?;
    let raw: Vec<RawProduct> = serde_json::from_str(&text)?;

    let source_file = raw_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let processed_at = processed_at_stamp(Utc::now());
    let cleaned: Vec<CleanedProduct> = raw
        .iter()
        .map(|p| CleanedProduct::from_raw(p, &processed_at, &source_file))
        .collect();

    let out_store = ArtifactStore::new(&config.processed_dir);
    write_cleaned(&out_store, &cleaned, &source_file, Utc::now()).await
}

/// Persist the cleaned set: parquet first, JSON on any parquet-write failure.
/// The chosen path is always logged.
pub(crate) async fn write_cleaned(
    store: &ArtifactStore,
    records: &[CleanedProduct],
    source_file: &str,
    at: DateTime<Utc>,
) -> Result<TransformOutcome> {
    fs::create_dir_all(store.root())
        .await
        .with_context(|| format!("creating processed directory {}", store.root().display()))?;

    let parquet_name = ArtifactStore::timestamped_name(CLEANED_PREFIX, "parquet", at);
    let parquet_path = store.root().join(&parquet_name);
    match write_parquet(&parquet_path, records) {
        Ok(()) => {
            info!(artifact = %parquet_path.display(), records = records.len(), "cleaned artifact written (parquet)");
            Ok(TransformOutcome {
                artifact: parquet_path,
                format: CleanedFormat::Parquet,
                records: records.len(),
                source_file: source_file.to_string(),
            })
        }
        Err(err) => {
            warn!(error = %err, "parquet write failed; falling back to JSON");
            let _ = std::fs::remove_file(&parquet_path);

            let json_name = ArtifactStore::timestamped_name(CLEANED_PREFIX, "json", at);
            let bytes = serde_json::to_vec_pretty(records)?;
            let artifact = store.write_new(&json_name, &bytes).await?;
            info!(artifact = %artifact.display(), records = records.len(), "cleaned artifact written (json fallback)");
            Ok(TransformOutcome {
                artifact,
                format: CleanedFormat::Json,
                records: records.len(),
                source_file: source_file.to_string(),
            })
        }
    }
}

fn cleaned_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("product_id", DataType::Int64, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("price_usd", DataType::Float64, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("category", DataType::Utf8, true),
        Field::new("image_url", DataType::Utf8, true),
        Field::new("rating_rate", DataType::Float64, true),
        Field::new("rating_count", DataType::Int64, true),
        Field::new("processed_at_utc", DataType::Utf8, false),
        Field::new("source_file", DataType::Utf8, false),
    ]))
}

pub(crate) fn write_parquet(path: &Path, records: &[CleanedProduct]) -> anyhow::Result<()> {
    let product_ids = Int64Array::from(records.iter().map(|r| r.product_id).collect::<Vec<_>>());
    let titles =
        StringArray::from(records.iter().map(|r| r.title.as_deref()).collect::<Vec<_>>());
    let prices = Float64Array::from(records.iter().map(|r| r.price_usd).collect::<Vec<_>>());
    let descriptions =
        StringArray::from(records.iter().map(|r| r.description.as_deref()).collect::<Vec<_>>());
    let categories =
        StringArray::from(records.iter().map(|r| r.category.as_deref()).collect::<Vec<_>>());
    let image_urls =
        StringArray::from(records.iter().map(|r| r.image_url.as_deref()).collect::<Vec<_>>());
    let rating_rates = Float64Array::from(records.iter().map(|r| r.rating_rate).collect::<Vec<_>>());
    let rating_counts = Int64Array::from(records.iter().map(|r| r.rating_count).collect::<Vec<_>>());
    let processed_at = StringArray::from(
        records
            .iter()
            .map(|r| Some(r.processed_at_utc.as_str()))
            .collect::<Vec<_>>(),
    );
    let source_files = StringArray::from(
        records
            .iter()
            .map(|r| Some(r.source_file.as_str()))
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        cleaned_schema(),
        vec![
            Arc::new(product_ids),
            Arc::new(titles),
            Arc::new(prices),
            Arc::new(descriptions),
            Arc::new(categories),
            Arc::new(image_urls),
            Arc::new(rating_rates),
            Arc::new(rating_counts),
            Arc::new(processed_at),
            Arc::new(source_files),
        ],
    )
    .context("building cleaned record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}
