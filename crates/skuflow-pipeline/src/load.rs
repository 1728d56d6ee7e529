//! Load stage: upsert-if-absent the latest cleaned artifact into Postgres.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use arrow_array::{Array, Float64Array, Int64Array, RecordBatch, StringArray};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use skuflow_core::CleanedProduct;
use skuflow_storage::ArtifactStore;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::{DbConfig, PipelineConfig};
use crate::error::{Result, StageError};
use crate::transform::CLEANED_PREFIX;

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id                  BIGINT PRIMARY KEY,
    title               TEXT,
    category            TEXT,
    price_usd           DOUBLE PRECISION,
    price_gbp           DOUBLE PRECISION,
    description         TEXT,
    image               TEXT,
    rating_rate         DOUBLE PRECISION,
    rating_count        BIGINT,
    ingestion_timestamp TIMESTAMPTZ
)
"#;

// First-write-wins: an existing id is left untouched, never updated.
const INSERT_SQL: &str = r#"
INSERT INTO products
    (id, title, category, price_usd, price_gbp, description, image,
     rating_rate, rating_count, ingestion_timestamp)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (id) DO NOTHING
"#;

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub artifact: PathBuf,
    pub attempted: usize,
    pub inserted: u64,
}

/// Load the most recent cleaned artifact. The whole batch runs in one
/// transaction committed after the last row, so a failed run leaves the
/// table untouched and a rerun is exactly idempotent.
pub async fn run(config: &PipelineConfig, db: &DbConfig) -> Result<LoadOutcome> {
    let store = ArtifactStore::new(&config.processed_dir);
    let artifact = store
        .latest_matching(CLEANED_PREFIX, &["parquet", "json"])?
        .ok_or_else(|| StageError::InputNotFound {
            expected: "cleaned product",
            dir: config.processed_dir.clone(),
            remedy: "transform",
        })?;
    info!(artifact = %artifact.display(), "using latest cleaned artifact");

    let records = read_cleaned(&artifact)?;
    require_ids(&records)?;

    let pool = connect(db).await?;
    let outcome = async {
        ensure_table(&pool).await?;
        let inserted = insert_all(&pool, &records).await?;
        Ok::<_, StageError>(inserted)
    }
    .await;
    pool.close().await;
    let inserted = outcome?;

    info!(attempted = records.len(), inserted, "load complete");
    Ok(LoadOutcome {
        artifact,
        attempted: records.len(),
        inserted,
    })
}

/// Read a cleaned artifact in either persisted format.
pub(crate) fn read_cleaned(path: &Path) -> Result<Vec<CleanedProduct>> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if extension.eq_ignore_ascii_case("parquet") {
        read_cleaned_parquet(path)
    } else {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn read_cleaned_parquet(path: &Path) -> Result<Vec<CleanedProduct>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("opening parquet reader {}", path.display()))?
        .build()
        .with_context(|| format!("building parquet reader {}", path.display()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.with_context(|| format!("reading batch from {}", path.display()))?;
        decode_batch(&batch, &mut records)?;
    }
    Ok(records)
}

fn decode_batch(batch: &RecordBatch, out: &mut Vec<CleanedProduct>) -> Result<()> {
    let product_ids = int64_column(batch, "product_id")?;
    let titles = string_column(batch, "title")?;
    let prices = float64_column(batch, "price_usd")?;
    let descriptions = string_column(batch, "description")?;
    let categories = string_column(batch, "category")?;
    let image_urls = string_column(batch, "image_url")?;
    let rating_rates = float64_column(batch, "rating_rate")?;
    let rating_counts = int64_column(batch, "rating_count")?;
    let processed_at = string_column(batch, "processed_at_utc")?;
    let source_files = string_column(batch, "source_file")?;

    for row in 0..batch.num_rows() {
        out.push(CleanedProduct {
            product_id: opt_i64(product_ids, row),
            title: opt_string(titles, row),
            price_usd: opt_f64(prices, row),
            description: opt_string(descriptions, row),
            category: opt_string(categories, row),
            image_url: opt_string(image_urls, row),
            rating_rate: opt_f64(rating_rates, row),
            rating_count: opt_i64(rating_counts, row),
            processed_at_utc: opt_string(processed_at, row).unwrap_or_default(),
            source_file: opt_string(source_files, row).unwrap_or_default(),
        });
    }
    Ok(())
}

fn int64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    typed_column(batch, name)
}

fn float64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    typed_column(batch, name)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    typed_column(batch, name)
}

fn typed_column<'a, A: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    let column = batch
        .column_by_name(name)
        .with_context(|| format!("cleaned artifact is missing column {name}"))?;
    Ok(column
        .as_any()
        .downcast_ref::<A>()
        .with_context(|| format!("cleaned artifact column {name} has an unexpected type"))?)
}

fn opt_i64(array: &Int64Array, row: usize) -> Option<i64> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_f64(array: &Float64Array, row: usize) -> Option<f64> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

/// Key policy: a record without a product_id fails the batch loudly before
/// any insert is attempted.
pub(crate) fn require_ids(records: &[CleanedProduct]) -> Result<()> {
    if let Some(row) = records.iter().position(|r| r.product_id.is_none()) {
        return Err(StageError::MissingProductId { row });
    }
    Ok(())
}

async fn connect(db: &DbConfig) -> Result<PgPool> {
    Ok(PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(db.connect_timeout)
        .connect_with(db.connect_options())
        .await?)
}

/// Idempotent DDL, safe to run against an existing identical table.
async fn ensure_table(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_TABLE_SQL).execute(pool).await?;
    Ok(())
}

async fn insert_all(pool: &PgPool, records: &[CleanedProduct]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for record in records {
        let ingestion_timestamp: Option<DateTime<Utc>> =
            DateTime::parse_from_rfc3339(&record.processed_at_utc)
                .ok()
                .map(|t| t.with_timezone(&Utc));

        let result = sqlx::query(INSERT_SQL)
            .bind(record.product_id)
            .bind(record.title.as_deref())
            .bind(record.category.as_deref())
            .bind(record.price_usd)
            .bind(None::<f64>) // price_gbp: schema provision, never populated here
            .bind(record.description.as_deref())
            .bind(record.image_url.as_deref())
            .bind(record.rating_rate)
            .bind(record.rating_count)
            .bind(ingestion_timestamp)
            .execute(&mut *tx)
            .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
