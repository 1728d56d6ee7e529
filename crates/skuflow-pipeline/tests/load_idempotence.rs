//! Double-load idempotence against a real Postgres instance.
//!
//! Ignored by default: point `SKUFLOW_DB_*` and `SKUFLOW_DB_PASSWORD` at a
//! disposable database (set `SKUFLOW_DB_REQUIRE_TLS=0` for a local server
//! without TLS) and run `cargo test -p skuflow-pipeline -- --ignored`.

use chrono::Utc;
use skuflow_core::CleanedProduct;
use skuflow_pipeline::{load, DbConfig, PipelineConfig};
use sqlx::postgres::PgPoolOptions;

fn record(id: i64, title: &str) -> CleanedProduct {
    CleanedProduct {
        product_id: Some(id),
        title: Some(title.to_string()),
        price_usd: Some(9.99),
        description: None,
        category: Some("tools".into()),
        image_url: None,
        rating_rate: Some(4.5),
        rating_count: Some(10),
        processed_at_utc: "2026-08-29T06:00:00Z".into(),
        source_file: "products_raw_20260829_060000.json".into(),
    }
}

fn test_config(root: &std::path::Path) -> PipelineConfig {
    PipelineConfig {
        api_url: "https://example.test/products".into(),
        raw_dir: root.join("raw"),
        processed_dir: root.join("processed"),
        http_timeout: std::time::Duration::from_secs(30),
        user_agent: None,
        retry_delay: std::time::Duration::from_millis(0),
        scheduler_enabled: false,
        cron: "0 0 6 * * *".into(),
    }
}

fn write_artifact(config: &PipelineConfig, records: &[CleanedProduct]) -> std::path::PathBuf {
    std::fs::create_dir_all(&config.processed_dir).expect("processed dir");
    let artifact = config
        .processed_dir
        .join("products_cleaned_20260829_060000.json");
    std::fs::write(&artifact, serde_json::to_vec_pretty(records).expect("serialize"))
        .expect("write artifact");
    artifact
}

#[tokio::test]
#[ignore = "needs a reachable Postgres; configure SKUFLOW_DB_* and SKUFLOW_DB_PASSWORD"]
async fn double_load_leaves_one_row_per_id_and_never_updates() {
    let db = DbConfig::from_env().expect("database configuration");
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());

    // Fresh ids per run so reruns of this test never collide with old rows.
    let base = Utc::now().timestamp_millis();
    let ids = vec![base, base + 1];

    let records: Vec<CleanedProduct> =
        ids.iter().map(|&id| record(id, "Widget")).collect();
    write_artifact(&config, &records);

    let first = load::run(&config, &db).await.expect("first load");
    assert_eq!(first.attempted, 2);
    assert_eq!(first.inserted, 2);

    // Second run of the same batch, with changed titles to prove that
    // existing rows are left untouched, not updated.
    let altered: Vec<CleanedProduct> =
        ids.iter().map(|&id| record(id, "Altered Widget")).collect();
    write_artifact(&config, &altered);

    let second = load::run(&config, &db).await.expect("second load");
    assert_eq!(second.attempted, 2);
    assert_eq!(second.inserted, 0);

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(db.connect_options())
        .await
        .expect("connect");

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(&pool)
        .await
        .expect("count rows");
    assert_eq!(rows, ids.len() as i64);

    let title: Option<String> = sqlx::query_scalar("SELECT title FROM products WHERE id = $1")
        .bind(ids[0])
        .fetch_one(&pool)
        .await
        .expect("read title");
    assert_eq!(title.as_deref(), Some("Widget"));

    sqlx::query("DELETE FROM products WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&pool)
        .await
        .expect("cleanup");
    pool.close().await;
}
