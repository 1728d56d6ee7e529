//! Env-sourced configuration for the pipeline and the destination database.
//!
//! Everything that used to be a constant in earlier cuts of this pipeline is
//! an explicit struct here so tests can point stages at temp directories and
//! alternate databases.

use std::path::PathBuf;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{Result, StageError};

pub const PASSWORD_ENV: &str = "SKUFLOW_DB_PASSWORD";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_url: String,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub http_timeout: Duration,
    pub user_agent: Option<String>,
    /// Fixed delay before the orchestrator's single retry of a failed step.
    pub retry_delay: Duration,
    pub scheduler_enabled: bool,
    /// 6-field cron expression (seconds first); default is daily at 06:00 UTC.
    pub cron: String,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("SKUFLOW_API_URL")
                .unwrap_or_else(|_| "https://fakestoreapi.com/products".to_string()),
            raw_dir: std::env::var("SKUFLOW_RAW_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/raw-data")),
            processed_dir: std::env::var("SKUFLOW_PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/processed-data")),
            http_timeout: Duration::from_secs(
                std::env::var("SKUFLOW_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            user_agent: std::env::var("SKUFLOW_USER_AGENT").ok(),
            retry_delay: Duration::from_secs(
                std::env::var("SKUFLOW_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            scheduler_enabled: std::env::var("SKUFLOW_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            cron: std::env::var("SKUFLOW_CRON").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub require_tls: bool,
    pub connect_timeout: Duration,
}

impl DbConfig {
    /// Build from environment. The password comes only from
    /// [`PASSWORD_ENV`]; a missing or empty value is a configuration error
    /// raised before any connection attempt.
    pub fn from_env() -> Result<Self> {
        let password = resolve_password(std::env::var(PASSWORD_ENV).ok())?;
        Ok(Self {
            host: std::env::var("SKUFLOW_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("SKUFLOW_DB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("SKUFLOW_DB_NAME").unwrap_or_else(|_| "skuflow".to_string()),
            user: std::env::var("SKUFLOW_DB_USER").unwrap_or_else(|_| "skuflow".to_string()),
            password,
            require_tls: std::env::var("SKUFLOW_DB_REQUIRE_TLS")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "False"))
                .unwrap_or(true),
            connect_timeout: Duration::from_secs(
                std::env::var("SKUFLOW_DB_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(ssl_mode)
    }
}

fn resolve_password(value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(StageError::Configuration { var: PASSWORD_ENV })
}
