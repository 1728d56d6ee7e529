//! Batch pipeline stages and orchestration for skuflow.
//!
//! Data flows one way through the filesystem: the fetch stage writes a raw
//! snapshot, the transform stage reads the latest raw snapshot and writes a
//! cleaned artifact, the load stage reads the latest cleaned artifact and
//! upserts into Postgres. Each stage discovers its input on its own; nothing
//! hands file names between stages.

pub mod config;
pub mod error;
pub mod fetch;
pub mod load;
pub mod orchestrator;
pub mod transform;

pub use config::{DbConfig, PipelineConfig};
pub use error::StageError;
pub use orchestrator::{Orchestrator, RunSummary};

pub const CRATE_NAME: &str = "skuflow-pipeline";
