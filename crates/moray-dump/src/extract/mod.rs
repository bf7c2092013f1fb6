//! The two extraction passes.
//!
//! Pass 1 ([`load_buckets_config`]) reads the bucket configuration table.
//! Pass 2 ([`extract_buckets_to_files`]) re-reads the dump from the start and
//! writes one JSON-lines file per configured bucket table. Each pass opens
//! its own [`DumpSource`] and closes it before returning.

mod reconcile;
mod reporter;
mod sink;

pub use reconcile::{parse_leading_int, reconcile, DocumentRecord};
pub use reporter::{ProgressSnapshot, RateReporter, TableProgress};
pub use sink::TableSink;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::bucket::{BucketConfigLoader, BucketMap};
use crate::config::ExtractConfig;
use crate::dump::{DumpSource, EventSource};
use crate::error::{ExtractError, Result};

/// Rows written for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: String,
    pub path: PathBuf,
    pub rows: u64,
}

/// Outcome of a successful extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractSummary {
    /// Written tables, in dump order.
    pub tables: Vec<TableSummary>,
    /// Tables present in the dump but absent from the bucket configuration.
    pub tables_skipped: Vec<String>,
    pub total_rows: u64,
    pub duration: Duration,
}

impl ExtractSummary {
    /// Average throughput over the whole pass.
    pub fn rows_per_second(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            (self.total_rows as f64 / secs) as u64
        } else {
            0
        }
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} tables, {} rows in {:.1}s ({} rows/s), {} tables skipped",
            self.tables.len(),
            self.total_rows,
            self.duration.as_secs_f64(),
            self.rows_per_second(),
            self.tables_skipped.len()
        )
    }
}

/// Pass 1: read the bucket configuration from the dump at `input`.
pub async fn load_buckets_config(input: impl AsRef<Path>, config: &ExtractConfig) -> Result<BucketMap> {
    let input = input.as_ref();
    debug!("loading bucket configuration from \"{}\"", input.display());

    let mut source = DumpSource::open(input, config).await?;
    let result = BucketConfigLoader::new(config.config_table.clone())
        .load(&mut source)
        .await;
    source.close().await;

    let buckets = result?;
    info!("found {} buckets", buckets.len());
    Ok(buckets)
}

/// Pass 2: write each bucket table of the dump at `input` into `output_dir`.
///
/// `output_dir` must not exist; it is created before the dump is read.
pub async fn extract_buckets_to_files(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    buckets: &BucketMap,
    config: &ExtractConfig,
) -> Result<ExtractSummary> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();

    create_output_dir(output_dir).await?;

    let mut source = DumpSource::open(input, config).await?;
    let result = TableSink::new(buckets, output_dir, config)
        .run(&mut source)
        .await;
    source.close().await;

    let summary = result?;
    info!("{}", summary.summary());
    Ok(summary)
}

async fn create_output_dir(path: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o755);

    match builder.create(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(ExtractError::OutputExists(path.to_path_buf()))
        }
        Err(e) => Err(ExtractError::Io(std::io::Error::new(
            e.kind(),
            format!("create {}: {}", path.display(), e),
        ))),
    }
}
