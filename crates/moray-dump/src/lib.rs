//! # moray-dump
//!
//! Offline extraction of Moray bucket contents from `pg_dump` backups.
//!
//! A Moray shard stores each bucket in its own PostgreSQL table and keeps
//! bucket definitions in a configuration table. This library reads a
//! gzip-compressed plain-text dump of such a shard twice:
//!
//! - **Pass 1** collects the bucket configuration
//! - **Pass 2** writes one JSON-lines file per bucket table, rebuilding each
//!   document from its serialized value and its index columns
//!
//! ## Example
//!
//! ```rust,no_run
//! use moray_dump::{extract_buckets_to_files, load_buckets_config, ExtractConfig};
//!
//! #[tokio::main]
//! async fn main() -> moray_dump::Result<()> {
//!     let config = ExtractConfig::default();
//!     let buckets = load_buckets_config("moray.gz", &config).await?;
//!     let summary = extract_buckets_to_files("moray.gz", "out", &buckets, &config).await?;
//!     println!("Wrote {} rows", summary.total_rows);
//!     Ok(())
//! }
//! ```

pub mod bucket;
pub mod config;
pub mod dump;
pub mod error;
pub mod extract;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use bucket::{BucketConfig, BucketConfigLoader, BucketMap, IndexKey};
pub use config::ExtractConfig;
pub use dump::{CopyRow, DumpEvent, DumpSource, EventSource};
pub use error::{ExtractError, Result};
pub use extract::{
    extract_buckets_to_files, load_buckets_config, DocumentRecord, ExtractSummary, TableSink,
    TableSummary,
};
