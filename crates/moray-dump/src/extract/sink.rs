//! Second pass: write each bucket table's rows to its own JSON-lines file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::reconcile::reconcile;
use super::reporter::{RateReporter, TableProgress};
use super::{ExtractSummary, TableSummary};
use crate::bucket::{BucketConfig, BucketMap};
use crate::config::ExtractConfig;
use crate::dump::{CopyRow, DumpEvent, EventSource};
use crate::error::{ExtractError, Result};

/// Output file of the table being written.
struct OpenTable<'a> {
    table: String,
    path: PathBuf,
    bucket: &'a BucketConfig,
    output: BufWriter<File>,
    rows: u64,
}

/// Event-driven writer of per-table output files.
///
/// At most one output file is open at a time. Every write is awaited
/// before the next event is pulled from the source.
pub struct TableSink<'a> {
    buckets: &'a BucketMap,
    output_dir: PathBuf,
    config_table: String,
    write_buffer_bytes: usize,
    report_interval: Duration,
    progress: Arc<TableProgress>,
    current: Option<OpenTable<'a>>,
    line: Vec<u8>,
    summary: ExtractSummary,
}

impl<'a> TableSink<'a> {
    /// Create a sink writing into the existing directory `output_dir`.
    pub fn new(buckets: &'a BucketMap, output_dir: impl Into<PathBuf>, config: &ExtractConfig) -> Self {
        Self {
            buckets,
            output_dir: output_dir.into(),
            config_table: config.config_table.clone(),
            write_buffer_bytes: config.write_buffer_bytes.max(1),
            report_interval: config.report_interval(),
            progress: Arc::new(TableProgress::new()),
            current: None,
            line: Vec::with_capacity(4096),
            summary: ExtractSummary::default(),
        }
    }

    /// Consume `source` to its end.
    ///
    /// The throughput reporter runs for the duration of the call and is
    /// stopped before it returns, whatever the outcome. On failure the open
    /// output file is flushed as far as possible and left in place.
    pub async fn run<S>(mut self, source: &mut S) -> Result<ExtractSummary>
    where
        S: EventSource + ?Sized,
    {
        let started = Instant::now();
        let reporter = RateReporter::start(self.progress.clone(), self.report_interval);

        let result = self.drive(source).await;
        reporter.stop().await;

        match result {
            Ok(()) => {
                self.summary.duration = started.elapsed();
                Ok(self.summary)
            }
            Err(e) => {
                self.abandon().await;
                Err(e)
            }
        }
    }

    async fn drive<S>(&mut self, source: &mut S) -> Result<()>
    where
        S: EventSource + ?Sized,
    {
        while let Some(event) = source.next_event().await? {
            self.handle(event).await?;
        }

        if let Some(open) = self.current.take() {
            warn!("dump ended while writing table \"{}\"", open.table);
            self.close_table(open).await?;
        }
        Ok(())
    }

    /// Handle one event.
    pub async fn handle(&mut self, event: DumpEvent) -> Result<()> {
        match event {
            DumpEvent::SectionStart { table, .. } => self.start_table(table).await,
            DumpEvent::Row(row) => self.write_row(&row).await,
            DumpEvent::SectionEnd { .. } => match self.current.take() {
                Some(open) => self.close_table(open).await,
                None => Ok(()),
            },
        }
    }

    async fn start_table(&mut self, table: String) -> Result<()> {
        if let Some(open) = &self.current {
            return Err(ExtractError::structural(format!(
                "section for table \"{}\" began inside the \"{}\" section",
                table, open.table
            )));
        }

        if table == self.config_table {
            debug!("skipping bucket configuration table \"{}\"", table);
            return Ok(());
        }

        let buckets = self.buckets;
        let Some(bucket) = buckets.get(&table) else {
            warn!("table \"{}\" skipped; not in bucket configuration", table);
            self.summary.tables_skipped.push(table);
            return Ok(());
        };

        let path = output_path(&self.output_dir, &table)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                ExtractError::Io(std::io::Error::new(
                    e.kind(),
                    format!("create {}: {}", path.display(), e),
                ))
            })?;
        info!("writing to \"{}\"", path.display());

        self.progress.begin_table(&table);
        self.current = Some(OpenTable {
            table,
            path,
            bucket,
            output: BufWriter::with_capacity(self.write_buffer_bytes, file),
            rows: 0,
        });
        Ok(())
    }

    async fn write_row(&mut self, row: &CopyRow) -> Result<()> {
        let Some(open) = self.current.as_mut() else {
            return Ok(());
        };

        let record = reconcile(open.bucket, row)?;
        self.line.clear();
        serde_json::to_writer(&mut self.line, &record)?;
        self.line.push(b'\n');

        open.output.write_all(&self.line).await?;
        open.rows += 1;
        self.progress.set_rows(open.rows);
        Ok(())
    }

    async fn close_table(&mut self, mut open: OpenTable<'a>) -> Result<()> {
        self.progress.finish_table();

        open.output.flush().await?;
        open.output.shutdown().await?;
        // Wait for the file's last operation so the descriptor is released.
        drop(open.output.into_inner().into_std().await);

        info!("{}: wrote {} rows", open.table, open.rows);
        self.summary.total_rows += open.rows;
        self.summary.tables.push(TableSummary {
            table: open.table,
            path: open.path,
            rows: open.rows,
        });
        Ok(())
    }

    /// Best-effort cleanup after a failure; the partial file stays on disk.
    async fn abandon(&mut self) {
        let Some(mut open) = self.current.take() else {
            return;
        };
        self.progress.finish_table();

        if let Err(e) = open.output.flush().await {
            warn!("failed to flush \"{}\": {}", open.path.display(), e);
        }
        warn!(
            "left partial output \"{}\" after {} rows",
            open.path.display(),
            open.rows
        );
    }
}

/// `<output_dir>/<table>.json`, refusing names that would leave the directory.
fn output_path(output_dir: &Path, table: &str) -> Result<PathBuf> {
    if table.is_empty() || table == "." || table == ".." || table.contains(['/', '\\', '\0']) {
        return Err(ExtractError::structural(format!(
            "table name \"{}\" cannot be used as a file name",
            table
        )));
    }
    Ok(output_dir.join(format!("{}.json", table)))
}
