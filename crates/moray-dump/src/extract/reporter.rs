//! Periodic throughput reporting for the table sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Progress of the table currently being written.
///
/// Written by the sink, read by the [`RateReporter`].
#[derive(Debug, Default)]
pub struct TableProgress {
    rows: AtomicU64,
    state: Mutex<ProgressState>,
}

#[derive(Debug, Default)]
struct ProgressState {
    table: Option<ActiveTable>,
    generation: u64,
}

#[derive(Debug, Clone)]
struct ActiveTable {
    name: String,
    started: Instant,
    generation: u64,
}

/// Point-in-time view of [`TableProgress`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub table: String,
    pub rows: u64,
    pub started: Instant,
    /// Changes every time a new table begins.
    pub generation: u64,
}

impl TableProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A new output table was opened; its row count starts at zero.
    pub fn begin_table(&self, name: &str) {
        let mut state = self.state();
        state.generation += 1;
        self.rows.store(0, Ordering::Relaxed);
        state.table = Some(ActiveTable {
            name: name.to_string(),
            started: Instant::now(),
            generation: state.generation,
        });
    }

    /// Publish the current table's running row count.
    pub fn set_rows(&self, rows: u64) {
        self.rows.store(rows, Ordering::Relaxed);
    }

    /// The current table was closed.
    pub fn finish_table(&self) {
        self.state().table = None;
    }

    /// Current table and row count, if a table is open.
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        let state = self.state();
        state.table.as_ref().map(|t| ProgressSnapshot {
            table: t.name.clone(),
            rows: self.rows.load(Ordering::Relaxed),
            started: t.started,
            generation: t.generation,
        })
    }
}

/// Sampling window between two reports.
#[derive(Debug)]
struct RateWindow {
    generation: u64,
    last_rows: u64,
    last_stamp: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            generation: 0,
            last_rows: 0,
            last_stamp: now,
        }
    }

    /// Rows per second since the previous sample, then start a new window.
    ///
    /// A table change restarts the window at that table's start.
    fn sample(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> u64 {
        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.last_rows = 0;
            self.last_stamp = snapshot.started;
        }

        // The extra millisecond keeps the divisor non-zero.
        let elapsed = now.saturating_duration_since(self.last_stamp) + Duration::from_millis(1);
        let rows = snapshot.rows.saturating_sub(self.last_rows);
        let rate = rows as f64 / elapsed.as_secs_f64();

        self.last_rows = snapshot.rows;
        self.last_stamp = now;
        rate as u64
    }
}

/// Background task logging rows per second for the open table.
pub struct RateReporter {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RateReporter {
    /// Start reporting every `interval`.
    pub fn start(progress: Arc<TableProgress>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            ticker.tick().await;

            let mut window = RateWindow::new(Instant::now());
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(snapshot) = progress.snapshot() {
                            let rate = window.sample(&snapshot, Instant::now());
                            info!(
                                table = %snapshot.table,
                                rows = snapshot.rows,
                                "{} rows per second; bucket \"{}\"",
                                rate,
                                snapshot.table
                            );
                        }
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    /// Stop the reporter and wait for its task to end.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("rate reporter ended abnormally: {}", e);
        }
    }
}
