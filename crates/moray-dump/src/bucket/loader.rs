//! First pass: collect bucket configuration from the configuration table.

use tracing::debug;

use super::{BucketConfig, BucketMap};
use crate::dump::{DumpEvent, EventSource};
use crate::error::{ExtractError, Result};

/// Where the loader is in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Looking for the configuration table's section.
    Searching,
    /// Reading configuration rows.
    InConfigSection,
    /// The configuration section ended; the map is complete.
    Done,
    /// A row could not be accepted.
    Failed,
}

/// Event-driven reader of the bucket configuration table.
#[derive(Debug)]
pub struct BucketConfigLoader {
    config_table: String,
    state: LoaderState,
    buckets: BucketMap,
}

impl BucketConfigLoader {
    /// Create a loader for the configuration table named `config_table`.
    pub fn new(config_table: impl Into<String>) -> Self {
        Self {
            config_table: config_table.into(),
            state: LoaderState::Searching,
            buckets: BucketMap::new(),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Handle one event.
    ///
    /// Returns `true` once no further events are needed. An error moves the
    /// loader to [`LoaderState::Failed`].
    pub fn process(&mut self, event: DumpEvent) -> Result<bool> {
        match self.state {
            LoaderState::Done | LoaderState::Failed => return Ok(true),
            LoaderState::Searching => {
                if let DumpEvent::SectionStart { table, .. } = event {
                    if table == self.config_table {
                        debug!("found bucket configuration table \"{}\"", table);
                        self.state = LoaderState::InConfigSection;
                    }
                }
                return Ok(false);
            }
            LoaderState::InConfigSection => {}
        }

        match event {
            DumpEvent::Row(row) => {
                let bucket = match BucketConfig::from_row(&self.config_table, &row) {
                    Ok(bucket) => bucket,
                    Err(e) => {
                        self.state = LoaderState::Failed;
                        return Err(e);
                    }
                };
                if self.buckets.contains_key(&bucket.name) {
                    self.state = LoaderState::Failed;
                    return Err(ExtractError::DuplicateBucket(bucket.name));
                }
                self.buckets.insert(bucket.name.clone(), bucket);
                Ok(false)
            }
            DumpEvent::SectionEnd { .. } => {
                self.state = LoaderState::Done;
                Ok(true)
            }
            DumpEvent::SectionStart { table, .. } => {
                self.state = LoaderState::Failed;
                Err(ExtractError::structural(format!(
                    "section for table \"{}\" began inside the \"{}\" section",
                    table, self.config_table
                )))
            }
        }
    }

    /// Return the collected map; fails unless the configuration section was
    /// read to its end.
    pub fn finish(self) -> Result<BucketMap> {
        match self.state {
            LoaderState::Done => Ok(self.buckets),
            LoaderState::Searching => Err(ExtractError::structural(format!(
                "dump ended without a \"{}\" section",
                self.config_table
            ))),
            LoaderState::InConfigSection | LoaderState::Failed => Err(ExtractError::structural(
                format!("dump ended inside the \"{}\" section", self.config_table),
            )),
        }
    }

    /// Drive the loader from `source` until the configuration section ends.
    ///
    /// Stops pulling events as soon as the map is complete or an error
    /// occurs; closing the source is left to the caller.
    pub async fn load<S>(mut self, source: &mut S) -> Result<BucketMap>
    where
        S: EventSource + ?Sized,
    {
        while let Some(event) = source.next_event().await? {
            if self.process(event)? {
                break;
            }
        }

        let buckets = self.finish()?;
        debug!("loaded {} bucket configurations", buckets.len());
        Ok(buckets)
    }
}
