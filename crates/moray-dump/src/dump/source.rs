//! Dump event sources.
//!
//! [`DumpSource`] decompresses and tokenizes a dump file on a blocking
//! worker and hands events to the async consumer through a bounded channel.
//! A full channel parks the worker, so a consumer that stops pulling (for
//! example while an output write drains) stops the read as well.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use async_trait::async_trait;
use flate2::bufread::MultiGzDecoder;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::event::DumpEvent;
use super::tokenizer::DumpTokenizer;
use crate::config::ExtractConfig;
use crate::error::{ExtractError, Result};

/// First two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Ordered sequence of dump events consumed by the extraction passes.
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the dump is exhausted.
    async fn next_event(&mut self) -> Result<Option<DumpEvent>>;

    /// Stop reading and release the underlying input.
    ///
    /// Safe to call more than once; later calls do nothing.
    async fn close(&mut self);
}

/// Event source backed by a (possibly gzip-compressed) dump.
pub struct DumpSource {
    label: String,
    rx: Option<mpsc::Receiver<Result<DumpEvent>>>,
    worker: Option<JoinHandle<()>>,
}

impl DumpSource {
    /// Open `path` from its start and begin tokenizing it.
    ///
    /// Input beginning with the gzip magic bytes is decompressed; anything
    /// else is read as plain text.
    pub async fn open(path: impl AsRef<Path>, config: &ExtractConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let capacity = config.read_buffer_bytes;
        Ok(Self::spawn(
            move || decoded_reader(file, capacity),
            config.event_buffer,
            path.display().to_string(),
        ))
    }

    /// Tokenize an already-decompressed reader.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_reader<R>(reader: R, event_buffer: usize) -> Self
    where
        R: BufRead + Send + 'static,
    {
        Self::spawn(move || Ok(reader), event_buffer, "<reader>".to_string())
    }

    /// Run `open` and the tokenizer on a blocking worker.
    fn spawn<F, R>(open: F, event_buffer: usize, label: String) -> Self
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: BufRead,
    {
        let (tx, rx) = mpsc::channel(event_buffer.max(1));
        let worker_label = label.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let reader = match open() {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.blocking_send(Err(e));
                    return;
                }
            };
            for event in DumpTokenizer::new(reader) {
                if tx.blocking_send(event).is_err() {
                    debug!("{}: reader closed before end of dump", worker_label);
                    return;
                }
            }
            debug!("{}: end of dump", worker_label);
        });

        Self {
            label,
            rx: Some(rx),
            worker: Some(worker),
        }
    }

    async fn join_worker(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.await.map_err(|e| {
                ExtractError::Io(std::io::Error::other(format!(
                    "dump reader for {} failed: {}",
                    self.label, e
                )))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for DumpSource {
    async fn next_event(&mut self) -> Result<Option<DumpEvent>> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };

        match rx.recv().await {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(e)) => Err(e),
            None => {
                self.rx = None;
                self.join_worker().await?;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the receiver fails the worker's next send, which ends it
        // and drops the file.
        self.rx = None;
        if let Err(e) = self.join_worker().await {
            debug!("{}", e);
        }
    }
}

/// Wrap `file` in a buffered reader, decompressing when it looks like gzip.
///
/// Blocks on the first read; runs on the tokenizer's worker.
fn decoded_reader(file: File, capacity: usize) -> Result<Box<dyn BufRead + Send>> {
    let mut buffered = BufReader::with_capacity(capacity.max(1), file);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(BufReader::with_capacity(
            capacity.max(1),
            MultiGzDecoder::new(buffered),
        )))
    } else {
        Ok(Box::new(buffered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::DumpBuilder;
    use std::io::Cursor;

    fn sample() -> DumpBuilder {
        DumpBuilder::new()
            .copy("foo", &["_id"], &[&["1"], &["2"], &["3"]])
            .copy("bar", &["_id"], &[&["4"]])
    }

    async fn drain(source: &mut dyn EventSource) -> Vec<DumpEvent> {
        let mut events = Vec::new();
        while let Some(event) = source.next_event().await.unwrap() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_reads_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.gz");
        sample().write_gz(&path);

        let mut source = DumpSource::open(&path, &ExtractConfig::default()).await.unwrap();
        let events = drain(&mut source).await;
        assert_eq!(events.len(), 8);
        source.close().await;
    }

    #[tokio::test]
    async fn test_reads_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, sample().build()).unwrap();

        let mut source = DumpSource::open(&path, &ExtractConfig::default()).await.unwrap();
        assert_eq!(drain(&mut source).await.len(), 8);
    }

    #[test]
    fn test_decoded_reader_detects_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("dump.gz");
        sample().write_gz(&gz);
        let plain = dir.path().join("dump.sql");
        std::fs::write(&plain, sample().build()).unwrap();

        for path in [gz, plain] {
            let mut reader = decoded_reader(File::open(&path).unwrap(), 64).unwrap();
            let mut first = String::new();
            reader.read_line(&mut first).unwrap();
            assert_eq!(first, "--\n");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let result = DumpSource::open("/nonexistent/dump.gz", &ExtractConfig::default()).await;
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }

    #[tokio::test]
    async fn test_close_mid_stream_stops_worker() {
        let rows: Vec<[String; 1]> = (0..1000).map(|i| [i.to_string()]).collect();
        let rows: Vec<Vec<&str>> = rows.iter().map(|r| vec![r[0].as_str()]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
        let text = DumpBuilder::new().copy("big", &["_id"], &rows).build();

        let mut source = DumpSource::from_reader(Cursor::new(text.into_bytes()), 1);
        assert!(source.next_event().await.unwrap().is_some());

        source.close().await;
        assert!(source.worker.is_none());
        assert!(source.next_event().await.unwrap().is_none());
        source.close().await;
    }

    #[tokio::test]
    async fn test_tokenizer_error_is_delivered() {
        let text = "COPY public.foo (a) FROM stdin;\n1\n";
        let mut source = DumpSource::from_reader(Cursor::new(text.as_bytes().to_vec()), 4);

        assert!(source.next_event().await.unwrap().is_some());
        assert!(source.next_event().await.unwrap().is_some());
        assert!(matches!(
            source.next_event().await,
            Err(ExtractError::Structural(_))
        ));
        source.close().await;
    }
}
