//! Log file backend.
//!
//! Appends one CRLF-terminated line per security event:
//!
//! ```text
//! <date_occurred> <application_name> [<event_category>] (retry:<n>, coeff.:<n>) <description>
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::Backend;
use crate::error::DeliveryError;
use crate::event::{Event, FieldError};

/// Log file used when none is configured.
pub const DEFAULT_LOG_PATH: &str = "./sqreen_logs.txt";

/// An append-only log file shared by every backend writing to it.
///
/// The mutex guards the handle for the whole write/check/flush sequence, so
/// concurrent workers never interleave partial records.
#[derive(Debug)]
pub struct LogFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl LogFile {
    /// Open `path` in create-or-append mode.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Arc<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(path = %path.display(), "log_file_opened");

        Ok(Arc::new(Self {
            path,
            handle: Mutex::new(Some(file)),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and drop the handle. Later writes fail with a closed-file error.
    pub async fn close(&self) {
        let mut handle = self.handle.lock().await;
        if let Some(mut file) = handle.take() {
            if let Err(e) = file.flush().await {
                warn!(path = %self.path.display(), error = %e, "log_file_flush_on_close_failed");
            }
            info!(path = %self.path.display(), "log_file_closed");
        }
    }

    /// Append one record followed by CRLF.
    async fn append(&self, record: &str) -> Result<(), DeliveryError> {
        let line = format!("{}\r\n", record);

        let mut handle = self.handle.lock().await;
        let file = handle
            .as_mut()
            .ok_or_else(|| unexpected_error("log file is closed"))?;

        // WriteZero: the file stopped taking bytes partway through the line.
        file.write_all(line.as_bytes()).await.map_err(|e| {
            if e.kind() == io::ErrorKind::WriteZero {
                DeliveryError::new(format!("error writing log file: {}", record))
            } else {
                unexpected_error(e)
            }
        })?;

        file.flush().await.map_err(unexpected_error)?;
        Ok(())
    }
}

fn unexpected_error(e: impl std::fmt::Display) -> DeliveryError {
    DeliveryError::new(format!("unexpected error writing log file: {}", e))
}

/// Render the log record for a security event (without line terminator).
pub fn format_record(event: &Event) -> Result<String, FieldError> {
    Ok(format!(
        "{} {} [{}] (retry:{}, coeff.:{}) {}",
        event.date_occurred()?,
        event.application_name()?,
        event.event_category()?,
        event.retry_count()?,
        event.risk_coefficient()?,
        event.description()?,
    ))
}

/// Backend persisting security events to a text file.
#[derive(Debug, Clone)]
pub struct LogBackend {
    file: Arc<LogFile>,
}

impl LogBackend {
    /// Open (or create) the log file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::with_file(LogFile::open(path).await?))
    }

    /// Write to an already opened file, sharing its lock with other backends.
    pub fn with_file(file: Arc<LogFile>) -> Self {
        Self { file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn dispatch_events(&self, events: &[Event]) -> Vec<DeliveryError> {
        let mut errors = Vec::new();

        for event in events.iter().filter(|e| e.is_security_event()) {
            let record = match format_record(event) {
                Ok(record) => record,
                Err(e) => {
                    errors.push(unexpected_error(format!("{} (event {})", e, event.label())));
                    continue;
                }
            };

            match self.file.append(&record).await {
                Ok(()) => debug!(event_id = event.label(), "log_record_written"),
                Err(e) => errors.push(e),
            }
        }

        errors
    }
}

impl Backend for LogBackend {
    fn name(&self) -> &str {
        "log"
    }

    fn dispatch<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, Vec<DeliveryError>> {
        self.dispatch_events(events).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.file.close().boxed()
    }
}
