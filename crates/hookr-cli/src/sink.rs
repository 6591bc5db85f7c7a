//! Event sinks: where received hook events end up.
//!
//! Sinks are attached to a [`RelayClient`] through `on_hook_called`, the same
//! way any other observer is, so new outputs never touch the client.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::json;
use tracing::{debug, warn};

use hookr_client::{CallbackId, RelayClient};
use hookr_core::HookEvent;

use crate::output::{self, OutputFormat};

/// Errors that can occur while writing to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receives every hook event, in dispatch order.
pub trait EventSink: Send {
    fn write_event(&mut self, event: &HookEvent) -> Result<(), SinkError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Register a sink as a hook observer. Write failures are logged and do not
/// stop later events.
pub fn attach<S>(client: &RelayClient, sink: S) -> CallbackId
where
    S: EventSink + 'static,
{
    let sink = Mutex::new(sink);
    client.on_hook_called(move |event| {
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = sink.write_event(event) {
            warn!(
                sink = sink.name(),
                error = %e,
                event_id = %event.event_id,
                "Failed to write hook event"
            );
        }
    })
}

/// Renders events to a terminal-like writer.
pub struct ConsoleSink<W: Write + Send> {
    writer: W,
    format: OutputFormat,
    color: bool,
}

impl ConsoleSink<Stdout> {
    pub fn stdout(format: OutputFormat, color: bool) -> Self {
        Self::new(io::stdout(), format, color)
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub const fn new(writer: W, format: OutputFormat, color: bool) -> Self {
        Self {
            writer,
            format,
            color,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn write_event(&mut self, event: &HookEvent) -> Result<(), SinkError> {
        let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
        let rendered = output::render(event, self.format, &timestamp, self.color);
        let io_err = |source| SinkError::Io {
            path: "console".into(),
            source,
        };
        // Pretty blocks already end in a newline, which leaves a blank line
        // between consecutive events.
        writeln!(self.writer, "{rendered}").map_err(io_err)?;
        self.writer.flush().map_err(io_err)
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Appends one JSON record per event to a file.
///
/// Records look like `{"savedAt": "<RFC 3339>", "event": {...}}` and are
/// flushed after every line, so the file can be tailed while listening.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        debug!(path = %path.display(), "Opened save file");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn write_event(&mut self, event: &HookEvent) -> Result<(), SinkError> {
        let record = json!({
            "savedAt": chrono::Utc::now().to_rfc3339(),
            "event": output::event_document(event),
        });
        let line = serde_json::to_string(&record)?;
        let io_err = |source| SinkError::Io {
            path: self.path.display().to_string(),
            source,
        };
        writeln!(self.writer, "{line}").map_err(io_err)?;
        self.writer.flush().map_err(io_err)
    }

    fn name(&self) -> &str {
        "file"
    }
}
