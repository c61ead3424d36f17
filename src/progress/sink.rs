use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

use super::event::ProgressEvent;
use crate::telemetry::{PlainFormatter, TelemetryFormatter};

/// Abstraction over an output target that consumes progress events.
pub trait ProgressSink: Send + Sync {
    /// Handle one event. The sink decides how to render or forward it.
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()>;
}

/// Stdout sink with optional formatting.
pub struct StdOutSink<F: TelemetryFormatter = PlainFormatter> {
    handle: Stdout,
    formatter: F,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
            formatter: PlainFormatter::new(),
        }
    }
}

impl<F: TelemetryFormatter> StdOutSink<F> {
    pub fn with_formatter(formatter: F) -> Self {
        Self {
            handle: io::stdout(),
            formatter,
        }
    }
}

impl<F: TelemetryFormatter> ProgressSink for StdOutSink<F> {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        let rendered = self.formatter.render_event(event).join_lines();
        self.handle.write_all(rendered.as_bytes())?;
        self.handle.flush()
    }
}

/// Default sink: emits each event as a structured tracing record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        info!(
            target: "packferry::progress",
            scope = %event.scope,
            percent = event.percent,
            "{}",
            event.message
        );
        Ok(())
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.entries.lock().unwrap().clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl ProgressSink for MemorySink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Channel-based sink for streaming to async consumers.
///
/// Events are forwarded to a tokio mpsc channel without blocking. Useful for
/// live dashboards or SSE endpoints layered over a running ingest.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a new channel sink.
    ///
    /// # Example
    /// ```no_run
    /// use tokio::sync::mpsc;
    /// use packferry::progress::{ChannelSink, ProgressBus};
    ///
    /// let (tx, mut rx) = mpsc::unbounded_channel();
    /// let bus = ProgressBus::default();
    /// bus.add_sink(ChannelSink::new(tx));
    ///
    /// // In another task, consume events:
    /// tokio::spawn(async move {
    ///     while let Some(event) = rx.recv().await {
    ///         println!("{event}");
    ///     }
    /// });
    /// ```
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn handle(&mut self, event: &ProgressEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
