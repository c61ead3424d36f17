use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};
use tracing::{debug, warn};

use super::event::ProgressEvent;
use super::sink::{ProgressSink, TracingSink};

/// Receives progress events and broadcasts them to the registered sinks.
///
/// The bus owns a background listener task; producers hold cheap
/// [`ProgressSender`] clones. Emission is advisory end to end: a full or
/// closed bus never fails the pipeline that feeds it.
pub struct ProgressBus {
    sinks: Arc<Mutex<Vec<Box<dyn ProgressSink>>>>,
    channel: (flume::Sender<ProgressEvent>, flume::Receiver<ProgressEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::with_sink(TracingSink)
    }
}

impl ProgressBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: ProgressSink + 'static,
    {
        Self {
            sinks: Arc::new(Mutex::new(vec![Box::new(sink)])),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a bus with multiple sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn ProgressSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-run observers).
    pub fn add_sink<T: ProgressSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// Get a sender handle so producers can publish events.
    #[must_use]
    pub fn sender(&self) -> ProgressSender {
        ProgressSender {
            tx: self.channel.0.clone(),
        }
    }

    /// Spawn the background task that forwards events to all sinks.
    /// Idempotent: calling multiple times has no effect.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().unwrap();
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => forward(&sinks, &event),
                    }
                }
            }
            // Shutdown still delivers whatever was already queued.
            while let Ok(event) = receiver.try_recv() {
                forward(&sinks, &event);
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, flushing events already queued.
    pub async fn stop(&self) {
        let state = {
            let mut guard = self.listener.lock().unwrap();
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for ProgressBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

fn forward(sinks: &Mutex<Vec<Box<dyn ProgressSink>>>, event: &ProgressEvent) {
    let mut guard = sinks.lock().unwrap();
    for sink in guard.iter_mut() {
        if let Err(error) = sink.handle(event) {
            warn!(%error, "progress sink failed");
        }
    }
}

/// Cloneable producer handle onto a [`ProgressBus`].
#[derive(Clone, Debug)]
pub struct ProgressSender {
    tx: flume::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Publish one event. Disconnection is logged and swallowed; progress
    /// never fails the run that reports it.
    pub fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!("progress bus disconnected; event dropped");
        }
    }
}
