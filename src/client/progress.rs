//! Progress reporting.
//!
//! The orchestrator pushes a [`ProgressEvent`] into a [`ProgressSink`] on every
//! successful poll. Delivery is best effort: a sink that errors or panics is
//! logged and polling carries on.
//!
//! | Sink | Use |
//! |------|-----|
//! | any `Fn(&ProgressEvent)` closure | inline callbacks |
//! | [`NoopProgressSink`] | ignore progress |
//! | [`InMemoryProgressSink`] | collect events (tests, summaries) |
//! | [`ChannelProgressSink`] | pull-style consumption from a receiver |

use crate::types::ProgressEvent;
use crate::{Error, ErrorContext, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::warn;

/// Receives progress events for one or more jobs.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _event: &ProgressEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps the most recent `max_events` events in memory.
#[derive(Debug, Clone)]
pub struct InMemoryProgressSink {
    events: Arc<RwLock<Vec<ProgressEvent>>>,
    max_events: usize,
}

impl InMemoryProgressSink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events: max.max(1),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for_job(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job_id == job_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }
}

impl Default for InMemoryProgressSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ProgressSink for InMemoryProgressSink {
    fn on_progress(&self, event: &ProgressEvent) -> Result<()> {
        let mut events = self.events.write().map_err(|_| {
            Error::runtime_with_context(
                "progress buffer poisoned",
                ErrorContext::new().with_source("in_memory_progress_sink"),
            )
        })?;
        events.push(event.clone());
        if events.len() > self.max_events {
            events.remove(0);
        }
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
///
/// The receiver yields a finite sequence: it ends once the sink (and every
/// clone of it) is dropped after the run resolves.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&self, event: &ProgressEvent) -> Result<()> {
        self.tx.send(event.clone()).map_err(|_| {
            Error::runtime_with_context(
                "progress receiver dropped",
                ErrorContext::new().with_source("channel_progress_sink"),
            )
        })
    }
}

/// Hand `event` to `sink`, swallowing errors and panics.
pub(crate) fn deliver(sink: &dyn ProgressSink, event: &ProgressEvent) {
    match catch_unwind(AssertUnwindSafe(|| sink.on_progress(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(job_id = event.job_id.as_str(), error = %e, "progress sink returned an error");
        }
        Err(_) => {
            warn!(job_id = event.job_id.as_str(), "progress sink panicked");
        }
    }
}
