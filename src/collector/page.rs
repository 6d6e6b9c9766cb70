//! Channel-backed page event collector.
//!
//! The host (a browser bridge, a replay script, a test) pushes
//! [`PageEvent`]s through a [`PageEventSender`]; the tracking service drains
//! the matching [`PageEventReceiver`]. Per-producer ordering is preserved.

use crate::collector::types::PageEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiving half handed to the tracking service.
pub type PageEventReceiver = mpsc::Receiver<PageEvent>;

/// Configuration for the page collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum number of queued events before producers wait.
    pub capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    /// The receiving side was already handed out or dropped.
    Closed,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::Closed => write!(f, "Collector channel is closed"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// Cloneable producer handle.
///
/// Events sent while the collector is stopped are dropped, the same way a
/// page listener that is not attached never sees them.
#[derive(Debug, Clone)]
pub struct PageEventSender {
    sender: mpsc::Sender<PageEvent>,
    running: Arc<AtomicBool>,
}

impl PageEventSender {
    /// Queue an event, waiting for capacity if needed.
    ///
    /// Returns `false` if the event was dropped (collector stopped or
    /// receiver gone).
    pub async fn send(&self, event: PageEvent) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.sender.send(event).await.is_ok()
    }
}

/// Collects page events into a single ordered channel.
pub struct PageCollector {
    sender: mpsc::Sender<PageEvent>,
    receiver: Option<PageEventReceiver>,
    running: Arc<AtomicBool>,
}

impl PageCollector {
    /// Create a new collector. It does not accept events until started.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        Self {
            sender,
            receiver: Some(receiver),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start accepting events.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting events. Already queued events stay queued.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get a producer handle.
    pub fn sender(&self) -> PageEventSender {
        PageEventSender {
            sender: self.sender.clone(),
            running: Arc::clone(&self.running),
        }
    }

    /// Hand out the receiving side. Only the first call succeeds.
    pub fn take_receiver(&mut self) -> Result<PageEventReceiver, CollectorError> {
        self.receiver.take().ok_or(CollectorError::Closed)
    }
}
