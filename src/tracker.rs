//! The tracking service: wires the pipeline together for one page visit.
//!
//! ```text
//! page events ─▶ FocusObserver ─▶ classify ─▶ FieldWatcher(s) ─┐
//!                                                              ├─▶ SessionAggregator ─▶ submitter ─▶ transport
//! start ─────────────────────────▶ fingerprint acquire ────────┘
//! ```
//!
//! The event loop is a single task, so focus changes and keystrokes are
//! handled strictly in arrival order. Fingerprinting and submission run in
//! their own tasks and only meet the event loop through the aggregator.

use crate::collector::{ElementHandle, ElementSnapshot, PageEvent, PageEventReceiver};
use crate::config::TrackerConfig;
use crate::core::classifier::classify;
use crate::core::fingerprint::{acquire, FingerprintOutcome, FingerprintSource};
use crate::core::focus::FocusObserver;
use crate::core::session::{SessionAggregator, SessionRecord, SubmitPolicy};
use crate::core::validator::{FieldKind, FieldWatcher, Observation};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use crate::transport::SessionTransport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tracking service errors.
#[derive(Debug)]
pub enum TrackerError {
    AlreadyStarted,
    /// A stopped service cannot be restarted; build a new one.
    Stopped,
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::AlreadyStarted => write!(f, "Tracking service is already running"),
            TrackerError::Stopped => write!(f, "Tracking service has been stopped"),
        }
    }
}

impl std::error::Error for TrackerError {}

/// One page visit's tracking pipeline.
pub struct TrackingService<T: SessionTransport, F: FingerprintSource> {
    config: TrackerConfig,
    aggregator: Arc<SessionAggregator>,
    transport: Arc<T>,
    fingerprint: Arc<F>,
    log: SharedTransparencyLog,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: SessionTransport, F: FingerprintSource> TrackingService<T, F> {
    /// Create a service with a fresh session. Nothing runs until [`start`].
    ///
    /// [`start`]: TrackingService::start
    pub fn new(config: TrackerConfig, transport: T, fingerprint: F) -> Self {
        Self::with_session(config, SessionRecord::new(), transport, fingerprint)
    }

    /// Create a service around an existing (empty) session record.
    pub fn with_session(
        config: TrackerConfig,
        record: SessionRecord,
        transport: T,
        fingerprint: F,
    ) -> Self {
        Self {
            config,
            aggregator: Arc::new(SessionAggregator::new(record)),
            transport: Arc::new(transport),
            fingerprint: Arc::new(fingerprint),
            log: create_shared_log(),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Report into a shared transparency log instead of a private one.
    pub fn with_log(mut self, log: SharedTransparencyLog) -> Self {
        self.log = log;
        self
    }

    pub fn session_id(&self) -> String {
        self.aggregator.session_id()
    }

    /// The current session record.
    pub fn session(&self) -> SessionRecord {
        self.aggregator.snapshot()
    }

    /// Follow session record versions.
    pub fn subscribe(&self) -> watch::Receiver<SessionRecord> {
        self.aggregator.subscribe()
    }

    pub fn log(&self) -> &SharedTransparencyLog {
        &self.log
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && !self.cancel.is_cancelled()
    }

    /// Start the pipeline on a page event stream.
    ///
    /// Arms the submitter, starts fingerprint acquisition and begins
    /// consuming `events`.
    pub fn start(&mut self, events: PageEventReceiver) -> Result<(), TrackerError> {
        if self.cancel.is_cancelled() {
            return Err(TrackerError::Stopped);
        }
        if !self.tasks.is_empty() {
            return Err(TrackerError::AlreadyStarted);
        }

        let session_id = self.session_id();
        tracing::info!(%session_id, "tracking service starting");

        // The submitter subscribes before anything can be merged.
        let policy = SubmitPolicy {
            quiet_period: self.config.quiet_period,
            flush_on_stop: self.config.flush_on_stop,
            submit_initial: self.config.submit_initial,
        };
        self.tasks.push(self.aggregator.spawn_submitter(
            Arc::clone(&self.transport),
            policy,
            Arc::clone(&self.log),
            self.cancel.clone(),
        ));

        self.tasks.push(tokio::spawn(run_fingerprint(
            Arc::clone(&self.fingerprint),
            self.config,
            Arc::clone(&self.aggregator),
            Arc::clone(&self.log),
            self.cancel.clone(),
        )));

        let event_loop = EventLoop {
            aggregator: Arc::clone(&self.aggregator),
            focus: FocusObserver::new(),
            watchers: HashMap::new(),
            instrumented: HashSet::new(),
            dedupe: self.config.dedupe_watchers,
            log: Arc::clone(&self.log),
        };
        self.tasks
            .push(tokio::spawn(event_loop.run(events, self.cancel.clone())));

        Ok(())
    }

    /// Stop every task and wait for them. A pending session version is
    /// flushed first when configured to.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!("tracking task ended abnormally: {e}");
            }
        }
        tracing::info!(session_id = %self.session_id(), "tracking service stopped");
    }
}

impl<T: SessionTransport, F: FingerprintSource> Drop for TrackingService<T, F> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_fingerprint<F: FingerprintSource>(
    source: Arc<F>,
    config: TrackerConfig,
    aggregator: Arc<SessionAggregator>,
    log: SharedTransparencyLog,
    cancel: CancellationToken,
) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => return,
        outcome = acquire(source, config.fingerprint_timeout) => outcome,
    };

    if let Some(patch) = outcome.patch() {
        aggregator.merge(&patch);
    }

    match outcome {
        FingerprintOutcome::Acquired(hash) => {
            log.record_fingerprint_acquired();
            tracing::debug!(%hash, "fingerprint acquired");
        }
        FingerprintOutcome::TimedOut => {
            log.record_fingerprint_timeout();
            tracing::debug!(
                "fingerprint not ready within {:?}, giving up",
                config.fingerprint_timeout
            );
        }
        FingerprintOutcome::Failed(reason) => {
            log.record_fingerprint_failure();
            tracing::debug!("fingerprint failed: {reason}");
        }
    }
}

/// State owned by the event loop task.
struct EventLoop {
    aggregator: Arc<SessionAggregator>,
    focus: FocusObserver,
    watchers: HashMap<ElementHandle, Vec<FieldWatcher>>,
    instrumented: HashSet<(ElementHandle, FieldKind)>,
    dedupe: bool,
    log: SharedTransparencyLog,
}

impl EventLoop {
    async fn run(mut self, mut events: PageEventReceiver, cancel: CancellationToken) {
        let mut focus = self.focus.subscribe();

        loop {
            // Focus changes go before further page events so a keystroke
            // queued right after a click finds its watcher attached.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = focus.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let focused = focus.borrow_and_update().clone();
                    if let Some(element) = focused {
                        self.instrument(element);
                    }
                }
                event = events.recv() => match event {
                    Some(PageEvent::Click { active }) => {
                        self.log.record_click();
                        self.focus.observe_click(active);
                    }
                    Some(PageEvent::KeyUp { element, value }) => self.dispatch(element, &value),
                    None => {
                        tracing::debug!("page event stream closed");
                        break;
                    }
                },
            }
        }
    }

    /// Classify a newly focused element and attach watchers to it.
    fn instrument(&mut self, element: ElementSnapshot) {
        let Some(classification) = classify(&element) else {
            self.log.record_unidentifiable_element();
            tracing::debug!(element = %element.handle, "focused element has no attributes");
            return;
        };

        if classification.email {
            self.attach(element.handle, FieldKind::Email);
        }
        if classification.phone {
            self.attach(element.handle, FieldKind::Phone);
        }
        if classification.is_unknown() {
            tracing::debug!(element = %element.handle, "focused element is not a tracked field");
        }
    }

    fn attach(&mut self, handle: ElementHandle, kind: FieldKind) {
        if self.dedupe && !self.instrumented.insert((handle, kind)) {
            return;
        }

        self.watchers
            .entry(handle)
            .or_default()
            .push(FieldWatcher::new(kind));

        match kind {
            FieldKind::Email => self.log.record_email_field(),
            FieldKind::Phone => self.log.record_phone_field(),
        }
        tracing::debug!(element = %handle, %kind, "watcher attached");
    }

    /// Run a keystroke value through the element's watchers.
    fn dispatch(&mut self, handle: ElementHandle, value: &str) {
        let Some(watchers) = self.watchers.get_mut(&handle) else {
            return;
        };

        for watcher in watchers.iter_mut() {
            match watcher.observe(value) {
                Observation::Accepted(patch) => {
                    self.log.record_value_accepted();
                    self.aggregator.merge(&patch);
                    tracing::debug!(element = %handle, kind = %watcher.kind(), "value accepted");
                }
                Observation::Duplicate => self.log.record_value_duplicate(),
                Observation::Rejected => self.log.record_value_rejected(),
            }
        }
    }
}
