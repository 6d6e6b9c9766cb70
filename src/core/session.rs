//! The session record and its aggregator.
//!
//! Every observation in the pipeline converges on one [`SessionRecord`].
//! The record lives in a `watch` channel: a merge is a single
//! read-modify-publish on the current version, so concurrent contributors
//! (email watcher, phone watcher, fingerprint acquirer) cannot lose each
//! other's updates, and readers only ever see complete versions.
//!
//! The submitter follows the published versions and sends the latest one
//! after a quiet period with no further updates.

use crate::transparency::SharedTransparencyLog;
use crate::transport::SessionTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Prefix of the fingerprint tag in [`SessionRecord::tags`].
pub const FINGERPRINT_TAG_PREFIX: &str = "fingerprint:";

/// The outgoing session record.
///
/// Serialized as `{"sessionId", "email", "phone", "tags"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Assigned once at construction, never changes.
    pub session_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Append-only annotations.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SessionRecord {
    /// A fresh record with a random session id and no observations.
    pub fn new() -> Self {
        Self::with_session_id(Uuid::new_v4().to_string())
    }

    pub fn with_session_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            email: None,
            phone: None,
            tags: Vec::new(),
        }
    }

    /// Apply a patch in place. Returns whether anything changed.
    pub fn apply(&mut self, patch: &SessionPatch) -> bool {
        let mut changed = false;

        if let Some(email) = &patch.email {
            if self.email.as_ref() != Some(email) {
                self.email = Some(email.clone());
                changed = true;
            }
        }
        if let Some(phone) = &patch.phone {
            if self.phone.as_ref() != Some(phone) {
                self.phone = Some(phone.clone());
                changed = true;
            }
        }
        if !patch.append_tags.is_empty() {
            self.tags.extend(patch.append_tags.iter().cloned());
            changed = true;
        }

        changed
    }

    /// The fingerprint hash, if one has been tagged.
    pub fn fingerprint(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix(FINGERPRINT_TAG_PREFIX))
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial update to the session record.
///
/// `email`/`phone` overwrite their field when set; `append_tags` are added
/// after whatever tags the record holds at merge time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub append_tags: Vec<String>,
}

impl SessionPatch {
    pub fn email(value: impl Into<String>) -> Self {
        Self {
            email: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn phone(value: impl Into<String>) -> Self {
        Self {
            phone: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            append_tags: vec![tag.into()],
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.append_tags.is_empty()
    }
}

/// When and how the aggregator submits.
#[derive(Debug, Clone, Copy)]
pub struct SubmitPolicy {
    /// Quiet period with no new versions before a submission.
    pub quiet_period: Duration,
    /// Send a still-pending version once when stopping.
    pub flush_on_stop: bool,
    /// Treat the initial record as a pending version.
    pub submit_initial: bool,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(500),
            flush_on_stop: true,
            submit_initial: false,
        }
    }
}

/// Holds the session record and serializes merges into it.
#[derive(Debug)]
pub struct SessionAggregator {
    sender: watch::Sender<SessionRecord>,
}

impl SessionAggregator {
    pub fn new(record: SessionRecord) -> Self {
        let (sender, _) = watch::channel(record);
        Self { sender }
    }

    /// Atomically apply `patch` to the current record.
    ///
    /// A new version is published only when the patch changed something, so
    /// no-op merges never trigger a submission. Returns whether it did.
    pub fn merge(&self, patch: &SessionPatch) -> bool {
        self.sender.send_if_modified(|record| record.apply(patch))
    }

    /// A copy of the current version.
    pub fn snapshot(&self) -> SessionRecord {
        self.sender.borrow().clone()
    }

    pub fn session_id(&self) -> String {
        self.sender.borrow().session_id.clone()
    }

    /// Follow future versions. The current version counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<SessionRecord> {
        self.sender.subscribe()
    }

    /// Spawn the debounced submitter.
    ///
    /// Runs until `cancel` fires; with [`SubmitPolicy::flush_on_stop`] a
    /// version still waiting out its quiet period is sent once on the way out.
    pub fn spawn_submitter<T: SessionTransport>(
        &self,
        transport: Arc<T>,
        policy: SubmitPolicy,
        log: SharedTransparencyLog,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let receiver = self.subscribe();
        tokio::spawn(run_submitter(receiver, transport, policy, log, cancel))
    }
}

async fn run_submitter<T: SessionTransport>(
    mut receiver: watch::Receiver<SessionRecord>,
    transport: Arc<T>,
    policy: SubmitPolicy,
    log: SharedTransparencyLog,
    cancel: CancellationToken,
) {
    // Sends run on their own tasks so a slow endpoint never delays the next
    // quiet period.
    let mut in_flight = JoinSet::new();

    if policy.submit_initial {
        receiver.mark_changed();
    }

    loop {
        // Idle until a new version is published.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if policy.flush_on_stop && receiver.has_changed().unwrap_or(false) {
                    let record = receiver.borrow_and_update().clone();
                    in_flight.spawn(submit_record(
                        Arc::clone(&transport),
                        record,
                        Arc::clone(&log),
                    ));
                }
                break;
            }
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => continue,
        }

        // Every newer version restarts the quiet period.
        let stopping = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                changed = tokio::time::timeout(policy.quiet_period, receiver.changed()) => {
                    match changed {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => break true,
                        Err(_) => break false,
                    }
                }
            }
        };

        if stopping && !policy.flush_on_stop {
            break;
        }

        let record = receiver.borrow_and_update().clone();
        in_flight.spawn(submit_record(
            Arc::clone(&transport),
            record,
            Arc::clone(&log),
        ));

        if stopping {
            break;
        }
    }

    // Let sends already started finish before the submitter reports done.
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            tracing::warn!("submission task ended abnormally: {e}");
        }
    }
}

/// One fire-and-forget submission. Failures are logged and counted only.
async fn submit_record<T: SessionTransport>(
    transport: Arc<T>,
    record: SessionRecord,
    log: SharedTransparencyLog,
) {
    let session_id = record.session_id.clone();
    match transport.submit(record).await {
        Ok(receipt) => {
            log.record_submission_sent();
            tracing::info!(%session_id, status = receipt.status, "session submitted");
        }
        Err(e) => {
            log.record_submission_failed();
            tracing::warn!(%session_id, "session submission failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use crate::transport::{SubmitReceipt, TransportError};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Records every submission with the (virtual) time it happened.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Instant, SessionRecord)>>,
        fail: bool,
        /// How long each send takes to complete.
        latency: Duration,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(Instant, SessionRecord)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl SessionTransport for RecordingTransport {
        async fn submit(&self, record: SessionRecord) -> Result<SubmitReceipt, TransportError> {
            self.sent.lock().unwrap().push((Instant::now(), record));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail {
                return Err(TransportError::Server {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(SubmitReceipt::ok(200))
        }
    }

    #[test]
    fn test_new_record_is_empty() {
        let record = SessionRecord::new();
        assert!(!record.session_id.is_empty());
        assert!(record.email.is_none());
        assert!(record.phone.is_none());
        assert!(record.tags.is_empty());
        assert_ne!(record.session_id, SessionRecord::new().session_id);
    }

    #[test]
    fn test_merge_is_last_write_wins_per_field() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));

        aggregator.merge(&SessionPatch::email("a"));
        aggregator.merge(&SessionPatch::phone("b"));
        aggregator.merge(&SessionPatch::email("c"));

        let record = aggregator.snapshot();
        assert_eq!(record.session_id, "s-1");
        assert_eq!(record.email.as_deref(), Some("c"));
        assert_eq!(record.phone.as_deref(), Some("b"));
    }

    #[test]
    fn test_tags_are_appended() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        aggregator.merge(&SessionPatch::tag("campaign:spring"));
        aggregator.merge(&SessionPatch::email("a@b.co"));
        aggregator.merge(&SessionPatch::tag("fingerprint:abc"));

        let record = aggregator.snapshot();
        assert_eq!(record.tags, vec!["campaign:spring", "fingerprint:abc"]);
        assert_eq!(record.fingerprint(), Some("abc"));
    }

    #[test]
    fn test_noop_merge_publishes_nothing() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        assert!(aggregator.merge(&SessionPatch::email("a@b.co")));

        let receiver = aggregator.subscribe();
        assert!(!aggregator.merge(&SessionPatch::email("a@b.co")));
        assert!(!aggregator.merge(&SessionPatch::default()));
        assert!(!receiver.has_changed().unwrap());

        assert!(aggregator.merge(&SessionPatch::phone("11987654321")));
        assert!(receiver.has_changed().unwrap());
    }

    #[test]
    fn test_wire_shape() {
        let mut record = SessionRecord::with_session_id("s-1");
        record.apply(&SessionPatch::email("user@example.com"));
        record.apply(&SessionPatch::tag("fingerprint:9f8a"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sessionId": "s-1",
                "email": "user@example.com",
                "phone": null,
                "tags": ["fingerprint:9f8a"]
            })
        );
    }

    #[tokio::test]
    async fn test_concurrent_merges_lose_nothing() {
        let aggregator = Arc::new(SessionAggregator::new(SessionRecord::with_session_id("s")));

        let mut handles = Vec::new();
        for i in 0..50 {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                aggregator.merge(&SessionPatch::tag(format!("t{i}")));
            }));
        }
        let email = Arc::clone(&aggregator);
        handles.push(tokio::spawn(async move {
            email.merge(&SessionPatch::email("a@b.co"));
        }));
        for handle in handles {
            handle.await.unwrap();
        }

        let record = aggregator.snapshot();
        assert_eq!(record.tags.len(), 50);
        assert_eq!(record.email.as_deref(), Some("a@b.co"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_one_debounced_submission() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let log = create_shared_log();
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            Arc::clone(&log),
            cancel.clone(),
        );

        let start = Instant::now();
        for i in 0..5 {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            aggregator.merge(&SessionPatch::email(format!("user{i}@example.com")));
        }
        let last_merge = Instant::now();
        assert_eq!(last_merge - start, Duration::from_millis(400));

        tokio::time::sleep(Duration::from_millis(2_000)).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (at, record) = &sent[0];
        assert_eq!(record.email.as_deref(), Some("user4@example.com"));
        let delay = *at - last_merge;
        assert!(
            delay >= Duration::from_millis(500) && delay < Duration::from_millis(510),
            "submitted {delay:?} after the last merge"
        );
        assert_eq!(log.stats().submissions_sent, 1);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_submit_separately() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let _handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            create_shared_log(),
            cancel.clone(),
        );

        aggregator.merge(&SessionPatch::email("a@b.co"));
        tokio::time::sleep(Duration::from_millis(800)).await;
        aggregator.merge(&SessionPatch::phone("11987654321"));
        tokio::time::sleep(Duration::from_millis(800)).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.phone, None);
        assert_eq!(sent[1].1.email.as_deref(), Some("a@b.co"));
        assert_eq!(sent[1].1.phone.as_deref(), Some("11987654321"));
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_record_is_not_submitted() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            create_shared_log(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_version_flushed_on_stop() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            create_shared_log(),
            cancel.clone(),
        );

        aggregator.merge(&SessionPatch::email("a@b.co"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.email.as_deref(), Some("a@b.co"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_version_dropped_without_flush() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let policy = SubmitPolicy {
            flush_on_stop: false,
            ..SubmitPolicy::default()
        };
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            policy,
            create_shared_log(),
            cancel.clone(),
        );

        aggregator.merge(&SessionPatch::email("a@b.co"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_submission_is_not_retried() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let log = create_shared_log();
        let cancel = CancellationToken::new();
        let _handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            Arc::clone(&log),
            cancel.clone(),
        );

        aggregator.merge(&SessionPatch::email("a@b.co"));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(transport.sent().len(), 1);
        let stats = log.stats();
        assert_eq!(stats.submissions_failed, 1);
        assert_eq!(stats.submissions_sent, 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_does_not_delay_next_submission() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport {
            latency: Duration::from_secs(5),
            ..RecordingTransport::default()
        });
        let log = create_shared_log();
        let cancel = CancellationToken::new();
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            SubmitPolicy::default(),
            Arc::clone(&log),
            cancel.clone(),
        );

        let start = Instant::now();
        aggregator.merge(&SessionPatch::email("a@b.co"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        let second_merge = Instant::now();
        aggregator.merge(&SessionPatch::phone("11987654321"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The first send is still in flight, the second has already started.
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].0 - start < Duration::from_millis(510));
        let delay = sent[1].0 - second_merge;
        assert!(
            delay >= Duration::from_millis(500) && delay < Duration::from_millis(510),
            "second submission {delay:?} after its merge"
        );
        assert_eq!(sent[1].1.phone.as_deref(), Some("11987654321"));
        assert_eq!(log.stats().submissions_sent, 0);

        // Stopping waits for sends already started.
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(log.stats().submissions_sent, 2);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_record_submitted_when_enabled() {
        let aggregator = SessionAggregator::new(SessionRecord::with_session_id("s-1"));
        let transport = Arc::new(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let policy = SubmitPolicy {
            submit_initial: true,
            ..SubmitPolicy::default()
        };
        let start = Instant::now();
        let handle = aggregator.spawn_submitter(
            Arc::clone(&transport),
            policy,
            create_shared_log(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        handle.await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0 - start >= Duration::from_millis(500));
        assert_eq!(sent[0].1, SessionRecord::with_session_id("s-1"));
    }
}
