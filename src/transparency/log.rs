//! Transparency log for the tracker.
//!
//! Counts what the pipeline observed and sent so an operator can audit a
//! session without reading any captured values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collection statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of document clicks observed
    clicks_observed: AtomicU64,
    /// Focused elements dropped for lack of identifying attributes
    elements_unidentifiable: AtomicU64,
    /// Email watchers attached
    email_fields: AtomicU64,
    /// Phone watchers attached
    phone_fields: AtomicU64,
    /// Keystroke values merged into the session
    values_accepted: AtomicU64,
    /// Keystroke values that failed validation
    values_rejected: AtomicU64,
    /// Valid values suppressed as duplicates
    values_duplicate: AtomicU64,
    fingerprints_acquired: AtomicU64,
    fingerprint_timeouts: AtomicU64,
    fingerprint_failures: AtomicU64,
    submissions_sent: AtomicU64,
    submissions_failed: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            clicks_observed: AtomicU64::new(0),
            elements_unidentifiable: AtomicU64::new(0),
            email_fields: AtomicU64::new(0),
            phone_fields: AtomicU64::new(0),
            values_accepted: AtomicU64::new(0),
            values_rejected: AtomicU64::new(0),
            values_duplicate: AtomicU64::new(0),
            fingerprints_acquired: AtomicU64::new(0),
            fingerprint_timeouts: AtomicU64::new(0),
            fingerprint_failures: AtomicU64::new(0),
            submissions_sent: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_click(&self) {
        self.clicks_observed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unidentifiable_element(&self) {
        self.elements_unidentifiable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_email_field(&self) {
        self.email_fields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_phone_field(&self) {
        self.phone_fields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_accepted(&self) {
        self.values_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_rejected(&self) {
        self.values_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_duplicate(&self) {
        self.values_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fingerprint_acquired(&self) {
        self.fingerprints_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fingerprint_timeout(&self) {
        self.fingerprint_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fingerprint_failure(&self) {
        self.fingerprint_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_sent(&self) {
        self.submissions_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            clicks_observed: self.clicks_observed.load(Ordering::Relaxed),
            elements_unidentifiable: self.elements_unidentifiable.load(Ordering::Relaxed),
            email_fields: self.email_fields.load(Ordering::Relaxed),
            phone_fields: self.phone_fields.load(Ordering::Relaxed),
            values_accepted: self.values_accepted.load(Ordering::Relaxed),
            values_rejected: self.values_rejected.load(Ordering::Relaxed),
            values_duplicate: self.values_duplicate.load(Ordering::Relaxed),
            fingerprints_acquired: self.fingerprints_acquired.load(Ordering::Relaxed),
            fingerprint_timeouts: self.fingerprint_timeouts.load(Ordering::Relaxed),
            fingerprint_failures: self.fingerprint_failures.load(Ordering::Relaxed),
            submissions_sent: self.submissions_sent.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds() as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Clicks observed: {}\n\
             - Email fields instrumented: {}\n\
             - Phone fields instrumented: {}\n\
             - Values accepted: {}\n\
             - Values rejected: {}\n\
             - Duplicates suppressed: {}\n\
             - Fingerprint: {}\n\
             - Submissions sent: {} ({} failed)\n\
             - Session duration: {} seconds",
            stats.clicks_observed,
            stats.email_fields,
            stats.phone_fields,
            stats.values_accepted,
            stats.values_rejected,
            stats.values_duplicate,
            stats.fingerprint_status(),
            stats.submissions_sent,
            stats.submissions_failed,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                clicks_observed: stats.clicks_observed,
                values_accepted: stats.values_accepted,
                submissions_sent: stats.submissions_sent,
                submissions_failed: stats.submissions_failed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load cumulative stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.clicks_observed
                    .store(persisted.clicks_observed, Ordering::Relaxed);
                self.values_accepted
                    .store(persisted.values_accepted, Ordering::Relaxed);
                self.submissions_sent
                    .store(persisted.submissions_sent, Ordering::Relaxed);
                self.submissions_failed
                    .store(persisted.submissions_failed, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub clicks_observed: u64,
    pub elements_unidentifiable: u64,
    pub email_fields: u64,
    pub phone_fields: u64,
    pub values_accepted: u64,
    pub values_rejected: u64,
    pub values_duplicate: u64,
    pub fingerprints_acquired: u64,
    pub fingerprint_timeouts: u64,
    pub fingerprint_failures: u64,
    pub submissions_sent: u64,
    pub submissions_failed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    /// Human-readable fingerprint state.
    pub fn fingerprint_status(&self) -> &'static str {
        if self.fingerprints_acquired > 0 {
            "acquired"
        } else if self.fingerprint_timeouts > 0 {
            "timed out"
        } else if self.fingerprint_failures > 0 {
            "failed"
        } else {
            "pending"
        }
    }
}

/// Stats format for persistence (cumulative across runs).
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    clicks_observed: u64,
    values_accepted: u64,
    submissions_sent: u64,
    submissions_failed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
