//! Core pipeline for the landing page tracker.
//!
//! This module contains:
//! - Field classification from element attributes
//! - Value validation and per-field watchers
//! - Time-boxed fingerprint acquisition
//! - The focus observer
//! - The session record, its aggregator and the debounced submitter

pub mod classifier;
pub mod fingerprint;
pub mod focus;
pub mod session;
pub mod validator;

// Re-export commonly used types
pub use classifier::{classify, Classification, FieldTag};
pub use fingerprint::{
    acquire, hash_components, FingerprintComponent, FingerprintError, FingerprintOutcome,
    FingerprintSource, HostFingerprintSource, StaticFingerprintSource,
};
pub use focus::{FocusObserver, FocusReceiver};
pub use session::{SessionAggregator, SessionPatch, SessionRecord, SubmitPolicy};
pub use validator::{is_valid_email, is_valid_phone, FieldKind, FieldWatcher, Observation};
