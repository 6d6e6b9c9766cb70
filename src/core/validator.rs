//! Value validation for classified fields.
//!
//! Validation runs on every keystroke against the field's full value, so
//! partial input is rejected until it forms a complete email or phone.

use crate::core::session::SessionPatch;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Local part (dot atoms or a quoted string) `@` bracketed IPv4 or dotted
/// hostname ending in a 2+ letter label.
const EMAIL_PATTERN: &str = r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#;

/// Optional `+`, optional parenthesized 1-4 digit prefix, then digits and
/// separators.
const PHONE_PATTERN: &str = r"^[+]*[(]{0,1}[0-9]{1,4}[)]{0,1}[-\s./0-9]*$";

/// Phone values must be longer than this many characters.
pub const PHONE_MIN_EXCLUSIVE_LEN: usize = 7;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(PHONE_PATTERN).expect("phone pattern is valid"))
}

/// Whether `value` is a complete, well-formed email address.
pub fn is_valid_email(value: &str) -> bool {
    email_regex().is_match(value)
}

/// Whether `value` looks like a complete phone number.
pub fn is_valid_phone(value: &str) -> bool {
    value.chars().count() > PHONE_MIN_EXCLUSIVE_LEN && phone_regex().is_match(value)
}

/// The kind of value a watcher extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Email,
    Phone,
}

impl FieldKind {
    pub fn validate(&self, value: &str) -> bool {
        match self {
            FieldKind::Email => is_valid_email(value),
            FieldKind::Phone => is_valid_phone(value),
        }
    }

    /// A patch that sets this field to `value`.
    pub fn patch(&self, value: String) -> SessionPatch {
        match self {
            FieldKind::Email => SessionPatch::email(value),
            FieldKind::Phone => SessionPatch::phone(value),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Email => write!(f, "email"),
            FieldKind::Phone => write!(f, "phone"),
        }
    }
}

/// Suppresses forwarding a value identical to the last forwarded one.
#[derive(Debug, Clone, Default)]
pub struct DedupGate {
    last: Option<String>,
}

impl DedupGate {
    /// Returns `true` (and remembers `value`) if it differs from the last
    /// forwarded value.
    pub fn admit(&mut self, value: &str) -> bool {
        if self.last.as_deref() == Some(value) {
            return false;
        }
        self.last = Some(value.to_string());
        true
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// What a watcher decided about one keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Valid and new: merge this patch.
    Accepted(SessionPatch),
    /// Valid but identical to the last forwarded value.
    Duplicate,
    /// Not (yet) a well-formed value.
    Rejected,
}

/// Per-element keystroke watcher for one field kind.
#[derive(Debug, Clone)]
pub struct FieldWatcher {
    kind: FieldKind,
    gate: DedupGate,
}

impl FieldWatcher {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            gate: DedupGate::default(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Validate the field's current value and gate duplicates.
    pub fn observe(&mut self, value: &str) -> Observation {
        if !self.kind.validate(value) {
            return Observation::Rejected;
        }
        if !self.gate.admit(value) {
            return Observation::Duplicate;
        }
        Observation::Accepted(self.kind.patch(value.to_string()))
    }
}
