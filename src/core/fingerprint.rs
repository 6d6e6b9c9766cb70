//! Time-boxed device fingerprint acquisition.
//!
//! A [`FingerprintSource`] yields an ordered list of device components. Their
//! values are concatenated in order and reduced to one 128-bit MurmurHash3
//! (x64 variant, fixed seed), rendered as 32 hex characters. Acquisition is
//! raced against a short bound; past it the session simply never gets a
//! fingerprint tag.

use crate::core::session::{SessionPatch, FINGERPRINT_TAG_PREFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Seed for the component hash.
pub const FINGERPRINT_SEED: u32 = 31;

/// Default bound on acquisition.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(50);

/// One named device component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintComponent {
    pub key: String,
    pub value: Value,
}

impl FingerprintComponent {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Fingerprint source errors.
#[derive(Debug)]
pub enum FingerprintError {
    Unavailable(String),
}

impl std::fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FingerprintError::Unavailable(msg) => write!(f, "Fingerprint unavailable: {msg}"),
        }
    }
}

impl std::error::Error for FingerprintError {}

/// Produces the raw device components.
pub trait FingerprintSource: Send + Sync + 'static {
    fn components(
        &self,
    ) -> impl Future<Output = Result<Vec<FingerprintComponent>, FingerprintError>> + Send;
}

/// How acquisition ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintOutcome {
    Acquired(String),
    TimedOut,
    Failed(String),
}

impl FingerprintOutcome {
    /// The session patch for this outcome, if any.
    pub fn patch(&self) -> Option<SessionPatch> {
        match self {
            FingerprintOutcome::Acquired(hash) => Some(SessionPatch::tag(fingerprint_tag(hash))),
            _ => None,
        }
    }
}

/// `fingerprint:<hash>`
pub fn fingerprint_tag(hash: &str) -> String {
    format!("{FINGERPRINT_TAG_PREFIX}{hash}")
}

/// Run `source` once, bounded by `bound`.
///
/// The source runs in its own task. If the bound expires first the task is
/// left to finish on its own and its result is ignored.
pub async fn acquire<S: FingerprintSource>(source: Arc<S>, bound: Duration) -> FingerprintOutcome {
    let task = tokio::spawn(async move { source.components().await });

    match tokio::time::timeout(bound, task).await {
        Ok(Ok(Ok(components))) => FingerprintOutcome::Acquired(hash_components(&components)),
        Ok(Ok(Err(e))) => FingerprintOutcome::Failed(e.to_string()),
        Ok(Err(e)) => FingerprintOutcome::Failed(e.to_string()),
        Err(_) => FingerprintOutcome::TimedOut,
    }
}

/// Hash component values (in order) into the 32-hex-char fingerprint.
pub fn hash_components(components: &[FingerprintComponent]) -> String {
    let joined: String = components
        .iter()
        .map(|component| component_string(&component.value))
        .collect();
    x64_hash128(joined.as_bytes(), FINGERPRINT_SEED)
}

/// Render a component value the way a JavaScript `Array.join` would.
pub fn component_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(component_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// MurmurHash3 x64 128-bit, formatted as `h1` then `h2` in hex.
pub fn x64_hash128(data: &[u8], seed: u32) -> String {
    let (h1, h2) = murmur3_x64_128(data, seed);
    format!("{h1:016x}{h2:016x}")
}

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

fn murmur3_x64_128(data: &[u8], seed: u32) -> (u64, u64) {
    let mut h1 = u64::from(seed);
    let mut h2 = u64::from(seed);

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let mut k1 = u64::from_le_bytes(block[..8].try_into().unwrap_or_default());
        let mut k2 = u64::from_le_bytes(block[8..].try_into().unwrap_or_default());

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1
            .rotate_left(27)
            .wrapping_add(h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        h2 ^= k2;
        h2 = h2
            .rotate_left(31)
            .wrapping_add(h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    let tail = blocks.remainder();
    if tail.len() > 8 {
        let mut k2 = 0u64;
        for (i, byte) in tail[8..].iter().enumerate() {
            k2 ^= u64::from(*byte) << (i * 8);
        }
        h2 ^= k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
    }
    if !tail.is_empty() {
        let mut k1 = 0u64;
        for (i, byte) in tail.iter().take(8).enumerate() {
            k1 ^= u64::from(*byte) << (i * 8);
        }
        h1 ^= k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
    }

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

// ============================================================================
// Sources
// ============================================================================

/// Components gathered from the host machine.
#[derive(Debug, Clone, Default)]
pub struct HostFingerprintSource;

impl FingerprintSource for HostFingerprintSource {
    async fn components(&self) -> Result<Vec<FingerprintComponent>, FingerprintError> {
        let hostname = hostname::get()
            .map(|h| Value::from(h.to_string_lossy().to_string()))
            .unwrap_or(Value::Null);
        let parallelism = std::thread::available_parallelism()
            .map(|n| Value::from(n.get()))
            .unwrap_or(Value::Null);
        // minutes behind UTC, like Date.getTimezoneOffset()
        let timezone_offset = -chrono::Local::now().offset().local_minus_utc() / 60;
        let language = std::env::var("LANG").map(Value::from).unwrap_or(Value::Null);

        Ok(vec![
            FingerprintComponent::new("hostname", hostname),
            FingerprintComponent::new("platform", std::env::consts::OS),
            FingerprintComponent::new("arch", std::env::consts::ARCH),
            FingerprintComponent::new("family", std::env::consts::FAMILY),
            FingerprintComponent::new("hardwareConcurrency", parallelism),
            FingerprintComponent::new("timezoneOffset", timezone_offset),
            FingerprintComponent::new("language", language),
        ])
    }
}

/// A fixed component list, optionally delivered after a delay.
#[derive(Debug, Clone, Default)]
pub struct StaticFingerprintSource {
    components: Vec<FingerprintComponent>,
    delay: Duration,
}

impl StaticFingerprintSource {
    pub fn new(components: Vec<FingerprintComponent>) -> Self {
        Self {
            components,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl FingerprintSource for StaticFingerprintSource {
    async fn components(&self) -> Result<Vec<FingerprintComponent>, FingerprintError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.components.clone())
    }
}
