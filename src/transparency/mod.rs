//! Transparency module for the tracker.
//!
//! This module tracks what the pipeline observed and submitted, so a
//! session can be audited without exposing captured values.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
