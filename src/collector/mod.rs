//! Page event collection for the tracker.
//!
//! This module defines the events the pipeline consumes (clicks with the
//! resulting active element, key-ups with the element's value) and the
//! channel that carries them from the host page to the tracking service.

pub mod page;
pub mod script;
pub mod types;

// Re-export commonly used types
pub use page::{CollectorConfig, CollectorError, PageCollector, PageEventReceiver, PageEventSender};
pub use script::{load_script, parse_script, PlaybackStats, ScriptError, ScriptPlayer, ScriptStep};
pub use types::{ElementHandle, ElementSnapshot, PageEvent};
