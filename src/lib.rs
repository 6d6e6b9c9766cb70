//! Landing Track - passive visitor capture for landing pages.
//!
//! This library watches a visitor's interaction with a landing page and
//! builds a single session record from it: an email address, a phone
//! number and a device fingerprint tag, submitted to a collection endpoint
//! while the visitor is still on the page.
//!
//! # What gets captured
//!
//! - **Email / phone**: only values typed into fields whose name, id or type
//!   marks them as such, and only once the value passes validation
//! - **Fingerprint**: a hash of device attributes, and only if it can be
//!   computed within a short time bound
//! - **Transparency**: every observation and submission is counted and
//!   auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Tracking Service                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Collector  │──▶│    Focus    │──▶│ Classifier  │        │
//! │  │(page events)│   │  Observer   │   │  + Watchers │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                                             │                │
//! │  ┌─────────────┐                     ┌──────▼──────┐        │
//! │  │ Fingerprint │────────────────────▶│   Session   │        │
//! │  │  (≤ 50ms)   │                     │ Aggregator  │        │
//! │  └─────────────┘                     └──────┬──────┘        │
//! │                                             ▼ (500ms quiet)  │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │Transparency │                     │  Transport  │        │
//! │  │    Log      │                     │ (gateway)   │        │
//! │  └─────────────┘                     └─────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use landing_track::{
//!     collector::{CollectorConfig, ElementSnapshot, PageCollector, PageEvent},
//!     config::TrackerConfig,
//!     core::HostFingerprintSource,
//!     transport::DryRunTransport,
//!     tracker::TrackingService,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut collector = PageCollector::new(CollectorConfig::default());
//! collector.start()?;
//! let events = collector.take_receiver()?;
//! let sender = collector.sender();
//!
//! let mut service = TrackingService::new(
//!     TrackerConfig::default(),
//!     DryRunTransport,
//!     HostFingerprintSource,
//! );
//! service.start(events)?;
//!
//! let field = ElementSnapshot::new(1).with_name("email");
//! let field_handle = field.handle;
//! sender.send(PageEvent::click(Some(field))).await;
//! sender.send(PageEvent::key_up(field_handle, "jane@example.com")).await;
//!
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod tracker;
pub mod transparency;
pub mod transport;

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{PageCollector, PageEvent, PageEventSender};
pub use config::{Config, TrackerConfig};
pub use core::{SessionAggregator, SessionPatch, SessionRecord};
pub use tracker::{TrackerError, TrackingService};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use transport::{DryRunTransport, SessionTransport, SubmitReceipt, TransportError};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{GatewayClient, GatewayConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to operators.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              LANDING TRACK - PRIVACY DECLARATION                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This tracker captures contact details typed into a landing      ║
║  page before the form is submitted.                              ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • Email addresses typed into fields marked as email           ║
║    • Phone numbers typed into fields marked as phone             ║
║    • A one-way hash of device attributes (fingerprint)           ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • Values that fail email or phone validation                  ║
║    • Contents of any other field (passwords, messages, etc.)     ║
║    • Mouse position, scrolling or timing data                    ║
║    • The raw device attributes behind the fingerprint            ║
║                                                                  ║
║  Each visit produces one session record, posted to the           ║
║  configured endpoint whenever it changes.                        ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    landing-track status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER CAPTURE"));
        assert!(PRIVACY_DECLARATION.contains("fingerprint"));
    }
}
