//! Focus observer: which element is active after each click.
//!
//! The observer is a latest-value signal. Every click publishes the element
//! that is active at that moment (input or not, identifiable or not), and a
//! subscriber that attaches late still sees the most recent one.

use crate::collector::types::ElementSnapshot;
use tokio::sync::watch;

/// Receiver side of the focus signal. `None` means nothing is focused.
pub type FocusReceiver = watch::Receiver<Option<ElementSnapshot>>;

/// Publishes the currently focused element.
#[derive(Debug)]
pub struct FocusObserver {
    sender: watch::Sender<Option<ElementSnapshot>>,
}

impl FocusObserver {
    /// Starts in the none-focused state.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Record a document click and the element active right after it.
    ///
    /// Publishes even when the same element is clicked again.
    pub fn observe_click(&self, active: Option<ElementSnapshot>) {
        self.sender.send_replace(active);
    }

    /// Subscribe to focus changes.
    ///
    /// If something is already focused, the first `changed()` resolves
    /// immediately with it.
    pub fn subscribe(&self) -> FocusReceiver {
        let mut receiver = self.sender.subscribe();
        if receiver.borrow().is_some() {
            receiver.mark_changed();
        }
        receiver
    }
}

impl Default for FocusObserver {
    fn default() -> Self {
        Self::new()
    }
}
