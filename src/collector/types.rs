//! Page event types consumed by the tracker.
//!
//! These model the small slice of the DOM the pipeline looks at: which
//! element is active after a click, and the value of an element after a
//! keystroke. Nothing about layout or rendering is represented.

use serde::{Deserialize, Serialize};

/// Opaque identity of a page element, stable for the lifetime of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(pub u64);

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The identifying attributes of the element that currently has focus.
///
/// Any attribute may be absent. Empty strings are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    pub handle: ElementHandle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

impl ElementSnapshot {
    /// An element with no identifying attributes.
    pub fn new(handle: u64) -> Self {
        Self {
            handle: ElementHandle(handle),
            name: None,
            id: None,
            input_type: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn input_type(&self) -> Option<&str> {
        non_empty(&self.input_type)
    }

    /// Whether the element exposes at least one attribute to classify on.
    pub fn is_identifiable(&self) -> bool {
        self.name().is_some() || self.id().is_some() || self.input_type().is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A raw interaction observed on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEvent {
    /// A click anywhere in the document, with whatever element was active
    /// right after it (`None` when nothing holds focus).
    Click { active: Option<ElementSnapshot> },
    /// A key was released inside `element`; `value` is its full current text.
    KeyUp { element: ElementHandle, value: String },
}

impl PageEvent {
    pub fn click(active: Option<ElementSnapshot>) -> Self {
        PageEvent::Click { active }
    }

    pub fn key_up(element: ElementHandle, value: impl Into<String>) -> Self {
        PageEvent::KeyUp {
            element,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_attributes_are_absent() {
        let snapshot = ElementSnapshot::new(1).with_name("").with_id("");
        assert!(snapshot.name().is_none());
        assert!(!snapshot.is_identifiable());

        let snapshot = ElementSnapshot::new(2).with_type("text");
        assert!(snapshot.is_identifiable());
    }

    #[test]
    fn test_snapshot_uses_dom_attribute_names() {
        let snapshot = ElementSnapshot::new(7).with_id("email").with_type("email");
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["handle"], 7);
        assert_eq!(json["type"], "email");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_page_event_parsing() {
        let event: PageEvent =
            serde_json::from_str(r#"{"event":"key_up","element":3,"value":"abc"}"#).unwrap();
        assert_eq!(event, PageEvent::key_up(ElementHandle(3), "abc"));

        let event: PageEvent = serde_json::from_str(r#"{"event":"click","active":null}"#).unwrap();
        assert_eq!(event, PageEvent::click(None));
    }
}
