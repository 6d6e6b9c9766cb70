//! Heuristic field classification from element attributes.
//!
//! Form inputs on a landing page carry no reliable metadata, so the
//! classifier looks for keywords in `name`/`id` and for the HTML5 input
//! `type`. The email and phone checks are independent: an element can be
//! both.

use crate::collector::types::ElementSnapshot;
use serde::{Deserialize, Serialize};

/// Substrings of `name`/`id` that mark an email input.
pub const EMAIL_KEYWORDS: &[&str] = &["email", "e-mail"];

/// Substrings of `name`/`id` that mark a phone input.
pub const PHONE_KEYWORDS: &[&str] = &["tel", "telefone", "phone", "cellphone", "phon"];

/// Capability of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTag {
    Email,
    Phone,
    Unknown,
}

impl std::fmt::Display for FieldTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldTag::Email => write!(f, "email"),
            FieldTag::Phone => write!(f, "phone"),
            FieldTag::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of classifying one element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub email: bool,
    pub phone: bool,
}

impl Classification {
    pub fn is_unknown(&self) -> bool {
        !self.email && !self.phone
    }

    /// The matching tags, or `[Unknown]` when nothing matched.
    pub fn tags(&self) -> Vec<FieldTag> {
        let mut tags = Vec::with_capacity(2);
        if self.email {
            tags.push(FieldTag::Email);
        }
        if self.phone {
            tags.push(FieldTag::Phone);
        }
        if tags.is_empty() {
            tags.push(FieldTag::Unknown);
        }
        tags
    }
}

/// Classify an element.
///
/// Returns `None` when the element has no `name`, `id` or `type` at all;
/// such elements are discarded before either check runs.
pub fn classify(snapshot: &ElementSnapshot) -> Option<Classification> {
    if !snapshot.is_identifiable() {
        return None;
    }

    Some(Classification {
        email: is_email_field(snapshot),
        phone: is_phone_field(snapshot),
    })
}

/// Email check: keyword in `name`/`id`, or `type="email"`.
pub fn is_email_field(snapshot: &ElementSnapshot) -> bool {
    matches_keywords(snapshot, EMAIL_KEYWORDS) || snapshot.input_type() == Some("email")
}

/// Phone check: keyword in `name`/`id`, or `type="tel"`.
pub fn is_phone_field(snapshot: &ElementSnapshot) -> bool {
    matches_keywords(snapshot, PHONE_KEYWORDS) || snapshot.input_type() == Some("tel")
}

fn matches_keywords(snapshot: &ElementSnapshot, keywords: &[&str]) -> bool {
    [snapshot.name(), snapshot.id()]
        .into_iter()
        .flatten()
        .any(|attr| keywords.iter().any(|keyword| attr.contains(keyword)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element() -> ElementSnapshot {
        ElementSnapshot::new(1)
    }

    #[test]
    fn test_email_by_name_id_or_type() {
        assert!(is_email_field(&element().with_name("user_email")));
        assert!(is_email_field(&element().with_id("e-mail-address")));
        assert!(is_email_field(&element().with_type("email")));
        assert!(!is_email_field(&element().with_name("mail")));
    }

    #[test]
    fn test_keyword_match_is_case_sensitive() {
        assert!(!is_email_field(&element().with_name("EMAIL")));
        assert!(!is_phone_field(&element().with_id("Phone")));
    }

    #[test]
    fn test_type_must_match_exactly() {
        assert!(!is_email_field(&element().with_type("Email")));
        assert!(!is_phone_field(&element().with_type("telephone")));
        assert!(is_phone_field(&element().with_type("tel")));
    }

    #[test]
    fn test_phone_keywords() {
        for name in ["tel", "telefone", "phone", "cellphone", "mobile_phon"] {
            assert!(is_phone_field(&element().with_name(name)), "{name}");
        }
        assert!(!is_phone_field(&element().with_name("nome")));
    }

    #[test]
    fn test_unidentifiable_element_is_discarded() {
        assert_eq!(classify(&element()), None);
        assert_eq!(classify(&element().with_name("").with_type("")), None);
    }

    #[test]
    fn test_unknown_field() {
        let classification = classify(&element().with_id("nome")).unwrap();
        assert!(classification.is_unknown());
        assert_eq!(classification.tags(), vec![FieldTag::Unknown]);
    }

    #[test]
    fn test_both_capabilities_on_one_element() {
        let classification = classify(&element().with_name("email-tel")).unwrap();
        assert!(classification.email);
        assert!(classification.phone);
        assert_eq!(classification.tags(), vec![FieldTag::Email, FieldTag::Phone]);
    }

    #[test]
    fn test_landing_page_form() {
        // id='email' type='email' / id='telefone' / id='nome'
        let email = classify(&element().with_id("email").with_type("email")).unwrap();
        assert_eq!(email.tags(), vec![FieldTag::Email]);

        let phone = classify(&element().with_id("telefone")).unwrap();
        assert_eq!(phone.tags(), vec![FieldTag::Phone]);
    }
}
