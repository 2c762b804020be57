//! Core domain model and canonical schema for the aidex directory ETL.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "aidex-core";

/// Canonical directory-listing record as persisted in the `agents` table.
///
/// `name` is the natural key; it must be unique within a batch and in
/// storage. `created_at` is written once at first insert and never
/// overwritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub description: String,
    pub homepage_url: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub trending: bool,
    pub created_at: Option<NaiveDate>,
    pub updated_at: Option<NaiveDate>,
}

/// Whether a canonical field must arrive in source data or can be defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPresence {
    Required,
    Defaulted,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub presence: FieldPresence,
}

/// The canonical column set, in storage order. Checked once after the
/// transform stage instead of ad-hoc per-stage column probing.
pub const CANONICAL_FIELDS: [FieldSpec; 8] = [
    FieldSpec { name: "name", presence: FieldPresence::Required },
    FieldSpec { name: "description", presence: FieldPresence::Defaulted },
    FieldSpec { name: "homepage_url", presence: FieldPresence::Defaulted },
    FieldSpec { name: "category", presence: FieldPresence::Defaulted },
    FieldSpec { name: "source", presence: FieldPresence::Defaulted },
    FieldSpec { name: "trending", presence: FieldPresence::Defaulted },
    FieldSpec { name: "created_at", presence: FieldPresence::Defaulted },
    FieldSpec { name: "updated_at", presence: FieldPresence::Defaulted },
];

pub fn canonical_column_names() -> Vec<String> {
    CANONICAL_FIELDS.iter().map(|f| f.name.to_string()).collect()
}

/// Normalize a raw tag list into the flat category label: tags carrying
/// `#` markup are dropped, the survivors are comma-joined, then the
/// asymmetric casing rule is applied.
pub fn normalize_category_tags(tags: &[String]) -> String {
    let joined = tags
        .iter()
        .filter(|tag| !tag.contains('#'))
        .cloned()
        .collect::<Vec<_>>()
        .join(",");
    apply_category_casing(&joined)
}

/// Normalize a single free-text category cell. Text containing `#` markup
/// is discarded outright; an empty result is valid, not an error.
pub fn normalize_category_text(text: &str) -> String {
    if text.contains('#') {
        String::new()
    } else {
        apply_category_casing(text)
    }
}

// Short values are treated as acronym-style codes, longer ones as
// prose-like labels.
fn apply_category_casing(value: &str) -> String {
    if value.len() < 4 {
        value.to_uppercase()
    } else {
        let lower = value.to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => lower,
        }
    }
}

/// Map a textual trending level onto a boolean. Only an explicit low/falsy
/// level comes out false; anything else a source bothered to write is
/// treated as trending.
pub fn coerce_trending_text(text: &str) -> bool {
    !matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "low" | "false" | "0" | ""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_categories_become_acronyms() {
        assert_eq!(normalize_category_text("ai"), "AI");
        assert_eq!(normalize_category_tags(&["#promo".into(), "ml".into()]), "ML");
    }

    #[test]
    fn long_categories_are_capitalized_labels() {
        assert_eq!(
            normalize_category_text("artificial-intelligence"),
            "Artificial-intelligence"
        );
        assert_eq!(
            normalize_category_tags(&["NLP Tools".into(), "chat".into()]),
            "Nlp tools,chat"
        );
    }

    #[test]
    fn hashtag_markup_is_filtered() {
        assert_eq!(normalize_category_text("#trending"), "");
        assert_eq!(normalize_category_tags(&["#a".into(), "#b".into()]), "");
    }

    #[test]
    fn trending_levels_coerce_to_bool() {
        assert!(!coerce_trending_text("Low"));
        assert!(!coerce_trending_text("false"));
        assert!(!coerce_trending_text("  "));
        assert!(coerce_trending_text("High"));
        assert!(coerce_trending_text("Medium"));
    }

    #[test]
    fn canonical_schema_requires_only_name() {
        let required: Vec<_> = CANONICAL_FIELDS
            .iter()
            .filter(|f| f.presence == FieldPresence::Required)
            .map(|f| f.name)
            .collect();
        assert_eq!(required, vec!["name"]);
        assert_eq!(canonical_column_names().len(), 8);
    }
}
