//! Recognized entity spans.
//!
//! An [`Entity`] marks a span of an analyzed text with a category. Spans are
//! character offsets into the text the backend analyzed and are trusted
//! as-is; overlaps are not deduplicated here (see [`crate::highlight`]).
//!
//! The backend reports entities in one of two shapes: a flat `entities`
//! list, or `structured_entities` bucketed by category. [`reconcile`]
//! applies the precedence rule between them.

use serde::{Deserialize, Serialize};

/// Category of a recognized entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Listed company (ticker symbol or name).
    Company,
    /// Generic tradable asset.
    Asset,
    /// Cryptocurrency.
    Crypto,
    /// Currency pair.
    Forex,
    /// Anything else, including types this client does not know.
    #[default]
    #[serde(other)]
    Other,
}

impl EntityType {
    /// Wire name of the type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Company => "company",
            Self::Asset => "asset",
            Self::Crypto => "crypto",
            Self::Forex => "forex",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of recognized meaning within a text fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Category, controls display treatment.
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    /// Text as it appeared in the input.
    pub value: String,
    /// Canonical form (e.g. `"Apple Inc."` for `"apple"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_value: Option<String>,
    /// Ticker symbol, when the backend resolved one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    /// Start character offset (inclusive).
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// Recognition confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Entity {
    /// Build an entity with only the required fields set.
    #[must_use]
    pub fn new(entity_type: EntityType, value: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            entity_type,
            value: value.into(),
            normalized_value: None,
            ticker: None,
            start,
            end,
            confidence: None,
        }
    }

    /// Number of characters covered by the span (0 for inverted spans).
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical display label: the normalized value when it differs.
    #[must_use]
    pub fn display_value(&self) -> &str {
        match &self.normalized_value {
            Some(n) if n != &self.value => n,
            _ => &self.value,
        }
    }
}

/// Entities bucketed by category, as sent in `structured_entities`.
///
/// Buckets other than the four known ones are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredEntities {
    /// Generic assets.
    pub asset: Vec<Entity>,
    /// Companies.
    pub company: Vec<Entity>,
    /// Cryptocurrencies.
    pub crypto: Vec<Entity>,
    /// Currency pairs.
    pub forex: Vec<Entity>,
}

impl StructuredEntities {
    /// Flatten the buckets in fixed `asset, company, crypto, forex` order.
    #[must_use]
    pub fn flatten(self) -> Vec<Entity> {
        let mut out =
            Vec::with_capacity(self.asset.len() + self.company.len() + self.crypto.len() + self.forex.len());
        out.extend(self.asset);
        out.extend(self.company);
        out.extend(self.crypto);
        out.extend(self.forex);
        out
    }
}

/// Pick the live entity list from an analysis payload.
///
/// `structured_entities` wins whenever present, even if it flattens to an
/// empty list; the flat list is only a fallback.
#[must_use]
pub fn reconcile(structured: Option<StructuredEntities>, flat: Option<Vec<Entity>>) -> Vec<Entity> {
    match structured {
        Some(buckets) => buckets.flatten(),
        None => flat.unwrap_or_default(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
