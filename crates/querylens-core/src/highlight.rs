//! Entity highlighting.
//!
//! [`highlight_segments`] splits a text into plain and highlighted segments
//! whose concatenation is exactly the input. Entity offsets are character
//! (not byte) offsets.
//!
//! Overlaps resolve deterministically: entities are visited in ascending
//! `start` order (ties keep input order) and the earlier one wins. A later
//! entity is clipped to start at the end of the previous highlight, and
//! dropped if nothing is left. Out-of-bounds ends are clamped to the text
//! length and inverted spans are skipped.

use crate::entities::{Entity, EntityType};

/// Display treatment of a highlighted span.
///
/// Only the four-way partition is meaningful; colours are up to the
/// presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HighlightStyle {
    /// Companies and generic assets.
    Company,
    /// Cryptocurrencies.
    Crypto,
    /// Currency pairs.
    Forex,
    /// Everything else.
    Other,
}

impl From<EntityType> for HighlightStyle {
    fn from(t: EntityType) -> Self {
        match t {
            EntityType::Company | EntityType::Asset => Self::Company,
            EntityType::Crypto => Self::Crypto,
            EntityType::Forex => Self::Forex,
            EntityType::Other => Self::Other,
        }
    }
}

/// A contiguous slice of the rendered text.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment<'a> {
    /// The slice of the original text.
    pub text: &'a str,
    /// The entity this slice highlights, `None` for plain text.
    pub entity: Option<&'a Entity>,
}

impl Segment<'_> {
    /// Style of a highlighted segment.
    #[must_use]
    pub fn style(&self) -> Option<HighlightStyle> {
        self.entity.map(|e| e.entity_type.into())
    }

    /// Whether the segment is plain text.
    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.entity.is_none()
    }
}

/// Partition `text` into plain and highlighted segments.
///
/// Empty plain gaps are never emitted, so at most `2 * entities.len() + 1`
/// segments come back.
#[must_use]
pub fn highlight_segments<'a>(text: &'a str, entities: &'a [Entity]) -> Vec<Segment<'a>> {
    // Byte offset of every character boundary, including the end.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut ordered: Vec<&Entity> = entities.iter().collect();
    ordered.sort_by_key(|e| e.start);

    let mut segments = Vec::with_capacity(ordered.len() * 2 + 1);
    let mut cursor = 0;
    for entity in ordered {
        let start = entity.start.max(cursor).min(char_len);
        let end = entity.end.min(char_len);
        if end <= start {
            continue;
        }
        if start > cursor {
            segments.push(Segment {
                text: &text[bounds[cursor]..bounds[start]],
                entity: None,
            });
        }
        segments.push(Segment {
            text: &text[bounds[start]..bounds[end]],
            entity: Some(entity),
        });
        cursor = end;
    }
    if cursor < char_len {
        segments.push(Segment {
            text: &text[bounds[cursor]..],
            entity: None,
        });
    }
    segments
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
