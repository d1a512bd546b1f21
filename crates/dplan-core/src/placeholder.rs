//! Deferred elective slots of the form `RESOLVE: <category label> #<ordinal>`.
//!
//! Placeholders are opaque outside this module and the merger: no stage
//! substitutes them with real courses.

use std::fmt;

use crate::course_key::normalize_whitespace;

pub const PLACEHOLDER_MARKER: &str = "RESOLVE:";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElectivePlaceholder {
    label: String,
    ordinal: u32,
}

/// A placeholder as written by the oracle, before ordinals are reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMention {
    pub label: String,
    pub ordinal: Option<u32>,
}

impl ElectivePlaceholder {
    pub fn new(label: &str, ordinal: u32) -> Self {
        Self {
            label: normalize_whitespace(label),
            ordinal: ordinal.max(1),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

impl fmt::Display for ElectivePlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} #{}", PLACEHOLDER_MARKER, self.label, self.ordinal)
    }
}

pub fn is_placeholder(raw: &str) -> bool {
    raw.contains(PLACEHOLDER_MARKER)
}

/// Split a marker-bearing string into its category label and ordinal.
///
/// Returns `None` when the marker is absent or the label is empty.
pub fn parse_mention(raw: &str) -> Option<PlaceholderMention> {
    let start = raw.find(PLACEHOLDER_MARKER)?;
    let rest = raw[start + PLACEHOLDER_MARKER.len()..].trim();

    let (label, ordinal) = match rest.rfind('#') {
        Some(idx) => match rest[idx + 1..].trim().parse::<u32>() {
            Ok(n) if n > 0 => (&rest[..idx], Some(n)),
            _ => (rest, None),
        },
        None => (rest, None),
    };

    let label = normalize_whitespace(label);
    if label.is_empty() {
        return None;
    }
    Some(PlaceholderMention { label, ordinal })
}

/// `count` distinct placeholders for one category, ordinals `1..=count`.
pub fn placeholders_for(label: &str, count: u32) -> Vec<ElectivePlaceholder> {
    (1..=count)
        .map(|ordinal| ElectivePlaceholder::new(label, ordinal))
        .collect()
}

/// Instruction fragment handed to the decision oracle.
pub fn prompt_rule() -> String {
    let example = placeholders_for("Computer Science Elective", 2)
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "For elective language that specifies a fixed count (e.g. \"Select six additional elective courses\"), \
do NOT pick or invent concrete courses. Emit exactly that many placeholder strings of the form \
\"{PLACEHOLDER_MARKER} <category label> #<n>\", using the category label as it appears in the requirement text \
and numbering n from 1 to the count. Example for two electives: [{example}]."
    )
}
