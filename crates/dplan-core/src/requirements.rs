//! Requirement documents: normalization of raw payloads into a flat list of
//! sections.
//!
//! Accepted shapes: a tree (array of sections), an array of trees (one per
//! major) and a singly-nested array wrapping a tree. Anything that is not an
//! array after unwrapping is rejected.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequirementError {
    #[error("invalid requirement format: expected an array of sections, found {0}")]
    InvalidFormat(&'static str),
}

/// Titled requirement group. `raw` keeps the document exactly as authored so
/// the oracle sees descriptions and any other fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub options: Option<Vec<RequirementOption>>,
    raw: Value,
}

/// One way of satisfying part of a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementOption {
    pub title: String,
    pub courses: Option<Vec<String>>,
}

impl Section {
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let title = string_field(value, "title");
        let options = object.get("options").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(RequirementOption::from_value)
                .collect::<Vec<_>>()
        });
        Some(Self {
            title,
            options,
            raw: value.clone(),
        })
    }

    /// The section as authored, used as oracle context.
    pub fn context(&self) -> &Value {
        &self.raw
    }

    pub fn has_usable_options(&self) -> bool {
        self.options.is_some()
    }

    /// Options that carry at least one course token, with their index.
    pub fn usable_options(&self) -> impl Iterator<Item = (usize, &RequirementOption)> {
        self.options
            .iter()
            .flatten()
            .enumerate()
            .filter(|(_, option)| option.has_usable_courses())
    }
}

impl Serialize for Section {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl RequirementOption {
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object()?;
        let courses = value.get("courses").and_then(Value::as_array).map(|tokens| {
            tokens
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });
        Some(Self {
            title: string_field(value, "title"),
            courses,
        })
    }

    pub fn has_usable_courses(&self) -> bool {
        self.courses
            .as_ref()
            .is_some_and(|courses| !courses.is_empty())
    }
}

fn string_field(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Flatten a raw requirement payload into sections, preserving document order.
///
/// When the first element is itself an array, every array element is taken as
/// one major's tree and the trees are concatenated.
pub fn normalize(payload: &Value) -> Result<Vec<Section>, RequirementError> {
    let top = payload
        .as_array()
        .ok_or(RequirementError::InvalidFormat(describe(payload)))?;

    let nested = top.first().is_some_and(Value::is_array);
    let items: Vec<&Value> = if nested {
        top.iter()
            .filter_map(|tree| match tree.as_array() {
                Some(sections) => Some(sections.iter()),
                None => {
                    warn!(found = describe(tree), "Skipping non-array requirement tree");
                    None
                }
            })
            .flatten()
            .collect()
    } else {
        top.iter().collect()
    };

    let sections: Vec<Section> = items
        .into_iter()
        .filter_map(|item| {
            let section = Section::from_value(item);
            if section.is_none() {
                warn!(found = describe(item), "Skipping requirement entry that is not a section");
            }
            section
        })
        .collect();

    debug!(
        sections = sections.len(),
        nested, "Normalized requirement payload"
    );
    Ok(sections)
}
