//! Bidirectional mapping between course mentions ("COM SCI 31") and canonical
//! `SUBJECT|NUMBER` keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const KEY_SEPARATOR: char = '|';

/// Canonical course identity. The subject may contain internal spaces
/// ("EC ENGR"); the catalog number never does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseKey {
    subject: String,
    number: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("course mention is empty")]
    Empty,
    #[error("course mention '{0}' has no subject before its catalog number")]
    MissingSubject(String),
    #[error("course key '{0}' is not of the form SUBJECT|NUMBER")]
    MalformedKey(String),
}

impl CourseKey {
    pub fn new(subject: &str, number: &str) -> Result<Self, CodecError> {
        let subject = normalize_whitespace(subject);
        let number = number.trim();
        if subject.is_empty() || number.is_empty() || number.contains(char::is_whitespace) {
            return Err(CodecError::MalformedKey(format!(
                "{subject}{KEY_SEPARATOR}{number}"
            )));
        }
        Ok(Self {
            subject,
            number: number.to_string(),
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn number(&self) -> &str {
        &self.number
    }
}

/// Encode a raw mention. The last whitespace-delimited token is the catalog
/// number and everything before it is the subject.
pub fn encode(raw: &str) -> Result<CourseKey, CodecError> {
    let mut tokens: Vec<&str> = raw.split_whitespace().collect();
    let number = tokens.pop().ok_or(CodecError::Empty)?;
    if tokens.is_empty() {
        return Err(CodecError::MissingSubject(raw.trim().to_string()));
    }
    Ok(CourseKey {
        subject: tokens.join(" "),
        number: number.to_string(),
    })
}

pub fn decode(key: &CourseKey) -> String {
    format!("{} {}", key.subject, key.number)
}

/// Accepts either a `SUBJECT|NUMBER` key or a raw mention.
pub fn parse_course(raw: &str) -> Result<CourseKey, CodecError> {
    if raw.contains(KEY_SEPARATOR) {
        raw.parse()
    } else {
        encode(raw)
    }
}

pub fn normalize_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.subject, KEY_SEPARATOR, self.number)
    }
}

impl FromStr for CourseKey {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (subject, number) = value
            .split_once(KEY_SEPARATOR)
            .ok_or_else(|| CodecError::MalformedKey(value.to_string()))?;
        CourseKey::new(subject, number).map_err(|_| CodecError::MalformedKey(value.to_string()))
    }
}

impl TryFrom<String> for CourseKey {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_course(&value)
    }
}

impl From<CourseKey> for String {
    fn from(key: CourseKey) -> Self {
        key.to_string()
    }
}
