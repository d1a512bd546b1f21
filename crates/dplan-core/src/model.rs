use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

use crate::course_key::{CourseKey, parse_course};
use crate::placeholder::ElectivePlaceholder;

/// Completed coursework: course key to grade (`None` when ungraded).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Value>",
    into = "BTreeMap<String, Option<String>>"
)]
pub struct Transcript {
    entries: BTreeMap<CourseKey, Option<String>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CourseKey, grade: Option<String>) {
        self.entries.insert(key, grade);
    }

    pub fn contains(&self, key: &CourseKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn grade(&self, key: &CourseKey) -> Option<&str> {
        self.entries.get(key).and_then(|grade| grade.as_deref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CourseKey> {
        self.entries.keys()
    }
}

impl FromIterator<(CourseKey, Option<String>)> for Transcript {
    fn from_iter<T: IntoIterator<Item = (CourseKey, Option<String>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for Transcript {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut transcript = Transcript::new();
        for (mention, grade) in raw {
            let key = match parse_course(&mention) {
                Ok(key) => key,
                Err(err) => {
                    warn!(course = %mention, error = %err, "Dropping unreadable transcript entry");
                    continue;
                }
            };
            let grade = match grade {
                Value::Null => None,
                Value::String(text) if text.trim().is_empty() => None,
                Value::String(text) => Some(text.trim().to_string()),
                other => Some(other.to_string()),
            };
            transcript.insert(key, grade);
        }
        transcript
    }
}

impl From<Transcript> for BTreeMap<String, Option<String>> {
    fn from(transcript: Transcript) -> Self {
        transcript
            .entries
            .into_iter()
            .map(|(key, grade)| (key.to_string(), grade))
            .collect()
    }
}

/// One element of a [`ResolvedCourseSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseEntry {
    Course(CourseKey),
    Elective(ElectivePlaceholder),
}

impl CourseEntry {
    pub fn as_course(&self) -> Option<&CourseKey> {
        match self {
            CourseEntry::Course(key) => Some(key),
            CourseEntry::Elective(_) => None,
        }
    }

    pub fn as_elective(&self) -> Option<&ElectivePlaceholder> {
        match self {
            CourseEntry::Elective(placeholder) => Some(placeholder),
            CourseEntry::Course(_) => None,
        }
    }
}

impl fmt::Display for CourseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CourseEntry::Course(key) => key.fmt(f),
            CourseEntry::Elective(placeholder) => placeholder.fmt(f),
        }
    }
}

impl Serialize for CourseEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Deduplicated owed-course set. Iteration follows first insertion, but
/// equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedCourseSet {
    order: Vec<CourseEntry>,
    members: HashSet<CourseEntry>,
}

impl ResolvedCourseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the entry was already present.
    pub fn insert(&mut self, entry: CourseEntry) -> bool {
        if self.members.contains(&entry) {
            return false;
        }
        self.members.insert(entry.clone());
        self.order.push(entry);
        true
    }

    pub fn contains(&self, entry: &CourseEntry) -> bool {
        self.members.contains(entry)
    }

    pub fn contains_course(&self, key: &CourseKey) -> bool {
        self.members.contains(&CourseEntry::Course(key.clone()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CourseEntry> {
        self.order.iter()
    }

    pub fn courses(&self) -> impl Iterator<Item = &CourseKey> {
        self.order.iter().filter_map(CourseEntry::as_course)
    }

    pub fn electives(&self) -> impl Iterator<Item = &ElectivePlaceholder> {
        self.order.iter().filter_map(CourseEntry::as_elective)
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.order.iter().map(ToString::to_string).collect()
    }
}

impl PartialEq for ResolvedCourseSet {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl Eq for ResolvedCourseSet {}

impl Serialize for ResolvedCourseSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.order.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_key::encode;
    use serde_json::json;

    #[test]
    fn test_transcript_accepts_mentions_and_keys() {
        let transcript: Transcript = serde_json::from_value(json!({
            "COM SCI|31": "A",
            "MATH 31A": null,
            "PHYSICS 1A": "",
            "BOGUS": "B"
        }))
        .unwrap();

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.grade(&encode("COM SCI 31").unwrap()), Some("A"));
        assert!(transcript.contains(&encode("MATH 31A").unwrap()));
        assert_eq!(transcript.grade(&encode("PHYSICS 1A").unwrap()), None);
    }

    #[test]
    fn test_transcript_serializes_keys() {
        let transcript: Transcript = [(encode("COM SCI 31").unwrap(), Some("A".to_string()))]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_value(&transcript).unwrap(),
            json!({"COM SCI|31": "A"})
        );
    }

    #[test]
    fn test_set_deduplicates_and_ignores_order() {
        let a = CourseEntry::Course(encode("COM SCI 32").unwrap());
        let b = CourseEntry::Elective(ElectivePlaceholder::new("Math Elective", 1));

        let mut first = ResolvedCourseSet::new();
        assert!(first.insert(a.clone()));
        assert!(!first.insert(a.clone()));
        first.insert(b.clone());

        let mut second = ResolvedCourseSet::new();
        second.insert(b);
        second.insert(a);

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            json!(["COM SCI|32", "RESOLVE: Math Elective #1"])
        );
    }
}
