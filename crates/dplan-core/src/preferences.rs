use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_EARLIEST: &str = "09:00";
pub const DEFAULT_LATEST: &str = "17:00";
pub const DEFAULT_MAX_COURSES_PER_TERM: u32 = 4;
pub const DEFAULT_LEAST_COURSES_PER_TERM: u32 = 3;
pub const MAX_COURSES_PER_TERM_LIMIT: u32 = 6;

/// Axes the timetable engine ranks candidate sessions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceKind {
    Time,
    Building,
    Days,
    Instructor,
}

impl PreferenceKind {
    pub const DEFAULT_ORDER: [PreferenceKind; 4] = [
        PreferenceKind::Time,
        PreferenceKind::Building,
        PreferenceKind::Days,
        PreferenceKind::Instructor,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "time" => Some(Self::Time),
            "building" => Some(Self::Building),
            "days" => Some(Self::Days),
            "instructor" => Some(Self::Instructor),
            _ => None,
        }
    }
}

impl fmt::Display for PreferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PreferenceKind::Time => "time",
            PreferenceKind::Building => "building",
            PreferenceKind::Days => "days",
            PreferenceKind::Instructor => "instructor",
        };
        f.write_str(label)
    }
}

/// Scheduling preferences with every default applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PreferencesInput")]
pub struct Preferences {
    pub allow_warnings: bool,
    pub allow_primary_conflicts: bool,
    pub allow_secondary_conflicts: bool,
    pub pref_priority: Vec<PreferenceKind>,
    pub pref_earliest: String,
    pub pref_latest: String,
    pub pref_no_days: BTreeSet<String>,
    pub pref_buildings: Vec<String>,
    pub pref_instructors: Vec<String>,
    pub max_courses_per_term: u32,
    pub least_courses_per_term: u32,
    pub tech_breadth: Option<String>,
    pub second_tech_breadth: Option<String>,
}

/// Wire shape of [`Preferences`]: every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesInput {
    #[serde(default)]
    pub allow_warnings: Option<bool>,
    #[serde(default)]
    pub allow_primary_conflicts: Option<bool>,
    #[serde(default)]
    pub allow_secondary_conflicts: Option<bool>,
    #[serde(default)]
    pub pref_priority: Option<Vec<String>>,
    #[serde(default)]
    pub pref_earliest: Option<String>,
    #[serde(default)]
    pub pref_latest: Option<String>,
    #[serde(default)]
    pub pref_no_days: Option<Vec<String>>,
    #[serde(default)]
    pub pref_buildings: Option<Vec<String>>,
    #[serde(default)]
    pub pref_instructors: Option<Vec<String>>,
    #[serde(default)]
    pub max_courses_per_term: Option<u32>,
    #[serde(default)]
    pub least_courses_per_term: Option<u32>,
    #[serde(default)]
    pub tech_breadth: Option<String>,
    #[serde(default)]
    pub second_tech_breadth: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        PreferencesInput::default().into()
    }
}

impl From<PreferencesInput> for Preferences {
    fn from(input: PreferencesInput) -> Self {
        Self {
            allow_warnings: input.allow_warnings.unwrap_or(true),
            allow_primary_conflicts: input.allow_primary_conflicts.unwrap_or(true),
            allow_secondary_conflicts: input.allow_secondary_conflicts.unwrap_or(true),
            pref_priority: normalize_priority(input.pref_priority.as_deref().unwrap_or(&[])),
            pref_earliest: non_blank(input.pref_earliest)
                .unwrap_or_else(|| DEFAULT_EARLIEST.to_string()),
            pref_latest: non_blank(input.pref_latest).unwrap_or_else(|| DEFAULT_LATEST.to_string()),
            pref_no_days: input
                .pref_no_days
                .unwrap_or_default()
                .into_iter()
                .filter_map(|day| non_blank(Some(day)))
                .collect(),
            pref_buildings: clean_list(input.pref_buildings),
            pref_instructors: clean_list(input.pref_instructors),
            max_courses_per_term: input
                .max_courses_per_term
                .unwrap_or(DEFAULT_MAX_COURSES_PER_TERM),
            least_courses_per_term: input
                .least_courses_per_term
                .unwrap_or(DEFAULT_LEAST_COURSES_PER_TERM),
            tech_breadth: non_blank(input.tech_breadth),
            second_tech_breadth: non_blank(input.second_tech_breadth),
        }
    }
}

impl Preferences {
    /// Reject contradictory or out-of-range values.
    pub fn validate(&self) -> Result<(), String> {
        if self.least_courses_per_term < 1 {
            return Err("least_courses_per_term must be at least 1".to_string());
        }
        if self.max_courses_per_term > MAX_COURSES_PER_TERM_LIMIT {
            return Err(format!(
                "max_courses_per_term must be at most {MAX_COURSES_PER_TERM_LIMIT}"
            ));
        }
        if self.max_courses_per_term <= self.least_courses_per_term {
            return Err(format!(
                "max_courses_per_term ({}) must be greater than least_courses_per_term ({})",
                self.max_courses_per_term, self.least_courses_per_term
            ));
        }

        let earliest = parse_time(&self.pref_earliest, "pref_earliest")?;
        let latest = parse_time(&self.pref_latest, "pref_latest")?;
        if earliest >= latest {
            return Err(format!(
                "pref_earliest ({}) must be before pref_latest ({})",
                self.pref_earliest, self.pref_latest
            ));
        }
        Ok(())
    }

    /// Declared breadth areas in order: primary, then secondary.
    pub fn breadth_areas(&self) -> Vec<&str> {
        let mut areas: Vec<&str> = Vec::with_capacity(2);
        for area in [&self.tech_breadth, &self.second_tech_breadth]
            .into_iter()
            .flatten()
        {
            if !areas.contains(&area.as_str()) {
                areas.push(area.as_str());
            }
        }
        areas
    }
}

fn parse_time(value: &str, field: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| format!("{field} '{value}' is not a HH:MM time"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn clean_list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| non_blank(Some(value)))
        .collect()
}

/// Unknown and repeated kinds are dropped; missing kinds are appended in
/// default order.
fn normalize_priority(raw: &[String]) -> Vec<PreferenceKind> {
    let mut order = Vec::with_capacity(PreferenceKind::DEFAULT_ORDER.len());
    for entry in raw {
        match PreferenceKind::parse(entry) {
            Some(kind) if !order.contains(&kind) => order.push(kind),
            Some(_) => {}
            None => warn!(priority = %entry, "Ignoring unknown preference priority"),
        }
    }
    for kind in PreferenceKind::DEFAULT_ORDER {
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_defaults_for_empty_object() {
        let prefs: Preferences = serde_json::from_value(json!({})).unwrap();
        assert!(prefs.allow_warnings);
        assert!(prefs.allow_primary_conflicts);
        assert!(prefs.allow_secondary_conflicts);
        assert_eq!(prefs.pref_priority, PreferenceKind::DEFAULT_ORDER.to_vec());
        assert_eq!(prefs.pref_earliest, "09:00");
        assert_eq!(prefs.pref_latest, "17:00");
        assert!(prefs.pref_no_days.is_empty());
        assert_eq!(prefs.max_courses_per_term, 4);
        assert_eq!(prefs.least_courses_per_term, 3);
        assert_eq!(prefs.tech_breadth, None);
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn test_priority_is_completed() {
        let prefs: Preferences = serde_json::from_value(json!({
            "pref_priority": ["days", "DAYS", "teleport", "time"]
        }))
        .unwrap();
        assert_eq!(
            prefs.pref_priority,
            vec![
                PreferenceKind::Days,
                PreferenceKind::Time,
                PreferenceKind::Building,
                PreferenceKind::Instructor
            ]
        );
    }

    #[test]
    fn test_blank_breadth_is_absent() {
        let prefs: Preferences = serde_json::from_value(json!({
            "tech_breadth": "  ",
            "second_tech_breadth": "Bioengineering"
        }))
        .unwrap();
        assert_eq!(prefs.tech_breadth, None);
        assert_eq!(prefs.breadth_areas(), vec!["Bioengineering"]);
    }

    #[test]
    fn test_duplicate_breadth_areas_collapse() {
        let prefs: Preferences = serde_json::from_value(json!({
            "tech_breadth": "Computer Science",
            "second_tech_breadth": "Computer Science"
        }))
        .unwrap();
        assert_eq!(prefs.breadth_areas(), vec!["Computer Science"]);
    }

    #[test]
    fn test_course_load_validation() {
        let mut prefs = Preferences::default();
        prefs.max_courses_per_term = 3;
        assert!(prefs.validate().unwrap_err().contains("greater than"));

        prefs.max_courses_per_term = 7;
        assert!(prefs.validate().unwrap_err().contains("at most 6"));

        prefs.max_courses_per_term = 4;
        prefs.least_courses_per_term = 0;
        assert!(prefs.validate().unwrap_err().contains("at least 1"));
    }

    #[test]
    fn test_time_window_validation() {
        let mut prefs = Preferences::default();
        prefs.pref_earliest = "18:00".to_string();
        assert!(prefs.validate().unwrap_err().contains("before"));

        prefs.pref_earliest = "morning".to_string();
        assert!(prefs.validate().unwrap_err().contains("HH:MM"));
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let value = serde_json::to_value(Preferences::default()).unwrap();
        assert_eq!(
            value["pref_priority"],
            json!(["time", "building", "days", "instructor"])
        );
        assert_eq!(value["pref_no_days"], json!([]));
        assert_eq!(value["tech_breadth"], Value::Null);
    }
}
