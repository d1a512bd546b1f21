use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PlanError;
use crate::model::{ResolvedCourseSet, Transcript};
use crate::preferences::Preferences;

/// Quarter assumed when the caller declares a graduation year only.
pub const DEFAULT_GRADUATION_QUARTER: Quarter = Quarter::Spring;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Quarter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Winter => "Winter",
            Quarter::Spring => "Spring",
            Quarter::Summer => "Summer",
            Quarter::Fall => "Fall",
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quarter {
    type Err = PlanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "winter" => Ok(Quarter::Winter),
            "spring" => Ok(Quarter::Spring),
            "summer" => Ok(Quarter::Summer),
            "fall" | "autumn" => Ok(Quarter::Fall),
            _ => Err(PlanError::InvalidQuarter(value.trim().to_string())),
        }
    }
}

/// Academic quarter for a 0-indexed calendar month.
pub fn start_quarter_for_month(month0: u32) -> Quarter {
    match month0 {
        0..=2 => Quarter::Winter,
        3..=5 => Quarter::Spring,
        6..=8 => Quarter::Summer,
        _ => Quarter::Fall,
    }
}

/// Input handed to the external timetable engine.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleRequest {
    pub start_year: i32,
    pub start_quarter: Quarter,
    pub end_year: i32,
    pub end_quarter: Quarter,
    pub courses_to_schedule: ResolvedCourseSet,
    pub transcript: Transcript,
    pub preferences: Preferences,
}

/// Declared graduation term, checked before any collaborator is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraduationTerm {
    pub year: i32,
    pub quarter: Quarter,
}

impl GraduationTerm {
    pub fn parse(year: Option<i32>, quarter: Option<&str>) -> Result<Self, PlanError> {
        let year = year.ok_or(PlanError::MissingGraduationYear)?;
        let quarter = match quarter.map(str::trim).filter(|q| !q.is_empty()) {
            Some(raw) => raw.parse()?,
            None => DEFAULT_GRADUATION_QUARTER,
        };
        Ok(Self { year, quarter })
    }
}

pub fn build_schedule_request(
    today: NaiveDate,
    graduation: GraduationTerm,
    courses: ResolvedCourseSet,
    transcript: Transcript,
    preferences: Preferences,
) -> ScheduleRequest {
    let start_quarter = start_quarter_for_month(today.month0());
    info!(
        start_year = today.year(),
        start_quarter = %start_quarter,
        end_year = graduation.year,
        end_quarter = %graduation.quarter,
        courses = courses.len(),
        "Built schedule request"
    );
    ScheduleRequest {
        start_year: today.year(),
        start_quarter,
        end_year: graduation.year,
        end_quarter: graduation.quarter,
        courses_to_schedule: courses,
        transcript,
        preferences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course_key::encode;
    use crate::model::CourseEntry;

    #[test]
    fn test_month_boundaries() {
        let expected = [
            (0, Quarter::Winter),
            (2, Quarter::Winter),
            (3, Quarter::Spring),
            (5, Quarter::Spring),
            (6, Quarter::Summer),
            (7, Quarter::Summer),
            (8, Quarter::Summer),
            (9, Quarter::Fall),
            (11, Quarter::Fall),
        ];
        for (month0, quarter) in expected {
            assert_eq!(start_quarter_for_month(month0), quarter, "month {month0}");
        }
    }

    #[test]
    fn test_quarter_parse_is_case_insensitive() {
        assert_eq!("fall".parse::<Quarter>().unwrap(), Quarter::Fall);
        assert_eq!(" WINTER ".parse::<Quarter>().unwrap(), Quarter::Winter);
        assert_eq!(
            "Monsoon".parse::<Quarter>(),
            Err(PlanError::InvalidQuarter("Monsoon".to_string()))
        );
    }

    #[test]
    fn test_graduation_term_requires_year() {
        assert_eq!(
            GraduationTerm::parse(None, Some("Fall")),
            Err(PlanError::MissingGraduationYear)
        );
        let term = GraduationTerm::parse(Some(2027), None).unwrap();
        assert_eq!(term.quarter, Quarter::Spring);
    }

    #[test]
    fn test_build_request_in_august() {
        let today = NaiveDate::from_ymd_opt(2025, 8, 14).unwrap();
        let mut courses = ResolvedCourseSet::new();
        courses.insert(CourseEntry::Course(encode("COM SCI 32").unwrap()));

        let request = build_schedule_request(
            today,
            GraduationTerm::parse(Some(2027), Some("Spring")).unwrap(),
            courses,
            Transcript::new(),
            Preferences::default(),
        );

        assert_eq!(request.start_year, 2025);
        assert_eq!(request.start_quarter, Quarter::Summer);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["start_quarter"], "Summer");
        assert_eq!(value["end_quarter"], "Spring");
        assert_eq!(value["courses_to_schedule"], serde_json::json!(["COM SCI|32"]));
        assert_eq!(value["preferences"]["max_courses_per_term"], 4);
    }
}
