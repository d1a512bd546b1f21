//! Fan-out of decision queries and validation of what comes back.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use futures_util::future::join_all;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::course_key::{CourseKey, parse_course};
use crate::model::Transcript;
use crate::oracle::{DecisionOracle, DecisionQuery};
use crate::placeholder::{PlaceholderMention, is_placeholder, parse_mention};
use crate::requirements::Section;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("decision response is empty")]
    Empty,
    #[error("decision response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("decision response has no \"courses\" field")]
    MissingCourses,
    #[error("decision response \"courses\" field is not an array")]
    NotAnArray,
}

/// One query to dispatch. `source` identifies the section it came from;
/// options of the same section share it.
#[derive(Debug, Clone)]
pub struct ResolutionUnit {
    pub source: usize,
    pub option_index: usize,
    pub query: DecisionQuery,
}

/// Validated answer for one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedBatch {
    pub source: usize,
    pub option_index: usize,
    pub courses: Vec<CourseKey>,
    pub placeholders: Vec<PlaceholderMention>,
}

#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub batches: Vec<ResolvedBatch>,
    pub dispatched: usize,
    pub failed: usize,
}

/// One unit per (section, option) pair where the option lists courses.
pub fn plan_queries(sections: &[Section], transcript: &Transcript) -> Vec<ResolutionUnit> {
    let transcript_json = serde_json::to_value(transcript).unwrap_or(Value::Null);
    let mut units = Vec::new();
    for (source, section) in sections.iter().enumerate() {
        if !section.has_usable_options() {
            debug!(section = %section.title, "Skipping section without options");
            continue;
        }
        for (option_index, option) in section.usable_options() {
            units.push(ResolutionUnit {
                source,
                option_index,
                query: DecisionQuery {
                    section_title: section.title.clone(),
                    option_title: option.title.clone(),
                    section_context: section.context().clone(),
                    transcript: transcript_json.clone(),
                },
            });
        }
    }
    units
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?[ \t]*```").unwrap())
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence_regex().captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => trimmed,
    }
}

/// Parse `{"courses": [...]}` and return the raw array items.
pub fn parse_oracle_response(raw: &str) -> Result<Vec<Value>, ResponseError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ResponseError::Empty);
    }
    let parsed: Value =
        serde_json::from_str(body).map_err(|err| ResponseError::InvalidJson(err.to_string()))?;
    match parsed.get("courses") {
        None | Some(Value::Null) => Err(ResponseError::MissingCourses),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(ResponseError::NotAnArray),
    }
}

/// Turn raw items into course keys and placeholder mentions. Completed courses
/// and unreadable tokens are dropped.
pub fn normalize_courses(
    source: usize,
    option_index: usize,
    items: &[Value],
    transcript: &Transcript,
) -> ResolvedBatch {
    let mut batch = ResolvedBatch {
        source,
        option_index,
        ..ResolvedBatch::default()
    };
    let mut next_local: HashMap<String, u32> = HashMap::new();

    for item in items {
        let Some(raw) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            warn!(item = %item, "Skipping non-string course entry");
            continue;
        };

        if is_placeholder(raw) {
            let Some(mut mention) = parse_mention(raw) else {
                warn!(token = raw, "Discarding placeholder without a category label");
                continue;
            };
            let counter = next_local.entry(mention.label.to_lowercase()).or_insert(0);
            let ordinal = mention.ordinal.unwrap_or(*counter + 1);
            *counter = (*counter).max(ordinal);
            mention.ordinal = Some(ordinal);
            batch.placeholders.push(mention);
            continue;
        }

        match parse_course(raw) {
            Ok(key) if transcript.contains(&key) => {
                debug!(course = %key, "Dropping already completed course");
            }
            Ok(key) => batch.courses.push(key),
            Err(err) => warn!(token = raw, error = %err, "Discarding invalid course token"),
        }
    }
    batch
}

/// Dispatch every unit concurrently and wait for all of them. Failures and
/// timeouts are logged and contribute nothing.
pub async fn resolve_all(
    oracle: &dyn DecisionOracle,
    units: &[ResolutionUnit],
    transcript: &Transcript,
    per_call: Duration,
) -> ResolutionReport {
    let calls = units.iter().map(|unit| async move {
        let answer = timeout(per_call, oracle.decide(&unit.query)).await;
        (unit, answer)
    });
    let answers = join_all(calls).await;

    let mut report = ResolutionReport {
        dispatched: units.len(),
        ..ResolutionReport::default()
    };
    for (unit, answer) in answers {
        let raw = match answer {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                warn!(section = %unit.query.section_title, option = %unit.query.option_title, error = %err, "Decision query failed");
                report.failed += 1;
                continue;
            }
            Err(_) => {
                warn!(section = %unit.query.section_title, option = %unit.query.option_title, timeout = ?per_call, "Decision query timed out");
                report.failed += 1;
                continue;
            }
        };

        match parse_oracle_response(&raw) {
            Ok(items) => report.batches.push(normalize_courses(
                unit.source,
                unit.option_index,
                &items,
                transcript,
            )),
            Err(err) => {
                warn!(
                    section = %unit.query.section_title,
                    option = %unit.query.option_title,
                    error = %err,
                    response = %crate::external::preview_text(&raw, 500),
                    "Discarding decision response"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        dispatched = report.dispatched,
        succeeded = report.batches.len(),
        failed = report.failed,
        "Decision queries joined"
    );
    report
}
