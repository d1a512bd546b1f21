//! Free-text schedule edits delegated to an external interpreter.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::external::{EngineError, ExternalEngine};
use crate::model::Transcript;
use crate::placeholder::is_placeholder;

pub const PROCESS_FAILURE_MESSAGE: &str = "Failed to process your request. Please try again.";
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to understand the response. Please try again.";
pub const FILLER_KEY: &str = "FILLER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Value>,
}

impl EditOutcome {
    fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            schedule: None,
        }
    }

    /// True when the interpreter could not be run or understood, as opposed
    /// to declining the edit.
    pub fn is_interpreter_failure(&self) -> bool {
        !self.success
            && (self.message == PROCESS_FAILURE_MESSAGE || self.message == PARSE_FAILURE_MESSAGE)
    }
}

#[derive(Debug, Deserialize)]
struct InterpreterReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    schedule: Option<Value>,
}

pub fn edit_request(instruction: &str, schedule: &Value, transcript: &Transcript) -> Value {
    json!({
        "schedule": schedule,
        "transcript": transcript,
        "preferences": { "allow_warnings": true },
        "operation": { "type": "interpret", "question": instruction },
    })
}

/// Ask the interpreter to apply `instruction` to `schedule`. Failures are
/// reported with a generic message; details only reach the log.
pub async fn interpret_schedule_edit(
    interpreter: &dyn ExternalEngine,
    instruction: &str,
    schedule: &Value,
    transcript: &Transcript,
) -> EditOutcome {
    let request = edit_request(instruction, schedule, transcript);
    let reply = match interpreter.invoke(&request).await {
        Ok(reply) => reply,
        Err(EngineError::InvalidJson(detail)) => {
            warn!(error = %detail, "Edit interpreter output could not be parsed");
            return EditOutcome::failure(PARSE_FAILURE_MESSAGE);
        }
        Err(err) => {
            warn!(error = %err, "Edit interpreter failed");
            return EditOutcome::failure(PROCESS_FAILURE_MESSAGE);
        }
    };

    let reply: InterpreterReply = match serde_json::from_value(reply) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(error = %err, "Edit interpreter reply has an unexpected shape");
            return EditOutcome::failure(PARSE_FAILURE_MESSAGE);
        }
    };

    let schedule = reply.schedule.and_then(clean_schedule);
    info!(
        success = reply.success,
        has_schedule = schedule.is_some(),
        "Schedule edit interpreted"
    );
    EditOutcome {
        success: reply.success,
        message: reply.message,
        schedule,
    }
}

/// Validate a returned timetable. Returns `None` when it is not a keyed
/// structure at all.
pub fn clean_schedule(schedule: Value) -> Option<Value> {
    let Value::Object(terms) = schedule else {
        warn!("Discarding edited schedule that is not an object");
        return None;
    };

    let mut cleaned = Map::with_capacity(terms.len());
    for (term, value) in terms {
        match value {
            Value::Array(entries) => {
                let kept: Vec<Value> = entries.into_iter().filter(is_present).collect();
                cleaned.insert(term, Value::Array(kept));
            }
            Value::Object(entries) => {
                cleaned.insert(term, Value::Object(clean_term(entries)));
            }
            other => {
                warn!(term = %term, found = %other, "Dropping malformed schedule term");
            }
        }
    }
    Some(Value::Object(cleaned))
}

fn clean_term(entries: Map<String, Value>) -> Map<String, Value> {
    entries
        .into_iter()
        .filter_map(|(course, session)| {
            if is_filler(&course) || is_placeholder(&course) {
                return Some((course, empty_session()));
            }
            match session {
                Value::Object(_) => Some((course, session)),
                _ => None,
            }
        })
        .collect()
}

/// `FILLER`, or a numbered variant such as `FILLER_2`.
fn is_filler(course: &str) -> bool {
    course == FILLER_KEY
        || course
            .strip_prefix(FILLER_KEY)
            .is_some_and(|rest| rest.starts_with('_'))
}

fn empty_session() -> Value {
    json!({ "lecture": null, "discussion": null })
}

fn is_present(entry: &Value) -> bool {
    match entry {
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}
