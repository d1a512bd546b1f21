//! Decision oracle: picks among listed alternatives and emits elective
//! placeholders for a single requirement section.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm::{ChatClient, ChatError};
use crate::placeholder;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("decision oracle unavailable: {0}")]
    Unavailable(String),
}

/// One section/option unit of work. The whole section is sent, not just the
/// option being resolved.
#[derive(Debug, Clone)]
pub struct DecisionQuery {
    pub section_title: String,
    pub option_title: String,
    pub section_context: Value,
    pub transcript: Value,
}

impl DecisionQuery {
    pub fn user_prompt(&self) -> String {
        let section =
            serde_json::to_string_pretty(&self.section_context).unwrap_or_else(|_| "{}".into());
        let transcript =
            serde_json::to_string_pretty(&self.transcript).unwrap_or_else(|_| "{}".into());
        format!(
            "Here is the next section of the major requirements:\n```json\n{section}\n```\n\n\
And here are the courses the student has already completed:\n```json\n{transcript}\n```\n\n\
Resolve the option titled \"{option}\". Select the appropriate courses based on the student's \
completed courses and the logical progression of the major. Pay special attention to the number \
of courses required, especially for electives.",
            option = self.option_title,
        )
    }
}

#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Raw oracle answer; validation happens in the resolver.
    async fn decide(&self, query: &DecisionQuery) -> Result<String, OracleError>;
}

/// Instruction policy sent with every query.
pub fn system_prompt() -> String {
    format!(
        r#"You are helping build a structured list of courses a student still owes toward a major.
You receive one section of the major requirements in JSON and the student's completed courses.

Rules:
1. When a requirement lists alternatives (e.g. "Select one from:"), select exactly one of them. Prefer the
   alternative that is consistent with the student's completed coursework and the logical ordering of courses.
2. {placeholder_rule}
3. Ignore technical breadth requirements entirely. They are handled separately.
4. Do NOT include any course the student has already completed.
5. Include course identifiers only (subject followed by catalog number, e.g. "COM SCI 31"), exactly as they
   appear in the requirements.

Respond with a single JSON object and nothing else:
{{"courses": ["COM SCI 31", "COM SCI 32"]}}"#,
        placeholder_rule = placeholder::prompt_rule()
    )
}

/// Oracle backed by an OpenAI-compatible chat model.
#[derive(Debug, Clone)]
pub struct LlmDecisionOracle {
    client: ChatClient,
    system_prompt: String,
}

impl LlmDecisionOracle {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            system_prompt: system_prompt(),
        }
    }
}

#[async_trait]
impl DecisionOracle for LlmDecisionOracle {
    async fn decide(&self, query: &DecisionQuery) -> Result<String, OracleError> {
        let prompt = query.user_prompt();
        debug!(
            section = %query.section_title,
            option = %query.option_title,
            model = %self.client.model(),
            "Sending decision query"
        );
        let content = self.client.complete(&self.system_prompt, &prompt).await?;
        debug!(section = %query.section_title, response = %content, "Decision oracle answered");
        Ok(content)
    }
}

/// Oracle used when no chat endpoint credentials are available.
#[derive(Debug, Clone)]
pub struct UnavailableOracle {
    reason: String,
}

impl UnavailableOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl DecisionOracle for UnavailableOracle {
    async fn decide(&self, _query: &DecisionQuery) -> Result<String, OracleError> {
        Err(OracleError::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_carries_policy() {
        let prompt = system_prompt();
        assert!(prompt.contains("select exactly one"));
        assert!(prompt.contains("RESOLVE: Computer Science Elective #1"));
        assert!(prompt.contains("technical breadth"));
        assert!(prompt.contains("already completed"));
        assert!(prompt.contains(r#"{"courses": ["#));
    }

    #[test]
    fn test_user_prompt_embeds_section_and_transcript() {
        let query = DecisionQuery {
            section_title: "Core".into(),
            option_title: "Required".into(),
            section_context: json!({"title": "Core", "options": [{"title": "Required", "courses": ["COM SCI 31"]}]}),
            transcript: json!({"COM SCI|31": "A"}),
        };
        let prompt = query.user_prompt();
        assert!(prompt.contains("\"title\": \"Core\""));
        assert!(prompt.contains("COM SCI|31"));
        assert!(prompt.contains("option titled \"Required\""));
    }

    #[tokio::test]
    async fn test_unavailable_oracle_fails() {
        let oracle = UnavailableOracle::new("no API key");
        let query = DecisionQuery {
            section_title: String::new(),
            option_title: String::new(),
            section_context: Value::Null,
            transcript: Value::Null,
        };
        assert!(matches!(
            oracle.decide(&query).await,
            Err(OracleError::Unavailable(reason)) if reason == "no API key"
        ));
    }
}
