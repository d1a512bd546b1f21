//! Narrow JSON-in/JSON-out interface to out-of-process collaborators (timetable
//! engine, breadth recommender, edit interpreter).

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{EndpointConfig, EndpointKind};

const STDERR_PREVIEW_CHARS: usize = 2_000;
const STDOUT_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to exchange data with external process: {0}")]
    Io(#[from] io::Error),
    #[error("external call timed out after {0:?}")]
    Timeout(Duration),
    #[error("external process exited with status {0}")]
    Exit(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("external service answered with status {0}")]
    Status(u16),
    #[error("invalid JSON from external collaborator: {0}")]
    InvalidJson(String),
    #[error("external collaborator reported an error: {0}")]
    Remote(String),
    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ExternalEngine: Send + Sync {
    async fn invoke(&self, request: &Value) -> Result<Value, EngineError>;
}

/// Spawns a fresh process per call, writes the request to stdin and reads one
/// JSON document from stdout.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            env: BTreeMap::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

#[async_trait]
impl ExternalEngine for ProcessEngine {
    async fn invoke(&self, request: &Value) -> Result<Value, EngineError> {
        let payload = serde_json::to_vec(request)
            .map_err(|err| EngineError::InvalidJson(err.to_string()))?;

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        if !self.env.is_empty() {
            cmd.envs(&self.env);
        }
        cmd.kill_on_drop(true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        // Feed stdin while waiting so a child that never drains its input is
        // still bounded by the call timeout. Dropping the child on timeout
        // kills it.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.write_all(b"\n").await?;
                stdin.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };
        let (fed, output) = timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| EngineError::Timeout(self.timeout))?;
        let output = output?;
        match fed {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!(command = %self.command, "External process closed stdin early");
            }
            Err(err) => return Err(err.into()),
            Ok(()) => {}
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                command = %self.command,
                status = %output.status,
                stderr = %preview_text(&stderr, STDERR_PREVIEW_CHARS),
                "External process failed"
            );
            return Err(EngineError::Exit(output.status.to_string()));
        }

        debug!(
            command = %self.command,
            bytes = output.stdout.len(),
            "External process finished"
        );
        parse_payload(&stdout)
    }
}

/// POSTs the request as JSON and expects a JSON body back.
#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    url: String,
}

impl HttpEngine {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ExternalEngine for HttpEngine {
    async fn invoke(&self, request: &Value) -> Result<Value, EngineError> {
        let response = self.client.post(&self.url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "External service failed");
            return Err(EngineError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_payload(&body)
    }
}

/// Stand-in for a collaborator that has no endpoint configured.
#[derive(Debug, Clone)]
pub struct UnconfiguredEngine {
    name: String,
}

impl UnconfiguredEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl ExternalEngine for UnconfiguredEngine {
    async fn invoke(&self, _request: &Value) -> Result<Value, EngineError> {
        Err(EngineError::NotConfigured(self.name.clone()))
    }
}

/// Build the engine an endpoint section describes.
pub fn build_engine(
    name: &str,
    endpoint: &EndpointConfig,
    default_timeout: Duration,
) -> Result<Arc<dyn ExternalEngine>, EngineError> {
    let timeout = endpoint.timeout(default_timeout);
    match endpoint.kind {
        EndpointKind::Process => {
            let Some(command) = endpoint.command.as_deref().filter(|c| !c.trim().is_empty())
            else {
                return Ok(Arc::new(UnconfiguredEngine::new(name)));
            };
            let command = shellexpand::tilde(command).into_owned();
            let working_dir = endpoint
                .working_dir
                .as_deref()
                .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()));
            Ok(Arc::new(
                ProcessEngine::new(command, endpoint.args.clone(), timeout)
                    .with_env(endpoint.env.clone())
                    .with_working_dir(working_dir),
            ))
        }
        EndpointKind::Http => match endpoint.url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(Arc::new(HttpEngine::new(url, timeout)?)),
            None => Ok(Arc::new(UnconfiguredEngine::new(name))),
        },
    }
}

/// Parse collaborator output; a top-level `{"error": "..."}` is a failure.
pub fn parse_payload(raw: &str) -> Result<Value, EngineError> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|err| {
        EngineError::InvalidJson(format!(
            "{err}; output={}",
            preview_text(raw, STDOUT_PREVIEW_CHARS)
        ))
    })?;
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(EngineError::Remote(message.to_string()));
    }
    Ok(value)
}

/// Timetable engine output. Fields other than `schedule` and `note` are kept
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub schedule: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EngineResponse {
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        match value.get("schedule") {
            Some(schedule) if !schedule.is_null() => {}
            _ => {
                return Err(EngineError::InvalidResponse(
                    "timetable engine response has no schedule".to_string(),
                ));
            }
        }
        serde_json::from_value(value).map_err(|err| EngineError::InvalidResponse(err.to_string()))
    }
}

pub(crate) fn preview_text(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={char_count}]"));
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_payload_is_failure() {
        let err = parse_payload(r#"{"error": "no courses found"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Remote(msg) if msg == "no courses found"));
    }

    #[test]
    fn test_non_json_is_failure() {
        assert!(matches!(
            parse_payload("Traceback (most recent call last)"),
            Err(EngineError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_array_payload_passes() {
        assert_eq!(
            parse_payload("[\"COM SCI|111\"]\n").unwrap(),
            json!(["COM SCI|111"])
        );
    }

    #[test]
    fn test_engine_response_keeps_extra_fields() {
        let response = EngineResponse::from_value(json!({
            "schedule": {"Fall 2025": {"COM SCI 32": {"lecture": "Lec 1"}}},
            "note": "MATH 61 could not be placed",
            "stats": {"terms": 1}
        }))
        .unwrap();
        assert_eq!(response.note.as_deref(), Some("MATH 61 could not be placed"));
        assert_eq!(response.extra["stats"], json!({"terms": 1}));
    }

    #[test]
    fn test_engine_response_requires_schedule() {
        assert!(EngineResponse::from_value(json!({"note": "nothing"})).is_err());
        assert!(EngineResponse::from_value(json!({"schedule": null})).is_err());
    }

    #[test]
    fn test_preview_truncates() {
        let preview = preview_text("abcdef", 3);
        assert!(preview.starts_with("abc..."));
        assert!(preview.contains("total_chars=6"));
    }

    #[tokio::test]
    async fn test_unconfigured_engine_fails() {
        let engine = UnconfiguredEngine::new("timetable engine");
        let err = engine.invoke(&json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "timetable engine is not configured");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_round_trip() {
        let engine = ProcessEngine::new("cat", Vec::new(), Duration::from_secs(10));
        let reply = engine.invoke(&json!({"schedule": {}})).await.unwrap();
        assert_eq!(reply, json!({"schedule": {}}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_non_zero_exit() {
        let engine = ProcessEngine::new(
            "sh",
            vec!["-c".to_string(), "cat >/dev/null; echo boom >&2; exit 3".to_string()],
            Duration::from_secs(10),
        );
        let err = engine.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Exit(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_timeout() {
        let engine = ProcessEngine::new(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        let err = engine.invoke(&json!({})).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_engine_timeout_covers_undrained_stdin() {
        let engine = ProcessEngine::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
            Duration::from_millis(300),
        );
        let request = json!({ "blob": "x".repeat(1024 * 1024) });

        let started = std::time::Instant::now();
        let outcome = timeout(Duration::from_secs(5), engine.invoke(&request)).await;
        let err = outcome
            .expect("per-call timeout fires before the outer one")
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
