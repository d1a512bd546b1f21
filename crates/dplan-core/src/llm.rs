use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug)]
pub struct ChatError {
    message: String,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat completion error: {}", self.message)
    }
}

impl StdError for ChatError {}

impl From<String> for ChatError {
    fn from(msg: String) -> Self {
        ChatError { message: msg }
    }
}

impl From<&str> for ChatError {
    fn from(msg: &str) -> Self {
        ChatError {
            message: msg.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError {
            message: format!("HTTP error: {}", err),
        }
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one system + user exchange and return the first choice's content.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, ChatError> {
        #[derive(Serialize)]
        struct CompletionRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
        }

        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct CompletionResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request_body = CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Content-Type", "application/json")
            .json(&request_body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ChatError::from(format!(
                "API error: {}",
                response.status()
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        debug!(model = %self.model, choices = completion.choices.len(), "Chat completion received");

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ChatError::from("no response content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let client = ChatClient::new(
            "https://api.openai.com/v1/",
            None,
            "gpt-4o",
            0.0,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://api.openai.com/v1");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_error_display() {
        let err = ChatError::from("no response content");
        assert_eq!(err.to_string(), "chat completion error: no response content");
    }
}
