//! OpenAI-compatible client for the backend inference server
//!
//! The proxy forwards chat payloads largely untouched, so requests and
//! responses are handled as loose JSON trees; the [`payload`] helpers give
//! typed access to the few fields the proxy actually inspects.

use crate::error::{KickstartError, Result};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

/// HTTP client for the backend's `/v1` API
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// Create a client for the given base URL (e.g. `http://localhost:4000/v1`).
    ///
    /// No global request timeout is set: streamed completions are
    /// long-lived by design.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /models` as returned by the backend
    pub async fn list_models(&self, bearer: Option<&str>) -> Result<Value> {
        let mut request = self.http.get(format!("{}/models", self.base_url));
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, token);
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Non-streaming `POST /chat/completions`
    pub async fn chat(&self, payload: &Value, bearer: Option<&str>) -> Result<Value> {
        debug!("forwarding chat completion to backend");
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, token);
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Streaming `POST /chat/completions`; returns the raw SSE byte
    /// stream. Dropping the stream cancels the upstream request.
    pub async fn chat_stream(
        &self,
        payload: &Value,
        bearer: Option<&str>,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        debug!("forwarding streaming chat completion to backend");
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(payload);
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, token);
        }
        let response = check_status(request.send().await?).await?;
        Ok(response.bytes_stream())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(KickstartError::Upstream(format!(
        "backend returned {status}: {body}"
    )))
}

/// Content of the first choice of a chat completion response
pub fn message_content(response: &Value) -> Option<&str> {
    response
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
}

/// Typed accessors over the loose chat-completion payload
pub mod payload {
    use serde_json::{json, Value};

    /// Model the client asked for, or the generic sentinel
    pub const GENERIC_MODEL: &str = "generic";

    /// Content of the last message, the chat handler's `user_text`
    pub fn last_message_content(payload: &Value) -> Option<&str> {
        payload
            .get("messages")?
            .as_array()?
            .last()?
            .get("content")?
            .as_str()
    }

    pub fn stream_requested(payload: &Value) -> bool {
        payload
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn model(payload: &Value) -> &str {
        payload
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_MODEL)
    }

    /// Prepend a user-role message to the payload's message list
    pub fn inject_leading_user_message(payload: &mut Value, content: String) {
        let message = json!({ "role": "user", "content": content });
        match payload.get_mut("messages").and_then(Value::as_array_mut) {
            Some(messages) => messages.insert(0, message),
            None => {
                if let Some(object) = payload.as_object_mut() {
                    object.insert("messages".to_string(), json!([message]));
                }
            }
        }
    }
}
