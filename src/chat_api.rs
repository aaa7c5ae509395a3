use anyhow::Context;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ops::ControlFlow;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_HOST: &str = "http://127.0.0.1:8000";
pub const DEFAULT_ANSWER: &str = "Sorry, I could not find a relevant answer to your question.";

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub host: String,
    /// Wall-clock limit for `POST /chat`. The streaming path has none.
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agent: "SportsChatbot/1.0".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("endpoint not found (HTTP 404)")]
    NotFound,
    #[error("server error (HTTP 500)")]
    ServerError,
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("unreadable response payload: {0}")]
    Malformed(String),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("{0}")]
    Internal(String),
}

impl TransportError {
    fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::INTERNAL_SERVER_ERROR => Self::ServerError,
            other => Self::Status(other.as_u16()),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status)
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize, Debug, Default)]
struct ChatResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    sources: Option<Vec<Value>>,
}

#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatClient {
    pub fn new(config: ChatConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Unable to build the HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Sends one question to `POST /chat` and waits for the whole answer.
    pub async fn ask(&self, query: &str) -> Result<ChatAnswer, TransportError> {
        debug!(host = %self.config.host, "sending whole-response query");

        let resp = self
            .client
            .post(self.url("/chat"))
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .header(CONTENT_TYPE, "application/json")
            .json(&ChatRequest { query })
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, "chat endpoint returned an error status");
            return Err(TransportError::from_status(status));
        }

        let body = resp.text().await.map_err(TransportError::from_reqwest)?;
        parse_chat_response(&body)
    }

    /// Streams the answer from `POST /chat/stream`, handing each decoded text
    /// delta to `on_text` in arrival order.
    ///
    /// Returning `ControlFlow::Break` from the callback stops reading the
    /// body; this is not reported as an error.
    pub async fn stream<F>(&self, query: &str, mut on_text: F) -> Result<(), TransportError>
    where
        F: FnMut(&str) -> ControlFlow<()> + Send,
    {
        debug!(host = %self.config.host, "opening streamed query");

        let resp = self
            .client
            .post(self.url("/chat/stream"))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream, text/plain")
            .json(&ChatRequest { query })
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            warn!(%status, "stream endpoint returned an error status");
            return Err(TransportError::from_status(status));
        }

        let mut http_stream = resp.bytes_stream();
        let mut decoder = Utf8ChunkDecoder::default();

        while let Some(item) = http_stream.next().await {
            let chunk = item.map_err(|err| TransportError::Stream(err.to_string()))?;
            let text = decoder.push(&chunk);
            if !text.is_empty() && on_text(&text).is_break() {
                debug!("stream reader stopped by caller");
                return Ok(());
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            let _ = on_text(&tail);
        }

        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.host.trim_end_matches('/'), path)
    }
}

pub fn parse_chat_response(body: &str) -> Result<ChatAnswer, TransportError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|err| TransportError::Malformed(err.to_string()))?;

    let answer = parsed
        .answer
        .filter(|answer| !answer.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ANSWER.to_string());
    let sources = parsed
        .sources
        .unwrap_or_default()
        .iter()
        .filter_map(source_label)
        .collect();

    Ok(ChatAnswer { answer, sources })
}

/// Sources come back either as plain strings or as objects carrying a
/// `source` field. Nulls and blanks are dropped.
fn source_label(entry: &Value) -> Option<String> {
    let label = match entry {
        Value::String(label) => label.as_str(),
        Value::Object(map) => map.get("source")?.as_str()?,
        _ => return None,
    };

    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

/// Incremental UTF-8 decoder for a chunked body.
///
/// Bytes of a multi-byte character split across two chunks are held back
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }

        out
    }

    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
