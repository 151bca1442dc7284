use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument, warn};

use crate::constants;
use crate::sse::{SseDecoder, SseEvent};
use crate::transcript::{Credential, Turn};

/// Progress of one streamed reply, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The API accepted the request; fragments follow.
    Start,
    Text(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("could not reach the chat API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat API responded with {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("chat API reported an error: {0}")]
    Api(String),
    #[error("could not parse the chat API stream: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("the chat API closed the stream before sending a reply")]
    Truncated,
}

// Request body for POST /chat/completions
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// One `data:` payload of the streamed response
#[derive(Deserialize, Debug)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Debug, Default)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    message: String,
}

/// Client for the streaming chat completion endpoint.
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: Client,
    base_url: String,
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatClient {
    pub fn new() -> Self {
        Self::with_base_url(constants::API_BASE_URL.as_str())
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests a reply to `transcript` under the given system message.
    ///
    /// Fragments are forwarded on `tx` as they arrive and the full reply is
    /// returned once the stream completes. A closed receiver does not abort
    /// the request.
    #[instrument(skip_all, fields(turns = transcript.len()))]
    pub async fn stream_reply(
        &self,
        system_text: &str,
        transcript: &[Turn],
        credential: &Credential,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: system_text,
        });
        messages.extend(transcript.iter().map(|turn| WireMessage {
            role: turn.role.as_str(),
            content: &turn.text,
        }));

        let request = ChatRequest {
            model: constants::CHAT_MODEL,
            messages,
            temperature: constants::TEMPERATURE,
            max_tokens: constants::MAX_OUTPUT_TOKENS,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = constants::CHAT_MODEL, "Sending streaming chat completion request");

        let mut response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let message = error_message(status, &body);
            error!(%status, %message, "Chat API request failed");
            return Err(ChatError::Status { status, message });
        }

        let _ = tx.send(StreamEvent::Start).await;

        let mut decoder = SseDecoder::new();
        let mut reply = String::new();
        let mut saw_data = false;

        while let Some(chunk) = response.chunk().await? {
            for event in decoder.push(&chunk) {
                match event {
                    SseEvent::Done => {
                        debug!(bytes = reply.len(), "Reply stream completed");
                        return Ok(reply);
                    }
                    SseEvent::Data(payload) => {
                        saw_data = true;
                        if let Some(fragment) = parse_fragment(&payload)? {
                            reply.push_str(&fragment);
                            let _ = tx.send(StreamEvent::Text(fragment)).await;
                        }
                    }
                }
            }
        }

        match decoder.finish() {
            Some(SseEvent::Done) => return Ok(reply),
            Some(SseEvent::Data(payload)) => {
                saw_data = true;
                if let Some(fragment) = parse_fragment(&payload)? {
                    reply.push_str(&fragment);
                    let _ = tx.send(StreamEvent::Text(fragment)).await;
                }
            }
            None => {}
        }

        if saw_data {
            warn!("Reply stream ended without [DONE]; keeping received text");
            Ok(reply)
        } else {
            Err(ChatError::Truncated)
        }
    }
}

/// Extracts the text delta from one payload. Role-only and empty deltas yield `None`.
fn parse_fragment(payload: &str) -> Result<Option<String>, ChatError> {
    let chunk: ChunkPayload = serde_json::from_str(payload)?;
    if let Some(err) = chunk.error {
        return Err(ChatError::Api(err.message));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_content() {
        let payload = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Great"}}]}"#;
        assert_eq!(parse_fragment(payload).unwrap(), Some("Great".to_string()));
    }

    #[test]
    fn test_parse_fragment_role_only_delta() {
        let payload = r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#;
        assert_eq!(parse_fragment(payload).unwrap(), None);
        let payload = r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_fragment(payload).unwrap(), None);
    }

    #[test]
    fn test_parse_fragment_error_event() {
        let payload = r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#;
        match parse_fragment(payload) {
            Err(ChatError::Api(message)) => assert_eq!(message, "quota exceeded"),
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_fragment_malformed() {
        assert!(matches!(
            parse_fragment("{not json"),
            Err(ChatError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_provider_message() {
        let body = r#"{"error":{"message":"Incorrect API key provided","code":"invalid_api_key"}}"#;
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, body),
            "Incorrect API key provided"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(error_message(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ChatClient::with_base_url("http://localhost:1234/v1/");
        assert_eq!(client.base_url(), "http://localhost:1234/v1");
    }
}
