#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY: &str = "sk-test";

fn chunk(delta: Value, finish_reason: Option<&str>) -> String {
    let payload = json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "model": "gpt-4o",
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }],
    });
    format!("data: {}\n\n", payload)
}

/// A complete event-stream body delivering `fragments`, the way the API streams a reply.
pub fn sse_body(fragments: &[&str]) -> String {
    let mut body = chunk(json!({ "role": "assistant", "content": "" }), None);
    for fragment in fragments {
        body.push_str(&chunk(json!({ "content": fragment }), None));
    }
    body.push_str(&chunk(json!({}), Some("stop")));
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

/// Mounts a chat endpoint that answers every request with `fragments`.
pub async fn mount_reply(server: &MockServer, fragments: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o",
            "stream": true,
            "temperature": 0.7,
            "max_tokens": 1500,
        })))
        .respond_with(sse_response(sse_body(fragments)))
        .mount(server)
        .await;
}

/// JSON bodies of every request the mock server received, in order.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("request recording is enabled")
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}
