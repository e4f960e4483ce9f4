//! End-to-end tests for the gateway proxy against a mocked backend

mod common;

use common::*;
use llm_kickstart::config::GatewayConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-backend",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop",
        }],
    }))
}

async fn mock_chat(backend: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(completion_response(content))
        .mount(backend)
        .await;
}

#[tokio::test]
async fn file_ingest_then_chat_injects_context_and_sources() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "Alpha is the first item.").await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("fixture.pdf"), "alpha beta gamma");

    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    // Relative path resolves through the configured document base dir
    let status: Value = client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "fixture.pdf" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "success");

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "test-model",
            "stream": false,
            "messages": [{ "role": "user", "content": "what about alpha beta gamma?" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(
        content.ends_with("\n\n---\nSources:\n1: fixture.pdf\n"),
        "unexpected trailer: {content:?}"
    );

    // The outgoing backend payload leads with the injected context message
    let requests = backend.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let forwarded: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = forwarded["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);

    let injected = messages[0]["content"].as_str().unwrap();
    assert!(injected.starts_with(
        "The following parts of a document or website should be considered when generating \
         responses and/or answers to the users questions:\n"
    ));
    assert!(injected.contains("alpha beta gamma"));
    assert_eq!(messages[1]["content"], "what about alpha beta gamma?");
}

#[tokio::test]
async fn disablerag_returns_to_plain_forwarding() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "Plain answer.").await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("fixture.pdf"), "alpha beta gamma");

    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "fixture.pdf" }))
        .send()
        .await
        .unwrap();

    let disable: Value = client
        .get(format!("{gateway}/v1/disablerag"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(disable["status"], "success");

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "what about alpha beta gamma?" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert_eq!(content, "Plain answer.");

    // Forwarded unmodified: no injected message
    let forwarded: Value =
        serde_json::from_slice(&backend.received_requests().await.unwrap()[0].body).unwrap();
    assert_eq!(forwarded["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn disablerag_is_idempotent() {
    let backend = MockServer::start().await;
    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response: Value = client
            .get(format!("{gateway}/v1/disablerag"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response["status"], "success");
    }
}

#[tokio::test]
async fn testmessage_command_short_circuits_the_backend() {
    let backend = MockServer::start().await;
    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    let body = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "/testmessage" }],
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let content = reconstruct_sse_content(&body);
    assert!(content.contains("This is a test response answering your testmessage!"));
    assert_eq!(sse_data_lines(&body).last().map(String::as_str), Some("[DONE]"));

    // Command isolation: the backend saw nothing
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_command_streams_usage_without_forwarding() {
    let backend = MockServer::start().await;
    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    let body = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "/chatwithfile" }],
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(reconstruct_sse_content(&body).contains("Usage: /chatwithfile"));
    assert!(backend.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn streaming_relay_preserves_order_then_sources_then_done() {
    let backend = MockServer::start().await;
    let sse_body = "data: {\"n\":1}\n\ndata: {\"n\":2}\n\ndata: {\"n\":3}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .mount(&backend)
        .await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("fixture.pdf"), "alpha beta gamma");

    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "fixture.pdf" }))
        .send()
        .await
        .unwrap();

    let body = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "alpha beta gamma again" }],
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = sse_data_lines(&body);
    assert_eq!(events[0], "{\"n\":1}");
    assert_eq!(events[1], "{\"n\":2}");
    assert_eq!(events[2], "{\"n\":3}");
    assert!(events[3].contains("Sources:"), "expected trailer, got {:?}", events[3]);
    assert!(events[3].contains("1: fixture.pdf"));
    assert_eq!(events[4], "[DONE]");
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn failed_ingest_reports_failure_and_disarms() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "No context answer.").await;

    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "missing.pdf" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "failed");

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "anything" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // No injection, no trailer
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert_eq!(content, "No context answer.");
    let forwarded: Value =
        serde_json::from_slice(&backend.received_requests().await.unwrap()[0].body).unwrap();
    assert_eq!(forwarded["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn models_are_basename_normalized() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                { "id": "/models/llama-3.2.gguf", "object": "model" },
                { "id": "plain-name", "object": "model" },
            ],
        })))
        .mount(&backend)
        .await;

    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    let models: Value = reqwest::Client::new()
        .get(format!("{gateway}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(models["data"][0]["id"], "llama-3.2.gguf");
    assert_eq!(models["data"][1]["id"], "plain-name");
}

#[tokio::test]
async fn chat_with_file_command_arms_retrieval() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "Context-aware answer.").await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("notes.pdf"), "alpha beta gamma");

    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    let body = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "/chatwithfile notes.pdf" }],
        }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(reconstruct_sse_content(&body).contains("Ready, you can now chat with notes.pdf!"));
    assert!(backend.received_requests().await.unwrap().is_empty());

    // The next chat is augmented
    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "tell me about alpha beta gamma" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("\n\n---\nSources:\n"));
}

#[tokio::test]
async fn forgetcontext_command_disarms() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "Plain.").await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("notes.pdf"), "alpha beta gamma");

    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "notes.pdf" }))
        .send()
        .await
        .unwrap();

    client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": true,
            "messages": [{ "role": "user", "content": "/forgetcontext" }],
        }))
        .send()
        .await
        .unwrap();

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "alpha beta gamma" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert_eq!(content, "Plain.");
}

#[tokio::test]
async fn query_optimization_rewrites_before_retrieval() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "alpha beta gamma focus").await;

    let docs = tempfile::tempdir().unwrap();
    write_single_page_pdf(&docs.path().join("fixture.pdf"), "alpha beta gamma");

    let config = GatewayConfig {
        enable_query_optimization: "True".to_string(),
        ..GatewayConfig::default()
    };
    let gateway = spawn_gateway(test_state_with_config(
        &format!("{}/v1", backend.uri()),
        docs.path(),
        config,
    ))
    .await;
    let client = reqwest::Client::new();

    client
        .post(format!("{gateway}/v1/ragupdatepdf"))
        .json(&json!({ "document_path": "fixture.pdf" }))
        .send()
        .await
        .unwrap();

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "model": "test-model",
            "stream": false,
            "messages": [{ "role": "user", "content": "something unrelated entirely" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let requests = backend.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);

    // First call is the rewrite: fixed low temperature, not streamed
    let rewrite: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(rewrite["temperature"], 0.1);
    assert_eq!(rewrite["stream"], false);
    assert_eq!(rewrite["model"], "test-model");
    let rewrite_prompt = rewrite["messages"][0]["content"].as_str().unwrap();
    assert!(rewrite_prompt.contains("query optimization assistant"));
    assert!(rewrite_prompt.contains("something unrelated entirely"));

    // The rewritten query matched the indexed chunk, so the final call is
    // augmented and the answer carries the trailer
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.ends_with("\n\n---\nSources:\n1: fixture.pdf\n"));
}

#[tokio::test]
async fn text_ingest_arms_clipboard_retrieval() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "Noted.").await;

    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .post(format!("{gateway}/v1/ragupdatetext"))
        .json(&json!({ "content": "alpha beta gamma notes;unrelated snippet here" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "success");

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "alpha beta gamma" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(
        content.ends_with("\n\n---\nSources:\n1: clipboard\n"),
        "unexpected trailer: {content:?}"
    );

    // The snippet was indexed verbatim and injected
    let forwarded: Value =
        serde_json::from_slice(&backend.received_requests().await.unwrap()[0].body).unwrap();
    let injected = forwarded["messages"][0]["content"].as_str().unwrap();
    assert!(injected.contains("alpha beta gamma notes"));

    // Blank content reports failure and disarms
    let status: Value = client
        .post(format!("{gateway}/v1/ragupdatetext"))
        .json(&json!({ "content": "  " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "failed");
}

#[tokio::test]
async fn deep_web_ingest_draws_from_multiple_pages() {
    let site = MockServer::start().await;
    let root_html = format!(
        r#"<html><body><div>Index of the documentation site, start here.
           <a href="{0}/a">first</a> <a href="{0}/b">second</a></div></body></html>"#,
        site.uri()
    );
    Mock::given(method("GET"))
        .and(path("/root"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(root_html, "text/html"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<div>alpha beta shared topic</div>",
            "text/html",
        ))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<div>alpha beta other words</div>",
            "text/html",
        ))
        .mount(&site)
        .await;

    let backend = MockServer::start().await;
    mock_chat(&backend, "Answer from the site.").await;

    let docs = tempfile::tempdir().unwrap();
    // Default config crawls two levels deep
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;
    let client = reqwest::Client::new();

    let status: Value = client
        .post(format!("{gateway}/v1/ragupdateweb"))
        .json(&json!({ "url": format!("{}/root", site.uri()) }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "success");

    let response: Value = client
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "alpha beta" }],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Retrieval pulled chunks from both crawled subpages
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("/a"), "missing first source: {content:?}");
    assert!(content.contains("/b"), "missing second source: {content:?}");
}

#[tokio::test]
async fn bearer_token_is_forwarded() {
    let backend = MockServer::start().await;
    mock_chat(&backend, "ok").await;

    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .header("Authorization", "Bearer client-token")
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "hello" }],
        }))
        .send()
        .await
        .unwrap();

    let requests = backend.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer client-token");
}

#[tokio::test]
async fn liveness_endpoint() {
    let backend = MockServer::start().await;
    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    let response: Value = reqwest::Client::new()
        .get(format!("{gateway}/v1/testmessage"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(response["message"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn upstream_failure_surfaces_as_500() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
        .mount(&backend)
        .await;

    let docs = tempfile::tempdir().unwrap();
    let gateway = spawn_gateway(test_state(&format!("{}/v1", backend.uri()), docs.path())).await;

    let response = reqwest::Client::new()
        .post(format!("{gateway}/v1/chat/completions"))
        .json(&json!({
            "stream": false,
            "messages": [{ "role": "user", "content": "hello" }],
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("503"));
}
