//! Shared helpers for integration tests
#![allow(dead_code)]

use llm_kickstart::backend::BackendClient;
use llm_kickstart::config::GatewayConfig;
use llm_kickstart::crawler::WebCrawler;
use llm_kickstart::embedding::HashingEmbedder;
use llm_kickstart::proxy::{router, AppState};
use llm_kickstart::retrieval::RetrievalEngine;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Build a single-page PDF containing `text`
pub fn write_single_page_pdf(path: &Path, text: &str) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Gateway state over a deterministic embedder and the given backend URL
pub fn test_state(backend_base_url: &str, document_base: &Path) -> AppState {
    test_state_with_config(backend_base_url, document_base, GatewayConfig::default())
}

pub fn test_state_with_config(
    backend_base_url: &str,
    document_base: &Path,
    config: GatewayConfig,
) -> AppState {
    let engine = RetrievalEngine::new(
        Arc::new(HashingEmbedder),
        WebCrawler::new(Duration::from_secs(2)).unwrap(),
        document_base.to_path_buf(),
    );
    let backend = BackendClient::new(backend_base_url).unwrap();
    AppState::new(engine, backend, config)
}

/// Serve the router on an ephemeral port, returning its base URL
pub async fn spawn_gateway(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

/// Reassemble the delta contents of an SSE chat-completion stream body
pub fn reconstruct_sse_content(body: &str) -> String {
    let mut content = String::new();
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data: ") else {
            continue;
        };
        if data == "[DONE]" {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<serde_json::Value>(data) else {
            continue;
        };
        if let Some(delta) = chunk["choices"][0]["delta"]["content"].as_str() {
            content.push_str(delta);
        }
    }
    content
}

/// Data payloads of an SSE body in arrival order, including `[DONE]`
pub fn sse_data_lines(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}
