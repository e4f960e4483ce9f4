//! HTTP handlers for the gateway surface
//!
//! The chat handler is the central pipeline: intercept slash commands,
//! optionally rewrite the search query through the backend, retrieve
//! context, inject the context envelope, and forward the payload,
//! relaying streams verbatim and appending the sources trailer.

use crate::backend::{message_content, payload};
use crate::error::{KickstartError, Result};
use crate::proxy::commands::{SlashCommand, HELP_TEXT, TEST_RESPONSE};
use crate::proxy::state::IngestMode;
use crate::proxy::stream::{self, SOURCES_SEPARATOR};
use crate::proxy::AppState;
use crate::retrieval::{ScoredChunk, DEFAULT_SCORE_THRESHOLD};
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Prefix of the injected context message
const CONTEXT_PREFIX: &str = "The following parts of a document or website should be considered \
    when generating responses and/or answers to the users questions:\n";

/// Suffix used when at least one chunk survived the threshold
const CONTEXT_SUFFIX: &str = "All of the parts of a document or website should only be used if \
    it is helpful in answering the user's question. Do not output filenames or URLs that may be \
    included in the context.\n";

/// Suffix used when no chunk survived the threshold
const CONTEXT_EMPTY_SUFFIX: &str = "There are no information in the document that can answer \
    the user's question. Do not answer anything that you think it may be correct.\n";

/// GET `/v1/testmessage`, the liveness probe
pub async fn test_message() -> Json<Value> {
    Json(json!({ "message": "Kickstart gateway is running and forwarding requests." }))
}

/// GET `/v1/disablerag`: transition retrieval to Idle. Idempotent.
pub async fn disable_rag(State(state): State<AppState>) -> Json<Value> {
    state.retrieval.write().await.disarm();
    info!("retrieval disabled");
    Json(json!({ "status": "success" }))
}

/// GET `/v1/models`: upstream model list with basename-normalized ids
pub async fn list_models(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match fetch_models(&state, bearer(&headers)).await {
        Ok(models) => Json(models).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn fetch_models(state: &AppState, bearer: Option<&str>) -> Result<Value> {
    let mut models = state.backend.list_models(bearer).await?;
    if let Some(data) = models.get_mut("data").and_then(Value::as_array_mut) {
        for model in data {
            let Some(id) = model.get("id").and_then(Value::as_str) else {
                continue;
            };
            let basename = std::path::Path::new(id)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(id)
                .to_string();
            if let Some(object) = model.as_object_mut() {
                object.insert("id".to_string(), Value::String(basename));
            }
        }
    }
    Ok(models)
}

#[derive(Debug, Deserialize)]
pub struct RagUpdatePdfRequest {
    /// Semicolon-separated list of PDF paths
    pub document_path: String,
}

/// POST `/v1/ragupdatepdf`: rebuild the index from PDFs and arm retrieval
pub async fn rag_update_pdf(
    State(state): State<AppState>,
    Json(request): Json<RagUpdatePdfRequest>,
) -> Json<Value> {
    let ok = ingest_documents(&state, &request.document_path).await;
    Json(ingest_status(ok))
}

#[derive(Debug, Deserialize)]
pub struct RagUpdateWebRequest {
    /// Semicolon-separated list of seed URLs
    pub url: String,
}

/// POST `/v1/ragupdateweb`: rebuild the index from a web crawl and arm
/// retrieval. Crawl depth follows the configured `website-crawl-depth`.
pub async fn rag_update_web(
    State(state): State<AppState>,
    Json(request): Json<RagUpdateWebRequest>,
) -> Json<Value> {
    let deep = state.config.crawl_depth() > 1;
    let ok = ingest_websites(&state, &request.url, deep).await;
    Json(ingest_status(ok))
}

#[derive(Debug, Deserialize)]
pub struct RagUpdateTextRequest {
    /// Semicolon-separated list of raw text snippets
    pub content: String,
}

/// POST `/v1/ragupdatetext`: rebuild the index from raw text snippets
/// (clipboard-style content) and arm retrieval
pub async fn rag_update_text(
    State(state): State<AppState>,
    Json(request): Json<RagUpdateTextRequest>,
) -> Json<Value> {
    let ok = ingest_texts(&state, &request.content).await;
    Json(ingest_status(ok))
}

fn ingest_status(ok: bool) -> Value {
    if ok {
        json!({ "status": "success" })
    } else {
        json!({ "status": "failed" })
    }
}

/// POST `/v1/chat/completions`: the augmentation pipeline
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    match handle_chat(&state, &headers, payload).await {
        Ok(response) => response,
        Err(e) => {
            error!(category = e.category(), error = %e, "chat handler failed");
            internal_error(e)
        }
    }
}

async fn handle_chat(state: &AppState, headers: &HeaderMap, mut payload: Value) -> Result<Response> {
    let user_text = payload::last_message_content(&payload)
        .unwrap_or_default()
        .to_string();
    let bearer = bearer(headers).map(str::to_string);

    // Recognized commands never reach the backend
    if let Some(command) = SlashCommand::parse(&user_text) {
        return Ok(execute_command(state, command).await);
    }

    let mut rag_sources: Option<Vec<String>> = None;
    if state.retrieval.read().await.is_armed() {
        let mut search_query = user_text.clone();
        if state.config.query_optimization_enabled() {
            search_query = optimize_query(state, &payload, &user_text, bearer.as_deref()).await?;
            info!(query = %search_query, "optimized search query");
        }

        let results = state
            .engine
            .read()
            .await
            .query(
                &search_query,
                state.config.retrieval_chunk_count(),
                DEFAULT_SCORE_THRESHOLD,
            )
            .await?;

        let (context, sources) = build_context(&results);
        payload::inject_leading_user_message(&mut payload, context);
        rag_sources = Some(sources);
    }

    let trailer_sources = rag_sources.filter(|sources| !sources.is_empty());

    if payload::stream_requested(&payload) {
        let upstream = state.backend.chat_stream(&payload, bearer.as_deref()).await?;
        Ok(stream::relay_sse(upstream, trailer_sources).into_response())
    } else {
        let mut response = state.backend.chat(&payload, bearer.as_deref()).await?;
        if let Some(sources) = trailer_sources {
            append_sources(&mut response, &sources);
        }
        Ok(Json(response).into_response())
    }
}

async fn execute_command(state: &AppState, command: SlashCommand) -> Response {
    match command {
        SlashCommand::Help => stream::synthetic_sse(HELP_TEXT).into_response(),
        SlashCommand::TestMessage => stream::synthetic_sse(TEST_RESPONSE).into_response(),
        SlashCommand::Usage(usage) => stream::synthetic_sse(usage).into_response(),
        SlashCommand::ForgetContext => {
            state.retrieval.write().await.disarm();
            info!("retrieval disabled by command");
            stream::synthetic_sse("Context cleared, responses are no longer augmented.")
                .into_response()
        }
        SlashCommand::ChatWithFile { path } => {
            let message = if ingest_documents(state, &path).await {
                format!("Ready, you can now chat with {path}!")
            } else {
                format!("There was an error while reading the document {path}, please try again.")
            };
            stream::synthetic_sse(&message).into_response()
        }
        SlashCommand::ChatWithWebsite { url, deep } => {
            let message = if ingest_websites(state, &url, deep).await {
                format!("Ready, you can now chat with {url}!")
            } else {
                format!("There was an error while reading the document {url}, please try again.")
            };
            stream::synthetic_sse(&message).into_response()
        }
    }
}

/// Ingest a semicolon-separated PDF path list and update the arming state.
///
/// Any failure leaves retrieval Idle.
async fn ingest_documents(state: &AppState, raw_paths: &str) -> bool {
    let paths = split_list(raw_paths);
    let outcome = if paths.is_empty() {
        Ok(false)
    } else {
        state.engine.write().await.ingest_pdfs(&paths).await
    };

    let ok = match outcome {
        Ok(ok) => ok,
        Err(e) => {
            warn!(category = e.category(), error = %e, "document ingest failed");
            false
        }
    };

    let mut retrieval = state.retrieval.write().await;
    if ok {
        retrieval.arm(IngestMode::File, paths);
        info!("RAG update successful, retrieval armed");
    } else {
        retrieval.disarm();
        info!("RAG update failed, retrieval disarmed");
    }
    ok
}

/// Ingest a semicolon-separated URL list and update the arming state.
async fn ingest_websites(state: &AppState, raw_urls: &str, deep: bool) -> bool {
    let urls = split_list(raw_urls);
    let outcome = if urls.is_empty() {
        Ok(false)
    } else {
        state.engine.write().await.ingest_web(&urls, deep).await
    };

    let ok = match outcome {
        Ok(ok) => ok,
        Err(e) => {
            warn!(category = e.category(), error = %e, "website ingest failed");
            false
        }
    };

    let mut retrieval = state.retrieval.write().await;
    if ok {
        retrieval.arm(IngestMode::Web, urls);
        info!("RAG update successful, retrieval armed");
    } else {
        retrieval.disarm();
        info!("RAG update failed, retrieval disarmed");
    }
    ok
}

/// Ingest semicolon-separated raw text snippets verbatim and update the
/// arming state.
async fn ingest_texts(state: &AppState, raw_texts: &str) -> bool {
    let texts = split_list(raw_texts);
    let outcome = if texts.is_empty() {
        Ok(false)
    } else {
        state.engine.write().await.ingest_strings(&texts).await
    };

    let ok = match outcome {
        Ok(ok) => ok,
        Err(e) => {
            warn!(category = e.category(), error = %e, "text ingest failed");
            false
        }
    };

    let mut retrieval = state.retrieval.write().await;
    if ok {
        retrieval.arm(IngestMode::Clipboard, texts);
        info!("RAG update successful, retrieval armed");
    } else {
        retrieval.disarm();
        info!("RAG update failed, retrieval disarmed");
    }
    ok
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Rewrite the user's query into a form better suited for similarity
/// search. Issued directly against the backend client, so the call cannot
/// re-enter this handler.
async fn optimize_query(
    state: &AppState,
    chat_payload: &Value,
    user_text: &str,
    bearer: Option<&str>,
) -> Result<String> {
    let prompt = format!(
        "Task:\n\
        - You are a query optimization assistant.\n\
        - Your goal is to transform a user's natural-language query into a rewritten query that \
        is optimized for semantic similarity search in a vector database.\n\
        Rewrite Requirements:\n\
        - Preserve the user's intent.\n\
        - Identify the focus topic of the users input and reduce the query to this topic\n\
        - Make it more specific, detailed, and semantically rich.\n\
        - Add related key concepts, synonyms, and domain-specific terminology.\n\
        - Use concise phrases, not full sentences.\n\
        - Remove conversational filler (e.g., \"Can you tell me...\").\n\
        Output Format:\n\
        - Provide only the rewritten query, no explanations or extra text.\n\
        User Query:\n\
        {user_text}\n\
        Optimized Similarity Search Query:\n"
    );

    let request = json!({
        "model": payload::model(chat_payload),
        "messages": [{ "role": "user", "content": prompt }],
        "stream": false,
        "temperature": 0.1,
    });

    let response = state.backend.chat(&request, bearer).await?;
    Ok(message_content(&response).unwrap_or(user_text).to_string())
}

/// Build the context envelope and the per-chunk source attributions.
///
/// `results` are already threshold-filtered and in rank order.
pub(crate) fn build_context(results: &[ScoredChunk]) -> (String, Vec<String>) {
    let mut context = String::from(CONTEXT_PREFIX);
    let mut sources = Vec::new();

    for (index, result) in results.iter().enumerate() {
        let num = index + 1;
        context.push_str(&format!("[\n{num}:\n"));
        context.push_str(&result.chunk);
        context.push_str("\n],\n");

        if result.source_position != 0 {
            sources.push(format!(
                "{num}: {}, Page: {}",
                result.source_info, result.source_position
            ));
        } else {
            sources.push(format!("{num}: {}", result.source_info));
        }
    }

    if sources.is_empty() {
        context.push_str(CONTEXT_EMPTY_SUFFIX);
    } else {
        context.push_str(CONTEXT_SUFFIX);
    }

    (context, sources)
}

/// Append the sources trailer to a non-streaming completion
fn append_sources(response: &mut Value, sources: &[String]) {
    let content = response
        .get_mut("choices")
        .and_then(Value::as_array_mut)
        .and_then(|choices| choices.first_mut())
        .and_then(|choice| choice.get_mut("message"))
        .and_then(|message| message.get_mut("content"));

    match content {
        Some(Value::String(content)) => {
            content.push_str(SOURCES_SEPARATOR);
            for source in sources {
                content.push_str(source);
                content.push('\n');
            }
        }
        _ => warn!("failed to append sources to response"),
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

fn internal_error(e: KickstartError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}
