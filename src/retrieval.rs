//! Retrieval engine: ingestion pipelines and similarity search
//!
//! Owns the vector index together with the parallel `chunks` and
//! `metadata` arrays that resolve index ids back to content. Every ingest
//! replaces the index wholesale; there is no incremental add across calls,
//! and a failed ingest leaves the engine empty so the proxy can fall back
//! to plain forwarding.
//!
//! The engine is not reentrant for ingestion. Callers guard it with a
//! read-write lock: ingest takes the write half, queries take the read
//! half and therefore block until an in-flight ingest has published the
//! new index. Embedding and PDF parsing are CPU-bound and are dispatched
//! to the blocking worker pool.

use crate::chunker::TextSplitter;
use crate::crawler::WebCrawler;
use crate::embedding::Embedder;
use crate::error::{Result, RetrievalError};
use crate::index::VectorIndex;
use crate::pdf;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Results below this similarity are dropped
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Source attribution stored alongside each chunk
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// File basename for PDFs, URL for web pages
    pub source_info: String,
    /// Page number for PDFs, 0 for everything else
    pub source_position: usize,
}

/// A retrieval result in rank order
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: String,
    pub source_info: String,
    pub source_position: usize,
    /// `1 − cosine_distance`, higher is closer
    pub similarity: f32,
}

/// Ingestion and similarity search over an in-memory vector index
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    crawler: WebCrawler,
    document_base_dir: PathBuf,
    chunks: Vec<String>,
    metadata: Vec<ChunkMetadata>,
    index: VectorIndex,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        crawler: WebCrawler,
        document_base_dir: PathBuf,
    ) -> Self {
        let index = VectorIndex::with_default_capacity(embedder.dimension());
        Self {
            embedder,
            splitter: TextSplitter::default(),
            crawler,
            document_base_dir,
            chunks: Vec::new(),
            metadata: Vec::new(),
            index,
        }
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rebuild the index from the given PDF paths.
    ///
    /// Paths are tried verbatim and then relative to the configured
    /// document base directory; missing documents and unreadable PDFs are
    /// logged and skipped. Returns `Ok(true)` when at least one path
    /// yielded at least one chunk.
    pub async fn ingest_pdfs(&mut self, paths: &[String]) -> Result<bool> {
        self.reset();
        let result = self.ingest_pdfs_inner(paths).await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn ingest_pdfs_inner(&mut self, paths: &[String]) -> Result<bool> {
        for raw_path in paths {
            let Some(path) = self.resolve_document_path(raw_path) else {
                warn!(
                    error = %RetrievalError::DocumentNotFound(raw_path.clone()),
                    "skipping document"
                );
                continue;
            };

            info!(path = %path.display(), "reading PDF");
            let pdf_path = path.clone();
            let pages =
                match tokio::task::spawn_blocking(move || pdf::read_pdf_pages(&pdf_path)).await {
                    Ok(Ok(pages)) => pages,
                    Ok(Err(e)) => {
                        warn!(error = %e, "skipping unreadable PDF");
                        continue;
                    }
                    Err(e) => {
                        return Err(RetrievalError::Pdf {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        }
                        .into())
                    }
                };

            let source_info = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| raw_path.clone());

            // Split per page so chunks never straddle page boundaries
            let mut document_chunks = Vec::new();
            let mut document_metadata = Vec::new();
            for page in &pages {
                for chunk in self.splitter.split_text(&page.text) {
                    document_chunks.push(chunk);
                    document_metadata.push(ChunkMetadata {
                        source_info: source_info.clone(),
                        source_position: page.index,
                    });
                }
            }

            if document_chunks.is_empty() {
                warn!(
                    error = %RetrievalError::EmptyExtraction(source_info),
                    "skipping document"
                );
                continue;
            }

            debug!(chunks = document_chunks.len(), "embedding document chunks");
            let embeddings = self.embed_batch(document_chunks.clone()).await?;
            self.index.add(&embeddings)?;
            self.chunks.append(&mut document_chunks);
            self.metadata.append(&mut document_metadata);
        }

        info!(total_chunks = self.chunks.len(), "vector index ready");
        Ok(!self.chunks.is_empty())
    }

    /// Rebuild the index from a web crawl of the given seed URLs.
    ///
    /// `deep` crawls two link levels, otherwise only the seeds themselves.
    /// Returns `Ok(true)` when at least one page yielded at least one
    /// chunk.
    pub async fn ingest_web(&mut self, urls: &[String], deep: bool) -> Result<bool> {
        self.reset();
        let result = self.ingest_web_inner(urls, deep).await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn ingest_web_inner(&mut self, urls: &[String], deep: bool) -> Result<bool> {
        let depth = if deep { 2 } else { 1 };
        info!(seeds = urls.len(), depth, "crawling websites");

        let pages = self.crawler.crawl(urls, depth).await;
        if pages.is_empty() {
            warn!("crawl produced no pages");
            return Ok(false);
        }

        // Split per page so chunks never straddle page boundaries
        let mut all_chunks = Vec::new();
        let mut all_metadata = Vec::new();
        for page in &pages {
            for chunk in self.splitter.split_text(&page.text) {
                all_chunks.push(chunk);
                all_metadata.push(ChunkMetadata {
                    source_info: page.url.clone(),
                    source_position: 0,
                });
            }
        }

        if all_chunks.is_empty() {
            return Ok(false);
        }

        debug!(pages = pages.len(), chunks = all_chunks.len(), "embedding crawled pages");
        let embeddings = self.embed_batch(all_chunks.clone()).await?;
        self.index.add(&embeddings)?;
        self.chunks.append(&mut all_chunks);
        self.metadata.append(&mut all_metadata);

        info!(total_chunks = self.chunks.len(), "vector index ready");
        Ok(true)
    }

    /// Rebuild the index from raw strings, indexed verbatim without
    /// splitting.
    pub async fn ingest_strings(&mut self, strings: &[String]) -> Result<bool> {
        self.reset();

        let strings: Vec<String> = strings
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();
        if strings.is_empty() {
            return Ok(false);
        }

        let embeddings = match self.embed_batch(strings.clone()).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                self.reset();
                return Err(e);
            }
        };
        self.index.add(&embeddings)?;
        self.metadata.extend(strings.iter().map(|_| ChunkMetadata {
            source_info: "clipboard".to_string(),
            source_position: 0,
        }));
        self.chunks.extend(strings);

        info!(total_chunks = self.chunks.len(), "vector index ready");
        Ok(true)
    }

    /// Return the `k` nearest chunks with similarity of at least
    /// `threshold`, nearest first.
    pub async fn query(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<ScoredChunk>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = self.embed_batch(vec![text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| RetrievalError::EmbeddingFailed("no query embedding".to_string()))?;

        let hits = self.index.knn(&embedding, k)?;
        let results: Vec<ScoredChunk> = hits
            .into_iter()
            .filter_map(|hit| {
                let similarity = 1.0 - hit.distance;
                if similarity < threshold {
                    return None;
                }
                let chunk = self.chunks.get(hit.id)?;
                let meta = self.metadata.get(hit.id)?;
                Some(ScoredChunk {
                    chunk: chunk.clone(),
                    source_info: meta.source_info.clone(),
                    source_position: meta.source_position,
                    similarity,
                })
            })
            .collect();

        debug!(results = results.len(), threshold, "query complete");
        Ok(results)
    }

    fn reset(&mut self) {
        self.chunks.clear();
        self.metadata.clear();
        self.index = VectorIndex::with_default_capacity(self.embedder.dimension());
    }

    /// Try a path verbatim, then relative to the document base directory
    fn resolve_document_path(&self, raw: &str) -> Option<PathBuf> {
        let direct = Path::new(raw);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        let fallback = self.document_base_dir.join(raw);
        if fallback.is_file() {
            return Some(fallback);
        }
        None
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.encode(&texts))
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?
    }
}
