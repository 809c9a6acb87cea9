//! Retrieval-augmented context building for live Q&A.
//!
//! A question is embedded once, fanned out across the knowledge-base scopes
//! available to the session (content KB, presenter KB, and their image
//! collections), and the merged hits become one ranked context. KB images take
//! part as ordinary chunks whose content is their associated text.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::{KbScope, KnowledgeStore};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Where a retrieved chunk came from, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourceScope {
    /// The content's own knowledge base.
    Content,
    /// The presenter's personal knowledge base.
    Presenter,
    /// Image associated-text from the content KB.
    ContentImage,
    /// Image associated-text from the presenter KB.
    PresenterImage,
}

/// A retrieved context chunk. Ephemeral; lives for one question cycle.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub content: String,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
    /// Originating document title or filename, for citation.
    pub source_label: String,
    pub source_scope: SourceScope,
}

/// Ranked context for one question.
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub chunks: Vec<RetrievedChunk>,
    /// Chunk contents joined with a separator, ready for the answer prompt.
    pub combined_context: String,
    /// Distinct source labels, deduplicated per scope, in rank order.
    pub sources: Vec<String>,
}

impl RetrievalContext {
    /// True when nothing relevant was found.
    pub fn is_empty(&self) -> bool {
        self.combined_context.is_empty()
    }
}

/// Which knowledge bases a retrieval may touch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeDescriptor {
    pub content: Option<uuid::Uuid>,
    pub presenter: Option<uuid::Uuid>,
    /// Also search KB image associated-text in the scopes above.
    pub include_images: bool,
}

/// Multi-scope retrieval service.
pub struct RetrievalService {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    image_top_k: usize,
    similarity_threshold: f32,
}

impl RetrievalService {
    /// Create a retrieval service with default limits.
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            top_k: 5,
            image_top_k: 3,
            similarity_threshold: 0.3,
        }
    }

    /// Set the global result limit.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the per-scope limit for KB image searches.
    pub fn with_image_top_k(mut self, image_top_k: usize) -> Self {
        self.image_top_k = image_top_k;
        self
    }

    /// Set the minimum similarity for a chunk to be kept.
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Retrieve ranked context for a question across the given scopes.
    ///
    /// An empty scope descriptor, or no hit clearing the threshold, yields an
    /// empty context rather than an error so callers can fall back to a
    /// graceful "not enough information" answer.
    #[instrument(skip(self, question), fields(question_chars = question.len()))]
    pub async fn retrieve(
        &self,
        question: &str,
        scopes: ScopeDescriptor,
    ) -> Result<RetrievalContext> {
        if scopes.content.is_none() && scopes.presenter.is_none() {
            return Ok(RetrievalContext::default());
        }

        let query_embedding = self.embedder.embed(question).await?;

        let mut all: Vec<RetrievedChunk> = Vec::new();

        if let Some(content_id) = scopes.content {
            let hits = self
                .store
                .search_chunks(
                    KbScope::Content(content_id),
                    &query_embedding,
                    self.top_k,
                    self.similarity_threshold,
                )
                .await?;
            all.extend(hits.into_iter().map(|h| RetrievedChunk {
                content: h.content,
                similarity: h.similarity,
                source_label: h.source_label,
                source_scope: SourceScope::Content,
            }));
        }

        if let Some(presenter_id) = scopes.presenter {
            let hits = self
                .store
                .search_chunks(
                    KbScope::Presenter(presenter_id),
                    &query_embedding,
                    self.top_k,
                    self.similarity_threshold,
                )
                .await?;
            all.extend(hits.into_iter().map(|h| RetrievedChunk {
                content: h.content,
                similarity: h.similarity,
                source_label: h.source_label,
                source_scope: SourceScope::Presenter,
            }));
        }

        if scopes.include_images {
            if let Some(content_id) = scopes.content {
                let hits = self
                    .store
                    .search_kb_images(
                        KbScope::Content(content_id),
                        &query_embedding,
                        self.image_top_k,
                        self.similarity_threshold,
                    )
                    .await?;
                all.extend(hits.into_iter().map(|h| RetrievedChunk {
                    content: h.image.associated_text.clone(),
                    similarity: h.similarity,
                    source_label: h.image.label().to_string(),
                    source_scope: SourceScope::ContentImage,
                }));
            }
            if let Some(presenter_id) = scopes.presenter {
                let hits = self
                    .store
                    .search_kb_images(
                        KbScope::Presenter(presenter_id),
                        &query_embedding,
                        self.image_top_k,
                        self.similarity_threshold,
                    )
                    .await?;
                all.extend(hits.into_iter().map(|h| RetrievedChunk {
                    content: h.image.associated_text.clone(),
                    similarity: h.similarity,
                    source_label: h.image.label().to_string(),
                    source_scope: SourceScope::PresenterImage,
                }));
            }
        }

        // Stable sort: similarity descending, then scope priority; complete
        // ties keep insertion order.
        all.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.source_scope.cmp(&b.source_scope))
        });
        all.truncate(self.top_k);

        debug!("Retrieved {} chunks", all.len());

        Ok(build_context(all))
    }
}

/// Assemble the combined prompt context and deduplicated source list.
fn build_context(chunks: Vec<RetrievedChunk>) -> RetrievalContext {
    let combined_context = chunks
        .iter()
        .map(|c| format!("[From {}]:\n{}", c.source_label, c.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let mut sources: Vec<String> = Vec::new();
    let mut seen: Vec<(SourceScope, &str)> = Vec::new();
    for chunk in &chunks {
        let key = (chunk.source_scope, chunk.source_label.as_str());
        if !seen.contains(&key) {
            seen.push(key);
            sources.push(chunk.source_label.clone());
        }
    }

    RetrievalContext {
        chunks,
        combined_context,
        sources,
    }
}
