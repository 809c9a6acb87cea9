//! In-memory knowledge store implementation.
//!
//! Useful for testing and demos.

use super::{
    cosine_similarity, ChunkHit, ContentRecord, ImageHit, KbImageRecord, KbScope, KnowledgeStore,
    PresenterRecord, SlideRecord,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// A stored KB text chunk with its embedding.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub content: String,
    pub source_label: String,
    pub embedding: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    contents: HashMap<Uuid, ContentRecord>,
    presenters: HashMap<Uuid, PresenterRecord>,
    slides: Vec<SlideRecord>,
    chunks: HashMap<KbScope, Vec<StoredChunk>>,
    images: HashMap<KbScope, Vec<KbImageRecord>>,
    segments: HashMap<Uuid, Vec<String>>,
    synthesized_at: HashMap<Uuid, DateTime<Utc>>,
}

/// In-memory knowledge store.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or replace a content record.
    pub fn put_content(&self, content: ContentRecord) {
        self.inner
            .write()
            .unwrap()
            .contents
            .insert(content.id, content);
    }

    /// Insert or replace a presenter record.
    pub fn put_presenter(&self, presenter: PresenterRecord) {
        self.inner
            .write()
            .unwrap()
            .presenters
            .insert(presenter.id, presenter);
    }

    /// Add a slide.
    pub fn put_slide(&self, slide: SlideRecord) {
        self.inner.write().unwrap().slides.push(slide);
    }

    /// Add a KB text chunk to a scope.
    pub fn put_chunk(&self, scope: KbScope, chunk: StoredChunk) {
        self.inner
            .write()
            .unwrap()
            .chunks
            .entry(scope)
            .or_default()
            .push(chunk);
    }

    /// Add a KB image to a scope.
    pub fn put_kb_image(&self, scope: KbScope, image: KbImageRecord) {
        self.inner
            .write()
            .unwrap()
            .images
            .entry(scope)
            .or_default()
            .push(image);
    }

    /// Set the full ordered segment script for a unit.
    pub fn put_segments(&self, unit_id: Uuid, segments: Vec<String>) {
        self.inner.write().unwrap().segments.insert(unit_id, segments);
    }

    /// When audio was last synthesized for a unit, if ever.
    pub fn last_synthesis(&self, unit_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .unwrap()
            .synthesized_at
            .get(&unit_id)
            .copied()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn search_chunks(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkHit>> {
        let inner = self.inner.read().unwrap();

        let mut hits: Vec<ChunkHit> = inner
            .chunks
            .get(&scope)
            .map(|chunks| {
                chunks
                    .iter()
                    .map(|c| ChunkHit {
                        content: c.content.clone(),
                        similarity: cosine_similarity(query_embedding, &c.embedding),
                        source_label: c.source_label.clone(),
                    })
                    .filter(|h| h.similarity >= threshold)
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn search_kb_images(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ImageHit>> {
        let inner = self.inner.read().unwrap();

        let mut hits: Vec<ImageHit> = inner
            .images
            .get(&scope)
            .map(|images| {
                images
                    .iter()
                    .filter_map(|img| {
                        let embedding = img.embedding.as_ref()?;
                        let similarity = cosine_similarity(query_embedding, embedding);
                        (similarity >= threshold).then(|| ImageHit {
                            image: img.clone(),
                            similarity,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn slides_for_deck(&self, deck_id: Uuid) -> Result<Vec<SlideRecord>> {
        let inner = self.inner.read().unwrap();
        let mut slides: Vec<SlideRecord> = inner
            .slides
            .iter()
            .filter(|s| s.deck_id == deck_id)
            .cloned()
            .collect();
        slides.sort_by_key(|s| s.slide_index);
        Ok(slides)
    }

    async fn content(&self, content_id: Uuid) -> Result<Option<ContentRecord>> {
        Ok(self.inner.read().unwrap().contents.get(&content_id).cloned())
    }

    async fn presenter(&self, presenter_id: Uuid) -> Result<Option<PresenterRecord>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .presenters
            .get(&presenter_id)
            .cloned())
    }

    async fn segment_text(&self, unit_id: Uuid, segment_index: usize) -> Result<Option<String>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .segments
            .get(&unit_id)
            .and_then(|segments| segments.get(segment_index))
            .cloned())
    }

    async fn record_synthesis(&self, unit_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .synthesized_at
            .insert(unit_id, at);
        Ok(())
    }
}
