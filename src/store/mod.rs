//! Knowledge store abstraction.
//!
//! The live Q&A core reads script segments, slides, knowledge-base chunks and
//! knowledge-base images through this trait; document ingestion and schema
//! management live elsewhere and only this read surface (plus one bookkeeping
//! write) is modeled here.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, StoredChunk};
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a knowledge-base scope to search within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KbScope {
    /// A content item's own knowledge base.
    Content(Uuid),
    /// A presenter's personal knowledge base.
    Presenter(Uuid),
}

/// A piece of narrated content (podcast or slide-backed presentation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub title: String,
    pub presenter_id: Option<Uuid>,
    pub slide_deck_id: Option<Uuid>,
}

/// A presenter persona with an optional assigned voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterRecord {
    pub id: Uuid,
    pub name: String,
    pub bio: Option<String>,
    pub traits: Vec<String>,
    pub voice: Option<VoiceRecord>,
}

/// A synthesizable voice, owned by one TTS vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceRecord {
    pub id: Uuid,
    pub name: String,
    /// Provider key understood by the TTS registry ("neuphonic", "elevenlabs").
    pub provider: String,
    /// The provider's own voice identifier.
    pub provider_voice_id: String,
}

/// One slide in a deck, with metadata used for semantic matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideRecord {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub slide_index: usize,
    pub title: Option<String>,
    pub image_path: String,
    pub thumbnail_path: Option<String>,
    pub keywords: Vec<String>,
    /// Absent until the ingestion pipeline has embedded the slide.
    pub embedding: Option<Vec<f32>>,
}

/// A knowledge-base image with associated text for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbImageRecord {
    pub id: Uuid,
    pub filename: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub associated_text: String,
    pub image_path: String,
    pub thumbnail_path: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

impl KbImageRecord {
    /// Display label for citations: title if present, else filename.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.filename)
    }
}

/// A knowledge-base text chunk scored against a query.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub content: String,
    pub similarity: f32,
    /// Originating document title or filename.
    pub source_label: String,
}

/// A knowledge-base image scored against a query.
#[derive(Debug, Clone)]
pub struct ImageHit {
    pub image: KbImageRecord,
    pub similarity: f32,
}

/// Read surface of the persistence layer consumed by the live Q&A core.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Similarity-search text chunks within one scope.
    ///
    /// Results are ordered by descending similarity, at most `top_k`, all at or
    /// above `threshold`.
    async fn search_chunks(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkHit>>;

    /// Similarity-search KB images within one scope by their associated-text
    /// embeddings. Images without a stored embedding are skipped.
    async fn search_kb_images(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ImageHit>>;

    /// All slides of a deck, ordered by slide index.
    async fn slides_for_deck(&self, deck_id: Uuid) -> Result<Vec<SlideRecord>>;

    /// Look up a content record.
    async fn content(&self, content_id: Uuid) -> Result<Option<ContentRecord>>;

    /// Look up a presenter (with its voice, if assigned).
    async fn presenter(&self, presenter_id: Uuid) -> Result<Option<PresenterRecord>>;

    /// Text of one script segment of a playback unit, if it exists.
    async fn segment_text(&self, unit_id: Uuid, segment_index: usize) -> Result<Option<String>>;

    /// Record that Q&A audio was synthesized for a unit. Best-effort
    /// bookkeeping; live positioning never depends on it.
    async fn record_synthesis(&self, unit_id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = vec![0.3, -0.2, 0.9];
        let b = vec![0.1, 0.8, 0.4];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        let zero = vec![0.0, 0.0, 0.0];
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_kb_image_label() {
        let mut img = KbImageRecord {
            id: Uuid::new_v4(),
            filename: "diagram.png".to_string(),
            title: None,
            description: None,
            associated_text: String::new(),
            image_path: "kb/diagram.png".to_string(),
            thumbnail_path: None,
            embedding: None,
        };
        assert_eq!(img.label(), "diagram.png");

        img.title = Some("Architecture diagram".to_string());
        assert_eq!(img.label(), "Architecture diagram");
    }
}
