//! Visual selection for Q&A answers.
//!
//! Given a question and its generated answer, picks at most one visual to show
//! alongside the spoken answer: a slide from the session's deck, or a
//! knowledge-base image from the presenter's or content's KB. The three scope
//! searches run concurrently; slide scoring gets a locality boost (slides near
//! the one on screen) and a keyword boost (slide tags appearing in the
//! question). Nothing below the confidence threshold is ever shown.

use crate::embedding::Embedder;
use crate::error::Result;
use crate::store::{cosine_similarity, KbScope, KnowledgeStore, SlideRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Multiplier applied when a slide sits within [`LOCALITY_WINDOW`] slides of
/// the one currently on screen.
const LOCALITY_BOOST: f32 = 1.05;

/// How far (in slide positions) the locality boost reaches.
const LOCALITY_WINDOW: usize = 2;

/// Per-matching-keyword boost increment.
const KEYWORD_BOOST_STEP: f32 = 0.1;

/// Kind of visual selected for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualType {
    Slide,
    KbImage,
}

/// Which collection the visual came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualSource {
    Deck,
    PresenterKb,
    ContentKb,
}

/// A selected visual with its display metadata. Ephemeral.
#[derive(Debug, Clone)]
pub struct SelectedVisual {
    pub visual_type: VisualType,
    pub visual_id: Uuid,
    pub visual_path: String,
    pub thumbnail_path: Option<String>,
    pub confidence: f32,
    pub reason: String,
    pub source: VisualSource,
    /// Only meaningful for slides.
    pub slide_index: Option<usize>,
}

impl SelectedVisual {
    /// Whether this visual should actually be put on screen.
    ///
    /// A slide already showing is not re-displayed; KB images are never
    /// "already shown" and always display.
    pub fn should_display(&self, current_slide_index: usize) -> bool {
        match self.visual_type {
            VisualType::Slide => self.slide_index != Some(current_slide_index),
            VisualType::KbImage => true,
        }
    }
}

/// The scopes a selection may draw candidates from. Absent scopes are simply
/// not searched (a session without a slide deck skips the deck branch).
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualScopes {
    pub slide_deck: Option<Uuid>,
    pub presenter_kb: Option<Uuid>,
    pub content_kb: Option<Uuid>,
}

/// Embedding-driven visual selector.
pub struct VisualSelector {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    confidence_threshold: f32,
}

impl VisualSelector {
    /// Create a selector with the default 0.65 confidence threshold.
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            confidence_threshold: 0.65,
        }
    }

    /// Set the confidence threshold below which no visual is returned.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Select the best visual for a question/answer pair, or none.
    #[instrument(skip_all, fields(current_slide = current_slide_index))]
    pub async fn select(
        &self,
        question: &str,
        answer: &str,
        scopes: VisualScopes,
        current_slide_index: usize,
    ) -> Result<Option<SelectedVisual>> {
        let query_text = format!("Question: {}\nContext: {}", question, answer);
        let query_embedding = self.embedder.embed(&query_text).await?;

        // Gather-all across the available scopes.
        let (slide, presenter_image, content_image) = tokio::join!(
            self.best_slide(scopes.slide_deck, &query_embedding, question, current_slide_index),
            self.best_kb_image(
                scopes.presenter_kb.map(KbScope::Presenter),
                &query_embedding,
                VisualSource::PresenterKb,
            ),
            self.best_kb_image(
                scopes.content_kb.map(KbScope::Content),
                &query_embedding,
                VisualSource::ContentKb,
            ),
        );

        let best = [slide?, presenter_image?, content_image?]
            .into_iter()
            .flatten()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        match best {
            Some(visual) if visual.confidence >= self.confidence_threshold => {
                debug!(
                    confidence = visual.confidence,
                    "Selected visual: {}", visual.reason
                );
                Ok(Some(visual))
            }
            _ => Ok(None),
        }
    }

    /// Best slide in the deck by boosted similarity, if a deck is available.
    async fn best_slide(
        &self,
        deck_id: Option<Uuid>,
        query_embedding: &[f32],
        question: &str,
        current_slide_index: usize,
    ) -> Result<Option<SelectedVisual>> {
        let Some(deck_id) = deck_id else {
            return Ok(None);
        };

        let slides = self.store.slides_for_deck(deck_id).await?;
        let question_lower = question.to_lowercase();

        let mut best: Option<(f32, &SlideRecord)> = None;
        for slide in &slides {
            let Some(embedding) = slide.embedding.as_ref().filter(|e| !e.is_empty()) else {
                continue;
            };

            let mut score = cosine_similarity(query_embedding, embedding);
            if slide.slide_index.abs_diff(current_slide_index) <= LOCALITY_WINDOW {
                score *= LOCALITY_BOOST;
            }
            let matching = matching_keywords(slide, &question_lower);
            if matching > 0 {
                score *= 1.0 + KEYWORD_BOOST_STEP * matching as f32;
            }

            if best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, slide));
            }
        }

        Ok(best.map(|(score, slide)| SelectedVisual {
            visual_type: VisualType::Slide,
            visual_id: slide.id,
            visual_path: slide.image_path.clone(),
            thumbnail_path: slide.thumbnail_path.clone(),
            confidence: score,
            reason: slide_reason(slide, &question_lower),
            source: VisualSource::Deck,
            slide_index: Some(slide.slide_index),
        }))
    }

    /// Best KB image in a scope by similarity, if the scope is available.
    async fn best_kb_image(
        &self,
        scope: Option<KbScope>,
        query_embedding: &[f32],
        source: VisualSource,
    ) -> Result<Option<SelectedVisual>> {
        let Some(scope) = scope else {
            return Ok(None);
        };

        let hits = self
            .store
            .search_kb_images(scope, query_embedding, 1, 0.0)
            .await?;

        Ok(hits.into_iter().next().map(|hit| SelectedVisual {
            visual_type: VisualType::KbImage,
            visual_id: hit.image.id,
            visual_path: hit.image.image_path.clone(),
            thumbnail_path: hit.image.thumbnail_path.clone(),
            confidence: hit.similarity,
            reason: format!("Matches knowledge-base image '{}'", hit.image.label()),
            source,
            slide_index: None,
        }))
    }
}

/// Count slide keywords appearing as substrings of the lowercased question.
fn matching_keywords(slide: &SlideRecord, question_lower: &str) -> usize {
    slide
        .keywords
        .iter()
        .filter(|kw| question_lower.contains(&kw.to_lowercase()))
        .count()
}

/// Human-readable reason for a slide selection.
fn slide_reason(slide: &SlideRecord, question_lower: &str) -> String {
    let mut parts = Vec::new();

    if let Some(title) = &slide.title {
        parts.push(format!("Related to '{}'", title));
    }

    let matching: Vec<&String> = slide
        .keywords
        .iter()
        .filter(|kw| question_lower.contains(&kw.to_lowercase()))
        .collect();
    if !matching.is_empty() {
        let shown: Vec<&str> = matching.iter().take(2).map(|s| s.as_str()).collect();
        parts.push(format!("Keywords: {}", shown.join(", ")));
    }

    if parts.is_empty() {
        parts.push("High semantic similarity".to_string());
    }

    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KbImageRecord, MemoryStore};
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    /// Embedding whose cosine similarity against the query [1, 0] is `sim`.
    fn at_similarity(sim: f32) -> Vec<f32> {
        let angle = sim.clamp(-1.0, 1.0).acos();
        vec![angle.cos(), angle.sin()]
    }

    fn slide(deck: Uuid, index: usize, keywords: &[&str], sim: f32) -> SlideRecord {
        SlideRecord {
            id: Uuid::new_v4(),
            deck_id: deck,
            slide_index: index,
            title: Some(format!("Slide {}", index)),
            image_path: format!("decks/{}/{}.png", deck, index),
            thumbnail_path: None,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            embedding: Some(at_similarity(sim)),
        }
    }

    fn selector(store: Arc<MemoryStore>) -> VisualSelector {
        VisualSelector::new(store, Arc::new(FixedEmbedder(vec![1.0, 0.0])))
    }

    #[tokio::test]
    async fn test_locality_boost_alone_stays_below_threshold() {
        // Current slide 3; candidate at index 2 scores 0.60 pre-boost.
        // Locality boost -> 0.63, still under 0.65: no selection.
        let store = Arc::new(MemoryStore::new());
        let deck = Uuid::new_v4();
        store.put_slide(slide(deck, 2, &[], 0.60));

        let result = selector(store)
            .select(
                "what about the budget",
                "",
                VisualScopes {
                    slide_deck: Some(deck),
                    ..Default::default()
                },
                3,
            )
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_keyword_boost_pushes_over_threshold() {
        // Same as above but one keyword matches: 0.60 * 1.05 * 1.1 = 0.693.
        let store = Arc::new(MemoryStore::new());
        let deck = Uuid::new_v4();
        store.put_slide(slide(deck, 2, &["budget"], 0.60));

        let result = selector(store)
            .select(
                "what about the budget",
                "",
                VisualScopes {
                    slide_deck: Some(deck),
                    ..Default::default()
                },
                3,
            )
            .await
            .unwrap()
            .expect("slide should be selected");

        assert_eq!(result.visual_type, VisualType::Slide);
        assert_eq!(result.slide_index, Some(2));
        assert!(result.confidence > 0.65);
        assert!(result.reason.contains("budget"));
    }

    #[tokio::test]
    async fn test_threshold_gates_selection() {
        let deck = Uuid::new_v4();
        let scopes = VisualScopes {
            slide_deck: Some(deck),
            ..Default::default()
        };

        // Just above the threshold, far from the current slide, no keywords.
        let store = Arc::new(MemoryStore::new());
        store.put_slide(slide(deck, 9, &[], 0.71));
        let selected = selector(store)
            .with_confidence_threshold(0.70)
            .select("question", "answer", scopes, 0)
            .await
            .unwrap();
        assert!(selected.is_some());

        // Just below.
        let store = Arc::new(MemoryStore::new());
        store.put_slide(slide(deck, 9, &[], 0.69));
        let selected = selector(store)
            .with_confidence_threshold(0.70)
            .select("question", "answer", scopes, 0)
            .await
            .unwrap();
        assert!(selected.is_none());
    }

    #[tokio::test]
    async fn test_slides_without_embedding_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let deck = Uuid::new_v4();
        let mut bare = slide(deck, 0, &[], 0.99);
        bare.embedding = None;
        store.put_slide(bare);

        let result = selector(store)
            .select(
                "q",
                "a",
                VisualScopes {
                    slide_deck: Some(deck),
                    ..Default::default()
                },
                0,
            )
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_kb_image_wins_over_weaker_slide() {
        let store = Arc::new(MemoryStore::new());
        let deck = Uuid::new_v4();
        let presenter = Uuid::new_v4();

        store.put_slide(slide(deck, 7, &[], 0.70));
        store.put_kb_image(
            KbScope::Presenter(presenter),
            KbImageRecord {
                id: Uuid::new_v4(),
                filename: "chart.png".to_string(),
                title: Some("Growth chart".to_string()),
                description: None,
                associated_text: "Quarterly growth chart".to_string(),
                image_path: "kb/chart.png".to_string(),
                thumbnail_path: None,
                embedding: Some(at_similarity(0.9)),
            },
        );

        let result = selector(store)
            .select(
                "how fast did it grow",
                "about twelve percent",
                VisualScopes {
                    slide_deck: Some(deck),
                    presenter_kb: Some(presenter),
                    content_kb: None,
                },
                0,
            )
            .await
            .unwrap()
            .expect("image should be selected");

        assert_eq!(result.visual_type, VisualType::KbImage);
        assert_eq!(result.source, VisualSource::PresenterKb);
        assert!(result.slide_index.is_none());
        assert!(result.reason.contains("Growth chart"));
    }

    #[tokio::test]
    async fn test_missing_scopes_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let result = selector(store)
            .select("q", "a", VisualScopes::default(), 0)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_should_display_rules() {
        let visual = SelectedVisual {
            visual_type: VisualType::Slide,
            visual_id: Uuid::new_v4(),
            visual_path: "deck/4.png".to_string(),
            thumbnail_path: None,
            confidence: 0.8,
            reason: String::new(),
            source: VisualSource::Deck,
            slide_index: Some(4),
        };
        assert!(!visual.should_display(4));
        assert!(visual.should_display(3));

        let image = SelectedVisual {
            visual_type: VisualType::KbImage,
            visual_id: Uuid::new_v4(),
            visual_path: "kb/img.png".to_string(),
            thumbnail_path: None,
            confidence: 0.8,
            reason: String::new(),
            source: VisualSource::ContentKb,
            slide_index: None,
        };
        assert!(image.should_display(0));
    }
}
