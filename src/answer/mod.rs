//! Answer generation for live Q&A.
//!
//! Turns a listener question plus retrieved context into a short spoken-style
//! answer. When retrieval found nothing, a fixed fallback is returned and the
//! language model is never called.

use crate::error::Result;
use crate::llm::TextGenerator;
use crate::retrieval::{RetrievalContext, SourceScope};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Returned verbatim when no relevant context was retrieved.
const NO_CONTEXT_FALLBACK: &str = "I don't have enough information in my knowledge base to \
     answer that question accurately. Let's continue with the presentation.";

/// A generated answer with its citations and a confidence score.
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    /// Source labels in retrieval rank order, deduplicated.
    pub sources: Vec<String>,
    /// Mean retrieval similarity of the context chunks, in [0, 1].
    pub confidence: f32,
}

/// Presenter persona the answer should be voiced as.
#[derive(Debug, Clone)]
pub struct Persona {
    pub name: String,
    pub bio: Option<String>,
    pub traits: Vec<String>,
}

/// Generates listener-facing answers from retrieved context.
pub struct AnswerGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Answer a question from the retrieved context.
    ///
    /// `current_topic` is the script segment that was playing when the
    /// listener interrupted, used to anchor the answer to the discussion.
    #[instrument(skip_all, fields(question_len = question.len()))]
    pub async fn answer(
        &self,
        question: &str,
        context: &RetrievalContext,
        persona: Option<&Persona>,
        listener_name: Option<&str>,
        current_topic: &str,
    ) -> Result<GeneratedAnswer> {
        if context.is_empty() {
            debug!("No context retrieved, returning fallback answer");
            return Ok(GeneratedAnswer {
                text: NO_CONTEXT_FALLBACK.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
            });
        }

        let system_prompt = match persona {
            Some(persona) => persona_system_prompt(persona, listener_name),
            None => narrator_system_prompt(),
        };
        let user_prompt = user_prompt(question, context, current_topic);

        let text = self.generator.generate(&system_prompt, &user_prompt).await?;

        let mean: f32 = context
            .chunks
            .iter()
            .map(|c| c.similarity)
            .sum::<f32>()
            / context.chunks.len() as f32;

        Ok(GeneratedAnswer {
            text,
            sources: cited_sources(context, persona),
            confidence: mean.clamp(0.0, 1.0),
        })
    }
}

fn narrator_system_prompt() -> String {
    "You are answering a listener's question during an audio presentation. \
     Answer conversationally in 2-4 sentences, as if speaking aloud. \
     Base your answer only on the provided context. If the context does not \
     fully cover the question, say what you can and acknowledge the gap. \
     Do not use markdown, lists, or headings."
        .to_string()
}

fn persona_system_prompt(persona: &Persona, listener_name: Option<&str>) -> String {
    let mut prompt = format!(
        "You are {}, presenting live. A listener has interrupted with a question.",
        persona.name
    );
    if let Some(bio) = &persona.bio {
        prompt.push_str(&format!(" About you: {}", bio));
    }
    if !persona.traits.is_empty() {
        prompt.push_str(&format!(
            " Your speaking style: {}.",
            persona.traits.join(", ")
        ));
    }
    prompt.push_str(
        " Stay fully in character. Answer conversationally in 2-4 sentences, \
         as if speaking aloud, based only on the provided context. \
         Do not use markdown, lists, or headings.",
    );
    if let Some(name) = listener_name {
        prompt.push_str(&format!(
            " The listener's name is {}. You may address them by name at most \
             once, and only if it feels natural.",
            name
        ));
    }
    prompt
}

fn user_prompt(question: &str, context: &RetrievalContext, current_topic: &str) -> String {
    let mut prompt = String::new();
    if !current_topic.is_empty() {
        prompt.push_str(&format!(
            "You were just discussing:\n{}\n\n",
            current_topic
        ));
    }
    prompt.push_str(&format!(
        "Context from the knowledge base:\n{}\n\nListener question: {}",
        context.combined_context, question
    ));
    prompt
}

/// Citation labels in rank order. Presenter-scope sources carry the persona
/// name so a reader can tell whose knowledge base answered.
fn cited_sources(context: &RetrievalContext, persona: Option<&Persona>) -> Vec<String> {
    let mut sources = Vec::new();
    for chunk in &context.chunks {
        let label = match (&chunk.source_scope, persona) {
            (SourceScope::Presenter | SourceScope::PresenterImage, Some(persona)) => {
                format!("{}: {}", persona.name, chunk.source_label)
            }
            _ => chunk.source_label.clone(),
        };
        if !sources.contains(&label) {
            sources.push(label);
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievedChunk;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockGenerator {
        response: String,
        calls: AtomicUsize,
    }

    impl MockGenerator {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for MockGenerator {
        async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn chunk(label: &str, scope: SourceScope, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            content: format!("content from {}", label),
            similarity,
            source_label: label.to_string(),
            source_scope: scope,
        }
    }

    fn context(chunks: Vec<RetrievedChunk>) -> RetrievalContext {
        let combined = chunks
            .iter()
            .map(|c| c.content.clone())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        RetrievalContext {
            chunks,
            combined_context: combined,
            sources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_context_returns_fallback_without_model_call() {
        let generator = Arc::new(MockGenerator::new("should not be used"));
        let answerer = AnswerGenerator::new(generator.clone());

        let answer = answerer
            .answer("what is this?", &context(Vec::new()), None, None, "")
            .await
            .unwrap();

        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
        assert!(answer.text.contains("don't have enough information"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_confidence_is_mean_similarity() {
        let generator = Arc::new(MockGenerator::new("an answer"));
        let answerer = AnswerGenerator::new(generator);

        let ctx = context(vec![
            chunk("a.pdf", SourceScope::Content, 0.8),
            chunk("b.pdf", SourceScope::Content, 0.4),
        ]);
        let answer = answerer
            .answer("question", &ctx, None, None, "the topic")
            .await
            .unwrap();

        assert_eq!(answer.text, "an answer");
        assert!((answer.confidence - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_persona_sources_are_prefixed_and_deduped() {
        let generator = Arc::new(MockGenerator::new("in character"));
        let answerer = AnswerGenerator::new(generator);
        let persona = Persona {
            name: "Dr. Chen".to_string(),
            bio: Some("A materials scientist.".to_string()),
            traits: vec!["dry humor".to_string()],
        };

        let ctx = context(vec![
            chunk("notes.md", SourceScope::Presenter, 0.9),
            chunk("paper.pdf", SourceScope::Content, 0.7),
            chunk("notes.md", SourceScope::Presenter, 0.6),
        ]);
        let answer = answerer
            .answer("question", &ctx, Some(&persona), Some("Sam"), "")
            .await
            .unwrap();

        assert_eq!(
            answer.sources,
            vec!["Dr. Chen: notes.md".to_string(), "paper.pdf".to_string()]
        );
    }
}
