//! The interruption orchestrator.
//!
//! Drives one listener question through the full staged sequence: echo the
//! question, play an acknowledgment, retrieve context, generate the answer,
//! pick a visual, synthesize and ship the answer audio, clear the visual,
//! bridge back, and release the interruption. Any failure mid-sequence sends
//! an error frame and clears the interrupted flag so the client can resume.

use crate::answer::{AnswerGenerator, GeneratedAnswer, Persona};
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, SvarError};
use crate::live::protocol::{ClientMessage, ServerMessage};
use crate::llm::{OpenAiGenerator, TextGenerator};
use crate::phrases;
use crate::retrieval::{RetrievalService, ScopeDescriptor};
use crate::session::{ConnectionRegistry, ConnectionState};
use crate::storage::{BucketRelative, ObjectStore};
use crate::store::{KnowledgeStore, PresenterRecord, SqliteStore, VoiceRecord};
use crate::tts::{normalize_text, wav::chunk_wav, AudioFormat, TtsRegistry};
use crate::visual::{SelectedVisual, VisualScopes, VisualSelector};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Orchestrates live Q&A over registered connections.
pub struct Orchestrator {
    settings: Settings,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn KnowledgeStore>,
    retrieval: RetrievalService,
    answerer: AnswerGenerator,
    text_generator: Arc<dyn TextGenerator>,
    visual_selector: VisualSelector,
    tts: TtsRegistry,
    objects: Arc<dyn ObjectStore>,
}

impl Orchestrator {
    /// Build an orchestrator with the production component stack.
    pub fn new(settings: Settings, registry: Arc<ConnectionRegistry>) -> Result<Self> {
        let store: Arc<dyn KnowledgeStore> = Arc::new(SqliteStore::new(&settings.sqlite_path())?);
        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        ));
        let text_generator: Arc<dyn TextGenerator> = Arc::new(OpenAiGenerator::new(
            &settings.qa.answer_model,
            settings.qa.max_answer_tokens,
        ));
        let tts = TtsRegistry::from_settings(&settings);
        let objects: Arc<dyn ObjectStore> =
            Arc::new(BucketRelative::new(settings.store.assets_bucket.clone()));

        Ok(Self::with_components(
            settings,
            registry,
            store,
            embedder,
            text_generator,
            tts,
            objects,
        ))
    }

    /// Build an orchestrator from explicit collaborators.
    pub fn with_components(
        settings: Settings,
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        text_generator: Arc<dyn TextGenerator>,
        tts: TtsRegistry,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        let retrieval = RetrievalService::new(Arc::clone(&store), Arc::clone(&embedder))
            .with_top_k(settings.retrieval.top_k)
            .with_image_top_k(settings.retrieval.image_top_k)
            .with_similarity_threshold(settings.retrieval.similarity_threshold);
        let visual_selector = VisualSelector::new(Arc::clone(&store), Arc::clone(&embedder))
            .with_confidence_threshold(settings.qa.visual_confidence_threshold);
        let answerer = AnswerGenerator::new(Arc::clone(&text_generator));

        Self {
            settings,
            registry,
            store,
            retrieval,
            answerer,
            text_generator,
            visual_selector,
            tts,
            objects,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    /// Dispatch one client frame.
    #[instrument(skip(self, message))]
    pub async fn handle_message(&self, connection_id: &str, message: ClientMessage) {
        match message {
            ClientMessage::SegmentUpdate { segment_index } => {
                self.registry.update_segment(connection_id, segment_index);
            }
            ClientMessage::SlideUpdate { slide_index } => {
                self.registry.update_slide(connection_id, slide_index);
            }
            ClientMessage::StartInterruption => {
                self.registry.set_interrupted(connection_id, true, true);
                self.registry
                    .send(
                        connection_id,
                        &ServerMessage::InterruptionStarted {
                            status: "listening".to_string(),
                        },
                    )
                    .await;
            }
            ClientMessage::Question { question } => {
                self.handle_question(connection_id, &question).await;
            }
            ClientMessage::CancelInterruption => {
                self.registry.set_interrupted(connection_id, false, true);
                self.registry
                    .send(connection_id, &ServerMessage::InterruptionCancelled)
                    .await;
            }
            ClientMessage::Ping => {
                self.registry
                    .send(connection_id, &ServerMessage::Pong)
                    .await;
            }
        }
    }

    /// Run the question sequence; on failure send an error frame and release
    /// the interruption so playback can resume.
    pub async fn handle_question(&self, connection_id: &str, question: &str) {
        let question = question.trim();
        if question.is_empty() {
            self.registry
                .send(
                    connection_id,
                    &ServerMessage::Error {
                        error: "Question cannot be empty".to_string(),
                    },
                )
                .await;
            return;
        }

        if let Err(e) = self.answer_question(connection_id, question).await {
            error!(connection_id, error = %e, "Question handling failed");
            self.registry
                .send(
                    connection_id,
                    &ServerMessage::Error {
                        error: format!("Failed to process question: {}", e),
                    },
                )
                .await;
            self.registry.set_interrupted(connection_id, false, true);
        }
    }

    async fn answer_question(&self, connection_id: &str, question: &str) -> Result<()> {
        let state = self
            .registry
            .get(connection_id)
            .ok_or_else(|| SvarError::SessionNotFound(connection_id.to_string()))?;

        self.registry
            .send(
                connection_id,
                &ServerMessage::QuestionReceived {
                    question: question.to_string(),
                },
            )
            .await;

        let content = self.store.content(state.content_id).await?;
        let presenter = match content.as_ref().and_then(|c| c.presenter_id) {
            Some(presenter_id) => self.store.presenter(presenter_id).await?,
            None => None,
        };
        let voice = presenter.as_ref().and_then(|p| p.voice.clone());

        // The acknowledgment buys time; its failure never blocks the answer.
        if let Some(voice) = &voice {
            self.send_acknowledgment(connection_id, &state, voice).await;
        }

        let current_topic = self
            .store
            .segment_text(state.unit_id, state.current_segment_index)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let context = self
            .retrieval
            .retrieve(
                question,
                ScopeDescriptor {
                    content: content.as_ref().map(|c| c.id),
                    presenter: presenter.as_ref().map(|p| p.id),
                    include_images: true,
                },
            )
            .await?;

        let persona = presenter.as_ref().map(|p| Persona {
            name: p.name.clone(),
            bio: p.bio.clone(),
            traits: p.traits.clone(),
        });
        let answer = self
            .answerer
            .answer(
                question,
                &context,
                persona.as_ref(),
                state.listener.name.as_deref(),
                &current_topic,
            )
            .await?;

        let visual = self
            .select_visual(question, &answer, &state, content.as_ref().map(|c| c.id), &presenter)
            .await?;
        let shown = visual.filter(|v| v.should_display(state.current_slide_index));
        if let Some(visual) = &shown {
            self.registry
                .send(
                    connection_id,
                    &ServerMessage::QaVisualSelect {
                        visual_type: visual.visual_type,
                        visual_id: visual.visual_id,
                        visual_path: self.objects.resolve(&visual.visual_path),
                        thumbnail_path: visual
                            .thumbnail_path
                            .as_deref()
                            .map(|p| self.objects.resolve(p)),
                        source: visual.source,
                        slide_index: visual.slide_index,
                        reason: visual.reason.clone(),
                        confidence: visual.confidence,
                    },
                )
                .await;
        }

        self.registry
            .send(
                connection_id,
                &ServerMessage::AnswerText {
                    text: answer.text.clone(),
                    sources: answer.sources.clone(),
                    confidence: answer.confidence,
                },
            )
            .await;

        if let Some(voice) = &voice {
            self.send_answer_audio(connection_id, &answer.text, voice)
                .await?;
        }

        if shown.is_some() {
            // Re-read state: the client may have reported slide updates while
            // the visual was up.
            let return_to = self
                .registry
                .get(connection_id)
                .map(|s| s.interrupted_slide_index.unwrap_or(s.current_slide_index))
                .unwrap_or(state.current_slide_index);
            self.registry
                .send(
                    connection_id,
                    &ServerMessage::QaVisualClear {
                        return_to_slide_index: return_to,
                    },
                )
                .await;
        }

        self.send_bridge(connection_id, &state, question, &answer, &voice, &presenter)
            .await?;

        let resume_slide_index = self
            .registry
            .get(connection_id)
            .map(|s| s.interrupted_slide_index.unwrap_or(s.current_slide_index))
            .unwrap_or(state.current_slide_index);
        self.registry
            .send(
                connection_id,
                &ServerMessage::ReadyToResume { resume_slide_index },
            )
            .await;

        self.registry.set_interrupted(connection_id, false, true);

        if voice.is_some() {
            if let Err(e) = self.store.record_synthesis(state.unit_id, Utc::now()).await {
                warn!(error = %e, "Failed to record synthesis timestamp");
            }
        }

        Ok(())
    }

    /// Synthesize and send the acknowledgment phrase. Best effort.
    async fn send_acknowledgment(
        &self,
        connection_id: &str,
        state: &ConnectionState,
        voice: &VoiceRecord,
    ) {
        let text = phrases::acknowledgment(state.listener.name.as_deref());
        match self.synthesize(&text, voice).await {
            Ok((audio, format)) => {
                self.registry
                    .send(
                        connection_id,
                        &ServerMessage::AcknowledgmentAudio {
                            text,
                            audio: BASE64.encode(&audio),
                            format,
                        },
                    )
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Acknowledgment synthesis failed, skipping");
            }
        }
    }

    /// Pick a visual for the answer.
    async fn select_visual(
        &self,
        question: &str,
        answer: &GeneratedAnswer,
        state: &ConnectionState,
        content_id: Option<uuid::Uuid>,
        presenter: &Option<PresenterRecord>,
    ) -> Result<Option<SelectedVisual>> {
        let scopes = VisualScopes {
            slide_deck: state.slide_deck_id,
            presenter_kb: presenter.as_ref().map(|p| p.id),
            content_kb: content_id,
        };
        self.visual_selector
            .select(question, &answer.text, scopes, state.current_slide_index)
            .await
    }

    /// Synthesize the answer and send it, chunked when a WAV payload exceeds
    /// the configured size.
    async fn send_answer_audio(
        &self,
        connection_id: &str,
        text: &str,
        voice: &VoiceRecord,
    ) -> Result<()> {
        self.registry
            .send(connection_id, &ServerMessage::SynthesizingAudio)
            .await;

        let (audio, format) = self.synthesize(text, voice).await?;

        if format == AudioFormat::Wav && audio.len() > self.settings.qa.audio_chunk_bytes {
            let chunks = chunk_wav(&audio, self.settings.qa.audio_chunk_bytes);
            let total_chunks = chunks.len();
            debug!(total_chunks, "Sending chunked answer audio");
            for (chunk_index, chunk) in chunks.iter().enumerate() {
                self.registry
                    .send(
                        connection_id,
                        &ServerMessage::AnswerAudio {
                            audio: BASE64.encode(chunk),
                            format,
                            chunk_index: Some(chunk_index),
                            total_chunks: Some(total_chunks),
                        },
                    )
                    .await;
            }
        } else {
            self.registry
                .send(
                    connection_id,
                    &ServerMessage::AnswerAudio {
                        audio: BASE64.encode(&audio),
                        format,
                        chunk_index: None,
                        total_chunks: None,
                    },
                )
                .await;
        }

        Ok(())
    }

    /// Send the bridge phrase, if there is upcoming material to bridge into.
    async fn send_bridge(
        &self,
        connection_id: &str,
        state: &ConnectionState,
        question: &str,
        answer: &GeneratedAnswer,
        voice: &Option<VoiceRecord>,
        presenter: &Option<PresenterRecord>,
    ) -> Result<()> {
        let Some(voice) = voice else {
            return Ok(());
        };
        let next_segment = self
            .store
            .segment_text(state.unit_id, state.current_segment_index + 1)
            .await?;
        let Some(next_segment) = next_segment else {
            return Ok(());
        };

        let text = if self.settings.qa.generative_bridges {
            phrases::generative_bridge(
                self.text_generator.as_ref(),
                question,
                &answer.text,
                &next_segment,
                presenter.as_ref().map(|p| p.name.as_str()),
            )
            .await?
        } else {
            phrases::bridge()
        };

        let (audio, format) = self.synthesize(&text, voice).await?;
        self.registry
            .send(
                connection_id,
                &ServerMessage::BridgeAudio {
                    text,
                    audio: BASE64.encode(&audio),
                    format,
                },
            )
            .await;
        Ok(())
    }

    /// Synthesize text with a voice, in the format its provider does best.
    async fn synthesize(&self, text: &str, voice: &VoiceRecord) -> Result<(Vec<u8>, AudioFormat)> {
        let provider = self.tts.get(&voice.provider)?;
        let format = if voice.provider == "elevenlabs" {
            AudioFormat::Mp3
        } else {
            AudioFormat::Wav
        };
        let audio = provider
            .synthesize(&normalize_text(text), &voice.provider_voice_id, 1.0, format)
            .await?;
        Ok((audio, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ListenerIdentity, MessageSink};
    use crate::store::{
        ChunkHit, ContentRecord, ImageHit, KbScope, MemoryStore, SlideRecord, StoredChunk,
    };
    use crate::tts::wav::{write_wav, WavSpec};
    use crate::tts::TtsProvider;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct RecordingSink {
        frames: Mutex<Vec<Value>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
            })
        }

        fn types(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| f["type"].as_str().unwrap_or_default().to_string())
                .collect()
        }

        fn frames(&self) -> Vec<Value> {
            self.frames.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, payload: String) -> Result<()> {
            let value: Value = serde_json::from_str(&payload).unwrap();
            self.frames.lock().unwrap().push(value);
            Ok(())
        }
    }

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

    struct CannedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            Err(SvarError::Generation("model unavailable".to_string()))
        }
    }

    /// Produces a WAV of a fixed PCM size regardless of the input text.
    struct StubTts {
        pcm_bytes: usize,
    }

    #[async_trait]
    impl TtsProvider for StubTts {
        fn provider_name(&self) -> &'static str {
            "neuphonic"
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
            _speed: f32,
            _format: AudioFormat,
        ) -> Result<Vec<u8>> {
            Ok(write_wav(
                WavSpec {
                    channels: 1,
                    bits_per_sample: 16,
                    sample_rate: 22050,
                },
                &vec![0u8; self.pcm_bytes],
            ))
        }

        async fn list_voices(&self) -> Result<Vec<crate::tts::VoiceInfo>> {
            Ok(Vec::new())
        }
    }

    struct FailingTts;

    #[async_trait]
    impl TtsProvider for FailingTts {
        fn provider_name(&self) -> &'static str {
            "neuphonic"
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
            _speed: f32,
            _format: AudioFormat,
        ) -> Result<Vec<u8>> {
            Err(SvarError::Synthesis("vendor down".to_string()))
        }

        async fn list_voices(&self) -> Result<Vec<crate::tts::VoiceInfo>> {
            Ok(Vec::new())
        }
    }

    /// Succeeds for a fixed number of synthesis calls, then fails.
    struct FlakyTts {
        ok_calls: usize,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TtsProvider for FlakyTts {
        fn provider_name(&self) -> &'static str {
            "neuphonic"
        }

        async fn synthesize(
            &self,
            _text: &str,
            _voice_id: &str,
            _speed: f32,
            _format: AudioFormat,
        ) -> Result<Vec<u8>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls > self.ok_calls {
                return Err(SvarError::Synthesis("vendor down".to_string()));
            }
            Ok(write_wav(
                WavSpec {
                    channels: 1,
                    bits_per_sample: 16,
                    sample_rate: 22050,
                },
                &vec![0u8; 500],
            ))
        }

        async fn list_voices(&self) -> Result<Vec<crate::tts::VoiceInfo>> {
            Ok(Vec::new())
        }
    }

    /// Delegates to an in-memory store but fails deck listing.
    struct FailingDeckStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl KnowledgeStore for FailingDeckStore {
        async fn search_chunks(
            &self,
            scope: KbScope,
            query_embedding: &[f32],
            top_k: usize,
            threshold: f32,
        ) -> Result<Vec<ChunkHit>> {
            self.inner
                .search_chunks(scope, query_embedding, top_k, threshold)
                .await
        }

        async fn search_kb_images(
            &self,
            scope: KbScope,
            query_embedding: &[f32],
            top_k: usize,
            threshold: f32,
        ) -> Result<Vec<ImageHit>> {
            self.inner
                .search_kb_images(scope, query_embedding, top_k, threshold)
                .await
        }

        async fn slides_for_deck(&self, _deck_id: Uuid) -> Result<Vec<SlideRecord>> {
            Err(SvarError::Store("deck table unavailable".to_string()))
        }

        async fn content(&self, content_id: Uuid) -> Result<Option<ContentRecord>> {
            self.inner.content(content_id).await
        }

        async fn presenter(&self, presenter_id: Uuid) -> Result<Option<PresenterRecord>> {
            self.inner.presenter(presenter_id).await
        }

        async fn segment_text(&self, unit_id: Uuid, segment_index: usize) -> Result<Option<String>> {
            self.inner.segment_text(unit_id, segment_index).await
        }

        async fn record_synthesis(&self, unit_id: Uuid, at: chrono::DateTime<Utc>) -> Result<()> {
            self.inner.record_synthesis(unit_id, at).await
        }
    }

    fn at_similarity(sim: f32) -> Vec<f32> {
        let angle = sim.clamp(-1.0, 1.0).acos();
        vec![angle.cos(), angle.sin()]
    }

    struct Fixture {
        orchestrator: Orchestrator,
        sink: Arc<RecordingSink>,
        memory: Arc<MemoryStore>,
        unit_id: Uuid,
        deck_id: Uuid,
    }

    impl Fixture {
        /// Add a deck slide with a given similarity against the test query.
        fn put_slide(&self, index: usize, sim: f32) {
            self.memory.put_slide(SlideRecord {
                id: Uuid::new_v4(),
                deck_id: self.deck_id,
                slide_index: index,
                title: Some(format!("Slide {}", index)),
                image_path: format!("svar-assets/decks/{}.png", index),
                thumbnail_path: None,
                keywords: Vec::new(),
                embedding: Some(at_similarity(sim)),
            });
        }
    }

    const CONN: &str = "conn-1";

    /// A populated store with content, presenter, voice, deck, segments, and
    /// one highly relevant KB chunk.
    fn fixture(
        generator: Arc<dyn TextGenerator>,
        tts_provider: Arc<dyn TtsProvider>,
        settings: Settings,
    ) -> Fixture {
        fixture_with_store(generator, tts_provider, settings, |memory| {
            memory as Arc<dyn KnowledgeStore>
        })
    }

    /// Like `fixture`, but the orchestrator sees the populated store through
    /// `wrap`, letting tests inject failing store behavior.
    fn fixture_with_store(
        generator: Arc<dyn TextGenerator>,
        tts_provider: Arc<dyn TtsProvider>,
        settings: Settings,
        wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn KnowledgeStore>,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let content_id = Uuid::new_v4();
        let presenter_id = Uuid::new_v4();
        let unit_id = Uuid::new_v4();
        let deck_id = Uuid::new_v4();

        store.put_content(ContentRecord {
            id: content_id,
            title: "Deep Sea Mining".to_string(),
            presenter_id: Some(presenter_id),
            slide_deck_id: Some(deck_id),
        });
        store.put_presenter(PresenterRecord {
            id: presenter_id,
            name: "Dr. Chen".to_string(),
            bio: None,
            traits: Vec::new(),
            voice: Some(VoiceRecord {
                id: Uuid::new_v4(),
                name: "Chen".to_string(),
                provider: "neuphonic".to_string(),
                provider_voice_id: "voice-1".to_string(),
            }),
        });
        store.put_chunk(
            KbScope::Content(content_id),
            StoredChunk {
                content: "Polymetallic nodules form over millions of years.".to_string(),
                source_label: "nodules.pdf".to_string(),
                embedding: at_similarity(0.9),
            },
        );
        store.put_segments(
            unit_id,
            vec!["current segment".to_string(), "next segment".to_string()],
        );

        let registry = Arc::new(ConnectionRegistry::new());
        let sink = RecordingSink::new();
        registry.connect(
            CONN,
            content_id,
            unit_id,
            Some(deck_id),
            ListenerIdentity {
                name: Some("Sam".to_string()),
                id: None,
            },
            sink.clone(),
        );

        let mut tts = TtsRegistry::new();
        tts.register(tts_provider);

        let orchestrator = Orchestrator::with_components(
            settings,
            registry,
            wrap(store.clone()),
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            generator,
            tts,
            Arc::new(BucketRelative::new("svar-assets")),
        );

        Fixture {
            orchestrator,
            sink,
            memory: store,
            unit_id,
            deck_id,
        }
    }

    #[tokio::test]
    async fn test_full_question_sequence_order() {
        let fx = fixture(
            Arc::new(CannedGenerator("Nodules grow about a centimeter per million years.")),
            Arc::new(StubTts { pcm_bytes: 2000 }),
            Settings::default(),
        );

        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_message(
                CONN,
                ClientMessage::Question {
                    question: "How do nodules form?".to_string(),
                },
            )
            .await;

        let types = fx.sink.types();
        assert_eq!(
            types,
            vec![
                "interruption_started",
                "question_received",
                "acknowledgment_audio",
                "answer_text",
                "synthesizing_audio",
                "answer_audio",
                "bridge_audio",
                "ready_to_resume",
            ]
        );

        let state = fx.orchestrator.registry().get(CONN).unwrap();
        assert!(!state.is_interrupted);

        let frames = fx.sink.frames();
        let answer = frames.iter().find(|f| f["type"] == "answer_text").unwrap();
        assert_eq!(answer["sources"][0], "nodules.pdf");
        assert!(answer["confidence"].as_f64().unwrap() > 0.8);

        // Synthesis bookkeeping ran.
        assert!(fx.memory.last_synthesis(fx.unit_id).is_some());
    }

    #[tokio::test]
    async fn test_empty_question_keeps_interruption() {
        let fx = fixture(
            Arc::new(CannedGenerator("unused")),
            Arc::new(StubTts { pcm_bytes: 100 }),
            Settings::default(),
        );

        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_message(
                CONN,
                ClientMessage::Question {
                    question: "   ".to_string(),
                },
            )
            .await;

        let types = fx.sink.types();
        assert_eq!(types, vec!["interruption_started", "error"]);
        assert!(fx.orchestrator.registry().get(CONN).unwrap().is_interrupted);
    }

    #[tokio::test]
    async fn test_generation_failure_sends_error_and_releases() {
        let fx = fixture(
            Arc::new(FailingGenerator),
            Arc::new(StubTts { pcm_bytes: 100 }),
            Settings::default(),
        );

        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_question(CONN, "How do nodules form?")
            .await;

        let types = fx.sink.types();
        assert_eq!(types.last().unwrap(), "error");
        let frames = fx.sink.frames();
        assert!(frames
            .last()
            .unwrap()["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to process question:"));
        assert!(!fx.orchestrator.registry().get(CONN).unwrap().is_interrupted);
    }

    #[tokio::test]
    async fn test_visual_selection_failure_sends_error_and_releases() {
        let fx = fixture_with_store(
            Arc::new(CannedGenerator("answered")),
            Arc::new(StubTts { pcm_bytes: 500 }),
            Settings::default(),
            |memory| Arc::new(FailingDeckStore { inner: memory }),
        );

        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_question(CONN, "What does the diagram show?")
            .await;

        let types = fx.sink.types();
        assert_eq!(types.last().unwrap(), "error");
        assert!(!types.contains(&"answer_text".to_string()));
        assert!(!types.contains(&"ready_to_resume".to_string()));
        assert!(!fx.orchestrator.registry().get(CONN).unwrap().is_interrupted);
    }

    #[tokio::test]
    async fn test_bridge_synthesis_failure_sends_error_and_releases() {
        // Acknowledgment and answer synthesis succeed; the bridge call fails.
        let fx = fixture(
            Arc::new(CannedGenerator("answered")),
            Arc::new(FlakyTts {
                ok_calls: 2,
                calls: Mutex::new(0),
            }),
            Settings::default(),
        );

        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_question(CONN, "How do nodules form?")
            .await;

        let types = fx.sink.types();
        assert!(types.contains(&"answer_audio".to_string()));
        assert!(!types.contains(&"bridge_audio".to_string()));
        assert!(!types.contains(&"ready_to_resume".to_string()));
        assert_eq!(types.last().unwrap(), "error");
        assert!(!fx.orchestrator.registry().get(CONN).unwrap().is_interrupted);
    }

    #[tokio::test]
    async fn test_large_wav_answer_is_chunked() {
        let mut settings = Settings::default();
        settings.qa.audio_chunk_bytes = 4096;

        let fx = fixture(
            Arc::new(CannedGenerator("a long answer")),
            Arc::new(StubTts { pcm_bytes: 20_000 }),
            settings,
        );

        fx.orchestrator
            .handle_question(CONN, "How do nodules form?")
            .await;

        let frames = fx.sink.frames();
        let audio_frames: Vec<&Value> = frames
            .iter()
            .filter(|f| f["type"] == "answer_audio")
            .collect();
        assert!(audio_frames.len() > 1);

        let total = audio_frames[0]["total_chunks"].as_u64().unwrap() as usize;
        assert_eq!(audio_frames.len(), total);
        for (i, frame) in audio_frames.iter().enumerate() {
            assert_eq!(frame["chunk_index"].as_u64().unwrap() as usize, i);
            let bytes = BASE64.decode(frame["audio"].as_str().unwrap()).unwrap();
            assert!(bytes.len() <= 4096);
            // Every chunk is an independently playable WAV.
            crate::tts::wav::parse_wav(&bytes).unwrap();
        }
    }

    #[tokio::test]
    async fn test_visual_select_and_clear_wrap_the_answer() {
        let fx = fixture(
            Arc::new(CannedGenerator("See the process diagram.")),
            Arc::new(StubTts { pcm_bytes: 500 }),
            Settings::default(),
        );

        // A highly relevant slide at a different index than the current one.
        fx.put_slide(6, 0.9);

        // Interrupt while slide 2 is on screen.
        fx.orchestrator
            .handle_message(CONN, ClientMessage::SlideUpdate { slide_index: 2 })
            .await;
        fx.orchestrator
            .handle_message(CONN, ClientMessage::StartInterruption)
            .await;
        fx.orchestrator
            .handle_question(CONN, "What does the process look like?")
            .await;

        let types = fx.sink.types();
        let select_pos = types.iter().position(|t| t == "qa_visual_select").unwrap();
        let answer_pos = types.iter().position(|t| t == "answer_text").unwrap();
        let clear_pos = types.iter().position(|t| t == "qa_visual_clear").unwrap();
        let resume_pos = types.iter().position(|t| t == "ready_to_resume").unwrap();
        assert!(select_pos < answer_pos);
        assert!(answer_pos < clear_pos);
        assert!(clear_pos < resume_pos);

        let frames = fx.sink.frames();
        let clear = frames.iter().find(|f| f["type"] == "qa_visual_clear").unwrap();
        assert_eq!(clear["return_to_slide_index"], 2);
        let resume = frames.iter().find(|f| f["type"] == "ready_to_resume").unwrap();
        assert_eq!(resume["resume_slide_index"], 2);
    }

    #[tokio::test]
    async fn test_acknowledgment_failure_does_not_block_answer() {
        let fx = fixture(
            Arc::new(CannedGenerator("still answered")),
            Arc::new(FailingTts),
            Settings::default(),
        );

        fx.orchestrator
            .handle_question(CONN, "How do nodules form?")
            .await;

        let types = fx.sink.types();
        assert!(!types.contains(&"acknowledgment_audio".to_string()));
        assert!(types.contains(&"answer_text".to_string()));
        // Answer synthesis also fails, which is a hard error after the text.
        assert_eq!(types.last().unwrap(), "error");
    }
}
