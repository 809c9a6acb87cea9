//! Wire protocol for the live WebSocket session.
//!
//! All frames are JSON objects tagged by a `type` field. Clients send playback
//! position updates and interruption commands; the server streams back the
//! staged Q&A sequence.

use crate::tts::AudioFormat;
use crate::visual::{VisualSource, VisualType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Playback advanced to a new script segment.
    SegmentUpdate { segment_index: usize },
    /// A new slide is on screen.
    SlideUpdate { slide_index: usize },
    /// Listener pressed the interrupt control; playback paused client-side.
    StartInterruption,
    /// The transcribed question.
    Question { question: String },
    /// Listener abandoned the interruption without asking.
    CancelInterruption,
    Ping,
}

/// Frames the server sends.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame after the socket upgrades.
    Connected { connection_id: String },
    InterruptionStarted { status: String },
    /// Echo of the accepted question.
    QuestionReceived { question: String },
    /// Immediate filler phrase audio, base64-encoded.
    AcknowledgmentAudio {
        text: String,
        audio: String,
        format: AudioFormat,
    },
    /// A visual to display beside the answer.
    QaVisualSelect {
        visual_type: VisualType,
        visual_id: Uuid,
        visual_path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        thumbnail_path: Option<String>,
        source: VisualSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        slide_index: Option<usize>,
        reason: String,
        confidence: f32,
    },
    /// The generated answer text, ahead of its audio.
    AnswerText {
        text: String,
        sources: Vec<String>,
        confidence: f32,
    },
    /// Answer audio synthesis has started.
    SynthesizingAudio,
    /// Answer audio, base64-encoded. Large WAV answers arrive as multiple
    /// frames with chunk bookkeeping; single-frame answers omit it.
    AnswerAudio {
        audio: String,
        format: AudioFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk_index: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_chunks: Option<usize>,
    },
    /// Dismiss the Q&A visual and return to the deck.
    QaVisualClear { return_to_slide_index: usize },
    /// Transition phrase audio, base64-encoded.
    BridgeAudio {
        text: String,
        audio: String,
        format: AudioFormat,
    },
    /// The Q&A sequence is complete; the client may resume playback.
    ReadyToResume { resume_slide_index: usize },
    InterruptionCancelled,
    Error { error: String },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parses_tagged_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"question","question":"why rust?"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Question { question } if question == "why rust?"));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"segment_update","segment_index":7}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SegmentUpdate { segment_index: 7 }));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"start_interruption"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StartInterruption));
    }

    #[test]
    fn test_unknown_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn test_answer_audio_omits_absent_chunk_fields() {
        let single = serde_json::to_string(&ServerMessage::AnswerAudio {
            audio: "AAAA".to_string(),
            format: AudioFormat::Mp3,
            chunk_index: None,
            total_chunks: None,
        })
        .unwrap();
        assert!(!single.contains("chunk_index"));
        assert!(single.contains("\"format\":\"mp3\""));

        let chunked = serde_json::to_string(&ServerMessage::AnswerAudio {
            audio: "AAAA".to_string(),
            format: AudioFormat::Wav,
            chunk_index: Some(0),
            total_chunks: Some(3),
        })
        .unwrap();
        assert!(chunked.contains("\"chunk_index\":0"));
        assert!(chunked.contains("\"total_chunks\":3"));
    }
}
