//! Text-to-speech providers.
//!
//! Each vendor implements [`TtsProvider`]; the [`TtsRegistry`] maps the
//! provider key stored on a voice record to a live provider instance.

mod elevenlabs;
mod neuphonic;
pub mod wav;

pub use elevenlabs::ElevenLabsTts;
pub use neuphonic::NeuphonicTts;

use crate::config::Settings;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Audio container a provider is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Wav => write!(f, "wav"),
            AudioFormat::Mp3 => write!(f, "mp3"),
        }
    }
}

/// A voice as reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub provider_voice_id: String,
    pub name: String,
    pub provider: String,
    pub is_cloned: bool,
    pub description: Option<String>,
}

/// One text-to-speech vendor.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Registry key for this provider ("neuphonic", "elevenlabs").
    fn provider_name(&self) -> &'static str;

    /// Synthesize `text` with the given provider voice. Returns a complete
    /// audio file in the requested format.
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>>;

    /// Synthesize as a byte stream. Providers without native streaming fall
    /// back to a one-item stream of the full file.
    async fn synthesize_streaming(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let audio = self.synthesize(text, voice_id, speed, format).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(Bytes::from(audio))
        })))
    }

    /// List the voices available on this provider's account.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>>;
}

/// Replace characters TTS engines commonly mispronounce or reject.
pub fn normalize_text(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ")
        .trim()
        .to_string()
}

/// Maps provider keys to provider instances.
pub struct TtsRegistry {
    providers: HashMap<String, Arc<dyn TtsProvider>>,
}

impl TtsRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Build a registry with all built-in providers configured from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NeuphonicTts::new(&settings.tts.neuphonic)));
        registry.register(Arc::new(ElevenLabsTts::new(&settings.tts.elevenlabs)));
        registry
    }

    /// Register a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn TtsProvider>) {
        self.providers
            .insert(provider.provider_name().to_string(), provider);
    }

    /// Resolve a provider by key.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn TtsProvider>> {
        self.providers
            .get(provider)
            .cloned()
            .ok_or_else(|| SvarError::UnknownProvider(provider.to_string()))
    }

    /// Registered provider keys.
    pub fn supported(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for TtsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(
            normalize_text("\u{201C}It\u{2019}s fine\u{201D} \u{2014} mostly\u{2026}"),
            "\"It's fine\" - mostly..."
        );
        assert_eq!(normalize_text("  plain text  "), "plain text");
    }

    #[test]
    fn test_registry_rejects_unknown_provider() {
        let registry = TtsRegistry::new();
        let err = registry.get("espeak").err().unwrap();
        assert!(matches!(err, SvarError::UnknownProvider(_)));
        assert!(err.to_string().contains("espeak"));
    }

    #[test]
    fn test_audio_format_display() {
        assert_eq!(AudioFormat::Wav.to_string(), "wav");
        assert_eq!(AudioFormat::Mp3.to_string(), "mp3");
    }
}
