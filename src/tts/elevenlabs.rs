//! ElevenLabs TTS provider.
//!
//! MP3 comes straight from the API; WAV requests ask for raw PCM and wrap it
//! locally. Streaming uses the vendor's streaming endpoint.

use super::{AudioFormat, TtsProvider, VoiceInfo};
use crate::config::ElevenLabsSettings;
use crate::error::{Result, SvarError};
use crate::tts::wav::{write_wav, WavSpec};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

const API_BASE: &str = "https://api.elevenlabs.io/v1";

/// Sample rate of the `pcm_22050` output format requested for WAV.
const PCM_SAMPLE_RATE: u32 = 22050;

pub struct ElevenLabsTts {
    client: reqwest::Client,
    model_id: String,
    stability: f32,
    similarity_boost: f32,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<ElevenLabsVoice>,
}

#[derive(Deserialize)]
struct ElevenLabsVoice {
    voice_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl ElevenLabsTts {
    pub fn new(settings: &ElevenLabsSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            model_id: settings.model_id.clone(),
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var("ELEVENLABS_API_KEY").map_err(|_| {
            SvarError::Synthesis("ELEVENLABS_API_KEY environment variable not set".to_string())
        })
    }

    fn request_body(&self, text: &str, speed: f32) -> Value {
        json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": self.stability,
                "similarity_boost": self.similarity_boost,
                "speed": speed,
            },
        })
    }

    fn output_format(format: AudioFormat) -> &'static str {
        match format {
            AudioFormat::Mp3 => "mp3_44100_128",
            AudioFormat::Wav => "pcm_22050",
        }
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsTts {
    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }

    #[instrument(skip(self, text), fields(chars = text.len(), voice = voice_id))]
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/text-to-speech/{}?output_format={}",
            API_BASE,
            voice_id,
            Self::output_format(format)
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&self.request_body(text, speed))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SvarError::Synthesis(format!(
                "ElevenLabs API error {}: {}",
                status, body
            )));
        }

        let audio = response.bytes().await?.to_vec();
        match format {
            AudioFormat::Mp3 => Ok(audio),
            AudioFormat::Wav => Ok(write_wav(
                WavSpec {
                    channels: 1,
                    bits_per_sample: 16,
                    sample_rate: PCM_SAMPLE_RATE,
                },
                &audio,
            )),
        }
    }

    async fn synthesize_streaming(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<BoxStream<'static, Result<Bytes>>> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}/text-to-speech/{}/stream?output_format={}",
            API_BASE,
            voice_id,
            Self::output_format(format)
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&self.request_body(text, speed))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SvarError::Synthesis(format!(
                "ElevenLabs streaming request failed: {}",
                response.status()
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|item| item.map_err(SvarError::from))
            .boxed())
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/voices", API_BASE))
            .header("xi-api-key", api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SvarError::Synthesis(format!(
                "ElevenLabs voices request failed: {}",
                response.status()
            )));
        }

        let voices: VoicesResponse = response.json().await?;
        Ok(voices
            .voices
            .into_iter()
            .map(|v| VoiceInfo {
                provider_voice_id: v.voice_id,
                name: v.name,
                provider: "elevenlabs".to_string(),
                is_cloned: v.category.as_deref() == Some("cloned"),
                description: v.description,
            })
            .collect())
    }
}
