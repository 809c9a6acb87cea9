//! Neuphonic TTS provider.
//!
//! Neuphonic's SSE endpoint streams base64-encoded raw PCM; the full response
//! is decoded and wrapped as WAV. MP3 output is not offered by this vendor.

use super::{AudioFormat, TtsProvider, VoiceInfo};
use crate::config::NeuphonicSettings;
use crate::error::{Result, SvarError};
use crate::tts::wav::{write_wav, WavSpec};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

const API_BASE: &str = "https://api.neuphonic.com";

pub struct NeuphonicTts {
    client: reqwest::Client,
    sample_rate: u32,
    lang_code: String,
}

#[derive(Deserialize)]
struct SseData {
    data: SseAudio,
}

#[derive(Deserialize)]
struct SseAudio {
    audio: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    data: VoicesData,
}

#[derive(Deserialize)]
struct VoicesData {
    voices: Vec<NeuphonicVoice>,
}

#[derive(Deserialize)]
struct NeuphonicVoice {
    id: String,
    name: String,
    #[serde(default)]
    voice_type: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl NeuphonicTts {
    pub fn new(settings: &NeuphonicSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            sample_rate: settings.sample_rate,
            lang_code: settings.lang_code.clone(),
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var("NEUPHONIC_API_KEY").map_err(|_| {
            SvarError::Synthesis("NEUPHONIC_API_KEY environment variable not set".to_string())
        })
    }
}

#[async_trait]
impl TtsProvider for NeuphonicTts {
    fn provider_name(&self) -> &'static str {
        "neuphonic"
    }

    #[instrument(skip(self, text), fields(chars = text.len(), voice = voice_id))]
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        speed: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>> {
        if format == AudioFormat::Mp3 {
            return Err(SvarError::Synthesis(
                "Neuphonic does not produce MP3 output".to_string(),
            ));
        }

        let api_key = self.api_key()?;
        let url = format!("{}/sse/speak/{}", API_BASE, self.lang_code);

        let response = self
            .client
            .post(&url)
            .header("X-API-KEY", api_key)
            .json(&json!({
                "text": text,
                "voice_id": voice_id,
                "speed": speed,
                "sampling_rate": self.sample_rate,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SvarError::Synthesis(format!(
                "Neuphonic API error {}: {}",
                status, body
            )));
        }

        // The SSE body is a sequence of "data: {json}" lines, each carrying a
        // base64 PCM fragment.
        let body = response.text().await?;
        let mut pcm = Vec::new();
        for line in body.lines() {
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            let event: SseData = match serde_json::from_str(payload) {
                Ok(event) => event,
                Err(_) => continue,
            };
            let fragment = BASE64.decode(event.data.audio.as_bytes()).map_err(|e| {
                SvarError::Synthesis(format!("Invalid base64 audio from Neuphonic: {}", e))
            })?;
            pcm.extend_from_slice(&fragment);
        }

        if pcm.is_empty() {
            return Err(SvarError::Synthesis(
                "Neuphonic returned no audio data".to_string(),
            ));
        }

        debug!(pcm_bytes = pcm.len(), "Neuphonic synthesis complete");

        Ok(write_wav(
            WavSpec {
                channels: 1,
                bits_per_sample: 16,
                sample_rate: self.sample_rate,
            },
            &pcm,
        ))
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .get(format!("{}/voices", API_BASE))
            .header("X-API-KEY", api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SvarError::Synthesis(format!(
                "Neuphonic voices request failed: {}",
                response.status()
            )));
        }

        let voices: VoicesResponse = response.json().await?;
        Ok(voices
            .data
            .voices
            .into_iter()
            .map(|v| VoiceInfo {
                provider_voice_id: v.id,
                name: v.name,
                provider: "neuphonic".to_string(),
                is_cloned: v.voice_type.as_deref() == Some("cloned"),
                description: (!v.tags.is_empty()).then(|| v.tags.join(", ")),
            })
            .collect())
    }
}
