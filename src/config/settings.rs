//! Configuration settings for Svar.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub qa: QaSettings,
    pub tts: TtsSettings,
    pub store: StoreSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.svar".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Listening-session server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8741,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Retrieval settings for the Q&A context pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Maximum number of context chunks in the final ranked list.
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be considered.
    pub similarity_threshold: f32,
    /// Per-scope limit for KB image searches.
    pub image_top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.3,
            image_top_k: 3,
        }
    }
}

/// Q&A flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaSettings {
    /// LLM model for answer generation.
    pub answer_model: String,
    /// Maximum tokens for a generated answer.
    pub max_answer_tokens: u32,
    /// Minimum confidence for a visual to be shown during an answer.
    pub visual_confidence_threshold: f32,
    /// Audio payloads above this many bytes are split into WAV chunks.
    pub audio_chunk_bytes: usize,
    /// Generate bridge phrases with the LLM instead of the static pool.
    pub generative_bridges: bool,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            answer_model: "gpt-4o".to_string(),
            max_answer_tokens: 300,
            visual_confidence_threshold: 0.65,
            audio_chunk_bytes: 600 * 1024,
            generative_bridges: false,
        }
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TtsSettings {
    pub neuphonic: NeuphonicSettings,
    pub elevenlabs: ElevenLabsSettings,
}

/// Neuphonic provider settings.
///
/// The API key is read from the `NEUPHONIC_API_KEY` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuphonicSettings {
    /// PCM sampling rate for synthesized audio.
    pub sample_rate: u32,
    /// Language code for synthesis.
    pub lang_code: String,
}

impl Default for NeuphonicSettings {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            lang_code: "en".to_string(),
        }
    }
}

/// ElevenLabs provider settings.
///
/// The API key is read from the `ELEVENLABS_API_KEY` environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsSettings {
    /// Model identifier.
    pub model_id: String,
    /// Voice stability (0.0-1.0); lower is more expressive.
    pub stability: f32,
    /// Similarity boost (0.0-1.0); how closely to track the reference voice.
    pub similarity_boost: f32,
}

impl Default for ElevenLabsSettings {
    fn default() -> Self {
        Self {
            model_id: "eleven_turbo_v2_5".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Knowledge store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
    /// Bucket name stripped from stored asset paths before they go over the
    /// wire.
    pub assets_bucket: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.svar/svar.db".to_string(),
            assets_bucket: "svar-assets".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SvarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let settings = Settings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.retrieval.top_k, 5);
        assert!((parsed.qa.visual_confidence_threshold - 0.65).abs() < f32::EPSILON);
        assert_eq!(parsed.qa.audio_chunk_bytes, 600 * 1024);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Settings = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(parsed.server.port, 9000);
        assert_eq!(parsed.embedding.dimensions, 1536);
    }
}
