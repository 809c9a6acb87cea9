//! Configuration module for Svar.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    ElevenLabsSettings, EmbeddingSettings, GeneralSettings, NeuphonicSettings, QaSettings,
    RetrievalSettings, ServerSettings, Settings, StoreSettings, TtsSettings,
};
