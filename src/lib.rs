//! Svar - Live Voice Q&A for Narrated Presentations
//!
//! Svar turns a narrated presentation or podcast into something a listener can
//! interrupt: mid-playback, the listener asks a question out loud, the session
//! pauses, the question is answered from a retrieval-augmented knowledge base
//! in the presenter's voice (optionally alongside a relevant slide or image),
//! and playback bridges back to where it left off.
//!
//! The name "Svar" comes from the Norwegian word for "answer."
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `embedding` - Embedding generation
//! - `store` - Knowledge store abstraction (chunks, slides, KB images, scripts)
//! - `retrieval` - Multi-scope retrieval-augmented context building
//! - `visual` - Slide / KB-image selection for answers
//! - `answer` - Spoken-style answer generation
//! - `phrases` - Acknowledgment and bridge phrase pools
//! - `tts` - Text-to-speech provider abstraction and registry
//! - `session` - Live connection registry
//! - `live` - WebSocket protocol and the interruption orchestrator
//!
//! # Example
//!
//! ```rust,no_run
//! use svar::config::Settings;
//! use svar::live::Orchestrator;
//! use svar::session::ConnectionRegistry;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let registry = Arc::new(ConnectionRegistry::new());
//!     let orchestrator = Orchestrator::new(settings, registry)?;
//!     // Hand `orchestrator` to the WebSocket server; each inbound message is
//!     // dispatched through `orchestrator.handle_message(..)`.
//!     # let _ = orchestrator;
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod live;
pub mod llm;
pub mod openai;
pub mod phrases;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod store;
pub mod tts;
pub mod visual;

pub use error::{Result, SvarError};
