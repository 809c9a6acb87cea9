//! Live connection registry.
//!
//! Tracks every connected listener session: playback position, interruption
//! state, and the sink used to push protocol messages back to the client. The
//! registry is the single source of truth the orchestrator reads positions
//! from and writes interruption transitions to.

use crate::error::Result;
use crate::live::protocol::ServerMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound half of a client connection.
///
/// The WebSocket transport implements this; tests substitute recording sinks.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Send one serialized protocol message as a text frame.
    async fn send(&self, payload: String) -> Result<()>;
}

/// Who is listening on a connection, when the client identified itself.
#[derive(Debug, Clone, Default)]
pub struct ListenerIdentity {
    pub name: Option<String>,
    pub id: Option<String>,
}

/// Snapshot of one live session.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub connection_id: String,
    pub content_id: Uuid,
    pub unit_id: Uuid,
    pub slide_deck_id: Option<Uuid>,
    pub current_segment_index: usize,
    pub current_slide_index: usize,
    pub is_interrupted: bool,
    /// Slide on screen when the interruption began. Cleared when it ends.
    pub interrupted_slide_index: Option<usize>,
    pub listener: ListenerIdentity,
    pub connected_at: DateTime<Utc>,
}

struct Entry {
    state: ConnectionState,
    sink: Arc<dyn MessageSink>,
}

/// Registry of all live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    pub fn connect(
        &self,
        connection_id: &str,
        content_id: Uuid,
        unit_id: Uuid,
        slide_deck_id: Option<Uuid>,
        listener: ListenerIdentity,
        sink: Arc<dyn MessageSink>,
    ) {
        let state = ConnectionState {
            connection_id: connection_id.to_string(),
            content_id,
            unit_id,
            slide_deck_id,
            current_segment_index: 0,
            current_slide_index: 0,
            is_interrupted: false,
            interrupted_slide_index: None,
            listener,
            connected_at: Utc::now(),
        };
        debug!(connection_id, %content_id, "Connection registered");
        self.connections
            .write()
            .unwrap()
            .insert(connection_id.to_string(), Entry { state, sink });
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn disconnect(&self, connection_id: &str) {
        if self
            .connections
            .write()
            .unwrap()
            .remove(connection_id)
            .is_some()
        {
            debug!(connection_id, "Connection removed");
        }
    }

    /// Snapshot a connection's state.
    pub fn get(&self, connection_id: &str) -> Option<ConnectionState> {
        self.connections
            .read()
            .unwrap()
            .get(connection_id)
            .map(|e| e.state.clone())
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().unwrap().is_empty()
    }

    /// Record playback progress to a new segment.
    pub fn update_segment(&self, connection_id: &str, segment_index: usize) {
        if let Some(entry) = self.connections.write().unwrap().get_mut(connection_id) {
            entry.state.current_segment_index = segment_index;
        }
    }

    /// Record that a new slide is on screen.
    pub fn update_slide(&self, connection_id: &str, slide_index: usize) {
        if let Some(entry) = self.connections.write().unwrap().get_mut(connection_id) {
            entry.state.current_slide_index = slide_index;
        }
    }

    /// Set or clear the interruption flag.
    ///
    /// On the false-to-true transition the current slide index is snapshotted
    /// (unless `store_position` is false) so resume can return to it even if
    /// the client reports slide updates mid-interruption. Setting true while
    /// already interrupted keeps the original snapshot. Clearing drops it.
    pub fn set_interrupted(&self, connection_id: &str, interrupted: bool, store_position: bool) {
        if let Some(entry) = self.connections.write().unwrap().get_mut(connection_id) {
            if interrupted && store_position && !entry.state.is_interrupted {
                entry.state.interrupted_slide_index = Some(entry.state.current_slide_index);
            } else if !interrupted {
                entry.state.interrupted_slide_index = None;
            }
            entry.state.is_interrupted = interrupted;
        }
    }

    /// Send a protocol message to one connection.
    ///
    /// Returns false if the connection is unknown or the send failed; a failed
    /// send removes the connection.
    pub async fn send(&self, connection_id: &str, message: &ServerMessage) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(connection_id, error = %e, "Failed to serialize message");
                return false;
            }
        };

        // Clone the sink out so the lock is not held across the await.
        let sink = {
            let connections = self.connections.read().unwrap();
            match connections.get(connection_id) {
                Some(entry) => Arc::clone(&entry.sink),
                None => return false,
            }
        };

        match sink.send(payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(connection_id, error = %e, "Send failed, dropping connection");
                self.disconnect(connection_id);
                false
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
