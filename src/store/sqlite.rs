//! SQLite-backed knowledge store implementation.
//!
//! Cosine similarity is computed in Rust over candidate rows for simplicity.
//! Deployments with large knowledge bases should point the core at a dedicated
//! vector database behind the same trait.

use super::{
    cosine_similarity, ChunkHit, ContentRecord, ImageHit, KbImageRecord, KbScope, KnowledgeStore,
    PresenterRecord, SlideRecord, VoiceRecord,
};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

/// SQLite-backed knowledge store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS contents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        presenter_id TEXT,
        slide_deck_id TEXT
    );

    CREATE TABLE IF NOT EXISTS presenters (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        bio TEXT,
        traits TEXT NOT NULL DEFAULT '[]',
        voice_id TEXT
    );

    CREATE TABLE IF NOT EXISTS voices (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        provider TEXT NOT NULL,
        provider_voice_id TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS segments (
        unit_id TEXT NOT NULL,
        segment_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        PRIMARY KEY (unit_id, segment_index)
    );

    CREATE TABLE IF NOT EXISTS slides (
        id TEXT PRIMARY KEY,
        deck_id TEXT NOT NULL,
        slide_index INTEGER NOT NULL,
        title TEXT,
        image_path TEXT NOT NULL,
        thumbnail_path TEXT,
        keywords TEXT NOT NULL DEFAULT '[]',
        embedding BLOB
    );

    CREATE INDEX IF NOT EXISTS idx_slides_deck ON slides(deck_id);

    CREATE TABLE IF NOT EXISTS kb_chunks (
        id TEXT PRIMARY KEY,
        scope_kind TEXT NOT NULL,
        scope_id TEXT NOT NULL,
        content TEXT NOT NULL,
        source_label TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_kb_chunks_scope ON kb_chunks(scope_kind, scope_id);

    CREATE TABLE IF NOT EXISTS kb_images (
        id TEXT PRIMARY KEY,
        scope_kind TEXT NOT NULL,
        scope_id TEXT NOT NULL,
        filename TEXT NOT NULL,
        title TEXT,
        description TEXT,
        associated_text TEXT NOT NULL,
        image_path TEXT NOT NULL,
        thumbnail_path TEXT,
        embedding BLOB
    );

    CREATE INDEX IF NOT EXISTS idx_kb_images_scope ON kb_images(scope_kind, scope_id);

    CREATE TABLE IF NOT EXISTS qa_synthesis (
        unit_id TEXT PRIMARY KEY,
        synthesized_at TEXT NOT NULL
    );
"#;

impl SqliteStore {
    /// Open (or create) a knowledge store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened SQLite knowledge store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a content record.
    pub fn put_content(&self, content: &ContentRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO contents (id, title, presenter_id, slide_deck_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content.id.to_string(),
                content.title,
                content.presenter_id.map(|id| id.to_string()),
                content.slide_deck_id.map(|id| id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a presenter and its voice assignment.
    pub fn put_presenter(&self, presenter: &PresenterRecord) -> Result<()> {
        let conn = self.lock()?;
        if let Some(voice) = &presenter.voice {
            conn.execute(
                "INSERT OR REPLACE INTO voices (id, name, provider, provider_voice_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    voice.id.to_string(),
                    voice.name,
                    voice.provider,
                    voice.provider_voice_id,
                ],
            )?;
        }
        conn.execute(
            "INSERT OR REPLACE INTO presenters (id, name, bio, traits, voice_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                presenter.id.to_string(),
                presenter.name,
                presenter.bio,
                serde_json::to_string(&presenter.traits)?,
                presenter.voice.as_ref().map(|v| v.id.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace one script segment.
    pub fn put_segment(&self, unit_id: Uuid, segment_index: usize, content: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO segments (unit_id, segment_index, content)
             VALUES (?1, ?2, ?3)",
            params![unit_id.to_string(), segment_index as i64, content],
        )?;
        Ok(())
    }

    /// Insert or replace a slide.
    pub fn put_slide(&self, slide: &SlideRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO slides
             (id, deck_id, slide_index, title, image_path, thumbnail_path, keywords, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                slide.id.to_string(),
                slide.deck_id.to_string(),
                slide.slide_index as i64,
                slide.title,
                slide.image_path,
                slide.thumbnail_path,
                serde_json::to_string(&slide.keywords)?,
                slide.embedding.as_deref().map(embedding_to_bytes),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a KB text chunk.
    pub fn put_chunk(
        &self,
        scope: KbScope,
        content: &str,
        source_label: &str,
        embedding: &[f32],
    ) -> Result<()> {
        let (kind, scope_id) = scope_parts(scope);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kb_chunks
             (id, scope_kind, scope_id, content, source_label, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                kind,
                scope_id.to_string(),
                content,
                source_label,
                embedding_to_bytes(embedding),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a KB image.
    pub fn put_kb_image(&self, scope: KbScope, image: &KbImageRecord) -> Result<()> {
        let (kind, scope_id) = scope_parts(scope);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO kb_images
             (id, scope_kind, scope_id, filename, title, description, associated_text,
              image_path, thumbnail_path, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                image.id.to_string(),
                kind,
                scope_id.to_string(),
                image.filename,
                image.title,
                image.description,
                image.associated_text,
                image.image_path,
                image.thumbnail_path,
                image.embedding.as_deref().map(embedding_to_bytes),
            ],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SvarError::Store("Store mutex poisoned".to_string()))
    }
}

/// Split a scope into its SQL discriminator and owner id.
fn scope_parts(scope: KbScope) -> (&'static str, Uuid) {
    match scope {
        KbScope::Content(id) => ("content", id),
        KbScope::Presenter(id) => ("presenter", id),
    }
}

/// Serialize embedding to bytes.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from bytes.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
            f32::from_le_bytes(arr)
        })
        .collect()
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| SvarError::Store(format!("Invalid UUID in store: {}", e)))
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn search_chunks(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ChunkHit>> {
        let (kind, scope_id) = scope_parts(scope);
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT content, source_label, embedding FROM kb_chunks
             WHERE scope_kind = ?1 AND scope_id = ?2",
        )?;

        let rows = stmt.query_map(params![kind, scope_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (content, source_label, embedding) = row?;
            let similarity = cosine_similarity(query_embedding, &bytes_to_embedding(&embedding));
            if similarity >= threshold {
                hits.push(ChunkHit {
                    content,
                    similarity,
                    source_label,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn search_kb_images(
        &self,
        scope: KbScope,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ImageHit>> {
        let (kind, scope_id) = scope_parts(scope);
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, filename, title, description, associated_text, image_path,
                    thumbnail_path, embedding
             FROM kb_images
             WHERE scope_kind = ?1 AND scope_id = ?2 AND embedding IS NOT NULL",
        )?;

        let rows = stmt.query_map(params![kind, scope_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Vec<u8>>(7)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, filename, title, description, associated_text, image_path, thumbnail_path, embedding) =
                row?;
            let embedding = bytes_to_embedding(&embedding);
            let similarity = cosine_similarity(query_embedding, &embedding);
            if similarity >= threshold {
                hits.push(ImageHit {
                    image: KbImageRecord {
                        id: parse_uuid(&id)?,
                        filename,
                        title,
                        description,
                        associated_text,
                        image_path,
                        thumbnail_path,
                        embedding: Some(embedding),
                    },
                    similarity,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    async fn slides_for_deck(&self, deck_id: Uuid) -> Result<Vec<SlideRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, deck_id, slide_index, title, image_path, thumbnail_path, keywords, embedding
             FROM slides WHERE deck_id = ?1 ORDER BY slide_index",
        )?;

        let rows = stmt.query_map(params![deck_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<Vec<u8>>>(7)?,
            ))
        })?;

        let mut slides = Vec::new();
        for row in rows {
            let (id, deck, slide_index, title, image_path, thumbnail_path, keywords, embedding) =
                row?;
            slides.push(SlideRecord {
                id: parse_uuid(&id)?,
                deck_id: parse_uuid(&deck)?,
                slide_index: slide_index as usize,
                title,
                image_path,
                thumbnail_path,
                keywords: serde_json::from_str(&keywords)?,
                embedding: embedding.as_deref().map(bytes_to_embedding),
            });
        }

        Ok(slides)
    }

    async fn content(&self, content_id: Uuid) -> Result<Option<ContentRecord>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT id, title, presenter_id, slide_deck_id FROM contents WHERE id = ?1",
                params![content_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, title, presenter_id, slide_deck_id)) => Ok(Some(ContentRecord {
                id: parse_uuid(&id)?,
                title,
                presenter_id: presenter_id.as_deref().map(parse_uuid).transpose()?,
                slide_deck_id: slide_deck_id.as_deref().map(parse_uuid).transpose()?,
            })),
        }
    }

    async fn presenter(&self, presenter_id: Uuid) -> Result<Option<PresenterRecord>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT p.id, p.name, p.bio, p.traits,
                        v.id, v.name, v.provider, v.provider_voice_id
                 FROM presenters p
                 LEFT JOIN voices v ON p.voice_id = v.id
                 WHERE p.id = ?1",
                params![presenter_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, name, bio, traits, voice_id, voice_name, provider, provider_voice_id)) => {
                let voice = match (voice_id, voice_name, provider, provider_voice_id) {
                    (Some(vid), Some(vname), Some(provider), Some(pvid)) => Some(VoiceRecord {
                        id: parse_uuid(&vid)?,
                        name: vname,
                        provider,
                        provider_voice_id: pvid,
                    }),
                    _ => None,
                };
                Ok(Some(PresenterRecord {
                    id: parse_uuid(&id)?,
                    name,
                    bio,
                    traits: serde_json::from_str(&traits)?,
                    voice,
                }))
            }
        }
    }

    async fn segment_text(&self, unit_id: Uuid, segment_index: usize) -> Result<Option<String>> {
        let conn = self.lock()?;
        let content = conn
            .query_row(
                "SELECT content FROM segments WHERE unit_id = ?1 AND segment_index = ?2",
                params![unit_id.to_string(), segment_index as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(content)
    }

    async fn record_synthesis(&self, unit_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO qa_synthesis (unit_id, synthesized_at) VALUES (?1, ?2)",
            params![unit_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let scope = KbScope::Content(Uuid::new_v4());

        store
            .put_chunk(scope, "alpha text", "alpha.pdf", &[1.0, 0.0])
            .unwrap();
        store
            .put_chunk(scope, "beta text", "beta.pdf", &[0.0, 1.0])
            .unwrap();

        let hits = store
            .search_chunks(scope, &[1.0, 0.1], 10, 0.3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_label, "alpha.pdf");

        // Other scopes see nothing
        let other = KbScope::Presenter(Uuid::new_v4());
        let hits = store.search_chunks(other, &[1.0, 0.1], 10, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_presenter_with_voice() {
        let store = SqliteStore::in_memory().unwrap();
        let presenter = PresenterRecord {
            id: Uuid::new_v4(),
            name: "Astrid".to_string(),
            bio: Some("Marine biologist".to_string()),
            traits: vec!["curious".to_string(), "warm".to_string()],
            voice: Some(VoiceRecord {
                id: Uuid::new_v4(),
                name: "Astrid voice".to_string(),
                provider: "neuphonic".to_string(),
                provider_voice_id: "voice-123".to_string(),
            }),
        };
        store.put_presenter(&presenter).unwrap();

        let loaded = store.presenter(presenter.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Astrid");
        assert_eq!(loaded.traits.len(), 2);
        assert_eq!(loaded.voice.unwrap().provider, "neuphonic");
    }

    #[tokio::test]
    async fn test_segments_and_synthesis_bookkeeping() {
        let store = SqliteStore::in_memory().unwrap();
        let unit = Uuid::new_v4();

        store.put_segment(unit, 0, "first segment").unwrap();
        store.put_segment(unit, 1, "second segment").unwrap();

        assert_eq!(
            store.segment_text(unit, 1).await.unwrap(),
            Some("second segment".to_string())
        );
        assert_eq!(store.segment_text(unit, 2).await.unwrap(), None);

        store.record_synthesis(unit, Utc::now()).await.unwrap();
    }
}
