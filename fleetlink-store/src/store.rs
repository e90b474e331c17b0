//! SQLite-backed store for cached entities and the mutation queue.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, TimeZone, Utc};
use fleetlink_types::{CachedEntity, MutationRequest, QueuedMutation, SyncStatus};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Where the store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum StoreLocation {
    /// Lives only as long as the process (tests, ephemeral sessions).
    #[default]
    InMemory,
    /// A database file; parent directories are created on open.
    Path(PathBuf),
}

/// The durable store. Cheap to share behind an `Arc`.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Opens (or creates) the store and sets up its schema.
    pub fn open(location: &StoreLocation) -> StoreResult<Self> {
        let conn = match location {
            StoreLocation::InMemory => Connection::open_in_memory()?,
            StoreLocation::Path(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
        };
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("Local store opened at {:?}", location);
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreLocation::InMemory)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cached_entities (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                sync_status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS mutation_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                method TEXT NOT NULL,
                body TEXT NOT NULL,
                entity_id TEXT,
                timestamp INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Cached entities ──────────────────────────────────────────

    /// Full-replace upsert by id. The entity's sync status is stored as given.
    pub fn put(&self, entity: &CachedEntity) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO cached_entities (id, title, status, priority, updated_at, sync_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entity.id,
                entity.title,
                entity.status,
                entity.priority,
                entity.updated_at.timestamp_millis(),
                entity.sync_status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Upsert for a local (offline) edit: the stored copy is marked pending.
    pub fn put_pending(&self, entity: &CachedEntity) -> StoreResult<CachedEntity> {
        let mut entity = entity.clone();
        entity.mark_pending();
        self.put(&entity)?;
        Ok(entity)
    }

    /// Loads one cached entity.
    pub fn get(&self, id: &str) -> StoreResult<Option<CachedEntity>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, title, status, priority, updated_at, sync_status
                 FROM cached_entities WHERE id = ?1",
                params![id],
                EntityRow::from_row,
            )
            .optional()?;
        row.map(EntityRow::into_entity).transpose()
    }

    /// Every cached entity, ordered by id.
    pub fn get_all(&self) -> StoreResult<Vec<CachedEntity>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, title, status, priority, updated_at, sync_status
             FROM cached_entities ORDER BY id",
        )?;
        let rows = stmt.query_map([], EntityRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_entity()?);
        }
        Ok(result)
    }

    /// Moves a cached entity's sync status. Returns `false` if no entity has that id.
    pub fn set_sync_status(&self, id: &str, status: SyncStatus) -> StoreResult<bool> {
        let changed = self.conn().execute(
            "UPDATE cached_entities SET sync_status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    // ── Mutation queue ───────────────────────────────────────────

    /// Appends a mutation with the next sequence id and the current time.
    pub fn enqueue(&self, request: &MutationRequest) -> StoreResult<QueuedMutation> {
        let enqueued_at = Utc::now();
        let body = serde_json::to_string(&request.body)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO mutation_queue (url, method, body, entity_id, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.url,
                request.method,
                body,
                request.entity_id,
                enqueued_at.timestamp_millis(),
            ],
        )?;
        let sequence_id = conn.last_insert_rowid();

        Ok(QueuedMutation {
            sequence_id,
            url: request.url.clone(),
            method: request.method.clone(),
            body: request.body.clone(),
            entity_id: request.entity_id.clone(),
            enqueued_at: millis_to_datetime(enqueued_at.timestamp_millis())?,
        })
    }

    /// Every queued mutation in insertion order. Nothing is removed.
    pub fn drain_all(&self) -> StoreResult<Vec<QueuedMutation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT seq, url, method, body, entity_id, timestamp
             FROM mutation_queue ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (sequence_id, url, method, body, entity_id, ts) = row?;
            result.push(QueuedMutation {
                sequence_id,
                url,
                method,
                body: serde_json::from_str(&body)?,
                entity_id,
                enqueued_at: millis_to_datetime(ts)?,
            });
        }
        Ok(result)
    }

    /// Number of queued mutations.
    pub fn queue_len(&self) -> StoreResult<usize> {
        let count: i64 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Empties the whole mutation queue and returns how many entries were dropped.
    /// There is no selective delete.
    pub fn clear(&self) -> StoreResult<usize> {
        let removed = self.conn().execute("DELETE FROM mutation_queue", [])?;
        Ok(removed)
    }
}

/// Raw column values, decoded outside the rusqlite row closure so data
/// errors surface as `StoreError::InvalidData`.
struct EntityRow {
    id: String,
    title: String,
    status: String,
    priority: String,
    updated_at: i64,
    sync_status: String,
}

impl EntityRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
            priority: row.get(3)?,
            updated_at: row.get(4)?,
            sync_status: row.get(5)?,
        })
    }

    fn into_entity(self) -> StoreResult<CachedEntity> {
        let sync_status = self
            .sync_status
            .parse::<SyncStatus>()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        Ok(CachedEntity {
            id: self.id,
            title: self.title,
            status: self.status,
            priority: self.priority,
            updated_at: millis_to_datetime(self.updated_at)?,
            sync_status,
        })
    }
}

fn millis_to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {ms}")))
}
