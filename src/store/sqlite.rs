// src/store/sqlite.rs
//! SQLite world store
//!
//! One `worlds` row per universe plus one table per entity kind, keyed by
//! `(world_id, id)` with the entity serialized as JSON. Mutable entities are
//! upserted; events and artifacts are append-only and carry a `seq` column
//! so they reload in log order.

use crate::store::{WorldStore, WorldSummary};
use crate::utils::errors::{EngineError, Result};
use crate::world::ids::WorldId;
use crate::world::state::{WorldEntities, WorldMetadata, WorldState};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const ENTITY_TABLES: [&str; 4] = ["characters", "relationships", "tensions", "knowledge"];
const LOG_TABLES: [&str; 2] = ["events", "artifacts"];

/// Row counts across all worlds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub worlds: u64,
    pub events: u64,
    pub artifacts: u64,
}

pub struct SqliteWorldStore {
    path: Option<PathBuf>,
    db: Arc<Mutex<Connection>>,
}

impl SqliteWorldStore {
    /// Open (or create) the database at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::StorageFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| EngineError::StorageFailed(format!("Failed to open database: {}", e)))?;

        let store = Self {
            path: Some(path),
            db: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;

        info!("World store initialized at {:?}", store.path);
        Ok(store)
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::StorageFailed(format!("Failed to open database: {}", e)))?;

        let store = Self {
            path: None,
            db: Arc::new(Mutex::new(conn)),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().await;

        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS worlds (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tick INTEGER NOT NULL,
                status TEXT NOT NULL,
                metadata TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;

        for table in ENTITY_TABLES {
            db.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        world_id TEXT NOT NULL,
                        id TEXT NOT NULL,
                        body TEXT NOT NULL,
                        PRIMARY KEY (world_id, id)
                    )"
                ),
                [],
            )
            .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;
        }

        for table in LOG_TABLES {
            db.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        world_id TEXT NOT NULL,
                        id TEXT NOT NULL,
                        seq INTEGER NOT NULL,
                        tick INTEGER NOT NULL,
                        body TEXT NOT NULL,
                        PRIMARY KEY (world_id, id)
                    )"
                ),
                [],
            )
            .map_err(|e| EngineError::StorageFailed(format!("Schema creation failed: {}", e)))?;

            db.execute(
                &format!("CREATE INDEX IF NOT EXISTS idx_{table}_seq ON {table}(world_id, seq)"),
                [],
            )
            .map_err(|e| EngineError::StorageFailed(format!("Index creation failed: {}", e)))?;
        }

        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.lock().await;
        let count = |table: &str| -> Result<u64> {
            let n: i64 = db
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(|e| EngineError::StorageFailed(format!("Count failed: {}", e)))?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            worlds: count("worlds")?,
            events: count("events")?,
            artifacts: count("artifacts")?,
        })
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| EngineError::SerializationFailed(format!("Failed to encode entity: {}", e)))
}

fn upsert_entities<'a, T: Serialize + 'a>(
    tx: &Transaction<'_>,
    table: &str,
    world_id: &str,
    rows: impl Iterator<Item = (&'a str, &'a T)>,
) -> Result<()> {
    let mut stmt = tx
        .prepare_cached(&format!(
            "INSERT INTO {table} (world_id, id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(world_id, id) DO UPDATE SET body = excluded.body"
        ))
        .map_err(|e| EngineError::StorageFailed(format!("Query preparation failed: {}", e)))?;

    for (id, entity) in rows {
        stmt.execute(params![world_id, id, to_body(entity)?])
            .map_err(|e| EngineError::StorageFailed(format!("Upsert into {} failed: {}", table, e)))?;
    }
    Ok(())
}

/// Append log rows not yet stored; returns how many were written
fn append_log<'a, T: Serialize + 'a>(
    tx: &Transaction<'_>,
    table: &str,
    world_id: &str,
    rows: impl Iterator<Item = (&'a str, u64, &'a T)>,
) -> Result<usize> {
    let stored: i64 = tx
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE world_id = ?1"),
            params![world_id],
            |row| row.get(0),
        )
        .map_err(|e| EngineError::StorageFailed(format!("Count failed: {}", e)))?;

    let mut stmt = tx
        .prepare_cached(&format!(
            "INSERT OR IGNORE INTO {table} (world_id, id, seq, tick, body) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))
        .map_err(|e| EngineError::StorageFailed(format!("Query preparation failed: {}", e)))?;

    let mut written = 0;
    for (seq, (id, tick, entity)) in rows.enumerate().skip(stored.max(0) as usize) {
        written += stmt
            .execute(params![world_id, id, seq as i64, tick as i64, to_body(entity)?])
            .map_err(|e| EngineError::StorageFailed(format!("Insert into {} failed: {}", table, e)))?;
    }
    Ok(written)
}

fn load_bodies<T: DeserializeOwned>(
    db: &Connection,
    table: &str,
    world_id: &str,
    order_by: &str,
) -> Result<Vec<T>> {
    let mut stmt = db
        .prepare(&format!(
            "SELECT body FROM {table} WHERE world_id = ?1 ORDER BY {order_by}"
        ))
        .map_err(|e| EngineError::StorageFailed(format!("Query preparation failed: {}", e)))?;

    let bodies = stmt
        .query_map(params![world_id], |row| row.get::<_, String>(0))
        .map_err(|e| EngineError::StorageFailed(format!("Query execution failed: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| EngineError::StorageFailed(format!("Result collection failed: {}", e)))?;

    bodies
        .iter()
        .map(|body| {
            serde_json::from_str(body).map_err(|e| {
                EngineError::SerializationFailed(format!("Corrupt row in {}: {}", table, e))
            })
        })
        .collect()
}

#[async_trait]
impl WorldStore for SqliteWorldStore {
    async fn load_world(&self, id: &WorldId) -> Result<Option<WorldState>> {
        let db = self.db.lock().await;

        let metadata: Option<String> = db
            .query_row(
                "SELECT metadata FROM worlds WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| EngineError::StorageFailed(format!("World lookup failed: {}", e)))?;

        let Some(metadata) = metadata else {
            return Ok(None);
        };
        let meta: WorldMetadata = serde_json::from_str(&metadata)
            .map_err(|e| EngineError::SerializationFailed(format!("Corrupt world row: {}", e)))?;

        let entities = WorldEntities {
            characters: load_bodies(&db, "characters", id.as_str(), "id")?,
            relationships: load_bodies(&db, "relationships", id.as_str(), "id")?,
            tensions: load_bodies(&db, "tensions", id.as_str(), "id")?,
            knowledge: load_bodies(&db, "knowledge", id.as_str(), "id")?,
            events: load_bodies(&db, "events", id.as_str(), "seq")?,
            artifacts: load_bodies(&db, "artifacts", id.as_str(), "seq")?,
        };
        drop(db);

        let world = WorldState::from_parts(meta, entities)?;
        debug!("Loaded world {} at tick {}", world.id(), world.tick());
        Ok(Some(world))
    }

    async fn save_world(&self, world: &WorldState) -> Result<()> {
        let world_id = world.id().as_str();
        let mut db = self.db.lock().await;
        let tx = db
            .transaction()
            .map_err(|e| EngineError::StorageFailed(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            r#"
            INSERT INTO worlds (id, name, tick, status, metadata, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                tick = excluded.tick,
                status = excluded.status,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
            params![
                world_id,
                world.name(),
                world.tick() as i64,
                world.status().as_str(),
                to_body(world.metadata())?,
                chrono::Utc::now().timestamp(),
            ],
        )
        .map_err(|e| EngineError::StorageFailed(format!("Failed to save world row: {}", e)))?;

        upsert_entities(
            &tx,
            "characters",
            world_id,
            world.characters().map(|c| (c.id.as_str(), c)),
        )?;
        upsert_entities(
            &tx,
            "relationships",
            world_id,
            world.relationships().map(|r| (r.id.as_str(), r)),
        )?;
        upsert_entities(
            &tx,
            "tensions",
            world_id,
            world.tensions().map(|t| (t.id.as_str(), t)),
        )?;
        upsert_entities(
            &tx,
            "knowledge",
            world_id,
            world.knowledge().map(|k| (k.id.as_str(), k)),
        )?;

        let events = append_log(
            &tx,
            "events",
            world_id,
            world.events().iter().map(|e| (e.id.as_str(), e.tick, e)),
        )?;
        let artifacts = append_log(
            &tx,
            "artifacts",
            world_id,
            world.artifacts().iter().map(|a| (a.id.as_str(), a.tick, a)),
        )?;

        tx.commit()
            .map_err(|e| EngineError::StorageFailed(format!("Failed to commit: {}", e)))?;

        debug!(
            "Saved world {} at tick {} (+{} events, +{} artifacts)",
            world_id,
            world.tick(),
            events,
            artifacts
        );
        Ok(())
    }

    async fn list_worlds(&self) -> Result<Vec<WorldSummary>> {
        let db = self.db.lock().await;

        let mut stmt = db
            .prepare("SELECT id, name, tick, status FROM worlds ORDER BY id")
            .map_err(|e| EngineError::StorageFailed(format!("Query preparation failed: {}", e)))?;

        let worlds = stmt
            .query_map([], |row| {
                Ok(WorldSummary {
                    id: WorldId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    tick: row.get::<_, i64>(2)? as u64,
                    status: row.get(3)?,
                })
            })
            .map_err(|e| EngineError::StorageFailed(format!("Query execution failed: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::StorageFailed(format!("Result collection failed: {}", e)))?;

        Ok(worlds)
    }
}
