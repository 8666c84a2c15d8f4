use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::catalog::{audit_cards, compute_catalog_state_hash, Card, CatalogSource};
use crate::error::CollectionError;
use crate::ownership::OwnershipRecord;
use crate::transfer::{decode_document, encode_document};

const MIGRATION_SQL_0001: &str = include_str!("../migrations/0001_initial.sql");
const MIGRATION_SQL_0002: &str = include_str!("../migrations/0002_catalog_snapshot.sql");
pub const CATALOG_DATASET_DEFAULT: &str = "default_cards";

/// Whole-record persistence for the ownership record.
pub trait OwnershipPort {
  fn load(&self) -> Result<Option<OwnershipRecord>, CollectionError>;
  fn save(&self, record: &OwnershipRecord) -> Result<(), CollectionError>;
  fn clear(&self) -> Result<(), CollectionError>;
}

fn now_iso() -> String {
  Utc::now().to_rfc3339()
}

fn decode_persisted(text: &str) -> Result<OwnershipRecord, CollectionError> {
  decode_document(text)
    .map(|document| document.owned)
    .map_err(CollectionError::MalformedPersistedState)
}

/// In-process port. Writes can be made to fail to exercise error paths.
#[derive(Default)]
pub struct MemoryStore {
  document: RefCell<Option<String>>,
  fail_writes: Cell<bool>,
  saves: Cell<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_document(text: &str) -> Self {
    let store = Self::default();
    *store.document.borrow_mut() = Some(text.to_string());
    store
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.set(fail);
  }

  pub fn corrupt(&self) {
    *self.document.borrow_mut() = Some("{not json".to_string());
  }

  pub fn save_count(&self) -> usize {
    self.saves.get()
  }

  pub fn raw_document(&self) -> Option<String> {
    self.document.borrow().clone()
  }

  pub fn snapshot(&self) -> Option<OwnershipRecord> {
    self
      .document
      .borrow()
      .as_deref()
      .and_then(|text| decode_persisted(text).ok())
  }
}

impl OwnershipPort for MemoryStore {
  fn load(&self) -> Result<Option<OwnershipRecord>, CollectionError> {
    match self.document.borrow().as_deref() {
      Some(text) => decode_persisted(text).map(Some),
      None => Ok(None),
    }
  }

  fn save(&self, record: &OwnershipRecord) -> Result<(), CollectionError> {
    if self.fail_writes.get() {
      return Err(CollectionError::PersistenceWrite("memory store is read-only".to_string()));
    }
    let text = encode_document(record, Utc::now())?;
    *self.document.borrow_mut() = Some(text);
    self.saves.set(self.saves.get() + 1);
    Ok(())
  }

  fn clear(&self) -> Result<(), CollectionError> {
    if self.fail_writes.get() {
      return Err(CollectionError::PersistenceWrite("memory store is read-only".to_string()));
    }
    *self.document.borrow_mut() = None;
    Ok(())
  }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSyncState {
  pub dataset: String,
  pub current_version: Option<String>,
  pub state_hash: Option<String>,
  pub synced_at: Option<String>,
  pub total_records: i64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogApplyResult {
  pub dataset: String,
  pub from_version: Option<String>,
  pub to_version: String,
  pub snapshot_hash: Option<String>,
  pub state_hash: String,
  pub total_records: i64,
}

/// SQLite-backed key-value store. Holds the ownership document under one key
/// and, optionally, a catalog snapshot.
pub struct SqliteStore {
  connection: Connection,
  collection_key: String,
}

impl SqliteStore {
  pub fn open(db_path: &Path, collection_key: &str) -> Result<Self, CollectionError> {
    if let Some(parent) = db_path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }
    let connection = Connection::open(db_path)?;
    Self::init(connection, collection_key)
  }

  pub fn open_in_memory(collection_key: &str) -> Result<Self, CollectionError> {
    Self::init(Connection::open_in_memory()?, collection_key)
  }

  fn init(connection: Connection, collection_key: &str) -> Result<Self, CollectionError> {
    connection.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")?;
    connection.execute_batch(MIGRATION_SQL_0001)?;
    connection.execute_batch(MIGRATION_SQL_0002)?;
    Ok(Self {
      connection,
      collection_key: collection_key.to_string(),
    })
  }

  pub fn collection_key(&self) -> &str {
    &self.collection_key
  }

  pub fn read_value(&self, key: &str) -> Result<Option<String>, CollectionError> {
    let value = self
      .connection
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?1 LIMIT 1",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  pub fn write_value(&self, key: &str, value: &str) -> Result<(), CollectionError> {
    self.connection.execute(
      "INSERT INTO kv_store (key, value, updated_at)
       VALUES (?1, ?2, ?3)
       ON CONFLICT(key) DO UPDATE SET
         value = excluded.value,
         updated_at = excluded.updated_at",
      params![key, value, now_iso()],
    )?;
    Ok(())
  }

  pub fn remove_value(&self, key: &str) -> Result<(), CollectionError> {
    self
      .connection
      .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
    Ok(())
  }

  fn read_catalog_sync_row(
    connection: &Connection,
    dataset: &str,
  ) -> Result<(Option<String>, Option<String>, Option<String>), CollectionError> {
    let state = connection
      .query_row(
        "SELECT current_version, state_hash, synced_at
         FROM catalog_sync_state
         WHERE dataset = ?1
         LIMIT 1",
        params![dataset],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()?;
    Ok(state.unwrap_or((None, None, None)))
  }

  fn count_catalog_records(connection: &Connection) -> Result<i64, CollectionError> {
    Ok(connection.query_row("SELECT COUNT(*) FROM catalog_cards", [], |row| row.get(0))?)
  }

  pub fn catalog_sync_state(&self) -> Result<CatalogSyncState, CollectionError> {
    let (current_version, state_hash, synced_at) =
      Self::read_catalog_sync_row(&self.connection, CATALOG_DATASET_DEFAULT)?;
    Ok(CatalogSyncState {
      dataset: CATALOG_DATASET_DEFAULT.to_string(),
      current_version,
      state_hash,
      synced_at,
      total_records: Self::count_catalog_records(&self.connection)?,
    })
  }

  /// Replaces the stored catalog with `cards`, keeping their order. When
  /// `expected_hash` is given it must match the computed state hash or
  /// nothing is written.
  pub fn apply_catalog_snapshot(
    &mut self,
    version: &str,
    cards: &[Card],
    expected_hash: Option<&str>,
  ) -> Result<CatalogApplyResult, CollectionError> {
    let to_version = version.trim().to_string();
    if to_version.is_empty() {
      return Err(CollectionError::InvalidCatalog(
        "Catalog snapshot apply requires version.".to_string(),
      ));
    }
    if let Some(fatal) = audit_cards(cards).into_iter().find(|issue| issue.is_fatal()) {
      return Err(CollectionError::InvalidCatalog(fatal.to_string()));
    }

    let state_hash = compute_catalog_state_hash(CATALOG_DATASET_DEFAULT, cards);
    let snapshot_hash = expected_hash
      .map(str::trim)
      .filter(|hash| !hash.is_empty())
      .map(str::to_string);
    if let Some(expected) = snapshot_hash.as_deref() {
      if expected != state_hash {
        return Err(CollectionError::SnapshotHashMismatch {
          expected: expected.to_string(),
          computed: state_hash,
        });
      }
    }

    let tx = self.connection.transaction()?;
    let (from_version, _, _) = Self::read_catalog_sync_row(&tx, CATALOG_DATASET_DEFAULT)?;

    tx.execute("DELETE FROM catalog_cards", [])?;
    let now = now_iso();
    for (position, card) in cards.iter().enumerate() {
      let payload = serde_json::to_string(card)?;
      tx.execute(
        "INSERT INTO catalog_cards (
           id, position, name, set_code, collector_number, payload, updated_at
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
          card.id.trim(),
          position as i64,
          card.name.trim(),
          card.set_code.trim(),
          card.set_number.trim(),
          payload,
          now
        ],
      )?;
    }

    tx.execute(
      "INSERT INTO catalog_sync_state (dataset, current_version, state_hash, synced_at, updated_at)
       VALUES (?1, ?2, ?3, ?4, ?4)
       ON CONFLICT(dataset) DO UPDATE SET
         current_version = excluded.current_version,
         state_hash = excluded.state_hash,
         synced_at = excluded.synced_at,
         updated_at = excluded.updated_at",
      params![CATALOG_DATASET_DEFAULT, to_version, state_hash, now],
    )?;

    let total_records = Self::count_catalog_records(&tx)?;
    tx.execute(
      "INSERT INTO catalog_snapshot_history (
         id, dataset, from_version, to_version, snapshot_hash, state_hash, total_records, applied_at
       )
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
      params![
        Uuid::new_v4().to_string(),
        CATALOG_DATASET_DEFAULT,
        from_version,
        to_version,
        snapshot_hash,
        state_hash,
        total_records,
        now
      ],
    )?;
    tx.commit()?;

    log::info!(
      "Applied catalog snapshot {} ({} cards, hash {})",
      to_version,
      total_records,
      state_hash
    );

    Ok(CatalogApplyResult {
      dataset: CATALOG_DATASET_DEFAULT.to_string(),
      from_version,
      to_version,
      snapshot_hash,
      state_hash,
      total_records,
    })
  }

  pub fn snapshot_history_len(&self) -> Result<i64, CollectionError> {
    Ok(self.connection.query_row(
      "SELECT COUNT(*) FROM catalog_snapshot_history WHERE dataset = ?1",
      params![CATALOG_DATASET_DEFAULT],
      |row| row.get(0),
    )?)
  }
}

impl CatalogSource for SqliteStore {
  fn load_catalog(&self) -> Result<Vec<Card>, CollectionError> {
    let mut statement = self
      .connection
      .prepare("SELECT payload FROM catalog_cards ORDER BY position")?;
    let rows = statement.query_map([], |row| row.get::<usize, String>(0))?;

    let mut cards = Vec::new();
    for row in rows {
      cards.push(serde_json::from_str(&row?)?);
    }
    Ok(cards)
  }
}

impl OwnershipPort for SqliteStore {
  fn load(&self) -> Result<Option<OwnershipRecord>, CollectionError> {
    match self.read_value(&self.collection_key)? {
      Some(text) => decode_persisted(&text).map(Some),
      None => Ok(None),
    }
  }

  fn save(&self, record: &OwnershipRecord) -> Result<(), CollectionError> {
    let text = encode_document(record, Utc::now())?;
    self
      .write_value(&self.collection_key, &text)
      .map_err(|error| CollectionError::PersistenceWrite(error.to_string()))
  }

  fn clear(&self) -> Result<(), CollectionError> {
    self
      .remove_value(&self.collection_key)
      .map_err(|error| CollectionError::PersistenceWrite(error.to_string()))
  }
}
