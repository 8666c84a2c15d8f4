use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionError {
  #[error("Database error: {0}")]
  Db(#[from] rusqlite::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Persisted collection is malformed: {0}")]
  MalformedPersistedState(String),

  #[error("Failed to save collection: {0}")]
  PersistenceWrite(String),

  #[error("Invalid collection file format: {0}")]
  InvalidImportPayload(String),

  #[error("Card not found: {0}")]
  CardNotFound(String),

  #[error("Invalid catalog: {0}")]
  InvalidCatalog(String),

  #[error("No catalog loaded. Pass --catalog or run `catalog apply` first.")]
  CatalogEmpty,

  #[error("Snapshot hash mismatch. expected {expected}, computed {computed}")]
  SnapshotHashMismatch { expected: String, computed: String },
}
