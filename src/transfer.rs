use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CollectionError;
use crate::ownership::{OwnershipRecord, OwnershipState};

pub const COLLECTION_VERSION: &str = "1.0";

/// Persisted and exported form of an ownership record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDocument {
  pub version: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_updated: Option<String>,
  pub owned: OwnershipRecord,
}

impl CollectionDocument {
  pub fn new(owned: OwnershipRecord, last_updated: DateTime<Utc>) -> Self {
    Self {
      version: COLLECTION_VERSION.to_string(),
      last_updated: Some(last_updated.to_rfc3339()),
      owned,
    }
  }

  pub fn to_json(&self) -> Result<String, CollectionError> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  last_updated: Option<String>,
  #[serde(default)]
  owned: Option<RawOwned>,
  #[serde(default)]
  owned_foil: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOwned {
  Map(BTreeMap<String, OwnershipState>),
  List(Vec<String>),
}

/// Decodes any accepted document shape:
/// - `{"owned": {id: {"regular", "foil"}}}`, a missing `foil` reads as false
/// - `{"owned": [ids], "ownedFoil": [ids]}`, a missing `ownedFoil` reads as empty
pub fn decode_document(text: &str) -> Result<CollectionDocument, String> {
  let raw: RawDocument = serde_json::from_str(text).map_err(|e| e.to_string())?;
  let owned = raw
    .owned
    .ok_or_else(|| "missing 'owned' mapping".to_string())?;

  let mut entries: BTreeMap<String, OwnershipState> = match owned {
    RawOwned::Map(map) => map,
    RawOwned::List(ids) => ids
      .into_iter()
      .map(|id| (id, OwnershipState { regular: true, foil: false }))
      .collect(),
  };
  for id in raw.owned_foil.unwrap_or_default() {
    entries.entry(id).or_default().foil = true;
  }

  Ok(CollectionDocument {
    version: raw.version.unwrap_or_else(|| COLLECTION_VERSION.to_string()),
    last_updated: raw.last_updated,
    owned: entries.into_iter().collect(),
  })
}

pub fn encode_document(
  record: &OwnershipRecord,
  now: DateTime<Utc>,
) -> Result<String, CollectionError> {
  CollectionDocument::new(record.clone(), now).to_json()
}

pub fn default_export_file_name(date: NaiveDate) -> String {
  format!("setbinder-collection-{}.json", date.format("%Y-%m-%d"))
}

pub fn export_to_path(record: &OwnershipRecord, path: &Path) -> Result<PathBuf, CollectionError> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }
  let body = encode_document(record, Utc::now())?;
  fs::write(path, body)?;
  log::info!("Exported {} owned entries to {}", record.len(), path.display());
  Ok(path.to_path_buf())
}

/// Validates an import payload. Nothing is mutated here, so a rejected
/// payload leaves the current collection untouched.
pub fn parse_import(text: &str) -> Result<OwnershipRecord, CollectionError> {
  decode_document(text)
    .map(|document| document.owned)
    .map_err(CollectionError::InvalidImportPayload)
}

pub fn read_import(path: &Path) -> Result<OwnershipRecord, CollectionError> {
  let text = fs::read_to_string(path)?;
  parse_import(&text)
}
