use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::Variant;
use crate::error::CollectionError;
use crate::storage::OwnershipPort;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipState {
  #[serde(default)]
  pub regular: bool,
  #[serde(default)]
  pub foil: bool,
}

impl OwnershipState {
  pub fn is_empty(&self) -> bool {
    !self.regular && !self.foil
  }

  pub fn any(&self) -> bool {
    self.regular || self.foil
  }

  pub fn has(&self, variant: Variant) -> bool {
    match variant {
      Variant::Regular => self.regular,
      Variant::Foil => self.foil,
    }
  }

  fn flip(&mut self, variant: Variant) {
    match variant {
      Variant::Regular => self.regular = !self.regular,
      Variant::Foil => self.foil = !self.foil,
    }
  }
}

/// Card id to ownership state. An id with nothing owned has no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OwnershipRecord {
  entries: BTreeMap<String, OwnershipState>,
}

impl OwnershipRecord {
  pub fn new() -> Self {
    Self::default()
  }

  /// Zero state for ids that are not present.
  pub fn get(&self, card_id: &str) -> OwnershipState {
    self.entries.get(card_id).copied().unwrap_or_default()
  }

  pub fn contains(&self, card_id: &str) -> bool {
    self.entries.contains_key(card_id)
  }

  /// Stores `state` for `card_id`, dropping the entry when nothing is owned.
  pub fn set(&mut self, card_id: &str, state: OwnershipState) {
    if state.is_empty() {
      self.entries.remove(card_id);
    } else {
      self.entries.insert(card_id.to_string(), state);
    }
  }

  /// Flips one variant and returns the resulting state, or `None` when the
  /// entry was pruned.
  pub fn toggle(&mut self, card_id: &str, variant: Variant) -> Option<OwnershipState> {
    let entry = self.entries.entry(card_id.to_string()).or_default();
    entry.flip(variant);
    let state = *entry;
    if state.is_empty() {
      self.entries.remove(card_id);
      return None;
    }
    Some(state)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, OwnershipState)> {
    self.entries.iter().map(|(id, state)| (id.as_str(), *state))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl FromIterator<(String, OwnershipState)> for OwnershipRecord {
  fn from_iter<I: IntoIterator<Item = (String, OwnershipState)>>(iter: I) -> Self {
    let mut record = OwnershipRecord::new();
    for (card_id, state) in iter {
      record.set(&card_id, state);
    }
    record
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleOutcome {
  pub card_id: String,
  pub variant: Variant,
  /// `None` once both variants are unowned and the entry is gone.
  pub state: Option<OwnershipState>,
}

/// Owns the in-memory ownership record and writes the whole record through
/// the port after every mutation.
pub struct OwnershipService<P: OwnershipPort> {
  record: OwnershipRecord,
  port: P,
}

impl<P: OwnershipPort> OwnershipService<P> {
  /// Loads the persisted record. Missing state starts empty; malformed state
  /// is logged and replaced by an empty record.
  pub fn open(port: P) -> Result<Self, CollectionError> {
    let record = match port.load() {
      Ok(Some(record)) => record,
      Ok(None) => OwnershipRecord::new(),
      Err(CollectionError::MalformedPersistedState(reason)) => {
        log::warn!("Ignoring malformed persisted collection: {}", reason);
        OwnershipRecord::new()
      }
      Err(error) => return Err(error),
    };
    log::info!("Opened collection with {} owned entries", record.len());
    Ok(Self { record, port })
  }

  pub fn record(&self) -> &OwnershipRecord {
    &self.record
  }

  pub fn state_of(&self, card_id: &str) -> OwnershipState {
    self.record.get(card_id)
  }

  pub fn port(&self) -> &P {
    &self.port
  }

  /// The in-memory flip stands even when the write fails; retry with
  /// [`OwnershipService::persist`].
  pub fn toggle(
    &mut self,
    card_id: &str,
    variant: Variant,
  ) -> Result<ToggleOutcome, CollectionError> {
    let state = self.record.toggle(card_id, variant);
    log::debug!("Toggled {} {} -> {:?}", card_id, variant, state);
    self.persist()?;
    Ok(ToggleOutcome {
      card_id: card_id.to_string(),
      variant,
      state,
    })
  }

  pub fn replace(&mut self, record: OwnershipRecord) -> Result<(), CollectionError> {
    self.record = record;
    self.persist()
  }

  pub fn clear(&mut self) -> Result<(), CollectionError> {
    self.record = OwnershipRecord::new();
    self.port.clear().map_err(|error| {
      log::warn!("Failed to clear persisted collection: {}", error);
      error
    })
  }

  pub fn persist(&self) -> Result<(), CollectionError> {
    self.port.save(&self.record).map_err(|error| {
      log::warn!("Failed to persist collection: {}", error);
      match error {
        CollectionError::PersistenceWrite(_) => error,
        other => CollectionError::PersistenceWrite(other.to_string()),
      }
    })
  }
}
