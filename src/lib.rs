pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod listing;
pub mod ownership;
pub mod stats;
pub mod storage;
pub mod transfer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub use catalog::{Card, Catalog, CatalogSource, FilterOptions, JsonCatalogFile, Rarity, Variant};
pub use cli::run;
pub use config::{AppConfig, ViewConfig};
pub use error::CollectionError;
pub use listing::{CardView, FilterSpec, OwnershipMode, RankTable, SortKey};
pub use ownership::{OwnershipRecord, OwnershipService, OwnershipState, ToggleOutcome};
pub use stats::{GroupBy, StatsSummary, VariantBreakdown};
pub use storage::{MemoryStore, OwnershipPort, SqliteStore};
pub use transfer::CollectionDocument;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
  pub imported: usize,
  /// Imported ids that the loaded catalog does not know. They are kept.
  pub unknown: usize,
}

/// One session over a catalog and a persisted ownership record.
pub struct Collection<P: OwnershipPort> {
  catalog: Catalog,
  ownership: OwnershipService<P>,
  view: ViewConfig,
}

impl<P: OwnershipPort> Collection<P> {
  pub fn open(catalog: Catalog, port: P, view: ViewConfig) -> Result<Self, CollectionError> {
    let ownership = OwnershipService::open(port)?;
    log::info!(
      "Collection session opened: {} catalog cards, {} owned entries",
      catalog.len(),
      ownership.record().len()
    );
    Ok(Self {
      catalog,
      ownership,
      view,
    })
  }

  pub fn ownership(&self) -> &OwnershipRecord {
    self.ownership.record()
  }

  pub fn ownership_service(&self) -> &OwnershipService<P> {
    &self.ownership
  }

  pub fn list_cards(&self, filter: &FilterSpec, sort: SortKey) -> Vec<CardView<'_>> {
    log::debug!(
      "Listing cards sorted by {} with ownership filter {}",
      sort.as_str(),
      filter.ownership.map_or("none", |mode| mode.as_str())
    );
    listing::list_cards(
      &self.catalog,
      self.ownership.record(),
      filter,
      sort,
      &self.view.set_order,
    )
  }

  /// [`Collection::list_cards`] narrowed by a free-text term.
  pub fn search(&self, filter: &FilterSpec, sort: SortKey, term: &str) -> Vec<CardView<'_>> {
    listing::search(self.list_cards(filter, sort), term)
  }

  pub fn stats(&self, views: &[CardView<'_>], group_by: GroupBy) -> StatsSummary {
    stats::compute_stats(views, group_by, self.view.order_for(group_by))
  }

  pub fn filter_options(&self) -> FilterOptions {
    self.catalog.filter_options()
  }

  pub fn variant_breakdown(&self, group_by: GroupBy) -> Vec<VariantBreakdown> {
    stats::variant_breakdown(self.catalog.cards(), group_by, self.view.order_for(group_by))
  }

  pub fn toggle(
    &mut self,
    card_id: &str,
    variant: Variant,
  ) -> Result<ToggleOutcome, CollectionError> {
    let card = self
      .catalog
      .get(card_id)
      .ok_or_else(|| CollectionError::CardNotFound(card_id.to_string()))?;
    log::debug!("Toggling {} of '{}'", variant, card.name);
    self.ownership.toggle(card_id, variant)
  }

  /// Retries the write after a failed mutation.
  pub fn persist(&self) -> Result<(), CollectionError> {
    self.ownership.persist()
  }

  /// Replaces the whole record. A rejected payload changes nothing.
  pub fn import(&mut self, text: &str) -> Result<ImportSummary, CollectionError> {
    let record = transfer::parse_import(text)?;
    let unknown = record
      .iter()
      .filter(|(card_id, _)| !self.catalog.contains(card_id))
      .count();
    if unknown > 0 {
      log::warn!("Import contains {} card ids missing from the catalog", unknown);
    }
    let summary = ImportSummary {
      imported: record.len(),
      unknown,
    };
    self.ownership.replace(record)?;
    log::info!("Imported {} owned entries", summary.imported);
    Ok(summary)
  }

  pub fn import_file(&mut self, path: &Path) -> Result<ImportSummary, CollectionError> {
    let text = std::fs::read_to_string(path)?;
    self.import(&text)
  }

  pub fn export_document(&self, now: DateTime<Utc>) -> CollectionDocument {
    CollectionDocument::new(self.ownership.record().clone(), now)
  }

  pub fn export_to_path(&self, path: &Path) -> Result<PathBuf, CollectionError> {
    transfer::export_to_path(self.ownership.record(), path)
  }

  pub fn clear(&mut self) -> Result<(), CollectionError> {
    self.ownership.clear()?;
    log::info!("Cleared collection");
    Ok(())
  }
}
