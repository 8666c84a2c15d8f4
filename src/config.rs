use std::path::PathBuf;

use crate::listing::RankTable;
use crate::stats::GroupBy;

pub const APP_NAME: &str = "setbinder";
pub const DATABASE_FILE_NAME: &str = "setbinder.db";
pub const DEFAULT_COLLECTION_KEY: &str = "spiderman_mtg_collection";

pub const DEFAULT_SET_ORDER: [&str; 7] = ["SPM", "SPE", "MAR", "TSPM", "LMAR", "ASPM", "PSPM"];

pub const DEFAULT_SUBSET_ORDER: [&str; 18] = [
  "Main Set",
  "Basic Lands",
  "Full-Art Spiderweb Lands",
  "Showcase",
  "Showcase Scenes",
  "Borderless",
  "Borderless Web-Slinger",
  "Borderless Panel",
  "Borderless Classic Comic",
  "Extended Art",
  "Textured Foil Costume",
  "Special Foil Infinity Stone",
  "Promo",
  "Welcome Deck",
  "Scene Box",
  "Marvel Universe",
  "Tokens",
  "Art Series",
];

/// Group orderings used by binder sorting and stats breakdowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConfig {
  pub set_order: RankTable,
  pub subset_order: RankTable,
}

impl Default for ViewConfig {
  fn default() -> Self {
    Self {
      set_order: RankTable::new(DEFAULT_SET_ORDER),
      subset_order: RankTable::new(DEFAULT_SUBSET_ORDER),
    }
  }
}

impl ViewConfig {
  pub fn order_for(&self, group_by: GroupBy) -> &RankTable {
    match group_by {
      GroupBy::Set => &self.set_order,
      GroupBy::Subset => &self.subset_order,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
  pub data_dir: PathBuf,
  pub db_path: PathBuf,
  pub catalog_path: Option<PathBuf>,
  pub collection_key: String,
  pub view: ViewConfig,
}

impl AppConfig {
  /// Fills anything not given explicitly from the platform defaults.
  pub fn resolve(
    data_dir: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    collection_key: Option<String>,
    set_order: Option<&str>,
  ) -> Self {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let db_path = data_dir.join(DATABASE_FILE_NAME);
    let collection_key = collection_key
      .map(|key| key.trim().to_string())
      .filter(|key| !key.is_empty())
      .unwrap_or_else(|| DEFAULT_COLLECTION_KEY.to_string());

    let mut view = ViewConfig::default();
    if let Some(order) = set_order {
      let parsed = RankTable::parse_list(order);
      if parsed.codes().is_empty() {
        log::warn!("Ignoring empty set order, keeping the default");
      } else {
        view.set_order = parsed;
      }
    }

    Self {
      data_dir,
      db_path,
      catalog_path,
      collection_key,
      view,
    }
  }
}

pub fn default_data_dir() -> PathBuf {
  dirs::data_local_dir()
    .map(|dir| dir.join(APP_NAME))
    .unwrap_or_else(|| PathBuf::from(".").join(APP_NAME))
}
