use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::catalog::{
  audit_cards, Card, Catalog, CatalogIssue, CatalogSource, JsonCatalogFile, Variant,
};
use crate::config::AppConfig;
use crate::error::CollectionError;
use crate::listing::{FilterSpec, OwnershipMode, SortKey};
use crate::ownership::OwnershipService;
use crate::stats::{variant_breakdown, GroupBy, VariantBreakdown};
use crate::storage::SqliteStore;
use crate::transfer::{default_export_file_name, export_to_path, read_import};
use crate::Collection;

#[derive(Parser, Debug)]
#[command(name = "setbinder", version, about = "Track ownership and completion of a card set")]
pub struct Cli {
  /// Directory holding the collection database
  #[arg(long, global = true, env = "SETBINDER_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Catalog JSON file (default: the snapshot stored by `catalog apply`)
  #[arg(long, global = true, env = "SETBINDER_CATALOG")]
  catalog: Option<PathBuf>,

  /// Comma-separated set codes in binder order
  #[arg(long, global = true, env = "SETBINDER_SET_ORDER")]
  set_order: Option<String>,

  /// Storage key of the persisted collection
  #[arg(long, global = true, env = "SETBINDER_COLLECTION_KEY")]
  collection_key: Option<String>,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
  /// Set code to include (repeatable)
  #[arg(long = "set")]
  sets: Vec<String>,
  #[arg(long)]
  subset: Option<String>,
  /// Substring of an acquisition source
  #[arg(long)]
  source: Option<String>,
  #[arg(long)]
  rarity: Option<String>,
  #[arg(long)]
  min_price: Option<f64>,
  #[arg(long)]
  max_price: Option<f64>,
  /// owned, not-owned, all-variants-owned, all-variants-not-owned,
  /// incomplete-variants, foil, regular, foil-not-owned, regular-not-owned
  #[arg(long)]
  owned: Option<String>,
  /// Match against card name or collector number
  #[arg(long)]
  search: Option<String>,
}

impl FilterArgs {
  fn to_spec(&self) -> FilterSpec {
    FilterSpec {
      sets: self.sets.clone(),
      subset: self.subset.clone(),
      source: self.source.clone(),
      rarity: self.rarity.clone(),
      min_price: self.min_price,
      max_price: self.max_price,
      ownership: self.owned.as_deref().and_then(OwnershipMode::parse),
    }
  }

  fn search_term(&self) -> &str {
    self.search.as_deref().unwrap_or("")
  }
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// List cards with their ownership state
  List {
    #[command(flatten)]
    filter: FilterArgs,
    /// binderOrder, name, priceAsc, priceDesc, rarity, setNumber
    #[arg(long, default_value = "binderOrder")]
    sort: String,
  },
  /// Completion and value statistics for the filtered cards
  Stats {
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(long, value_enum, default_value_t = GroupBy::Set)]
    group_by: GroupBy,
  },
  /// Flip ownership of one variant of a card
  Toggle {
    card_id: String,
    /// Toggle the foil variant instead of the regular one
    #[arg(long)]
    foil: bool,
  },
  /// Distinct sets, subsets, sources and rarities in the catalog
  Filters,
  /// Write the collection to a JSON file
  Export {
    /// Output path (default: setbinder-collection-<date>.json)
    #[arg(long)]
    out: Option<PathBuf>,
  },
  /// Replace the collection with the contents of a JSON file
  Import { file: PathBuf },
  /// Remove every ownership entry
  Clear,
  /// Check the catalog for problems and report printings per group
  Audit {
    #[arg(long, value_enum, default_value_t = GroupBy::Subset)]
    group_by: GroupBy,
  },
  /// Manage the catalog snapshot stored in the database
  Catalog {
    #[command(subcommand)]
    action: CatalogAction,
  },
}

#[derive(Subcommand, Debug)]
enum CatalogAction {
  /// Store a catalog JSON file as the current snapshot
  Apply {
    file: PathBuf,
    /// Version label recorded with the snapshot
    #[arg(long = "snapshot-version")]
    version: String,
    /// Expected state hash; the apply is rejected on mismatch
    #[arg(long)]
    hash: Option<String>,
  },
  /// Show the stored snapshot version and hash
  Status,
}

fn init_logging(verbose: bool) {
  let level = if verbose { "debug" } else { "warn" };
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
    .try_init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
  let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
  println!("{}", text);
  Ok(())
}

fn open_store(config: &AppConfig) -> Result<SqliteStore, String> {
  SqliteStore::open(&config.db_path, &config.collection_key).map_err(|e| e.to_string())
}

fn load_catalog(config: &AppConfig, store: &SqliteStore) -> Result<Catalog, CollectionError> {
  match &config.catalog_path {
    Some(path) => Catalog::load(&JsonCatalogFile::new(path)),
    None => Catalog::load(store),
  }
}

fn open_collection(config: &AppConfig) -> Result<Collection<SqliteStore>, String> {
  let store = open_store(config)?;
  let catalog = load_catalog(config, &store).map_err(|e| e.to_string())?;
  Collection::open(catalog, store, config.view.clone()).map_err(|e| e.to_string())
}

fn catalog_cards(config: &AppConfig) -> Result<Vec<Card>, String> {
  let cards = match &config.catalog_path {
    Some(path) => JsonCatalogFile::new(path).load_catalog(),
    None => open_store(config)?.load_catalog(),
  };
  cards.map_err(|e| e.to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditReport {
  total_cards: usize,
  issues: Vec<CatalogIssue>,
  breakdown: Vec<VariantBreakdown>,
}

pub fn execute(cli: Cli) -> Result<(), String> {
  let config = AppConfig::resolve(
    cli.data_dir,
    cli.catalog,
    cli.collection_key,
    cli.set_order.as_deref(),
  );
  log::debug!("Using database {}", config.db_path.display());

  match cli.command {
    Commands::List { filter, sort } => {
      let collection = open_collection(&config)?;
      let views = collection.search(&filter.to_spec(), SortKey::parse(&sort), filter.search_term());
      print_json(&views)
    }
    Commands::Stats { filter, group_by } => {
      let collection = open_collection(&config)?;
      let views = collection.search(&filter.to_spec(), SortKey::default(), filter.search_term());
      print_json(&collection.stats(&views, group_by))
    }
    Commands::Toggle { card_id, foil } => {
      let mut collection = open_collection(&config)?;
      let variant = if foil { Variant::Foil } else { Variant::Regular };
      let outcome = collection.toggle(&card_id, variant).map_err(|e| e.to_string())?;
      print_json(&outcome)
    }
    Commands::Filters => {
      let collection = open_collection(&config)?;
      print_json(&collection.filter_options())
    }
    Commands::Export { out } => {
      let service = OwnershipService::open(open_store(&config)?).map_err(|e| e.to_string())?;
      let path = out
        .unwrap_or_else(|| PathBuf::from(default_export_file_name(Local::now().date_naive())));
      let written = export_to_path(service.record(), &path).map_err(|e| e.to_string())?;
      println!("{}", written.display());
      Ok(())
    }
    Commands::Import { file } => {
      let store = open_store(&config)?;
      match load_catalog(&config, &store) {
        Ok(catalog) => {
          let mut collection =
            Collection::open(catalog, store, config.view.clone()).map_err(|e| e.to_string())?;
          let summary = collection.import_file(&file).map_err(|e| e.to_string())?;
          print_json(&summary)
        }
        Err(CollectionError::CatalogEmpty) => {
          let record = read_import(&file).map_err(|e| e.to_string())?;
          let imported = record.len();
          let mut service = OwnershipService::open(store).map_err(|e| e.to_string())?;
          service.replace(record).map_err(|e| e.to_string())?;
          print_json(&serde_json::json!({ "imported": imported }))
        }
        Err(error) => Err(error.to_string()),
      }
    }
    Commands::Clear => {
      let mut service = OwnershipService::open(open_store(&config)?).map_err(|e| e.to_string())?;
      service.clear().map_err(|e| e.to_string())?;
      log::info!("Cleared collection '{}'", service.port().collection_key());
      Ok(())
    }
    Commands::Audit { group_by } => {
      let cards = catalog_cards(&config)?;
      let issues = audit_cards(&cards);
      for issue in &issues {
        log::warn!("{}", issue);
      }
      let breakdown = variant_breakdown(&cards, group_by, config.view.order_for(group_by));
      print_json(&AuditReport {
        total_cards: cards.len(),
        issues,
        breakdown,
      })
    }
    Commands::Catalog { action } => match action {
      CatalogAction::Apply { file, version, hash } => {
        let cards = JsonCatalogFile::new(&file).load_catalog().map_err(|e| e.to_string())?;
        let mut store = open_store(&config)?;
        let result = store
          .apply_catalog_snapshot(&version, &cards, hash.as_deref())
          .map_err(|e| e.to_string())?;
        print_json(&result)
      }
      CatalogAction::Status => {
        let store = open_store(&config)?;
        let state = store.catalog_sync_state().map_err(|e| e.to_string())?;
        print_json(&state)
      }
    },
  }
}

pub fn run() -> ExitCode {
  let cli = Cli::parse();
  init_logging(cli.verbose);
  match execute(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(message) => {
      eprintln!("error: {}", message);
      ExitCode::FAILURE
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn filter_args_map_to_spec() {
    let cli = Cli::parse_from([
      "setbinder",
      "list",
      "--set",
      "SPM",
      "--set",
      "MAR",
      "--owned",
      "incomplete-variants",
      "--min-price",
      "0.5",
    ]);
    let Commands::List { filter, sort } = cli.command else {
      panic!("expected list command");
    };
    let spec = filter.to_spec();
    assert_eq!(spec.sets, vec!["SPM", "MAR"]);
    assert_eq!(spec.ownership, Some(OwnershipMode::IncompleteVariants));
    assert_eq!(spec.min_price, Some(0.5));
    assert_eq!(SortKey::parse(&sort), SortKey::BinderOrder);
  }

  #[test]
  fn unknown_ownership_value_disables_filter() {
    let cli = Cli::parse_from(["setbinder", "stats", "--owned", "maybe", "--group-by", "subset"]);
    let Commands::Stats { filter, group_by } = cli.command else {
      panic!("expected stats command");
    };
    assert_eq!(filter.to_spec().ownership, None);
    assert_eq!(group_by, GroupBy::Subset);
  }

  #[test]
  fn global_options_parse_after_subcommand() {
    let cli = Cli::parse_from(["setbinder", "toggle", "abc", "--foil", "--data-dir", "/tmp/x"]);
    assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
    assert!(matches!(
      cli.command,
      Commands::Toggle { ref card_id, foil: true } if card_id == "abc"
    ));
  }

  #[test]
  fn commands_run_against_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("cards.json");
    std::fs::write(
      &catalog_path,
      r#"[
        {"id": "a", "name": "Alpha", "setNumber": "1", "set": "SPM", "subset": "Main Set",
         "rarity": "Rare", "price": 1.0, "foilPrice": 2.0, "source": [],
         "hasFoil": true, "hasNonfoil": true}
      ]"#,
    )
    .unwrap();
    let data_dir = dir.path().join("data");
    let data_arg = data_dir.to_str().unwrap();
    let catalog_arg = catalog_path.to_str().unwrap();

    let apply = Cli::parse_from([
      "setbinder",
      "--data-dir",
      data_arg,
      "catalog",
      "apply",
      catalog_arg,
      "--snapshot-version",
      "v1",
    ]);
    execute(apply).unwrap();

    let toggle = Cli::parse_from(["setbinder", "--data-dir", data_arg, "toggle", "a"]);
    execute(toggle).unwrap();
    let missing = Cli::parse_from(["setbinder", "--data-dir", data_arg, "toggle", "zz"]);
    assert!(execute(missing).unwrap_err().contains("Card not found"));

    let store =
      SqliteStore::open(&data_dir.join("setbinder.db"), crate::config::DEFAULT_COLLECTION_KEY)
        .unwrap();
    let service = OwnershipService::open(store).unwrap();
    assert!(service.state_of("a").regular);
  }

  #[test]
  fn missing_catalog_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cli = Cli::parse_from(["setbinder", "--data-dir", dir.path().to_str().unwrap(), "list"]);
    assert!(execute(cli).unwrap_err().contains("No catalog loaded"));
  }
}
