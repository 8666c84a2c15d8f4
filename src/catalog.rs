use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::error::CollectionError;

const PLACEHOLDER_IMAGE_BASE: &str = "https://via.placeholder.com/250x350/1a1a2e/dc143c?text=";

/// Finish a card can be printed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
  Regular,
  Foil,
}

impl fmt::Display for Variant {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Variant::Regular => f.write_str("regular"),
      Variant::Foil => f.write_str("foil"),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Rarity {
  #[default]
  Common,
  Uncommon,
  Rare,
  MythicRare,
  Other(String),
}

impl Rarity {
  pub fn parse(value: &str) -> Self {
    match value.trim() {
      "Common" => Rarity::Common,
      "Uncommon" => Rarity::Uncommon,
      "Rare" => Rarity::Rare,
      "Mythic Rare" => Rarity::MythicRare,
      other => Rarity::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      Rarity::Common => "Common",
      Rarity::Uncommon => "Uncommon",
      Rarity::Rare => "Rare",
      Rarity::MythicRare => "Mythic Rare",
      Rarity::Other(value) => value,
    }
  }

  /// Mythic Rare=4 down to Common=1; anything unrecognized ranks 0.
  pub fn rank(&self) -> u8 {
    match self {
      Rarity::MythicRare => 4,
      Rarity::Rare => 3,
      Rarity::Uncommon => 2,
      Rarity::Common => 1,
      Rarity::Other(_) => 0,
    }
  }
}

impl From<String> for Rarity {
  fn from(value: String) -> Self {
    Rarity::parse(&value)
  }
}

impl From<Rarity> for String {
  fn from(value: Rarity) -> Self {
    value.as_str().to_string()
  }
}

impl fmt::Display for Rarity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub set_number: String,
  #[serde(rename = "set", default)]
  pub set_code: String,
  #[serde(default)]
  pub subset: String,
  #[serde(default)]
  pub rarity: Rarity,
  pub price: f64,
  #[serde(default)]
  pub foil_price: f64,
  #[serde(rename = "source", default)]
  pub sources: Vec<String>,
  #[serde(default, skip_serializing_if = "lacks_image")]
  pub image_url: Option<String>,
  #[serde(default)]
  pub has_foil: bool,
  #[serde(default)]
  pub has_nonfoil: bool,
  #[serde(rename = "type_line", default)]
  pub type_line: String,
}

impl Card {
  pub fn collector_number(&self) -> i64 {
    parse_collector_number(&self.set_number)
  }

  pub fn offers(&self, variant: Variant) -> bool {
    match variant {
      Variant::Regular => self.has_nonfoil,
      Variant::Foil => self.has_foil,
    }
  }

  pub fn master_slots(&self) -> u32 {
    u32::from(self.has_nonfoil) + u32::from(self.has_foil)
  }

  /// Value of an owned foil copy: the foil price when one is known, the
  /// regular price otherwise.
  pub fn foil_value(&self) -> f64 {
    if self.foil_price > 0.0 {
      self.foil_price
    } else {
      self.price
    }
  }

  pub fn image_ref(&self) -> String {
    match self.image_url.as_deref().map(str::trim) {
      Some(url) if !url.is_empty() => url.to_string(),
      _ => format!("{}{}", PLACEHOLDER_IMAGE_BASE, encode_uri_component(&self.name)),
    }
  }

  pub fn has_image(&self) -> bool {
    !lacks_image(&self.image_url)
  }
}

fn lacks_image(url: &Option<String>) -> bool {
  url.as_deref().map_or(true, |url| url.trim().is_empty())
}

/// Leading-integer parse of a collector number ("12a" is 12). Anything
/// without leading digits orders as 0.
pub fn parse_collector_number(raw: &str) -> i64 {
  let trimmed = raw.trim_start();
  let (sign, rest) = match trimmed.strip_prefix('-') {
    Some(rest) => (-1, rest),
    None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
  };
  let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
  digits.parse::<i64>().map(|number| sign * number).unwrap_or(0)
}

fn encode_uri_component(value: &str) -> String {
  let mut encoded = String::with_capacity(value.len());
  for byte in value.bytes() {
    match byte {
      b'A'..=b'Z'
      | b'a'..=b'z'
      | b'0'..=b'9'
      | b'-'
      | b'_'
      | b'.'
      | b'!'
      | b'~'
      | b'*'
      | b'\''
      | b'('
      | b')' => encoded.push(byte as char),
      _ => encoded.push_str(&format!("%{:02X}", byte)),
    }
  }
  encoded
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CatalogIssue {
  #[serde(rename_all = "camelCase")]
  EmptyId { position: usize },
  #[serde(rename_all = "camelCase")]
  DuplicateId { card_id: String },
  #[serde(rename_all = "camelCase")]
  InvalidPrice {
    card_id: String,
    field: String,
    value: f64,
  },
  #[serde(rename_all = "camelCase")]
  NoFinish { card_id: String },
  #[serde(rename_all = "camelCase")]
  MissingSetCode { card_id: String },
}

impl CatalogIssue {
  /// Issues that make the catalog unusable, as opposed to data worth flagging.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      CatalogIssue::EmptyId { .. }
        | CatalogIssue::DuplicateId { .. }
        | CatalogIssue::InvalidPrice { .. }
    )
  }
}

impl fmt::Display for CatalogIssue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CatalogIssue::EmptyId { position } => {
        write!(f, "card at position {} has an empty id", position)
      }
      CatalogIssue::DuplicateId { card_id } => write!(f, "duplicate card id {}", card_id),
      CatalogIssue::InvalidPrice { card_id, field, value } => {
        write!(f, "card {} has invalid {}: {}", card_id, field, value)
      }
      CatalogIssue::NoFinish { card_id } => {
        write!(f, "card {} offers neither a nonfoil nor a foil printing", card_id)
      }
      CatalogIssue::MissingSetCode { card_id } => write!(f, "card {} has no set code", card_id),
    }
  }
}

pub fn audit_cards(cards: &[Card]) -> Vec<CatalogIssue> {
  let mut issues = Vec::new();
  let mut seen: HashSet<&str> = HashSet::new();

  for (position, card) in cards.iter().enumerate() {
    let id = card.id.trim();
    if id.is_empty() {
      issues.push(CatalogIssue::EmptyId { position });
      continue;
    }
    if !seen.insert(id) {
      issues.push(CatalogIssue::DuplicateId {
        card_id: id.to_string(),
      });
    }

    for (field, value) in [("price", card.price), ("foilPrice", card.foil_price)] {
      if !value.is_finite() || value < 0.0 {
        issues.push(CatalogIssue::InvalidPrice {
          card_id: id.to_string(),
          field: field.to_string(),
          value,
        });
      }
    }

    if !card.has_nonfoil && !card.has_foil {
      issues.push(CatalogIssue::NoFinish {
        card_id: id.to_string(),
      });
    }
    if card.set_code.trim().is_empty() {
      issues.push(CatalogIssue::MissingSetCode {
        card_id: id.to_string(),
      });
    }
  }

  issues
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
  pub sets: BTreeSet<String>,
  pub subsets: BTreeSet<String>,
  pub sources: BTreeSet<String>,
  pub rarities: BTreeSet<String>,
}

/// Immutable, ordered card list for one product line. Catalog order is kept
/// as loaded since binder layouts depend on it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  cards: Vec<Card>,
  index: HashMap<String, usize>,
}

impl Catalog {
  pub fn new(cards: Vec<Card>) -> Result<Self, CollectionError> {
    let issues = audit_cards(&cards);
    if let Some(fatal) = issues.iter().find(|issue| issue.is_fatal()) {
      return Err(CollectionError::InvalidCatalog(fatal.to_string()));
    }
    for issue in &issues {
      log::warn!("Catalog: {}", issue);
    }

    let index = cards
      .iter()
      .enumerate()
      .map(|(position, card)| (card.id.clone(), position))
      .collect();
    Ok(Self { cards, index })
  }

  pub fn load(source: &dyn CatalogSource) -> Result<Self, CollectionError> {
    let cards = source.load_catalog()?;
    if cards.is_empty() {
      return Err(CollectionError::CatalogEmpty);
    }
    let catalog = Self::new(cards)?;
    log::info!("Loaded catalog with {} cards", catalog.len());
    Ok(catalog)
  }

  pub fn cards(&self) -> &[Card] {
    &self.cards
  }

  pub fn get(&self, card_id: &str) -> Option<&Card> {
    self.index.get(card_id).map(|&position| &self.cards[position])
  }

  pub fn contains(&self, card_id: &str) -> bool {
    self.index.contains_key(card_id)
  }

  pub fn len(&self) -> usize {
    self.cards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cards.is_empty()
  }

  pub fn filter_options(&self) -> FilterOptions {
    let mut options = FilterOptions::default();
    for card in &self.cards {
      options.sets.insert(card.set_code.clone());
      options.subsets.insert(card.subset.clone());
      options.sources.extend(card.sources.iter().cloned());
      options.rarities.insert(card.rarity.as_str().to_string());
    }
    options
  }

  pub fn state_hash(&self, dataset: &str) -> String {
    compute_catalog_state_hash(dataset, &self.cards)
  }
}

/// SHA-256 over the dataset name and every card line in catalog order.
pub fn compute_catalog_state_hash(dataset: &str, cards: &[Card]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(dataset.as_bytes());
  hasher.update(b"\n");

  for card in cards {
    let line = format!(
      "{}|{}|{}|{}|{}|{}|{:.6}|{:.6}|{}|{}|{}\n",
      card.id,
      card.name,
      card.set_code,
      card.set_number,
      card.subset,
      card.rarity,
      card.price,
      card.foil_price,
      card.has_nonfoil,
      card.has_foil,
      card.sources.join(",")
    );
    hasher.update(line.as_bytes());
  }

  format!("{:x}", hasher.finalize())
}

pub trait CatalogSource {
  fn load_catalog(&self) -> Result<Vec<Card>, CollectionError>;
}

/// Catalog stored as a JSON array of cards.
pub struct JsonCatalogFile {
  path: PathBuf,
}

impl JsonCatalogFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl CatalogSource for JsonCatalogFile {
  fn load_catalog(&self) -> Result<Vec<Card>, CollectionError> {
    let body = fs::read_to_string(&self.path)?;
    let cards: Vec<Card> = serde_json::from_str(&body)?;
    Ok(cards)
  }
}
