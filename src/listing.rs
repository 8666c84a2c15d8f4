use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::catalog::{Card, Catalog};
use crate::ownership::{OwnershipRecord, OwnershipState};

/// Which combination of owned variants a card must have to be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipMode {
  Owned,
  NotOwned,
  AllVariantsOwned,
  AllVariantsNotOwned,
  IncompleteVariants,
  Foil,
  Regular,
  FoilNotOwned,
  RegularNotOwned,
}

impl OwnershipMode {
  /// `None` for empty or unrecognized values, which means no ownership
  /// filtering. `true`/`false` are accepted for older links.
  pub fn parse(value: &str) -> Option<Self> {
    let mode = match value.trim() {
      "owned" | "true" => OwnershipMode::Owned,
      "not-owned" | "false" => OwnershipMode::NotOwned,
      "all-variants-owned" => OwnershipMode::AllVariantsOwned,
      "all-variants-not-owned" => OwnershipMode::AllVariantsNotOwned,
      "incomplete-variants" => OwnershipMode::IncompleteVariants,
      "foil" => OwnershipMode::Foil,
      "regular" => OwnershipMode::Regular,
      "foil-not-owned" => OwnershipMode::FoilNotOwned,
      "regular-not-owned" => OwnershipMode::RegularNotOwned,
      "" => return None,
      other => {
        log::debug!("Ignoring unknown ownership filter '{}'", other);
        return None;
      }
    };
    Some(mode)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      OwnershipMode::Owned => "owned",
      OwnershipMode::NotOwned => "not-owned",
      OwnershipMode::AllVariantsOwned => "all-variants-owned",
      OwnershipMode::AllVariantsNotOwned => "all-variants-not-owned",
      OwnershipMode::IncompleteVariants => "incomplete-variants",
      OwnershipMode::Foil => "foil",
      OwnershipMode::Regular => "regular",
      OwnershipMode::FoilNotOwned => "foil-not-owned",
      OwnershipMode::RegularNotOwned => "regular-not-owned",
    }
  }

  pub fn matches(&self, card: &Card, state: OwnershipState) -> bool {
    let OwnershipState { regular, foil } = state;
    match self {
      OwnershipMode::Owned => regular || foil,
      OwnershipMode::NotOwned => !regular && !foil,
      OwnershipMode::AllVariantsOwned => match (card.has_nonfoil, card.has_foil) {
        (true, true) => regular && foil,
        (true, false) => regular,
        (false, true) => foil,
        (false, false) => false,
      },
      OwnershipMode::AllVariantsNotOwned => match (card.has_nonfoil, card.has_foil) {
        (true, true) => !regular && !foil,
        (true, false) => !regular,
        (false, true) => !foil,
        (false, false) => false,
      },
      OwnershipMode::IncompleteVariants => card.has_nonfoil && card.has_foil && regular != foil,
      OwnershipMode::Foil => foil,
      OwnershipMode::Regular => regular,
      OwnershipMode::FoilNotOwned => !foil,
      OwnershipMode::RegularNotOwned => !regular,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortKey {
  BinderOrder,
  Name,
  PriceAsc,
  PriceDesc,
  Rarity,
  #[default]
  SetNumber,
}

impl SortKey {
  /// Unrecognized keys sort by collector number.
  pub fn parse(value: &str) -> Self {
    match value.trim() {
      "binderOrder" => SortKey::BinderOrder,
      "name" => SortKey::Name,
      "priceAsc" => SortKey::PriceAsc,
      "priceDesc" => SortKey::PriceDesc,
      "rarity" => SortKey::Rarity,
      "setNumber" => SortKey::SetNumber,
      other => {
        log::debug!("Unknown sort key '{}', using setNumber", other);
        SortKey::SetNumber
      }
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      SortKey::BinderOrder => "binderOrder",
      SortKey::Name => "name",
      SortKey::PriceAsc => "priceAsc",
      SortKey::PriceDesc => "priceDesc",
      SortKey::Rarity => "rarity",
      SortKey::SetNumber => "setNumber",
    }
  }
}

/// Preferred ordering of codes. Codes missing from the table rank after
/// every listed one and tie with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankTable {
  codes: Vec<String>,
}

impl RankTable {
  pub fn new<I, S>(codes: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      codes: codes.into_iter().map(Into::into).collect(),
    }
  }

  /// Parses a comma-separated list, ignoring blanks.
  pub fn parse_list(value: &str) -> Self {
    Self::new(
      value
        .split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty()),
    )
  }

  pub fn rank(&self, code: &str) -> usize {
    self
      .codes
      .iter()
      .position(|known| known == code)
      .unwrap_or(self.codes.len())
  }

  pub fn codes(&self) -> &[String] {
    &self.codes
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
  /// Empty keeps every set.
  pub sets: Vec<String>,
  pub subset: Option<String>,
  /// Substring matched against each acquisition source tag.
  pub source: Option<String>,
  pub rarity: Option<String>,
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub ownership: Option<OwnershipMode>,
}

impl FilterSpec {
  pub fn with_ownership_mode(mut self, value: &str) -> Self {
    self.ownership = OwnershipMode::parse(value);
    self
  }

  fn matches_card(&self, card: &Card) -> bool {
    if !self.sets.is_empty() && !self.sets.iter().any(|set| *set == card.set_code) {
      return false;
    }
    if let Some(subset) = non_empty(&self.subset) {
      if card.subset != subset {
        return false;
      }
    }
    if let Some(source) = non_empty(&self.source) {
      if !card.sources.iter().any(|tag| tag.contains(source)) {
        return false;
      }
    }
    if let Some(rarity) = non_empty(&self.rarity) {
      if card.rarity.as_str() != rarity {
        return false;
      }
    }
    if let Some(min) = self.min_price {
      if card.price < min {
        return false;
      }
    }
    if let Some(max) = self.max_price {
      if card.price > max {
        return false;
      }
    }
    true
  }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
  value.as_deref().filter(|text| !text.is_empty())
}

/// A catalog card joined with its ownership state. Rebuilt on every read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView<'a> {
  #[serde(flatten)]
  pub card: &'a Card,
  pub owned: bool,
  pub owned_foil: bool,
  /// Placeholder keyed by name, serialized as `imageUrl` only when the card
  /// has no image of its own.
  #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
  pub placeholder_image: Option<String>,
}

impl<'a> CardView<'a> {
  pub fn new(card: &'a Card, state: OwnershipState) -> Self {
    Self {
      card,
      owned: state.regular,
      owned_foil: state.foil,
      placeholder_image: (!card.has_image()).then(|| card.image_ref()),
    }
  }

  pub fn state(&self) -> OwnershipState {
    OwnershipState {
      regular: self.owned,
      foil: self.owned_foil,
    }
  }

  pub fn owns_any(&self) -> bool {
    self.owned || self.owned_foil
  }
}

pub fn list_cards<'a>(
  catalog: &'a Catalog,
  ownership: &OwnershipRecord,
  filter: &FilterSpec,
  sort: SortKey,
  set_order: &RankTable,
) -> Vec<CardView<'a>> {
  let mut views: Vec<CardView<'a>> = catalog
    .cards()
    .iter()
    .filter(|card| filter.matches_card(card))
    .map(|card| CardView::new(card, ownership.get(&card.id)))
    .filter(|view| match filter.ownership {
      Some(mode) => mode.matches(view.card, view.state()),
      None => true,
    })
    .collect();

  sort_views(&mut views, sort, set_order);
  views
}

/// Case-insensitive match on display name or collector number.
pub fn search<'a>(views: Vec<CardView<'a>>, term: &str) -> Vec<CardView<'a>> {
  let needle = term.trim().to_lowercase();
  if needle.is_empty() {
    return views;
  }
  views
    .into_iter()
    .filter(|view| {
      view.card.name.to_lowercase().contains(&needle)
        || view.card.set_number.to_lowercase().contains(&needle)
    })
    .collect()
}

/// All orderings are stable: equal keys keep catalog order.
pub fn sort_views(views: &mut [CardView<'_>], sort: SortKey, set_order: &RankTable) {
  match sort {
    SortKey::BinderOrder => {
      views.sort_by_key(|view| (set_order.rank(&view.card.set_code), view.card.collector_number()))
    }
    SortKey::Name => views.sort_by_cached_key(|view| NameKey::new(&view.card.name)),
    SortKey::PriceAsc => views.sort_by(|a, b| compare_price(a.card.price, b.card.price)),
    SortKey::PriceDesc => views.sort_by(|a, b| compare_price(b.card.price, a.card.price)),
    SortKey::Rarity => views
      .sort_by_cached_key(|view| (Reverse(view.card.rarity.rank()), NameKey::new(&view.card.name))),
    SortKey::SetNumber => views.sort_by_key(|view| view.card.collector_number()),
  }
}

fn compare_price(a: f64, b: f64) -> Ordering {
  a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Collation key approximating a locale compare: base letters first, then
/// accents, then the raw text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct NameKey {
  base: String,
  accented: String,
  raw: String,
}

impl NameKey {
  fn new(name: &str) -> Self {
    let accented: String = name.nfd().collect::<String>().to_lowercase();
    let base = accented.chars().filter(|c| !is_combining_mark(*c)).collect();
    Self {
      base,
      accented,
      raw: name.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::Rarity;

  fn card(id: &str, set_code: &str, number: &str) -> Card {
    Card {
      id: id.to_string(),
      name: id.to_string(),
      set_number: number.to_string(),
      set_code: set_code.to_string(),
      subset: "Main Set".to_string(),
      rarity: Rarity::Common,
      price: 1.0,
      foil_price: 0.0,
      sources: vec!["Normal Boosters".to_string()],
      image_url: None,
      has_foil: true,
      has_nonfoil: true,
      type_line: String::new(),
    }
  }

  fn state(regular: bool, foil: bool) -> OwnershipState {
    OwnershipState { regular, foil }
  }

  fn ids(views: &[CardView<'_>]) -> Vec<String> {
    views.iter().map(|view| view.card.id.clone()).collect()
  }

  fn unfiltered<'a>(catalog: &'a Catalog, sort: SortKey, order: &RankTable) -> Vec<CardView<'a>> {
    list_cards(catalog, &OwnershipRecord::new(), &FilterSpec::default(), sort, order)
  }

  fn filtered(catalog: &Catalog, filter: &FilterSpec) -> Vec<String> {
    let views = list_cards(
      catalog,
      &OwnershipRecord::new(),
      filter,
      SortKey::SetNumber,
      &RankTable::default(),
    );
    ids(&views)
  }

  #[test]
  fn legacy_and_unknown_modes_parse() {
    assert_eq!(OwnershipMode::parse("true"), Some(OwnershipMode::Owned));
    assert_eq!(OwnershipMode::parse("false"), Some(OwnershipMode::NotOwned));
    assert_eq!(OwnershipMode::parse("sideways"), None);
    assert_eq!(OwnershipMode::parse(""), None);
    assert_eq!(SortKey::parse("bogus"), SortKey::SetNumber);
    assert_eq!(SortKey::parse("priceDesc"), SortKey::PriceDesc);
  }

  #[test]
  fn mode_and_sort_names_parse_back() {
    let modes = [
      OwnershipMode::Owned,
      OwnershipMode::NotOwned,
      OwnershipMode::AllVariantsOwned,
      OwnershipMode::AllVariantsNotOwned,
      OwnershipMode::IncompleteVariants,
      OwnershipMode::Foil,
      OwnershipMode::Regular,
      OwnershipMode::FoilNotOwned,
      OwnershipMode::RegularNotOwned,
    ];
    for mode in modes {
      assert_eq!(OwnershipMode::parse(mode.as_str()), Some(mode));
    }

    let sorts = [
      SortKey::BinderOrder,
      SortKey::Name,
      SortKey::PriceAsc,
      SortKey::PriceDesc,
      SortKey::Rarity,
      SortKey::SetNumber,
    ];
    for sort in sorts {
      assert_eq!(SortKey::parse(sort.as_str()), sort);
    }
  }

  #[test]
  fn all_variants_owned_respects_offered_finishes() {
    let mut foil_only = card("f", "SPM", "1");
    foil_only.has_nonfoil = false;
    assert!(OwnershipMode::AllVariantsOwned.matches(&foil_only, state(false, true)));
    assert!(!OwnershipMode::AllVariantsOwned.matches(&foil_only, state(true, false)));

    let both = card("b", "SPM", "2");
    assert!(!OwnershipMode::AllVariantsOwned.matches(&both, state(true, false)));
    assert!(OwnershipMode::AllVariantsOwned.matches(&both, state(true, true)));
    assert!(OwnershipMode::AllVariantsNotOwned.matches(&both, state(false, false)));

    let mut nonfoil_only = card("n", "SPM", "3");
    nonfoil_only.has_foil = false;
    assert!(OwnershipMode::AllVariantsNotOwned.matches(&nonfoil_only, state(false, true)));
  }

  #[test]
  fn cards_without_finishes_never_satisfy_variant_modes() {
    let mut degenerate = card("d", "SPM", "1");
    degenerate.has_foil = false;
    degenerate.has_nonfoil = false;
    let states = [
      state(false, false),
      state(true, false),
      state(false, true),
      state(true, true),
    ];
    for ownership in states {
      assert!(!OwnershipMode::AllVariantsOwned.matches(&degenerate, ownership));
      assert!(!OwnershipMode::AllVariantsNotOwned.matches(&degenerate, ownership));
      assert!(!OwnershipMode::IncompleteVariants.matches(&degenerate, ownership));
    }
  }

  #[test]
  fn single_variant_modes_ignore_offered_finishes() {
    let mut nonfoil_only = card("n", "SPM", "1");
    nonfoil_only.has_foil = false;
    assert!(OwnershipMode::Foil.matches(&nonfoil_only, state(false, true)));
    assert!(OwnershipMode::FoilNotOwned.matches(&nonfoil_only, state(true, false)));
    assert!(OwnershipMode::Regular.matches(&nonfoil_only, state(true, false)));
    assert!(!OwnershipMode::RegularNotOwned.matches(&nonfoil_only, state(true, true)));
  }

  #[test]
  fn binder_order_ranks_sets_then_numbers() {
    let catalog = Catalog::new(vec![
      card("mar-2", "MAR", "2"),
      card("spm-10", "SPM", "10"),
      card("zzz-1", "ZZZ", "5"),
      card("spm-2", "SPM", "2"),
      card("aaa-1", "AAA", "5"),
      card("spe-1", "SPE", "1"),
    ])
    .unwrap();
    let order = RankTable::new(["SPM", "SPE", "MAR"]);
    let views = unfiltered(&catalog, SortKey::BinderOrder, &order);
    assert_eq!(ids(&views), vec!["spm-2", "spm-10", "spe-1", "mar-2", "zzz-1", "aaa-1"]);
  }

  #[test]
  fn set_number_sort_is_stable_for_unparseable_numbers() {
    let catalog = Catalog::new(vec![
      card("b", "SPM", "★"),
      card("c", "SPM", "3"),
      card("a", "SPM", "x"),
    ])
    .unwrap();
    let views = unfiltered(&catalog, SortKey::parse("nope"), &RankTable::default());
    assert_eq!(ids(&views), vec!["b", "a", "c"]);
  }

  #[test]
  fn name_sort_ignores_case_and_accents() {
    let catalog = Catalog::new(vec![
      card("beta", "SPM", "1"),
      card("Arana", "SPM", "2"),
      card("Ázure", "SPM", "3"),
      card("alpha", "SPM", "4"),
    ])
    .unwrap();
    let views = unfiltered(&catalog, SortKey::Name, &RankTable::default());
    assert_eq!(ids(&views), vec!["alpha", "Arana", "Ázure", "beta"]);
  }

  #[test]
  fn rarity_sort_descends_then_breaks_ties_by_name() {
    let mut mythic = card("Venom", "SPM", "1");
    mythic.rarity = Rarity::MythicRare;
    let mut rare_b = card("Kraven", "SPM", "2");
    rare_b.rarity = Rarity::Rare;
    let mut rare_a = card("Carnage", "SPM", "3");
    rare_a.rarity = Rarity::Rare;
    let mut odd = card("Token", "SPM", "4");
    odd.rarity = Rarity::Other("Special".to_string());
    let common = card("Web", "SPM", "5");

    let catalog = Catalog::new(vec![odd, common, rare_b, mythic, rare_a]).unwrap();
    let views = unfiltered(&catalog, SortKey::Rarity, &RankTable::default());
    assert_eq!(ids(&views), vec!["Venom", "Carnage", "Kraven", "Web", "Token"]);
  }

  #[test]
  fn price_sorts_keep_ties_in_catalog_order() {
    let mut cheap = card("cheap", "SPM", "1");
    cheap.price = 0.1;
    let mut tie_a = card("tie-a", "SPM", "2");
    tie_a.price = 2.0;
    let mut tie_b = card("tie-b", "SPM", "3");
    tie_b.price = 2.0;
    let catalog = Catalog::new(vec![tie_a, cheap, tie_b]).unwrap();

    let asc = unfiltered(&catalog, SortKey::PriceAsc, &RankTable::default());
    assert_eq!(ids(&asc), vec!["cheap", "tie-a", "tie-b"]);
    let desc = unfiltered(&catalog, SortKey::PriceDesc, &RankTable::default());
    assert_eq!(ids(&desc), vec!["tie-a", "tie-b", "cheap"]);
  }

  #[test]
  fn structural_filters_are_conjunctive() {
    let mut showcase = card("showcase", "SPM", "1");
    showcase.subset = "Showcase".to_string();
    showcase.sources = vec!["Collection Boosters".to_string()];
    showcase.price = 5.0;
    let mut rare = card("rare", "SPM", "2");
    rare.rarity = Rarity::Rare;
    rare.price = 3.0;
    let other_set = card("mar", "MAR", "3");
    let catalog = Catalog::new(vec![showcase, rare, other_set]).unwrap();

    let filter = FilterSpec {
      sets: vec!["SPM".to_string()],
      ..FilterSpec::default()
    };
    assert_eq!(filtered(&catalog, &filter), vec!["showcase", "rare"]);

    let filter = FilterSpec {
      source: Some("Collection".to_string()),
      ..FilterSpec::default()
    };
    assert_eq!(filtered(&catalog, &filter), vec!["showcase"]);

    let filter = FilterSpec {
      min_price: Some(3.0),
      max_price: Some(3.0),
      ..FilterSpec::default()
    };
    assert_eq!(filtered(&catalog, &filter), vec!["rare"]);

    let filter = FilterSpec {
      rarity: Some("Rare".to_string()),
      subset: Some("Showcase".to_string()),
      ..FilterSpec::default()
    };
    assert!(filtered(&catalog, &filter).is_empty());

    let filter = FilterSpec {
      subset: Some(String::new()),
      ..FilterSpec::default()
    };
    assert_eq!(filtered(&catalog, &filter).len(), 3);
  }

  #[test]
  fn search_matches_name_or_number() {
    let catalog =
      Catalog::new(vec![card("Spider-Man", "SPM", "107"), card("Venom", "SPM", "12")]).unwrap();
    let views = unfiltered(&catalog, SortKey::SetNumber, &RankTable::default());
    assert_eq!(ids(&search(views.clone(), "spider")), vec!["Spider-Man"]);
    assert_eq!(ids(&search(views.clone(), "12")), vec!["Venom"]);
    assert_eq!(search(views, "  ").len(), 2);
  }

  #[test]
  fn rank_table_parses_comma_lists() {
    let table = RankTable::parse_list("SPM, SPE,,MAR");
    assert_eq!(table.codes(), &["SPM", "SPE", "MAR"]);
    assert_eq!(table.rank("SPE"), 1);
    assert_eq!(table.rank("XYZ"), 3);
  }

  #[test]
  fn card_view_serializes_with_card_fields() {
    let spm = card("a", "SPM", "1");
    let view = CardView::new(&spm, state(true, false));
    let value = serde_json::to_value(view).unwrap();
    assert_eq!(value["id"], "a");
    assert_eq!(value["set"], "SPM");
    assert_eq!(value["owned"], true);
    assert_eq!(value["ownedFoil"], false);
  }

  #[test]
  fn card_view_resolves_missing_image_to_placeholder() {
    let mut kapow = card("k", "SPM", "1");
    kapow.name = "Kapow!".to_string();
    let view = CardView::new(&kapow, state(false, false));
    let expected = "https://via.placeholder.com/250x350/1a1a2e/dc143c?text=Kapow!";
    assert_eq!(view.placeholder_image.as_deref(), Some(expected));
    let value = serde_json::to_value(&view).unwrap();
    assert_eq!(value["imageUrl"], expected);

    kapow.image_url = Some("  ".to_string());
    let blank = serde_json::to_value(CardView::new(&kapow, state(false, false))).unwrap();
    assert_eq!(blank["imageUrl"], expected);

    kapow.image_url = Some("https://img.example/kapow.jpg".to_string());
    let view = CardView::new(&kapow, state(false, false));
    assert_eq!(view.placeholder_image, None);
    let text = serde_json::to_string(&view).unwrap();
    assert_eq!(text.matches("\"imageUrl\"").count(), 1);
    assert!(text.contains("https://img.example/kapow.jpg"));
  }
}
