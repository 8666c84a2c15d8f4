use serde::Serialize;
use std::collections::HashMap;

use crate::catalog::{Card, Variant};
use crate::listing::{CardView, RankTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
  #[default]
  Set,
  Subset,
}

impl GroupBy {
  pub fn key<'c>(&self, card: &'c Card) -> &'c str {
    match self {
      GroupBy::Set => &card.set_code,
      GroupBy::Subset => &card.subset,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProgress {
  pub group_code: String,
  pub total: usize,
  pub owned: usize,
  pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
  pub total_cards: usize,
  pub unique_owned: usize,
  pub percentage: f64,
  pub total_master_cards: usize,
  pub owned_master_cards: usize,
  pub master_percentage: f64,
  pub total_value: f64,
  pub owned_value: f64,
  pub breakdown: Vec<GroupProgress>,
}

/// Rounds half away from zero at the given number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round() / factor
}

/// 100 × part / whole to one decimal, rounded half away from zero in integer
/// arithmetic; 0 when `whole` is 0.
pub fn percentage(part: usize, whole: usize) -> f64 {
  if whole == 0 {
    return 0.0;
  }
  let (part, whole) = (part as u64, whole as u64);
  ((2000 * part + whole) / (2 * whole)) as f64 / 10.0
}

/// Groups in first-seen order, then reordered by `order`. Unknown groups tie
/// at the end and keep their first-seen order.
struct Grouped<T> {
  entries: Vec<(String, T)>,
  index: HashMap<String, usize>,
}

impl<T: Default> Grouped<T> {
  fn new() -> Self {
    Self {
      entries: Vec::new(),
      index: HashMap::new(),
    }
  }

  fn entry(&mut self, code: &str) -> &mut T {
    let position = match self.index.get(code) {
      Some(&position) => position,
      None => {
        self.entries.push((code.to_string(), T::default()));
        self.index.insert(code.to_string(), self.entries.len() - 1);
        self.entries.len() - 1
      }
    };
    &mut self.entries[position].1
  }

  fn into_ordered(mut self, order: &RankTable) -> Vec<(String, T)> {
    self.entries.sort_by_key(|(code, _)| order.rank(code));
    self.entries
  }
}

#[derive(Default)]
struct GroupCounts {
  total: usize,
  owned: usize,
}

pub fn compute_stats(
  cards: &[CardView<'_>],
  group_by: GroupBy,
  order: &RankTable,
) -> StatsSummary {
  let mut unique_owned = 0;
  let mut total_master_cards = 0;
  let mut owned_master_cards = 0;
  let mut total_value = 0.0;
  let mut owned_value = 0.0;
  let mut groups: Grouped<GroupCounts> = Grouped::new();

  for view in cards {
    let card = view.card;
    total_value += card.price;
    total_master_cards += card.master_slots() as usize;

    if view.owns_any() {
      unique_owned += 1;
    }
    let state = view.state();
    owned_master_cards += [Variant::Regular, Variant::Foil]
      .into_iter()
      .filter(|&variant| state.has(variant) && card.offers(variant))
      .count();
    if view.owned {
      owned_value += card.price;
    }
    if view.owned_foil {
      owned_value += card.foil_value();
    }

    let counts = groups.entry(group_by.key(card));
    counts.total += 1;
    if view.owns_any() {
      counts.owned += 1;
    }
  }

  let breakdown = groups
    .into_ordered(order)
    .into_iter()
    .map(|(group_code, counts)| GroupProgress {
      group_code,
      total: counts.total,
      owned: counts.owned,
      percentage: percentage(counts.owned, counts.total),
    })
    .collect();

  StatsSummary {
    total_cards: cards.len(),
    unique_owned,
    percentage: percentage(unique_owned, cards.len()),
    total_master_cards,
    owned_master_cards,
    master_percentage: percentage(owned_master_cards, total_master_cards),
    total_value: round_to(total_value, 2),
    owned_value: round_to(owned_value, 2),
    breakdown,
  }
}

/// Printings available per group: unique cards, nonfoil and foil printings,
/// and the master-set slots they add up to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantBreakdown {
  pub group_code: String,
  pub total: usize,
  pub nonfoil: usize,
  pub foil: usize,
  pub master_slots: usize,
}

pub fn variant_breakdown(
  cards: &[Card],
  group_by: GroupBy,
  order: &RankTable,
) -> Vec<VariantBreakdown> {
  let mut groups: Grouped<VariantBreakdown> = Grouped::new();
  for card in cards {
    let entry = groups.entry(group_by.key(card));
    entry.total += 1;
    if card.has_nonfoil {
      entry.nonfoil += 1;
    }
    if card.has_foil {
      entry.foil += 1;
    }
    entry.master_slots += card.master_slots() as usize;
  }

  groups
    .into_ordered(order)
    .into_iter()
    .map(|(group_code, counts)| VariantBreakdown { group_code, ..counts })
    .collect()
}
