use std::fmt;
use std::ops::RangeInclusive;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use crate::bit_model::{ceil_log2, BitCostModel, Budget};

/// The replacement policy family a geometry was sized for
///
/// The counter-based family (RRIP style) carries a free replacement width per line. The
/// recency-based family (LRU) needs `ceil(log2(ways))` bits per line, so its width follows from
/// the associativity
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Policy {
    #[serde(rename = "RRIP", alias = "rrip")]
    #[value(name = "rrip")]
    CounterBased,
    #[serde(rename = "LRU", alias = "lru")]
    #[value(name = "lru")]
    RecencyBased,
}

impl Policy {
    pub fn name(&self) -> &'static str {
        match self {
            Policy::CounterBased => "RRIP",
            Policy::RecencyBased => "LRU",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A candidate cache configuration, annotated with its exact storage cost
///
/// `total_bits` includes the victim structure, and never exceeds the budget it was searched under
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CacheGeometry {
    pub policy: Policy,
    pub ways: u64,
    pub block_offset_bits: u32,
    /// Only present for the counter-based policy
    pub replacement_width: Option<u32>,
    pub victim_entries: u64,
    pub total_bits: u64,
}

impl CacheGeometry {
    /// Gets the replacement width actually stored per line, including the implied width for the
    /// recency-based policy
    pub fn effective_replacement_width(&self) -> u32 {
        self.replacement_width.unwrap_or_else(|| ceil_log2(self.ways))
    }

    /// Renders the cache directive for this geometry, e.g. `__cache -E 3456 -b 6 -s 0 -i 0 -R 1`
    ///
    /// The set index width is always 0, every geometry is a single fully associative set
    pub fn cache_directive(&self) -> String {
        let mut directive = format!(
            "__cache -E {} -b {} -s 0 -i {}",
            self.ways, self.block_offset_bits, self.victim_entries
        );
        if let Some(k) = self.replacement_width {
            directive.push_str(&format!(" -R {k}"));
        }
        directive
    }
}

/// Restartable front end for the geometry search
///
/// Each call to [`GeometrySearch::geometries`] returns a fresh lazy iterator, so the same search can
/// be replayed and always yields the same sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometrySearch {
    budget_bits: u64,
    block_offset_bits: RangeInclusive<u32>,
    victim_entries: u64,
    model: BitCostModel,
}

impl GeometrySearch {
    pub fn new(budget_bits: u64, block_offset_bits: RangeInclusive<u32>) -> Self {
        Self {
            budget_bits,
            block_offset_bits,
            victim_entries: 0,
            model: BitCostModel::default(),
        }
    }

    pub fn with_victim_entries(mut self, victim_entries: u64) -> Self {
        self.victim_entries = victim_entries;
        self
    }

    pub fn with_model(mut self, model: BitCostModel) -> Self {
        self.model = model;
        self
    }

    pub fn budget_bits(&self) -> u64 {
        self.budget_bits
    }

    pub fn counter_based(&self) -> CounterSearch {
        CounterSearch {
            model: self.model,
            budget_bits: self.budget_bits,
            victim_entries: self.victim_entries,
            offsets: self.block_offset_bits.clone(),
            row: None,
        }
    }

    pub fn recency_based(&self) -> RecencySearch {
        RecencySearch {
            model: self.model,
            budget_bits: self.budget_bits,
            victim_entries: self.victim_entries,
            offsets: self.block_offset_bits.clone(),
        }
    }

    pub fn geometries(&self, policy: Policy) -> GeometryIter {
        match policy {
            Policy::CounterBased => GeometryIter::from(self.counter_based()),
            Policy::RecencyBased => GeometryIter::from(self.recency_based()),
        }
    }
}

/// State for the block offset currently being explored by [`CounterSearch`]
#[derive(Debug, Clone)]
struct CounterRow {
    block_offset_bits: u32,
    budget: Budget,
    replacement_width: u32,
}

/// Closed form search for the counter-based policy
///
/// For each block offset, replacement widths 1, 2, 3, ... are tried with
/// `ways = floor(residual / line_bits)`. A width is emitted, then the row stops once `2^k > ways`,
/// as a counter wider than needed to index every way only wastes budget
#[derive(Debug, Clone)]
pub struct CounterSearch {
    model: BitCostModel,
    budget_bits: u64,
    victim_entries: u64,
    offsets: RangeInclusive<u32>,
    row: Option<CounterRow>,
}

impl Iterator for CounterSearch {
    type Item = CacheGeometry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.row.is_none() {
                let block_offset_bits = self.offsets.next()?;
                let Some(budget) = self.model.residual_budget(self.budget_bits, self.victim_entries, block_offset_bits) else {
                    continue;
                };
                self.row = Some(CounterRow {
                    block_offset_bits,
                    budget,
                    replacement_width: 1,
                });
            }
            let row = self.row.as_mut()?;
            let k = row.replacement_width;
            let Some(line_bits) = self.model.line_bits(k, row.block_offset_bits) else {
                self.row = None;
                continue;
            };
            let ways = row.budget.residual_bits / line_bits;
            if ways == 0 {
                self.row = None;
                continue;
            }
            let geometry = CacheGeometry {
                policy: Policy::CounterBased,
                ways,
                block_offset_bits: row.block_offset_bits,
                replacement_width: Some(k),
                victim_entries: self.victim_entries,
                total_bits: row.budget.victim_bits + ways * line_bits,
            };
            // Shifts of 64 or more are wider than any possible way count
            if 1u64.checked_shl(k).map_or(true, |span| span > ways) {
                self.row = None;
            } else {
                row.replacement_width += 1;
            }
            return Some(geometry);
        }
    }
}

/// Direct search for the recency-based policy, one geometry per block offset
///
/// The width depends on the way count, but the total cost is strictly increasing in the way
/// count, so the largest feasible associativity is found by binary search
#[derive(Debug, Clone)]
pub struct RecencySearch {
    model: BitCostModel,
    budget_bits: u64,
    victim_entries: u64,
    offsets: RangeInclusive<u32>,
}

impl Iterator for RecencySearch {
    type Item = CacheGeometry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let block_offset_bits = self.offsets.next()?;
            let Some(budget) = self.model.residual_budget(self.budget_bits, self.victim_entries, block_offset_bits) else {
                continue;
            };
            let Some((ways, main_bits)) = max_recency_ways(&self.model, budget.residual_bits, block_offset_bits) else {
                continue;
            };
            return Some(CacheGeometry {
                policy: Policy::RecencyBased,
                ways,
                block_offset_bits,
                replacement_width: None,
                victim_entries: self.victim_entries,
                total_bits: budget.victim_bits + main_bits,
            });
        }
    }
}

/// Cost of a recency-based structure with `ways` lines, None if degenerate or overflowing
pub fn recency_cost(model: &BitCostModel, ways: u64, block_offset_bits: u32) -> Option<u64> {
    let line_bits = model.line_bits(ceil_log2(ways), block_offset_bits)?;
    ways.checked_mul(line_bits)
}

/// Finds the largest way count whose recency-based cost fits in `budget_bits`
///
/// The cost is at least `ways * line_bits(0, b)`, which bounds the search. Returns the way count and
/// its cost, or None if not even a single way fits
fn max_recency_ways(model: &BitCostModel, budget_bits: u64, block_offset_bits: u32) -> Option<(u64, u64)> {
    let base_line_bits = model.line_bits(0, block_offset_bits)?;
    let mut low = 0u64;
    let mut high = budget_bits / base_line_bits;
    while low < high {
        let mid = low + (high - low + 1) / 2;
        match recency_cost(model, mid, block_offset_bits) {
            Some(cost) if cost <= budget_bits => low = mid,
            _ => high = mid - 1,
        }
    }
    if low == 0 {
        return None;
    }
    let cost = recency_cost(model, low, block_offset_bits)?;
    Some((low, cost))
}

/// Both searches, dispatched statically
///
/// Avoids boxing the iterator, the driver can consume either policy through one concrete type
#[derive(Debug, Clone)]
pub enum GeometryIter {
    Counter(CounterSearch),
    Recency(RecencySearch),
}

impl From<CounterSearch> for GeometryIter {
    fn from(value: CounterSearch) -> Self {
        Self::Counter(value)
    }
}

impl From<RecencySearch> for GeometryIter {
    fn from(value: RecencySearch) -> Self {
        Self::Recency(value)
    }
}

impl Iterator for GeometryIter {
    type Item = CacheGeometry;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            GeometryIter::Counter(s) => s.next(),
            GeometryIter::Recency(s) => s.next(),
        }
    }
}
