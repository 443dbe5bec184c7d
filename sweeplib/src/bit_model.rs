use serde::Deserialize;

/// Fixed per-line allowance for the tag, valid/dirty, and coherence state bits
pub const TAG_OVERHEAD_BITS: i64 = 66;

/// Largest block offset the model accepts. Keeps `2^b` well inside an i64
pub const MAX_BLOCK_OFFSET_BITS: u32 = 30;

/// The bit cost model for one cache line
///
/// A line costs `tag_overhead_bits + replacement_bits - block_offset_bits + 2^block_offset_bits`
/// bits. The data payload is `2^b` bits, and every extra offset bit is one fewer tag bit to store
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
pub struct BitCostModel {
    pub tag_overhead_bits: i64,
}

impl Default for BitCostModel {
    fn default() -> Self {
        Self {
            tag_overhead_bits: TAG_OVERHEAD_BITS,
        }
    }
}

impl BitCostModel {
    pub fn new(tag_overhead_bits: i64) -> Self {
        Self { tag_overhead_bits }
    }

    /// Gets the cost in bits of a single line, or None if the line cost is non-positive
    ///
    /// A non-positive cost means the block size savings exceed the fixed overhead, which is a
    /// degenerate point of the search space and must never be emitted
    ///
    /// # Arguments
    ///
    /// * `replacement_bits`: Width of the per-line replacement metadata
    /// * `block_offset_bits`: log2 of the block size
    ///
    /// returns: Option<u64>
    ///
    /// # Examples
    ///
    /// ```
    /// use sweeplib::bit_model::BitCostModel;
    /// let model = BitCostModel::default();
    /// assert_eq!(model.line_bits(1, 6), Some(125));
    /// ```
    pub fn line_bits(&self, replacement_bits: u32, block_offset_bits: u32) -> Option<u64> {
        let payload = 1i64.checked_shl(block_offset_bits)?;
        let bits = self
            .tag_overhead_bits
            .checked_add(replacement_bits as i64)?
            .checked_sub(block_offset_bits as i64)?
            .checked_add(payload)?;
        if bits > 0 {
            Some(bits as u64)
        } else {
            None
        }
    }

    /// Gets the cost of a victim structure with `entries` lines, each carrying a recency index of
    /// `ceil(log2(entries))` bits
    ///
    /// Zero entries always cost nothing. None means a victim line is degenerate
    pub fn victim_bits(&self, entries: u64, block_offset_bits: u32) -> Option<u64> {
        if entries == 0 {
            return Some(0);
        }
        let line = self.line_bits(ceil_log2(entries), block_offset_bits)?;
        entries.checked_mul(line)
    }

    /// Splits a budget into the victim structure's cost and the residual left for the main
    /// structure
    ///
    /// Returns None if the victim structure is degenerate or leaves nothing for the main structure
    pub fn residual_budget(&self, budget_bits: u64, victim_entries: u64, block_offset_bits: u32) -> Option<Budget> {
        let victim_bits = self.victim_bits(victim_entries, block_offset_bits)?;
        match budget_bits.checked_sub(victim_bits) {
            Some(residual_bits) if residual_bits > 0 => Some(Budget {
                victim_bits,
                residual_bits,
            }),
            _ => None,
        }
    }
}

/// The budget left for the main structure once the victim structure has been paid for
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Budget {
    pub victim_bits: u64,
    pub residual_bits: u64,
}

/// Number of bits needed to index `n` entries, with `ceil_log2(0) == ceil_log2(1) == 0`
///
/// # Examples
///
/// ```
/// use sweeplib::bit_model::ceil_log2;
/// assert_eq!(ceil_log2(1), 0);
/// assert_eq!(ceil_log2(3176), 12);
/// assert_eq!(ceil_log2(4096), 12);
/// ```
pub fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        (n - 1).ilog2() + 1
    }
}
