use std::fs::File;
use std::io::BufReader;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use crate::bit_model::{BitCostModel, MAX_BLOCK_OFFSET_BITS, TAG_OVERHEAD_BITS};
use crate::error::SweepError;
use crate::geometry::{GeometrySearch, Policy};

/// Budget capacity in kB, one kB being 8000 bits
pub const CAPACITY_KB: u64 = 54;
pub const BITS_PER_KB: u64 = 8000;
pub const DEFAULT_BUDGET_BITS: u64 = CAPACITY_KB * BITS_PER_KB;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ENGINE: &str = "./cadss-engine";
pub const DEFAULT_COMPONENT: &str = "refCache";

/// Everything needed to run one sweep. Every field is optional in JSON and falls back to the
/// default sweep
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub budget_bits: u64,
    pub min_block_offset_bits: u32,
    pub max_block_offset_bits: u32,
    /// One pass over the block offsets per entry, in order
    pub victim_entries: Vec<u64>,
    /// Policies are swept in this order
    pub policies: Vec<Policy>,
    pub timeout_secs: u64,
    pub engine: PathBuf,
    /// Placed before the simulator flags, useful when the engine is a launcher such as `sh`
    pub engine_args: Vec<String>,
    /// Reference cache component passed with `-c`
    pub component: String,
    pub trace_dir: PathBuf,
    pub output_dir: PathBuf,
    pub tag_overhead_bits: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            budget_bits: DEFAULT_BUDGET_BITS,
            min_block_offset_bits: 4,
            max_block_offset_bits: 10,
            victim_entries: vec![0],
            policies: vec![Policy::CounterBased, Policy::RecencyBased],
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            engine: PathBuf::from(DEFAULT_ENGINE),
            engine_args: Vec::new(),
            component: DEFAULT_COMPONENT.to_string(),
            trace_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            tag_overhead_bits: TAG_OVERHEAD_BITS,
        }
    }
}

impl SweepConfig {
    /// Loads a configuration from a JSON file, fields left out keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, SweepError> {
        let file = File::open(path).map_err(|source| SweepError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.budget_bits == 0 {
            return Err(SweepError::InvalidConfig("the storage budget must be positive".into()));
        }
        if self.min_block_offset_bits > self.max_block_offset_bits {
            return Err(SweepError::InvalidConfig(format!(
                "block offset range {}..={} is empty",
                self.min_block_offset_bits, self.max_block_offset_bits
            )));
        }
        if self.max_block_offset_bits > MAX_BLOCK_OFFSET_BITS {
            return Err(SweepError::InvalidConfig(format!(
                "block offset bits can't exceed {MAX_BLOCK_OFFSET_BITS}"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(SweepError::InvalidConfig("the trial timeout must be positive".into()));
        }
        if self.policies.is_empty() {
            return Err(SweepError::InvalidConfig("at least one policy must be swept".into()));
        }
        Ok(())
    }

    pub fn block_offset_bits(&self) -> RangeInclusive<u32> {
        self.min_block_offset_bits..=self.max_block_offset_bits
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn model(&self) -> BitCostModel {
        BitCostModel::new(self.tag_overhead_bits)
    }

    /// Builds the geometry search for one victim structure size
    pub fn search(&self, victim_entries: u64) -> GeometrySearch {
        GeometrySearch::new(self.budget_bits, self.block_offset_bits())
            .with_victim_entries(victim_entries)
            .with_model(self.model())
    }
}
