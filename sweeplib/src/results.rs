use std::fs::File;
use std::io;
use std::io::Write;
use std::path::Path;
use serde::Serialize;
use crate::error::SweepError;
use crate::geometry::{CacheGeometry, Policy};

pub const HEADER: [&str; 7] = [
    "policy",
    "ways",
    "block_offset_bits",
    "victim_entries",
    "replacement_width",
    "total_bits",
    "tick_count",
];

/// The outcome of one trial. A missing tick count means the trial timed out, crashed, or printed
/// nothing parseable
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExperimentResult {
    pub geometry: CacheGeometry,
    pub tick_count: Option<u64>,
}

impl ExperimentResult {
    pub fn policy(&self) -> Policy {
        self.geometry.policy
    }
}

#[derive(Serialize)]
struct Row {
    policy: Policy,
    ways: u64,
    block_offset_bits: u32,
    victim_entries: u64,
    replacement_width: Option<u32>,
    total_bits: u64,
    tick_count: Option<u64>,
}

impl From<&ExperimentResult> for Row {
    fn from(value: &ExperimentResult) -> Self {
        let g = &value.geometry;
        Self {
            policy: g.policy,
            ways: g.ways,
            block_offset_bits: g.block_offset_bits,
            victim_entries: g.victim_entries,
            replacement_width: g.replacement_width,
            total_bits: g.total_bits,
            tick_count: value.tick_count,
        }
    }
}

/// Append-only CSV table of experiment results
///
/// Unknown tick counts and absent replacement widths are written as empty fields. Every row is
/// flushed as soon as it is appended, so an interrupted sweep keeps every completed trial
pub struct ResultsTable<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl ResultsTable<File> {
    /// Creates (or truncates) the results file and writes the header
    pub fn create(path: &Path) -> Result<Self, SweepError> {
        let file = File::create(path).map_err(|source| SweepError::Output {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file)
    }
}

impl<W: Write> ResultsTable<W> {
    pub fn new(inner: W) -> Result<Self, SweepError> {
        // The header is written by hand so even an empty sweep produces one
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(inner);
        writer.write_record(HEADER)?;
        writer.flush().map_err(csv::Error::from)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn append(&mut self, result: &ExperimentResult) -> Result<(), SweepError> {
        self.writer.serialize(Row::from(result))?;
        self.writer.flush().map_err(csv::Error::from)?;
        self.rows += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Gets the underlying writer back, flushing anything still buffered
    pub fn into_inner(self) -> Result<W, SweepError> {
        self.writer
            .into_inner()
            .map_err(|e| SweepError::Csv(csv::Error::from(io::Error::new(io::ErrorKind::Other, e.to_string()))))
    }
}
