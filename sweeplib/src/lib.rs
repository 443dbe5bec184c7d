//! # SweepLib
//!
//! Sweeplib explores the design space of a set-associative cache under a fixed storage budget
//!
//! It enumerates every feasible cache geometry for two replacement policy families, then drives an
//! external cache simulator once per geometry and collects the reported tick counts into a table
//!
//! The simulator itself is treated as an opaque binary; this library only decides how big a
//! configuration may be, and how to run and read back one trial

/// Contains the per-line bit cost model shared by both replacement policy families
pub mod bit_model;

/// Contains the sweep configuration, which can be loaded from JSON
pub mod config;

/// Contains the sequential experiment driver and the top level sweep entry point
pub mod driver;

/// Contains the simulator invocation: config rendering, the subprocess, and output parsing
pub mod engine;

/// Contains the error types for whole sweeps and for individual trials
pub mod error;

/// Contains the geometry search for the counter-based and recency-based policies
pub mod geometry;

/// Contains trace path resolution and the per-trace file names
pub mod paths;

/// Contains the experiment result rows and the CSV results table
pub mod results;

#[cfg(test)]
mod test;
