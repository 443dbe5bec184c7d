use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use crate::config::{SweepConfig, DEFAULT_BUDGET_BITS};
use crate::error::SweepError;
use crate::geometry::Policy;
use crate::paths::SweepPaths;

#[test]
fn defaults_match_the_reference_sweep() {
    let config = SweepConfig::default();
    assert_eq!(config.budget_bits, 432000);
    assert_eq!(config.budget_bits, DEFAULT_BUDGET_BITS);
    assert_eq!(config.block_offset_bits(), 4..=10);
    assert_eq!(config.victim_entries, vec![0]);
    assert_eq!(config.policies, vec![Policy::CounterBased, Policy::RecencyBased]);
    assert_eq!(config.timeout(), Duration::from_secs(30));
    assert_eq!(config.component, "refCache");
    assert!(config.validate().is_ok());
}

#[test]
fn partial_json_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sweep.json");
    fs::write(&path, r#"{ "budget_bits": 64000, "policies": ["lru"], "victim_entries": [0, 4] }"#).unwrap();
    let config = SweepConfig::from_json_file(&path).unwrap();
    assert_eq!(config.budget_bits, 64000);
    assert_eq!(config.policies, vec![Policy::RecencyBased]);
    assert_eq!(config.victim_entries, vec![0, 4]);
    assert_eq!(config.max_block_offset_bits, 10);
    assert_eq!(config.tag_overhead_bits, 66);
}

#[test]
fn bad_json_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sweep.json");
    fs::write(&path, r#"{ "policies": ["fifo"] }"#).unwrap();
    assert!(matches!(SweepConfig::from_json_file(&path), Err(SweepError::ConfigParse(_))));
    assert!(matches!(
        SweepConfig::from_json_file(&dir.path().join("absent.json")),
        Err(SweepError::ConfigRead { .. })
    ));
}

#[test]
fn invalid_configs_are_rejected() {
    let invalid = [
        SweepConfig { budget_bits: 0, ..SweepConfig::default() },
        SweepConfig { min_block_offset_bits: 8, max_block_offset_bits: 6, ..SweepConfig::default() },
        SweepConfig { max_block_offset_bits: 40, ..SweepConfig::default() },
        SweepConfig { timeout_secs: 0, ..SweepConfig::default() },
        SweepConfig { policies: vec![], ..SweepConfig::default() },
    ];
    for config in invalid {
        assert!(matches!(config.validate(), Err(SweepError::InvalidConfig(_))), "{config:?}");
    }
}

#[test]
fn trace_names_resolve_against_trace_dir() {
    let paths = SweepPaths::resolve("astar.trace", Path::new("/data/traces"), Path::new("out"));
    assert_eq!(paths.trace, Path::new("/data/traces/astar.trace"));
    assert_eq!(paths.stem, "astar");
    assert_eq!(paths.config, Path::new("out/sweep_astar.config"));

    let paths = SweepPaths::resolve("local/bzip2.trace", Path::new("/data/traces"), Path::new("."));
    assert_eq!(paths.trace, Path::new("local/bzip2.trace"));
    assert_eq!(paths.results, Path::new("./results_bzip2.csv"));
}
