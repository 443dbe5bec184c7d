use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use crate::engine::{parse_ticks, render_config, SimulatorEngine, TrialRunner};
use crate::error::TrialError;
use crate::geometry::{CacheGeometry, Policy};

fn counter_geometry() -> CacheGeometry {
    CacheGeometry {
        policy: Policy::CounterBased,
        ways: 3456,
        block_offset_bits: 6,
        replacement_width: Some(1),
        victim_entries: 0,
        total_bits: 432000,
    }
}

/// Writes a shell script standing in for the simulator, run through `/bin/sh` so it doesn't need to
/// be executable
fn fake_engine(dir: &TempDir, script: &str) -> SimulatorEngine {
    let script_path = dir.path().join("engine.sh");
    fs::write(&script_path, script).unwrap();
    let trace = dir.path().join("app.trace");
    fs::write(&trace, "").unwrap();
    SimulatorEngine::new("/bin/sh", dir.path().join("sweep_app.config"), trace)
        .with_launcher_args(vec![script_path.to_string_lossy().into_owned()])
        .with_timeout(Duration::from_secs(5))
}

#[test]
fn parses_first_ticks_line() {
    assert_eq!(parse_ticks("Ticks - 104235"), Some(104235));
    assert_eq!(parse_ticks("warmup\nTicks-12\nTicks - 99\n"), Some(12));
    assert_eq!(parse_ticks("... Ticks  -   7 ..."), Some(7));
    assert_eq!(parse_ticks("Ticks - "), None);
    assert_eq!(parse_ticks(""), None);
}

#[test]
fn recency_config_has_no_replacement_width() {
    let mut g = counter_geometry();
    g.policy = Policy::RecencyBased;
    g.replacement_width = None;
    assert_eq!(
        render_config(&g),
        "__processor\n__cache -E 3456 -b 6 -s 0 -i 0\n__branch\n__memory\n__interconnect\n__coherence\n\n"
    );
}

#[cfg(unix)]
mod subprocess {
    use super::*;

    #[test]
    fn reads_ticks_from_stdout() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Loading config'\necho '... Ticks - 104235 ...'\n");
        assert_eq!(engine.run_trial(&counter_geometry()).unwrap(), 104235);
    }

    #[test]
    fn reads_ticks_from_stderr() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Ticks - 42' >&2\n");
        assert_eq!(engine.run_trial(&counter_geometry()).unwrap(), 42);
    }

    #[test]
    fn passes_config_component_and_trace() {
        let dir = TempDir::new().unwrap();
        let script = "cp \"$2\" \"$(dirname \"$2\")/seen.config\"\necho \"$@\" > \"$(dirname \"$2\")/args.txt\"\necho 'Ticks - 1'\n";
        let mut engine = fake_engine(&dir, script).with_component("myCache");
        engine.run_trial(&counter_geometry()).unwrap();
        let seen = fs::read_to_string(dir.path().join("seen.config")).unwrap();
        assert_eq!(seen, render_config(&counter_geometry()));
        let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        let config = engine.config_path().to_string_lossy().into_owned();
        let trace = dir.path().join("app.trace").to_string_lossy().into_owned();
        assert_eq!(args.trim(), format!("-s {config} -c myCache -t {trace}"));
    }

    #[test]
    fn config_is_overwritten_each_trial() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Ticks - 1'\n");
        engine.run_trial(&counter_geometry()).unwrap();
        let mut second = counter_geometry();
        second.replacement_width = Some(2);
        second.ways = 3428;
        engine.run_trial(&second).unwrap();
        let written = fs::read_to_string(engine.config_path()).unwrap();
        assert_eq!(written, render_config(&second));
    }

    #[test]
    fn missing_ticks_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Simulation finished'\n");
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::MissingTicks));
        assert!(!err.is_fatal());
    }

    #[test]
    fn non_zero_exit_discards_ticks() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Ticks - 5'\nexit 3\n");
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::ExitStatus { code: Some(3) }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn slow_simulator_is_killed() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "exec sleep 10\n").with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::Timeout { .. }));
        assert!(!err.is_fatal());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn timeout_holds_when_simulator_has_children() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "sleep 6\necho 'Ticks - 1'\n").with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn leftover_process_holding_output_times_out() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "sleep 6 &\necho 'Ticks - 3'\n").with_timeout(Duration::from_millis(300));
        let start = Instant::now();
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        let dir = TempDir::new().unwrap();
        let mut engine = fake_engine(&dir, "echo 'Ticks - 77'\n").with_timeout(Duration::MAX);
        assert_eq!(engine.run_trial(&counter_geometry()).unwrap(), 77);
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let dir = TempDir::new().unwrap();
        let mut engine = SimulatorEngine::new(
            dir.path().join("no-such-engine"),
            dir.path().join("sweep.config"),
            dir.path().join("app.trace"),
        );
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::Spawn(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn unwritable_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing_dir: PathBuf = dir.path().join("missing").join("sweep.config");
        let mut engine = SimulatorEngine::new("/bin/sh", missing_dir, Path::new("app.trace"));
        let err = engine.run_trial(&counter_geometry()).unwrap_err();
        assert!(matches!(err, TrialError::ConfigWrite(_)));
        assert!(err.is_fatal());
    }
}
