use std::io::Write;
use std::path::Path;
use log::{info, warn};
use crate::config::SweepConfig;
use crate::engine::{SimulatorEngine, TrialRunner};
use crate::error::SweepError;
use crate::geometry::{CacheGeometry, Policy};
use crate::paths::SweepPaths;
use crate::results::{ExperimentResult, ResultsTable};

/// Runs trials strictly one at a time, in the order geometries are handed to it
///
/// A trial that times out, crashes, or prints nothing parseable is recorded with an unknown tick
/// count and the sweep carries on. Only fatal trial errors stop it
pub struct Driver<R: TrialRunner, W: Write> {
    runner: R,
    table: ResultsTable<W>,
    results: Vec<ExperimentResult>,
}

impl<R: TrialRunner, W: Write> Driver<R, W> {
    pub fn new(runner: R, table: ResultsTable<W>) -> Self {
        Self {
            runner,
            table,
            results: Vec::new(),
        }
    }

    /// Runs one trial and appends its row to the table
    pub fn run_one(&mut self, geometry: CacheGeometry) -> Result<ExperimentResult, SweepError> {
        info!("{}", geometry.cache_directive());
        let tick_count = match self.runner.run_trial(&geometry) {
            Ok(ticks) => Some(ticks),
            Err(e) if e.is_fatal() => return Err(SweepError::Trial(e)),
            Err(e) => {
                warn!("{} ({}): {e}", geometry.policy, geometry.cache_directive());
                None
            }
        };
        let result = ExperimentResult { geometry, tick_count };
        self.table.append(&result)?;
        self.results.push(result);
        Ok(result)
    }

    pub fn run<I: IntoIterator<Item = CacheGeometry>>(&mut self, geometries: I) -> Result<(), SweepError> {
        for geometry in geometries {
            self.run_one(geometry)?;
        }
        Ok(())
    }

    pub fn results(&self) -> &[ExperimentResult] {
        &self.results
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Finishes the sweep, handing back the table's writer and a summary of every trial
    pub fn finish(self) -> Result<(W, SweepSummary), SweepError> {
        let inner = self.table.into_inner()?;
        Ok((inner, SweepSummary { results: self.results }))
    }
}

/// Every trial of a finished sweep, in the order they ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub results: Vec<ExperimentResult>,
}

impl SweepSummary {
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.tick_count.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.completed()
    }

    /// The lowest tick count recorded for a policy, the first one wins ties
    pub fn best(&self, policy: Policy) -> Option<&ExperimentResult> {
        self.results
            .iter()
            .filter(|r| r.policy() == policy)
            .filter_map(|r| r.tick_count.map(|t| (t, r)))
            .min_by_key(|(t, _)| *t)
            .map(|(_, r)| r)
    }
}

/// Every geometry a configuration sweeps, in trial order: policy, then victim size, then block
/// offset, then replacement width
pub fn planned_geometries(config: &SweepConfig) -> impl Iterator<Item = CacheGeometry> + '_ {
    config.policies.iter().flat_map(move |&policy| {
        config
            .victim_entries
            .iter()
            .flat_map(move |&entries| config.search(entries).geometries(policy))
    })
}

/// Checks the preconditions that would make every trial fail the same way
pub fn check_preconditions(config: &SweepConfig, paths: &SweepPaths) -> Result<(), SweepError> {
    config.validate()?;
    if !paths.trace.exists() {
        return Err(SweepError::MissingTrace(paths.trace.clone()));
    }
    // Bare program names are looked up on PATH when spawned
    if config.engine.components().count() > 1 && !config.engine.exists() {
        return Err(SweepError::MissingEngine(config.engine.clone()));
    }
    Ok(())
}

/// Runs the whole sweep for one trace, writing the results table to `paths.results`
pub fn run_sweep(config: &SweepConfig, paths: &SweepPaths) -> Result<SweepSummary, SweepError> {
    check_preconditions(config, paths)?;
    info!("Trace: {}", paths.trace.display());
    info!("Config file: {}", paths.config.display());
    info!("Results CSV: {}", paths.results.display());

    let engine = SimulatorEngine::new(&config.engine, &paths.config, &paths.trace)
        .with_launcher_args(config.engine_args.clone())
        .with_component(config.component.clone())
        .with_timeout(config.timeout());
    let table = ResultsTable::create(&paths.results)?;
    let mut driver = Driver::new(engine, table);
    let mut current = None;
    for geometry in planned_geometries(config) {
        if current != Some(geometry.policy) {
            info!("Running {} configs", geometry.policy);
            current = Some(geometry.policy);
        }
        driver.run_one(geometry)?;
    }
    let (_, summary) = driver.finish()?;
    log_summary(&summary, &config.policies, &paths.results);
    Ok(summary)
}

fn log_summary(summary: &SweepSummary, policies: &[Policy], results: &Path) {
    info!(
        "Done. {} trials, {} failed. Wrote results to {}",
        summary.results.len(),
        summary.failed(),
        results.display()
    );
    for &policy in policies {
        if let Some(best) = summary.best(policy) {
            info!(
                "Best {policy}: {} ({} bits), {} ticks",
                best.geometry.cache_directive(),
                best.geometry.total_bits,
                best.tick_count.unwrap_or_default()
            );
        }
    }
}
