use std::path::PathBuf;
use clap::Parser;
use env_logger::Env;
use log::info;
use sweeplib::config::SweepConfig;
use sweeplib::driver::{planned_geometries, run_sweep};
use sweeplib::geometry::Policy;
use sweeplib::paths::SweepPaths;

#[derive(Parser, Debug)]
#[command(about = String::from("Sweeps cache geometries under a storage budget through the cache simulator"))]
struct Args {
    /// Trace file name (e.g. astar.trace, looked up in the trace directory) or a path
    trace: String,

    /// JSON sweep configuration, flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage budget in bits
    #[arg(short, long)]
    budget_bits: Option<u64>,

    #[arg(long)]
    min_offset_bits: Option<u32>,

    #[arg(long)]
    max_offset_bits: Option<u32>,

    /// Victim structure sizes to sweep, comma separated
    #[arg(short = 'i', long, value_delimiter = ',')]
    victim_entries: Option<Vec<u64>>,

    /// Policies to sweep, in order, comma separated
    #[arg(short, long, value_enum, value_delimiter = ',')]
    policy: Option<Vec<Policy>>,

    /// Per-trial timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Simulator executable
    #[arg(short, long)]
    engine: Option<PathBuf>,

    /// Reference cache component passed to the simulator
    #[arg(short, long)]
    component: Option<String>,

    #[arg(long)]
    trace_dir: Option<PathBuf>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// List the geometries and their sizes without running the simulator
    #[arg(short, long)]
    dry_run: bool,
}

impl Args {
    /// Layers the flags over the JSON configuration, which is layered over the defaults
    fn sweep_config(&self) -> Result<SweepConfig, String> {
        let mut config = match &self.config {
            Some(path) => SweepConfig::from_json_file(path).map_err(|e| e.to_string())?,
            None => SweepConfig::default(),
        };
        if let Some(budget_bits) = self.budget_bits {
            config.budget_bits = budget_bits;
        }
        if let Some(min) = self.min_offset_bits {
            config.min_block_offset_bits = min;
        }
        if let Some(max) = self.max_offset_bits {
            config.max_block_offset_bits = max;
        }
        if let Some(victim_entries) = &self.victim_entries {
            config.victim_entries = victim_entries.clone();
        }
        if let Some(policies) = &self.policy {
            config.policies = policies.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(engine) = &self.engine {
            config.engine = engine.clone();
        }
        if let Some(component) = &self.component {
            config.component = component.clone();
        }
        if let Some(trace_dir) = &self.trace_dir {
            config.trace_dir = trace_dir.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.sweep_config()?;
    let paths = SweepPaths::resolve(&args.trace, &config.trace_dir, &config.output_dir);

    if args.dry_run {
        for geometry in planned_geometries(&config) {
            println!(
                "{} # total={} bits ({:.1} bytes)",
                geometry.cache_directive(),
                geometry.total_bits,
                geometry.total_bits as f64 / 8.0
            );
        }
        return Ok(());
    }

    let summary = run_sweep(&config, &paths).map_err(|e| format!("Sweep over {} failed: {e}", paths.trace.display()))?;
    info!("{} of {} trials produced a tick count", summary.completed(), summary.results.len());
    Ok(())
}
