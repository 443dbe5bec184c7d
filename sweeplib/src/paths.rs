use std::path::{Path, PathBuf};

/// The files a sweep over one trace touches
///
/// The configuration and results files are named after the trace stem, so sweeps over different
/// traces in the same output directory never collide
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPaths {
    pub trace: PathBuf,
    pub stem: String,
    pub config: PathBuf,
    pub results: PathBuf,
}

impl SweepPaths {
    /// Resolves a trace argument. Anything with a path separator is used as is, a bare name such
    /// as `astar.trace` is looked up in `trace_dir`
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use sweeplib::paths::SweepPaths;
    /// let paths = SweepPaths::resolve("astar.trace", Path::new("traces"), Path::new("out"));
    /// assert_eq!(paths.trace, Path::new("traces/astar.trace"));
    /// assert_eq!(paths.results, Path::new("out/results_astar.csv"));
    /// ```
    pub fn resolve(trace_name: &str, trace_dir: &Path, output_dir: &Path) -> Self {
        let trace = if trace_name.contains(std::path::MAIN_SEPARATOR) || trace_name.contains('/') {
            PathBuf::from(trace_name)
        } else {
            trace_dir.join(trace_name)
        };
        let stem = trace
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "trace".to_string());
        Self {
            config: output_dir.join(format!("sweep_{stem}.config")),
            results: output_dir.join(format!("results_{stem}.csv")),
            trace,
            stem,
        }
    }
}
