use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors which abort a whole sweep
///
/// These are precondition failures: every remaining trial would fail the same way, so there is no
/// point continuing
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("trace not found: {}", .0.display())]
    MissingTrace(PathBuf),

    #[error("simulator engine not found: {}", .0.display())]
    MissingEngine(PathBuf),

    #[error("couldn't write to {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write a results row: {0}")]
    Csv(#[from] csv::Error),

    #[error("couldn't read the sweep configuration at {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't parse the sweep configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid sweep configuration: {0}")]
    InvalidConfig(String),

    #[error("trial aborted the sweep: {0}")]
    Trial(#[source] TrialError),
}

/// Ways a single simulator trial can fail
///
/// All of these except [`TrialError::ConfigWrite`] are recorded as an unknown tick count and the
/// sweep moves on to the next geometry
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("simulator timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("couldn't launch the simulator: {0}")]
    Spawn(#[source] io::Error),

    #[error("simulator exited with {}", describe_exit(.code))]
    ExitStatus { code: Option<i32> },

    #[error("couldn't parse Ticks from the simulator output")]
    MissingTicks,

    #[error("couldn't write the simulator configuration: {0}")]
    ConfigWrite(#[source] io::Error),
}

impl TrialError {
    /// True when the failure would repeat for every trial, so the sweep must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrialError::ConfigWrite(_))
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}
