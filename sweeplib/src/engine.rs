use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use crate::error::TrialError;
use crate::geometry::CacheGeometry;

lazy_static! {
    static ref TICKS_PATTERN: Regex = Regex::new(r"Ticks\s*-\s*(\d+)").unwrap();
}

/// How often a running simulator is polled for completion
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs one simulation trial for a geometry and reports its tick count
///
/// The driver is generic over this so a sweep can be exercised without the real simulator
pub trait TrialRunner {
    /// Runs the trial, returning the tick count or the reason there isn't one
    ///
    /// Implementations should only return a fatal [`TrialError`] when every following trial would
    /// fail in the same way
    fn run_trial(&mut self, geometry: &CacheGeometry) -> Result<u64, TrialError>;
}

/// Renders the simulator configuration for a geometry
///
/// Every component other than the cache is left at its default, and the file ends with a blank line
///
/// # Examples
///
/// ```
/// use sweeplib::engine::render_config;
/// use sweeplib::geometry::{CacheGeometry, Policy};
/// let geometry = CacheGeometry {
///     policy: Policy::CounterBased,
///     ways: 3456,
///     block_offset_bits: 6,
///     replacement_width: Some(1),
///     victim_entries: 0,
///     total_bits: 432000,
/// };
/// let config = render_config(&geometry);
/// assert!(config.starts_with("__processor\n__cache -E 3456 -b 6 -s 0 -i 0 -R 1\n"));
/// assert!(config.ends_with("__coherence\n\n"));
/// ```
pub fn render_config(geometry: &CacheGeometry) -> String {
    format!(
        "__processor\n{}\n__branch\n__memory\n__interconnect\n__coherence\n\n",
        geometry.cache_directive()
    )
}

/// Finds the first `Ticks - <n>` line in the simulator output
///
/// # Examples
///
/// ```
/// use sweeplib::engine::parse_ticks;
/// assert_eq!(parse_ticks("Cache hits - 12\nTicks - 104235\n"), Some(104235));
/// assert_eq!(parse_ticks("Segmentation fault"), None);
/// ```
pub fn parse_ticks(output: &str) -> Option<u64> {
    TICKS_PATTERN
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The external cache simulator, run once per trial as a subprocess
///
/// The configuration file is rewritten for every trial, so one engine must not be shared by trials
/// running at the same time
#[derive(Debug, Clone)]
pub struct SimulatorEngine {
    program: PathBuf,
    launcher_args: Vec<String>,
    component: String,
    config_path: PathBuf,
    trace_path: PathBuf,
    timeout: Duration,
}

impl SimulatorEngine {
    pub fn new(program: impl Into<PathBuf>, config_path: impl Into<PathBuf>, trace_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher_args: Vec::new(),
            component: crate::config::DEFAULT_COMPONENT.to_string(),
            config_path: config_path.into(),
            trace_path: trace_path.into(),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_launcher_args(mut self, args: Vec<String>) -> Self {
        self.launcher_args = args;
        self
    }

    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.launcher_args)
            .arg("-s")
            .arg(&self.config_path)
            .arg("-c")
            .arg(&self.component)
            .arg("-t")
            .arg(&self.trace_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Runs the simulator, returning its exit status and combined output, or a timeout
    ///
    /// The deadline covers both the simulator exiting and its output pipes closing, so a process
    /// it leaves behind holding the pipes can't stall the sweep
    fn execute(&self) -> Result<(ExitStatus, String), TrialError> {
        let mut command = self.command();
        // Anything the simulator spawns shares its group, so a timeout can take it all down
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(TrialError::Spawn)?;
        let deadline = Instant::now().checked_add(self.timeout);
        // Both pipes are drained on their own threads so a chatty simulator can't fill a pipe
        // buffer and stall before it exits
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let Some(status) = wait_with_deadline(&mut child, deadline)? else {
            return Err(TrialError::Timeout { limit: self.timeout });
        };
        match (collect(stdout, deadline), collect(stderr, deadline)) {
            (Some(stdout), Some(stderr)) => Ok((status, format!("{stdout}\n{stderr}"))),
            _ => {
                kill_group(&mut child);
                Err(TrialError::Timeout { limit: self.timeout })
            }
        }
    }
}

impl TrialRunner for SimulatorEngine {
    fn run_trial(&mut self, geometry: &CacheGeometry) -> Result<u64, TrialError> {
        fs::write(&self.config_path, render_config(geometry)).map_err(TrialError::ConfigWrite)?;
        let (status, output) = self.execute()?;
        debug!("Simulator output for {}:\n{output}", geometry.cache_directive());
        let ticks = parse_ticks(&output);
        if !status.success() {
            if let Some(ticks) = ticks {
                warn!("Discarding Ticks - {ticks} from a failed run");
            }
            return Err(TrialError::ExitStatus { code: status.code() });
        }
        ticks.ok_or(TrialError::MissingTicks)
    }
}

/// Waits for the child to exit, killing its process group once the deadline passes
///
/// No deadline means waiting for as long as the child runs
///
/// returns: Ok(None) if the child was killed for running too long
fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>) -> Result<Option<ExitStatus>, TrialError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) => {
                kill_group(child);
                return Err(TrialError::Spawn(e));
            }
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            kill_group(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills the child and everything left in its process group, then reaps the child
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: signalling a process group has no memory safety requirements. The group id
            // is the child's pid, which isn't reused while the child is unreaped or the group
            // still has members
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
        }
    }
    // The child may have exited between the poll and the kill, either way it's gone
    let _ = child.kill();
    let _ = child.wait();
}

/// Reads a pipe to the end on its own thread, the text arrives on the returned channel
///
/// A reader abandoned after a timeout is left detached, it ends once the pipe closes
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = sender.send(String::from_utf8_lossy(&buf).into_owned());
        });
        receiver
    })
}

/// Gets a pipe's text, or None if it is still open at the deadline
fn collect(receiver: Option<Receiver<String>>, deadline: Option<Instant>) -> Option<String> {
    let Some(receiver) = receiver else {
        return Some(String::new());
    };
    let received = match deadline {
        Some(deadline) => receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };
    match received {
        Ok(text) => Some(text),
        // The reader can only hang up without sending if it panicked
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}
