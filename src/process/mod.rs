// src/process/mod.rs
//
// One process abstraction shared by recorder, transcoder, gateway and tunnel.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::SupervisorResult;

pub mod child;

pub use child::{ChildProcess, CommandLauncher};

/// Grace period between the polite stop request and the forced kill.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

pub trait ProcessHandle: Send {
    fn pid(&self) -> u32;

    /// Reaps the process if it has exited.
    fn is_alive(&mut self) -> bool;

    /// Two-phase stop: ask politely, wait up to `grace`, then kill.
    /// Returns once the process is gone.
    fn terminate(&mut self, grace: Duration);

    fn kill(&mut self);

    /// Captured diagnostic output, if the launch asked for it. Yields once.
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Log/identity label, e.g. `recorder:camera-1`.
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Pipe stderr so the owner can parse it; otherwise it is discarded.
    pub capture_output: bool,
}

impl LaunchSpec {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            capture_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn capture_output(mut self) -> Self {
        self.capture_output = true;
        self
    }
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ProcessHandle>>;

    /// Cheap pre-flight check used before doing setup work for a launch.
    fn is_available(&self, program: &Path) -> bool;
}

/// Stops `handle` if it is still running. Shared by every supervisor so the
/// grace/kill protocol is identical everywhere.
pub fn stop_handle(handle: &mut dyn ProcessHandle, grace: Duration) {
    if handle.is_alive() {
        handle.terminate(grace);
    }
}
