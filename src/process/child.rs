// src/process/child.rs
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::core::error::{SupervisorError, SupervisorResult};
use crate::core::logging::{ComponentLogger, LogContext};

use super::{LaunchSpec, ProcessHandle, ProcessLauncher};

const EXIT_POLL: Duration = Duration::from_millis(50);

pub struct ChildProcess {
    label: String,
    child: Child,
}

impl ChildProcess {
    pub fn new(label: &str, child: Child) -> Self {
        Self {
            label: label.to_string(),
            child,
        }
    }

    #[cfg(unix)]
    fn request_shutdown(&mut self) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM) {
            self.warn(&format!("SIGTERM failed: {}", e));
        }
    }

    #[cfg(not(unix))]
    fn request_shutdown(&mut self) {
        // No polite signal available; the grace loop then sees it gone.
        let _ = self.child.kill();
    }
}

impl ComponentLogger for ChildProcess {
    fn log_context(&self) -> LogContext {
        LogContext::new("process", &self.label).with_pid(self.child.id())
    }
}

impl ProcessHandle for ChildProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.debug(&format!("exited with {}", status));
                false
            }
            Err(e) => {
                self.warn(&format!("liveness check failed: {}", e));
                false
            }
        }
    }

    fn terminate(&mut self, grace: Duration) {
        self.request_shutdown();

        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.debug(&format!("stopped ({})", status));
                    return;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(EXIT_POLL),
                Ok(None) => {
                    self.warn(&format!("still running after {:?}, killing", grace));
                    break;
                }
                Err(e) => {
                    self.warn(&format!("wait failed: {}, killing", e));
                    break;
                }
            }
        }

        self.kill();
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.kill() {
            self.debug(&format!("kill: {}", e));
        }
        let _ = self.child.wait();
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
    }
}

/// Launches real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(if spec.capture_output {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        match cmd.spawn() {
            Ok(child) => {
                log::debug!("[process] {} spawned pid={}", spec.label, child.id());
                Ok(Box::new(ChildProcess::new(&spec.label, child)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SupervisorError::ExecutableMissing {
                    program: spec.program.display().to_string(),
                })
            }
            Err(e) => Err(SupervisorError::Spawn {
                label: spec.label.clone(),
                source: e,
            }),
        }
    }

    fn is_available(&self, program: &Path) -> bool {
        if program.components().count() > 1 || program.is_absolute() {
            return program.is_file();
        }

        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }
}
