// src/watchdog/mod.rs
//
// Periodic health loop. Every collaborator is injected; each step of a tick
// is isolated so one failing check never skips the rest.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, error, info};

use crate::config::{ConfigStore, TunnelMode};
use crate::core::clock::{Clock, day_string};
use crate::core::lock::lock_mutex;
use crate::gateway::GatewaySupervisor;
use crate::recorder::{RecordingSupervisor, RetentionPolicy};
use crate::tunnel::TunnelControl;

pub const WATCHDOG_INTERVAL: Duration = Duration::from_secs(30);

/// What the watchdog needs from the recording side.
pub trait RecordingCheck: Send + Sync {
    fn day_rollover(&self) -> usize;
    fn check_and_restart(&self) -> Vec<String>;
}

/// What the watchdog needs from the gateway side.
pub trait GatewayCheck: Send + Sync {
    fn is_running(&self) -> bool;
    fn start(&self);
    fn check_transcoders(&self) -> usize;
}

impl RecordingCheck for RecordingSupervisor {
    fn day_rollover(&self) -> usize {
        RecordingSupervisor::day_rollover(self)
    }

    fn check_and_restart(&self) -> Vec<String> {
        RecordingSupervisor::check_and_restart(self)
    }
}

impl GatewayCheck for GatewaySupervisor {
    fn is_running(&self) -> bool {
        GatewaySupervisor::is_running(self)
    }

    fn start(&self) {
        GatewaySupervisor::start(self)
    }

    fn check_transcoders(&self) -> usize {
        GatewaySupervisor::check_transcoders(self)
    }
}

pub struct WatchdogDeps {
    pub recorder: Arc<dyn RecordingCheck>,
    pub gateway: Arc<dyn GatewayCheck>,
    pub tunnel: Option<Arc<dyn TunnelControl>>,
    pub retention: Arc<dyn RetentionPolicy>,
    pub store: Arc<dyn ConfigStore>,
    pub clock: Arc<dyn Clock>,
}

struct Inner {
    deps: WatchdogDeps,
    last_day: Mutex<NaiveDate>,
    // held for a whole tick; an exiting loop and a fresh one never overlap
    ticking: Mutex<()>,
}

/// One background run: its own stop flag plus the thread driving it.
struct Run {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct Watchdog {
    inner: Arc<Inner>,
    interval: Duration,
    run: Mutex<Option<Run>>,
}

impl Watchdog {
    pub fn new(deps: WatchdogDeps) -> Self {
        let today = deps.clock.today();
        Self {
            inner: Arc::new(Inner {
                deps,
                last_day: Mutex::new(today),
                ticking: Mutex::new(()),
            }),
            interval: WATCHDOG_INTERVAL,
            run: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawns the loop unless one is already active. Each run owns its stop
    /// flag; a stopped loop still sleeping out its interval exits on wake.
    pub fn start(&self) {
        let mut slot = lock_mutex(&self.run, "watchdog.start");
        if slot
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::SeqCst))
        {
            return;
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let inner = self.inner.clone();
        let interval = self.interval;
        let handle = std::thread::spawn(move || {
            info!("[watchdog] started, interval {:?}", interval);
            while flag.load(Ordering::SeqCst) {
                inner.tick();
                std::thread::sleep(interval);
            }
            info!("[watchdog] stopped");
        });

        *slot = Some(Run { running, handle });
    }

    /// Clears the current run's flag. An in-flight sleep is not interrupted,
    /// so that thread exits within one interval.
    pub fn stop(&self) {
        if let Some(run) = lock_mutex(&self.run, "watchdog.stop").take() {
            run.running.store(false, Ordering::SeqCst);
            debug!(
                "[watchdog] loop {:?} signalled to stop",
                run.handle.thread().id()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        lock_mutex(&self.run, "watchdog.is_running")
            .as_ref()
            .map(|run| run.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn last_day(&self) -> NaiveDate {
        *lock_mutex(&self.inner.last_day, "watchdog.last_day")
    }

    /// One pass over every check, in order.
    pub fn tick(&self) {
        self.inner.tick();
    }
}

impl Inner {
    fn tick(&self) {
        let _ticking = lock_mutex(&self.ticking, "watchdog.tick");
        debug!("[watchdog] tick");
        let deps = &self.deps;

        run_check("day rollover", || {
            let today = deps.clock.today();
            let changed = {
                let mut last = lock_mutex(&self.last_day, "watchdog.rollover");
                if *last == today {
                    false
                } else {
                    info!(
                        "[watchdog] day changed {} -> {}",
                        day_string(*last),
                        day_string(today)
                    );
                    *last = today;
                    true
                }
            };
            if changed {
                deps.recorder.day_rollover();
            }
            Ok(())
        });

        run_check("recordings", || {
            let restarted = deps.recorder.check_and_restart();
            if !restarted.is_empty() {
                info!("[watchdog] restarted recordings: {}", restarted.join(", "));
            }
            Ok(())
        });

        run_check("gateway", || {
            if !deps.gateway.is_running() {
                info!("[watchdog] gateway not running, starting");
                deps.gateway.start();
            }
            deps.gateway.check_transcoders();
            Ok(())
        });

        if let Some(tunnel) = &deps.tunnel {
            run_check("tunnel", || {
                let mode = deps.store.load().tunnel.mode;
                if mode != TunnelMode::Disabled && !tunnel.is_running() {
                    info!("[watchdog] tunnel down, restarting");
                    tunnel.restart();
                }
                Ok(())
            });
        }

        run_check("retention", || deps.retention.run(deps.clock.today()));
    }
}

fn run_check<F>(name: &str, check: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(check)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("[watchdog] {} check failed: {:#}", name, e),
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[watchdog] {} check panicked: {}", name, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_check_swallows_errors_and_panics() {
        run_check("err", || Err(anyhow::anyhow!("boom")));
        run_check("panic", || panic!("boom"));

        let mut ran = false;
        run_check("ok", || {
            ran = true;
            Ok(())
        });
        assert!(ran);
    }
}
