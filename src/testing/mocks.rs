use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::config::{AppConfig, ConfigStore};
use crate::core::clock::Clock;
use crate::core::error::{ConfigError, SupervisorError, SupervisorResult};
use crate::core::lock::lock_mutex;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher};
use crate::recorder::DiskSpace;

/// Shared view of a fake process, kept by the launcher after the handle is
/// handed to a supervisor.
#[derive(Debug)]
pub struct FakeProcessState {
    pub label: String,
    pub pid: u32,
    alive: AtomicBool,
    terminated: AtomicBool,
}

impl FakeProcessState {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Simulates a crash.
    pub fn exit(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

pub struct FakeProcess {
    state: Arc<FakeProcessState>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.state.pid
    }

    fn is_alive(&mut self) -> bool {
        self.state.is_alive()
    }

    fn terminate(&mut self, _grace: Duration) {
        self.state.terminated.store(true, Ordering::SeqCst);
        self.state.alive.store(false, Ordering::SeqCst);
    }

    fn kill(&mut self) {
        self.state.alive.store(false, Ordering::SeqCst);
    }
}

/// Records every launch; never spawns anything.
#[derive(Default)]
pub struct FakeLauncher {
    next_pid: AtomicU32,
    launches: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<FakeProcessState>>>,
    missing: Mutex<HashSet<PathBuf>>,
    fail_all: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            ..Self::default()
        }
    }

    /// Launches of `program` fail with `ExecutableMissing`.
    pub fn set_missing(&self, program: impl Into<PathBuf>) {
        lock_mutex(&self.missing, "fake.set_missing").insert(program.into());
    }

    /// Every launch fails with a spawn error.
    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        lock_mutex(&self.launches, "fake.launches").clone()
    }

    pub fn launch_count(&self, label: &str) -> usize {
        lock_mutex(&self.launches, "fake.launch_count")
            .iter()
            .filter(|spec| spec.label == label)
            .count()
    }

    /// Every process launched under `label`, oldest first.
    pub fn processes(&self, label: &str) -> Vec<Arc<FakeProcessState>> {
        lock_mutex(&self.processes, "fake.processes")
            .iter()
            .filter(|p| p.label == label)
            .cloned()
            .collect()
    }

    pub fn latest(&self, label: &str) -> Option<Arc<FakeProcessState>> {
        self.processes(label).pop()
    }

    pub fn alive_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = lock_mutex(&self.processes, "fake.alive_labels")
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.label.clone())
            .collect();
        labels.sort();
        labels
    }

    /// Crashes the most recent process launched under `label`.
    pub fn kill(&self, label: &str) {
        if let Some(process) = self.latest(label) {
            process.exit();
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> SupervisorResult<Box<dyn ProcessHandle>> {
        lock_mutex(&self.launches, "fake.launch").push(spec.clone());

        if lock_mutex(&self.missing, "fake.launch").contains(&spec.program) {
            return Err(SupervisorError::ExecutableMissing {
                program: spec.program.display().to_string(),
            });
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(SupervisorError::Spawn {
                label: spec.label.clone(),
                source: io::Error::other("simulated spawn failure"),
            });
        }

        let state = Arc::new(FakeProcessState {
            label: spec.label.clone(),
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
        });
        lock_mutex(&self.processes, "fake.launch").push(state.clone());

        Ok(Box::new(FakeProcess { state }))
    }

    fn is_available(&self, program: &Path) -> bool {
        !lock_mutex(&self.missing, "fake.is_available").contains(program)
    }
}

/// Config store that never touches the disk.
pub struct MemoryConfigStore {
    base_dir: PathBuf,
    config: Mutex<AppConfig>,
    saves: AtomicU64,
}

impl MemoryConfigStore {
    pub fn new(base_dir: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            base_dir: base_dir.into(),
            config: Mutex::new(config),
            saves: AtomicU64::new(0),
        }
    }

    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> AppConfig {
        lock_mutex(&self.config, "memory_store.load").clone()
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        *lock_mutex(&self.config, "memory_store.save") = config.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn base_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }
}

/// Clock under test control. `today` follows the local date of `now`.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Local noon on `date`, far from any midnight edge.
    pub fn at_local_noon(date: NaiveDate) -> Self {
        let now = date
            .and_hms_opt(12, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|local| local.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock_mutex(&self.now, "manual_clock.set") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock_mutex(&self.now, "manual_clock.advance");
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock_mutex(&self.now, "manual_clock.now")
    }

    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&Local).date_naive()
    }
}

/// Free space that grows back as the test deletes folders is not modelled;
/// the retention engine keeps its own running estimate.
pub struct FakeDisk {
    free: AtomicU64,
}

impl FakeDisk {
    pub fn new(free_bytes: u64) -> Self {
        Self {
            free: AtomicU64::new(free_bytes),
        }
    }

    pub fn set_free(&self, free_bytes: u64) {
        self.free.store(free_bytes, Ordering::SeqCst);
    }
}

impl DiskSpace for FakeDisk {
    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        Ok(self.free.load(Ordering::SeqCst))
    }
}
