use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use sentinela_node::config::{AppConfig, CameraConfig, ConfigStore, TunnelMode};
use sentinela_node::recorder::{RecordingSupervisor, RetentionPolicy};
use sentinela_node::testing::mocks::{FakeLauncher, ManualClock, MemoryConfigStore};
use sentinela_node::tunnel::TunnelControl;
use sentinela_node::watchdog::{GatewayCheck, RecordingCheck, Watchdog, WatchdogDeps};

type Journal = Arc<Mutex<Vec<&'static str>>>;

struct FakeRecorder {
    journal: Journal,
    fail_restart: bool,
}

impl RecordingCheck for FakeRecorder {
    fn day_rollover(&self) -> usize {
        self.journal.lock().unwrap().push("rollover");
        0
    }

    fn check_and_restart(&self) -> Vec<String> {
        self.journal.lock().unwrap().push("restart");
        if self.fail_restart {
            panic!("recorder exploded");
        }
        Vec::new()
    }
}

struct FakeGateway {
    journal: Journal,
    running: AtomicBool,
}

impl GatewayCheck for FakeGateway {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start(&self) {
        self.journal.lock().unwrap().push("gateway_start");
        self.running.store(true, Ordering::SeqCst);
    }

    fn check_transcoders(&self) -> usize {
        self.journal.lock().unwrap().push("transcoders");
        0
    }
}

struct FakeTunnel {
    journal: Journal,
}

impl TunnelControl for FakeTunnel {
    fn is_running(&self) -> bool {
        false
    }

    fn restart(&self) {
        self.journal.lock().unwrap().push("tunnel_restart");
    }

    fn stop(&self) {}
}

struct FakeRetention {
    journal: Journal,
    runs: AtomicUsize,
}

impl RetentionPolicy for FakeRetention {
    fn run(&self, _today: NaiveDate) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push("retention");
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at_local_noon(
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
    ))
}

fn fake_watchdog(
    journal: &Journal,
    clock: Arc<ManualClock>,
    tunnel_mode: TunnelMode,
    fail_restart: bool,
) -> Watchdog {
    let mut config = AppConfig::default();
    config.tunnel.mode = tunnel_mode;

    Watchdog::new(WatchdogDeps {
        recorder: Arc::new(FakeRecorder {
            journal: journal.clone(),
            fail_restart,
        }),
        gateway: Arc::new(FakeGateway {
            journal: journal.clone(),
            running: AtomicBool::new(false),
        }),
        tunnel: Some(Arc::new(FakeTunnel {
            journal: journal.clone(),
        })),
        retention: Arc::new(FakeRetention {
            journal: journal.clone(),
            runs: AtomicUsize::new(0),
        }),
        store: Arc::new(MemoryConfigStore::new(".", config)),
        clock,
    })
}

fn entries(journal: &Journal) -> Vec<&'static str> {
    std::mem::take(&mut *journal.lock().unwrap())
}

#[test]
fn tick_runs_checks_in_order() {
    let journal = Journal::default();
    let watchdog = fake_watchdog(&journal, clock(), TunnelMode::Quick, false);

    watchdog.tick();
    assert_eq!(
        entries(&journal),
        vec![
            "restart",
            "gateway_start",
            "transcoders",
            "tunnel_restart",
            "retention"
        ]
    );

    // Gateway now up: only the transcoder sweep remains.
    watchdog.tick();
    assert_eq!(
        entries(&journal),
        vec!["restart", "transcoders", "tunnel_restart", "retention"]
    );
}

#[test]
fn disabled_tunnel_is_not_restarted() {
    let journal = Journal::default();
    let watchdog = fake_watchdog(&journal, clock(), TunnelMode::Disabled, false);

    watchdog.tick();
    assert!(!entries(&journal).contains(&"tunnel_restart"));
}

#[test]
fn failing_check_does_not_skip_later_ones() {
    let journal = Journal::default();
    let watchdog = fake_watchdog(&journal, clock(), TunnelMode::Disabled, true);

    watchdog.tick();
    assert_eq!(
        entries(&journal),
        vec!["restart", "gateway_start", "transcoders", "retention"]
    );
}

#[test]
fn rollover_fires_once_per_day_change() {
    let journal = Journal::default();
    let clock = clock();
    let watchdog = fake_watchdog(&journal, clock.clone(), TunnelMode::Disabled, false);

    watchdog.tick();
    assert!(!entries(&journal).contains(&"rollover"));

    clock.advance_secs(24 * 3600);
    watchdog.tick();
    let first = entries(&journal);
    assert_eq!(first[0], "rollover");
    assert_eq!(watchdog.last_day(), NaiveDate::from_ymd_opt(2024, 1, 11).unwrap());

    clock.advance_secs(30);
    watchdog.tick();
    assert!(!entries(&journal).contains(&"rollover"));
}

#[test]
fn rollover_restarts_real_recordings_into_new_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.cameras.push(CameraConfig::new("camera-1", "192.168.1.10"));
    let store = Arc::new(MemoryConfigStore::new(tmp.path(), config));
    let launcher = Arc::new(FakeLauncher::new());
    let clock = clock();

    let recorder = Arc::new(RecordingSupervisor::new(
        store.clone(),
        launcher.clone(),
        clock.clone(),
    ));
    recorder.start(&store.get_camera("camera-1").unwrap());

    let journal = Journal::default();
    let watchdog = Watchdog::new(WatchdogDeps {
        recorder: recorder.clone(),
        gateway: Arc::new(FakeGateway {
            journal: journal.clone(),
            running: AtomicBool::new(true),
        }),
        tunnel: None,
        retention: Arc::new(FakeRetention {
            journal: journal.clone(),
            runs: AtomicUsize::new(0),
        }),
        store: store.clone(),
        clock: clock.clone(),
    });

    watchdog.tick();
    assert_eq!(launcher.launch_count("recorder:camera-1"), 1);

    clock.advance_secs(24 * 3600);
    watchdog.tick();
    assert_eq!(launcher.launch_count("recorder:camera-1"), 2);
    assert!(tmp.path().join("recordings/2024-01-11/camera-1").is_dir());

    clock.advance_secs(30);
    watchdog.tick();
    assert_eq!(launcher.launch_count("recorder:camera-1"), 2);
}

#[test]
fn background_loop_ticks_until_stopped() {
    let journal = Journal::default();
    let watchdog = fake_watchdog(&journal, clock(), TunnelMode::Disabled, false)
        .with_interval(Duration::from_millis(10));

    watchdog.start();
    assert!(watchdog.is_running());
    std::thread::sleep(Duration::from_millis(100));
    watchdog.stop();
    assert!(!watchdog.is_running());

    std::thread::sleep(Duration::from_millis(50));
    let ran = entries(&journal)
        .iter()
        .filter(|e| **e == "retention")
        .count();
    assert!(ran >= 2);

    std::thread::sleep(Duration::from_millis(50));
    assert!(entries(&journal).is_empty());
}

#[test]
fn quick_restart_keeps_a_single_loop() {
    let journal = Journal::default();
    let watchdog = fake_watchdog(&journal, clock(), TunnelMode::Disabled, false)
        .with_interval(Duration::from_millis(100));

    watchdog.start();
    std::thread::sleep(Duration::from_millis(20));
    watchdog.stop();
    watchdog.start();
    assert!(watchdog.is_running());

    std::thread::sleep(Duration::from_millis(1000));
    watchdog.stop();
    let passes = entries(&journal)
        .iter()
        .filter(|e| **e == "restart")
        .count();

    // one loop at 100ms gives about 11 passes here; two would give about 21
    assert!(passes <= 14, "{passes} passes in 1s");
    assert!(passes >= 5, "{passes} passes in 1s");
}
