// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};

use sentinela_node::config::{ConfigStore, FileConfigStore, TunnelMode};
use sentinela_node::core::{Clock, SystemClock};
use sentinela_node::gateway::GatewaySupervisor;
use sentinela_node::monitoring::{self, MonitorSources};
use sentinela_node::process::{CommandLauncher, ProcessLauncher};
use sentinela_node::recorder::{RecordingSupervisor, StatvfsDisk, StoreRetention};
use sentinela_node::tunnel::{TunnelControl, TunnelSupervisor};
use sentinela_node::watchdog::{Watchdog, WatchdogDeps};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".into());

    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::new(&cfg_path));
    let cfg = store.load();
    info!(
        "[sentinela] loaded {} ({} cameras)",
        cfg_path,
        cfg.cameras.len()
    );

    let recordings_root = cfg.recordings_root(&store.base_dir());
    std::fs::create_dir_all(&recordings_root)?;

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[sentinela] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Supervisors
    // ------------------------------------------------------------
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(CommandLauncher);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let gateway = Arc::new(GatewaySupervisor::new(store.clone(), launcher.clone()));
    let recorder = Arc::new(RecordingSupervisor::new(
        store.clone(),
        launcher.clone(),
        clock.clone(),
    ));
    let tunnel = Arc::new(TunnelSupervisor::new(store.clone(), launcher.clone()));
    let retention = Arc::new(StoreRetention::new(store.clone(), Arc::new(StatvfsDisk)));

    // ------------------------------------------------------------
    // Boot: gateway, recorders, tunnel, watchdog
    // ------------------------------------------------------------
    gateway.set_cameras(cfg.enabled_cameras().cloned().collect());
    gateway.start();

    for camera in cfg.enabled_cameras() {
        recorder.start(camera);
    }

    if cfg.tunnel.mode != TunnelMode::Disabled {
        tunnel.start(cfg.tunnel.mode, cfg.tunnel.hostname.as_deref());
    }

    let watchdog = Arc::new(Watchdog::new(WatchdogDeps {
        recorder: recorder.clone(),
        gateway: gateway.clone(),
        tunnel: Some(tunnel.clone() as Arc<dyn TunnelControl>),
        retention: retention.clone(),
        store: store.clone(),
        clock,
    }));
    watchdog.start();

    // ------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------
    let bind = format!("0.0.0.0:{}", cfg.system.monitoring_port);
    let sources = MonitorSources {
        watchdog: watchdog.clone(),
        recorder: recorder.clone(),
        gateway: gateway.clone(),
        retention,
    };
    if let Err(e) = monitoring::start_monitoring_server(&bind, sources) {
        warn!("[sentinela] monitoring disabled: {}", e);
    }

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[sentinela] running – Ctrl+C to stop");

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    // ------------------------------------------------------------
    // Shutdown: reverse of boot
    // ------------------------------------------------------------
    info!("[sentinela] shutting down…");
    watchdog.stop();
    tunnel.stop();
    recorder.stop_all();
    gateway.stop();

    info!("[sentinela] shutdown complete");

    Ok(())
}
