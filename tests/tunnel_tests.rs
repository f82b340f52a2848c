use std::sync::Arc;
use std::time::Duration;

use sentinela_node::config::{AppConfig, TunnelMode};
use sentinela_node::testing::mocks::{FakeLauncher, MemoryConfigStore};
use sentinela_node::tunnel::{TunnelControl, TunnelSupervisor};

fn setup(config: AppConfig) -> (tempfile::TempDir, Arc<FakeLauncher>, TunnelSupervisor) {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryConfigStore::new(tmp.path(), config));
    let launcher = Arc::new(FakeLauncher::new());
    let tunnel = TunnelSupervisor::new(store, launcher.clone())
        .with_stop_grace(Duration::from_millis(10));
    (tmp, launcher, tunnel)
}

#[test]
fn quick_tunnel_points_at_web_port() {
    let mut config = AppConfig::default();
    config.system.web_port = 8123;
    let (_tmp, launcher, tunnel) = setup(config);

    tunnel.start(TunnelMode::Quick, None);

    assert!(tunnel.is_running());
    let spec = &launcher.launches()[0];
    assert_eq!(spec.args, vec!["tunnel", "--url", "http://localhost:8123"]);
    assert!(spec.capture_output);
}

#[test]
fn named_tunnel_requires_hostname() {
    let (_tmp, launcher, tunnel) = setup(AppConfig::default());

    tunnel.start(TunnelMode::Named, None);
    assert!(!tunnel.is_running());
    assert!(launcher.launches().is_empty());

    tunnel.start(TunnelMode::Named, Some("cams.example.com"));
    assert!(tunnel.is_running());
    assert_eq!(launcher.launches()[0].args[..2], ["tunnel", "run"]);
}

#[test]
fn missing_cloudflared_is_skipped() {
    let (tmp, launcher, tunnel) = setup(AppConfig::default());
    launcher.set_missing(tmp.path().join("tools/cloudflared/cloudflared"));

    tunnel.start(TunnelMode::Quick, None);
    assert!(!tunnel.is_running());
    assert!(launcher.launches().is_empty());
}

#[test]
fn restart_rereads_mode_and_replaces_process() {
    let mut config = AppConfig::default();
    config.tunnel.mode = TunnelMode::Quick;
    let (_tmp, launcher, tunnel) = setup(config);

    tunnel.restart();
    let first = launcher.latest("tunnel").unwrap();
    tunnel.restart();

    assert!(first.was_terminated());
    assert_eq!(launcher.launch_count("tunnel"), 2);
    assert!(tunnel.is_running());

    tunnel.stop();
    assert!(!tunnel.is_running());
    assert!(tunnel.public_url().is_none());
}
