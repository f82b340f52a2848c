// src/tunnel/mod.rs
//
// Remote-access tunnel (cloudflared). Same supervised-child pattern as the
// recorder; the watchdog only needs `TunnelControl`.

use std::io::{BufRead, BufReader, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{ConfigStore, TunnelMode, resolve_program};
use crate::core::lock::lock_mutex;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher, STOP_GRACE, stop_handle};

pub trait TunnelControl: Send + Sync {
    fn is_running(&self) -> bool;
    /// Stop, then start again with the mode currently in the config.
    fn restart(&self);
    fn stop(&self);
}

pub struct TunnelSupervisor {
    store: Arc<dyn ConfigStore>,
    launcher: Arc<dyn ProcessLauncher>,
    stop_grace: Duration,
    process: Mutex<Option<Box<dyn ProcessHandle>>>,
    public_url: Arc<Mutex<Option<String>>>,
}

impl TunnelSupervisor {
    pub fn new(store: Arc<dyn ConfigStore>, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            store,
            launcher,
            stop_grace: STOP_GRACE,
            process: Mutex::new(None),
            public_url: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn public_url(&self) -> Option<String> {
        lock_mutex(&self.public_url, "tunnel.public_url").clone()
    }

    pub fn start(&self, mode: TunnelMode, hostname: Option<&str>) {
        let config = self.store.load();
        let program = resolve_program(&self.store.base_dir(), &config.tunnel.executable);
        if !self.launcher.is_available(&program) {
            warn!("[tunnel] cloudflared not found at {}", program.display());
            return;
        }

        if self.is_running() {
            self.stop();
        }

        let origin = format!("http://localhost:{}", config.system.web_port);
        let spec = match (mode, hostname) {
            (TunnelMode::Quick, _) => LaunchSpec::new("tunnel", &program)
                .args(["tunnel", "--url", origin.as_str()]),
            (TunnelMode::Named, Some(_)) => LaunchSpec::new("tunnel", &program)
                .args(["tunnel", "run", "--url", origin.as_str()]),
            (TunnelMode::Named, None) => {
                error!("[tunnel] named mode requires a hostname");
                return;
            }
            (TunnelMode::Disabled, _) => return,
        }
        .capture_output();

        let mut process = match self.launcher.launch(&spec) {
            Ok(p) => p,
            Err(e) => {
                error!("[tunnel] failed to start: {}", e);
                return;
            }
        };

        if let Some(output) = process.take_output() {
            let store = self.store.clone();
            let public_url = self.public_url.clone();
            std::thread::spawn(move || watch_output(output, mode, store, public_url));
        }

        info!("[tunnel] started in {:?} mode pid={}", mode, process.pid());
        *lock_mutex(&self.process, "tunnel.start") = Some(process);
    }
}

impl TunnelControl for TunnelSupervisor {
    fn is_running(&self) -> bool {
        lock_mutex(&self.process, "tunnel.is_running")
            .as_mut()
            .map(|p| p.is_alive())
            .unwrap_or(false)
    }

    fn restart(&self) {
        let config = self.store.load();
        self.stop();
        self.start(config.tunnel.mode, config.tunnel.hostname.as_deref());
    }

    fn stop(&self) {
        let process = lock_mutex(&self.process, "tunnel.stop").take();
        if let Some(mut process) = process {
            stop_handle(process.as_mut(), self.stop_grace);
            info!("[tunnel] stopped");
        }
        *lock_mutex(&self.public_url, "tunnel.stop") = None;
    }
}

/// Scans cloudflared's log for the public URL and persists it. At EOF the
/// URL is cleared only if it is still the one this reader found; a newer
/// process may already have announced its own.
fn watch_output(
    output: Box<dyn Read + Send>,
    mode: TunnelMode,
    store: Arc<dyn ConfigStore>,
    public_url: Arc<Mutex<Option<String>>>,
) {
    let mut found: Option<String> = None;

    for line in BufReader::new(output).lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let already_known = lock_mutex(&public_url, "tunnel.watch").is_some();
        if already_known {
            continue;
        }
        let Some(url) = extract_public_url(&line, mode) else {
            continue;
        };

        info!("[tunnel] active: {}", url);
        *lock_mutex(&public_url, "tunnel.watch") = Some(url.clone());
        found = Some(url.clone());

        let mut config = store.load();
        config.tunnel.public_url = Some(url);
        if let Err(e) = store.save(&config) {
            warn!("[tunnel] cannot persist public url: {}", e);
        }
    }

    let mut current = lock_mutex(&public_url, "tunnel.watch");
    if found.is_some() && *current == found {
        *current = None;
    }
}

/// Public URL announced on `line`. Quick tunnels only count
/// `*.trycloudflare.com`; named tunnels take any https URL outside
/// cloudflare's own site (banner and docs links).
pub fn extract_public_url(line: &str, mode: TunnelMode) -> Option<String> {
    line.match_indices("https://")
        .map(|(idx, _)| {
            let rest = &line[idx..];
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '/' | '.' | '-')))
                .unwrap_or(rest.len());
            rest[..end].trim_end_matches(['.', '/'])
        })
        .filter(|url| url.len() > "https://".len() && url["https://".len()..].contains('.'))
        .find(|url| match mode {
            TunnelMode::Quick => url.ends_with(".trycloudflare.com"),
            TunnelMode::Named => !url.contains("cloudflare.com"),
            TunnelMode::Disabled => false,
        })
        .map(str::to_string)
}
