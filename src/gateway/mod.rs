// src/gateway/mod.rs
//
// Streaming gateway (MediaMTX) plus the per-camera transcoders feeding it.

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::config::{AppConfig, CameraConfig, ConfigStore, resolve_path, resolve_program};
use crate::core::error::{SupervisorError, SupervisorResult};
use crate::core::lock::lock_mutex;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher, STOP_GRACE, stop_handle};

pub mod routing;
pub mod transcode;

pub use routing::{PathConfig, RoutingConfig, build_routing};
pub use transcode::{needs_transcode, transcode_launch_spec};

#[derive(Debug, Clone, Copy)]
pub struct GatewayTimings {
    pub stop_grace: Duration,
    /// Pause between stop and start on restart, lets ports free up.
    pub restart_pause: Duration,
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
}

impl Default for GatewayTimings {
    fn default() -> Self {
        Self {
            stop_grace: STOP_GRACE,
            restart_pause: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(10),
            ready_poll: Duration::from_millis(250),
        }
    }
}

enum Readiness {
    Ready,
    TimedOut,
    Exited,
}

#[derive(Default)]
struct GatewayState {
    cameras: BTreeMap<String, CameraConfig>,
    gateway: Option<Box<dyn ProcessHandle>>,
    transcoders: BTreeMap<String, Box<dyn ProcessHandle>>,
}

pub struct GatewaySupervisor {
    store: Arc<dyn ConfigStore>,
    launcher: Arc<dyn ProcessLauncher>,
    timings: GatewayTimings,
    state: Mutex<GatewayState>,
}

impl GatewaySupervisor {
    pub fn new(store: Arc<dyn ConfigStore>, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            store,
            launcher,
            timings: GatewayTimings::default(),
            state: Mutex::new(GatewayState::default()),
        }
    }

    pub fn with_timings(mut self, timings: GatewayTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Replaces the tracked camera set without touching any process.
    /// Used once at boot, before the first `start`.
    pub fn set_cameras(&self, cameras: Vec<CameraConfig>) {
        let mut state = lock_mutex(&self.state, "gateway.set_cameras");
        state.cameras = cameras.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    pub fn camera_ids(&self) -> Vec<String> {
        lock_mutex(&self.state, "gateway.camera_ids")
            .cameras
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_running(&self) -> bool {
        let mut state = lock_mutex(&self.state, "gateway.is_running");
        state
            .gateway
            .as_mut()
            .map(|g| g.is_alive())
            .unwrap_or(false)
    }

    /// Writes the routing config, launches the gateway, waits for its API
    /// port, then launches transcoders. Failures are logged; the gateway is
    /// simply left not running for the watchdog to retry.
    pub fn start(&self) {
        if self.is_running() {
            info!("[gateway] already running");
            return;
        }

        let config = self.store.load();
        let base = self.store.base_dir();
        let program = resolve_program(&base, &config.system.gateway_executable);
        if !self.launcher.is_available(&program) {
            warn!(
                "[gateway] executable not found at {}; live view disabled",
                program.display()
            );
            return;
        }

        let config_path = resolve_path(&base, &config.system.gateway_config);
        let pid = {
            let mut state = lock_mutex(&self.state, "gateway.start");
            if state.gateway.as_mut().is_some_and(|g| g.is_alive()) {
                info!("[gateway] already running");
                return;
            }
            if let Err(e) = write_routing(&config, state.cameras.values(), &config_path) {
                error!("[gateway] cannot write routing config: {}", e);
                return;
            }
            info!(
                "[gateway] routing config written with {} cameras",
                state.cameras.len()
            );

            let mut spec = LaunchSpec::new("gateway", &program)
                .arg(config_path.display().to_string());
            if let Some(dir) = config_path.parent() {
                spec = spec.cwd(dir);
            }

            match self.launcher.launch(&spec) {
                Ok(process) => {
                    let pid = process.pid();
                    state.gateway = Some(process);
                    pid
                }
                Err(e) => {
                    error!("[gateway] failed to start: {}", e);
                    return;
                }
            }
        };
        info!("[gateway] started pid={}", pid);

        match self.wait_ready(config.system.gateway_api_port) {
            Readiness::Ready => info!("[gateway] ready"),
            Readiness::TimedOut => warn!(
                "[gateway] not ready after {:?}, starting transcoders anyway",
                self.timings.ready_timeout
            ),
            Readiness::Exited => {
                error!("[gateway] exited during startup");
                return;
            }
        }

        self.launch_missing_transcoders(&config);
    }

    /// Polls the API port until it accepts connections.
    fn wait_ready(&self, api_port: u16) -> Readiness {
        let addr = SocketAddr::from(([127, 0, 0, 1], api_port));
        let deadline = Instant::now() + self.timings.ready_timeout;

        loop {
            if !self.is_running() {
                return Readiness::Exited;
            }
            if TcpStream::connect_timeout(&addr, self.timings.ready_poll).is_ok() {
                return Readiness::Ready;
            }
            if Instant::now() >= deadline {
                return Readiness::TimedOut;
            }
            std::thread::sleep(self.timings.ready_poll);
        }
    }

    /// Stops transcoders first, then the gateway.
    pub fn stop(&self) {
        let (transcoders, gateway) = {
            let mut state = lock_mutex(&self.state, "gateway.stop");
            (
                std::mem::take(&mut state.transcoders),
                state.gateway.take(),
            )
        };

        for (camera_id, mut process) in transcoders {
            stop_handle(process.as_mut(), self.timings.stop_grace);
            info!("[gateway] transcoder stopped for {}", camera_id);
        }

        if let Some(mut process) = gateway {
            if process.is_alive() {
                stop_handle(process.as_mut(), self.timings.stop_grace);
                info!("[gateway] stopped");
            }
        }
    }

    /// Full stop/start; the only way routing changes reach the gateway.
    pub fn restart(&self) {
        self.stop();
        std::thread::sleep(self.timings.restart_pause);
        self.start();
    }

    pub fn add_camera(&self, camera: CameraConfig) {
        lock_mutex(&self.state, "gateway.add_camera")
            .cameras
            .insert(camera.id.clone(), camera);
        if self.is_running() {
            self.restart();
        }
    }

    pub fn remove_camera(&self, camera_id: &str) {
        let transcoder = {
            let mut state = lock_mutex(&self.state, "gateway.remove_camera");
            state.cameras.remove(camera_id);
            state.transcoders.remove(camera_id)
        };
        if let Some(mut process) = transcoder {
            stop_handle(process.as_mut(), self.timings.stop_grace);
        }
        if self.is_running() {
            self.restart();
        }
    }

    /// Relaunches missing or dead transcoders independently of the gateway.
    /// Returns how many were launched.
    pub fn check_transcoders(&self) -> usize {
        let config = self.store.load();

        let orphans: Vec<Box<dyn ProcessHandle>> = {
            let mut state = lock_mutex(&self.state, "gateway.check_transcoders");
            let stale: Vec<String> = state
                .transcoders
                .keys()
                .filter(|id| {
                    state
                        .cameras
                        .get(*id)
                        .map(|c| !needs_transcode(c))
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            stale
                .iter()
                .filter_map(|id| state.transcoders.remove(id))
                .collect()
        };
        for mut process in orphans {
            stop_handle(process.as_mut(), self.timings.stop_grace);
        }

        self.launch_missing_transcoders(&config)
    }

    fn launch_missing_transcoders(&self, config: &AppConfig) -> usize {
        let program = resolve_program(&self.store.base_dir(), &config.system.ffmpeg_path);
        let rtsp_port = config.system.gateway_rtsp_port;

        let mut state = lock_mutex(&self.state, "gateway.launch_transcoders");
        let GatewayState {
            cameras,
            transcoders,
            ..
        } = &mut *state;

        let mut launched = 0;
        for camera in cameras.values().filter(|c| needs_transcode(c)) {
            if let Some(process) = transcoders.get_mut(&camera.id) {
                if process.is_alive() {
                    continue;
                }
                warn!("[gateway] transcoder for {} died, relaunching", camera.id);
            }

            let spec = transcode_launch_spec(camera, &program, rtsp_port);
            match self.launcher.launch(&spec) {
                Ok(process) => {
                    info!(
                        "[gateway] transcoder started for {} pid={}",
                        camera.id,
                        process.pid()
                    );
                    transcoders.insert(camera.id.clone(), process);
                    launched += 1;
                }
                Err(e) => {
                    transcoders.remove(&camera.id);
                    error!("[gateway] transcoder for {} failed: {}", camera.id, e);
                }
            }
        }

        launched
    }

    pub fn transcoder_ids(&self) -> Vec<String> {
        lock_mutex(&self.state, "gateway.transcoder_ids")
            .transcoders
            .keys()
            .cloned()
            .collect()
    }

    pub fn gateway_pid(&self) -> Option<u32> {
        lock_mutex(&self.state, "gateway.pid")
            .gateway
            .as_ref()
            .map(|g| g.pid())
    }

    /// WHEP endpoint on the host the client used to reach us.
    pub fn webrtc_url(&self, camera_id: &str, request_host: &str) -> String {
        let port = self.store.load().system.gateway_webrtc_port;
        format!(
            "http://{}:{}/{}/whep",
            strip_port(request_host),
            port,
            camera_id
        )
    }

    pub fn hls_url(&self, camera_id: &str, request_host: &str) -> String {
        let port = self.store.load().system.gateway_hls_port;
        format!(
            "http://{}:{}/{}/index.m3u8",
            strip_port(request_host),
            port,
            camera_id
        )
    }

    pub fn config_path(&self) -> PathBuf {
        resolve_path(
            &self.store.base_dir(),
            &self.store.load().system.gateway_config,
        )
    }
}

fn write_routing<'a>(
    config: &AppConfig,
    cameras: impl IntoIterator<Item = &'a CameraConfig>,
    path: &std::path::Path,
) -> SupervisorResult<()> {
    let routing = build_routing(cameras, &config.system, &config.gateway);
    let yaml = routing
        .to_yaml()
        .map_err(|e| SupervisorError::with_context("serializing routing config", e))?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| SupervisorError::with_context(format!("creating {:?}", dir), e))?;
    }
    std::fs::write(path, yaml)
        .map_err(|e| SupervisorError::with_context(format!("writing {:?}", path), e))
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}
