use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::lock::lock_mutex;

// ---------- Camera ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    #[default]
    Offline,
    Online,
    Recording,
    Error,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Offline => "offline",
            CameraStatus::Online => "online",
            CameraStatus::Recording => "recording",
            CameraStatus::Error => "error",
        }
    }
}

/// Vendor hint. Decides the codec assumed when the codec hint is `auto`.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Auto,
    Intelbras,
    Hikvision,
    #[default]
    Icsee,
    Generic,
    Onvif,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecHint {
    Auto,
    H264,
    #[default]
    #[serde(alias = "hevc")]
    H265,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub channel: u32,
    /// 0 = main stream, 1 = sub stream.
    pub stream: u32,
    pub brand: Brand,
    pub codec: CodecHint,
    pub enabled: bool,
    pub status: CameraStatus,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            ip: String::new(),
            port: 554,
            username: "admin".to_string(),
            password: String::new(),
            channel: 1,
            stream: 0,
            brand: Brand::default(),
            codec: CodecHint::default(),
            enabled: true,
            status: CameraStatus::Offline,
        }
    }
}

impl CameraConfig {
    pub fn new(id: &str, ip: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            ip: ip.to_string(),
            ..Self::default()
        }
    }
}

/// Partial camera update; `None` leaves the field untouched.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CameraUpdate {
    pub name: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub channel: Option<u32>,
    pub stream: Option<u32>,
    pub brand: Option<Brand>,
    pub codec: Option<CodecHint>,
    pub enabled: Option<bool>,
    pub status: Option<CameraStatus>,
}

impl CameraUpdate {
    pub fn status(status: CameraStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, camera: &mut CameraConfig) {
        if let Some(v) = &self.name {
            camera.name = v.clone();
        }
        if let Some(v) = &self.ip {
            camera.ip = v.clone();
        }
        if let Some(v) = self.port {
            camera.port = v;
        }
        if let Some(v) = &self.username {
            camera.username = v.clone();
        }
        if let Some(v) = &self.password {
            camera.password = v.clone();
        }
        if let Some(v) = self.channel {
            camera.channel = v;
        }
        if let Some(v) = self.stream {
            camera.stream = v;
        }
        if let Some(v) = self.brand {
            camera.brand = v;
        }
        if let Some(v) = self.codec {
            camera.codec = v;
        }
        if let Some(v) = self.enabled {
            camera.enabled = v;
        }
        if let Some(v) = self.status {
            camera.status = v;
        }
    }
}

// ---------- Recording ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RecordingSettings {
    /// Segment length in seconds.
    pub segment_duration: u32,
    pub retention_days: u32,
    /// Relative paths resolve against the config file's directory.
    pub recordings_path: String,
    pub min_free_gb: f64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            segment_duration: 1800,
            retention_days: 7,
            recordings_path: "recordings".to_string(),
            min_free_gb: 5.0,
        }
    }
}

// ---------- System ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SystemSettings {
    pub web_port: u16,
    pub monitoring_port: u16,
    pub ffmpeg_path: String,
    pub gateway_executable: String,
    pub gateway_config: String,
    pub gateway_api_port: u16,
    pub gateway_rtsp_port: u16,
    pub gateway_webrtc_port: u16,
    pub gateway_hls_port: u16,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            web_port: 8080,
            monitoring_port: 9090,
            ffmpeg_path: "ffmpeg".to_string(),
            gateway_executable: "tools/mediamtx/mediamtx".to_string(),
            gateway_config: "tools/mediamtx/mediamtx.yml".to_string(),
            gateway_api_port: 9997,
            gateway_rtsp_port: 8554,
            gateway_webrtc_port: 8889,
            gateway_hls_port: 8888,
        }
    }
}

// ---------- Gateway ----------
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Pull cameras only while someone is watching.
    pub on_demand: bool,
    pub on_demand_start_timeout: String,
    pub on_demand_close_after: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            on_demand: true,
            on_demand_start_timeout: "10s".to_string(),
            on_demand_close_after: "30s".to_string(),
        }
    }
}

// ---------- Tunnel ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TunnelMode {
    #[default]
    Disabled,
    Quick,
    Named,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TunnelSettings {
    pub mode: TunnelMode,
    pub executable: String,
    pub hostname: Option<String>,
    pub public_url: Option<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            mode: TunnelMode::Disabled,
            executable: "tools/cloudflared/cloudflared".to_string(),
            hostname: None,
            public_url: None,
        }
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub system: SystemSettings,
    pub recording: RecordingSettings,
    pub gateway: GatewaySettings,
    pub tunnel: TunnelSettings,
    pub cameras: Vec<CameraConfig>,
}

impl AppConfig {
    pub fn camera(&self, camera_id: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.id == camera_id)
    }

    pub fn enabled_cameras(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.iter().filter(|c| c.enabled)
    }

    pub fn recordings_root(&self, base_dir: &Path) -> PathBuf {
        resolve_path(base_dir, &self.recording.recordings_path)
    }

    /// Next free `camera-N` id, one past the highest numeric suffix in use.
    pub fn next_camera_id(&self) -> String {
        let highest = self
            .cameras
            .iter()
            .filter_map(|c| c.id.rsplit('-').next()?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("camera-{}", highest + 1)
    }
}

/// Relative config paths are anchored at `base_dir`; bare program names
/// (no separator) are left alone so they resolve through `PATH`.
pub fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

pub fn resolve_program(base_dir: &Path, value: &str) -> PathBuf {
    if value.contains('/') || value.contains('\\') {
        resolve_path(base_dir, value)
    } else {
        PathBuf::from(value)
    }
}

// ---------- Store ----------

/// Persisted configuration. The single source of truth for every component.
///
/// There is no lock spanning `load` and `save`: a write from another thread
/// between two loads in the same watchdog tick is visible to the second load,
/// and a concurrent read-modify-write can lose the other writer's change.
pub trait ConfigStore: Send + Sync {
    /// Never fails; falls back to defaults when the document is unreadable.
    fn load(&self) -> AppConfig;

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    /// Directory that relative paths in the config resolve against.
    fn base_dir(&self) -> PathBuf;

    fn update_camera(&self, camera_id: &str, update: &CameraUpdate) -> Result<(), ConfigError> {
        let mut config = self.load();
        match config.cameras.iter_mut().find(|c| c.id == camera_id) {
            Some(camera) => update.apply_to(camera),
            None => return Ok(()),
        }
        self.save(&config)
    }

    fn get_camera(&self, camera_id: &str) -> Option<CameraConfig> {
        self.load().camera(camera_id).cloned()
    }

    fn add_camera(&self, camera: CameraConfig) -> Result<(), ConfigError> {
        let mut config = self.load();
        if config.camera(&camera.id).is_some() {
            return Err(ConfigError::message(format!(
                "camera '{}' already exists",
                camera.id
            )));
        }
        config.cameras.push(camera);
        self.save(&config)
    }

    fn remove_camera(&self, camera_id: &str) -> Result<(), ConfigError> {
        let mut config = self.load();
        config.cameras.retain(|c| c.id != camera_id);
        self.save(&config)
    }
}

/// TOML document on disk; created with defaults on first load.
pub struct FileConfigStore {
    path: PathBuf,
    // Serialises writers within this process only.
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> AppConfig {
        let txt = match std::fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = AppConfig::default();
                if let Err(e) = self.save(&config) {
                    warn!("[config] cannot write defaults: {}", e);
                }
                return config;
            }
            Err(e) => {
                error!("[config] error reading {:?}: {}. Using defaults.", self.path, e);
                return AppConfig::default();
            }
        };

        match toml::from_str(&txt) {
            Ok(config) => config,
            Err(e) => {
                error!("[config] error parsing {:?}: {}. Using defaults.", self.path, e);
                AppConfig::default()
            }
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let _guard = lock_mutex(&self.write_lock, "config.save");

        let txt = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::with_context("serializing config", e))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::with_context(format!("creating {:?}", parent), e)
                })?;
            }
        }

        // Write-then-rename so a reader never sees a half-written document.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, txt)
            .map_err(|e| ConfigError::with_context(format!("writing {:?}", tmp), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ConfigError::with_context(format!("replacing {:?}", self.path), e))?;

        info!("[config] saved {:?}", self.path);
        Ok(())
    }

    fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}
