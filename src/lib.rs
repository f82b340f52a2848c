// src/lib.rs
pub mod config;
pub mod core;
pub mod gateway;
pub mod monitoring;
pub mod process;
pub mod recorder;
pub mod rtsp;
pub mod testing;
pub mod tunnel;
pub mod watchdog;

pub use config::{AppConfig, CameraConfig, ConfigStore, FileConfigStore};
pub use core::{Clock, ComponentLogger, LogContext, SystemClock};
pub use gateway::GatewaySupervisor;
pub use recorder::{FsRetention, RecordingSupervisor, StoreRetention};
pub use tunnel::{TunnelControl, TunnelSupervisor};
pub use watchdog::{Watchdog, WatchdogDeps};
