// src/recorder/mod.rs

use chrono::NaiveDate;

/// Periodic storage housekeeping invoked by the watchdog.
pub trait RetentionPolicy: Send + Sync {
    fn run(&self, today: NaiveDate) -> anyhow::Result<()>;
}

pub mod backoff;
pub mod retention_fs;
pub mod supervisor;

pub use backoff::{BACKOFF_SECS, backoff_secs};
pub use retention_fs::{DiskSpace, FsRetention, StatvfsDisk, StoreRetention};
pub use supervisor::{RecordingStatus, RecordingSupervisor};
