// src/recorder/retention_fs.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use log::{error, info, warn};
use serde::Serialize;

use crate::config::{AppConfig, ConfigStore};
use crate::core::clock::day_string;
use crate::recorder::RetentionPolicy;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Free-space source for the emergency cleanup.
pub trait DiskSpace: Send + Sync {
    fn free_bytes(&self, path: &Path) -> io::Result<u64>;
}

/// statvfs(3): blocks available to unprivileged users.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsDisk;

impl DiskSpace for StatvfsDisk {
    #[cfg(unix)]
    fn free_bytes(&self, path: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(io::Error::from)?;
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }

    #[cfg(not(unix))]
    fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "free space query not supported on this platform",
        ))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordingFile {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CameraRecordings {
    pub camera_id: String,
    pub files: Vec<RecordingFile>,
}

/// Day-folder retention over `root/YYYY-MM-DD/<camera>/...`.
pub struct FsRetention {
    root: PathBuf,
    disk: Arc<dyn DiskSpace>,
}

impl FsRetention {
    pub fn new(root: PathBuf, disk: Arc<dyn DiskSpace>) -> Self {
        Self { root, disk }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn total_size(&self) -> u64 {
        dir_size(&self.root)
    }

    /// Deletes day folders strictly older than `today - retention_days`.
    /// Returns how many were removed.
    pub fn cleanup_old(&self, retention_days: u32, today: NaiveDate) -> usize {
        let cutoff = today
            .checked_sub_days(Days::new(retention_days as u64))
            .map(day_string)
            .unwrap_or_default();

        let mut deleted = 0;
        for (name, path) in self.day_dirs() {
            if name.as_str() >= cutoff.as_str() {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    deleted += 1;
                    info!("[retention] deleted old recordings {}", name);
                }
                Err(e) => error!("[retention] failed to delete {:?}: {}", path, e),
            }
        }

        if deleted > 0 {
            info!("[retention] cleanup removed {} day folders", deleted);
        }
        deleted
    }

    /// Emergency cleanup: while free space is below `min_free_gb`, delete the
    /// oldest day folders. Returns the names deleted, oldest first.
    pub fn cleanup_if_low(&self, min_free_gb: f64) -> Vec<String> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut free = match self.disk.free_bytes(&self.root) {
            Ok(free) => free,
            Err(e) => {
                warn!("[retention] cannot query free space for {:?}: {}", self.root, e);
                return Vec::new();
            }
        };
        let threshold = (min_free_gb * GIB) as u64;
        if free >= threshold {
            return Vec::new();
        }

        warn!(
            "[retention] disk low: {:.1} GB free (minimum {:.1} GB), cleaning up",
            free as f64 / GIB,
            min_free_gb
        );

        let mut deleted = Vec::new();
        for (name, path) in self.day_dirs() {
            if free >= threshold {
                break;
            }
            let size = dir_size(&path);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    free = free.saturating_add(size);
                    info!(
                        "[retention] emergency cleanup deleted {} (freed {:.2} GB)",
                        name,
                        size as f64 / GIB
                    );
                    deleted.push(name);
                }
                Err(e) => error!("[retention] failed to delete {:?}: {}", path, e),
            }
        }

        deleted
    }

    /// Day folders, newest first.
    pub fn list_dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = self
            .day_dirs()
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name.len() == 10)
            .collect();
        dates.reverse();
        dates
    }

    pub fn list_cameras_for_date(&self, date: &str) -> Vec<CameraRecordings> {
        let mut cameras: Vec<CameraRecordings> = sorted_entries(&self.root.join(date))
            .into_iter()
            .filter(|(_, path)| path.is_dir())
            .map(|(camera_id, path)| {
                let files = sorted_entries(&path)
                    .into_iter()
                    .filter(|(name, _)| name.ends_with(".mp4"))
                    .map(|(name, file)| RecordingFile {
                        size_bytes: fs::metadata(&file).map(|m| m.len()).unwrap_or(0),
                        name,
                    })
                    .collect();
                CameraRecordings { camera_id, files }
            })
            .collect();
        cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        cameras
    }

    /// Directories directly under the root, sorted by name (= by date).
    fn day_dirs(&self) -> Vec<(String, PathBuf)> {
        sorted_entries(&self.root)
            .into_iter()
            .filter(|(_, path)| path.is_dir())
            .collect()
    }
}

/// Retention driven by the live config: root and limits are re-read on
/// every run.
pub struct StoreRetention {
    store: Arc<dyn ConfigStore>,
    disk: Arc<dyn DiskSpace>,
}

impl StoreRetention {
    pub fn new(store: Arc<dyn ConfigStore>, disk: Arc<dyn DiskSpace>) -> Self {
        Self { store, disk }
    }

    pub fn current(&self) -> FsRetention {
        self.for_config(&self.store.load())
    }

    fn for_config(&self, config: &AppConfig) -> FsRetention {
        FsRetention::new(
            config.recordings_root(&self.store.base_dir()),
            self.disk.clone(),
        )
    }
}

impl RetentionPolicy for StoreRetention {
    fn run(&self, today: NaiveDate) -> anyhow::Result<()> {
        let config = self.store.load();
        let retention = self.for_config(&config);
        if !retention.root().exists() {
            return Ok(());
        }

        retention.cleanup_old(config.recording.retention_days, today);
        retention.cleanup_if_low(config.recording.min_free_gb);
        Ok(())
    }
}

fn sorted_entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut out: Vec<(String, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            Some((name, entry.path()))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Recursive size of regular files; symlinks are not followed.
fn dir_size(path: &Path) -> u64 {
    let entries = match fs::read_dir(path) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => dir_size(&entry.path()),
            Ok(ft) if ft.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDisk(u64);

    impl DiskSpace for FixedDisk {
        fn free_bytes(&self, _path: &Path) -> io::Result<u64> {
            Ok(self.0)
        }
    }

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn total_size_sums_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("2024-01-01/camera-1/a.mp4"), 100);
        write_file(&tmp.path().join("2024-01-01/camera-2/b.mp4"), 50);
        write_file(&tmp.path().join("2024-01-02/camera-1/c.mp4"), 25);

        let r = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FixedDisk(0)));
        assert_eq!(r.total_size(), 175);
    }

    #[test]
    fn total_size_of_missing_root_is_zero() {
        let r = FsRetention::new(
            PathBuf::from("/nonexistent/sentinela/recordings"),
            Arc::new(FixedDisk(0)),
        );
        assert_eq!(r.total_size(), 0);
        assert!(r.cleanup_if_low(1.0).is_empty());
    }

    #[test]
    fn list_dates_newest_first_and_ignores_odd_names() {
        let tmp = tempfile::tempdir().unwrap();
        for d in ["2024-01-02", "2024-01-01", "2024-01-03", "misc"] {
            fs::create_dir_all(tmp.path().join(d)).unwrap();
        }
        write_file(&tmp.path().join("notes.txt"), 1);

        let r = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FixedDisk(0)));
        assert_eq!(r.list_dates(), vec!["2024-01-03", "2024-01-02", "2024-01-01"]);
    }

    #[test]
    fn list_cameras_for_date_lists_mp4_only() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(&tmp.path().join("2024-01-05/camera-2/rec_10-00-00.mp4"), 10);
        write_file(&tmp.path().join("2024-01-05/camera-1/rec_09-30-00.mp4"), 20);
        write_file(&tmp.path().join("2024-01-05/camera-1/rec_09-00-00.mp4"), 30);
        write_file(&tmp.path().join("2024-01-05/camera-1/ffmpeg.log"), 5);

        let r = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FixedDisk(0)));
        let cams = r.list_cameras_for_date("2024-01-05");
        assert_eq!(cams.len(), 2);
        assert_eq!(cams[0].camera_id, "camera-1");
        let names: Vec<&str> = cams[0].files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["rec_09-00-00.mp4", "rec_09-30-00.mp4"]);
        assert_eq!(cams[0].files[0].size_bytes, 30);
        assert!(r.list_cameras_for_date("2030-01-01").is_empty());
    }
}
