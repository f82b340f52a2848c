use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;

use sentinela_node::config::AppConfig;
use sentinela_node::recorder::{FsRetention, RetentionPolicy, StoreRetention};
use sentinela_node::testing::mocks::{FakeDisk, MemoryConfigStore};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn make_day(root: &Path, date: &str, bytes: usize) {
    let dir = root.join(date).join("camera-1");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("rec_10-00-00.mp4"), vec![0u8; bytes]).unwrap();
}

fn remaining(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn cleanup_old_deletes_folders_before_cutoff() {
    let tmp = tempfile::tempdir().unwrap();
    for d in 1..=10 {
        make_day(tmp.path(), &format!("2024-01-{:02}", d), 10);
    }

    let retention = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FakeDisk::new(0)));
    assert_eq!(retention.cleanup_old(7, day(2024, 1, 10)), 2);

    let left = remaining(tmp.path());
    assert_eq!(left.first().map(String::as_str), Some("2024-01-03"));
    assert_eq!(left.len(), 8);

    // Nothing more to do on the same day.
    assert_eq!(retention.cleanup_old(7, day(2024, 1, 10)), 0);
}

#[test]
fn cleanup_old_on_missing_root_is_noop() {
    let retention = FsRetention::new(
        "/nonexistent/sentinela/recordings".into(),
        Arc::new(FakeDisk::new(0)),
    );
    assert_eq!(retention.cleanup_old(7, day(2024, 1, 10)), 0);
}

#[test]
fn cleanup_if_low_deletes_oldest_until_threshold() {
    let tmp = tempfile::tempdir().unwrap();
    for date in ["2024-01-03", "2024-01-01", "2024-01-02", "2024-01-04"] {
        make_day(tmp.path(), date, 1024);
    }

    // 3 KiB free, 5 KiB wanted, 1 KiB per folder: the two oldest go.
    let retention = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FakeDisk::new(3072)));
    let deleted = retention.cleanup_if_low(5.0 * 1024.0 / GIB);

    assert_eq!(deleted, vec!["2024-01-01", "2024-01-02"]);
    assert_eq!(remaining(tmp.path()), vec!["2024-01-03", "2024-01-04"]);
}

#[test]
fn cleanup_if_low_is_noop_with_enough_space() {
    let tmp = tempfile::tempdir().unwrap();
    make_day(tmp.path(), "2024-01-01", 1024);

    let retention = FsRetention::new(
        tmp.path().to_path_buf(),
        Arc::new(FakeDisk::new(10 * 1024 * 1024 * 1024)),
    );
    assert!(retention.cleanup_if_low(5.0).is_empty());
    assert_eq!(remaining(tmp.path()), vec!["2024-01-01"]);
}

#[test]
fn cleanup_if_low_stops_when_folders_run_out() {
    let tmp = tempfile::tempdir().unwrap();
    make_day(tmp.path(), "2024-01-01", 10);
    make_day(tmp.path(), "2024-01-02", 10);

    let retention = FsRetention::new(tmp.path().to_path_buf(), Arc::new(FakeDisk::new(0)));
    let deleted = retention.cleanup_if_low(1.0);

    assert_eq!(deleted.len(), 2);
    assert!(remaining(tmp.path()).is_empty());
}

#[test]
fn store_retention_uses_configured_root_and_limits() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("recordings");
    for d in 1..=5 {
        make_day(&root, &format!("2024-03-{:02}", d), 100);
    }

    let mut config = AppConfig::default();
    config.recording.retention_days = 2;
    config.recording.min_free_gb = 0.0;
    let store = Arc::new(MemoryConfigStore::new(tmp.path(), config));

    let retention = StoreRetention::new(store, Arc::new(FakeDisk::new(0)));
    assert_eq!(retention.current().total_size(), 500);

    retention.run(day(2024, 3, 5)).unwrap();
    assert_eq!(remaining(&root), vec!["2024-03-03", "2024-03-04", "2024-03-05"]);
}

#[test]
fn store_retention_skips_missing_root() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryConfigStore::new(tmp.path(), AppConfig::default()));
    let retention = StoreRetention::new(store, Arc::new(FakeDisk::new(0)));

    retention.run(day(2024, 3, 5)).unwrap();
    assert!(!tmp.path().join("recordings").exists());
}
