// src/recorder/backoff.rs

/// Minimum seconds between restart attempts, indexed by consecutive failures.
pub const BACKOFF_SECS: [u64; 5] = [5, 10, 30, 60, 300];

/// Backoff for `failures` consecutive failures; clamps to the last entry.
pub fn backoff_secs(failures: u32) -> u64 {
    let idx = (failures as usize).min(BACKOFF_SECS.len() - 1);
    BACKOFF_SECS[idx]
}

/// `elapsed_secs` is `None` when the camera has never been started.
pub fn restart_due(failures: u32, elapsed_secs: Option<f64>) -> bool {
    match elapsed_secs {
        Some(elapsed) => elapsed >= backoff_secs(failures) as f64,
        None => true,
    }
}
