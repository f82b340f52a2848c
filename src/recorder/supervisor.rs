// src/recorder/supervisor.rs
//
// One ffmpeg segment-muxer per enabled camera. Stream copy only, no
// re-encoding; segments land in <root>/<YYYY-MM-DD>/<camera_id>/.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::config::{AppConfig, CameraConfig, CameraStatus, CameraUpdate, ConfigStore, resolve_program};
use crate::core::clock::{Clock, day_string, seconds_between};
use crate::core::error::{SupervisorError, SupervisorResult};
use crate::core::lock::lock_mutex;
use crate::process::{LaunchSpec, ProcessHandle, ProcessLauncher, STOP_GRACE, stop_handle};
use crate::rtsp::build_stream_url;

use super::backoff::restart_due;

struct RecordingHandle {
    process: Box<dyn ProcessHandle>,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderState {
    handles: HashMap<String, RecordingHandle>,
    // Kept apart from `handles`: a crash drops liveness, not history.
    last_starts: HashMap<String, DateTime<Utc>>,
    failures: HashMap<String, u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecordingStatus {
    pub recording: bool,
    pub pid: Option<u32>,
    pub uptime_secs: f64,
}

pub struct RecordingSupervisor {
    store: Arc<dyn ConfigStore>,
    launcher: Arc<dyn ProcessLauncher>,
    clock: Arc<dyn Clock>,
    stop_grace: Duration,
    state: Mutex<RecorderState>,
}

impl RecordingSupervisor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        launcher: Arc<dyn ProcessLauncher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            launcher,
            clock,
            stop_grace: STOP_GRACE,
            state: Mutex::new(RecorderState::default()),
        }
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Starts recording `camera`. No-op while a live recorder exists.
    ///
    /// Launch failures are logged and leave the camera in ERROR with no
    /// handle; `check_and_restart` picks it up on the next tick.
    pub fn start(&self, camera: &CameraConfig) {
        let config = self.store.load();
        let now = self.clock.now();

        let mut state = lock_mutex(&self.state, "recorder.start");
        if let Some(handle) = state.handles.get_mut(&camera.id) {
            if handle.process.is_alive() {
                info!("[recorder] {} already recording", camera.id);
                return;
            }
        }
        state.handles.remove(&camera.id);
        // Backoff is measured from the attempt, successful or not.
        state.last_starts.insert(camera.id.clone(), now);

        match self.launch(camera, &config) {
            Ok((process, dir)) => {
                let pid = process.pid();
                state.handles.insert(
                    camera.id.clone(),
                    RecordingHandle {
                        process,
                        started_at: now,
                    },
                );
                state.failures.insert(camera.id.clone(), 0);
                drop(state);

                self.set_status(&camera.id, CameraStatus::Recording);
                info!(
                    "[recorder] started {} ({}) pid={} -> {}",
                    camera.name,
                    camera.id,
                    pid,
                    dir.display()
                );
            }
            Err(e) => {
                drop(state);
                if e.is_missing_executable() {
                    error!("[recorder] {}. Install ffmpeg and add it to PATH.", e);
                } else {
                    error!("[recorder] failed to start {}: {}", camera.id, e);
                }
                self.set_status(&camera.id, CameraStatus::Error);
            }
        }
    }

    fn launch(
        &self,
        camera: &CameraConfig,
        config: &AppConfig,
    ) -> SupervisorResult<(Box<dyn ProcessHandle>, PathBuf)> {
        let base = self.store.base_dir();
        let dir = config
            .recordings_root(&base)
            .join(day_string(self.clock.today()))
            .join(&camera.id);
        std::fs::create_dir_all(&dir).map_err(|source| SupervisorError::OutputDir {
            path: dir.clone(),
            source,
        })?;

        let program = resolve_program(&base, &config.system.ffmpeg_path);
        let spec = recording_launch_spec(
            camera,
            &program,
            &dir,
            config.recording.segment_duration,
        );
        let process = self.launcher.launch(&spec)?;
        Ok((process, dir))
    }

    /// Stops recording. Always leaves the camera OFFLINE, handle or not.
    pub fn stop(&self, camera_id: &str) {
        let handle = {
            let mut state = lock_mutex(&self.state, "recorder.stop");
            state.last_starts.remove(camera_id);
            state.handles.remove(camera_id)
        };

        // Terminate outside the lock; the grace wait can take seconds.
        if let Some(mut handle) = handle {
            if handle.process.is_alive() {
                stop_handle(handle.process.as_mut(), self.stop_grace);
                info!("[recorder] stopped {}", camera_id);
            }
        }

        self.set_status(camera_id, CameraStatus::Offline);
    }

    pub fn stop_all(&self) {
        let ids: Vec<String> = {
            let state = lock_mutex(&self.state, "recorder.stop_all");
            state.handles.keys().cloned().collect()
        };
        for id in ids {
            self.stop(&id);
        }
    }

    /// Stops the camera and forgets its failure history.
    pub fn remove_camera(&self, camera_id: &str) {
        self.stop(camera_id);
        lock_mutex(&self.state, "recorder.remove_camera")
            .failures
            .remove(camera_id);
    }

    pub fn is_recording(&self, camera_id: &str) -> bool {
        let mut state = lock_mutex(&self.state, "recorder.is_recording");
        state
            .handles
            .get_mut(camera_id)
            .map(|h| h.process.is_alive())
            .unwrap_or(false)
    }

    pub fn status_snapshot(&self) -> BTreeMap<String, RecordingStatus> {
        let now = self.clock.now();
        let mut state = lock_mutex(&self.state, "recorder.status_snapshot");
        state
            .handles
            .iter_mut()
            .map(|(id, handle)| {
                let alive = handle.process.is_alive();
                let status = RecordingStatus {
                    recording: alive,
                    pid: alive.then(|| handle.process.pid()),
                    uptime_secs: seconds_between(handle.started_at, now).max(0.0),
                };
                (id.clone(), status)
            })
            .collect()
    }

    /// Restarts every enabled camera without a live recorder once its
    /// backoff has elapsed. Returns the ids that were (re)started.
    pub fn check_and_restart(&self) -> Vec<String> {
        let config = self.store.load();
        let now = self.clock.now();
        let mut restarted = Vec::new();

        for camera in config.enabled_cameras() {
            let attempt = {
                let mut state = lock_mutex(&self.state, "recorder.check_and_restart");
                let alive = state
                    .handles
                    .get_mut(&camera.id)
                    .map(|h| h.process.is_alive())
                    .unwrap_or(false);
                if alive {
                    continue;
                }

                let failures = state.failures.get(&camera.id).copied().unwrap_or(0);
                let elapsed = state
                    .last_starts
                    .get(&camera.id)
                    .map(|started| seconds_between(*started, now));
                if !restart_due(failures, elapsed) {
                    continue;
                }

                let attempt = failures.saturating_add(1);
                state.failures.insert(camera.id.clone(), attempt);
                attempt
            };

            warn!(
                "[recorder] restarting {} (attempt {})",
                camera.id, attempt
            );
            self.start(camera);
            restarted.push(camera.id.clone());
        }

        restarted
    }

    /// Moves every live recording into today's folder. Returns how many
    /// cameras were restarted.
    pub fn day_rollover(&self) -> usize {
        info!("[recorder] day rollover: restarting recordings");
        let config = self.store.load();
        let mut rolled = 0;

        for camera in config.enabled_cameras() {
            if self.is_recording(&camera.id) {
                self.stop(&camera.id);
                self.start(camera);
                rolled += 1;
            }
        }

        rolled
    }

    pub fn failure_count(&self, camera_id: &str) -> u32 {
        lock_mutex(&self.state, "recorder.failure_count")
            .failures
            .get(camera_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_start(&self, camera_id: &str) -> Option<DateTime<Utc>> {
        lock_mutex(&self.state, "recorder.last_start")
            .last_starts
            .get(camera_id)
            .copied()
    }

    pub fn pid(&self, camera_id: &str) -> Option<u32> {
        lock_mutex(&self.state, "recorder.pid")
            .handles
            .get(camera_id)
            .map(|h| h.process.pid())
    }

    fn set_status(&self, camera_id: &str, status: CameraStatus) {
        if let Err(e) = self
            .store
            .update_camera(camera_id, &CameraUpdate::status(status))
        {
            warn!(
                "[recorder] cannot persist status {} for {}: {}",
                status.as_str(),
                camera_id,
                e
            );
        }
    }
}

/// ffmpeg invocation: TCP RTSP in, stream copy, fixed-length MP4 segments
/// named by wall-clock time.
pub fn recording_launch_spec(
    camera: &CameraConfig,
    program: &Path,
    output_dir: &Path,
    segment_secs: u32,
) -> LaunchSpec {
    let pattern = output_dir.join("rec_%H-%M-%S.mp4");

    LaunchSpec::new(format!("recorder:{}", camera.id), program).args([
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-timeout".to_string(),
        "5000000".to_string(),
        "-i".to_string(),
        build_stream_url(camera),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "segment".to_string(),
        "-segment_time".to_string(),
        segment_secs.to_string(),
        "-segment_format".to_string(),
        "mp4".to_string(),
        "-strftime".to_string(),
        "1".to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        pattern.display().to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_spec_copies_without_reencoding() {
        let cam = CameraConfig::new("camera-3", "10.1.1.3");
        let spec = recording_launch_spec(
            &cam,
            Path::new("ffmpeg"),
            Path::new("/rec/2024-01-10/camera-3"),
            600,
        );

        assert_eq!(spec.label, "recorder:camera-3");
        let args = spec.args.join(" ");
        assert!(args.contains("-c copy"));
        assert!(args.contains("-f segment"));
        assert!(args.contains("-segment_time 600"));
        assert!(args.ends_with("/rec/2024-01-10/camera-3/rec_%H-%M-%S.mp4"));
        assert!(args.contains("rtsp://10.1.1.3:554/"));
    }
}
