use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use std::thread;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::gateway::GatewaySupervisor;
use crate::recorder::{RecordingStatus, RecordingSupervisor, StoreRetention};
use crate::watchdog::Watchdog;

/// Everything the monitoring endpoints read from.
#[derive(Clone)]
pub struct MonitorSources {
    pub watchdog: Arc<Watchdog>,
    pub recorder: Arc<RecordingSupervisor>,
    pub gateway: Arc<GatewaySupervisor>,
    pub retention: Arc<StoreRetention>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    pub watchdog_running: bool,
    pub gateway_running: bool,
    pub gateway_pid: Option<u32>,
    pub recordings_bytes: u64,
    pub cameras: BTreeMap<String, RecordingStatus>,
}

impl StatusReport {
    pub fn collect(sources: &MonitorSources) -> Self {
        Self {
            watchdog_running: sources.watchdog.is_running(),
            gateway_running: sources.gateway.is_running(),
            gateway_pid: sources.gateway.gateway_pid(),
            recordings_bytes: sources.retention.current().total_size(),
            cameras: sources.recorder.status_snapshot(),
        }
    }
}

pub fn start_monitoring_server(bind: &str, sources: MonitorSources) -> anyhow::Result<()> {
    let server = Server::http(bind).map_err(|e| anyhow::anyhow!(e))?;
    log::info!("[monitoring] server on {}", bind);

    thread::spawn(move || {
        for req in server.incoming_requests() {
            handle(req, &sources);
        }
    });

    Ok(())
}

fn handle(req: Request, sources: &MonitorSources) {
    let result = match (req.method(), req.url()) {
        (&Method::Get, "/health") => {
            let running = sources.watchdog.is_running();
            let status = if running { StatusCode(200) } else { StatusCode(503) };
            let body = if running { "ok" } else { "not_running" };
            req.respond(with_content_type(
                Response::from_string(body).with_status_code(status),
                "text/plain",
            ))
        }
        (&Method::Get, "/metrics") => {
            let report = StatusReport::collect(sources);
            req.respond(with_content_type(
                Response::from_string(build_metrics(&report)),
                "text/plain; version=0.0.4",
            ))
        }
        (&Method::Get, "/status") => {
            let report = StatusReport::collect(sources);
            match serde_json::to_string(&report) {
                Ok(body) => req.respond(with_content_type(
                    Response::from_string(body),
                    "application/json",
                )),
                Err(e) => {
                    log::error!("[monitoring] status encode failed: {}", e);
                    req.respond(Response::empty(StatusCode(500)))
                }
            }
        }
        _ => req.respond(Response::empty(StatusCode(404))),
    };

    if let Err(e) = result {
        log::debug!("[monitoring] respond failed: {}", e);
    }
}

fn with_content_type<R: std::io::Read>(response: Response<R>, value: &str) -> Response<R> {
    match Header::from_bytes("Content-Type", value) {
        Ok(header) => response.with_header(header),
        Err(_) => response,
    }
}

pub fn build_metrics(report: &StatusReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# HELP sentinela_camera_recording Whether a live recorder exists for the camera."
    );
    let _ = writeln!(output, "# TYPE sentinela_camera_recording gauge");
    for (camera, status) in &report.cameras {
        let _ = writeln!(
            output,
            "sentinela_camera_recording{{camera=\"{}\"}} {}",
            escape_label_value(camera),
            u8::from(status.recording)
        );
    }

    let _ = writeln!(
        output,
        "# HELP sentinela_camera_uptime_seconds Seconds since the current recorder started."
    );
    let _ = writeln!(output, "# TYPE sentinela_camera_uptime_seconds gauge");
    for (camera, status) in &report.cameras {
        let _ = writeln!(
            output,
            "sentinela_camera_uptime_seconds{{camera=\"{}\"}} {:.1}",
            escape_label_value(camera),
            status.uptime_secs
        );
    }

    let _ = writeln!(
        output,
        "# HELP sentinela_gateway_up Whether the streaming gateway process is alive."
    );
    let _ = writeln!(output, "# TYPE sentinela_gateway_up gauge");
    let _ = writeln!(output, "sentinela_gateway_up {}", u8::from(report.gateway_running));

    let _ = writeln!(
        output,
        "# HELP sentinela_recordings_bytes Total size of the recordings tree."
    );
    let _ = writeln!(output, "# TYPE sentinela_recordings_bytes gauge");
    let _ = writeln!(output, "sentinela_recordings_bytes {}", report.recordings_bytes);

    output
}

fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\"', "\\\"")
}
