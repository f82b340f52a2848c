// src/rtsp.rs
use crate::config::CameraConfig;

/// iCSee-style RTSP address. `stream` 0 is the main stream, 1 the sub stream.
pub fn build_rtsp_url(
    ip: &str,
    port: u16,
    username: &str,
    password: &str,
    channel: u32,
    stream: u32,
) -> String {
    format!(
        "rtsp://{}:{}/user={}&password={}&channel={}&stream={}.sdp?real_stream",
        ip, port, username, password, channel, stream
    )
}

pub fn build_stream_url(camera: &CameraConfig) -> String {
    build_rtsp_url(
        &camera.ip,
        camera.port,
        &camera.username,
        &camera.password,
        camera.channel,
        camera.stream,
    )
}
