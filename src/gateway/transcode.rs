// src/gateway/transcode.rs
//
// Browsers play H.264 over WebRTC/HLS; anything else is re-encoded by a
// per-camera ffmpeg that publishes into the gateway over loopback RTSP.

use std::path::Path;

use crate::config::{Brand, CameraConfig, CodecHint};
use crate::process::LaunchSpec;
use crate::rtsp::build_stream_url;

/// Pure decision: does `camera` need a transcoder in front of the gateway?
pub fn needs_transcode(camera: &CameraConfig) -> bool {
    match camera.codec {
        CodecHint::H264 => false,
        CodecHint::H265 => true,
        CodecHint::Auto => brand_defaults_to_h265(camera.brand),
    }
}

/// Codec a vendor ships by default when the camera record does not say.
fn brand_defaults_to_h265(brand: Brand) -> bool {
    match brand {
        Brand::Icsee | Brand::Generic => true,
        Brand::Hikvision | Brand::Intelbras | Brand::Onvif | Brand::Auto => false,
    }
}

/// Loopback publish point the transcoder feeds and the gateway serves.
pub fn ingest_url(camera_id: &str, rtsp_port: u16) -> String {
    format!("rtsp://127.0.0.1:{}/{}", rtsp_port, camera_id)
}

pub fn transcode_launch_spec(camera: &CameraConfig, program: &Path, rtsp_port: u16) -> LaunchSpec {
    LaunchSpec::new(format!("transcode:{}", camera.id), program).args([
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-timeout".to_string(),
        "5000000".to_string(),
        "-i".to_string(),
        build_stream_url(camera),
        "-an".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-tune".to_string(),
        "zerolatency".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-f".to_string(),
        "rtsp".to_string(),
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        ingest_url(&camera.id, rtsp_port),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(codec: CodecHint, brand: Brand) -> CameraConfig {
        CameraConfig {
            codec,
            brand,
            ..CameraConfig::new("camera-1", "10.0.0.1")
        }
    }

    #[test]
    fn explicit_codec_wins_over_brand() {
        assert!(!needs_transcode(&cam(CodecHint::H264, Brand::Icsee)));
        assert!(needs_transcode(&cam(CodecHint::H265, Brand::Hikvision)));
    }

    #[test]
    fn auto_codec_follows_brand_default() {
        assert!(needs_transcode(&cam(CodecHint::Auto, Brand::Icsee)));
        assert!(needs_transcode(&cam(CodecHint::Auto, Brand::Generic)));
        assert!(!needs_transcode(&cam(CodecHint::Auto, Brand::Hikvision)));
        assert!(!needs_transcode(&cam(CodecHint::Auto, Brand::Intelbras)));
        assert!(!needs_transcode(&cam(CodecHint::Auto, Brand::Onvif)));
        assert!(!needs_transcode(&cam(CodecHint::Auto, Brand::Auto)));
    }

    #[test]
    fn default_camera_is_transcoded() {
        assert!(needs_transcode(&CameraConfig::default()));
    }

    #[test]
    fn transcoder_publishes_to_loopback() {
        let spec = transcode_launch_spec(&cam(CodecHint::H265, Brand::Icsee), Path::new("ffmpeg"), 8554);
        assert_eq!(spec.label, "transcode:camera-1");
        assert_eq!(spec.args.last().unwrap(), "rtsp://127.0.0.1:8554/camera-1");
        assert!(spec.args.join(" ").contains("-c:v libx264"));
    }
}
