// src/gateway/routing.rs
//
// Routing document for the streaming gateway (MediaMTX YAML).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{CameraConfig, GatewaySettings, SystemSettings};
use crate::rtsp::build_stream_url;

use super::transcode::needs_transcode;

/// Accepts any publisher on paths not listed explicitly.
pub const CATCH_ALL_PATH: &str = "all_others";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PathConfig {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_on_demand: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_on_demand_start_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_on_demand_close_after: Option<String>,
}

impl PathConfig {
    pub fn publisher() -> Self {
        Self {
            source: "publisher".to_string(),
            source_on_demand: None,
            source_on_demand_start_timeout: None,
            source_on_demand_close_after: None,
        }
    }

    pub fn is_publisher(&self) -> bool {
        self.source == "publisher"
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingConfig {
    pub log_level: String,
    pub log_destinations: Vec<String>,
    pub api: bool,
    pub api_address: String,
    pub rtsp: bool,
    pub rtsp_address: String,
    pub webrtc: bool,
    pub webrtc_address: String,
    pub hls: bool,
    pub hls_address: String,
    pub paths: BTreeMap<String, PathConfig>,
}

impl RoutingConfig {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Direct pull for browser-compatible cameras, loopback publisher for
/// transcoded ones.
pub fn build_routing<'a>(
    cameras: impl IntoIterator<Item = &'a CameraConfig>,
    system: &SystemSettings,
    gateway: &GatewaySettings,
) -> RoutingConfig {
    let mut paths = BTreeMap::new();

    for camera in cameras {
        let path = if needs_transcode(camera) {
            PathConfig::publisher()
        } else if gateway.on_demand {
            PathConfig {
                source: build_stream_url(camera),
                source_on_demand: Some(true),
                source_on_demand_start_timeout: Some(gateway.on_demand_start_timeout.clone()),
                source_on_demand_close_after: Some(gateway.on_demand_close_after.clone()),
            }
        } else {
            PathConfig {
                source: build_stream_url(camera),
                source_on_demand: Some(false),
                source_on_demand_start_timeout: None,
                source_on_demand_close_after: None,
            }
        };
        paths.insert(camera.id.clone(), path);
    }

    paths.insert(CATCH_ALL_PATH.to_string(), PathConfig::publisher());

    RoutingConfig {
        log_level: "warn".to_string(),
        log_destinations: vec!["stdout".to_string()],
        api: true,
        api_address: format!(":{}", system.gateway_api_port),
        rtsp: true,
        rtsp_address: format!(":{}", system.gateway_rtsp_port),
        webrtc: true,
        webrtc_address: format!(":{}", system.gateway_webrtc_port),
        hls: true,
        hls_address: format!(":{}", system.gateway_hls_port),
        paths,
    }
}
