use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ledger::Ledger;

/// Live update pushed once per sampling tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    pub speed_bytes_per_sec: u64,
    pub download_speed_bytes_per_sec: u64,
    pub upload_speed_bytes_per_sec: u64,
    pub daily: Arc<Ledger>,
    pub timestamp: i64,
}

/// Reply to `get_network_info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub interface: String,
    pub network_name: String,
    pub signal_strength: String,
    pub link_speed: String,
    pub uptime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorePaths {
    pub data_file: String,
    pub data_directory: String,
}
