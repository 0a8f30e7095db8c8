use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_directory: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_directory: String,
    #[serde(default = "default_data_file_name")]
    pub data_file_name: String,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    #[serde(default = "default_identity_interval_secs")]
    pub identity_interval_seconds: u64,
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_seconds: u64,
    #[serde(default)]
    pub bus_address: Option<String>,
    #[serde(default = "default_bus_client_name")]
    pub bus_client_name: String,
    #[serde(default = "default_update_topic")]
    pub update_topic: String,
    #[serde(default = "default_identity_topic")]
    pub identity_topic: String,
}

fn default_service_name() -> String {
    "datatracker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-user application data directory, falling back to a local folder when
/// neither the XDG nor the Windows variables are set.
fn default_data_dir() -> String {
    let base = std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("APPDATA").map(PathBuf::from))
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/share")));
    match base {
        Some(base) => base
            .join("datatracker")
            .join("data")
            .to_string_lossy()
            .into_owned(),
        None => "./deployment/data".to_string(),
    }
}

fn default_data_file_name() -> String {
    "daily.json".to_string()
}

fn default_sample_interval_ms() -> u64 {
    1000
}

fn default_identity_interval_secs() -> u64 {
    30
}

fn default_idle_threshold_secs() -> u64 {
    30
}

fn default_bus_client_name() -> String {
    "datatracker.core".to_string()
}

fn default_update_topic() -> String {
    "net/update".to_string()
}

fn default_identity_topic() -> String {
    "net/identity".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            log_directory: None,
            data_directory: default_data_dir(),
            data_file_name: default_data_file_name(),
            sample_interval_ms: default_sample_interval_ms(),
            identity_interval_seconds: default_identity_interval_secs(),
            idle_threshold_seconds: default_idle_threshold_secs(),
            bus_address: None,
            bus_client_name: default_bus_client_name(),
            update_topic: default_update_topic(),
            identity_topic: default_identity_topic(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> &'static str {
        "config/datatracker.toml"
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("failed to read configuration from {}", path_ref.display()))?;
        let mut config: Self = toml::from_str(&raw).with_context(|| {
            format!("failed to parse configuration from {}", path_ref.display())
        })?;
        if config.service_name.trim().is_empty() {
            config.service_name = default_service_name();
        }
        if config.sample_interval_ms == 0 {
            anyhow::bail!("sample_interval_ms must be greater than zero");
        }
        if config.identity_interval_seconds == 0 {
            anyhow::bail!("identity_interval_seconds must be greater than zero");
        }
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise runs on defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_file(&self) -> PathBuf {
        Path::new(&self.data_directory).join(&self.data_file_name)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn identity_interval(&self) -> Duration {
        Duration::from_secs(self.identity_interval_seconds)
    }
}
