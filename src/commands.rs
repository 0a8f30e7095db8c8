use serde_json::Value;

use crate::tracker::Tracker;

/// Request/response commands served to presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetDailyData,
    GetNetworkInfo,
    ResetData,
    GetStorePath,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::GetDailyData,
        Command::GetNetworkInfo,
        Command::ResetData,
        Command::GetStorePath,
    ];

    pub fn method(self) -> &'static str {
        match self {
            Command::GetDailyData => "get_daily_data",
            Command::GetNetworkInfo => "get_network_info",
            Command::ResetData => "reset_data",
            Command::GetStorePath => "get_store_path",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.method() == method)
    }

    /// Runs the command; the reply is JSON (`null` when there is no
    /// network to report).
    pub async fn execute(self, tracker: &Tracker) -> serde_json::Result<Value> {
        match self {
            Command::GetDailyData => serde_json::to_value(tracker.get_daily_data().await),
            Command::GetNetworkInfo => serde_json::to_value(tracker.get_network_info().await),
            Command::ResetData => Ok(Value::Bool(tracker.reset_data().await)),
            Command::GetStorePath => serde_json::to_value(tracker.get_store_path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::identity::StaticProbe;
    use crate::metrics::Metrics;
    use crate::sampler::Sample;
    use chrono::Local;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn method_names_round_trip() {
        for cmd in Command::ALL {
            assert_eq!(Command::from_method(cmd.method()), Some(cmd));
        }
        assert_eq!(Command::from_method("get-connected-devices"), None);
    }

    #[tokio::test]
    async fn execute_produces_json_replies() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            data_directory: tmp.path().to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        let tracker = Tracker::open(&config, Arc::new(StaticProbe::default()), Arc::new(Metrics::new()))
            .await
            .expect("open");
        tracker
            .process(None, &Sample::new(5, 5, Local::now().timestamp_millis()))
            .await;

        let daily = Command::GetDailyData.execute(&tracker).await.expect("daily");
        assert_eq!(daily.as_object().map(|o| o.len()), Some(1));

        let info = Command::GetNetworkInfo.execute(&tracker).await.expect("info");
        assert!(info.is_null());

        let paths = Command::GetStorePath.execute(&tracker).await.expect("paths");
        assert!(paths["dataFile"].as_str().unwrap_or_default().ends_with("daily.json"));

        let reset = Command::ResetData.execute(&tracker).await.expect("reset");
        assert_eq!(reset, Value::Bool(true));
        let daily = Command::GetDailyData.execute(&tracker).await.expect("daily");
        assert_eq!(daily, serde_json::json!({}));
    }
}
