use chrono::{Local, TimeZone};
use datatracker::commands::Command;
use datatracker::identity::{Resolution, StaticProbe};
use datatracker::metrics::Metrics;
use datatracker::sampler::Sample;
use datatracker::service::run_sampling_loop;
use datatracker::{simulator, AppConfig, Tracker};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::watch;

fn config_in(dir: &std::path::Path) -> AppConfig {
    AppConfig {
        service_name: "pipeline-test".into(),
        data_directory: dir.to_string_lossy().to_string(),
        ..AppConfig::default()
    }
}

fn local_ms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
    Local
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .unwrap()
        .timestamp_millis()
}

#[tokio::test]
async fn existing_store_document_keeps_accumulating() {
    let tmp = tempdir().expect("temp dir");
    let config = config_in(tmp.path());
    // A document written by an earlier install of the tracker
    std::fs::write(
        config.data_file(),
        r#"{
  "2024-04-01": {
    "rx_tx_bytes": 300, "rx_bytes": 200, "tx_bytes": 100,
    "last_rx": 10000, "last_tx": 20000,
    "networks": {
      "Home": {"interface": "wlan0", "rx_tx_bytes": 300, "rx_bytes": 200,
               "tx_bytes": 100, "firstSeen": 1, "lastSeen": 2}
    }
  }
}"#,
    )
    .expect("seed store");

    let probe = Arc::new(StaticProbe::new(Some(Resolution {
        interface_label: "wlan0".into(),
        network_name: Some("Home".into()),
        ..Resolution::default()
    })));
    let tracker = Tracker::open(&config, probe, Arc::new(Metrics::new()))
        .await
        .expect("open");
    let update = tracker
        .process(None, &Sample::new(10_500, 20_100, local_ms(2024, 4, 1, 18, 0, 0)))
        .await;

    let day = &update.daily["2024-04-01"];
    assert_eq!(day.rx_tx_bytes, 900);
    assert_eq!(day.networks["Home"].rx_tx_bytes, 900);
    assert_eq!(day.networks["Home"].first_seen_ms, 1);

    let raw = std::fs::read_to_string(config.data_file()).expect("read store");
    let doc: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let home = &doc["2024-04-01"]["networks"]["Home"];
    assert_eq!(home["interface"], "wlan0");
    assert!(home.get("firstSeen").is_some());
    assert!(home.get("lastSeen").is_some());
}

#[tokio::test]
async fn corrupt_store_starts_over() {
    let tmp = tempdir().expect("temp dir");
    let config = config_in(tmp.path());
    std::fs::write(config.data_file(), "{ truncated").expect("seed store");

    let tracker = Tracker::open(&config, Arc::new(StaticProbe::default()), Arc::new(Metrics::new()))
        .await
        .expect("open");
    assert!(tracker.get_daily_data().await.is_empty());

    let update = tracker
        .process(None, &Sample::new(7, 7, local_ms(2024, 4, 2, 9, 0, 0)))
        .await;
    assert_eq!(update.daily.len(), 1);
    assert_eq!(update.daily["2024-04-02"].last_rx, 7);
}

#[tokio::test]
async fn sampling_loop_feeds_subscribers_until_shutdown() {
    struct Rising(u64);

    impl datatracker::sampler::CounterSource for Rising {
        fn sample(&mut self) -> datatracker::error::Result<Sample> {
            self.0 += 1_024;
            Ok(Sample::new(self.0, self.0 / 2, Local::now().timestamp_millis()))
        }
    }

    let tmp = tempdir().expect("temp dir");
    let tracker = Arc::new(
        Tracker::open(
            &config_in(tmp.path()),
            Arc::new(StaticProbe::default()),
            Arc::new(Metrics::new()),
        )
        .await
        .expect("open"),
    );
    let mut updates = tracker.port().subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = tokio::spawn(run_sampling_loop(
        tracker.clone(),
        Box::new(Rising(0)),
        Duration::from_millis(5),
        shutdown_rx,
    ));

    for _ in 0..3 {
        let update = updates.recv().await.expect("update");
        assert_eq!(
            update.speed_bytes_per_sec,
            update.download_speed_bytes_per_sec + update.upload_speed_bytes_per_sec
        );
    }
    shutdown_tx.send(()).expect("shutdown");
    handle.await.expect("join");
    assert!(tracker.metrics().snapshot().ticks >= 3);
}

#[tokio::test]
async fn commands_reply_with_json() {
    let tmp = tempdir().expect("temp dir");
    let tracker = Tracker::open(
        &config_in(tmp.path()),
        Arc::new(StaticProbe::default()),
        Arc::new(Metrics::new()),
    )
    .await
    .expect("open");

    let info = Command::GetNetworkInfo.execute(&tracker).await.expect("info");
    assert!(info.is_null());

    let paths = Command::GetStorePath.execute(&tracker).await.expect("paths");
    assert!(paths["dataFile"]
        .as_str()
        .unwrap_or_default()
        .ends_with("daily.json"));

    let reset = Command::ResetData.execute(&tracker).await.expect("reset");
    assert_eq!(reset, serde_json::Value::Bool(true));
}

#[tokio::test]
async fn replay_reports_rejected_lines() {
    let tmp = tempdir().expect("temp dir");
    let config = config_in(tmp.path());
    let summary = simulator::replay_trace("tests/fixtures/damaged.trace", &config)
        .await
        .expect("replay");
    assert_eq!(summary.ticks, 2);
    assert_eq!(summary.rejected, 3);
}
