use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    signal,
    sync::watch,
    time::{interval, MissedTickBehavior},
};

use crate::config::AppConfig;
use crate::identity::{IdentityProbe, SystemProbe};
use crate::sampler::{CounterSource, Sample, SystemCounters};
use crate::tracker::Tracker;
use crate::{bus, metrics};

pub struct Service {
    config: AppConfig,
}

impl Service {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let config = Arc::new(self.config);
        let service_name = Arc::new(config.service_name.clone());
        let metrics = Arc::new(metrics::Metrics::new());
        let probe: Arc<dyn IdentityProbe> = Arc::new(SystemProbe);
        let tracker = Arc::new(
            Tracker::open(&config, probe, metrics.clone())
                .await
                .context("prepare tracker")?,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let health_handle = tokio::spawn(metrics::monitor_health(
            service_name.clone(),
            metrics.clone(),
            shutdown_rx.clone(),
            Duration::from_secs(config.idle_threshold_seconds),
        ));
        let identity_handle = tokio::spawn(run_identity_loop(
            tracker.clone(),
            config.identity_interval(),
            shutdown_rx.clone(),
        ));
        let bridge_handle = tokio::spawn(bus::run_bridge(
            config.clone(),
            tracker.clone(),
            shutdown_rx.clone(),
        ));
        let sampling_handle = tokio::spawn(run_sampling_loop(
            tracker.clone(),
            Box::new(SystemCounters::new()),
            config.sample_interval(),
            shutdown_rx.clone(),
        ));

        tracing::info!(
            service = %service_name,
            data_file = %config.data_file().display(),
            interval_ms = config.sample_interval_ms,
            "network tracker started"
        );

        signal::ctrl_c().await.ok();
        tracing::info!(service = %service_name, "ctrl-c received, requesting shutdown");
        shutdown_tx.send(()).ok();

        sampling_handle.await?;
        identity_handle.await?;
        bridge_handle.await??;
        health_handle.await??;
        tracing::info!(service = %service_name, "network tracker stopped");
        Ok(())
    }
}

/// Owns the counter source and the previous sample. A tick that has started
/// always runs to completion, persistence included, before shutdown is
/// observed.
pub async fn run_sampling_loop(
    tracker: Arc<Tracker>,
    mut source: Box<dyn CounterSource>,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut prev: Option<Sample> = None;
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("sampling loop stopping");
                break;
            }
            _ = ticker.tick() => {
                match source.sample() {
                    Ok(sample) => {
                        tracker.process(prev.as_ref(), &sample).await;
                        prev = Some(sample);
                    }
                    Err(err) => {
                        tracker.metrics().record_sampling_error();
                        tracing::warn!(error = %err, "sampling tick skipped");
                    }
                }
            }
        }
    }
}

/// UI-facing identity refresh on its own cadence.
pub async fn run_identity_loop(
    tracker: Arc<Tracker>,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                match tracker.refresh_network_info().await {
                    Some(info) => tracing::debug!(
                        interface = %info.interface,
                        network = %info.network_name,
                        uptime = %info.uptime,
                        "network identity refreshed"
                    ),
                    None => tracing::debug!("no active network"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackerError;
    use crate::identity::StaticProbe;
    use crate::metrics::Metrics;
    use chrono::Local;
    use std::collections::VecDeque;
    use tempfile::tempdir;

    struct Scripted(VecDeque<Option<(u64, u64)>>);

    impl CounterSource for Scripted {
        fn sample(&mut self) -> crate::error::Result<Sample> {
            match self.0.pop_front().flatten() {
                Some((rx, tx)) => Ok(Sample::new(rx, tx, Local::now().timestamp_millis())),
                None => Err(TrackerError::SamplingUnavailable("scripted gap".into())),
            }
        }
    }

    #[tokio::test]
    async fn sampling_loop_skips_failed_ticks_and_keeps_running() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            data_directory: tmp.path().to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        let metrics = Arc::new(Metrics::new());
        let tracker = Arc::new(
            Tracker::open(&config, Arc::new(StaticProbe::default()), metrics.clone())
                .await
                .expect("open"),
        );
        let mut updates = tracker.port().subscribe();
        let script = Scripted(VecDeque::from(vec![
            Some((1_000, 1_000)),
            None,
            Some((1_600, 1_400)),
        ]));

        let (tx, rx) = watch::channel(());
        let handle = tokio::spawn(run_sampling_loop(
            tracker.clone(),
            Box::new(script),
            Duration::from_millis(10),
            rx,
        ));

        updates.recv().await.expect("first update");
        let second = updates.recv().await.expect("second update");
        tx.send(()).expect("shutdown");
        handle.await.expect("join");

        let total: u64 = second.daily.values().map(|day| day.rx_tx_bytes).sum();
        assert_eq!(total, 1_000);
        assert!(metrics.snapshot().sampling_errors >= 1);
    }

    #[tokio::test]
    async fn identity_loop_publishes_network_info() {
        let tmp = tempdir().expect("tmp");
        let config = AppConfig {
            data_directory: tmp.path().to_string_lossy().to_string(),
            ..AppConfig::default()
        };
        let probe = Arc::new(StaticProbe::new(Some(crate::identity::Resolution {
            interface_label: "eth0".into(),
            ..Default::default()
        })));
        let tracker = Arc::new(
            Tracker::open(&config, probe, Arc::new(Metrics::new()))
                .await
                .expect("open"),
        );
        let mut watcher = tracker.watch_network_info();
        let (tx, rx) = watch::channel(());
        let handle = tokio::spawn(run_identity_loop(
            tracker.clone(),
            Duration::from_secs(30),
            rx,
        ));

        watcher.changed().await.expect("changed");
        let info = watcher.borrow_and_update().clone().expect("info");
        assert_eq!(info.interface, "eth0");
        assert_eq!(info.network_name, "N/A");
        tx.send(()).expect("shutdown");
        handle.await.expect("join");
    }
}
