use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::broadcast::BroadcastPort;
use crate::config::AppConfig;
use crate::delta;
use crate::identity::{IdentityProbe, NetworkIdentity, Resolution};
use crate::ledger::{self, Ledger};
use crate::metrics::Metrics;
use crate::persistence::LedgerStore;
use crate::sampler::Sample;
use crate::telemetry::{NetworkInfo, StorePaths, UpdatePayload};

/// The sampling-aggregation-persistence pipeline plus the command surface
/// exposed to presentation layers.
pub struct Tracker {
    store: LedgerStore,
    identity: NetworkIdentity,
    port: BroadcastPort,
    metrics: Arc<Metrics>,
    data_directory: PathBuf,
    network_info: watch::Sender<Option<NetworkInfo>>,
}

impl Tracker {
    pub async fn open(
        config: &AppConfig,
        probe: Arc<dyn IdentityProbe>,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let store = LedgerStore::open(config.data_file())
            .await
            .context("prepare ledger store")?;
        Ok(Self {
            store,
            identity: NetworkIdentity::new(probe),
            port: BroadcastPort::new(),
            metrics,
            data_directory: PathBuf::from(&config.data_directory),
            network_info: watch::channel(None).0,
        })
    }

    /// Folds one counter sample into today's ledger and emits the update.
    /// `prev` is the sample from the previous tick, used only for speed.
    pub async fn process(&self, prev: Option<&Sample>, sample: &Sample) -> Arc<UpdatePayload> {
        let throughput = delta::compute_delta(prev, sample);
        let attribution = match self.identity.resolve(sample.timestamp_ms).await {
            Ok(resolution) => resolution.and_then(Resolution::into_attribution),
            Err(err) => {
                self.metrics.record_identity_error();
                tracing::debug!(error = %err, "traffic left unattributed");
                None
            }
        };
        let key = ledger::local_day_key(sample.timestamp_ms);

        let daily = match self
            .store
            .update(|doc| {
                ledger::record_sample(doc, &key, attribution.as_ref(), sample);
            })
            .await
        {
            Ok(doc) => doc,
            Err(err) => {
                self.metrics.record_persistence_error();
                tracing::error!(error = %err, day = %key, "ledger update not persisted");
                self.store.read().await
            }
        };
        self.metrics.record_tick();

        let payload = Arc::new(UpdatePayload {
            speed_bytes_per_sec: throughput.total_bps().round() as u64,
            download_speed_bytes_per_sec: throughput.rate_rx_bps.round() as u64,
            upload_speed_bytes_per_sec: throughput.rate_tx_bps.round() as u64,
            daily: Arc::new(daily),
            timestamp: sample.timestamp_ms,
        });
        self.port.emit(payload.clone());
        payload
    }

    pub async fn get_daily_data(&self) -> Ledger {
        let ledger = self.store.read().await;
        tracing::debug!(entries = ledger.len(), "returning daily data");
        ledger
    }

    pub async fn get_network_info(&self) -> Option<NetworkInfo> {
        self.identity
            .network_info(Local::now().timestamp_millis())
            .await
    }

    /// Resolves the network for display and publishes it to
    /// [`Tracker::watch_network_info`] subscribers.
    pub async fn refresh_network_info(&self) -> Option<NetworkInfo> {
        let info = self.get_network_info().await;
        self.network_info.send_replace(info.clone());
        info
    }

    pub fn watch_network_info(&self) -> watch::Receiver<Option<NetworkInfo>> {
        self.network_info.subscribe()
    }

    pub async fn reset_data(&self) -> bool {
        match self.store.reset().await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(error = %err, "failed to reset data");
                false
            }
        }
    }

    pub fn get_store_path(&self) -> StorePaths {
        StorePaths {
            data_file: self.store.path().display().to_string(),
            data_directory: self.data_directory.display().to_string(),
        }
    }

    pub fn port(&self) -> &BroadcastPort {
        &self.port
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
