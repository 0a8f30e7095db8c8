use anyhow::Result;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::interval;

/// Counters for the sampling and identity loops, reported by the heartbeat.
pub struct Metrics {
    ticks: AtomicU64,
    sampling_errors: AtomicU64,
    identity_errors: AtomicU64,
    persistence_errors: AtomicU64,
    last_tick: Mutex<Option<Instant>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            sampling_errors: AtomicU64::new(0),
            identity_errors: AtomicU64::new(0),
            persistence_errors: AtomicU64::new(0),
            last_tick: Mutex::new(None),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_tick.lock() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_sampling_error(&self) {
        self.sampling_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_identity_error(&self) {
        self.identity_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence_error(&self) {
        self.persistence_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_tick_age = self.last_tick.lock().ok().and_then(|guard| {
            guard.map(|instant| Instant::now().saturating_duration_since(instant))
        });
        HealthSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            sampling_errors: self.sampling_errors.load(Ordering::Relaxed),
            identity_errors: self.identity_errors.load(Ordering::Relaxed),
            persistence_errors: self.persistence_errors.load(Ordering::Relaxed),
            last_tick_age,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HealthSnapshot {
    pub ticks: u64,
    pub sampling_errors: u64,
    pub identity_errors: u64,
    pub persistence_errors: u64,
    pub last_tick_age: Option<Duration>,
}

pub async fn monitor_health(
    service_name: Arc<String>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<()>,
    idle_threshold: Duration,
) -> Result<()> {
    let mut ticker = interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let snapshot = metrics.snapshot();
                tracing::info!(
                    service = %service_name,
                    ticks = snapshot.ticks,
                    sampling_errors = snapshot.sampling_errors,
                    identity_errors = snapshot.identity_errors,
                    persistence_errors = snapshot.persistence_errors,
                    "health heartbeat"
                );
                if let Some(age) = snapshot.last_tick_age {
                    if age > idle_threshold {
                        tracing::warn!(
                            service = %service_name,
                            idle_seconds = ?age.as_secs_f64(),
                            "no sampling tick in the last {} seconds",
                            idle_threshold.as_secs()
                        );
                    }
                }
            }
        }
    }
    Ok(())
}
