use chrono::Local;
use sysinfo::Networks;

use crate::error::{Result, TrackerError};

/// Machine-wide cumulative byte counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub total_rx_bytes: u64,
    pub total_tx_bytes: u64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(total_rx_bytes: u64, total_tx_bytes: u64, timestamp_ms: i64) -> Self {
        Self {
            total_rx_bytes,
            total_tx_bytes,
            timestamp_ms,
        }
    }
}

/// Anything that can report cumulative rx/tx counters.
pub trait CounterSource: Send {
    fn sample(&mut self) -> Result<Sample>;
}

/// Counter source backed by `sysinfo`, summing every interface.
pub struct SystemCounters {
    networks: Networks,
}

impl SystemCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SystemCounters {
    fn sample(&mut self) -> Result<Sample> {
        // true = drop interfaces that disappeared since the last refresh
        self.networks.refresh(true);
        if self.networks.iter().next().is_none() {
            return Err(TrackerError::SamplingUnavailable(
                "no network interfaces reported".into(),
            ));
        }
        let (rx, tx) = sum_counters(
            self.networks
                .iter()
                .map(|(_, data)| (data.total_received(), data.total_transmitted())),
        );
        Ok(Sample::new(rx, tx, Local::now().timestamp_millis()))
    }
}

fn sum_counters(counters: impl Iterator<Item = (u64, u64)>) -> (u64, u64) {
    counters.fold((0u64, 0u64), |(rx, tx), (r, t)| {
        (rx.saturating_add(r), tx.saturating_add(t))
    })
}
