//! Counter arithmetic: tick-to-tick throughput and the per-day increment.

use crate::sampler::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Throughput {
    pub rx_delta: u64,
    pub tx_delta: u64,
    pub rate_rx_bps: f64,
    pub rate_tx_bps: f64,
}

impl Throughput {
    pub fn total_bps(&self) -> f64 {
        self.rate_rx_bps + self.rate_tx_bps
    }
}

/// Bytes to add to a day's totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Increment {
    pub rx: u64,
    pub tx: u64,
}

/// Throughput between two consecutive samples. A decreasing counter (driver
/// restart, wrap) yields a zero delta; the elapsed time is floored at one
/// second.
pub fn compute_delta(prev: Option<&Sample>, curr: &Sample) -> Throughput {
    let Some(prev) = prev else {
        return Throughput::default();
    };
    let rx_delta = curr.total_rx_bytes.saturating_sub(prev.total_rx_bytes);
    let tx_delta = curr.total_tx_bytes.saturating_sub(prev.total_tx_bytes);
    let elapsed_secs = curr.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64 / 1000.0;
    let divisor = elapsed_secs.max(1.0);
    Throughput {
        rx_delta,
        tx_delta,
        rate_rx_bps: (rx_delta as f64 / divisor).max(0.0),
        rate_tx_bps: (tx_delta as f64 / divisor).max(0.0),
    }
}

/// Increment since the day's watermarks. A zero watermark means the day has
/// no baseline yet, so the current counters become it and nothing is added.
pub fn day_increment(last_rx: u64, last_tx: u64, curr: &Sample) -> Increment {
    let base_rx = if last_rx == 0 { curr.total_rx_bytes } else { last_rx };
    let base_tx = if last_tx == 0 { curr.total_tx_bytes } else { last_tx };
    Increment {
        rx: curr.total_rx_bytes.saturating_sub(base_rx),
        tx: curr.total_tx_bytes.saturating_sub(base_tx),
    }
}
