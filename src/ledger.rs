//! Daily per-network aggregates.
//!
//! The ledger maps a local calendar day (`YYYY-MM-DD`) to the bytes seen that
//! day, split by the network the traffic was attributed to. Field names match
//! the on-disk document so existing stores load unchanged.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use crate::delta::{self, Increment};
use crate::sampler::Sample;

pub type Ledger = BTreeMap<String, DailyEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyEntry {
    #[serde(default)]
    pub rx_tx_bytes: u64,
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
    #[serde(default)]
    pub last_rx: u64,
    #[serde(default)]
    pub last_tx: u64,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUsage {
    #[serde(rename = "interface", default)]
    pub interface_label: String,
    #[serde(default)]
    pub rx_tx_bytes: u64,
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
    #[serde(rename = "firstSeen", default)]
    pub first_seen_ms: i64,
    #[serde(rename = "lastSeen", default)]
    pub last_seen_ms: i64,
}

/// The named network a tick's traffic is credited to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub network_name: String,
    pub interface_label: String,
}

impl DailyEntry {
    /// A fresh day whose baseline is the given counters.
    pub fn starting_at(sample: &Sample) -> Self {
        Self {
            last_rx: sample.total_rx_bytes,
            last_tx: sample.total_tx_bytes,
            ..Self::default()
        }
    }

    fn add(&mut self, inc: Increment) {
        self.rx_bytes = self.rx_bytes.saturating_add(inc.rx);
        self.tx_bytes = self.tx_bytes.saturating_add(inc.tx);
        self.rx_tx_bytes = self.rx_bytes.saturating_add(self.tx_bytes);
    }
}

impl NetworkUsage {
    fn add(&mut self, inc: Increment, interface_label: &str, now_ms: i64) {
        self.rx_bytes = self.rx_bytes.saturating_add(inc.rx);
        self.tx_bytes = self.tx_bytes.saturating_add(inc.tx);
        self.rx_tx_bytes = self.rx_bytes.saturating_add(self.tx_bytes);
        self.last_seen_ms = now_ms;
        self.interface_label = interface_label.to_string();
    }
}

/// Adds `inc` to the day (and to the attributed network, if any), then moves
/// the day's watermarks to the counters in `sample`.
pub fn apply(
    ledger: &mut Ledger,
    date_key: &str,
    attribution: Option<&Attribution>,
    inc: Increment,
    sample: &Sample,
) {
    let entry = ledger
        .entry(date_key.to_string())
        .or_insert_with(|| DailyEntry::starting_at(sample));
    entry.add(inc);
    if let Some(attr) = attribution {
        let now_ms = sample.timestamp_ms;
        entry
            .networks
            .entry(attr.network_name.clone())
            .or_insert_with(|| NetworkUsage {
                first_seen_ms: now_ms,
                last_seen_ms: now_ms,
                ..NetworkUsage::default()
            })
            .add(inc, &attr.interface_label, now_ms);
    }
    entry.last_rx = sample.total_rx_bytes;
    entry.last_tx = sample.total_tx_bytes;
}

/// Folds one sample into the ledger: the increment is measured against the
/// day's own watermarks, so a new day (or a restart) contributes zero.
pub fn record_sample(
    ledger: &mut Ledger,
    date_key: &str,
    attribution: Option<&Attribution>,
    sample: &Sample,
) -> Increment {
    let inc = match ledger.get(date_key) {
        Some(entry) => delta::day_increment(entry.last_rx, entry.last_tx, sample),
        None => Increment::default(),
    };
    apply(ledger, date_key, attribution, inc, sample);
    inc
}

/// Calendar date of `at` in its own zone.
pub fn day_key<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%Y-%m-%d").to_string()
}

/// Local calendar date for a millisecond timestamp.
pub fn local_day_key(timestamp_ms: i64) -> String {
    let at = Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Local::now);
    day_key(&at)
}
