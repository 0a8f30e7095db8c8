use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::{path::Path, sync::Arc};
use tokio::fs;

use crate::identity::{Resolution, StaticProbe};
use crate::metrics::Metrics;
use crate::sampler::Sample;
use crate::tracker::Tracker;
use crate::AppConfig;

/// One recorded tick: local wall-clock time, cumulative counters and the
/// network that was active.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    pub sample: Sample,
    pub interface: Option<String>,
    pub network: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub ticks: u64,
    pub rejected: u64,
}

/// `YYYY-MM-DDTHH:MM:SS,<rx>,<tx>[,<interface>[,<network>]]`. Blank lines
/// and `#` comments yield `None`.
pub fn parse_trace_line(raw: &str) -> Result<Option<TraceLine>> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(anyhow!("expected at least 3 fields, got {}", fields.len()));
    }
    let naive = NaiveDateTime::parse_from_str(fields[0], "%Y-%m-%dT%H:%M:%S")
        .with_context(|| format!("bad timestamp '{}'", fields[0]))?;
    let at = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow!("timestamp '{}' does not exist locally", fields[0]))?;
    let rx: u64 = fields[1]
        .parse()
        .with_context(|| format!("bad rx counter '{}'", fields[1]))?;
    let tx: u64 = fields[2]
        .parse()
        .with_context(|| format!("bad tx counter '{}'", fields[2]))?;
    let optional = |idx: usize| {
        fields
            .get(idx)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    };
    Ok(Some(TraceLine {
        sample: Sample::new(rx, tx, at.timestamp_millis()),
        interface: optional(3),
        network: optional(4),
    }))
}

/// Replays a counter trace through the full pipeline into the configured
/// ledger store.
pub async fn replay_trace(trace_path: impl AsRef<Path>, config: &AppConfig) -> Result<ReplaySummary> {
    let trace_path = trace_path.as_ref();
    let raw = fs::read_to_string(trace_path)
        .await
        .with_context(|| format!("open trace {}", trace_path.display()))?;

    let probe = Arc::new(StaticProbe::default());
    let metrics = Arc::new(Metrics::new());
    let tracker = Tracker::open(config, probe.clone(), metrics.clone())
        .await
        .context("prepare tracker for replay")?;

    let mut summary = ReplaySummary::default();
    let mut prev: Option<Sample> = None;
    for (number, raw_line) in raw.lines().enumerate() {
        let line = match parse_trace_line(raw_line) {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(err) => {
                summary.rejected += 1;
                tracing::warn!(line = number + 1, error = %err, "trace line rejected");
                continue;
            }
        };
        probe.set(line.interface.map(|interface_label| Resolution {
            interface_label,
            network_name: line.network,
            ..Resolution::default()
        }));
        tracker.process(prev.as_ref(), &line.sample).await;
        prev = Some(line.sample);
        summary.ticks += 1;
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        ticks = summary.ticks,
        rejected = summary.rejected,
        persistence_errors = snapshot.persistence_errors,
        data_file = %config.data_file().display(),
        "trace replay completed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_partial_lines() {
        let full = parse_trace_line("2024-03-01T23:59:59, 1000, 500, wlan0, Home")
            .expect("parse")
            .expect("line");
        assert_eq!(full.sample.total_rx_bytes, 1000);
        assert_eq!(full.sample.total_tx_bytes, 500);
        assert_eq!(full.interface.as_deref(), Some("wlan0"));
        assert_eq!(full.network.as_deref(), Some("Home"));

        let bare = parse_trace_line("2024-03-01T10:00:00,1,2").expect("parse").expect("line");
        assert!(bare.interface.is_none());
        assert!(bare.network.is_none());
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(parse_trace_line("   ").expect("blank").is_none());
        assert!(parse_trace_line("# header").expect("comment").is_none());
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_trace_line("2024-03-01T10:00:00,1").is_err());
        assert!(parse_trace_line("yesterday,1,2").is_err());
        assert!(parse_trace_line("2024-03-01T10:00:00,-5,2").is_err());
    }
}
