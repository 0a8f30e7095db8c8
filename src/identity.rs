//! Active-network resolution and change detection.
//!
//! Every resolution, whether it comes from the sampling loop or from the
//! slower UI-facing cadence, passes through [`NetworkState::observe`], which
//! is the only place the connection uptime is reset.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::Networks;
use tokio::{fs, process::Command, time::timeout};

use crate::error::{Result, TrackerError};
use crate::format;
use crate::ledger::Attribution;
use crate::telemetry::NetworkInfo;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub interface_label: String,
    pub network_name: Option<String>,
    /// dBm when negative, percent when positive.
    pub signal_level: Option<f64>,
    pub frequency_mhz: Option<u32>,
    pub link_speed_mbps: Option<u64>,
}

impl Resolution {
    /// The attribution for this resolution, when it names a network.
    pub fn into_attribution(self) -> Option<Attribution> {
        let network_name = self.network_name?;
        Some(Attribution {
            network_name,
            interface_label: self.interface_label,
        })
    }
}

/// Empty, "Unknown" and "N/A" names mean no named network.
pub fn normalize_network_name(name: Option<&str>) -> Option<String> {
    let name = name?.trim();
    match name {
        "" | "Unknown" | "N/A" => None,
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkState {
    pub interface_name: Option<String>,
    pub network_label: Option<String>,
    pub connection_start_ms: Option<i64>,
    pub last_update_ms: i64,
}

impl NetworkState {
    /// Records a resolution; returns true when the identity changed and the
    /// connection start was reset to `now_ms`.
    pub fn observe(&mut self, interface: &str, label: Option<&str>, now_ms: i64) -> bool {
        let changed = self.interface_name.as_deref() != Some(interface)
            || self.network_label.as_deref() != label;
        if changed {
            self.interface_name = Some(interface.to_string());
            self.network_label = label.map(str::to_string);
            self.connection_start_ms = Some(now_ms);
        }
        self.last_update_ms = now_ms;
        changed
    }

    pub fn uptime_ms(&self, now_ms: i64) -> Option<i64> {
        self.connection_start_ms
            .map(|start| now_ms.saturating_sub(start).max(0))
    }
}

#[async_trait]
pub trait IdentityProbe: Send + Sync {
    async fn resolve(&self) -> Result<Resolution>;
}

/// Tracks the active network over time on top of a probe.
pub struct NetworkIdentity {
    probe: Arc<dyn IdentityProbe>,
    state: Mutex<NetworkState>,
    last_known: Mutex<Option<Resolution>>,
}

impl NetworkIdentity {
    pub fn new(probe: Arc<dyn IdentityProbe>) -> Self {
        Self {
            probe,
            state: Mutex::new(NetworkState::default()),
            last_known: Mutex::new(None),
        }
    }

    /// Queries the probe now. On failure the last known identity is kept
    /// and returned.
    pub async fn resolve(&self, now_ms: i64) -> Result<Option<Resolution>> {
        match self.probe.resolve().await {
            Ok(mut resolution) => {
                resolution.network_name =
                    normalize_network_name(resolution.network_name.as_deref());
                let changed = self
                    .state
                    .lock()
                    .map(|mut state| {
                        state.observe(
                            &resolution.interface_label,
                            resolution.network_name.as_deref(),
                            now_ms,
                        )
                    })
                    .unwrap_or(false);
                if changed {
                    tracing::info!(
                        interface = %resolution.interface_label,
                        network = ?resolution.network_name,
                        "network changed, uptime reset"
                    );
                }
                if let Ok(mut last) = self.last_known.lock() {
                    *last = Some(resolution.clone());
                }
                Ok(Some(resolution))
            }
            Err(err) => {
                let last = self.last_known.lock().ok().and_then(|guard| guard.clone());
                match last {
                    Some(_) => {
                        tracing::warn!(error = %err, "identity query failed, keeping last known network");
                        Ok(last)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// The named network to credit this tick's traffic to, if any.
    pub async fn attribution(&self, now_ms: i64) -> Option<Attribution> {
        match self.resolve(now_ms).await {
            Ok(resolution) => resolution.and_then(Resolution::into_attribution),
            Err(err) => {
                tracing::debug!(error = %err, "no network identity for attribution");
                None
            }
        }
    }

    pub async fn network_info(&self, now_ms: i64) -> Option<NetworkInfo> {
        let resolution = match self.resolve(now_ms).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "network info unavailable");
                return None;
            }
        };
        let uptime = self
            .state()
            .uptime_ms(now_ms)
            .map(format::format_uptime)
            .unwrap_or_else(|| "N/A".to_string());
        Some(NetworkInfo {
            interface: format::interface_display(
                &resolution.interface_label,
                resolution.frequency_mhz,
            ),
            network_name: resolution
                .network_name
                .clone()
                .unwrap_or_else(|| "N/A".to_string()),
            signal_strength: format::format_signal(resolution.signal_level),
            link_speed: format::format_link_speed(resolution.link_speed_mbps),
            uptime,
        })
    }

    pub fn state(&self) -> NetworkState {
        self.state
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Probe with a caller-controlled answer, used by trace replay.
#[derive(Default)]
pub struct StaticProbe {
    current: Mutex<Option<Resolution>>,
}

impl StaticProbe {
    pub fn new(current: Option<Resolution>) -> Self {
        Self {
            current: Mutex::new(current),
        }
    }

    pub fn set(&self, resolution: Option<Resolution>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = resolution;
        }
    }
}

#[async_trait]
impl IdentityProbe for StaticProbe {
    async fn resolve(&self) -> Result<Resolution> {
        self.current
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| TrackerError::QueryUnavailable("no network configured".into()))
    }
}

/// Probe backed by the host: default route, wireless link details, sysfs
/// link speed.
#[derive(Default)]
pub struct SystemProbe;

#[async_trait]
impl IdentityProbe for SystemProbe {
    async fn resolve(&self) -> Result<Resolution> {
        let routed = match fs::read_to_string("/proc/net/route").await {
            Ok(table) => parse_default_route(&table),
            Err(_) => None,
        };
        let interface = routed
            .or_else(busiest_interface)
            .ok_or_else(|| TrackerError::QueryUnavailable("no default interface".into()))?;

        let link = match run(&["iw", "dev", &interface, "link"]).await {
            Some(out) => parse_iw_link(&out),
            None => WirelessLink::default(),
        };
        let mut network_name = link.ssid.clone();
        if network_name.is_none() {
            network_name = run(&["iwgetid", "-r", &interface])
                .await
                .map(|out| out.trim().to_string())
                .filter(|ssid| !ssid.is_empty());
        }
        if network_name.is_none() {
            network_name = run(&nmcli_active_ssid_argv(&interface))
                .await
                .and_then(|out| parse_nmcli_active(&out));
        }
        let signal_level = match link.signal_dbm {
            Some(dbm) => Some(dbm),
            None => fs::read_to_string("/proc/net/wireless")
                .await
                .ok()
                .and_then(|table| parse_wireless_level(&table, &interface)),
        };
        let link_speed_mbps = fs::read_to_string(format!("/sys/class/net/{interface}/speed"))
            .await
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|mbps| *mbps > 0)
            .map(|mbps| mbps as u64)
            .or(link.tx_bitrate_mbps);

        Ok(Resolution {
            interface_label: interface,
            network_name,
            signal_level,
            frequency_mhz: link.frequency_mhz,
            link_speed_mbps,
        })
    }
}

async fn run(argv: &[&str]) -> Option<String> {
    let (program, args) = argv.split_first()?;
    let output = timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// First non-loopback interface, preferring ones that carried traffic.
fn busiest_interface() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut candidates: Vec<(String, u64)> = networks
        .iter()
        .filter(|(name, _)| !is_loopback(name))
        .map(|(name, data)| {
            (
                name.to_string(),
                data.total_received().saturating_add(data.total_transmitted()),
            )
        })
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    candidates.into_iter().next().map(|(name, _)| name)
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_ascii_lowercase().contains("loopback")
}

/// Interface of the lowest-metric default route in `/proc/net/route`.
pub fn parse_default_route(table: &str) -> Option<String> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 7 || cols[1] != "00000000" {
                return None;
            }
            let flags = u32::from_str_radix(cols[3], 16).ok()?;
            if flags & 0x1 == 0 {
                return None;
            }
            let metric = cols[6].parse::<u32>().unwrap_or(u32::MAX);
            Some((metric, cols[0].to_string()))
        })
        .min_by_key(|(metric, _)| *metric)
        .map(|(_, iface)| iface)
}

/// Signal level column of `/proc/net/wireless` for `interface`.
pub fn parse_wireless_level(table: &str, interface: &str) -> Option<f64> {
    table.lines().skip(2).find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != interface {
            return None;
        }
        let cols: Vec<&str> = rest.split_whitespace().collect();
        cols.get(2)?.trim_end_matches('.').parse::<f64>().ok()
    })
}

/// Lists only the access points seen by `interface`, so another associated
/// wireless device cannot name traffic routed elsewhere.
fn nmcli_active_ssid_argv(interface: &str) -> [&str; 9] {
    [
        "nmcli", "-t", "-f", "active,ssid", "dev", "wifi", "list", "ifname", interface,
    ]
}

/// SSID of the `yes:` row in `nmcli -t -f active,ssid dev wifi list` output.
pub fn parse_nmcli_active(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("yes:"))
        .map(|ssid| ssid.replace("\\:", ":"))
        .filter(|ssid| !ssid.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WirelessLink {
    pub ssid: Option<String>,
    pub frequency_mhz: Option<u32>,
    pub signal_dbm: Option<f64>,
    pub tx_bitrate_mbps: Option<u64>,
}

/// Parses `iw dev <iface> link`. "Not connected." yields an empty link.
pub fn parse_iw_link(output: &str) -> WirelessLink {
    let mut link = WirelessLink::default();
    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "SSID" => link.ssid = Some(value.to_string()),
            "freq" => {
                link.frequency_mhz = value
                    .split('.')
                    .next()
                    .and_then(|mhz| mhz.parse().ok())
            }
            "signal" => {
                link.signal_dbm = value
                    .split_whitespace()
                    .next()
                    .and_then(|dbm| dbm.parse().ok())
            }
            "tx bitrate" => {
                link.tx_bitrate_mbps = value
                    .split_whitespace()
                    .next()
                    .and_then(|rate| rate.parse::<f64>().ok())
                    .map(|rate| rate.round() as u64)
            }
            _ => {}
        }
    }
    link
}
