//! Human-readable renderings shared by the network info reply and the CLI.

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn with_precision(value: f64) -> String {
    if value >= 100.0 {
        format!("{value:.0}")
    } else if value >= 10.0 {
        format!("{value:.1}")
    } else {
        format!("{value:.2}")
    }
}

/// Bytes as MB below one GiB, GB above.
pub fn bytes_to_human(bytes: u64) -> String {
    let b = bytes as f64;
    if b < GIB {
        format!("{} MB", with_precision(b / MIB))
    } else {
        format!("{} GB", with_precision(b / GIB))
    }
}

pub fn speed_to_human(bytes_per_sec: u64) -> String {
    let v = bytes_per_sec as f64;
    if v >= MIB {
        format!("{} MB/s", with_precision(v / MIB))
    } else if v >= 1024.0 {
        format!("{} KB/s", with_precision(v / 1024.0))
    } else {
        format!("{} B/s", with_precision(v))
    }
}

pub fn format_uptime(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    let (h, m, s) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Positive readings are already percentages; otherwise dBm mapped from
/// [-100, -30] onto [0, 100].
pub fn signal_percent(level: f64) -> f64 {
    if level > 0.0 {
        level.clamp(0.0, 100.0)
    } else {
        ((level + 100.0) / 70.0 * 100.0).clamp(0.0, 100.0)
    }
}

pub fn format_signal(level: Option<f64>) -> String {
    let Some(level) = level else {
        return "N/A".to_string();
    };
    let percent = signal_percent(level);
    let quality = if percent >= 75.0 {
        "Very Good"
    } else if percent >= 50.0 {
        "Good"
    } else {
        "Poor"
    };
    format!("{}% ({quality})", percent.round() as i64)
}

pub fn interface_display(interface: &str, frequency_mhz: Option<u32>) -> String {
    match frequency_mhz {
        Some(f) if f >= 5000 => format!("{interface} (5GHz)"),
        Some(f) if f >= 2400 => format!("{interface} (2.4GHz)"),
        _ => interface.to_string(),
    }
}

pub fn format_link_speed(mbps: Option<u64>) -> String {
    match mbps {
        Some(mbps) if mbps > 0 => format!("{mbps} Mbps"),
        _ => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_switch_units_at_one_gib() {
        assert_eq!(bytes_to_human(0), "0.00 MB");
        assert_eq!(bytes_to_human(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(bytes_to_human(150 * 1024 * 1024), "150 MB");
        assert_eq!(bytes_to_human(12 * 1024 * 1024 * 1024), "12.0 GB");
    }

    #[test]
    fn speeds_pick_the_largest_fitting_unit() {
        assert_eq!(speed_to_human(512), "512 B/s");
        assert_eq!(speed_to_human(2048), "2.00 KB/s");
        assert_eq!(speed_to_human(3 * 1024 * 1024), "3.00 MB/s");
    }

    #[test]
    fn uptime_drops_leading_zero_units() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(59_999), "59s");
        assert_eq!(format_uptime(61_000), "1m 1s");
        assert_eq!(format_uptime(3_723_000), "1h 2m 3s");
        assert_eq!(format_uptime(-5), "0s");
    }

    #[test]
    fn signal_maps_dbm_and_percentages() {
        assert_eq!(format_signal(Some(-30.0)), "100% (Very Good)");
        assert_eq!(format_signal(Some(-65.0)), "50% (Good)");
        assert_eq!(format_signal(Some(-100.0)), "0% (Poor)");
        assert_eq!(format_signal(Some(80.0)), "80% (Very Good)");
        assert_eq!(format_signal(None), "N/A");
    }

    #[test]
    fn interface_gets_band_suffix() {
        assert_eq!(interface_display("wlan0", Some(5180)), "wlan0 (5GHz)");
        assert_eq!(interface_display("wlan0", Some(2437)), "wlan0 (2.4GHz)");
        assert_eq!(interface_display("eth0", None), "eth0");
    }

    #[test]
    fn link_speed_rendering() {
        assert_eq!(format_link_speed(Some(1000)), "1000 Mbps");
        assert_eq!(format_link_speed(Some(0)), "N/A");
        assert_eq!(format_link_speed(None), "N/A");
    }
}
