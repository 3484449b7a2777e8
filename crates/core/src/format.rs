//! Display helpers shared by frontends.

const UNITS: [&str; 6] = ["Bytes", "KB", "MB", "GB", "TB", "PB"];

/// Human-readable byte size in base 1024, e.g. `1536 -> "1.5 KB"`.
///
/// At most `decimals` fractional digits; trailing zeros are dropped.
pub fn format_bytes(bytes: u64, decimals: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_fraction(&format!("{:.*}", decimals, value)), UNITS[unit])
}

/// Percentage with one decimal, as the panel shows CPU and RAM usage.
pub fn format_percent(v: f64) -> String {
    format!("{:.1}", v)
}

fn trim_fraction(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    s.trim_end_matches('0').trim_end_matches('.')
}
