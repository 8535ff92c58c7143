//! Duration parsing utilities.

use std::time::Duration;

use anyhow::Context;

/// Parse a duration string like "1h", "30m", "300s", "300" into seconds.
/// Supports:
/// - Plain numbers (interpreted as seconds): "300"
/// - Seconds suffix: "300s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "1h"
/// - Days suffix: "1d"
pub fn parse_duration_to_secs(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let units = [('d', 86_400), ('h', 3600), ('m', 60), ('s', 1)];
    for (suffix, multiplier) in units {
        if let Some(num_str) = s.strip_suffix(suffix) {
            let value: i64 = num_str
                .parse()
                .with_context(|| format!("Invalid duration value: {num_str}"))?;
            return value
                .checked_mul(multiplier)
                .with_context(|| format!("Duration out of range: {s}"));
        }
    }

    // No suffix - treat as seconds
    s.parse::<i64>()
        .with_context(|| format!("Invalid duration value: {s}"))
}

/// Parse a non-negative duration string into a [`Duration`].
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let secs = parse_duration_to_secs(s)?;
    let secs = u64::try_from(secs).with_context(|| format!("Duration must not be negative: {s}"))?;
    Ok(Duration::from_secs(secs))
}
