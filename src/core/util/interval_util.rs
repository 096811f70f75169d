use anyhow::{anyhow, Result};
use std::time::Duration;

const MS_PER_SECOND: u128 = 1_000;
const MS_PER_MINUTE: u128 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u128 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u128 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u128 = 7 * MS_PER_DAY;

/// Parse a histogram interval such as `500ms`, `10s`, `5m`, `1h`, `1d`, `1w`.
///
/// Bare integers are seconds. `auto` (or an empty string) yields `None`.
pub fn parse_interval(raw: &str) -> Result<Option<Duration>> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| anyhow!("invalid interval '{}'", raw))?;

    let ms_per_unit: u128 = match unit {
        "" | "s" => MS_PER_SECOND,
        "ms" => 1,
        "m" => MS_PER_MINUTE,
        "h" => MS_PER_HOUR,
        "d" => MS_PER_DAY,
        "w" => MS_PER_WEEK,
        other => return Err(anyhow!("unknown interval unit '{}' in '{}'", other, raw)),
    };

    let total = (value as u128)
        .checked_mul(ms_per_unit)
        .and_then(|ms| u64::try_from(ms).ok())
        .ok_or_else(|| anyhow!("interval '{}' is too large", raw))?;

    if total == 0 {
        return Err(anyhow!("interval '{}' must be positive", raw));
    }

    Ok(Some(Duration::from_millis(total)))
}

/// Format a duration using the largest unit that divides it exactly.
///
/// The output is what the backend expects in `fixed_interval`.
pub fn format_interval(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 {
        return "0ms".to_string();
    }

    for (unit_ms, suffix) in [
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
    ] {
        if ms % unit_ms == 0 {
            return format!("{}{}", ms / unit_ms, suffix);
        }
    }

    format!("{}ms", ms)
}
