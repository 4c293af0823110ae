//! k6-style duration strings: `500ms`, `15s`, `1m30s`, `2h`. A bare number is seconds.

use crate::ConfigError;
use std::time::Duration;

/// Parse a duration string such as `15s` or `1m30s`.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidDuration(input.to_string(), reason.to_string());

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty duration"));
    }

    if let Ok(secs) = trimmed.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid("must be a non-negative number"));
        }
        return Duration::try_from_secs_f64(secs).map_err(|_| invalid("duration out of range"));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| invalid("missing unit after last number"))?;
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| invalid("malformed number"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let millis_per_unit = match &rest[..unit_len] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            unit => return Err(invalid(&format!("unknown unit {unit:?}"))),
        };
        total = Duration::try_from_secs_f64(value * millis_per_unit / 1_000.0)
            .ok()
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| invalid("duration out of range"))?;
        rest = &rest[unit_len..];
    }

    Ok(total)
}

/// Render a duration compactly, e.g. `1m30s`, `250ms`, `1.5s`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms < 1_000 {
        return format!("{total_ms}ms");
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let millis = total_ms % 60_000;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if millis > 0 {
        if millis % 1_000 == 0 {
            out.push_str(&format!("{}s", millis / 1_000));
        } else {
            let secs = format!("{:.3}", millis as f64 / 1_000.0);
            out.push_str(secs.trim_end_matches('0'));
            out.push('s');
        }
    }
    out
}
