//! # Reconcile Interval
//!
//! Parses the `vault-sync.io/reconcile` annotation into a requeue delay.
//!
//! Accepts Go-style durations: one or more `<number><unit>` groups where the
//! unit is `ms`, `s`, `m` or `h` (`"500ms"`, `"45s"`, `"5m"`, `"1h30m"`).
//! Fractional numbers are allowed (`"1.5h"`).

use crate::constants::RECONCILE_OFF;
use crate::error::ConfigError;
use crate::observability::metrics;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{error, info};

static DURATION_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:ms|s|m|h))+$").expect("duration format regex is valid")
});

static DURATION_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<whole>\d+)(?:\.(?P<fraction>\d+))?(?P<unit>ms|s|m|h)")
        .expect("duration group regex is valid")
});

/// Largest accepted duration, in nanoseconds (Go's `time.Duration` range)
const MAX_NANOS: u128 = i64::MAX as u128;

/// Fraction digits beyond this cannot change a nanosecond total
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

/// Nanoseconds of one `<whole>.<fraction><unit>` group
fn group_nanos(whole: &str, fraction: &str, unit: u128) -> Option<u128> {
    let whole: u128 = whole.parse().ok()?;
    let mut nanos = whole.checked_mul(unit)?;

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().ok()?;
        let scale = 10u128.checked_pow(u32::try_from(fraction.len()).ok()?)?;
        nanos = nanos.checked_add(digits.checked_mul(unit)? / scale)?;
    }
    Some(nanos)
}

/// Parse a Go-style duration string
///
/// `"0"` is accepted as zero, matching Go's `time.ParseDuration`. Totals are
/// accumulated in whole nanoseconds and capped at `i64::MAX` nanoseconds.
///
/// # Errors
///
/// [`ConfigError::InvalidInterval`] for empty input, unknown units or overflow.
pub fn parse_go_duration(duration_str: &str) -> Result<Duration, ConfigError> {
    let trimmed = duration_str.trim();
    let invalid = |message: String| ConfigError::InvalidInterval {
        raw: trimmed.to_string(),
        message,
    };

    if trimmed.is_empty() {
        return Err(invalid("duration string cannot be empty".to_string()));
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION_FORMAT.is_match(trimmed) {
        return Err(invalid(
            "expected groups of <number><unit> with unit ms, s, m or h (e.g. '30s', '5m', '1h30m')"
                .to_string(),
        ));
    }

    let mut total: u128 = 0;
    for captures in DURATION_GROUP.captures_iter(trimmed) {
        let whole = captures.name("whole").map_or("0", |m| m.as_str());
        let fraction = captures.name("fraction").map_or("", |m| m.as_str());
        let unit = captures.name("unit").map_or("", |m| m.as_str());
        let unit = unit_nanos(unit).ok_or_else(|| invalid(format!("unknown unit '{unit}'")))?;

        total = group_nanos(whole, fraction, unit)
            .and_then(|nanos| total.checked_add(nanos))
            .filter(|nanos| *nanos <= MAX_NANOS)
            .ok_or_else(|| invalid("duration out of range".to_string()))?;
    }

    let nanos = u64::try_from(total).map_err(|e| invalid(e.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Wall-clock time `delay` from now, `None` when it is not representable
#[must_use]
pub fn scheduled_at(delay: Duration) -> Option<chrono::DateTime<chrono::Utc>> {
    let delay = chrono::Duration::from_std(delay).ok()?;
    chrono::Utc::now().checked_add_signed(delay)
}

/// RFC 3339 rendering of [`scheduled_at`] for log lines
#[must_use]
pub fn scheduled_at_display(delay: Duration) -> String {
    scheduled_at(delay).map_or_else(|| "beyond representable time".to_string(), |t| t.to_rfc3339())
}

/// Effective periodic requeue delay for a target
///
/// - absent, empty or `"off"`: `None`
/// - unparsable or out of range: `None`, logged with the raw value and counted
/// - below `minimum`: `minimum`
pub fn effective_interval(raw: Option<&str>, minimum: Duration, target: &str) -> Option<Duration> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty())?;
    if raw == RECONCILE_OFF {
        return None;
    }

    match parse_go_duration(raw) {
        Ok(duration) if duration < minimum => {
            info!(
                target_ref = %target,
                requested = ?duration,
                enforced = ?minimum,
                "Reconcile interval too short, using minimum"
            );
            Some(minimum)
        }
        Ok(duration) => Some(duration),
        Err(e) => {
            metrics::increment_duration_parsing_errors();
            error!(
                target_ref = %target,
                error_type = e.error_type(),
                error = %e,
                "Invalid reconcile interval annotation, disabling periodic reconciliation"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(30);

    #[test]
    fn test_parse_single_units() {
        assert_eq!(parse_go_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_go_duration("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_go_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_go_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_go_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_go_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_go_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_go_duration("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "invalid", "5", "5x", "m5", "1d", "-5m", "5 m"] {
            assert!(parse_go_duration(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_fractions_are_exact() {
        assert_eq!(parse_go_duration("1.1h").unwrap(), Duration::from_secs(3960));
        assert_eq!(parse_go_duration("0.5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_go_duration("1.5ms").unwrap(), Duration::from_micros(1500));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        // Largest Go duration is 2562047h47m16.854775807s
        assert_eq!(
            parse_go_duration("2562047h").unwrap(),
            Duration::from_secs(2_562_047 * 3600)
        );
        for bad in ["2562048h", "2777777778h", "2562047h48m", "99999999999999999999999999999999999999999h"] {
            let err = parse_go_duration(bad).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidInterval { ref raw, .. } if raw == bad),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_scheduled_at_never_overflows() {
        assert!(scheduled_at(Duration::from_secs(60)).is_some());
        assert!(scheduled_at(Duration::MAX).is_none());
        assert_eq!(scheduled_at_display(Duration::MAX), "beyond representable time");
    }

    #[test]
    fn test_out_of_range_interval_disables_requeue() {
        assert_eq!(effective_interval(Some("2777777778h"), MIN, "t"), None);
    }

    #[test]
    fn test_minimum_is_enforced() {
        assert_eq!(effective_interval(Some("10s"), MIN, "t"), Some(MIN));
        assert_eq!(effective_interval(Some("0s"), MIN, "t"), Some(MIN));
        assert_eq!(effective_interval(Some("30s"), MIN, "t"), Some(MIN));
        assert_eq!(
            effective_interval(Some("5m"), MIN, "t"),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_off_absent_and_invalid_disable() {
        assert_eq!(effective_interval(None, MIN, "t"), None);
        assert_eq!(effective_interval(Some(""), MIN, "t"), None);
        assert_eq!(effective_interval(Some("off"), MIN, "t"), None);
        assert_eq!(effective_interval(Some("invalid"), MIN, "t"), None);
    }

    #[test]
    fn test_invalid_interval_is_counted() {
        let before = metrics::DURATION_PARSING_ERRORS_TOTAL.get();
        assert_eq!(effective_interval(Some("abc"), MIN, "t"), None);
        assert!(metrics::DURATION_PARSING_ERRORS_TOTAL.get() > before);
    }
}
