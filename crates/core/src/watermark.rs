use chrono::{DateTime, Duration, Utc};

/// How far back a transaction fetch reaches when an account has no stored
/// history and the caller gave no explicit lookback.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Render a timestamp in the canonical `since`-filter form the remote API
/// expects: UTC, whole seconds, explicit `+00:00` offset.
pub fn format_since(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

/// Compute the `since` watermark for one account's transaction fetch.
///
/// Priority order:
/// 1. an explicit lookback in days, if the caller supplied one (zero is a
///    valid value and means "since now");
/// 2. the newest `created_at` already stored for the account, verbatim;
/// 3. [`DEFAULT_LOOKBACK_DAYS`] before `now`.
///
/// The result is a lower bound, not an exact cursor: the remote API returns
/// transactions with `created_at >= since`, and the upsert store absorbs
/// the overlap.
pub fn resolve(
    explicit_lookback_days: Option<i64>,
    latest_stored: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    if let Some(days) = explicit_lookback_days {
        return format_since(now - Duration::days(days));
    }
    if let Some(latest) = latest_stored {
        return format_since(latest);
    }
    format_since(now - Duration::days(DEFAULT_LOOKBACK_DAYS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn defaults_to_thirty_days_before_now() {
        let now = utc(2024, 1, 1, 0, 0, 0);
        assert_eq!(resolve(None, None, now), "2023-12-02T00:00:00+00:00");
    }

    #[test]
    fn stored_history_wins_over_default() {
        let now = utc(2024, 6, 1, 12, 0, 0);
        let latest = utc(2024, 1, 1, 0, 0, 0);
        assert_eq!(resolve(None, Some(latest), now), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn explicit_lookback_beats_stored_history() {
        let now = utc(2024, 1, 8, 9, 30, 0);
        let latest = utc(2024, 1, 7, 0, 0, 0);
        assert_eq!(
            resolve(Some(7), Some(latest), now),
            "2024-01-01T09:30:00+00:00"
        );
    }

    #[test]
    fn zero_lookback_means_now() {
        let now = utc(2024, 3, 15, 8, 0, 0);
        assert_eq!(
            resolve(Some(0), Some(utc(2020, 1, 1, 0, 0, 0)), now),
            "2024-03-15T08:00:00+00:00"
        );
    }

    #[test]
    fn subsecond_precision_is_truncated() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        assert_eq!(resolve(Some(0), None, now), "2024-01-01T00:00:00+00:00");
    }
}
