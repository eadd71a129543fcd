use std::time::Duration;

use chrono::Utc;
use rand::Rng;

/// Base delay for the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);
/// Delay never grows past this, regardless of attempt count.
pub const MAX_DELAY: Duration = Duration::from_secs(32);
/// Attempts beyond this park the row for manual intervention rather than
/// continuing to retry silently.
pub const MAX_ATTEMPTS: u32 = 5;

/// `min(base * 2^(attempts-1), cap)` plus up to 20% jitter, mirroring the
/// exponential-backoff shape used for the live remote-reconnect loop but
/// computed ahead of time so the delay survives a process restart.
pub fn backoff_delay(attempts: u32) -> Duration {
    let attempts = attempts.max(1);
    let exponent = attempts.saturating_sub(1).min(10);
    let scaled = BASE_DELAY.saturating_mul(1u32 << exponent);
    let capped = scaled.min(MAX_DELAY);
    let jitter_fraction = rand::thread_rng().gen_range(0.0..0.2);
    capped + capped.mul_f64(jitter_fraction)
}

/// Parses a `Retry-After` header value: either a plain integer count of
/// seconds, or an HTTP-date. Unparseable values fall back to `None`, in
/// which case the caller uses `backoff_delay` instead.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|when| when.with_timezone(&Utc))
        .and_then(|when| (when - Utc::now()).to_std().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let first = backoff_delay(1);
        let second = backoff_delay(2);
        let capped = backoff_delay(10);
        assert!(first >= BASE_DELAY && first < BASE_DELAY * 2);
        assert!(second >= BASE_DELAY * 2 && second < BASE_DELAY * 3);
        assert!(capped >= MAX_DELAY && capped < MAX_DELAY * 2);
    }

    #[test]
    fn retry_after_parses_numeric_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
    }

    #[test]
    fn retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after("not-a-date-or-number"), None);
    }
}
