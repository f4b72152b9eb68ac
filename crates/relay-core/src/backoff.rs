//! Reconnect delay calculation.
//!
//! Exponential backoff from a 1 s base, capped at the caller's ceiling, with
//! uniform jitter in `[0.7, 1.3]` so many clients reconnecting to a
//! recovering server do not land on the same instant. The jittered value is
//! clamped to the ceiling again.

/// Base delay before exponential growth.
pub const BASE_DELAY_MS: u64 = 1000;
/// Lower bound of the jitter scale.
pub const JITTER_MIN: f64 = 0.7;
/// Upper bound of the jitter scale.
pub const JITTER_MAX: f64 = 1.3;

/// Delay in milliseconds before reconnect attempt `attempt` (zero-based).
#[must_use]
pub fn reconnect_delay_ms(attempt: u32, max_backoff_ms: u64) -> u64 {
    reconnect_delay_with_random(attempt, max_backoff_ms, rand::random::<f64>())
}

/// [`reconnect_delay_ms`] with the random sample made explicit.
///
/// `random` is a value in `[0.0, 1.0)`, mapped linearly onto the jitter
/// range. Kept separate so the bounds are testable without a PRNG.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn reconnect_delay_with_random(attempt: u32, max_backoff_ms: u64, random: f64) -> u64 {
    let exponential = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_backoff_ms);

    let jitter = JITTER_MIN + random * (JITTER_MAX - JITTER_MIN);
    let jittered = ((capped as f64) * jitter).round() as u64;

    jittered.min(max_backoff_ms)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt_at_unit_jitter() {
        // random = 0.5 maps to a jitter factor of exactly 1.0
        assert_eq!(reconnect_delay_with_random(0, 60_000, 0.5), 1000);
        assert_eq!(reconnect_delay_with_random(1, 60_000, 0.5), 2000);
        assert_eq!(reconnect_delay_with_random(2, 60_000, 0.5), 4000);
        assert_eq!(reconnect_delay_with_random(3, 60_000, 0.5), 8000);
    }

    #[test]
    fn jitter_extremes() {
        assert_eq!(reconnect_delay_with_random(0, 60_000, 0.0), 700);
        assert_eq!(reconnect_delay_with_random(0, 60_000, 1.0), 1300);
    }

    #[test]
    fn capped_before_jitter() {
        // 2^6 s = 64 s exceeds a 30 s ceiling; jitter applies to the cap.
        assert_eq!(reconnect_delay_with_random(6, 30_000, 0.0), 21_000);
        assert_eq!(reconnect_delay_with_random(6, 30_000, 0.5), 30_000);
    }

    #[test]
    fn never_exceeds_ceiling() {
        for attempt in 0..40 {
            for random in [0.0, 0.25, 0.5, 0.75, 0.999_999] {
                let delay = reconnect_delay_with_random(attempt, 30_000, random);
                assert!(delay <= 30_000, "attempt {attempt} random {random} gave {delay}");
            }
        }
    }

    #[test]
    fn delay_within_spec_band() {
        for attempt in 0..10 {
            let base = (BASE_DELAY_MS * (1u64 << attempt)).min(60_000);
            for random in [0.0, 0.5, 1.0] {
                let delay = reconnect_delay_with_random(attempt, 60_000, random);
                let lo = ((base as f64) * JITTER_MIN).floor() as u64;
                let hi = ((base as f64) * JITTER_MAX).ceil() as u64;
                assert!(
                    (lo..=hi.min(60_000)).contains(&delay),
                    "attempt {attempt}: {delay} outside [{lo}, {hi}]"
                );
            }
        }
    }

    #[test]
    fn high_attempt_does_not_overflow() {
        let delay = reconnect_delay_with_random(u32::MAX, 60_000, 1.0);
        assert_eq!(delay, 60_000);
    }

    #[test]
    fn zero_ceiling_means_zero_delay() {
        assert_eq!(reconnect_delay_with_random(5, 0, 1.0), 0);
    }

    #[test]
    fn randomized_entry_point_stays_in_band() {
        for attempt in 0..8 {
            let delay = reconnect_delay_ms(attempt, 30_000);
            assert!(delay <= 30_000);
            let base = (BASE_DELAY_MS * (1u64 << attempt)).min(30_000);
            assert!(delay >= ((base as f64) * JITTER_MIN).floor() as u64);
        }
    }
}
