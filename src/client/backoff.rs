//! Exponential reconnection backoff with jitter.
//!
//! Delay for attempt `n` (zero-indexed):
//!
//! ```text
//! candidate = base * factor^n
//! deviation = floor(r * jitter * candidate)         r uniform in [0, 1)
//! delay     = min(candidate -/+ deviation, max)     sign from parity of floor(r * 10)
//! ```

use std::time::Duration;

use rand::Rng;

/// Upper bound on reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxAttempts {
    /// Never exhausted.
    #[default]
    Unbounded,
    /// Exhausted once this many attempts have been made.
    Limited(u32),
}

impl MaxAttempts {
    /// Whether `attempts` has reached the bound.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        match self {
            MaxAttempts::Unbounded => false,
            MaxAttempts::Limited(max) => attempts >= *max,
        }
    }
}

/// Successive retry delays with exponential growth, jitter and a ceiling.
///
/// Each [`next_delay`](Self::next_delay) advances the attempt counter; only
/// [`reset`](Self::reset) rewinds it. Not synchronized: callers serialize
/// access themselves.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    attempts: u32,
}

impl BackoffPolicy {
    /// Create a policy.
    ///
    /// `jitter` is clamped into `[0, 1]`.
    pub fn new(base: Duration, max: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            base,
            max,
            factor,
            jitter: clamp_jitter(jitter),
            attempts: 0,
        }
    }

    /// Next delay, drawing jitter from the thread-local RNG.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Next delay, drawing jitter from `rng`.
    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        let mut delay_ms = duration_to_millis(self.base) * self.factor.powi(exponent);
        self.attempts = self.attempts.saturating_add(1);

        if self.jitter > 0.0 {
            let draw: f64 = rng.r#gen();
            let deviation = (draw * self.jitter * delay_ms).floor();
            if ((draw * 10.0).floor() as u64) & 1 == 0 {
                delay_ms -= deviation;
            } else {
                delay_ms += deviation;
            }
        }

        millis_to_duration(delay_ms.min(duration_to_millis(self.max)))
    }

    /// Rewind the attempt counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Set the base delay.
    pub fn set_min(&mut self, base: Duration) {
        self.base = base;
    }

    /// Set the delay ceiling.
    pub fn set_max(&mut self, max: Duration) {
        self.max = max;
    }

    /// Set the jitter fraction, clamped into `[0, 1]`.
    pub fn set_jitter(&mut self, jitter: f64) {
        self.jitter = clamp_jitter(jitter);
    }

    /// Set the growth multiplier.
    pub fn set_factor(&mut self, factor: f64) {
        self.factor = factor;
    }

    /// Base delay.
    pub fn min(&self) -> Duration {
        self.base
    }

    /// Delay ceiling.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Jitter fraction.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

fn clamp_jitter(jitter: f64) -> f64 {
    if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    }
}

fn duration_to_millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// Saturates at zero: a Duration cannot go negative.
fn millis_to_duration(millis: f64) -> Duration {
    if millis.is_nan() || millis <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((millis * 1_000_000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn no_jitter(base_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            2.0,
            0.0,
        )
    }

    #[test]
    fn test_doubling_sequence() {
        let mut backoff = no_jitter(100, 100_000);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn test_matches_closed_form_without_jitter() {
        for factor in [1.0, 1.5, 2.0, 3.0] {
            let mut backoff = BackoffPolicy::new(
                Duration::from_millis(50),
                Duration::from_secs(60),
                factor,
                0.0,
            );
            for n in 0..30 {
                let expected = millis_to_duration((50.0 * f64::powi(factor, n)).min(60_000.0));
                assert_eq!(backoff.next_delay(), expected, "factor {factor}, attempt {n}");
            }
        }
    }

    #[test]
    fn test_capped_at_max() {
        let mut backoff = no_jitter(100, 500);

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
        assert_eq!(delays[5], Duration::from_millis(500));
    }

    #[test]
    fn test_counter_survives_huge_attempts() {
        let mut backoff = no_jitter(100, 10_000);
        backoff.attempts = u32::MAX - 1;

        assert_eq!(backoff.next_delay(), Duration::from_millis(10_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10_000));
        assert_eq!(backoff.attempts(), u32::MAX);
    }

    #[test]
    fn test_reset_matches_fresh_policy() {
        let mut used = BackoffPolicy::new(
            Duration::from_millis(300),
            Duration::from_secs(10),
            2.0,
            0.5,
        );
        let mut fresh = used.clone();
        for _ in 0..5 {
            used.next_delay();
        }
        used.reset();
        assert_eq!(used.attempts(), 0);

        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            assert_eq!(
                used.next_delay_with(&mut rng_a),
                fresh.next_delay_with(&mut rng_b)
            );
        }
    }

    #[test]
    fn test_jitter_deviation_bounded() {
        let mut rng = StdRng::seed_from_u64(42);
        for jitter in [0.1, 0.5, 1.0] {
            let mut backoff = BackoffPolicy::new(
                Duration::from_millis(100),
                Duration::from_secs(3600),
                2.0,
                jitter,
            );
            for n in 0..12 {
                let candidate = 100.0 * 2f64.powi(n);
                let delay = duration_to_millis(backoff.next_delay_with(&mut rng));
                assert!(
                    (delay - candidate).abs() <= jitter * candidate + 1e-6,
                    "jitter {jitter}: {delay} too far from {candidate}"
                );
            }
        }
    }

    #[test]
    fn test_jitter_moves_both_directions() {
        let mut rng = StdRng::seed_from_u64(1);
        let (mut below, mut above) = (false, false);
        for _ in 0..200 {
            let mut backoff = BackoffPolicy::new(
                Duration::from_millis(1000),
                Duration::from_secs(60),
                2.0,
                0.5,
            );
            let delay = backoff.next_delay_with(&mut rng);
            below |= delay < Duration::from_millis(1000);
            above |= delay > Duration::from_millis(1000);
        }
        assert!(below && above);
    }

    #[test]
    fn test_full_jitter_never_negative() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut backoff = BackoffPolicy::new(
            Duration::from_millis(1000),
            Duration::from_secs(3600),
            1.0,
            1.0,
        );
        for _ in 0..1000 {
            let delay = backoff.next_delay_with(&mut rng);
            assert!(delay > Duration::ZERO);
            assert!(delay < Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_jitter_clamped() {
        let mut backoff = no_jitter(100, 1000);
        backoff.set_jitter(3.0);
        assert_eq!(backoff.jitter(), 1.0);
        backoff.set_jitter(-1.0);
        assert_eq!(backoff.jitter(), 0.0);
        backoff.set_jitter(f64::NAN);
        assert_eq!(backoff.jitter(), 0.0);
    }

    #[test]
    fn test_setters_apply_to_next_delay() {
        let mut backoff = no_jitter(100, 1000);
        backoff.set_min(Duration::from_millis(10));
        backoff.set_max(Duration::from_millis(15));
        backoff.set_factor(3.0);

        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
        assert_eq!(backoff.next_delay(), Duration::from_millis(15));
        assert_eq!(backoff.min(), Duration::from_millis(10));
        assert_eq!(backoff.max(), Duration::from_millis(15));
    }

    #[test]
    fn test_max_attempts() {
        assert!(!MaxAttempts::Unbounded.is_exhausted(u32::MAX));
        assert!(!MaxAttempts::Limited(3).is_exhausted(2));
        assert!(MaxAttempts::Limited(3).is_exhausted(3));
        assert!(MaxAttempts::Limited(0).is_exhausted(0));
    }
}
