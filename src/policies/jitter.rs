//! # Jitter policy for backoff delays.
//!
//! [`JitterPolicy`] adds randomness to delays to prevent thundering herd effects
//! when many callers back off at the same moment.
//!
//! - [`JitterPolicy::None`]: no randomization, predictable delays
//! - [`JitterPolicy::Full`]: delay × random[0, 1)
//! - [`JitterPolicy::Equal`]: delay × random[0.5, 1.0]

use std::time::Duration;

use super::random::RandomSource;

/// Policy controlling randomization of delays.
///
/// ## Trade-offs
/// - **None**: Predictable, but risks thundering herd
/// - **Full**: Maximum spread, can shrink a delay close to zero
/// - **Equal**: Balanced; never waits less than half of the base delay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the exact base delay.
    #[default]
    None,

    /// Random delay in `[0, base)`.
    Full,

    /// Random delay in `[base/2, base]`: the base is scaled by a uniform multiplier in `[0.5, 1.0]`.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to `delay` using one sample from `rng`.
    ///
    /// `JitterPolicy::None` does not consume a sample.
    pub fn apply(&self, delay: Duration, rng: &dyn RandomSource) -> Duration {
        if delay.is_zero() {
            return Duration::ZERO;
        }
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => scale(delay, rng.next_unit()),
            JitterPolicy::Equal => scale(delay, 0.5 + 0.5 * rng.next_unit()),
        }
    }
}

/// Multiplies `delay` by `m`, rounding to the nearest nanosecond.
pub(super) fn scale(delay: Duration, m: f64) -> Duration {
    let nanos = delay.as_nanos() as f64 * m;
    if !nanos.is_finite() || nanos <= 0.0 {
        return Duration::ZERO;
    }
    if nanos >= u64::MAX as f64 {
        return Duration::from_nanos(u64::MAX);
    }
    Duration::from_nanos(nanos.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::SeededRandom;

    #[test]
    fn test_none_is_identity() {
        let d = Duration::from_millis(250);
        assert_eq!(JitterPolicy::None.apply(d, &|| 0.3), d);
    }

    #[test]
    fn test_equal_stays_within_half_and_full() {
        let rng = SeededRandom::new(42);
        let base = Duration::from_millis(1000);
        for _ in 0..500 {
            let d = JitterPolicy::Equal.apply(base, &rng);
            assert!(d >= Duration::from_millis(500), "{d:?} below half");
            assert!(d <= base, "{d:?} above base");
        }
    }

    #[test]
    fn test_equal_extremes() {
        let base = Duration::from_millis(80);
        assert_eq!(JitterPolicy::Equal.apply(base, &|| 0.0), Duration::from_millis(40));
        assert_eq!(JitterPolicy::Equal.apply(base, &|| 1.0), base);
    }

    #[test]
    fn test_full_bounds() {
        let rng = SeededRandom::new(3);
        let base = Duration::from_millis(1000);
        for _ in 0..500 {
            assert!(JitterPolicy::Full.apply(base, &rng) <= base);
        }
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO, &|| 0.9), Duration::ZERO);
    }
}
