//! Tick-size rounding

/// Round a price to the nearest multiple of `tick_size`.
///
/// A non-positive or non-finite tick size returns the price unchanged.
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if !(tick_size > 0.0) || !tick_size.is_finite() {
        return price;
    }
    (price / tick_size).round() * tick_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_round_to_tick() {
        assert_relative_eq!(round_to_tick(24702.03, 0.05), 24702.05, epsilon = 1e-9);
        assert_relative_eq!(round_to_tick(24702.02, 0.05), 24702.0, epsilon = 1e-9);
        assert_relative_eq!(round_to_tick(101.26, 0.25), 101.25, epsilon = 1e-9);
    }

    #[test]
    fn test_bad_tick_size_passthrough() {
        assert_eq!(round_to_tick(101.26, 0.0), 101.26);
        assert_eq!(round_to_tick(101.26, -0.25), 101.26);
        assert_eq!(round_to_tick(101.26, f64::NAN), 101.26);
    }

    proptest! {
        #[test]
        fn round_to_tick_is_idempotent(price in 1.0f64..100_000.0, tick_idx in 0usize..4) {
            let tick = [0.05, 0.25, 0.5, 1.0][tick_idx];
            let once = round_to_tick(price, tick);
            let twice = round_to_tick(once, tick);
            prop_assert!((once - twice).abs() < 1e-9);
            prop_assert!((price - once).abs() <= tick / 2.0 + 1e-9);
        }
    }
}
