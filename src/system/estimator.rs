use crate::system::cpu::FrequencyValue;

/// Governors ramp frequency quickly at low load and flatten near the ceiling.
const LOAD_CURVE_EXPONENT: f64 = 0.7;

/// Estimate the current clock from the base/max range and a utilization percentage.
///
/// `current = base + (max - base) * (utilization / 100) ^ 0.7`
///
/// Utilization is clamped to `[0, 100]`; a `max` below `base` collapses the range.
pub fn estimate_current(
    base: FrequencyValue,
    max: FrequencyValue,
    utilization: f64,
) -> FrequencyValue {
    let load = if utilization.is_finite() {
        (utilization / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let range = (max - base).max(0.0);
    base + range * load.powf(LOAD_CURVE_EXPONENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(estimate_current(2.0, 3.0, 0.0), 2.0);
        assert_eq!(estimate_current(2.0, 3.0, 100.0), 3.0);
    }

    #[test]
    fn test_monotonic_in_utilization() {
        let mut prev = estimate_current(2.0, 3.0, 0.0);
        for step in 1..=100 {
            let next = estimate_current(2.0, 3.0, step as f64);
            assert!(next >= prev, "{} < {} at {}%", next, prev, step);
            prev = next;
        }
    }

    #[test]
    fn test_curve_is_above_linear_at_low_load() {
        // 0.5^0.7 ≈ 0.6156
        let half = estimate_current(2.0, 3.0, 50.0);
        assert!((half - 2.6156).abs() < 1e-3);
        assert!(half > 2.5);
    }

    #[test]
    fn test_out_of_range_inputs() {
        assert_eq!(estimate_current(2.0, 3.0, -20.0), 2.0);
        assert_eq!(estimate_current(2.0, 3.0, 250.0), 3.0);
        assert_eq!(estimate_current(2.0, 3.0, f64::NAN), 2.0);
        assert_eq!(estimate_current(3.0, 2.0, 80.0), 3.0);
    }
}
