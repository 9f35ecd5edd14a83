//! Hardware sample-rate derivation.
//!
//! The RTL2832U only locks at rates inside two disjoint windows, so the
//! sampling server is asked for the smallest exact multiple of the plan rate
//! that lands inside one of them. The data path can then decimate by an
//! integer factor back to the requested rate.

/// Highest rate the hardware supports, in Hz.
pub const MAX_RATE: u32 = 3_200_000;

/// Substitute applied when the requested rate is unusable, in Hz.
pub const DEFAULT_RATE: u32 = 48_000;

fn in_hardware_range(rate: f64) -> bool {
    (225_001.0..=300_000.0).contains(&rate) || (900_001.0..=3_200_000.0).contains(&rate)
}

/// Map a requested rate to the hardware rate used for sampling.
///
/// Returns the smallest exact integer multiple of the requested rate that
/// falls inside a valid hardware window. Unusable requests (zero, negative,
/// non-finite or above [`MAX_RATE`]) fall back to [`DEFAULT_RATE`] first;
/// that substitution is logged but not an error.
pub fn hardware_rate(requested: f64) -> u32 {
    let step = if requested.is_finite() && requested > 0.0 && requested <= f64::from(MAX_RATE) {
        requested
    } else {
        tracing::warn!(
            requested,
            fallback = DEFAULT_RATE,
            "requested rate not within hardware range"
        );
        f64::from(DEFAULT_RATE)
    };

    let mut hw = step;
    while !in_hardware_range(hw) {
        hw += step;
    }
    hw.round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiples_land_in_a_valid_window() {
        for requested in [8_000u32, 24_000, 48_000, 96_000, 225_001, 300_000, 1_000_000] {
            let hw = hardware_rate(f64::from(requested));
            assert_eq!(hw % requested, 0, "{hw} not a multiple of {requested}");
            assert!(
                in_hardware_range(f64::from(hw)),
                "{hw} outside hardware windows"
            );
        }
    }

    #[test]
    fn test_forty_eight_khz_resolves_to_240_khz() {
        assert_eq!(hardware_rate(48_000.0), 240_000);
    }

    #[test]
    fn test_rate_already_valid_is_kept() {
        assert_eq!(hardware_rate(250_000.0), 250_000);
        assert_eq!(hardware_rate(2_400_000.0), 2_400_000);
    }

    #[test]
    fn test_gap_rate_is_multiplied_past_the_gap() {
        // 400 kHz sits between the two windows; tripling reaches the upper one.
        assert_eq!(hardware_rate(400_000.0), 1_200_000);
    }

    #[test]
    fn test_unusable_requests_fall_back() {
        let fallback = hardware_rate(f64::from(DEFAULT_RATE));
        assert_eq!(hardware_rate(0.0), fallback);
        assert_eq!(hardware_rate(-1.0), fallback);
        assert_eq!(hardware_rate(f64::from(MAX_RATE) + 1.0), fallback);
        assert_eq!(hardware_rate(f64::NAN), fallback);
    }
}
