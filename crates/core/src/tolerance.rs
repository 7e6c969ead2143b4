//! Named numeric tolerance profiles.
//!
//! Epsilons are fixed domain constants, not caller configuration. The two
//! weight-sum profiles stay separate: NAV baskets and index compositions
//! come from sources with different precision.

/// Absorbs binary rounding so a decimal difference sitting exactly on an
/// epsilon boundary compares as the decimal value intends.
const ROUNDING_SLACK: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tolerance {
    Rate,
    Price,
    FxReciprocal,
    DerivedQuantity,
    /// Market-data basket NAV constituent weights.
    NavWeightSum,
    /// Reference-data index composition weights.
    IndexWeightSum,
}

impl Tolerance {
    pub const fn epsilon(self) -> f64 {
        match self {
            Self::Rate | Self::Price | Self::FxReciprocal | Self::DerivedQuantity => 1e-4,
            Self::NavWeightSum => 1e-2,
            Self::IndexWeightSum => 5e-3,
        }
    }
}

/// `|a - b| <= epsilon(profile)`. NaN never compares equal.
pub fn approx_equal(a: f64, b: f64, profile: Tolerance) -> bool {
    (a - b).abs() <= profile.epsilon() + ROUNDING_SLACK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_profiles_disagree_on_one_percent_drift() {
        let sum: f64 = [0.3, 0.3, 0.41].iter().sum();
        assert!(approx_equal(sum, 1.0, Tolerance::NavWeightSum));
        assert!(!approx_equal(sum, 1.0, Tolerance::IndexWeightSum));
    }

    #[test]
    fn reciprocal_within_half_basis_point_passes() {
        let product = 0.92 * (1.0 / 0.92 + 0.00005);
        assert!(approx_equal(product, 1.0, Tolerance::FxReciprocal));
        assert!(!approx_equal(0.92 * 1.10, 1.0, Tolerance::FxReciprocal));
    }

    #[test]
    fn nan_never_equal() {
        assert!(!approx_equal(f64::NAN, 1.0, Tolerance::Rate));
    }

    #[test]
    fn index_profile_is_tighter_than_nav_profile() {
        assert!(Tolerance::IndexWeightSum.epsilon() < Tolerance::NavWeightSum.epsilon());
    }
}
