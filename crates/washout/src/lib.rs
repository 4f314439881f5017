//! Rain washout model.
//!
//! First-order below-cloud scavenging: rain removes particulates at a
//! rate proportional to its intensity,
//!
//! ```text
//! C(t) = C0 · exp(-Λ · R · t)
//! ```
//!
//! where `Λ` is the scavenging coefficient (per mm of rain), `R` the
//! intensity in mm/h and `t` the duration in hours. Pure: no state, no I/O.

use common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Scavenging coefficient used when none is configured.
pub const DEFAULT_COEFFICIENT: f64 = common::config::DEFAULT_WASHOUT_COEFFICIENT;

/// Lower bound on the result. Concentration decays towards zero but
/// never reaches it; this also absorbs `exp` underflow. Inputs already
/// below the floor are returned unchanged.
pub const MIN_CONCENTRATION: f64 = 1e-6;

/// Washout model with a fixed scavenging coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WashoutModel {
    coefficient: f64,
}

impl WashoutModel {
    pub fn new(coefficient: f64) -> Result<Self> {
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(Error::Config(format!(
                "washout coefficient must be a finite number > 0, got {coefficient}"
            )));
        }
        Ok(Self { coefficient })
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Post-rain PM2.5 for `pm25` µg/m³ under `rain_mm_per_h` for
    /// `duration_h` hours.
    pub fn simulate(&self, pm25: f64, rain_mm_per_h: f64, duration_h: f64) -> Result<f64> {
        check_positive("pm25", pm25)?;
        check_positive("rain intensity", rain_mm_per_h)?;
        check_positive("duration", duration_h)?;

        let rate = self.coefficient * rain_mm_per_h;
        let remaining = pm25 * (-rate * duration_h).exp();
        Ok(remaining.max(MIN_CONCENTRATION.min(pm25)))
    }
}

impl Default for WashoutModel {
    fn default() -> Self {
        Self {
            coefficient: DEFAULT_COEFFICIENT,
        }
    }
}

/// One-shot form of [`WashoutModel::simulate`].
pub fn simulate(pm25: f64, rain_mm_per_h: f64, duration_h: f64, coefficient: f64) -> Result<f64> {
    WashoutModel::new(coefficient)?.simulate(pm25, rain_mm_per_h, duration_h)
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::InvalidInput(format!("{name} must be finite, got {value}")));
    }
    if value <= 0.0 {
        return Err(Error::InvalidInput(format!("{name} must be > 0, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_value() {
        let result = simulate(100.0, 10.0, 2.0, 0.08).expect("valid input");
        assert!((result - 100.0 * (-1.6f64).exp()).abs() < 1e-9);
        assert!((result - 20.19).abs() < 0.01);
    }

    #[test]
    fn test_monotonic_in_rain_and_duration() {
        let model = WashoutModel::default();
        let mut prev = f64::INFINITY;
        for rain in [0.5, 1.0, 5.0, 10.0, 20.0] {
            let v = model.simulate(80.0, rain, 1.0).expect("valid input");
            assert!(v < prev, "rain {rain}: {v} !< {prev}");
            prev = v;
        }

        let mut prev = f64::INFINITY;
        for hours in [0.25, 1.0, 3.0, 6.0, 12.0] {
            let v = model.simulate(80.0, 4.0, hours).expect("valid input");
            assert!(v < prev, "duration {hours}: {v} !< {prev}");
            prev = v;
        }
    }

    #[test]
    fn test_never_reaches_zero() {
        let model = WashoutModel::default();
        let v = model.simulate(5.0, 1000.0, 168.0).expect("valid input");
        assert!(v > 0.0);
        assert!((v - MIN_CONCENTRATION).abs() < 1e-12);
    }

    #[test]
    fn test_rain_never_raises_concentration() {
        let model = WashoutModel::default();
        let tiny = 1e-7;
        let v = model.simulate(tiny, 10.0, 2.0).expect("valid input");
        assert!(v > 0.0);
        assert!(v <= tiny, "{v} > {tiny}");

        for pm25 in [1e-9, 5e-7, 1e-6, 2e-6, 0.5, 80.0] {
            let v = model.simulate(pm25, 1000.0, 168.0).expect("valid input");
            assert!(v <= pm25, "pm25 {pm25}: {v}");
        }
    }

    #[test]
    fn test_rejects_out_of_domain_input() {
        let model = WashoutModel::default();
        for (pm25, rain, hours) in [
            (0.0, 10.0, 2.0),
            (100.0, -5.0, 2.0),
            (100.0, 10.0, 0.0),
            (f64::NAN, 10.0, 2.0),
            (100.0, f64::INFINITY, 2.0),
        ] {
            assert!(
                matches!(model.simulate(pm25, rain, hours), Err(Error::InvalidInput(_))),
                "({pm25}, {rain}, {hours}) should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_bad_coefficient() {
        assert!(matches!(WashoutModel::new(0.0), Err(Error::Config(_))));
        assert!(matches!(WashoutModel::new(f64::NAN), Err(Error::Config(_))));
        assert!((WashoutModel::new(0.1).expect("valid").coefficient() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_same_input_same_output() {
        let model = WashoutModel::new(0.05).expect("valid");
        let a = model.simulate(42.0, 3.0, 1.5).expect("valid input");
        let b = model.simulate(42.0, 3.0, 1.5).expect("valid input");
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
