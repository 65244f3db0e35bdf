//! Tangent-line approximation of convex extraction power curves
//!
//! `P(q) ≈ slope·q + offset` around a reference quota. Because the curves are
//! convex the tangent underestimates power away from the reference, which the
//! solver corrects by re-linearizing at each new operating point.

use serde::Serialize;

use crate::error::{PlanError, Result};
use crate::nlextract::{Allocation, SupplySource, nlextract};

/// Finite-difference step in items/min
pub const DERIVATIVE_STEP: f64 = 1e-3;

/// Power in MW as a function of extracted items/min on `[0, max_quota]`
pub trait PowerCurve {
    fn max_quota(&self) -> f64;
    fn power(&self, quota: f64) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Linearization {
    pub quota: f64,
    pub slope: f64,
    pub offset: f64,
}

impl Linearization {
    pub fn estimate(&self, quota: f64) -> f64 {
        self.slope * quota + self.offset
    }
}

/// Minimum power of a whole resource, all its sources allocated optimally
#[derive(Debug, Clone)]
pub struct SupplyCurve {
    resource: String,
    sources: Vec<SupplySource>,
    floor: f64,
}

impl SupplyCurve {
    pub fn new(resource: impl Into<String>, sources: Vec<SupplySource>, floor: f64) -> Self {
        Self {
            resource: resource.into(),
            sources,
            floor,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Optimal per-source split of `quota`
    pub fn allocate(&self, quota: f64) -> Result<Allocation> {
        nlextract(&self.resource, &self.sources, quota, self.floor)
    }
}

impl PowerCurve for SupplyCurve {
    fn max_quota(&self) -> f64 {
        self.sources.iter().map(|s| s.capacity()).sum()
    }

    fn power(&self, quota: f64) -> Result<f64> {
        Ok(self.allocate(quota)?.total_power)
    }
}

/// Tangent of `curve` at `quota`.
///
/// Quotas a rounding error outside `[0, max_quota]` are clamped; anything
/// further out is an invalid parameter.
pub fn linearize(curve: &impl PowerCurve, quota: f64) -> Result<Linearization> {
    let max = curve.max_quota();
    let tolerance = 1e-6 * max.max(1.0);
    if !quota.is_finite() || quota < -tolerance || quota > max + tolerance {
        return Err(PlanError::invalid(format!(
            "quota {} outside the curve domain [0, {}]",
            quota, max
        )));
    }
    let quota = quota.clamp(0.0, max.max(0.0));
    let slope = slope(curve, quota, max)?;
    let offset = curve.power(quota)? - slope * quota;
    Ok(Linearization { quota, slope, offset })
}

fn slope(curve: &impl PowerCurve, quota: f64, max: f64) -> Result<f64> {
    if max <= 0.0 {
        return Ok(0.0);
    }
    if quota <= 0.0 {
        let h = DERIVATIVE_STEP.min(max);
        return Ok((curve.power(h)? - curve.power(0.0)?) / h);
    }
    if quota >= max {
        let h = DERIVATIVE_STEP.min(max);
        return Ok((curve.power(max)? - curve.power(max - h)?) / h);
    }
    let h = DERIVATIVE_STEP.min(quota).min(max - quota);
    Ok((curve.power(quota + h)? - curve.power(quota - h)?) / (2.0 * h))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two identical deposits, P(q) = N·p·(q/(N·r))^e
    struct Pooled {
        count: f64,
        base_rate: f64,
        base_power: f64,
        exponent: f64,
        max_clock: f64,
    }

    impl PowerCurve for Pooled {
        fn max_quota(&self) -> f64 {
            self.count * self.base_rate * self.max_clock
        }

        fn power(&self, quota: f64) -> Result<f64> {
            let clock = quota / (self.count * self.base_rate);
            Ok(self.count * self.base_power * clock.max(0.0).powf(self.exponent))
        }
    }

    fn curve() -> Pooled {
        Pooled {
            count: 2.0,
            base_rate: 120.0,
            base_power: 30.0,
            exponent: 1.321928,
            max_clock: 2.5,
        }
    }

    #[test]
    fn tangent_touches_curve_at_reference() {
        let c = curve();
        for &q in &[0.0, 1e-4, 10.0, 240.0, 599.9995, 600.0] {
            let l = linearize(&c, q).unwrap();
            let truth = c.power(q).unwrap();
            assert!((l.estimate(q) - truth).abs() <= 1e-9 * truth.max(1.0), "q = {}", q);
        }
    }

    #[test]
    fn tangent_underestimates_elsewhere() {
        let c = curve();
        let l = linearize(&c, 240.0).unwrap();
        for &q in &[0.0, 100.0, 400.0, 600.0] {
            assert!(l.estimate(q) < c.power(q).unwrap());
        }
    }

    #[test]
    fn slope_approximates_derivative() {
        let c = curve();
        let q = 240.0;
        let l = linearize(&c, q).unwrap();
        // d/dq N·p·(q/(N·r))^e = p·e/r·(q/(N·r))^(e-1)
        let exact = 30.0 * 1.321928 / 120.0 * (q / 240.0f64).powf(0.321928);
        assert!((l.slope - exact).abs() < 1e-6);
    }

    #[test]
    fn start_at_zero_has_no_offset() {
        let l = linearize(&curve(), 0.0).unwrap();
        assert_eq!(l.offset, 0.0);
        assert!(l.slope > 0.0);
    }

    #[test]
    fn rounding_outside_domain_is_clamped() {
        let c = curve();
        assert_eq!(linearize(&c, -1e-9).unwrap().quota, 0.0);
        assert_eq!(linearize(&c, 600.0 + 1e-7).unwrap().quota, 600.0);
        assert!(linearize(&c, 601.0).is_err());
        assert!(linearize(&c, -1.0).is_err());
    }

    #[test]
    fn supply_curve_matches_single_pooled_source() {
        let pooled = curve();
        let supply = SupplyCurve::new(
            "Iron Ore",
            vec![SupplySource {
                name: "pure".to_string(),
                count: 2,
                base_rate: 120.0,
                base_power: 30.0,
                exponent: 1.321928,
                max_clock: 2.5,
            }],
            0.0,
        );
        assert!((supply.max_quota() - pooled.max_quota()).abs() < 1e-12);
        let a = linearize(&supply, 300.0).unwrap();
        let b = linearize(&pooled, 300.0).unwrap();
        assert!((a.slope - b.slope).abs() < 1e-8);
        assert!((a.offset - b.offset).abs() < 1e-6);
    }
}
