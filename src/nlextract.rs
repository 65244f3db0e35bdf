//! Continuous extraction allocator
//!
//! Splits an aggregate resource quota across heterogeneous deposit sets so
//! that total power `Σ N·p·clock^e` is minimal. With a uniform exponent e > 1
//! the optimum equalizes marginal cost over the sources that are neither at
//! their clock ceiling nor at the floor. The ceiling set is a prefix of the
//! sources ordered by marginal cost at the ceiling and the floor set a suffix
//! of the order by power/rate ratio, so it is enough to search every such
//! pair and keep the cheapest feasible split.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{PlanError, Result};

/// One set of identical deposits as seen by the allocator
#[derive(Debug, Clone, Serialize)]
pub struct SupplySource {
    pub name: String,
    pub count: u32,
    /// Items/min per deposit at 100 % clock
    pub base_rate: f64,
    /// MW per deposit at 100 % clock
    pub base_power: f64,
    pub exponent: f64,
    pub max_clock: f64,
}

impl SupplySource {
    /// Items/min of all deposits at their ceiling
    pub fn capacity(&self) -> f64 {
        self.count as f64 * self.base_rate * self.max_clock
    }

    fn ratio(&self) -> f64 {
        self.base_power / self.base_rate
    }

    fn power(&self, clock: f64) -> f64 {
        self.count as f64 * self.base_power * clock.powf(self.exponent)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub source: String,
    pub count: u32,
    pub clock: f64,
    /// Items/min delivered by all deposits of the source
    pub quota: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Allocation {
    pub resource: String,
    pub quota: f64,
    pub assignments: Vec<Assignment>,
    pub total_power: f64,
}

impl Allocation {
    pub fn delivered(&self) -> f64 {
        self.assignments.iter().map(|a| a.quota).sum()
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Extraction: {} @ {:.3}/min ===", self.resource, self.quota)?;
        for a in &self.assignments {
            writeln!(
                f,
                "  {}x {} @ {:.2}% -> {:.3}/min ({:.2} MW)",
                a.count,
                a.source,
                a.clock * 100.0,
                a.quota,
                a.power
            )?;
        }
        write!(f, "  Total power: {:.3} MW", self.total_power)
    }
}

/// Minimum-power split of `quota` over `sources` with every clock in
/// `[floor, max_clock]`.
///
/// Sources with no deposits are ignored. Fails with `CapacityExceeded` above
/// the combined ceiling and with `QuotaTooLow` below what the floor forces.
pub fn nlextract(resource: &str, sources: &[SupplySource], quota: f64, floor: f64) -> Result<Allocation> {
    if !quota.is_finite() || quota < 0.0 {
        return Err(PlanError::invalid(format!("quota {} for {} must be non-negative", quota, resource)));
    }
    if !(floor >= 0.0) {
        return Err(PlanError::invalid(format!("clock floor {} must be non-negative", floor)));
    }

    let mut active: Vec<&SupplySource> = sources.iter().filter(|s| s.count > 0).collect();
    let exponent = match active.first() {
        Some(s) => s.exponent,
        None => 0.0,
    };
    for s in &active {
        if !(s.base_rate > 0.0 && s.base_power > 0.0 && s.max_clock > 0.0) {
            return Err(PlanError::invalid(format!("source {} has non-positive parameters", s.name)));
        }
        if s.exponent != exponent {
            return Err(PlanError::invalid(format!("sources of {} mix power exponents", resource)));
        }
        if floor > s.max_clock {
            return Err(PlanError::invalid(format!(
                "clock floor {} exceeds the ceiling {} of {}",
                floor, s.max_clock, s.name
            )));
        }
    }
    if !active.is_empty() && exponent <= 1.0 {
        return Err(PlanError::invalid(format!("power exponent {} must exceed 1", exponent)));
    }

    let capacity: f64 = active.iter().map(|s| s.capacity()).sum();
    let minimum: f64 = floor * active.iter().map(|s| s.count as f64 * s.base_rate).sum::<f64>();
    let eps = 1e-9 * quota.max(1.0);
    if quota > capacity + eps {
        return Err(PlanError::CapacityExceeded {
            resource: resource.to_string(),
            quota,
            capacity,
        });
    }
    if quota < minimum - eps {
        return Err(PlanError::QuotaTooLow {
            resource: resource.to_string(),
            quota,
            minimum,
        });
    }
    let quota = quota.clamp(minimum, capacity);

    // Cheapest marginal cost first; the name keeps equal ratios deterministic.
    // Sources at the floor are a suffix of this order.
    active.sort_by(|a, b| a.ratio().total_cmp(&b.ratio()).then_with(|| a.name.cmp(&b.name)));

    let n = active.len();
    let inv = if n > 0 { 1.0 / (exponent - 1.0) } else { 0.0 };

    // Sources at their ceiling are a prefix of the order by marginal cost at
    // the ceiling, which differs from the ratio order when ceilings differ
    let mut by_ceiling: Vec<usize> = (0..n).collect();
    by_ceiling.sort_by(|&a, &b| {
        let at_ceiling = |s: &SupplySource| s.ratio() * s.max_clock.powf(exponent - 1.0);
        at_ceiling(active[a])
            .total_cmp(&at_ceiling(active[b]))
            .then_with(|| a.cmp(&b))
    });

    let mut best: Option<(Vec<f64>, f64)> = None;
    for i in 0..=n {
        let mut ceiling = vec![false; n];
        for &k in &by_ceiling[..i] {
            ceiling[k] = true;
        }
        for j in (0..=n).rev() {
            // Floor suffix j.. must not overlap the ceiling set
            if (j..n).any(|k| ceiling[k]) {
                break;
            }
            let middle: Vec<usize> = (0..j).filter(|&k| !ceiling[k]).collect();
            let remaining = quota
                - by_ceiling[..i].iter().map(|&k| active[k].capacity()).sum::<f64>()
                - floor * active[j..].iter().map(|s| s.count as f64 * s.base_rate).sum::<f64>();

            let mut clocks = vec![floor; n];
            for &k in &by_ceiling[..i] {
                clocks[k] = active[k].max_clock;
            }
            if middle.is_empty() {
                if remaining.abs() > eps {
                    continue;
                }
            } else {
                if remaining < -eps {
                    continue;
                }
                let remaining = remaining.max(0.0);
                let weight: f64 = middle
                    .iter()
                    .map(|&k| {
                        let s = active[k];
                        s.count as f64 * s.base_rate.powf(1.0 + inv) * s.base_power.powf(-inv)
                    })
                    .sum();
                let lambda = remaining / weight;
                let mut feasible = true;
                for &k in &middle {
                    let s = active[k];
                    let c = lambda * (s.base_rate / s.base_power).powf(inv);
                    feasible &= c >= floor - 1e-9 && c <= s.max_clock + 1e-9;
                    clocks[k] = c;
                }
                if !feasible {
                    continue;
                }
            }

            let power: f64 = clocks.iter().zip(&active).map(|(&c, s)| s.power(c)).sum();
            if best.as_ref().is_none_or(|(_, p)| power < *p) {
                best = Some((clocks, power));
            }
        }
    }

    let (clocks, total_power) = match best {
        Some(best) => best,
        None if n == 0 => (Vec::new(), 0.0),
        None => {
            return Err(PlanError::NumericalFailure(format!(
                "no feasible split of {:.6} over the sources of {}",
                quota, resource
            )));
        }
    };

    let assignments: Vec<Assignment> = clocks
        .iter()
        .zip(&active)
        .map(|(&clock, s)| {
            let clock = clock.clamp(floor, s.max_clock);
            Assignment {
                source: s.name.clone(),
                count: s.count,
                clock,
                quota: s.count as f64 * s.base_rate * clock,
                power: s.power(clock),
            }
        })
        .collect();

    debug!(resource, quota, total_power, sources = n, "allocated extraction");

    Ok(Allocation {
        resource: resource.to_string(),
        quota,
        assignments,
        total_power,
    })
}
