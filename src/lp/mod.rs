//! Linear program representation and backend fallback
//!
//! ```text
//!    min_x c'x
//!    st A_ub x <= b_ub
//!       A_eq x == b_eq
//!            x >= 0
//! ```
//!
//! Backends implement [`LpBackend`]. [`solve_with_fallback`] walks a fixed
//! list and moves on only when a backend fails numerically; infeasible and
//! unbounded verdicts are final.

pub mod simplex;

use std::fmt;

use tracing::{debug, warn};

use crate::error::{PlanError, Result};

pub use simplex::{PivotRule, Simplex, SimplexSettings};

#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    /// Objective coefficients (length n)
    pub c: Vec<f64>,
    /// Inequality rows, each of length n
    pub a_ub: Vec<Vec<f64>>,
    pub b_ub: Vec<f64>,
    /// Equality rows, each of length n
    pub a_eq: Vec<Vec<f64>>,
    pub b_eq: Vec<f64>,
}

impl LinearProgram {
    pub fn new(c: Vec<f64>) -> Self {
        Self {
            c,
            ..Default::default()
        }
    }

    pub fn num_vars(&self) -> usize {
        self.c.len()
    }

    pub fn add_ub(&mut self, row: Vec<f64>, rhs: f64) -> &mut Self {
        self.a_ub.push(row);
        self.b_ub.push(rhs);
        self
    }

    pub fn add_eq(&mut self, row: Vec<f64>, rhs: f64) -> &mut Self {
        self.a_eq.push(row);
        self.b_eq.push(rhs);
        self
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        dot(&self.c, x)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.num_vars();
        if self.a_ub.len() != self.b_ub.len() || self.a_eq.len() != self.b_eq.len() {
            return Err(PlanError::invalid("constraint rows and right-hand sides differ in length"));
        }
        if self.a_ub.iter().chain(&self.a_eq).any(|row| row.len() != n) {
            return Err(PlanError::invalid(format!("constraint row is not of length {}", n)));
        }
        fn finite(v: &[f64]) -> bool {
            v.iter().all(|x| x.is_finite())
        }
        if !finite(&self.c)
            || !finite(&self.b_ub)
            || !finite(&self.b_eq)
            || !self.a_ub.iter().chain(&self.a_eq).all(|row| finite(row))
        {
            return Err(PlanError::invalid("linear program has non-finite coefficients"));
        }
        Ok(())
    }

    /// Dual program in the same form.
    ///
    /// Variables are `[u (one per inequality), z⁺, z⁻ (one each per equality)]`:
    ///
    /// ```text
    ///    min  b_ub'u - b_eq'(z⁺ - z⁻)
    ///    st   -A_ub'u + A_eq'(z⁺ - z⁻) <= c
    /// ```
    ///
    /// Its optimum is the negated primal optimum. Use [`LinearProgram::split_dual`]
    /// to recover `(u, z)`.
    pub fn dual(&self) -> LinearProgram {
        let n = self.num_vars();
        let m_ub = self.b_ub.len();
        let m_eq = self.b_eq.len();

        let mut c = Vec::with_capacity(m_ub + 2 * m_eq);
        c.extend(self.b_ub.iter().copied());
        c.extend(self.b_eq.iter().map(|b| -b));
        c.extend(self.b_eq.iter().copied());

        let mut dual = LinearProgram::new(c);
        for j in 0..n {
            let mut row = Vec::with_capacity(m_ub + 2 * m_eq);
            row.extend(self.a_ub.iter().map(|r| -r[j]));
            row.extend(self.a_eq.iter().map(|r| r[j]));
            row.extend(self.a_eq.iter().map(|r| -r[j]));
            dual.add_ub(row, self.c[j]);
        }
        dual
    }

    /// Split a solution of [`LinearProgram::dual`] into inequality and equality multipliers
    pub fn split_dual(&self, y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let m_ub = self.b_ub.len();
        let m_eq = self.b_eq.len();
        let u = y[..m_ub].to_vec();
        let z = (0..m_eq).map(|k| y[m_ub + k] - y[m_ub + m_eq + k]).collect();
        (u, z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
    NumericalError,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "Optimal"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::Unbounded => write!(f, "Unbounded"),
            SolveStatus::IterationLimit => write!(f, "IterationLimit"),
            SolveStatus::NumericalError => write!(f, "NumericalError"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: SolveStatus,
    /// Empty unless the status is optimal
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
}

impl LpSolution {
    pub fn failed(status: SolveStatus, iterations: usize) -> Self {
        Self {
            status,
            x: Vec::new(),
            objective: f64::NAN,
            iterations,
        }
    }
}

/// An LP algorithm the planner can delegate to
pub trait LpBackend {
    fn name(&self) -> &str;
    fn solve(&self, lp: &LinearProgram) -> LpSolution;
}

/// Dantzig, then Dantzig on a row-equilibrated copy, then Bland
pub fn default_backends() -> Vec<Box<dyn LpBackend>> {
    vec![
        Box::new(Simplex::new(PivotRule::Dantzig)),
        Box::new(Simplex::new(PivotRule::Dantzig).with_row_scaling()),
        Box::new(Simplex::new(PivotRule::Bland)),
    ]
}

/// Solve with each backend in turn until one gives a structural verdict
pub fn solve_with_fallback(lp: &LinearProgram, backends: &[Box<dyn LpBackend>]) -> Result<LpSolution> {
    lp.validate()?;
    let mut failures = Vec::new();
    for backend in backends {
        let solution = backend.solve(lp);
        debug!(
            backend = backend.name(),
            status = %solution.status,
            iterations = solution.iterations,
            vars = lp.num_vars(),
            rows = lp.b_ub.len() + lp.b_eq.len(),
            "lp solved"
        );
        match solution.status {
            SolveStatus::Optimal => return Ok(solution),
            SolveStatus::Infeasible => {
                return Err(PlanError::Infeasible(format!("{} found no feasible point", backend.name())));
            }
            SolveStatus::Unbounded => {
                return Err(PlanError::Unbounded(format!("{} found an unbounded ray", backend.name())));
            }
            SolveStatus::IterationLimit | SolveStatus::NumericalError => {
                warn!(backend = backend.name(), status = %solution.status, "lp backend failed, trying next");
                failures.push(format!("{}: {}", backend.name(), solution.status));
            }
        }
    }
    if failures.is_empty() {
        return Err(PlanError::NumericalFailure("no lp backend configured".to_string()));
    }
    Err(PlanError::NumericalFailure(failures.join(", ")))
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
