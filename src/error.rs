//! Error taxonomy for the planning core

use thiserror::Error;

use crate::solver::Plan;

pub type Result<T> = std::result::Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    /// Clock speed, purity tier, mark or other parameter outside its domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown {kind}: {name}")]
    UnknownName { kind: &'static str, name: String },

    #[error("duplicate {kind} name: {name}")]
    Duplicate { kind: &'static str, name: String },

    /// No activity vector satisfies the constraints
    #[error("infeasible: {0}")]
    Infeasible(String),

    #[error("unbounded: {0}")]
    Unbounded(String),

    /// The re-linearization loop hit its iteration cap. The plan of the last
    /// iteration is carried along with `converged == false`.
    #[error("linearization did not converge after {iterations} iterations")]
    Convergence {
        iterations: usize,
        best_effort: Box<Plan>,
    },

    #[error("quota {quota:.6} exceeds extraction capacity {capacity:.6} of {resource}")]
    CapacityExceeded {
        resource: String,
        quota: f64,
        capacity: f64,
    },

    #[error("quota {quota:.6} is below the clock floor minimum {minimum:.6} of {resource}")]
    QuotaTooLow {
        resource: String,
        quota: f64,
        minimum: f64,
    },

    /// Every LP backend failed for non-structural reasons
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}

impl PlanError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        PlanError::InvalidParameter(msg.into())
    }

    pub(crate) fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        PlanError::UnknownName {
            kind,
            name: name.into(),
        }
    }
}
