use crate::numerical::Nonlinear_systems::config::Strategy;
use crate::numerical::Nonlinear_systems::problem::Constraint;
use crate::somelinalg::linear_solver::LinearSolverError;
use strum_macros::Display;
use thiserror::Error;

/// Failure reported by a user callback (residual, fixed-point map, Jacobian, J*v).
///
/// `Recoverable` asks the solver to retry from a different point (shorter step),
/// `Terminal` aborts the solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallbackError {
    #[error("recoverable failure: {0}")]
    Recoverable(String),
    #[error("terminal failure: {0}")]
    Terminal(String),
}

impl CallbackError {
    pub fn recoverable(msg: impl Into<String>) -> CallbackError {
        CallbackError::Recoverable(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> CallbackError {
        CallbackError::Terminal(msg.into())
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, CallbackError::Recoverable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CallbackError::Recoverable(m) | CallbackError::Terminal(m) => m,
        }
    }
}

/// Which user callback failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CallbackKind {
    #[strum(serialize = "residual function")]
    Residual,
    #[strum(serialize = "fixed-point function")]
    FixedPoint,
    #[strum(serialize = "Jacobian function")]
    Jacobian,
    #[strum(serialize = "Jacobian-vector product")]
    JacobianVectorProduct,
}

/// Errors returned by `NonlinearSolver::solve` and by the configuration setters.
#[derive(Debug, Error)]
pub enum SolverError {
    ////////////////////////////// configuration //////////////////////////////
    #[error("strategy {strategy} requires a linear solver, none was set")]
    MissingLinearSolver { strategy: Strategy },

    #[error("dimension mismatch: {what} has length {found}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("{what} must be strictly positive and finite, entry {index} is {value}")]
    NonPositiveScale {
        what: &'static str,
        index: usize,
        value: f64,
    },

    #[error("constraints are not supported by strategy {strategy}")]
    ConstraintsUnsupported { strategy: Strategy },

    #[error("initial guess violates constraint {constraint} at component {index} (value {value})")]
    InfeasibleInitialGuess {
        index: usize,
        value: f64,
        constraint: Constraint,
    },

    #[error("Picard iteration needs the linear part as a matrix, the linear solver {solver} is matrix-free")]
    MatrixFreePicard { solver: String },

    ////////////////////////////// convergence ///////////////////////////////
    #[error("maximum number of iterations ({iterations}) reached, scaled residual norm {fnorm:.3e}")]
    MaxIterationsReached { iterations: usize, fnorm: f64 },

    #[error("line search failed to find a sufficiently decreasing step at iteration {iteration}")]
    LineSearchNonConvergence { iteration: usize },

    #[error("five consecutive steps of maximum length taken, last at iteration {iteration}")]
    MaxNewtonStep5x { iteration: usize },

    #[error("line search beta condition failed {failures} times")]
    LineSearchBetaFailures { failures: usize },

    #[error("constraints reduced the Newton step to nothing at iteration {iteration}")]
    ConstraintStagnation { iteration: usize },

    ////////////////////////////// linear solver /////////////////////////////
    #[error("linear solver setup failed")]
    LinearSetupFailed(#[source] LinearSolverError),

    #[error("linear solve failed")]
    LinearSolveFailed(#[source] LinearSolverError),

    #[error("linear solve failed with current Jacobian information, no recovery possible")]
    LinearSolverNoRecovery(#[source] LinearSolverError),

    ////////////////////////////// callbacks /////////////////////////////////
    #[error("{kind} failed: {message}")]
    Callback { kind: CallbackKind, message: String },

    #[error("{kind} failed recoverably at the initial guess: {message}")]
    FirstResidualFailed { kind: CallbackKind, message: String },

    #[error("{count} consecutive recoverable callback failures")]
    RepeatedRecoverableFailures { count: usize },

    ////////////////////////////// resources /////////////////////////////////
    #[error("failed to allocate solver workspace: {what}")]
    AllocationFailed { what: &'static str },
}

impl SolverError {
    pub fn invalid_config(reason: impl Into<String>) -> SolverError {
        SolverError::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// true for the configuration errors detected before the first iteration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SolverError::MissingLinearSolver { .. }
                | SolverError::DimensionMismatch { .. }
                | SolverError::InvalidConfig { .. }
                | SolverError::NonPositiveScale { .. }
                | SolverError::ConstraintsUnsupported { .. }
                | SolverError::InfeasibleInitialGuess { .. }
                | SolverError::MatrixFreePicard { .. }
        )
    }
}
