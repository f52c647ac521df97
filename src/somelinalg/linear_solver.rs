//! Interface between the nonlinear solvers and the linear solvers used for the
//! Newton correction `J*x = b`.
use crate::numerical::Nonlinear_systems::error::CallbackError;
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::nvector::NVector;
use thiserror::Error;

/// Action of the system matrix on a vector.
///
/// Direct solvers only need the assembled matrix (handed over in
/// [`LinearSolver::setup`]); iterative solvers call [`LinearOperator::apply`]
/// which may evaluate a user Jacobian-vector product or a difference quotient.
pub trait LinearOperator {
    fn dim(&self) -> usize;
    fn apply(&mut self, v: &NVector) -> Result<NVector, CallbackError>;
}

/// Operator backed by an assembled matrix.
pub struct MatrixOperator<'a> {
    pub matrix: &'a DenseMatrix,
}

impl<'a> LinearOperator for MatrixOperator<'a> {
    fn dim(&self) -> usize {
        self.matrix.ncols()
    }
    fn apply(&mut self, v: &NVector) -> Result<NVector, CallbackError> {
        Ok(self.matrix.matvec(v))
    }
}

#[derive(Debug, Error)]
pub enum LinearSolverError {
    #[error("matrix is singular")]
    Singular,

    #[error("solve called before a successful setup")]
    NotSetUp,

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("iterative solver did not converge after {iterations} iterations, residual norm {residual}")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("operator evaluation failed")]
    Operator(#[from] CallbackError),
}

impl LinearSolverError {
    /// A recoverable failure may disappear once the Jacobian information is refreshed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LinearSolverError::NotConverged { .. } => true,
            LinearSolverError::Operator(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

pub trait LinearSolver {
    fn name(&self) -> String;
    /// Direct solvers need the assembled Jacobian; matrix-free ones do not.
    fn requires_matrix(&self) -> bool;
    /// Factorization step. Matrix-free solvers are handed no matrix.
    fn setup(&mut self, matrix: Option<&DenseMatrix>) -> Result<(), LinearSolverError>;
    fn solve(
        &mut self,
        op: &mut dyn LinearOperator,
        rhs: &NVector,
        tol: f64,
    ) -> Result<NVector, LinearSolverError>;
    /// Iterations spent in the last solve (1 for direct solvers).
    fn last_iterations(&self) -> usize;
}
