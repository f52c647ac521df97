use crate::numerical::Nonlinear_systems::error::CallbackError;
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::linear_solver::{LinearOperator, LinearSolver, LinearSolverError};
use crate::somelinalg::linear_sys_diagnostics::poorly_conditioned;
use crate::somelinalg::nvector::NVector;
use log::{info, warn};
use nalgebra::{DMatrix, Dyn, LU};
use strum_macros::{Display, EnumIter, EnumString};

/// How the dense system is solved: LU factorization (default) or explicit inverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum DirectMethod {
    #[strum(serialize = "lu")]
    LU,
    #[strum(serialize = "inv")]
    Inverse,
}

enum Factorization {
    LU(LU<f64, Dyn, Dyn>),
    Inverse(DMatrix<f64>),
}

/// Dense direct solver. `setup` factorizes the Jacobian, `solve` reuses the
/// factorization until the next `setup`.
pub struct LUsolver {
    method: DirectMethod,
    factorization: Option<Factorization>,
    n: usize,
    /// log a warning when cond(J) exceeds this value (checked only if set, it costs an SVD)
    pub condition_threshold: Option<f64>,
    last_poorly_conditioned: bool,
}

impl LUsolver {
    pub fn new() -> LUsolver {
        LUsolver::with_method(DirectMethod::LU)
    }

    pub fn with_method(method: DirectMethod) -> LUsolver {
        LUsolver {
            method,
            factorization: None,
            n: 0,
            condition_threshold: None,
            last_poorly_conditioned: false,
        }
    }

    /// "lu" or "inv", same keywords as `linear_sys_method`
    pub fn from_method_name(name: &str) -> Option<LUsolver> {
        name.to_lowercase()
            .parse::<DirectMethod>()
            .ok()
            .map(LUsolver::with_method)
    }

    pub fn method(&self) -> DirectMethod {
        self.method
    }

    /// result of the condition check in the last `setup` (false if not checked)
    pub fn last_poorly_conditioned(&self) -> bool {
        self.last_poorly_conditioned
    }

    fn dim(&self) -> Option<usize> {
        self.factorization.as_ref().map(|_| self.n)
    }
}

impl Default for LUsolver {
    fn default() -> Self {
        LUsolver::new()
    }
}

impl LinearSolver for LUsolver {
    fn name(&self) -> String {
        format!("dense {}", self.method)
    }

    fn requires_matrix(&self) -> bool {
        true
    }

    fn setup(&mut self, matrix: Option<&DenseMatrix>) -> Result<(), LinearSolverError> {
        self.factorization = None;
        let A = matrix.ok_or(LinearSolverError::NotSetUp)?;
        let (n, m) = A.shape();
        if n != m {
            return Err(LinearSolverError::DimensionMismatch {
                expected: n,
                found: m,
            });
        }
        if let Some(threshold) = self.condition_threshold {
            self.last_poorly_conditioned = poorly_conditioned(A.as_dmatrix(), threshold);
        }
        let factorization = match self.method {
            DirectMethod::LU => {
                let lu = A.as_dmatrix().clone().lu();
                if !lu.is_invertible() {
                    warn!("LU factorization: matrix is singular");
                    return Err(LinearSolverError::Singular);
                }
                Factorization::LU(lu)
            }
            DirectMethod::Inverse => {
                let inv = A
                    .as_dmatrix()
                    .clone()
                    .try_inverse()
                    .ok_or(LinearSolverError::Singular)?;
                Factorization::Inverse(inv)
            }
        };
        self.factorization = Some(factorization);
        self.n = n;
        Ok(())
    }

    fn solve(
        &mut self,
        _op: &mut dyn LinearOperator,
        rhs: &NVector,
        _tol: f64,
    ) -> Result<NVector, LinearSolverError> {
        let n = self.dim().ok_or(LinearSolverError::NotSetUp)?;
        if rhs.len() != n {
            return Err(LinearSolverError::DimensionMismatch {
                expected: n,
                found: rhs.len(),
            });
        }
        let x = match &self.factorization {
            Some(Factorization::LU(lu)) => lu.solve(rhs.as_dvector()).ok_or(LinearSolverError::Singular)?,
            Some(Factorization::Inverse(inv)) => inv * rhs.as_dvector(),
            None => return Err(LinearSolverError::NotSetUp),
        };
        if !x.iter().all(|v| v.is_finite()) {
            info!("dense solve produced non-finite entries");
            return Err(LinearSolverError::Operator(CallbackError::Recoverable(
                "non-finite solution of the linear system".to_string(),
            )));
        }
        Ok(NVector::from_dvector(x))
    }

    fn last_iterations(&self) -> usize {
        1
    }
}
