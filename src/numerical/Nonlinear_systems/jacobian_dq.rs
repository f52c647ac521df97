//! Difference-quotient approximations of the Jacobian: dense forward
//! differences column by column, and the directional difference used by
//! matrix-free linear solvers.
use crate::numerical::Nonlinear_systems::error::CallbackError;
use crate::numerical::Nonlinear_systems::problem::{JvpFn, ResidualFn};
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::linear_solver::LinearOperator;
use crate::somelinalg::nvector::NVector;
use log::debug;

/// Residual evaluation shared by the difference quotients and the solver:
/// a returned vector of the wrong length is a terminal failure, non-finite
/// entries a recoverable one.
pub(crate) fn checked_eval(
    residual: &mut ResidualFn<'_>,
    u: &NVector,
) -> Result<NVector, CallbackError> {
    let f = residual(u)?;
    if f.len() != u.len() {
        return Err(CallbackError::terminal(format!(
            "returned a vector of length {}, expected {}",
            f.len(),
            u.len()
        )));
    }
    if !f.all_finite() {
        return Err(CallbackError::recoverable("non-finite entries in the result"));
    }
    Ok(f)
}

/// Forward-difference Jacobian.
///
/// Column j is `(F(u + sigma_j e_j) - F(u)) / sigma_j` with
/// `sigma_j = sqrt_relfunc * max(|u_j|, 1/u_scale_j)`.
/// Returns the matrix and the number of residual evaluations spent.
pub fn dq_jacobian(
    residual: &mut ResidualFn<'_>,
    u: &NVector,
    fu: &NVector,
    u_scale: &NVector,
    sqrt_relfunc: f64,
) -> Result<(DenseMatrix, usize), CallbackError> {
    let n = u.len();
    let mut jac = DenseMatrix::zeros(fu.len(), n);
    let mut u_pert = u.clone();
    let mut nfe = 0;
    for j in 0..n {
        let uj = u[j];
        let sigma = sqrt_relfunc * uj.abs().max(1.0 / u_scale[j]);
        u_pert[j] = uj + sigma;
        let f_pert = checked_eval(residual, &u_pert)?;
        nfe += 1;
        let mut col = f_pert.sub(fu);
        col.scale_mut(1.0 / sigma);
        jac.set_column(j, &col);
        u_pert[j] = uj;
    }
    debug!("difference-quotient Jacobian computed with {} residual evaluations", nfe);
    Ok((jac, nfe))
}

/// Directional difference `J(u)*v ~ (F(u + sigma v) - F(u)) / sigma` with
/// `sigma = sign(su.sv) * sqrt_relfunc * max(|su.sv|, ||sv||_1) / ||sv||_2^2`,
/// `su = u_scale*u`, `sv = u_scale*v`.
pub fn dq_jvp(
    residual: &mut ResidualFn<'_>,
    u: &NVector,
    fu: &NVector,
    v: &NVector,
    u_scale: &NVector,
    sqrt_relfunc: f64,
) -> Result<NVector, CallbackError> {
    let su = u.component_mul(u_scale);
    let sv = v.component_mul(u_scale);
    let vtv = sv.dot(&sv);
    if vtv == 0.0 {
        return Ok(NVector::zeros(fu.len()));
    }
    let sutsv = su.dot(&sv);
    let sign = if sutsv >= 0.0 { 1.0 } else { -1.0 };
    let sigma = sign * sqrt_relfunc * sutsv.abs().max(sv.l1_norm()) / vtv;
    let u_pert = NVector::linear_sum(1.0, u, sigma, v);
    let f_pert = checked_eval(residual, &u_pert)?;
    Ok(NVector::linear_sum(1.0 / sigma, &f_pert, -1.0 / sigma, fu))
}

/// `v -> J(u)*v` for matrix-free linear solvers: the user product if the
/// problem has one, otherwise the directional difference quotient.
pub struct NewtonOperator<'s, 'a> {
    pub residual: &'s mut ResidualFn<'a>,
    pub jvp: Option<&'s mut JvpFn<'a>>,
    pub u: &'s NVector,
    pub fu: &'s NVector,
    pub u_scale: &'s NVector,
    pub sqrt_relfunc: f64,
    /// products evaluated so far
    pub njv: usize,
    /// residual evaluations spent on difference quotients
    pub nfe: usize,
}

impl<'s, 'a> LinearOperator for NewtonOperator<'s, 'a> {
    fn dim(&self) -> usize {
        self.u.len()
    }

    fn apply(&mut self, v: &NVector) -> Result<NVector, CallbackError> {
        self.njv += 1;
        match self.jvp.as_mut() {
            Some(jvp) => {
                let jv = jvp(self.u, v)?;
                if jv.len() != self.u.len() {
                    return Err(CallbackError::terminal(format!(
                        "Jacobian-vector product has length {}, expected {}",
                        jv.len(),
                        self.u.len()
                    )));
                }
                if !jv.all_finite() {
                    return Err(CallbackError::recoverable(
                        "non-finite Jacobian-vector product",
                    ));
                }
                Ok(jv)
            }
            None => {
                self.nfe += 1;
                dq_jvp(self.residual, self.u, self.fu, v, self.u_scale, self.sqrt_relfunc)
            }
        }
    }
}
