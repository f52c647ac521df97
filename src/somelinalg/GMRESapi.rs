//! Restarted GMRES(m) working only through the action `v -> A*v`, so the
//! Newton systems can be solved without assembling the Jacobian.
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::linear_solver::{LinearOperator, LinearSolver, LinearSolverError};
use crate::somelinalg::nvector::NVector;
use log::{debug, info};
use nalgebra::DMatrix;

pub struct GMRESsolver {
    /// dimension of the Krylov subspace before a restart
    pub krylov_dim: usize,
    pub max_restarts: usize,
    last_iters: usize,
    last_residual: f64,
}

impl GMRESsolver {
    pub fn new(krylov_dim: usize, max_restarts: usize) -> GMRESsolver {
        GMRESsolver {
            krylov_dim: krylov_dim.max(1),
            max_restarts,
            last_iters: 0,
            last_residual: 0.0,
        }
    }

    pub fn last_residual(&self) -> f64 {
        self.last_residual
    }
}

impl Default for GMRESsolver {
    fn default() -> Self {
        GMRESsolver::new(10, 5)
    }
}

// rotation (c, s) such that -s*a + c*b = 0
fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = 1.0 / (1.0 + t * t).sqrt();
        (s * t, s)
    } else {
        let t = b / a;
        let c = 1.0 / (1.0 + t * t).sqrt();
        (c, c * t)
    }
}

impl LinearSolver for GMRESsolver {
    fn name(&self) -> String {
        format!("GMRES({})", self.krylov_dim)
    }

    fn requires_matrix(&self) -> bool {
        false
    }

    fn setup(&mut self, _matrix: Option<&DenseMatrix>) -> Result<(), LinearSolverError> {
        Ok(())
    }

    fn solve(
        &mut self,
        op: &mut dyn LinearOperator,
        b: &NVector,
        tol: f64,
    ) -> Result<NVector, LinearSolverError> {
        let n = b.len();
        if op.dim() != n {
            return Err(LinearSolverError::DimensionMismatch {
                expected: op.dim(),
                found: n,
            });
        }
        self.last_iters = 0;
        let mut x = NVector::zeros(n);
        let mut r = b.clone();
        let mut beta = r.l2_norm();
        let initial_residual = beta;
        if beta == 0.0 {
            self.last_residual = 0.0;
            return Ok(x);
        }
        let m = self.krylov_dim.min(n.max(1));

        for restart in 0..=self.max_restarts {
            if beta <= tol {
                break;
            }
            debug!("GMRES restart {}, residual = {:.3e}", restart, beta);
            let mut V: Vec<NVector> = Vec::with_capacity(m + 1);
            V.push(r.scale(1.0 / beta));
            let mut H = DMatrix::<f64>::zeros(m + 1, m);
            let mut cs = vec![0.0; m];
            let mut sn = vec![0.0; m];
            let mut g = vec![0.0; m + 1];
            g[0] = beta;
            let mut k_used = 0;

            for k in 0..m {
                // Arnoldi step, modified Gram-Schmidt
                let mut w = op.apply(&V[k])?;
                for j in 0..=k {
                    let h = w.dot(&V[j]);
                    H[(j, k)] = h;
                    w.axpy(-h, &V[j]);
                }
                let h_next = w.l2_norm();
                H[(k + 1, k)] = h_next;
                // previous rotations on the new column
                for j in 0..k {
                    let temp = cs[j] * H[(j, k)] + sn[j] * H[(j + 1, k)];
                    H[(j + 1, k)] = -sn[j] * H[(j, k)] + cs[j] * H[(j + 1, k)];
                    H[(j, k)] = temp;
                }
                let (c, s) = givens(H[(k, k)], H[(k + 1, k)]);
                cs[k] = c;
                sn[k] = s;
                H[(k, k)] = c * H[(k, k)] + s * H[(k + 1, k)];
                H[(k + 1, k)] = 0.0;
                g[k + 1] = -s * g[k];
                g[k] *= c;

                self.last_iters += 1;
                k_used = k + 1;
                if g[k + 1].abs() <= tol || h_next == 0.0 {
                    break;
                }
                V.push(w.scale(1.0 / h_next));
            }

            // back substitution H[0..k, 0..k] y = g[0..k]
            let mut y = vec![0.0; k_used];
            for i in (0..k_used).rev() {
                let mut sum = g[i];
                for j in (i + 1)..k_used {
                    sum -= H[(i, j)] * y[j];
                }
                if H[(i, i)] == 0.0 {
                    return Err(LinearSolverError::Singular);
                }
                y[i] = sum / H[(i, i)];
            }
            for (j, yj) in y.iter().enumerate() {
                x.axpy(*yj, &V[j]);
            }
            // true residual for the restart
            let Ax = op.apply(&x)?;
            r = b.sub(&Ax);
            beta = r.l2_norm();
        }

        self.last_residual = beta;
        if beta <= tol {
            Ok(x)
        } else if beta < initial_residual {
            // residual reduced but not below tol: the Newton iteration can still use it
            info!(
                "GMRES stopped with reduced residual {:.3e} (tol {:.3e}) after {} iterations",
                beta, tol, self.last_iters
            );
            Ok(x)
        } else {
            Err(LinearSolverError::NotConverged {
                iterations: self.last_iters,
                residual: beta,
            })
        }
    }

    fn last_iterations(&self) -> usize {
        self.last_iters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::somelinalg::linear_solver::MatrixOperator;
    use approx::assert_relative_eq;

    #[test]
    fn test_gmres_nonsymmetric_system() {
        let A = DenseMatrix::from_row_slice(
            4,
            4,
            &[
                4.0, 1.0, 0.0, 0.5, //
                -1.0, 3.0, 1.0, 0.0, //
                0.0, 2.0, 5.0, 1.0, //
                0.3, 0.0, -1.0, 2.0,
            ],
        );
        let x_true = NVector::from_vec(vec![1.0, 2.0, -1.0, 0.5]);
        let b = A.matvec(&x_true);
        let mut solver = GMRESsolver::new(4, 2);
        let mut op = MatrixOperator { matrix: &A };
        let x = solver.solve(&mut op, &b, 1e-12).unwrap();
        for i in 0..4 {
            assert_relative_eq!(x[i], x_true[i], epsilon = 1e-9);
        }
        assert!(solver.last_iterations() <= 8);
    }

    #[test]
    fn test_gmres_with_restarts() {
        let n = 8;
        let mut A = DenseMatrix::identity(n);
        for i in 0..n - 1 {
            A[(i, i + 1)] = 0.3;
            A[(i + 1, i)] = -0.2;
        }
        let x_true = NVector::from_vec((0..n).map(|i| i as f64 + 1.0).collect());
        let b = A.matvec(&x_true);
        let mut solver = GMRESsolver::new(2, 200);
        let mut op = MatrixOperator { matrix: &A };
        let x = solver.solve(&mut op, &b, 1e-10).unwrap();
        assert!(A.matvec(&x).sub(&b).l2_norm() <= 1e-10);
    }

    #[test]
    fn test_zero_rhs() {
        let A = DenseMatrix::identity(3);
        let mut solver = GMRESsolver::default();
        let mut op = MatrixOperator { matrix: &A };
        let x = solver.solve(&mut op, &NVector::zeros(3), 1e-10).unwrap();
        assert_eq!(x, NVector::zeros(3));
    }
}
