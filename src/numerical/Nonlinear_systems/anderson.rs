//! Anderson acceleration of a fixed-point map `g = G(u)`.
//!
//! With `f_k = g_k - u_k` and the history of differences
//! `dF_i = f_(i+1) - f_i`, `dG_i = g_(i+1) - g_i` (at most `depth` of them),
//! the coefficients `gamma` minimise `||f_k - dF*gamma||_2` and the new iterate is
//!   u_(k+1) = g_k - dG*gamma - (1 - beta)*(f_k - dF*gamma).
use crate::numerical::Nonlinear_systems::error::SolverError;
use crate::somelinalg::nvector::NVector;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Difference {
    dg: NVector,
    df: NVector,
}

pub struct Anderson {
    depth: usize,
    damping: f64,
    history: VecDeque<Difference>,
    // (g_k, f_k) of the previous call
    previous: Option<(NVector, NVector)>,
}

impl Anderson {
    pub fn new(depth: usize, damping: f64) -> Result<Anderson, SolverError> {
        let mut history = VecDeque::new();
        history
            .try_reserve(depth + 1)
            .map_err(|_| SolverError::AllocationFailed {
                what: "Anderson acceleration history",
            })?;
        Ok(Anderson {
            depth,
            damping,
            history,
            previous: None,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.previous = None;
    }

    /// Next iterate from `g = G(u)` and `f = g - u`.
    pub fn accelerate(&mut self, g: &NVector, f: &NVector) -> NVector {
        // depth 0 keeps no history at all
        if let Some((g_prev, f_prev)) = self.previous.take().filter(|_| self.depth > 0) {
            if self.history.len() == self.depth {
                self.history.pop_front();
            }
            self.history.push_back(Difference {
                dg: g.sub(&g_prev),
                df: f.sub(&f_prev),
            });
        }
        self.previous = Some((g.clone(), f.clone()));

        let damped = |g: &NVector, f: &NVector| NVector::linear_sum(1.0, g, self.damping - 1.0, f);
        if self.depth == 0 || self.history.is_empty() {
            return damped(g, f);
        }

        let n = f.len();
        let m = self.history.len();
        let dF = DMatrix::from_fn(n, m, |i, j| self.history[j].df[i]);
        let svd = dF.svd(true, true);
        let smax = svd.singular_values.max();
        if smax == 0.0 {
            return damped(g, f);
        }
        let rhs = DVector::from_column_slice(f.as_slice());
        let gamma = match svd.solve(&rhs, smax * 1e-12) {
            Ok(gamma) => gamma,
            Err(e) => {
                warn!("Anderson least-squares solve failed ({}), plain step taken", e);
                return damped(g, f);
            }
        };
        debug!("Anderson coefficients: {:?}", gamma.as_slice());

        let mut u_new = g.clone();
        let mut f_res = f.clone();
        for (j, diff) in self.history.iter().enumerate() {
            u_new.axpy(-gamma[j], &diff.dg);
            f_res.axpy(-gamma[j], &diff.df);
        }
        if self.damping < 1.0 {
            u_new.axpy(self.damping - 1.0, &f_res);
        }
        u_new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_history_keeps_most_recent_entries() {
        let depth = 3;
        let mut aa = Anderson::new(depth, 1.0).unwrap();
        let mut u = NVector::from_vec(vec![0.0, 0.0]);
        for k in 0..8 {
            let g = NVector::from_vec(vec![k as f64, (k * k) as f64]);
            let f = g.sub(&u);
            u = aa.accelerate(&g, &f);
            assert!(aa.history_len() <= depth);
            assert_eq!(aa.history_len(), k.min(depth));
        }
        // newest dG is g_7 - g_6
        let newest = aa.history.back().unwrap();
        assert_eq!(newest.dg.to_vec(), vec![1.0, 13.0]);
        // oldest kept dG is g_5 - g_4
        let oldest = aa.history.front().unwrap();
        assert_eq!(oldest.dg.to_vec(), vec![1.0, 9.0]);
    }

    #[test]
    fn test_linear_map_solved_by_acceleration() {
        // G(u) = A u + b with spectral radius < 1; depth n makes AA exact after n+1 steps
        let a = [[0.5, 0.2], [0.1, 0.6]];
        let b = [1.0, 2.0];
        let G = |u: &NVector| {
            NVector::from_vec(vec![
                a[0][0] * u[0] + a[0][1] * u[1] + b[0],
                a[1][0] * u[0] + a[1][1] * u[1] + b[1],
            ])
        };
        // fixed point of (I - A) u = b
        let det = (1.0 - a[0][0]) * (1.0 - a[1][1]) - a[0][1] * a[1][0];
        let x0 = ((1.0 - a[1][1]) * b[0] + a[0][1] * b[1]) / det;
        let x1 = (a[1][0] * b[0] + (1.0 - a[0][0]) * b[1]) / det;

        let mut aa = Anderson::new(2, 1.0).unwrap();
        let mut u = NVector::zeros(2);
        for _ in 0..4 {
            let g = G(&u);
            let f = g.sub(&u);
            u = aa.accelerate(&g, &f);
        }
        assert_relative_eq!(u[0], x0, epsilon = 1e-8);
        assert_relative_eq!(u[1], x1, epsilon = 1e-8);
    }

    #[test]
    fn test_zero_depth_keeps_no_history() {
        let mut aa = Anderson::new(0, 1.0).unwrap();
        let mut u = NVector::from_vec(vec![1.0]);
        for _ in 0..3 {
            let g = u.scale(0.5);
            let f = g.sub(&u);
            u = aa.accelerate(&g, &f);
            assert_eq!(aa.history_len(), 0);
        }
        // plain fixed-point steps
        assert_eq!(u[0], 0.125);
    }

    #[test]
    fn test_damping_without_history() {
        let mut aa = Anderson::new(2, 0.5).unwrap();
        let u = NVector::from_vec(vec![0.0]);
        let g = NVector::from_vec(vec![2.0]);
        let f = g.sub(&u);
        // (1 - beta) u + beta g
        assert_eq!(aa.accelerate(&g, &f)[0], 1.0);
        aa.reset();
        assert_eq!(aa.history_len(), 0);
    }
}
