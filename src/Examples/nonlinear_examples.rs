//! A collection of nonlinear test problems with known solutions, used by the
//! binary, the benchmarks and the scenario tests.
use crate::numerical::Nonlinear_systems::NL_solver::NonlinearSolver;
use crate::numerical::Nonlinear_systems::config::Strategy;
use crate::numerical::Nonlinear_systems::error::{CallbackError, SolverError};
use crate::numerical::Nonlinear_systems::problem::Problem;
use crate::somelinalg::GMRESapi::GMRESsolver;
use crate::somelinalg::LUsolver::LUsolver;
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::nvector::NVector;
use std::f64::consts::{E, PI};
use strum_macros::{Display, EnumIter};

/*
Robertson chemical kinetics, one backward-Euler step of size h = 0.1 from
y = [1, 0, 0] with the reaction rate 3e2 for the 2y2 -> y2 + y3 reaction:
  F(u) = [ u1 - 1 - h*r(u),
           u2 + h*r(u) + h*300*u2^2,
           u3 - h*300*u2^2 ],   r(u) = -0.04*u1 + 1e4*u2*u3
written as the fixed point u = G(u) = u - F(u).

Ferraris-Tronconi: two equations with bounds 0.25 <= x1 <= 1, 1.5 <= x2 <= 2*pi
  0.5*sin(x1*x2) - 0.25*x2/pi - 0.5*x1 = 0
  (1 - 0.25/pi)*(exp(2*x1) - e) + e*x2/pi - 2*e*x1 = 0
The bounds become sign constraints on four slack variables
  l1 = x1 - 0.25 >= 0, L1 = x1 - 1 <= 0, l2 = x2 - 1.5 >= 0, L2 = x2 - 2*pi <= 0
Two solutions: (0.29945, 2.83693) and (0.5, pi).
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum NonlinearExample {
    /// fixed-point iteration on one implicit Euler step of the Robertson system
    Robertson,
    /// Newton with constraints from the lower bounds
    FerrarisTronconiLower,
    /// Newton with constraints from the center of the box
    FerrarisTronconiCenter,
    /// x^2 + y^2 - 10 = 0, x - y - 4 = 0
    CircleLine,
    /// tridiagonal linear system solved by matrix-free GMRES
    LinearSystem,
}

const H: f64 = 0.1;

fn robertson_rate(u: &NVector) -> f64 {
    -0.04 * u[0] + 1.0e4 * u[1] * u[2]
}

pub fn robertson_residual(u: &NVector) -> Result<NVector, CallbackError> {
    let r = robertson_rate(u);
    let q = 300.0 * u[1] * u[1];
    Ok(NVector::from_vec(vec![
        u[0] - 1.0 - H * r,
        u[1] + H * r + H * q,
        u[2] - H * q,
    ]))
}

pub fn robertson_fixed_point(u: &NVector) -> Result<NVector, CallbackError> {
    let r = robertson_rate(u);
    let q = 300.0 * u[1] * u[1];
    Ok(NVector::from_vec(vec![1.0 + H * r, -H * r - H * q, H * q]))
}

pub fn ferraris_tronconi_residual(u: &NVector) -> Result<NVector, CallbackError> {
    let (x1, x2) = (u[0], u[1]);
    Ok(NVector::from_vec(vec![
        0.5 * (x1 * x2).sin() - 0.25 * x2 / PI - 0.5 * x1,
        (1.0 - 0.25 / PI) * ((2.0 * x1).exp() - E) + E * x2 / PI - 2.0 * E * x1,
        u[2] - x1 + 0.25,
        u[3] - x1 + 1.0,
        u[4] - x2 + 1.5,
        u[5] - x2 + 2.0 * PI,
    ]))
}

pub fn ferraris_tronconi_jacobian(u: &NVector, _f: &NVector) -> Result<DenseMatrix, CallbackError> {
    let (x1, x2) = (u[0], u[1]);
    let mut J = DenseMatrix::zeros(6, 6);
    J[(0, 0)] = 0.5 * (x1 * x2).cos() * x2 - 0.5;
    J[(0, 1)] = 0.5 * (x1 * x2).cos() * x1 - 0.25 / PI;
    J[(1, 0)] = 2.0 * (1.0 - 0.25 / PI) * (2.0 * x1).exp() - 2.0 * E;
    J[(1, 1)] = E / PI;
    for (row, x, slack) in [(2, 0, 2), (3, 0, 3), (4, 1, 4), (5, 1, 5)] {
        J[(row, x)] = -1.0;
        J[(row, slack)] = 1.0;
    }
    Ok(J)
}

/// initial guess with the slack variables consistent with (x1, x2)
pub fn ferraris_tronconi_guess(x1: f64, x2: f64) -> NVector {
    NVector::from_vec(vec![x1, x2, x1 - 0.25, x1 - 1.0, x2 - 1.5, x2 - 2.0 * PI])
}

pub fn circle_line_residual(u: &NVector) -> Result<NVector, CallbackError> {
    Ok(NVector::from_vec(vec![
        u[0] * u[0] + u[1] * u[1] - 10.0,
        u[0] - u[1] - 4.0,
    ]))
}

const LINEAR_DIM: usize = 20;

/// tridiagonal, diagonally dominant, nonsymmetric
pub fn linear_system_matrix() -> DenseMatrix {
    let n = LINEAR_DIM;
    let mut A = DenseMatrix::zeros(n, n);
    for i in 0..n {
        A[(i, i)] = 4.0;
        if i + 1 < n {
            A[(i, i + 1)] = -1.0;
            A[(i + 1, i)] = -0.5;
        }
    }
    A
}

impl NonlinearExample {
    pub fn dim(&self) -> usize {
        match self {
            NonlinearExample::Robertson => 3,
            NonlinearExample::FerrarisTronconiLower | NonlinearExample::FerrarisTronconiCenter => 6,
            NonlinearExample::CircleLine => 2,
            NonlinearExample::LinearSystem => LINEAR_DIM,
        }
    }

    pub fn problem(&self) -> Problem<'static> {
        match self {
            NonlinearExample::Robertson => {
                Problem::new(3, robertson_residual).with_fixed_point(robertson_fixed_point)
            }
            NonlinearExample::FerrarisTronconiLower | NonlinearExample::FerrarisTronconiCenter => {
                Problem::new(6, ferraris_tronconi_residual)
                    .with_jacobian(ferraris_tronconi_jacobian)
                    .with_constraint_codes(&[0, 0, 1, -1, 1, -1])
            }
            NonlinearExample::CircleLine => Problem::new(2, circle_line_residual),
            NonlinearExample::LinearSystem => {
                let A = linear_system_matrix();
                // exact solution u_i = 1
                let b = A.matvec(&NVector::from_element(LINEAR_DIM, 1.0));
                Problem::new(LINEAR_DIM, move |u: &NVector| Ok(A.matvec(u).sub(&b)))
            }
        }
    }

    pub fn initial_guess(&self) -> NVector {
        match self {
            NonlinearExample::Robertson => NVector::from_vec(vec![1.0, 0.0, 0.0]),
            NonlinearExample::FerrarisTronconiLower => ferraris_tronconi_guess(0.25, 1.5),
            NonlinearExample::FerrarisTronconiCenter => ferraris_tronconi_guess(0.625, 0.5 * (1.5 + 2.0 * PI)),
            NonlinearExample::CircleLine => NVector::from_vec(vec![1.0, 1.0]),
            NonlinearExample::LinearSystem => NVector::zeros(LINEAR_DIM),
        }
    }

    /// known solution, only the leading components for Ferraris-Tronconi
    pub fn reference_solution(&self) -> Vec<f64> {
        match self {
            NonlinearExample::Robertson => vec![0.99679, 0.00295, 0.00026],
            NonlinearExample::FerrarisTronconiLower => vec![0.29945, 2.83693],
            NonlinearExample::FerrarisTronconiCenter => vec![0.5, PI],
            NonlinearExample::CircleLine => vec![3.0, -1.0],
            NonlinearExample::LinearSystem => vec![1.0; LINEAR_DIM],
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            NonlinearExample::Robertson => Strategy::FixedPointIteration,
            NonlinearExample::FerrarisTronconiLower
            | NonlinearExample::FerrarisTronconiCenter
            | NonlinearExample::CircleLine
            | NonlinearExample::LinearSystem => Strategy::NewtonsMethod,
        }
    }

    /// solver configured the way the example is meant to be run
    pub fn solver(&self, loglevel: Option<&str>) -> Result<NonlinearSolver, SolverError> {
        let mut solver = NonlinearSolver::new(self.strategy());
        solver.set_loglevel(loglevel)?;
        match self {
            NonlinearExample::Robertson => {}
            NonlinearExample::FerrarisTronconiLower | NonlinearExample::FerrarisTronconiCenter => {
                solver.set_linear_solver(Box::new(LUsolver::new()));
                solver.set_max_setup_calls(1)?;
                solver.set_stopping_tolerance(1e-10)?;
            }
            NonlinearExample::CircleLine => {
                solver.set_linear_solver(Box::new(LUsolver::new()));
            }
            NonlinearExample::LinearSystem => {
                solver.set_linear_solver(Box::new(GMRESsolver::new(LINEAR_DIM, 2)));
            }
        }
        Ok(solver)
    }

    pub fn solve(&self, loglevel: Option<&str>) -> Result<NVector, SolverError> {
        let mut solver = self.solver(loglevel)?;
        let mut problem = self.problem();
        solver.solve(&mut problem, self.initial_guess())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn test_residuals_vanish_at_reference_solutions() {
        let f = ferraris_tronconi_residual(&ferraris_tronconi_guess(0.5, PI)).unwrap();
        assert!(f.max_norm() < 1e-12);
        let f = circle_line_residual(&NVector::from_vec(vec![3.0, -1.0])).unwrap();
        assert_eq!(f.max_norm(), 0.0);
        // Robertson: G(u) = u - F(u)
        let u = NVector::from_vec(vec![0.9, 0.01, 0.09]);
        let g = robertson_fixed_point(&u).unwrap();
        let f = robertson_residual(&u).unwrap();
        for i in 0..3 {
            assert_relative_eq!(g[i], u[i] - f[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn test_robertson_step_conserves_mass() {
        // the residuals sum to u1 + u2 + u3 - 1 at any point
        for u in [vec![0.9, 0.01, 0.09], vec![0.5, 0.2, 0.1], vec![1.0, 0.0, 0.0]] {
            let u = NVector::from_vec(u);
            let f = robertson_residual(&u).unwrap();
            assert_relative_eq!(f[0] + f[1] + f[2], u[0] + u[1] + u[2] - 1.0, epsilon = 1e-13);
        }
        let u = NVector::from_vec(vec![0.99679, 0.00295, 0.00026]);
        assert_relative_eq!(u[0] + u[1] + u[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_catalogue_is_consistent() {
        for example in NonlinearExample::iter() {
            assert_eq!(example.initial_guess().len(), example.dim());
            assert_eq!(example.problem().dim(), example.dim());
            assert!(example.solver(None).is_ok());
        }
    }
}
