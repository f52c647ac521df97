//! Solvers for systems of nonlinear algebraic equations `F(u) = 0`.
/// Example
/// ```
/// use RustedNonlinear::numerical::Nonlinear_systems::NL_solver::NonlinearSolver;
/// use RustedNonlinear::numerical::Nonlinear_systems::config::Strategy;
/// use RustedNonlinear::numerical::Nonlinear_systems::problem::Problem;
/// use RustedNonlinear::somelinalg::LUsolver::LUsolver;
/// use RustedNonlinear::somelinalg::nvector::NVector;
///
/// // x^2 + y^2 - 10 = 0, x - y - 4 = 0
/// let mut problem = Problem::new(2, |u: &NVector| {
///     Ok(NVector::from_vec(vec![u[0] * u[0] + u[1] * u[1] - 10.0, u[0] - u[1] - 4.0]))
/// });
/// let mut solver =
///     NonlinearSolver::with_linear_solver(Strategy::BacktrackingLineSearch, Box::new(LUsolver::new()));
/// solver.set_loglevel(None).unwrap();
/// let u = solver.solve(&mut problem, NVector::from_vec(vec![1.0, 1.0])).unwrap();
/// assert!((u[0] - 3.0).abs() < 1e-6 && (u[1] + 1.0).abs() < 1e-6);
/// ```
pub mod NL_solver;
/// Anderson acceleration of fixed-point iterations
pub mod anderson;
pub mod config;
/// sign constraints on the solution components
pub mod constraints;
pub mod error;
/// difference-quotient Jacobian and Jacobian-vector products
pub mod jacobian_dq;
pub mod line_search;
pub mod problem;
