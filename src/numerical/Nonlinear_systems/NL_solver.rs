//! Nonlinear algebraic solver: Newton's method (full step or backtracking
//! line search), Picard iteration and fixed-point iteration, all with
//! optional Anderson acceleration.
//!
//! # Example
//! ```ignore
//! let mut problem = Problem::new(2, |u: &NVector| {
//!     Ok(NVector::from_vec(vec![u[0] * u[0] + u[1] * u[1] - 4.0, u[0] - u[1]]))
//! });
//! let mut solver = NonlinearSolver::with_linear_solver(
//!     Strategy::BacktrackingLineSearch,
//!     Box::new(LUsolver::new()),
//! );
//! let u = solver.solve(&mut problem, NVector::from_vec(vec![1.0, 0.5]))?;
//! ```
use crate::Utils::logger::init_logger;
use crate::Utils::timer::CustomTimer;
use crate::numerical::Nonlinear_systems::anderson::Anderson;
use crate::numerical::Nonlinear_systems::config::{EtaChoice, SolverConfig, Strategy};
use crate::numerical::Nonlinear_systems::constraints::{check_feasible, reduce_step};
use crate::numerical::Nonlinear_systems::error::{CallbackError, CallbackKind, SolverError};
use crate::numerical::Nonlinear_systems::jacobian_dq::{NewtonOperator, checked_eval, dq_jacobian};
use crate::numerical::Nonlinear_systems::line_search::{
    LineSearch, LineSearchOutcome, TrialPoint, relative_step_length,
};
use crate::numerical::Nonlinear_systems::problem::Problem;
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::linear_solver::{LinearOperator, LinearSolver, LinearSolverError, MatrixOperator};
use crate::somelinalg::nvector::NVector;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use tabled::{builder::Builder, settings::Style};

/// Counters of the most recent solve
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverStatistics {
    pub iterations: usize,
    pub residual_evals: usize,
    pub jacobian_evals: usize,
    pub jvp_evals: usize,
    pub linear_setups: usize,
    pub linear_iterations: usize,
    pub backtracks: usize,
    pub beta_failures: usize,
    pub recoverable_failures: usize,
    /// entries in the Anderson history when the solve ended
    pub anderson_history: usize,
    /// ||f_scale*F||_inf at the last accepted iterate
    pub final_fnorm: f64,
}

impl SolverStatistics {
    pub fn as_map(&self) -> HashMap<String, String> {
        let mut stats = HashMap::new();
        stats.insert("number of iterations".to_string(), self.iterations.to_string());
        stats.insert("residual evaluations".to_string(), self.residual_evals.to_string());
        stats.insert("Jacobian evaluations".to_string(), self.jacobian_evals.to_string());
        stats.insert("Jacobian-vector products".to_string(), self.jvp_evals.to_string());
        stats.insert("linear solver setups".to_string(), self.linear_setups.to_string());
        stats.insert("linear iterations".to_string(), self.linear_iterations.to_string());
        stats.insert("backtracks".to_string(), self.backtracks.to_string());
        stats.insert("beta condition failures".to_string(), self.beta_failures.to_string());
        stats.insert("recoverable failures".to_string(), self.recoverable_failures.to_string());
        stats.insert("Anderson history".to_string(), self.anderson_history.to_string());
        stats.insert("final residual norm".to_string(), format!("{:.3e}", self.final_fnorm));
        stats
    }
}

/// Everything that lives for exactly one `solve` call
struct SolveState {
    u: NVector,
    fu: NVector,
    /// ||f_scale*F(u)||_inf
    fnorm: f64,
    /// 0.5*||f_scale*F(u)||_2^2
    f1norm: f64,
    /// G(u), fixed-point iteration only
    g: Option<NVector>,
    u_scale: NVector,
    f_scale: NVector,
    jac: Option<DenseMatrix>,
    jac_current: bool,
    setup_done: bool,
    force_setup: bool,
    last_setup_iter: usize,
    max_step: f64,
    consecutive_max_steps: usize,
    consecutive_failures: usize,
    anderson: Option<Anderson>,
    eta: f64,
    sqrt_relfunc: f64,
    stats: SolverStatistics,
}

impl SolveState {
    fn f_norms(&self, f: &NVector) -> (f64, f64) {
        let l2 = f.wl2_norm(&self.f_scale);
        (f.wmax_norm(&self.f_scale), 0.5 * l2 * l2)
    }

    fn accept(&mut self, trial: TrialPoint) {
        self.u = trial.u;
        self.fu = trial.f;
        self.fnorm = trial.fnorm;
        self.f1norm = trial.f1norm;
        self.jac_current = false;
        self.consecutive_failures = 0;
        self.stats.final_fnorm = trial.fnorm;
    }

    fn note_recoverable(&mut self, max_failures: usize) -> Result<(), SolverError> {
        self.consecutive_failures += 1;
        self.stats.recoverable_failures += 1;
        if self.consecutive_failures > max_failures {
            return Err(SolverError::RepeatedRecoverableFailures {
                count: self.consecutive_failures,
            });
        }
        Ok(())
    }
}

/// Newton direction with the quantities the globalization needs
struct Direction {
    p: NVector,
    /// (f_scale*F).(f_scale*J*p)
    slope: f64,
    /// ||f_scale*J*p||_2
    sjp_norm: f64,
}

pub struct NonlinearSolver {
    config: SolverConfig,
    linear_solver: Option<Box<dyn LinearSolver>>,
    statistics: SolverStatistics,
    timer: CustomTimer,
    /// also write the log to a timestamped file
    pub log_to_file: bool,
}

impl NonlinearSolver {
    pub fn new(strategy: Strategy) -> NonlinearSolver {
        NonlinearSolver {
            config: SolverConfig::new(strategy),
            linear_solver: None,
            statistics: SolverStatistics::default(),
            timer: CustomTimer::new(),
            log_to_file: false,
        }
    }

    pub fn with_linear_solver(strategy: Strategy, linear_solver: Box<dyn LinearSolver>) -> NonlinearSolver {
        let mut solver = NonlinearSolver::new(strategy);
        solver.set_linear_solver(linear_solver);
        solver
    }

    pub fn from_config(config: SolverConfig) -> NonlinearSolver {
        NonlinearSolver {
            config,
            ..NonlinearSolver::new(Strategy::NewtonsMethod)
        }
    }

    ////////////////////////////SETTERS///////////////////////////////////
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.config.set_strategy(strategy);
    }
    pub fn set_stopping_tolerance(&mut self, tol: f64) -> Result<(), SolverError> {
        self.config.set_stopping_tolerance(tol)
    }
    pub fn set_step_stopping_tolerance(&mut self, tol: f64) -> Result<(), SolverError> {
        self.config.set_step_stopping_tolerance(tol)
    }
    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), SolverError> {
        self.config.set_max_iterations(max_iterations)
    }
    pub fn set_max_setup_calls(&mut self, max_setup_calls: usize) -> Result<(), SolverError> {
        self.config.set_max_setup_calls(max_setup_calls)
    }
    pub fn set_max_beta_failures(&mut self, max_beta_failures: usize) -> Result<(), SolverError> {
        self.config.set_max_beta_failures(max_beta_failures)
    }
    pub fn set_max_backtracks(&mut self, max_backtracks: usize) -> Result<(), SolverError> {
        self.config.set_max_backtracks(max_backtracks)
    }
    pub fn set_max_newton_step(&mut self, max_step: f64) -> Result<(), SolverError> {
        self.config.set_max_newton_step(max_step)
    }
    pub fn set_relative_function_error(&mut self, relfunc: f64) -> Result<(), SolverError> {
        self.config.set_relative_function_error(relfunc)
    }
    pub fn set_anderson(&mut self, depth: usize, delay: usize) {
        self.config.set_anderson(depth, delay);
    }
    pub fn set_damping(&mut self, beta: f64) -> Result<(), SolverError> {
        self.config.set_damping(beta)
    }
    pub fn set_eta_choice(&mut self, eta: EtaChoice) -> Result<(), SolverError> {
        self.config.set_eta_choice(eta)
    }
    pub fn set_max_recoverable_failures(&mut self, max: usize) -> Result<(), SolverError> {
        self.config.set_max_recoverable_failures(max)
    }
    pub fn set_loglevel(&mut self, level: Option<&str>) -> Result<(), SolverError> {
        self.config.set_loglevel(level)
    }
    pub fn set_linear_solver(&mut self, linear_solver: Box<dyn LinearSolver>) {
        self.linear_solver = Some(linear_solver);
    }

    ////////////////////////////GETTERS///////////////////////////////////
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
    pub fn strategy(&self) -> Strategy {
        self.config.strategy()
    }
    pub fn stopping_tolerance(&self) -> f64 {
        self.config.stopping_tolerance()
    }
    pub fn step_stopping_tolerance(&self) -> f64 {
        self.config.step_stopping_tolerance()
    }
    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations()
    }
    pub fn linear_solver_name(&self) -> Option<String> {
        self.linear_solver.as_ref().map(|ls| ls.name())
    }
    /// counters of the most recent solve, also kept after a failed one
    pub fn statistics(&self) -> &SolverStatistics {
        &self.statistics
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 MAIN
    //////////////////////////////////////////////////////////////////////////////////////////////
    /// Solves `F(u) = 0` (or `G(u) = u`) starting from `initial_guess`.
    /// Either the converged iterate or an error is returned, never a
    /// non-converged vector.
    pub fn solve(&mut self, problem: &mut Problem<'_>, initial_guess: NVector) -> Result<NVector, SolverError> {
        init_logger(self.config.loglevel(), self.log_to_file);
        self.timer.start();
        self.statistics = SolverStatistics::default();
        info!(
            "solving system of {} equations, strategy: {}, linear solver: {}",
            problem.dim(),
            self.config.strategy(),
            self.linear_solver_name().unwrap_or_else(|| "none".to_string())
        );
        self.validate(problem, &initial_guess)?;
        let mut state = self.init_state(problem, initial_guess)?;
        let result = match self.first_residual(problem, &mut state) {
            Ok(true) => {
                info!("initial guess already satisfies the stopping tolerance");
                Ok(state.u.clone())
            }
            Ok(false) => match self.config.strategy() {
                Strategy::NewtonsMethod | Strategy::BacktrackingLineSearch => {
                    self.newton_iterations(problem, &mut state)
                }
                Strategy::PicardIteration => self.picard_iterations(problem, &mut state),
                Strategy::FixedPointIteration => self.fixed_point_iterations(problem, &mut state),
            },
            Err(e) => Err(e),
        };
        state.stats.anderson_history = state.anderson.as_ref().map(|a| a.history_len()).unwrap_or(0);
        self.statistics = state.stats.clone();
        match &result {
            Ok(_) => info!(
                "converged in {} iterations, ||F|| = {:.3e}",
                self.statistics.iterations, self.statistics.final_fnorm
            ),
            Err(e) => error!("solve failed: {}", e),
        }
        self.calc_statistics();
        result
    }

    fn validate(&self, problem: &Problem<'_>, u0: &NVector) -> Result<(), SolverError> {
        let n = problem.dim();
        let strategy = self.config.strategy();
        let check_len = |what: &'static str, found: usize| {
            if found != n {
                Err(SolverError::DimensionMismatch { what, expected: n, found })
            } else {
                Ok(())
            }
        };
        check_len("initial guess", u0.len())?;
        if let Some(c) = problem.constraints() {
            check_len("constraints", c.len())?;
        }
        for (what, scale) in [("u_scale", &problem.u_scale), ("f_scale", &problem.f_scale)] {
            if let Some(scale) = scale {
                check_len(what, scale.len())?;
                if let Some((index, value)) = scale
                    .iter()
                    .enumerate()
                    .find(|(_, s)| !(s.is_finite() && **s > 0.0))
                {
                    return Err(SolverError::NonPositiveScale {
                        what,
                        index,
                        value: *value,
                    });
                }
            }
        }
        if strategy.requires_linear_solver() && self.linear_solver.is_none() {
            return Err(SolverError::MissingLinearSolver { strategy });
        }
        if problem.has_active_constraints() {
            if !strategy.supports_constraints() {
                return Err(SolverError::ConstraintsUnsupported { strategy });
            }
            if let Some(c) = problem.constraints() {
                check_feasible(u0, c)?;
            }
        }
        if strategy == Strategy::PicardIteration {
            if let Some(ls) = &self.linear_solver {
                if !ls.requires_matrix() {
                    return Err(SolverError::MatrixFreePicard { solver: ls.name() });
                }
            }
        }
        Ok(())
    }

    fn init_state(&self, problem: &Problem<'_>, u0: NVector) -> Result<SolveState, SolverError> {
        let n = problem.dim();
        let u_scale = problem.u_scale.clone().unwrap_or_else(|| NVector::from_element(n, 1.0));
        let f_scale = problem.f_scale.clone().unwrap_or_else(|| NVector::from_element(n, 1.0));
        let max_step = match self.config.max_newton_step() {
            Some(step) => step,
            None => {
                let norm = u0.wl2_norm(&u_scale);
                if norm > 0.0 { 1000.0 * norm } else { 1000.0 }
            }
        };
        let anderson = if self.config.anderson_depth() > 0 {
            Some(Anderson::new(self.config.anderson_depth(), self.config.damping())?)
        } else {
            None
        };
        let eta = match self.config.eta_choice() {
            EtaChoice::Constant(eta) => eta,
            _ => 0.1,
        };
        Ok(SolveState {
            fu: NVector::zeros(n),
            u: u0,
            fnorm: 0.0,
            f1norm: 0.0,
            g: None,
            u_scale,
            f_scale,
            jac: None,
            jac_current: false,
            setup_done: false,
            force_setup: false,
            last_setup_iter: 0,
            max_step,
            consecutive_max_steps: 0,
            consecutive_failures: 0,
            anderson,
            eta,
            sqrt_relfunc: self.config.sqrt_relfunc(),
            stats: SolverStatistics::default(),
        })
    }

    /// Evaluates F (or G) at the initial guess. Returns true if `u0` is
    /// already a solution.
    fn first_residual(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<bool, SolverError> {
        let first_failure = |kind: CallbackKind, e: CallbackError| match e {
            CallbackError::Recoverable(message) => SolverError::FirstResidualFailed { kind, message },
            CallbackError::Terminal(message) => SolverError::Callback { kind, message },
        };
        if self.config.strategy() == Strategy::FixedPointIteration {
            let u0 = state.u.clone();
            let g = self.eval_fixed_point(problem, state, &u0);
            let g = g.map_err(|(kind, e)| first_failure(kind, e))?;
            state.g = Some(g);
            return Ok(false);
        }
        self.timer.fun_tic();
        let f = checked_eval(&mut problem.residual, &state.u);
        self.timer.fun_tac();
        state.stats.residual_evals += 1;
        let f = f.map_err(|e| first_failure(CallbackKind::Residual, e))?;
        let (fnorm, f1norm) = state.f_norms(&f);
        state.fu = f;
        state.fnorm = fnorm;
        state.f1norm = f1norm;
        state.stats.final_fnorm = fnorm;
        info!("initial residual norm {:.3e}", fnorm);
        Ok(fnorm <= 0.01 * self.config.stopping_tolerance())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 EVALUATIONS
    //////////////////////////////////////////////////////////////////////////////////////////////
    /// F at a trial point. `Ok(None)` means a recoverable failure that was
    /// counted against the budget.
    fn trial_point(
        &mut self,
        problem: &mut Problem<'_>,
        state: &mut SolveState,
        u: &NVector,
    ) -> Result<Option<TrialPoint>, SolverError> {
        self.timer.fun_tic();
        let f = checked_eval(&mut problem.residual, u);
        self.timer.fun_tac();
        state.stats.residual_evals += 1;
        match f {
            Ok(f) => {
                let (fnorm, f1norm) = state.f_norms(&f);
                Ok(Some(TrialPoint {
                    u: u.clone(),
                    f,
                    fnorm,
                    f1norm,
                }))
            }
            Err(CallbackError::Recoverable(message)) => {
                warn!("recoverable residual failure: {}", message);
                state.note_recoverable(self.config.max_recoverable_failures())?;
                Ok(None)
            }
            Err(CallbackError::Terminal(message)) => Err(SolverError::Callback {
                kind: CallbackKind::Residual,
                message,
            }),
        }
    }

    /// G(u): the problem's fixed-point map, or u - F(u) without one
    fn eval_fixed_point(
        &mut self,
        problem: &mut Problem<'_>,
        state: &mut SolveState,
        u: &NVector,
    ) -> Result<NVector, (CallbackKind, CallbackError)> {
        self.timer.fun_tic();
        let result = match problem.fixed_point.as_mut() {
            Some(g) => checked_eval(g, u).map_err(|e| (CallbackKind::FixedPoint, e)),
            None => checked_eval(&mut problem.residual, u)
                .map(|f| u.sub(&f))
                .map_err(|e| (CallbackKind::Residual, e)),
        };
        self.timer.fun_tac();
        state.stats.residual_evals += 1;
        result
    }

    /// Jacobian (or Picard's L) at the current iterate: analytic if the
    /// problem has one, else forward differences
    fn eval_jacobian(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<DenseMatrix, CallbackError> {
        let n = state.u.len();
        self.timer.jac_tic();
        let jac = match problem.jacobian.as_mut() {
            Some(jac_fn) => jac_fn(&state.u, &state.fu).and_then(|jac| {
                if jac.shape() != (n, n) {
                    Err(CallbackError::terminal(format!(
                        "Jacobian has shape {:?}, expected ({}, {})",
                        jac.shape(),
                        n,
                        n
                    )))
                } else if !jac.as_dmatrix().iter().all(|x| x.is_finite()) {
                    Err(CallbackError::recoverable("non-finite Jacobian entries"))
                } else {
                    Ok(jac)
                }
            }),
            None => dq_jacobian(
                &mut problem.residual,
                &state.u,
                &state.fu,
                &state.u_scale,
                state.sqrt_relfunc,
            )
            .map(|(jac, nfe)| {
                state.stats.residual_evals += nfe;
                jac
            }),
        };
        self.timer.jac_tac();
        state.stats.jacobian_evals += 1;
        jac
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 LINEAR SOLVER
    //////////////////////////////////////////////////////////////////////////////////////////////
    fn needs_setup(&self, state: &SolveState, nni: usize) -> bool {
        !state.setup_done || state.force_setup || nni - state.last_setup_iter >= self.config.max_setup_calls()
    }

    fn setup_linear_solver(
        &mut self,
        problem: &mut Problem<'_>,
        state: &mut SolveState,
        nni: usize,
    ) -> Result<(), SolverError> {
        let strategy = self.config.strategy();
        let requires_matrix = match &self.linear_solver {
            Some(ls) => ls.requires_matrix(),
            None => return Err(SolverError::MissingLinearSolver { strategy }),
        };
        state.force_setup = false;
        state.last_setup_iter = nni;
        if requires_matrix {
            match self.eval_jacobian(problem, state) {
                Ok(jac) => state.jac = Some(jac),
                Err(CallbackError::Recoverable(message)) if state.jac.is_some() && state.setup_done => {
                    warn!("recoverable Jacobian failure ({}), keeping the previous Jacobian", message);
                    state.note_recoverable(self.config.max_recoverable_failures())?;
                    return Ok(());
                }
                Err(e) => {
                    return Err(SolverError::Callback {
                        kind: CallbackKind::Jacobian,
                        message: e.message().to_string(),
                    });
                }
            }
        }
        if let Some(ls) = self.linear_solver.as_mut() {
            self.timer.linear_system_tic();
            let res = ls.setup(if requires_matrix { state.jac.as_ref() } else { None });
            self.timer.linear_system_tac();
            res.map_err(SolverError::LinearSetupFailed)?;
        }
        debug!("linear solver set up at iteration {}", nni);
        state.stats.linear_setups += 1;
        state.setup_done = true;
        state.jac_current = true;
        Ok(())
    }

    /// Solves `J*p = rhs`. `Ok(None)`: recoverable failure with stale Jacobian
    /// information, a setup has been requested.
    fn linear_solve(
        &mut self,
        problem: &mut Problem<'_>,
        state: &mut SolveState,
        rhs: &NVector,
    ) -> Result<Option<NVector>, SolverError> {
        let strategy = self.config.strategy();
        let Some(ls) = self.linear_solver.as_mut() else {
            return Err(SolverError::MissingLinearSolver { strategy });
        };
        let tol = state.eta * rhs.l2_norm();
        self.timer.linear_system_tic();
        let result = if ls.requires_matrix() {
            match state.jac.as_ref() {
                Some(jac) => {
                    let mut op = MatrixOperator { matrix: jac };
                    ls.solve(&mut op, rhs, tol)
                }
                None => Err(LinearSolverError::NotSetUp),
            }
        } else {
            let mut op = NewtonOperator {
                residual: &mut problem.residual,
                jvp: problem.jvp.as_mut(),
                u: &state.u,
                fu: &state.fu,
                u_scale: &state.u_scale,
                sqrt_relfunc: state.sqrt_relfunc,
                njv: 0,
                nfe: 0,
            };
            let res = ls.solve(&mut op, rhs, tol);
            state.stats.jvp_evals += op.njv;
            state.stats.residual_evals += op.nfe;
            res
        };
        self.timer.linear_system_tac();
        state.stats.linear_iterations += ls.last_iterations();

        match result {
            Ok(p) => Ok(Some(p)),
            Err(LinearSolverError::Operator(CallbackError::Terminal(message))) => Err(SolverError::Callback {
                kind: if problem.has_jvp() {
                    CallbackKind::JacobianVectorProduct
                } else {
                    CallbackKind::Residual
                },
                message,
            }),
            Err(e) if e.is_recoverable() && !state.jac_current => {
                warn!("linear solve failed with stale Jacobian information ({}), refreshing", e);
                state.note_recoverable(self.config.max_recoverable_failures())?;
                state.force_setup = true;
                Ok(None)
            }
            Err(e) if e.is_recoverable() => Err(SolverError::LinearSolverNoRecovery(e)),
            Err(e) => Err(SolverError::LinearSolveFailed(e)),
        }
    }

    fn newton_direction(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<Option<Direction>, SolverError> {
        let rhs = state.fu.scale(-1.0);
        let Some(p) = self.linear_solve(problem, state, &rhs)? else {
            return Ok(None);
        };
        let matrix_free = self.linear_solver.as_ref().map(|ls| !ls.requires_matrix()).unwrap_or(false);
        let sf = state.fu.component_mul(&state.f_scale);
        // a direct solve gives J*p = -F exactly
        let jp = if matrix_free {
            let mut op = NewtonOperator {
                residual: &mut problem.residual,
                jvp: problem.jvp.as_mut(),
                u: &state.u,
                fu: &state.fu,
                u_scale: &state.u_scale,
                sqrt_relfunc: state.sqrt_relfunc,
                njv: 0,
                nfe: 0,
            };
            let jp = op.apply(&p);
            state.stats.jvp_evals += op.njv;
            state.stats.residual_evals += op.nfe;
            jp.unwrap_or_else(|e| {
                debug!("J*p unavailable ({}), using -F", e);
                rhs.clone()
            })
        } else {
            rhs
        };
        let sjp = jp.component_mul(&state.f_scale);
        Ok(Some(Direction {
            p,
            slope: sf.dot(&sjp),
            sjp_norm: sjp.l2_norm(),
        }))
    }

    /// Eisenstat-Walker forcing term for the next inexact solve
    fn update_eta(&self, state: &mut SolveState, fnorm_old: f64, fnorm_new: f64, slope: f64, sjp_norm: f64) {
        if fnorm_old == 0.0 {
            return;
        }
        const ETA_MIN: f64 = 1e-4;
        const ETA_MAX: f64 = 0.9;
        let eta = match self.config.eta_choice() {
            EtaChoice::Constant(_) => return,
            EtaChoice::EisenstatWalker1 => {
                let linmodel = (fnorm_old * fnorm_old + 2.0 * slope + sjp_norm * sjp_norm).max(0.0).sqrt();
                let eta = (fnorm_new - linmodel).abs() / fnorm_old;
                let safe = state.eta.powf(0.5 * (1.0 + 5.0_f64.sqrt()));
                if safe > 0.1 { eta.max(safe) } else { eta }
            }
            EtaChoice::EisenstatWalker2 { gamma, alpha } => {
                let eta = gamma * (fnorm_new / fnorm_old).powf(alpha);
                let safe = gamma * state.eta.powf(alpha);
                if safe > 0.1 { eta.max(safe) } else { eta }
            }
        };
        state.eta = eta.clamp(ETA_MIN, ETA_MAX);
        debug!("forcing term eta = {:.3e}", state.eta);
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 NEWTON
    //////////////////////////////////////////////////////////////////////////////////////////////
    fn newton_iterations(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<NVector, SolverError> {
        let strategy = self.config.strategy();
        let fnormtol = self.config.stopping_tolerance();
        let scsteptol = self.config.step_stopping_tolerance();
        let constraints = problem.constraints.clone().filter(|_| problem.has_active_constraints());
        loop {
            if state.stats.iterations >= self.config.max_iterations() {
                return Err(SolverError::MaxIterationsReached {
                    iterations: state.stats.iterations,
                    fnorm: state.fnorm,
                });
            }
            let nni = state.stats.iterations + 1;
            if self.needs_setup(state, nni) {
                self.setup_linear_solver(problem, state, nni)?;
            }
            let jac_was_current = state.jac_current;
            let Some(Direction {
                mut p,
                mut slope,
                mut sjp_norm,
            }) = self.newton_direction(problem, state)?
            else {
                continue;
            };

            // step capping and constraints
            let mut pnorm = p.wl2_norm(&state.u_scale);
            if pnorm > state.max_step {
                let ratio = state.max_step / pnorm;
                debug!("Newton step longer than the maximum, scaled by {:.3e}", ratio);
                p.scale_mut(ratio);
                slope *= ratio;
                sjp_norm *= ratio;
                pnorm = state.max_step;
            }
            let mut constrained = false;
            if let Some(c) = &constraints {
                let factor = reduce_step(&state.u, &mut p, c);
                if factor < 1.0 {
                    constrained = true;
                    slope *= factor;
                    sjp_norm *= factor;
                    pnorm *= factor;
                }
            }
            if constrained && pnorm == 0.0 {
                // u sits on a bound and the direction points outward
                if !jac_was_current {
                    info!("constraints block the step with a stale Jacobian at iteration {}, refreshing", nni);
                    state.force_setup = true;
                    continue;
                }
                return Err(SolverError::ConstraintStagnation { iteration: nni });
            }

            // globalization
            let (mut trial, rl, max_step_taken) = match strategy {
                Strategy::BacktrackingLineSearch => {
                    let rlength = relative_step_length(&state.u, &p, &state.u_scale);
                    let rlmin = scsteptol / rlength;
                    let line_search = LineSearch::new(self.config.max_backtracks());
                    let u = state.u.clone();
                    let (f1norm, max_step) = (state.f1norm, state.max_step);
                    let outcome = line_search.search(&u, &p, pnorm, f1norm, slope, rlmin, max_step, |x: &NVector| {
                        self.trial_point(problem, state, x)
                    })?;
                    match outcome {
                        LineSearchOutcome::Accepted {
                            trial,
                            rl,
                            max_step_taken,
                            beta_failed,
                            backtracks,
                        } => {
                            state.stats.backtracks += backtracks;
                            if beta_failed {
                                state.stats.beta_failures += 1;
                            }
                            (trial, rl, max_step_taken)
                        }
                        LineSearchOutcome::StepTooSmall { backtracks } => {
                            state.stats.backtracks += backtracks;
                            if state.jac_current {
                                return Err(SolverError::LineSearchNonConvergence { iteration: nni });
                            }
                            info!("line search failed with a stale Jacobian at iteration {}, refreshing", nni);
                            state.force_setup = true;
                            continue;
                        }
                    }
                }
                _ => {
                    // full step, halved after a recoverable residual failure
                    let mut rl = 1.0;
                    let trial = loop {
                        let unew = NVector::linear_sum(1.0, &state.u, rl, &p);
                        match self.trial_point(problem, state, &unew)? {
                            Some(t) => break t,
                            None => rl *= 0.5,
                        }
                    };
                    (trial, rl, rl * pnorm > 0.99 * state.max_step)
                }
            };

            // Anderson acceleration with the Newton update as the map
            if let Some(aa) = state.anderson.as_mut() {
                if nni > self.config.anderson_delay() {
                    let f_aa = trial.u.sub(&state.u);
                    let ua = aa.accelerate(&trial.u, &f_aa);
                    let mut step = ua.sub(&state.u);
                    if let Some(c) = &constraints {
                        reduce_step(&state.u, &mut step, c);
                    }
                    let ua = state.u.add(&step);
                    if let Some(t) = self.trial_point(problem, state, &ua)? {
                        trial = t;
                    }
                }
            }

            let step = trial.u.sub(&state.u);
            let fnorm_l2_old = (2.0 * state.f1norm).sqrt();
            let fnorm_l2_new = (2.0 * trial.f1norm).sqrt();
            self.update_eta(state, fnorm_l2_old, fnorm_l2_new, slope * rl, sjp_norm * rl);
            state.accept(trial);
            state.stats.iterations = nni;
            info!(
                "iteration {}: ||F|| = {:.3e}, rl = {:.3e}, ||p|| = {:.3e}",
                nni,
                state.fnorm,
                rl,
                pnorm * rl
            );

            if state.fnorm <= fnormtol {
                return Ok(state.u.clone());
            }
            if relative_step_length(&state.u, &step, &state.u_scale) <= scsteptol {
                if !jac_was_current {
                    info!("step below tolerance with a stale Jacobian, refreshing");
                    state.force_setup = true;
                } else if constrained {
                    // a step shortened by the constraints is not a converged one
                    return Err(SolverError::ConstraintStagnation { iteration: nni });
                } else {
                    info!("scaled step length below the step tolerance");
                    return Ok(state.u.clone());
                }
            }
            if max_step_taken {
                state.consecutive_max_steps += 1;
                if state.consecutive_max_steps >= 5 {
                    return Err(SolverError::MaxNewtonStep5x { iteration: nni });
                }
            } else {
                state.consecutive_max_steps = 0;
            }
            if state.stats.beta_failures > self.config.max_beta_failures() {
                return Err(SolverError::LineSearchBetaFailures {
                    failures: state.stats.beta_failures,
                });
            }
        }
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 PICARD
    //////////////////////////////////////////////////////////////////////////////////////////////
    fn picard_iterations(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<NVector, SolverError> {
        let fnormtol = self.config.stopping_tolerance();
        let beta = self.config.damping();
        loop {
            if state.stats.iterations >= self.config.max_iterations() {
                return Err(SolverError::MaxIterationsReached {
                    iterations: state.stats.iterations,
                    fnorm: state.fnorm,
                });
            }
            let nni = state.stats.iterations + 1;
            if self.needs_setup(state, nni) {
                self.setup_linear_solver(problem, state, nni)?;
            }
            let rhs = state.fu.scale(-1.0);
            let Some(delta) = self.linear_solve(problem, state, &rhs)? else {
                continue;
            };
            let g = state.u.add(&delta);
            let mut unew = match state.anderson.as_mut() {
                Some(aa) if nni > self.config.anderson_delay() => aa.accelerate(&g, &delta),
                _ => NVector::linear_sum(1.0, &state.u, beta, &delta),
            };
            let trial = loop {
                match self.trial_point(problem, state, &unew)? {
                    Some(t) => break t,
                    None => unew = NVector::linear_sum(0.5, &unew, 0.5, &state.u),
                }
            };
            state.accept(trial);
            state.stats.iterations = nni;
            info!("Picard iteration {}: ||F|| = {:.3e}", nni, state.fnorm);
            if state.fnorm <= fnormtol {
                return Ok(state.u.clone());
            }
        }
    }

    //////////////////////////////////////////////////////////////////////////////////////////////
    //                 FIXED POINT
    //////////////////////////////////////////////////////////////////////////////////////////////
    fn fixed_point_iterations(&mut self, problem: &mut Problem<'_>, state: &mut SolveState) -> Result<NVector, SolverError> {
        let steptol = self.config.step_stopping_tolerance();
        let beta = self.config.damping();
        let max_failures = self.config.max_recoverable_failures();
        loop {
            let nni = state.stats.iterations + 1;
            if nni > self.config.max_iterations() {
                return Err(SolverError::MaxIterationsReached {
                    iterations: state.stats.iterations,
                    fnorm: state.fnorm,
                });
            }
            let g = match state.g.take() {
                Some(g) => g,
                None => {
                    let u = state.u.clone();
                    self.eval_fixed_point(problem, state, &u).map_err(|(kind, e)| SolverError::Callback {
                        kind,
                        message: e.message().to_string(),
                    })?
                }
            };
            let f = g.sub(&state.u);
            let mut unew = match state.anderson.as_mut() {
                Some(aa) if nni > self.config.anderson_delay() => aa.accelerate(&g, &f),
                _ => NVector::linear_sum(1.0 - beta, &state.u, beta, &g),
            };
            let step_norm = unew.sub(&state.u).wmax_norm(&state.f_scale);
            state.stats.iterations = nni;
            state.fnorm = f.wmax_norm(&state.f_scale);
            state.stats.final_fnorm = state.fnorm;
            info!("fixed-point iteration {}: ||u_new - u|| = {:.3e}", nni, step_norm);
            if step_norm <= steptol {
                return Ok(unew);
            }
            // G at the new iterate, backing off toward u on recoverable failures
            let g_new = loop {
                match self.eval_fixed_point(problem, state, &unew) {
                    Ok(g) => break g,
                    Err((kind, CallbackError::Terminal(message))) => {
                        return Err(SolverError::Callback { kind, message });
                    }
                    Err((_, CallbackError::Recoverable(message))) => {
                        warn!("recoverable fixed-point failure: {}", message);
                        state.note_recoverable(max_failures)?;
                        unew = NVector::linear_sum(0.5, &unew, 0.5, &state.u);
                    }
                }
            };
            state.u = unew;
            state.g = Some(g_new);
            state.consecutive_failures = 0;
        }
    }

    fn calc_statistics(&self) {
        let mut stats = self.statistics.as_map();
        stats.insert(
            "linear solver".to_string(),
            self.linear_solver_name().unwrap_or_else(|| "-".to_string()),
        );
        let mut table = Builder::from(stats).build();
        table.with(Style::modern_rounded());
        info!("\n \n CALC STATISTICS \n \n {}", table.to_string());
        let mut timer_table = Builder::from(self.timer.get_all()).build();
        timer_table.with(Style::modern_rounded());
        info!("\n \n TIMER \n \n {}", timer_table.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::somelinalg::LUsolver::LUsolver;
    use approx::assert_relative_eq;

    fn lu() -> Box<dyn LinearSolver> {
        Box::new(LUsolver::new())
    }

    #[test]
    fn test_zero_residual_at_root() {
        let mut problem = Problem::new(2, |u: &NVector| {
            Ok(NVector::from_vec(vec![u[0] - 1.0, u[1] + 2.0]))
        });
        let mut solver = NonlinearSolver::with_linear_solver(Strategy::NewtonsMethod, lu());
        let u = solver.solve(&mut problem, NVector::from_vec(vec![1.0, -2.0])).unwrap();
        assert_eq!(u.to_vec(), vec![1.0, -2.0]);
        assert!(solver.statistics().iterations <= 1);
    }

    #[test]
    fn test_linear_problem_one_newton_iteration() {
        // A u - b
        let A = DenseMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0]);
        let b = NVector::from_vec(vec![2.0, 4.0, 10.0]);
        let (A2, b2) = (A.clone(), b.clone());
        let mut problem = Problem::new(3, move |u: &NVector| Ok(A2.matvec(u).sub(&b2)))
            .with_jacobian(move |_u: &NVector, _f: &NVector| Ok(A.clone()));
        let mut solver = NonlinearSolver::with_linear_solver(Strategy::NewtonsMethod, lu());
        let u = solver.solve(&mut problem, NVector::zeros(3)).unwrap();
        assert_eq!(solver.statistics().iterations, 1);
        assert_relative_eq!(u[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(u[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(u[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_max_iterations_reached() {
        // x^2 + 1 has no real root
        let mut problem = Problem::new(1, |u: &NVector| Ok(NVector::from_vec(vec![u[0] * u[0] + 1.0])));
        let mut solver = NonlinearSolver::with_linear_solver(Strategy::NewtonsMethod, lu());
        solver.set_max_iterations(15).unwrap();
        let err = solver.solve(&mut problem, NVector::from_vec(vec![0.7])).unwrap_err();
        assert!(matches!(
            err,
            SolverError::MaxIterationsReached { .. }
                | SolverError::MaxNewtonStep5x { .. }
                | SolverError::LinearSetupFailed(_)
                | SolverError::LinearSolveFailed(_)
        ));
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_statistics_table_keys() {
        let stats = SolverStatistics {
            iterations: 3,
            ..SolverStatistics::default()
        };
        let map = stats.as_map();
        assert_eq!(map["number of iterations"], "3");
        assert!(map.contains_key("Anderson history"));
    }
}
