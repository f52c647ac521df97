use crate::numerical::Nonlinear_systems::error::SolverError;
use strum_macros::{Display, EnumIter, EnumString};

/// Global strategy of the nonlinear iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub enum Strategy {
    /// full Newton step, lambda = 1
    #[strum(serialize = "newton")]
    NewtonsMethod,
    /// Newton direction damped by an Armijo-Goldstein backtracking line search
    #[strum(serialize = "linesearch")]
    BacktrackingLineSearch,
    /// u_new = u - L^-1 F(u), L is the matrix returned by the Jacobian function
    #[strum(serialize = "picard")]
    PicardIteration,
    /// u_new = G(u)
    #[strum(serialize = "fixedpoint")]
    FixedPointIteration,
}

impl Strategy {
    pub fn is_newton(&self) -> bool {
        matches!(self, Strategy::NewtonsMethod | Strategy::BacktrackingLineSearch)
    }

    pub fn requires_linear_solver(&self) -> bool {
        !matches!(self, Strategy::FixedPointIteration)
    }

    pub fn supports_constraints(&self) -> bool {
        self.is_newton()
    }
}

/// Forcing term of the inexact Newton method: the linear system is solved to
/// `eta * ||F||`. Only used with iterative linear solvers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EtaChoice {
    Constant(f64),
    /// eta_k = | ||F(u_k)|| - ||F(u_k-1) + J(u_k-1) p_k-1|| | / ||F(u_k-1)||
    EisenstatWalker1,
    /// eta_k = gamma * (||F(u_k)|| / ||F(u_k-1)||)^alpha
    EisenstatWalker2 { gamma: f64, alpha: f64 },
}

impl Default for EtaChoice {
    fn default() -> Self {
        EtaChoice::EisenstatWalker1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub(crate) strategy: Strategy,
    /// scaled residual tolerance, ||fscale*F||_inf
    pub(crate) stopping_tolerance: f64,
    /// scaled step tolerance
    pub(crate) step_stopping_tolerance: f64,
    pub(crate) max_iterations: usize,
    /// nonlinear iterations between two linear solver setups (1 = exact Newton)
    pub(crate) max_setup_calls: usize,
    pub(crate) max_beta_failures: usize,
    /// line search backtracking budget per nonlinear iteration
    pub(crate) max_backtracks: usize,
    /// None -> 1000*||u_scale*u0||
    pub(crate) max_newton_step: Option<f64>,
    /// relative error in F; None -> machine epsilon
    pub(crate) relative_function_error: Option<f64>,
    pub(crate) anderson_depth: usize,
    pub(crate) anderson_delay: usize,
    pub(crate) damping: f64,
    pub(crate) max_recoverable_failures: usize,
    pub(crate) eta_choice: EtaChoice,
    pub(crate) loglevel: Option<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            strategy: Strategy::NewtonsMethod,
            stopping_tolerance: f64::EPSILON.powf(1.0 / 3.0),
            step_stopping_tolerance: f64::EPSILON.powf(2.0 / 3.0),
            max_iterations: 200,
            max_setup_calls: 10,
            max_beta_failures: 10,
            max_backtracks: 20,
            max_newton_step: None,
            relative_function_error: None,
            anderson_depth: 0,
            anderson_delay: 0,
            damping: 1.0,
            max_recoverable_failures: 5,
            eta_choice: EtaChoice::default(),
            loglevel: Some("warn".to_string()),
        }
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), SolverError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SolverError::invalid_config(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

fn check_nonzero(name: &str, value: usize) -> Result<(), SolverError> {
    if value > 0 {
        Ok(())
    } else {
        Err(SolverError::invalid_config(format!("{} must be at least 1", name)))
    }
}

/// Every setter validates its argument. An invalid value is rejected with
/// `SolverError::InvalidConfig` and the previous value is kept.
impl SolverConfig {
    pub fn new(strategy: Strategy) -> SolverConfig {
        SolverConfig {
            strategy,
            ..SolverConfig::default()
        }
    }

    ////////////////////////////SETTERS///////////////////////////////////
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn set_stopping_tolerance(&mut self, tol: f64) -> Result<(), SolverError> {
        check_positive("stopping tolerance", tol)?;
        self.stopping_tolerance = tol;
        Ok(())
    }

    pub fn set_step_stopping_tolerance(&mut self, tol: f64) -> Result<(), SolverError> {
        check_positive("step stopping tolerance", tol)?;
        self.step_stopping_tolerance = tol;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), SolverError> {
        check_nonzero("max iterations", max_iterations)?;
        self.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_max_setup_calls(&mut self, max_setup_calls: usize) -> Result<(), SolverError> {
        check_nonzero("max setup calls", max_setup_calls)?;
        self.max_setup_calls = max_setup_calls;
        Ok(())
    }

    pub fn set_max_beta_failures(&mut self, max_beta_failures: usize) -> Result<(), SolverError> {
        check_nonzero("max beta condition failures", max_beta_failures)?;
        self.max_beta_failures = max_beta_failures;
        Ok(())
    }

    pub fn set_max_backtracks(&mut self, max_backtracks: usize) -> Result<(), SolverError> {
        check_nonzero("max backtracks", max_backtracks)?;
        self.max_backtracks = max_backtracks;
        Ok(())
    }

    pub fn set_max_newton_step(&mut self, max_step: f64) -> Result<(), SolverError> {
        check_positive("max Newton step", max_step)?;
        self.max_newton_step = Some(max_step);
        Ok(())
    }

    pub fn set_relative_function_error(&mut self, relfunc: f64) -> Result<(), SolverError> {
        check_positive("relative function error", relfunc)?;
        self.relative_function_error = Some(relfunc);
        Ok(())
    }

    /// depth 0 switches acceleration off; `delay` iterations run unaccelerated first
    pub fn set_anderson(&mut self, depth: usize, delay: usize) {
        self.anderson_depth = depth;
        self.anderson_delay = delay;
    }

    pub fn set_damping(&mut self, beta: f64) -> Result<(), SolverError> {
        if !(beta > 0.0 && beta <= 1.0) {
            return Err(SolverError::invalid_config(format!(
                "damping must be in (0, 1], got {}",
                beta
            )));
        }
        self.damping = beta;
        Ok(())
    }

    pub fn set_max_recoverable_failures(&mut self, max: usize) -> Result<(), SolverError> {
        check_nonzero("max recoverable failures", max)?;
        self.max_recoverable_failures = max;
        Ok(())
    }

    pub fn set_eta_choice(&mut self, eta: EtaChoice) -> Result<(), SolverError> {
        match eta {
            EtaChoice::Constant(e) if !(e > 0.0 && e < 1.0) => {
                return Err(SolverError::invalid_config(format!(
                    "constant eta must be in (0, 1), got {}",
                    e
                )));
            }
            EtaChoice::EisenstatWalker2 { gamma, alpha }
                if !(gamma > 0.0 && gamma <= 1.0 && alpha > 1.0 && alpha <= 2.0) =>
            {
                return Err(SolverError::invalid_config(
                    "Eisenstat-Walker choice 2 needs gamma in (0, 1] and alpha in (1, 2]",
                ));
            }
            _ => {}
        }
        self.eta_choice = eta;
        Ok(())
    }

    /// "debug", "info", "warn", "error", "off" or "none"
    pub fn set_loglevel(&mut self, level: Option<&str>) -> Result<(), SolverError> {
        if let Some(level) = level {
            let level = level.to_lowercase();
            if !matches!(level.as_str(), "debug" | "info" | "warn" | "error" | "off" | "none") {
                return Err(SolverError::invalid_config(format!(
                    "loglevel must be debug, info, warn, error or off, got {}",
                    level
                )));
            }
            self.loglevel = Some(level);
        } else {
            self.loglevel = None;
        }
        Ok(())
    }

    ////////////////////////////GETTERS///////////////////////////////////
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }
    pub fn stopping_tolerance(&self) -> f64 {
        self.stopping_tolerance
    }
    pub fn step_stopping_tolerance(&self) -> f64 {
        self.step_stopping_tolerance
    }
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
    pub fn max_setup_calls(&self) -> usize {
        self.max_setup_calls
    }
    pub fn max_beta_failures(&self) -> usize {
        self.max_beta_failures
    }
    pub fn max_backtracks(&self) -> usize {
        self.max_backtracks
    }
    pub fn max_newton_step(&self) -> Option<f64> {
        self.max_newton_step
    }
    pub fn relative_function_error(&self) -> Option<f64> {
        self.relative_function_error
    }
    pub fn anderson_depth(&self) -> usize {
        self.anderson_depth
    }
    pub fn anderson_delay(&self) -> usize {
        self.anderson_delay
    }
    pub fn damping(&self) -> f64 {
        self.damping
    }
    pub fn max_recoverable_failures(&self) -> usize {
        self.max_recoverable_failures
    }
    pub fn eta_choice(&self) -> EtaChoice {
        self.eta_choice
    }
    pub fn loglevel(&self) -> Option<&str> {
        self.loglevel.as_deref()
    }

    /// sqrt of the relative function error, used for difference-quotient increments
    pub fn sqrt_relfunc(&self) -> f64 {
        self.relative_function_error.unwrap_or(f64::EPSILON).sqrt()
    }
}
