//! Problem definition: the residual `F(u)` and everything the solver may need
//! to know about it. Nothing is validated here, the solver checks dimensions
//! and signs when `solve` starts.
use crate::numerical::Nonlinear_systems::error::CallbackError;
use crate::somelinalg::dense_matrix::DenseMatrix;
use crate::somelinalg::nvector::NVector;
use strum_macros::{Display, EnumIter};

/// `F(u)` (or `G(u)` for the fixed-point map)
pub type ResidualFn<'a> = Box<dyn FnMut(&NVector) -> Result<NVector, CallbackError> + 'a>;
/// `(u, F(u)) -> J(u)`
pub type JacobianFn<'a> = Box<dyn FnMut(&NVector, &NVector) -> Result<DenseMatrix, CallbackError> + 'a>;
/// `(u, v) -> J(u)*v`
pub type JvpFn<'a> = Box<dyn FnMut(&NVector, &NVector) -> Result<NVector, CallbackError> + 'a>;

/// Sign constraint on one component of the solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Constraint {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = ">= 0")]
    NonNegative,
    #[strum(serialize = "<= 0")]
    NonPositive,
    #[strum(serialize = "> 0")]
    Positive,
    #[strum(serialize = "< 0")]
    Negative,
}

impl Constraint {
    /// integer encoding: 0 none, 1 >= 0, -1 <= 0, 2 > 0, -2 < 0
    pub fn from_code(code: i32) -> Option<Constraint> {
        match code {
            0 => Some(Constraint::None),
            1 => Some(Constraint::NonNegative),
            -1 => Some(Constraint::NonPositive),
            2 => Some(Constraint::Positive),
            -2 => Some(Constraint::Negative),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Constraint::None => 0,
            Constraint::NonNegative => 1,
            Constraint::NonPositive => -1,
            Constraint::Positive => 2,
            Constraint::Negative => -2,
        }
    }

    pub fn is_satisfied(&self, x: f64) -> bool {
        match self {
            Constraint::None => true,
            Constraint::NonNegative => x >= 0.0,
            Constraint::NonPositive => x <= 0.0,
            Constraint::Positive => x > 0.0,
            Constraint::Negative => x < 0.0,
        }
    }
}

pub struct Problem<'a> {
    pub(crate) dim: usize,
    pub(crate) residual: ResidualFn<'a>,
    pub(crate) fixed_point: Option<ResidualFn<'a>>,
    pub(crate) jacobian: Option<JacobianFn<'a>>,
    pub(crate) jvp: Option<JvpFn<'a>>,
    pub(crate) constraints: Option<Vec<Constraint>>,
    pub(crate) u_scale: Option<NVector>,
    pub(crate) f_scale: Option<NVector>,
}

impl<'a> Problem<'a> {
    /// `dim` is the number of unknowns (and equations)
    pub fn new<F>(dim: usize, residual: F) -> Problem<'a>
    where
        F: FnMut(&NVector) -> Result<NVector, CallbackError> + 'a,
    {
        Problem {
            dim,
            residual: Box::new(residual),
            fixed_point: None,
            jacobian: None,
            jvp: None,
            constraints: None,
            u_scale: None,
            f_scale: None,
        }
    }

    /// Fixed-point map `G` iterated by `Strategy::FixedPointIteration`.
    /// Without it the solver iterates `G(u) = u - F(u)`.
    pub fn with_fixed_point<G>(mut self, g: G) -> Self
    where
        G: FnMut(&NVector) -> Result<NVector, CallbackError> + 'a,
    {
        self.fixed_point = Some(Box::new(g));
        self
    }

    /// Analytic Jacobian. For Picard iteration it returns the linear part `L`.
    pub fn with_jacobian<J>(mut self, jac: J) -> Self
    where
        J: FnMut(&NVector, &NVector) -> Result<DenseMatrix, CallbackError> + 'a,
    {
        self.jacobian = Some(Box::new(jac));
        self
    }

    /// Analytic Jacobian-vector product for matrix-free linear solvers
    pub fn with_jvp<J>(mut self, jvp: J) -> Self
    where
        J: FnMut(&NVector, &NVector) -> Result<NVector, CallbackError> + 'a,
    {
        self.jvp = Some(Box::new(jvp));
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// constraints from integer codes, see [`Constraint::from_code`]; unknown codes are treated as no constraint
    pub fn with_constraint_codes(self, codes: &[i32]) -> Self {
        let constraints = codes
            .iter()
            .map(|c| Constraint::from_code(*c).unwrap_or(Constraint::None))
            .collect();
        self.with_constraints(constraints)
    }

    pub fn with_u_scale(mut self, u_scale: NVector) -> Self {
        self.u_scale = Some(u_scale);
        self
    }

    pub fn with_f_scale(mut self, f_scale: NVector) -> Self {
        self.f_scale = Some(f_scale);
        self
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn has_jacobian(&self) -> bool {
        self.jacobian.is_some()
    }

    pub fn has_jvp(&self) -> bool {
        self.jvp.is_some()
    }

    pub fn has_fixed_point(&self) -> bool {
        self.fixed_point.is_some()
    }

    pub fn constraints(&self) -> Option<&[Constraint]> {
        self.constraints.as_deref()
    }

    /// true if at least one component is actually constrained
    pub fn has_active_constraints(&self) -> bool {
        self.constraints
            .as_ref()
            .map(|c| c.iter().any(|c| *c != Constraint::None))
            .unwrap_or(false)
    }

    /// Evaluate `F(u)` directly, bypassing the solver
    pub fn eval_residual(&mut self, u: &NVector) -> Result<NVector, CallbackError> {
        (self.residual)(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_codes() {
        for code in [-2, -1, 0, 1, 2] {
            let c = Constraint::from_code(code).unwrap();
            assert_eq!(c.code(), code);
        }
        assert!(Constraint::from_code(3).is_none());
        assert!(Constraint::NonNegative.is_satisfied(0.0));
        assert!(!Constraint::Positive.is_satisfied(0.0));
        assert!(Constraint::NonPositive.is_satisfied(0.0));
        assert!(!Constraint::Negative.is_satisfied(0.0));
        assert!(Constraint::None.is_satisfied(-1e300));
    }

    #[test]
    fn test_builder_and_state_capture() {
        let shift = 2.0;
        let mut problem = Problem::new(1, move |u: &NVector| Ok(NVector::from_vec(vec![u[0] - shift])))
            .with_constraint_codes(&[1])
            .with_u_scale(NVector::from_vec(vec![1.0]));
        assert_eq!(problem.dim(), 1);
        assert!(problem.has_active_constraints());
        assert!(!problem.has_jacobian());
        let f = problem.eval_residual(&NVector::from_vec(vec![5.0])).unwrap();
        assert_eq!(f[0], 3.0);
    }
}
