use crate::numerical::Nonlinear_systems::error::SolverError;
use crate::numerical::Nonlinear_systems::problem::Constraint;
use crate::somelinalg::nvector::NVector;
use log::debug;

/// The initial guess has to satisfy every constraint.
pub fn check_feasible(u: &NVector, constraints: &[Constraint]) -> Result<(), SolverError> {
    for (i, (c, x)) in constraints.iter().zip(u.iter()).enumerate() {
        if !c.is_satisfied(*x) {
            return Err(SolverError::InfeasibleInitialGuess {
                index: i,
                value: *x,
                constraint: *c,
            });
        }
    }
    Ok(())
}

pub fn is_feasible(u: &NVector, constraints: &[Constraint]) -> bool {
    constraints
        .iter()
        .zip(u.iter())
        .all(|(c, x)| c.is_satisfied(*x))
}

/// Shortens the step `p` so that `u + p` satisfies the constraints.
///
/// While `u + p` violates a constraint, `p` is scaled by
/// `0.9 * min |u_i| / |p_i|` taken over the violated components.
/// Returns the factor `p` was multiplied by (1.0 if the step was feasible).
pub fn reduce_step(u: &NVector, p: &mut NVector, constraints: &[Constraint]) -> f64 {
    let mut total = 1.0;
    // one reduction is enough since each constraint set is convex; the bound
    // only guards against roundoff
    for _ in 0..10 {
        let trial = u.add(p);
        let mut mask_u = NVector::zeros(u.len());
        let mut mask_p = NVector::zeros(u.len());
        let mut violated = false;
        for (i, c) in constraints.iter().enumerate() {
            if !c.is_satisfied(trial[i]) {
                violated = true;
                mask_u[i] = u[i].abs();
                mask_p[i] = p[i].abs();
            }
        }
        if !violated {
            return total;
        }
        let factor = 0.9 * NVector::min_quotient(&mask_u, &mask_p).min(1.0);
        debug!("step violates constraints, scaled by {:.3e}", factor);
        p.scale_mut(factor);
        total *= factor;
    }
    // u itself is feasible
    p.fill(0.0);
    0.0
}
