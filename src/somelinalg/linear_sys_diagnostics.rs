use log::warn;
use nalgebra::DMatrix;

/// The condition number of a matrix is the ratio of its largest singular value
/// to the smallest one. It measures how sensitive the solution of `A*x = b` is
/// to small perturbations of `b`. Returns `f64::INFINITY` for a singular matrix.
pub fn condition_number(A: &DMatrix<f64>) -> f64 {
    let singular_values = A.singular_values();
    if singular_values.is_empty() {
        return 0.0;
    }
    let max_sigma = singular_values.max();
    let min_sigma = singular_values.min();
    if min_sigma == 0.0 {
        return f64::INFINITY;
    }
    max_sigma / min_sigma
}

pub fn poorly_conditioned(A: &DMatrix<f64>, threshold: f64) -> bool {
    let cond = condition_number(A);
    let poorly_conditioned = cond > threshold;
    if poorly_conditioned {
        warn!(
            "The system of linear equations is poorly conditioned. Condition number = {:.2}",
            cond
        );
    }
    poorly_conditioned
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_condition_number() {
        let A = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.5]);
        assert_relative_eq!(condition_number(&A), 4.0, epsilon = 1e-12);
        assert!(!poorly_conditioned(&A, 10.0));
        let S = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(poorly_conditioned(&S, 1e12));
    }
}
