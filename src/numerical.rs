//! numerical methods
/// Newton, line search, Picard and fixed-point solvers for nonlinear algebraic systems
pub mod Nonlinear_systems;
