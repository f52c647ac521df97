//! examples of usage of RustedNonlinear
/// catalogue of nonlinear test problems
pub mod nonlinear_examples;
