//! some linear algebra functions used throughout the code
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
/// dense matrix with copy-on-write storage
pub mod dense_matrix;
/// restarted GMRES, matrix-free
pub mod GMRESapi;
/// direct solvers: LU factorization or explicit inverse
pub mod LUsolver;
/// interface between nonlinear and linear solvers
pub mod linear_solver;
/// diagnostics for linear systems and matrices: if it is singular
/// or poorly conditioned
pub mod linear_sys_diagnostics;
/// numeric vector with copy-on-write storage
pub mod nvector;
