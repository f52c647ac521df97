//! different utility modules used throughout the project
/// logger initialization
pub mod logger;
/// tiny module for profiling of the solver phases
pub mod timer;
