//! FOND controller synthesis with answer set programming
//!
//! This library finds strong-cyclic controllers for fully observable
//! non-deterministic planning problems by encoding them as logic programs,
//! searching over controller sizes with an external ASP solver, and checking
//! the resulting controllers against the planning model.

pub mod asp;
pub mod config;
pub mod controller;
pub mod error;
pub mod sas;
pub mod utils;

pub use config::Settings;
pub use controller::{Controller, SolveOutcome, SolveReport};
pub use error::{FondError, FondResult};

use anyhow::Result;
use asp::ClingoSolver;

/// Main entry point: validate the settings and run the pipeline with clingo
pub fn solve_problem(settings: &Settings) -> Result<SolveReport> {
    settings.validate()?;
    let mut solver = ClingoSolver::new(&settings.solver.clingo);
    controller::solve(settings, &mut solver, &[])
}
