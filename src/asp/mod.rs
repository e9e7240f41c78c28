//! Solver-facing code: fact encoding, solver process, answer parsing

pub mod answer;
pub mod backbone;
pub mod constraints;
pub mod encoder;
pub mod solver;
pub mod terms;

pub use answer::{Answer, Atom, SolverOutput, SolverStatus, Term};
pub use backbone::{estimate_backbone, Backbone, BackboneEstimate, BackboneStyle};
pub use constraints::{ConstraintFile, ConstraintProvider, StaticConstraints};
pub use encoder::{EncodingOptions, Flavor, InitialStateEncoding, InstanceEncoder};
pub use solver::{AspSolver, ClingoSolver, Invocation, SolverRun};
