//! Controllers: construction from answer sets, size search and verification

pub mod controller;
pub mod search;
pub mod verifier;

pub use controller::{Controller, ControllerGraph, GraphEdge, GraphNode, Transition};
pub use search::{
    dump_controller, search_sizes, solve, verify_run_dir, Deadline, SearchPlan, SizeSearch, SolveOutcome,
    SolveReport, VerifyReport,
};
pub use verifier::{verify, SolutionSpace, SpaceNode, Verdict};
