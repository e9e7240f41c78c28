//! Configuration management for the FOND controller synthesizer

pub mod settings;

pub use settings::{
    BackboneConfig, CliOverrides, ConstraintsConfig, InputConfig, OutputConfig, Settings, SolverConfig,
};
