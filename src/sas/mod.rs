//! Finite-domain planning model: variables, states, actions and their algebra

pub mod action;
pub mod algebra;
pub mod model;
pub mod parser;
pub mod state;

pub use action::{action_key, Action, ActionName, Strips, ValueChange, DETERMINIZATION_SUFFIX};
pub use algebra::{consistent, entails, progress, regress, update};
pub use model::{Model, ModelStatistics};
pub use parser::{load_sas, parse_sas};
pub use state::{State, Value, Variable};
