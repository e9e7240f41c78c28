//! Fact encoding of a planning model for the logic-program solver

use super::terms::*;
use crate::error::FondResult;
use crate::sas::{Model, State};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// How the initial state is described to the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialStateEncoding {
    /// `holds(X, var, val) :- initialState(X).` for the actual values
    Positive,
    /// `-holds(X, var, other) :- initialState(X).` for every other value
    Negative,
    #[default]
    Both,
}

/// Which instance to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Controller synthesis: goal values are also bound to the goal controller state
    Controller,
    /// Weak-plan search: only the `goal/2` facts
    WeakPlan,
}

/// Encoding switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingOptions {
    pub initial_state: InitialStateEncoding,
    /// Emit `notaffects` facts for variables an effect leaves untouched
    pub not_affects: bool,
    /// Emit `precedence` facts ordering the effect tags
    pub precedence: bool,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self {
            initial_state: InitialStateEncoding::Both,
            not_affects: false,
            precedence: true,
        }
    }
}

/// Turns a [`Model`] into fact text.
///
/// The output only depends on the model and the options, so encoding the same
/// model twice yields identical text.
pub struct InstanceEncoder<'a> {
    model: &'a Model,
    options: EncodingOptions,
}

impl<'a> InstanceEncoder<'a> {
    /// Create a new encoder for a model
    pub fn new(model: &'a Model, options: EncodingOptions) -> Self {
        Self { model, options }
    }

    /// Produce the complete instance text
    pub fn encode(&self, flavor: Flavor) -> String {
        let mut out = Vec::new();
        self.write_variables(&mut out);
        self.write_mutexes(&mut out);
        self.write_initial_state(&mut out);
        match flavor {
            Flavor::Controller => self.write_goal_state(&mut out),
            Flavor::WeakPlan => self.write_goal(&mut out),
        }
        self.write_actions(&mut out);
        out.join("\n") + "\n"
    }

    /// Encode and write the instance to `path`
    pub fn write_to(&self, flavor: Flavor, path: &Path) -> FondResult<EncodingStatistics> {
        let text = self.encode(flavor);
        std::fs::write(path, &text)?;
        let stats = self.statistics(&text);
        debug!(path = %path.display(), facts = stats.facts, "wrote instance");
        Ok(stats)
    }

    /// Size of an encoding produced by this encoder
    pub fn statistics(&self, text: &str) -> EncodingStatistics {
        EncodingStatistics {
            facts: text.lines().filter(|l| !l.trim().is_empty()).count(),
            variables: self.model.variables().len(),
            mutex_groups: self.mutex_sets().count() + self.model.variables().len(),
            actions: self.model.groups().count(),
            max_outcomes: self.model.max_outcomes(),
        }
    }

    fn write_variables(&self, out: &mut Vec<String>) {
        let variables = self.model.variables();
        out.push(format!("{}(0..{}).", VARIABLE, variables.len() as i64 - 1));
        for (var, variable) in variables.iter().enumerate() {
            out.push(format!(
                "{}({}, 0..{}).",
                VARIABLE_VALUE,
                var,
                variable.domain_size() as i64 - 1
            ));
        }
        out.push(String::new());
    }

    /// Mutex sets with at least two defined variables
    fn mutex_sets(&self) -> impl Iterator<Item = &State> + '_ {
        self.model.mutexes().iter().filter(|m| m.defined_count() > 1)
    }

    fn write_mutexes(&self, out: &mut Vec<String>) {
        let mut group = 0;
        for mutex in self.mutex_sets() {
            group += 1;
            out.push(format!("{}({}).", MUTEX_GROUP, group));
            for (var, value) in mutex.defined() {
                out.push(format!("{}({}, {}, {}).", MUTEX, group, var, value));
            }
        }

        // every variable takes at most one value
        for (var, variable) in self.model.variables().iter().enumerate() {
            group += 1;
            out.push(format!("{}({}).", MUTEX_GROUP, group));
            for value in 0..variable.domain_size() {
                out.push(format!("{}({}, {}, {}).", MUTEX, group, var, value));
            }
        }
        out.push(String::new());
    }

    fn write_initial_state(&self, out: &mut Vec<String>) {
        let initial = self.model.initial();
        let mode = self.options.initial_state;

        if matches!(mode, InitialStateEncoding::Positive | InitialStateEncoding::Both) {
            for (var, value) in initial.defined() {
                out.push(format!("{}(X, {}, {}):- {}(X).", HOLDS, var, value, INITIAL_STATE));
            }
            out.push(String::new());
        }

        if matches!(mode, InitialStateEncoding::Negative | InitialStateEncoding::Both) {
            for (var, value) in initial.defined() {
                let size = self.model.variables()[var].domain_size();
                for other in (0..size).filter(|&o| o != value) {
                    out.push(format!("-{}(X, {}, {}):- {}(X).", HOLDS, var, other, INITIAL_STATE));
                }
            }
            out.push(String::new());
        }
    }

    fn write_goal_state(&self, out: &mut Vec<String>) {
        for (var, value) in self.model.goal().defined() {
            out.push(format!("{}(X, {}, {}):- {}(X).", HOLDS, var, value, GOAL_STATE));
            out.push(format!("{}({}, {}).", GOAL, var, value));
        }
        out.push(String::new());
    }

    fn write_goal(&self, out: &mut Vec<String>) {
        for (var, value) in self.model.goal().defined() {
            out.push(format!("{}({}, {}).", GOAL, var, value));
        }
        out.push(String::new());
    }

    fn write_actions(&self, out: &mut Vec<String>) {
        let num_variables = self.model.variables().len();
        let mut action_types = BTreeSet::new();
        let mut max_outcomes = 1;

        for (name, outcomes) in self.model.groups() {
            let Some(first) = outcomes.first() else {
                continue;
            };
            let action_type = first.prefix();

            if action_types.insert(action_type.to_string()) {
                out.push(format!("{}(\"{}\").", ACTION_TYPE, action_type));
            }
            out.push(format!("{}(\"{}\", \"{}\").", ACTION_TYPE, action_type, name));
            out.push(format!("{}(\"{}\").", ACTION, name));

            for (var, value) in first.precondition().defined() {
                out.push(format!("{}(\"{}\", {}, {}).", PRECONDITION, name, var, value));
            }

            out.push(format!("{}(\"{}\", {}).", NUM_EFFECTS, name, outcomes.len()));
            max_outcomes = max_outcomes.max(outcomes.len());

            for (i, outcome) in outcomes.iter().enumerate() {
                let effect = effect_tag(i);
                out.push(format!("{}(\"{}\", \"{}\").", ACTION_EFFECT, name, effect));

                let Some(strips) = outcome.strips(0) else {
                    continue;
                };
                let mut affected = BTreeSet::new();
                for (var, value) in strips.add.defined() {
                    affected.insert(var);
                    out.push(format!("{}(\"{}\", \"{}\", {}, {}).", ADD, name, effect, var, value));
                }
                for (var, value) in strips.deleted() {
                    affected.insert(var);
                    out.push(format!("{}(\"{}\", \"{}\", {}, {}).", DEL, name, effect, var, value));
                }

                if self.options.not_affects {
                    for var in (0..num_variables).filter(|v| !affected.contains(v)) {
                        out.push(format!("{}(\"{}\",\"{}\", {}).", NOT_AFFECTS, name, effect, var));
                    }
                }
            }
        }

        if self.options.precedence && max_outcomes > 1 {
            for i in 0..max_outcomes - 1 {
                out.push(format!(
                    "{}(\"{}\", \"{}\").",
                    PRECEDENCE,
                    effect_tag(i),
                    effect_tag(i + 1)
                ));
            }
        }
        out.push(format!("{}({}).", MAX_ND, max_outcomes));
        out.push(String::new());
    }
}

/// Size of a written encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingStatistics {
    pub facts: usize,
    pub variables: usize,
    pub mutex_groups: usize,
    pub actions: usize,
    pub max_outcomes: usize,
}

impl std::fmt::Display for EncodingStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Encoding Statistics:")?;
        writeln!(f, "  Facts and rules: {}", self.facts)?;
        writeln!(f, "  Variables: {}", self.variables)?;
        writeln!(f, "  Mutex groups: {}", self.mutex_groups)?;
        writeln!(f, "  Actions: {}", self.actions)?;
        writeln!(f, "  Max outcomes: {}", self.max_outcomes)?;
        Ok(())
    }
}
