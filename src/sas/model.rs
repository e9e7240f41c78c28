//! The parsed planning problem

use super::action::Action;
use super::algebra::entails;
use super::state::{State, Variable};
use indexmap::IndexMap;
use std::fmt;

/// A finite-domain FOND planning problem.
///
/// Built once from the translator output and never mutated. Actions are
/// indexed twice: by grounded name (one determinized outcome each) and by
/// lifted name, where each entry lists the outcomes of one non-deterministic
/// operator ordered by outcome index.
#[derive(Debug, Clone)]
pub struct Model {
    variables: Vec<Variable>,
    initial: State,
    goal: State,
    mutexes: Vec<State>,
    actions: IndexMap<String, Action>,
    groups: IndexMap<String, Vec<Action>>,
}

impl Model {
    /// Create a model and index its actions
    pub fn new(
        variables: Vec<Variable>,
        initial: State,
        goal: State,
        mutexes: Vec<State>,
        actions: Vec<Action>,
    ) -> Self {
        let mut by_name = IndexMap::new();
        let mut groups: IndexMap<String, Vec<Action>> = IndexMap::new();

        for action in actions {
            groups
                .entry(action.group_key())
                .or_default()
                .push(action.clone());
            by_name.insert(action.key(), action);
        }

        // position i in a group is effect tag e{i+1}
        for outcomes in groups.values_mut() {
            outcomes.sort_by_key(|a| a.outcome().unwrap_or(0));
        }

        Self {
            variables,
            initial,
            goal,
            mutexes,
            actions: by_name,
            groups,
        }
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn initial(&self) -> &State {
        &self.initial
    }

    pub fn goal(&self) -> &State {
        &self.goal
    }

    pub fn mutexes(&self) -> &[State] {
        &self.mutexes
    }

    /// Domain size of every variable, in variable order
    pub fn domain_sizes(&self) -> Vec<usize> {
        self.variables.iter().map(Variable::domain_size).collect()
    }

    /// Deterministic lookup by grounded name, e.g. `pick-up_DETDUP_1(b2,b4)`
    pub fn action(&self, key: &str) -> Option<&Action> {
        self.actions.get(key)
    }

    /// Determinized outcomes of the operator keyed by lifted name, e.g. `pick-up(b2,b4)`
    pub fn outcomes(&self, key: &str) -> Option<&[Action]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// The operator keyed by lifted name as one multi-effect action
    pub fn nondeterministic(&self, key: &str) -> Option<Action> {
        self.groups.get(key).and_then(|outcomes| Action::merge(outcomes))
    }

    /// All operator groups in input order
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Action])> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Largest number of outcomes of any operator
    pub fn max_outcomes(&self) -> usize {
        self.groups.values().map(Vec::len).max().unwrap_or(1).max(1)
    }

    /// True when the initial state already satisfies the goal
    pub fn goal_reached_initially(&self) -> bool {
        entails(&self.initial, &self.goal)
    }

    /// Summary of the input size
    pub fn statistics(&self) -> ModelStatistics {
        let nondeterministic = self.groups.values().filter(|g| g.len() > 1).count();
        ModelStatistics {
            variables: self.variables.len(),
            grounded_actions: self.actions.len(),
            deterministic_operators: self.groups.len() - nondeterministic,
            nondeterministic_operators: nondeterministic,
            max_outcomes: self.max_outcomes(),
            mutex_groups: self.mutexes.len(),
            goal_size: self.goal.defined_count(),
        }
    }
}

/// Size of a parsed model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStatistics {
    pub variables: usize,
    pub grounded_actions: usize,
    pub deterministic_operators: usize,
    pub nondeterministic_operators: usize,
    pub max_outcomes: usize,
    pub mutex_groups: usize,
    pub goal_size: usize,
}

impl fmt::Display for ModelStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model Statistics:")?;
        writeln!(f, "  Variables: {}", self.variables)?;
        writeln!(f, "  Grounded actions: {}", self.grounded_actions)?;
        writeln!(f, "  Deterministic operators: {}", self.deterministic_operators)?;
        writeln!(f, "  Non-deterministic operators: {}", self.nondeterministic_operators)?;
        writeln!(f, "  Max outcomes: {}", self.max_outcomes)?;
        writeln!(f, "  Mutex groups: {}", self.mutex_groups)?;
        writeln!(f, "  Goal size: {}", self.goal_size)?;
        Ok(())
    }
}
