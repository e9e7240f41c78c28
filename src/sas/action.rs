//! Grounded actions with cached add/delete lists

use super::state::{State, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix the all-outcomes determinizer appends to each outcome of a
/// non-deterministic operator, followed by the outcome index.
pub const DETERMINIZATION_SUFFIX: &str = "_DETDUP_";

/// A grounded operator name split into its parts.
///
/// `put-on-block_DETDUP_1 b1 b4` has name `put-on-block_DETDUP_1`, prefix
/// `put-on-block`, outcome `Some(1)` and arguments `[b1, b4]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionName {
    pub name: String,
    pub prefix: String,
    pub outcome: Option<usize>,
    pub arguments: Vec<String>,
}

impl ActionName {
    /// Split an operator header line; `None` if the line is blank
    pub fn parse(header: &str) -> Option<Self> {
        let mut tokens = header.split_whitespace();
        let name = tokens.next()?.to_string();
        let arguments: Vec<String> = tokens.map(str::to_string).collect();

        let (prefix, outcome) = match find_suffix(&name) {
            Some(pos) => {
                let index = &name[pos + DETERMINIZATION_SUFFIX.len()..];
                (name[..pos].to_string(), index.parse::<usize>().ok())
            }
            None => (name.clone(), None),
        };

        Some(Self {
            name,
            prefix,
            outcome,
            arguments,
        })
    }
}

/// Case-insensitive search for the determinizer suffix
fn find_suffix(name: &str) -> Option<usize> {
    name.to_ascii_uppercase().find(DETERMINIZATION_SUFFIX)
}

/// Render `name(arg1,arg2)`, the key format used by the encoder and the solver answers
pub fn action_key(name: &str, arguments: &[String]) -> String {
    format!("{}({})", name, arguments.join(","))
}

/// A single value change of an operator: `var` goes from `prev` (possibly
/// undefined) to `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueChange {
    pub var: usize,
    pub prev: Value,
    pub next: usize,
}

/// STRIPS view of one effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strips {
    /// Same as the effect itself
    pub add: State,
    /// Per variable, the values that stop holding
    pub delete: Vec<Vec<usize>>,
}

impl Strips {
    /// Derive add/delete lists of `effect` under `precondition`.
    ///
    /// A variable set by the effect deletes the precondition value when the
    /// precondition mentions it, and every other domain value otherwise.
    pub fn derive(precondition: &State, effect: &State, domain_sizes: &[usize]) -> Self {
        let mut delete = vec![Vec::new(); effect.len()];
        for (var, value) in effect.defined() {
            delete[var] = match precondition.get(var) {
                Value::Defined(prev) => vec![prev],
                Value::Undefined => {
                    let size = domain_sizes.get(var).copied().unwrap_or(0);
                    (0..size).filter(|&other| other != value).collect()
                }
            };
        }
        Self {
            add: effect.clone(),
            delete,
        }
    }

    /// `(var, value)` pairs of the delete list in variable order
    pub fn deleted(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.delete
            .iter()
            .enumerate()
            .flat_map(|(var, values)| values.iter().map(move |&v| (var, v)))
    }
}

/// A grounded action: one precondition and one or more possible effects.
///
/// Add/delete lists are computed once when the action is built and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    name: String,
    prefix: String,
    outcome: Option<usize>,
    arguments: Vec<String>,
    precondition: State,
    effects: Vec<State>,
    strips: Vec<Strips>,
    cost: u32,
}

impl Action {
    /// Build a deterministic action from an operator's value changes.
    ///
    /// Every change with a defined previous value is lifted into the
    /// action's precondition.
    pub fn new(
        name: ActionName,
        mut precondition: State,
        changes: &[ValueChange],
        cost: u32,
        domain_sizes: &[usize],
    ) -> Self {
        let mut effect = State::undefined(precondition.len());
        for change in changes {
            if change.prev.is_defined() {
                precondition.set(change.var, change.prev);
            }
            effect.set(change.var, Value::Defined(change.next));
        }

        let strips = vec![Strips::derive(&precondition, &effect, domain_sizes)];
        Self {
            name: name.name,
            prefix: name.prefix,
            outcome: name.outcome,
            arguments: name.arguments,
            precondition,
            effects: vec![effect],
            strips,
            cost,
        }
    }

    /// Merge the determinized outcomes of one operator into a single
    /// non-deterministic action.
    ///
    /// The precondition is the first outcome's; effect `i` (and its cached
    /// add/delete lists) come from outcome `i`.
    pub fn merge(outcomes: &[Action]) -> Option<Self> {
        let first = outcomes.first()?;
        Some(Self {
            name: first.prefix.clone(),
            prefix: first.prefix.clone(),
            outcome: None,
            arguments: first.arguments.clone(),
            precondition: first.precondition.clone(),
            effects: outcomes.iter().flat_map(|a| a.effects.clone()).collect(),
            strips: outcomes.iter().flat_map(|a| a.strips.clone()).collect(),
            cost: first.cost,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lifted (pre-determinization) name
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Determinization outcome index, if the operator carried one
    pub fn outcome(&self) -> Option<usize> {
        self.outcome
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn precondition(&self) -> &State {
        &self.precondition
    }

    pub fn effects(&self) -> &[State] {
        &self.effects
    }

    pub fn effect(&self, index: usize) -> Option<&State> {
        self.effects.get(index)
    }

    pub fn strips(&self, index: usize) -> Option<&Strips> {
        self.strips.get(index)
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn is_nondeterministic(&self) -> bool {
        self.effects.len() > 1
    }

    /// Grounded key, e.g. `pick-up_DETDUP_1(b2,b4)`
    pub fn key(&self) -> String {
        action_key(&self.name, &self.arguments)
    }

    /// Key of the non-deterministic group, e.g. `pick-up(b2,b4)`
    pub fn group_key(&self) -> String {
        action_key(&self.prefix, &self.arguments)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_on_block() -> Action {
        // var6 must be 0 before the change; var0 and var5 are unconstrained
        let name = ActionName::parse("put-on-block_DETDUP_1 b1 b4").unwrap();
        let precondition = State::from_pairs(8, &[(3, 0)]);
        let changes = [
            ValueChange { var: 0, prev: Value::Undefined, next: 0 },
            ValueChange { var: 5, prev: Value::Undefined, next: 0 },
            ValueChange { var: 6, prev: Value::Defined(0), next: 6 },
        ];
        Action::new(name, precondition, &changes, 1, &[2, 2, 2, 2, 2, 2, 8, 2])
    }

    #[test]
    fn test_name_parsing() {
        let name = ActionName::parse("pick-up_DETDUP_1 b2 b4").unwrap();
        assert_eq!(name.name, "pick-up_DETDUP_1");
        assert_eq!(name.prefix, "pick-up");
        assert_eq!(name.outcome, Some(1));
        assert_eq!(name.arguments, vec!["b2", "b4"]);

        let plain = ActionName::parse("put-down b1").unwrap();
        assert_eq!(plain.prefix, "put-down");
        assert_eq!(plain.outcome, None);

        assert!(ActionName::parse("   ").is_none());
    }

    #[test]
    fn test_precondition_lifting() {
        let action = put_on_block();
        assert_eq!(action.precondition().get(3), Value::Defined(0));
        assert_eq!(action.precondition().get(6), Value::Defined(0));
        assert_eq!(action.precondition().get(0), Value::Undefined);
        assert_eq!(action.key(), "put-on-block_DETDUP_1(b1,b4)");
        assert_eq!(action.group_key(), "put-on-block(b1,b4)");
    }

    #[test]
    fn test_strips_lists() {
        let action = put_on_block();
        let strips = action.strips(0).unwrap();

        assert_eq!(strips.add, action.effects()[0]);
        // defined in precondition: only the previous value is deleted
        assert_eq!(strips.delete[6], vec![0]);
        // not in precondition: every other value is deleted
        assert_eq!(strips.delete[0], vec![1]);
        assert!(strips.delete[1].is_empty());
    }

    #[test]
    fn test_strips_are_stable() {
        let action = put_on_block();
        let first = action.strips(0).cloned();
        let again = Strips::derive(action.precondition(), &action.effects()[0], &[2, 2, 2, 2, 2, 2, 8, 2]);
        assert_eq!(first, Some(again));
    }

    #[test]
    fn test_merge_outcomes() {
        let precondition = State::from_pairs(2, &[(0, 0)]);
        let a = Action::new(
            ActionName::parse("move_DETDUP_0 l1").unwrap(),
            precondition.clone(),
            &[ValueChange { var: 0, prev: Value::Undefined, next: 1 }],
            1,
            &[2, 2],
        );
        let b = Action::new(
            ActionName::parse("move_DETDUP_1 l1").unwrap(),
            precondition,
            &[ValueChange { var: 1, prev: Value::Undefined, next: 1 }],
            1,
            &[2, 2],
        );

        let merged = Action::merge(&[a, b]).unwrap();
        assert!(merged.is_nondeterministic());
        assert_eq!(merged.key(), "move(l1)");
        assert_eq!(merged.effects().len(), 2);
        assert_eq!(merged.strips(1).unwrap().delete[1], vec![0]);
        assert!(Action::merge(&[]).is_none());
    }
}
