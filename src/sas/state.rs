//! Finite-domain variables and (partial) states

use serde::{Deserialize, Serialize};
use std::fmt;

/// A finite-domain variable as produced by the SAS translator.
///
/// The domain is the ordered list of symbolic labels, e.g.
/// `["Atom clear(b1)", "NegatedAtom clear(b1)"]`; value `i` refers to `domain[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub domain: Vec<String>,
}

impl Variable {
    /// Create a new variable
    pub fn new(name: impl Into<String>, domain: Vec<String>) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    /// Number of values in the domain
    pub fn domain_size(&self) -> usize {
        self.domain.len()
    }

    /// Readable label for a value: `Atom p` becomes `p`, `NegatedAtom p` becomes `not p`
    pub fn label(&self, value: usize) -> String {
        match self.domain.get(value) {
            Some(label) => label
                .replace("NegatedAtom ", "not ")
                .replace("Atom ", "")
                .trim()
                .to_string(),
            None => format!("{}={}", self.name, value),
        }
    }
}

/// Value of one variable slot in a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    Undefined,
    Defined(usize),
}

impl Value {
    /// Convert the translator's integer convention (`-1` is undefined)
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Value::Undefined),
            v if v >= 0 => Some(Value::Defined(v as usize)),
            _ => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Value::Defined(_))
    }

    /// The value index, if defined
    pub fn get(self) -> Option<usize> {
        match self {
            Value::Defined(v) => Some(v),
            Value::Undefined => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Defined(v) => write!(f, "{}", v),
            Value::Undefined => write!(f, "-1"),
        }
    }
}

/// A (possibly partial) assignment over the problem's variable list.
///
/// Equality and hashing are structural over the value vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    values: Vec<Value>,
}

impl State {
    /// A state with every variable undefined
    pub fn undefined(num_variables: usize) -> Self {
        Self {
            values: vec![Value::Undefined; num_variables],
        }
    }

    /// Build a state from explicit slot values
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Build a fully defined state from value indices
    pub fn from_indices(indices: &[usize]) -> Self {
        Self {
            values: indices.iter().map(|&v| Value::Defined(v)).collect(),
        }
    }

    /// Build a partial state over `num_variables` from sparse `(var, value)` pairs
    pub fn from_pairs(num_variables: usize, pairs: &[(usize, usize)]) -> Self {
        let mut state = Self::undefined(num_variables);
        for &(var, value) in pairs {
            state.set(var, Value::Defined(value));
        }
        state
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a variable slot; out-of-range slots read as undefined
    pub fn get(&self, var: usize) -> Value {
        self.values.get(var).copied().unwrap_or(Value::Undefined)
    }

    pub fn set(&mut self, var: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(var) {
            *slot = value;
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// A state is partial iff some variable is undefined
    pub fn is_partial(&self) -> bool {
        self.values.iter().any(|v| !v.is_defined())
    }

    pub fn is_defined(&self, var: usize) -> bool {
        self.get(var).is_defined()
    }

    /// Iterate over `(var, value)` for every defined variable
    pub fn defined(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(var, value)| value.get().map(|v| (var, v)))
    }

    /// Number of defined variables
    pub fn defined_count(&self) -> usize {
        self.defined().count()
    }

    /// Render defined values with their symbolic labels
    pub fn describe(&self, variables: &[Variable]) -> String {
        self.defined()
            .map(|(var, value)| match variables.get(var) {
                Some(variable) => variable.label(value),
                None => format!("var{}={}", var, value),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props: Vec<String> = self
            .defined()
            .map(|(var, value)| format!("(var{}={})", var, value))
            .collect();
        write!(f, "{}", props.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_variable() -> Variable {
        Variable::new(
            "var0",
            vec!["Atom clear(b1)".to_string(), "NegatedAtom clear(b1)".to_string()],
        )
    }

    #[test]
    fn test_value_from_raw() {
        assert_eq!(Value::from_raw(-1), Some(Value::Undefined));
        assert_eq!(Value::from_raw(3), Some(Value::Defined(3)));
        assert_eq!(Value::from_raw(-2), None);
    }

    #[test]
    fn test_partial_state() {
        let full = State::from_indices(&[0, 1, 2]);
        assert!(!full.is_partial());

        let partial = State::from_pairs(3, &[(1, 4)]);
        assert!(partial.is_partial());
        assert_eq!(partial.get(1), Value::Defined(4));
        assert_eq!(partial.get(0), Value::Undefined);
        assert_eq!(partial.defined_count(), 1);
    }

    #[test]
    fn test_structural_equality() {
        let a = State::from_pairs(2, &[(0, 1)]);
        let mut b = State::undefined(2);
        b.set(0, Value::Defined(1));
        assert_eq!(a, b);

        let mut seen = std::collections::HashSet::new();
        seen.insert(a);
        assert!(seen.contains(&b));
    }

    #[test]
    fn test_labels() {
        let var = clear_variable();
        assert_eq!(var.label(0), "clear(b1)");
        assert_eq!(var.label(1), "not clear(b1)");

        let state = State::from_pairs(1, &[(0, 1)]);
        assert_eq!(state.describe(&[var]), "not clear(b1)");
        assert_eq!(state.to_string(), "(var0=1)");
    }
}
