//! Finite-state controller rebuilt from a solver answer

use crate::asp::answer::Answer;
use crate::asp::terms::{effect_index, DIVIDER, HOLDS, POLICY, TRANSITION};
use crate::error::{FondError, FondResult};
use crate::sas::{State, Value, Variable};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Edge of the controller graph; the action is the policy of `from`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Transition {
    pub from: usize,
    pub effect: String,
    pub to: usize,
}

/// A controller: abstract states with partial assignments, effect-labelled
/// transitions and one action per state.
///
/// State 0 is the initial state and the highest id is the goal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    answer: usize,
    num_variables: usize,
    states: BTreeMap<usize, State>,
    transitions: Vec<Transition>,
    policy: BTreeMap<usize, String>,
}

impl Controller {
    /// Build a controller from `holds/3`, `policy/2` and `transition/3` atoms.
    ///
    /// A state that only appears as a transition target still gets a node
    /// (with an empty assignment); it is a dead end.
    pub fn from_answer(answer: &Answer, num_variables: usize) -> FondResult<Self> {
        let mut controller = Self::empty(answer.number, num_variables);

        for atom in &answer.atoms {
            if atom.is(HOLDS, 3) {
                let (Some(id), Some(var), Some(value)) = (atom.index(0), atom.index(1), atom.index(2)) else {
                    return Err(malformed(atom));
                };
                controller.assign(id, var, value)?;
            } else if atom.is(POLICY, 2) {
                let (Some(id), Some(action)) = (atom.index(0), atom.text(1)) else {
                    return Err(malformed(atom));
                };
                controller.policy.insert(id, action.to_string());
            } else if atom.is(TRANSITION, 3) {
                let (Some(from), Some(effect), Some(to)) = (atom.index(0), atom.text(1), atom.index(2)) else {
                    return Err(malformed(atom));
                };
                controller.add_transition(from, effect, to);
            }
        }

        controller.finish()
    }

    /// Read the persisted text format back
    pub fn parse_text(text: &str, num_variables: usize) -> FondResult<Self> {
        let mut sections: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line == DIVIDER {
                sections.push(Vec::new());
            } else if !line.is_empty() {
                if let Some(section) = sections.last_mut() {
                    section.push((i + 1, line));
                }
            }
        }
        if sections.len() < 6 {
            return Err(FondError::parse(
                text.lines().count(),
                format!("expected 6 sections, found {}", sections.len()),
            ));
        }

        let answer = header_value(&sections[0], "ANSWER")?;
        let initial = header_value(&sections[1], "Initial State")?;
        let goal = header_value(&sections[2], "Goal State")?;
        let mut controller = Self::empty(answer, num_variables);

        let mut current = None;
        for &(line, content) in &sections[3] {
            if let Some(id) = content.strip_prefix("State:") {
                let id = parse_number(line, id)?;
                controller.states.entry(id).or_insert_with(|| State::undefined(num_variables));
                current = Some(id);
            } else {
                let (var, value) = content
                    .split_once('=')
                    .ok_or_else(|| FondError::parse(line, format!("expected `var=value`, found `{}`", content)))?;
                let id = current.ok_or_else(|| FondError::parse(line, "assignment before any `State:` line"))?;
                controller
                    .assign(id, parse_number(line, var)?, parse_number(line, value)?)
                    .map_err(|_| FondError::parse(line, format!("variable out of range in `{}`", content)))?;
            }
        }

        for &(line, content) in sections[4].iter().filter(|(_, c)| *c != "Transitions:") {
            let (from, rest) = content
                .split_once("--")
                .ok_or_else(|| FondError::parse(line, format!("malformed transition `{}`", content)))?;
            let (label, to) = rest
                .rsplit_once("-->")
                .ok_or_else(|| FondError::parse(line, format!("malformed transition `{}`", content)))?;
            let (_, effect) = label
                .rsplit_once(',')
                .ok_or_else(|| FondError::parse(line, format!("malformed transition `{}`", content)))?;
            controller.add_transition(parse_number(line, from)?, effect, parse_number(line, to)?);
        }

        for &(line, content) in sections[5].iter().filter(|(_, c)| *c != "Policy:") {
            let (from, action) = content
                .split_once("-->")
                .ok_or_else(|| FondError::parse(line, format!("malformed policy `{}`", content)))?;
            controller.policy.insert(parse_number(line, from)?, action.trim().to_string());
        }

        let controller = controller.finish()?;
        if controller.initial() != initial || controller.goal() != goal {
            return Err(FondError::parse(
                sections[1].first().map(|(l, _)| *l).unwrap_or(0),
                format!(
                    "header declares initial {} and goal {}, states give {} and {}",
                    initial,
                    goal,
                    controller.initial(),
                    controller.goal()
                ),
            ));
        }
        Ok(controller)
    }

    fn empty(answer: usize, num_variables: usize) -> Self {
        Self {
            answer,
            num_variables,
            states: BTreeMap::new(),
            transitions: Vec::new(),
            policy: BTreeMap::new(),
        }
    }

    fn assign(&mut self, id: usize, var: usize, value: usize) -> FondResult<()> {
        if var >= self.num_variables {
            return Err(FondError::parse(
                0,
                format!("state {} assigns variable {} of {}", id, var, self.num_variables),
            ));
        }
        let n = self.num_variables;
        self.states
            .entry(id)
            .or_insert_with(|| State::undefined(n))
            .set(var, Value::Defined(value));
        Ok(())
    }

    fn add_transition(&mut self, from: usize, effect: &str, to: usize) {
        let n = self.num_variables;
        for id in [from, to] {
            self.states.entry(id).or_insert_with(|| State::undefined(n));
        }
        self.transitions.push(Transition {
            from,
            effect: effect.to_string(),
            to,
        });
    }

    fn finish(mut self) -> FondResult<Self> {
        if self.states.is_empty() {
            return Err(FondError::parse(0, "answer has no controller states"));
        }
        if let Some(t) = self.transitions.iter().find(|t| !self.policy.contains_key(&t.from)) {
            return Err(FondError::parse(
                0,
                format!("transition {}--{}-->{} leaves a state without policy", t.from, t.effect, t.to),
            ));
        }
        if let Some(t) = self.transitions.iter().find(|t| effect_index(&t.effect).is_none()) {
            return Err(FondError::parse(0, format!("invalid effect tag `{}`", t.effect)));
        }
        self.transitions.sort();
        self.transitions.dedup();
        Ok(self)
    }

    /// Number of the solver answer this controller came from
    pub fn answer(&self) -> usize {
        self.answer
    }

    pub fn initial(&self) -> usize {
        0
    }

    pub fn goal(&self) -> usize {
        self.states.keys().next_back().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Declared assignment of a controller state
    pub fn state(&self, id: usize) -> Option<&State> {
        self.states.get(&id)
    }

    pub fn states(&self) -> impl Iterator<Item = (usize, &State)> {
        self.states.iter().map(|(id, s)| (*id, s))
    }

    pub fn policy(&self, id: usize) -> Option<&str> {
        self.policy.get(&id).map(String::as_str)
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn transitions_from(&self, id: usize) -> impl Iterator<Item = &Transition> {
        self.transitions.iter().filter(move |t| t.from == id)
    }

    /// Target of the transition leaving `id` under `effect`
    pub fn successor(&self, id: usize, effect: &str) -> Option<usize> {
        self.transitions_from(id).find(|t| t.effect == effect).map(|t| t.to)
    }

    /// Render the persisted text format
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "ANSWER:{}", self.answer);
        let _ = writeln!(out, "{}", DIVIDER);
        let _ = writeln!(out, "Initial State:{}", self.initial());
        let _ = writeln!(out, "{}", DIVIDER);
        let _ = writeln!(out, "Goal State:{}", self.goal());
        let _ = writeln!(out, "{}", DIVIDER);

        for (id, state) in &self.states {
            let _ = writeln!(out, "State:{}", id);
            for (var, value) in state.defined() {
                let _ = writeln!(out, "{}={}", var, value);
            }
        }
        let _ = writeln!(out, "{}", DIVIDER);

        let _ = writeln!(out, "Transitions:");
        for t in &self.transitions {
            let action = self.policy(t.from).unwrap_or_default();
            let _ = writeln!(out, "{}--{},{}-->{}", t.from, action, t.effect, t.to);
        }
        let _ = writeln!(out, "{}", DIVIDER);

        let _ = writeln!(out, "Policy:");
        for (id, action) in &self.policy {
            let _ = writeln!(out, "{}-->{}", id, action);
        }
        let _ = writeln!(out, "{}", DIVIDER);
        out
    }

    /// Text format followed by a listing of the problem's variables
    pub fn to_text_with_variables(&self, variables: &[Variable]) -> String {
        let mut out = self.to_text();
        let _ = writeln!(out, "DomainVariables:");
        for variable in variables {
            let labels: Vec<String> = (0..variable.domain_size()).map(|v| variable.label(v)).collect();
            let _ = writeln!(out, "{}: [{}]", variable.name, labels.join(", "));
        }
        out
    }

    /// Node/edge view for graph viewers
    pub fn to_graph(&self, variables: &[Variable]) -> ControllerGraph {
        let goal = self.goal();
        let nodes = self
            .states
            .iter()
            .map(|(&id, state)| {
                let kind = if id == self.initial() {
                    NodeKind::Initial
                } else if id == goal {
                    NodeKind::Goal
                } else {
                    NodeKind::Inner
                };
                let clingo: Vec<String> = state.defined().map(|(v, x)| format!("var{}={}", v, x)).collect();
                let sas: Vec<String> = state
                    .defined()
                    .map(|(v, x)| match variables.get(v) {
                        Some(variable) => format!("{}={}", variable.name, variable.label(x)),
                        None => format!("var{}={}", v, x),
                    })
                    .collect();
                GraphNode {
                    id: id.to_string(),
                    label: id.to_string(),
                    kind: kind as u8,
                    state: state.to_string(),
                    clingo: clingo.join(","),
                    sas: sas.join(","),
                }
            })
            .collect();

        let edges = self
            .transitions
            .iter()
            .map(|t| GraphEdge {
                source: t.from.to_string(),
                target: t.to.to_string(),
                label: format!("{},{}", self.policy(t.from).unwrap_or_default(), t.effect),
            })
            .collect();

        ControllerGraph { nodes, edges }
    }

    /// Write `controller.json`
    pub fn write_json(&self, path: &Path, variables: &[Variable]) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_graph(variables))
            .context("Failed to serialize controller graph")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write controller graph: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Initial = 0,
    Inner = 1,
    Goal = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub state: String,
    pub clingo: String,
    pub sas: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn malformed(atom: &crate::asp::Atom) -> FondError {
    FondError::parse(0, format!("malformed controller atom `{}`", atom))
}

fn parse_number(line: usize, text: &str) -> FondResult<usize> {
    text.trim()
        .parse()
        .map_err(|_| FondError::parse(line, format!("expected number, found `{}`", text.trim())))
}

/// Value of a `Name:<n>` header section
fn header_value(section: &[(usize, &str)], name: &str) -> FondResult<usize> {
    let (line, content) = section
        .first()
        .copied()
        .ok_or_else(|| FondError::parse(0, format!("missing `{}` header", name)))?;
    let value = content
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| FondError::parse(line, format!("expected `{}:`, found `{}`", name, content)))?;
    parse_number(line, value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asp::SolverOutput;

    pub(crate) fn answer(atoms: &str) -> Answer {
        let output = SolverOutput::parse(&format!("Answer: 3\n{}\nSATISFIABLE\n", atoms)).unwrap();
        output.last_answer().unwrap().clone()
    }

    fn sample() -> Controller {
        let answer = answer(
            "holds(0,1,1) holds(0,0,1) holds(2,0,0) policy(0,\"move(l1,l2)\") \
             transition(0,\"e1\",2) transition(0,\"e2\",1) policy(1,\"fix()\") transition(1,\"e1\",0)",
        );
        Controller::from_answer(&answer, 2).unwrap()
    }

    #[test]
    fn test_from_answer() {
        let controller = sample();
        assert_eq!(controller.answer(), 3);
        assert_eq!(controller.len(), 3);
        assert_eq!(controller.initial(), 0);
        assert_eq!(controller.goal(), 2);
        assert_eq!(controller.state(0), Some(&State::from_indices(&[1, 1])));
        // state 1 is only a transition target
        assert_eq!(controller.state(1), Some(&State::undefined(2)));
        assert_eq!(controller.policy(0), Some("move(l1,l2)"));
        assert_eq!(controller.successor(0, "e2"), Some(1));
        assert_eq!(controller.successor(0, "e3"), None);
    }

    #[test]
    fn test_transition_without_policy() {
        let answer = answer("holds(0,0,1) transition(0,\"e1\",1)");
        assert!(matches!(
            Controller::from_answer(&answer, 1),
            Err(FondError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_answer() {
        assert!(Controller::from_answer(&answer(""), 1).is_err());
    }

    #[test]
    fn test_text_format() {
        let text = sample().to_text();
        let expected = "ANSWER:3
--------
Initial State:0
--------
Goal State:2
--------
State:0
0=1
1=1
State:1
State:2
0=0
--------
Transitions:
0--move(l1,l2),e1-->2
0--move(l1,l2),e2-->1
1--fix(),e1-->0
--------
Policy:
0-->move(l1,l2)
1-->fix()
--------
";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_text_format_reads_back() {
        let controller = sample();
        let variables = vec![
            Variable::new("var0", vec!["Atom at(l2)".into(), "NegatedAtom at(l2)".into()]),
            Variable::new("var1", vec!["Atom broken()".into(), "NegatedAtom broken()".into()]),
        ];
        let text = controller.to_text_with_variables(&variables);
        assert!(text.contains("var0: [at(l2), not at(l2)]"));
        assert_eq!(Controller::parse_text(&text, 2).unwrap(), controller);
    }

    #[test]
    fn test_parse_text_errors() {
        assert!(Controller::parse_text("ANSWER:1\n--------\n", 2).is_err());
        let broken = sample().to_text().replace("0--move(l1,l2),e1-->2", "0-move");
        assert!(matches!(
            Controller::parse_text(&broken, 2),
            Err(FondError::Parse { .. })
        ));
    }

    #[test]
    fn test_graph_export() {
        let variables = vec![
            Variable::new("var0", vec!["Atom at(l2)".into(), "NegatedAtom at(l2)".into()]),
            Variable::new("var1", vec!["Atom broken()".into(), "NegatedAtom broken()".into()]),
        ];
        let graph = sample().to_graph(&variables);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.nodes[0].kind, 0);
        assert_eq!(graph.nodes[1].kind, 1);
        assert_eq!(graph.nodes[2].kind, 2);
        assert_eq!(graph.nodes[2].sas, "var0=at(l2)");
        assert_eq!(graph.edges[0].label, "move(l1,l2),e1");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        sample().write_json(&path, &variables).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["nodes"][0]["type"], 0);
        assert_eq!(json["edges"].as_array().unwrap().len(), 3);
    }
}
