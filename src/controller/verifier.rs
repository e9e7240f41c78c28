//! Strong-cyclic check of a controller against the non-deterministic model
//!
//! The controller is executed from the real initial state, following every
//! outcome of every policy action. The resulting graph over
//! `(controller state, planning state)` pairs is then searched backwards from
//! the goal: the controller is strong-cyclic iff every node can still reach
//! the goal.

use super::controller::Controller;
use crate::asp::terms::effect_tag;
use crate::error::{FondError, FondResult};
use crate::sas::{entails, progress, Model, State};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::debug;

/// A node of the solution space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceNode {
    pub controller: usize,
    pub state: State,
}

/// Reachability graph built by simulating a controller
#[derive(Debug, Clone, Default)]
pub struct SolutionSpace {
    nodes: Vec<SpaceNode>,
    index: HashMap<(usize, State), usize>,
    successors: Vec<Vec<usize>>,
}

impl SolutionSpace {
    /// Node id of a pair, adding it if unseen; the flag is true for new nodes
    fn intern(&mut self, controller: usize, state: State) -> (usize, bool) {
        if let Some(&id) = self.index.get(&(controller, state.clone())) {
            return (id, false);
        }
        let id = self.nodes.len();
        self.index.insert((controller, state.clone()), id);
        self.nodes.push(SpaceNode { controller, state });
        self.successors.push(Vec::new());
        (id, true)
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if let Some(edges) = self.successors.get_mut(from) {
            if !edges.contains(&to) {
                edges.push(to);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[SpaceNode] {
        &self.nodes
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        self.successors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(Vec::len).sum()
    }

    /// Shortest distance from every node to any node whose controller state
    /// is `goal`; `None` when no path exists
    pub fn distances_to(&self, goal: usize) -> Vec<Option<usize>> {
        let mut predecessors = vec![Vec::new(); self.nodes.len()];
        for (from, targets) in self.successors.iter().enumerate() {
            for &to in targets {
                predecessors[to].push(from);
            }
        }

        let mut distances = vec![None; self.nodes.len()];
        let mut queue = VecDeque::new();
        for (id, node) in self.nodes.iter().enumerate() {
            if node.controller == goal {
                distances[id] = Some(0);
                queue.push_back(id);
            }
        }

        while let Some(node) = queue.pop_front() {
            let next = distances[node].map_or(0, |d: usize| d + 1);
            for &pred in &predecessors[node] {
                if distances[pred].is_none() {
                    distances[pred] = Some(next);
                    queue.push_back(pred);
                }
            }
        }
        distances
    }
}

/// Outcome of a verification run
#[derive(Debug, Clone)]
pub struct Verdict {
    pub strong_cyclic: bool,
    /// Per solution-space node, distance to the goal
    pub distances: Vec<Option<usize>>,
    pub space: SolutionSpace,
}

impl Verdict {
    /// Nodes with no path to the goal
    pub fn dead_ends(&self) -> impl Iterator<Item = &SpaceNode> {
        self.distances
            .iter()
            .zip(self.space.nodes())
            .filter(|(d, _)| d.is_none())
            .map(|(_, n)| n)
    }

    pub fn max_distance(&self) -> Option<usize> {
        self.distances.iter().flatten().copied().max()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Verification:")?;
        writeln!(f, "  Strong cyclic: {}", self.strong_cyclic)?;
        writeln!(f, "  Reachable pairs: {}", self.space.len())?;
        writeln!(f, "  Edges: {}", self.space.edge_count())?;
        writeln!(f, "  Dead ends: {}", self.dead_ends().count())?;
        if let Some(max) = self.max_distance() {
            writeln!(f, "  Longest distance to goal: {}", max)?;
        }
        Ok(())
    }
}

/// Simulate `controller` on `model` and decide whether it is strong-cyclic.
///
/// Fails with a verification error when the controller disagrees with the
/// model: an initial assignment the problem does not satisfy, an unknown or
/// inapplicable policy action, a missing transition for some outcome, or a
/// successor state that does not satisfy the target's assignment.
pub fn verify(controller: &Controller, model: &Model) -> FondResult<Verdict> {
    let initial_id = controller.initial();
    let goal_id = controller.goal();

    let declared = controller
        .state(initial_id)
        .ok_or_else(|| FondError::verification("controller has no initial state"))?;
    if !entails(model.initial(), declared) {
        return Err(FondError::verification(format!(
            "initial state {} does not satisfy controller state {} ({})",
            model.initial(),
            initial_id,
            declared
        )));
    }

    let mut space = SolutionSpace::default();
    let (root, _) = space.intern(initial_id, model.initial().clone());
    let mut open = VecDeque::from([root]);

    while let Some(node) = open.pop_front() {
        let SpaceNode { controller: cid, state } = space.nodes[node].clone();
        if cid == goal_id {
            continue;
        }
        let Some(action) = controller.policy(cid) else {
            // no policy: a dead end without successors
            continue;
        };
        let outcomes = model
            .outcomes(action)
            .ok_or_else(|| FondError::verification(format!("unknown policy action `{}` in state {}", action, cid)))?;

        for (i, outcome) in outcomes.iter().enumerate() {
            let tag = effect_tag(i);
            let next_state = progress(&state, outcome, 0).ok_or_else(|| {
                FondError::verification(format!(
                    "action `{}` is not applicable in {} (controller state {})",
                    action, state, cid
                ))
            })?;
            let next_cid = controller.successor(cid, &tag).ok_or_else(|| {
                FondError::verification(format!("state {} has no transition for `{}`, {}", cid, action, tag))
            })?;
            let expected = controller
                .state(next_cid)
                .ok_or_else(|| FondError::verification(format!("unknown controller state {}", next_cid)))?;
            if !entails(&next_state, expected) {
                return Err(FondError::verification(format!(
                    "{} after `{}`, {} does not satisfy controller state {} ({})",
                    next_state, action, tag, next_cid, expected
                )));
            }

            let (next, is_new) = space.intern(next_cid, next_state);
            space.add_edge(node, next);
            if is_new {
                open.push_back(next);
            }
        }
    }

    let distances = space.distances_to(goal_id);
    let strong_cyclic = distances.iter().all(Option::is_some);
    debug!(nodes = space.len(), edges = space.edge_count(), strong_cyclic, "verified controller");

    Ok(Verdict {
        strong_cyclic,
        distances,
        space,
    })
}
