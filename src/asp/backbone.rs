//! Weak-plan backbone: a size lower bound and optional controller constraints

use super::answer::{Answer, SolverOutput};
use super::solver::{AspSolver, Invocation};
use super::terms::POLICY;
use crate::error::{FondError, FondResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// How the backbone is imposed on the controller search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneStyle {
    /// Pin the plan as the controller states `0..k` followed by the goal state
    #[default]
    Strict,
    /// Only require every plan action to appear in some policy
    Loose,
}

/// One step of a weak plan: an operator and the outcome it was assumed to have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackboneStep {
    pub step: usize,
    pub action: String,
    pub effect: String,
}

/// A weak plan found by the classical solver program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Backbone {
    steps: Vec<BackboneStep>,
}

impl Backbone {
    /// Create a backbone from steps in plan order
    pub fn new(steps: Vec<BackboneStep>) -> Self {
        Self { steps }
    }

    /// Read the plan from `policy(step, "action", "effect")` atoms.
    ///
    /// Atoms with a negative step are placeholders and are ignored.
    pub fn from_answer(answer: &Answer) -> FondResult<Self> {
        let mut steps = Vec::new();
        for atom in answer.atoms_of(POLICY, 3) {
            let Some(step) = atom.int(0) else {
                return Err(FondError::parse(0, format!("malformed backbone atom `{}`", atom)));
            };
            let Ok(step) = usize::try_from(step) else {
                continue;
            };
            let (Some(action), Some(effect)) = (atom.text(1), atom.text(2)) else {
                return Err(FondError::parse(0, format!("malformed backbone atom `{}`", atom)));
            };
            steps.push(BackboneStep {
                step,
                action: action.to_string(),
                effect: effect.to_string(),
            });
        }
        steps.sort_by_key(|s| s.step);
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[BackboneStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Constraint program text in the requested style
    pub fn constraints(&self, style: BackboneStyle) -> String {
        match style {
            BackboneStyle::Strict => self.strict_constraints(),
            BackboneStyle::Loose => self.loose_constraints(),
        }
    }

    fn strict_constraints(&self) -> String {
        let mut lines = Vec::new();
        let last = self.steps.len();
        for (state, step) in self.steps.iter().enumerate() {
            lines.push(format!("policy({}, \"{}\").", state, step.action));
            if state + 1 == last {
                lines.push(format!("transition({}, \"{}\", X) :- goalState(X).", state, step.effect));
            } else {
                lines.push(format!("transition({}, \"{}\", {}).", state, step.effect, state + 1));
            }
        }
        if last > 0 {
            lines.push(format!("backboneState(0..{}).", last - 1));
        }
        lines.push("backboneState(X) :- goalState(X).".to_string());
        lines.join("\n") + "\n"
    }

    fn loose_constraints(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                format!(
                    ":- {{policy(State, Action): state(State), Action = \"{}\"}} 0.\n",
                    step.action
                )
            })
            .collect()
    }
}

/// Result of the weak-plan search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackboneEstimate {
    Found(Backbone),
    /// Not even a weak plan exists, so no controller does
    Unsolvable,
    TimedOut,
}

/// Run the weak-plan search once and write its raw output to `output_file`
pub fn estimate_backbone(
    solver: &mut dyn AspSolver,
    invocation: &Invocation,
    output_file: &Path,
    budget: Option<Duration>,
) -> FondResult<BackboneEstimate> {
    let run = solver.run(invocation, budget)?;
    std::fs::write(output_file, run.stdout())?;
    if run.is_timed_out() {
        info!("Weak plan search timed out");
        return Ok(BackboneEstimate::TimedOut);
    }

    let output = SolverOutput::parse(run.stdout())?;
    let backbone = match output.last_answer() {
        Some(answer) if output.is_satisfiable() => Backbone::from_answer(answer)?,
        _ => Backbone::default(),
    };

    if backbone.is_empty() {
        info!("No weak plan exists; the problem has no solution");
        return Ok(BackboneEstimate::Unsolvable);
    }
    debug!(size = backbone.len(), "backbone found");
    Ok(BackboneEstimate::Found(backbone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asp::solver::SolverRun;

    fn backbone() -> Backbone {
        let answer = SolverOutput::parse(
            "Answer: 1\npolicy(1,\"fix()\",\"e1\") policy(-1,-1,-1) policy(0,\"move(l1,l2)\",\"e2\")\nSATISFIABLE\n",
        )
        .unwrap();
        Backbone::from_answer(answer.last_answer().unwrap()).unwrap()
    }

    struct Canned(&'static str);

    impl AspSolver for Canned {
        fn run(&mut self, _: &Invocation, _: Option<Duration>) -> FondResult<SolverRun> {
            Ok(SolverRun::Finished {
                stdout: self.0.to_string(),
            })
        }
    }

    #[test]
    fn test_backbone_from_answer() {
        let backbone = backbone();
        assert_eq!(backbone.len(), 2);
        assert_eq!(backbone.steps()[0].action, "move(l1,l2)");
        assert_eq!(backbone.steps()[0].effect, "e2");
        assert_eq!(backbone.steps()[1].action, "fix()");
    }

    #[test]
    fn test_strict_constraints() {
        let text = backbone().constraints(BackboneStyle::Strict);
        assert_eq!(
            text,
            "policy(0, \"move(l1,l2)\").\n\
             transition(0, \"e2\", 1).\n\
             policy(1, \"fix()\").\n\
             transition(1, \"e1\", X) :- goalState(X).\n\
             backboneState(0..1).\n\
             backboneState(X) :- goalState(X).\n"
        );
    }

    #[test]
    fn test_loose_constraints() {
        let text = backbone().constraints(BackboneStyle::Loose);
        assert_eq!(text.lines().count(), 2);
        assert!(text.starts_with(":- {policy(State, Action): state(State), Action = \"move(l1,l2)\"} 0."));
    }

    #[test]
    fn test_estimate_found_and_unsolvable() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("weak_plan.out");
        let invocation = Invocation::new(dir.path());

        let mut sat = Canned("Answer: 1\npolicy(0,\"fix()\",\"e1\")\nSATISFIABLE\n");
        match estimate_backbone(&mut sat, &invocation, &out, None).unwrap() {
            BackboneEstimate::Found(b) => assert_eq!(b.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(std::fs::read_to_string(&out).unwrap().contains("SATISFIABLE"));

        let mut unsat = Canned("Solving...\nUNSATISFIABLE\n");
        assert_eq!(
            estimate_backbone(&mut unsat, &invocation, &out, None).unwrap(),
            BackboneEstimate::Unsolvable
        );
    }
}
