//! Extra constraint programs merged into every controller search call

use super::answer::{Answer, SolverOutput};
use super::solver::{AspSolver, Invocation};
use super::terms::{UNDO, UNDO_CONSTRAINTS};
use crate::error::{FondError, FondResult};
use crate::sas::Model;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// A named constraint program; written to `<name>.lp` in the run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFile {
    pub name: String,
    pub contents: String,
}

impl ConstraintFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    /// Copy renamed to `constraint_<index>_<name>`, distinct from every run artefact
    pub fn numbered(&self, index: usize) -> Self {
        Self::new(format!("constraint_{}_{}", index, self.name), self.contents.clone())
    }

    /// Write the program into `dir` and return its path
    pub fn write_to(&self, dir: &Path) -> FondResult<PathBuf> {
        let path = dir.join(format!("{}.lp", self.name));
        std::fs::write(&path, &self.contents)?;
        Ok(path)
    }
}

/// Source of additional knowledge about a problem, expressed as constraint programs
pub trait ConstraintProvider {
    fn constraints(&self, model: &Model) -> FondResult<Vec<ConstraintFile>>;
}

/// Constraint programs read verbatim from disk
#[derive(Debug, Clone, Default)]
pub struct StaticConstraints {
    files: Vec<PathBuf>,
}

impl StaticConstraints {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }
}

impl ConstraintProvider for StaticConstraints {
    fn constraints(&self, _model: &Model) -> FondResult<Vec<ConstraintFile>> {
        let mut result = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let contents = std::fs::read_to_string(path)?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| FondError::Config(format!("invalid constraint file {}", path.display())))?;
            result.push(ConstraintFile::new(name, contents));
        }
        Ok(result)
    }
}

/// An action pair where the second undoes the first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPair {
    pub first: String,
    pub second: String,
}

/// Operator name without arguments: `move(l1,l2)` has type `move`
pub fn action_type(action: &str) -> &str {
    action.split('(').next().unwrap_or(action).trim()
}

/// Collect `undo("a1","a2")` atoms
pub fn undo_pairs(answer: &Answer) -> Vec<UndoPair> {
    answer
        .atoms_of(UNDO, 2)
        .filter_map(|atom| {
            Some(UndoPair {
                first: atom.text(0)?.to_string(),
                second: atom.text(1)?.to_string(),
            })
        })
        .collect()
}

/// Forbid a policy from following an action with the action that undoes it.
///
/// With `by_type`, a pair whose operators have different types is lifted to
/// one constraint over the two types; the first pair seen for a type decides
/// its partner.
pub fn undo_constraints(pairs: &[UndoPair], by_type: bool) -> String {
    let mut lines = Vec::new();
    let mut type_pairs: IndexMap<&str, &str> = IndexMap::new();

    for pair in pairs {
        let (t1, t2) = (action_type(&pair.first), action_type(&pair.second));
        if by_type && t1 != t2 {
            type_pairs.entry(t1).or_insert(t2);
        } else {
            lines.push(format!(
                ":- {{policy(S2, \"{}\"): policy(S1, \"{}\"), transition(S1,\"e1\", S2)}}!=0.",
                pair.second, pair.first
            ));
        }
    }

    for (t1, t2) in type_pairs {
        lines.push(format!(
            ":- {{policy(S2, A2): policy(S1, A1), actionType(\"{}\", A1), actionType(\"{}\", A2), transition(S1,\"e1\", S2)}}!=0.",
            t1, t2
        ));
    }

    lines.iter().map(|l| format!("{}\n", l)).collect()
}

/// Run the undo-detection program once and compile its answer into constraints.
///
/// The raw solver output is kept in `output_file`.
pub fn compile_undo_filter(
    solver: &mut dyn AspSolver,
    invocation: &Invocation,
    output_file: &Path,
    budget: Option<Duration>,
    by_type: bool,
) -> FondResult<ConstraintFile> {
    let run = solver.run(invocation, budget)?;
    std::fs::write(output_file, run.stdout())?;

    let output = SolverOutput::parse(run.stdout())?;
    let pairs = output.last_answer().map(undo_pairs).unwrap_or_default();
    if run.is_timed_out() {
        info!("Undo detection timed out; using {} pairs found so far", pairs.len());
    }
    debug!(pairs = pairs.len(), by_type, "compiled undo filter");

    Ok(ConstraintFile::new(UNDO_CONSTRAINTS, undo_constraints(&pairs, by_type)))
}
