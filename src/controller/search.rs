//! Controller size search and the end-to-end solving pipeline

use super::controller::Controller;
use super::verifier::{verify, Verdict};
use crate::asp::backbone::{estimate_backbone, BackboneEstimate};
use crate::asp::constraints::{compile_undo_filter, ConstraintProvider, StaticConstraints};
use crate::asp::encoder::{Flavor, InstanceEncoder};
use crate::asp::solver::{AspSolver, Invocation};
use crate::asp::terms::*;
use crate::asp::SolverOutput;
use crate::config::Settings;
use crate::error::{describe_budget, FondResult};
use crate::sas::{load_sas, Model, ModelStatistics};
use anyhow::{Context, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Candidate controller sizes: `min`, `min + inc`, ... up to `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSearch {
    pub min: usize,
    pub max: usize,
    pub inc: usize,
}

/// Terminal result of a solving run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// The initial state already satisfies the goal
    Trivial,
    /// A controller was found at `size`; it has `states = size + 1` states
    Solved {
        size: usize,
        states: usize,
        output: PathBuf,
    },
    /// The weak-plan search proved that no controller exists
    Unsolvable,
    /// Every size up to the maximum was unsatisfiable
    Exhausted { max: usize },
    /// The time budget ran out while trying `size`
    TimedOut { size: usize },
}

impl SolveOutcome {
    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Trivial | SolveOutcome::Solved { .. })
    }
}

impl fmt::Display for SolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveOutcome::Trivial => write!(f, "goal holds in the initial state (1 state)"),
            SolveOutcome::Solved { size, states, .. } => {
                write!(f, "solution found with numStates={} ({} controller states)", size, states)
            }
            SolveOutcome::Unsolvable => write!(f, "no solution exists (no weak plan)"),
            SolveOutcome::Exhausted { max } => write!(f, "no solution with at most {} states", max),
            SolveOutcome::TimedOut { size } => write!(f, "timed out with numStates={}", size),
        }
    }
}

/// One wall-clock budget shared by every solver call of a run
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Start the clock now
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time left, or `None` when unlimited
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.start.elapsed()))
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }
}

/// Inputs shared by every attempt of the size search
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub controller_model: PathBuf,
    pub instance: PathBuf,
    /// Additional programs, in the order they are passed to the solver
    pub constraints: Vec<PathBuf>,
    pub args: Vec<String>,
    pub output_dir: PathBuf,
}

impl SearchPlan {
    /// Solver call for candidate size `size`
    pub fn invocation(&self, size: usize) -> Invocation {
        Invocation::new(&self.output_dir)
            .input(&self.controller_model)
            .input(&self.instance)
            .inputs(self.constraints.iter().cloned())
            .args(["-c".to_string(), format!("{}={}", NUM_STATES_CONSTANT, size)])
            .args(self.args.iter().cloned())
    }

    pub fn output_file(&self, size: usize) -> PathBuf {
        self.output_dir.join(output_file_name(size))
    }
}

/// Try sizes in increasing order until the solver finds a controller.
///
/// The first size is always attempted, even when it exceeds the maximum.
/// Each attempt's raw output is kept in `clingo_out_<n>.out`.
pub fn search_sizes(
    solver: &mut dyn AspSolver,
    plan: &SearchPlan,
    sizes: SizeSearch,
    deadline: &Deadline,
) -> FondResult<SolveOutcome> {
    let mut size = sizes.min;
    loop {
        if size != sizes.min && size > sizes.max {
            info!(max = sizes.max, "No solution within the size limit");
            return Ok(SolveOutcome::Exhausted { max: sizes.max });
        }

        let out_file = plan.output_file(size);
        if deadline.expired() {
            mark_timed_out(&out_file, deadline)?;
            info!(size, "Timed out before attempt");
            return Ok(SolveOutcome::TimedOut { size });
        }

        info!(size, remaining = %describe_budget(deadline.remaining()), "Solving with numStates={}", size);
        let run = solver.run(&plan.invocation(size), deadline.remaining())?;
        std::fs::write(&out_file, run.stdout())?;

        if run.is_timed_out() {
            mark_timed_out(&out_file, deadline)?;
            info!(size, "Timed out with numStates={}", size);
            return Ok(SolveOutcome::TimedOut { size });
        }

        let output = SolverOutput::parse(run.stdout())?;
        if output.is_satisfiable() {
            info!(size, states = size + 1, "Solution found");
            return Ok(SolveOutcome::Solved {
                size,
                states: size + 1,
                output: out_file,
            });
        }
        debug!(size, status = ?output.status, "no controller at this size");
        size += sizes.inc.max(1);
    }
}

fn mark_timed_out(path: &Path, deadline: &Deadline) -> FondResult<()> {
    let limit = deadline.limit().map(|d| d.as_secs_f64()).unwrap_or(0.0);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}{}.", TIMED_OUT_MARKER, limit)?;
    Ok(())
}

/// Delete `clingo_out_*` files left by an earlier run
pub fn remove_old_outputs(dir: &Path) -> FondResult<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_str().and_then(output_file_size).is_some() {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Summary of a full solving run
#[derive(Debug, Clone)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    pub statistics: ModelStatistics,
    pub backbone: Option<usize>,
    pub verification: Option<VerifyReport>,
    pub elapsed: Duration,
}

/// Run the whole pipeline: parse, encode, estimate, search and check.
///
/// All artefacts go to the configured output directory, which afterwards is
/// self-contained for [`verify_run_dir`].
pub fn solve(
    settings: &Settings,
    solver: &mut dyn AspSolver,
    providers: &[&dyn ConstraintProvider],
) -> Result<SolveReport> {
    let start = Instant::now();
    let dir = prepare_output_dir(&settings.output.directory)?;

    let model = load_sas(&settings.input.sas_file)?;
    copy_into(&settings.input.sas_file, &dir.join(FILE_SAS))?;
    let statistics = model.statistics();
    info!(
        variables = statistics.variables,
        operators = statistics.deterministic_operators + statistics.nondeterministic_operators,
        "Loaded {}",
        settings.input.sas_file.display()
    );

    let mut report = SolveReport {
        outcome: SolveOutcome::Trivial,
        statistics,
        backbone: None,
        verification: None,
        elapsed: Duration::ZERO,
    };

    if model.goal_reached_initially() {
        info!("Goal met in the initial state");
        report.elapsed = start.elapsed();
        return Ok(report);
    }

    let encoder = InstanceEncoder::new(&model, settings.encoding);
    let instance = dir.join(FILE_INSTANCE);
    encoder
        .write_to(Flavor::Controller, &instance)
        .with_context(|| format!("Failed to write instance: {}", instance.display()))?;

    let deadline = Deadline::new(settings.time_limit());
    let mut sizes = settings.size_search();
    let mut constraints = Vec::new();

    if settings.backbone.enabled {
        let weak_instance = dir.join(FILE_INSTANCE_WEAK);
        encoder.write_to(Flavor::WeakPlan, &weak_instance)?;

        let mut invocation = Invocation::new(&dir)
            .input(absolute(&settings.backbone.weak_plan_program)?)
            .input(&weak_instance)
            .args(["--stats"]);
        if let Some(kb) = &settings.backbone.sequential_knowledge {
            invocation = invocation.input(absolute(kb)?);
        }

        let estimate = estimate_backbone(solver, &invocation, &dir.join(FILE_WEAK_PLAN_OUT), deadline.remaining())
            .context("Backbone estimation failed")?;
        match estimate {
            BackboneEstimate::Unsolvable => {
                std::fs::write(dir.join(FILE_UNSAT), "Unsat")?;
                report.outcome = SolveOutcome::Unsolvable;
                report.elapsed = start.elapsed();
                return Ok(report);
            }
            BackboneEstimate::TimedOut => {
                report.outcome = SolveOutcome::TimedOut { size: sizes.min };
                report.elapsed = start.elapsed();
                return Ok(report);
            }
            BackboneEstimate::Found(backbone) => {
                info!(size = backbone.len(), "Backbone found");
                report.backbone = Some(backbone.len());
                sizes.min = sizes.min.max(backbone.len());
                if !settings.backbone.size_only {
                    let path = dir.join(FILE_BACKBONE);
                    std::fs::write(&path, backbone.constraints(settings.backbone.style))?;
                    constraints.push(path);
                }
            }
        }
    }

    let removed = remove_old_outputs(&dir)?;
    if removed > 0 {
        debug!(removed, "removed old solver outputs");
    }

    let controller_model = copy_program(&settings.solver.controller_model, &dir)?;

    if let Some(undo_program) = &settings.constraints.undo_program {
        let invocation = Invocation::new(&dir)
            .input(&instance)
            .input(absolute(undo_program)?)
            .args(["--stats"]);
        let file = compile_undo_filter(
            solver,
            &invocation,
            &dir.join(FILE_UNDO_OUT),
            deadline.remaining(),
            settings.constraints.undo_by_type,
        )
        .context("Undo action detection failed")?;
        constraints.push(file.write_to(&dir)?);
    }

    let static_constraints = StaticConstraints::new(settings.constraints.files.clone());
    let mut all_providers: Vec<&dyn ConstraintProvider> = vec![&static_constraints];
    all_providers.extend_from_slice(providers);
    let mut index = 0;
    for provider in all_providers {
        for file in provider.constraints(&model)? {
            index += 1;
            constraints.push(file.numbered(index).write_to(&dir)?);
        }
    }

    let plan = SearchPlan {
        controller_model,
        instance,
        constraints,
        args: settings.solver.args.clone(),
        output_dir: dir.clone(),
    };
    report.outcome = search_sizes(solver, &plan, sizes, &deadline)?;

    if matches!(report.outcome, SolveOutcome::Solved { .. }) {
        if settings.output.verify {
            report.verification = Some(verify_run_dir(&dir)?);
        } else if settings.output.dump_controller {
            dump_controller(&dir)?;
        }
    }

    report.elapsed = start.elapsed();
    Ok(report)
}

fn prepare_output_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    absolute(dir)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("File not found: {}", path.display()))
}

/// Copy `from` to `to` unless they are already the same file
fn copy_into(from: &Path, to: &Path) -> Result<()> {
    if to.exists() && absolute(from)? == absolute(to)? {
        return Ok(());
    }
    std::fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Copy a program into the run directory and return the copy's path
fn copy_program(program: &Path, dir: &Path) -> Result<PathBuf> {
    let name = program
        .file_name()
        .with_context(|| format!("Invalid program path: {}", program.display()))?;
    let target = dir.join(name);
    copy_into(program, &target)?;
    Ok(target)
}

/// Result of checking a run directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub dir: PathBuf,
    pub sound: bool,
    pub timed_out: bool,
    pub controller_states: usize,
    pub reachable_pairs: usize,
}

/// Solver output with the largest candidate size in `dir`
pub fn last_output_file(dir: &Path) -> Result<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let entry = entry?;
        let Some(size) = entry.file_name().to_str().and_then(output_file_size) else {
            continue;
        };
        if best.as_ref().map_or(true, |(b, _)| size > *b) {
            best = Some((size, entry.path()));
        }
    }
    best.map(|(_, path)| path)
        .with_context(|| format!("No solver output found in {}", dir.display()))
}

/// Rebuild the controller from the last solver output of a run directory and
/// write `controller.out` and `controller.json`.
///
/// Returns `None` when the last attempt timed out.
pub fn dump_controller(dir: &Path) -> Result<Option<(Controller, Model)>> {
    let last = last_output_file(dir)?;
    let text = std::fs::read_to_string(&last).with_context(|| format!("Failed to read {}", last.display()))?;
    // a killed solver may leave the last answer line cut off
    if text.contains(TIMED_OUT_MARKER) {
        warn!("Solution timed out, cannot build controller: {}", last.display());
        return Ok(None);
    }
    let output = SolverOutput::parse(&text).with_context(|| format!("Failed to parse {}", last.display()))?;
    let answer = output
        .last_answer()
        .filter(|_| output.is_satisfiable())
        .with_context(|| format!("No controller in {}", last.display()))?;

    let model = load_sas(dir.join(FILE_SAS))?;
    let controller = Controller::from_answer(answer, model.variables().len())
        .with_context(|| format!("Failed to build controller from {}", last.display()))?;

    let text_file = dir.join(FILE_CONTROLLER_TEXT);
    std::fs::write(&text_file, controller.to_text_with_variables(model.variables()))
        .with_context(|| format!("Failed to write {}", text_file.display()))?;
    controller.write_json(&dir.join(FILE_CONTROLLER_JSON), model.variables())?;

    Ok(Some((controller, model)))
}

/// Check the controller of a run directory and write `verify.out`
pub fn verify_run_dir(dir: &Path) -> Result<VerifyReport> {
    let report = match dump_controller(dir)? {
        Some((controller, model)) => {
            let verdict: Verdict = verify(&controller, &model)
                .with_context(|| format!("Verification failed in {}", dir.display()))?;
            info!("Solution is sound? {}", verdict.strong_cyclic);
            VerifyReport {
                dir: dir.to_path_buf(),
                sound: verdict.strong_cyclic,
                timed_out: false,
                controller_states: controller.len(),
                reachable_pairs: verdict.space.len(),
            }
        }
        None => {
            info!("Solution is sound? true because of time out.");
            VerifyReport {
                dir: dir.to_path_buf(),
                sound: true,
                timed_out: true,
                controller_states: 0,
                reachable_pairs: 0,
            }
        }
    };

    let verify_file = dir.join(FILE_VERIFY);
    std::fs::write(
        &verify_file,
        format!("Solution is sound: {}\nTimed Out: {}", report.sound, report.timed_out),
    )
    .with_context(|| format!("Failed to write {}", verify_file.display()))?;
    Ok(report)
}
