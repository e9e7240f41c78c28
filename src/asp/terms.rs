//! Predicate vocabulary and file names shared with the logic programs

pub const VARIABLE: &str = "variable";
pub const VARIABLE_VALUE: &str = "variableValue";
pub const MUTEX_GROUP: &str = "mutexGroup";
pub const MUTEX: &str = "mutex";
pub const HOLDS: &str = "holds";
pub const INITIAL_STATE: &str = "initialState";
pub const GOAL_STATE: &str = "goalState";
pub const GOAL: &str = "goal";
pub const ACTION_TYPE: &str = "actionType";
pub const ACTION: &str = "action";
pub const PRECONDITION: &str = "precondition";
pub const NUM_EFFECTS: &str = "numEffects";
pub const ACTION_EFFECT: &str = "actionEffect";
pub const ADD: &str = "add";
pub const DEL: &str = "del";
pub const NOT_AFFECTS: &str = "notaffects";
pub const PRECEDENCE: &str = "precedence";
pub const MAX_ND: &str = "maxND";
pub const POLICY: &str = "policy";
pub const TRANSITION: &str = "transition";
pub const UNDO: &str = "undo";

/// Prefix of effect tags: outcome `i` of a group is `e{i+1}`
pub const EFFECT_PREFIX: &str = "e";

/// Constant the controller model reads the candidate size from
pub const NUM_STATES_CONSTANT: &str = "numStates";

/// Section divider of the controller text format
pub const DIVIDER: &str = "--------";

pub const FILE_INSTANCE: &str = "instance.lp";
pub const FILE_INSTANCE_WEAK: &str = "instance_weak.lp";
pub const FILE_WEAK_PLAN_OUT: &str = "weak_plan.out";
pub const FILE_BACKBONE: &str = "backbone.lp";
pub const FILE_UNSAT: &str = "unsat.out";
pub const FILE_UNDO_OUT: &str = "undo_actions.out";
/// Name of the undo filter program, written to `undo_actions.lp`
pub const UNDO_CONSTRAINTS: &str = "undo_actions";
pub const FILE_SAS: &str = "output.sas";
pub const FILE_CONTROLLER_TEXT: &str = "controller.out";
pub const FILE_CONTROLLER_JSON: &str = "controller.json";
pub const FILE_VERIFY: &str = "verify.out";

/// Solver outputs are written to `clingo_out_<n>.out`
pub const CLINGO_OUTPUT_PREFIX: &str = "clingo_out_";

/// Marker appended to an output file when the attempt ran out of time
pub const TIMED_OUT_MARKER: &str = "Timed out with time limit=";

/// Tag of the `index`-th (0-based) outcome of a group
pub fn effect_tag(index: usize) -> String {
    format!("{}{}", EFFECT_PREFIX, index + 1)
}

/// Inverse of [`effect_tag`]
pub fn effect_index(tag: &str) -> Option<usize> {
    tag.strip_prefix(EFFECT_PREFIX)?
        .parse::<usize>()
        .ok()?
        .checked_sub(1)
}

/// File name of the solver output for candidate size `size`
pub fn output_file_name(size: usize) -> String {
    format!("{}{}.out", CLINGO_OUTPUT_PREFIX, size)
}

/// Candidate size encoded in a solver output file name
pub fn output_file_size(name: &str) -> Option<usize> {
    name.strip_prefix(CLINGO_OUTPUT_PREFIX)?
        .strip_suffix(".out")?
        .parse()
        .ok()
}
