//! Reader for the block-structured SAS translator output
//!
//! Recognised blocks: `begin_variable`, `begin_operator`, `begin_state`,
//! `begin_goal` and `begin_mutex_group`. Everything outside a block (version,
//! metric, counts, axioms) is skipped.

use super::action::{Action, ActionName, ValueChange};
use super::model::Model;
use super::state::{State, Value, Variable};
use crate::error::{FondError, FondResult};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Load and parse a SAS file
pub fn load_sas<P: AsRef<Path>>(path: P) -> Result<Model> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read SAS file: {}", path.as_ref().display()))?;

    let model = parse_sas(&content)
        .with_context(|| format!("Failed to parse SAS file: {}", path.as_ref().display()))?;

    debug!(
        variables = model.variables().len(),
        actions = model.action_count(),
        "parsed SAS model"
    );
    Ok(model)
}

/// Parse SAS text into a model
pub fn parse_sas(content: &str) -> FondResult<Model> {
    let mut cursor = Cursor::new(content);
    let mut variables = Vec::new();
    let mut operators = Vec::new();
    let mut initial: Option<(usize, Vec<usize>)> = None;
    let mut goal = Vec::new();
    let mut mutexes = Vec::new();

    while let Some((line_no, line)) = cursor.next() {
        match line {
            "begin_variable" => variables.push(parse_variable(&mut cursor)?),
            "begin_operator" => operators.push(parse_operator(&mut cursor)?),
            "begin_state" => initial = Some((line_no, parse_initial(&mut cursor)?)),
            "begin_goal" => goal = parse_pairs(&mut cursor, "end_goal")?,
            "begin_mutex_group" => mutexes.push(parse_pairs(&mut cursor, "end_mutex_group")?),
            _ => {}
        }
    }

    let domain_sizes: Vec<usize> = variables.iter().map(Variable::domain_size).collect();
    let num_variables = variables.len();

    let (state_line, values) =
        initial.ok_or_else(|| FondError::parse(cursor.last_line(), "missing begin_state block"))?;
    if values.len() != num_variables {
        return Err(FondError::parse(
            state_line,
            format!(
                "initial state has {} values but there are {} variables",
                values.len(),
                num_variables
            ),
        ));
    }
    for (var, &value) in values.iter().enumerate() {
        check_value(&domain_sizes, state_line, var, value)?;
    }
    let initial = State::from_indices(&values);

    let goal = to_state(&domain_sizes, &goal)?;
    let mutexes = mutexes
        .iter()
        .map(|pairs| to_state(&domain_sizes, pairs))
        .collect::<FondResult<Vec<_>>>()?;

    let mut actions = Vec::with_capacity(operators.len());
    for op in operators {
        actions.push(op.build(&domain_sizes)?);
    }

    Ok(Model::new(variables, initial, goal, mutexes, actions))
}

/// A `(line, var, value)` triple read from a sparse block
type Pair = (usize, usize, usize);

/// Operator block before it is checked against the variables
struct RawOperator {
    line: usize,
    name: ActionName,
    prevail: Vec<Pair>,
    changes: Vec<(usize, usize, i64, usize)>,
    cost: u32,
}

impl RawOperator {
    fn build(self, domain_sizes: &[usize]) -> FondResult<Action> {
        let mut precondition = State::undefined(domain_sizes.len());
        for &(line, var, value) in &self.prevail {
            check_value(domain_sizes, line, var, value)?;
            precondition.set(var, Value::Defined(value));
        }

        let mut changes = Vec::with_capacity(self.changes.len());
        for &(line, var, prev, next) in &self.changes {
            check_value(domain_sizes, line, var, next)?;
            let prev = Value::from_raw(prev)
                .ok_or_else(|| FondError::parse(line, format!("invalid previous value {}", prev)))?;
            if let Value::Defined(p) = prev {
                check_value(domain_sizes, line, var, p)?;
            }
            changes.push(ValueChange { var, prev, next });
        }

        if changes.is_empty() {
            debug!(line = self.line, name = %self.name.name, "operator without effects");
        }
        Ok(Action::new(self.name, precondition, &changes, self.cost, domain_sizes))
    }
}

fn parse_variable(cursor: &mut Cursor<'_>) -> FondResult<Variable> {
    let (_, name) = cursor.line("variable name")?;
    let name = name.to_string();
    let _axiom_layer = cursor.int("axiom layer")?;
    let size = cursor.count("domain size")?;
    let mut domain = Vec::with_capacity(size);
    for _ in 0..size {
        let (_, label) = cursor.line("domain value")?;
        domain.push(label.to_string());
    }
    cursor.end("end_variable")?;
    Ok(Variable::new(name, domain))
}

fn parse_operator(cursor: &mut Cursor<'_>) -> FondResult<RawOperator> {
    let (line, header) = cursor.line("operator name")?;
    let name = ActionName::parse(header)
        .ok_or_else(|| FondError::parse(line, "empty operator name"))?;

    let num_prevail = cursor.count("precondition count")?;
    let mut prevail = Vec::with_capacity(num_prevail);
    for _ in 0..num_prevail {
        let (line, ints) = cursor.ints("precondition", 2)?;
        prevail.push((line, to_index(line, ints[0])?, to_index(line, ints[1])?));
    }

    let num_effects = cursor.count("effect count")?;
    let mut changes = Vec::with_capacity(num_effects);
    for _ in 0..num_effects {
        let (line, ints) = cursor.ints("effect", 4)?;
        if ints[0] != 0 {
            return Err(FondError::parse(line, "conditional effects are not supported"));
        }
        changes.push((line, to_index(line, ints[1])?, ints[2], to_index(line, ints[3])?));
    }

    let cost = cursor.int("operator cost")?;
    let cost = u32::try_from(cost)
        .map_err(|_| FondError::parse(cursor.last_line(), format!("invalid cost {}", cost)))?;
    cursor.end("end_operator")?;

    Ok(RawOperator {
        line,
        name,
        prevail,
        changes,
        cost,
    })
}

fn parse_initial(cursor: &mut Cursor<'_>) -> FondResult<Vec<usize>> {
    let mut values = Vec::new();
    loop {
        let (line, text) = cursor.line("initial state value or end_state")?;
        if text == "end_state" {
            return Ok(values);
        }
        values.push(to_index(line, parse_int(line, text)?)?);
    }
}

fn parse_pairs(cursor: &mut Cursor<'_>, end: &str) -> FondResult<Vec<Pair>> {
    let count = cursor.count("pair count")?;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let (line, ints) = cursor.ints("variable/value pair", 2)?;
        pairs.push((line, to_index(line, ints[0])?, to_index(line, ints[1])?));
    }
    cursor.end(end)?;
    Ok(pairs)
}

fn to_state(domain_sizes: &[usize], pairs: &[Pair]) -> FondResult<State> {
    let mut state = State::undefined(domain_sizes.len());
    for &(line, var, value) in pairs {
        check_value(domain_sizes, line, var, value)?;
        state.set(var, Value::Defined(value));
    }
    Ok(state)
}

fn check_value(domain_sizes: &[usize], line: usize, var: usize, value: usize) -> FondResult<()> {
    match domain_sizes.get(var) {
        None => Err(FondError::parse(
            line,
            format!("variable {} out of range ({} variables)", var, domain_sizes.len()),
        )),
        Some(&size) if value >= size => Err(FondError::parse(
            line,
            format!("value {} out of range for variable {} (domain size {})", value, var, size),
        )),
        Some(_) => Ok(()),
    }
}

fn parse_int(line: usize, text: &str) -> FondResult<i64> {
    text.parse::<i64>()
        .map_err(|_| FondError::parse(line, format!("expected integer, found `{}`", text)))
}

fn to_index(line: usize, value: i64) -> FondResult<usize> {
    usize::try_from(value)
        .map_err(|_| FondError::parse(line, format!("expected non-negative integer, found {}", value)))
}

/// Line cursor with 1-based line numbers; blank lines are skipped
struct Cursor<'a> {
    lines: Vec<(usize, &'a str)>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(content: &'a str) -> Self {
        let lines = content
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty())
            .collect();
        Self { lines, pos: 0 }
    }

    fn next(&mut self) -> Option<(usize, &'a str)> {
        let item = self.lines.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    /// Line number of the last line consumed, or of the end of input
    fn last_line(&self) -> usize {
        match self.pos.checked_sub(1).and_then(|p| self.lines.get(p)) {
            Some((line, _)) => *line,
            None => self.lines.last().map(|(l, _)| *l).unwrap_or(0),
        }
    }

    fn line(&mut self, what: &str) -> FondResult<(usize, &'a str)> {
        let last = self.last_line();
        self.next()
            .ok_or_else(|| FondError::parse(last, format!("unexpected end of input, expected {}", what)))
    }

    fn int(&mut self, what: &str) -> FondResult<i64> {
        let (line, text) = self.line(what)?;
        parse_int(line, text)
    }

    fn count(&mut self, what: &str) -> FondResult<usize> {
        let (line, text) = self.line(what)?;
        to_index(line, parse_int(line, text)?)
    }

    /// Read one line of at least `n` whitespace-separated integers
    fn ints(&mut self, what: &str, n: usize) -> FondResult<(usize, Vec<i64>)> {
        let (line, text) = self.line(what)?;
        let ints = text
            .split_whitespace()
            .map(|t| parse_int(line, t))
            .collect::<FondResult<Vec<_>>>()?;
        if ints.len() < n {
            return Err(FondError::parse(
                line,
                format!("expected {} integers for {}, found {}", n, what, ints.len()),
            ));
        }
        Ok((line, ints))
    }

    fn end(&mut self, tag: &str) -> FondResult<()> {
        let (line, text) = self.line(tag)?;
        if text == tag {
            Ok(())
        } else {
            Err(FondError::parse(line, format!("expected `{}`, found `{}`", tag, text)))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two variables; `move` either reaches the goal or stays, `fix` is deterministic
    pub(crate) const SMALL_SAS: &str = "begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
2
Atom at(l2)
NegatedAtom at(l2)
end_variable
begin_variable
var1
-1
2
Atom broken()
NegatedAtom broken()
end_variable
1
begin_mutex_group
2
0 0
1 0
end_mutex_group
begin_state
1
1
end_state
begin_goal
1
0 0
end_goal
3
begin_operator
move_DETDUP_0 l1 l2
1
1 1
1
0 0 1 0
1
end_operator
begin_operator
move_DETDUP_1 l1 l2
1
1 1
1
0 1 -1 0
1
end_operator
begin_operator
fix
0
1
0 1 0 1
1
end_operator
0
";

    #[test]
    fn test_parse_small_problem() {
        let model = parse_sas(SMALL_SAS).unwrap();
        assert_eq!(model.variables().len(), 2);
        assert_eq!(model.variables()[0].domain, vec!["Atom at(l2)", "NegatedAtom at(l2)"]);
        assert_eq!(model.initial(), &State::from_indices(&[1, 1]));
        assert_eq!(model.goal(), &State::from_pairs(2, &[(0, 0)]));
        assert_eq!(model.mutexes().len(), 1);
        assert_eq!(model.mutexes()[0].defined_count(), 2);
        assert_eq!(model.action_count(), 3);
        assert_eq!(model.outcomes("move(l1,l2)").unwrap().len(), 2);
        assert_eq!(model.outcomes("fix()").unwrap().len(), 1);
    }

    #[test]
    fn test_effect_precondition_is_lifted() {
        let model = parse_sas(SMALL_SAS).unwrap();
        let first = model.action("move_DETDUP_0(l1,l2)").unwrap();
        // prevail 1=1 plus lifted 0=1 from the effect's previous value
        assert_eq!(first.precondition(), &State::from_indices(&[1, 1]));

        let second = model.action("move_DETDUP_1(l1,l2)").unwrap();
        assert_eq!(second.precondition(), &State::from_pairs(2, &[(1, 1)]));
        assert_eq!(second.effects()[0], State::from_pairs(2, &[(1, 0)]));
    }

    #[test]
    fn test_unparsable_number() {
        let broken = SMALL_SAS.replace("begin_state\n1\n1", "begin_state\n1\nx");
        match parse_sas(&broken) {
            Err(FondError::Parse { message, .. }) => assert!(message.contains("`x`")),
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unterminated_block() {
        let broken = SMALL_SAS.replace("end_goal", "");
        assert!(matches!(parse_sas(&broken), Err(FondError::Parse { .. })));
    }

    #[test]
    fn test_value_out_of_range() {
        let broken = SMALL_SAS.replace("begin_goal\n1\n0 0", "begin_goal\n1\n0 5");
        match parse_sas(&broken) {
            Err(FondError::Parse { line, .. }) => assert_eq!(line, 34),
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_sas_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.sas");
        std::fs::write(&path, SMALL_SAS).unwrap();
        let model = load_sas(&path).unwrap();
        assert_eq!(model.statistics().nondeterministic_operators, 1);
        assert!(load_sas(dir.path().join("missing.sas")).is_err());
    }
}
