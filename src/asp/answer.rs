//! Tokenizer for solver answers
//!
//! The solver prints a status line and, for each model, an `Answer: <n>` line
//! followed by one line of space-separated atoms such as
//! `holds(3,0,1) policy(0,"move(l1,l2)") transition(0,"e1",1)`.

use super::terms::TIMED_OUT_MARKER;
use crate::error::{FondError, FondResult};
use std::fmt;

/// A ground term of an answer atom
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Int(i64),
    /// Quoted string, stored without the quotes
    Str(String),
    /// Bare constant such as `a` or `e1`
    Sym(String),
    /// Nested function term; a tuple has an empty name
    Func(String, Vec<Term>),
}

impl Term {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Term::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text of a quoted string or bare constant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Term::Str(s) | Term::Sym(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Int(v) => write!(f, "{}", v),
            Term::Str(s) => write!(f, "\"{}\"", s),
            Term::Sym(s) => write!(f, "{}", s),
            Term::Func(name, args) => {
                let args: Vec<String> = args.iter().map(Term::to_string).collect();
                write!(f, "{}({})", name, args.join(","))
            }
        }
    }
}

/// One atom of an answer set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub predicate: String,
    pub args: Vec<Term>,
}

impl Atom {
    /// Parse a single atom, e.g. `policy(0,"move(l1,l2)")`
    pub fn parse(text: &str) -> Option<Self> {
        let mut reader = TermReader::new(text);
        let term = reader.term()?;
        if !reader.at_end() {
            return None;
        }
        match term {
            Term::Func(predicate, args) if !predicate.is_empty() => Some(Self { predicate, args }),
            Term::Sym(predicate) => Some(Self {
                predicate,
                args: Vec::new(),
            }),
            _ => None,
        }
    }

    pub fn is(&self, predicate: &str, arity: usize) -> bool {
        self.predicate == predicate && self.args.len() == arity
    }

    pub fn int(&self, index: usize) -> Option<i64> {
        self.args.get(index).and_then(Term::as_int)
    }

    /// Non-negative integer argument, e.g. a state id
    pub fn index(&self, index: usize) -> Option<usize> {
        self.int(index).and_then(|v| usize::try_from(v).ok())
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.args.get(index).and_then(Term::as_text)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.predicate);
        }
        let args: Vec<String> = self.args.iter().map(Term::to_string).collect();
        write!(f, "{}({})", self.predicate, args.join(","))
    }
}

/// Split an answer line into atom texts on whitespace outside quotes
pub fn split_atoms(line: &str) -> Vec<&str> {
    let mut atoms = Vec::new();
    let mut in_quotes = false;
    let mut start = None;

    for (i, c) in line.char_indices() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                start.get_or_insert(i);
            }
            c if c.is_whitespace() && !in_quotes => {
                if let Some(s) = start.take() {
                    atoms.push(&line[s..i]);
                }
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }
    if let Some(s) = start {
        atoms.push(&line[s..]);
    }
    atoms
}

/// Recursive-descent reader over a single term
struct TermReader<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> TermReader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text: text.trim(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn term(&mut self) -> Option<Term> {
        match self.peek()? {
            '"' => self.string(),
            '-' | '0'..='9' => self.int(),
            '(' => {
                let args = self.arguments()?;
                Some(Term::Func(String::new(), args))
            }
            c if c.is_alphabetic() || c == '_' => {
                let name = self.identifier();
                if self.peek() == Some('(') {
                    let args = self.arguments()?;
                    Some(Term::Func(name, args))
                } else {
                    Some(Term::Sym(name))
                }
            }
            _ => None,
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '\'' {
                self.bump();
            } else {
                break;
            }
        }
        self.text[start..self.pos].to_string()
    }

    fn int(&mut self) -> Option<Term> {
        let start = self.pos;
        self.eat('-');
        while matches!(self.peek(), Some('0'..='9')) {
            self.bump();
        }
        self.text[start..self.pos].parse().ok().map(Term::Int)
    }

    fn string(&mut self) -> Option<Term> {
        self.eat('"');
        let mut value = String::new();
        loop {
            match self.bump()? {
                '"' => return Some(Term::Str(value)),
                '\\' => value.push(self.bump()?),
                c => value.push(c),
            }
        }
    }

    /// `( term (, term)* )`
    fn arguments(&mut self) -> Option<Vec<Term>> {
        if !self.eat('(') {
            return None;
        }
        let mut args = Vec::new();
        if self.eat(')') {
            return Some(args);
        }
        loop {
            args.push(self.term()?);
            if self.eat(')') {
                return Some(args);
            }
            if !self.eat(',') {
                return None;
            }
        }
    }
}

/// Outcome reported by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Satisfiable,
    Unsatisfiable,
    Unknown,
}

/// One `Answer: <n>` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub number: usize,
    pub atoms: Vec<Atom>,
}

impl Answer {
    /// Atoms of a given predicate and arity, in answer order
    pub fn atoms_of<'a>(&'a self, predicate: &'a str, arity: usize) -> impl Iterator<Item = &'a Atom> + 'a {
        self.atoms.iter().filter(move |a| a.is(predicate, arity))
    }
}

/// Parsed standard output of one solver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverOutput {
    pub status: SolverStatus,
    pub answers: Vec<Answer>,
    pub timed_out: bool,
}

impl SolverOutput {
    /// Parse the solver's stdout.
    ///
    /// The status is taken from the first line carrying a marker; the
    /// unsatisfiable marker contains the satisfiable one, so it is checked
    /// first.
    pub fn parse(stdout: &str) -> FondResult<Self> {
        let mut status = SolverStatus::Unknown;
        let mut answers = Vec::new();
        let mut timed_out = false;
        let lines: Vec<&str> = stdout.lines().collect();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            if status == SolverStatus::Unknown {
                if line.contains("UNSATISFIABLE") {
                    status = SolverStatus::Unsatisfiable;
                } else if line.contains("SATISFIABLE") || line.contains("OPTIMUM FOUND") {
                    status = SolverStatus::Satisfiable;
                }
            }
            if line.contains(TIMED_OUT_MARKER) {
                timed_out = true;
            }

            if let Some(number) = line.strip_prefix("Answer:") {
                let number = number
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FondError::parse(i + 1, format!("invalid answer number `{}`", number.trim())))?;
                let atom_line = lines.get(i + 1).copied().unwrap_or("");
                let atoms = split_atoms(atom_line)
                    .into_iter()
                    .map(|text| {
                        Atom::parse(text)
                            .ok_or_else(|| FondError::parse(i + 2, format!("malformed atom `{}`", text)))
                    })
                    .collect::<FondResult<Vec<_>>>()?;
                answers.push(Answer { number, atoms });
                i += 2;
                continue;
            }
            i += 1;
        }

        Ok(Self {
            status,
            answers,
            timed_out,
        })
    }

    pub fn is_satisfiable(&self) -> bool {
        self.status == SolverStatus::Satisfiable
    }

    /// The model the solver settled on: with optimisation the last one printed is the best
    pub fn last_answer(&self) -> Option<&Answer> {
        self.answers.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "clingo version 5.6.2
Reading from controller-fondsat.lp ...
Solving...
Answer: 1
holds(0,1,1) policy(0,\"move(l1,l2)\") transition(0,\"e1\",1)
Answer: 2
holds(1,0,0) policy(0,\"fix()\")
SATISFIABLE

Models       : 2
";

    #[test]
    fn test_parse_atoms() {
        let atom = Atom::parse("policy(0,\"move(l1,l2)\")").unwrap();
        assert!(atom.is("policy", 2));
        assert_eq!(atom.index(0), Some(0));
        assert_eq!(atom.text(1), Some("move(l1,l2)"));

        let dummy = Atom::parse("policy(-1,-1,-1)").unwrap();
        assert_eq!(dummy.int(0), Some(-1));
        assert_eq!(dummy.index(0), None);

        let nested = Atom::parse("undo(\"a(x)\",f(b,(1,2)))").unwrap();
        assert_eq!(nested.args[1], Term::Func("f".into(), vec![
            Term::Sym("b".into()),
            Term::Func(String::new(), vec![Term::Int(1), Term::Int(2)]),
        ]));

        assert_eq!(Atom::parse("flag").unwrap().args.len(), 0);
        assert!(Atom::parse("broken(1,").is_none());
        assert!(Atom::parse("p(1) q").is_none());
    }

    #[test]
    fn test_atom_display() {
        let text = "transition(0,\"e1\",1)";
        assert_eq!(Atom::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_split_respects_quotes() {
        let atoms = split_atoms("a(1)  b(\"x y\") c");
        assert_eq!(atoms, vec!["a(1)", "b(\"x y\")", "c"]);
        assert!(split_atoms("   ").is_empty());
    }

    #[test]
    fn test_parse_output() {
        let output = SolverOutput::parse(OUTPUT).unwrap();
        assert!(output.is_satisfiable());
        assert!(!output.timed_out);
        assert_eq!(output.answers.len(), 2);

        let last = output.last_answer().unwrap();
        assert_eq!(last.number, 2);
        assert_eq!(last.atoms_of("policy", 2).count(), 1);
    }

    #[test]
    fn test_unsatisfiable_marker_wins() {
        let output = SolverOutput::parse("Solving...\nUNSATISFIABLE\n").unwrap();
        assert_eq!(output.status, SolverStatus::Unsatisfiable);
        assert!(output.last_answer().is_none());

        let unknown = SolverOutput::parse("Solving...\nUNKNOWN\n").unwrap();
        assert_eq!(unknown.status, SolverStatus::Unknown);
    }

    #[test]
    fn test_timed_out_marker() {
        let text = "Solving...\nTimed out with time limit=10.\n";
        assert!(SolverOutput::parse(text).unwrap().timed_out);
    }

    #[test]
    fn test_malformed_atom_reports_line() {
        match SolverOutput::parse("Answer: 1\nholds(0,1\nSATISFIABLE\n") {
            Err(FondError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
