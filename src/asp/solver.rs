//! External answer-set solver invocation

use crate::error::{describe_budget, FondError, FondResult};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use wait_timeout::ChildExt;

/// Exit codes clingo uses for normal termination: plain, interrupted,
/// satisfiable, satisfiable+interrupted, unsatisfiable, optimum found.
const NORMAL_EXIT_CODES: [i32; 6] = [0, 1, 10, 11, 20, 30];

/// Marker clingo prints on stderr for fatal errors
const ERROR_MARKER: &str = "*** ERROR";

/// One solver call: input programs, extra arguments and the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub inputs: Vec<PathBuf>,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Create a new invocation running in `working_dir`
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            args: Vec::new(),
            working_dir: working_dir.into(),
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-like rendering for logs and error reports
    pub fn command_line(&self, executable: &Path) -> String {
        let mut parts = vec![executable.display().to_string()];
        parts.extend(self.inputs.iter().map(|p| p.display().to_string()));
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How a solver call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverRun {
    Finished { stdout: String },
    /// The budget ran out; `stdout` holds whatever was printed before the kill
    TimedOut { stdout: String },
}

impl SolverRun {
    pub fn stdout(&self) -> &str {
        match self {
            SolverRun::Finished { stdout } | SolverRun::TimedOut { stdout } => stdout,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, SolverRun::TimedOut { .. })
    }
}

/// The seam between the search loop and the external solver
pub trait AspSolver {
    /// Run the solver once, blocking for at most `budget`
    fn run(&mut self, invocation: &Invocation, budget: Option<Duration>) -> FondResult<SolverRun>;
}

/// Runs the `clingo` binary as a subprocess
#[derive(Debug, Clone)]
pub struct ClingoSolver {
    executable: PathBuf,
}

impl ClingoSolver {
    /// Create a new runner for the given executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn check_status(&self, command: &str, status: ExitStatus, stdout: &str, stderr: &str) -> FondResult<()> {
        let normal = status.code().is_some_and(|code| NORMAL_EXIT_CODES.contains(&code));
        if normal && !stderr.contains(ERROR_MARKER) {
            if !stderr.trim().is_empty() {
                debug!(stderr = stderr.trim(), "solver diagnostics");
            }
            return Ok(());
        }

        error!(command, %status, stdout = stdout.trim(), stderr = stderr.trim(), "solver process failed");
        Err(FondError::SolverProcess {
            command: command.to_string(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl AspSolver for ClingoSolver {
    fn run(&mut self, invocation: &Invocation, budget: Option<Duration>) -> FondResult<SolverRun> {
        let command = invocation.command_line(&self.executable);
        debug!(command = %command, budget = %describe_budget(budget), "running solver");
        let start = Instant::now();

        let mut child = Command::new(&self.executable)
            .args(&invocation.inputs)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| FondError::SolverProcess {
                command: command.clone(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })?;

        // pipes are drained while the child runs
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let waited = match budget {
            Some(budget) => child.wait_timeout(budget),
            None => child.wait().map(Some),
        };
        let status = match waited {
            Ok(status) => status,
            Err(err) => {
                reap(&mut child, stdout_reader, stderr_reader);
                return Err(err.into());
            }
        };

        match status {
            Some(status) => {
                let stdout = collect(stdout_reader);
                let stderr = collect(stderr_reader);
                debug!(elapsed = ?start.elapsed(), %status, "solver finished");
                self.check_status(&command, status, &stdout, &stderr)?;
                Ok(SolverRun::Finished { stdout })
            }
            None => {
                let stdout = reap(&mut child, stdout_reader, stderr_reader);
                warn!(budget = %describe_budget(budget), "solver timed out");
                Ok(SolverRun::TimedOut { stdout })
            }
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(source: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

/// Kill and wait for a child that is still running, then drain its pipes
fn reap(child: &mut Child, stdout: JoinHandle<String>, stderr: JoinHandle<String>) -> String {
    let _ = child.kill();
    let _ = child.wait();
    let _ = collect(stderr);
    collect(stdout)
}

fn collect(reader: JoinHandle<String>) -> String {
    reader.join().unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake_solver.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn run(body: &str, budget: Option<Duration>) -> FondResult<SolverRun> {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), body);
        let invocation = Invocation::new(dir.path())
            .input(&path)
            .args(["-c", "numStates=3"]);
        ClingoSolver::new("sh").run(&invocation, budget)
    }

    #[test]
    fn test_command_line() {
        let invocation = Invocation::new("/tmp")
            .inputs(["controller.lp", "instance.lp"])
            .args(["-c", "numStates=4"]);
        assert_eq!(
            invocation.command_line(Path::new("clingo")),
            "clingo controller.lp instance.lp -c numStates=4"
        );
    }

    #[test]
    fn test_finished_run_captures_stdout() {
        let run = run("echo \"args: $*\"\necho SATISFIABLE\nexit 10\n", None).unwrap();
        assert!(!run.is_timed_out());
        assert!(run.stdout().contains("args: -c numStates=3"));
        assert!(run.stdout().contains("SATISFIABLE"));
    }

    #[test]
    fn test_unsatisfiable_exit_code_is_normal() {
        let run = run("echo UNSATISFIABLE\nexit 20\n", Some(Duration::from_secs(10))).unwrap();
        assert!(run.stdout().contains("UNSATISFIABLE"));
    }

    #[test]
    fn test_timeout_kills_process() {
        let start = Instant::now();
        let run = run("echo Solving...\nexec sleep 10\n", Some(Duration::from_millis(200))).unwrap();
        assert!(run.is_timed_out());
        assert!(start.elapsed() < Duration::from_secs(5));
        // output written before the kill survives
        assert!(run.stdout().contains("Solving..."));
    }

    #[test]
    fn test_abnormal_exit_is_error() {
        match run("echo broken >&2\nexit 65\n", None) {
            Err(FondError::SolverProcess { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("expected process failure, got {:?}", other),
        }
    }

    #[test]
    fn test_error_marker_on_stderr_is_error() {
        let result = run("echo '*** ERROR: (clingo): parsing failed' >&2\nexit 0\n", None);
        assert!(matches!(result, Err(FondError::SolverProcess { .. })));
    }

    #[test]
    fn test_missing_executable() {
        let invocation = Invocation::new(".");
        let result = ClingoSolver::new("definitely-not-a-solver-binary").run(&invocation, None);
        assert!(matches!(result, Err(FondError::SolverProcess { .. })));
    }
}
