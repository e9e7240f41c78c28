//! Display and output formatting utilities

use crate::controller::{Controller, SolveOutcome, SolveReport, Verdict, VerifyReport};
use crate::sas::Model;
use itertools::Itertools;

/// Format pipeline results for the console
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format the result of a `solve` run
    pub fn format_solve_report(report: &SolveReport) -> String {
        let mut output = String::new();

        output.push_str(&format!("=== {} ===\n", Self::outcome_title(&report.outcome)));
        output.push_str(&format!("Solve Time: {:.3}s\n", report.elapsed.as_secs_f64()));
        if let Some(len) = report.backbone {
            output.push_str(&format!("Backbone Length: {}\n", len));
        }
        match &report.outcome {
            SolveOutcome::Solved { size, states, output: file } => {
                output.push_str(&format!("numStates: {}\n", size));
                output.push_str(&format!("Controller States: {}\n", states));
                output.push_str(&format!("Solver Output: {}\n", file.display()));
            }
            SolveOutcome::Trivial => output.push_str("Controller States: 1\n"),
            _ => {}
        }
        if let Some(verification) = &report.verification {
            output.push_str(&format!("Strong Cyclic: {}\n", verification.sound));
        }

        output
    }

    fn outcome_title(outcome: &SolveOutcome) -> &'static str {
        match outcome {
            SolveOutcome::Trivial => "Trivial",
            SolveOutcome::Solved { .. } => "Solved",
            SolveOutcome::Unsolvable => "Unsolvable",
            SolveOutcome::Exhausted { .. } => "No Solution",
            SolveOutcome::TimedOut { .. } => "Timed Out",
        }
    }

    /// Format several verification results as a table
    pub fn format_verify_summary(reports: &[VerifyReport]) -> String {
        let mut output = String::new();

        output.push_str("Verification Summary:\n");
        output.push_str("Sound | Timeout | States | Pairs  | Directory\n");
        output.push_str("------|---------|--------|--------|----------\n");

        for report in reports {
            output.push_str(&format!(
                "{:5} | {:7} | {:6} | {:6} | {}\n",
                if report.sound { "yes" } else { "no" },
                if report.timed_out { "yes" } else { "no" },
                report.controller_states,
                report.reachable_pairs,
                report.dir.display()
            ));
        }

        output
    }

    /// Compact listing of a controller: one line per state
    pub fn format_controller(controller: &Controller, model: &Model) -> String {
        let mut output = String::new();
        for (id, state) in controller.states() {
            let action = controller.policy(id).unwrap_or("-");
            let edges = controller
                .transitions_from(id)
                .map(|t| format!("{}->{}", t.effect, t.to))
                .join(" ");
            output.push_str(&format!(
                "{:3} [{}] {} {}\n",
                id,
                state.describe(model.variables()),
                action,
                edges
            ));
        }
        output
    }

    /// Distances of the solution space, grouped by controller state
    pub fn format_verdict(verdict: &Verdict) -> String {
        let mut output = format!("{}\n", verdict);
        let grouped = verdict
            .space
            .nodes()
            .iter()
            .zip(&verdict.distances)
            .into_group_map_by(|(node, _)| node.controller);
        for controller in grouped.keys().sorted() {
            let distances = grouped[controller]
                .iter()
                .map(|(_, d)| d.map_or("inf".to_string(), |d| d.to_string()))
                .join(",");
            output.push_str(&format!("  q{}: {}\n", controller, distances));
        }
        output
    }
}

pub struct ColorOutput;

impl ColorOutput {
    /// Format text with color (if terminal supports it)
    pub fn colored(text: &str, color: Color) -> String {
        if Self::supports_color() {
            format!("\x1b[{}m{}\x1b[0m", color.code(), text)
        } else {
            text.to_string()
        }
    }

    fn supports_color() -> bool {
        std::env::var("NO_COLOR").is_err() && std::env::var("TERM").unwrap_or_default() != "dumb"
    }

    pub fn success(text: &str) -> String {
        Self::colored(text, Color::Green)
    }

    pub fn error(text: &str) -> String {
        Self::colored(text, Color::Red)
    }

    pub fn warning(text: &str) -> String {
        Self::colored(text, Color::Yellow)
    }

    pub fn info(text: &str) -> String {
        Self::colored(text, Color::Blue)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    fn code(self) -> u8 {
        match self {
            Color::Red => 31,
            Color::Green => 32,
            Color::Yellow => 33,
            Color::Blue => 34,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::controller::tests::answer;
    use crate::controller::verify;
    use crate::sas::parser::tests::SMALL_SAS;
    use crate::sas::parse_sas;
    use crate::sas::ModelStatistics;
    use std::path::PathBuf;
    use std::time::Duration;

    fn small_controller() -> (Controller, Model) {
        let model = parse_sas(SMALL_SAS).unwrap();
        let answer = answer(
            "holds(0,0,1) holds(0,1,1) holds(1,1,0) holds(2,0,0) \
             policy(0,\"move(l1,l2)\") policy(1,\"fix()\") \
             transition(0,\"e1\",2) transition(0,\"e2\",1) transition(1,\"e1\",0)",
        );
        let controller = Controller::from_answer(&answer, model.variables().len()).unwrap();
        (controller, model)
    }

    #[test]
    fn test_solve_report_formatting() {
        let report = SolveReport {
            outcome: SolveOutcome::Solved {
                size: 4,
                states: 5,
                output: PathBuf::from("out/clingo_out_4.out"),
            },
            statistics: ModelStatistics {
                variables: 2,
                grounded_actions: 3,
                deterministic_operators: 1,
                nondeterministic_operators: 1,
                max_outcomes: 2,
                mutex_groups: 1,
                goal_size: 1,
            },
            backbone: Some(3),
            verification: None,
            elapsed: Duration::from_millis(1500),
        };
        let text = ReportFormatter::format_solve_report(&report);
        assert!(text.starts_with("=== Solved ==="));
        assert!(text.contains("Controller States: 5"));
        assert!(text.contains("Backbone Length: 3"));
        assert!(text.contains("Solve Time: 1.500s"));
    }

    #[test]
    fn test_verify_summary_table() {
        let reports = vec![VerifyReport {
            dir: PathBuf::from("runs/a"),
            sound: true,
            timed_out: false,
            controller_states: 3,
            reachable_pairs: 3,
        }];
        let table = ReportFormatter::format_verify_summary(&reports);
        assert_eq!(table.lines().count(), 4);
        assert!(table.lines().last().unwrap().ends_with("runs/a"));
    }

    #[test]
    fn test_controller_listing() {
        let (controller, model) = small_controller();
        let listing = ReportFormatter::format_controller(&controller, &model);
        let first = listing.lines().next().unwrap();
        assert!(first.contains("move(l1,l2)"));
        assert!(first.ends_with("e1->2 e2->1"));
        assert_eq!(listing.lines().count(), 3);
    }

    #[test]
    fn test_verdict_formatting() {
        let (controller, model) = small_controller();
        let verdict = verify(&controller, &model).unwrap();
        let text = ReportFormatter::format_verdict(&verdict);
        assert!(text.contains("q2: 0"));
        assert!(!text.contains("inf"));
    }

    #[test]
    fn test_color_output() {
        let colored = ColorOutput::colored("test", Color::Red);
        assert!(colored.contains("test"));

        let success = ColorOutput::success("OK");
        assert!(success.contains("OK"));
    }
}
