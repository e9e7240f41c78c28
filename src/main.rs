//! Main CLI application for the FOND controller synthesizer

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fond_asp::{
    asp::{EncodingOptions, Flavor, InstanceEncoder},
    config::{CliOverrides, Settings},
    controller::{dump_controller, verify, verify_run_dir, SolveOutcome},
    sas::load_sas,
    solve_problem,
    utils::{ColorOutput, ReportFormatter},
};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fond_asp")]
#[command(about = "FOND controller synthesis with answer set programming")]
#[command(version = "0.1.0")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a strong-cyclic controller
    Solve {
        /// Configuration file path
        #[arg(short, long, default_value = "config/default.yaml")]
        config: PathBuf,

        /// SAS file of the determinized problem (overrides config)
        #[arg(short, long)]
        sas: Option<PathBuf>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Smallest controller size to try (overrides config)
        #[arg(long)]
        min_states: Option<usize>,

        /// Largest controller size to try (overrides config)
        #[arg(long)]
        max_states: Option<usize>,

        /// Size increment between attempts (overrides config)
        #[arg(long)]
        inc_states: Option<usize>,

        /// Time limit in seconds for the whole search (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Estimate a backbone with a weak plan first
        #[arg(short, long)]
        backbone: bool,
    },

    /// Check the controllers of finished run directories
    Verify {
        /// Run directories produced by `solve`
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        /// Print each controller and its goal distances
        #[arg(long)]
        details: bool,
    },

    /// Report properties of a SAS file
    Analyze {
        /// SAS file of the determinized problem
        sas: PathBuf,

        /// Also report the size of the controller encoding
        #[arg(long)]
        encoding: bool,
    },

    /// Create a default configuration file
    Setup {
        /// Directory to create files in
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Solve {
            config,
            sas,
            output,
            min_states,
            max_states,
            inc_states,
            timeout,
            backbone,
        } => {
            let overrides = CliOverrides {
                sas_file: sas,
                output_dir: output,
                min_states,
                max_states,
                inc_states,
                timeout_seconds: timeout,
                backbone,
            };
            solve_command(config, overrides, cli.verbose)
        }
        Commands::Verify { dirs, details } => verify_command(dirs, details),
        Commands::Analyze { sas, encoding } => analyze_command(sas, encoding),
        Commands::Setup { directory, force } => setup_command(directory, force),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn solve_command(config_path: PathBuf, overrides: CliOverrides, verbose: bool) -> Result<()> {
    println!("{}", ColorOutput::info("Starting FOND controller search"));

    let mut settings = if config_path.exists() {
        Settings::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        println!(
            "{}",
            ColorOutput::warning(&format!("Config file {} not found, using defaults", config_path.display()))
        );
        Settings::default()
    };
    settings.merge_with_cli(&overrides);

    if verbose {
        println!("Configuration:");
        println!("  SAS file: {}", settings.input.sas_file.display());
        println!(
            "  States: {}..{} step {}",
            settings.solver.min_states, settings.solver.max_states, settings.solver.inc_states
        );
        println!("  Backbone: {}", settings.backbone.enabled);
        println!("  Output dir: {}", settings.output.directory.display());
        println!();
    }

    let report = solve_problem(&settings).context("Configuration validation or solving failed")?;

    if verbose {
        println!("{}", report.statistics);
    }
    println!("{}", ReportFormatter::format_solve_report(&report));

    match &report.outcome {
        SolveOutcome::Trivial | SolveOutcome::Solved { .. } => {
            println!("{}", ColorOutput::success(&format!("Solved: {}", report.outcome)));
        }
        SolveOutcome::TimedOut { .. } => {
            println!("{}", ColorOutput::warning(&format!("Stopped: {}", report.outcome)));
        }
        SolveOutcome::Unsolvable | SolveOutcome::Exhausted { .. } => {
            println!("{}", ColorOutput::error(&format!("Failed: {}", report.outcome)));
        }
    }
    if let Some(verification) = &report.verification {
        if !verification.sound {
            println!("{}", ColorOutput::error("Controller is not strong-cyclic"));
        }
    }

    Ok(())
}

fn verify_command(dirs: Vec<PathBuf>, details: bool) -> Result<()> {
    println!("{}", ColorOutput::info(&format!("Verifying {} run(s)...", dirs.len())));

    let results: Vec<_> = dirs
        .par_iter()
        .map(|dir| verify_run_dir(dir).with_context(|| format!("Failed to verify {}", dir.display())))
        .collect();

    let mut reports = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => println!("{}", ColorOutput::error(&format!("{:#}", err))),
        }
    }
    println!("{}", ReportFormatter::format_verify_summary(&reports));

    if details {
        for report in reports.iter().filter(|r| !r.timed_out) {
            if let Some((controller, model)) = dump_controller(&report.dir)? {
                println!("{}", ColorOutput::info(&report.dir.display().to_string()));
                println!("{}", ReportFormatter::format_controller(&controller, &model));
                let verdict = verify(&controller, &model)?;
                println!("{}", ReportFormatter::format_verdict(&verdict));
            }
        }
    }

    let unsound = reports.iter().filter(|r| !r.sound).count();
    if unsound == 0 && reports.len() == dirs.len() {
        println!("{}", ColorOutput::success("All controllers are strong-cyclic"));
    } else {
        println!(
            "{}",
            ColorOutput::error(&format!("{} unsound, {} failed", unsound, dirs.len() - reports.len()))
        );
    }

    Ok(())
}

fn analyze_command(sas: PathBuf, encoding: bool) -> Result<()> {
    println!("{}", ColorOutput::info("Analyzing SAS file..."));

    let model = load_sas(&sas)?;
    println!("{}", model.statistics());
    println!("Goal met in the initial state: {}", model.goal_reached_initially());

    if encoding {
        let encoder = InstanceEncoder::new(&model, EncodingOptions::default());
        let text = encoder.encode(Flavor::Controller);
        println!("\n{}", encoder.statistics(&text));
    }

    Ok(())
}

fn setup_command(directory: PathBuf, force: bool) -> Result<()> {
    println!("{}", ColorOutput::info("Setting up project structure..."));

    let config_dir = directory.join("config");
    let output_dir = directory.join("output");
    for dir in [&config_dir, &output_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let config_path = config_dir.join("default.yaml");
    if !config_path.exists() || force {
        Settings::default()
            .to_file(&config_path)
            .context("Failed to create default configuration")?;
        println!("Created: {}", config_path.display());
    } else {
        println!("Skipped: {} (already exists)", config_path.display());
    }

    let mut backbone_config = Settings::default();
    backbone_config.backbone.enabled = true;
    backbone_config.solver.time_limit_seconds = Some(3600);
    let backbone_path = config_dir.join("backbone.yaml");
    if !backbone_path.exists() || force {
        backbone_config.to_file(&backbone_path)?;
        println!("Created: {}", backbone_path.display());
    }

    println!("\n{}", ColorOutput::success("Setup complete!"));
    println!("\nNext steps:");
    println!("1. Point input.sas_file in {} at a translated problem", config_path.display());
    println!("2. Check solver.controller_model and solver.clingo");
    println!("3. Run: fond_asp solve --config {}", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "fond_asp",
            "solve",
            "--config",
            "test.yaml",
            "--max-states",
            "5",
            "--backbone",
            "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Solve { max_states, backbone, .. } => {
                assert_eq!(max_states, Some(5));
                assert!(backbone);
            }
            _ => panic!("expected solve"),
        }
    }

    #[test]
    fn test_verify_requires_directory() {
        assert!(Cli::try_parse_from(["fond_asp", "verify"]).is_err());
        assert!(Cli::try_parse_from(["fond_asp", "verify", "a", "b"]).is_ok());
    }

    #[test]
    fn test_setup_command() {
        let temp_dir = tempdir().unwrap();
        setup_command(temp_dir.path().to_path_buf(), false).unwrap();

        let config = temp_dir.path().join("config/default.yaml");
        assert!(config.exists());
        assert!(temp_dir.path().join("output").exists());
        let backbone = Settings::from_file(&temp_dir.path().join("config/backbone.yaml")).unwrap();
        assert!(backbone.backbone.enabled);
    }
}
