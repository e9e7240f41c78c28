//! Configuration settings for the FOND controller synthesizer

use crate::asp::{BackboneStyle, EncodingOptions};
use crate::controller::SizeSearch;
use crate::error::FondError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub input: InputConfig,
    pub solver: SolverConfig,
    pub backbone: BackboneConfig,
    pub encoding: EncodingOptions,
    pub constraints: ConstraintsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Translator output for the determinized problem
    pub sas_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub clingo: PathBuf,
    /// Extra arguments appended after `-c numStates=<n>`
    pub args: Vec<String>,
    /// Logic program describing controllers
    pub controller_model: PathBuf,
    pub min_states: usize,
    pub max_states: usize,
    pub inc_states: usize,
    /// Wall-clock budget for the whole search; unlimited when absent
    pub time_limit_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub enabled: bool,
    /// Only use the backbone length as a lower bound
    pub size_only: bool,
    /// Logic program searching for a weak plan
    pub weak_plan_program: PathBuf,
    pub sequential_knowledge: Option<PathBuf>,
    pub style: BackboneStyle,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstraintsConfig {
    /// Programs added verbatim to every controller search call
    pub files: Vec<PathBuf>,
    /// Program deriving `undo/2` pairs from the instance
    pub undo_program: Option<PathBuf>,
    pub undo_by_type: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Write `controller.out` and `controller.json` after a successful search
    pub dump_controller: bool,
    /// Check the controller after a successful search
    pub verify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: InputConfig {
                sas_file: PathBuf::from("output.sas"),
            },
            solver: SolverConfig {
                clingo: PathBuf::from("clingo"),
                args: Vec::new(),
                controller_model: PathBuf::from("asp/controller-fondsat.lp"),
                min_states: 1,
                max_states: 100,
                inc_states: 1,
                time_limit_seconds: None,
            },
            backbone: BackboneConfig {
                enabled: false,
                size_only: false,
                weak_plan_program: PathBuf::from("asp/weak_plan.lp"),
                sequential_knowledge: None,
                style: BackboneStyle::Strict,
            },
            encoding: EncodingOptions::default(),
            constraints: ConstraintsConfig {
                files: Vec::new(),
                undo_program: None,
                undo_by_type: true,
            },
            output: OutputConfig {
                directory: PathBuf::from("output"),
                dump_controller: true,
                verify: true,
            },
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Save settings to a YAML file
    pub fn to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let solver = &self.solver;
        if solver.min_states == 0 {
            return Err(FondError::Config("Minimum number of states must be positive".into()).into());
        }
        if solver.inc_states == 0 {
            return Err(FondError::Config("State increment must be positive".into()).into());
        }
        if solver.min_states > solver.max_states {
            return Err(FondError::Config(format!(
                "Minimum states ({}) exceeds maximum states ({})",
                solver.min_states, solver.max_states
            ))
            .into());
        }

        require_file("SAS file", &self.input.sas_file)?;
        require_file("Controller model", &solver.controller_model)?;
        if self.backbone.enabled {
            require_file("Weak plan program", &self.backbone.weak_plan_program)?;
            if let Some(kb) = &self.backbone.sequential_knowledge {
                require_file("Sequential knowledge file", kb)?;
            }
        }
        for file in &self.constraints.files {
            require_file("Constraint file", file)?;
        }
        if let Some(undo) = &self.constraints.undo_program {
            require_file("Undo program", undo)?;
        }

        Ok(())
    }

    /// Candidate sizes to try
    pub fn size_search(&self) -> SizeSearch {
        SizeSearch {
            min: self.solver.min_states,
            max: self.solver.max_states,
            inc: self.solver.inc_states,
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.solver.time_limit_seconds.map(Duration::from_secs)
    }

    /// Merge settings with command line overrides
    pub fn merge_with_cli(&mut self, cli_overrides: &CliOverrides) {
        if let Some(ref sas_file) = cli_overrides.sas_file {
            self.input.sas_file = sas_file.clone();
        }
        if let Some(ref output_dir) = cli_overrides.output_dir {
            self.output.directory = output_dir.clone();
        }
        if let Some(min_states) = cli_overrides.min_states {
            self.solver.min_states = min_states;
        }
        if let Some(max_states) = cli_overrides.max_states {
            self.solver.max_states = max_states;
        }
        if let Some(inc_states) = cli_overrides.inc_states {
            self.solver.inc_states = inc_states;
        }
        if let Some(timeout) = cli_overrides.timeout_seconds {
            self.solver.time_limit_seconds = Some(timeout);
        }
        if cli_overrides.backbone {
            self.backbone.enabled = true;
        }
    }
}

fn require_file(what: &str, path: &PathBuf) -> Result<()> {
    if !path.exists() {
        return Err(FondError::Config(format!("{} does not exist: {}", what, path.display())).into());
    }
    Ok(())
}

/// Command line overrides for settings
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub sas_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub min_states: Option<usize>,
    pub max_states: Option<usize>,
    pub inc_states: Option<usize>,
    pub timeout_seconds: Option<u64>,
    pub backbone: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_files(dir: &std::path::Path) -> Settings {
        let sas = dir.join("output.sas");
        let model = dir.join("controller.lp");
        std::fs::write(&sas, "").unwrap();
        std::fs::write(&model, "").unwrap();

        let mut settings = Settings::default();
        settings.input.sas_file = sas;
        settings.solver.controller_model = model;
        settings
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("default.yaml");

        let mut settings = Settings::default();
        settings.solver.time_limit_seconds = Some(60);
        settings.backbone.style = BackboneStyle::Loose;
        settings.to_file(&path).unwrap();

        let loaded = Settings::from_file(&path).unwrap();
        assert_eq!(loaded.solver.time_limit_seconds, Some(60));
        assert_eq!(loaded.backbone.style, BackboneStyle::Loose);
        assert_eq!(loaded.encoding, EncodingOptions::default());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("initial_state: both"));
        assert!(text.contains("style: loose"));
    }

    #[test]
    fn test_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_with_files(dir.path());
        assert!(settings.validate().is_ok());

        settings.solver.min_states = 5;
        settings.solver.max_states = 2;
        assert!(settings.validate().is_err());

        settings.solver.max_states = 10;
        settings.solver.inc_states = 0;
        assert!(settings.validate().is_err());

        settings.solver.inc_states = 1;
        settings.backbone.enabled = true;
        settings.backbone.weak_plan_program = dir.path().join("missing.lp");
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Weak plan program"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut settings = Settings::default();
        let overrides = CliOverrides {
            min_states: Some(3),
            timeout_seconds: Some(30),
            backbone: true,
            ..CliOverrides::default()
        };
        settings.merge_with_cli(&overrides);

        assert_eq!(settings.size_search(), SizeSearch { min: 3, max: 100, inc: 1 });
        assert_eq!(settings.time_limit(), Some(Duration::from_secs(30)));
        assert!(settings.backbone.enabled);
    }
}
