use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "testgrow.toml";
pub const STATE_FILE: &str = ".testgrow-state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// One `unittest discover` run over the whole test tree.
    Suite,
    /// One run per test file, each bounded by `per_file_timeout_secs`.
    PerFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_root: PathBuf,
    pub source_dir: PathBuf,
    pub test_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub coverage_cmd: String,
    pub mutation_cmd: String,
    /// Command the prompt is piped into; stdout is the oracle's answer.
    pub oracle_cmd: Option<String>,
    /// Dotted package handed to the mutation tool as `--target`.
    pub mutation_target: Option<String>,
    /// Dotted package handed to the mutation tool as `--unit-test`.
    pub mutation_unit_test: Option<String>,
    pub chunk_size: usize,
    pub per_file_timeout_secs: u64,
    pub run_mode: RunMode,
    pub deploy_threshold: f64,
    pub indent_unit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            source_dir: PathBuf::from("source_files"),
            test_dir: PathBuf::from("tests"),
            reports_dir: PathBuf::from("."),
            coverage_cmd: "coverage".to_string(),
            mutation_cmd: "mut.py".to_string(),
            oracle_cmd: None,
            mutation_target: None,
            mutation_unit_test: None,
            chunk_size: 512,
            per_file_timeout_secs: 15,
            run_mode: RunMode::Suite,
            deploy_threshold: 60.0,
            indent_unit: 4,
        }
    }
}

impl Config {
    /// Load from an explicit file, or `testgrow.toml` in the working directory
    /// when present, then apply `TESTGROW_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("TESTGROW_PROJECT_ROOT") {
            self.project_root = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TESTGROW_SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TESTGROW_TEST_DIR") {
            self.test_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("TESTGROW_ORACLE_CMD") {
            self.oracle_cmd = Some(v);
        }
        if let Ok(v) = env::var("TESTGROW_MUTATION_CMD") {
            self.mutation_cmd = v;
        }
        if let Ok(v) = env::var("TESTGROW_DEPLOY_THRESHOLD") {
            match v.parse() {
                Ok(t) => self.deploy_threshold = t,
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable TESTGROW_DEPLOY_THRESHOLD"),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk_size must be positive".into()));
        }
        if self.indent_unit == 0 {
            return Err(PipelineError::Config("indent_unit must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.deploy_threshold) {
            return Err(PipelineError::Config(format!(
                "deploy_threshold must be within 0..=100, got {}",
                self.deploy_threshold
            )));
        }
        Ok(())
    }

    pub fn source_root(&self) -> PathBuf {
        self.project_root.join(&self.source_dir)
    }

    pub fn test_root(&self) -> PathBuf {
        self.project_root.join(&self.test_dir)
    }

    pub fn per_file_timeout(&self) -> Duration {
        Duration::from_secs(self.per_file_timeout_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.project_root.join(STATE_FILE)
    }

    pub fn artifacts(&self) -> Artifacts {
        Artifacts::new(&self.project_root.join(&self.reports_dir))
    }

    pub fn mutation_target(&self) -> String {
        self.mutation_target
            .clone()
            .unwrap_or_else(|| dotted(&self.source_dir))
    }

    pub fn mutation_unit_test(&self) -> String {
        self.mutation_unit_test
            .clone()
            .unwrap_or_else(|| dotted(&self.test_dir))
    }
}

fn dotted(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Fixed artifact locations, overwritten on every run.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLabel {
    Initial,
    Improved,
    Fixed,
}

impl Artifacts {
    pub fn new(root: &Path) -> Self {
        Self { root: root.to_path_buf() }
    }

    pub fn results_json(&self, label: RunLabel) -> PathBuf {
        self.root.join(match label {
            RunLabel::Initial => "results.json",
            RunLabel::Improved => "improved_testcaseresults.json",
            RunLabel::Fixed => "fixed_testcaseresults.json",
        })
    }

    pub fn results_html(&self, label: RunLabel) -> PathBuf {
        self.results_json(label).with_extension("html")
    }

    pub fn coverage_report(&self, label: RunLabel) -> PathBuf {
        self.root.join(match label {
            RunLabel::Initial => "coverage_report.txt",
            RunLabel::Improved => "coverage_report1.txt",
            RunLabel::Fixed => "coverage_report2.txt",
        })
    }

    pub fn coverage_html_dir(&self) -> PathBuf {
        self.root.join("coverage_html_report")
    }

    pub fn coverage_data(&self) -> PathBuf {
        self.root.join(".coverage")
    }

    pub fn mutation_report(&self, stage: &str) -> PathBuf {
        self.root.join(format!("mutation_report_{stage}.yaml"))
    }

    pub fn mutation_html_dir(&self, stage: &str) -> PathBuf {
        self.root.join(format!("mutation_coverage_{stage}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_layout() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.per_file_timeout_secs, 15);
        assert_eq!(config.deploy_threshold, 60.0);
        assert_eq!(config.source_root(), PathBuf::from("./source_files"));
        assert_eq!(config.mutation_target(), "source_files");
        assert_eq!(config.mutation_unit_test(), "tests");
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = Config::from_toml(
            "source_dir = \"src/app\"\ndeploy_threshold = 75.0\nrun_mode = \"per-file\"\n",
        )
        .unwrap();
        assert_eq!(config.source_dir, PathBuf::from("src/app"));
        assert_eq!(config.deploy_threshold, 75.0);
        assert_eq!(config.run_mode, RunMode::PerFile);
        assert_eq!(config.test_dir, PathBuf::from("tests"));
        assert_eq!(config.mutation_target(), "src.app");
    }

    #[test]
    fn interpreter_rides_on_tool_commands() {
        let config = Config::from_toml(
            "coverage_cmd = \".venv/bin/python -m coverage\"\nmutation_cmd = \"python3 -m mutpy\"\n",
        )
        .unwrap();
        let (program, args) = crate::runner::split_command(&config.coverage_cmd);
        assert_eq!(program, ".venv/bin/python");
        assert_eq!(args, vec!["-m", "coverage"]);
        assert_eq!(crate::runner::split_command(&config.mutation_cmd).0, "python3");
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let config = Config {
            deploy_threshold: 150.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn artifact_names_are_fixed() {
        let artifacts = Artifacts::new(Path::new("/r"));
        assert_eq!(artifacts.results_json(RunLabel::Initial), PathBuf::from("/r/results.json"));
        assert_eq!(
            artifacts.results_html(RunLabel::Improved),
            PathBuf::from("/r/improved_testcaseresults.html")
        );
        assert_eq!(artifacts.coverage_report(RunLabel::Fixed), PathBuf::from("/r/coverage_report2.txt"));
        assert_eq!(artifacts.mutation_report("before"), PathBuf::from("/r/mutation_report_before.yaml"));
    }
}
