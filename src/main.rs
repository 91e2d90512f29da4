use testgrow::config::Config;
use testgrow::error::PipelineError;
use testgrow::oracle::{CommandOracle, Oracle};
use testgrow::output;
use testgrow::report;
use testgrow::splice;
use testgrow::state::{Action, DeployDecision, Stage, WorkflowState};
use testgrow::workflow::{Pipeline, StageSummary};

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "testgrow", version, about = "Coverage- and mutation-directed test augmentation")]
struct Cli {
    /// Config file (default: ./testgrow.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Project root holding the source and test directories
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,
    /// Command that answers prompts on stdout
    #[arg(long, global = true)]
    oracle_cmd: Option<String>,
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one test module per source chunk, then run tests and coverage
    Generate,
    /// Add tests for uncovered branches of every partially covered module
    Improve,
    /// Repair failing tests from the improved run
    Fix,
    /// Run mutation analysis
    Mutate {
        #[arg(long, value_enum, default_value = "before")]
        stage: Stage,
    },
    /// Add tests aimed at surviving mutations
    Augment,
    /// Show workflow progress and mutation scores
    Status,
    /// Deploy decision from the final mutation score
    Gate {
        /// Minimum mutation score (default from config: 60)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Clear all workflow progress and coverage data
    Restart,
    /// List modules below full coverage in a coverage report
    Gaps {
        /// Report file (default: the initial coverage report)
        report: Option<PathBuf>,
    },
    /// Splice generated test methods from a file into a test file
    Splice {
        /// Test file to modify
        test_file: PathBuf,
        /// File holding the generated methods ("-" for stdin)
        fragment: PathBuf,
        /// Target class (default: first unittest.TestCase subclass)
        #[arg(long)]
        class: Option<String>,
    },
}

fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::Config(_)) => 2,
                _ => 3,
            }
        }
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "testgrow=debug" } else { "testgrow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = &cli.project_root {
        config.project_root = root.clone();
    }
    if let Some(cmd) = &cli.oracle_cmd {
        config.oracle_cmd = Some(cmd.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;
    let json = cli.json;
    let state_path = config.state_path();
    let mut state = WorkflowState::load_from_path(&state_path)
        .with_context(|| format!("loading {}", state_path.display()))?;

    match cli.command {
        Commands::Status => {
            if json {
                let view = serde_json::json!({
                    "phase": state.phase(),
                    "state": state,
                    "available": state.available_actions().iter().map(|a| a.name()).collect::<Vec<_>>(),
                    "decision": state.deploy_decision(config.deploy_threshold),
                });
                println!("{}", serde_json::to_string(&view)?);
            } else {
                output::print_status(&state, config.deploy_threshold);
            }
            Ok(0)
        }
        Commands::Gate { threshold } => {
            if !require(&state, Action::Gate) {
                return Ok(2);
            }
            let threshold = threshold.unwrap_or(config.deploy_threshold);
            let Some(decision) = state.deploy_decision(threshold) else {
                output::print_error("No final mutation score recorded.");
                return Ok(2);
            };
            if json {
                println!("{}", serde_json::json!({ "decision": decision, "threshold": threshold }));
            } else {
                output::print_mutation_comparison(state.initial_stats.as_ref(), state.final_stats.as_ref());
                output::print_decision(decision, threshold);
            }
            Ok(match decision {
                DeployDecision::DeployEligible => 0,
                DeployDecision::DeployBlocked => 1,
            })
        }
        Commands::Gaps { report: path } => {
            let path = path.unwrap_or_else(|| {
                config.artifacts().coverage_report(testgrow::config::RunLabel::Initial)
            });
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let gaps = report::parse_coverage(&text);
            if json {
                println!("{}", serde_json::to_string(&gaps)?);
            } else {
                output::print_gaps(&gaps);
            }
            Ok(0)
        }
        Commands::Splice { test_file, fragment, class } => {
            if !test_file.exists() {
                output::print_error(&format!("Test file not found: {}", test_file.display()));
                return Ok(2);
            }
            let fragment = read_fragment(&fragment)?;
            let outcome = splice::splice_file(&test_file, &fragment, class.as_deref(), config.indent_unit)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "outcome": outcome.label(), "methods": outcome.methods() })
                );
            } else {
                output::print_splice_outcome(&outcome);
            }
            Ok(if outcome.is_inserted() { 0 } else { 1 })
        }
        Commands::Restart => {
            let mut pipeline = Pipeline::new(&config, NoOracle, state);
            pipeline.restart()?;
            pipeline.state().save_to_path(&state_path)?;
            output::print_success("Workflow restarted.");
            Ok(0)
        }
        command => {
            let action = match command {
                Commands::Generate => Action::Generate,
                Commands::Improve => Action::ImproveCoverage,
                Commands::Fix => Action::FixFailures,
                Commands::Mutate { stage } => Action::MeasureMutation(stage),
                Commands::Augment => Action::AugmentMutation,
                _ => unreachable!("handled above"),
            };
            if !require(&state, action) {
                return Ok(2);
            }
            let needs_oracle = !matches!(action, Action::MeasureMutation(_));
            let summary = if needs_oracle {
                let Some(cmd) = config.oracle_cmd.clone() else {
                    output::print_error("No oracle configured. Set oracle_cmd, TESTGROW_ORACLE_CMD or --oracle-cmd.");
                    return Ok(2);
                };
                let oracle = CommandOracle::new(cmd, config.project_root.clone());
                run_action(&config, oracle, &mut state, action)?
            } else {
                run_action(&config, NoOracle, &mut state, action)?
            };
            state.save_to_path(&state_path)?;

            if json {
                println!("{}", serde_json::to_string(&summary)?);
            } else {
                output::print_stage_summary(&summary);
            }
            Ok(0)
        }
    }
}

fn require(state: &WorkflowState, action: Action) -> bool {
    if state.is_enabled(action) {
        return true;
    }
    let available: Vec<_> = state.available_actions().iter().map(|a| a.name()).collect();
    output::print_error(&format!(
        "`{}` is not available yet. Available: {}",
        action.name(),
        available.join(", ")
    ));
    false
}

fn run_action<O: Oracle>(
    config: &Config,
    oracle: O,
    state: &mut WorkflowState,
    action: Action,
) -> anyhow::Result<StageSummary> {
    let mut pipeline = Pipeline::new(config, oracle, state.clone());
    let summary = match action {
        Action::Generate => pipeline.generate(),
        Action::ImproveCoverage => pipeline.improve_coverage(),
        Action::FixFailures => pipeline.fix_failures(),
        Action::MeasureMutation(stage) => pipeline.measure_mutation(stage),
        Action::AugmentMutation => pipeline.augment_mutation(),
        Action::Gate => unreachable!("gate has no pipeline stage"),
    }
    .with_context(|| format!("{} failed", action.name()))?;
    *state = pipeline.into_state();
    Ok(summary)
}

fn read_fragment(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Stand-in for stages that never consult the oracle.
struct NoOracle;

impl Oracle for NoOracle {
    fn complete(&self, _prompt: &str) -> testgrow::error::Result<String> {
        Err(PipelineError::Oracle("no oracle configured".into()))
    }
}
