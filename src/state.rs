//! Workflow latches and the actions they unlock.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::report::MutationStats;
use crate::safety;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Before,
    After,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Before => "before",
            Stage::After => "after",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Generate,
    ImproveCoverage,
    FixFailures,
    MeasureMutation(Stage),
    AugmentMutation,
    Gate,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Generate,
        Action::ImproveCoverage,
        Action::FixFailures,
        Action::MeasureMutation(Stage::Before),
        Action::AugmentMutation,
        Action::MeasureMutation(Stage::After),
        Action::Gate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Generate => "generate",
            Action::ImproveCoverage => "improve",
            Action::FixFailures => "fix",
            Action::MeasureMutation(Stage::Before) => "mutate --stage before",
            Action::MeasureMutation(Stage::After) => "mutate --stage after",
            Action::AugmentMutation => "augment",
            Action::Gate => "gate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    Generated,
    CoverageImproved,
    Fixed,
    MutationMeasuredBefore,
    MutationAugmented,
    MutationMeasuredAfter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployDecision {
    DeployEligible,
    DeployBlocked,
}

/// One-way latches persisted between CLI invocations. Only [`WorkflowState::reset`]
/// clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowState {
    pub generated: bool,
    pub coverage_improved: bool,
    pub fixed: bool,
    pub mutation_measured_before: bool,
    pub mutation_tests_generated: bool,
    pub mutation_measured_after: bool,
    pub initial_stats: Option<MutationStats>,
    pub final_stats: Option<MutationStats>,
}

impl WorkflowState {
    pub fn is_enabled(&self, action: Action) -> bool {
        match action {
            Action::Generate => true,
            Action::ImproveCoverage => self.generated && !self.coverage_improved,
            Action::FixFailures => self.coverage_improved && !self.fixed,
            Action::MeasureMutation(Stage::Before) => self.fixed && !self.mutation_measured_before,
            Action::AugmentMutation => self.mutation_measured_before && !self.mutation_tests_generated,
            Action::MeasureMutation(Stage::After) => {
                self.mutation_tests_generated && !self.mutation_measured_after
            }
            Action::Gate => self.mutation_measured_after,
        }
    }

    pub fn available_actions(&self) -> Vec<Action> {
        Action::ALL.into_iter().filter(|a| self.is_enabled(*a)).collect()
    }

    pub fn phase(&self) -> Phase {
        if self.mutation_measured_after {
            Phase::MutationMeasuredAfter
        } else if self.mutation_tests_generated {
            Phase::MutationAugmented
        } else if self.mutation_measured_before {
            Phase::MutationMeasuredBefore
        } else if self.fixed {
            Phase::Fixed
        } else if self.coverage_improved {
            Phase::CoverageImproved
        } else if self.generated {
            Phase::Generated
        } else {
            Phase::Idle
        }
    }

    pub fn record_mutation(&mut self, stage: Stage, stats: MutationStats) {
        match stage {
            Stage::Before => {
                self.mutation_measured_before = true;
                self.initial_stats = Some(stats);
            }
            Stage::After => {
                self.mutation_measured_after = true;
                self.final_stats = Some(stats);
            }
        }
    }

    /// Advisory only. `None` until the final measurement exists.
    pub fn deploy_decision(&self, threshold: f64) -> Option<DeployDecision> {
        let stats = self.final_stats.as_ref()?;
        Some(if stats.mutation_score >= threshold {
            DeployDecision::DeployEligible
        } else {
            DeployDecision::DeployBlocked
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// A missing file is a fresh workflow.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(PipelineError::from),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PipelineError::read(path, e)),
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        safety::write_atomic(path, &json)
    }
}
