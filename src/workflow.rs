//! The ordered pipeline: generate, improve coverage, fix, measure mutation,
//! augment, measure again.
//!
//! Every stage works file by file. A module that cannot be resolved, an oracle
//! failure or a splice that does not apply is logged and skipped; only
//! failures to run the test or mutation tooling abort a stage.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{Config, RunLabel};
use crate::error::{PipelineError, Result};
use crate::oracle::{self, Oracle};
use crate::report::{self, MutationStats};
use crate::resolve;
use crate::results::{TestRunReport, TestStatus};
use crate::runner::{self, CoverageSession, ModuleRegistry};
use crate::splice::{self, SpliceOutcome, TestArtifact};
use crate::state::{DeployDecision, Stage, WorkflowState};
use crate::{operators, prompts, safety, tree};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestTally {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl TestTally {
    pub fn from_report(report: &TestRunReport) -> Self {
        Self {
            passed: report.count(TestStatus::Pass),
            failed: report.count(TestStatus::Fail),
            errors: report.count(TestStatus::Error),
            skipped: report.count(TestStatus::Skip),
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub attempted: usize,
    pub applied: usize,
    pub methods_added: usize,
    pub files_written: Vec<PathBuf>,
    /// Where each inserted fragment landed, tied to the module it tests.
    pub artifacts: Vec<TestArtifact>,
    pub skipped: Vec<Skipped>,
    pub tests: Option<TestTally>,
    pub coverage_gaps: Option<usize>,
    pub mutation: Option<MutationStats>,
}

impl StageSummary {
    fn new(stage: &str) -> Self {
        Self { stage: stage.to_string(), ..Self::default() }
    }

    fn skip(&mut self, item: impl std::fmt::Display, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(item = %item, reason = %reason, stage = %self.stage, "skipped");
        self.skipped.push(Skipped { item: item.to_string(), reason });
    }

    fn record_splice(&mut self, source_module: &Path, file: &Path, outcome: &SpliceOutcome) {
        match TestArtifact::from_outcome(source_module, file, outcome) {
            Some(artifact) => {
                self.applied += 1;
                self.methods_added += outcome.methods();
                self.files_written.push(file.to_path_buf());
                self.artifacts.push(artifact);
            }
            None => self.skip(file.display(), outcome.label()),
        }
    }
}

/// Split source text into line-aligned chunks of at most `max_chars`
/// characters. A single longer line becomes a chunk of its own.
pub fn chunk_code(code: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in code.lines() {
        let added = line.chars().count() + usize::from(!current.is_empty());
        if !current.is_empty() && current.chars().count() + added > max_chars {
            let full = std::mem::take(&mut current);
            if !full.trim().is_empty() {
                chunks.push(full);
            }
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

pub struct Pipeline<'a, O: Oracle> {
    config: &'a Config,
    oracle: O,
    state: WorkflowState,
    registry: ModuleRegistry,
}

impl<'a, O: Oracle> Pipeline<'a, O> {
    pub fn new(config: &'a Config, oracle: O, state: WorkflowState) -> Self {
        Self { config, oracle, state, registry: ModuleRegistry::new() }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    fn coverage(&self) -> CoverageSession<'a> {
        CoverageSession::new(self.config)
    }

    fn ask(&self, prompt: &str) -> std::result::Result<String, String> {
        match self.oracle.complete(prompt) {
            Ok(raw) => {
                let answer = oracle::clean_response(&raw);
                if answer.is_empty() {
                    Err("empty oracle answer".to_string())
                } else {
                    Ok(answer)
                }
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Run the test tree under coverage and write the artifacts for `label`.
    fn run_and_record(&mut self, label: RunLabel, summary: &mut StageSummary) -> Result<()> {
        let artifacts = self.config.artifacts();
        let coverage = self.coverage();
        let output = coverage.run_tests(&mut self.registry)?;
        let report = TestRunReport::from_output(&output);
        report.write_json(&artifacts.results_json(label))?;
        report.write_html(&artifacts.results_html(label))?;

        let text = coverage.report(&artifacts.coverage_report(label))?;
        coverage.html(&artifacts.coverage_html_dir())?;

        let tally = TestTally::from_report(&report);
        tracing::info!(
            passed = tally.passed,
            failed = tally.failed,
            errors = tally.errors,
            skipped = tally.skipped,
            "test run recorded"
        );
        summary.tests = Some(tally);
        summary.coverage_gaps = Some(report::parse_coverage(&text).len());
        Ok(())
    }

    /// Write one test module per source chunk, then run everything.
    pub fn generate(&mut self) -> Result<StageSummary> {
        self.coverage().restart()?;
        let mut summary = self.write_generated_tests()?;
        self.run_and_record(RunLabel::Initial, &mut summary)?;
        self.state.generated = true;
        Ok(summary)
    }

    /// The oracle half of [`Pipeline::generate`]; no tooling involved.
    pub fn write_generated_tests(&mut self) -> Result<StageSummary> {
        let mut summary = StageSummary::new("generate");
        let source_root = self.config.source_root();
        let test_root = self.config.test_root();
        let source_dir = self.config.source_dir.display().to_string();
        let test_dir = self.config.test_dir.display().to_string();

        std::fs::create_dir_all(&test_root).map_err(|e| PipelineError::write(&test_root, e))?;

        for module in tree::python_sources(&source_root) {
            let Some(stem) = module.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let code = safety::read_text(&module)?;
            let chunks = chunk_code(&code, self.config.chunk_size);
            tracing::info!(module = %module.display(), chunks = chunks.len(), "generating tests");

            for (i, chunk) in chunks.iter().enumerate() {
                summary.attempted += 1;
                let Some(target) = resolve::expected_test_path(&source_root, &test_root, &module, i) else {
                    summary.skip(module.display(), "unresolvable test path");
                    continue;
                };
                let prompt = prompts::generation(chunk, &stem, &source_dir, &test_dir);
                let answer = match self.ask(&prompt) {
                    Ok(a) => a,
                    Err(reason) => {
                        summary.skip(target.display(), reason);
                        continue;
                    }
                };

                let dir = target.parent().unwrap_or(&test_root);
                tree::create_init_files(dir, &test_root).map_err(|e| PipelineError::write(dir, e))?;
                let mut body = splice::extract_code(&answer);
                if !body.ends_with('\n') {
                    body.push('\n');
                }
                safety::write_atomic(&target, &body)?;
                summary.applied += 1;
                summary.methods_added += splice::count_test_methods(&body);
                summary.files_written.push(target);
            }
        }
        Ok(summary)
    }

    /// Splice extra tests for every module below full coverage.
    pub fn improve_coverage(&mut self) -> Result<StageSummary> {
        let report_path = self.config.artifacts().coverage_report(RunLabel::Initial);
        let text = safety::read_text(&report_path)?;
        let gaps = report::parse_coverage(&text);
        let mut summary = self.augment_gaps(&gaps)?;
        self.run_and_record(RunLabel::Improved, &mut summary)?;
        self.state.coverage_improved = true;
        Ok(summary)
    }

    pub fn augment_gaps(&mut self, gaps: &[report::CoverageGapRecord]) -> Result<StageSummary> {
        let mut summary = StageSummary::new("improve");
        let source_root = self.config.source_root();
        let test_root = self.config.test_root();

        if gaps.is_empty() {
            tracing::info!("every module is fully covered");
        }
        for gap in gaps {
            summary.attempted += 1;
            let Some(module) = self.locate_module(&gap.module_path) else {
                summary.skip(&gap.module_path, "source module not found");
                continue;
            };
            let Some(test_file) = resolve::test_files_for(&source_root, &test_root, &module).into_iter().next()
            else {
                summary.skip(&gap.module_path, "no generated test file");
                continue;
            };

            let source = safety::read_text(&module)?;
            let tests = safety::read_text(&test_file)?;
            let prompt = prompts::branch_coverage(&source, &tests, gap);
            let answer = match self.ask(&prompt) {
                Ok(a) => a,
                Err(reason) => {
                    summary.skip(&gap.module_path, reason);
                    continue;
                }
            };
            let outcome = splice::splice_file(&test_file, &answer, None, self.config.indent_unit)?;
            summary.record_splice(&module, &test_file, &outcome);
        }
        Ok(summary)
    }

    /// Coverage reports name modules relative to the project root.
    fn locate_module(&self, module_path: &str) -> Option<PathBuf> {
        [
            self.config.project_root.join(module_path),
            self.config.source_root().join(module_path),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    /// Ask for a repair of every failing test from the improved run.
    pub fn fix_failures(&mut self) -> Result<StageSummary> {
        let results = TestRunReport::load(&self.config.artifacts().results_json(RunLabel::Improved))?;
        let mut summary = self.fix_records(&results)?;
        self.run_and_record(RunLabel::Fixed, &mut summary)?;
        self.state.fixed = true;
        Ok(summary)
    }

    pub fn fix_records(&mut self, results: &TestRunReport) -> Result<StageSummary> {
        let mut summary = StageSummary::new("fix");
        let source_root = self.config.source_root();
        let test_root = self.config.test_root();

        for record in results.failing() {
            summary.attempted += 1;
            let id = &record.test_id;
            let Some(parsed) = resolve::TestId::parse(id) else {
                summary.skip(id, "unparsable test id");
                continue;
            };
            let Some(test_file) = resolve::test_file_for_id(&test_root, id) else {
                summary.skip(id, "test file not found");
                continue;
            };
            let source_file = resolve::source_for_test_id(&source_root, id)
                .or_else(|| resolve::source_for_test_file(&test_root, &source_root, &test_file));
            let Some(source_file) = source_file else {
                summary.skip(id, "source file not found");
                continue;
            };

            let tests = safety::read_text(&test_file)?;
            let Some(method) = splice::extract_method(&tests, parsed.method) else {
                summary.skip(id, "failing method not found in test file");
                continue;
            };
            let source = safety::read_text(&source_file)?;
            let reason = record.reason.as_deref().unwrap_or("");
            let answer = match self.ask(&prompts::fix(&source, &method, reason)) {
                Ok(a) => a,
                Err(reason) => {
                    summary.skip(id, reason);
                    continue;
                }
            };
            if splice::normalize_fragment(&answer).lines == splice::normalize_fragment(&method).lines {
                summary.skip(id, "oracle returned the method unchanged");
                continue;
            }

            let outcome = splice::replace_method_in_file(
                &test_file,
                parsed.method,
                &answer,
                Some(parsed.class_name),
                self.config.indent_unit,
            )?;
            summary.record_splice(&source_file, &test_file, &outcome);
        }
        Ok(summary)
    }

    /// Run the mutation tool for `stage` and latch its stats.
    pub fn measure_mutation(&mut self, stage: Stage) -> Result<StageSummary> {
        let artifacts = self.config.artifacts();
        let report_path = artifacts.mutation_report(stage.as_str());
        let html_dir = artifacts.mutation_html_dir(stage.as_str());

        self.registry.invalidate(&self.config.test_root());
        runner::run_mutation_tool(self.config, &report_path, &html_dir)?;
        let stats = report::load_mutation_report(&report_path);
        tracing::info!(
            stage = stage.as_str(),
            killed = stats.killed,
            survived = stats.survived,
            total = stats.total,
            score = stats.mutation_score,
            "mutation analysis recorded"
        );

        let mut summary = StageSummary::new(&format!("mutate-{}", stage.as_str()));
        summary.mutation = Some(stats.clone());
        self.state.record_mutation(stage, stats);
        Ok(summary)
    }

    /// For each module, pick one mutation and ask each of its test files for
    /// methods that would catch it.
    pub fn augment_mutation(&mut self) -> Result<StageSummary> {
        let mut summary = StageSummary::new("augment");
        let source_root = self.config.source_root();
        let test_root = self.config.test_root();

        for module in tree::python_sources(&source_root) {
            let rel = module.strip_prefix(&self.config.project_root).unwrap_or(&module);
            let module_label = rel.display().to_string();
            let test_files = resolve::test_files_for(&source_root, &test_root, &module);
            if test_files.is_empty() {
                summary.skip(&module_label, "no generated test file");
                continue;
            }
            let source = safety::read_text(&module)?;
            let Some((_, record)) = operators::select_mutation(&source, &module_label) else {
                summary.skip(&module_label, "no applicable mutation");
                continue;
            };
            tracing::debug!(module = %module_label, line = record.line_number, kind = %record.operator_kind, "selected mutation");

            for test_file in test_files {
                summary.attempted += 1;
                let tests = safety::read_text(&test_file)?;
                let answer = match self.ask(&prompts::mutation(&source, &tests, &record)) {
                    Ok(a) => a,
                    Err(reason) => {
                        summary.skip(test_file.display(), reason);
                        continue;
                    }
                };
                let outcome = splice::splice_file(&test_file, &answer, None, self.config.indent_unit)?;
                summary.record_splice(&module, &test_file, &outcome);
            }
        }

        self.state.mutation_tests_generated = true;
        Ok(summary)
    }

    pub fn deploy_decision(&self) -> Option<DeployDecision> {
        self.state.deploy_decision(self.config.deploy_threshold)
    }

    /// Clear every latch and the accumulated coverage data.
    pub fn restart(&mut self) -> Result<()> {
        self.state.reset();
        if let Err(e) = self.coverage().restart() {
            if !e.is_subprocess() {
                return Err(e);
            }
            tracing::warn!(error = %e, "could not erase coverage data");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_code_respects_limit() {
        let code = "a = 1\nb = 2\nc = 3\n";
        assert_eq!(chunk_code(code, 11), vec!["a = 1\nb = 2", "c = 3"]);
        assert_eq!(chunk_code(code, 512), vec!["a = 1\nb = 2\nc = 3"]);
    }

    #[test]
    fn chunk_code_keeps_long_line_whole() {
        let long = "x".repeat(20);
        let code = format!("a\n{long}\nb");
        assert_eq!(chunk_code(&code, 5), vec!["a".to_string(), long, "b".to_string()]);
    }

    #[test]
    fn chunk_code_of_empty_source_is_empty() {
        assert!(chunk_code("", 512).is_empty());
        assert!(chunk_code("\n\n", 512).is_empty());
    }
}
