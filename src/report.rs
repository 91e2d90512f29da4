//! Parsers for the coverage text summary and the mutation tool's YAML report.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

static COVERAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)%").expect("valid coverage regex")
});

static PYTHON_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!!python/\S+").expect("valid tag regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageGapRecord {
    pub module_path: String,
    pub statements_missing: u32,
    pub branches_missing: u32,
    pub coverage_percent: u32,
}

/// Parse a `coverage report` table with branch columns.
///
/// One record per module below 100%, in report order. Lines that do not have the
/// six-column shape are dropped; a garbled report degrades to fewer records.
pub fn parse_coverage(report_text: &str) -> Vec<CoverageGapRecord> {
    let mut gaps = Vec::new();

    for raw in report_text.lines() {
        let line = raw.replace('\0', "");
        let line = line.trim();
        if line.is_empty() || is_table_chrome(line) {
            continue;
        }

        let Some(caps) = COVERAGE_LINE.captures(line) else {
            tracing::debug!(line, "skipping unmatched coverage line");
            continue;
        };

        let number = |i: usize| caps[i].parse::<u32>().ok();
        let (Some(statements_missing), Some(branches_missing), Some(coverage_percent)) =
            (number(3), number(5), number(6))
        else {
            tracing::debug!(line, "skipping coverage line with out-of-range numbers");
            continue;
        };

        if coverage_percent < 100 {
            gaps.push(CoverageGapRecord {
                module_path: caps[1].to_string(),
                statements_missing,
                branches_missing,
                coverage_percent,
            });
        }
    }

    gaps
}

fn is_table_chrome(line: &str) -> bool {
    line.starts_with("Name")
        || line.starts_with("TOTAL")
        || line.chars().all(|c| c == '-' || c.is_whitespace())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationStats {
    pub killed: u32,
    pub survived: u32,
    pub timeout: u32,
    pub incompetent: u32,
    pub total: u32,
    pub mutation_score: f64,
}

impl MutationStats {
    /// killed / (killed + survived) * 100, or 0 with no relevant mutants.
    pub fn computed_score(&self) -> f64 {
        let relevant = self.killed + self.survived;
        if relevant == 0 {
            0.0
        } else {
            self.killed as f64 / relevant as f64 * 100.0
        }
    }
}

/// Parse the report, returning zeroed stats for empty input.
pub fn try_parse_mutation_report(yaml: &[u8]) -> Result<MutationStats, serde_yaml::Error> {
    let text = String::from_utf8_lossy(yaml);
    if text.trim().is_empty() {
        return Ok(MutationStats::default());
    }

    // Python object tags carry no stats; drop them before handing over to serde.
    let untagged = PYTHON_TAG.replace_all(&text, "");
    let doc: Value = serde_yaml::from_str(&untagged)?;
    let doc = untag(&doc);

    let mut stats = MutationStats::default();
    let mut reported_score = None;

    if let Value::Mapping(_) = doc {
        if let Some(Value::Sequence(entries)) = doc.get("mutations").map(untag) {
            for entry in entries {
                let status = untag(entry)
                    .get("status")
                    .map(untag)
                    .and_then(Value::as_str)
                    .unwrap_or("survived")
                    .to_lowercase();
                match status.as_str() {
                    "killed" => stats.killed += 1,
                    "survived" => stats.survived += 1,
                    "timeout" => stats.timeout += 1,
                    "incompetent" => stats.incompetent += 1,
                    other => tracing::debug!(status = other, "unknown mutant status"),
                }
                stats.total += 1;
            }
        }
        reported_score = doc.get("mutation_score").map(untag).and_then(Value::as_f64);
    }

    stats.mutation_score = reported_score.unwrap_or_else(|| stats.computed_score());
    Ok(stats)
}

/// Like [`try_parse_mutation_report`], but a malformed report is logged and
/// yields zeroed stats.
pub fn parse_mutation_report(yaml: &[u8]) -> MutationStats {
    match try_parse_mutation_report(yaml) {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(error = %e, "invalid YAML in mutation report, using zeroed stats");
            MutationStats::default()
        }
    }
}

/// A missing report file is treated as an empty report.
pub fn load_mutation_report(path: &Path) -> MutationStats {
    match std::fs::read(path) {
        Ok(bytes) => parse_mutation_report(&bytes),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "mutation report not readable");
            MutationStats::default()
        }
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}
