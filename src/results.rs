//! Test outcome aggregation: unittest output in, flat per-test records out.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::safety;

static CASE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([\w.]+) \(([\w.]+)\)(.*)$").expect("valid case regex")
});
static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(FAIL|ERROR): ([\w.]+) \(([\w.]+)\)").expect("valid block regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Error,
    Skip,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pass => "PASS",
            TestStatus::Fail => "FAIL",
            TestStatus::Error => "ERROR",
            TestStatus::Skip => "SKIP",
        }
    }

    pub fn is_failing(self) -> bool {
        matches!(self, TestStatus::Fail | TestStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultRecord {
    #[serde(rename = "test")]
    pub test_id: String,
    pub status: TestStatus,
    pub reason: Option<String>,
}

/// Discovered tests as nested suites: module, then class, then cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteNode {
    Suite { name: String, children: Vec<SuiteNode> },
    Case { id: String },
}

impl SuiteNode {
    pub fn root() -> Self {
        SuiteNode::Suite { name: String::new(), children: Vec::new() }
    }

    /// Case ids in depth-first order.
    pub fn flatten(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            SuiteNode::Case { id } => out.push(id),
            SuiteNode::Suite { children, .. } => {
                for child in children {
                    child.collect(out);
                }
            }
        }
    }

    fn child_suite(&mut self, name: &str) -> Option<&mut SuiteNode> {
        let SuiteNode::Suite { children, .. } = self else {
            return None;
        };
        let pos = children.iter().position(|c| matches!(c, SuiteNode::Suite { name: n, .. } if n == name));
        let pos = match pos {
            Some(p) => p,
            None => {
                children.push(SuiteNode::Suite { name: name.to_string(), children: Vec::new() });
                children.len() - 1
            }
        };
        children.get_mut(pos)
    }

    /// Insert `id` under its module and class suites unless already present.
    pub fn add_case(&mut self, id: &str) {
        let parts: Vec<&str> = id.split('.').collect();
        let (module, class) = match parts.len() {
            0 | 1 => (String::new(), String::new()),
            2 => (String::new(), parts[0].to_string()),
            n => (parts[..n - 2].join("."), parts[n - 2].to_string()),
        };
        let Some(module_suite) = self.child_suite(&module) else {
            return;
        };
        let Some(SuiteNode::Suite { children, .. }) = module_suite.child_suite(&class) else {
            return;
        };
        if !children.iter().any(|c| matches!(c, SuiteNode::Case { id: existing } if existing == id)) {
            children.push(SuiteNode::Case { id: id.to_string() });
        }
    }
}

/// What the runner reported beyond the discovered ids: `(id, reason)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    pub failures: Vec<(String, String)>,
    pub errors: Vec<(String, String)>,
    pub skipped: Vec<(String, String)>,
}

fn lookup<'a>(entries: &'a [(String, String)], id: &str) -> Option<&'a str> {
    entries.iter().find(|(i, _)| i == id).map(|(_, r)| r.as_str())
}

/// Classify one case: failures, then errors, then skips; first hit wins.
pub fn classify(id: &str, outcome: &RunOutcome) -> TestResultRecord {
    let checks = [
        (&outcome.failures, TestStatus::Fail),
        (&outcome.errors, TestStatus::Error),
        (&outcome.skipped, TestStatus::Skip),
    ];
    for (entries, status) in checks {
        if let Some(reason) = lookup(entries, id) {
            return TestResultRecord {
                test_id: id.to_string(),
                status,
                reason: Some(reason.to_string()),
            };
        }
    }
    TestResultRecord { test_id: id.to_string(), status: TestStatus::Pass, reason: None }
}

pub fn normalize(suite: &SuiteNode, outcome: &RunOutcome) -> Vec<TestResultRecord> {
    suite.flatten().into_iter().map(|id| classify(id, outcome)).collect()
}

/// Full dotted id from a verbose `name (qualifier)` pair. Python 3.11+ puts
/// the method in the qualifier, older versions only the class.
fn case_id(name: &str, qualifier: &str) -> String {
    if qualifier == name || qualifier.ends_with(&format!(".{name}")) {
        qualifier.to_string()
    } else {
        format!("{qualifier}.{name}")
    }
}

fn is_rule(line: &str, ch: char) -> bool {
    line.len() >= 10 && line.chars().all(|c| c == ch)
}

/// Parse `unittest -v` output into discovered cases and their outcomes.
pub fn parse_unittest_output(text: &str) -> (SuiteNode, RunOutcome) {
    let mut suite = SuiteNode::root();
    let mut outcome = RunOutcome::default();
    let mut pending: Option<String> = None;
    let lines: Vec<&str> = text.lines().collect();

    let record_status = |id: &str, status: &str, outcome: &mut RunOutcome| {
        let status = status.trim();
        if let Some(reason) = status.strip_prefix("skipped") {
            let reason = reason.trim().trim_matches('\'').to_string();
            outcome.skipped.push((id.to_string(), reason));
        } else if status == "FAIL" || status == "unexpected success" {
            if lookup(&outcome.failures, id).is_none() {
                outcome.failures.push((id.to_string(), status.to_string()));
            }
        } else if status == "ERROR" && lookup(&outcome.errors, id).is_none() {
            outcome.errors.push((id.to_string(), String::new()));
        }
    };

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = BLOCK_HEADER.captures(line) {
            let id = case_id(&caps[2], &caps[3]);
            let mut j = i + 1;
            if lines.get(j).is_some_and(|l| is_rule(l, '-')) {
                j += 1;
            }
            let mut body = Vec::new();
            while j < lines.len() && !is_rule(lines[j], '=') && !is_rule(lines[j], '-') {
                body.push(lines[j]);
                j += 1;
            }
            let reason = body.join("\n").trim().to_string();
            let bucket = if &caps[1] == "FAIL" { &mut outcome.failures } else { &mut outcome.errors };
            match bucket.iter_mut().find(|(existing, _)| *existing == id) {
                Some(entry) => entry.1 = reason,
                None => bucket.push((id.clone(), reason)),
            }
            suite.add_case(&id);
            i = j;
            continue;
        }

        if let Some(caps) = CASE_LINE.captures(line) {
            let id = case_id(&caps[1], &caps[2]);
            suite.add_case(&id);
            match caps[3].split_once(" ... ") {
                Some((_, status)) => record_status(&id, status, &mut outcome),
                None => pending = Some(id),
            }
        } else if let Some(id) = pending.take() {
            match line.rsplit_once(" ... ") {
                Some((_, status)) => record_status(&id, status, &mut outcome),
                None => pending = Some(id),
            }
        }
        i += 1;
    }

    (suite, outcome)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRunReport {
    pub test_run_date: DateTime<Local>,
    pub results: Vec<TestResultRecord>,
}

impl TestRunReport {
    pub fn new(results: Vec<TestResultRecord>) -> Self {
        Self { test_run_date: Local::now(), results }
    }

    pub fn from_output(text: &str) -> Self {
        let (suite, outcome) = parse_unittest_output(text);
        Self::new(normalize(&suite, &outcome))
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn failing(&self) -> impl Iterator<Item = &TestResultRecord> {
        self.results.iter().filter(|r| r.status.is_failing())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        safety::write_atomic(path, &json)
    }

    pub fn write_html(&self, path: &Path) -> Result<()> {
        safety::write_atomic(path, &self.to_html())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = safety::read_text(path)?;
        serde_json::from_str(&text).map_err(PipelineError::from)
    }

    pub fn to_html(&self) -> String {
        let mut rows = String::new();
        for record in &self.results {
            let color = match record.status {
                TestStatus::Pass => "#d4edda",
                TestStatus::Fail => "#f8d7da",
                TestStatus::Error => "#fff3cd",
                TestStatus::Skip => "#e2e3e5",
            };
            let _ = writeln!(
                rows,
                "<tr style=\"background-color: {color};\"><td>{}</td><td>{}</td><td class=\"reason\">{}</td></tr>",
                escape_html(&record.test_id),
                record.status.as_str(),
                escape_html(record.reason.as_deref().unwrap_or("")),
            );
        }
        format!(
            "<html>\n<head>\n<style>\n\
             body {{ font-family: Arial, sans-serif; margin: 20px; }}\n\
             table {{ width: 100%; border-collapse: collapse; margin-top: 20px; text-align: left; }}\n\
             th, td {{ padding: 12px; border: 1px solid #ddd; }}\n\
             th {{ background-color: #f4f4f4; }}\n\
             .reason {{ white-space: pre-wrap; word-wrap: break-word; }}\n\
             </style>\n</head>\n<body>\n<h2>Unit Test Results</h2>\n\
             <p>Test run date: {}</p>\n\
             <table>\n<tr><th>test</th><th>status</th><th>reason</th></tr>\n{rows}</table>\n\
             </body>\n</html>\n",
            self.test_run_date.to_rfc3339()
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
