//! Splicing untrusted generated test methods into an existing `unittest` class.
//!
//! The oracle's indentation is discarded: every fragment line is re-indented
//! in the style the target class body already uses, so the only structure
//! taken from the fragment is which lines are `def`s, which are bodies, and
//! which open a nested block.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::parser::{self, SyntaxIssue};
use crate::safety;

static CLASS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)class\s+(\w+)\s*\(([^)]*TestCase[^)]*)\)\s*:").expect("valid class regex")
});

const TAB_WIDTH: usize = 4;
const NESTED_OPENERS: &[&str] = &["with ", "if ", "for ", "while "];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    /// 0-based line index.
    pub line: usize,
    pub name: String,
    pub indent: usize,
}

/// Where a fragment lands, computed fresh on every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub class_name: String,
    pub class_indent_width: usize,
    /// 0-based line index in the original text; the block goes right before it.
    pub insertion_point: usize,
}

/// A placement bound to the files it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestArtifact {
    pub source_module_path: PathBuf,
    pub test_file_path: PathBuf,
    pub placement: Placement,
}

impl TestArtifact {
    /// `None` unless the outcome actually inserted something.
    pub fn from_outcome(source_module: &Path, test_file: &Path, outcome: &SpliceOutcome) -> Option<Self> {
        match outcome {
            SpliceOutcome::Inserted { placement, .. } => Some(Self {
                source_module_path: source_module.to_path_buf(),
                test_file_path: test_file.to_path_buf(),
                placement: placement.clone(),
            }),
            _ => None,
        }
    }
}

/// How a class body is indented: the header's own leading whitespace plus
/// one step per level, both copied from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentStyle {
    pub base: String,
    pub step: String,
}

impl IndentStyle {
    /// Space indentation of `unit` columns under a header at `class_width`.
    pub fn spaces(class_width: usize, unit: usize) -> Self {
        Self { base: " ".repeat(class_width), step: " ".repeat(unit) }
    }

    fn level(&self, n: usize) -> String {
        format!("{}{}", self.base, self.step.repeat(n))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceOutcome {
    Inserted {
        text: String,
        methods: usize,
        placement: Placement,
    },
    /// The fragment held no `def` lines; nothing to insert.
    EmptyFragment,
    /// No `unittest.TestCase` subclass; the class must be created by hand.
    NoTestClass,
    /// The spliced text failed the syntax check; the original stays as is.
    Rejected { issues: Vec<SyntaxIssue> },
    /// The spliced text parses, but the class did not gain the inserted
    /// `test_` methods; they ended up nested or inside a string.
    Misplaced { expected: usize, found: usize },
}

impl SpliceOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, SpliceOutcome::Inserted { .. })
    }

    pub fn methods(&self) -> usize {
        match self {
            SpliceOutcome::Inserted { methods, .. } => *methods,
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpliceOutcome::Inserted { .. } => "inserted",
            SpliceOutcome::EmptyFragment => "empty-fragment",
            SpliceOutcome::NoTestClass => "no-test-class",
            SpliceOutcome::Rejected { .. } => "rejected",
            SpliceOutcome::Misplaced { .. } => "misplaced",
        }
    }
}

/// Fragment after cleanup: code lines with imports split off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub lines: Vec<String>,
    pub imports: Vec<String>,
}

impl Fragment {
    pub fn def_count(&self) -> usize {
        self.lines.iter().filter(|l| is_def(l.trim_start())).count()
    }

    /// `def test_*` lines; each becomes a method of the target class.
    pub fn test_def_count(&self) -> usize {
        self.lines.iter().filter(|l| is_test_def(l.trim_start())).count()
    }
}

fn expand_tabs(line: &str) -> String {
    line.replace('\t', &" ".repeat(TAB_WIDTH))
}

fn leading_whitespace(line: &str) -> &str {
    let rest = line.trim_start_matches([' ', '\t']);
    &line[..line.len() - rest.len()]
}

fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += TAB_WIDTH,
            _ => break,
        }
    }
    width
}

fn is_def(trimmed: &str) -> bool {
    trimmed.starts_with("def ") || trimmed.starts_with("async def ")
}

fn is_test_def(trimmed: &str) -> bool {
    let rest = trimmed.strip_prefix("async ").unwrap_or(trimmed);
    rest.strip_prefix("def ").is_some_and(|name| name.trim_start().starts_with("test_"))
}

fn is_import(trimmed: &str) -> bool {
    trimmed.starts_with("import ") || trimmed.starts_with("from ")
}

fn is_main_guard(trimmed: &str) -> bool {
    trimmed.starts_with("if __name__")
}

/// Keep only fenced content when the fragment has markdown fences.
fn strip_fences(raw: &str) -> Vec<&str> {
    let has_fence = raw.lines().any(|l| l.trim_start().starts_with("```"));
    if !has_fence {
        return raw.lines().collect();
    }
    let mut inside = false;
    let mut kept = Vec::new();
    for line in raw.lines() {
        if line.trim_start().starts_with("```") {
            inside = !inside;
            continue;
        }
        if inside {
            kept.push(line);
        }
    }
    kept
}

/// A whole generated module: fenced content when fenced, else the text as is.
pub fn extract_code(raw: &str) -> String {
    strip_fences(raw).join("\n").trim_matches('\n').to_string()
}

/// Clean raw oracle text: fences, tabs, surrounding blank lines, common
/// indentation, a trailing main guard, wrapping class headers and top-level
/// imports are all dealt with here.
pub fn normalize_fragment(raw: &str) -> Fragment {
    let mut lines: Vec<String> = strip_fences(raw).into_iter().map(expand_tabs).collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let common = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| indent_width(l))
        .min()
        .unwrap_or(0);
    let dedented: Vec<String> = lines
        .into_iter()
        .map(|l| if l.trim().is_empty() { String::new() } else { l[common..].to_string() })
        .collect();

    let mut fragment = Fragment::default();
    let mut i = 0;
    while i < dedented.len() {
        let line = &dedented[i];
        let top_level = !line.is_empty() && indent_width(line) == 0;

        if top_level && is_main_guard(line) {
            i += 1;
            while i < dedented.len() && (dedented[i].is_empty() || indent_width(&dedented[i]) > 0) {
                i += 1;
            }
            continue;
        }
        if top_level && CLASS_HEADER.is_match(line) {
            i += 1;
            continue;
        }
        if top_level && is_import(line) {
            let mut statement = line.clone();
            if line.contains('(') && !line.contains(')') {
                while i + 1 < dedented.len() {
                    i += 1;
                    statement.push('\n');
                    statement.push_str(&dedented[i]);
                    if dedented[i].contains(')') {
                        break;
                    }
                }
            }
            fragment.imports.push(statement);
            i += 1;
            continue;
        }

        fragment.lines.push(line.clone());
        i += 1;
    }

    while fragment.lines.first().is_some_and(|l| l.is_empty()) {
        fragment.lines.remove(0);
    }
    while fragment.lines.last().is_some_and(|l| l.is_empty()) {
        fragment.lines.pop();
    }
    fragment
}

/// Re-indent fragment lines in `style`.
///
/// `def` and decorator lines go one level in, their bodies two; the line after
/// a `with`/`if`/`for`/`while` opener goes three, then bodies revert to two.
pub fn reindent(lines: &[String], style: &IndentStyle) -> String {
    let level = |n: usize| style.level(n);
    let mut out = String::new();
    let mut in_function = false;
    let mut in_nested = false;

    for line in lines {
        let stripped = line.trim_start();
        if stripped.is_empty() {
            out.push('\n');
            continue;
        }

        let prefix = if is_def(stripped) {
            in_function = true;
            in_nested = false;
            level(1)
        } else if stripped.starts_with('@') {
            in_nested = false;
            level(1)
        } else if in_function {
            if NESTED_OPENERS.iter().any(|o| stripped.starts_with(o)) {
                in_nested = true;
                level(2)
            } else if in_nested {
                in_nested = false;
                level(3)
            } else {
                level(2)
            }
        } else {
            level(1)
        };

        out.push_str(&prefix);
        out.push_str(stripped);
        out.push('\n');
    }
    out
}

/// Every `class X(...TestCase...):` header, in file order.
pub fn test_classes<S: AsRef<str>>(lines: &[S]) -> Vec<ClassHeader> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let caps = CLASS_HEADER.captures(line.as_ref())?;
            Some(ClassHeader {
                line: idx,
                name: caps[2].to_string(),
                indent: indent_width(&caps[1]),
            })
        })
        .collect()
}

/// The named class when present, else the first test class.
pub fn find_test_class<S: AsRef<str>>(lines: &[S], target: Option<&str>) -> Option<ClassHeader> {
    let classes = test_classes(lines);
    if let Some(name) = target {
        if let Some(found) = classes.iter().find(|c| c.name == name) {
            return Some(found.clone());
        }
        tracing::debug!(class = name, "target class not found, using first test class");
    }
    classes.into_iter().next()
}

/// Indentation of the first statement in the class body under `header`.
/// `None` for an empty body or one whose indent does not extend the header's.
pub fn body_style<S: AsRef<str>>(lines: &[S], header: &ClassHeader) -> Option<IndentStyle> {
    let base = leading_whitespace(lines.get(header.line)?.as_ref()).to_string();
    let first = lines.iter().skip(header.line + 1).map(|l| l.as_ref()).find(|l| {
        let trimmed = l.trim();
        !trimmed.is_empty() && !trimmed.starts_with('#')
    })?;
    if indent_width(first) <= header.indent {
        return None;
    }
    let step = leading_whitespace(first).strip_prefix(base.as_str())?;
    if step.is_empty() {
        return None;
    }
    Some(IndentStyle { step: step.to_string(), base })
}

/// Line before which new methods go: the main guard, or the first code line
/// dedented to the class level, or end of file. Blank lines directly above
/// that point stay below the inserted block.
pub fn insertion_point<S: AsRef<str>>(lines: &[S], header: &ClassHeader) -> usize {
    let mut point = lines.len();
    for (idx, line) in lines.iter().enumerate().skip(header.line + 1) {
        let line = line.as_ref();
        let trimmed = line.trim();
        if is_main_guard(trimmed) {
            point = idx;
            break;
        }
        if !trimmed.is_empty() && !trimmed.starts_with('#') && indent_width(line) <= header.indent {
            point = idx;
            break;
        }
    }
    while point > header.line + 1 && lines[point - 1].as_ref().trim().is_empty() {
        point -= 1;
    }
    point
}

/// Top-level import statements before line `before`, and the last line any
/// of them occupies.
fn top_level_imports(lines: &[&str], before: usize) -> (Vec<String>, Option<usize>) {
    let mut seen = Vec::new();
    let mut last = None;
    let mut idx = 0;
    while idx < before.min(lines.len()) {
        let line = lines[idx];
        if indent_width(line) == 0 && is_import(line.trim()) {
            seen.push(line.trim().to_string());
            if line.contains('(') && !line.contains(')') {
                while idx + 1 < lines.len() && !lines[idx].contains(')') {
                    idx += 1;
                }
            }
            last = Some(idx);
        }
        idx += 1;
    }
    (seen, last)
}

/// Append `block` after a separating blank line unless `text` already ends
/// with one.
fn push_block(text: &mut String, block: &str) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    if !text.is_empty() && !text.ends_with("\n\n") {
        text.push('\n');
    }
    text.push_str(block);
}

/// Insert `fragment` into the test class of `existing`. Pure; see
/// [`splice_file`] for the on-disk version.
pub fn splice(existing: &str, fragment: &str, target_class: Option<&str>, unit: usize) -> SpliceOutcome {
    splice_against(existing, existing, fragment, target_class, unit)
}

/// Splice into `base`, judging syntax regressions against `original`.
fn splice_against(
    original: &str,
    base: &str,
    fragment: &str,
    target_class: Option<&str>,
    unit: usize,
) -> SpliceOutcome {
    let fragment = normalize_fragment(fragment);
    let methods = fragment.def_count();
    if methods == 0 {
        return SpliceOutcome::EmptyFragment;
    }

    let lines: Vec<&str> = base.split_inclusive('\n').collect();
    let Some(header) = find_test_class(&lines, target_class) else {
        return SpliceOutcome::NoTestClass;
    };
    let point = insertion_point(&lines, &header);
    let style = body_style(&lines, &header)
        .or_else(|| {
            // The replaced method may have been the whole body.
            let original_lines: Vec<&str> = original.split_inclusive('\n').collect();
            let original_header = find_test_class(&original_lines, Some(header.name.as_str()))?;
            body_style(&original_lines, &original_header)
        })
        .unwrap_or_else(|| IndentStyle::spaces(header.indent, unit));
    let block = reindent(&fragment.lines, &style);

    let (present, last_import) = top_level_imports(&lines, header.line);
    let missing: Vec<&String> = fragment
        .imports
        .iter()
        .filter(|imp| !present.iter().any(|p| p == imp.trim()))
        .collect();
    let import_at = last_import.map_or(0, |i| i + 1);

    let mut text = String::with_capacity(base.len() + block.len() + 64);
    for (idx, line) in lines.iter().enumerate() {
        if idx == import_at {
            for imp in &missing {
                text.push_str(imp);
                text.push('\n');
            }
        }
        if idx == point {
            push_block(&mut text, &block);
        }
        text.push_str(line);
    }
    if point == lines.len() {
        push_block(&mut text, &block);
    }

    let before = parser::syntax_errors(original).len();
    let issues = parser::syntax_errors(&text);
    if issues.len() > before {
        tracing::warn!(
            class = %header.name,
            errors = issues.len(),
            "spliced text fails syntax check"
        );
        return SpliceOutcome::Rejected { issues };
    }

    let expected = parser::class_test_methods(base, &header.name).len() + fragment.test_def_count();
    let found = parser::class_test_methods(&text, &header.name).len();
    if found != expected {
        tracing::warn!(class = %header.name, expected, found, "spliced methods did not land in the class");
        return SpliceOutcome::Misplaced { expected, found };
    }

    SpliceOutcome::Inserted {
        text,
        methods,
        placement: Placement {
            class_name: header.name,
            class_indent_width: header.indent,
            insertion_point: point,
        },
    }
}

/// Splice into a file on disk. The file is rewritten atomically, and only
/// when the outcome is `Inserted`.
pub fn splice_file(path: &Path, fragment: &str, target_class: Option<&str>, unit: usize) -> Result<SpliceOutcome> {
    let existing = safety::read_text(path)?;
    let outcome = splice(&existing, fragment, target_class, unit);
    commit(path, &outcome)?;
    Ok(outcome)
}

/// Replace method `method` with the fragment's methods in one write. When the
/// method is not found the fragment is simply appended to the class.
pub fn replace_method_in_file(
    path: &Path,
    method: &str,
    fragment: &str,
    target_class: Option<&str>,
    unit: usize,
) -> Result<SpliceOutcome> {
    let existing = safety::read_text(path)?;
    let base = match remove_method(&existing, method) {
        Some(text) => text,
        None => {
            tracing::debug!(method, path = %path.display(), "method not found, appending");
            existing.clone()
        }
    };
    let outcome = splice_against(&existing, &base, fragment, target_class, unit);
    commit(path, &outcome)?;
    Ok(outcome)
}

fn commit(path: &Path, outcome: &SpliceOutcome) -> Result<()> {
    match outcome {
        SpliceOutcome::Inserted { text, methods, placement } => {
            safety::write_atomic(path, text)?;
            tracing::info!(
                file = %path.display(),
                class = %placement.class_name,
                line = placement.insertion_point + 1,
                methods,
                "spliced test methods"
            );
        }
        other => {
            tracing::warn!(file = %path.display(), outcome = other.label(), "file left unchanged");
        }
    }
    Ok(())
}

/// Number of `test_*` methods defined in classes of `text`.
pub fn count_test_methods(text: &str) -> usize {
    parser::list_test_methods(text).len()
}

/// Line range `[start, end)` of method `name` including its decorators.
/// Trailing blank lines are not part of the span.
pub fn method_span(text: &str, name: &str) -> Option<(usize, usize)> {
    let lines: Vec<&str> = text.lines().collect();
    let pattern = Regex::new(&format!(r"^\s*(async\s+)?def\s+{}\s*\(", regex::escape(name))).ok()?;
    let def_line = lines.iter().position(|l| pattern.is_match(l))?;
    let indent = indent_width(lines[def_line]);

    let mut start = def_line;
    while start > 0 {
        let prev = lines[start - 1];
        if prev.trim_start().starts_with('@') && indent_width(prev) == indent {
            start -= 1;
        } else {
            break;
        }
    }

    let mut end = lines.len();
    for (idx, line) in lines.iter().enumerate().skip(def_line + 1) {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') && indent_width(line) <= indent {
            end = idx;
            break;
        }
    }
    while end > def_line + 1 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    Some((start, end))
}

/// Source text of method `name`, decorators included.
pub fn extract_method(text: &str, name: &str) -> Option<String> {
    let (start, end) = method_span(text, name)?;
    let mut out = text.lines().skip(start).take(end - start).collect::<Vec<_>>().join("\n");
    out.push('\n');
    Some(out)
}

/// `text` without method `name` and the blank lines that preceded it.
pub fn remove_method(text: &str, name: &str) -> Option<String> {
    let (mut start, end) = method_span(text, name)?;
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    while start > 0 && lines[start - 1].trim().is_empty() {
        start -= 1;
    }
    let mut out: String = lines[..start].concat();
    out.push_str(&lines[end..].concat());
    Some(out)
}
