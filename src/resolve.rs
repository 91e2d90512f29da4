//! Source module <-> test file correspondence.
//!
//! Tests are generated per fixed-size code chunk, so one source module `a.py`
//! maps to `test_a_0.py`, `test_a_1.py`, ... in the mirrored test directory.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::tree;

static TEST_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^test_?").expect("valid prefix regex"));
static CHUNK_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(_\d+)?\.py$").expect("valid suffix regex"));

pub fn test_file_name(basename: &str, chunk: usize) -> String {
    format!("test_{basename}_{chunk}.py")
}

/// Module path relative to the source root. Paths outside the root are taken
/// as already relative.
fn relative_module<'a>(source_root: &Path, module: &'a Path) -> &'a Path {
    module.strip_prefix(source_root).unwrap_or(module)
}

fn module_stem(module: &Path) -> Option<String> {
    Some(module.file_stem()?.to_string_lossy().into_owned())
}

/// Directory in the test tree mirroring the module's directory.
pub fn mirrored_test_dir(source_root: &Path, test_root: &Path, module: &Path) -> PathBuf {
    let rel = relative_module(source_root, module);
    match rel.parent() {
        Some(parent) => test_root.join(parent),
        None => test_root.to_path_buf(),
    }
}

pub fn expected_test_path(
    source_root: &Path,
    test_root: &Path,
    module: &Path,
    chunk: usize,
) -> Option<PathBuf> {
    let stem = module_stem(module)?;
    Some(mirrored_test_dir(source_root, test_root, module).join(test_file_name(&stem, chunk)))
}

/// Forward resolution: every existing chunk test file of `module`, ordered by
/// chunk index.
pub fn test_files_for(source_root: &Path, test_root: &Path, module: &Path) -> Vec<PathBuf> {
    let Some(stem) = module_stem(module) else {
        return Vec::new();
    };
    let dir = mirrored_test_dir(source_root, test_root, module);
    let Ok(pattern) = Regex::new(&format!(r"^test_{}_(\d+)\.py$", regex::escape(&stem))) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(&dir) else {
        tracing::debug!(dir = %dir.display(), "no mirrored test directory");
        return Vec::new();
    };

    let mut chunks: Vec<(usize, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let index = pattern.captures(&name)?[1].parse::<usize>().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    chunks.sort();
    chunks.into_iter().map(|(_, path)| path).collect()
}

/// `test_policy_service_2.py` -> `policy_service.py`.
pub fn source_name_for_test(file_name: &str) -> String {
    let core = TEST_PREFIX.replace(file_name, "");
    CHUNK_SUFFIX.replace(&core, ".py").into_owned()
}

/// Reverse resolution: the source module a chunk test file was generated from.
pub fn source_for_test_file(test_root: &Path, source_root: &Path, test_file: &Path) -> Option<PathBuf> {
    let file_name = test_file.file_name()?.to_string_lossy();
    let source_name = source_name_for_test(&file_name);

    let rel = test_file.strip_prefix(test_root).unwrap_or(test_file);
    let mirrored = match rel.parent() {
        Some(parent) => source_root.join(parent).join(&source_name),
        None => source_root.join(&source_name),
    };
    if mirrored.is_file() {
        return Some(mirrored);
    }

    let found = tree::walk_files(source_root, &|name| name == source_name)
        .into_iter()
        .next();
    if found.is_none() {
        tracing::warn!(test_file = %test_file.display(), "no source module for test file");
    }
    found
}

/// `TestPolicyService` -> `test_policy_service`.
pub fn class_to_file_prefix(class_name: &str) -> String {
    let mut snake = String::with_capacity(class_name.len() + 4);
    for (i, ch) in class_name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            snake.push('_');
        }
        snake.extend(ch.to_lowercase());
    }
    if snake.starts_with("test_") {
        snake
    } else {
        format!("test_{snake}")
    }
}

/// Pieces of a dotted unittest identifier `pkg.pkg.module.Class.method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestId<'a> {
    pub packages: Vec<&'a str>,
    pub module: Option<&'a str>,
    pub class_name: &'a str,
    pub method: &'a str,
}

impl<'a> TestId<'a> {
    pub fn parse(test_id: &'a str) -> Option<Self> {
        let parts: Vec<&str> = test_id.split('.').collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        let n = parts.len();
        let (packages, module) = if n >= 3 {
            (parts[..n - 3].to_vec(), Some(parts[n - 3]))
        } else {
            (Vec::new(), None)
        };
        Some(Self {
            packages,
            module,
            class_name: parts[n - 2],
            method: parts[n - 1],
        })
    }
}

/// Class resolution: guess the test file holding `test_id`'s class.
pub fn test_file_for_id(test_root: &Path, test_id: &str) -> Option<PathBuf> {
    let id = TestId::parse(test_id)?;
    let prefix = class_to_file_prefix(id.class_name);
    let candidates = tree::walk_files(test_root, &|name| {
        name == format!("{prefix}.py") || (name.starts_with(&format!("{prefix}_")) && name.ends_with(".py"))
    });
    let found = best_by_packages(test_root, &id.packages, candidates);
    if found.is_none() {
        tracing::warn!(test_id, prefix = %prefix, "test file not found");
    }
    found
}

/// Source module under test for `test_id`, derived from its class name.
pub fn source_for_test_id(source_root: &Path, test_id: &str) -> Option<PathBuf> {
    let id = TestId::parse(test_id)?;
    let prefix = class_to_file_prefix(id.class_name);
    let source_name = format!("{}.py", &prefix["test_".len()..]);
    let candidates = tree::walk_files(source_root, &|name| name == source_name);
    let found = best_by_packages(source_root, &id.packages, candidates);
    if found.is_none() {
        tracing::warn!(test_id, source_name = %source_name, "source file not found");
    }
    found
}

/// Keep candidates whose directory (relative to `root`) is a suffix of the
/// identifier's package path; prefer the deepest such directory, then the
/// earliest in traversal order.
fn best_by_packages(root: &Path, packages: &[&str], candidates: Vec<PathBuf>) -> Option<PathBuf> {
    let mut best: Option<(usize, PathBuf)> = None;
    for candidate in candidates {
        let rel_dirs = relative_dirs(root, &candidate);
        if !packages.ends_with(&rel_dirs.iter().map(String::as_str).collect::<Vec<_>>()) {
            continue;
        }
        let depth = rel_dirs.len();
        if best.as_ref().is_none_or(|(d, _)| depth > *d) {
            best = Some((depth, candidate));
        }
    }
    best.map(|(_, path)| path)
}

fn relative_dirs(root: &Path, file: &Path) -> Vec<String> {
    let rel = file.strip_prefix(root).unwrap_or(file);
    rel.parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}
