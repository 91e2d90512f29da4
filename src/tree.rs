use std::fs;
use std::path::{Path, PathBuf};

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "htmlcov",
    "coverage_html_report",
];

const SKIP_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

pub fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name) || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// All files under `root` accepted by `keep`, depth-first with entries in
/// lexical order so results are stable across platforms.
pub fn walk_files(root: &Path, keep: &dyn Fn(&str) -> bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_into(root, keep, &mut out);
    out
}

fn walk_into(dir: &Path, keep: &dyn Fn(&str) -> bool, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if should_skip(&name_str) {
            continue;
        }
        let Ok(ft) = entry.file_type() else {
            continue;
        };
        if ft.is_dir() {
            walk_into(&entry.path(), keep, out);
        } else if ft.is_file() && keep(&name_str) {
            out.push(entry.path());
        }
    }
}

/// Python source modules, package markers excluded.
pub fn python_sources(root: &Path) -> Vec<PathBuf> {
    walk_files(root, &|name| name.ends_with(".py") && name != "__init__.py")
}

/// Files matching the `test_*.py` discovery pattern.
pub fn test_modules(root: &Path) -> Vec<PathBuf> {
    walk_files(root, &is_test_module_name)
}

pub fn is_test_module_name(name: &str) -> bool {
    name.starts_with("test_") && name.ends_with(".py")
}

/// Create `__init__.py` in `dir` and every parent up to and including `stop_at`,
/// so the mirrored test tree is importable as packages.
pub fn create_init_files(dir: &Path, stop_at: &Path) -> std::io::Result<()> {
    let mut current = dir;
    loop {
        fs::create_dir_all(current)?;
        let init = current.join("__init__.py");
        if !init.exists() {
            fs::write(&init, "")?;
        }
        if current == stop_at {
            break;
        }
        match current.parent() {
            Some(parent) if parent.starts_with(stop_at) => current = parent,
            _ => break,
        }
    }
    Ok(())
}

/// Remove every `__pycache__` directory below `root`. Returns how many were removed.
pub fn remove_pycache(root: &Path) -> usize {
    let mut removed = 0;
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    for entry in entries.flatten() {
        let Ok(ft) = entry.file_type() else {
            continue;
        };
        if !ft.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name() == "__pycache__" {
            if fs::remove_dir_all(&path).is_ok() {
                removed += 1;
            }
        } else {
            removed += remove_pycache(&path);
        }
    }
    removed
}
