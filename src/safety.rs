use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

/// Replace `target` with `contents` in one rename. The temporary file lives in
/// the target's directory so the rename never crosses filesystems; a failure
/// before the rename leaves the original file untouched.
pub fn write_atomic(target: &Path, contents: &str) -> Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::write(target, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| PipelineError::write(target, e))?;
    tmp.persist(target)
        .map_err(|e| PipelineError::write(target, e.error))?;

    crate::runner::clear_pycache_for(target);
    Ok(())
}

/// Read a file that must exist.
pub fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("test_a_0.py");
        std::fs::write(&target, "old\n").unwrap();

        write_atomic(&target, "new\n").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new\n");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn write_atomic_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("missing").join("x.py");
        let err = write_atomic(&target, "x").unwrap_err();
        assert!(matches!(err, PipelineError::Write { .. }));
    }

    #[test]
    fn read_text_reports_path() {
        let dir = TempDir::new().unwrap();
        let err = read_text(&dir.path().join("nope.py")).unwrap_err();
        assert!(err.to_string().contains("nope.py"));
    }
}
