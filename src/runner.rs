use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{Config, RunMode};
use crate::error::{PipelineError, Result};
use crate::tree;

pub const TEST_PATTERN: &str = "test_*.py";

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Split a configured command line into program and leading arguments.
pub fn split_command(cmd: &str) -> (String, Vec<String>) {
    let mut parts = cmd.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

/// Relative program paths such as `.venv/bin/python` resolve against the
/// project root; bare names are left for PATH lookup.
pub fn resolve_program(program: &str, project_root: &Path) -> String {
    let p = Path::new(program);
    if p.is_absolute() || !program.contains('/') {
        return program.to_string();
    }
    let candidate = project_root.join(p);
    if candidate.exists() {
        candidate.to_string_lossy().to_string()
    } else {
        program.to_string()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Run `cmd args...` in `cwd`. Pipes are drained on helper threads; with a
/// timeout the child is polled and killed once it is exceeded.
pub fn run_command(
    cmd: &str,
    args: &[String],
    cwd: &Path,
    envs: &[(&str, &Path)],
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let (program, leading) = split_command(cmd);
    let program = resolve_program(&program, cwd);
    let start = Instant::now();

    let mut command = Command::new(&program);
    command
        .args(&leading)
        .args(args)
        .current_dir(cwd)
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in envs {
        command.env(key, value);
    }

    tracing::debug!(program = %program, ?args, cwd = %cwd.display(), "spawning");
    let mut child = command.spawn().map_err(|e| PipelineError::Spawn {
        program: program.clone(),
        source: e,
    })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if timeout.is_some_and(|t| start.elapsed() > t) {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(PipelineError::Timeout {
                        program,
                        secs: timeout.map_or(0, |t| t.as_secs()),
                    });
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(PipelineError::Spawn { program, source: e }),
        }
    };

    Ok(CommandOutput {
        code: status.code(),
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Like [`run_command`] but a non-zero exit is an error.
pub fn run_checked(
    cmd: &str,
    args: &[String],
    cwd: &Path,
    envs: &[(&str, &Path)],
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let output = run_command(cmd, args, cwd, envs, timeout)?;
    if output.success() {
        Ok(output)
    } else {
        Err(PipelineError::ProcessExit {
            program: cmd.to_string(),
            code: output.code.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        })
    }
}

/// Remove the cached bytecode of one module so the next import re-reads it.
pub fn clear_pycache_for(source_file: &Path) {
    let (Some(parent), Some(stem)) = (source_file.parent(), source_file.file_stem()) else {
        return;
    };
    let cache_dir = parent.join("__pycache__");
    let Ok(entries) = std::fs::read_dir(&cache_dir) else {
        return;
    };
    let stem = stem.to_string_lossy();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&*stem) && name.ends_with(".pyc") {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}

/// Test modules known to the current discovery pass, keyed by path.
///
/// Generated files are rewritten between passes, so every pass starts with
/// [`ModuleRegistry::invalidate`]: stale bytecode is removed and the registry
/// forgets what it saw before.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<PathBuf, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self, test_root: &Path) -> usize {
        self.modules.clear();
        let removed = tree::remove_pycache(test_root);
        tracing::debug!(removed, root = %test_root.display(), "invalidated module cache");
        removed
    }

    /// Register every `test_*.py` under `test_root` with its dotted module
    /// name relative to `top_level`.
    pub fn discover(&mut self, top_level: &Path, test_root: &Path) -> Vec<String> {
        for path in tree::test_modules(test_root) {
            if let Some(name) = dotted_module(top_level, &path) {
                self.modules.insert(path, name);
            }
        }
        self.names()
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// `tests/app/test_calc_0.py` -> `tests.app.test_calc_0`.
pub fn dotted_module(top_level: &Path, file: &Path) -> Option<String> {
    let rel = file.strip_prefix(top_level).ok()?.with_extension("");
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

/// Coverage-instrumented test runs sharing one data file.
pub struct CoverageSession<'a> {
    config: &'a Config,
}

impl<'a> CoverageSession<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn data_file(&self) -> PathBuf {
        let data = self.config.artifacts().coverage_data();
        std::path::absolute(&data).unwrap_or(data)
    }

    fn run(&self, args: Vec<String>, timeout: Option<Duration>) -> Result<CommandOutput> {
        let data = self.data_file();
        run_command(
            &self.config.coverage_cmd,
            &args,
            &self.config.project_root,
            &[("COVERAGE_FILE", data.as_path())],
            timeout,
        )
    }

    /// Erase accumulated coverage data.
    pub fn restart(&self) -> Result<()> {
        let output = self.run(vec!["erase".into()], None)?;
        if !output.success() {
            tracing::warn!(stderr = %output.stderr.trim(), "coverage erase failed");
        }
        Ok(())
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".into(),
            "--branch".into(),
            "-a".into(),
            format!("--source={}", self.config.source_dir.display()),
            "-m".into(),
            "unittest".into(),
        ]
    }

    /// Run the configured test set and return unittest's report, which the
    /// runner writes to stderr. Whatever the tests print to stdout is dropped.
    /// Failing tests are not an error; only a failure to run is.
    pub fn run_tests(&self, registry: &mut ModuleRegistry) -> Result<String> {
        let test_root = self.config.test_root();
        registry.invalidate(&test_root);
        let modules = registry.discover(&self.config.project_root, &test_root);
        tracing::info!(modules = modules.len(), mode = ?self.config.run_mode, "running tests");

        match self.config.run_mode {
            RunMode::Suite => self.run_suite(),
            RunMode::PerFile => self.run_per_file(&modules),
        }
    }

    fn run_suite(&self) -> Result<String> {
        let mut args = self.run_args();
        args.extend([
            "discover".into(),
            "-s".into(),
            self.config.test_dir.display().to_string(),
            "-p".into(),
            TEST_PATTERN.into(),
            "-t".into(),
            ".".into(),
            "-v".into(),
        ]);
        Ok(self.run(args, None)?.stderr)
    }

    fn run_per_file(&self, modules: &[String]) -> Result<String> {
        let timeout = self.config.per_file_timeout();
        let mut report = String::new();
        for module in modules {
            let mut args = self.run_args();
            args.extend([module.clone(), "-v".into()]);
            match self.run(args, Some(timeout)) {
                Ok(output) => report.push_str(&output.stderr),
                Err(PipelineError::Timeout { secs, .. }) => {
                    tracing::warn!(module = %module, secs, "test module timed out, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Write the text summary to `path` and return it.
    pub fn report(&self, path: &Path) -> Result<String> {
        let output = self.run(vec!["report".into(), "-m".into()], None)?;
        if !output.success() {
            tracing::warn!(stderr = %output.stderr.trim(), "coverage report exited non-zero");
        }
        std::fs::write(path, &output.stdout).map_err(|e| PipelineError::write(path, e))?;
        Ok(output.stdout)
    }

    pub fn html(&self, dir: &Path) -> Result<()> {
        let output = self.run(vec!["html".into(), "-d".into(), dir.display().to_string()], None)?;
        if !output.success() {
            tracing::warn!(stderr = %output.stderr.trim(), "coverage html exited non-zero");
        }
        Ok(())
    }
}

/// Run the mutation tool for one stage. No timeout; a non-zero exit fails.
pub fn run_mutation_tool(config: &Config, report: &Path, html_dir: &Path) -> Result<CommandOutput> {
    let args = vec![
        "--target".into(),
        config.mutation_target(),
        "--unit-test".into(),
        config.mutation_unit_test(),
        "--report".into(),
        report.display().to_string(),
        "--report-html".into(),
        html_dir.display().to_string(),
    ];
    tracing::info!(tool = %config.mutation_cmd, report = %report.display(), "running mutation analysis");
    run_checked(&config.mutation_cmd, &args, &config.project_root, &[], None)
}
