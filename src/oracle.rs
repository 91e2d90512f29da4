use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{PipelineError, Result};
use crate::runner;

/// The text generator that writes and repairs tests. Its answers are
/// untrusted and only ever reach disk through the splicer.
pub trait Oracle {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<F> Oracle for F
where
    F: Fn(&str) -> Result<String>,
{
    fn complete(&self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// An external command that reads the prompt on stdin and answers on stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    pub command: String,
    pub cwd: PathBuf,
}

impl CommandOracle {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { command: command.into(), cwd: cwd.into() }
    }
}

impl Oracle for CommandOracle {
    fn complete(&self, prompt: &str) -> Result<String> {
        let (program, args) = runner::split_command(&self.command);
        let program = runner::resolve_program(&program, &self.cwd);
        let spawn_err = |e| PipelineError::Spawn { program: program.clone(), source: e };

        let mut child = Command::new(&program)
            .args(&args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_err)?;

        // Feed stdin from a thread so a chatty child cannot block on a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            std::thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let output = child.wait_with_output().map_err(spawn_err)?;
        if let Some(handle) = writer {
            match handle.join() {
                Ok(Err(e)) => tracing::debug!(error = %e, "oracle closed stdin early"),
                Ok(Ok(())) => {}
                Err(_) => return Err(PipelineError::Oracle("stdin writer panicked".into())),
            }
        }

        if !output.status.success() {
            return Err(PipelineError::Oracle(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Drop the conversation terminator and surrounding whitespace.
pub fn clean_response(raw: &str) -> String {
    raw.replace("TERMINATE", "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_oracles() {
        let oracle = |prompt: &str| -> Result<String> { Ok(prompt.to_uppercase()) };
        assert_eq!(oracle.complete("abc").unwrap(), "ABC");
    }

    #[test]
    fn clean_response_strips_terminator() {
        assert_eq!(clean_response("\n def test_a(self): pass\nTERMINATE\n"), "def test_a(self): pass");
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_round_trips_through_cat() {
        let oracle = CommandOracle::new("cat", std::env::temp_dir());
        assert_eq!(oracle.complete("hello").unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn command_oracle_failure_is_oracle_error() {
        let oracle = CommandOracle::new("false", std::env::temp_dir());
        assert!(matches!(oracle.complete("x"), Err(PipelineError::Oracle(_))));
    }
}
