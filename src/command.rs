//! Local process execution behind a trait so tests can script outcomes.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use thiserror::Error;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }

    fn push_line(&mut self, stream: OutputStream, line: &str) {
        let target = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        target.push_str(line);
        target.push('\n');
    }
}

/// Stream a line of command output was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Raised when a command cannot be started.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("failed to spawn {program}: {message}")]
pub struct SpawnError {
    /// Command that failed to start.
    pub program: String,
    /// Operating system error string.
    pub message: String,
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError>;

    /// Runs `program`, handing every output line to `on_line` while still
    /// capturing the full output.
    ///
    /// The default replays the captured output once the command exits.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] if the command cannot be started.
    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandOutput, SpawnError> {
        let output = self.run(program, args)?;
        for line in output.stdout.lines() {
            on_line(OutputStream::Stdout, line);
        }
        for line in output.stderr.lines() {
            on_line(OutputStream::Stderr, line);
        }
        Ok(output)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    fn spawn_error(program: &str, err: &io::Error) -> SpawnError {
        SpawnError {
            program: program.to_owned(),
            message: err.to_string(),
        }
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SpawnError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| Self::spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_streaming(
        &self,
        program: &str,
        args: &[OsString],
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<CommandOutput, SpawnError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Self::spawn_error(program, &err))?;

        let mut output = CommandOutput {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        let (sender, receiver) = mpsc::channel();
        thread::scope(|scope| {
            if let Some(stdout) = child.stdout.take() {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stdout, OutputStream::Stdout, &sender));
            }
            if let Some(stderr) = child.stderr.take() {
                let sender = sender.clone();
                scope.spawn(move || forward_lines(stderr, OutputStream::Stderr, &sender));
            }
            drop(sender);
            for (stream, line) in receiver {
                on_line(stream, &line);
                output.push_line(stream, &line);
            }
        });

        let status = child
            .wait()
            .map_err(|err| Self::spawn_error(program, &err))?;
        output.code = status.code();
        Ok(output)
    }
}

fn forward_lines(
    reader: impl Read,
    stream: OutputStream,
    sender: &Sender<(OutputStream, String)>,
) {
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if sender.send((stream, line)).is_err() {
            break;
        }
    }
}
