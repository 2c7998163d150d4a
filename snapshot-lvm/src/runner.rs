// SPDX-License-Identifier: GPL-3.0-only

//! Running a single external tool invocation
//!
//! [`ToolRunner`] is the seam between the retry/serialization policy in
//! [`crate::Executor`] and the operating system. [`SystemRunner`] spawns real
//! processes; `ScriptedRunner` (behind the `testing` feature) replays canned
//! results in tests.

use std::fmt;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};

use crate::error::ToolError;

/// Program name and ordered arguments for one tool call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Result of one attempt: combined stdout/stderr and the exit status
#[derive(Debug)]
pub struct ToolOutput {
    pub output: String,
    pub status: std::result::Result<(), ToolError>,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: Ok(()),
        }
    }

    pub fn failure(output: impl Into<String>, error: ToolError) -> Self {
        Self {
            output: output.into(),
            status: Err(error),
        }
    }
}

/// Runs one invocation to completion, once
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> ToolOutput;
}

/// Spawns real processes
///
/// The child inherits the environment, runs in its own process group, and
/// receives `SIGTERM` if this process dies first.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    /// Base command: null stdin, own process group, parent-death signal
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .process_group(0);

        // SAFETY: prctl is async-signal-safe and touches no parent state.
        #[cfg(target_os = "linux")]
        unsafe {
            command.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM as libc::c_ulong) == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        command
    }

    fn spawn_and_wait(
        invocation: &Invocation,
    ) -> std::io::Result<(String, std::process::ExitStatus)> {
        let (mut reader, writer) = std::io::pipe()?;

        let mut child = {
            let mut command = Self::command(invocation);
            command.stdout(writer.try_clone()?).stderr(writer);
            command.spawn()?
            // command drops here, closing our copies of the write end
        };

        let mut buffer = Vec::new();
        let read_result = reader.read_to_end(&mut buffer);
        let status = child.wait()?;
        read_result?;

        Ok((String::from_utf8_lossy(&buffer).into_owned(), status))
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> ToolOutput {
        match Self::spawn_and_wait(invocation) {
            Ok((output, status)) => {
                if status.success() {
                    ToolOutput::success(output)
                } else if let Some(code) = status.code() {
                    ToolOutput::failure(output, ToolError::ExitStatus(code))
                } else {
                    ToolOutput::failure(output, ToolError::Signal(status.signal().unwrap_or(0)))
                }
            }
            Err(error) => ToolOutput::failure(String::new(), ToolError::Spawn(error)),
        }
    }
}
