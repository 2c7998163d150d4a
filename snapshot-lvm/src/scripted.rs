// SPDX-License-Identifier: GPL-3.0-only

//! In-memory [`ToolRunner`] for exercising executor and lifecycle logic
//! without touching real block devices.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::error::ToolError;
use crate::runner::{Invocation, ToolOutput, ToolRunner};

/// Canned result for one scripted attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Exit { code: i32, output: String },
    SpawnError,
}

impl ScriptedResponse {
    pub fn ok(output: impl Into<String>) -> Self {
        Self::Exit {
            code: 0,
            output: output.into(),
        }
    }

    pub fn exit(code: i32, output: impl Into<String>) -> Self {
        Self::Exit {
            code,
            output: output.into(),
        }
    }

    pub fn spawn_error() -> Self {
        Self::SpawnError
    }

    fn to_output(&self) -> ToolOutput {
        match self {
            Self::Exit { code: 0, output } => ToolOutput::success(output.clone()),
            Self::Exit { code, output } => {
                ToolOutput::failure(output.clone(), ToolError::ExitStatus(*code))
            }
            Self::SpawnError => ToolOutput::failure(
                String::new(),
                ToolError::Spawn(std::io::Error::from(std::io::ErrorKind::NotFound)),
            ),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    queued: HashMap<String, VecDeque<ScriptedResponse>>,
    sticky: HashMap<String, ScriptedResponse>,
}

/// Records invocations and replays responses keyed by program name
///
/// Queued responses are consumed first, then the sticky response for that
/// program, then a successful empty result.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response for the next call to `program`
    pub fn respond(&self, program: &str, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queued
            .entry(program.to_string())
            .or_default()
            .push_back(response);
    }

    /// Response used for `program` once its queue is empty
    pub fn respond_always(&self, program: &str, response: ScriptedResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sticky
            .insert(program.to_string(), response);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Program names in call order
    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.program == program)
            .collect()
    }
}

impl ToolRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> ToolOutput {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = script
            .queued
            .get_mut(&invocation.program)
            .and_then(VecDeque::pop_front);

        match queued.or_else(|| script.sticky.get(&invocation.program).cloned()) {
            Some(response) => response.to_output(),
            None => ToolOutput::success(""),
        }
    }
}
