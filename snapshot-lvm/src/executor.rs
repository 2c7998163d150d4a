// SPDX-License-Identifier: GPL-3.0-only

//! Serialized, retrying tool execution
//!
//! LVM tools rewrite on-disk metadata and must never run concurrently against
//! the same backing store. Every invocation goes through an [`Executor`],
//! which holds the shared [`SerializationToken`] for the full duration of the
//! invocation (all of its attempts) and releases it before returning.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::CommandError;
use crate::runner::{Invocation, ToolRunner};

/// Total attempts per invocation, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Fixed pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_micros(100);

/// Process-wide guard allowing one tool invocation at a time
///
/// Create exactly one at startup and share it by `Arc` with every
/// [`Executor`]; two tokens give two independent lanes.
#[derive(Debug, Default)]
pub struct SerializationToken {
    lock: Mutex<()>,
}

impl SerializationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other invocation holds the token
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        // The token guards no data, so a panic while held leaves nothing torn.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-delay retry ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no delay
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

/// Runs tool invocations one at a time with bounded retry
pub struct Executor {
    runner: Arc<dyn ToolRunner>,
    token: Arc<SerializationToken>,
    retry: RetryPolicy,
}

impl Executor {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        token: Arc<SerializationToken>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            runner,
            token,
            retry,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn token(&self) -> &Arc<SerializationToken> {
        &self.token
    }

    /// Run `program` with `args`, retrying on any failure
    ///
    /// Returns the trimmed combined output of the first successful attempt,
    /// or the last attempt's output and error once the ceiling is reached.
    pub fn run<I, S>(&self, program: &str, args: I) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_invocation(Invocation::new(program, args))
    }

    pub fn run_invocation(&self, invocation: Invocation) -> Result<String, CommandError> {
        let _guard = self.token.acquire();

        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(attempt, "Running {invocation}");

            let result = self.runner.run(&invocation);
            let output = result.output.trim().to_string();

            match result.status {
                Ok(()) => return Ok(output),
                Err(error) if attempt >= self.retry.max_attempts => {
                    warn!("{invocation} failed after {attempt} attempt(s): {error}");
                    return Err(CommandError {
                        invocation,
                        output,
                        attempts: attempt,
                        source: error,
                    });
                }
                Err(error) => {
                    debug!(attempt, "{invocation} failed: {error}; retrying");
                    if !self.retry.delay.is_zero() {
                        std::thread::sleep(self.retry.delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::runner::ToolOutput;
    use crate::scripted::{ScriptedResponse, ScriptedRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    fn executor(runner: Arc<ScriptedRunner>) -> Executor {
        Executor::new(
            runner,
            Arc::new(SerializationToken::new()),
            RetryPolicy::default(),
        )
    }

    #[test]
    fn always_failing_command_is_attempted_exactly_ten_times() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_always("lvs", ScriptedResponse::exit(3, "  no such volume \n"));

        let error = executor(runner.clone())
            .run("lvs", ["vg0/lv1"])
            .unwrap_err();

        assert_eq!(runner.calls().len(), 10);
        assert_eq!(error.attempts, 10);
        assert_eq!(error.output, "no such volume");
        assert!(matches!(error.source, ToolError::ExitStatus(3)));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let runner = Arc::new(ScriptedRunner::new());
        for _ in 0..4 {
            runner.respond("vgs", ScriptedResponse::exit(5, "busy"));
        }
        runner.respond("vgs", ScriptedResponse::ok("  vg0\n"));
        runner.respond_always("vgs", ScriptedResponse::exit(1, "unexpected"));

        let output = executor(runner.clone()).run("vgs", ["vg0"]).unwrap();

        assert_eq!(output, "vg0");
        assert_eq!(runner.calls().len(), 5);
    }

    #[test]
    fn first_success_stops_retrying() {
        let runner = Arc::new(ScriptedRunner::new());
        let output = executor(runner.clone()).run("vgs", ["vg0"]).unwrap();

        assert_eq!(output, "");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn spawn_failures_are_retried_like_exit_failures() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond_always("mkfs.ext4", ScriptedResponse::spawn_error());

        let error = executor(runner.clone())
            .run("mkfs.ext4", ["/dev/vg0/lv1"])
            .unwrap_err();

        assert_eq!(runner.calls().len(), 10);
        assert!(matches!(error.source, ToolError::Spawn(_)));
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryPolicy::default().max_attempts, 10);
        assert_eq!(RetryPolicy::default().delay, Duration::from_micros(100));
    }

    struct OverlapProbe {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
        spans: Mutex<Vec<(Instant, Instant)>>,
    }

    impl ToolRunner for OverlapProbe {
        fn run(&self, _invocation: &Invocation) -> ToolOutput {
            let start = Instant::now();
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let end = Instant::now();
            self.spans
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((start, end));
            ToolOutput::success("")
        }
    }

    #[test]
    fn at_most_one_invocation_in_flight_across_executors() {
        let probe = Arc::new(OverlapProbe {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
            spans: Mutex::new(Vec::new()),
        });
        let token = Arc::new(SerializationToken::new());

        // Two executors sharing one token still serialize.
        let executors: Vec<Arc<Executor>> = (0..2)
            .map(|_| {
                Arc::new(Executor::new(
                    probe.clone(),
                    token.clone(),
                    RetryPolicy::default(),
                ))
            })
            .collect();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let executor = executors[i % 2].clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        executor.run("lvs", ["vg0"]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(probe.max_seen.load(Ordering::SeqCst), 1);

        let mut spans = probe.spans.lock().unwrap().clone();
        assert_eq!(spans.len(), 40);
        spans.sort_by_key(|(start, _)| *start);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "invocations overlapped");
        }
    }
}
