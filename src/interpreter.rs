//! The interpreter collaborator that produces traces.
//!
//! The visualiser never executes user code itself. It asks an
//! [`Interpreter`] for the full, ordered trace of a program and replays it.
//! Two implementations ship with the crate:
//!
//! - [`StaticInterpreter`]: returns a canned trace (or a canned failure),
//!   for demos, headless replays and tests
//! - [`CommandInterpreter`]: runs an external interpreter process, writing
//!   the code to its stdin and reading a JSON trace from its stdout

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{parse_trace, TraceEvent};

/// Produces the trace of a program.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Execute `code` and return every trace event it produced, in order.
    async fn interpret_code(&self, code: &str) -> Result<Vec<TraceEvent>>;
}

/// Interpreter returning a fixed outcome regardless of the code.
#[derive(Debug)]
pub struct StaticInterpreter {
    outcome: std::result::Result<Vec<TraceEvent>, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticInterpreter {
    /// Always return `events`.
    pub fn new(events: Vec<TraceEvent>) -> Self {
        Self {
            outcome: Ok(events),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulate interpreter latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `interpret_code` calls served.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Interpreter for StaticInterpreter {
    async fn interpret_code(&self, _code: &str) -> Result<Vec<TraceEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            Ok(events) => Ok(events.clone()),
            Err(message) => Err(Error::interpreter(message.clone())),
        }
    }
}

/// Configuration for [`CommandInterpreter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInterpreterConfig {
    /// Interpreter executable
    pub program: PathBuf,
    /// Extra arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Timeout for one run in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl CommandInterpreterConfig {
    /// Create a config for `program` with default settings.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Interpreter running an external process per request.
///
/// The code is written to the process's stdin; the process must print a JSON
/// array of trace events on stdout and exit successfully.
#[derive(Debug, Clone)]
pub struct CommandInterpreter {
    config: CommandInterpreterConfig,
}

impl CommandInterpreter {
    /// Create a command interpreter.
    pub fn new(config: CommandInterpreterConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CommandInterpreterConfig {
        &self.config
    }
}

#[async_trait]
impl Interpreter for CommandInterpreter {
    async fn interpret_code(&self, code: &str) -> Result<Vec<TraceEvent>> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::interpreter_with_source(
                format!("Failed to spawn {}", self.config.program.display()),
                e,
            )
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::interpreter("Failed to get stdin handle for interpreter"))?;

        // Feed stdin while draining stdout, all under one deadline. Dropping
        // the exchange on timeout kills the child.
        let exchange = async move {
            let write = async move {
                let written = stdin.write_all(code.as_bytes()).await;
                drop(stdin);
                written
            };
            let (written, output) = tokio::join!(write, child.wait_with_output());
            let output = output
                .map_err(|e| Error::interpreter_with_source("Failed to read interpreter output", e))?;
            if let Err(e) = written {
                // The process may exit without reading; its status tells us why.
                if e.kind() != std::io::ErrorKind::BrokenPipe && output.status.success() {
                    return Err(Error::interpreter_with_source("Failed to send code to interpreter", e));
                }
            }
            Ok::<_, Error>(output)
        };

        let output = tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), exchange)
            .await
            .map_err(|_| {
                warn!(timeout_ms = self.config.timeout_ms, "Interpreter timed out");
                Error::timeout(self.config.timeout_ms)
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "Interpreter exited unsuccessfully");
            return Err(Error::interpreter(format!(
                "Interpreter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let events = parse_trace(&stdout).map_err(|e| {
            Error::interpreter_with_source("Interpreter produced an invalid trace", e)
        })?;
        debug!(events = events.len(), "Interpreter returned trace");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TrackedValue, Value};

    fn trace() -> Vec<TraceEvent> {
        vec![TraceEvent::init_variable(
            "x",
            TrackedValue::literal(Value::Integer(5)),
        )]
    }

    #[tokio::test]
    async fn test_static_interpreter() {
        let interpreter = StaticInterpreter::new(trace());
        assert_eq!(interpreter.interpret_code("let x = 5").await.unwrap(), trace());
        assert_eq!(interpreter.call_count(), 1);

        let failing = StaticInterpreter::failing("syntax error");
        let err = failing.interpret_code("let").await.unwrap_err();
        assert!(matches!(err, Error::Interpreter { ref message, .. } if message == "syntax error"));
    }

    #[test]
    fn test_command_config_defaults() {
        let config: CommandInterpreterConfig =
            serde_json::from_str(r#"{"program": "mimble"}"#).unwrap();
        assert_eq!(config, CommandInterpreterConfig::new("mimble"));
        assert_eq!(config.timeout_ms, 10_000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_interpreter_reads_trace_from_stdout() {
        // `cat` echoes the "code" back, so feed it a trace.
        let interpreter = CommandInterpreter::new(CommandInterpreterConfig::new("cat"));
        let json = serde_json::to_string(&trace()).unwrap();
        assert_eq!(interpreter.interpret_code(&json).await.unwrap(), trace());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_interpreter_failures() {
        let invalid = CommandInterpreter::new(CommandInterpreterConfig::new("cat"));
        assert!(matches!(
            invalid.interpret_code("not json").await,
            Err(Error::Interpreter { .. })
        ));

        let exit_code = CommandInterpreter::new(CommandInterpreterConfig::new("false"));
        assert!(matches!(
            exit_code.interpret_code("let x = 1").await,
            Err(Error::Interpreter { .. })
        ));

        let missing = CommandInterpreter::new(CommandInterpreterConfig::new(
            "/nonexistent/trace-interpreter",
        ));
        assert!(matches!(
            missing.interpret_code("let x = 1").await,
            Err(Error::Interpreter { .. })
        ));

        let slow = CommandInterpreter::new(
            CommandInterpreterConfig::new("sleep")
                .with_arg("5")
                .with_timeout(50),
        );
        assert!(matches!(
            slow.interpret_code("").await,
            Err(Error::Timeout { duration_ms: 50 })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_interpreter_timeout_covers_stdin() {
        // More code than a pipe buffer holds, sent to a process that never reads it.
        let code = "x".repeat(4 * 1024 * 1024);
        let stuck = CommandInterpreter::new(
            CommandInterpreterConfig::new("sleep")
                .with_arg("30")
                .with_timeout(50),
        );

        let started = std::time::Instant::now();
        let result = stuck.interpret_code(&code).await;
        assert!(matches!(result, Err(Error::Timeout { duration_ms: 50 })));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_interpreter_large_trace_round_trip() {
        // Large enough that stdin and stdout must be serviced together.
        let events: Vec<TraceEvent> = (0..20_000)
            .map(|i| TraceEvent::init_variable(format!("v{}", i), TrackedValue::literal(Value::Integer(i))))
            .collect();
        let json = serde_json::to_string(&events).unwrap();
        assert!(json.len() > 1024 * 1024);

        let interpreter = CommandInterpreter::new(CommandInterpreterConfig::new("cat"));
        assert_eq!(interpreter.interpret_code(&json).await.unwrap(), events);
    }
}
