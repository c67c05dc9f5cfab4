use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;

use super::process::{ProcessHandle, read_capped, read_limited};
use super::{
    DEFAULT_OUTPUT_LIMIT, ExecutableArtifact, ExecutionOutcome, ExecutionResult, SandboxRunner,
};

/// Bytes of stderr kept to explain a crash
const STDERR_EXCERPT_LIMIT: u64 = 4096;

/// A simple runner that executes code without sandboxing
///
/// SimpleRunner runs the program as a plain child process in its own process
/// group. It only provides the wall-clock deadline and a cap on captured
/// stdout, with no memory, file system or permission controls.
#[derive(Debug, Clone, Copy)]
pub struct SimpleRunner {
    output_limit: u64,
}

impl SimpleRunner {
    pub fn new() -> Self {
        log::warn!(
            "SimpleRunner provides NO security isolation - use only in trusted environments"
        );
        Self {
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Stops programs once they write more than `bytes` to stdout
    pub fn with_output_limit(mut self, bytes: u64) -> Self {
        self.output_limit = bytes;
        self
    }
}

impl Default for SimpleRunner {
    fn default() -> Self {
        Self::new()
    }
}

enum Finish {
    Exited(Result<Exchange, Interrupt>),
    DeadlineReached,
    Cancelled,
}

/// Why the exchange with a program stopped before it exited
enum Interrupt {
    OutputLimitExceeded,
    Io(io::Error),
}

struct Exchange {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

#[async_trait]
impl SandboxRunner for SimpleRunner {
    async fn execute(
        &self,
        artifact: &ExecutableArtifact,
        input: &[u8],
        time_limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError> {
        let mut cmd = Command::new(&artifact.program);
        cmd.args(&artifact.args)
            .current_dir(&artifact.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut process = match ProcessHandle::spawn(&mut cmd) {
            Ok(process) => process,
            Err(e) => {
                log::warn!("Failed to start {}: {e}", artifact.program);
                return Ok(ExecutionResult {
                    stdout: Vec::new(),
                    outcome: ExecutionOutcome::CrashedOrFailedToStart {
                        reason: format!("failed to start {}: {e}", artifact.program),
                    },
                    elapsed: start.elapsed(),
                });
            }
        };

        let session = exchange(&mut process, input, self.output_limit);
        let finish = tokio::select! {
            biased;
            _ = cancel.cancelled() => Finish::Cancelled,
            res = timeout(time_limit, session) => match res {
                Ok(res) => Finish::Exited(res),
                Err(_) => Finish::DeadlineReached,
            },
        };
        let elapsed = start.elapsed();

        // Still running after a deadline, a cancel or an output overflow
        process
            .terminate()
            .await
            .map_err(RunError::io("terminating the program"))?;

        match finish {
            Finish::Cancelled => Err(RunError::Cancelled),
            Finish::DeadlineReached => {
                log::debug!(
                    "{} killed after exceeding {:?}",
                    artifact.program,
                    time_limit
                );
                Ok(ExecutionResult {
                    stdout: Vec::new(),
                    outcome: ExecutionOutcome::TimedOut,
                    elapsed,
                })
            }
            Finish::Exited(Err(Interrupt::OutputLimitExceeded)) => {
                log::debug!(
                    "{} killed after writing more than {} bytes",
                    artifact.program,
                    self.output_limit
                );
                Ok(ExecutionResult {
                    stdout: Vec::new(),
                    outcome: ExecutionOutcome::CrashedOrFailedToStart {
                        reason: format!(
                            "output limit exceeded: more than {} bytes written",
                            self.output_limit
                        ),
                    },
                    elapsed,
                })
            }
            Finish::Exited(Err(Interrupt::Io(e))) => Err(RunError::Io {
                action: "exchanging data with the program",
                source: e,
            }),
            Finish::Exited(Ok(exchange)) => Ok(classify(exchange, elapsed)),
        }
    }
}

/// Feeds stdin and drains stdout and stderr concurrently until the program exits
///
/// The exit of the program ends the exchange: [`ProcessHandle::wait`] kills
/// anything left in its group, which closes the pipes it still held. Stdout
/// beyond `output_limit` interrupts the exchange with the program still running.
async fn exchange(
    process: &mut ProcessHandle,
    input: &[u8],
    output_limit: u64,
) -> Result<Exchange, Interrupt> {
    let stdin = process.take_stdin();
    let stdout = process.take_stdout();
    let stderr = process.take_stderr();

    let (status, (), stdout, stderr) = tokio::try_join!(
        async { process.wait().await.map_err(Interrupt::Io) },
        async { feed(stdin, input).await.map_err(Interrupt::Io) },
        async {
            read_limited(stdout, output_limit)
                .await
                .map_err(Interrupt::Io)?
                .ok_or(Interrupt::OutputLimitExceeded)
        },
        async {
            read_capped(stderr, STDERR_EXCERPT_LIMIT)
                .await
                .map_err(Interrupt::Io)
        },
    )?;

    Ok(Exchange {
        status,
        stdout,
        stderr,
    })
}

/// Writes the whole input, then closes stdin by dropping it
async fn feed(stdin: Option<ChildStdin>, input: &[u8]) -> io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };

    match stdin.write_all(input).await {
        Ok(()) => Ok(()),
        // Programs are free to exit without reading their input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e),
    }
}

fn classify(exchange: Exchange, elapsed: Duration) -> ExecutionResult {
    let outcome = match exchange.status.signal() {
        Some(signal) => {
            let mut reason = format!("program was killed by signal {signal}");
            let stderr = String::from_utf8_lossy(&exchange.stderr);
            if !stderr.trim().is_empty() {
                reason.push_str(": ");
                reason.push_str(stderr.trim());
            }
            ExecutionOutcome::CrashedOrFailedToStart { reason }
        }
        None => ExecutionOutcome::Completed {
            exit_code: exchange.status.code(),
        },
    };

    ExecutionResult {
        stdout: exchange.stdout,
        outcome,
        elapsed,
    }
}
