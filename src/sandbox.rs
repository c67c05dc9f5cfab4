mod compile;
mod materialize;
mod process;
mod runner;
mod simple_runner;

pub use compile::{BuildOutcome, build};
pub use materialize::{CompilationUnit, Materializer};
pub use process::ProcessHandle;
pub use runner::SandboxRunner;
pub use simple_runner::SimpleRunner;

use std::path::PathBuf;
use std::time::Duration;

/// Bytes of stdout a program may write before it is stopped
pub const DEFAULT_OUTPUT_LIMIT: u64 = 64 * 1024 * 1024;

/// How to invoke a successfully built program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableArtifact {
    pub program: String,
    pub args: Vec<String>,
    /// Directory of the compilation unit the artifact lives in
    pub work_dir: PathBuf,
}

/// How a sandboxed execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Exited on its own before the deadline; the exit code is informational
    Completed { exit_code: Option<i32> },
    /// Killed at the deadline, output discarded
    TimedOut,
    /// Could not be launched, was killed by a signal the runner did not send,
    /// or wrote more output than allowed
    CrashedOrFailedToStart { reason: String },
}

/// Result of one sandboxed execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: Vec<u8>,
    pub outcome: ExecutionOutcome,
    pub elapsed: Duration,
}
