use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;

use super::{ExecutableArtifact, ExecutionResult};

/// Trait for different sandbox execution implementations
///
/// A runner launches one built artifact, feeds it `input` on stdin, captures
/// its stdout and enforces `time_limit` as a hard wall-clock deadline.
/// Problems of the submitted program itself (timeouts, crashes, launch
/// failures) are reported through [`ExecutionResult`]; only faults of the
/// grader, including cancellation through `cancel`, are returned as errors.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn execute(
        &self,
        artifact: &ExecutableArtifact,
        input: &[u8],
        time_limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, RunError>;
}
