use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::SandboxConfig;
use crate::error::PipelineError;
use crate::language::{Language, LanguageProfile, Toolchains};
use crate::sandbox::{
    BuildOutcome, CompilationUnit, ExecutionOutcome, Materializer, SandboxRunner, SimpleRunner,
    build,
};
use crate::verdict::{self, Comparison, Verdict};

/// One submission, already decoded from its wire form
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub problem_id: String,
    pub user_id: String,
    pub source: Vec<u8>,
    pub language: Language,
    pub input: String,
    pub expected_output: String,
    pub time_limit: Duration,
}

/// Sequences materialization, build, execution and judging of submissions
///
/// Runs share nothing but the work directory, in which every run owns a
/// uniquely named unit, so one pipeline can judge any number of
/// submissions concurrently.
pub struct Pipeline {
    materializer: Materializer,
    toolchains: Toolchains,
    runner: Arc<dyn SandboxRunner>,
    compile_time_limit: Duration,
    comparison: Comparison,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(config: &SandboxConfig, toolchains: Toolchains) -> io::Result<Self> {
        let materializer = Materializer::new(config.resolve_work_dir())?;

        Ok(Self {
            materializer,
            toolchains,
            runner: Arc::new(SimpleRunner::new().with_output_limit(config.output_limit)),
            compile_time_limit: config.compile_time_limit.into(),
            comparison: config.comparison,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replaces the runner used for the execution stage
    pub fn with_runner(mut self, runner: Arc<dyn SandboxRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Ties in-flight builds and runs to `token`; cancelling it kills their processes
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Judges one submission; every outcome, including internal faults, is a verdict
    pub async fn judge(&self, request: SubmissionRequest) -> Verdict {
        let verdict = match self.try_judge(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                log::error!(
                    "Judging submission of user {} for problem {} failed: {e}",
                    request.user_id,
                    request.problem_id
                );
                Verdict::runtime_error(e.to_string(), Duration::ZERO)
            }
        };

        log::info!(
            "Verdict {} for user {} on problem {} ({}, {:?})",
            verdict.outcome,
            request.user_id,
            request.problem_id,
            request.language,
            verdict.elapsed
        );
        verdict
    }

    async fn try_judge(&self, request: &SubmissionRequest) -> Result<Verdict, PipelineError> {
        let profile = self.toolchains.profile(request.language);

        let unit = self
            .materializer
            .materialize(&request.source, profile)
            .await?;
        log::debug!("Submission materialized as {}", unit.entry());

        // Dropping the unit also removes it, should this future be abandoned
        let verdict = self.build_and_run(request, profile, &unit).await;
        unit.remove().await;
        verdict
    }

    async fn build_and_run(
        &self,
        request: &SubmissionRequest,
        profile: &LanguageProfile,
        unit: &CompilationUnit,
    ) -> Result<Verdict, PipelineError> {
        let artifact = match build(unit, profile, self.compile_time_limit, &self.shutdown).await? {
            BuildOutcome::Built(artifact) => artifact,
            BuildOutcome::Failed { diagnostics } => {
                log::debug!("Compilation of {} failed", unit.entry());
                return Ok(Verdict::compile_error(diagnostics));
            }
        };
        log::debug!("Running {} {:?}", artifact.program, artifact.args);

        let result = self
            .runner
            .execute(
                &artifact,
                request.input.as_bytes(),
                request.time_limit,
                &self.shutdown,
            )
            .await?;

        let verdict = match result.outcome {
            ExecutionOutcome::Completed { exit_code } => {
                log::debug!("{} exited with {exit_code:?}", unit.entry());
                verdict::judge_output(
                    &result.stdout,
                    &request.expected_output,
                    self.comparison,
                    result.elapsed,
                )
            }
            ExecutionOutcome::TimedOut => Verdict::time_limit_exceeded(result.elapsed),
            ExecutionOutcome::CrashedOrFailedToStart { reason } => {
                Verdict::runtime_error(reason, result.elapsed)
            }
        };

        Ok(verdict)
    }
}
