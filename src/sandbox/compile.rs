use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::RunError;
use crate::language::LanguageProfile;

use super::process::{ProcessHandle, read_to_end};
use super::{CompilationUnit, ExecutableArtifact};

/// Result of the build stage
#[derive(Debug)]
pub enum BuildOutcome {
    Built(ExecutableArtifact),
    /// The toolchain rejected the program; `diagnostics` is never empty
    Failed { diagnostics: String },
}

/// Compiles `unit` with the toolchain described by `profile`
///
/// Languages without a build command pass the materialized source through
/// as the artifact. The compiler runs in its own process group and is killed
/// when `time_limit` elapses or `cancel` fires.
pub async fn build(
    unit: &CompilationUnit,
    profile: &LanguageProfile,
    time_limit: Duration,
    cancel: &CancellationToken,
) -> Result<BuildOutcome, RunError> {
    let Some(build_template) = &profile.build else {
        tokio::fs::metadata(unit.source_path())
            .await
            .map_err(RunError::io("checking the materialized source"))?;
        return Ok(BuildOutcome::Built(unit.artifact(profile)));
    };

    let compile_command = unit.render(build_template);
    let Some((program, args)) = compile_command.split_first() else {
        return Ok(BuildOutcome::Built(unit.artifact(profile)));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(unit.dir())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut process = match ProcessHandle::spawn(&mut cmd) {
        Ok(process) => process,
        Err(e) => {
            log::warn!("Failed to launch compiler {program}: {e}");
            return Ok(BuildOutcome::Failed {
                diagnostics: format!("failed to launch {program}: {e}"),
            });
        }
    };

    let finish = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = timeout(time_limit, collect_compiler_output(&mut process)) => Some(res),
    };

    process
        .terminate()
        .await
        .map_err(RunError::io("terminating the compiler"))?;

    let (status, stdout, stderr) = match finish {
        None => return Err(RunError::Cancelled),
        Some(Err(_)) => {
            log::info!("Compilation of {} timed out", unit.entry());
            return Ok(BuildOutcome::Failed {
                diagnostics: format!("compilation timed out after {time_limit:?}"),
            });
        }
        Some(Ok(output)) => output.map_err(RunError::io("collecting compiler output"))?,
    };

    if !status.success() {
        return Ok(BuildOutcome::Failed {
            diagnostics: compiler_diagnostics(&stdout, &stderr, status),
        });
    }

    if profile.runs_build_output() && !unit.output_path().exists() {
        return Ok(BuildOutcome::Failed {
            diagnostics: format!("{program} succeeded but produced no executable"),
        });
    }

    Ok(BuildOutcome::Built(unit.artifact(profile)))
}

async fn collect_compiler_output(
    process: &mut ProcessHandle,
) -> io::Result<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let stdout = process.take_stdout();
    let stderr = process.take_stderr();
    tokio::try_join!(process.wait(), read_to_end(stdout), read_to_end(stderr))
}

/// Compiler stderr followed by stdout, or the exit status when both are empty
fn compiler_diagnostics(stdout: &[u8], stderr: &[u8], status: ExitStatus) -> String {
    let mut text = String::from_utf8_lossy(stderr).into_owned();
    let stdout = String::from_utf8_lossy(stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stdout);
    }

    if text.trim().is_empty() {
        format!("compiler failed with {status}")
    } else {
        text
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::language::{Language, Toolchains};
    use crate::sandbox::Materializer;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// Shell scripts standing in for a native toolchain: syntax-check, then copy
    fn shell_profile(build: &[&str]) -> LanguageProfile {
        LanguageProfile {
            extension: "sh".to_string(),
            entry_prefix: String::new(),
            build: Some(args(build)),
            run: args(&["/bin/sh", "%OUTPUT%"]),
            entry_point: None,
        }
    }

    const SYNTAX_CHECK_AND_COPY: [&str; 5] = [
        "/bin/sh",
        "-c",
        "/bin/sh -n \"$0\" && cp \"$0\" \"$1\"",
        "%INPUT%",
        "%OUTPUT%",
    ];

    async fn build_source(source: &str, profile: &LanguageProfile) -> BuildOutcome {
        let work = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(work.path()).unwrap();
        let unit = materializer
            .materialize(source.as_bytes(), profile)
            .await
            .unwrap();
        build(
            &unit,
            profile,
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_build_produces_artifact() {
        let work = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(work.path()).unwrap();
        let profile = shell_profile(&SYNTAX_CHECK_AND_COPY);
        let unit = materializer
            .materialize(b"echo hi", &profile)
            .await
            .unwrap();

        let outcome = build(&unit, &profile, Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();

        let BuildOutcome::Built(artifact) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(artifact.program, "/bin/sh");
        assert_eq!(artifact.args, vec![unit.output_path().to_string_lossy().to_string()]);
        assert_eq!(artifact.work_dir, unit.dir());
        assert!(unit.output_path().exists());
    }

    #[tokio::test]
    async fn test_syntax_error_yields_diagnostics() {
        let outcome = build_source("echo (", &shell_profile(&SYNTAX_CHECK_AND_COPY)).await;
        let BuildOutcome::Failed { diagnostics } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(!diagnostics.trim().is_empty());
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_status() {
        let outcome = build_source("echo hi", &shell_profile(&["/bin/sh", "-c", "exit 1"])).await;
        let BuildOutcome::Failed { diagnostics } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(diagnostics.contains("exit status: 1"), "{diagnostics}");
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_compile_error() {
        let outcome = build_source("echo hi", &shell_profile(&["/bin/sh", "-c", "exit 0"])).await;
        let BuildOutcome::Failed { diagnostics } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(diagnostics.contains("no executable"), "{diagnostics}");
    }

    #[tokio::test]
    async fn test_missing_compiler_is_a_compile_error() {
        let profile = shell_profile(&["/nonexistent/cc", "%INPUT%"]);
        let outcome = build_source("echo hi", &profile).await;
        let BuildOutcome::Failed { diagnostics } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(diagnostics.starts_with("failed to launch /nonexistent/cc"));
    }

    #[tokio::test]
    async fn test_compile_timeout() {
        let work = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(work.path()).unwrap();
        let profile = shell_profile(&["/bin/sh", "-c", "sleep 30"]);
        let unit = materializer.materialize(b"", &profile).await.unwrap();

        let start = std::time::Instant::now();
        let outcome = build(&unit, &profile, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        let BuildOutcome::Failed { diagnostics } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert!(diagnostics.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_build() {
        let work = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(work.path()).unwrap();
        let profile = shell_profile(&["/bin/sh", "-c", "sleep 30"]);
        let unit = materializer.materialize(b"", &profile).await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = build(&unit, &profile, Duration::from_secs(30), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
    }

    #[tokio::test]
    async fn test_interpreted_language_passes_source_through() {
        let work = tempfile::tempdir().unwrap();
        let materializer = Materializer::new(work.path()).unwrap();
        let profile = Toolchains::default().profile(Language::Python).clone();
        let unit = materializer
            .materialize(b"print('hi')", &profile)
            .await
            .unwrap();

        let outcome = build(&unit, &profile, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        let BuildOutcome::Built(artifact) = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(artifact.program, "python3");
        assert_eq!(artifact.args, vec![unit.source_path().to_string_lossy().to_string()]);
    }
}
