use std::num::NonZeroU64;
use std::time::Duration;

use actix_web::{HttpResponse, Responder, post, web};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::MaterializationError;
use crate::language::Language;
use crate::pipeline::{Pipeline, SubmissionRequest};
use crate::verdict::{Outcome, Verdict};

/// Position of the first failing case; always 0 as there is a single case
const ERROR_AT_PLACEHOLDER: u32 = 0;

#[derive(Deserialize, Debug)]
pub struct JudgeRequest {
    #[serde(rename = "problemID")]
    pub problem_id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Base64 encoded source code
    #[serde(rename = "inputCode")]
    pub input_code: String,
    pub lang: Language,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    /// Seconds
    pub timelimit: NonZeroU64,
}

impl JudgeRequest {
    pub fn into_submission(self) -> Result<SubmissionRequest, MaterializationError> {
        let source = STANDARD.decode(self.input_code.trim())?;

        Ok(SubmissionRequest {
            problem_id: self.problem_id,
            user_id: self.user_id,
            source,
            language: self.lang,
            input: self.input,
            expected_output: self.output,
            time_limit: Duration::from_secs(self.timelimit.get()),
        })
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerdictResponse {
    pub accepted: bool,
    /// Run time in milliseconds
    pub time: u64,
    pub is_compile_error: bool,
    pub error_content: String,
    #[serde(rename = "isTLE")]
    pub is_tle: bool,
    pub score: u32,
    pub error_at: u32,
    pub other_error: bool,
}

impl From<&Verdict> for VerdictResponse {
    fn from(verdict: &Verdict) -> Self {
        Self {
            accepted: verdict.is_accepted(),
            time: u64::try_from(verdict.elapsed.as_millis()).unwrap_or(u64::MAX),
            is_compile_error: verdict.outcome == Outcome::CompileError,
            error_content: verdict.message.clone().unwrap_or_default(),
            is_tle: verdict.outcome == Outcome::TimeLimitExceeded,
            score: verdict.score,
            error_at: ERROR_AT_PLACEHOLDER,
            other_error: verdict.other_error,
        }
    }
}

#[post("/v1/judge-submission")]
pub async fn judge_submission_handler(
    pipeline: web::Data<Pipeline>,
    body: web::Json<JudgeRequest>,
) -> impl Responder {
    let request = body.into_inner();
    log::info!(
        "Received {} submission from user {} for problem {}",
        request.lang,
        request.user_id,
        request.problem_id
    );

    let verdict = match request.into_submission() {
        Ok(submission) => pipeline.judge(submission).await,
        Err(e) => {
            log::warn!("Unable to decode submission: {e}");
            Verdict::runtime_error(e.to_string(), Duration::ZERO)
        }
    };

    HttpResponse::Ok().json(VerdictResponse::from(&verdict))
}
