//! Verdict types and output comparison

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Score reported with every verdict; scoring is not implemented
pub const PLACEHOLDER_SCORE: u32 = 0;

/// Final classification of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    WrongAnswer,
    CompileError,
    TimeLimitExceeded,
    RuntimeError,
}

impl Outcome {
    /// Short code for logs
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Accepted => "AC",
            Outcome::WrongAnswer => "WA",
            Outcome::CompileError => "CE",
            Outcome::TimeLimitExceeded => "TLE",
            Outcome::RuntimeError => "RE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The single externally observable result of judging one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Compiler diagnostics or the reason of a runtime error
    pub message: Option<String>,
    /// Wall-clock time spent running the program
    pub elapsed: Duration,
    pub score: u32,
    /// Set when the run failed for a reason other than the program's answer
    pub other_error: bool,
}

impl Verdict {
    fn new(outcome: Outcome, message: Option<String>, elapsed: Duration) -> Self {
        Self {
            outcome,
            message,
            elapsed,
            score: PLACEHOLDER_SCORE,
            other_error: outcome == Outcome::RuntimeError,
        }
    }

    pub fn accepted(elapsed: Duration) -> Self {
        Self::new(Outcome::Accepted, None, elapsed)
    }

    pub fn wrong_answer(elapsed: Duration) -> Self {
        Self::new(Outcome::WrongAnswer, None, elapsed)
    }

    pub fn compile_error(diagnostics: String) -> Self {
        Self::new(Outcome::CompileError, Some(diagnostics), Duration::ZERO)
    }

    pub fn time_limit_exceeded(elapsed: Duration) -> Self {
        Self::new(Outcome::TimeLimitExceeded, None, elapsed)
    }

    pub fn runtime_error(message: String, elapsed: Duration) -> Self {
        Self::new(Outcome::RuntimeError, Some(message), elapsed)
    }

    pub fn is_accepted(&self) -> bool {
        self.outcome == Outcome::Accepted
    }
}

/// How program output is compared against the expected answer
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Drops every carriage return, space and newline from both sides
    #[default]
    CollapseWhitespace,
    /// Compares whitespace-separated tokens
    Tokens,
    /// Ignores trailing spaces on each line and trailing empty lines
    Standard,
    /// Byte-for-byte
    Strict,
}

impl Comparison {
    pub fn matches(self, program_output: &str, expected_output: &str) -> bool {
        match self {
            Comparison::CollapseWhitespace => {
                collapse_whitespace(program_output) == collapse_whitespace(expected_output)
            }
            Comparison::Tokens => program_output
                .split_whitespace()
                .eq(expected_output.split_whitespace()),
            Comparison::Standard => compare_output_standard(program_output, expected_output),
            Comparison::Strict => program_output == expected_output,
        }
    }
}

/// Judges the captured output of a program that ran to completion
pub fn judge_output(
    stdout: &[u8],
    expected_output: &str,
    comparison: Comparison,
    elapsed: Duration,
) -> Verdict {
    let program_output = String::from_utf8_lossy(stdout);
    if comparison.matches(&program_output, expected_output) {
        Verdict::accepted(elapsed)
    } else {
        Verdict::wrong_answer(elapsed)
    }
}

/// Removes `\r`, ` ` and `\n`; tabs and other whitespace are kept
pub fn collapse_whitespace(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\r' | ' ' | '\n'))
        .collect()
}

fn compare_output_standard(program_output: &str, expected_output: &str) -> bool {
    let normalize = |s: &str| -> String {
        s.lines()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    };

    normalize(program_output) == normalize(expected_output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH: Duration = Duration::from_millis(5);

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("1 2\r\n3 \n"), "123");
        assert_eq!(collapse_whitespace("a\tb"), "a\tb");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_spacing_and_line_endings_are_accepted() {
        let pairs = [
            ("Hello, World!", "Hello, World!\n"),
            ("1 2 3\r\n", "1 2 3\n"),
            ("1\n2\n3", "1 2 3"),
            ("  42  \n\n\n", "42"),
            ("a b\r\nc", "ab\nc\r\n"),
            ("", "\n \r\n"),
        ];
        for (output, expected) in pairs {
            let verdict = judge_output(output.as_bytes(), expected, Comparison::default(), MATCH);
            assert_eq!(verdict.outcome, Outcome::Accepted, "{output:?} vs {expected:?}");
            assert!(!verdict.other_error);
        }
    }

    #[test]
    fn test_differences_are_wrong_answers() {
        let pairs = [
            ("Hello, World", "Hello, World!"),
            ("1 2 3", "1 2 4"),
            ("3 2 1", "1 2 3"),
            ("", "0"),
            ("a\tb", "ab"),
        ];
        for (output, expected) in pairs {
            let verdict = judge_output(output.as_bytes(), expected, Comparison::default(), MATCH);
            assert_eq!(verdict.outcome, Outcome::WrongAnswer, "{output:?} vs {expected:?}");
            assert_eq!(verdict.score, PLACEHOLDER_SCORE);
        }
    }

    #[test]
    fn test_collapse_accepts_run_together_numbers() {
        // Known over-permissiveness kept for compatibility
        assert!(Comparison::CollapseWhitespace.matches("12 3", "1 23"));
        assert!(!Comparison::Tokens.matches("12 3", "1 23"));
    }

    #[test]
    fn test_other_comparisons() {
        assert!(Comparison::Tokens.matches("1  2\r\n3\n", "1 2 3"));
        assert!(Comparison::Standard.matches("1 2  \n3\n\n", "1 2\n3"));
        assert!(!Comparison::Standard.matches("1 2\n3", "1  2\n3"));
        assert!(Comparison::Strict.matches("1\n", "1\n"));
        assert!(!Comparison::Strict.matches("1\n", "1"));
    }

    #[test]
    fn test_invalid_utf8_output_is_judged_lossily() {
        let verdict = judge_output(b"\xff\xfe", "ok", Comparison::default(), MATCH);
        assert_eq!(verdict.outcome, Outcome::WrongAnswer);
    }

    #[test]
    fn test_runtime_errors_set_other_error() {
        let verdict = Verdict::runtime_error("boom".to_string(), Duration::ZERO);
        assert!(verdict.other_error);
        assert!(!verdict.is_accepted());
        let verdict = Verdict::compile_error("error: expected ';'".to_string());
        assert!(!verdict.other_error);
        assert_eq!(verdict.outcome.to_string(), "CE");
    }
}
