//! Answer normalization, the grading comparator, and the answer-format heuristic.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{AnswerValue, Question, QuestionKind};

//
// ─── NORMALIZATION ─────────────────────────────────────────────────────────────
//

/// Characters that swallow adjacent whitespace in code answers.
pub const CODE_OPERATORS: &str = "(){};,=<>+*/%-&|!";

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)//.*$").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapses whitespace runs, trims, and lowercases.
#[must_use]
pub fn normalize_text(input: &str) -> String {
    WHITESPACE.replace_all(input, " ").trim().to_lowercase()
}

/// Canonical form of a code answer.
///
/// Line endings are unified, `//` and `/* */` comments removed, whitespace
/// collapsed, and whitespace next to [`CODE_OPERATORS`] dropped. A space
/// that separates two characters which would otherwise fuse into a comment
/// marker is kept, so the result is a fixed point.
#[must_use]
pub fn normalize_code(input: &str) -> String {
    let unified = input.replace("\r\n", "\n");
    let without_line = LINE_COMMENT.replace_all(&unified, "");
    let without_block = BLOCK_COMMENT.replace_all(&without_line, "");
    let collapsed = WHITESPACE.replace_all(&without_block, " ");
    tighten_operators(collapsed.trim())
}

fn is_operator(c: char) -> bool {
    CODE_OPERATORS.contains(c)
}

fn fuses_into_comment_marker(prev: char, next: char) -> bool {
    matches!((prev, next), ('/', '/') | ('/', '*') | ('*', '/'))
}

/// Expects single spaces only, as produced by the whitespace collapse.
fn tighten_operators(collapsed: &str) -> String {
    let chars: Vec<char> = collapsed.chars().collect();
    let mut out = String::with_capacity(collapsed.len());
    for (i, &c) in chars.iter().enumerate() {
        if c != ' ' {
            out.push(c);
            continue;
        }
        let prev = out.chars().last();
        let next = chars.get(i + 1).copied();
        let touches_operator = prev.is_some_and(is_operator) || next.is_some_and(is_operator);
        let guarded = matches!((prev, next), (Some(p), Some(n)) if fuses_into_comment_marker(p, n));
        if !touches_operator || guarded {
            out.push(' ');
        }
    }
    out
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// Grades one answer. A missing answer is incorrect.
#[must_use]
pub fn grade(question: &Question, answer: Option<&AnswerValue>) -> bool {
    let Some(answer) = answer else {
        return false;
    };
    match question.kind() {
        QuestionKind::MultipleChoice {
            options,
            correct_index,
        } => *correct_index < options.len() && answer.as_text() == correct_index.to_string(),
        QuestionKind::ShortAnswer {
            expected_text,
            accepted,
        } => {
            let candidate = normalize_text(&answer.as_text());
            expected_text
                .iter()
                .chain(accepted.iter())
                .map(|expected| normalize_text(expected))
                .filter(|expected| !expected.is_empty())
                .any(|expected| expected == candidate)
        }
        QuestionKind::Code { accepted } => {
            let candidate = normalize_code(&answer.as_text());
            accepted
                .iter()
                .map(|code| normalize_code(code))
                .filter(|code| !code.is_empty())
                .any(|code| code == candidate)
        }
    }
}

//
// ─── FORMAT WARNINGS ───────────────────────────────────────────────────────────
//

/// An answer that looks like it was written for the other kind of field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatWarning {
    /// Program text in a field that expects printed output.
    CodeInOutputField,
    /// Printed output in a field that expects a statement.
    OutputInCodeField,
}

impl FormatWarning {
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            FormatWarning::CodeInOutputField => {
                "this field expects program output, but the answer looks like code"
            }
            FormatWarning::OutputInCodeField => {
                "this field expects code, but the answer looks like program output"
            }
        }
    }
}

static PROGRAM_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(print|printf|scanf|System\.out|def|return|import|class|if|elif|else|for|while)\b|#include\b|[;{}]")
        .unwrap()
});
static STATEMENT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(print|printf|scanf|System\.out)\b|#include\b").unwrap());

/// Whether `text` reads like source code rather than output.
#[must_use]
pub fn looks_like_program_text(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && PROGRAM_KEYWORD.is_match(text)
}

/// Checks a short or code answer for signs of the other answer kind.
///
/// Code questions are only checked when an accepted answer is a statement
/// such as a print call; condition-only questions never warn.
#[must_use]
pub fn format_warning(question: &Question, answer: Option<&AnswerValue>) -> Option<FormatWarning> {
    let text = answer?.as_text();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match question.kind() {
        QuestionKind::ShortAnswer { .. } => {
            looks_like_program_text(text).then_some(FormatWarning::CodeInOutputField)
        }
        QuestionKind::Code { accepted } => {
            let expects_statement = accepted.iter().any(|code| STATEMENT_CALL.is_match(code));
            let looks_like_output = !looks_like_program_text(text) && !text.contains(['(', ')']);
            (expects_statement && looks_like_output).then_some(FormatWarning::OutputInCodeField)
        }
        QuestionKind::MultipleChoice { .. } => None,
    }
}
