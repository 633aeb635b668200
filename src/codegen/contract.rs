//! Structural checks on oracle output.

use crate::error::GenerationError;
use regex::Regex;
use std::sync::LazyLock;

pub const START_MARKER: &str = "#PYTHON_START";
pub const END_MARKER: &str = "#PYTHON_END";

// `final_answer = ...` or `final_answer: int = ...`, but not `final_answer == ...`
static RESULT_BINDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*final_answer[ \t]*(?::[^=\n]*)?=(?:[^=]|$)").expect("valid regex")
});

/// Pull the program body out of raw oracle text and check it.
///
/// The body is whatever sits between the markers, with markdown fences and
/// carriage returns removed.
pub fn extract_program(raw: &str, disallowed: &[String]) -> Result<String, GenerationError> {
    let start = raw.find(START_MARKER).ok_or(GenerationError::MissingMarkers)?;
    let after_start = start + START_MARKER.len();
    let end = raw[after_start..]
        .find(END_MARKER)
        .map(|offset| after_start + offset)
        .ok_or(GenerationError::MissingMarkers)?;

    let body = raw[after_start..end]
        .replace('\r', "")
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .replace("pd.compat.StringIO", "io.StringIO");
    let body = body.trim_matches('\n').to_string();

    if let Some(pattern) = disallowed.iter().find(|p| body.contains(p.as_str())) {
        return Err(GenerationError::DisallowedConstruct(pattern.clone()));
    }
    if !RESULT_BINDING_RE.is_match(&body) {
        return Err(GenerationError::MissingResultBinding);
    }

    Ok(body)
}
