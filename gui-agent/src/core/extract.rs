//! Best-effort extraction of structured answers from free-form oracle text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static ANSWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)answer\s*:\s*([A-Za-z]+)").expect("answer regex"));
static YES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bYES\b").expect("yes regex"));
static NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bNO\b").expect("no regex"));
static REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*reason\s*:\s*(.+?)\s*$").expect("reason regex"));

/// Answer vocabulary for a yes/no style check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagVocabulary {
    /// `answer: T/F`, falls back to a response starting with `T` or `F`.
    TrueFalse,
    /// `answer: YES/NO`, falls back to the upper-case word `YES` or `NO` anywhere in
    /// the response.
    YesNo,
}

/// Parse the first balanced top-level `{...}` object as JSON.
///
/// Braces inside JSON string literals do not count toward balance. Only the first
/// candidate is tried: if it is not valid JSON the answer is indeterminate.
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = balanced_end(&text[start..])?;
    match serde_json::from_str::<Value>(&text[start..start + end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Byte length of the balanced object starting at `text[0] == '{'`.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a boolean check answer. `None` means indeterminate.
///
/// A labelled `answer:` decides alone; the unlabelled fallback only runs when no
/// label is present.
pub fn parse_flag(text: &str, vocabulary: FlagVocabulary) -> Option<bool> {
    if let Some(caps) = ANSWER_RE.captures(text) {
        return flag_token(&caps[1].to_ascii_uppercase(), vocabulary);
    }
    match vocabulary {
        FlagVocabulary::TrueFalse => match text.trim_start().chars().next() {
            Some('T' | 't') => Some(true),
            Some('F' | 'f') => Some(false),
            _ => None,
        },
        FlagVocabulary::YesNo => {
            if YES_RE.is_match(text) {
                Some(true)
            } else if NO_RE.is_match(text) {
                Some(false)
            } else {
                None
            }
        }
    }
}

fn flag_token(token: &str, vocabulary: FlagVocabulary) -> Option<bool> {
    match (vocabulary, token) {
        (FlagVocabulary::TrueFalse, "T" | "TRUE") => Some(true),
        (FlagVocabulary::TrueFalse, "F" | "FALSE") => Some(false),
        (FlagVocabulary::YesNo, "YES") => Some(true),
        (FlagVocabulary::YesNo, "NO") => Some(false),
        _ => None,
    }
}

/// The one-line `Reason:` the oracle attaches to analysis answers.
pub fn extract_reason(text: &str) -> Option<String> {
    REASON_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
        .filter(|reason| !reason.is_empty())
}
