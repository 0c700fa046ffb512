//! Grammar-limited repair for near-miss JSON emitted by models.
//!
//! Only token-level fixes are applied, never evaluation:
//! - a surrounding markdown code fence is stripped
//! - single-quoted strings become double-quoted strings
//! - `True` / `False` / `None` outside strings become `true` / `false` / `null`
//! - trailing commas before `}` or `]` are dropped
//!
//! The output still has to pass strict `serde_json` decoding.

use serde_json::Value;

/// Attempts the repairs above and decodes the result strictly.
///
/// Returns `None` when nothing was changed or the repaired text still isn't JSON.
pub fn repair_json(text: &str) -> Option<Value> {
    let repaired = repair_text(strip_code_fence(text.trim()));
    if repaired == text {
        return None;
    }
    serde_json::from_str(&repaired).ok()
}

/// Strips a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn repair_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => i = copy_double_quoted(&chars, i, &mut out),
            '\'' => i = convert_single_quoted(&chars, i, &mut out),
            ',' if closes_after_whitespace(&chars, i + 1) => i += 1,
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

fn closes_after_whitespace(chars: &[char], from: usize) -> bool {
    chars[from..]
        .iter()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| matches!(c, '}' | ']'))
}

/// Copies a `"..."` string verbatim. Returns the index after the closing quote.
fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        match c {
            '\\' if i < chars.len() => {
                out.push(chars[i]);
                i += 1;
            }
            '"' => return i,
            _ => {}
        }
    }
    i
}

/// Rewrites a `'...'` string as `"..."`. Returns the index after the closing quote.
fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' if i < chars.len() => {
                let next = chars[i];
                i += 1;
                if next == '\'' {
                    out.push('\'');
                } else {
                    out.push('\\');
                    out.push(next);
                }
            }
            '"' => out.push_str("\\\""),
            '\'' => {
                out.push('"');
                return i;
            }
            c => out.push(c),
        }
    }
    i
}
