//! Relaxed object literals for struct/class cells
//!
//! Cells may write `{a:1, b:hello, c:TRUE}` instead of strict JSON. Bare
//! identifier keys are quoted, `true`/`false`/`null` are lower-cased in any
//! casing, and other bare words in value position are quoted as strings.
//! The normalized text is then parsed with serde_json.

use crate::error::StructCastError;
use regex::Regex;
use serde_json::{Map, Value as Json};
use std::sync::LazyLock;

// A quoted string is matched first so that nothing inside it is rewritten
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|[A-Za-z_][\w.\-]*"#).expect("token pattern is valid")
});

/// Rewrite a relaxed literal into strict JSON text.
///
/// A bare word is a key when it follows `{` or `,` and precedes `:`, and a
/// value when it follows `:` and precedes `,`, `}` or `]`. Anything else,
/// quoted strings included, is copied through unchanged.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut copied = 0;

    for token in TOKEN.find_iter(text) {
        out.push_str(&text[copied..token.start()]);
        copied = token.end();

        let word = token.as_str();
        let before = text[..token.start()].chars().rev().find(|c| !c.is_whitespace());
        let after = text[token.end()..].chars().find(|c| !c.is_whitespace());
        let is_key = matches!(before, Some('{' | ',')) && after == Some(':');
        let is_value = before == Some(':') && matches!(after, Some(',' | '}' | ']'));

        if word.starts_with('"') || !(is_key || is_value) {
            out.push_str(word);
        } else if is_value && is_keyword(word) {
            out.push_str(&word.to_ascii_lowercase());
        } else {
            out.push('"');
            out.push_str(word);
            out.push('"');
        }
    }

    out.push_str(&text[copied..]);
    out
}

fn is_keyword(word: &str) -> bool {
    ["true", "false", "null"]
        .iter()
        .any(|k| word.eq_ignore_ascii_case(k))
}

/// Parse a relaxed literal into a JSON object
pub fn parse_object(data_type: &str, text: &str) -> Result<Map<String, Json>, StructCastError> {
    let normalized = normalize(text);
    match serde_json::from_str::<Json>(&normalized) {
        Ok(Json::Object(map)) => Ok(map),
        Ok(other) => Err(StructCastError::malformed(
            data_type,
            text,
            1,
            1,
            &format!("expected an object, found {}", json_kind(&other)),
        )),
        Err(e) => Err(StructCastError::malformed(
            data_type,
            text,
            e.line(),
            e.column(),
            &e.to_string(),
        )),
    }
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
