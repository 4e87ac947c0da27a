//! Header block extraction.
//!
//! A layer file opens with a comment-wrapped metadata block:
//!
//! ```text
//! # METABEGIN
//! # X-Env-Layer-Name: my-layer
//! # X-Env-Var-port: 8080
//! # METAEND
//! ```
//!
//! The block is comment-stripped and parsed as RFC822-style fields with
//! indented continuation lines. Files without a block may instead carry
//! bare top-level `X-Env-*: value` lines.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::Error;

const META_BEGIN: &str = "# METABEGIN";
const META_END: &str = "# METAEND";

static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid pattern"));

/// Extracts the ordered field map from a layer file's text.
///
/// `path` is only used for diagnostics.
///
/// # Errors
///
/// Returns [`Error::MalformedHeader`] for unindented continuation lines,
/// invalid field names and non-`X-Env-` fields. A file with no metadata at
/// all yields an empty map, not an error.
pub fn extract(path: &str, text: &str) -> Result<IndexMap<String, String>, Error> {
    let lines: Vec<&str> = text.lines().collect();
    let meta_lines = if lines.iter().any(|l| l.trim() == META_BEGIN) {
        block_lines(&lines)
    } else {
        direct_lines(&lines)
    };

    let fields = parse_fields(path, &meta_lines)?;

    let invalid: Vec<&str> = fields
        .keys()
        .filter(|name| !name.starts_with("X-Env-"))
        .map(String::as_str)
        .collect();
    if !invalid.is_empty() {
        return Err(Error::MalformedHeader {
            path: path.to_string(),
            message: format!(
                "invalid field names (must start with 'X-Env-'): {}",
                invalid.join(", ")
            ),
        });
    }

    Ok(fields)
}

/// Collects the comment-stripped lines between `# METABEGIN` and
/// `# METAEND`, dropping blanks.
fn block_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let mut in_meta = false;
    let mut meta = Vec::new();
    for line in lines {
        let stripped = line.trim();
        if stripped == META_BEGIN {
            in_meta = true;
            continue;
        }
        if stripped == META_END {
            break;
        }
        if !in_meta {
            continue;
        }
        let clean = if let Some(rest) = line.strip_prefix("# ") {
            rest.trim_end()
        } else if let Some(rest) = line.strip_prefix('#') {
            rest.trim_end()
        } else {
            continue;
        };
        if !clean.trim().is_empty() {
            meta.push(clean);
        }
    }
    meta
}

/// Keeps bare top-level `X-Env-*: value` lines from files without a block.
fn direct_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    lines
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| {
            if line.is_empty() || line.starts_with('#') {
                return false;
            }
            let Some((name, _)) = line.split_once(':') else {
                return false;
            };
            name.trim().starts_with("X-Env-")
        })
        .collect()
}

fn parse_fields(path: &str, meta_lines: &[&str]) -> Result<IndexMap<String, String>, Error> {
    let malformed = |message: String| Error::MalformedHeader {
        path: path.to_string(),
        message,
    };

    let mut fields: IndexMap<String, String> = IndexMap::new();
    let mut current: Option<String> = None;

    for (i, line) in meta_lines.iter().enumerate() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation: joined to the current field with a newline,
            // which is what multi-line Triggers/Conflicts fields rely on.
            let Some(name) = &current else {
                return Err(malformed(format!(
                    "line '{}' appears to be a continuation but no field precedes it",
                    line.trim()
                )));
            };
            if let Some(value) = fields.get_mut(name) {
                if !value.is_empty() {
                    value.push('\n');
                }
                value.push_str(line.trim());
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            if line.trim().is_empty() || i == 0 {
                continue;
            }
            return Err(malformed(format!(
                "line '{line}' appears to be a continuation but is not indented; \
                 continuation lines must start with a space or tab"
            )));
        };

        let name = name.trim();
        if !FIELD_NAME.is_match(name) {
            return Err(malformed(format!(
                "invalid field name '{name}': field names must contain only letters, \
                 numbers, hyphens, and underscores"
            )));
        }

        // First occurrence wins on duplicates.
        fields
            .entry(name.to_string())
            .or_insert_with(|| value.trim().to_string());
        current = Some(name.to_string());
    }

    Ok(fields)
}
