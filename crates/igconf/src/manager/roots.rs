//! Tagged search roots for layer discovery.
//!
//! Roots arrive as `tag=path` entries; untagged entries auto-assign
//! `root0`, `root1`, … The tag `DYNlayer` is reserved: it is never scanned
//! and receives the output of dynamic-layer generators.

use std::path::PathBuf;

use crate::error::Error;

/// The reserved tag for the generated-layer output root.
pub const DYN_TAG: &str = "DYNlayer";

/// One tagged search root.
#[derive(Clone, Debug)]
pub struct SearchRoot {
    /// The root's tag, unique across all roots.
    pub tag: String,
    /// Absolute path of the root.
    pub path: PathBuf,
}

/// Parses `tag=path` entries into search roots. Empty entries are skipped;
/// an empty input falls back to `root0=./layer`.
///
/// # Errors
///
/// Returns [`Error::DuplicateTag`] when an explicit tag repeats.
pub fn parse_search_roots(entries: &[String]) -> Result<Vec<SearchRoot>, Error> {
    let mut roots = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut auto_index = 0;

    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (tag, path) = match entry.split_once('=') {
            Some((tag, path)) => (tag.trim().to_string(), path.trim().to_string()),
            None => (String::new(), entry.to_string()),
        };

        let tag = if tag.is_empty() {
            loop {
                let candidate = format!("root{auto_index}");
                auto_index += 1;
                if !seen.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            if seen.contains(&tag) {
                return Err(Error::DuplicateTag { tag });
            }
            tag
        };

        if path.is_empty() {
            continue;
        }

        let resolved = absolute(&PathBuf::from(&path));
        seen.push(tag.clone());
        roots.push(SearchRoot {
            tag,
            path: resolved,
        });
    }

    if roots.is_empty() {
        roots.push(SearchRoot {
            tag: "root0".to_string(),
            path: absolute(&PathBuf::from("./layer")),
        });
    }
    Ok(roots)
}

fn absolute(path: &PathBuf) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.clone())
}
