//! Strict `NAME=value` env-file reading and order-preserving writing.
//!
//! The format is deliberately simple: one assignment per line, `#` and
//! blank lines skipped, optional matching double quotes stripped from the
//! value. Anything else is an error carrying `path:line` context.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::Error;
use crate::vars::is_valid_ident;

/// Loads an env file into an ordered map of assignments.
///
/// # Errors
///
/// Returns [`Error::Assignment`] for lines without `=` or with invalid
/// names, and [`Error::Io`] when the file cannot be read.
pub fn load_env_file(path: &Path) -> Result<IndexMap<String, String>, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let display = path.display().to_string();

    let mut assignments = IndexMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        let Some((name, value)) = stripped.split_once('=') else {
            return Err(Error::Assignment {
                path: display,
                line: lineno + 1,
                message: "expected key=value syntax".to_string(),
            });
        };
        let name = name.trim();
        let mut value = value.trim();
        if !is_valid_ident(name) {
            return Err(Error::Assignment {
                path: display,
                line: lineno + 1,
                message: format!("invalid variable name '{name}'"),
            });
        }
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        assignments.insert(name.to_string(), value.to_string());
    }
    Ok(assignments)
}

/// Writes resolved values back to disk, one line per original assignment,
/// preserving order. Missing resolutions become empty values.
///
/// # Errors
///
/// Returns [`Error::Io`] when the file or its parent directory cannot be
/// written.
pub fn write_env_file(
    path: &Path,
    assignments: &IndexMap<String, String>,
    resolved: &IndexMap<String, String>,
) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(path, e))?;
        }
    }
    let mut out = String::new();
    for name in assignments.keys() {
        let value = resolved.get(name).map_or("", String::as_str);
        out.push_str(name);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|e| Error::io(path, e))
}
