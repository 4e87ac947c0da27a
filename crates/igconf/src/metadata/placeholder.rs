//! Placeholder substitution in metadata values.
//!
//! Two distinct kinds of placeholder exist:
//!
//! - file placeholders (`${FILENAME}`, `${DIRECTORY}`, `${FILEPATH}`),
//!   substituted into every field value from the source file's path;
//! - environment placeholders (`${VAR}`) inside layer dependency fields,
//!   expanded iteratively from the environment snapshot.
//!
//! The escape `\${...}` survives substitution as a literal `${...}`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::env::EnvSnapshot;
use crate::error::Error;

// File placeholders are upper-case only; env placeholders are any
// identifier.
static FILE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z][A-Z0-9_]*)\}").expect("valid pattern"));
static ENV_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"));

// Stand-in for the escaped `\${` while the real placeholders are replaced.
const ESCAPE_TOKEN: &str = "\u{1}LITERAL_DOLLAR_BRACE\u{1}";

const MAX_ENV_PASSES: usize = 10;

/// Substitutes the file placeholders of `path` into `text`. Unknown
/// upper-case placeholders are left untouched.
#[must_use]
pub fn substitute_file_placeholders(text: &str, path: &Path) -> String {
    if !text.contains("${") {
        return text.to_string();
    }

    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let filename = abs
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let directory = abs
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let filepath = abs.display().to_string();

    let escaped = text.replace("\\${", ESCAPE_TOKEN);
    let substituted = FILE_PLACEHOLDER.replace_all(&escaped, |caps: &Captures<'_>| {
        match caps.get(1).map(|m| m.as_str()) {
            Some("FILENAME") => filename.clone(),
            Some("DIRECTORY") => directory.clone(),
            Some("FILEPATH") => filepath.clone(),
            _ => caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string(),
        }
    });
    substituted.replace(ESCAPE_TOKEN, "${")
}

/// Expands `${VAR}` references in `text` from the environment snapshot.
///
/// Expansion iterates (capped at ten passes) so values may themselves
/// contain placeholders. In doc mode unresolved placeholders are preserved
/// verbatim.
///
/// # Errors
///
/// Returns [`Error::UnresolvedPlaceholders`] naming every variable still
/// unresolved after expansion, unless `doc_mode` is set.
pub fn expand_env_placeholders(
    text: &str,
    env: &EnvSnapshot,
    doc_mode: bool,
) -> Result<String, Error> {
    let mut previous = text.to_string();
    for _ in 0..MAX_ENV_PASSES {
        let current = ENV_PLACEHOLDER
            .replace_all(&previous, |caps: &Captures<'_>| {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                env.get(name).map_or_else(
                    || caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string(),
                    str::to_string,
                )
            })
            .into_owned();
        if current == previous {
            break;
        }
        previous = current;
    }

    if ENV_PLACEHOLDER.is_match(&previous) {
        if doc_mode {
            return Ok(previous);
        }
        let names: BTreeSet<String> = ENV_PLACEHOLDER
            .captures_iter(&previous)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        return Err(Error::UnresolvedPlaceholders {
            names: names.into_iter().collect(),
        });
    }

    Ok(previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_file_placeholders() {
        let out = substitute_file_placeholders(
            "gen ${DIRECTORY}/${FILENAME}",
            Path::new("/layers/base.yaml"),
        );
        assert_eq!(out, "gen /layers/base.yaml");
    }

    #[test]
    fn preserves_escaped_placeholders() {
        let out = substitute_file_placeholders("\\${FILENAME} stays", Path::new("/l/x.yaml"));
        assert_eq!(out, "${FILENAME} stays");
    }

    #[test]
    fn leaves_unknown_uppercase_placeholders() {
        let out = substitute_file_placeholders("${SOMETHING_ELSE}", Path::new("/l/x.yaml"));
        assert_eq!(out, "${SOMETHING_ELSE}");
    }

    #[test]
    fn expands_env_placeholders_iteratively() {
        let env: EnvSnapshot = [("SOC", "bcm2712"), ("BOARD", "pi5-${SOC}")]
            .into_iter()
            .collect();
        let out = expand_env_placeholders("base-${BOARD}", &env, false).unwrap();
        assert_eq!(out, "base-pi5-bcm2712");
    }

    #[test]
    fn unresolved_placeholders_error_sorted() {
        let env = EnvSnapshot::empty();
        let err = expand_env_placeholders("${B}-${A}", &env, false).unwrap_err();
        match err {
            Error::UnresolvedPlaceholders { names } => {
                assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn doc_mode_preserves_unresolved() {
        let env = EnvSnapshot::empty();
        let out = expand_env_placeholders("base-${SOC}", &env, true).unwrap();
        assert_eq!(out, "base-${SOC}");
    }
}
