//! Validation rules for layer variables.
//!
//! A rule is a small expression attached to a variable via its `-Valid`
//! field. The recognized forms:
//!
//! | Expression | Meaning |
//! |------------|---------|
//! | `int:LO-HI` | decimal integer in the closed range `LO..=HI` |
//! | `bool` | one of `true/false`, `1/0`, `yes/no`, `y/n` (case-insensitive) |
//! | `string` | any non-empty string |
//! | `string-or-unset` | like `string`, but an empty value suppresses the env write |
//! | `regex:PATTERN` | full match against `PATTERN` |
//! | `keywords:a,b,c` | one of the listed keywords |
//! | `a,b,c` | bare enumeration, same as `keywords:` |
//!
//! Validators expose two operations: [`Validator::validate`] returns the
//! list of problems with a value (empty means valid), and
//! [`Validator::describe`] renders the rule for humans.

use regex::Regex;
use thiserror::Error as ThisError;

const BOOL_VALUES: &[&str] = &["true", "false", "1", "0", "yes", "no", "y", "n"];

/// Why a rule expression failed to parse.
#[derive(Debug, ThisError)]
pub enum RuleError {
    /// The expression was empty.
    #[error("empty validation rule")]
    Empty,

    /// A `tag:` form that is not part of the grammar.
    #[error("unknown validation tag '{tag}'")]
    UnknownTag {
        /// The unrecognized tag.
        tag: String,
    },

    /// An `int:` range that is not `LO-HI` with `LO <= HI`.
    #[error("malformed integer range '{range}'")]
    BadRange {
        /// The range text after `int:`.
        range: String,
    },

    /// A `regex:` pattern that does not compile.
    #[error("invalid regex pattern: {source}")]
    BadPattern {
        /// The underlying regex error.
        #[from]
        source: regex::Error,
    },

    /// A `keywords:` form with no members.
    #[error("empty keyword list")]
    EmptyKeywords,
}

#[derive(Clone, Debug)]
enum Kind {
    Int { lo: i64, hi: i64 },
    Bool,
    Str { allow_unset: bool },
    Pattern(Regex),
    Keywords(Vec<String>),
}

/// A parsed validation rule.
#[derive(Clone, Debug)]
pub struct Validator {
    rule: String,
    kind: Kind,
}

impl Validator {
    /// Parses a rule expression.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] for unknown tags, malformed ranges, invalid
    /// regex patterns and empty expressions.
    pub fn parse(expr: &str) -> Result<Self, RuleError> {
        let rule = expr.trim();
        if rule.is_empty() {
            return Err(RuleError::Empty);
        }

        let kind = if let Some(range) = rule.strip_prefix("int:") {
            let (lo, hi) = parse_range(range)?;
            Kind::Int { lo, hi }
        } else if let Some(pattern) = rule.strip_prefix("regex:") {
            // Anchor so the rule is a full match, like the `-Valid` contract
            // promises.
            let anchored = format!("^(?:{pattern})$");
            Kind::Pattern(Regex::new(&anchored)?)
        } else if let Some(list) = rule.strip_prefix("keywords:") {
            Kind::Keywords(parse_keywords(list)?)
        } else {
            match rule {
                "bool" => Kind::Bool,
                "string" => Kind::Str { allow_unset: false },
                "string-or-unset" => Kind::Str { allow_unset: true },
                other if other.contains(',') => Kind::Keywords(parse_keywords(other)?),
                other if other.contains(':') => {
                    let tag = other.split(':').next().unwrap_or(other);
                    return Err(RuleError::UnknownTag {
                        tag: tag.to_string(),
                    });
                }
                other => Kind::Keywords(vec![other.to_string()]),
            }
        };

        Ok(Self {
            rule: rule.to_string(),
            kind,
        })
    }

    /// The original rule expression.
    #[must_use]
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// True for `string-or-unset` rules: an empty value means "leave the
    /// variable unset" rather than "invalid".
    #[must_use]
    pub fn allow_unset(&self) -> bool {
        matches!(self.kind, Kind::Str { allow_unset: true })
    }

    /// Checks `value` against the rule. An empty vector means the value is
    /// valid; otherwise each entry describes one problem.
    #[must_use]
    pub fn validate(&self, value: &str) -> Vec<String> {
        match &self.kind {
            Kind::Int { lo, hi } => match value.trim().parse::<i64>() {
                Ok(n) if (*lo..=*hi).contains(&n) => vec![],
                Ok(n) => vec![format!("{n} is outside range {lo}-{hi}")],
                Err(_) => vec![format!("'{value}' is not an integer")],
            },
            Kind::Bool => {
                if BOOL_VALUES.contains(&value.trim().to_lowercase().as_str()) {
                    vec![]
                } else {
                    vec![format!("'{value}' is not a boolean")]
                }
            }
            Kind::Str { allow_unset } => {
                if value.is_empty() && !allow_unset {
                    vec!["value must be a non-empty string".to_string()]
                } else {
                    vec![]
                }
            }
            Kind::Pattern(regex) => {
                if regex.is_match(value) {
                    vec![]
                } else {
                    vec![format!("'{value}' does not match pattern")]
                }
            }
            Kind::Keywords(members) => {
                if members.iter().any(|m| m == value) {
                    vec![]
                } else {
                    vec![format!("'{value}' is not one of: {}", members.join(", "))]
                }
            }
        }
    }

    /// A human-readable description of the rule.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.kind {
            Kind::Int { lo, hi } => format!("integer between {lo} and {hi}"),
            Kind::Bool => "boolean (true/false, 1/0, yes/no, y/n)".to_string(),
            Kind::Str { allow_unset: false } => "non-empty string".to_string(),
            Kind::Str { allow_unset: true } => "string, or unset when empty".to_string(),
            Kind::Pattern(_) => {
                let pattern = self.rule.strip_prefix("regex:").unwrap_or(&self.rule);
                format!("matches regular expression '{pattern}'")
            }
            Kind::Keywords(members) => format!("one of: {}", members.join(", ")),
        }
    }
}

fn parse_range(range: &str) -> Result<(i64, i64), RuleError> {
    let bad = || RuleError::BadRange {
        range: range.to_string(),
    };

    // The separator is a '-' that leaves a parseable integer on each side;
    // scanning from index 1 lets the low bound be negative.
    for (idx, ch) in range.char_indices().skip(1) {
        if ch != '-' {
            continue;
        }
        let (lo_text, hi_text) = (&range[..idx], &range[idx + 1..]);
        if let (Ok(lo), Ok(hi)) = (lo_text.trim().parse::<i64>(), hi_text.trim().parse::<i64>()) {
            if lo > hi {
                return Err(bad());
            }
            return Ok((lo, hi));
        }
    }
    Err(bad())
}

fn parse_keywords(list: &str) -> Result<Vec<String>, RuleError> {
    let members: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if members.is_empty() {
        return Err(RuleError::EmptyKeywords);
    }
    Ok(members)
}

/// The rule-grammar help text shown by `igconf metadata --help-validation`.
#[must_use]
pub fn validation_help() -> String {
    "\
Validation rules for X-Env-Var-*-Valid fields:

  int:LO-HI          decimal integer in the closed range LO..HI
                     example: int:1024-65535
  bool               true/false, 1/0, yes/no, y/n (case-insensitive)
  string             any non-empty string
  string-or-unset    like string, but an empty value leaves the
                     variable unset instead of failing validation
  regex:PATTERN      full match against PATTERN
                     example: regex:^[a-zA-Z0-9.-]+$
  keywords:a,b,c     one of the listed keywords
  a,b,c              bare enumeration, same as keywords:

X-Env-VarRequires-Valid and X-Env-VarOptional-Valid take a
comma-separated list of the rules above, positionally aligned with
the corresponding variable list."
        .to_string()
}
