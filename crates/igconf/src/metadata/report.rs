//! Accumulated validation findings for one metadata file.
//!
//! Validation never stops at the first problem; every check appends a
//! [`Finding`] and the caller decides what is fatal. Keys deduplicate
//! findings per subject the way repeated checks expect: most entries are
//! first-wins, hard errors may displace softer entries.

use indexmap::IndexMap;

use crate::error::Error;

/// One validation observation about a variable or field.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Finding {
    /// A field outside the supported schema.
    UnsupportedField {
        /// The offending field name.
        field: String,
    },
    /// Variables are defined but `X-Env-VarPrefix` is missing.
    MissingVarPrefix,
    /// Attribute fields without a base variable definition.
    OrphanedAttributes {
        /// The variable short name.
        var: String,
    },
    /// `X-Env-Layer-*` fields present but no layer name.
    MissingLayerName,
    /// The file carries no `X-Env-*` fields at all.
    NoMetadataFields,
    /// A validation rule that does not parse.
    InvalidRule {
        /// Variable the rule belongs to.
        var: String,
        /// The rule text.
        rule: String,
        /// Parser detail.
        message: String,
    },
    /// A required defined variable with no effective value.
    MissingRequired {
        /// Fully qualified variable name.
        var: String,
    },
    /// A required external variable (`X-Env-VarRequires`) that is unset.
    MissingRequiredVar {
        /// The external variable name.
        var: String,
    },
    /// A resolved default value that fails its own rule.
    InvalidValue {
        /// Fully qualified variable name.
        var: String,
        /// The failing value.
        value: String,
        /// Human-readable rule description.
        rule: String,
    },
    /// An environment value checked against the variable's rule.
    Validated {
        /// Fully qualified variable name.
        var: String,
        /// The checked value.
        value: String,
        /// Human-readable rule description.
        rule: String,
        /// Validator messages when invalid.
        errors: Vec<String>,
        /// Whether the value passed.
        valid: bool,
        /// Whether the variable is required.
        required: bool,
    },
    /// A required external variable checked against its rule.
    RequiredValidated {
        /// The external variable name.
        var: String,
        /// The checked value.
        value: String,
        /// The rule text.
        rule: String,
        /// Validator messages when invalid.
        errors: Vec<String>,
        /// Whether the value passed.
        valid: bool,
    },
    /// A set variable with no rule to check.
    NoRule {
        /// Fully qualified variable name.
        var: String,
        /// The current value.
        value: String,
        /// Whether the variable is required.
        required: bool,
    },
    /// A set required external variable with no rule.
    RequiredNoRule {
        /// The external variable name.
        var: String,
        /// The current value.
        value: String,
    },
    /// An optional external variable that is unset.
    OptionalUnset {
        /// The external variable name.
        var: String,
    },
    /// An optional external variable checked against its rule.
    OptionalValidated {
        /// The external variable name.
        var: String,
        /// The checked value.
        value: String,
        /// The rule text.
        rule: String,
        /// Whether the value passed. Failures warn, they do not fail.
        valid: bool,
    },
    /// A set optional external variable with no rule.
    OptionalNoRule {
        /// The external variable name.
        var: String,
        /// The current value.
        value: String,
    },
    /// A defined variable that is unset and not required.
    Unset {
        /// Fully qualified variable name.
        var: String,
    },
    /// A lazy definition that lost to an environment value.
    LazyOverridden {
        /// Fully qualified variable name.
        var: String,
        /// The winning environment value.
        value: String,
    },
    /// Two conflicting variables both effectively set.
    Conflict {
        /// The declaring variable.
        var_a: String,
        /// The other side.
        var_b: String,
        /// Effective value of the declaring variable.
        value_a: String,
        /// Effective value of the other side.
        value_b: String,
    },
}

impl Finding {
    /// Whether this finding fails validation. `ignore_missing_required`
    /// suppresses the missing-required family, used by the pipeline's
    /// permissive first pass.
    #[must_use]
    pub fn is_error(&self, ignore_missing_required: bool) -> bool {
        match self {
            Finding::UnsupportedField { .. }
            | Finding::MissingVarPrefix
            | Finding::OrphanedAttributes { .. }
            | Finding::MissingLayerName
            | Finding::NoMetadataFields
            | Finding::InvalidRule { .. }
            | Finding::InvalidValue { .. }
            | Finding::Conflict { .. } => true,
            Finding::MissingRequired { .. } | Finding::MissingRequiredVar { .. } => {
                !ignore_missing_required
            }
            Finding::Validated { valid, .. } | Finding::RequiredValidated { valid, .. } => !valid,
            _ => false,
        }
    }

    fn is_invalid_value(&self) -> bool {
        matches!(self, Finding::InvalidValue { .. })
    }

    /// The finding rendered as a plain message, without a status tag.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Finding::UnsupportedField { field } => format!("'{field}' is not supported"),
            Finding::MissingVarPrefix => {
                "X-Env-Var-* fields are defined but X-Env-VarPrefix is missing. \
                 Environment variables require a valid prefix."
                    .to_string()
            }
            Finding::OrphanedAttributes { var } => format!(
                "found attribute fields for variable '{var}' but no base X-Env-Var-{} definition",
                var.to_uppercase()
            ),
            Finding::MissingLayerName => {
                "X-Env-Layer-* fields present but X-Env-Layer-Name is missing".to_string()
            }
            Finding::NoMetadataFields => "no X-Env-* metadata fields found".to_string(),
            Finding::InvalidRule { var, rule, message } => {
                format!("invalid validation rule '{rule}' for {var}: {message}")
            }
            Finding::MissingRequired { var } | Finding::MissingRequiredVar { var } => {
                format!("{var} - REQUIRED but not set")
            }
            Finding::InvalidValue { var, value, rule } => format!(
                "resolved value '{value}' for {var} doesn't match validation rule '{rule}'"
            ),
            Finding::Validated {
                var,
                value,
                rule,
                errors,
                valid,
                ..
            } => {
                if *valid || errors.is_empty() {
                    format!("{var}={value} (rule: {rule})")
                } else {
                    format!("{var}={value} (rule: {rule}) - {}", errors.join("; "))
                }
            }
            Finding::RequiredValidated {
                var,
                value,
                rule,
                errors,
                valid,
            } => {
                if *valid || errors.is_empty() {
                    format!("{var}={value} (required, rule: {rule})")
                } else {
                    format!(
                        "{var}={value} (required, rule: {rule}) - {}",
                        errors.join("; ")
                    )
                }
            }
            Finding::NoRule { var, value, .. } => {
                format!("{var}={value} (no validation rule)")
            }
            Finding::RequiredNoRule { var, value } => {
                format!("{var}={value} (required, no validation rule)")
            }
            Finding::OptionalUnset { var } => format!("{var} - optional, not set"),
            Finding::OptionalValidated {
                var, value, rule, ..
            } => format!("{var}={value} (optional, rule: {rule})"),
            Finding::OptionalNoRule { var, value } => {
                format!("{var}={value} (optional, no validation rule)")
            }
            Finding::Unset { var } => format!("{var} - optional, not set"),
            Finding::LazyOverridden { var, value } => {
                format!("{var}={value} (lazy definition overridden by environment)")
            }
            Finding::Conflict {
                var_a, var_b, ..
            } => format!("variables '{var_a}' and '{var_b}' conflict and both are set"),
        }
    }
}

/// The findings of one validation or lint pass.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    path: String,
    entries: IndexMap<String, Finding>,
}

impl ValidationReport {
    /// An empty report for `path` (used in diagnostics).
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entries: IndexMap::new(),
        }
    }

    /// The file this report covers.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Inserts a finding unless the key already has one.
    pub fn insert_first(&mut self, key: impl Into<String>, finding: Finding) {
        self.entries.entry(key.into()).or_insert(finding);
    }

    /// Inserts a hard finding, displacing anything except an existing
    /// invalid-value entry (the first invalid value wins).
    pub fn insert_error(&mut self, key: impl Into<String>, finding: Finding) {
        let key = key.into();
        match self.entries.get(&key) {
            Some(existing) if existing.is_invalid_value() => {}
            _ => {
                self.entries.insert(key, finding);
            }
        }
    }

    /// Appends every entry of another report.
    pub fn merge(&mut self, other: ValidationReport) {
        for (key, finding) in other.entries {
            self.insert_first(key, finding);
        }
    }

    /// The findings in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Finding)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    /// True when the report has no findings at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when any finding fails validation.
    #[must_use]
    pub fn has_errors(&self, ignore_missing_required: bool) -> bool {
        self.entries
            .values()
            .any(|f| f.is_error(ignore_missing_required))
    }

    /// Converts the failing findings into [`Error`]s, labelled with the
    /// owning layer.
    #[must_use]
    pub fn to_errors(&self, layer: &str, ignore_missing_required: bool) -> Vec<Error> {
        self.entries
            .values()
            .filter(|f| f.is_error(ignore_missing_required))
            .map(|finding| self.finding_to_error(finding, layer))
            .collect()
    }

    fn finding_to_error(&self, finding: &Finding, layer: &str) -> Error {
        let path = self.path.clone();
        match finding {
            Finding::UnsupportedField { field } => Error::UnsupportedField {
                path,
                field: field.clone(),
            },
            Finding::MissingVarPrefix => Error::MissingVarPrefix { path },
            Finding::OrphanedAttributes { var } => Error::OrphanedAttributes {
                path,
                var: var.clone(),
            },
            Finding::MissingLayerName => Error::MissingLayerName { path },
            Finding::NoMetadataFields => Error::NoMetadataFields { path },
            Finding::InvalidRule { var, rule, message } => Error::InvalidRule {
                var: var.clone(),
                rule: rule.clone(),
                message: message.clone(),
            },
            Finding::MissingRequired { var } | Finding::MissingRequiredVar { var } => {
                Error::MissingRequired {
                    var: var.clone(),
                    layer: layer.to_string(),
                }
            }
            Finding::InvalidValue { var, value, rule } => Error::InvalidValue {
                var: var.clone(),
                value: value.clone(),
                detail: format!(" (expected: {rule})"),
            },
            Finding::Validated {
                var,
                value,
                rule,
                errors,
                ..
            }
            | Finding::RequiredValidated {
                var,
                value,
                rule,
                errors,
                ..
            } => Error::InvalidValue {
                var: var.clone(),
                value: value.clone(),
                detail: if errors.is_empty() {
                    format!(" (expected: {rule})")
                } else {
                    format!(" - {}", errors.join("; "))
                },
            },
            Finding::Conflict {
                var_a,
                var_b,
                value_a,
                value_b,
            } => Error::Conflict {
                var_a: var_a.clone(),
                var_b: var_b.clone(),
                value_a: value_a.clone(),
                value_b: value_b.clone(),
            },
            // Non-error findings are filtered out before conversion; map
            // anything unexpected to a generic invalid value.
            other => Error::InvalidValue {
                var: format!("{other:?}"),
                value: String::new(),
                detail: String::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_wins_on_insert_first() {
        let mut report = ValidationReport::new("x.yaml");
        report.insert_first("V", Finding::Unset { var: "V".into() });
        report.insert_first(
            "V",
            Finding::MissingRequired { var: "V".into() },
        );
        assert_eq!(report.entries().count(), 1);
        assert!(!report.has_errors(false));
    }

    #[test]
    fn insert_error_displaces_soft_entry() {
        let mut report = ValidationReport::new("x.yaml");
        report.insert_first("V", Finding::Unset { var: "V".into() });
        report.insert_error(
            "V",
            Finding::InvalidValue {
                var: "V".into(),
                value: "9".into(),
                rule: "integer between 1 and 5".into(),
            },
        );
        assert!(report.has_errors(false));
    }

    #[test]
    fn first_invalid_value_is_kept() {
        let mut report = ValidationReport::new("x.yaml");
        report.insert_error(
            "V",
            Finding::InvalidValue {
                var: "V".into(),
                value: "first".into(),
                rule: "r".into(),
            },
        );
        report.insert_error(
            "V",
            Finding::InvalidValue {
                var: "V".into(),
                value: "second".into(),
                rule: "r".into(),
            },
        );
        let (_, finding) = report.entries().next().unwrap();
        if let Finding::InvalidValue { value, .. } = finding {
            assert_eq!(value, "first");
        } else {
            panic!("expected invalid value finding");
        }
    }

    #[test]
    fn missing_required_respects_permissive_flag() {
        let mut report = ValidationReport::new("x.yaml");
        report.insert_first("V", Finding::MissingRequired { var: "V".into() });
        assert!(report.has_errors(false));
        assert!(!report.has_errors(true));
        assert_eq!(report.to_errors("base", true).len(), 0);
        assert_eq!(report.to_errors("base", false).len(), 1);
    }
}
