//! Layer-file metadata: parsing, the container, and validation passes.
//!
//! A [`Metadata`] holds everything extracted from one layer file: the raw
//! ordered field map, the parsed [`Layer`] (when the file declares one),
//! the per-variable definitions, and the external-variable requirement
//! lists. Two inspection passes are offered:
//!
//! - [`Metadata::lint`]: schema-only checks, no environment reads;
//! - [`Metadata::validate`]: resolves the file's own definitions against
//!   an environment snapshot and checks values, requirements and
//!   conflicts, accumulating every finding.

pub mod block;
pub mod fields;
pub mod placeholder;
mod report;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

pub use report::{Finding, ValidationReport};

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::layer::Layer;
use crate::resolver;
use crate::validator::Validator;
use crate::vars::{SetPolicy, VarDef};

/// Parsed metadata of one layer file.
#[derive(Clone, Debug)]
pub struct Metadata {
    path: PathBuf,
    display_path: String,
    raw: IndexMap<String, String>,
    layer: Option<Layer>,
    vars: IndexMap<String, VarDef>,
    var_prefix: String,
    required_vars: Vec<String>,
    required_rules: Vec<String>,
    optional_vars: Vec<String>,
    optional_rules: Vec<String>,
}

impl Metadata {
    /// Reads and parses a layer file.
    ///
    /// # Errors
    ///
    /// I/O failures, malformed headers, a broken YAML body, invalid
    /// variable specifiers and (outside doc mode) unresolved `${VAR}`
    /// placeholders in dependency fields.
    pub fn load(path: &Path, env: &EnvSnapshot, doc_mode: bool) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_text(&text, path, env, doc_mode)
    }

    /// Parses layer-file text. `path` provides placeholder values and
    /// diagnostics context.
    ///
    /// # Errors
    ///
    /// Same contract as [`Metadata::load`], minus the file read.
    pub fn from_text(
        text: &str,
        path: &Path,
        env: &EnvSnapshot,
        doc_mode: bool,
    ) -> Result<Self, Error> {
        let display_path = path.display().to_string();

        check_yaml_body(&display_path, text)?;

        let mut raw = block::extract(&display_path, text)?;
        for value in raw.values_mut() {
            *value = placeholder::substitute_file_placeholders(value, path);
        }

        let var_prefix = raw
            .get(fields::VAR_PREFIX_FIELD)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default();

        let layer = Layer::from_fields(&raw, path, env, doc_mode)?;

        let mut vars = IndexMap::new();
        for key in raw.keys() {
            if !fields::is_base_var_field(key) {
                continue;
            }
            let Some(short) = fields::base_var_name(key) else {
                continue;
            };
            let def = VarDef::from_fields(short, &raw, &var_prefix)?;
            vars.insert(def.name.clone(), def);
        }

        let split_list = |field: &str| -> Vec<String> {
            raw.get(field)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            required_vars: split_list(fields::VAR_REQUIRES),
            required_rules: split_list(fields::VAR_REQUIRES_VALID),
            optional_vars: split_list(fields::VAR_OPTIONAL),
            optional_rules: split_list(fields::VAR_OPTIONAL_VALID),
            path: path.to_path_buf(),
            display_path,
            raw,
            layer,
            vars,
            var_prefix,
        })
    }

    /// The source file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path as shown in diagnostics.
    #[must_use]
    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    /// The raw ordered field map, placeholders substituted.
    #[must_use]
    pub fn raw(&self) -> &IndexMap<String, String> {
        &self.raw
    }

    /// The parsed layer, when the file declares one.
    #[must_use]
    pub fn layer(&self) -> Option<&Layer> {
        self.layer.as_ref()
    }

    /// The per-variable definitions, keyed by fully qualified name.
    #[must_use]
    pub fn vars(&self) -> &IndexMap<String, VarDef> {
        &self.vars
    }

    /// The lowercased `X-Env-VarPrefix` value.
    #[must_use]
    pub fn var_prefix(&self) -> &str {
        &self.var_prefix
    }

    /// External variables this file requires (`X-Env-VarRequires`).
    #[must_use]
    pub fn required_vars(&self) -> &[String] {
        &self.required_vars
    }

    /// External variables this file optionally uses (`X-Env-VarOptional`).
    #[must_use]
    pub fn optional_vars(&self) -> &[String] {
        &self.optional_vars
    }

    /// Resolves this file's own definitions against the snapshot, with
    /// trigger injection.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors (unsupported trigger actions).
    pub fn resolved_vars(
        &self,
        env: &EnvSnapshot,
    ) -> Result<IndexMap<String, VarDef>, Error> {
        resolver::resolve(&self.singleton_definitions(), env)
    }

    fn singleton_definitions(&self) -> resolver::Definitions {
        self.vars
            .iter()
            .map(|(name, def)| (name.clone(), vec![def.clone()]))
            .collect()
    }

    fn unsupported_fields(&self) -> Vec<String> {
        self.raw
            .keys()
            .filter(|k| {
                (fields::is_var_field(k) || fields::is_layer_field(k))
                    && !fields::is_field_supported(k)
            })
            .cloned()
            .collect()
    }

    fn prefix_and_orphan_findings(&self) -> ValidationReport {
        let mut report = ValidationReport::new(&self.display_path);

        if !self.vars.is_empty() && self.var_prefix.is_empty() {
            report.insert_first("MISSING_VAR_PREFIX", Finding::MissingVarPrefix);
            return report;
        }

        let mut base_vars = Vec::new();
        let mut attr_vars = Vec::new();
        for key in self.raw.keys() {
            if !fields::is_var_field(key) || !fields::is_field_supported(key) {
                continue;
            }
            if fields::is_base_var_field(key) {
                if let Some(name) = fields::base_var_name(key) {
                    base_vars.push(name.to_lowercase());
                }
            } else if let Some((name, _)) = fields::split_var_attr(key) {
                attr_vars.push(name.to_lowercase());
            }
        }
        for var in attr_vars {
            if !base_vars.contains(&var) {
                report.insert_first(
                    format!("ORPHANED_ATTRS_{}", var.to_uppercase()),
                    Finding::OrphanedAttributes { var },
                );
            }
        }
        report
    }

    /// Schema-only lint: no environment reads, no value checks.
    #[must_use]
    pub fn lint(&self) -> ValidationReport {
        let mut report = ValidationReport::new(&self.display_path);

        if self.raw.is_empty() || !self.raw.keys().any(|k| k.starts_with("X-Env-")) {
            report.insert_first("NO_METADATA_FIELDS", Finding::NoMetadataFields);
            return report;
        }

        for field in self.unsupported_fields() {
            report.insert_first(
                format!("UNSUPPORTED_FIELD_{field}"),
                Finding::UnsupportedField { field },
            );
        }

        let has_layer_fields = self.raw.keys().any(|k| fields::is_layer_field(k));
        let layer_name = self
            .raw
            .get(fields::LAYER_NAME)
            .map(|v| v.trim())
            .unwrap_or_default();
        if has_layer_fields && layer_name.is_empty() {
            report.insert_first("MISSING_LAYER_NAME", Finding::MissingLayerName);
        }

        report.merge(self.prefix_and_orphan_findings());

        // Rule sanity, schema-only.
        for (field, rule) in &self.raw {
            if !fields::is_var_field(field) || !field.ends_with("-Valid") {
                continue;
            }
            let rule = rule.trim();
            if rule.is_empty() {
                continue;
            }
            if let Err(e) = Validator::parse(rule) {
                let var = fields::base_var_name(field).unwrap_or(field).to_string();
                report.insert_first(
                    format!("INVALID_RULE_{var}"),
                    Finding::InvalidRule {
                        var,
                        rule: rule.to_string(),
                        message: e.to_string(),
                    },
                );
            }
        }
        for (field, rules) in [
            (fields::VAR_REQUIRES_VALID, &self.required_rules),
            (fields::VAR_OPTIONAL_VALID, &self.optional_rules),
        ] {
            for (idx, rule) in rules.iter().enumerate() {
                if let Err(e) = Validator::parse(rule) {
                    report.insert_first(
                        format!("INVALID_RULE_{field}_{idx}"),
                        Finding::InvalidRule {
                            var: field.to_string(),
                            rule: rule.clone(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        report
    }

    /// Environment-aware validation of this file.
    ///
    /// Resolves the file's own definitions (including trigger injections)
    /// and checks defaults, environment values, the external requirement
    /// lists and conflict specs. Findings accumulate; nothing fails fast.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors (unsupported trigger actions).
    pub fn validate(&self, env: &EnvSnapshot) -> Result<ValidationReport, Error> {
        let mut report = ValidationReport::new(&self.display_path);

        let unsupported = self.unsupported_fields();
        if !unsupported.is_empty() {
            for field in unsupported {
                report.insert_first(
                    format!("UNSUPPORTED_FIELD_{field}"),
                    Finding::UnsupportedField { field },
                );
            }
            return Ok(report);
        }

        let prefix_report = self.prefix_and_orphan_findings();
        if !prefix_report.is_empty() {
            return Ok(prefix_report);
        }

        let resolved = self.resolved_vars(env)?;
        let injected = resolver::trigger_definitions(&resolved, env)?;

        // Validate the resolved winners plus injected definitions that did
        // not win, deduplicated, so invalid trigger values surface too.
        let mut seen = std::collections::HashSet::new();
        let mut all_defs: Vec<&VarDef> = Vec::new();
        for def in resolved.values() {
            let key = (def.name.clone(), def.value.clone(), def.policy, def.position);
            if seen.insert(key) {
                all_defs.push(def);
            }
        }
        for defs in injected.values() {
            for def in defs {
                let key = (def.name.clone(), def.value.clone(), def.policy, def.position);
                if seen.insert(key) {
                    all_defs.push(def);
                }
            }
        }

        for def in all_defs {
            self.validate_definition(def, env, &mut report);
        }

        self.validate_external_list(
            env,
            &self.required_vars,
            &self.required_rules,
            true,
            &mut report,
        );
        self.validate_external_list(
            env,
            &self.optional_vars,
            &self.optional_rules,
            false,
            &mut report,
        );

        for hit in resolver::conflict_hits(&resolved, env) {
            report.insert_first(
                format!("CONFLICT_{}_{}", hit.var_a, hit.var_b),
                Finding::Conflict {
                    var_a: hit.var_a,
                    var_b: hit.var_b,
                    value_a: hit.value_a,
                    value_b: hit.value_b,
                },
            );
        }

        Ok(report)
    }

    fn validate_definition(
        &self,
        def: &VarDef,
        env: &EnvSnapshot,
        report: &mut ValidationReport,
    ) {
        let name = def.name.clone();
        let current = env.get(&name);

        // Re-check the raw rule text so a rule that fails to parse is
        // reported against the variable even when resolution inherited no
        // validator.
        if !def.short.is_empty() {
            if let Some(rule) = self.raw.get(&fields::var_attr(&def.short, "-Valid")) {
                let rule = rule.trim();
                if !rule.is_empty() {
                    if let Err(e) = Validator::parse(rule) {
                        report.insert_error(
                            name.clone(),
                            Finding::InvalidRule {
                                var: name,
                                rule: rule.to_string(),
                                message: e.to_string(),
                            },
                        );
                        return;
                    }
                }
            }
        }

        if def.policy == SetPolicy::Lazy {
            if let Some(current) = current {
                if current != def.value {
                    report.insert_first(
                        name,
                        Finding::LazyOverridden {
                            var: def.name.clone(),
                            value: current.to_string(),
                        },
                    );
                    return;
                }
            }
        }

        if def.validator.is_some() && def.should_set() {
            let errors = def.validate_value(None);
            if !errors.is_empty() {
                report.insert_error(
                    name.clone(),
                    Finding::InvalidValue {
                        var: name.clone(),
                        value: def.value.clone(),
                        rule: def.rule_description(),
                    },
                );
            }
        }

        if def.required && current.is_none() {
            report.insert_first(name.clone(), Finding::MissingRequired { var: name });
        } else if let Some(current) = current {
            if def.validator.is_some() {
                let errors = def.validate_value(Some(current));
                report.insert_first(
                    name.clone(),
                    Finding::Validated {
                        var: name,
                        value: current.to_string(),
                        rule: def.rule_description(),
                        valid: errors.is_empty(),
                        errors,
                        required: def.required,
                    },
                );
            } else {
                report.insert_first(
                    name.clone(),
                    Finding::NoRule {
                        var: name,
                        value: current.to_string(),
                        required: def.required,
                    },
                );
            }
        } else {
            report.insert_first(name.clone(), Finding::Unset { var: name });
        }
    }

    fn validate_external_list(
        &self,
        env: &EnvSnapshot,
        vars: &[String],
        rules: &[String],
        required: bool,
        report: &mut ValidationReport,
    ) {
        let prefix = if required { "REQUIRED" } else { "OPTIONAL" };
        for (idx, var) in vars.iter().enumerate() {
            let key = format!("{prefix}_{var}");
            let rule = rules.get(idx).map(String::as_str).filter(|r| !r.is_empty());
            let Some(current) = env.get(var) else {
                if required {
                    report.insert_first(key, Finding::MissingRequiredVar { var: var.clone() });
                } else {
                    report.insert_first(key, Finding::OptionalUnset { var: var.clone() });
                }
                continue;
            };

            let Some(rule) = rule else {
                if required {
                    report.insert_first(
                        key,
                        Finding::RequiredNoRule {
                            var: var.clone(),
                            value: current.to_string(),
                        },
                    );
                } else {
                    report.insert_first(
                        key,
                        Finding::OptionalNoRule {
                            var: var.clone(),
                            value: current.to_string(),
                        },
                    );
                }
                continue;
            };

            match Validator::parse(rule) {
                Err(e) => report.insert_first(
                    key,
                    Finding::InvalidRule {
                        var: var.clone(),
                        rule: rule.to_string(),
                        message: e.to_string(),
                    },
                ),
                Ok(validator) => {
                    let errors = validator.validate(current);
                    if required {
                        report.insert_first(
                            key,
                            Finding::RequiredValidated {
                                var: var.clone(),
                                value: current.to_string(),
                                rule: rule.to_string(),
                                valid: errors.is_empty(),
                                errors,
                            },
                        );
                    } else {
                        report.insert_first(
                            key,
                            Finding::OptionalValidated {
                                var: var.clone(),
                                value: current.to_string(),
                                rule: rule.to_string(),
                                valid: errors.is_empty(),
                            },
                        );
                    }
                }
            }
        }
    }
}

/// Checks the file's YAML body for well-formedness. The body is opaque to
/// the pipeline; only files with non-comment content are parsed.
fn check_yaml_body(path: &str, text: &str) -> Result<(), Error> {
    let has_content = text
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#'));
    if !has_content {
        return Ok(());
    }
    let parsed: Result<serde_json::Value, _> = serde_saphyr::from_str(text);
    parsed.map(|_| ()).map_err(|e| Error::YamlBody {
        path: path.to_string(),
        message: e.to_string(),
    })
}
