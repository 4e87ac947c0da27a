//! Variable definitions and the grammars attached to them.
//!
//! A layer contributes one [`VarDef`] per `X-Env-Var-<NAME>` field. The
//! definition carries the default value plus everything the resolver needs:
//! the set policy, the validation rule, trigger rules and conflict specs.

use std::fmt::{self, Display, Formatter};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::Error;
use crate::metadata::fields;
use crate::validator::Validator;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"));

/// True when `name` is a POSIX-style variable identifier.
#[must_use]
pub fn is_valid_ident(name: &str) -> bool {
    IDENT.is_match(name)
}

/// Fully qualifies a short variable name: `IGconf_<prefix>_<short>` unless
/// the short name already begins with `IGconf_` or no prefix is set.
#[must_use]
pub fn qualified_name(prefix: &str, short: &str) -> String {
    if short.starts_with("IGconf_") || prefix.is_empty() {
        short.to_string()
    } else {
        format!("IGconf_{prefix}_{}", short.to_lowercase())
    }
}

/// Where a definition sits in the build order.
///
/// `layer` is the build-order slot of the defining layer; `sub` is zero for
/// declared definitions. Trigger injections take `sub = parent.sub + 1` so
/// they sort just after their source without ever colliding with a declared
/// definition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Build-order index of the defining layer.
    pub layer: u32,
    /// Sub-slot for trigger injections.
    pub sub: u32,
}

impl Position {
    /// A declared definition at build-order slot `layer`.
    #[must_use]
    pub const fn new(layer: u32) -> Self {
        Self { layer, sub: 0 }
    }

    /// The slot used by a definition injected from this position.
    #[must_use]
    pub const fn child(self) -> Self {
        Self {
            layer: self.layer,
            sub: self.sub + 1,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.layer, self.sub)
    }
}

/// Per-variable directive selecting which competing definition wins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SetPolicy {
    /// Set as soon as possible; first definition wins unless the variable
    /// is already in the environment.
    #[default]
    Immediate,
    /// Set late; last definition wins unless already in the environment.
    Lazy,
    /// Always set, overriding the environment.
    Force,
    /// Never set; kept only so required-variable validation still applies.
    Skip,
    /// Synthesized for variables whose value came from the environment.
    AlreadySet,
}

impl SetPolicy {
    /// Parses a `-Set` field value. `false/0/no/n` mean skip, `lazy` and
    /// `force` select those policies, anything else (including an absent
    /// field) means immediate.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return SetPolicy::Immediate;
        };
        match raw.trim().to_lowercase().as_str() {
            "false" | "0" | "no" | "n" => SetPolicy::Skip,
            "lazy" => SetPolicy::Lazy,
            "force" => SetPolicy::Force,
            _ => SetPolicy::Immediate,
        }
    }

    /// The canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SetPolicy::Immediate => "immediate",
            SetPolicy::Lazy => "lazy",
            SetPolicy::Force => "force",
            SetPolicy::Skip => "skip",
            SetPolicy::AlreadySet => "already_set",
        }
    }
}

impl Display for SetPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conditional rule that sets another variable when this one matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TriggerRule {
    /// Fire only when the source variable's effective value equals this.
    /// `None` means unconditional.
    pub condition: Option<String>,
    /// The action keyword; only `set` is supported.
    pub action: String,
    /// The target variable name.
    pub target: String,
    /// The value to set.
    pub value: String,
    /// The policy the injected definition carries.
    pub policy: SetPolicy,
}

/// Parses the newline-separated trigger rules of one variable.
///
/// Each line is `when=VALUE set TARGET=VAL [policy=...]` or
/// `set TARGET=VAL [policy=...]`.
///
/// # Errors
///
/// Returns [`Error::InvalidTrigger`] for missing conditions, unknown action
/// keywords, missing targets and non-identifier target names.
pub fn parse_trigger_rules(raw: &str, var: &str) -> Result<Vec<TriggerRule>, Error> {
    let invalid = |line: &str, message: &str| Error::InvalidTrigger {
        var: var.to_string(),
        line: line.to_string(),
        message: message.to_string(),
    };

    let mut rules = Vec::new();
    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (condition, action, args) = if let Some(cond) = tokens
            .first()
            .and_then(|t| t.strip_prefix("when="))
        {
            let cond = cond.trim();
            if cond.is_empty() {
                return Err(invalid(line, "missing value in when="));
            }
            let Some(action) = tokens.get(1) else {
                return Err(invalid(line, "missing an action keyword"));
            };
            (Some(cond.to_string()), *action, &tokens[2..])
        } else {
            let Some(action) = tokens.first() else {
                continue;
            };
            (None, *action, &tokens[1..])
        };

        if action != "set" {
            return Err(invalid(line, &format!("invalid trigger action '{action}'")));
        }
        let Some(target_token) = args.first() else {
            return Err(invalid(line, "missing args for 'set'"));
        };
        let Some((target, value)) = target_token.split_once('=') else {
            return Err(invalid(line, "'set' must start with TARGET=VALUE"));
        };
        let (target, value) = (target.trim(), value.trim());
        if target.is_empty() {
            return Err(invalid(line, "missing target variable name"));
        }
        if !is_valid_ident(target) {
            return Err(invalid(
                line,
                &format!("invalid target '{target}' (must be POSIX var name)"),
            ));
        }

        let mut policy = SetPolicy::Immediate;
        for token in &args[1..] {
            if let Some(p) = token.strip_prefix("policy=") {
                policy = SetPolicy::parse(Some(p));
            }
        }

        rules.push(TriggerRule {
            condition,
            action: action.to_string(),
            target: target.to_string(),
            value: value.to_string(),
            policy,
        });
    }
    Ok(rules)
}

/// Comparison operator inside a conflict spec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictOp {
    /// Conflict when the other side equals the value.
    Eq,
    /// Conflict when the other side differs from the value.
    Ne,
}

impl Display for ConflictOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConflictOp::Eq => f.write_str("="),
            ConflictOp::Ne => f.write_str("!="),
        }
    }
}

/// A parsed conflict declaration.
///
/// `name` is the fully qualified other side. With no operator the conflict
/// fires whenever both sides are effectively set; with one, the other
/// side's effective value is compared against `value`. A `when` value makes
/// the whole spec conditional on the declaring variable's own value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConflictSpec {
    /// Fully qualified name of the conflicting variable.
    pub name: String,
    /// Optional comparison operator.
    pub op: Option<ConflictOp>,
    /// Comparison value; present exactly when `op` is.
    pub value: Option<String>,
    /// Condition on the declaring variable's effective value.
    pub when: Option<String>,
}

impl ConflictSpec {
    /// True when the spec only applies under some condition.
    #[must_use]
    pub fn is_conditional(&self) -> bool {
        self.op.is_some() || self.when.is_some()
    }
}

impl Display for ConflictSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(when) = &self.when {
            write!(f, "when={when} ")?;
        }
        f.write_str(&self.name)?;
        if let (Some(op), Some(value)) = (self.op, &self.value) {
            write!(f, "{op}{value}")?;
        }
        Ok(())
    }
}

/// Parses the comma- and newline-separated conflict specs of one variable.
///
/// # Errors
///
/// Returns [`Error::InvalidConflict`] for unsupported operators, missing
/// names or values and names that do not qualify to valid identifiers.
pub fn parse_conflicts(raw: &str, prefix: &str, var: &str) -> Result<Vec<ConflictSpec>, Error> {
    let mut specs = Vec::new();
    for line in raw.lines() {
        for spec in line.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            specs.push(parse_conflict(spec, prefix, var)?);
        }
    }
    Ok(specs)
}

fn parse_conflict(spec: &str, prefix: &str, var: &str) -> Result<ConflictSpec, Error> {
    let invalid = |message: &str| Error::InvalidConflict {
        var: var.to_string(),
        spec: spec.to_string(),
        message: message.to_string(),
    };

    let mut when = None;
    let mut body = spec;
    if body.starts_with("when=") {
        let Some((head, tail)) = body.split_once(char::is_whitespace) else {
            return Err(invalid("missing condition after precursor"));
        };
        let value = head.strip_prefix("when=").unwrap_or_default().trim();
        if value.is_empty() {
            return Err(invalid("missing precursor value"));
        }
        when = Some(value.to_string());
        body = tail.trim();
        if body.is_empty() {
            return Err(invalid("invalid condition after precursor"));
        }
    }

    let (name_part, op, value) = if let Some((name, value)) = body.split_once("!=") {
        (name, Some(ConflictOp::Ne), Some(value))
    } else if let Some((name, value)) = body.split_once('=') {
        (name, Some(ConflictOp::Eq), Some(value))
    } else {
        (body, None, None)
    };

    let name_part = name_part.trim();
    let value = value.map(str::trim);
    if let Some(value) = value {
        if value.contains('=') || value.contains('!') {
            return Err(invalid("unsupported operator"));
        }
        if name_part.is_empty() || value.is_empty() {
            return Err(invalid("missing name or value"));
        }
    } else if name_part.contains('!') {
        return Err(invalid("unsupported operator"));
    }

    let name = qualified_name(prefix, name_part);
    if !is_valid_ident(&name) {
        return Err(invalid("invalid variable name"));
    }

    Ok(ConflictSpec {
        name,
        op,
        value: value.map(str::to_string),
        when,
    })
}

/// One definition of an environment variable, as contributed by a layer.
#[derive(Clone, Debug)]
pub struct VarDef {
    /// Fully qualified name (`IGconf_<prefix>_<short>`).
    pub name: String,
    /// The short name as written in the metadata, lowercased.
    pub short: String,
    /// The default value.
    pub value: String,
    /// Free-text description.
    pub description: String,
    /// Whether validation requires the variable to be set.
    pub required: bool,
    /// Parsed validation rule, if any.
    pub validator: Option<Validator>,
    /// The original rule text.
    pub rule: String,
    /// Which competing definition wins.
    pub policy: SetPolicy,
    /// The layer that contributed this definition.
    pub source_layer: String,
    /// Slot in the build order; see [`Position`].
    pub position: Position,
    /// Optional anchor this variable binds (`@NAME`).
    pub anchor: Option<String>,
    /// Trigger rules declared on this variable.
    pub triggers: Vec<TriggerRule>,
    /// Conflict specs declared on this variable.
    pub conflicts: Vec<ConflictSpec>,
}

impl VarDef {
    /// Builds a definition from the metadata fields of one layer file.
    ///
    /// `short` is the variable name as it appears after `X-Env-Var-`;
    /// attribute lookups are case-insensitive on the field name.
    ///
    /// # Errors
    ///
    /// Returns schema/parse errors for invalid rules, anchors, triggers and
    /// conflict specs.
    pub fn from_fields(
        short: &str,
        fields_map: &IndexMap<String, String>,
        prefix: &str,
    ) -> Result<Self, Error> {
        if !is_valid_ident(short) {
            return Err(Error::InvalidVariableName {
                var: short.to_string(),
            });
        }

        let value = field_value(fields_map, &fields::var_base(short))
            .unwrap_or_default()
            .to_string();
        let description = field_value(fields_map, &fields::var_attr(short, "-Desc"))
            .unwrap_or_default()
            .to_string();

        let required = field_value(fields_map, &fields::var_attr(short, "-Required"))
            .is_some_and(|raw| {
                matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "y")
            });

        let rule = field_value(fields_map, &fields::var_attr(short, "-Valid"))
            .unwrap_or_default()
            .trim()
            .to_string();
        let validator = if rule.is_empty() {
            None
        } else {
            Some(
                Validator::parse(&rule).map_err(|e| Error::InvalidRule {
                    var: short.to_string(),
                    rule: rule.clone(),
                    message: e.to_string(),
                })?,
            )
        };

        let policy = SetPolicy::parse(field_value(fields_map, &fields::var_attr(short, "-Set")));

        let anchor_raw = field_value(fields_map, &fields::var_attr(short, "-Anchor"))
            .unwrap_or_default()
            .trim()
            .to_string();
        let anchor = if anchor_raw.is_empty() {
            None
        } else if anchor_raw.starts_with('@') {
            Some(anchor_raw)
        } else {
            return Err(Error::InvalidAnchor {
                var: short.to_string(),
                anchor: anchor_raw,
            });
        };

        let triggers_raw = field_value(fields_map, &fields::var_attr(short, "-Triggers"))
            .unwrap_or_default()
            .to_string();
        let triggers = if triggers_raw.is_empty() {
            Vec::new()
        } else {
            parse_trigger_rules(&triggers_raw, short)?
        };

        let conflicts_raw = field_value(fields_map, &fields::var_attr(short, "-Conflicts"))
            .unwrap_or_default()
            .to_string();
        let conflicts = if conflicts_raw.is_empty() {
            Vec::new()
        } else {
            parse_conflicts(&conflicts_raw, prefix, short)?
        };

        Ok(Self {
            name: qualified_name(prefix, short),
            short: short.to_lowercase(),
            value,
            description,
            required,
            validator,
            rule,
            policy,
            source_layer: String::new(),
            position: Position::default(),
            anchor,
            triggers,
            conflicts,
        })
    }

    /// Re-tags a definition with its build-order slot. Used when layers are
    /// collected into the pipeline's per-name definition lists.
    #[must_use]
    pub fn at(mut self, layer: &str, position: Position) -> Self {
        self.source_layer = layer.to_string();
        self.position = position;
        self
    }

    /// Validates a value (the default when `None`) against the rule.
    #[must_use]
    pub fn validate_value(&self, value: Option<&str>) -> Vec<String> {
        match &self.validator {
            Some(validator) => validator.validate(value.unwrap_or(&self.value)),
            None => vec![],
        }
    }

    /// A human-readable description of the validation rule.
    #[must_use]
    pub fn rule_description(&self) -> String {
        self.validator
            .as_ref()
            .map_or_else(|| "No validation rule".to_string(), Validator::describe)
    }

    /// Whether this definition may write the environment at all.
    #[must_use]
    pub fn should_set(&self) -> bool {
        self.policy != SetPolicy::Skip
    }

    /// True when the value is empty and the rule says empty means unset.
    #[must_use]
    pub fn suppresses_empty_write(&self) -> bool {
        self.value.trim().is_empty()
            && self.validator.as_ref().is_some_and(Validator::allow_unset)
    }
}

fn field_value<'a>(fields_map: &'a IndexMap<String, String>, key: &str) -> Option<&'a str> {
    if let Some(value) = fields_map.get(key) {
        return Some(value);
    }
    let lower = key.to_lowercase();
    fields_map
        .iter()
        .find(|(k, _)| k.to_lowercase() == lower)
        .map(|(_, v)| v.as_str())
}
