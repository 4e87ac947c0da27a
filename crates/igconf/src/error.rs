//! Error types for the layer/variable pipeline.
//!
//! This module contains the [`Error`] enum and related functionality for
//! handling pipeline errors with rich diagnostics via [`miette`].
//!
//! # Error Families
//!
//! | Code prefix | When it occurs |
//! |-------------|----------------|
//! | `igconf::schema::*` | Unsupported field, malformed header, missing prefix, orphaned attribute, invalid validator syntax |
//! | `igconf::parse::*` | Unresolved placeholder, malformed trigger/conflict spec, invalid layer type |
//! | `igconf::graph::*` | Missing dependency, cycle, provider conflict, duplicate layer name |
//! | `igconf::validation::*` | Missing required variable, invalid value, conflict violation |
//! | `igconf::resolve::*` | Undefined `${...}` reference, circular reference, unbound anchor |
//! | `igconf::generator::*` | Dynamic-layer generator missing or failed |
//!
//! # Error Accumulation
//!
//! Validation does not fail on the first problem. Findings are collected and
//! wrapped in [`Error::Multiple`] so users see every issue at once:
//!
//! ```rust
//! use igconf::Error;
//!
//! let errors = vec![
//!     Error::MissingRequired { var: "IGconf_app_port".into(), layer: "app".into() },
//!     Error::UndefinedVariable { name: "IGconf_app_host".into() },
//! ];
//! let combined = Error::multiple(errors).unwrap();
//! assert!(matches!(combined, Error::Multiple { .. }));
//! ```

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error as ThisError;

/// Errors that can occur while loading layers, resolving variables or
/// emitting the pipeline outputs.
///
/// Each variant carries a unique diagnostic code and the file or variable
/// context needed to locate the problem. For fancy formatted output, wrap
/// the error in a `miette::Report`.
#[derive(Debug, Diagnostic, ThisError)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────
    // Schema errors
    // ─────────────────────────────────────────────────────────────────────
    /// A header field is not part of the supported `X-Env-*` schema.
    #[error("{path}: unsupported field '{field}'")]
    #[diagnostic(
        code(igconf::schema::unsupported_field),
        help("run `igconf metadata --help-validation` for the supported field list")
    )]
    UnsupportedField {
        /// File the field was found in.
        path: String,
        /// The offending field name.
        field: String,
    },

    /// The metadata block is not well-formed RFC822-style text.
    #[error("{path}: malformed metadata header: {message}")]
    #[diagnostic(
        code(igconf::schema::malformed_header),
        help("continuation lines must start with a space or tab; field names may contain only letters, numbers, hyphens and underscores")
    )]
    MalformedHeader {
        /// File the header came from.
        path: String,
        /// What exactly was wrong.
        message: String,
    },

    /// `X-Env-Var-*` fields are defined but `X-Env-VarPrefix` is missing.
    #[error("{path}: X-Env-Var-* fields are defined but X-Env-VarPrefix is missing")]
    #[diagnostic(
        code(igconf::schema::missing_var_prefix),
        help("environment variables require a valid prefix")
    )]
    MissingVarPrefix {
        /// File missing the prefix.
        path: String,
    },

    /// Attribute fields exist for a variable with no base definition.
    #[error("{path}: found attribute fields for variable '{var}' but no base X-Env-Var-{var} definition")]
    #[diagnostic(code(igconf::schema::orphaned_attributes))]
    OrphanedAttributes {
        /// File the orphans were found in.
        path: String,
        /// The variable short name.
        var: String,
    },

    /// A validation rule expression could not be parsed.
    #[error("invalid validation rule '{rule}' for variable {var}: {message}")]
    #[diagnostic(code(igconf::schema::invalid_rule))]
    InvalidRule {
        /// Variable the rule belongs to.
        var: String,
        /// The rule expression as written.
        rule: String,
        /// Parser detail.
        message: String,
    },

    /// `X-Env-Layer-*` fields are present but the layer has no name.
    #[error("{path}: X-Env-Layer-* fields present but X-Env-Layer-Name is missing")]
    #[diagnostic(code(igconf::schema::missing_layer_name))]
    MissingLayerName {
        /// File with the incomplete layer block.
        path: String,
    },

    /// The file contains data but no `X-Env-*` metadata fields.
    #[error("{path}: no X-Env-* metadata fields found")]
    #[diagnostic(code(igconf::schema::no_metadata_fields))]
    NoMetadataFields {
        /// File that was inspected.
        path: String,
    },

    /// The free-form YAML body after the metadata block is not valid YAML.
    #[error("{path}: failed to parse YAML body: {message}")]
    #[diagnostic(code(igconf::schema::yaml_body))]
    YamlBody {
        /// File with the broken body.
        path: String,
        /// Parser detail.
        message: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Parse errors
    // ─────────────────────────────────────────────────────────────────────
    /// `${VAR}` placeholders could not be expanded from the environment.
    #[error("unresolved environment variables: {}", names.join(", "))]
    #[diagnostic(
        code(igconf::parse::unresolved_placeholders),
        help("set the referenced variables or load the file in doc mode")
    )]
    UnresolvedPlaceholders {
        /// The unresolved variable names, sorted.
        names: Vec<String>,
    },

    /// A trigger rule line could not be parsed.
    #[error("trigger rule '{line}' for {var}: {message}")]
    #[diagnostic(
        code(igconf::parse::invalid_trigger),
        help("expected 'when=VALUE set TARGET=VAL [policy=...]' or 'set TARGET=VAL [policy=...]'")
    )]
    InvalidTrigger {
        /// Variable declaring the trigger.
        var: String,
        /// The offending line.
        line: String,
        /// Parser detail.
        message: String,
    },

    /// A conflict spec could not be parsed.
    #[error("invalid conflict expr '{spec}' for {var}: {message}")]
    #[diagnostic(
        code(igconf::parse::invalid_conflict),
        help("expected 'VAR', 'VAR=value', 'VAR!=value', optionally prefixed with 'when=<self-value> '")
    )]
    InvalidConflict {
        /// Variable declaring the conflict.
        var: String,
        /// The spec as written.
        spec: String,
        /// Parser detail.
        message: String,
    },

    /// A variable short name is not a valid identifier.
    #[error("invalid variable name '{var}' (must match [A-Za-z_][A-Za-z0-9_]*)")]
    #[diagnostic(code(igconf::parse::invalid_variable_name))]
    InvalidVariableName {
        /// The rejected short name.
        var: String,
    },

    /// An anchor field value does not start with `@`.
    #[error("invalid anchor '{anchor}' for variable {var}: anchors must start with '@'")]
    #[diagnostic(code(igconf::parse::invalid_anchor))]
    InvalidAnchor {
        /// Variable carrying the anchor.
        var: String,
        /// The rejected anchor text.
        anchor: String,
    },

    /// A layer declared a type other than `static` or `dynamic`.
    #[error("{path}: invalid layer type '{value}'")]
    #[diagnostic(code(igconf::parse::invalid_layer_type))]
    InvalidLayerType {
        /// File declaring the layer.
        path: String,
        /// The rejected type string.
        value: String,
    },

    /// A dependency token is not a valid layer name.
    #[error("invalid dependency token '{token}': {message}")]
    #[diagnostic(code(igconf::parse::invalid_dependency))]
    InvalidDependency {
        /// The rejected token.
        token: String,
        /// Why it was rejected.
        message: String,
    },

    /// A JSON payload could not be serialized.
    #[error("failed to serialize {what}: {message}")]
    #[diagnostic(code(igconf::serialize))]
    Serialize {
        /// What was being serialized.
        what: &'static str,
        /// Serializer detail.
        message: String,
    },

    /// An I/O operation on a named path failed.
    #[error("failed to access {path}")]
    #[diagnostic(code(igconf::io))]
    Io {
        /// The path involved.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Graph errors
    // ─────────────────────────────────────────────────────────────────────
    /// Two search roots were given the same tag.
    #[error("duplicate layer path tag '{tag}'")]
    #[diagnostic(code(igconf::graph::duplicate_tag))]
    DuplicateTag {
        /// The repeated tag.
        tag: String,
    },

    /// Two layer files declare the same layer name.
    #[error("duplicate layer name '{name}' found in:\n  {first}\n  {second}")]
    #[diagnostic(code(igconf::graph::duplicate_layer))]
    DuplicateLayer {
        /// The repeated layer name.
        name: String,
        /// First file declaring it.
        first: String,
        /// Second file declaring it.
        second: String,
    },

    /// A requested layer does not exist in any search root.
    #[error("layer '{name}' not found")]
    #[diagnostic(code(igconf::graph::layer_not_found))]
    LayerNotFound {
        /// The requested identifier.
        name: String,
    },

    /// A layer exists but failed to load; the captured reason is replayed.
    #[error("layer '{name}' unavailable: {reason}")]
    #[diagnostic(code(igconf::graph::layer_unavailable))]
    LayerUnavailable {
        /// The layer or file identifier.
        name: String,
        /// The recorded load failure.
        reason: String,
    },

    /// A transitive required dependency is absent.
    #[error("missing required dependency: {name}")]
    #[diagnostic(code(igconf::graph::missing_dependency))]
    MissingDependency {
        /// The absent layer name.
        name: String,
    },

    /// The dependency graph contains a cycle.
    #[error("circular dependency detected: {chain}")]
    #[diagnostic(code(igconf::graph::cycle))]
    CircularDependency {
        /// The cycle as `a -> b -> a`.
        chain: String,
    },

    /// Two layers in the same build order provide the same capability.
    #[error("provider conflict: '{capability}' is provided by multiple layers: {first}, {second}")]
    #[diagnostic(code(igconf::graph::provider_conflict))]
    ProviderConflict {
        /// The capability string.
        capability: String,
        /// First providing layer.
        first: String,
        /// Second providing layer.
        second: String,
    },

    /// A required capability has no provider in the build order.
    #[error("layer '{layer}' requires provider '{capability}' but no layer in the dependency chain provides it")]
    #[diagnostic(code(igconf::graph::unsatisfied_provider))]
    UnsatisfiedProvider {
        /// The requiring layer.
        layer: String,
        /// The unsatisfied capability.
        capability: String,
    },

    /// A dynamic layer was found but no `DYNlayer` output root was supplied.
    #[error("dynamic layer requested but DYNlayer tag not provided in path")]
    #[diagnostic(
        code(igconf::graph::missing_dyn_root),
        help("add 'DYNlayer=/path/to/generated' to the search paths")
    )]
    MissingDynRoot,

    // ─────────────────────────────────────────────────────────────────────
    // Validation errors
    // ─────────────────────────────────────────────────────────────────────
    /// A required variable has no value.
    #[error("required variable {var} is not set (layer: {layer})")]
    #[diagnostic(code(igconf::validation::missing_required))]
    MissingRequired {
        /// The fully qualified variable name.
        var: String,
        /// The layer requiring it.
        layer: String,
    },

    /// A value does not satisfy its validation rule.
    #[error("variable {var} has invalid value: {value}{detail}")]
    #[diagnostic(code(igconf::validation::invalid_value))]
    InvalidValue {
        /// The fully qualified variable name.
        var: String,
        /// The rejected value.
        value: String,
        /// Extra context (rule description or validator messages).
        detail: String,
    },

    /// Two conflicting variables are both effectively set.
    #[error("variables '{var_a}' and '{var_b}' conflict and both are set")]
    #[diagnostic(code(igconf::validation::conflict))]
    Conflict {
        /// The declaring variable.
        var_a: String,
        /// The other side of the conflict.
        var_b: String,
        /// Effective value of the declaring variable.
        value_a: String,
        /// Effective value of the other side.
        value_b: String,
    },

    /// Multiple pipeline errors occurred.
    ///
    /// Uses miette's `#[related]` to render all errors together in a
    /// visually grouped format.
    #[error("{} error(s) occurred", errors.len())]
    #[diagnostic(
        code(igconf::validation::multiple),
        help("fix all listed errors")
    )]
    Multiple {
        /// All accumulated errors.
        #[related]
        errors: Vec<Error>,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Resolution errors
    // ─────────────────────────────────────────────────────────────────────
    /// An env-file line is not a valid assignment.
    #[error("{path}:{line}: {message}")]
    #[diagnostic(
        code(igconf::resolve::assignment),
        help("expected one NAME=value per line; names match [A-Za-z_][A-Za-z0-9_]*")
    )]
    Assignment {
        /// The env file.
        path: String,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// A `${VAR}` reference names a variable that exists nowhere.
    #[error("undefined variable '{name}'")]
    #[diagnostic(code(igconf::resolve::undefined_variable))]
    UndefinedVariable {
        /// The referenced name.
        name: String,
    },

    /// A variable expands to itself through nested references.
    #[error("circular reference detected: {chain}")]
    #[diagnostic(code(igconf::resolve::circular_reference))]
    CircularReference {
        /// The chain as `A -> B -> A`.
        chain: String,
    },

    /// A `${...}` token is neither a variable name nor an anchor.
    #[error("invalid reference '${{{token}}}' in {owner}")]
    #[diagnostic(code(igconf::resolve::invalid_reference))]
    InvalidReference {
        /// The token inside the braces.
        token: String,
        /// The assignment containing the reference.
        owner: String,
    },

    /// An anchor was referenced but carries neither a value nor a binding.
    #[error("anchor {anchor} has no assigned value")]
    #[diagnostic(code(igconf::resolve::anchor_unassigned))]
    AnchorUnassigned {
        /// The normalized anchor name.
        anchor: String,
    },

    /// An anchor is already bound to a different variable.
    #[error("anchor {anchor} already bound to {bound}")]
    #[diagnostic(code(igconf::resolve::anchor_rebound))]
    AnchorRebound {
        /// The normalized anchor name.
        anchor: String,
        /// The existing binding.
        bound: String,
        /// The rejected new binding.
        requested: String,
    },

    /// An anchor name was empty after trimming.
    #[error("anchor name cannot be empty")]
    #[diagnostic(code(igconf::resolve::empty_anchor))]
    EmptyAnchorName,

    /// An anchor manifest file did not have the expected shape.
    #[error("{path}: invalid anchor manifest: {message}")]
    #[diagnostic(code(igconf::resolve::invalid_manifest))]
    InvalidManifest {
        /// The manifest file.
        path: String,
        /// What was wrong.
        message: String,
    },

    /// A trigger fired with an action other than `set`.
    #[error("unsupported trigger action '{action}' for variable '{var}'")]
    #[diagnostic(code(igconf::resolve::trigger_action))]
    UnsupportedTriggerAction {
        /// The variable whose trigger fired.
        var: String,
        /// The unsupported action keyword.
        action: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Generator errors
    // ─────────────────────────────────────────────────────────────────────
    /// The generator command string was empty or unparseable.
    #[error("generator command for layer '{layer}' is empty or malformed")]
    #[diagnostic(code(igconf::generator::invalid_command))]
    GeneratorCommand {
        /// The dynamic layer.
        layer: String,
    },

    /// A layer is marked dynamic but declares no generator.
    #[error("layer '{layer}' marked dynamic but no X-Env-Layer-Generator specified")]
    #[diagnostic(code(igconf::generator::missing))]
    MissingGenerator {
        /// The dynamic layer.
        layer: String,
    },

    /// The generator executable could not be found.
    #[error("generator '{command}' for layer '{layer}' not found")]
    #[diagnostic(code(igconf::generator::not_found))]
    GeneratorNotFound {
        /// The dynamic layer.
        layer: String,
        /// The command as written in the metadata.
        command: String,
    },

    /// The generator ran but exited unsuccessfully.
    #[error("generator '{command}' for layer '{layer}' failed with exit code {code}")]
    #[diagnostic(code(igconf::generator::failed))]
    GeneratorFailed {
        /// The dynamic layer.
        layer: String,
        /// The command as written in the metadata.
        command: String,
        /// Exit code, or `signal` when terminated by a signal.
        code: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Constructor helpers for ergonomic error creation
// ─────────────────────────────────────────────────────────────────────────────

impl Error {
    /// Collects multiple errors into a single `Multiple` error.
    /// Returns `None` if the input is empty; a single error is unwrapped
    /// instead of being wrapped.
    #[must_use]
    pub fn multiple(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else if errors.len() == 1 {
            errors.into_iter().next()
        } else {
            Some(Error::Multiple { errors })
        }
    }

    /// Creates an `Io` error carrying the path that was being accessed.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Renders a reference chain as `a -> b -> c`.
    #[must_use]
    pub fn chain(path: &[String]) -> String {
        path.join(" -> ")
    }

    /// True for the load failures that discovery records as a skip rather
    /// than a hard per-file error (unresolved `${VAR}` placeholders).
    #[must_use]
    pub fn is_unresolved_placeholder(&self) -> bool {
        matches!(self, Error::UnresolvedPlaceholders { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_empty_returns_none() {
        assert!(Error::multiple(vec![]).is_none());
    }

    #[test]
    fn multiple_single_unwraps() {
        let err = Error::multiple(vec![Error::LayerNotFound {
            name: "base".into(),
        }])
        .unwrap();
        assert!(matches!(err, Error::LayerNotFound { .. }));
    }

    #[test]
    fn multiple_wraps_several() {
        let err = Error::multiple(vec![
            Error::LayerNotFound { name: "a".into() },
            Error::LayerNotFound { name: "b".into() },
        ])
        .unwrap();
        if let Error::Multiple { errors } = err {
            assert_eq!(errors.len(), 2);
        } else {
            panic!("expected Multiple variant");
        }
    }

    #[test]
    fn unsatisfied_provider_message() {
        let err = Error::UnsatisfiedProvider {
            layer: "app".into(),
            capability: "db".into(),
        };
        assert_eq!(
            err.to_string(),
            "layer 'app' requires provider 'db' but no layer in the dependency chain provides it"
        );
    }

    #[test]
    fn chain_rendering() {
        let chain = Error::chain(&["A".into(), "B".into(), "A".into()]);
        assert_eq!(chain, "A -> B -> A");
    }
}
