//! Canonical `X-Env-*` field names and the closed supported-field schema.
//!
//! Field names are constructed through the helpers here so the spelling is
//! consistent everywhere: variable names are upper-cased inside field
//! names, attribute suffixes come from [`ATTR_SUFFIXES`].

/// Prefix of every per-variable field.
pub const VAR_PREFIX: &str = "X-Env-Var-";
/// Prefix of every layer field.
pub const LAYER_PREFIX: &str = "X-Env-Layer-";

/// The variable-prefix field.
pub const VAR_PREFIX_FIELD: &str = "X-Env-VarPrefix";
/// Environment variables required by a layer.
pub const VAR_REQUIRES: &str = "X-Env-VarRequires";
/// Validation rules for [`VAR_REQUIRES`], positionally aligned.
pub const VAR_REQUIRES_VALID: &str = "X-Env-VarRequires-Valid";
/// Optional environment variables used by a layer.
pub const VAR_OPTIONAL: &str = "X-Env-VarOptional";
/// Validation rules for [`VAR_OPTIONAL`], positionally aligned.
pub const VAR_OPTIONAL_VALID: &str = "X-Env-VarOptional-Valid";

/// Layer name identifier.
pub const LAYER_NAME: &str = "X-Env-Layer-Name";
/// Layer description.
pub const LAYER_DESC: &str = "X-Env-Layer-Desc";
/// Layer version.
pub const LAYER_VERSION: &str = "X-Env-Layer-Version";
/// Layer category.
pub const LAYER_CATEGORY: &str = "X-Env-Layer-Category";
/// Required layer dependencies.
pub const LAYER_REQUIRES: &str = "X-Env-Layer-Requires";
/// Capabilities provided by a layer.
pub const LAYER_PROVIDES: &str = "X-Env-Layer-Provides";
/// Capabilities required from some provider.
pub const LAYER_REQUIRES_PROVIDER: &str = "X-Env-Layer-RequiresProvider";
/// Conflicting layers.
pub const LAYER_CONFLICTS: &str = "X-Env-Layer-Conflicts";
/// Layer type (`static` or `dynamic`).
pub const LAYER_TYPE: &str = "X-Env-Layer-Type";
/// Generator executable for dynamic layers.
pub const LAYER_GENERATOR: &str = "X-Env-Layer-Generator";

/// Attribute suffixes a base variable definition may carry.
pub const ATTR_SUFFIXES: &[&str] = &[
    "-Desc",
    "-Required",
    "-Valid",
    "-Set",
    "-Anchor",
    "-Conflicts",
    "-Triggers",
];

const SINGLE_FIELDS: &[&str] = &[
    VAR_PREFIX_FIELD,
    VAR_REQUIRES,
    VAR_REQUIRES_VALID,
    VAR_OPTIONAL,
    VAR_OPTIONAL_VALID,
    LAYER_NAME,
    LAYER_DESC,
    LAYER_VERSION,
    LAYER_CATEGORY,
    LAYER_REQUIRES,
    LAYER_PROVIDES,
    LAYER_REQUIRES_PROVIDER,
    LAYER_CONFLICTS,
    LAYER_TYPE,
    LAYER_GENERATOR,
];

/// Base variable field: `X-Env-Var-<NAME>`.
#[must_use]
pub fn var_base(name: &str) -> String {
    format!("{VAR_PREFIX}{}", name.to_uppercase())
}

/// Attribute field: `X-Env-Var-<NAME><suffix>`, e.g. `-Desc`.
#[must_use]
pub fn var_attr(name: &str, suffix: &str) -> String {
    format!("{VAR_PREFIX}{}{suffix}", name.to_uppercase())
}

/// True for any `X-Env-Var-*` field.
#[must_use]
pub fn is_var_field(field: &str) -> bool {
    field.starts_with(VAR_PREFIX)
}

/// True for any `X-Env-Layer-*` field.
#[must_use]
pub fn is_layer_field(field: &str) -> bool {
    field.starts_with(LAYER_PREFIX)
}

/// True for a base variable definition (`X-Env-Var-<NAME>` with no
/// attribute suffix).
#[must_use]
pub fn is_base_var_field(field: &str) -> bool {
    field
        .strip_prefix(VAR_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('-'))
}

/// Extracts the variable name from any `X-Env-Var-*` field, base or
/// attribute.
#[must_use]
pub fn base_var_name(field: &str) -> Option<&str> {
    let rest = field.strip_prefix(VAR_PREFIX)?;
    let name = rest.split('-').next().unwrap_or(rest);
    (!name.is_empty()).then_some(name)
}

/// Splits an attribute field into `(name, suffix)`; `None` for base fields
/// and non-variable fields.
#[must_use]
pub fn split_var_attr(field: &str) -> Option<(&str, &str)> {
    let rest = field.strip_prefix(VAR_PREFIX)?;
    let idx = rest.find('-')?;
    Some((&rest[..idx], &rest[idx..]))
}

/// True when the field name belongs to the supported schema.
#[must_use]
pub fn is_field_supported(field: &str) -> bool {
    if SINGLE_FIELDS.contains(&field) {
        return true;
    }
    if is_base_var_field(field) {
        return true;
    }
    if let Some((name, suffix)) = split_var_attr(field) {
        return !name.is_empty() && ATTR_SUFFIXES.contains(&suffix);
    }
    false
}

/// The supported fields, rendered for diagnostics. Pattern fields show a
/// `*` where the variable name goes.
#[must_use]
pub fn supported_fields() -> Vec<String> {
    let mut fields: Vec<String> = SINGLE_FIELDS.iter().map(|f| (*f).to_string()).collect();
    fields.push(format!("{VAR_PREFIX}*"));
    for suffix in ATTR_SUFFIXES {
        fields.push(format!("{VAR_PREFIX}*{suffix}"));
    }
    fields.sort();
    fields
}
