//! Layer model: the graph-relevant half of a layer file's metadata.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::metadata::{fields, placeholder};

static DEP_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid pattern"));
// Doc mode tolerates unexpanded `${VAR}` placeholders inside tokens.
static DEP_TOKEN_DOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_${}-]+$").expect("valid pattern"));

/// Whether a layer's header is final or produced by a generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayerKind {
    /// The file is used as-is.
    #[default]
    Static,
    /// The file is regenerated by an external command before use.
    Dynamic,
}

impl Display for LayerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Static => f.write_str("static"),
            LayerKind::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// A layer's identity and graph relationships.
#[derive(Clone, Debug)]
pub struct Layer {
    /// Unique layer name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Layer version.
    pub version: String,
    /// Grouping category for listings.
    pub category: String,
    /// Required layer dependencies.
    pub requires: Vec<String>,
    /// Capabilities this layer provides.
    pub provides: Vec<String>,
    /// Capabilities some layer in the build order must provide.
    pub requires_provider: Vec<String>,
    /// Layers this one conflicts with.
    pub conflicts: Vec<String>,
    /// Static or dynamic.
    pub kind: LayerKind,
    /// Generator command for dynamic layers.
    pub generator: String,
    /// Basename of the source file.
    pub config_file: String,
}

impl Layer {
    /// Builds a layer from a file's metadata fields. Returns `Ok(None)`
    /// when the fields carry no `X-Env-Layer-Name` (the file contributes
    /// variables only).
    ///
    /// Dependency-bearing fields expand `${VAR}` placeholders from the
    /// environment snapshot; in doc mode unresolved placeholders survive as
    /// text.
    ///
    /// # Errors
    ///
    /// Returns schema errors for unsupported layer fields, parse errors for
    /// invalid types, dependency tokens or a dynamic layer without a
    /// generator.
    pub fn from_fields(
        fields_map: &IndexMap<String, String>,
        path: &Path,
        env: &EnvSnapshot,
        doc_mode: bool,
    ) -> Result<Option<Self>, Error> {
        let name = fields_map
            .get(fields::LAYER_NAME)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if name.is_empty() {
            return Ok(None);
        }

        let display_path = path.display().to_string();
        for field in fields_map.keys() {
            if fields::is_layer_field(field) && !fields::is_field_supported(field) {
                return Err(Error::UnsupportedField {
                    path: display_path.clone(),
                    field: field.clone(),
                });
            }
        }

        let kind_raw = fields_map
            .get(fields::LAYER_TYPE)
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_default();
        let kind = match kind_raw.as_str() {
            "" | "static" => LayerKind::Static,
            "dynamic" => LayerKind::Dynamic,
            other => {
                return Err(Error::InvalidLayerType {
                    path: display_path,
                    value: other.to_string(),
                });
            }
        };

        let generator = fields_map
            .get(fields::LAYER_GENERATOR)
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        if kind == LayerKind::Dynamic && generator.is_empty() {
            return Err(Error::MissingGenerator { layer: name });
        }

        let list = |field: &str| -> Result<Vec<String>, Error> {
            parse_dependency_list(
                fields_map.get(field).map_or("", String::as_str),
                env,
                doc_mode,
            )
        };

        let config_file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{name}.yaml"));

        Ok(Some(Self {
            description: fields_map
                .get(fields::LAYER_DESC)
                .cloned()
                .unwrap_or_default(),
            version: fields_map
                .get(fields::LAYER_VERSION)
                .cloned()
                .unwrap_or_else(|| "1.0.0".to_string()),
            category: fields_map
                .get(fields::LAYER_CATEGORY)
                .cloned()
                .unwrap_or_else(|| "general".to_string()),
            requires: list(fields::LAYER_REQUIRES)?,
            provides: list(fields::LAYER_PROVIDES)?,
            requires_provider: list(fields::LAYER_REQUIRES_PROVIDER)?,
            conflicts: list(fields::LAYER_CONFLICTS)?,
            kind,
            generator,
            config_file,
            name,
        }))
    }

    /// True when the layer's header comes from a generator.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.kind == LayerKind::Dynamic
    }
}

/// Splits a comma-separated dependency field into validated tokens.
fn parse_dependency_list(
    raw: &str,
    env: &EnvSnapshot,
    doc_mode: bool,
) -> Result<Vec<String>, Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut deps = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let token = if token.contains("${") {
            placeholder::expand_env_placeholders(token, env, doc_mode)?
        } else {
            token.to_string()
        };

        if token.chars().any(char::is_whitespace) {
            return Err(Error::InvalidDependency {
                token,
                message: "dependencies must be comma-separated without spaces/newlines inside a token"
                    .to_string(),
            });
        }
        let pattern = if doc_mode { &DEP_TOKEN_DOC } else { &DEP_TOKEN };
        if !pattern.is_match(&token) {
            return Err(Error::InvalidDependency {
                token,
                message: "only alphanumerics, dash and underscore allowed".to_string(),
            });
        }
        deps.push(token);
    }
    Ok(deps)
}
