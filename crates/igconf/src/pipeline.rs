//! The end-to-end pipeline: apply layers, resolve, emit.
//!
//! One call chains the whole flow together: seed the environment snapshot
//! from the input env file, discover layers, compute the build order,
//! validate in two phases (permissive, then strict, so triggers may inject
//! required defaults in between), apply the winning definitions, bind
//! anchors and write the fully resolved outputs.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::env::EnvSnapshot;
use crate::envfile::{load_env_file, write_env_file};
use crate::error::Error;
use crate::expand::{AnchorRegistry, LazyResolver};
use crate::manager::{LayerManager, ManagerOptions};
use crate::resolver;
use crate::vars::Position;

/// Pipeline inputs and outputs.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Input env file (`NAME=value` lines).
    pub env_in: PathBuf,
    /// Target layers (names or file paths).
    pub layers: Vec<String>,
    /// `tag=path` search roots.
    pub search_paths: Vec<String>,
    /// Glob patterns for discovery.
    pub patterns: Vec<String>,
    /// Fully resolved env output file.
    pub env_out: PathBuf,
    /// Optional layer-order output file.
    pub order_out: Option<PathBuf>,
    /// Optional anchor-manifest output file.
    pub anchors_out: Option<PathBuf>,
}

/// Runs the pipeline. The snapshot is seeded from the input env file
/// without overriding pre-existing entries (caller overrides win through
/// the policy table); applied variable values are merged back into the
/// assignment set before final expansion.
///
/// # Errors
///
/// Everything in the error taxonomy: env-file syntax, discovery and graph
/// failures, accumulated validation errors, resolution failures and I/O.
pub fn run(options: &PipelineOptions, env: &mut EnvSnapshot) -> Result<(), Error> {
    let mut assignments = load_env_file(&options.env_in)?;
    for (name, value) in &assignments {
        env.seed(name, value);
    }

    let manager = LayerManager::discover(
        &options.search_paths,
        ManagerOptions {
            patterns: options.patterns.clone(),
            doc_mode: false,
        },
        env,
    )?;

    let mut targets = Vec::new();
    for identifier in &options.layers {
        match manager.resolve_layer_name(identifier)? {
            Some(name) => targets.push(name),
            None => {
                return Err(Error::LayerNotFound {
                    name: identifier.clone(),
                });
            }
        }
    }

    let order = manager.build_order(&targets)?;
    info!(order = ?order, "computed build order");

    // Phase 1: permissive, so triggers may inject missing required
    // variables during application.
    validate_layers(&manager, &order, env, true)?;

    let definitions = collect_definitions(&manager, &order);
    let resolved = resolver::resolve(&definitions, env)?;
    let (applied, _actions) = resolver::apply(&resolved, env);
    for (name, value) in &applied {
        assignments.insert(name.clone(), value.clone());
    }

    // Phase 2: strict validation of the target layers on final values.
    validate_layers(&manager, &targets, env, false)?;

    if let Some(order_out) = &options.order_out {
        write_layer_order(order_out, &order, &manager)?;
    }

    let mut registry = build_anchor_registry(&manager, &order, &assignments)?;

    let resolved_values = {
        let mut resolver = LazyResolver::new(&assignments, env, &mut registry, false);
        resolver.resolve_all()?
    };

    write_env_file(&options.env_out, &assignments, &resolved_values)?;
    info!(path = %options.env_out.display(), "wrote resolved env");

    if let Some(anchors_out) = &options.anchors_out {
        registry.capture_values(&resolved_values);
        registry.write_manifest(anchors_out)?;
        info!(path = %anchors_out.display(), "wrote anchor manifest");
    }
    Ok(())
}

/// Validates every named layer, accumulating all failures before erroring.
fn validate_layers(
    manager: &LayerManager,
    layers: &[String],
    env: &EnvSnapshot,
    ignore_missing_required: bool,
) -> Result<(), Error> {
    let mut errors = Vec::new();
    for name in layers {
        let report = manager.validate_layer(name, env)?;
        errors.extend(report.to_errors(name, ignore_missing_required));
    }
    match Error::multiple(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Gathers per-name definition lists from the build order, each definition
/// tagged with its layer's position.
fn collect_definitions(manager: &LayerManager, order: &[String]) -> resolver::Definitions {
    let mut definitions: resolver::Definitions = IndexMap::new();
    for (index, layer_name) in order.iter().enumerate() {
        let Some(meta) = manager.metadata(layer_name) else {
            continue;
        };
        let position = Position::new(u32::try_from(index).unwrap_or(u32::MAX));
        for def in meta.vars().values() {
            definitions
                .entry(def.name.clone())
                .or_default()
                .push(def.clone().at(layer_name, position));
        }
    }
    definitions
}

fn write_layer_order(
    path: &Path,
    order: &[String],
    manager: &LayerManager,
) -> Result<(), Error> {
    let mut out = String::new();
    for layer in order {
        match manager.relative_spec(layer) {
            Some(spec) => {
                out.push_str(layer);
                out.push_str("=\"");
                out.push_str(&spec);
                out.push_str("\"\n");
            }
            None => {
                out.push_str(layer);
                out.push('\n');
            }
        }
    }
    std::fs::write(path, out).map_err(|e| Error::io(path, e))?;
    info!(path = %path.display(), "wrote layer order");
    Ok(())
}

/// Builds the anchor registry from layers in build order: the first layer
/// to bind an anchor wins. `@IGROOT` and `@SRCROOT` are always injected
/// when the corresponding assignments are present, so downstream tooling
/// can remap paths.
fn build_anchor_registry(
    manager: &LayerManager,
    order: &[String],
    assignments: &IndexMap<String, String>,
) -> Result<AnchorRegistry, Error> {
    let mut registry = AnchorRegistry::new();
    for layer in order {
        let Some(meta) = manager.metadata(layer) else {
            continue;
        };
        for def in meta.vars().values() {
            if let Some(anchor) = &def.anchor {
                if registry.bound_var(anchor).is_none() {
                    registry.register(anchor, Some(&def.name))?;
                    debug!(anchor = %anchor, var = %def.name, layer = %layer, "anchor bound");
                }
            }
        }
    }

    for root_var in ["IGROOT", "SRCROOT"] {
        if let Some(value) = assignments.get(root_var).filter(|v| !v.is_empty()) {
            if registry.bound_var(root_var).is_none() {
                registry.register(root_var, Some(root_var))?;
                registry.set_value(root_var, value)?;
            }
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_order_line_format() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("layers")).unwrap();
        std::fs::write(
            dir.path().join("layers/base.yaml"),
            "# METABEGIN\n# X-Env-Layer-Name: base\n# METAEND\n",
        )
        .unwrap();
        let manager = LayerManager::discover(
            &[format!("layer={}", dir.path().join("layers").display())],
            ManagerOptions::default(),
            &EnvSnapshot::empty(),
        )
        .unwrap();
        let out = dir.path().join("order.txt");
        write_layer_order(&out, &["base".to_string()], &manager).unwrap();
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "base=\"layer:base.yaml\"\n"
        );
    }
}
