//! Layer discovery, dependency resolution and build ordering.
//!
//! The [`LayerManager`] scans tagged search roots for layer files, parses
//! each through the metadata layer, regenerates dynamic layers, and
//! answers the graph questions the pipeline asks: dependencies, reverse
//! dependencies, cycles, and the final build order with its provider
//! invariants.
//!
//! Per-file parse failures are captured, not fatal: broken files are
//! recorded in a load-error map so that valid layers remain usable, and
//! any attempt to pull a broken file into a build order replays the
//! captured reason as a hard error.

pub mod generator;
pub mod roots;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{info, warn};

pub use roots::{DYN_TAG, SearchRoot, parse_search_roots};

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::layer::Layer;
use crate::metadata::{Metadata, ValidationReport};

/// Discovery options.
#[derive(Clone, Debug)]
pub struct ManagerOptions {
    /// Glob patterns matched against file names under each root.
    pub patterns: Vec<String>,
    /// Relaxed mode for documentation tooling: generators are not run and
    /// unresolved `${VAR}` placeholders survive as text.
    pub doc_mode: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            patterns: vec!["*.yaml".to_string(), "*.yml".to_string()],
            doc_mode: false,
        }
    }
}

/// Discovers layers and resolves their dependency graph.
#[derive(Debug, Default)]
pub struct LayerManager {
    roots: Vec<SearchRoot>,
    doc_mode: bool,
    layers: IndexMap<String, Metadata>,
    files: HashMap<String, PathBuf>,
    tags: HashMap<String, String>,
    relpaths: HashMap<String, PathBuf>,
    provider_index: IndexMap<String, String>,
    provider_conflicts: BTreeMap<String, BTreeSet<String>>,
    load_errors: IndexMap<String, String>,
}

impl LayerManager {
    /// Scans the given `tag=path` entries and loads every matching layer
    /// file.
    ///
    /// # Errors
    ///
    /// Hard errors only: duplicate tags, duplicate layer names, generator
    /// failures. Per-file parse problems are captured in the load-error
    /// map instead.
    pub fn discover(
        search_paths: &[String],
        options: ManagerOptions,
        env: &EnvSnapshot,
    ) -> Result<Self, Error> {
        let roots = parse_search_roots(search_paths)?;
        let mut manager = Self {
            roots,
            doc_mode: options.doc_mode,
            ..Self::default()
        };
        manager.load_layers(&options.patterns, env)?;
        manager.build_provider_index();
        Ok(manager)
    }

    fn load_layers(&mut self, patterns: &[String], env: &EnvSnapshot) -> Result<(), Error> {
        let roots = self.roots.clone();
        for root in &roots {
            if root.tag == DYN_TAG {
                // Reserved for generated output only.
                continue;
            }
            if !root.path.exists() {
                warn!(path = %root.path.display(), "search path does not exist");
                continue;
            }

            let mut files: Vec<PathBuf> = Vec::new();
            for pattern in patterns {
                let expr = format!("{}/**/{}", root.path.display(), pattern);
                let Ok(matches) = glob::glob(&expr) else {
                    continue;
                };
                files.extend(matches.flatten().filter(|p| p.is_file()));
            }
            files.sort();
            files.dedup();

            for file in files {
                self.load_file(root, &file, env)?;
            }
        }
        Ok(())
    }

    fn load_file(&mut self, root: &SearchRoot, file: &Path, env: &EnvSnapshot) -> Result<(), Error> {
        let abs = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
        let rel = abs
            .strip_prefix(&root.path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| abs.clone());
        let rel_display = rel.display().to_string();

        let meta = match Metadata::load(&abs, env, self.doc_mode) {
            Ok(meta) => meta,
            Err(err) if err.is_unresolved_placeholder() => {
                // Placeholders may resolve later; record and skip.
                warn!(file = %rel_display, %err, "skipping layer file");
                self.load_errors.insert(rel_display, err.to_string());
                return Ok(());
            }
            Err(err) => {
                self.record_load_error(&rel_display, &format!("Failed to load layer file: {err}"), None);
                return Ok(());
            }
        };

        let Some(layer) = meta.layer().cloned() else {
            if meta.raw().keys().any(|k| k.starts_with("X-Env-Layer-")) {
                let stem = abs
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| rel_display.clone());
                self.record_load_error(
                    &rel_display,
                    "Incomplete X-Env-Layer metadata (missing required fields)",
                    Some(&stem),
                );
            }
            return Ok(());
        };

        let lint = meta.lint();
        if lint.has_errors(false) {
            let details: Vec<String> = lint
                .entries()
                .filter(|(_, f)| f.is_error(false))
                .map(|(_, f)| f.message())
                .collect();
            self.record_load_error(
                &rel_display,
                &format!("Layer '{}' failed lint: {}", layer.name, details.join("; ")),
                Some(&layer.name),
            );
            return Ok(());
        }

        let (meta, abs, tag) = if layer.is_dynamic() && !self.doc_mode {
            let output = self.generated_path(&rel)?;
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(&output, e))?;
            }
            generator::run_generator(&layer.name, &layer.generator, &abs, &output)?;
            // The generated file carries the final header.
            let regenerated = Metadata::load(&output, env, false)?;
            (regenerated, output, DYN_TAG.to_string())
        } else {
            (meta, abs, root.tag.clone())
        };

        let name = meta
            .layer()
            .map(|l| l.name.clone())
            .unwrap_or_else(|| layer.name.clone());

        if let Some(previous) = self.files.get(&name) {
            return Err(Error::DuplicateLayer {
                name,
                first: previous.display().to_string(),
                second: abs.display().to_string(),
            });
        }

        info!(layer = %name, file = %rel_display, tag = %tag, "loaded layer");
        self.layers.insert(name.clone(), meta);
        self.files.insert(name.clone(), abs);
        self.tags.insert(name.clone(), tag);
        self.relpaths.insert(name, rel);
        Ok(())
    }

    fn generated_path(&self, rel: &Path) -> Result<PathBuf, Error> {
        let dyn_root = self
            .roots
            .iter()
            .find(|r| r.tag == DYN_TAG)
            .ok_or(Error::MissingDynRoot)?;
        Ok(dyn_root.path.join(rel))
    }

    fn record_load_error(&mut self, rel: &str, message: &str, layer_name: Option<&str>) {
        warn!(file = %rel, message, "layer load failed");
        if let Some(name) = layer_name {
            self.load_errors.insert(name.to_string(), message.to_string());
        }
        self.load_errors.insert(rel.to_string(), message.to_string());
    }

    fn build_provider_index(&mut self) {
        for (name, meta) in &self.layers {
            let Some(layer) = meta.layer() else { continue };
            for capability in &layer.provides {
                match self.provider_index.get(capability) {
                    Some(existing) if existing != name => {
                        let entry = self
                            .provider_conflicts
                            .entry(capability.clone())
                            .or_default();
                        entry.insert(existing.clone());
                        entry.insert(name.clone());
                    }
                    Some(_) => {}
                    None => {
                        self.provider_index
                            .insert(capability.clone(), name.clone());
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Loaded layer names, in discovery order.
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// The metadata of a loaded layer.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&Metadata> {
        self.layers.get(name)
    }

    /// The parsed layer model of a loaded layer.
    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name).and_then(Metadata::layer)
    }

    /// The absolute file a layer was loaded from.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&Path> {
        self.files.get(name).map(PathBuf::as_path)
    }

    /// The `tag:relative/path` spec of a loaded layer.
    #[must_use]
    pub fn relative_spec(&self, name: &str) -> Option<String> {
        let tag = self.tags.get(name)?;
        let rel = self.relpaths.get(name)?;
        Some(format!("{tag}:{}", rel.display()))
    }

    /// Captured per-file load failures.
    #[must_use]
    pub fn load_errors(&self) -> &IndexMap<String, String> {
        &self.load_errors
    }

    /// The configured search roots.
    #[must_use]
    pub fn search_roots(&self) -> &[SearchRoot] {
        &self.roots
    }

    /// Capability providers recorded across all loaded layers (first
    /// binding wins; conflicts are informational until a build order is
    /// computed).
    #[must_use]
    pub fn provider_index(&self) -> &IndexMap<String, String> {
        &self.provider_index
    }

    // ─────────────────────────────────────────────────────────────────────
    // Graph queries
    // ─────────────────────────────────────────────────────────────────────

    /// A layer's declared required dependencies.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        self.layer(name)
            .map(|l| l.requires.clone())
            .unwrap_or_default()
    }

    /// Optional dependencies. Reserved: the metadata schema does not carry
    /// them yet, so the list is always empty, but ordering and dependency
    /// checks already honour it.
    #[must_use]
    pub fn optional_dependencies(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Layers that directly require `target`, sorted by name.
    #[must_use]
    pub fn reverse_dependencies(&self, target: &str) -> Vec<String> {
        let mut reverse: Vec<String> = self
            .layers
            .keys()
            .filter(|name| self.dependencies(name).iter().any(|d| d == target))
            .cloned()
            .collect();
        reverse.sort();
        reverse
    }

    /// All transitive dependencies of a layer, required first. The visited
    /// set is carried per branch so diamond graphs traverse fully without
    /// looping on cycles.
    #[must_use]
    pub fn all_dependencies(&self, name: &str, include_optional: bool) -> Vec<String> {
        let mut visited = HashSet::new();
        self.all_dependencies_inner(name, &mut visited, include_optional)
    }

    fn all_dependencies_inner(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        include_optional: bool,
    ) -> Vec<String> {
        if visited.contains(name) || !self.layers.contains_key(name) {
            return Vec::new();
        }
        visited.insert(name.to_string());

        let mut all = Vec::new();
        let mut push = |dep: String, all: &mut Vec<String>| {
            if !all.contains(&dep) {
                all.push(dep);
            }
        };

        for dep in self.dependencies(name) {
            push(dep.clone(), &mut all);
            let mut branch = visited.clone();
            for transitive in self.all_dependencies_inner(&dep, &mut branch, include_optional) {
                push(transitive, &mut all);
            }
        }
        if include_optional {
            for dep in self.optional_dependencies(name) {
                if self.layers.contains_key(&dep) {
                    push(dep.clone(), &mut all);
                    let mut branch = visited.clone();
                    for transitive in
                        self.all_dependencies_inner(&dep, &mut branch, include_optional)
                    {
                        push(transitive, &mut all);
                    }
                }
            }
        }
        all
    }

    /// Checks whether a layer's dependency closure is satisfiable.
    /// Returns `(ok, messages)`: missing required dependencies and cycles
    /// are errors, missing optional dependencies are warnings.
    #[must_use]
    pub fn check_dependencies(&self, name: &str) -> (bool, Vec<String>) {
        if !self.layers.contains_key(name) {
            return (
                false,
                vec![format!("Layer '{name}' not found in search paths")],
            );
        }

        let mut missing = Vec::new();
        for dep in self.all_dependencies(name, false) {
            if !self.layers.contains_key(&dep) {
                missing.push(format!("Layer '{name}' missing required dependency: {dep}"));
            }
        }

        let mut warnings = Vec::new();
        for dep in self.optional_dependencies(name) {
            if !self.layers.contains_key(&dep) {
                warnings.push(format!("Optional dependency not available: {dep}"));
            }
        }

        if let Some(chain) = self.find_cycle(name) {
            missing.push(format!(
                "Circular dependency detected: {}",
                Error::chain(&chain)
            ));
        }

        if missing.is_empty() {
            // Provider invariants are enforced by build-order computation.
            if let Err(err) = self.build_order(std::slice::from_ref(&name.to_string())) {
                missing.push(err.to_string());
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }

        let ok = missing.is_empty();
        missing.extend(warnings);
        (ok, missing)
    }

    fn find_cycle(&self, name: &str) -> Option<Vec<String>> {
        let mut path = Vec::new();
        self.cycle_from(name, &mut path)
    }

    fn cycle_from(&self, name: &str, path: &mut Vec<String>) -> Option<Vec<String>> {
        if path.iter().any(|n| n == name) {
            let mut chain = path.clone();
            chain.push(name.to_string());
            return Some(chain);
        }
        if !self.layers.contains_key(name) {
            return None;
        }
        path.push(name.to_string());
        for dep in self.dependencies(name) {
            if let Some(chain) = self.cycle_from(&dep, path) {
                path.pop();
                return Some(chain);
            }
        }
        path.pop();
        None
    }

    /// Resolves a layer identifier: a layer name, a path to a loaded
    /// file, or an identifier with a captured load error (replayed as an
    /// error).
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayerUnavailable`] when the identifier matches a
    /// recorded load failure.
    pub fn resolve_layer_name(&self, identifier: &str) -> Result<Option<String>, Error> {
        if self.layers.contains_key(identifier) {
            return Ok(Some(identifier.to_string()));
        }
        if let Some(reason) = self.load_errors.get(identifier) {
            return Err(Error::LayerUnavailable {
                name: identifier.to_string(),
                reason: reason.clone(),
            });
        }

        let ident_abs = std::path::absolute(Path::new(identifier)).ok();
        for (name, path) in &self.files {
            if Some(path) == ident_abs.as_ref() || path == Path::new(identifier) {
                return Ok(Some(name.clone()));
            }
        }

        if let Some(base) = Path::new(identifier).file_name() {
            let base = base.to_string_lossy().to_string();
            if let Some(reason) = self.load_errors.get(&base) {
                return Err(Error::LayerUnavailable {
                    name: identifier.to_string(),
                    reason: reason.clone(),
                });
            }
        }
        Ok(None)
    }

    /// Computes the build order for the target layers: every transitive
    /// required dependency validated present, DFS post-order (required
    /// dependencies first, declaration order; optional next), then the
    /// in-scope provider invariants.
    ///
    /// # Errors
    ///
    /// Missing dependencies (with captured load reasons replayed), cycles,
    /// provider conflicts within scope and unsatisfied
    /// `requires_provider` capabilities.
    pub fn build_order(&self, targets: &[String]) -> Result<Vec<String>, Error> {
        for target in targets {
            let mut checked = HashSet::new();
            self.check_missing(target, &mut checked)?;
        }
        for target in targets {
            if let Some(chain) = self.find_cycle(target) {
                return Err(Error::CircularDependency {
                    chain: Error::chain(&chain),
                });
            }
        }

        let mut order = Vec::new();
        let mut processed = HashSet::new();
        for target in targets {
            self.add_layer_and_deps(target, &mut order, &mut processed);
        }

        self.validate_provider_requirements(&order)?;
        Ok(order)
    }

    fn check_missing(&self, name: &str, checked: &mut HashSet<String>) -> Result<(), Error> {
        if !checked.insert(name.to_string()) {
            return Ok(());
        }
        if !self.layers.contains_key(name) {
            if let Some(reason) = self.load_errors.get(name) {
                return Err(Error::LayerUnavailable {
                    name: name.to_string(),
                    reason: reason.clone(),
                });
            }
            return Err(Error::MissingDependency {
                name: name.to_string(),
            });
        }
        for dep in self.dependencies(name) {
            self.check_missing(&dep, checked)?;
        }
        Ok(())
    }

    fn add_layer_and_deps(
        &self,
        name: &str,
        order: &mut Vec<String>,
        processed: &mut HashSet<String>,
    ) {
        if processed.contains(name) {
            return;
        }
        for dep in self.dependencies(name) {
            self.add_layer_and_deps(&dep, order, processed);
        }
        for dep in self.optional_dependencies(name) {
            if self.layers.contains_key(&dep) {
                self.add_layer_and_deps(&dep, order, processed);
            }
        }
        if processed.insert(name.to_string()) {
            order.push(name.to_string());
        }
    }

    fn validate_provider_requirements(&self, order: &[String]) -> Result<(), Error> {
        let mut scope: HashMap<&str, &str> = HashMap::new();
        for name in order {
            let Some(layer) = self.layer(name) else { continue };
            for capability in &layer.provides {
                if let Some(existing) = scope.get(capability.as_str()) {
                    return Err(Error::ProviderConflict {
                        capability: capability.clone(),
                        first: (*existing).to_string(),
                        second: name.clone(),
                    });
                }
                scope.insert(capability, name);
            }
        }

        let available: HashSet<&str> = scope.keys().copied().collect();
        for name in order {
            let Some(layer) = self.layer(name) else { continue };
            for capability in &layer.requires_provider {
                if !available.contains(capability.as_str()) {
                    return Err(Error::UnsatisfiedProvider {
                        layer: name.clone(),
                        capability: capability.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates one layer's variables against the environment snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LayerNotFound`] for unknown layers and propagates
    /// resolver errors.
    pub fn validate_layer(
        &self,
        name: &str,
        env: &EnvSnapshot,
    ) -> Result<ValidationReport, Error> {
        let Some(meta) = self.layers.get(name) else {
            return Err(Error::LayerNotFound {
                name: name.to_string(),
            });
        };
        meta.validate(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_layer(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn layer_text(name: &str, extra: &str) -> String {
        format!(
            "# METABEGIN\n# X-Env-Layer-Name: {name}\n{extra}# METAEND\n"
        )
    }

    fn discover(dir: &Path) -> LayerManager {
        LayerManager::discover(
            &[format!("layer={}", dir.display())],
            ManagerOptions::default(),
            &EnvSnapshot::empty(),
        )
        .unwrap()
    }

    #[test]
    fn discovers_layers_recursively() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(dir.path(), "base.yaml", &layer_text("base", ""));
        write_layer(dir.path(), "sub/tools.yaml", &layer_text("tools", ""));
        let manager = discover(dir.path());
        let names: Vec<&str> = manager.layer_names().collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"base"));
        assert!(names.contains(&"tools"));
        assert_eq!(
            manager.relative_spec("tools").unwrap(),
            "layer:sub/tools.yaml"
        );
    }

    #[test]
    fn duplicate_layer_names_are_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(dir.path(), "a.yaml", &layer_text("base", ""));
        write_layer(dir.path(), "b.yaml", &layer_text("base", ""));
        let result = LayerManager::discover(
            &[format!("layer={}", dir.path().display())],
            ManagerOptions::default(),
            &EnvSnapshot::empty(),
        );
        assert!(matches!(result, Err(Error::DuplicateLayer { .. })));
    }

    #[test]
    fn build_order_is_dependency_first() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(dir.path(), "base.yaml", &layer_text("base", ""));
        write_layer(
            dir.path(),
            "tools.yaml",
            &layer_text("tools", "# X-Env-Layer-Requires: base\n"),
        );
        write_layer(
            dir.path(),
            "app.yaml",
            &layer_text("app", "# X-Env-Layer-Requires: tools, base\n"),
        );
        let manager = discover(dir.path());
        let order = manager.build_order(&["app".to_string()]).unwrap();
        assert_eq!(order, ["base", "tools", "app"]);
    }

    #[test]
    fn missing_dependency_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "app.yaml",
            &layer_text("app", "# X-Env-Layer-Requires: nowhere\n"),
        );
        let manager = discover(dir.path());
        assert!(matches!(
            manager.build_order(&["app".to_string()]),
            Err(Error::MissingDependency { .. })
        ));
        let (ok, messages) = manager.check_dependencies("app");
        assert!(!ok);
        assert!(!messages.is_empty());
    }

    #[test]
    fn cycle_is_reported_with_chain() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "a.yaml",
            &layer_text("a", "# X-Env-Layer-Requires: b\n"),
        );
        write_layer(
            dir.path(),
            "b.yaml",
            &layer_text("b", "# X-Env-Layer-Requires: a\n"),
        );
        let manager = discover(dir.path());
        match manager.build_order(&["a".to_string()]) {
            Err(Error::CircularDependency { chain }) => {
                assert_eq!(chain, "a -> b -> a");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn provider_conflict_in_scope_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "pg.yaml",
            &layer_text("pg", "# X-Env-Layer-Provides: db\n"),
        );
        write_layer(
            dir.path(),
            "mysql.yaml",
            &layer_text("mysql", "# X-Env-Layer-Provides: db\n"),
        );
        write_layer(
            dir.path(),
            "app.yaml",
            &layer_text("app", "# X-Env-Layer-Requires: pg, mysql\n"),
        );
        let manager = discover(dir.path());
        assert!(matches!(
            manager.build_order(&["app".to_string()]),
            Err(Error::ProviderConflict { .. })
        ));
        // Out of scope, each provider alone is fine.
        assert!(manager.build_order(&["pg".to_string()]).is_ok());
    }

    #[test]
    fn unsatisfied_provider_is_fatal() {
        // S3: app requires provider db, nothing in scope provides it.
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "app.yaml",
            &layer_text("app", "# X-Env-Layer-RequiresProvider: db\n"),
        );
        let manager = discover(dir.path());
        match manager.build_order(&["app".to_string()]) {
            Err(err @ Error::UnsatisfiedProvider { .. }) => {
                assert_eq!(
                    err.to_string(),
                    "layer 'app' requires provider 'db' but no layer in the dependency chain provides it"
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn broken_file_is_captured_then_replayed() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(dir.path(), "ok.yaml", &layer_text("ok", ""));
        write_layer(
            dir.path(),
            "broken.yaml",
            "# METABEGIN\n# X-Env-Layer-Desc: no name\n# METAEND\n",
        );
        let manager = discover(dir.path());
        // The valid layer still works.
        assert!(manager.build_order(&["ok".to_string()]).is_ok());
        assert!(!manager.load_errors().is_empty());
        // Referencing the broken file replays the captured reason.
        assert!(matches!(
            manager.resolve_layer_name("broken"),
            Err(Error::LayerUnavailable { .. })
        ));
    }

    #[test]
    fn unresolved_placeholder_demotes_to_skip() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "board.yaml",
            &layer_text("board", "# X-Env-Layer-Requires: base-${SOC}\n"),
        );
        let manager = discover(dir.path());
        assert!(manager.layer("board").is_none());
        assert_eq!(manager.load_errors().len(), 1);
    }

    #[test]
    fn doc_mode_keeps_placeholder_layers() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(
            dir.path(),
            "board.yaml",
            &layer_text("board", "# X-Env-Layer-Requires: base-${SOC}\n"),
        );
        let manager = LayerManager::discover(
            &[format!("layer={}", dir.path().display())],
            ManagerOptions {
                doc_mode: true,
                ..ManagerOptions::default()
            },
            &EnvSnapshot::empty(),
        )
        .unwrap();
        assert_eq!(
            manager.dependencies("board"),
            vec!["base-${SOC}".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn dynamic_layer_regenerates_into_dyn_root() {
        let src = tempfile::TempDir::new().unwrap();
        let r#gen = tempfile::TempDir::new().unwrap();
        write_layer(
            src.path(),
            "dyn.yaml",
            &layer_text(
                "dyn",
                "# X-Env-Layer-Type: dynamic\n# X-Env-Layer-Generator: cp\n",
            ),
        );
        let manager = LayerManager::discover(
            &[
                format!("layer={}", src.path().display()),
                format!("DYNlayer={}", r#gen.path().display()),
            ],
            ManagerOptions::default(),
            &EnvSnapshot::empty(),
        )
        .unwrap();
        assert_eq!(manager.relative_spec("dyn").unwrap(), "DYNlayer:dyn.yaml");
        assert!(r#gen.path().join("dyn.yaml").is_file());
    }

    #[test]
    fn dynamic_layer_without_dyn_root_is_fatal() {
        let src = tempfile::TempDir::new().unwrap();
        write_layer(
            src.path(),
            "dyn.yaml",
            &layer_text(
                "dyn",
                "# X-Env-Layer-Type: dynamic\n# X-Env-Layer-Generator: cp\n",
            ),
        );
        let result = LayerManager::discover(
            &[format!("layer={}", src.path().display())],
            ManagerOptions::default(),
            &EnvSnapshot::empty(),
        );
        assert!(matches!(result, Err(Error::MissingDynRoot)));
    }

    #[test]
    fn reverse_dependencies_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        write_layer(dir.path(), "base.yaml", &layer_text("base", ""));
        write_layer(
            dir.path(),
            "z.yaml",
            &layer_text("z", "# X-Env-Layer-Requires: base\n"),
        );
        write_layer(
            dir.path(),
            "a.yaml",
            &layer_text("a", "# X-Env-Layer-Requires: base\n"),
        );
        let manager = discover(dir.path());
        assert_eq!(manager.reverse_dependencies("base"), ["a", "z"]);
    }
}
