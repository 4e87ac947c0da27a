//! Lazy `${VAR}` / `${@ANCHOR}` expansion over an assignment set.
//!
//! Variable references resolve recursively through the assignments, falling
//! back to the external context; anchor references go through an
//! [`AnchorRegistry`] and may be preserved verbatim for staged expansion.
//! Results are memoized per variable and a resolution stack turns
//! `A -> B -> A` chains into deterministic errors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::json;

use crate::env::EnvSnapshot;
use crate::envfile::{load_env_file, write_env_file};
use crate::error::Error;
use crate::vars::is_valid_ident;

static VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid pattern"));

/// One anchor's bookkeeping: the bound variable, the captured value and who
/// referenced it.
#[derive(Clone, Debug, Default)]
pub struct AnchorEntry {
    /// The variable this anchor is bound to, if any.
    pub var: Option<String>,
    /// The captured value, if known.
    pub value: Option<String>,
    /// Assignments that referenced this anchor.
    pub referenced_by: BTreeSet<String>,
}

/// Tracks anchor metadata and resolved values.
///
/// Anchor names are normalized to uppercase with a leading `@`.
#[derive(Clone, Debug, Default)]
pub struct AnchorRegistry {
    anchors: BTreeMap<String, AnchorEntry>,
}

impl AnchorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes an anchor name: trimmed, prefixed with `@`, uppercased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAnchorName`] for empty input.
    pub fn normalize(name: &str) -> Result<String, Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::EmptyAnchorName);
        }
        let with_at = if name.starts_with('@') {
            name.to_string()
        } else {
            format!("@{name}")
        };
        Ok(with_at.to_uppercase())
    }

    /// Registers an anchor, optionally binding it to a variable. First
    /// binding wins; rebinding to a different variable is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AnchorRebound`] when the anchor is already bound to
    /// another variable.
    pub fn register(&mut self, anchor: &str, var: Option<&str>) -> Result<(), Error> {
        let norm = Self::normalize(anchor)?;
        let entry = self.anchors.entry(norm.clone()).or_default();
        if let Some(var) = var {
            if let Some(bound) = &entry.var {
                if bound != var {
                    return Err(Error::AnchorRebound {
                        anchor: norm,
                        bound: bound.clone(),
                        requested: var.to_string(),
                    });
                }
            } else {
                entry.var = Some(var.to_string());
            }
        }
        Ok(())
    }

    /// The variable bound to an anchor, if any.
    #[must_use]
    pub fn bound_var(&self, anchor: &str) -> Option<String> {
        let norm = Self::normalize(anchor).ok()?;
        self.anchors.get(&norm).and_then(|e| e.var.clone())
    }

    /// Records that `owner` references the anchor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAnchorName`] for empty anchor names.
    pub fn mark_usage(&mut self, anchor: &str, owner: &str) -> Result<(), Error> {
        let norm = Self::normalize(anchor)?;
        self.anchors
            .entry(norm)
            .or_default()
            .referenced_by
            .insert(owner.to_string());
        Ok(())
    }

    /// Directly assigns an anchor's value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyAnchorName`] for empty anchor names.
    pub fn set_value(&mut self, anchor: &str, value: &str) -> Result<(), Error> {
        let norm = Self::normalize(anchor)?;
        self.anchors.entry(norm).or_default().value = Some(value.to_string());
        Ok(())
    }

    /// Captures values for every bound anchor from a resolved value map.
    pub fn capture_values(&mut self, values: &IndexMap<String, String>) {
        for entry in self.anchors.values_mut() {
            if let Some(var) = &entry.var {
                if let Some(value) = values.get(var) {
                    entry.value = Some(value.clone());
                }
            }
        }
    }

    /// The anchor's captured value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AnchorUnassigned`] when no value is known.
    pub fn value(&self, anchor: &str) -> Result<String, Error> {
        let norm = Self::normalize(anchor)?;
        self.anchors
            .get(&norm)
            .and_then(|e| e.value.clone())
            .ok_or(Error::AnchorUnassigned { anchor: norm })
    }

    /// Iterates anchors in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AnchorEntry)> {
        self.anchors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when no anchors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Serializes the registry as the manifest payload:
    /// `{"anchors": {"@NAME": {"var": ..., "value": ...}}}` with sorted
    /// keys and `null` for missing entries.
    #[must_use]
    pub fn to_manifest(&self) -> serde_json::Value {
        let mut anchors = serde_json::Map::new();
        for (name, entry) in &self.anchors {
            anchors.insert(
                name.clone(),
                json!({ "var": entry.var, "value": entry.value }),
            );
        }
        json!({ "anchors": anchors })
    }

    /// Rebuilds a registry from a manifest payload. Accepts either the
    /// full `{"anchors": {...}}` document or a bare anchor map; entries may
    /// be `{var, value}` objects or plain scalar values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for shapes that are neither.
    pub fn from_manifest(path: &str, value: &serde_json::Value) -> Result<Self, Error> {
        let invalid = |message: &str| Error::InvalidManifest {
            path: path.to_string(),
            message: message.to_string(),
        };

        let map = match value {
            serde_json::Value::Object(obj) => match obj.get("anchors") {
                Some(serde_json::Value::Object(anchors)) => anchors,
                Some(_) => return Err(invalid("'anchors' must be an object")),
                None => obj,
            },
            _ => return Err(invalid("manifest root must be an object")),
        };

        let mut registry = Self::new();
        for (name, entry) in map {
            let norm = Self::normalize(name)?;
            let parsed = match entry {
                serde_json::Value::Object(obj) => AnchorEntry {
                    var: obj.get("var").and_then(|v| v.as_str()).map(str::to_string),
                    value: obj
                        .get("value")
                        .and_then(|v| v.as_str())
                        .map(str::to_string),
                    referenced_by: BTreeSet::new(),
                },
                serde_json::Value::String(s) => AnchorEntry {
                    var: None,
                    value: Some(s.clone()),
                    referenced_by: BTreeSet::new(),
                },
                serde_json::Value::Null => AnchorEntry::default(),
                _ => return Err(invalid("anchor entries must be objects or strings")),
            };
            registry.anchors.insert(norm, parsed);
        }
        Ok(registry)
    }

    /// Writes the manifest JSON (sorted keys, trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on write failure.
    pub fn write_manifest(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(path, e))?;
            }
        }
        let mut payload = serde_json::to_string_pretty(&self.to_manifest())
            .map_err(|e| Error::InvalidManifest {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        payload.push('\n');
        std::fs::write(path, payload).map_err(|e| Error::io(path, e))
    }

    /// Reads a manifest file written by [`AnchorRegistry::write_manifest`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on read failure and
    /// [`Error::InvalidManifest`] for malformed content.
    pub fn read_manifest(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| Error::InvalidManifest {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Self::from_manifest(&path.display().to_string(), &value)
    }
}

/// Evaluates `${VAR}` references lazily, optionally preserving
/// `${@ANCHOR}` placeholders for a later expansion stage.
pub struct LazyResolver<'a> {
    assignments: &'a IndexMap<String, String>,
    external: &'a EnvSnapshot,
    registry: &'a mut AnchorRegistry,
    preserve_anchors: bool,
    cache: HashMap<String, String>,
    stack: Vec<String>,
}

impl<'a> LazyResolver<'a> {
    /// Builds a resolver over an assignment set.
    pub fn new(
        assignments: &'a IndexMap<String, String>,
        external: &'a EnvSnapshot,
        registry: &'a mut AnchorRegistry,
        preserve_anchors: bool,
    ) -> Self {
        Self {
            assignments,
            external,
            registry,
            preserve_anchors,
            cache: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Resolves every assignment, preserving input order.
    ///
    /// # Errors
    ///
    /// Propagates undefined-variable, circular-reference and anchor errors.
    pub fn resolve_all(&mut self) -> Result<IndexMap<String, String>, Error> {
        let names: Vec<String> = self.assignments.keys().cloned().collect();
        let mut resolved = IndexMap::new();
        for name in names {
            let value = self.resolve(&name)?;
            resolved.insert(name, value);
        }
        Ok(resolved)
    }

    /// Resolves a single variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UndefinedVariable`] when the name exists neither in
    /// the assignments nor the external context, and
    /// [`Error::CircularReference`] for self-referential chains.
    pub fn resolve(&mut self, name: &str) -> Result<String, Error> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.clone());
        }
        if self.stack.iter().any(|n| n == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(Error::CircularReference {
                chain: Error::chain(&chain),
            });
        }

        let raw = if let Some(raw) = self.assignments.get(name) {
            raw.clone()
        } else if let Some(external) = self.external.get(name) {
            return Ok(external.to_string());
        } else {
            return Err(Error::UndefinedVariable {
                name: name.to_string(),
            });
        };

        self.stack.push(name.to_string());
        let result = self.expand_text(&raw, name);
        self.stack.pop();

        let expanded = result?;
        self.cache.insert(name.to_string(), expanded.clone());
        Ok(expanded)
    }

    fn expand_text(&mut self, text: &str, owner: &str) -> Result<String, Error> {
        let mut out = String::new();
        let mut last = 0;
        // captures_iter borrows only `text`, so recursive resolve calls
        // remain possible inside the loop.
        let captures: Vec<(usize, usize, String)> = VAR_PATTERN
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let token = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
                Some((whole.start(), whole.end(), token))
            })
            .collect();

        for (start, end, token) in captures {
            out.push_str(&text[last..start]);
            last = end;

            if token.is_empty() {
                continue;
            }
            if token.starts_with('@') {
                self.registry.mark_usage(&token, owner)?;
                if self.preserve_anchors {
                    out.push_str(&text[start..end]);
                    continue;
                }
                match self.registry.value(&token) {
                    Ok(value) => out.push_str(&value),
                    Err(err) => {
                        let bound = self.registry.bound_var(&token);
                        if let Some(bound) = bound {
                            let value = self.resolve(&bound)?;
                            out.push_str(&value);
                        } else {
                            return Err(err);
                        }
                    }
                }
                continue;
            }
            if !is_valid_ident(&token) {
                return Err(Error::InvalidReference {
                    token,
                    owner: owner.to_string(),
                });
            }
            let value = self.resolve(&token)?;
            out.push_str(&value);
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Options for [`resolve_env_file`].
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    /// Keep `${@ANCHOR}` placeholders verbatim in the output.
    pub preserve_anchors: bool,
    /// Preload anchor values from an existing manifest.
    pub anchor_in: Option<std::path::PathBuf>,
}

/// High-level driver: load an env file, resolve every assignment, write the
/// resolved env file and, when requested, the anchor manifest.
///
/// Returns the registry so callers can inspect anchor usage.
///
/// # Errors
///
/// Propagates env-file, resolution and manifest errors.
pub fn resolve_env_file(
    env_in: &Path,
    env_out: &Path,
    anchors_out: Option<&Path>,
    env: &EnvSnapshot,
    options: &ResolveOptions,
) -> Result<AnchorRegistry, Error> {
    let assignments = load_env_file(env_in)?;
    let mut registry = match &options.anchor_in {
        Some(path) => AnchorRegistry::read_manifest(path)?,
        None => AnchorRegistry::new(),
    };

    let resolved = {
        let mut resolver =
            LazyResolver::new(&assignments, env, &mut registry, options.preserve_anchors);
        resolver.resolve_all()?
    };

    write_env_file(env_out, &assignments, &resolved)?;
    if let Some(anchors_out) = anchors_out {
        registry.capture_values(&resolved);
        registry.write_manifest(anchors_out)?;
    }
    Ok(registry)
}
