//! Invocation snapshot for the downstream shell stages.
//!
//! `igconf env` serializes the invocation state (roots, search paths,
//! config file, flags, overrides) as sorted JSON, or as shell assignments
//! ready to be sourced by the build scripts.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Error;

/// A tagged layer search directory.
#[derive(Clone, Debug, Serialize)]
pub struct TaggedPath {
    /// Root tag (for example `IGlayer`).
    pub tag: String,
    /// Absolute directory path.
    pub path: String,
}

/// The search paths exposed to shell consumers.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotPaths {
    /// Config directories, colon-joined.
    pub config: String,
    /// Tagged layer roots.
    pub layer: Vec<TaggedPath>,
    /// Executable search directories.
    pub exec: Vec<String>,
}

/// Host facts recorded for provenance.
#[derive(Clone, Debug, Serialize)]
pub struct SystemInfo {
    /// Host name.
    pub hostname: String,
    /// Operating system.
    pub os: String,
    /// Machine architecture.
    pub machine: String,
}

/// Inputs to [`Snapshot::collect`].
#[derive(Clone, Debug, Default)]
pub struct SnapshotOptions {
    /// Primary config file (name or path).
    pub config_file: Option<String>,
    /// Build directory override.
    pub build_dir: Option<PathBuf>,
    /// Source tree override.
    pub srcroot: Option<PathBuf>,
    /// Interactive mode flag.
    pub interactive: bool,
    /// Build only the filesystem.
    pub only_fs: bool,
    /// Build only the image.
    pub only_image: bool,
    /// Trailing `key=value` overrides.
    pub overrides: Vec<String>,
}

/// The serialized invocation state.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    /// The tool's root tree.
    pub igroot: String,
    /// Source tree override, when distinct from `igroot`.
    pub srcroot: Option<String>,
    /// Resolved config file.
    pub config_file: Option<String>,
    /// Build directory.
    pub build_dir: Option<String>,
    /// Interactive mode flag.
    pub interactive: bool,
    /// Build only the filesystem.
    pub only_fs: bool,
    /// Build only the image.
    pub only_image: bool,
    /// Search paths for config, layers and executables.
    pub paths: SnapshotPaths,
    /// Normalized `key=value` overrides.
    pub overrides: Vec<String>,
    /// Host facts.
    pub system: SystemInfo,
}

impl Snapshot {
    /// Collects the invocation snapshot. Directories that do not exist are
    /// simply left out of the search paths; an explicitly named srcroot,
    /// build dir or config file that does not exist is an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for missing named paths.
    pub fn collect(igroot: &Path, options: &SnapshotOptions) -> Result<Self, Error> {
        let igroot = absolute(igroot);

        let srcroot = match &options.srcroot {
            Some(path) => {
                let path = absolute(path);
                if !path.exists() {
                    return Err(missing(&path, "source directory not found"));
                }
                if same_dir(&path, &igroot) {
                    None
                } else {
                    Some(path)
                }
            }
            None => None,
        };

        let build_dir = match &options.build_dir {
            Some(path) => {
                let path = absolute(path);
                if !path.exists() {
                    return Err(missing(&path, "build directory not found"));
                }
                Some(path)
            }
            None => None,
        };

        let config_dirs = collect_config_dirs(&igroot, srcroot.as_deref());
        let config_file = match &options.config_file {
            Some(raw) => Some(resolve_config_file(raw, &config_dirs)?),
            None => None,
        };

        let overrides = options
            .overrides
            .iter()
            .skip_while(|item| item.as_str() == "--")
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();

        Ok(Self {
            igroot: igroot.display().to_string(),
            srcroot: srcroot.as_ref().map(|p| p.display().to_string()),
            config_file: config_file.map(|p| p.display().to_string()),
            build_dir: build_dir.map(|p| p.display().to_string()),
            interactive: options.interactive,
            only_fs: options.only_fs,
            only_image: options.only_image,
            paths: SnapshotPaths {
                config: config_dirs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":"),
                layer: collect_layer_dirs(&igroot, srcroot.as_deref()),
                exec: collect_exec_dirs(&igroot, srcroot.as_deref()),
            },
            overrides,
            system: SystemInfo {
                hostname: whoami::fallible::hostname()
                    .unwrap_or_else(|_| "unknown".to_string()),
                os: std::env::consts::OS.to_string(),
                machine: std::env::consts::ARCH.to_string(),
            },
        })
    }

    /// The snapshot as pretty-printed JSON with sorted keys and a trailing
    /// newline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialize`] if JSON encoding fails.
    pub fn to_json(&self) -> Result<String, Error> {
        let value = serde_json::to_value(self).map_err(|e| Error::Serialize {
            what: "invocation snapshot",
            message: e.to_string(),
        })?;
        let mut out = serde_json::to_string_pretty(&value).map_err(|e| Error::Serialize {
            what: "invocation snapshot",
            message: e.to_string(),
        })?;
        out.push('\n');
        Ok(out)
    }

    /// The snapshot rendered as shell assignments for the build scripts.
    #[must_use]
    pub fn to_shell(&self) -> String {
        let mut out = String::new();
        let mut emit = |name: &str, value: &str| {
            if !value.is_empty() {
                out.push_str(&format!("{name}=\"{value}\"\n"));
            }
        };

        emit("HOST_CONFIG_PATH", &self.paths.config);
        emit(
            "HOST_CONFIG_FILE",
            self.config_file.as_deref().unwrap_or_default(),
        );
        let layer_spec: Vec<String> = self
            .paths
            .layer
            .iter()
            .map(|entry| format!("{}={}", entry.tag, entry.path))
            .collect();
        emit("HOST_LAYER_PATH", &layer_spec.join(":"));
        emit("HOST_EXEC_PATH", &self.paths.exec.join(":"));
        emit(
            "HOST_BUILD_DIR",
            self.build_dir.as_deref().unwrap_or_default(),
        );
        emit("SRCROOT", self.srcroot.as_deref().unwrap_or_default());
        emit("INTERACTIVE", yn(self.interactive));
        emit("ONLY_FS", yn(self.only_fs));
        emit("ONLY_IMAGE", yn(self.only_image));

        if self.overrides.is_empty() {
            out.push_str("OVERRIDES=()\n");
        } else {
            let quoted: Vec<String> = self
                .overrides
                .iter()
                .map(|item| format!("'{}'", item.replace('\'', "'\"'\"'")))
                .collect();
            out.push_str(&format!("OVERRIDES=({})\n", quoted.join(" ")));
        }
        out
    }
}

fn yn(flag: bool) -> &'static str {
    if flag { "y" } else { "n" }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn missing(path: &Path, message: &str) -> Error {
    Error::io(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, message.to_string()),
    )
}

fn collect_config_dirs(igroot: &Path, srcroot: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(srcroot) = srcroot {
        let candidate = srcroot.join("config");
        if candidate.is_dir() {
            dirs.push(candidate);
        }
    }
    let candidate = igroot.join("config");
    if candidate.is_dir() {
        dirs.push(candidate);
    }
    dirs
}

fn collect_layer_dirs(igroot: &Path, srcroot: Option<&Path>) -> Vec<TaggedPath> {
    let mut dirs = Vec::new();
    if let Some(srcroot) = srcroot {
        for (tag, rel) in [
            ("SRCdevice", "device"),
            ("SRCimage", "image"),
            ("SRClayer", "layer"),
        ] {
            let candidate = srcroot.join(rel);
            if candidate.is_dir() {
                dirs.push(TaggedPath {
                    tag: tag.to_string(),
                    path: candidate.display().to_string(),
                });
            }
        }
    }
    for (tag, rel) in [
        ("IGdevice", "device"),
        ("IGimage", "image"),
        ("IGlayer", "layer"),
    ] {
        let candidate = igroot.join(rel);
        if candidate.is_dir() {
            dirs.push(TaggedPath {
                tag: tag.to_string(),
                path: candidate.display().to_string(),
            });
        }
    }
    dirs
}

fn collect_exec_dirs(igroot: &Path, srcroot: Option<&Path>) -> Vec<String> {
    let mut dirs = Vec::new();
    if let Some(srcroot) = srcroot {
        for rel in ["bin", "bin/generators"] {
            let candidate = srcroot.join(rel);
            if candidate.is_dir() {
                dirs.push(candidate.display().to_string());
            }
        }
    }
    for rel in ["bin", "bin/generators"] {
        let candidate = igroot.join(rel);
        if candidate.is_dir() {
            dirs.push(candidate.display().to_string());
        }
    }
    dirs
}

fn resolve_config_file(raw: &str, config_dirs: &[PathBuf]) -> Result<PathBuf, Error> {
    let candidate = PathBuf::from(raw);
    if candidate.is_absolute() || raw.contains('/') {
        if candidate.exists() {
            return Ok(absolute(&candidate));
        }
        return Err(missing(&candidate, "config file not found"));
    }
    for dir in config_dirs {
        let target = dir.join(raw);
        if target.exists() {
            return Ok(absolute(&target));
        }
    }
    Err(missing(&candidate, "config file not found in search path"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_existing_dirs_only() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("layer")).unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();

        let snapshot = Snapshot::collect(dir.path(), &SnapshotOptions::default()).unwrap();
        assert_eq!(snapshot.paths.layer.len(), 1);
        assert_eq!(snapshot.paths.layer[0].tag, "IGlayer");
        assert_eq!(snapshot.paths.exec.len(), 1);
        assert!(!snapshot.paths.config.is_empty());
        assert!(snapshot.srcroot.is_none());
    }

    #[test]
    fn srcroot_equal_to_igroot_collapses() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = SnapshotOptions {
            srcroot: Some(dir.path().to_path_buf()),
            ..SnapshotOptions::default()
        };
        let snapshot = Snapshot::collect(dir.path(), &options).unwrap();
        assert!(snapshot.srcroot.is_none());
    }

    #[test]
    fn missing_srcroot_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = SnapshotOptions {
            srcroot: Some(dir.path().join("nope")),
            ..SnapshotOptions::default()
        };
        assert!(Snapshot::collect(dir.path(), &options).is_err());
    }

    #[test]
    fn config_file_found_in_search_path() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(dir.path().join("config/site.cfg"), "x").unwrap();
        let options = SnapshotOptions {
            config_file: Some("site.cfg".to_string()),
            ..SnapshotOptions::default()
        };
        let snapshot = Snapshot::collect(dir.path(), &options).unwrap();
        assert!(snapshot.config_file.unwrap().ends_with("site.cfg"));
    }

    #[test]
    fn overrides_are_normalized() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = SnapshotOptions {
            overrides: vec![
                "--".to_string(),
                " a=1 ".to_string(),
                String::new(),
                "b=2".to_string(),
            ],
            ..SnapshotOptions::default()
        };
        let snapshot = Snapshot::collect(dir.path(), &options).unwrap();
        assert_eq!(snapshot.overrides, vec!["a=1", "b=2"]);
    }

    #[test]
    fn json_keys_are_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        let snapshot = Snapshot::collect(dir.path(), &SnapshotOptions::default()).unwrap();
        let json = snapshot.to_json().unwrap();
        assert!(json.ends_with('\n'));
        let build = json.find("\"build_dir\"").unwrap();
        let system = json.find("\"system\"").unwrap();
        assert!(build < system);
    }

    #[test]
    fn shell_rendering_quotes_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = SnapshotOptions {
            interactive: true,
            overrides: vec!["msg=it's".to_string()],
            ..SnapshotOptions::default()
        };
        let snapshot = Snapshot::collect(dir.path(), &options).unwrap();
        let shell = snapshot.to_shell();
        assert!(shell.contains("INTERACTIVE=\"y\""));
        assert!(shell.contains("ONLY_FS=\"n\""));
        assert!(shell.contains("OVERRIDES=('msg=it'\"'\"'s')"));
    }
}
