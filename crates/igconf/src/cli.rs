//! Command-line surface.
//!
//! Subcommands: `pipeline` (apply layers and resolve in one step),
//! `resolve` (env/anchor expansion only), `layer` (read-only layer
//! utilities in doc mode), `metadata` (single-file parse/validate/lint)
//! and `env` (invocation snapshot). Exit code 0 on success, 1 on any
//! validation, parse or generator failure.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::expand::{ResolveOptions, resolve_env_file};
use crate::manager::{LayerManager, ManagerOptions};
use crate::metadata::{Finding, Metadata, ValidationReport};
use crate::pipeline::{self, PipelineOptions};
use crate::resolver::{self, ApplyStatus};
use crate::snapshot::{Snapshot, SnapshotOptions};
use crate::validator::validation_help;

const DEFAULT_PATHS: &str = "layer=./layer:device=./device:image=./image";
const MAX_LIST_DESC: usize = 60;

/// Layered image-assembly configuration tool.
#[derive(Debug, Parser)]
#[command(name = "igconf", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply layers then resolve env/anchors in one step
    Pipeline(PipelineArgs),
    /// Resolve env files and emit anchor manifests
    Resolve(ResolveArgs),
    /// Layer utilities
    Layer(LayerArgs),
    /// Layer metadata utilities
    Metadata(MetadataArgs),
    /// Invocation snapshot as JSON
    Env(EnvArgs),
}

#[derive(Debug, Args)]
struct PipelineArgs {
    /// Env file produced by the config stage
    #[arg(long)]
    env_in: PathBuf,

    /// Layers to apply (names or file paths)
    #[arg(long, num_args = 1.., required = true)]
    layers: Vec<String>,

    /// Colon-separated search paths for layers (use tag=/path to name each root)
    #[arg(long, short = 'p', default_value = DEFAULT_PATHS)]
    path: String,

    /// File patterns to search
    #[arg(long, num_args = 1.., default_values = ["*.yaml", "*.yml"])]
    patterns: Vec<String>,

    /// Write fully resolved env (anchors expanded)
    #[arg(long)]
    env_out: PathBuf,

    /// Write layer order (tag:relative) to this file
    #[arg(long)]
    order_out: Option<PathBuf>,

    /// Write the anchor manifest (JSON) to this file
    #[arg(long)]
    anchors_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Input env file produced by config/layer stages
    #[arg(long)]
    env_in: PathBuf,

    /// Output env file
    #[arg(long)]
    env_out: PathBuf,

    /// JSON file capturing anchors and their values
    #[arg(long)]
    anchors_out: PathBuf,

    /// Existing anchor manifest to preload values (expands anchors)
    #[arg(long)]
    anchor_in: Option<PathBuf>,

    /// Preserve ${@ANCHOR} placeholders (default when no --anchor-in)
    #[arg(long)]
    preserve_anchors: bool,
}

#[derive(Debug, Args)]
struct LayerArgs {
    /// Colon-separated search paths for layers (use tag=/path to name each root)
    #[arg(long, short = 'p', default_value = DEFAULT_PATHS)]
    path: String,

    /// File patterns to search
    #[arg(long, num_args = 1.., default_values = ["*.yaml", "*.yml"])]
    patterns: Vec<String>,

    /// List all available layers
    #[arg(long, short = 'l')]
    list: bool,

    /// Show detailed information for a layer (use layer name)
    #[arg(long, value_name = "LAYER")]
    describe: Option<String>,

    /// Show layers that depend on the specified layer
    #[arg(long, alias = "reverse-deps", value_name = "LAYER")]
    rdep: Option<String>,

    /// Show search paths
    #[arg(long)]
    show_paths: bool,

    /// Generate boilerplate layer template with metadata
    #[arg(long = "gen")]
    generate: bool,
}

#[derive(Debug, Args)]
struct MetadataArgs {
    /// Parse metadata from file and output environment variables
    #[arg(long, value_name = "PATH")]
    parse: Option<PathBuf>,

    /// Validate metadata and environment variables
    #[arg(long, value_name = "PATH")]
    validate: Option<PathBuf>,

    /// Describe layer and variable information
    #[arg(long, value_name = "PATH")]
    describe: Option<PathBuf>,

    /// Lint metadata syntax and field names (no env var validation)
    #[arg(long, value_name = "PATH")]
    lint: Option<PathBuf>,

    /// Generate boilerplate metadata template
    #[arg(long = "gen")]
    generate: bool,

    /// Show validation help
    #[arg(long)]
    help_validation: bool,

    /// Write key=value pairs to file (works with --parse)
    #[arg(long, value_name = "FILE")]
    write_out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct EnvArgs {
    /// Root of the tool tree
    #[arg(long, env = "IGROOT", default_value = ".")]
    root: PathBuf,

    /// Primary config file
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Build directory
    #[arg(short = 'B', long)]
    build_dir: Option<PathBuf>,

    /// Custom source tree override
    #[arg(short = 'S', long)]
    srcroot: Option<PathBuf>,

    /// Interactive mode
    #[arg(short = 'I', long)]
    interactive: bool,

    /// Build only filesystem, skip image generation
    #[arg(short = 'f', long)]
    fs_only: bool,

    /// Skip filesystem generation, build image only
    #[arg(short = 'i', long)]
    image_only: bool,

    /// Emit shell-compatible assignments instead of JSON
    #[arg(long)]
    shell: bool,

    /// Overrides (key=value, supply after --)
    #[arg(last = true)]
    overrides: Vec<String>,
}

/// Dispatches a parsed command line.
///
/// # Errors
///
/// Returns the underlying pipeline error; callers render it through
/// miette and exit non-zero.
pub fn run(cli: Cli) -> Result<ExitCode, Error> {
    match cli.command {
        Command::Pipeline(args) => run_pipeline(&args),
        Command::Resolve(args) => run_resolve(&args),
        Command::Layer(args) => run_layer(&args),
        Command::Metadata(args) => run_metadata(&args),
        Command::Env(args) => run_env(&args),
    }
}

fn split_paths(spec: &str) -> Vec<String> {
    spec.split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

fn run_pipeline(args: &PipelineArgs) -> Result<ExitCode, Error> {
    let mut env = EnvSnapshot::capture();
    pipeline::run(
        &PipelineOptions {
            env_in: args.env_in.clone(),
            layers: args.layers.clone(),
            search_paths: split_paths(&args.path),
            patterns: args.patterns.clone(),
            env_out: args.env_out.clone(),
            order_out: args.order_out.clone(),
            anchors_out: args.anchors_out.clone(),
        },
        &mut env,
    )?;
    Ok(ExitCode::SUCCESS)
}

fn run_resolve(args: &ResolveArgs) -> Result<ExitCode, Error> {
    let env = EnvSnapshot::capture();
    let preserve = args.preserve_anchors || args.anchor_in.is_none();
    resolve_env_file(
        &args.env_in,
        &args.env_out,
        Some(&args.anchors_out),
        &env,
        &ResolveOptions {
            preserve_anchors: preserve,
            anchor_in: args.anchor_in.clone(),
        },
    )?;
    Ok(ExitCode::SUCCESS)
}

fn run_layer(args: &LayerArgs) -> Result<ExitCode, Error> {
    if args.generate {
        println!("{LAYER_BOILERPLATE}");
        return Ok(ExitCode::SUCCESS);
    }
    if !(args.list || args.describe.is_some() || args.rdep.is_some() || args.show_paths) {
        eprintln!("Error: No action specified. Use -h or --help for available options.");
        return Ok(ExitCode::FAILURE);
    }

    // Layer commands are read-only: doc mode avoids running generators and
    // keeps unexpanded placeholders visible.
    let env = EnvSnapshot::capture();
    let manager = LayerManager::discover(
        &split_paths(&args.path),
        ManagerOptions {
            patterns: args.patterns.clone(),
            doc_mode: true,
        },
        &env,
    )?;
    println!();

    if args.show_paths {
        show_search_paths(&manager);
        println!();
    }

    if args.list {
        show_search_paths(&manager);
        println!();
        list_layers(&manager);
    }

    if let Some(target) = &args.rdep {
        let Some(name) = manager.resolve_layer_name(target)? else {
            println!("Layer '{target}' not found");
            return Ok(ExitCode::FAILURE);
        };
        let reverse = manager.reverse_dependencies(&name);
        if !reverse.is_empty() {
            println!("Reverse dependencies for '{name}':");
            println!();
            for dep in &reverse {
                if let Some(info) = manager.layer(dep) {
                    println!("Layer: {}", info.name);
                    println!("Category: {}", info.category);
                    println!("Description: {}", info.description);
                    println!();
                }
            }
            println!("{} layer(s) depend on '{name}'", reverse.len());
        }
    }

    if let Some(target) = &args.describe {
        let Some(name) = manager.resolve_layer_name(target)? else {
            println!("Layer '{target}' not found");
            return Ok(ExitCode::FAILURE);
        };
        describe_layer(&manager, &name);
    }

    Ok(ExitCode::SUCCESS)
}

fn show_search_paths(manager: &LayerManager) {
    println!("Layer search paths:");
    for (i, root) in manager.search_roots().iter().enumerate() {
        let exists = if root.path.exists() { "+" } else { "!" };
        println!("  {}. {exists} {}={}", i + 1, root.tag, root.path.display());
    }
}

fn list_layers(manager: &LayerManager) {
    let mut categories: std::collections::BTreeMap<String, Vec<String>> =
        std::collections::BTreeMap::new();
    for name in manager.layer_names() {
        if let Some(layer) = manager.layer(name) {
            categories
                .entry(layer.category.clone())
                .or_default()
                .push(name.to_string());
        }
    }

    let name_width = categories
        .values()
        .flatten()
        .map(String::len)
        .max()
        .unwrap_or(0);

    println!("Available layers:");
    for (category, mut names) in categories {
        println!("Category: {category}");
        names.sort();
        for name in names {
            let Some(layer) = manager.layer(&name) else {
                continue;
            };
            let mut desc = layer.description.split_whitespace().collect::<Vec<_>>().join(" ");
            if desc.chars().count() > MAX_LIST_DESC {
                desc = desc.chars().take(MAX_LIST_DESC - 3).collect();
                desc.push_str("...");
            }
            println!("  {name:<name_width$}  {desc}");

            let deps = join_or_none(&layer.requires);
            println!("    deps: {deps}");
            println!("    provides: {}", join_or_none(&layer.provides));
            println!(
                "    requires-provider: {}",
                join_or_none(&layer.requires_provider)
            );
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn describe_layer(manager: &LayerManager, name: &str) {
    let Some(layer) = manager.layer(name) else {
        return;
    };
    println!("Layer: {}", layer.name);
    println!("Version: {}", layer.version);
    println!("Category: {}", layer.category);
    println!("Description: {}", layer.description);
    println!("Type: {}", layer.kind);
    if layer.is_dynamic() && !layer.generator.is_empty() {
        println!("Generator: {}", layer.generator);
    }
    if !layer.provides.is_empty() {
        println!("Provides: {}", layer.provides.join(", "));
    }
    if !layer.requires_provider.is_empty() {
        println!("Requires Provider: {}", layer.requires_provider.join(", "));
    }
    let rel = manager
        .relative_spec(name)
        .unwrap_or_else(|| "<unknown>".to_string());
    println!("Path: {rel}");

    if !layer.requires.is_empty() {
        println!("Depends:");
        let mut seen = HashSet::new();
        show_deps(manager, name, &mut seen, 1);
    }
    if !layer.conflicts.is_empty() {
        println!("Conflicts: {}", layer.conflicts.join(", "));
    }

    if let Some(meta) = manager.metadata(name) {
        if !meta.vars().is_empty() {
            println!();
            print_variables(meta, 2);
        }
    }
}

fn show_deps(manager: &LayerManager, layer: &str, seen: &mut HashSet<String>, indent: usize) {
    let pad = "  ".repeat(indent);
    for dep in manager.dependencies(layer) {
        if !seen.insert(dep.clone()) {
            println!("{pad}- {dep} (already shown)");
            continue;
        }
        let rel = manager
            .relative_spec(&dep)
            .unwrap_or_else(|| "<unknown>".to_string());
        println!("{pad}- {dep}: {rel}");
        show_deps(manager, &dep, seen, indent + 1);
    }
}

fn print_variables(meta: &Metadata, indent: usize) {
    if meta.vars().is_empty() {
        return;
    }
    let pad = " ".repeat(indent);
    println!("{pad}Environment Variables:");
    if !meta.var_prefix().is_empty() {
        println!("{pad}  Variable Prefix: {}", meta.var_prefix());
    }
    println!();
    for (name, def) in meta.vars() {
        println!("{pad}  Variable: {name}");
        println!("{pad}    Default Value: {}", def.value);
        if !def.description.is_empty() {
            println!("{pad}    Description: {}", def.description);
        }
        if let Some(anchor) = &def.anchor {
            println!("{pad}    Anchor: {anchor}");
        }
        if def.validator.is_some() {
            println!("{pad}    Validation: {} [{}]", def.rule, def.rule_description());
        }
        println!("{pad}    Set Policy: {}", def.policy);
        println!();
    }
}

fn run_metadata(args: &MetadataArgs) -> Result<ExitCode, Error> {
    if args.generate {
        println!("{METADATA_BOILERPLATE}");
        return Ok(ExitCode::SUCCESS);
    }
    if args.help_validation {
        println!("{}", validation_help());
        return Ok(ExitCode::SUCCESS);
    }

    let (command, path) = if let Some(path) = &args.parse {
        ("parse", path)
    } else if let Some(path) = &args.validate {
        ("validate", path)
    } else if let Some(path) = &args.describe {
        ("describe", path)
    } else if let Some(path) = &args.lint {
        ("lint", path)
    } else {
        eprintln!("Error: No command specified. Use -h or --help for available options.");
        return Ok(ExitCode::FAILURE);
    };

    let mut env = EnvSnapshot::capture();
    let meta = Metadata::load(path, &env, false)?;

    match command {
        "parse" => {
            let resolved = meta.resolved_vars(&env)?;
            let (_applied, actions) = resolver::apply(&resolved, &mut env);
            for action in &actions {
                match action.status {
                    ApplyStatus::Set | ApplyStatus::LazySet => println!(
                        "[SET] {}={}",
                        action.name,
                        action.value.as_deref().unwrap_or_default()
                    ),
                    ApplyStatus::ForceSet => println!(
                        "[FORCE_SET] {}={}",
                        action.name,
                        action.value.as_deref().unwrap_or_default()
                    ),
                    ApplyStatus::AlreadySet => {
                        println!("[SKIP] {} (already set)", action.name);
                    }
                    ApplyStatus::SkipPolicy | ApplyStatus::EmptyUnset => {
                        println!("[SKIP] {} (Set: false/skip)", action.name);
                    }
                }
            }

            let report = meta.validate(&env)?;
            let has_errors = render_report(&report);
            if has_errors {
                return Ok(ExitCode::FAILURE);
            }

            if let Some(write_out) = &args.write_out {
                let mut out = String::new();
                for (name, def) in &resolved {
                    if !def.should_set() {
                        continue;
                    }
                    let value = env.effective(name, &def.value);
                    out.push_str(&format!("{name}=\"{value}\"\n"));
                }
                std::fs::write(write_out, out).map_err(|e| Error::io(write_out, e))?;
                println!("Environment variables written to: {}", write_out.display());
            } else {
                println!();
                for (name, def) in meta.vars() {
                    println!("{name}={}", env.effective(name, &def.value));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        "validate" => {
            let report = meta.validate(&env)?;
            let has_errors = render_report(&report);
            if has_errors {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        "lint" => {
            let report = meta.lint();
            let has_errors = render_report(&report);
            if has_errors {
                Ok(ExitCode::FAILURE)
            } else {
                println!("OK");
                Ok(ExitCode::SUCCESS)
            }
        }
        _ => {
            // describe
            let mut has_content = false;
            if let Some(layer) = meta.layer() {
                println!("Layer Information:");
                println!("  Name: {}", layer.name);
                println!("  Version: {}", layer.version);
                println!("  Category: {}", layer.category);
                if !layer.description.is_empty() {
                    println!("  Description: {}", layer.description);
                }
                println!("  Required Dependencies: {}", join_or_none(&layer.requires));
                println!("  Conflicts: {}", join_or_none(&layer.conflicts));
                println!("  Filename: {}", layer.config_file);
                if !meta.required_vars().is_empty() {
                    println!("  Required Variables: {}", meta.required_vars().join(", "));
                }
                if !meta.optional_vars().is_empty() {
                    println!("  Optional Variables: {}", meta.optional_vars().join(", "));
                }
                println!();
                has_content = true;
            }
            if !meta.vars().is_empty() {
                print_variables(&meta, 0);
                has_content = true;
            }
            if !has_content {
                println!("No layer information or environment variables defined in metadata");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prints every finding with its status tag. Returns true when any finding
/// fails validation; unsupported fields additionally dump the schema.
fn render_report(report: &ValidationReport) -> bool {
    let mut unsupported = 0usize;
    for (_, finding) in report.entries() {
        let message = finding.message();
        match finding {
            Finding::UnsupportedField { .. } => {
                unsupported += 1;
                println!("[ERROR] {message}");
            }
            Finding::MissingVarPrefix
            | Finding::OrphanedAttributes { .. }
            | Finding::MissingLayerName
            | Finding::NoMetadataFields
            | Finding::InvalidRule { .. }
            | Finding::InvalidValue { .. }
            | Finding::Conflict { .. } => println!("[ERROR] {message}"),
            Finding::MissingRequired { .. } | Finding::MissingRequiredVar { .. } => {
                println!("[FAIL] {message}");
            }
            Finding::Validated { valid, .. } | Finding::RequiredValidated { valid, .. } => {
                let tag = if *valid { "OK" } else { "FAIL" };
                println!("[{tag}] {message}");
            }
            Finding::OptionalValidated { valid, .. } => {
                let tag = if *valid { "OK" } else { "WARN" };
                println!("[{tag}] {message}");
            }
            Finding::NoRule { .. }
            | Finding::RequiredNoRule { .. }
            | Finding::OptionalNoRule { .. } => println!("[SKIP] {message}"),
            Finding::OptionalUnset { .. } | Finding::Unset { .. } => {
                println!("[INFO] {message}");
            }
            Finding::LazyOverridden { .. } => println!("[INFO] {message}"),
        }
    }

    if unsupported > 0 {
        println!();
        println!("Supported fields:");
        for field in crate::metadata::fields::supported_fields() {
            println!("  {field}");
        }
    }

    report.has_errors(false)
}

fn run_env(args: &EnvArgs) -> Result<ExitCode, Error> {
    let snapshot = Snapshot::collect(
        &args.root,
        &SnapshotOptions {
            config_file: args.config.clone(),
            build_dir: args.build_dir.clone(),
            srcroot: args.srcroot.clone(),
            interactive: args.interactive,
            only_fs: args.fs_only,
            only_image: args.image_only,
            overrides: args.overrides.clone(),
        },
    )?;
    if args.shell {
        print!("{}", snapshot.to_shell());
    } else {
        print!("{}", snapshot.to_json()?);
    }
    Ok(ExitCode::SUCCESS)
}

const METADATA_BOILERPLATE: &str = r#"# METABEGIN
# X-Env-Layer-Name: my-layer
# X-Env-Layer-Desc: Layer description
# X-Env-Layer-Version: 1.0.0
# X-Env-Layer-Category: general
#
# X-Env-Layer-Requires:
# X-Env-Layer-Conflicts:
#
# X-Env-VarPrefix: my
#
# X-Env-VarRequires: HOME,IGconf_device_user1,DOCKER_HOST
# X-Env-VarRequires-Valid: regex:^/.*,string,regex:^(unix|tcp)://.*
#
# X-Env-VarOptional: LOG_LEVEL
# X-Env-VarOptional-Valid: string
#
# X-Env-Var-hostname: localhost
# X-Env-Var-hostname-Desc: Server hostname
# X-Env-Var-hostname-Required: false
# X-Env-Var-hostname-Valid: regex:^[a-zA-Z0-9.-]+$
# X-Env-Var-hostname-Set: true
#
# X-Env-Var-port: 8080
# X-Env-Var-port-Desc: Port number (integer range)
# X-Env-Var-port-Required: false
# X-Env-Var-port-Valid: int:1024-65535
# X-Env-Var-port-Set: true
#
# X-Env-Var-environment: development
# X-Env-Var-environment-Desc: Deployment environment (enum)
# X-Env-Var-environment-Required: false
# X-Env-Var-environment-Valid: development,staging,production
# X-Env-Var-environment-Set: true
#
# X-Env-Var-debug: false
# X-Env-Var-debug-Desc: Enable debug mode (boolean)
# X-Env-Var-debug-Required: false
# X-Env-Var-debug-Valid: bool
# X-Env-Var-debug-Set: true
#
# X-Env-Var-component: frontend
# X-Env-Var-component-Desc: Application component (alphanumeric keywords)
# X-Env-Var-component-Required: false
# X-Env-Var-component-Valid: keywords:frontend,backend,database,cache,worker
# X-Env-Var-component-Set: true
#
# METAEND"#;

const LAYER_BOILERPLATE: &str = r#"# METABEGIN
# X-Env-Layer-Name: my-example-layer
# X-Env-Layer-Desc: Example layer with options
# X-Env-Layer-Version: 1.0.0
# X-Env-Layer-Provides: debian-base
# X-Env-Layer-RequiresProvider:
# X-Env-Layer-Requires: base-layer,common-tools

# X-Env-VarRequires: SITE
# X-Env-VarRequires-Valid: regex:^/.*

# X-Env-VarPrefix: example

# X-Env-Var-service_port: 8080
# X-Env-Var-service_port-Desc: Port number for the service
# X-Env-Var-service_port-Required: false
# X-Env-Var-service_port-Valid: int:1024-65535
# X-Env-Var-service_port-Set: true
# METAEND
---
mmdebstrap:
  mirrors:
    - deb http://archive.example.com/debian suite main
  packages:
    - ca-certificates
  customize-hooks:
    - echo ${SITE}:${IGconf_example_service_port} > ${1}/port.spec

# Using:
# 1. Copy this template to your desired location.
# 2. Customise the X-Env-* fields for your layer
# 3. Customise the YAML for your use case
# 4. For validation, run: igconf metadata --help-validation
#
# Notes:
# Depending on script needs, YAML scalar/block constructs may be required."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_pipeline_invocation() {
        let cli = Cli::try_parse_from([
            "igconf", "pipeline", "--env-in", "in.env", "--layers", "app", "base", "--env-out",
            "out.env",
        ])
        .unwrap();
        match cli.command {
            Command::Pipeline(args) => {
                assert_eq!(args.layers, ["app", "base"]);
                assert_eq!(args.path, DEFAULT_PATHS);
            }
            _ => panic!("expected pipeline subcommand"),
        }
    }

    #[test]
    fn cli_requires_layers_for_pipeline() {
        assert!(
            Cli::try_parse_from([
                "igconf", "pipeline", "--env-in", "a", "--env-out", "b"
            ])
            .is_err()
        );
    }

    #[test]
    fn cli_parses_env_overrides_after_dashes() {
        let cli = Cli::try_parse_from(["igconf", "env", "--", "a=1", "b=2"]).unwrap();
        match cli.command {
            Command::Env(args) => assert_eq!(args.overrides, ["a=1", "b=2"]),
            _ => panic!("expected env subcommand"),
        }
    }

    #[test]
    fn split_paths_drops_empty_entries() {
        assert_eq!(
            split_paths("layer=/a::device=/b:"),
            vec!["layer=/a".to_string(), "device=/b".to_string()]
        );
    }

    #[test]
    fn boilerplates_parse_cleanly() {
        let env = EnvSnapshot::empty();
        let meta = Metadata::from_text(
            METADATA_BOILERPLATE,
            std::path::Path::new("boilerplate.yaml"),
            &env,
            true,
        )
        .unwrap();
        assert_eq!(meta.layer().unwrap().name, "my-layer");
        assert!(meta.vars().len() >= 5);

        let layer = Metadata::from_text(
            LAYER_BOILERPLATE,
            std::path::Path::new("layer.yaml"),
            &env,
            true,
        )
        .unwrap();
        assert_eq!(layer.layer().unwrap().name, "my-example-layer");
        assert_eq!(layer.layer().unwrap().provides, vec!["debian-base"]);
    }
}
