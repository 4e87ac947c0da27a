//! Layered image-assembly configuration.
//!
//! `igconf` is the configuration front-end of a layered image-assembly
//! tool. Layers are YAML files carrying a structured `X-Env-*` metadata
//! header; this crate discovers them across tagged search roots, computes
//! a deterministic build order from their dependency graph, resolves the
//! environment variables they emit under a four-level set-policy algebra
//! (`force` / `immediate` / `lazy` / `skip`), expands `${VAR}` and
//! `${@ANCHOR}` references, and writes the resolved env file, anchor
//! manifest and layer-order file consumed by the downstream shell stages.
//!
//! # Pipeline
//!
//! ```text
//! env-in ──► LayerManager ──► VariableResolver ──► LazyResolver ──► env-out
//!             (discover,       (policy merge,       (expand ${..},    (+ order,
//!              build order)     triggers,            anchors)          anchors)
//!                               conflicts)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use igconf::env::EnvSnapshot;
//! use igconf::manager::{LayerManager, ManagerOptions};
//!
//! # fn main() -> Result<(), igconf::Error> {
//! let env = EnvSnapshot::capture();
//! let manager = LayerManager::discover(
//!     &["layer=./layer".to_string()],
//!     ManagerOptions::default(),
//!     &env,
//! )?;
//! let order = manager.build_order(&["app".to_string()])?;
//! println!("{order:?}");
//! # Ok(())
//! # }
//! ```
//!
//! The process environment is never mutated: reads and writes go through
//! an explicit [`EnvSnapshot`] captured once per run.

pub mod cli;
pub mod env;
pub mod envfile;
pub mod error;
pub mod expand;
pub mod layer;
pub mod manager;
pub mod metadata;
pub mod pipeline;
pub mod resolver;
pub mod snapshot;
pub mod validator;
pub mod vars;

pub use env::EnvSnapshot;
pub use error::Error;
pub use expand::{AnchorRegistry, LazyResolver};
pub use layer::{Layer, LayerKind};
pub use manager::{LayerManager, ManagerOptions};
pub use metadata::{Finding, Metadata, ValidationReport};
pub use validator::Validator;
pub use vars::{Position, SetPolicy, TriggerRule, VarDef};
