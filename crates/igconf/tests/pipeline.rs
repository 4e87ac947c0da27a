//! End-to-end pipeline scenarios on temp-dir layer fixtures.

use std::path::{Path, PathBuf};

use igconf::env::EnvSnapshot;
use igconf::error::Error;
use igconf::pipeline::{self, PipelineOptions};

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("layer")).unwrap();
        Self { dir }
    }

    fn layer(&self, rel: &str, content: &str) -> &Self {
        let path = self.dir.path().join("layer").join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        self
    }

    fn env_in(&self, content: &str) -> PathBuf {
        let path = self.dir.path().join("in.env");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn options(&self, layers: &[&str]) -> PipelineOptions {
        PipelineOptions {
            env_in: self.path("in.env"),
            layers: layers.iter().map(|l| (*l).to_string()).collect(),
            search_paths: vec![format!("layer={}", self.path("layer").display())],
            patterns: vec!["*.yaml".to_string(), "*.yml".to_string()],
            env_out: self.path("out.env"),
            order_out: None,
            anchors_out: None,
        }
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }
}

fn env_lines(text: &str) -> Vec<(&str, &str)> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .collect()
}

#[test]
fn s1_force_in_later_layer_wins_over_immediate() {
    let fx = Fixture::new();
    fx.layer(
        "a.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: a\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-port: 1\n\
         # X-Env-Var-port-Set: immediate\n\
         # METAEND\n",
    )
    .layer(
        "b.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: b\n\
         # X-Env-Layer-Requires: a\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-port: 2\n\
         # X-Env-Var-port-Set: force\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    pipeline::run(&fx.options(&["b"]), &mut env).unwrap();

    assert_eq!(env.get("IGconf_x_port"), Some("2"));
    let out = fx.read("out.env");
    assert!(env_lines(&out).contains(&("IGconf_x_port", "2")), "{out}");
}

#[test]
fn s2_env_override_fires_trigger() {
    let fx = Fixture::new();
    fx.layer(
        "mode.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: mode\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-mode: off\n\
         # X-Env-Var-mode-Set: immediate\n\
         # X-Env-Var-mode-Triggers: when=on set IGconf_x_port=9000\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env: EnvSnapshot = [("IGconf_x_mode", "on")].into_iter().collect();
    pipeline::run(&fx.options(&["mode"]), &mut env).unwrap();

    // The environment's value survived and the trigger fired.
    assert_eq!(env.get("IGconf_x_mode"), Some("on"));
    assert_eq!(env.get("IGconf_x_port"), Some("9000"));
    let out = fx.read("out.env");
    assert!(env_lines(&out).contains(&("IGconf_x_port", "9000")), "{out}");
}

#[test]
fn s3_unsatisfied_provider_fails_with_exact_message() {
    let fx = Fixture::new();
    fx.layer(
        "app.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: app\n\
         # X-Env-Layer-RequiresProvider: db\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    let err = pipeline::run(&fx.options(&["app"]), &mut env).unwrap_err();
    assert_eq!(
        err.to_string(),
        "layer 'app' requires provider 'db' but no layer in the dependency chain provides it"
    );
}

#[test]
fn s4_conflict_on_final_values_fails() {
    let fx = Fixture::new();
    fx.layer(
        "conf.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: conf\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-a: 1\n\
         # X-Env-Var-a-Conflicts: b!=0\n\
         # X-Env-Var-b: 7\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    let err = pipeline::run(&fx.options(&["conf"]), &mut env).unwrap_err();
    let rendered = err.to_string();
    assert!(
        matches!(err, Error::Conflict { .. } | Error::Multiple { .. }),
        "unexpected error: {rendered}"
    );
}

#[test]
fn s4_satisfied_conflict_passes() {
    let fx = Fixture::new();
    fx.layer(
        "conf.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: conf\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-a: 1\n\
         # X-Env-Var-a-Conflicts: b!=0\n\
         # X-Env-Var-b: 0\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    pipeline::run(&fx.options(&["conf"]), &mut env).unwrap();
}

#[test]
fn s5_anchor_expansion_and_manifest() {
    let fx = Fixture::new();
    fx.layer(
        "root.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: root\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-root: /opt\n\
         # X-Env-Var-root-Anchor: @ROOT\n\
         # METAEND\n",
    )
    .layer(
        "path.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: path\n\
         # X-Env-Layer-Requires: root\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-path: ${@ROOT}/bin\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut options = fx.options(&["path"]);
    options.anchors_out = Some(fx.path("anchors.json"));
    let mut env = EnvSnapshot::empty();
    pipeline::run(&options, &mut env).unwrap();

    let out = fx.read("out.env");
    assert!(env_lines(&out).contains(&("IGconf_x_path", "/opt/bin")), "{out}");

    let manifest: serde_json::Value =
        serde_json::from_str(&fx.read("anchors.json")).unwrap();
    assert_eq!(
        manifest["anchors"]["@ROOT"]["var"],
        serde_json::json!("IGconf_x_root")
    );
    assert_eq!(
        manifest["anchors"]["@ROOT"]["value"],
        serde_json::json!("/opt")
    );
    assert!(fx.read("anchors.json").ends_with('\n'));
}

#[test]
fn s6_circular_reference_reports_chain() {
    let fx = Fixture::new();
    fx.layer(
        "noop.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: noop\n\
         # METAEND\n",
    );
    fx.env_in("A=${B}\nB=${A}\n");

    let mut env = EnvSnapshot::empty();
    let err = pipeline::run(&fx.options(&["noop"]), &mut env).unwrap_err();
    match err {
        Error::CircularReference { chain } => assert_eq!(chain, "A -> B -> A"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn env_file_values_seed_without_overriding_caller() {
    let fx = Fixture::new();
    fx.layer(
        "noop.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: noop\n\
         # METAEND\n",
    );
    fx.env_in("MODE=file\n");

    let mut env: EnvSnapshot = [("MODE", "caller")].into_iter().collect();
    pipeline::run(&fx.options(&["noop"]), &mut env).unwrap();
    assert_eq!(env.get("MODE"), Some("caller"));
    // The output still carries the assignment, resolved from the caller's
    // value through the policy table.
    let out = fx.read("out.env");
    assert!(env_lines(&out).contains(&("MODE", "file")), "{out}");
}

#[test]
fn order_file_lists_build_order_with_tags() {
    let fx = Fixture::new();
    fx.layer(
        "base.yaml",
        "# METABEGIN\n# X-Env-Layer-Name: base\n# METAEND\n",
    )
    .layer(
        "nested/app.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: app\n\
         # X-Env-Layer-Requires: base\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut options = fx.options(&["app"]);
    options.order_out = Some(fx.path("order.txt"));
    let mut env = EnvSnapshot::empty();
    pipeline::run(&options, &mut env).unwrap();

    assert_eq!(
        fx.read("order.txt"),
        "base=\"layer:base.yaml\"\napp=\"layer:nested/app.yaml\"\n"
    );
}

#[test]
fn missing_required_satisfied_by_trigger_passes_two_phase_validation() {
    // Phase 1 ignores the missing required variable; the trigger injects
    // it during application; phase 2 then sees it set.
    let fx = Fixture::new();
    fx.layer(
        "app.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: app\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-mode: on\n\
         # X-Env-Var-mode-Triggers: when=on set IGconf_x_token=abc\n\
         # X-Env-Var-token:\n\
         # X-Env-Var-token-Required: true\n\
         # X-Env-Var-token-Set: n\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    pipeline::run(&fx.options(&["app"]), &mut env).unwrap();
    assert_eq!(env.get("IGconf_x_token"), Some("abc"));
}

#[test]
fn missing_required_without_trigger_fails_strict_phase() {
    let fx = Fixture::new();
    fx.layer(
        "app.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: app\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-token:\n\
         # X-Env-Var-token-Required: true\n\
         # X-Env-Var-token-Set: n\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    let err = pipeline::run(&fx.options(&["app"]), &mut env).unwrap_err();
    assert!(matches!(err, Error::MissingRequired { .. }), "{err}");
}

#[test]
fn unknown_layer_identifier_fails() {
    let fx = Fixture::new();
    fx.layer(
        "base.yaml",
        "# METABEGIN\n# X-Env-Layer-Name: base\n# METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    let err = pipeline::run(&fx.options(&["nope"]), &mut env).unwrap_err();
    assert!(matches!(err, Error::LayerNotFound { .. }));
}

#[test]
fn igroot_assignment_becomes_anchor() {
    let fx = Fixture::new();
    fx.layer(
        "tools.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: tools\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-tooldir: ${@IGROOT}/bin\n\
         # METAEND\n",
    );
    fx.env_in("IGROOT=/srv/ig\n");

    let mut options = fx.options(&["tools"]);
    options.anchors_out = Some(fx.path("anchors.json"));
    let mut env = EnvSnapshot::empty();
    pipeline::run(&options, &mut env).unwrap();

    let out = fx.read("out.env");
    assert!(
        env_lines(&out).contains(&("IGconf_x_tooldir", "/srv/ig/bin")),
        "{out}"
    );
    let manifest: serde_json::Value =
        serde_json::from_str(&fx.read("anchors.json")).unwrap();
    assert_eq!(
        manifest["anchors"]["@IGROOT"]["value"],
        serde_json::json!("/srv/ig")
    );
}

#[test]
fn resolved_output_is_a_fixed_point() {
    let fx = Fixture::new();
    fx.layer(
        "base.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: base\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-root: /opt\n\
         # X-Env-Var-sub: ${IGconf_x_root}/sub\n\
         # METAEND\n",
    );
    fx.env_in("");

    let mut env = EnvSnapshot::empty();
    pipeline::run(&fx.options(&["base"]), &mut env).unwrap();
    let first = fx.read("out.env");

    // Feed the output back through a second run.
    std::fs::copy(fx.path("out.env"), fx.path("in.env")).unwrap();
    let mut env2 = EnvSnapshot::empty();
    pipeline::run(&fx.options(&["base"]), &mut env2).unwrap();
    assert_eq!(fx.read("out.env"), first);
}

fn write_layer(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn build_order_satisfies_graph_invariants() {
    use igconf::manager::{LayerManager, ManagerOptions};

    let dir = tempfile::TempDir::new().unwrap();
    write_layer(
        dir.path(),
        "base.yaml",
        "# METABEGIN\n# X-Env-Layer-Name: base\n# X-Env-Layer-Provides: rootfs\n# METAEND\n",
    );
    write_layer(
        dir.path(),
        "tools.yaml",
        "# METABEGIN\n# X-Env-Layer-Name: tools\n# X-Env-Layer-Requires: base\n# METAEND\n",
    );
    write_layer(
        dir.path(),
        "app.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: app\n\
         # X-Env-Layer-Requires: tools\n\
         # X-Env-Layer-RequiresProvider: rootfs\n\
         # METAEND\n",
    );

    let manager = LayerManager::discover(
        &[format!("layer={}", dir.path().display())],
        ManagerOptions::default(),
        &EnvSnapshot::empty(),
    )
    .unwrap();
    let order = manager.build_order(&["app".to_string()]).unwrap();

    // Every layer's requires are in the order, before the layer itself.
    for name in &order {
        for dep in manager.dependencies(name) {
            let dep_idx = order.iter().position(|l| l == &dep).unwrap();
            let own_idx = order.iter().position(|l| l == name).unwrap();
            assert!(dep_idx < own_idx, "{dep} must precede {name}");
        }
    }

    // Provider map restricted to the order is injective.
    let mut seen = std::collections::HashSet::new();
    for name in &order {
        for capability in &manager.layer(name).unwrap().provides {
            assert!(seen.insert(capability.clone()));
        }
    }
}
