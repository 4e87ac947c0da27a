//! Metadata parsing against real files on disk.

use std::path::Path;

use igconf::env::EnvSnapshot;
use igconf::error::Error;
use igconf::manager::{LayerManager, ManagerOptions};
use igconf::metadata::Metadata;

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[test]
fn file_placeholders_resolve_to_source_location() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "dyn.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: dyn\n\
         # X-Env-Layer-Type: dynamic\n\
         # X-Env-Layer-Generator: gen-tool ${DIRECTORY}/${FILENAME}\n\
         # METAEND\n",
    );
    let path = dir.path().join("dyn.yaml");
    let meta = Metadata::load(&path, &EnvSnapshot::empty(), true).unwrap();
    let layer = meta.layer().unwrap();
    let abs = std::path::absolute(&path).unwrap();
    assert_eq!(
        layer.generator,
        format!(
            "gen-tool {}/{}",
            abs.parent().unwrap().display(),
            "dyn.yaml"
        )
    );
}

#[test]
fn escaped_placeholder_survives() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "x.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: x\n\
         # X-Env-VarPrefix: x\n\
         # X-Env-Var-tmpl: \\${FILENAME}\n\
         # METAEND\n",
    );
    let meta = Metadata::load(
        &dir.path().join("x.yaml"),
        &EnvSnapshot::empty(),
        false,
    )
    .unwrap();
    assert_eq!(meta.vars()["IGconf_x_tmpl"].value, "${FILENAME}");
}

#[test]
fn duplicate_layer_names_across_roots_are_fatal() {
    let a = tempfile::TempDir::new().unwrap();
    let b = tempfile::TempDir::new().unwrap();
    let layer = "# METABEGIN\n# X-Env-Layer-Name: shared\n# METAEND\n";
    write(a.path(), "one.yaml", layer);
    write(b.path(), "two.yaml", layer);

    let result = LayerManager::discover(
        &[
            format!("first={}", a.path().display()),
            format!("second={}", b.path().display()),
        ],
        ManagerOptions::default(),
        &EnvSnapshot::empty(),
    );
    assert!(matches!(result, Err(Error::DuplicateLayer { .. })));
}

#[test]
fn partially_broken_repository_still_serves_valid_layers() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "good.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: good\n\
         # X-Env-VarPrefix: g\n\
         # X-Env-Var-mode: on\n\
         # METAEND\n",
    );
    // Unsupported attribute suffix fails lint and is captured.
    write(
        dir.path(),
        "bad.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: bad\n\
         # X-Env-VarPrefix: b\n\
         # X-Env-Var-mode: on\n\
         # X-Env-Var-mode-Frobnicate: yes\n\
         # METAEND\n",
    );

    let manager = LayerManager::discover(
        &[format!("layer={}", dir.path().display())],
        ManagerOptions::default(),
        &EnvSnapshot::empty(),
    )
    .unwrap();

    assert!(manager.layer("good").is_some());
    assert!(manager.layer("bad").is_none());
    assert!(manager.build_order(&["good".to_string()]).is_ok());

    match manager.build_order(&["bad".to_string()]) {
        Err(Error::LayerUnavailable { reason, .. }) => {
            assert!(reason.contains("failed lint"), "{reason}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn direct_field_files_load_without_block() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "direct.yaml",
        "X-Env-Layer-Name: direct\nX-Env-VarPrefix: d\nX-Env-Var-flag: 1\n",
    );
    let meta = Metadata::load(
        &dir.path().join("direct.yaml"),
        &EnvSnapshot::empty(),
        false,
    )
    .unwrap();
    assert_eq!(meta.layer().unwrap().name, "direct");
    assert!(meta.vars().contains_key("IGconf_d_flag"));
}

#[test]
fn metadata_with_igconf_short_name_is_not_reprefixed() {
    let dir = tempfile::TempDir::new().unwrap();
    write(
        dir.path(),
        "sys.yaml",
        "# METABEGIN\n\
         # X-Env-Layer-Name: sys\n\
         # X-Env-VarPrefix: sys\n\
         # X-Env-Var-IGconf_sys_workroot: /work\n\
         # METAEND\n",
    );
    let meta = Metadata::load(
        &dir.path().join("sys.yaml"),
        &EnvSnapshot::empty(),
        false,
    )
    .unwrap();
    assert!(meta.vars().contains_key("IGconf_sys_workroot"));
}
