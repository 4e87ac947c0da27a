//! Benchmarks for metadata parsing and variable resolution.
//!
//! Run with: cargo bench --package igconf

use std::path::Path;

use igconf::env::EnvSnapshot;
use igconf::metadata::Metadata;
use igconf::resolver;
use igconf::vars::{Position, SetPolicy, VarDef};
use indexmap::IndexMap;

fn main() {
    divan::main();
}

fn layer_text(vars: usize) -> String {
    let mut text = String::from(
        "# METABEGIN\n# X-Env-Layer-Name: bench\n# X-Env-VarPrefix: bench\n",
    );
    for i in 0..vars {
        text.push_str(&format!("# X-Env-Var-opt{i}: value{i}\n"));
        text.push_str(&format!("# X-Env-Var-opt{i}-Desc: option {i}\n"));
        text.push_str(&format!("# X-Env-Var-opt{i}-Valid: string\n"));
    }
    text.push_str("# METAEND\n");
    text
}

#[divan::bench(args = [8, 64, 256])]
fn parse_metadata(bencher: divan::Bencher, vars: usize) {
    let text = layer_text(vars);
    let env = EnvSnapshot::empty();
    bencher.bench(|| {
        Metadata::from_text(
            divan::black_box(&text),
            Path::new("bench.yaml"),
            &env,
            false,
        )
        .unwrap()
    });
}

fn definitions(names: usize, layers: u32) -> resolver::Definitions {
    let mut defs: resolver::Definitions = IndexMap::new();
    for i in 0..names {
        let name = format!("IGconf_bench_opt{i}");
        let list = (0..layers)
            .map(|layer| VarDef {
                name: name.clone(),
                short: format!("opt{i}"),
                value: format!("value{layer}"),
                description: String::new(),
                required: false,
                validator: None,
                rule: String::new(),
                policy: if layer == layers - 1 {
                    SetPolicy::Lazy
                } else {
                    SetPolicy::Immediate
                },
                source_layer: format!("layer{layer}"),
                position: Position::new(layer),
                anchor: None,
                triggers: Vec::new(),
                conflicts: Vec::new(),
            })
            .collect();
        defs.insert(name, list);
    }
    defs
}

#[divan::bench(args = [16, 128])]
fn resolve_definitions(bencher: divan::Bencher, names: usize) {
    let defs = definitions(names, 4);
    let env = EnvSnapshot::empty();
    bencher.bench(|| resolver::resolve(divan::black_box(&defs), &env).unwrap());
}
