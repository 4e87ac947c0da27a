//! Policy-based variable resolution.
//!
//! Layers contribute competing definitions for the same variable name; the
//! resolver picks exactly one per name, injects trigger-produced
//! definitions, and applies the winners to the environment overlay.
//!
//! Selection rules, first match wins:
//!
//! 1. any `force` definition, latest by position;
//! 2. any `immediate` definition, name not in the environment, earliest;
//! 3. any `lazy` definition, name not in the environment, latest;
//! 4. only `skip` definitions, latest (kept so required-variable
//!    validation still applies);
//! 5. otherwise the name is in the environment: an `already_set`
//!    definition is synthesized around the environment's value.
//!
//! Triggers from every definition are merged onto the winner, so values
//! sourced from the environment still fire them.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::vars::{ConflictOp, ConflictSpec, SetPolicy, TriggerRule, VarDef};

/// Competing definitions per variable name.
pub type Definitions = IndexMap<String, Vec<VarDef>>;

/// Resolves the definition set, then runs exactly one trigger-injection
/// pass and re-resolves with the injected definitions.
///
/// The single pass is a deliberate cap: triggers cannot cascade through
/// other triggers.
///
/// # Errors
///
/// Returns [`Error::UnsupportedTriggerAction`] when a firing trigger
/// carries an action other than `set`.
pub fn resolve(
    definitions: &Definitions,
    env: &EnvSnapshot,
) -> Result<IndexMap<String, VarDef>, Error> {
    let resolved = resolve_pass(definitions, env);

    let injected = collect_trigger_definitions(&resolved, env)?;
    if injected.is_empty() {
        return Ok(resolved);
    }

    let mut merged: Definitions = definitions.clone();
    for (name, defs) in injected {
        merged.entry(name).or_default().extend(defs);
    }
    Ok(resolve_pass(&merged, env))
}

/// One selection pass over the definition lists, in layer dependency
/// order (earliest position of each name).
fn resolve_pass(definitions: &Definitions, env: &EnvSnapshot) -> IndexMap<String, VarDef> {
    let mut ordered: Vec<(&String, &Vec<VarDef>)> = definitions
        .iter()
        .filter(|(_, defs)| !defs.is_empty())
        .collect();
    ordered.sort_by_key(|(_, defs)| {
        defs.iter()
            .map(|d| d.position)
            .min()
            .unwrap_or_default()
    });

    let mut resolved = IndexMap::new();
    for (name, defs) in ordered {
        if let Some(mut winner) = resolve_single(name, defs, env) {
            let triggers = merged_triggers(defs);
            if !triggers.is_empty() {
                winner.triggers = triggers;
            }
            resolved.insert(name.clone(), winner);
        } else if let Some(env_value) = env.get(name) {
            // The environment owns this name; synthesize a definition so
            // triggers and conflicts declared on it still participate.
            let Some(first) = defs.first() else {
                continue;
            };
            let position = defs
                .iter()
                .map(|d| d.position)
                .max()
                .unwrap_or(first.position);
            let mut synthesized = first.clone().at(&first.source_layer, position);
            synthesized.value = env_value.to_string();
            synthesized.policy = SetPolicy::AlreadySet;
            synthesized.triggers = merged_triggers(defs);
            synthesized.conflicts = merged_conflicts(defs);
            resolved.insert(name.clone(), synthesized);
        }
    }
    resolved
}

/// Applies the selection rules to one name's definitions.
fn resolve_single(name: &str, defs: &[VarDef], env: &EnvSnapshot) -> Option<VarDef> {
    let by_policy = |policy: SetPolicy| -> Vec<&VarDef> {
        defs.iter().filter(|d| d.policy == policy).collect()
    };

    let force = by_policy(SetPolicy::Force);
    if let Some(winner) = last_by_position(&force) {
        return Some(winner.clone());
    }

    if !env.contains(name) {
        let immediate = by_policy(SetPolicy::Immediate);
        if let Some(winner) = first_by_position(&immediate) {
            return Some(winner.clone());
        }
        let lazy = by_policy(SetPolicy::Lazy);
        if let Some(winner) = last_by_position(&lazy) {
            return Some(winner.clone());
        }
    }

    let skip = by_policy(SetPolicy::Skip);
    if let Some(winner) = last_by_position(&skip) {
        return Some(winner.clone());
    }

    None
}

/// Builds trigger-injected definitions from the resolved set.
///
/// A rule fires when the source variable's effective value (environment
/// override first) equals its condition, or unconditionally. The injected
/// definition sits just after its source in the ordering and inherits
/// validation metadata from the resolved target when one exists.
fn collect_trigger_definitions(
    resolved: &IndexMap<String, VarDef>,
    env: &EnvSnapshot,
) -> Result<Definitions, Error> {
    let mut injected: Definitions = IndexMap::new();
    for var in resolved.values() {
        let effective = env.effective(&var.name, &var.value);
        for rule in &var.triggers {
            if rule
                .condition
                .as_ref()
                .is_some_and(|cond| effective != cond)
            {
                continue;
            }
            if rule.action != "set" {
                return Err(Error::UnsupportedTriggerAction {
                    var: var.name.clone(),
                    action: rule.action.clone(),
                });
            }

            let template = resolved.get(&rule.target);
            let description = template
                .map(|t| t.description.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| format!("Triggered by {}", var.name));
            let source_layer = if var.source_layer.is_empty() {
                "trigger".to_string()
            } else {
                var.source_layer.clone()
            };

            debug!(
                source = %var.name,
                target = %rule.target,
                value = %rule.value,
                "trigger fired"
            );

            injected
                .entry(rule.target.clone())
                .or_default()
                .push(VarDef {
                    name: rule.target.clone(),
                    short: template.map(|t| t.short.clone()).unwrap_or_default(),
                    value: rule.value.clone(),
                    description,
                    required: template.is_some_and(|t| t.required),
                    validator: template.and_then(|t| t.validator.clone()),
                    rule: template.map(|t| t.rule.clone()).unwrap_or_default(),
                    policy: rule.policy,
                    source_layer,
                    position: var.position.child(),
                    anchor: template.and_then(|t| t.anchor.clone()),
                    triggers: Vec::new(),
                    conflicts: Vec::new(),
                });
        }
    }
    Ok(injected)
}

/// The trigger-injected definitions a resolved set would produce. Exposed
/// so validation can check injected values that do not win resolution.
///
/// # Errors
///
/// Same contract as [`resolve`].
pub fn trigger_definitions(
    resolved: &IndexMap<String, VarDef>,
    env: &EnvSnapshot,
) -> Result<Definitions, Error> {
    collect_trigger_definitions(resolved, env)
}

fn merged_triggers(defs: &[VarDef]) -> Vec<TriggerRule> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for def in defs {
        for rule in &def.triggers {
            if seen.insert(rule.clone()) {
                merged.push(rule.clone());
            }
        }
    }
    merged
}

fn merged_conflicts(defs: &[VarDef]) -> Vec<ConflictSpec> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for def in defs {
        for spec in &def.conflicts {
            if seen.insert(spec.clone()) {
                merged.push(spec.clone());
            }
        }
    }
    merged
}

// Ties resolve to the first definition encountered, matching the stable
// min/max selection the ordering contract promises.
fn first_by_position<'a>(defs: &[&'a VarDef]) -> Option<&'a VarDef> {
    defs.iter()
        .copied()
        .reduce(|best, d| if d.position < best.position { d } else { best })
}

fn last_by_position<'a>(defs: &[&'a VarDef]) -> Option<&'a VarDef> {
    defs.iter()
        .copied()
        .reduce(|best, d| if d.position > best.position { d } else { best })
}

/// A conflict-spec violation between two effectively set variables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictHit {
    /// The declaring variable.
    pub var_a: String,
    /// The other side of the conflict.
    pub var_b: String,
    /// Effective value of the declaring variable.
    pub value_a: String,
    /// Effective value of the other side.
    pub value_b: String,
}

/// Checks every conflict spec of the winning definitions against effective
/// values (environment override first, resolved value otherwise).
///
/// A conditional spec between a pair is suppressed when the same pair also
/// carries a fully unconditional conflict, and each violating pair is
/// reported once.
#[must_use]
pub fn conflict_hits(
    resolved: &IndexMap<String, VarDef>,
    env: &EnvSnapshot,
) -> Vec<ConflictHit> {
    let effective = |name: &str| -> Option<String> {
        env.get(name)
            .map(str::to_string)
            .or_else(|| resolved.get(name).map(|d| d.value.clone()))
            .filter(|v| !v.is_empty())
    };

    let pair_of = |a: &str, b: &str| -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    };

    let mut unconditional: HashSet<(String, String)> = HashSet::new();
    for var in resolved.values() {
        for spec in &var.conflicts {
            if !spec.is_conditional() {
                unconditional.insert(pair_of(&var.name, &spec.name));
            }
        }
    }

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut hits = Vec::new();
    for var in resolved.values() {
        let Some(value_a) = effective(&var.name) else {
            continue;
        };
        for spec in &var.conflicts {
            if spec.when.as_ref().is_some_and(|when| *when != value_a) {
                continue;
            }
            let pair = pair_of(&var.name, &spec.name);
            if spec.is_conditional() && unconditional.contains(&pair) {
                continue;
            }
            let Some(value_b) = effective(&spec.name) else {
                continue;
            };
            let violated = match (spec.op, spec.value.as_deref()) {
                (None, _) => true,
                (Some(ConflictOp::Eq), Some(expected)) => value_b == expected,
                (Some(ConflictOp::Ne), Some(expected)) => value_b != expected,
                _ => false,
            };
            if violated && seen.insert(pair) {
                hits.push(ConflictHit {
                    var_a: var.name.clone(),
                    var_b: spec.name.clone(),
                    value_a: value_a.clone(),
                    value_b,
                });
            }
        }
    }
    hits
}

/// What happened to one variable during application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Written by an immediate policy.
    Set,
    /// Written by a force policy, overriding the environment.
    ForceSet,
    /// Written by a lazy policy.
    LazySet,
    /// Left alone; the environment already had a value.
    AlreadySet,
    /// Left alone; the definition is `Set: false/skip`.
    SkipPolicy,
    /// Left alone; empty value under a `string-or-unset` rule.
    EmptyUnset,
}

/// The application record for one variable.
#[derive(Clone, Debug)]
pub struct ApplyAction {
    /// Fully qualified variable name.
    pub name: String,
    /// The value written, when one was.
    pub value: Option<String>,
    /// What happened.
    pub status: ApplyStatus,
    /// The layer the winning definition came from.
    pub layer: String,
}

/// Walks the winners in position order and writes the environment overlay.
/// Returns the values actually written plus a per-variable action record.
pub fn apply(
    resolved: &IndexMap<String, VarDef>,
    env: &mut EnvSnapshot,
) -> (IndexMap<String, String>, Vec<ApplyAction>) {
    let mut ordered: Vec<&VarDef> = resolved.values().collect();
    ordered.sort_by_key(|d| d.position);

    let mut applied = IndexMap::new();
    let mut actions = Vec::new();
    for def in ordered {
        let status = match def.policy {
            SetPolicy::Force => {
                if def.suppresses_empty_write() {
                    ApplyStatus::EmptyUnset
                } else {
                    env.set(&def.name, &def.value);
                    applied.insert(def.name.clone(), def.value.clone());
                    ApplyStatus::ForceSet
                }
            }
            SetPolicy::Immediate | SetPolicy::Lazy => {
                if env.contains(&def.name) {
                    ApplyStatus::AlreadySet
                } else if def.suppresses_empty_write() {
                    ApplyStatus::EmptyUnset
                } else {
                    env.set(&def.name, &def.value);
                    applied.insert(def.name.clone(), def.value.clone());
                    if def.policy == SetPolicy::Lazy {
                        ApplyStatus::LazySet
                    } else {
                        ApplyStatus::Set
                    }
                }
            }
            SetPolicy::AlreadySet => ApplyStatus::AlreadySet,
            SetPolicy::Skip => ApplyStatus::SkipPolicy,
        };

        debug!(var = %def.name, layer = %def.source_layer, ?status, "apply");
        actions.push(ApplyAction {
            name: def.name.clone(),
            value: applied.get(&def.name).cloned(),
            status,
            layer: def.source_layer.clone(),
        });
    }
    (applied, actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vars::Position;

    fn def(name: &str, value: &str, policy: SetPolicy, layer: u32) -> VarDef {
        VarDef {
            name: name.to_string(),
            short: name.to_lowercase(),
            value: value.to_string(),
            description: String::new(),
            required: false,
            validator: None,
            rule: String::new(),
            policy,
            source_layer: format!("layer{layer}"),
            position: Position::new(layer),
            anchor: None,
            triggers: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    fn defs_of(list: Vec<VarDef>) -> Definitions {
        let mut map: Definitions = IndexMap::new();
        for d in list {
            map.entry(d.name.clone()).or_default().push(d);
        }
        map
    }

    #[test]
    fn force_beats_immediate() {
        // S1: layer a (immediate, pos 0) vs layer b (force, pos 1).
        let defs = defs_of(vec![
            def("IGconf_x_port", "1", SetPolicy::Immediate, 0),
            def("IGconf_x_port", "2", SetPolicy::Force, 1),
        ]);
        let resolved = resolve(&defs, &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["IGconf_x_port"].value, "2");
        assert_eq!(resolved["IGconf_x_port"].policy, SetPolicy::Force);
    }

    #[test]
    fn immediate_picks_earliest() {
        let defs = defs_of(vec![
            def("V", "first", SetPolicy::Immediate, 0),
            def("V", "second", SetPolicy::Immediate, 1),
        ]);
        let resolved = resolve(&defs, &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["V"].value, "first");
    }

    #[test]
    fn lazy_picks_latest() {
        let defs = defs_of(vec![
            def("V", "first", SetPolicy::Lazy, 0),
            def("V", "second", SetPolicy::Lazy, 1),
        ]);
        let resolved = resolve(&defs, &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["V"].value, "second");
    }

    #[test]
    fn environment_wins_over_immediate_and_lazy() {
        let env: EnvSnapshot = [("V", "env")].into_iter().collect();
        let defs = defs_of(vec![
            def("V", "first", SetPolicy::Immediate, 0),
            def("V", "second", SetPolicy::Lazy, 1),
        ]);
        let resolved = resolve(&defs, &env).unwrap();
        assert_eq!(resolved["V"].value, "env");
        assert_eq!(resolved["V"].policy, SetPolicy::AlreadySet);
    }

    #[test]
    fn skip_is_retained_for_validation() {
        let defs = defs_of(vec![def("V", "x", SetPolicy::Skip, 0)]);
        let resolved = resolve(&defs, &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["V"].policy, SetPolicy::Skip);
    }

    #[test]
    fn env_override_still_fires_triggers() {
        // S2: mode declared immediate=off with a when=on trigger; the
        // environment pre-sets mode=on.
        let env: EnvSnapshot = [("IGconf_x_mode", "on")].into_iter().collect();
        let mut mode = def("IGconf_x_mode", "off", SetPolicy::Immediate, 0);
        mode.triggers = vec![TriggerRule {
            condition: Some("on".to_string()),
            action: "set".to_string(),
            target: "IGconf_x_port".to_string(),
            value: "9000".to_string(),
            policy: SetPolicy::Immediate,
        }];
        let defs = defs_of(vec![mode]);
        let resolved = resolve(&defs, &env).unwrap();
        assert_eq!(resolved["IGconf_x_mode"].policy, SetPolicy::AlreadySet);
        assert_eq!(resolved["IGconf_x_port"].value, "9000");
    }

    #[test]
    fn trigger_condition_mismatch_does_not_fire() {
        let mut mode = def("M", "off", SetPolicy::Immediate, 0);
        mode.triggers = vec![TriggerRule {
            condition: Some("on".to_string()),
            action: "set".to_string(),
            target: "P".to_string(),
            value: "9000".to_string(),
            policy: SetPolicy::Immediate,
        }];
        let resolved = resolve(&defs_of(vec![mode]), &EnvSnapshot::empty()).unwrap();
        assert!(!resolved.contains_key("P"));
    }

    #[test]
    fn injected_definition_sits_after_source() {
        let mut mode = def("M", "on", SetPolicy::Immediate, 2);
        mode.triggers = vec![TriggerRule {
            condition: Some("on".to_string()),
            action: "set".to_string(),
            target: "P".to_string(),
            value: "1".to_string(),
            policy: SetPolicy::Immediate,
        }];
        let resolved = resolve(&defs_of(vec![mode]), &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["P"].position, Position::new(2).child());
        assert_eq!(resolved["P"].description, "Triggered by M");
    }

    #[test]
    fn trigger_injection_respects_later_force() {
        // A later force definition still wins over a trigger injection.
        let mut mode = def("M", "on", SetPolicy::Immediate, 0);
        mode.triggers = vec![TriggerRule {
            condition: None,
            action: "set".to_string(),
            target: "P".to_string(),
            value: "from-trigger".to_string(),
            policy: SetPolicy::Immediate,
        }];
        let forced = def("P", "forced", SetPolicy::Force, 1);
        let resolved = resolve(&defs_of(vec![mode, forced]), &EnvSnapshot::empty()).unwrap();
        assert_eq!(resolved["P"].value, "forced");
    }

    #[test]
    fn unsupported_trigger_action_errors() {
        let mut mode = def("M", "on", SetPolicy::Immediate, 0);
        mode.triggers = vec![TriggerRule {
            condition: None,
            action: "unset".to_string(),
            target: "P".to_string(),
            value: String::new(),
            policy: SetPolicy::Immediate,
        }];
        assert!(matches!(
            resolve(&defs_of(vec![mode]), &EnvSnapshot::empty()),
            Err(Error::UnsupportedTriggerAction { .. })
        ));
    }

    #[test]
    fn conflict_unconditional_both_set() {
        let mut a = def("A", "1", SetPolicy::Immediate, 0);
        a.conflicts = vec![ConflictSpec {
            name: "B".to_string(),
            op: None,
            value: None,
            when: None,
        }];
        let b = def("B", "2", SetPolicy::Immediate, 1);
        let resolved = resolve(&defs_of(vec![a, b]), &EnvSnapshot::empty()).unwrap();
        let hits = conflict_hits(&resolved, &EnvSnapshot::empty());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].var_b, "B");
    }

    #[test]
    fn conflict_ne_operator() {
        // S4: a conflicts with b!=0; b resolves to 7.
        let mut a = def("IGconf_x_a", "1", SetPolicy::Immediate, 0);
        a.conflicts = vec![ConflictSpec {
            name: "IGconf_x_b".to_string(),
            op: Some(ConflictOp::Ne),
            value: Some("0".to_string()),
            when: None,
        }];
        let b = def("IGconf_x_b", "7", SetPolicy::Immediate, 1);
        let resolved = resolve(&defs_of(vec![a, b]), &EnvSnapshot::empty()).unwrap();
        let hits = conflict_hits(&resolved, &EnvSnapshot::empty());
        assert_eq!(hits.len(), 1);

        // With b=0 the != conflict is satisfied.
        let mut a2 = def("IGconf_x_a", "1", SetPolicy::Immediate, 0);
        a2.conflicts = vec![ConflictSpec {
            name: "IGconf_x_b".to_string(),
            op: Some(ConflictOp::Ne),
            value: Some("0".to_string()),
            when: None,
        }];
        let b2 = def("IGconf_x_b", "0", SetPolicy::Immediate, 1);
        let resolved = resolve(&defs_of(vec![a2, b2]), &EnvSnapshot::empty()).unwrap();
        assert!(conflict_hits(&resolved, &EnvSnapshot::empty()).is_empty());
    }

    #[test]
    fn conditional_conflict_respects_when() {
        let mut a = def("A", "dev", SetPolicy::Immediate, 0);
        a.conflicts = vec![ConflictSpec {
            name: "B".to_string(),
            op: None,
            value: None,
            when: Some("prod".to_string()),
        }];
        let b = def("B", "1", SetPolicy::Immediate, 1);
        let resolved = resolve(&defs_of(vec![a, b]), &EnvSnapshot::empty()).unwrap();
        assert!(conflict_hits(&resolved, &EnvSnapshot::empty()).is_empty());
    }

    #[test]
    fn conditional_suppressed_by_unconditional_pair() {
        let mut a = def("A", "1", SetPolicy::Immediate, 0);
        a.conflicts = vec![
            ConflictSpec {
                name: "B".to_string(),
                op: None,
                value: None,
                when: None,
            },
            ConflictSpec {
                name: "B".to_string(),
                op: Some(ConflictOp::Eq),
                value: Some("2".to_string()),
                when: None,
            },
        ];
        let b = def("B", "2", SetPolicy::Immediate, 1);
        let resolved = resolve(&defs_of(vec![a, b]), &EnvSnapshot::empty()).unwrap();
        // One hit for the pair, not two.
        assert_eq!(conflict_hits(&resolved, &EnvSnapshot::empty()).len(), 1);
    }

    #[test]
    fn apply_writes_overlay_in_order() {
        let defs = defs_of(vec![
            def("A", "1", SetPolicy::Immediate, 0),
            def("B", "2", SetPolicy::Skip, 1),
            def("C", "3", SetPolicy::Force, 2),
        ]);
        let mut env: EnvSnapshot = [("C", "old")].into_iter().collect();
        let resolved = resolve(&defs, &env.clone()).unwrap();
        let (applied, actions) = apply(&resolved, &mut env);
        assert_eq!(applied.len(), 2);
        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), None);
        assert_eq!(env.get("C"), Some("3"));
        assert_eq!(actions.len(), 3);
        assert!(actions.iter().any(|a| a.status == ApplyStatus::SkipPolicy));
        assert!(actions.iter().any(|a| a.status == ApplyStatus::ForceSet));
    }

    #[test]
    fn resolution_is_pure() {
        let env: EnvSnapshot = [("B", "env")].into_iter().collect();
        let defs = defs_of(vec![
            def("A", "1", SetPolicy::Immediate, 0),
            def("A", "2", SetPolicy::Lazy, 1),
            def("B", "3", SetPolicy::Immediate, 0),
        ]);
        let first = resolve(&defs, &env).unwrap();
        let second = resolve(&defs, &env).unwrap();
        let summary = |m: &IndexMap<String, VarDef>| -> Vec<(String, String, SetPolicy)> {
            m.iter()
                .map(|(k, d)| (k.clone(), d.value.clone(), d.policy))
                .collect()
        };
        assert_eq!(summary(&first), summary(&second));
    }
}
