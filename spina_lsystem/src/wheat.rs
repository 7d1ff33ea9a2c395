// Built-in wheat-head grammar.
//
//   Axiom      → Stalk, GrainSpace
//   Stalk      → Curve
//   GrainSpace → Pitch, Turn, Roll, Draw, {1: Grain, 2: Stub}, GrainSpace
//   Grain      → Save, Pitch, Object, Awn, Restore
//   Stub       → Object
//   Awn        → Curve
//
// Each stage adds one rachis internode to the spike. Internodes alternate
// sides (a 180° turn each), giving the two-rowed (distichous) arrangement;
// at each node a full grain with its awn grows with probability `prob[0]`
// and an aborted stub with `prob[1]`.
//
// Parameter suppliers read their base values from the store (so per-plant
// deltas such as `awn_length` take effect) and vary them with gaussian
// noise drawn from `Random`, with relative standard deviation `variation`.
//
// See also: `config.rs` and `data/wheat.json` for the default values.

use crate::grammar::Grammar;
use crate::params::{ParamMap, ParamStore, Value};
use crate::rule::Rule;

const DEFAULT_VARIATION: f64 = 0.05;
const AWN_SEGMENTS: usize = 4;

/// Store value `key` as a number, or `default`.
fn num(store: &ParamStore, key: &str, default: f64) -> f64 {
    store.get_f64(key).unwrap_or(default)
}

/// `mean` with relative gaussian noise.
fn vary(store: &mut ParamStore, mean: f64) -> f64 {
    let rel = num(store, "variation", DEFAULT_VARIATION).max(0.0);
    store.normal(mean, mean.abs() * rel)
}

fn params(rule: &str, entries: Vec<(&str, Value)>) -> ParamMap {
    let mut p: ParamMap = entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    p.insert("rule".to_string(), Value::from(rule));
    p
}

fn stalk_params(store: &mut ParamStore) -> ParamMap {
    let length = num(store, "stalk_length", 3.0);
    let segments = num(store, "stalk_segments", 8.0).max(1.0) as usize;
    let width = num(store, "stalk_width", 0.08);
    let curve = (0..segments)
        .map(|i| {
            let taper = 1.0 - 0.3 * i as f64 / segments as f64;
            let pitch = store.normal(0.0, 1.5);
            let length = vary(store, length / segments as f64);
            Value::floats([pitch, 0.0, length, width * taper])
        })
        .collect();
    params("Stalk", vec![("curve", Value::List(curve))])
}

fn grain_space_params(store: &mut ParamStore) -> ParamMap {
    let internode = num(store, "rachis_internode", 0.12);
    let width = num(store, "rachis_width", 0.03);
    let prob = store.get("prob").unwrap_or_else(|| Value::floats([0.9, 0.1]));
    let pitch = store.normal(0.0, 2.0);
    let roll = store.normal(0.0, 4.0);
    let length = vary(store, internode);
    params(
        "GrainSpace",
        vec![
            ("pitch", Value::Float(pitch)),
            ("turn", Value::Float(180.0)),
            ("roll", Value::Float(roll)),
            ("draw", Value::pair(length, width)),
            ("prob", prob),
        ],
    )
}

fn object_file(store: &ParamStore) -> Value {
    store
        .get("grain_object")
        .filter(|v| v.as_str().is_some())
        .unwrap_or_else(|| Value::from("grain.obj"))
}

fn grain_params(store: &mut ParamStore) -> ParamMap {
    let angle = num(store, "grain_angle", 35.0);
    let pitch = vary(store, angle);
    let size = vary(store, 1.0);
    params(
        "Grain",
        vec![
            ("pitch", Value::Float(pitch)),
            ("object", object_file(store)),
            ("scale", Value::floats([size, size, 1.6 * size])),
        ],
    )
}

fn stub_params(store: &mut ParamStore) -> ParamMap {
    let size = vary(store, 0.4);
    params(
        "Stub",
        vec![
            ("object", object_file(store)),
            ("scale", Value::floats([size, size, size])),
        ],
    )
}

fn awn_params(store: &mut ParamStore) -> ParamMap {
    let length = num(store, "awn_length", 1.0);
    let curve = (0..AWN_SEGMENTS)
        .map(|_| {
            let pitch = store.normal(2.0, 1.0);
            let length = vary(store, length / AWN_SEGMENTS as f64);
            Value::floats([pitch, 0.0, length, 0.01])
        })
        .collect();
    params("Awn", vec![("curve", Value::List(curve))])
}

/// The wheat-head grammar.
pub fn wheat_grammar() -> Grammar {
    Grammar::new("Axiom")
        .production("Axiom", |_| Rule::bares(&["Stalk", "GrainSpace"]))
        .production_with_params("Stalk", |_| Rule::bares(&["Curve"]), stalk_params)
        .production_with_params(
            "GrainSpace",
            |_| {
                let mut rules = Rule::bares(&["Pitch", "Turn", "Roll", "Draw"]);
                rules.push(Rule::choice(["Grain", "Stub"]));
                rules.push(Rule::bare("GrainSpace"));
                rules
            },
            grain_space_params,
        )
        .production_with_params(
            "Grain",
            |_| Rule::bares(&["Save", "Pitch", "Object", "Awn", "Restore"]),
            grain_params,
        )
        .production_with_params("Stub", |_| Rule::bares(&["Object"]), stub_params)
        .production_with_params("Awn", |_| Rule::bares(&["Curve"]), awn_params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_is_valid() {
        let g = wheat_grammar();
        assert!(g.validate().is_ok());
        assert_eq!(g.axiom(), "Axiom");
        for name in ["Stalk", "GrainSpace", "Grain", "Stub", "Awn"] {
            assert!(g.is_main_rule(name), "{name} not registered");
        }
    }

    #[test]
    fn suppliers_follow_store_values() {
        let mut store = ParamStore::new(11)
            .with_value("awn_length", 2.0)
            .with_value("variation", 0.0);
        let p = awn_params(&mut store);
        let segments = p["curve"].as_list().unwrap();
        assert_eq!(segments.len(), AWN_SEGMENTS);
        let total: f64 = segments
            .iter()
            .map(|s| s.as_list().unwrap()[2].as_f64().unwrap())
            .sum();
        assert!((total - 2.0).abs() < 1e-9);
        assert_eq!(p["rule"], Value::from("Awn"));
    }

    #[test]
    fn grain_space_alternates_sides() {
        let mut store = ParamStore::new(11).with_value("prob", Value::floats([0.7, 0.3]));
        let p = grain_space_params(&mut store);
        assert_eq!(p["turn"], Value::Float(180.0));
        assert_eq!(p["prob"], Value::floats([0.7, 0.3]));
    }

    #[test]
    fn suppliers_are_deterministic() {
        let mut a = ParamStore::new(5);
        let mut b = ParamStore::new(5);
        assert_eq!(grain_params(&mut a), grain_params(&mut b));
        assert_eq!(stalk_params(&mut a), stalk_params(&mut b));
    }
}
