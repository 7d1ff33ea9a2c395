// Parameter store — the run's shared parameter dictionary.
//
// The engine and the grammar share one `ParamStore`: productions and their
// parameter suppliers receive `&mut ParamStore` while they run, so anything
// they write (per-plant values, `{Name}_args` bindings) is visible to the
// engine and to condition keys, and engine-managed keys (`stage`, `PlantNr`,
// …) are visible to the grammar.
//
// Engine-managed keys are typed fields; every other key lives in the
// free-form `values` map. `ParamStore::get` unifies both under the key names
// used by grammars and condition expressions: `stage`, `stage0`, `stage1`,
// `PlantNr`, `Plants`, `seed`.
//
// `ParamMap` is the per-production parameter mapping returned by a
// production's supplier and attached to queued terminal calls.
//
// See also: `config.rs` which builds a store from JSON, `schedule.rs` for the
// per-plant delta stepping applied through `apply_delta`, `condition.rs` for
// the `Scope` trait implemented here.
//
// **Critical constraint: determinism.** `Random` (the `random` field) is the
// generator parameter suppliers draw from. The rule selector has its own
// stream owned by the engine; nothing else may draw from either.

use crate::condition::Scope;
use serde::{Deserialize, Serialize};
use spina_prng::PlantRng;
use std::collections::BTreeMap;
use std::fmt;

/// A parameter value.
///
/// Mirrors the shapes a parameter dictionary holds: scalars, names, and
/// tuples/lists (e.g. `draw = (length, width)`, `prob = (0.9, 0.1)`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
}

impl Value {
    /// A two-element list, the usual shape of `draw`.
    pub fn pair(a: f64, b: f64) -> Self {
        Value::List(vec![Value::Float(a), Value::Float(b)])
    }

    /// A list of floats.
    pub fn floats<I: IntoIterator<Item = f64>>(items: I) -> Self {
        Value::List(items.into_iter().map(Value::Float).collect())
    }

    /// Numeric view: ints and floats (bools count as 0/1).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer view: ints, and floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Python-style truthiness, used by condition keys.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Render with floats truncated to four decimals, as used in the
    /// pending-rule trace of the command log.
    pub fn fixed(&self) -> String {
        match self {
            Value::Float(f) => format!("{f:.4}"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::fixed).collect();
                format!("({})", inner.join(","))
            }
            Value::Text(s) => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// A production's parameter mapping.
pub type ParamMap = BTreeMap<String, Value>;

/// Render a parameter mapping for the pending-rule trace: `{key:value,…}`
/// with floats at four decimals.
pub fn describe_params(params: &ParamMap) -> String {
    let mut out = String::from("{");
    for (key, value) in params {
        out.push_str(&format!("'{key}':{},", value.fixed()));
    }
    out.push('}');
    out
}

/// One varied parameter: its name and the value at each discrete level.
///
/// Serialized as the tuple form `["Grain_count", 50, 70, 90]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Value>", into = "Vec<Value>")]
pub struct Delta {
    pub name: String,
    pub levels: Vec<Value>,
}

impl Delta {
    pub fn new<I, V>(name: &str, levels: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: name.to_string(),
            levels: levels.into_iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<Vec<Value>> for Delta {
    type Error = String;

    fn try_from(items: Vec<Value>) -> Result<Self, Self::Error> {
        let mut iter = items.into_iter();
        let name = match iter.next() {
            Some(Value::Text(name)) if !name.is_empty() => name,
            Some(other) => return Err(format!("delta name must be a string, got {other}")),
            None => return Err("delta entry is empty".to_string()),
        };
        let levels: Vec<Value> = iter.collect();
        if levels.is_empty() {
            return Err(format!("delta {name:?} has no levels"));
        }
        Ok(Delta { name, levels })
    }
}

impl From<Delta> for Vec<Value> {
    fn from(delta: Delta) -> Self {
        let mut items = Vec::with_capacity(delta.levels.len() + 1);
        items.push(Value::Text(delta.name));
        items.extend(delta.levels);
        items
    }
}

/// The name of the delta parameter that also redefines the logged stage
/// range.
pub const GRAIN_COUNT: &str = "Grain_count";

/// The run's shared parameter dictionary.
#[derive(Clone, Debug)]
pub struct ParamStore {
    /// Current growth iteration of the current plant.
    pub stage: u32,
    /// First stage whose rewrites are logged (inclusive).
    pub stage0: u32,
    /// Last stage grown and logged (inclusive).
    pub stage1: u32,
    /// 1-based index of the current plant instance (0 before the first).
    pub plant_nr: u32,
    /// Plant instances still to be generated.
    pub plants: u32,
    /// The seed both random streams were derived from.
    pub seed: u64,
    /// Per-plant parameter variation table.
    pub deltas: Vec<Delta>,
    /// Whether weighted selections are traced into the command log.
    pub log_selections: bool,
    values: ParamMap,
    random: PlantRng,
}

impl ParamStore {
    /// A store with the given seed and default stage range `0..=3`.
    pub fn new(seed: u64) -> Self {
        Self {
            stage: 0,
            stage0: 0,
            stage1: 3,
            plant_nr: 0,
            plants: 0,
            seed,
            deltas: Vec::new(),
            log_selections: false,
            values: ParamMap::new(),
            random: PlantRng::stream(seed, 0),
        }
    }

    /// Builder-style stage range setter.
    pub fn with_stages(mut self, stage0: u32, stage1: u32) -> Self {
        self.stage0 = stage0;
        self.stage1 = stage1;
        self
    }

    /// Builder-style value setter.
    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up any key, engine-managed or free-form.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            "stage" => Some(Value::from(self.stage)),
            "stage0" => Some(Value::from(self.stage0)),
            "stage1" => Some(Value::from(self.stage1)),
            "PlantNr" => Some(Value::from(self.plant_nr)),
            "Plants" => Some(Value::from(self.plants)),
            // Configured and entropy seeds fit in an `i64`; larger ones
            // can only come from `ParamStore::new` and are shown as floats.
            "seed" => Some(
                i64::try_from(self.seed).map_or(Value::Float(self.seed as f64), Value::Int),
            ),
            _ => self.values.get(key).cloned(),
        }
    }

    /// Numeric lookup.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// Set any key. Engine-managed keys accept only non-negative integers;
    /// other values for them are ignored and `false` is returned.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        match key {
            "stage" | "stage0" | "stage1" | "PlantNr" | "Plants" => {
                let Some(n) = value.as_i64().and_then(|i| u32::try_from(i).ok()) else {
                    return false;
                };
                match key {
                    "stage" => self.stage = n,
                    "stage0" => self.stage0 = n,
                    "stage1" => self.stage1 = n,
                    "PlantNr" => self.plant_nr = n,
                    _ => self.plants = n,
                }
                true
            }
            "seed" => false,
            _ => {
                self.values.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Free-form values (everything except the engine-managed keys).
    pub fn values(&self) -> &ParamMap {
        &self.values
    }

    /// Apply one resolved per-plant setting. `Grain_count` additionally
    /// truncates the logged stage range to exactly that stage.
    pub fn apply_delta(&mut self, name: &str, value: Value) {
        if name == GRAIN_COUNT {
            if let Some(n) = value.as_i64().and_then(|i| u32::try_from(i).ok()) {
                self.stage0 = n;
                self.stage1 = n;
            }
        }
        self.set(name, value);
    }

    /// Whether `stage` lies in the logged range `[stage0, stage1]`.
    pub fn stage_in_range(&self, stage: u32) -> bool {
        stage >= self.stage0 && stage <= self.stage1
    }

    /// Gaussian draw from `Random`.
    pub fn normal(&mut self, mean: f64, sd: f64) -> f64 {
        self.random.normal(mean, sd)
    }
}

impl Scope for ParamStore {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_keys_are_typed() {
        let mut store = ParamStore::new(1);
        assert!(store.set("stage1", 7));
        assert_eq!(store.stage1, 7);
        assert_eq!(store.get("stage1"), Some(Value::Int(7)));
        assert!(!store.set("stage", "three"));
        assert_eq!(store.stage, 0);
    }

    #[test]
    fn seed_keeps_its_sign() {
        let store = ParamStore::new(i64::MAX as u64);
        assert_eq!(store.get("seed"), Some(Value::Int(i64::MAX)));
        let store = ParamStore::new(u64::MAX);
        let seed = store.get_f64("seed").unwrap();
        assert!(seed > 0.0);
        assert_eq!(seed, u64::MAX as f64);
    }

    #[test]
    fn free_form_keys_roundtrip() {
        let mut store = ParamStore::new(1);
        store.set("draw", Value::pair(5.0, 1.0));
        assert_eq!(store.get("draw"), Some(Value::pair(5.0, 1.0)));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn grain_count_truncates_stage_range() {
        let mut store = ParamStore::new(1).with_stages(0, 20);
        store.apply_delta(GRAIN_COUNT, Value::Int(12));
        assert_eq!((store.stage0, store.stage1), (12, 12));
        assert_eq!(store.get_f64(GRAIN_COUNT), Some(12.0));
    }

    #[test]
    fn other_deltas_leave_stage_range_alone() {
        let mut store = ParamStore::new(1).with_stages(0, 20);
        store.apply_delta("awn_length", Value::Float(1.2));
        assert_eq!((store.stage0, store.stage1), (0, 20));
    }

    #[test]
    fn delta_tuple_form() {
        let delta: Delta = serde_json::from_str(r#"["p", 10, 20, 30]"#).unwrap();
        assert_eq!(delta.name, "p");
        assert_eq!(delta.levels, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let back = serde_json::to_string(&delta).unwrap();
        assert_eq!(back, r#"["p",10,20,30]"#);
    }

    #[test]
    fn delta_without_levels_is_rejected() {
        assert!(serde_json::from_str::<Delta>(r#"["p"]"#).is_err());
        assert!(serde_json::from_str::<Delta>(r#"[3, 4]"#).is_err());
    }

    #[test]
    fn fixed_rendering_truncates_floats() {
        let mut params = ParamMap::new();
        params.insert("draw".into(), Value::pair(5.0, 1.0));
        params.insert("rule".into(), Value::from("Stalk"));
        assert_eq!(
            describe_params(&params),
            "{'draw':(5.0000,1.0000),'rule':'Stalk',}"
        );
    }
}
