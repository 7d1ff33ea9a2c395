// Run configuration loaded from JSON.
//
// A `RunConfig` holds everything about a run that is not grammar: the seed,
// the plant count, the logged stage range, the per-plant delta table, and
// the free-form values the grammar's parameter suppliers read (`prob`,
// `awn_length`, ...). Every field has a default, so `{}` is a valid
// configuration (one plant, stages 0..=3, entropy seed).
//
// The built-in wheat configuration is embedded at compile time from
// `data/wheat.json`.
//
// See also: `params.rs` for `ParamStore`, which `into_store` builds, and
// `wheat.rs` for the grammar the default configuration drives.

use crate::error::LsysError;
use crate::params::{Delta, ParamMap, ParamStore};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Embedded wheat-head run configuration.
const WHEAT_JSON: &str = include_str!("../data/wheat.json");

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for both random streams. `None` draws one from the clock.
    pub seed: Option<u64>,
    /// Number of plants in the batch; 0 grows a single plant with no
    /// plant header.
    pub plants: u32,
    pub stage0: u32,
    pub stage1: u32,
    pub deltas: Vec<Delta>,
    pub log_selections: bool,
    pub values: ParamMap,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: None,
            plants: 0,
            stage0: 0,
            stage1: 3,
            deltas: Vec::new(),
            log_selections: false,
            values: ParamMap::new(),
        }
    }
}

impl RunConfig {
    pub fn from_json(json: &str) -> Result<Self, LsysError> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, LsysError> {
        let json = std::fs::read_to_string(path).map_err(|source| LsysError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The embedded wheat-head configuration.
    pub fn default_wheat() -> Result<Self, LsysError> {
        Self::from_json(WHEAT_JSON)
    }

    pub fn validate(&self) -> Result<(), LsysError> {
        if let Some(seed) = self.seed {
            if i64::try_from(seed).is_err() {
                return Err(LsysError::InvalidConfig(format!(
                    "seed {seed} is above {}",
                    i64::MAX
                )));
            }
        }
        if self.stage0 > self.stage1 {
            return Err(LsysError::InvalidConfig(format!(
                "stage0 ({}) is after stage1 ({})",
                self.stage0, self.stage1
            )));
        }
        for delta in &self.deltas {
            if delta.name.is_empty() {
                return Err(LsysError::InvalidConfig("delta with an empty name".into()));
            }
            if delta.levels.is_empty() {
                return Err(LsysError::InvalidConfig(format!(
                    "delta {:?} has no levels",
                    delta.name
                )));
            }
        }
        Ok(())
    }

    /// Build the run's parameter store, drawing a seed from the clock when
    /// none is configured.
    pub fn into_store(self) -> ParamStore {
        let seed = self.seed.unwrap_or_else(|| {
            let seed = spina_prng::entropy_seed();
            tracing::info!(seed, "no seed configured, using an entropy seed");
            seed
        });
        let mut store = ParamStore::new(seed).with_stages(self.stage0, self.stage1);
        store.plants = self.plants;
        store.deltas = self.deltas;
        store.log_selections = self.log_selections;
        for (key, value) in self.values {
            store.set(&key, value);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{GRAIN_COUNT, Value};

    #[test]
    fn empty_object_is_the_default() {
        let config = RunConfig::from_json("{}").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn embedded_wheat_config_is_valid() {
        let config = RunConfig::default_wheat().unwrap();
        assert!(config.seed.is_some());
        assert!(config.plants > 0);
        assert_eq!(config.deltas[0].name, GRAIN_COUNT);
        assert!(config.values.contains_key("prob"));
    }

    #[test]
    fn inverted_stage_range_is_rejected() {
        let err = RunConfig::from_json(r#"{"stage0": 4, "stage1": 2}"#).unwrap_err();
        assert!(matches!(err, LsysError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            RunConfig::from_json("{\"plants\": -1}"),
            Err(LsysError::ConfigParse(_))
        ));
        assert!(matches!(
            RunConfig::from_json(r#"{"deltas": [["p"]]}"#),
            Err(LsysError::ConfigParse(_))
        ));
    }

    #[test]
    fn store_carries_config() {
        let config = RunConfig::from_json(
            r#"{"seed": 9, "plants": 4, "stage0": 1, "stage1": 5,
                "deltas": [["p", 1, 2]], "values": {"prob": [0.9, 0.1]}}"#,
        )
        .unwrap();
        let store = config.into_store();
        assert_eq!(store.seed, 9);
        assert_eq!(store.plants, 4);
        assert_eq!((store.stage0, store.stage1), (1, 5));
        assert_eq!(store.deltas.len(), 1);
        assert_eq!(store.get("prob"), Some(Value::floats([0.9, 0.1])));
    }

    #[test]
    fn missing_seed_draws_one() {
        let store = RunConfig::default().into_store();
        let seed = i64::try_from(store.seed).unwrap();
        assert_eq!(store.get("seed"), Some(Value::Int(seed)));
    }

    #[test]
    fn seed_must_fit_a_condition_integer() {
        let max = RunConfig::from_json(&format!(r#"{{"seed": {}}}"#, i64::MAX)).unwrap();
        assert_eq!(max.seed, Some(i64::MAX as u64));
        let err = RunConfig::from_json(&format!(r#"{{"seed": {}}}"#, u64::MAX)).unwrap_err();
        assert!(matches!(err, LsysError::InvalidConfig(_)));
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = RunConfig::load(&path).unwrap_err();
        assert!(matches!(err, LsysError::ConfigRead { .. }));

        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"seed": 3}"#).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap().seed, Some(3));
    }
}
