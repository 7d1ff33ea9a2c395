// spina_lsystem — parametric L-system engine for synthetic wheat heads.
//
// A grammar of named productions is grown stage by stage into a text log
// of turtle commands (`draw(...)`, `pitch_up(...)`, `save()`, ...) that a
// rendering host replays to build plant geometry. Many plants can be grown
// in one run, each with its own combination of varied parameters.
//
// Module overview:
// - `engine.rs`:       Engine: next_plant / next_stage / grow loop, RunReport.
// - `accumulator.rs`:  Append protocol turning returned rules into pending Steps.
// - `rule.rs`:         Rule shapes and the rule classifier.
// - `grammar.rs`:      Production registration table and the production Context.
// - `terminal.rs`:     Built-in turtle operations and their command-line format.
// - `selector.rs`:     Probability/condition table selection.
// - `condition.rs`:    Condition-key expression parser and evaluator.
// - `params.rs`:       Value, ParamMap, Delta and the shared ParamStore.
// - `schedule.rs`:     Mixed-radix per-plant delta stepping.
// - `command_log.rs`:  Command-log sink.
// - `config.rs`:       RunConfig loaded from JSON (embedded wheat default).
// - `wheat.rs`:        The built-in wheat-head grammar.
// - `error.rs`:        LsysError and UnknownRuleKind.
// - `prng`:            Re-exported from `spina_prng`.
//
// The `spina` binary (`main.rs`) wires a config, the wheat grammar and a
// log file together.
//
// **Critical constraint: determinism.** A run is a pure function of
// `(grammar, config, seed)`. All randomness comes from two xoshiro256++
// streams derived from the seed; parameter maps are `BTreeMap`s so their
// rendering order is stable.

pub mod accumulator;
pub mod command_log;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod params;
pub use spina_prng as prng;
pub mod rule;
pub mod schedule;
pub mod selector;
pub mod terminal;
pub mod wheat;

pub use engine::{Engine, RunReport};
pub use error::LsysError;
pub use grammar::Grammar;
pub use rule::Rule;
