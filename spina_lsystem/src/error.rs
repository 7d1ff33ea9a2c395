// Error types for the L-system engine.
//
// `LsysError` covers everything that aborts a run: command-log I/O (fatal,
// never retried), configuration problems, grammar registration mistakes and
// probability tables whose `10*index + probability` keys would corrupt each
// other. `UnknownRuleKind` is deliberately *not* a run-aborting error: the
// append protocol stops at an unclassifiable rule and reports it, and the
// engine counts it as a dropped rule.

use std::path::PathBuf;

/// Errors that abort a generation run.
#[derive(Debug, thiserror::Error)]
pub enum LsysError {
    #[error("cannot open command log {path}: {source}")]
    LogOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("command log write failed: {0}")]
    LogWrite(#[from] std::io::Error),

    #[error("command log is already closed")]
    LogClosed,

    #[error("cannot read run configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed run configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("grammar has no axiom production named {0:?}")]
    MissingAxiom(String),

    #[error("production {0:?} shadows the built-in terminal of the same name")]
    ShadowedTerminal(String),

    #[error("grammar has no production named {0:?}")]
    UnknownProduction(String),

    #[error("probability table index {0} is outside 1..=9")]
    IndexOutOfRange(i64),

    #[error("probability {value} for table index {index} is outside [0, 1)")]
    ProbabilityOutOfRange { index: i64, value: f64 },

    #[error("probability table key {key:.4} of index {index} collides with an earlier entry")]
    ProbabilityKeyCollision { key: f64, index: i64 },
}

/// A rule whose shape matches none of the classifier's kinds.
///
/// Returned by `rule::classify` and carried by `AppendStatus::Stopped`; the
/// remaining rules of the list being appended are dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unclassifiable rule: {rule}")]
pub struct UnknownRuleKind {
    /// Human-readable rendering of the offending rule.
    pub rule: String,
}
