// Rule accumulator: the append protocol that turns a production's returned
// rules into pending steps.
//
// When a production runs, the rules it returns are classified one at a time
// (`rule::classify`) and appended to the `ResultBuffer` as `Step`s carrying
// the production's parameter mapping:
//
// - literal symbol strings expand character by character into terminal
//   invocations (or single-character productions);
// - branches become `Save`, the inner steps, `Restore`;
// - indexed rules get a copy of the mapping with `index` set;
// - terminals are paired with the mapping;
// - production references are queued by name with their call arguments,
//   to be bound when invoked;
// - index-keyed tables become weight-keyed tables: each index `i` gets the
//   key `10*i + prob[i-1]`, so the fractional part is the branch's
//   probability and the integer part keeps keys distinct.
//
// The first unclassifiable rule stops the list being appended (its
// enclosing branch still closes) and is reported through
// `AppendStatus::Stopped`. Invalid probability tables are hard errors.
//
// See also: `rule.rs` for the classifier, `selector.rs` which consumes the
// weight/condition tables built here, `engine.rs` which owns the buffer.

use crate::error::{LsysError, UnknownRuleKind};
use crate::grammar::Grammar;
use crate::params::{ParamMap, Value, describe_params};
use crate::rule::{self, Args, Callee, Rule, RuleKind, TableKey};
use crate::selector::SelectorKey;
use crate::terminal::Terminal;
use std::fmt;

/// Upper bound on a probability-table index; keys `10*i + p` stay distinct
/// only while `p < 1`.
pub const MAX_TABLE_INDEX: i64 = 9;

/// What an invocation calls.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Production(String),
    Terminal(Terminal),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Production(name) => name,
            Target::Terminal(terminal) => terminal.name(),
        }
    }
}

/// A queued call.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    pub target: Target,
    /// Production call arguments, bound at invocation time.
    pub args: Args,
    /// Parameter mapping handed to a terminal.
    pub params: Option<ParamMap>,
}

impl Invocation {
    pub fn terminal(terminal: Terminal, params: Option<ParamMap>) -> Self {
        Self {
            target: Target::Terminal(terminal),
            args: Args::new(),
            params,
        }
    }

    pub fn production(name: &str, args: &[Value]) -> Self {
        Self {
            target: Target::Production(name.to_string()),
            args: args.iter().cloned().collect(),
            params: None,
        }
    }

    /// `Name`, `Name,(args)` or `Name,{params}` as shown in the pending-rule
    /// trace.
    pub fn describe(&self) -> String {
        let mut out = self.target.name().to_string();
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(Value::fixed).collect();
            out.push_str(&format!(",({})", args.join(",")));
        }
        if let Some(params) = &self.params {
            out.push(',');
            out.push_str(&describe_params(params));
        }
        out
    }
}

/// One element of the result, rules and rewrites buffers.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// A finished command line.
    Line(String),
    /// A pending call.
    Invoke(Invocation),
    /// A table awaiting selection; each candidate is a step sequence.
    Choose(Vec<(SelectorKey, Vec<Step>)>),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Line(line) => write!(f, "{line}"),
            Step::Invoke(invocation) => write!(f, "({})", invocation.describe()),
            Step::Choose(entries) => {
                write!(f, "{{")?;
                for (key, steps) in entries {
                    write!(f, "{key}:")?;
                    for step in steps {
                        write!(f, "{step}")?;
                    }
                    write!(f, ",")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// How an append ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppendStatus {
    Complete,
    /// An unclassifiable rule was met; the rest of its list was dropped.
    Stopped(UnknownRuleKind),
}

impl AppendStatus {
    /// Keep the first stop seen.
    fn merge(&mut self, other: AppendStatus) {
        if *self == AppendStatus::Complete {
            *self = other;
        }
    }
}

/// Steps produced by the production currently being invoked.
#[derive(Debug, Default)]
pub struct ResultBuffer {
    items: Vec<Step>,
}

impl ResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify and append `rules`, attaching `params`.
    pub fn append_rules(
        &mut self,
        grammar: &Grammar,
        params: Option<&ParamMap>,
        rules: &[Rule],
    ) -> Result<AppendStatus, LsysError> {
        append(grammar, params, rules, &mut self.items)
    }

    /// Take everything appended so far.
    pub fn drain(&mut self) -> Vec<Step> {
        std::mem::take(&mut self.items)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

fn append(
    grammar: &Grammar,
    params: Option<&ParamMap>,
    rules: &[Rule],
    out: &mut Vec<Step>,
) -> Result<AppendStatus, LsysError> {
    let mut status = AppendStatus::Complete;
    for rule in rules {
        let kind = match rule::classify(rule, grammar) {
            Ok(kind) => kind,
            Err(unknown) => {
                status.merge(AppendStatus::Stopped(unknown));
                break;
            }
        };
        match kind {
            RuleKind::LiteralSymbol(symbols) => {
                if let Err(unknown) = append_symbols(grammar, params, symbols, out) {
                    status.merge(AppendStatus::Stopped(unknown));
                    break;
                }
            }
            RuleKind::Branch(inner) => {
                out.push(Step::Invoke(Invocation::terminal(Terminal::Save, None)));
                let inner_status = append(grammar, params, inner, out)?;
                out.push(Step::Invoke(Invocation::terminal(Terminal::Restore, None)));
                status.merge(inner_status);
            }
            RuleKind::IndexedParam { callee, index } => {
                // Without a mapping there is nothing to index.
                let Some(params) = params else {
                    continue;
                };
                out.push(Step::Invoke(indexed(callee, index, params)));
            }
            RuleKind::Terminal(terminal) => {
                out.push(Step::Invoke(Invocation::terminal(terminal, params.cloned())));
            }
            RuleKind::ArgCall { production, args } => {
                out.push(Step::Invoke(Invocation::production(production, args)));
            }
            RuleKind::BareProduction(production) => {
                out.push(Step::Invoke(Invocation::production(production, &[])));
            }
            RuleKind::ProbabilityTable(entries) => match table(grammar, params, entries)? {
                Ok(Some(step)) => out.push(step),
                Ok(None) => {}
                Err(unknown) => {
                    status.merge(AppendStatus::Stopped(unknown));
                    break;
                }
            },
        }
    }
    Ok(status)
}

/// Pair a terminal with `params`, or with nothing when it takes no mapping.
fn terminal_step(terminal: Terminal, params: Option<&ParamMap>) -> Step {
    let params = if terminal.arity() == 1 { params.cloned() } else { None };
    Step::Invoke(Invocation::terminal(terminal, params))
}

fn append_symbols(
    grammar: &Grammar,
    params: Option<&ParamMap>,
    symbols: &str,
    out: &mut Vec<Step>,
) -> Result<(), UnknownRuleKind> {
    let mut buf = [0u8; 4];
    for ch in symbols.chars() {
        if let Some(terminal) = Terminal::from_symbol(ch) {
            out.push(terminal_step(terminal, params));
            continue;
        }
        let name: &str = ch.encode_utf8(&mut buf);
        if grammar.is_main_rule(name) {
            out.push(Step::Invoke(Invocation::production(name, &[])));
        } else {
            return Err(UnknownRuleKind {
                rule: format!("{name:?} in {symbols:?}"),
            });
        }
    }
    Ok(())
}

fn indexed(callee: Callee<'_>, index: i64, params: &ParamMap) -> Invocation {
    match callee {
        Callee::Terminal(terminal) => {
            let mut params = params.clone();
            params.insert("index".to_string(), Value::Int(index));
            Invocation::terminal(terminal, Some(params))
        }
        // A production gets the index as its call argument.
        Callee::Production(name) => Invocation::production(name, &[Value::Int(index)]),
    }
}

/// Build a `Choose` step from a rule table.
///
/// The outer error aborts the run (invalid probabilities); the inner error
/// is an unclassifiable candidate. `Ok(Ok(None))` means the table was
/// dropped: index-keyed tables need a `prob` parameter.
fn table(
    grammar: &Grammar,
    params: Option<&ParamMap>,
    entries: &[(TableKey, Rule)],
) -> Result<Result<Option<Step>, UnknownRuleKind>, LsysError> {
    let prob = params.and_then(|p| p.get("prob"));
    let indexed_table = entries
        .iter()
        .any(|(key, _)| matches!(key, TableKey::Index(_)));
    if indexed_table && prob.is_none() {
        return Ok(Ok(None));
    }

    let mut choices: Vec<(SelectorKey, Vec<Step>)> = Vec::with_capacity(entries.len());
    for (key, candidate) in entries {
        let key = match key {
            TableKey::Index(index) => {
                let Some(prob) = prob else {
                    return Ok(Ok(None));
                };
                let weight = index_weight(*index, prob)?;
                if choices
                    .iter()
                    .any(|(k, _)| *k == SelectorKey::Weight(weight))
                {
                    return Err(LsysError::ProbabilityKeyCollision {
                        key: weight,
                        index: *index,
                    });
                }
                SelectorKey::Weight(weight)
            }
            TableKey::Weight(w) => SelectorKey::Weight(*w),
            TableKey::Condition(c) => SelectorKey::Condition(c.clone()),
        };
        let mut steps = Vec::new();
        match append(grammar, params, std::slice::from_ref(candidate), &mut steps)? {
            AppendStatus::Complete => {}
            AppendStatus::Stopped(unknown) => return Ok(Err(unknown)),
        }
        choices.push((key, steps));
    }
    Ok(Ok(Some(Step::Choose(choices))))
}

/// `10*index + p`, where `p` is `prob[index-1]` for a list or `prob` itself
/// for a scalar.
fn index_weight(index: i64, prob: &Value) -> Result<f64, LsysError> {
    if !(1..=MAX_TABLE_INDEX).contains(&index) {
        return Err(LsysError::IndexOutOfRange(index));
    }
    let p = match prob {
        Value::List(items) => usize::try_from(index - 1)
            .ok()
            .and_then(|i| items.get(i))
            .and_then(Value::as_f64),
        scalar => scalar.as_f64(),
    };
    let Some(p) = p else {
        return Err(LsysError::ProbabilityOutOfRange {
            index,
            value: f64::NAN,
        });
    };
    if !(0.0..1.0).contains(&p) {
        return Err(LsysError::ProbabilityOutOfRange { index, value: p });
    }
    Ok(10.0 * index as f64 + p)
}
