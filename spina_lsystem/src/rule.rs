// Grammar rules and the rule classifier.
//
// A production body returns a list of `Rule`s. A rule takes one of six
// shapes:
//
//   0 `Symbols`: a literal symbol string in classical L-system notation
//      ("F[+F]f"), translated character by character;
//   1 `Branch`: a nested rule list, bracketed by save/restore;
//   2 `Indexed`: `(index, name)`, calling `name` with `index` set in its
//      parameter mapping;
//   3 `Call`: `(name, args…)`, a production call whose arguments are bound
//      when it is invoked, not when it is queued;
//   4 `Bare`: a production or terminal referenced by name alone;
//   6 `Table`: a probability or condition table of candidate rules.
//
// Kind 5 (terminal draw call) is not a separate shape: `Bare` and `Call`
// rules whose name is a built-in terminal classify as `RuleKind::Terminal`.
//
// `classify` decides the kind. A name is a production ("main rule") only if
// it is registered in the `Grammar`; a name that is neither a registered
// production nor a built-in terminal is unclassifiable.
//
// See also: `accumulator.rs` which dispatches on `RuleKind`, `grammar.rs`
// for the registration table, `terminal.rs` for built-in names.

use crate::error::UnknownRuleKind;
use crate::grammar::Grammar;
use crate::params::Value;
use crate::terminal::Terminal;
use smallvec::SmallVec;
use std::fmt;

/// Call arguments queued with a production reference.
pub type Args = SmallVec<[Value; 4]>;

/// Key of a rule table entry.
#[derive(Clone, Debug, PartialEq)]
pub enum TableKey {
    /// 1-based branch index; its probability comes from the `prob`
    /// parameter when the table is appended.
    Index(i64),
    /// An already-combined numeric key whose fractional part is the weight.
    Weight(f64),
    /// A condition expression; empty means "else".
    Condition(String),
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKey::Index(i) => write!(f, "{i}"),
            TableKey::Weight(w) => write!(f, "{w:.4}"),
            TableKey::Condition(c) => write!(f, "'{c}'"),
        }
    }
}

/// A grammar rule as returned by a production body.
#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    Symbols(String),
    Branch(Vec<Rule>),
    Indexed(i64, String),
    Call(String, Args),
    Bare(String),
    Table(Vec<(TableKey, Rule)>),
}

impl Rule {
    pub fn symbols(s: &str) -> Self {
        Rule::Symbols(s.to_string())
    }

    pub fn branch<I: IntoIterator<Item = Rule>>(rules: I) -> Self {
        Rule::Branch(rules.into_iter().collect())
    }

    pub fn indexed(index: i64, name: &str) -> Self {
        Rule::Indexed(index, name.to_string())
    }

    pub fn call<I, V>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Rule::Call(name.to_string(), args.into_iter().map(Into::into).collect())
    }

    pub fn bare(name: &str) -> Self {
        Rule::Bare(name.to_string())
    }

    /// Bare references for each name, in order.
    pub fn bares(names: &[&str]) -> Vec<Rule> {
        names.iter().map(|n| Rule::bare(n)).collect()
    }

    /// An index-keyed probability table: `{1: a, 2: b, …}`.
    pub fn choice<'a, I: IntoIterator<Item = &'a str>>(names: I) -> Self {
        Rule::Table(
            names
                .into_iter()
                .zip(1..)
                .map(|(name, i)| (TableKey::Index(i), Rule::bare(name)))
                .collect(),
        )
    }

    /// A weight-keyed table, e.g. `{10.2: A, 20.5: B}`.
    pub fn weighted<I: IntoIterator<Item = (f64, Rule)>>(entries: I) -> Self {
        Rule::Table(
            entries
                .into_iter()
                .map(|(w, rule)| (TableKey::Weight(w), rule))
                .collect(),
        )
    }

    /// A condition-keyed table, e.g. `{"y<=3": X, "": Y}`.
    pub fn conditional<'a, I: IntoIterator<Item = (&'a str, Rule)>>(entries: I) -> Self {
        Rule::Table(
            entries
                .into_iter()
                .map(|(c, rule)| (TableKey::Condition(c.to_string()), rule))
                .collect(),
        )
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Symbols(s) => write!(f, "{s:?}"),
            Rule::Branch(rules) => {
                write!(f, "[")?;
                for rule in rules {
                    write!(f, "{rule},")?;
                }
                write!(f, "]")
            }
            Rule::Indexed(i, name) => write!(f, "({i},{name})"),
            Rule::Call(name, args) => {
                let args: Vec<String> = args.iter().map(Value::fixed).collect();
                write!(f, "{name}({})", args.join(","))
            }
            Rule::Bare(name) => write!(f, "{name}"),
            Rule::Table(entries) => {
                write!(f, "{{")?;
                for (key, rule) in entries {
                    write!(f, "{key}:{rule},")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// What a name refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Callee<'a> {
    Production(&'a str),
    Terminal(Terminal),
}

/// The classified shape of a rule, with its operands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RuleKind<'a> {
    LiteralSymbol(&'a str),
    Branch(&'a [Rule]),
    IndexedParam { callee: Callee<'a>, index: i64 },
    ArgCall { production: &'a str, args: &'a [Value] },
    BareProduction(&'a str),
    Terminal(Terminal),
    ProbabilityTable(&'a [(TableKey, Rule)]),
}

/// Resolve a name against the built-in terminals first, then the grammar.
pub fn resolve<'a>(name: &'a str, grammar: &Grammar) -> Option<Callee<'a>> {
    if let Some(terminal) = Terminal::from_name(name) {
        Some(Callee::Terminal(terminal))
    } else if grammar.is_main_rule(name) {
        Some(Callee::Production(name))
    } else {
        None
    }
}

/// Determine the kind of `rule`.
pub fn classify<'a>(rule: &'a Rule, grammar: &Grammar) -> Result<RuleKind<'a>, UnknownRuleKind> {
    let unknown = || UnknownRuleKind {
        rule: rule.to_string(),
    };
    Ok(match rule {
        Rule::Symbols(s) => RuleKind::LiteralSymbol(s),
        Rule::Branch(rules) => RuleKind::Branch(rules),
        Rule::Indexed(index, name) => RuleKind::IndexedParam {
            callee: resolve(name, grammar).ok_or_else(unknown)?,
            index: *index,
        },
        Rule::Call(name, args) => match resolve(name, grammar).ok_or_else(unknown)? {
            Callee::Terminal(terminal) => RuleKind::Terminal(terminal),
            Callee::Production(production) => RuleKind::ArgCall { production, args },
        },
        Rule::Bare(name) => match resolve(name, grammar).ok_or_else(unknown)? {
            Callee::Terminal(terminal) => RuleKind::Terminal(terminal),
            Callee::Production(production) => RuleKind::BareProduction(production),
        },
        Rule::Table(entries) if !entries.is_empty() => RuleKind::ProbabilityTable(entries),
        Rule::Table(_) => return Err(unknown()),
    })
}
