// Rule selector for probability and condition tables.
//
// A table is an ordered list of `(key, candidate)` entries. The type of the
// *first* key decides the selection mode for the whole table:
//
// - Condition mode (first key is an expression string): candidates are
//   tested in order and the first whose key is empty or evaluates true
//   against the parameter scope is chosen. Numeric keys in a condition
//   table are skipped.
// - Numeric mode (first key is a number): one uniform draw `r` in [0, 1) is
//   taken and the fractional parts of the numeric keys are accumulated in
//   order; the first candidate whose running sum exceeds `r` is chosen.
//   Condition keys in a numeric table are skipped.
//
// Either mode may choose nothing; the caller then drops the table.
//
// A condition that fails to parse or evaluate counts as false and is
// reported with `tracing::warn!`.
//
// **Critical constraint: determinism.** Numeric mode draws exactly one
// value per table from the `UnitSource` it is handed, and condition mode
// draws none. The engine hands it the selector stream, which nothing else
// draws from.

use crate::condition::{self, Scope};
use spina_prng::PlantRng;
use std::fmt;

/// Source of uniform draws in `[0, 1)`.
pub trait UnitSource {
    fn next_unit(&mut self) -> f64;
}

impl UnitSource for PlantRng {
    fn next_unit(&mut self) -> f64 {
        self.next_f64()
    }
}

/// Key of a table entry once it is ready for selection.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectorKey {
    /// Numeric key; only its fractional part matters.
    Weight(f64),
    /// Condition expression; empty is an unconditional "else".
    Condition(String),
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKey::Weight(w) => write!(f, "{w:.4}"),
            SelectorKey::Condition(c) => write!(f, "'{c}'"),
        }
    }
}

/// Outcome of one selection.
#[derive(Debug)]
pub struct Selection<'a, T> {
    /// The chosen entry's key, if any entry was chosen.
    pub key: Option<&'a SelectorKey>,
    pub candidate: Option<&'a T>,
    /// The uniform draw, in numeric mode.
    pub draw: Option<f64>,
}

impl<T> Selection<'_, T> {
    fn none(draw: Option<f64>) -> Self {
        Selection {
            key: None,
            candidate: None,
            draw,
        }
    }
}

/// Choose at most one entry of `table`.
pub fn select<'a, T>(
    table: &'a [(SelectorKey, T)],
    scope: &dyn Scope,
    rng: &mut dyn UnitSource,
) -> Selection<'a, T> {
    match table.first() {
        None => Selection::none(None),
        Some((SelectorKey::Condition(_), _)) => select_condition(table, scope),
        Some((SelectorKey::Weight(_), _)) => select_weighted(table, rng),
    }
}

fn select_condition<'a, T>(table: &'a [(SelectorKey, T)], scope: &dyn Scope) -> Selection<'a, T> {
    for (key, candidate) in table {
        let SelectorKey::Condition(expr) = key else {
            continue;
        };
        let holds = condition::evaluate(expr, scope).unwrap_or_else(|err| {
            tracing::warn!(condition = %expr, error = %err, "condition key treated as false");
            false
        });
        if holds {
            return Selection {
                key: Some(key),
                candidate: Some(candidate),
                draw: None,
            };
        }
    }
    Selection::none(None)
}

fn select_weighted<'a, T>(
    table: &'a [(SelectorKey, T)],
    rng: &mut dyn UnitSource,
) -> Selection<'a, T> {
    let r = rng.next_unit();
    let mut total = 0.0;
    for (key, candidate) in table {
        let SelectorKey::Weight(w) = key else {
            continue;
        };
        total += w - w.trunc();
        if r < total {
            return Selection {
                key: Some(key),
                candidate: Some(candidate),
                draw: Some(r),
            };
        }
    }
    Selection::none(Some(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamMap, Value};

    /// Replays fixed draws.
    struct Draws(Vec<f64>);

    impl UnitSource for Draws {
        fn next_unit(&mut self) -> f64 {
            self.0.remove(0)
        }
    }

    fn weighted() -> Vec<(SelectorKey, &'static str)> {
        vec![
            (SelectorKey::Weight(10.2), "A"),
            (SelectorKey::Weight(20.5), "B"),
        ]
    }

    #[test]
    fn fractional_parts_accumulate() {
        let table = weighted();
        let scope = ParamMap::new();
        let mut draws = Draws(vec![0.1, 0.35, 0.8]);

        let first = select(&table, &scope, &mut draws);
        assert_eq!(first.candidate, Some(&"A"));
        assert_eq!(first.draw, Some(0.1));

        let second = select(&table, &scope, &mut draws);
        assert_eq!(second.candidate, Some(&"B"));
        assert_eq!(second.key, Some(&SelectorKey::Weight(20.5)));

        // 0.2 + 0.5 = 0.7 <= 0.8: nothing chosen.
        let third = select(&table, &scope, &mut draws);
        assert_eq!(third.candidate, None);
        assert_eq!(third.draw, Some(0.8));
        assert!(draws.0.is_empty());
    }

    #[test]
    fn conditions_pick_first_true_and_draw_nothing() {
        let table = vec![
            (SelectorKey::Condition("y <= 3".into()), "X"),
            (SelectorKey::Condition(String::new()), "Y"),
        ];
        let mut draws = Draws(Vec::new());

        let mut scope = ParamMap::new();
        scope.insert("y".into(), Value::Int(2));
        assert_eq!(select(&table, &scope, &mut draws).candidate, Some(&"X"));

        scope.insert("y".into(), Value::Int(5));
        assert_eq!(select(&table, &scope, &mut draws).candidate, Some(&"Y"));
    }

    #[test]
    fn mode_follows_first_key() {
        let table = vec![
            (SelectorKey::Condition("False".into()), "X"),
            (SelectorKey::Weight(10.9), "W"),
        ];
        let mut draws = Draws(Vec::new());
        assert_eq!(select(&table, &ParamMap::new(), &mut draws).candidate, None);

        let table = vec![
            (SelectorKey::Weight(10.5), "W"),
            (SelectorKey::Condition(String::new()), "X"),
        ];
        let mut draws = Draws(vec![0.7]);
        assert_eq!(select(&table, &ParamMap::new(), &mut draws).candidate, None);
    }

    #[test]
    fn broken_condition_counts_as_false() {
        let table = vec![
            (SelectorKey::Condition("undefined_name > 1".into()), "X"),
            (SelectorKey::Condition("(".into()), "Y"),
            (SelectorKey::Condition(String::new()), "Z"),
        ];
        let mut draws = Draws(Vec::new());
        assert_eq!(select(&table, &ParamMap::new(), &mut draws).candidate, Some(&"Z"));
    }

    #[test]
    fn empty_table_selects_nothing() {
        let table: Vec<(SelectorKey, &str)> = Vec::new();
        let mut draws = Draws(Vec::new());
        let selection = select(&table, &ParamMap::new(), &mut draws);
        assert!(selection.candidate.is_none());
        assert!(selection.draw.is_none());
    }
}
