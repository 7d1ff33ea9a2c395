// Built-in terminal turtle operations.
//
// Terminals are the productions that never expand further: invoking one
// with its parameter mapping yields the finished command line(s) written to
// the command log, or nothing when the parameters it needs are absent
// (`draw` missing, zero angle, …). Missing parameters are a no-op, never an
// error.
//
// Each command line has the shape
//
//   \t{op:<54}#'{symbol}' : {rule} {Label}
//
// where `op` is a call the rendering host executes (`draw(length=…,width=…)`,
// `pitch_up(angle=…)`, `save()`, …) and everything after `#` is annotation.
// Floats are printed with four decimals.
//
// Several grammar names map to the same terminal (`F`, `Internode`, `Inter`
// and `Draw`; `f` and `Move`; `Tl` and `Turn_left`; `Tr` and `Turn_right`).
// Literal symbol strings are translated one character at a time through
// `Terminal::from_symbol`.
//
// See also: `rule.rs` which classifies names against `Terminal::from_name`,
// `accumulator.rs` which pairs terminals with parameters, `engine.rs` which
// invokes them.

use crate::params::{ParamMap, Value};

/// A built-in turtle operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Terminal {
    Draw,
    Move,
    Pitch,
    PitchDown,
    PitchUp,
    Turn,
    TurnLeft,
    TurnRight,
    Roll,
    RollLeft,
    RollRight,
    Object,
    Save,
    Restore,
    Curve,
}

impl Terminal {
    /// Every terminal, in declaration order.
    pub const ALL: [Terminal; 15] = [
        Terminal::Draw,
        Terminal::Move,
        Terminal::Pitch,
        Terminal::PitchDown,
        Terminal::PitchUp,
        Terminal::Turn,
        Terminal::TurnLeft,
        Terminal::TurnRight,
        Terminal::Roll,
        Terminal::RollLeft,
        Terminal::RollRight,
        Terminal::Object,
        Terminal::Save,
        Terminal::Restore,
        Terminal::Curve,
    ];

    /// Resolve a grammar name (including aliases) to a terminal.
    pub fn from_name(name: &str) -> Option<Terminal> {
        Some(match name {
            "Draw" | "Internode" | "Inter" | "F" => Terminal::Draw,
            "Move" | "f" => Terminal::Move,
            "Pitch" => Terminal::Pitch,
            "Pitch_down" => Terminal::PitchDown,
            "Pitch_up" => Terminal::PitchUp,
            "Turn" => Terminal::Turn,
            "Turn_left" | "Tl" => Terminal::TurnLeft,
            "Turn_right" | "Tr" => Terminal::TurnRight,
            "Roll" => Terminal::Roll,
            "Roll_left" => Terminal::RollLeft,
            "Roll_right" => Terminal::RollRight,
            "Object" => Terminal::Object,
            "Save" => Terminal::Save,
            "Restore" => Terminal::Restore,
            "Curve" => Terminal::Curve,
            _ => return None,
        })
    }

    /// Translate one character of a literal symbol string.
    pub fn from_symbol(ch: char) -> Option<Terminal> {
        Some(match ch {
            'F' => Terminal::Draw,
            'f' => Terminal::Move,
            '+' => Terminal::TurnLeft,
            '-' => Terminal::TurnRight,
            '&' => Terminal::PitchDown,
            '^' => Terminal::PitchUp,
            '\\' => Terminal::RollLeft,
            '/' => Terminal::RollRight,
            '[' => Terminal::Save,
            ']' => Terminal::Restore,
            _ => return None,
        })
    }

    /// Canonical grammar name.
    pub fn name(self) -> &'static str {
        match self {
            Terminal::Draw => "Draw",
            Terminal::Move => "Move",
            Terminal::Pitch => "Pitch",
            Terminal::PitchDown => "Pitch_down",
            Terminal::PitchUp => "Pitch_up",
            Terminal::Turn => "Turn",
            Terminal::TurnLeft => "Turn_left",
            Terminal::TurnRight => "Turn_right",
            Terminal::Roll => "Roll",
            Terminal::RollLeft => "Roll_left",
            Terminal::RollRight => "Roll_right",
            Terminal::Object => "Object",
            Terminal::Save => "Save",
            Terminal::Restore => "Restore",
            Terminal::Curve => "Curve",
        }
    }

    /// Number of arguments the operation takes: one (the parameter mapping)
    /// for everything except the structural save/restore markers.
    pub fn arity(self) -> usize {
        match self {
            Terminal::Save | Terminal::Restore => 0,
            _ => 1,
        }
    }

    /// Produce the command line(s) for this operation, or `None` when the
    /// parameters it needs are absent or degenerate.
    pub fn execute(self, params: Option<&ParamMap>) -> Option<Vec<String>> {
        match self {
            Terminal::Save => return Some(vec![format!("\t{:<54}#'[' : save", "save()")]),
            Terminal::Restore => {
                return Some(vec![format!("\t{:<54}#']' : restore", "restore()")]);
            }
            _ => {}
        }
        let p = params?;
        let rule = p.get("rule").and_then(Value::as_str).unwrap_or("");
        let one = |op: String, symbol: &str, label: &str| Some(vec![line(&op, symbol, rule, label)]);

        match self {
            Terminal::Draw => {
                let (length, width) = draw_size(p)?;
                if length > 0.0 && width > 0.0 {
                    one(draw_op(length, width), "F", "Draw")
                } else {
                    None
                }
            }
            Terminal::Move => {
                let length = indexed_scalar(p, "move")?;
                if length > 0.0 {
                    one(format!("move(length={length:.4})"), "f", "Move")
                } else {
                    None
                }
            }
            Terminal::Pitch => {
                let pitch = indexed_scalar(p, "pitch")?;
                if pitch < 0.0 {
                    one(format!("pitch_down(angle={:.4})", -pitch), "&", "Pitch")
                } else if pitch > 0.0 {
                    one(format!("pitch_up(angle={pitch:.4})"), "^", "Pitch")
                } else {
                    None
                }
            }
            Terminal::PitchDown => {
                let angle = indexed_scalar(p, "pitch")?.abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("pitch_down(angle={angle:.4})"), "&", rule, "Pitch_down")]
                })
            }
            Terminal::PitchUp => {
                let angle = indexed_scalar(p, "pitch")?.abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("pitch_up(angle={angle:.4})"), "^", rule, "Pitch_up")]
                })
            }
            Terminal::Turn => {
                let turn = indexed_scalar(p, "turn")?;
                if turn > 0.0 {
                    one(format!("turn_left(angle={turn:.4})"), "+", "Turn_left")
                } else if turn < 0.0 {
                    one(format!("turn_right(angle={:.4})", -turn), "-", "Turn_right")
                } else {
                    None
                }
            }
            Terminal::TurnLeft => {
                let angle = indexed_scalar(p, "turn_left")
                    .or_else(|| indexed_scalar(p, "turn"))?
                    .abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("turn_left(angle={angle:.4})"), "+", rule, "Turn_left")]
                })
            }
            Terminal::TurnRight => {
                let angle = indexed_scalar(p, "turn_right")
                    .or_else(|| indexed_scalar(p, "turn"))?
                    .abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("turn_right(angle={angle:.4})"), "-", rule, "Turn_right")]
                })
            }
            Terminal::Roll => {
                let roll = indexed_scalar(p, "roll")?;
                if roll < 0.0 {
                    one(format!("roll_right(angle={:.4})", -roll), "/", "Roll")
                } else if roll > 0.0 {
                    one(format!("roll_left(angle={roll:.4})"), "\\", "Roll")
                } else {
                    None
                }
            }
            Terminal::RollLeft => {
                let angle = indexed_scalar(p, "roll")?.abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("roll_left(angle={angle:.4})"), "\\", rule, "Roll_left")]
                })
            }
            Terminal::RollRight => {
                let angle = indexed_scalar(p, "roll")?.abs();
                (angle > 0.0).then(|| {
                    vec![line(&format!("roll_right(angle={angle:.4})"), "/", rule, "Roll_right")]
                })
            }
            Terminal::Object => {
                let file = p.get("object").and_then(Value::as_str)?;
                let (sx, sy, sz) = scale(p);
                let rule = if rule.is_empty() { "??" } else { rule };
                let op = format!("draw_obj(\"{file}\", scale=({sx:.4},{sy:.4},{sz:.4}))");
                Some(vec![line(&op, "~", rule, "Object")])
            }
            Terminal::Curve => curve(p, rule),
            Terminal::Save | Terminal::Restore => None,
        }
    }
}

/// Format one command line.
fn line(op: &str, symbol: &str, rule: &str, label: &str) -> String {
    format!("\t{op:<54}#'{symbol}' : {rule} {label}")
}

fn draw_op(length: f64, width: f64) -> String {
    format!("draw(length={length:.4},width={width:.4})")
}

/// Position selected by the `index` parameter, if any.
fn index_of(p: &ParamMap) -> usize {
    p.get("index")
        .and_then(Value::as_i64)
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or(0)
}

/// Pick the `index`'th element of a list-valued parameter (element 0 when
/// out of range); scalars are returned unchanged.
fn pick<'a>(p: &ParamMap, value: &'a Value) -> Option<&'a Value> {
    match value {
        Value::List(items) => items.get(index_of(p)).or_else(|| items.first()),
        other => Some(other),
    }
}

/// A scalar parameter, honouring `index` when the parameter is a list.
fn indexed_scalar(p: &ParamMap, key: &str) -> Option<f64> {
    pick(p, p.get(key)?)?.as_f64()
}

/// `draw` is either a `(length, width)` pair or a list of such pairs
/// selected by `index`.
fn draw_size(p: &ParamMap) -> Option<(f64, f64)> {
    let value = p.get("draw")?;
    let pair = match value.as_list()? {
        [first, ..] if first.as_list().is_some() => pick(p, value)?.as_list()?,
        items => items,
    };
    match pair {
        [length, width, ..] => Some((length.as_f64()?, width.as_f64()?)),
        _ => None,
    }
}

fn scale(p: &ParamMap) -> (f64, f64, f64) {
    let Some(value) = p.get("scale") else {
        return (1.0, 1.0, 1.0);
    };
    if let Some(s) = value.as_f64() {
        return (s, s, s);
    }
    match value.as_list() {
        Some([x, y, z, ..]) => (
            x.as_f64().unwrap_or(1.0),
            y.as_f64().unwrap_or(1.0),
            z.as_f64().unwrap_or(1.0),
        ),
        _ => (1.0, 1.0, 1.0),
    }
}

/// A curved stalk or awn: each `(pitch, turn, length, width)` segment of
/// `curve` emits a pitch, a turn and a draw line, skipping zero components.
fn curve(p: &ParamMap, rule: &str) -> Option<Vec<String>> {
    let segments = p.get("curve")?.as_list()?;
    let mut lines = Vec::new();
    for segment in segments {
        let Some([pitch, turn, length, width]) = segment.as_list().and_then(|s| s.get(..4)) else {
            continue;
        };
        let (Some(pitch), Some(turn), Some(length), Some(width)) =
            (pitch.as_f64(), turn.as_f64(), length.as_f64(), width.as_f64())
        else {
            continue;
        };
        if pitch != 0.0 {
            lines.push(line(&format!("pitch_up(angle={pitch:.4})"), ".", rule, "Pitch"));
        }
        if turn != 0.0 {
            lines.push(line(&format!("turn_left(angle={turn:.4})"), ".", rule, "Turn"));
        }
        if length > 0.0 && width > 0.0 {
            lines.push(line(&draw_op(length, width), "F", rule, "Draw"));
        }
    }
    if lines.is_empty() { None } else { Some(lines) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> ParamMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn draw_formats_four_decimals() {
        let p = params(&[("draw", Value::pair(5.0, 1.0)), ("rule", "Stalk".into())]);
        let lines = Terminal::Draw.execute(Some(&p)).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("\tdraw(length=5.0000,width=1.0000)"));
        assert!(lines[0].ends_with("#'F' : Stalk Draw"));
        // Column-aligned annotation.
        assert_eq!(lines[0].find('#'), Some(55));
    }

    #[test]
    fn draw_without_size_is_a_noop() {
        assert_eq!(Terminal::Draw.execute(Some(&ParamMap::new())), None);
        let p = params(&[("draw", Value::pair(0.0, 1.0))]);
        assert_eq!(Terminal::Draw.execute(Some(&p)), None);
        assert_eq!(Terminal::Draw.execute(None), None);
    }

    #[test]
    fn draw_list_of_pairs_honours_index() {
        let sizes = Value::List(vec![Value::pair(1.0, 0.1), Value::pair(2.0, 0.2)]);
        let p = params(&[("draw", sizes.clone()), ("index", Value::Int(1))]);
        let lines = Terminal::Draw.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("draw(length=2.0000,width=0.2000)"));

        let p = params(&[("draw", sizes), ("index", Value::Int(9))]);
        let lines = Terminal::Draw.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("draw(length=1.0000,width=0.1000)"));
    }

    #[test]
    fn signed_terminals_pick_direction() {
        let p = params(&[("pitch", Value::Float(-12.5))]);
        let lines = Terminal::Pitch.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("pitch_down(angle=12.5000)"));

        let p = params(&[("turn", Value::Float(-90.0))]);
        let lines = Terminal::Turn.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("turn_right(angle=90.0000)"));

        let p = params(&[("roll", Value::Float(-30.0))]);
        let lines = Terminal::Roll.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("roll_right(angle=30.0000)"));

        let p = params(&[("roll", Value::Int(0))]);
        assert_eq!(Terminal::Roll.execute(Some(&p)), None);
    }

    #[test]
    fn turn_left_falls_back_to_turn() {
        let p = params(&[("turn", Value::Float(25.0))]);
        let lines = Terminal::TurnLeft.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("turn_left(angle=25.0000)"));
        let p = params(&[("turn", Value::Float(25.0)), ("turn_right", Value::Float(10.0))]);
        let lines = Terminal::TurnRight.execute(Some(&p)).unwrap();
        assert!(lines[0].contains("turn_right(angle=10.0000)"));
    }

    #[test]
    fn object_with_scale() {
        let p = params(&[
            ("object", "grain.obj".into()),
            ("scale", Value::floats([1.0, 0.5, 2.0])),
            ("rule", "Grain".into()),
        ]);
        let lines = Terminal::Object.execute(Some(&p)).unwrap();
        assert!(lines[0].starts_with("\tdraw_obj(\"grain.obj\", scale=(1.0000,0.5000,2.0000))"));
        assert!(lines[0].ends_with("#'~' : Grain Object"));
    }

    #[test]
    fn curve_emits_per_segment_lines() {
        let curve = Value::List(vec![
            Value::floats([5.0, 0.0, 1.0, 0.1]),
            Value::floats([0.0, 3.0, 0.0, 0.1]),
        ]);
        let p = params(&[("curve", curve), ("rule", "Awn".into())]);
        let lines = Terminal::Curve.execute(Some(&p)).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("pitch_up(angle=5.0000)"));
        assert!(lines[1].contains("draw(length=1.0000,width=0.1000)"));
        assert!(lines[2].contains("turn_left(angle=3.0000)"));
    }

    #[test]
    fn curve_missing_is_a_noop() {
        let p = params(&[("rule", "Awn".into())]);
        assert_eq!(Terminal::Curve.execute(Some(&p)), None);
    }

    #[test]
    fn save_restore_need_no_params() {
        let save = Terminal::Save.execute(None).unwrap();
        let restore = Terminal::Restore.execute(None).unwrap();
        assert!(save[0].starts_with("\tsave()"));
        assert!(restore[0].starts_with("\trestore()"));
        assert_eq!(Terminal::Save.arity(), 0);
        assert_eq!(Terminal::Draw.arity(), 1);
    }

    #[test]
    fn names_and_symbols_resolve() {
        for terminal in Terminal::ALL {
            assert_eq!(Terminal::from_name(terminal.name()), Some(terminal));
        }
        assert_eq!(Terminal::from_name("Internode"), Some(Terminal::Draw));
        assert_eq!(Terminal::from_name("Tl"), Some(Terminal::TurnLeft));
        assert_eq!(Terminal::from_name("Stalk"), None);
        assert_eq!(Terminal::from_symbol('['), Some(Terminal::Save));
        assert_eq!(Terminal::from_symbol('\\'), Some(Terminal::RollLeft));
        assert_eq!(Terminal::from_symbol('X'), None);
    }
}
