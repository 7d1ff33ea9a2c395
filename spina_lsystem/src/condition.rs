// Condition keys for conditional rule tables.
//
// A conditional table maps string keys to candidate rules; the selector
// returns the first candidate whose key holds. A key is either empty (the
// unconditional "else") or a small side-effect-free predicate over the
// variables visible to the engine and grammar: `y <= 3`,
// `stage < Grain_count - 2 and PlantNr % 2 == 0`, `not (rule == 'Awn')`.
//
// Grammar (lowest to highest precedence):
//   or      := and (("or" | "||") and)*
//   and     := not (("and" | "&&") not)*
//   not     := ("not" | "!") not | compare
//   compare := sum (cmp_op sum)*          -- chained: a < b < c
//   sum     := product (("+" | "-") product)*
//   product := unary (("*" | "/" | "%") unary)*
//   unary   := "-" unary | atom
//   atom    := number | 'text' | "text" | True | False | ident | "(" or ")"
//
// Arithmetic follows Python: `/` is true division, `%` takes the sign of
// the divisor, and int-with-int stays int.
//
// See also: `selector.rs` which evaluates keys through `evaluate`,
// `params.rs` where `ParamStore` implements `Scope`.

use crate::params::{ParamMap, Value};

/// Variables visible to condition keys.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for ParamMap {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Why a condition key could not be evaluated.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("syntax error at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("unknown variable {0:?}")]
    UnknownVariable(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Parsed condition expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// A comparison chain `a op1 b op2 c …`.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(Value),
    Text(String),
    Ident(String),
    Cmp(CmpOp),
    Arith(ArithOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let syntax = |pos: usize, message: &str| ConditionError::Syntax {
        pos,
        message: message.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let two = src.get(i..i + 2).unwrap_or("");
        let token = match two {
            "<=" => Some(Token::Cmp(CmpOp::Le)),
            ">=" => Some(Token::Cmp(CmpOp::Ge)),
            "==" => Some(Token::Cmp(CmpOp::Eq)),
            "!=" => Some(Token::Cmp(CmpOp::Ne)),
            "&&" => Some(Token::And),
            "||" => Some(Token::Or),
            _ => None,
        };
        if let Some(token) = token {
            tokens.push((start, token));
            i += 2;
            continue;
        }
        let single = match c {
            '<' => Some(Token::Cmp(CmpOp::Lt)),
            '>' => Some(Token::Cmp(CmpOp::Gt)),
            '+' => Some(Token::Arith(ArithOp::Add)),
            '-' => Some(Token::Arith(ArithOp::Sub)),
            '*' => Some(Token::Arith(ArithOp::Mul)),
            '/' => Some(Token::Arith(ArithOp::Div)),
            '%' => Some(Token::Arith(ArithOp::Rem)),
            '!' => Some(Token::Not),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((start, token));
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let close = src[i + 1..]
                .find(c)
                .ok_or_else(|| syntax(start, "unterminated string"))?;
            let text = &src[i + 1..i + 1 + close];
            tokens.push((start, Token::Text(text.to_string())));
            i += close + 2;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let literal = &src[start..i];
            let value = if literal.contains('.') {
                literal
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| syntax(start, "malformed number"))?
            } else {
                literal
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| syntax(start, "malformed number"))?
            };
            tokens.push((start, Token::Number(value)));
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &src[start..i];
            let token = match word {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "True" | "true" => Token::Number(Value::Bool(true)),
                "False" | "false" => Token::Number(Value::Bool(false)),
                _ => Token::Ident(word.to_string()),
            };
            tokens.push((start, token));
            continue;
        }

        return Err(syntax(start, &format!("unexpected character {c:?}")));
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn err(&self, message: &str) -> ConditionError {
        ConditionError::Syntax {
            pos: self.offset(),
            message: message.to_string(),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ConditionError> {
        let first = self.parse_sum()?;
        let mut chain = Vec::new();
        while let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.advance();
            chain.push((op, self.parse_sum()?));
        }
        if chain.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), chain))
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_product()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div | ArithOp::Rem))) =
            self.peek()
        {
            let op = *op;
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Arith(ArithOp::Sub)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ConditionError> {
        match self.advance() {
            Some(Token::Number(v)) => Ok(Expr::Literal(v)),
            Some(Token::Text(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if self.advance() != Some(Token::RParen) {
                    self.pos -= 1;
                    return Err(self.err("expected ')'"));
                }
                Ok(inner)
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.err("expected a value"))
            }
            None => Err(self.err("unexpected end of condition")),
        }
    }
}

/// Parse a condition key.
pub fn parse(src: &str) -> Result<Expr, ConditionError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.err("unexpected trailing input"));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn arith(op: ArithOp, a: &Value, b: &Value) -> Result<Value, ConditionError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        return match op {
            ArithOp::Add => Ok(Value::Int(x.wrapping_add(*y))),
            ArithOp::Sub => Ok(Value::Int(x.wrapping_sub(*y))),
            ArithOp::Mul => Ok(Value::Int(x.wrapping_mul(*y))),
            ArithOp::Div if *y == 0 => Err(ConditionError::DivisionByZero),
            ArithOp::Div => Ok(Value::Float(*x as f64 / *y as f64)),
            ArithOp::Rem if *y == 0 => Err(ConditionError::DivisionByZero),
            ArithOp::Rem => {
                // Remainder takes the divisor's sign.
                let r = x.wrapping_rem(*y);
                if r != 0 && (r < 0) != (*y < 0) {
                    Ok(Value::Int(r + y))
                } else {
                    Ok(Value::Int(r))
                }
            }
        };
    }
    if let (Value::Text(x), Value::Text(y), ArithOp::Add) = (a, b, op) {
        return Ok(Value::Text(format!("{x}{y}")));
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(ConditionError::Type(format!(
            "cannot apply {op:?} to {a} and {b}"
        )));
    };
    match op {
        ArithOp::Add => Ok(Value::Float(x + y)),
        ArithOp::Sub => Ok(Value::Float(x - y)),
        ArithOp::Mul => Ok(Value::Float(x * y)),
        ArithOp::Div if y == 0.0 => Err(ConditionError::DivisionByZero),
        ArithOp::Div => Ok(Value::Float(x / y)),
        ArithOp::Rem if y == 0.0 => Err(ConditionError::DivisionByZero),
        ArithOp::Rem => Ok(Value::Float(((x % y) + y) % y)),
    }
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, ConditionError> {
    use std::cmp::Ordering;

    let ordering = match (a, b) {
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            // Mixed kinds are never equal, and never ordered.
            _ => {
                return match op {
                    CmpOp::Eq => Ok(a == b),
                    CmpOp::Ne => Ok(a != b),
                    _ => Err(ConditionError::Type(format!("cannot order {a} and {b}"))),
                };
            }
        },
    };
    let Some(ordering) = ordering else {
        // NaN: only != holds.
        return Ok(op == CmpOp::Ne);
    };
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

impl Expr {
    /// Evaluate against `scope`.
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value, ConditionError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => scope
                .lookup(name)
                .ok_or_else(|| ConditionError::UnknownVariable(name.clone())),
            Expr::Neg(inner) => match inner.eval(scope)? {
                Value::Int(i) => Ok(Value::Int(i.wrapping_neg())),
                other => other
                    .as_f64()
                    .map(|f| Value::Float(-f))
                    .ok_or_else(|| ConditionError::Type(format!("cannot negate {other}"))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(scope)?.is_truthy())),
            Expr::And(a, b) => {
                let left = a.eval(scope)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                b.eval(scope)
            }
            Expr::Or(a, b) => {
                let left = a.eval(scope)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                b.eval(scope)
            }
            Expr::Arith(op, a, b) => arith(*op, &a.eval(scope)?, &b.eval(scope)?),
            Expr::Compare(first, chain) => {
                let mut left = first.eval(scope)?;
                for (op, expr) in chain {
                    let right = expr.eval(scope)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
        }
    }
}

/// Evaluate a condition key. The empty (or all-whitespace) key is the
/// unconditional "else" and always holds.
pub fn evaluate(src: &str, scope: &dyn Scope) -> Result<bool, ConditionError> {
    if src.trim().is_empty() {
        return Ok(true);
    }
    Ok(parse(src)?.eval(scope)?.is_truthy())
}
