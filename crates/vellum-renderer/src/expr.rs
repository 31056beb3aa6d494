//! Scalar expression language for calculated variables and row
//! transforms.
//!
//! Covers identifiers, literals, arithmetic, comparisons, boolean
//! logic, and `datum.field` access. Anything outside this subset is a
//! parse error, which surfaces as a plugin-level block with a reason
//! before the approval round-trip.

use serde_json::{Number, Value};
use smol_str::SmolStr;
use std::collections::BTreeSet;

#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
pub enum ExprError {
    #[error("malformed expression at offset {offset}: {message}")]
    #[diagnostic(code(vellum::expr::parse))]
    Parse { offset: usize, message: String },
    #[error("unknown variable `{0}`")]
    #[diagnostic(code(vellum::expr::unknown))]
    Unknown(SmolStr),
    #[error("type error: {0}")]
    #[diagnostic(code(vellum::expr::type_error))]
    Type(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Ident(SmolStr),
    Field(Box<Expr>, SmolStr),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

/// Values an expression can read. `datum` is bound per-row during
/// data-frame transforms and is not a document variable.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Scope for std::collections::BTreeMap<SmolStr, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(SmolStr),
    Op(&'static str),
    Eof,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn next_token(&mut self) -> Result<Token, ExprError> {
        while self.rest().starts_with(|c: char| c.is_whitespace()) {
            self.pos += self.rest().chars().next().map_or(0, char::len_utf8);
        }
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit() {
            let end = rest
                .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
                .unwrap_or(rest.len());
            let text = &rest[..end];
            let num = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("bad number `{text}`")))?;
            self.pos += end;
            return Ok(Token::Number(num));
        }

        if c == '\'' || c == '"' {
            let mut out = String::new();
            let mut chars = rest.char_indices().skip(1);
            for (i, ch) in &mut chars {
                if ch == c {
                    self.pos += i + 1;
                    return Ok(Token::Str(out));
                }
                out.push(ch);
            }
            return Err(self.error("unterminated string literal"));
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let end = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            let ident = SmolStr::new(&rest[..end]);
            self.pos += end;
            return Ok(Token::Ident(ident));
        }

        for op in [
            "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "<", ">", "!", "(", ")",
            ".",
        ] {
            if rest.starts_with(op) {
                self.pos += op.len();
                return Ok(Token::Op(op));
            }
        }

        Err(self.error(format!("unexpected character `{c}`")))
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ExprError> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token, ExprError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn eat_op(&mut self, op: &'static str) -> Result<bool, ExprError> {
        if self.current == Token::Op(op) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat_op("||")? {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_equality()?;
        while self.eat_op("&&")? {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = if self.eat_op("==")? {
                BinOp::Eq
            } else if self.eat_op("!=")? {
                BinOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.eat_op("<=")? {
                BinOp::Le
            } else if self.eat_op(">=")? {
                BinOp::Ge
            } else if self.eat_op("<")? {
                BinOp::Lt
            } else if self.eat_op(">")? {
                BinOp::Gt
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_op("+")? {
                BinOp::Add
            } else if self.eat_op("-")? {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_op("*")? {
                BinOp::Mul
            } else if self.eat_op("/")? {
                BinOp::Div
            } else if self.eat_op("%")? {
                BinOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_op("!")? {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat_op("-")? {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        while self.eat_op(".")? {
            match self.advance()? {
                Token::Ident(field) => expr = Expr::Field(Box::new(expr), field),
                other => {
                    return Err(self
                        .lexer
                        .error(format!("expected field name after `.`, found {other:?}")))
                }
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance()? {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(ident) => match ident.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                _ => Ok(Expr::Ident(ident)),
            },
            Token::Op("(") => {
                let inner = self.parse_or()?;
                if !self.eat_op(")")? {
                    return Err(self.lexer.error("expected `)`"));
                }
                Ok(inner)
            }
            other => Err(self.lexer.error(format!("unexpected token {other:?}"))),
        }
    }
}

/// Parse an expression string.
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(src)?;
    let expr = parser.parse_or()?;
    match parser.current {
        Token::Eof => Ok(expr),
        ref other => Err(parser
            .lexer
            .error(format!("trailing input after expression: {other:?}"))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExprError::Type("non-finite number".into())),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(ExprError::Type(format!("expected number, got {other}"))),
    }
}

fn number_value(f: f64) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type("arithmetic produced a non-finite number".into()))
}

impl Expr {
    /// Document variables this expression reads. `datum` is a per-row
    /// binding, not a variable, and is excluded.
    pub fn references(&self, out: &mut BTreeSet<SmolStr>) {
        match self {
            Expr::Ident(name) => {
                if name != "datum" {
                    out.insert(name.clone());
                }
            }
            Expr::Field(base, _) => base.references(out),
            Expr::Not(inner) | Expr::Neg(inner) => inner.references(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.references(out);
                rhs.references(out);
            }
            _ => {}
        }
    }

    pub fn eval(&self, scope: &dyn Scope) -> Result<Value, ExprError> {
        match self {
            Expr::Number(n) => number_value(*n),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Ident(name) => scope
                .lookup(name)
                .ok_or_else(|| ExprError::Unknown(name.clone())),
            Expr::Field(base, field) => {
                let base = base.eval(scope)?;
                Ok(base.get(field.as_str()).cloned().unwrap_or(Value::Null))
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(scope)?))),
            Expr::Neg(inner) => number_value(-as_number(&inner.eval(scope)?)?),
            Expr::Binary(op, lhs, rhs) => {
                let l = lhs.eval(scope)?;
                match op {
                    BinOp::And => {
                        if !truthy(&l) {
                            return Ok(Value::Bool(false));
                        }
                        Ok(Value::Bool(truthy(&rhs.eval(scope)?)))
                    }
                    BinOp::Or => {
                        if truthy(&l) {
                            return Ok(Value::Bool(true));
                        }
                        Ok(Value::Bool(truthy(&rhs.eval(scope)?)))
                    }
                    _ => {
                        let r = rhs.eval(scope)?;
                        self.eval_binary(*op, l, r)
                    }
                }
            }
        }
    }

    fn eval_binary(&self, op: BinOp, l: Value, r: Value) -> Result<Value, ExprError> {
        match op {
            BinOp::Add => {
                // String concatenation when either side is a string.
                if l.is_string() || r.is_string() {
                    let ls = stringify(&l);
                    let rs = stringify(&r);
                    Ok(Value::String(format!("{ls}{rs}")))
                } else {
                    number_value(as_number(&l)? + as_number(&r)?)
                }
            }
            BinOp::Sub => number_value(as_number(&l)? - as_number(&r)?),
            BinOp::Mul => number_value(as_number(&l)? * as_number(&r)?),
            BinOp::Div => number_value(as_number(&l)? / as_number(&r)?),
            BinOp::Rem => number_value(as_number(&l)? % as_number(&r)?),
            BinOp::Eq => Ok(Value::Bool(loose_eq(&l, &r))),
            BinOp::Ne => Ok(Value::Bool(!loose_eq(&l, &r))),
            BinOp::Lt => Ok(Value::Bool(as_number(&l)? < as_number(&r)?)),
            BinOp::Le => Ok(Value::Bool(as_number(&l)? <= as_number(&r)?)),
            BinOp::Gt => Ok(Value::Bool(as_number(&l)? > as_number(&r)?)),
            BinOp::Ge => Ok(Value::Bool(as_number(&l)? >= as_number(&r)?)),
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled in eval"),
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn scope(pairs: &[(&str, Value)]) -> BTreeMap<SmolStr, Value> {
        pairs
            .iter()
            .map(|(k, v)| (SmolStr::new(*k), v.clone()))
            .collect()
    }

    #[test]
    fn arithmetic_and_precedence() {
        let expr = parse("a + b * 2").unwrap();
        let result = expr.eval(&scope(&[("a", json!(1)), ("b", json!(3))])).unwrap();
        assert_eq!(result, json!(7.0));
    }

    #[test]
    fn comparisons_and_logic() {
        let expr = parse("x > 3 && x <= 10").unwrap();
        assert_eq!(expr.eval(&scope(&[("x", json!(5))])).unwrap(), json!(true));
        assert_eq!(expr.eval(&scope(&[("x", json!(11))])).unwrap(), json!(false));
    }

    #[test]
    fn datum_field_access() {
        let expr = parse("datum.amount > 10").unwrap();
        let result = expr
            .eval(&scope(&[("datum", json!({"amount": 25}))]))
            .unwrap();
        assert_eq!(result, json!(true));

        let mut refs = BTreeSet::new();
        expr.references(&mut refs);
        assert!(refs.is_empty());
    }

    #[test]
    fn references_collects_variables() {
        let expr = parse("price * quantity + tax").unwrap();
        let mut refs = BTreeSet::new();
        expr.references(&mut refs);
        let names: Vec<&str> = refs.iter().map(SmolStr::as_str).collect();
        assert_eq!(names, ["price", "quantity", "tax"]);
    }

    #[test]
    fn malformed_expressions_are_parse_errors() {
        assert!(parse("a +").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a ~ b").is_err());
        assert!(parse("'unterminated").is_err());
    }

    #[test]
    fn string_concatenation() {
        let expr = parse("'total: ' + n").unwrap();
        assert_eq!(
            expr.eval(&scope(&[("n", json!(3))])).unwrap(),
            json!("total: 3")
        );
    }
}
