//! Boolean condition expressions for edge routing.
//!
//! Supported forms: equality and ordering comparisons over numbers and
//! strings, `exists(path)`, bare paths (truthiness), and `and` / `or` /
//! `not` combinators with the usual precedence (`or` < `and` < `not`).
//! Evaluation is left-to-right with short-circuiting. A missing path
//! inside a comparison makes the comparison false rather than raising an
//! error; `exists` is the explicit presence check.

use serde_json::Value;

use crate::context::ResolveContext;
use crate::error::{ExpressionError, ExpressionResult};

/// A parsed condition expression.
#[derive(Debug, Clone)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Parse a condition from its source text.
    pub fn parse(source: &str) -> ExpressionResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExpressionError::Parse(format!(
                "unexpected trailing input in condition '{source}'"
            )));
        }
        Ok(Self { expr })
    }

    /// Evaluate against a context.
    #[must_use]
    pub fn evaluate(&self, ctx: &ResolveContext) -> bool {
        eval(&self.expr, ctx)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    Exists(String),
    Truthy(Operand),
}

#[derive(Debug, Clone)]
enum Operand {
    Literal(Value),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    And,
    Or,
    Not,
    Exists,
    Op(CmpOp),
    LParen,
    RParen,
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(source: &str) -> ExpressionResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j == chars.len() {
                    return Err(ExpressionError::Parse("unterminated string".into()));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Eq));
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse("expected '=='".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                } else {
                    return Err(ExpressionError::Parse("expected '!='".into()));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::Parse(format!("invalid number '{text}'")))?;
                tokens.push(Token::Num(num));
            }
            c if is_path_char(c) => {
                let start = i;
                while i < chars.len() && is_path_char(chars[i]) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "exists" => Token::Exists,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Path(text),
                });
            }
            other => {
                return Err(ExpressionError::Parse(format!(
                    "unexpected character {other:?}"
                )));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> ExpressionResult<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(ExpressionError::Parse(format!(
                "expected {expected:?}, found {other:?}"
            ))),
        }
    }

    fn parse_or(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ExpressionResult<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ExpressionResult<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ExpressionResult<Expr> {
        match self.peek() {
            Some(Token::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Exists) => {
                self.next();
                self.expect(&Token::LParen)?;
                let path = match self.next() {
                    Some(Token::Path(path)) => path,
                    other => {
                        return Err(ExpressionError::Parse(format!(
                            "exists() expects a path, found {other:?}"
                        )));
                    }
                };
                self.expect(&Token::RParen)?;
                Ok(Expr::Exists(path))
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> ExpressionResult<Expr> {
        let left = self.parse_operand()?;
        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.next();
            let right = self.parse_operand()?;
            return Ok(Expr::Cmp { left, op, right });
        }
        Ok(Expr::Truthy(left))
    }

    fn parse_operand(&mut self) -> ExpressionResult<Operand> {
        match self.next() {
            Some(Token::Path(path)) => Ok(Operand::Path(path)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Operand::Literal(
                serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
            )),
            Some(Token::Bool(b)) => Ok(Operand::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Operand::Literal(Value::Null)),
            other => Err(ExpressionError::Parse(format!(
                "expected an operand, found {other:?}"
            ))),
        }
    }
}

fn eval(expr: &Expr, ctx: &ResolveContext) -> bool {
    match expr {
        Expr::Or(left, right) => eval(left, ctx) || eval(right, ctx),
        Expr::And(left, right) => eval(left, ctx) && eval(right, ctx),
        Expr::Not(inner) => !eval(inner, ctx),
        Expr::Exists(path) => ctx.resolve_path(path).is_some(),
        Expr::Truthy(operand) => resolve(operand, ctx).as_ref().is_some_and(truthy),
        Expr::Cmp { left, op, right } => {
            let (Some(left), Some(right)) = (resolve(left, ctx), resolve(right, ctx)) else {
                // A missing side makes the comparison false, not an error.
                return false;
            };
            compare(&left, *op, &right)
        }
    }
}

fn resolve(operand: &Operand, ctx: &ResolveContext) -> Option<Value> {
    match operand {
        Operand::Literal(value) => Some(value.clone()),
        Operand::Path(path) => ctx.resolve_path(path),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(left: &Value, op: CmpOp, right: &Value) -> bool {
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let Some(ordering) = values_order(left, right) else {
                // Mixed types are unordered.
                return false;
            };
            match op {
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        // Numbers compare numerically so 1 == 1.0.
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}

fn values_order(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ResolveContext {
        let mut ctx = ResolveContext::new().with_variables(
            serde_json::from_value(json!({"severity": "critical", "count": 3, "ratio": 0.5}))
                .unwrap(),
        );
        ctx.set_node_output("review", json!({"approved": false, "score": 7}));
        ctx
    }

    fn eval(source: &str) -> bool {
        Condition::parse(source).unwrap().evaluate(&ctx())
    }

    #[test]
    fn string_equality() {
        assert!(eval("severity == 'critical'"));
        assert!(!eval("severity == 'none'"));
        assert!(eval("severity != 'none'"));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval("count == 3"));
        assert!(eval("count >= 3"));
        assert!(eval("count > 2"));
        assert!(eval("count < 4"));
        assert!(eval("ratio <= 0.5"));
        assert!(!eval("count > 3"));
    }

    #[test]
    fn node_output_paths() {
        assert!(eval("review.score > 5"));
        assert!(eval("review.approved == false"));
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert!(eval("severity < 'delta'"));
        assert!(eval("severity > 'alpha'"));
    }

    #[test]
    fn mixed_types_are_unequal_and_unordered() {
        assert!(!eval("count == 'three'"));
        assert!(eval("count != 'three'"));
        assert!(!eval("count < 'three'"));
        assert!(!eval("count > 'three'"));
    }

    #[test]
    fn missing_path_makes_comparison_false() {
        assert!(!eval("ghost == 'x'"));
        assert!(!eval("ghost != 'x'"));
        // An explicit presence check is the way to distinguish.
        assert!(!eval("exists(ghost)"));
        assert!(eval("exists(review.score)"));
    }

    #[test]
    fn logical_combinators() {
        assert!(eval("severity == 'critical' and count == 3"));
        assert!(!eval("severity == 'critical' and count == 4"));
        assert!(eval("severity == 'none' or count == 3"));
        assert!(eval("not severity == 'none'"));
    }

    #[test]
    fn precedence_or_lower_than_and() {
        // parsed as (false and false) or true
        assert!(eval("severity == 'none' and count == 9 or count == 3"));
    }

    #[test]
    fn parentheses_group() {
        assert!(!eval("severity == 'none' and (count == 9 or count == 3)"));
    }

    #[test]
    fn truthiness_of_bare_paths() {
        assert!(eval("severity"));
        assert!(!eval("review.approved"));
        assert!(!eval("ghost"));
        assert!(eval("true"));
        assert!(!eval("false"));
    }

    #[test]
    fn parse_errors() {
        assert!(Condition::parse("count ==").is_err());
        assert!(Condition::parse("count = 3").is_err());
        assert!(Condition::parse("'unterminated").is_err());
        assert!(Condition::parse("count == 3 trailing").is_err());
        assert!(Condition::parse("(count == 3").is_err());
    }

    #[test]
    fn negative_numbers() {
        let mut ctx = ResolveContext::new();
        ctx.set_variable("delta", json!(-2));
        assert!(Condition::parse("delta < -1").unwrap().evaluate(&ctx));
        assert!(Condition::parse("delta == -2").unwrap().evaluate(&ctx));
    }
}
