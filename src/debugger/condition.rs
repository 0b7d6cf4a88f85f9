//! Breakpoint conditions.
//!
//! A condition is a boolean-valued expression evaluated against the variable bindings of the
//! execution position where a breakpoint trips. The trip algorithm only depends on the
//! [`Evaluator`] capability, [`ExpressionEvaluator`] is the builtin implementation with a small
//! expression language:
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not"* cmp
//! cmp     := sum (("==" | "!=" | "<=" | ">=" | "<" | ">") sum)*
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-"* atom
//! atom    := literal | identifier | "(" expr ")"
//! ```
//!
//! Comparisons chain like `a < b < c`, meaning `a < b and b < c` with `b` evaluated once.
//! Expressions nested deeper than [`MAX_NESTING`] levels or with more than [`MAX_OPERATORS`]
//! operators are rejected before parsing.
use crate::config;
use crate::debugger::variable::{Bindings, Value};
use chumsky::prelude::*;
use chumsky::Parser;
use lru::LruCache;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("malformed expression: {0}")]
    Parse(String),
    #[error("name `{0}` is not defined")]
    UnknownVariable(String),
    #[error("unsupported operand types for `{0}`: {1} and {2}")]
    TypeMismatch(&'static str, &'static str, &'static str),
    #[error("division by zero")]
    DivisionByZero,
}

/// Dynamic evaluator of breakpoint conditions.
pub trait Evaluator: Send + Sync {
    /// Evaluate `expression` against `bindings` and return its truth value.
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<bool, EvalError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
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
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// Two or more chained comparisons.
    Chain(Box<Expr>, Vec<(BinOp, Expr)>),
}

/// Maximum nesting of parentheses and unary operators in a condition.
pub const MAX_NESTING: usize = 16;
/// Maximum number of operators in a condition.
pub const MAX_OPERATORS: usize = 256;

const KEYWORDS: [&str; 8] = ["and", "or", "not", "None", "True", "False", "true", "false"];

type Err<'a> = extra::Err<Rich<'a, char>>;

pub(crate) fn keyword<'a>(kw: &'static str) -> impl Parser<'a, &'a str, (), Err<'a>> + Clone {
    text::ascii::ident()
        .try_map(move |ident: &str, span| {
            if ident == kw {
                Ok(())
            } else {
                Err(Rich::custom(span, format!("expected `{kw}`")))
            }
        })
        .padded()
        .labelled(kw)
}

/// Parser of literal values (numbers, strings, booleans and `None`).
pub fn literal<'a>() -> impl Parser<'a, &'a str, Value, Err<'a>> + Clone {
    let float = text::int(10)
        .then(just('.').then(text::digits(10).at_least(1)))
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<f64>()
                .map(Value::Float)
                .map_err(|e| Rich::custom(span, e))
        });
    let int = text::int(10).try_map(|s: &str, span| {
        s.parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Rich::custom(span, e))
    });
    let string = |quote: char| {
        none_of([quote])
            .repeated()
            .to_slice()
            .map(|s: &str| Value::Str(s.to_string()))
            .delimited_by(just(quote), just(quote))
    };
    let constant = text::ascii::ident().try_map(|ident: &str, span| match ident {
        "None" => Ok(Value::None),
        "True" | "true" => Ok(Value::Bool(true)),
        "False" | "false" => Ok(Value::Bool(false)),
        _ => Err(Rich::custom(span, "expected literal")),
    });

    choice((float, int, string('"'), string('\''), constant))
        .padded()
        .labelled("literal")
}

fn variable<'a>() -> impl Parser<'a, &'a str, Expr, Err<'a>> + Clone {
    text::ascii::ident()
        .try_map(|ident: &str, span| {
            if KEYWORDS.contains(&ident) {
                Err(Rich::custom(span, format!("unexpected keyword `{ident}`")))
            } else {
                Ok(Expr::Variable(ident.to_string()))
            }
        })
        .padded()
        .labelled("variable name")
}

/// Parser of condition expressions.
pub fn parser<'a>() -> impl Parser<'a, &'a str, Expr, Err<'a>> {
    let expr = recursive(|expr| {
        let op = |c| just(c).padded();

        let atom = literal()
            .map(Expr::Literal)
            .or(variable())
            .or(expr.delimited_by(op("("), op(")")))
            .padded()
            .boxed();

        let unary = op("-")
            .repeated()
            .foldr(atom, |_op, rhs| Expr::Neg(Box::new(rhs)))
            .boxed();

        let product = unary.clone().foldl(
            choice((
                op("*").to(BinOp::Mul),
                op("/").to(BinOp::Div),
                op("%").to(BinOp::Rem),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        )
        .boxed();

        let sum = product.clone().foldl(
            choice((op("+").to(BinOp::Add), op("-").to(BinOp::Sub)))
                .then(product)
                .repeated(),
            |lhs, (op, rhs)| Expr::Binary(Box::new(lhs), op, Box::new(rhs)),
        )
        .boxed();

        let cmp_op = choice((
            op("==").to(BinOp::Eq),
            op("!=").to(BinOp::Ne),
            op("<=").to(BinOp::Le),
            op(">=").to(BinOp::Ge),
            op("<").to(BinOp::Lt),
            op(">").to(BinOp::Gt),
        ));
        let cmp = sum
            .clone()
            .then(cmp_op.then(sum).repeated().collect::<Vec<_>>())
            .map(|(lhs, mut chain)| match chain.len() {
                0 => lhs,
                1 => {
                    let (op, rhs) = chain.remove(0);
                    Expr::Binary(Box::new(lhs), op, Box::new(rhs))
                }
                _ => Expr::Chain(Box::new(lhs), chain),
            })
            .boxed();

        let not = keyword("not")
            .repeated()
            .foldr(cmp, |_op, rhs| Expr::Not(Box::new(rhs)))
            .boxed();

        let and = not
            .clone()
            .foldl(keyword("and").ignore_then(not).repeated(), |lhs, rhs| {
                Expr::And(Box::new(lhs), Box::new(rhs))
            })
            .boxed();

        and.clone().foldl(
            keyword("or").ignore_then(and).repeated(),
            |lhs, rhs| Expr::Or(Box::new(lhs), Box::new(rhs)),
        )
    });

    expr.then_ignore(end())
}

/// Rough token scan that measures expression nesting and operator count, parser and
/// evaluator recursion are bounded by these two.
#[derive(Default)]
struct Complexity {
    /// Unary operator runs of enclosing parentheses levels.
    levels: Vec<usize>,
    /// Unary operators before the current operand.
    run: usize,
    operators: usize,
    operand_seen: bool,
}

impl Complexity {
    fn nesting(&self) -> usize {
        self.levels.len() + self.levels.iter().sum::<usize>() + self.run
    }

    fn unary(&mut self) {
        self.run += 1;
        self.operators += 1;
    }

    fn binary(&mut self) {
        if self.operand_seen {
            self.operators += 1;
        }
        self.operand_seen = false;
    }

    fn operand(&mut self) {
        self.run = 0;
        self.operand_seen = true;
    }

    fn open(&mut self) {
        self.levels.push(self.run);
        self.run = 0;
        self.operand_seen = false;
    }

    fn close(&mut self) {
        self.levels.pop();
        self.operand();
    }

    fn check(&self) -> Result<(), EvalError> {
        if self.nesting() > MAX_NESTING {
            return Err(EvalError::Parse(format!(
                "expression nested deeper than {MAX_NESTING} levels"
            )));
        }
        if self.operators > MAX_OPERATORS {
            return Err(EvalError::Parse(format!(
                "expression has more than {MAX_OPERATORS} operators"
            )));
        }
        Ok(())
    }
}

fn check_complexity(expression: &str) -> Result<(), EvalError> {
    let mut complexity = Complexity::default();
    let mut chars = expression.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => continue,
            '\'' | '"' => {
                chars.by_ref().find(|&n| n == c);
                complexity.operand();
            }
            '(' => complexity.open(),
            ')' => complexity.close(),
            '-' if !complexity.operand_seen => complexity.unary(),
            '-' | '+' | '*' | '/' | '%' | '<' | '>' | '=' | '!' => complexity.binary(),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if !(n.is_ascii_alphanumeric() || n == '_' || n == '.') {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                match word.as_str() {
                    "not" => complexity.unary(),
                    "and" | "or" => complexity.binary(),
                    _ => complexity.operand(),
                }
            }
            _ => {}
        }
        complexity.check()?;
    }
    Ok(())
}

/// Parse condition expression.
pub fn parse(expression: &str) -> Result<Expr, EvalError> {
    check_complexity(expression)?;
    parser()
        .parse(expression)
        .into_result()
        .map_err(|e| EvalError::Parse(e[0].to_string()))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(*b as i64 as f64),
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(*b as i64),
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn arithmetic(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch(op.symbol(), lhs.type_name(), rhs.type_name());

    if let (BinOp::Add, Value::Str(l), Value::Str(r)) = (op, &lhs, &rhs) {
        return Ok(Value::Str(format!("{l}{r}")));
    }

    if let (Some(l), Some(r)) = (as_int(&lhs), as_int(&rhs)) {
        let result = match op {
            BinOp::Add => l.checked_add(r),
            BinOp::Sub => l.checked_sub(r),
            BinOp::Mul => l.checked_mul(r),
            BinOp::Div if r == 0 => return Err(EvalError::DivisionByZero),
            BinOp::Div => return Ok(Value::Float(l as f64 / r as f64)),
            BinOp::Rem if r == 0 => return Err(EvalError::DivisionByZero),
            // result takes the sign of a divisor
            BinOp::Rem => l
                .checked_rem(r)
                .map(|m| if m != 0 && (m < 0) != (r < 0) { m + r } else { m }),
            _ => unreachable!("infallible: only arithmetic operators"),
        };
        // on overflow fallback to float arithmetic
        if let Some(result) = result {
            return Ok(Value::Int(result));
        }
    }

    let (l, r) = as_number(&lhs)
        .zip(as_number(&rhs))
        .ok_or_else(mismatch)?;
    let result = match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div if r == 0.0 => return Err(EvalError::DivisionByZero),
        BinOp::Div => l / r,
        BinOp::Rem if r == 0.0 => return Err(EvalError::DivisionByZero),
        BinOp::Rem => l - r * (l / r).floor(),
        _ => unreachable!("infallible: only arithmetic operators"),
    };
    Ok(Value::Float(result))
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let equality = matches!(op, BinOp::Eq | BinOp::Ne);
    let ordering = match (lhs, rhs) {
        (Value::Str(l), Value::Str(r)) => Some(l.cmp(r)),
        (Value::None, Value::None) if equality => Some(Ordering::Equal),
        _ => match as_number(lhs).zip(as_number(rhs)) {
            // `None` here means NaN on one of the sides
            Some((l, r)) => l.partial_cmp(&r),
            None if equality => None,
            None => {
                return Err(EvalError::TypeMismatch(
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name(),
                ))
            }
        },
    };

    let result = match op {
        BinOp::Eq => ordering == Some(Ordering::Equal),
        BinOp::Ne => ordering != Some(Ordering::Equal),
        BinOp::Lt => ordering == Some(Ordering::Less),
        BinOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinOp::Gt => ordering == Some(Ordering::Greater),
        BinOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        _ => unreachable!("infallible: only comparison operators"),
    };
    Ok(Value::Bool(result))
}

impl Expr {
    /// Evaluate expression into a value.
    pub fn eval(&self, bindings: &Bindings) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Variable(name) => bindings
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
            Expr::Neg(expr) => match expr.eval(bindings)? {
                Value::Int(i) => Ok(i
                    .checked_neg()
                    .map(Value::Int)
                    .unwrap_or(Value::Float(-(i as f64)))),
                Value::Bool(b) => Ok(Value::Int(-(b as i64))),
                Value::Float(f) => Ok(Value::Float(-f)),
                v => Err(EvalError::TypeMismatch("-", v.type_name(), v.type_name())),
            },
            Expr::Not(expr) => Ok(Value::Bool(!expr.eval(bindings)?.is_truthy())),
            Expr::And(lhs, rhs) => {
                let lhs = lhs.eval(bindings)?;
                if !lhs.is_truthy() {
                    return Ok(lhs);
                }
                rhs.eval(bindings)
            }
            Expr::Or(lhs, rhs) => {
                let lhs = lhs.eval(bindings)?;
                if lhs.is_truthy() {
                    return Ok(lhs);
                }
                rhs.eval(bindings)
            }
            Expr::Chain(first, chain) => {
                let mut lhs = first.eval(bindings)?;
                let mut result = Value::Bool(true);
                for (op, rhs) in chain {
                    let rhs = rhs.eval(bindings)?;
                    result = compare(*op, &lhs, &rhs)?;
                    if !result.is_truthy() {
                        break;
                    }
                    lhs = rhs;
                }
                Ok(result)
            }
            Expr::Binary(lhs, op, rhs) => {
                let lhs = lhs.eval(bindings)?;
                let rhs = rhs.eval(bindings)?;
                match op {
                    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
                        arithmetic(*op, lhs, rhs)
                    }
                    _ => compare(*op, &lhs, &rhs),
                }
            }
        }
    }
}

/// Builtin condition evaluator. Parsed expressions are kept in a LRU cache, so conditions
/// evaluated at every pass are parsed once.
pub struct ExpressionEvaluator {
    cache: Mutex<LruCache<String, Arc<Expr>>>,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(config::current().condition.cache_size)
    }
}

impl ExpressionEvaluator {
    /// Create evaluator.
    ///
    /// # Arguments
    ///
    /// * `cache_size`: capacity of parsed expressions cache, at least one expression is cached
    pub fn new(cache_size: usize) -> Self {
        let cap = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn compile(&self, expression: &str) -> Result<Arc<Expr>, EvalError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expr) = cache.get(expression) {
            return Ok(expr.clone());
        }
        let expr = Arc::new(parse(expression)?);
        cache.put(expression.to_string(), expr.clone());
        Ok(expr)
    }

    /// Evaluate expression into a value (not only a truth value).
    pub fn value(&self, expression: &str, bindings: &Bindings) -> Result<Value, EvalError> {
        self.compile(expression)?.eval(bindings)
    }
}

impl Evaluator for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<bool, EvalError> {
        Ok(self.value(expression, bindings)?.is_truthy())
    }
}
