//! # Guard Evaluator
//!
//! Boolean expressions over store paths, used by `emptyState.when` clauses
//! and anywhere a flow document gates behavior on state. The grammar is
//! fixed and tiny: dotted paths, literals, comparisons and logical
//! connectives. Expressions parse into an AST and evaluate directly, so
//! there is no dynamic code execution surface.
//!
//! Evaluation is total: an empty expression is vacuously true, and any parse
//! failure logs a diagnostic and reads as `false` rather than surfacing to
//! the caller.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, opt, recognize, value},
    error::{context, VerboseError},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::warn;

use crate::binding::resolve_expr;
use crate::context::Ctx;
use crate::store::StateStore;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("failed to parse guard expression `{expr}`: {message}")]
    Parse { expr: String, message: String },
    #[error("trailing input in guard expression `{expr}` at `{rest}`")]
    TrailingInput { expr: String, rest: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(Operand, CmpOp, Operand),
    /// A bare operand, tested for truthiness.
    Test(Operand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Json),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Evaluates `expr` against the context and store. Never fails; malformed
/// expressions log a warning and read as false.
pub fn eval_expr(expr: &str, ctx: &Ctx, store: &StateStore) -> bool {
    if expr.trim().is_empty() {
        return true;
    }
    match parse(expr) {
        Ok(ast) => eval(&ast, ctx, store),
        Err(err) => {
            warn!("guard rejected: {}", err);
            false
        }
    }
}

/// Parses an expression into its AST. Exposed separately so callers can
/// validate guards ahead of time.
pub fn parse(expr: &str) -> Result<Expr, GuardError> {
    match or_expr(expr) {
        Ok((rest, ast)) => {
            if rest.trim().is_empty() {
                Ok(ast)
            } else {
                Err(GuardError::TrailingInput {
                    expr: expr.to_string(),
                    rest: rest.trim().to_string(),
                })
            }
        }
        Err(err) => Err(GuardError::Parse {
            expr: expr.to_string(),
            message: err.to_string(),
        }),
    }
}

fn or_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), and_expr))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e))),
    ))
}

fn and_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), not_expr))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e))),
    ))
}

fn not_expr(input: &str) -> ParseResult<'_, Expr> {
    alt((
        map(preceded(ws(char('!')), not_expr), |e| Expr::Not(Box::new(e))),
        atom,
    ))(input)
}

fn atom(input: &str) -> ParseResult<'_, Expr> {
    alt((
        delimited(ws(char('(')), or_expr, ws(char(')'))),
        cmp_expr,
    ))(input)
}

fn cmp_expr(input: &str) -> ParseResult<'_, Expr> {
    let (input, lhs) = operand(input)?;
    let (input, tail) = opt(pair(ws(cmp_op), operand))(input)?;
    Ok((
        input,
        match tail {
            Some((op, rhs)) => Expr::Cmp(lhs, op, rhs),
            None => Expr::Test(lhs),
        },
    ))
}

fn cmp_op(input: &str) -> ParseResult<'_, CmpOp> {
    context(
        "comparison operator",
        alt((
            value(CmpOp::Eq, tag("==")),
            value(CmpOp::Ne, tag("!=")),
            value(CmpOp::Le, tag("<=")),
            value(CmpOp::Ge, tag(">=")),
            value(CmpOp::Lt, tag("<")),
            value(CmpOp::Gt, tag(">")),
        )),
    )(input)
}

fn operand(input: &str) -> ParseResult<'_, Operand> {
    context(
        "operand",
        ws(alt((quoted_literal, negative_number, bare_token))),
    )(input)
}

fn quoted_literal(input: &str) -> ParseResult<'_, Operand> {
    map(
        alt((
            delimited(char('"'), take_till(|c| c == '"'), char('"')),
            delimited(char('\''), take_till(|c| c == '\''), char('\'')),
        )),
        |s: &str| Operand::Literal(Json::String(s.to_string())),
    )(input)
}

fn negative_number(input: &str) -> ParseResult<'_, Operand> {
    map(
        recognize(pair(
            char('-'),
            take_while1(|c: char| c.is_ascii_digit() || c == '.'),
        )),
        token_to_operand,
    )(input)
}

/// A dotted identifier or an unsigned number; which one is decided after the
/// token is taken, so `workspace.artifacts.length` and `1.5` share a lexer.
fn bare_token(input: &str) -> ParseResult<'_, Operand> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        token_to_operand,
    )(input)
}

fn token_to_operand(token: &str) -> Operand {
    match token {
        "true" => Operand::Literal(Json::Bool(true)),
        "false" => Operand::Literal(Json::Bool(false)),
        "null" => Operand::Literal(Json::Null),
        _ => {
            let leading = token.chars().next().unwrap_or('a');
            if leading.is_ascii_digit() || leading == '-' {
                match token.parse::<f64>() {
                    Ok(n) => Operand::Literal(
                        serde_json::Number::from_f64(n)
                            .map(Json::Number)
                            .unwrap_or(Json::Null),
                    ),
                    Err(_) => Operand::Path(token.to_string()),
                }
            } else {
                Operand::Path(token.to_string())
            }
        }
    }
}

fn ws<'a, T>(
    inner: impl FnMut(&'a str) -> ParseResult<'a, T>,
) -> impl FnMut(&'a str) -> ParseResult<'a, T> {
    delimited(multispace0, inner, multispace0)
}

fn eval(expr: &Expr, ctx: &Ctx, store: &StateStore) -> bool {
    match expr {
        Expr::Or(a, b) => eval(a, ctx, store) || eval(b, ctx, store),
        Expr::And(a, b) => eval(a, ctx, store) && eval(b, ctx, store),
        Expr::Not(inner) => !eval(inner, ctx, store),
        Expr::Test(op) => truthy(&resolve(op, ctx, store)),
        Expr::Cmp(lhs, op, rhs) => {
            compare(&resolve(lhs, ctx, store), *op, &resolve(rhs, ctx, store))
        }
    }
}

fn resolve(operand: &Operand, ctx: &Ctx, store: &StateStore) -> Json {
    match operand {
        Operand::Literal(v) => v.clone(),
        Operand::Path(p) => resolve_expr(p, ctx, store).unwrap_or(Json::Null),
    }
}

/// Missing, null, false, zero and the empty string read as false; every
/// other value, composites included, reads as true.
fn truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Json::String(s) => !s.is_empty(),
        Json::Array(_) | Json::Object(_) => true,
    }
}

fn compare(lhs: &Json, op: CmpOp, rhs: &Json) -> bool {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return match op {
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Le => a <= b,
            CmpOp::Gt => a > b,
            CmpOp::Ge => a >= b,
        };
    }
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        _ => match (lhs.as_str(), rhs.as_str()) {
            (Some(a), Some(b)) => match op {
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                CmpOp::Ge => a >= b,
                _ => unreachable!(),
            },
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store_with(doc: Json) -> StateStore {
        StateStore::with_document(doc)
    }

    #[test]
    fn parses_comparisons_and_connectives() {
        let ast = parse("workspace.status == 'IDLE' && !ui.busy").unwrap();
        assert_eq!(
            ast,
            Expr::And(
                Box::new(Expr::Cmp(
                    Operand::Path("workspace.status".into()),
                    CmpOp::Eq,
                    Operand::Literal(json!("IDLE")),
                )),
                Box::new(Expr::Not(Box::new(Expr::Test(Operand::Path(
                    "ui.busy".into()
                ))))),
            )
        );
    }

    #[test]
    fn empty_expression_is_vacuously_true() {
        let store = store_with(json!({}));
        assert!(eval_expr("", &Ctx::new(), &store));
        assert!(eval_expr("   ", &Ctx::new(), &store));
    }

    #[test]
    fn malformed_expression_reads_false() {
        let store = store_with(json!({"a": 1}));
        assert!(!eval_expr("a == ", &Ctx::new(), &store));
        assert!(!eval_expr("a ===== b", &Ctx::new(), &store));
    }

    #[test]
    fn resolves_paths_through_the_store() {
        let store = store_with(json!({"workspace": {"status": "IDLE", "score": 87}}));
        let ctx = Ctx::new();

        assert!(eval_expr("workspace.status == 'IDLE'", &ctx, &store));
        assert!(eval_expr("workspace.score >= 50", &ctx, &store));
        assert!(!eval_expr("workspace.score < 50", &ctx, &store));
    }

    #[test]
    fn length_accessor_inside_guards() {
        let store = store_with(json!({"workspace": {"artifacts": []}}));
        let ctx = Ctx::new();

        assert!(eval_expr("workspace.artifacts.length == 0", &ctx, &store));
        store.push_str("workspace.artifacts", json!({"id": "a1"}));
        assert!(!eval_expr("workspace.artifacts.length == 0", &ctx, &store));
    }

    #[test]
    fn truthiness_of_bare_paths() {
        let store = store_with(json!({
            "flags": {"on": true, "off": false, "zero": 0, "empty": "", "name": "x"}
        }));
        let ctx = Ctx::new();

        assert!(eval_expr("flags.on", &ctx, &store));
        assert!(!eval_expr("flags.off", &ctx, &store));
        assert!(!eval_expr("flags.zero", &ctx, &store));
        assert!(!eval_expr("flags.empty", &ctx, &store));
        assert!(eval_expr("flags.name", &ctx, &store));
        assert!(!eval_expr("flags.missing", &ctx, &store));
    }

    #[test]
    fn missing_paths_equal_null() {
        let store = store_with(json!({}));
        let ctx = Ctx::new();

        assert!(eval_expr("nothing.here == null", &ctx, &store));
        assert!(eval_expr("nothing.here != 'x'", &ctx, &store));
    }

    #[test]
    fn parentheses_and_precedence() {
        let store = store_with(json!({"a": true, "b": false, "c": true}));
        let ctx = Ctx::new();

        // && binds tighter than ||
        assert!(eval_expr("b && c || a", &ctx, &store));
        assert!(!eval_expr("b && (c || a)", &ctx, &store));
    }
}
