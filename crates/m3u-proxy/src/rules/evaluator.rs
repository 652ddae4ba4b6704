//! Evaluates a parsed [`Expr`] against a record (spec §4.3 "Evaluation
//! model").
//!
//! The evaluator is generic over anything implementing [`Record`], so the
//! same AST walker serves both the stream domain (`Channel`) and the EPG
//! domain (`EpgProgram`); `@dynamic(...)` fields are resolved through a
//! separate [`DynamicContext`] so request-scoped data (HTTP headers) never
//! has to be threaded through the record types themselves.

use std::borrow::Cow;

use regex::Regex;
use tracing::{debug, warn};

use super::ast::{CompareOp, Expr, Field, Literal, Predicate};

/// A record the rule engine can read fields from and write SET actions to.
pub trait Record {
    fn get(&self, canonical_field: &str) -> Option<Cow<'_, str>>;
    fn set(&mut self, canonical_field: &str, value: String);
}

/// Supplies values for `@dynamic(source):identifier` fields, e.g. HTTP
/// request headers during client-detection evaluation (spec §4.6).
pub trait DynamicContext {
    fn get_dynamic(&self, source: &str, identifier: &str) -> Option<String>;
}

/// A context with nothing to offer `@dynamic` lookups; used for rules that
/// never reference dynamic fields (the common case for data mapping).
pub struct NoDynamicContext;

impl DynamicContext for NoDynamicContext {
    fn get_dynamic(&self, _source: &str, _identifier: &str) -> Option<String> {
        None
    }
}

/// Outcome of evaluating one expression against one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// The predicate matched; if it carried a SET action, it was applied.
    Matched,
    NoMatch,
    /// Evaluation failed (e.g. bad regex) — spec §4.3: "logged, skipped,
    /// record passes through unchanged".
    Error,
}

pub fn evaluate<R: Record>(expr: &Expr, record: &mut R, ctx: &dyn DynamicContext) -> EvalOutcome {
    match eval_bool(expr, record, ctx) {
        Some(true) => {
            apply_actions(expr, record, ctx);
            EvalOutcome::Matched
        }
        Some(false) => EvalOutcome::NoMatch,
        None => EvalOutcome::Error,
    }
}

/// Evaluate only the boolean predicate, without applying any SET action.
/// Used by the Filter stage, which never mutates records (spec §4.4 step 3).
pub fn evaluate_predicate_only<R: Record>(expr: &Expr, record: &R, ctx: &dyn DynamicContext) -> bool {
    eval_bool(expr, record, ctx).unwrap_or(false)
}

fn eval_bool<R: Record>(expr: &Expr, record: &R, ctx: &dyn DynamicContext) -> Option<bool> {
    match expr {
        Expr::Predicate(p) => eval_predicate(p, record, ctx),
        Expr::Not(inner) => eval_bool(inner, record, ctx).map(|v| !v),
        Expr::And(left, right) => {
            let lhs = eval_bool(left, record, ctx)?;
            if !lhs {
                return Some(false);
            }
            eval_bool(right, record, ctx)
        }
        Expr::Or(left, right) => {
            let lhs = eval_bool(left, record, ctx)?;
            if lhs {
                return Some(true);
            }
            eval_bool(right, record, ctx)
        }
    }
}

fn eval_predicate<R: Record>(p: &Predicate, record: &R, ctx: &dyn DynamicContext) -> Option<bool> {
    let value = field_value(&p.field, record, ctx).unwrap_or_default();
    let literal = p.literal.as_str();

    let result = match p.op {
        CompareOp::Equals => value == literal,
        CompareOp::Contains => value.contains(literal.as_ref()),
        CompareOp::NotContains => !value.contains(literal.as_ref()),
        CompareOp::StartsWith => value.starts_with(literal.as_ref()),
        CompareOp::EndsWith => value.ends_with(literal.as_ref()),
        CompareOp::Matches => match Regex::new(&literal) {
            Ok(re) => re.is_match(&value),
            Err(err) => {
                warn!(pattern = %literal, error = %err, "rule regex failed to compile, skipping predicate");
                return None;
            }
        },
    };
    Some(result)
}

fn field_value<R: Record>(field: &Field, record: &R, ctx: &dyn DynamicContext) -> Option<String> {
    match field {
        Field::Named(name) => record.get(name).map(|c| c.into_owned()),
        Field::Dynamic { source, identifier } => ctx.get_dynamic(source, identifier),
    }
}

fn apply_actions<R: Record>(expr: &Expr, record: &mut R, ctx: &dyn DynamicContext) {
    if let Expr::Predicate(p) = expr {
        if let Some(action) = &p.action {
            let rendered = render_set_value(p, record, ctx, &action.value);
            debug!(target = %action.target_field, value = %rendered, "rule SET action applied");
            record.set(&action.target_field, rendered);
        }
    }
}

/// Substitutes `$1`, `$2`, ... in a SET literal with capture groups from a
/// `matches` predicate over the same field (spec §4.3: "captured groups can
/// be referenced in the SET literal"). Non-`matches` predicates and the
/// `@logo:<id>` marker pass the literal through untouched.
fn render_set_value<R: Record>(p: &Predicate, record: &R, ctx: &dyn DynamicContext, template: &str) -> String {
    if p.op != CompareOp::Matches || !template.contains('$') {
        return template.to_string();
    }
    let Some(value) = field_value(&p.field, record, ctx) else {
        return template.to_string();
    };
    let Ok(re) = Regex::new(&p.literal.as_str()) else {
        return template.to_string();
    };
    let Some(caps) = re.captures(&value) else {
        return template.to_string();
    };

    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            let mut digits = String::new();
            while let Some(d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    chars.next();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                out.push('$');
            } else if let Ok(idx) = digits.parse::<usize>() {
                out.push_str(caps.get(idx).map(|m| m.as_str()).unwrap_or(""));
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleDomain;
    use crate::rules::parser::parse;
    use std::collections::HashMap;

    struct TestRecord(HashMap<String, String>);

    impl Record for TestRecord {
        fn get(&self, field: &str) -> Option<Cow<'_, str>> {
            self.0.get(field).map(|s| Cow::Borrowed(s.as_str()))
        }

        fn set(&mut self, field: &str, value: String) {
            self.0.insert(field.to_string(), value);
        }
    }

    fn record(pairs: &[(&str, &str)]) -> TestRecord {
        TestRecord(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn equals_matches() {
        let expr = parse(RuleDomain::Stream, r#"group equals "Sports""#).unwrap();
        let mut r = record(&[("group", "Sports")]);
        assert_eq!(evaluate(&expr, &mut r, &NoDynamicContext), EvalOutcome::Matched);
    }

    #[test]
    fn set_action_rewrites_field() {
        let expr = parse(RuleDomain::Stream, r#"group equals "Sports" SET logo_url = "replaced.png""#).unwrap();
        let mut r = record(&[("group", "Sports"), ("logo_url", "old.png")]);
        evaluate(&expr, &mut r, &NoDynamicContext);
        assert_eq!(r.get("logo_url").unwrap(), "replaced.png");
    }

    #[test]
    fn capture_group_substitution() {
        let expr = parse(RuleDomain::Stream, r#"stream_url matches "^(https?://[^/]+)/.*$" SET logo_url = "$1/logo.png""#).unwrap();
        let mut r = record(&[("stream_url", "http://cdn.example.com/path/stream.ts"), ("logo_url", "")]);
        evaluate(&expr, &mut r, &NoDynamicContext);
        assert_eq!(r.get("logo_url").unwrap(), "http://cdn.example.com/logo.png");
    }

    #[test]
    fn bad_regex_skips_without_mutating() {
        let expr = parse(RuleDomain::Stream, r#"group matches "(unclosed" SET logo_url = "x""#).unwrap();
        let mut r = record(&[("group", "Sports"), ("logo_url", "old.png")]);
        assert_eq!(evaluate(&expr, &mut r, &NoDynamicContext), EvalOutcome::Error);
        assert_eq!(r.get("logo_url").unwrap(), "old.png");
    }

    #[test]
    fn dynamic_field_resolves_through_context() {
        struct HeaderCtx;
        impl DynamicContext for HeaderCtx {
            fn get_dynamic(&self, source: &str, identifier: &str) -> Option<String> {
                if source == "request.headers" && identifier == "user-agent" {
                    Some("VLC/3.0".to_string())
                } else {
                    None
                }
            }
        }
        let expr = parse(RuleDomain::Stream, r#"@dynamic(request.headers):user-agent contains "VLC""#).unwrap();
        let mut r = record(&[]);
        assert_eq!(evaluate(&expr, &mut r, &HeaderCtx), EvalOutcome::Matched);
    }
}
