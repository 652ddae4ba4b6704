//! Rule engine (spec §4.3, component C3): parses and evaluates the
//! expression language used by `DataMappingRule`, `Filter`, and
//! `ClientDetectionRule`.

pub mod ast;
pub mod evaluator;
pub mod field_registry;
pub mod parser;
pub mod records;

pub use ast::Expr;
pub use evaluator::{evaluate, evaluate_predicate_only, DynamicContext, EvalOutcome, NoDynamicContext, Record};
pub use field_registry::FieldRegistry;
pub use parser::{parse, ParseError};
pub use records::EmptyRecord;

use crate::errors::AppError;
use crate::models::RuleDomain;

/// Parse-and-reject-at-create-time wrapper (spec §4.3: "A rule that fails
/// to parse at create time is rejected").
pub fn validate(domain: RuleDomain, expression: &str) -> Result<Expr, AppError> {
    parse(domain, expression).map_err(|e| AppError::input(e.to_string()))
}
