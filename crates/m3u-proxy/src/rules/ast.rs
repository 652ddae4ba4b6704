//! Abstract syntax tree for the rule-engine expression grammar (spec §4.3).

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A canonical or alias field name, already present in the domain's
    /// registry (resolved to canonical form at parse time).
    Named(String),
    /// `@dynamic(source):identifier`, e.g. `@dynamic(request.headers):user-agent`.
    Dynamic { source: String, identifier: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
}

impl Literal {
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Literal::Str(s) => std::borrow::Cow::Borrowed(s),
            Literal::Number(n) => std::borrow::Cow::Owned(n.to_string()),
        }
    }
}

/// A `field op literal [SET field = literal]` atom.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: Field,
    pub op: CompareOp,
    pub literal: Literal,
    /// Present when this atom is a map action rather than a bare predicate.
    pub action: Option<SetAction>,
}

#[derive(Debug, Clone)]
pub struct SetAction {
    pub target_field: String,
    /// The literal assigned on match. May reference regex capture groups
    /// (`$1`) from a preceding `matches` predicate, or carry the
    /// `@logo:<id>` deferred-resolution marker verbatim.
    pub value: String,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Predicate(Predicate),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}
