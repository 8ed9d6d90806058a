//! Basic graph-pattern queries evaluated against a [`GraphStore`].
//!
//! A query is an ordered list of quad patterns whose positions are either
//! fixed values, named variables, or wildcards. Patterns are joined left to
//! right, so put the most selective one first.

use crate::storage::GraphStore;
use crate::types::{Iri, Value};
use eyre::Result;
use log::debug;
use std::collections::HashMap;

/// One result row: variable name to bound value.
pub type Bindings = HashMap<String, Value>;

/// A position in a quad pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(String),
    Bound(Value),
    Any,
}

/// Shorthand for a named variable.
pub fn var(name: &str) -> Term {
    Term::Var(name.to_string())
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term::Bound(value)
    }
}

impl From<&Iri> for Term {
    fn from(value: &Iri) -> Self {
        Term::Bound(Value::Iri(value.clone()))
    }
}

impl From<&str> for Term {
    /// A bare string is an IRI constant.
    fn from(value: &str) -> Self {
        Term::Bound(Value::iri(value))
    }
}

#[derive(Debug, Clone)]
struct QuadPattern {
    subject: Term,
    predicate: Term,
    object: Term,
    graph: Term,
}

/// Builder for conjunctive quad-pattern queries.
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    patterns: Vec<QuadPattern>,
}

impl PatternQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern matched in any named graph.
    pub fn pattern(self, subject: impl Into<Term>, predicate: impl Into<Term>, object: impl Into<Term>) -> Self {
        self.pattern_in(subject, predicate, object, Term::Any)
    }

    /// Add a pattern restricted to a graph term.
    pub fn pattern_in(
        mut self,
        subject: impl Into<Term>,
        predicate: impl Into<Term>,
        object: impl Into<Term>,
        graph: impl Into<Term>,
    ) -> Self {
        self.patterns.push(QuadPattern {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph: graph.into(),
        });
        self
    }

    /// Evaluate by nested-loop join. Row order follows storage order of the first pattern.
    pub fn execute<G: GraphStore + ?Sized>(&self, graph: &G) -> Result<Vec<Bindings>> {
        let mut rows = vec![Bindings::new()];
        for pattern in &self.patterns {
            let mut next = Vec::new();
            for row in &rows {
                let subject = resolve(&pattern.subject, row);
                let object = resolve(&pattern.object, row);
                let Some(predicate) = resolve_iri(&pattern.predicate, row) else {
                    continue;
                };
                let Some(context) = resolve_iri(&pattern.graph, row) else {
                    continue;
                };

                for quad in graph.get_quads(subject.as_ref(), predicate.as_ref(), object.as_ref(), context.as_ref())? {
                    let mut extended = row.clone();
                    if bind(&pattern.subject, &quad.subject, &mut extended)
                        && bind(&pattern.predicate, &Value::Iri(quad.predicate.clone()), &mut extended)
                        && bind(&pattern.object, &quad.object, &mut extended)
                        && bind(&pattern.graph, &Value::Iri(quad.context.clone()), &mut extended)
                    {
                        next.push(extended);
                    }
                }
            }
            rows = next;
            if rows.is_empty() {
                break;
            }
        }
        debug!("Pattern query with {} pattern(s) returned {} row(s)", self.patterns.len(), rows.len());
        Ok(rows)
    }
}

fn resolve(term: &Term, row: &Bindings) -> Option<Value> {
    match term {
        Term::Bound(v) => Some(v.clone()),
        Term::Var(name) => row.get(name).cloned(),
        Term::Any => None,
    }
}

/// Resolve a predicate or graph position. The outer `None` means the row can never match.
fn resolve_iri(term: &Term, row: &Bindings) -> Option<Option<Iri>> {
    match resolve(term, row) {
        None => Some(None),
        Some(Value::Iri(iri)) => Some(Some(iri)),
        Some(_) => None,
    }
}

fn bind(term: &Term, value: &Value, row: &mut Bindings) -> bool {
    match term {
        Term::Var(name) => match row.get(name) {
            Some(existing) => existing == value,
            None => {
                row.insert(name.clone(), value.clone());
                true
            }
        },
        Term::Bound(_) | Term::Any => true,
    }
}

/// The IRI bound to `name` in a row, if any.
pub fn binding_iri(row: &Bindings, name: &str) -> Option<Iri> {
    row.get(name).and_then(Value::as_iri).cloned()
}

/// Distinct IRIs bound to `name`, in first-seen order.
pub fn select_iris(rows: &[Bindings], name: &str) -> Vec<Iri> {
    let mut out: Vec<Iri> = Vec::new();
    for iri in rows.iter().filter_map(|r| binding_iri(r, name)) {
        if !out.contains(&iri) {
            out.push(iri);
        }
    }
    out
}
