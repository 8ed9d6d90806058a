//! Core value types: identifiers, graph terms, triples and lifecycle enums.

use crate::vocab;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, globally unique URI-shaped identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Iri {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Iri {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Iri> for Iri {
    fn from(value: &Iri) -> Self {
        value.clone()
    }
}

impl AsRef<str> for Iri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A literal value with optional datatype or language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A graph term: an identifier, a literal, or a locally scoped blank node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Iri(Iri),
    Literal(Literal),
    BlankNode(String),
}

impl Value {
    pub fn iri(value: impl Into<String>) -> Self {
        Value::Iri(Iri::new(value))
    }

    /// Plain literal without datatype or language.
    pub fn literal(lexical: impl Into<String>) -> Self {
        Value::Literal(Literal {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        })
    }

    pub fn typed_literal(lexical: impl Into<String>, datatype: impl Into<Iri>) -> Self {
        Value::Literal(Literal {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
            language: None,
        })
    }

    pub fn lang_literal(lexical: impl Into<String>, language: impl Into<String>) -> Self {
        Value::Literal(Literal {
            lexical: lexical.into(),
            datatype: None,
            language: Some(language.into()),
        })
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Value::BlankNode(label.into())
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Value::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::BlankNode(_))
    }

    /// Lexical form for literals, the identifier text otherwise.
    pub fn lexical(&self) -> &str {
        match self {
            Value::Iri(iri) => iri.as_str(),
            Value::Literal(lit) => &lit.lexical,
            Value::BlankNode(label) => label,
        }
    }

    /// Encode as canonical term text: `<iri>`, `_:label`, `"lex"`, `"lex"^^<dt>` or `"lex"@lang`.
    pub fn to_term(&self) -> String {
        match self {
            Value::Iri(iri) => format!("<{}>", iri),
            Value::BlankNode(label) => format!("_:{}", label),
            Value::Literal(lit) => {
                let mut out = String::with_capacity(lit.lexical.len() + 2);
                out.push('"');
                escape_into(&lit.lexical, &mut out);
                out.push('"');
                if let Some(dt) = &lit.datatype {
                    out.push_str("^^<");
                    out.push_str(dt.as_str());
                    out.push('>');
                } else if let Some(lang) = &lit.language {
                    out.push('@');
                    out.push_str(lang);
                }
                out
            }
        }
    }

    /// Parse canonical term text produced by [`Value::to_term`].
    pub fn parse_term(text: &str) -> Result<Value> {
        if let Some(rest) = text.strip_prefix("_:") {
            if rest.is_empty() {
                eyre::bail!("empty blank node label");
            }
            return Ok(Value::blank(rest));
        }
        if text.starts_with('<') {
            let inner = text
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .ok_or_else(|| eyre::eyre!("unterminated IRI term: {}", text))?;
            return Ok(Value::iri(inner));
        }
        if !text.starts_with('"') {
            eyre::bail!("unrecognized term: {}", text);
        }

        let mut lexical = String::new();
        let mut chars = text.char_indices().skip(1);
        let mut closed_at = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, 'n')) => lexical.push('\n'),
                    Some((_, 'r')) => lexical.push('\r'),
                    Some((_, '"')) => lexical.push('"'),
                    Some((_, '\\')) => lexical.push('\\'),
                    _ => eyre::bail!("invalid escape in literal: {}", text),
                },
                '"' => {
                    closed_at = Some(i);
                    break;
                }
                other => lexical.push(other),
            }
        }
        let end = closed_at.ok_or_else(|| eyre::eyre!("unterminated literal: {}", text))?;
        let suffix = &text[end + 1..];

        if suffix.is_empty() {
            Ok(Value::literal(lexical))
        } else if let Some(dt) = suffix.strip_prefix("^^<").and_then(|s| s.strip_suffix('>')) {
            Ok(Value::typed_literal(lexical, dt))
        } else if let Some(lang) = suffix.strip_prefix('@') {
            Ok(Value::lang_literal(lexical, lang))
        } else {
            eyre::bail!("invalid literal suffix: {}", text)
        }
    }
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_term())
    }
}

impl From<Iri> for Value {
    fn from(value: Iri) -> Self {
        Value::Iri(value)
    }
}

impl From<&Iri> for Value {
    fn from(value: &Iri) -> Self {
        Value::Iri(value.clone())
    }
}

/// A subject/predicate/object statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Value,
    pub predicate: Iri,
    pub object: Value,
}

impl Triple {
    pub fn new(subject: impl Into<Value>, predicate: impl Into<Iri>, object: impl Into<Value>) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Place this statement in a named graph.
    pub fn in_context(self, context: &Iri) -> Quad {
        Quad {
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
            context: context.clone(),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {}", self.subject, self.predicate, self.object)
    }
}

/// A statement inside a named graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Value,
    pub predicate: Iri,
    pub object: Value,
    pub context: Iri,
}

impl Quad {
    pub fn new(
        subject: impl Into<Value>,
        predicate: impl Into<Iri>,
        object: impl Into<Value>,
        context: impl Into<Iri>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            context: context.into(),
        }
    }

    pub fn triple(&self) -> Triple {
        Triple {
            subject: self.subject.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
        }
    }
}

/// Derived lifecycle status of a DiSCO or Agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Inactive,
    Tombstoned,
    Deleted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::Tombstoned => "tombstoned",
            Status::Deleted => "deleted",
        }
    }

    /// Parse a status name as accepted on the command line.
    pub fn parse(value: &str) -> Option<Status> {
        match value.to_ascii_lowercase().as_str() {
            "active" => Some(Status::Active),
            "inactive" => Some(Status::Inactive),
            "tombstoned" => Some(Status::Tombstoned),
            "deleted" => Some(Status::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of state change an Event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Creation,
    Update,
    Derivation,
    Inactivation,
    Tombstone,
    Deletion,
    Replace,
}

impl EventType {
    pub fn iri(&self) -> &'static str {
        match self {
            EventType::Creation => vocab::RMAP_CREATION,
            EventType::Update => vocab::RMAP_UPDATE,
            EventType::Derivation => vocab::RMAP_DERIVATION,
            EventType::Inactivation => vocab::RMAP_INACTIVATION,
            EventType::Tombstone => vocab::RMAP_TOMBSTONE,
            EventType::Deletion => vocab::RMAP_DELETION,
            EventType::Replace => vocab::RMAP_REPLACE,
        }
    }

    pub fn from_iri(iri: &str) -> Option<EventType> {
        match iri {
            vocab::RMAP_CREATION => Some(EventType::Creation),
            vocab::RMAP_UPDATE => Some(EventType::Update),
            vocab::RMAP_DERIVATION => Some(EventType::Derivation),
            vocab::RMAP_INACTIVATION => Some(EventType::Inactivation),
            vocab::RMAP_TOMBSTONE => Some(EventType::Tombstone),
            vocab::RMAP_DELETION => Some(EventType::Deletion),
            vocab::RMAP_REPLACE => Some(EventType::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Creation => "creation",
            EventType::Update => "update",
            EventType::Derivation => "derivation",
            EventType::Inactivation => "inactivation",
            EventType::Tombstone => "tombstone",
            EventType::Deletion => "deletion",
            EventType::Replace => "replace",
        };
        f.write_str(name)
    }
}

/// The kind of object an Event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Disco,
    Agent,
}

impl TargetType {
    pub fn iri(&self) -> &'static str {
        match self {
            TargetType::Disco => vocab::RMAP_DISCO,
            TargetType::Agent => vocab::RMAP_AGENT,
        }
    }

    pub fn from_iri(iri: &str) -> Option<TargetType> {
        match iri {
            vocab::RMAP_DISCO => Some(TargetType::Disco),
            vocab::RMAP_AGENT => Some(TargetType::Agent),
            _ => None,
        }
    }
}

/// Object kinds named in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Agent,
    Disco,
    Event,
    Object,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Agent => "agent",
            ObjectKind::Disco => "DiSCO",
            ObjectKind::Event => "event",
            ObjectKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Who is making a write call, with the key and note recorded on the resulting Event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAgent {
    pub agent: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RequestAgent {
    pub fn new(agent: impl Into<Iri>) -> Self {
        Self {
            agent: agent.into(),
            key: None,
            description: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Iri>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
