//! Object model for Agents, DiSCOs and Events, with their named-graph encodings.
//!
//! Every object owns exactly one named graph whose name is the object's id.
//! Encoding and decoding are pure functions over quads; nothing here touches
//! storage.

use crate::types::{EventType, Iri, Quad, TargetType, Triple, Value};
use crate::vocab;
use chrono::{DateTime, SecondsFormat, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};

/// Encode a timestamp as an `xsd:dateTime` literal with nanosecond precision.
pub fn datetime_literal(ts: DateTime<Utc>) -> Value {
    Value::typed_literal(ts.to_rfc3339_opts(SecondsFormat::Nanos, true), vocab::XSD_DATETIME)
}

/// Parse an `xsd:dateTime` literal back into a UTC timestamp.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Literal(lit) => DateTime::parse_from_rfc3339(&lit.lexical)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn is_subject(quad: &Quad, id: &Iri) -> bool {
    quad.subject.as_iri() == Some(id)
}

fn has_type(quads: &[Quad], id: &Iri, class: &str) -> bool {
    quads.iter().any(|q| {
        is_subject(q, id) && q.predicate.as_str() == vocab::RDF_TYPE && q.object.as_iri().map(Iri::as_str) == Some(class)
    })
}

/// A registered submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Iri,
    pub name: Value,
    pub identity_provider: Iri,
    pub auth_id: Iri,
}

impl Agent {
    pub fn new(id: impl Into<Iri>, name: impl Into<String>, identity_provider: impl Into<Iri>, auth_id: impl Into<Iri>) -> Self {
        Self {
            id: id.into(),
            name: Value::literal(name),
            identity_provider: identity_provider.into(),
            auth_id: auth_id.into(),
        }
    }

    pub fn to_quads(&self) -> Vec<Quad> {
        let id = &self.id;
        vec![
            Quad::new(id, vocab::RDF_TYPE, Value::iri(vocab::RMAP_AGENT), id),
            Quad::new(id, vocab::FOAF_NAME, self.name.clone(), id),
            Quad::new(id, vocab::RMAP_IDENTITY_PROVIDER, &self.identity_provider, id),
            Quad::new(id, vocab::RMAP_USER_AUTH_ID, &self.auth_id, id),
        ]
    }

    /// Rebuild an Agent from the statements of its named graph.
    pub fn from_graph(id: &Iri, quads: &[Quad]) -> Result<Agent> {
        if !has_type(quads, id, vocab::RMAP_AGENT) {
            eyre::bail!("graph {} does not describe an agent", id);
        }
        let mut name = None;
        let mut identity_provider = None;
        let mut auth_id = None;
        for q in quads.iter().filter(|q| is_subject(q, id)) {
            match q.predicate.as_str() {
                vocab::FOAF_NAME => name = Some(q.object.clone()),
                vocab::RMAP_IDENTITY_PROVIDER => identity_provider = q.object.as_iri().cloned(),
                vocab::RMAP_USER_AUTH_ID => auth_id = q.object.as_iri().cloned(),
                _ => {}
            }
        }
        Ok(Agent {
            id: id.clone(),
            name: name.ok_or_else(|| eyre::eyre!("agent {} has no name", id))?,
            identity_provider: identity_provider.ok_or_else(|| eyre::eyre!("agent {} has no identity provider", id))?,
            auth_id: auth_id.ok_or_else(|| eyre::eyre!("agent {} has no auth id", id))?,
        })
    }
}

/// A Discrete Aggregation of Resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disco {
    pub id: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_by: Option<Iri>,
    pub aggregated_resources: Vec<Iri>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_statements: Vec<Triple>,
}

impl Disco {
    pub fn new(id: impl Into<Iri>, aggregated_resources: Vec<Iri>) -> Self {
        Self {
            id: id.into(),
            creator: None,
            description: None,
            provider_id: None,
            generated_by: None,
            aggregated_resources,
            related_statements: Vec::new(),
        }
    }

    pub fn with_creator(mut self, creator: impl Into<Iri>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Value::literal(description));
        self
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(Value::literal(provider_id));
        self
    }

    pub fn with_statement(mut self, statement: Triple) -> Self {
        self.related_statements.push(statement);
        self
    }

    pub fn to_quads(&self) -> Vec<Quad> {
        let id = &self.id;
        let mut quads = vec![Quad::new(id, vocab::RDF_TYPE, Value::iri(vocab::RMAP_DISCO), id)];
        if let Some(creator) = &self.creator {
            quads.push(Quad::new(id, vocab::DCTERMS_CREATOR, creator, id));
        }
        if let Some(description) = &self.description {
            quads.push(Quad::new(id, vocab::DC_DESCRIPTION, description.clone(), id));
        }
        if let Some(provider_id) = &self.provider_id {
            quads.push(Quad::new(id, vocab::RMAP_PROVIDER_ID, provider_id.clone(), id));
        }
        if let Some(generated_by) = &self.generated_by {
            quads.push(Quad::new(id, vocab::PROV_WAS_GENERATED_BY, generated_by, id));
        }
        for resource in &self.aggregated_resources {
            quads.push(Quad::new(id, vocab::ORE_AGGREGATES, resource, id));
        }
        for stmt in &self.related_statements {
            quads.push(stmt.clone().in_context(id));
        }
        quads
    }

    /// Rebuild a DiSCO from the statements of its named graph.
    ///
    /// Statements about the DiSCO itself with one of its field predicates
    /// become fields; everything else is a related statement.
    pub fn from_graph(id: &Iri, quads: &[Quad]) -> Result<Disco> {
        if !has_type(quads, id, vocab::RMAP_DISCO) {
            eyre::bail!("graph {} does not describe a DiSCO", id);
        }
        let mut disco = Disco::new(id.clone(), Vec::new());
        for q in quads {
            if is_subject(q, id) {
                match q.predicate.as_str() {
                    vocab::RDF_TYPE if q.object.as_iri().map(Iri::as_str) == Some(vocab::RMAP_DISCO) => continue,
                    vocab::DCTERMS_CREATOR if q.object.as_iri().is_some() => {
                        disco.creator = q.object.as_iri().cloned();
                        continue;
                    }
                    vocab::DC_DESCRIPTION => {
                        disco.description = Some(q.object.clone());
                        continue;
                    }
                    vocab::RMAP_PROVIDER_ID => {
                        disco.provider_id = Some(q.object.clone());
                        continue;
                    }
                    vocab::PROV_WAS_GENERATED_BY if q.object.as_iri().is_some() => {
                        disco.generated_by = q.object.as_iri().cloned();
                        continue;
                    }
                    vocab::ORE_AGGREGATES => {
                        if let Some(resource) = q.object.as_iri() {
                            disco.aggregated_resources.push(resource.clone());
                            continue;
                        }
                    }
                    _ => {}
                }
            }
            disco.related_statements.push(q.triple());
        }
        Ok(disco)
    }
}

/// Variant-specific payload of an Event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventDetail {
    Creation {
        created: Vec<Iri>,
    },
    /// Same-agent new version.
    Update {
        created: Vec<Iri>,
        derived: Iri,
        inactivated: Iri,
    },
    /// Cross-agent new version; starts a new lineage.
    Derivation {
        created: Vec<Iri>,
        derived: Iri,
        source: Iri,
    },
    Inactivation {
        inactivated: Iri,
    },
    Tombstone {
        tombstoned: Iri,
    },
    Deletion {
        deleted: Vec<Iri>,
        /// Statements removed by the deletion. Carried in memory and on the
        /// publication sink only; the persisted graph records the ids.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        removed_statements: Vec<Triple>,
    },
    /// Agent full replace.
    Replace {
        updated: Iri,
    },
}

/// An immutable record of one state-changing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Iri,
    pub target_type: TargetType,
    pub associated_agent: Iri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_key: Option<Iri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage_progenitor: Option<Iri>,
    pub detail: EventDetail,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match &self.detail {
            EventDetail::Creation { .. } => EventType::Creation,
            EventDetail::Update { .. } => EventType::Update,
            EventDetail::Derivation { .. } => EventType::Derivation,
            EventDetail::Inactivation { .. } => EventType::Inactivation,
            EventDetail::Tombstone { .. } => EventType::Tombstone,
            EventDetail::Deletion { .. } => EventType::Deletion,
            EventDetail::Replace { .. } => EventType::Replace,
        }
    }

    /// Objects this Event generated, empty for non-generating variants.
    pub fn created_objects(&self) -> &[Iri] {
        match &self.detail {
            EventDetail::Creation { created }
            | EventDetail::Update { created, .. }
            | EventDetail::Derivation { created, .. } => created,
            _ => &[],
        }
    }

    /// Every object the Event references through a relationship predicate.
    pub fn affected_objects(&self) -> Vec<&Iri> {
        let mut out: Vec<&Iri> = self.created_objects().iter().collect();
        match &self.detail {
            EventDetail::Creation { .. } => {}
            EventDetail::Update { derived, inactivated, .. } => {
                out.push(derived);
                out.push(inactivated);
            }
            EventDetail::Derivation { derived, source, .. } => {
                out.push(derived);
                out.push(source);
            }
            EventDetail::Inactivation { inactivated } => out.push(inactivated),
            EventDetail::Tombstone { tombstoned } => out.push(tombstoned),
            EventDetail::Deletion { deleted, .. } => out.extend(deleted.iter()),
            EventDetail::Replace { updated } => out.push(updated),
        }
        out.dedup();
        out
    }

    pub fn to_quads(&self) -> Vec<Quad> {
        let id = &self.id;
        let mut quads = vec![
            Quad::new(id, vocab::RDF_TYPE, Value::iri(vocab::RMAP_EVENT), id),
            Quad::new(id, vocab::RMAP_EVENT_TYPE, Value::iri(self.event_type().iri()), id),
            Quad::new(id, vocab::RMAP_EVENT_TARGET_TYPE, Value::iri(self.target_type.iri()), id),
            Quad::new(id, vocab::PROV_WAS_ASSOCIATED_WITH, &self.associated_agent, id),
        ];
        if let Some(key) = &self.associated_key {
            quads.push(Quad::new(id, vocab::PROV_USED, key, id));
        }
        if let Some(description) = &self.description {
            quads.push(Quad::new(id, vocab::DC_DESCRIPTION, Value::literal(description.clone()), id));
        }
        quads.push(Quad::new(id, vocab::PROV_STARTED_AT_TIME, datetime_literal(self.start_time), id));
        quads.push(Quad::new(id, vocab::PROV_ENDED_AT_TIME, datetime_literal(self.end_time), id));
        if let Some(progenitor) = &self.lineage_progenitor {
            quads.push(Quad::new(id, vocab::RMAP_LINEAGE_PROGENITOR, progenitor, id));
        }

        let mut link = |predicate: &str, target: &Iri| quads.push(Quad::new(id, predicate, target, id));
        for created in self.created_objects() {
            link(vocab::PROV_GENERATED, created);
        }
        match &self.detail {
            EventDetail::Creation { .. } => {}
            EventDetail::Update { derived, inactivated, .. } => {
                link(vocab::RMAP_DERIVED_OBJECT, derived);
                link(vocab::RMAP_INACTIVATED_OBJECT, inactivated);
            }
            EventDetail::Derivation { derived, source, .. } => {
                link(vocab::RMAP_DERIVED_OBJECT, derived);
                link(vocab::RMAP_HAS_SOURCE_OBJECT, source);
            }
            EventDetail::Inactivation { inactivated } => link(vocab::RMAP_INACTIVATED_OBJECT, inactivated),
            EventDetail::Tombstone { tombstoned } => link(vocab::RMAP_TOMBSTONED_OBJECT, tombstoned),
            EventDetail::Deletion { deleted, .. } => {
                for d in deleted {
                    link(vocab::RMAP_DELETED_OBJECT, d);
                }
            }
            EventDetail::Replace { updated } => link(vocab::RMAP_UPDATED_OBJECT, updated),
        }
        quads
    }

    /// Rebuild an Event from the statements of its named graph.
    pub fn from_graph(id: &Iri, quads: &[Quad]) -> Result<Event> {
        if !has_type(quads, id, vocab::RMAP_EVENT) {
            eyre::bail!("graph {} does not describe an event", id);
        }

        let mut event_type = None;
        let mut target_type = None;
        let mut agent = None;
        let mut key = None;
        let mut description = None;
        let mut start_time = None;
        let mut end_time = None;
        let mut progenitor = None;
        let mut generated = Vec::new();
        let mut derived = None;
        let mut inactivated = None;
        let mut source = None;
        let mut tombstoned = None;
        let mut deleted = Vec::new();
        let mut updated = None;

        for q in quads.iter().filter(|q| is_subject(q, id)) {
            let obj_iri = q.object.as_iri().cloned();
            match q.predicate.as_str() {
                vocab::RMAP_EVENT_TYPE => event_type = obj_iri.and_then(|i| EventType::from_iri(i.as_str())),
                vocab::RMAP_EVENT_TARGET_TYPE => target_type = obj_iri.and_then(|i| TargetType::from_iri(i.as_str())),
                vocab::PROV_WAS_ASSOCIATED_WITH => agent = obj_iri,
                vocab::PROV_USED => key = obj_iri,
                vocab::DC_DESCRIPTION => description = Some(q.object.lexical().to_string()),
                vocab::PROV_STARTED_AT_TIME => start_time = parse_datetime(&q.object),
                vocab::PROV_ENDED_AT_TIME => end_time = parse_datetime(&q.object),
                vocab::RMAP_LINEAGE_PROGENITOR => progenitor = obj_iri,
                vocab::PROV_GENERATED => generated.extend(obj_iri),
                vocab::RMAP_DERIVED_OBJECT => derived = obj_iri,
                vocab::RMAP_INACTIVATED_OBJECT => inactivated = obj_iri,
                vocab::RMAP_HAS_SOURCE_OBJECT => source = obj_iri,
                vocab::RMAP_TOMBSTONED_OBJECT => tombstoned = obj_iri,
                vocab::RMAP_DELETED_OBJECT => deleted.extend(obj_iri),
                vocab::RMAP_UPDATED_OBJECT => updated = obj_iri,
                _ => {}
            }
        }

        let missing = |what: &str| eyre::eyre!("event {} is missing {}", id, what);
        let event_type = event_type.ok_or_else(|| missing("its event type"))?;
        let detail = match event_type {
            EventType::Creation => EventDetail::Creation { created: generated },
            EventType::Update => EventDetail::Update {
                created: generated,
                derived: derived.ok_or_else(|| missing("the derived object"))?,
                inactivated: inactivated.ok_or_else(|| missing("the inactivated object"))?,
            },
            EventType::Derivation => EventDetail::Derivation {
                created: generated,
                derived: derived.ok_or_else(|| missing("the derived object"))?,
                source: source.ok_or_else(|| missing("the source object"))?,
            },
            EventType::Inactivation => EventDetail::Inactivation {
                inactivated: inactivated.ok_or_else(|| missing("the inactivated object"))?,
            },
            EventType::Tombstone => EventDetail::Tombstone {
                tombstoned: tombstoned.ok_or_else(|| missing("the tombstoned object"))?,
            },
            EventType::Deletion => EventDetail::Deletion {
                deleted,
                removed_statements: Vec::new(),
            },
            EventType::Replace => EventDetail::Replace {
                updated: updated.ok_or_else(|| missing("the updated object"))?,
            },
        };

        Ok(Event {
            id: id.clone(),
            target_type: target_type.ok_or_else(|| missing("its target type"))?,
            associated_agent: agent.ok_or_else(|| missing("its associated agent"))?,
            associated_key: key,
            description,
            start_time: start_time.ok_or_else(|| missing("a start time"))?,
            end_time: end_time.ok_or_else(|| missing("an end time"))?,
            lineage_progenitor: progenitor,
            detail,
        })
    }
}
