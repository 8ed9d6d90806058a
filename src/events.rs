//! Event writes and Event-centred reads.

use crate::model::Event;
use crate::publish::Publisher;
use crate::query::{PatternQuery, select_iris, var};
use crate::search::SearchParams;
use crate::status;
use crate::storage::{GraphStore, TxnScope, with_transaction};
use crate::store::StoreError;
use crate::types::{EventType, Iri, ObjectKind, TargetType, Value};
use crate::vocab;
use chrono::{DateTime, Utc};
use eyre::Result;
use log::debug;

/// Writes Events inside transactions and answers questions about them.
#[derive(Clone, Copy)]
pub struct EventManager<'a> {
    graph: &'a dyn GraphStore,
    publisher: Option<&'a Publisher>,
}

impl<'a> EventManager<'a> {
    pub fn new(graph: &'a dyn GraphStore, publisher: Option<&'a Publisher>) -> Self {
        Self { graph, publisher }
    }

    pub fn graph(&self) -> &'a dyn GraphStore {
        self.graph
    }

    /// Run a mutation in a transaction, joining one that is already open.
    ///
    /// Events created inside are published once the outermost transaction
    /// commits, and dropped if it rolls back.
    pub fn in_transaction<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        let owner = !self.graph.has_open_transaction();
        match with_transaction(self.graph, body) {
            Ok((value, TxnScope::Owned)) => {
                if let Some(publisher) = self.publisher {
                    publisher.flush();
                }
                Ok(value)
            }
            Ok((value, TxnScope::Joined)) => Ok(value),
            Err(e) => {
                // Discard even when the rollback itself failed.
                if owner && let Some(publisher) = self.publisher {
                    publisher.discard();
                }
                Err(e)
            }
        }
    }

    /// Write an Event's triples and queue it for publication after commit.
    pub fn create_event(&self, event: &Event) -> Result<()> {
        if event.end_time < event.start_time {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(format!(
                "event {} ends before it starts",
                event.id
            ))));
        }
        self.in_transaction(|| {
            self.graph.add_quads(&event.to_quads())?;
            if let Some(publisher) = self.publisher {
                publisher.stage(event.clone());
            }
            Ok(())
        })?;
        debug!("Wrote {} event {}", event.event_type(), event.id);
        Ok(())
    }

    fn require_event(&self, id: &Iri) -> Result<()> {
        if !status::is_event_id(self.graph, id)? {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Event,
                id: id.to_string(),
            }));
        }
        Ok(())
    }

    pub fn read_event(&self, id: &Iri) -> Result<Event> {
        self.require_event(id)?;
        let quads = self.graph.named_graph(id)?;
        Event::from_graph(id, &quads)
    }

    pub fn is_event_id(&self, id: &Iri) -> Result<bool> {
        status::is_event_id(self.graph, id)
    }

    pub fn event_type(&self, id: &Iri) -> Result<EventType> {
        self.require_event(id)?;
        status::event_type(self.graph, id)?
            .ok_or_else(|| eyre::eyre!(StoreError::Integrity(format!("event {} has no type", id))))
    }

    pub fn event_target_type(&self, id: &Iri) -> Result<TargetType> {
        self.require_event(id)?;
        status::event_links(self.graph, id, vocab::RMAP_EVENT_TARGET_TYPE)?
            .iter()
            .find_map(|t| TargetType::from_iri(t.as_str()))
            .ok_or_else(|| eyre::eyre!(StoreError::Integrity(format!("event {} has no target type", id))))
    }

    pub fn start_time(&self, id: &Iri) -> Result<DateTime<Utc>> {
        self.time(id, vocab::PROV_STARTED_AT_TIME)
    }

    pub fn end_time(&self, id: &Iri) -> Result<DateTime<Utc>> {
        self.time(id, vocab::PROV_ENDED_AT_TIME)
    }

    fn time(&self, id: &Iri, predicate: &str) -> Result<DateTime<Utc>> {
        self.require_event(id)?;
        status::event_time(self.graph, id, predicate)?
            .ok_or_else(|| eyre::eyre!(StoreError::Integrity(format!("event {} has no {}", id, predicate))))
    }

    pub fn associated_agent(&self, id: &Iri) -> Result<Iri> {
        self.require_event(id)?;
        status::event_agent(self.graph, id)?
            .ok_or_else(|| eyre::eyre!(StoreError::Integrity(format!("event {} has no agent", id))))
    }

    /// `(end time, event)` pairs, oldest first.
    pub fn events_by_date(&self, ids: &[Iri]) -> Result<Vec<(DateTime<Utc>, Iri)>> {
        let mut dated = Vec::with_capacity(ids.len());
        for id in ids {
            dated.push((self.end_time(id)?, id.clone()));
        }
        dated.sort_by_key(|(ts, _)| *ts);
        Ok(dated)
    }

    /// The most recently completed Event among `ids`.
    pub fn latest_event(&self, ids: &[Iri]) -> Result<Option<Iri>> {
        Ok(self.events_by_date(ids)?.pop().map(|(_, id)| id))
    }

    /// DiSCOs a DiSCO-targeted Event references; empty for Agent Events.
    pub fn affected_discos(&self, id: &Iri) -> Result<Vec<Iri>> {
        let event = self.read_event(id)?;
        if event.target_type != TargetType::Disco {
            return Ok(Vec::new());
        }
        Ok(event.affected_objects().into_iter().cloned().collect())
    }

    /// Agents created or replaced by an Agent-targeted Event.
    pub fn affected_agents(&self, id: &Iri) -> Result<Vec<Iri>> {
        let event = self.read_event(id)?;
        if event.target_type != TargetType::Agent {
            return Ok(Vec::new());
        }
        Ok(event.affected_objects().into_iter().cloned().collect())
    }

    /// Resources aggregated by the DiSCOs an Event created.
    pub fn affected_resources(&self, id: &Iri) -> Result<Vec<Iri>> {
        let event = self.read_event(id)?;
        if event.target_type != TargetType::Disco {
            return Ok(Vec::new());
        }
        let mut out: Vec<Iri> = Vec::new();
        for disco in event.created_objects() {
            let quads = self.graph.get_quads(
                Some(&Value::Iri(disco.clone())),
                Some(&Iri::new(vocab::ORE_AGGREGATES)),
                None,
                Some(disco),
            )?;
            for resource in quads.iter().filter_map(|q| q.object.as_iri()) {
                if !out.contains(resource) {
                    out.push(resource.clone());
                }
            }
        }
        Ok(out)
    }

    fn in_date_order(&self, ids: Vec<Iri>) -> Result<Vec<Iri>> {
        Ok(self.events_by_date(&ids)?.into_iter().map(|(_, id)| id).collect())
    }

    /// Events that reference a DiSCO through any relationship predicate, oldest first.
    pub fn disco_related_events(&self, disco: &Iri) -> Result<Vec<Iri>> {
        self.in_date_order(status::events_asserting_any(self.graph, &vocab::DISCO_EVENT_PREDICATES, disco)?)
    }

    /// Events that reference an Agent through any relationship predicate, oldest first.
    pub fn agent_related_events(&self, agent: &Iri) -> Result<Vec<Iri>> {
        self.in_date_order(status::events_asserting_any(self.graph, &vocab::AGENT_EVENT_PREDICATES, agent)?)
    }

    /// Events an Agent initiated, optionally limited to an end-time window.
    pub fn events_initiated_by(&self, agent: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        let rows = PatternQuery::new()
            .pattern_in(var("e"), vocab::PROV_WAS_ASSOCIATED_WITH, agent, var("e"))
            .pattern_in(var("e"), vocab::RDF_TYPE, vocab::RMAP_EVENT, var("e"))
            .execute(self.graph)?;
        let mut events = select_iris(&rows, "e");
        if params.has_date_window() {
            let mut kept = Vec::with_capacity(events.len());
            for event in events {
                if status::event_time(self.graph, &event, vocab::PROV_ENDED_AT_TIME)?.is_some_and(|ts| params.in_window(ts)) {
                    kept.push(event);
                }
            }
            events = kept;
        }
        Ok(params.page(events))
    }
}
