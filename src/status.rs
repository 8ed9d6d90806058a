//! Status derivation and relationship lookups over the event log.
//!
//! Nothing here reads a stored status. Every answer comes from scanning the
//! Events that point at an id, and a relationship only counts when it is
//! asserted inside the Event's own named graph.

use crate::model::parse_datetime;
use crate::query::{PatternQuery, select_iris, var};
use crate::storage::GraphStore;
use crate::store::StoreError;
use crate::types::{EventType, Iri, ObjectKind, Status, Value};
use crate::vocab;
use chrono::{DateTime, Utc};
use eyre::Result;

/// Events asserting `predicate` toward `target`, in write order.
pub fn events_asserting(graph: &dyn GraphStore, predicate: &str, target: &Iri) -> Result<Vec<Iri>> {
    let rows = PatternQuery::new()
        .pattern_in(var("e"), predicate, target, var("e"))
        .pattern_in(var("e"), vocab::RDF_TYPE, vocab::RMAP_EVENT, var("e"))
        .execute(graph)?;
    Ok(select_iris(&rows, "e"))
}

/// Events asserting any of `predicates` toward `target`, without duplicates.
pub fn events_asserting_any(graph: &dyn GraphStore, predicates: &[&str], target: &Iri) -> Result<Vec<Iri>> {
    let mut out: Vec<Iri> = Vec::new();
    for predicate in predicates {
        for event in events_asserting(graph, predicate, target)? {
            if !out.contains(&event) {
                out.push(event);
            }
        }
    }
    Ok(out)
}

fn any_event_asserts(graph: &dyn GraphStore, predicate: &str, target: &Iri) -> Result<bool> {
    Ok(!events_asserting(graph, predicate, target)?.is_empty())
}

/// Whether `id` is typed `class` inside its own named graph.
pub fn is_rmap_type(graph: &dyn GraphStore, id: &Iri, class: &str) -> Result<bool> {
    graph.contains(
        Some(&Value::Iri(id.clone())),
        Some(&Iri::new(vocab::RDF_TYPE)),
        Some(&Value::iri(class)),
        Some(id),
    )
}

pub fn is_event_id(graph: &dyn GraphStore, id: &Iri) -> Result<bool> {
    is_rmap_type(graph, id, vocab::RMAP_EVENT)
}

pub fn is_agent_id(graph: &dyn GraphStore, id: &Iri) -> Result<bool> {
    is_rmap_type(graph, id, vocab::RMAP_AGENT)
}

/// Whether `id` is a DiSCO, including one whose graph was removed by a Deletion.
pub fn is_disco_id(graph: &dyn GraphStore, id: &Iri) -> Result<bool> {
    if is_rmap_type(graph, id, vocab::RMAP_DISCO)? {
        return Ok(true);
    }
    any_event_asserts(graph, vocab::RMAP_DELETED_OBJECT, id)
}

/// Whether any named graph already uses `id`, or it names a deleted DiSCO.
pub fn id_in_use(graph: &dyn GraphStore, id: &Iri) -> Result<bool> {
    if graph.contains(None, None, None, Some(id))? {
        return Ok(true);
    }
    is_disco_id(graph, id)
}

/// Lifecycle status of any object, by strict precedence of the Events that reference it.
pub fn object_status(graph: &dyn GraphStore, id: &Iri) -> Result<Status> {
    if any_event_asserts(graph, vocab::RMAP_DELETED_OBJECT, id)? {
        return Ok(Status::Deleted);
    }
    if any_event_asserts(graph, vocab::RMAP_TOMBSTONED_OBJECT, id)? {
        return Ok(Status::Tombstoned);
    }
    if any_event_asserts(graph, vocab::RMAP_INACTIVATED_OBJECT, id)? {
        return Ok(Status::Inactive);
    }
    if any_event_asserts(graph, vocab::PROV_GENERATED, id)? {
        return Ok(Status::Active);
    }
    Err(eyre::eyre!(StoreError::NotFound {
        kind: ObjectKind::Object,
        id: id.to_string(),
    }))
}

pub fn disco_status(graph: &dyn GraphStore, id: &Iri) -> Result<Status> {
    if !is_disco_id(graph, id)? {
        return Err(eyre::eyre!(StoreError::NotFound {
            kind: ObjectKind::Disco,
            id: id.to_string(),
        }));
    }
    object_status(graph, id)
}

pub fn agent_status(graph: &dyn GraphStore, id: &Iri) -> Result<Status> {
    if !is_agent_id(graph, id)? {
        return Err(eyre::eyre!(StoreError::NotFound {
            kind: ObjectKind::Agent,
            id: id.to_string(),
        }));
    }
    object_status(graph, id)
}

/// The Event that generated `id` (its Creation, Update or Derivation).
pub fn generating_event(graph: &dyn GraphStore, id: &Iri) -> Result<Option<Iri>> {
    Ok(events_asserting(graph, vocab::PROV_GENERATED, id)?.into_iter().next())
}

/// The Agent associated with an Event.
pub fn event_agent(graph: &dyn GraphStore, event: &Iri) -> Result<Option<Iri>> {
    Ok(event_links(graph, event, vocab::PROV_WAS_ASSOCIATED_WITH)?.into_iter().next())
}

/// Objects an Event links to through `predicate`, from its own graph.
pub fn event_links(graph: &dyn GraphStore, event: &Iri, predicate: &str) -> Result<Vec<Iri>> {
    let quads = graph.get_quads(
        Some(&Value::Iri(event.clone())),
        Some(&Iri::new(predicate)),
        None,
        Some(event),
    )?;
    Ok(quads.into_iter().filter_map(|q| q.object.as_iri().cloned()).collect())
}

/// A timestamp-valued property of an Event (`prov:startedAtTime` or `prov:endedAtTime`).
pub fn event_time(graph: &dyn GraphStore, event: &Iri, predicate: &str) -> Result<Option<DateTime<Utc>>> {
    let quads = graph.get_quads(
        Some(&Value::Iri(event.clone())),
        Some(&Iri::new(predicate)),
        None,
        Some(event),
    )?;
    Ok(quads.iter().find_map(|q| parse_datetime(&q.object)))
}

pub fn event_type(graph: &dyn GraphStore, event: &Iri) -> Result<Option<EventType>> {
    Ok(event_links(graph, event, vocab::RMAP_EVENT_TYPE)?
        .iter()
        .find_map(|t| EventType::from_iri(t.as_str())))
}

/// The Agent that asserted `id`: the one associated with its generating Event.
pub fn asserting_agent(graph: &dyn GraphStore, id: &Iri) -> Result<Iri> {
    let not_found = || {
        eyre::eyre!(StoreError::NotFound {
            kind: ObjectKind::Object,
            id: id.to_string(),
        })
    };
    let event = generating_event(graph, id)?.ok_or_else(not_found)?;
    event_agent(graph, &event)?.ok_or_else(not_found)
}
