//! Version lineages and forks.
//!
//! The progenitor index is authoritative: every Event in a lineage carries
//! `rmap:lineageProgenitor`, and the versions of a lineage are the objects
//! those Events generated, ordered by Event end time (ties fall back to
//! write order). The backward/forward graph walk is kept only as a
//! consistency check against that index.

use crate::model::parse_datetime;
use crate::query::{PatternQuery, binding_iri, select_iris, var};
use crate::status::{self, event_agent, event_links, event_time, event_type, events_asserting, generating_event};
use crate::storage::GraphStore;
use crate::store::StoreError;
use crate::types::{EventType, Iri, ObjectKind};
use crate::vocab;
use chrono::{DateTime, Utc};
use eyre::Result;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;

/// One version in a lineage: the generating Event, the version and when it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageEntry {
    pub event: Iri,
    pub disco: Iri,
    pub end_time: DateTime<Utc>,
}

/// Outcome of comparing the graph walk against the progenitor index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageReport {
    pub disco: Iri,
    pub progenitor: Iri,
    pub forward: Vec<Iri>,
    pub walked: Vec<Iri>,
    pub consistent: bool,
}

/// The progenitor of the lineage `disco` belongs to.
pub fn find_lineage_progenitor(graph: &dyn GraphStore, disco: &Iri) -> Result<Iri> {
    let rows = PatternQuery::new()
        .pattern_in(var("e"), vocab::PROV_GENERATED, disco, var("e"))
        .pattern_in(var("e"), vocab::RDF_TYPE, vocab::RMAP_EVENT, var("e"))
        .pattern_in(var("e"), vocab::RMAP_LINEAGE_PROGENITOR, var("lineage"), var("e"))
        .execute(graph)?;
    let mut progenitors = select_iris(&rows, "lineage");

    match progenitors.len() {
        1 => Ok(progenitors.remove(0)),
        0 if !status::is_disco_id(graph, disco)? => Err(eyre::eyre!(StoreError::NotFound {
            kind: ObjectKind::Disco,
            id: disco.to_string(),
        })),
        0 => Err(eyre::eyre!(StoreError::Integrity(format!(
            "no lineage recorded for DiSCO {}",
            disco
        )))),
        _ => Err(eyre::eyre!(StoreError::Integrity(format!(
            "DiSCO {} belongs to {} lineages: {}",
            disco,
            progenitors.len(),
            progenitors.iter().map(Iri::as_str).collect::<Vec<_>>().join(", ")
        )))),
    }
}

/// Versions generated under `progenitor`, oldest first.
pub fn lineage_members(graph: &dyn GraphStore, progenitor: &Iri) -> Result<Vec<LineageEntry>> {
    let rows = PatternQuery::new()
        .pattern_in(var("e"), vocab::RMAP_LINEAGE_PROGENITOR, progenitor, var("e"))
        .pattern_in(var("e"), vocab::RDF_TYPE, vocab::RMAP_EVENT, var("e"))
        .pattern_in(var("e"), vocab::PROV_GENERATED, var("disco"), var("e"))
        .pattern_in(var("e"), vocab::PROV_ENDED_AT_TIME, var("ended"), var("e"))
        .execute(graph)?;

    let mut members = Vec::with_capacity(rows.len());
    for row in &rows {
        let (Some(event), Some(disco)) = (binding_iri(row, "e"), binding_iri(row, "disco")) else {
            continue;
        };
        let end_time = row.get("ended").and_then(parse_datetime).ok_or_else(|| {
            eyre::eyre!(StoreError::Integrity(format!("event {} has an unreadable end time", event)))
        })?;
        if !members.iter().any(|m: &LineageEntry| m.disco == disco) {
            members.push(LineageEntry { event, disco, end_time });
        }
    }
    // stable: equal end times keep write order
    members.sort_by_key(|m| m.end_time);
    Ok(members)
}

/// Every version in the lineage of `disco`, oldest first.
pub fn all_versions(graph: &dyn GraphStore, disco: &Iri) -> Result<Vec<Iri>> {
    let progenitor = find_lineage_progenitor(graph, disco)?;
    Ok(lineage_members(graph, &progenitor)?.into_iter().map(|m| m.disco).collect())
}

pub fn latest_version(graph: &dyn GraphStore, disco: &Iri) -> Result<Iri> {
    all_versions(graph, disco)?.pop().ok_or_else(|| {
        eyre::eyre!(StoreError::Integrity(format!("lineage of {} has no versions", disco)))
    })
}

pub fn previous_version(graph: &dyn GraphStore, disco: &Iri) -> Result<Option<Iri>> {
    let versions = all_versions(graph, disco)?;
    Ok(versions
        .iter()
        .position(|v| v == disco)
        .and_then(|i| i.checked_sub(1))
        .map(|i| versions[i].clone()))
}

pub fn next_version(graph: &dyn GraphStore, disco: &Iri) -> Result<Option<Iri>> {
    let versions = all_versions(graph, disco)?;
    Ok(versions
        .iter()
        .position(|v| v == disco)
        .and_then(|i| versions.get(i + 1))
        .cloned())
}

/// DiSCOs derived by other Agents from any version in the lineage of `disco`.
///
/// One level only: forks of forks are not followed.
pub fn derivatives(graph: &dyn GraphStore, disco: &Iri) -> Result<Vec<Iri>> {
    let mut out: Vec<Iri> = Vec::new();
    for version in all_versions(graph, disco)? {
        let rows = PatternQuery::new()
            .pattern_in(var("e"), vocab::RMAP_HAS_SOURCE_OBJECT, &version, var("e"))
            .pattern_in(var("e"), vocab::RDF_TYPE, vocab::RMAP_EVENT, var("e"))
            .pattern_in(var("e"), vocab::RMAP_DERIVED_OBJECT, var("derived"), var("e"))
            .execute(graph)?;
        for derived in select_iris(&rows, "derived") {
            if !out.contains(&derived) {
                out.push(derived);
            }
        }
    }
    Ok(out)
}

/// The lineage of `disco` followed by the lineage of each of its derivatives.
pub fn versions_and_derivatives(graph: &dyn GraphStore, disco: &Iri) -> Result<Vec<Iri>> {
    let mut out = all_versions(graph, disco)?;
    for derived in derivatives(graph, disco)? {
        for version in all_versions(graph, &derived)? {
            if !out.contains(&version) {
                out.push(version);
            }
        }
    }
    Ok(out)
}

/// Walk generating Events backward and inactivating Events forward from `disco`.
///
/// With `match_agent`, only Events associated with the Agent that asserted
/// `disco` are followed, which isolates that Agent's own chain from forks.
pub fn walk_versions(graph: &dyn GraphStore, disco: &Iri, match_agent: bool) -> Result<Vec<LineageEntry>> {
    let agent = if match_agent {
        Some(status::asserting_agent(graph, disco)?)
    } else {
        None
    };
    let agent_matches = |event: &Iri| -> Result<bool> {
        match &agent {
            Some(expected) => Ok(event_agent(graph, event)?.as_ref() == Some(expected)),
            None => Ok(true),
        }
    };

    let mut found: Vec<(Iri, Iri)> = Vec::new();
    let mut record = |event: &Iri, version: &Iri| {
        if !found.iter().any(|(e, v)| e == event && v == version) {
            found.push((event.clone(), version.clone()));
        }
    };

    let mut back = vec![disco.clone()];
    let mut forward = vec![disco.clone()];
    let mut seen_back = HashSet::new();
    let mut seen_forward = HashSet::new();

    while let Some(current) = back.pop() {
        if !seen_back.insert(current.clone()) {
            continue;
        }
        let Some(event) = generating_event(graph, &current)? else {
            continue;
        };
        if !agent_matches(&event)? {
            continue;
        }
        record(&event, &current);

        if matches!(event_type(graph, &event)?, Some(EventType::Update | EventType::Derivation)) {
            let mut older = event_links(graph, &event, vocab::RMAP_INACTIVATED_OBJECT)?;
            if older.is_empty() {
                older = event_links(graph, &event, vocab::RMAP_HAS_SOURCE_OBJECT)?;
            }
            for old in older {
                back.push(old.clone());
                forward.push(old);
            }
        }
    }

    while let Some(current) = forward.pop() {
        if !seen_forward.insert(current.clone()) {
            continue;
        }
        for event in events_asserting(graph, vocab::RMAP_INACTIVATED_OBJECT, &current)? {
            if !agent_matches(&event)? {
                continue;
            }
            for created in event_links(graph, &event, vocab::PROV_GENERATED)? {
                record(&event, &created);
                forward.push(created);
            }
        }
    }

    let mut entries = Vec::with_capacity(found.len());
    for (event, version) in found {
        let end_time = event_time(graph, &event, vocab::PROV_ENDED_AT_TIME)?.ok_or_else(|| {
            eyre::eyre!(StoreError::Integrity(format!("event {} has no end time", event)))
        })?;
        entries.push(LineageEntry {
            event,
            disco: version,
            end_time,
        });
    }
    entries.sort_by_key(|e| e.end_time);
    debug!("Walked {} version(s) from {}", entries.len(), disco);
    Ok(entries)
}

/// Compare the agent-matched walk with the progenitor index for `disco`.
pub fn check_lineage(graph: &dyn GraphStore, disco: &Iri) -> Result<LineageReport> {
    let progenitor = find_lineage_progenitor(graph, disco)?;
    let forward: Vec<Iri> = lineage_members(graph, &progenitor)?.into_iter().map(|m| m.disco).collect();
    let walked: Vec<Iri> = walk_versions(graph, disco, true)?.into_iter().map(|e| e.disco).collect();
    let consistent = forward == walked;
    if !consistent {
        warn!(
            "Lineage of {} diverges: index has {:?}, walk found {:?}",
            disco, forward, walked
        );
    }
    Ok(LineageReport {
        disco: disco.clone(),
        progenitor,
        forward,
        walked,
        consistent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Event, EventDetail};
    use crate::storage::SqliteGraphStore;
    use crate::types::TargetType;
    use chrono::Duration;

    fn iri(s: &str) -> Iri {
        Iri::new(s)
    }

    /// Writes events with strictly increasing times so ordering is deterministic.
    struct LogBuilder {
        graph: SqliteGraphStore,
        clock: DateTime<Utc>,
        seq: usize,
    }

    impl LogBuilder {
        fn new() -> Self {
            Self {
                graph: SqliteGraphStore::in_memory().unwrap(),
                clock: Utc::now(),
                seq: 0,
            }
        }

        fn event(&mut self, agent: &str, progenitor: Option<&str>, detail: EventDetail) -> Iri {
            self.seq += 1;
            self.clock += Duration::milliseconds(5);
            let event = Event {
                id: iri(&format!("rmap:ev{}", self.seq)),
                target_type: TargetType::Disco,
                associated_agent: iri(agent),
                associated_key: None,
                description: None,
                start_time: self.clock,
                end_time: self.clock,
                lineage_progenitor: progenitor.map(iri),
                detail,
            };
            self.graph.add_quads(&event.to_quads()).unwrap();
            event.id
        }

        fn create(&mut self, agent: &str, disco: &str) {
            self.event(agent, Some(disco), EventDetail::Creation { created: vec![iri(disco)] });
        }

        fn update(&mut self, agent: &str, progenitor: &str, old: &str, new: &str) {
            self.event(
                agent,
                Some(progenitor),
                EventDetail::Update {
                    created: vec![iri(new)],
                    derived: iri(new),
                    inactivated: iri(old),
                },
            );
        }

        fn derive(&mut self, agent: &str, source: &str, new: &str) {
            self.event(
                agent,
                Some(new),
                EventDetail::Derivation {
                    created: vec![iri(new)],
                    derived: iri(new),
                    source: iri(source),
                },
            );
        }
    }

    #[test]
    fn test_lineage_continuity() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.update("rmap:x", "rmap:a", "rmap:a", "rmap:b");
        log.update("rmap:x", "rmap:a", "rmap:b", "rmap:c");

        let expected = vec![iri("rmap:a"), iri("rmap:b"), iri("rmap:c")];
        for d in ["rmap:a", "rmap:b", "rmap:c"] {
            assert_eq!(all_versions(&log.graph, &iri(d)).unwrap(), expected);
        }
        assert_eq!(latest_version(&log.graph, &iri("rmap:a")).unwrap(), iri("rmap:c"));
        assert_eq!(previous_version(&log.graph, &iri("rmap:b")).unwrap(), Some(iri("rmap:a")));
        assert_eq!(next_version(&log.graph, &iri("rmap:b")).unwrap(), Some(iri("rmap:c")));
        assert_eq!(previous_version(&log.graph, &iri("rmap:a")).unwrap(), None);
        assert_eq!(next_version(&log.graph, &iri("rmap:c")).unwrap(), None);
    }

    #[test]
    fn test_fork_starts_new_lineage() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.derive("rmap:y", "rmap:a", "rmap:b");

        assert_eq!(find_lineage_progenitor(&log.graph, &iri("rmap:b")).unwrap(), iri("rmap:b"));
        assert_eq!(all_versions(&log.graph, &iri("rmap:a")).unwrap(), vec![iri("rmap:a")]);
        assert_eq!(derivatives(&log.graph, &iri("rmap:a")).unwrap(), vec![iri("rmap:b")]);
        assert_eq!(
            versions_and_derivatives(&log.graph, &iri("rmap:a")).unwrap(),
            vec![iri("rmap:a"), iri("rmap:b")]
        );
    }

    #[test]
    fn test_derivatives_are_one_level_deep() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.derive("rmap:y", "rmap:a", "rmap:b");
        log.derive("rmap:z", "rmap:b", "rmap:c");

        let family = versions_and_derivatives(&log.graph, &iri("rmap:a")).unwrap();
        assert!(family.contains(&iri("rmap:b")));
        assert!(!family.contains(&iri("rmap:c")));
    }

    #[test]
    fn test_two_lineages_is_integrity_error() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.event("rmap:x", Some("rmap:other"), EventDetail::Creation { created: vec![iri("rmap:a")] });

        let err = find_lineage_progenitor(&log.graph, &iri("rmap:a")).unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Integrity(_))));
    }

    #[test]
    fn test_unknown_disco_has_no_lineage() {
        let log = LogBuilder::new();
        let err = all_versions(&log.graph, &iri("rmap:nope")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { kind: ObjectKind::Disco, .. })
        ));
    }

    #[test]
    fn test_walk_agrees_with_index() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.update("rmap:x", "rmap:a", "rmap:a", "rmap:b");
        log.derive("rmap:y", "rmap:b", "rmap:f");
        log.update("rmap:x", "rmap:a", "rmap:b", "rmap:c");

        for d in ["rmap:a", "rmap:b", "rmap:c", "rmap:f"] {
            let report = check_lineage(&log.graph, &iri(d)).unwrap();
            assert!(report.consistent, "diverged for {}: {:?}", d, report);
        }
        assert_eq!(
            check_lineage(&log.graph, &iri("rmap:b")).unwrap().walked,
            vec![iri("rmap:a"), iri("rmap:b"), iri("rmap:c")]
        );
    }

    #[test]
    fn test_walk_without_agent_match_crosses_forks() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.derive("rmap:y", "rmap:a", "rmap:b");

        let walked: Vec<Iri> = walk_versions(&log.graph, &iri("rmap:b"), false)
            .unwrap()
            .into_iter()
            .map(|e| e.disco)
            .collect();
        assert_eq!(walked, vec![iri("rmap:a"), iri("rmap:b")]);
    }

    #[test]
    fn test_divergence_is_reported() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        // an update that records the wrong progenitor
        log.update("rmap:x", "rmap:elsewhere", "rmap:a", "rmap:b");

        let report = check_lineage(&log.graph, &iri("rmap:a")).unwrap();
        assert!(!report.consistent);
        assert_eq!(report.forward, vec![iri("rmap:a")]);
        assert_eq!(report.walked, vec![iri("rmap:a"), iri("rmap:b")]);
    }

    #[test]
    fn test_inactivation_does_not_add_a_version() {
        let mut log = LogBuilder::new();
        log.create("rmap:x", "rmap:a");
        log.event("rmap:x", Some("rmap:a"), EventDetail::Inactivation { inactivated: iri("rmap:a") });
        assert_eq!(all_versions(&log.graph, &iri("rmap:a")).unwrap(), vec![iri("rmap:a")]);
        assert!(check_lineage(&log.graph, &iri("rmap:a")).unwrap().consistent);
    }
}
