//! Integration tests for version lineages.
//!
//! Tests lineage continuity, forks, version navigation and concurrent writers.

mod common;

use common::TestEnv;
use rmap::{EventType, Iri, RequestAgent, Status, StoreError};
use std::thread;

fn iris(ids: &[&str]) -> Vec<Iri> {
    ids.iter().map(|id| Iri::new(*id)).collect()
}

// =============================================================================
// Lineage Continuity Tests
// =============================================================================

#[test]
fn test_same_agent_updates_share_one_lineage() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    env.create_disco("rmap:a", &x);
    env.update_disco("rmap:a", "rmap:b", &x);
    env.update_disco("rmap:b", "rmap:c", &x);

    for id in ["rmap:a", "rmap:b", "rmap:c"] {
        assert_eq!(env.versions(id), vec!["rmap:a", "rmap:b", "rmap:c"]);
        assert_eq!(env.store.lineage_progenitor(&Iri::new(id)).unwrap(), Iri::new("rmap:a"));
    }
    assert_eq!(env.store.latest_version(&Iri::new("rmap:a")).unwrap(), Iri::new("rmap:c"));
}

#[test]
fn test_previous_and_next() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    env.create_disco("rmap:a", &x);
    env.update_disco("rmap:a", "rmap:b", &x);
    env.update_disco("rmap:b", "rmap:c", &x);

    let b = Iri::new("rmap:b");
    assert_eq!(env.store.previous_version(&b).unwrap(), Some(Iri::new("rmap:a")));
    assert_eq!(env.store.next_version(&b).unwrap(), Some(Iri::new("rmap:c")));

    let view = env.store.disco_view(&b).unwrap();
    assert_eq!(view.status, Status::Inactive);
    assert_eq!(view.latest, Iri::new("rmap:c"));
    assert_eq!(view.disco.id, b);
}

#[test]
fn test_inactivation_keeps_version_count() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    env.create_disco("rmap:a", &x);
    env.store.inactivate_disco(&Iri::new("rmap:a"), &x).unwrap();

    assert_eq!(env.versions("rmap:a"), vec!["rmap:a"]);
    assert!(env.store.check_lineage(&Iri::new("rmap:a")).unwrap().consistent);
}

// =============================================================================
// Fork Tests
// =============================================================================

#[test]
fn test_cross_agent_update_forks() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    let y = env.create_agent("rmap:y", "Y");
    env.create_disco("rmap:a", &x);
    let event = env.update_disco("rmap:a", "rmap:b", &y);

    assert_eq!(event.event_type(), EventType::Derivation);
    assert_eq!(env.store.lineage_progenitor(&Iri::new("rmap:b")).unwrap(), Iri::new("rmap:b"));
    assert_eq!(env.versions("rmap:a"), vec!["rmap:a"]);
    assert_eq!(env.versions("rmap:b"), vec!["rmap:b"]);
    assert_eq!(env.store.derivatives(&Iri::new("rmap:a")).unwrap(), iris(&["rmap:b"]));
    assert_eq!(
        env.store.versions_and_derivatives(&Iri::new("rmap:a")).unwrap(),
        iris(&["rmap:a", "rmap:b"])
    );
}

#[test]
fn test_fork_continues_independently() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    let y = env.create_agent("rmap:y", "Y");
    env.create_disco("rmap:a", &x);
    env.update_disco("rmap:a", "rmap:f1", &y);
    env.update_disco("rmap:f1", "rmap:f2", &y);
    env.update_disco("rmap:a", "rmap:a2", &x);

    assert_eq!(env.versions("rmap:a"), vec!["rmap:a", "rmap:a2"]);
    assert_eq!(env.versions("rmap:f2"), vec!["rmap:f1", "rmap:f2"]);
    assert_eq!(
        env.store.versions_and_derivatives(&Iri::new("rmap:a2")).unwrap(),
        iris(&["rmap:a", "rmap:a2", "rmap:f1", "rmap:f2"])
    );
    for id in ["rmap:a", "rmap:a2", "rmap:f1", "rmap:f2"] {
        let report = env.store.check_lineage(&Iri::new(id)).unwrap();
        assert!(report.consistent, "lineage of {} diverged: {:?}", id, report);
    }
}

#[test]
fn test_derivation_leaves_source_active() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    let y = env.create_agent("rmap:y", "Y");
    env.create_disco("rmap:a", &x);
    env.update_disco("rmap:a", "rmap:b", &y);

    env.assert_status("rmap:a", Status::Active);
    // the source is still the latest of its own lineage
    env.update_disco("rmap:a", "rmap:a2", &x);
}

// =============================================================================
// Version Currency Tests
// =============================================================================

#[test]
fn test_update_against_stale_version() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    env.create_disco("rmap:a", &x);
    env.update_disco("rmap:a", "rmap:b", &x);

    let err = env
        .store
        .update_disco(&Iri::new("rmap:a"), env.disco("rmap:c", &["http://example.org/r9"]), &x)
        .unwrap_err();
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::NotLatestVersion { latest, .. }) => {
            // retry against the reported latest
            env.update_disco(latest, "rmap:c", &x);
        }
        other => panic!("expected NotLatestVersion, got {:?}", other),
    }
    assert_eq!(env.versions("rmap:c"), vec!["rmap:a", "rmap:b", "rmap:c"]);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_on_one_store() {
    let env = TestEnv::new();
    env.create_agent("rmap:x", "X");
    env.create_agent("rmap:y", "Y");
    let root = env.temp_dir.path().to_path_buf();

    let handles: Vec<_> = ["rmap:x", "rmap:y"]
        .into_iter()
        .map(|agent| {
            let root = root.clone();
            thread::spawn(move || {
                let store = rmap::Store::open(&root).expect("Failed to open store");
                let request = RequestAgent::new(agent);
                let mut created = Vec::new();
                for n in 0..5 {
                    let disco = store
                        .new_disco(vec![Iri::new(format!("http://example.org/{}/{}", agent, n))])
                        .expect("Failed to mint disco");
                    created.push(disco.id.clone());
                    store.create_disco(disco, &request).expect("Failed to create disco");
                }
                created
            })
        })
        .collect();

    let created: Vec<Iri> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("writer thread panicked"))
        .collect();
    assert_eq!(created.len(), 10);

    let store = env.reopen();
    for id in &created {
        assert_eq!(store.disco_status(id).unwrap(), Status::Active);
        assert_eq!(store.all_versions(id).unwrap(), vec![id.clone()]);
    }
}

#[test]
fn test_second_handle_sees_committed_lineage() {
    let env = TestEnv::new();
    let x = env.create_agent("rmap:x", "X");
    env.create_disco("rmap:a", &x);

    let other = env.reopen();
    other
        .update_disco(&Iri::new("rmap:a"), env.disco("rmap:b", &["http://example.org/r1"]), &x)
        .unwrap();

    assert_eq!(env.versions("rmap:a"), vec!["rmap:a", "rmap:b"]);
}
