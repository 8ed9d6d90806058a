//! Shared test infrastructure for RMap integration tests.
//!
//! Provides TestEnv helper for consistent test setup/teardown.

#![allow(dead_code)]

use rmap::{Agent, Config, Disco, Event, Iri, MemoryEventSink, RequestAgent, Status, Store};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

pub const ADMIN: &str = "rmap:admin";

/// Test environment with automatic cleanup.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub store: Store,
    pub sink: Arc<MemoryEventSink>,
}

impl TestEnv {
    /// Create a new test environment with an initialized store and a registered admin.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let rmap_dir = temp_dir.path().join(".rmap");
        fs::create_dir_all(&rmap_dir).expect("Failed to create .rmap dir");
        Config::default()
            .with_admin_agent(ADMIN)
            .save(&rmap_dir.join("config.yaml"))
            .expect("Failed to write config");

        let sink = Arc::new(MemoryEventSink::new());
        let store = Store::init(temp_dir.path())
            .expect("Failed to init store")
            .with_sink(sink.clone())
            .expect("Failed to attach sink");

        let admin = Agent::new(ADMIN, "Administrator", "https://idp/admin", "https://idp/admin/root");
        store
            .create_agent(&admin, &RequestAgent::new(ADMIN))
            .expect("Failed to create admin agent");

        Self { temp_dir, store, sink }
    }

    pub fn admin(&self) -> RequestAgent {
        RequestAgent::new(ADMIN)
    }

    /// Open a second handle on the same store files.
    pub fn reopen(&self) -> Store {
        Store::open(self.temp_dir.path()).expect("Failed to open store")
    }

    /// Register a self-created Agent with the given id.
    pub fn create_agent(&self, id: &str, name: &str) -> RequestAgent {
        let agent = Agent::new(id, name, "https://idp/1", format!("https://idp/1/{}", name));
        self.store
            .create_agent(&agent, &RequestAgent::new(id))
            .expect("Failed to create agent");
        RequestAgent::new(id)
    }

    /// A DiSCO aggregating the given resources.
    pub fn disco(&self, id: &str, resources: &[&str]) -> Disco {
        Disco::new(id, resources.iter().map(|r| Iri::new(*r)).collect())
    }

    /// Create a DiSCO with two aggregated resources.
    pub fn create_disco(&self, id: &str, agent: &RequestAgent) -> Event {
        self.store
            .create_disco(self.disco(id, &["http://example.org/r1", "http://example.org/r2"]), agent)
            .expect("Failed to create disco")
    }

    /// Replace `old` with a new DiSCO `new`.
    pub fn update_disco(&self, old: &str, new: &str, agent: &RequestAgent) -> Event {
        self.store
            .update_disco(
                &Iri::new(old),
                self.disco(new, &["http://example.org/r1", "http://example.org/r3"]),
                agent,
            )
            .expect("Failed to update disco")
    }

    pub fn tombstone(&self, id: &str, agent: &RequestAgent) -> Event {
        self.store
            .tombstone_disco(&Iri::new(id), agent)
            .expect("Failed to tombstone disco")
    }

    pub fn delete(&self, id: &str, agent: &RequestAgent) -> Event {
        self.store.delete_disco(&Iri::new(id), agent).expect("Failed to delete disco")
    }

    pub fn versions(&self, id: &str) -> Vec<String> {
        self.store
            .all_versions(&Iri::new(id))
            .expect("Failed to list versions")
            .into_iter()
            .map(|v| v.to_string())
            .collect()
    }

    /// Assert the status of a DiSCO.
    pub fn assert_status(&self, id: &str, expected: Status) {
        let actual = self.store.disco_status(&Iri::new(id)).expect("Failed to get status");
        assert_eq!(actual, expected, "Expected {} to be {}, got {}", id, expected, actual);
    }

    /// Number of events mirrored to the sink.
    pub fn published_count(&self) -> usize {
        self.sink.len()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
