//! RMap: an event-sourced store for versioned aggregations of web resources.
//!
//! Agents publish DiSCOs (Discrete Aggregations of Resources). Every change
//! is recorded as an immutable Event in a quad store, and the status and
//! version history of each object are derived from those Events alone.
//!
//! # Example
//!
//! ```no_run
//! use rmap::{Iri, RequestAgent, Status, Store};
//! use std::path::Path;
//!
//! let store = Store::init(Path::new(".")).unwrap();
//!
//! // An Agent registers itself
//! let (agent, _) = store.register_agent("Acme", "https://idp/1", "https://idp/1/u42").unwrap();
//! let request = RequestAgent::new(agent.id.clone());
//!
//! // Publish a DiSCO, then replace it with a new version
//! let d1 = store.new_disco(vec![Iri::new("http://example.org/r1")]).unwrap();
//! let d1_id = d1.id.clone();
//! store.create_disco(d1, &request).unwrap();
//!
//! let d2 = store.new_disco(vec![Iri::new("http://example.org/r2")]).unwrap();
//! let d2_id = d2.id.clone();
//! store.update_disco(&d1_id, d2, &request).unwrap();
//!
//! assert_eq!(store.disco_status(&d1_id).unwrap(), Status::Inactive);
//! assert_eq!(store.all_versions(&d1_id).unwrap(), vec![d1_id, d2_id]);
//! ```

mod agents;
mod discos;
mod events;
mod status;
mod store;
mod validate;

pub mod config;
pub mod id;
pub mod lineage;
pub mod model;
pub mod publish;
pub mod query;
pub mod search;
pub mod storage;
pub mod types;
pub mod vocab;

// Re-export public API
pub use config::{Config, PublishConfig};
pub use discos::DiscoView;
pub use id::{IdService, RandomIdService};
pub use lineage::{LineageEntry, LineageReport};
pub use model::{Agent, Disco, Event, EventDetail};
pub use publish::{EventSink, JsonlEventSink, MemoryEventSink, PublishOutcome, Publisher};
pub use search::{ResourceQueries, SearchParams};
pub use storage::{GraphStore, SqliteGraphStore};
pub use store::{Store, StoreError};
pub use types::{EventType, Iri, Literal, ObjectKind, Quad, RequestAgent, Status, TargetType, Triple, Value};
pub use validate::ValidationError;
