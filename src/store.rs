//! High-level store API for RMap.

use crate::agents::AgentManager;
use crate::config::Config;
use crate::discos::{DiscoManager, DiscoView};
use crate::events::EventManager;
use crate::id::{IdService, RandomIdService};
use crate::lineage::{self, LineageReport};
use crate::model::{Agent, Disco, Event};
use crate::publish::{EventSink, JsonlEventSink, Publisher};
use crate::search::{ResourceQueries, SearchParams};
use crate::status;
use crate::storage::{GraphStore, SqliteGraphStore};
use crate::types::{EventType, Iri, ObjectKind, Quad, RequestAgent, Status, TargetType};
use crate::validate::ValidationError;
use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const RMAP_DIR: &str = ".rmap";
const DB_FILE: &str = "rmap.db";
const CONFIG_FILE: &str = "config.yaml";
const EVENTS_FILE: &str = "events.jsonl";

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The id does not resolve to a known object of the expected kind.
    NotFound { kind: ObjectKind, id: String },
    Tombstoned(String),
    Deleted(String),
    /// Malformed input or a forbidden action.
    DefectiveArgument(String),
    /// Structural defect in a submitted DiSCO.
    Validation(ValidationError),
    InactiveVersion(String),
    /// Update against a superseded version; carries the current latest.
    NotLatestVersion { id: String, latest: String },
    /// Stored data contradicts a lineage invariant.
    Integrity(String),
    StoreFailure(String),
    RollbackFailed { cause: String, rollback: String },
}

impl StoreError {
    pub fn is_defective_argument(&self) -> bool {
        matches!(self, StoreError::DefectiveArgument(_) | StoreError::Validation(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            StoreError::Tombstoned(id) => write!(f, "object has been tombstoned: {}", id),
            StoreError::Deleted(id) => write!(f, "object has been deleted: {}", id),
            StoreError::DefectiveArgument(msg) => write!(f, "defective argument: {}", msg),
            StoreError::Validation(e) => write!(f, "validation error: {}", e),
            StoreError::InactiveVersion(id) => write!(f, "version is inactive: {}", id),
            StoreError::NotLatestVersion { id, latest } => {
                write!(f, "{} is not the latest version; latest is {}", id, latest)
            }
            StoreError::Integrity(msg) => write!(f, "integrity error: {}", msg),
            StoreError::StoreFailure(msg) => write!(f, "store failure: {}", msg),
            StoreError::RollbackFailed { cause, rollback } => {
                write!(f, "rollback failed ({}) after error: {}", rollback, cause)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// The main RMap store.
pub struct Store {
    graph: SqliteGraphStore,
    ids: Box<dyn IdService>,
    publisher: Option<Publisher>,
    config: Config,
    root: Option<PathBuf>,
}

fn build_publisher(config: &Config, rmap_dir: Option<&Path>) -> Result<Option<Publisher>> {
    let Some(publish) = &config.publish else {
        return Ok(None);
    };
    let path = match (&publish.jsonl_path, rmap_dir) {
        (Some(path), _) if path.is_absolute() => path.clone(),
        (Some(path), Some(dir)) => dir.join(path),
        (None, Some(dir)) => dir.join(EVENTS_FILE),
        (Some(_), None) | (None, None) => return Ok(None),
    };
    let sink = Arc::new(JsonlEventSink::new(path));
    Ok(Some(Publisher::new(sink, publish.topic.clone(), publish.timeout())?))
}

impl Store {
    fn assemble(graph: SqliteGraphStore, config: Config, root: Option<PathBuf>) -> Result<Self> {
        let rmap_dir = root.as_ref().map(|r| r.join(RMAP_DIR));
        let publisher = build_publisher(&config, rmap_dir.as_deref())?;
        Ok(Self {
            graph,
            ids: Box::new(RandomIdService::new(config.id_prefix.clone(), config.id_length)),
            publisher,
            config,
            root,
        })
    }

    /// Initialize a new store in the given directory.
    pub fn init(root: &Path) -> Result<Self> {
        let rmap_dir = root.join(RMAP_DIR);
        fs::create_dir_all(&rmap_dir).context("Failed to create .rmap directory")?;

        let config_path = rmap_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            Config::default().save(&config_path)?;
        }
        let config = Config::load(&config_path)?;
        let graph = SqliteGraphStore::open(&rmap_dir.join(DB_FILE))?;
        info!("Initialized store in {}", rmap_dir.display());
        Self::assemble(graph, config, Some(root.to_path_buf()))
    }

    /// Open an existing store.
    pub fn open(root: &Path) -> Result<Self> {
        let rmap_dir = root.join(RMAP_DIR);
        if !rmap_dir.exists() {
            eyre::bail!("No .rmap directory found. Run 'rmap init' first.");
        }
        let config = Config::load(&rmap_dir.join(CONFIG_FILE))?;
        let graph = SqliteGraphStore::open(&rmap_dir.join(DB_FILE))?;
        Self::assemble(graph, config, Some(root.to_path_buf()))
    }

    /// A private store that lives only as long as this value.
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::assemble(SqliteGraphStore::in_memory()?, config, None)
    }

    /// Mirror committed Events to `sink` instead of the configured one.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Result<Self> {
        let publish = self.config.publish.clone().unwrap_or_default();
        let timeout = publish.timeout();
        self.publisher = Some(Publisher::new(sink, publish.topic, timeout)?);
        Ok(self)
    }

    pub fn with_id_service(mut self, ids: Box<dyn IdService>) -> Self {
        self.ids = ids;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn graph(&self) -> &SqliteGraphStore {
        &self.graph
    }

    fn events(&self) -> EventManager<'_> {
        EventManager::new(&self.graph, self.publisher.as_ref())
    }

    fn agents(&self) -> AgentManager<'_> {
        AgentManager::new(self.events(), self.ids.as_ref(), self.config.admin_agent.as_ref())
    }

    fn discos(&self) -> DiscoManager<'_> {
        DiscoManager::new(self.events(), self.agents(), self.ids.as_ref())
    }

    /// Relationship queries starting from a resource or statement.
    pub fn resources(&self) -> ResourceQueries<'_> {
        ResourceQueries::new(&self.graph)
    }

    pub fn mint_id(&self) -> Result<Iri> {
        self.ids.create_id()
    }

    /// An empty DiSCO with a freshly minted id.
    pub fn new_disco(&self, aggregated_resources: Vec<Iri>) -> Result<Disco> {
        Ok(Disco::new(self.mint_id()?, aggregated_resources))
    }

    /// Mint an id for a new Agent and let it register itself.
    pub fn register_agent(&self, name: &str, identity_provider: &str, auth_id: &str) -> Result<(Agent, Event)> {
        let agent = Agent::new(self.mint_id()?, name, identity_provider, auth_id);
        let event = self.create_agent(&agent, &RequestAgent::new(agent.id.clone()))?;
        Ok((agent, event))
    }

    /// Status of any object, by the Events that reference it.
    pub fn object_status(&self, id: &Iri) -> Result<Status> {
        status::object_status(&self.graph, id)
    }

    /// Raw statements of a named graph.
    pub fn named_graph(&self, id: &Iri) -> Result<Vec<Quad>> {
        self.graph.named_graph(id)
    }

    // Agents

    pub fn create_agent(&self, agent: &Agent, request: &RequestAgent) -> Result<Event> {
        self.agents().create_agent(agent, request)
    }

    pub fn update_agent(&self, agent: &Agent, request: &RequestAgent) -> Result<Event> {
        self.agents().update_agent(agent, request)
    }

    pub fn read_agent(&self, id: &Iri) -> Result<Agent> {
        self.agents().read_agent(id)
    }

    pub fn agent_status(&self, id: &Iri) -> Result<Status> {
        self.agents().agent_status(id)
    }

    pub fn is_agent_id(&self, id: &Iri) -> Result<bool> {
        self.agents().is_agent_id(id)
    }

    pub fn has_admin_rights(&self, agent: &Iri) -> bool {
        self.agents().has_admin_rights(agent)
    }

    pub fn validate_request_agent(&self, request: &RequestAgent) -> Result<()> {
        self.agents().validate_request_agent(request)
    }

    /// DiSCOs created by an Agent.
    pub fn agent_discos(&self, agent: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        self.agents().agent_discos(agent, params)
    }

    /// Events an Agent initiated.
    pub fn agent_events(&self, agent: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        self.agents().agent_events_initiated(agent, params)
    }

    /// Events that created or replaced an Agent.
    pub fn agent_related_events(&self, agent: &Iri) -> Result<Vec<Iri>> {
        self.events().agent_related_events(agent)
    }

    // DiSCOs

    pub fn create_disco(&self, disco: Disco, request: &RequestAgent) -> Result<Event> {
        self.discos().create_disco(disco, request)
    }

    pub fn update_disco(&self, old_id: &Iri, disco: Disco, request: &RequestAgent) -> Result<Event> {
        self.discos().update_disco(old_id, Some(disco), request, false)
    }

    pub fn inactivate_disco(&self, id: &Iri, request: &RequestAgent) -> Result<Event> {
        self.discos().update_disco(id, None, request, true)
    }

    pub fn tombstone_disco(&self, id: &Iri, request: &RequestAgent) -> Result<Event> {
        self.discos().tombstone_disco(id, request)
    }

    pub fn delete_disco(&self, id: &Iri, request: &RequestAgent) -> Result<Event> {
        self.discos().delete_disco(id, request)
    }

    pub fn read_disco(&self, id: &Iri) -> Result<Disco> {
        self.discos().read_disco(id)
    }

    pub fn read_tombstoned_disco(&self, id: &Iri) -> Result<Disco> {
        self.discos().read_tombstoned_disco(id)
    }

    pub fn disco_view(&self, id: &Iri) -> Result<DiscoView> {
        self.discos().disco_view(id)
    }

    pub fn disco_status(&self, id: &Iri) -> Result<Status> {
        self.discos().disco_status(id)
    }

    pub fn is_disco_id(&self, id: &Iri) -> Result<bool> {
        self.discos().is_disco_id(id)
    }

    pub fn disco_events(&self, id: &Iri) -> Result<Vec<Iri>> {
        self.discos().disco_events(id)
    }

    pub fn disco_agent(&self, id: &Iri) -> Result<Iri> {
        self.discos().asserting_agent(id)
    }

    pub fn disco_related_agents(&self, id: &Iri) -> Result<Vec<Iri>> {
        self.discos().related_agents(id)
    }

    // Lineage

    pub fn lineage_progenitor(&self, id: &Iri) -> Result<Iri> {
        lineage::find_lineage_progenitor(&self.graph, id)
    }

    pub fn all_versions(&self, id: &Iri) -> Result<Vec<Iri>> {
        lineage::all_versions(&self.graph, id)
    }

    pub fn latest_version(&self, id: &Iri) -> Result<Iri> {
        lineage::latest_version(&self.graph, id)
    }

    pub fn previous_version(&self, id: &Iri) -> Result<Option<Iri>> {
        lineage::previous_version(&self.graph, id)
    }

    pub fn next_version(&self, id: &Iri) -> Result<Option<Iri>> {
        lineage::next_version(&self.graph, id)
    }

    pub fn derivatives(&self, id: &Iri) -> Result<Vec<Iri>> {
        lineage::derivatives(&self.graph, id)
    }

    pub fn versions_and_derivatives(&self, id: &Iri) -> Result<Vec<Iri>> {
        lineage::versions_and_derivatives(&self.graph, id)
    }

    pub fn check_lineage(&self, id: &Iri) -> Result<LineageReport> {
        lineage::check_lineage(&self.graph, id)
    }

    // Events

    pub fn read_event(&self, id: &Iri) -> Result<Event> {
        self.events().read_event(id)
    }

    pub fn is_event_id(&self, id: &Iri) -> Result<bool> {
        self.events().is_event_id(id)
    }

    pub fn event_type(&self, id: &Iri) -> Result<EventType> {
        self.events().event_type(id)
    }

    pub fn event_target_type(&self, id: &Iri) -> Result<TargetType> {
        self.events().event_target_type(id)
    }

    pub fn event_start_time(&self, id: &Iri) -> Result<DateTime<Utc>> {
        self.events().start_time(id)
    }

    pub fn event_end_time(&self, id: &Iri) -> Result<DateTime<Utc>> {
        self.events().end_time(id)
    }

    pub fn event_agent(&self, id: &Iri) -> Result<Iri> {
        self.events().associated_agent(id)
    }

    pub fn event_affected_discos(&self, id: &Iri) -> Result<Vec<Iri>> {
        self.events().affected_discos(id)
    }

    pub fn event_affected_agents(&self, id: &Iri) -> Result<Vec<Iri>> {
        self.events().affected_agents(id)
    }

    pub fn event_affected_resources(&self, id: &Iri) -> Result<Vec<Iri>> {
        self.events().affected_resources(id)
    }

    pub fn latest_event(&self, ids: &[Iri]) -> Result<Option<Iri>> {
        self.events().latest_event(ids)
    }
}
