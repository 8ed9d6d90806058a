//! Agent registration, replacement and Agent-centred reads.

use crate::events::EventManager;
use crate::id::IdService;
use crate::model::{Agent, Event, EventDetail};
use crate::search::{SearchParams, filter_discos};
use crate::status;
use crate::storage::GraphStore;
use crate::store::StoreError;
use crate::types::{EventType, Iri, ObjectKind, RequestAgent, Status, TargetType, Triple, Value};
use crate::vocab;
use chrono::Utc;
use eyre::Result;
use log::info;

pub struct AgentManager<'a> {
    events: EventManager<'a>,
    ids: &'a dyn IdService,
    admin_agent: Option<&'a Iri>,
}

impl<'a> AgentManager<'a> {
    pub fn new(events: EventManager<'a>, ids: &'a dyn IdService, admin_agent: Option<&'a Iri>) -> Self {
        Self {
            events,
            ids,
            admin_agent,
        }
    }

    fn graph(&self) -> &'a dyn GraphStore {
        self.events.graph()
    }

    /// Build an Event stamped with the requesting Agent's details.
    pub(crate) fn new_event(
        &self,
        request: &RequestAgent,
        target_type: TargetType,
        started: chrono::DateTime<Utc>,
        lineage_progenitor: Option<Iri>,
        detail: EventDetail,
    ) -> Result<Event> {
        Ok(Event {
            id: self.ids.create_id()?,
            target_type,
            associated_agent: request.agent.clone(),
            associated_key: request.key.clone(),
            description: request.description.clone(),
            start_time: started,
            end_time: Utc::now().max(started),
            lineage_progenitor,
            detail,
        })
    }

    pub fn is_agent_id(&self, id: &Iri) -> Result<bool> {
        status::is_agent_id(self.graph(), id)
    }

    /// The requesting Agent must be a registered Agent.
    pub fn validate_request_agent(&self, request: &RequestAgent) -> Result<()> {
        if request.agent.is_empty() {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(
                "requesting agent id cannot be empty".to_string()
            )));
        }
        if !self.is_agent_id(&request.agent)? {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Agent,
                id: request.agent.to_string(),
            }));
        }
        Ok(())
    }

    pub fn has_admin_rights(&self, agent: &Iri) -> bool {
        self.admin_agent == Some(agent)
    }

    pub fn agent_status(&self, id: &Iri) -> Result<Status> {
        status::agent_status(self.graph(), id)
    }

    /// Register an Agent. An Agent may register itself; otherwise the requester must exist.
    pub fn create_agent(&self, agent: &Agent, request: &RequestAgent) -> Result<Event> {
        if agent.id.is_empty() {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(
                "agent id cannot be empty".to_string()
            )));
        }
        if request.agent != agent.id {
            self.validate_request_agent(request)?;
        }
        if self.is_agent_id(&agent.id)? {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(format!(
                "agent {} already exists",
                agent.id
            ))));
        }
        if status::id_in_use(self.graph(), &agent.id)? {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(format!(
                "id {} is already in use",
                agent.id
            ))));
        }

        let started = Utc::now();
        let event = self.events.in_transaction(|| {
            self.graph().add_quads(&agent.to_quads())?;
            let event = self.new_event(
                request,
                TargetType::Agent,
                started,
                None,
                EventDetail::Creation {
                    created: vec![agent.id.clone()],
                },
            )?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("Created agent {} (event {})", agent.id, event.id);
        Ok(event)
    }

    pub fn read_agent(&self, id: &Iri) -> Result<Agent> {
        match self.agent_status(id)? {
            Status::Tombstoned => return Err(eyre::eyre!(StoreError::Tombstoned(id.to_string()))),
            Status::Deleted => return Err(eyre::eyre!(StoreError::Deleted(id.to_string()))),
            Status::Active | Status::Inactive => {}
        }
        let quads = self.graph().named_graph(id)?;
        Agent::from_graph(id, &quads)
    }

    /// Replace the changed fields of an existing Agent and record a Replace Event.
    pub fn update_agent(&self, updated: &Agent, request: &RequestAgent) -> Result<Event> {
        if !self.is_agent_id(&updated.id)? {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Agent,
                id: updated.id.to_string(),
            }));
        }
        self.validate_request_agent(request)?;
        let original = self.read_agent(&updated.id)?;

        let id = Value::Iri(updated.id.clone());
        let changes: Vec<(&str, Value, Value)> = [
            (vocab::FOAF_NAME, original.name.clone(), updated.name.clone()),
            (
                vocab::RMAP_IDENTITY_PROVIDER,
                Value::Iri(original.identity_provider.clone()),
                Value::Iri(updated.identity_provider.clone()),
            ),
            (
                vocab::RMAP_USER_AUTH_ID,
                Value::Iri(original.auth_id.clone()),
                Value::Iri(updated.auth_id.clone()),
            ),
        ]
        .into_iter()
        .filter(|(_, old, new)| old != new)
        .collect();

        if changes.is_empty() {
            return Err(eyre::eyre!(StoreError::DefectiveArgument(format!(
                "the agent update for {} contains no changes",
                updated.id
            ))));
        }

        let mut description = request.description.clone().unwrap_or_default();
        description.push_str("; Updates: ");
        for (predicate, old, new) in &changes {
            description.push_str(&format!(
                "{}={} -> {}; ",
                short_name(predicate),
                old.lexical(),
                new.lexical()
            ));
        }
        let request = RequestAgent {
            description: Some(description),
            ..request.clone()
        };

        let started = Utc::now();
        let event = self.events.in_transaction(|| {
            for (predicate, old, new) in &changes {
                self.graph()
                    .remove_quads(&[Triple::new(id.clone(), *predicate, old.clone())], Some(&updated.id))?;
                self.graph()
                    .add_quad(&Triple::new(id.clone(), *predicate, new.clone()).in_context(&updated.id))?;
            }
            let event = self.new_event(
                &request,
                TargetType::Agent,
                started,
                None,
                EventDetail::Replace {
                    updated: updated.id.clone(),
                },
            )?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("Updated agent {} (event {})", updated.id, event.id);
        Ok(event)
    }

    /// DiSCOs the Agent generated, through Creation, Update or Derivation Events.
    pub fn agent_discos(&self, agent: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        let mut discos = Vec::new();
        for event in self.events.events_initiated_by(agent, &SearchParams::default())? {
            if !matches!(
                status::event_type(self.graph(), &event)?,
                Some(EventType::Creation | EventType::Update | EventType::Derivation)
            ) {
                continue;
            }
            for created in status::event_links(self.graph(), &event, vocab::PROV_GENERATED)? {
                if !discos.contains(&created) && status::is_disco_id(self.graph(), &created)? {
                    discos.push(created);
                }
            }
        }
        filter_discos(self.graph(), discos, params)
    }

    pub fn agent_events_initiated(&self, agent: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        if !self.is_agent_id(agent)? {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Agent,
                id: agent.to_string(),
            }));
        }
        self.events.events_initiated_by(agent, params)
    }
}

fn short_name(predicate: &str) -> &str {
    match predicate {
        vocab::FOAF_NAME => "foaf:name",
        vocab::RMAP_IDENTITY_PROVIDER => "rmap:identityProvider",
        vocab::RMAP_USER_AUTH_ID => "rmap:userAuthId",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::RandomIdService;
    use crate::storage::SqliteGraphStore;

    fn setup_test_graph() -> (SqliteGraphStore, RandomIdService) {
        (SqliteGraphStore::in_memory().unwrap(), RandomIdService::default())
    }

    fn acme() -> Agent {
        Agent::new("rmap:ag1", "Acme", "https://idp/1", "https://idp/1/u42")
    }

    #[test]
    fn test_agent_can_register_itself() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        let event = agents.create_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap();

        assert_eq!(event.event_type(), EventType::Creation);
        assert_eq!(event.target_type, TargetType::Agent);
        assert_eq!(agents.agent_status(&acme().id).unwrap(), Status::Active);
        assert_eq!(agents.read_agent(&acme().id).unwrap(), acme());
    }

    #[test]
    fn test_unknown_requester_cannot_create_others() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        let err = agents.create_agent(&acme(), &RequestAgent::new("rmap:stranger")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { kind: ObjectKind::Agent, .. })
        ));
        assert!(!agents.is_agent_id(&acme().id).unwrap());
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        agents.create_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap();
        let err = agents.create_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some_and(StoreError::is_defective_argument));
    }

    #[test]
    fn test_update_agent_replaces_changed_fields_only() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        agents.create_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap();

        let renamed = Agent::new("rmap:ag1", "Acme Corp", "https://idp/1", "https://idp/1/u42");
        let request = RequestAgent::new("rmap:ag1").with_description("rename");
        let event = agents.update_agent(&renamed, &request).unwrap();

        assert_eq!(event.event_type(), EventType::Replace);
        assert_eq!(
            event.description.as_deref(),
            Some("rename; Updates: foaf:name=Acme -> Acme Corp; ")
        );
        assert_eq!(agents.read_agent(&renamed.id).unwrap(), renamed);
        assert_eq!(agents.agent_status(&renamed.id).unwrap(), Status::Active);
        // one name triple, not two
        let names = graph
            .get_quads(None, Some(&Iri::new(vocab::FOAF_NAME)), None, Some(&renamed.id))
            .unwrap();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_update_agent_without_changes_rejected() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        agents.create_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap();
        let err = agents.update_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some_and(StoreError::is_defective_argument));
    }

    #[test]
    fn test_update_unknown_agent_not_found() {
        let (graph, ids) = setup_test_graph();
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, None);
        let err = agents.update_agent(&acme(), &RequestAgent::new("rmap:ag1")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { kind: ObjectKind::Agent, .. })
        ));
    }

    #[test]
    fn test_admin_rights() {
        let (graph, ids) = setup_test_graph();
        let admin = Iri::new("rmap:admin");
        let agents = AgentManager::new(EventManager::new(&graph, None), &ids, Some(&admin));
        assert!(agents.has_admin_rights(&admin));
        assert!(!agents.has_admin_rights(&Iri::new("rmap:ag1")));
    }
}
