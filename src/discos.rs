//! DiSCO lifecycle: create, update, inactivate, tombstone and delete.

use crate::agents::AgentManager;
use crate::events::EventManager;
use crate::id::IdService;
use crate::lineage;
use crate::model::{Disco, Event, EventDetail};
use crate::status;
use crate::storage::GraphStore;
use crate::store::StoreError;
use crate::types::{Iri, ObjectKind, RequestAgent, Status, TargetType};
use crate::validate::validate_disco;
use chrono::Utc;
use eyre::Result;
use log::info;
use serde::Serialize;

/// A DiSCO with its status and its neighbours in the lineage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoView {
    pub disco: Disco,
    pub status: Status,
    pub latest: Iri,
    pub previous: Option<Iri>,
    pub next: Option<Iri>,
}

pub struct DiscoManager<'a> {
    events: EventManager<'a>,
    agents: AgentManager<'a>,
    ids: &'a dyn IdService,
}

fn defective(msg: String) -> eyre::Report {
    eyre::eyre!(StoreError::DefectiveArgument(msg))
}

impl<'a> DiscoManager<'a> {
    pub fn new(events: EventManager<'a>, agents: AgentManager<'a>, ids: &'a dyn IdService) -> Self {
        Self { events, agents, ids }
    }

    fn graph(&self) -> &'a dyn GraphStore {
        self.events.graph()
    }

    pub fn disco_status(&self, id: &Iri) -> Result<Status> {
        status::disco_status(self.graph(), id)
    }

    pub fn is_disco_id(&self, id: &Iri) -> Result<bool> {
        status::is_disco_id(self.graph(), id)
    }

    /// Validate `disco` in place and make sure its id is fresh.
    fn prepare(&self, disco: &mut Disco) -> Result<()> {
        validate_disco(disco, self.ids)?;
        if status::id_in_use(self.graph(), &disco.id)? {
            return Err(defective(format!("id {} is already in use", disco.id)));
        }
        Ok(())
    }

    pub fn create_disco(&self, mut disco: Disco, request: &RequestAgent) -> Result<Event> {
        self.agents.validate_request_agent(request)?;
        self.prepare(&mut disco)?;

        let started = Utc::now();
        let event = self.events.in_transaction(|| {
            self.graph().add_quads(&disco.to_quads())?;
            let event = self.agents.new_event(
                request,
                TargetType::Disco,
                started,
                Some(disco.id.clone()),
                EventDetail::Creation {
                    created: vec![disco.id.clone()],
                },
            )?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("Created DiSCO {} (event {})", disco.id, event.id);
        Ok(event)
    }

    /// Replace or inactivate the latest version of a lineage.
    ///
    /// The same Agent continues the lineage with an Update; any other Agent
    /// forks it with a Derivation. The currency checks run before the write
    /// transaction opens, so two concurrent updates of one version can both
    /// succeed.
    pub fn update_disco(
        &self,
        old_id: &Iri,
        new_disco: Option<Disco>,
        request: &RequestAgent,
        just_inactivate: bool,
    ) -> Result<Event> {
        self.agents.validate_request_agent(request)?;

        match self.disco_status(old_id)? {
            Status::Tombstoned => return Err(eyre::eyre!(StoreError::Tombstoned(old_id.to_string()))),
            Status::Deleted => return Err(eyre::eyre!(StoreError::Deleted(old_id.to_string()))),
            Status::Active | Status::Inactive => {}
        }
        let latest = lineage::latest_version(self.graph(), old_id)?;
        if &latest != old_id {
            return Err(eyre::eyre!(StoreError::NotLatestVersion {
                id: old_id.to_string(),
                latest: latest.to_string(),
            }));
        }
        if self.disco_status(old_id)? == Status::Inactive {
            return Err(eyre::eyre!(StoreError::InactiveVersion(old_id.to_string())));
        }

        let same_agent = status::asserting_agent(self.graph(), old_id)? == request.agent;
        let progenitor = lineage::find_lineage_progenitor(self.graph(), old_id)?;
        let started = Utc::now();

        if just_inactivate {
            if !same_agent {
                return Err(defective(format!(
                    "agent {} did not create {} and cannot inactivate it",
                    request.agent, old_id
                )));
            }
            let event = self.events.in_transaction(|| {
                let event = self.agents.new_event(
                    request,
                    TargetType::Disco,
                    started,
                    Some(progenitor.clone()),
                    EventDetail::Inactivation {
                        inactivated: old_id.clone(),
                    },
                )?;
                self.events.create_event(&event)?;
                Ok(event)
            })?;
            info!("Inactivated DiSCO {} (event {})", old_id, event.id);
            return Ok(event);
        }

        let mut disco = new_disco.ok_or_else(|| defective(format!("no replacement supplied for {}", old_id)))?;
        if &disco.id == old_id {
            return Err(defective(format!("replacement for {} must have a new id", old_id)));
        }
        self.prepare(&mut disco)?;

        let (progenitor, detail) = if same_agent {
            (
                progenitor,
                EventDetail::Update {
                    created: vec![disco.id.clone()],
                    derived: disco.id.clone(),
                    inactivated: old_id.clone(),
                },
            )
        } else {
            (
                disco.id.clone(),
                EventDetail::Derivation {
                    created: vec![disco.id.clone()],
                    derived: disco.id.clone(),
                    source: old_id.clone(),
                },
            )
        };

        let event = self.events.in_transaction(|| {
            self.graph().add_quads(&disco.to_quads())?;
            let event = self.agents.new_event(request, TargetType::Disco, started, Some(progenitor), detail)?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("{} of {} to {} (event {})", event.event_type(), old_id, disco.id, event.id);
        Ok(event)
    }

    /// Only the asserting Agent or the administrator may retire a DiSCO.
    fn authorize_retirement(&self, id: &Iri, request: &RequestAgent) -> Result<()> {
        if self.agents.has_admin_rights(&request.agent) {
            return Ok(());
        }
        if status::asserting_agent(self.graph(), id)? == request.agent {
            return Ok(());
        }
        Err(defective(format!(
            "agent {} is not permitted to retire DiSCO {}",
            request.agent, id
        )))
    }

    pub fn tombstone_disco(&self, id: &Iri, request: &RequestAgent) -> Result<Event> {
        self.agents.validate_request_agent(request)?;
        match self.disco_status(id)? {
            Status::Tombstoned => return Err(eyre::eyre!(StoreError::Tombstoned(id.to_string()))),
            Status::Deleted => return Err(eyre::eyre!(StoreError::Deleted(id.to_string()))),
            Status::Active | Status::Inactive => {}
        }
        self.authorize_retirement(id, request)?;
        let progenitor = lineage::find_lineage_progenitor(self.graph(), id)?;

        let started = Utc::now();
        let event = self.events.in_transaction(|| {
            let event = self.agents.new_event(
                request,
                TargetType::Disco,
                started,
                Some(progenitor),
                EventDetail::Tombstone { tombstoned: id.clone() },
            )?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("Tombstoned DiSCO {} (event {})", id, event.id);
        Ok(event)
    }

    /// Remove a DiSCO's graph and record a Deletion carrying the removed statements.
    pub fn delete_disco(&self, id: &Iri, request: &RequestAgent) -> Result<Event> {
        self.agents.validate_request_agent(request)?;
        if self.disco_status(id)? == Status::Deleted {
            return Err(eyre::eyre!(StoreError::Deleted(id.to_string())));
        }
        self.authorize_retirement(id, request)?;
        let progenitor = lineage::find_lineage_progenitor(self.graph(), id)?;

        let started = Utc::now();
        let event = self.events.in_transaction(|| {
            let removed: Vec<_> = self
                .graph()
                .get_quads(None, None, None, Some(id))?
                .iter()
                .map(|q| q.triple())
                .collect();
            let count = self.graph().remove_quads(&removed, Some(id))?;
            if count != removed.len() {
                return Err(eyre::eyre!(StoreError::StoreFailure(format!(
                    "removed {} of {} statements from {}",
                    count,
                    removed.len(),
                    id
                ))));
            }
            let event = self.agents.new_event(
                request,
                TargetType::Disco,
                started,
                Some(progenitor),
                EventDetail::Deletion {
                    deleted: vec![id.clone()],
                    removed_statements: removed,
                },
            )?;
            self.events.create_event(&event)?;
            Ok(event)
        })?;

        info!("Deleted DiSCO {} (event {})", id, event.id);
        Ok(event)
    }

    fn load(&self, id: &Iri) -> Result<Disco> {
        let quads = self.graph().named_graph(id)?;
        Disco::from_graph(id, &quads)
    }

    /// Read an Active or Inactive DiSCO.
    pub fn read_disco(&self, id: &Iri) -> Result<Disco> {
        match self.disco_status(id)? {
            Status::Tombstoned => Err(eyre::eyre!(StoreError::Tombstoned(id.to_string()))),
            Status::Deleted => Err(eyre::eyre!(StoreError::Deleted(id.to_string()))),
            Status::Active | Status::Inactive => self.load(id),
        }
    }

    /// Read a DiSCO even if it has been tombstoned.
    pub fn read_tombstoned_disco(&self, id: &Iri) -> Result<Disco> {
        match self.disco_status(id)? {
            Status::Deleted => Err(eyre::eyre!(StoreError::Deleted(id.to_string()))),
            _ => self.load(id),
        }
    }

    pub fn disco_view(&self, id: &Iri) -> Result<DiscoView> {
        let disco = self.read_disco(id)?;
        Ok(DiscoView {
            status: self.disco_status(id)?,
            latest: lineage::latest_version(self.graph(), id)?,
            previous: lineage::previous_version(self.graph(), id)?,
            next: lineage::next_version(self.graph(), id)?,
            disco,
        })
    }

    pub fn disco_events(&self, id: &Iri) -> Result<Vec<Iri>> {
        if !self.is_disco_id(id)? {
            return Err(eyre::eyre!(StoreError::NotFound {
                kind: ObjectKind::Disco,
                id: id.to_string(),
            }));
        }
        self.events.disco_related_events(id)
    }

    pub fn asserting_agent(&self, id: &Iri) -> Result<Iri> {
        self.disco_status(id)?;
        status::asserting_agent(self.graph(), id)
    }

    /// Agents behind every Event related to the DiSCO.
    pub fn related_agents(&self, id: &Iri) -> Result<Vec<Iri>> {
        let mut agents = Vec::new();
        for event in self.disco_events(id)? {
            if let Some(agent) = status::event_agent(self.graph(), &event)?
                && !agents.contains(&agent)
            {
                agents.push(agent);
            }
        }
        Ok(agents)
    }
}
