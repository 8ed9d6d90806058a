//! Relationship queries around resources and statements, plus the search
//! parameters shared by every list-returning read.

use crate::lineage;
use crate::status;
use crate::storage::GraphStore;
use crate::types::{Iri, Quad, Status, Triple, Value};
use crate::vocab;
use chrono::{DateTime, Utc};
use eyre::Result;

/// Filters and paging for list-returning reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub status: Option<Status>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    /// Only objects whose generating Event ended at or after `from`.
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Only objects whose generating Event ended at or before `until`.
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn has_date_window(&self) -> bool {
        self.from.is_some() || self.until.is_some()
    }

    pub fn in_window(&self, ts: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| ts >= from) && self.until.is_none_or(|until| ts <= until)
    }

    pub fn accepts_status(&self, status: Status) -> bool {
        self.status.is_none_or(|wanted| wanted == status)
    }

    /// Apply offset and limit.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let iter = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Keep the DiSCOs that pass the status and date filters, then page.
pub(crate) fn filter_discos(graph: &dyn GraphStore, discos: Vec<Iri>, params: &SearchParams) -> Result<Vec<Iri>> {
    let mut kept = Vec::with_capacity(discos.len());
    for disco in discos {
        if params.status.is_some() && !params.accepts_status(status::disco_status(graph, &disco)?) {
            continue;
        }
        if params.has_date_window() {
            let created = match status::generating_event(graph, &disco)? {
                Some(event) => status::event_time(graph, &event, vocab::PROV_ENDED_AT_TIME)?,
                None => None,
            };
            if !created.is_some_and(|ts| params.in_window(ts)) {
                continue;
            }
        }
        kept.push(disco);
    }
    Ok(params.page(kept))
}

fn push_unique<T: PartialEq>(out: &mut Vec<T>, item: T) {
    if !out.contains(&item) {
        out.push(item);
    }
}

/// Reads that start from an arbitrary resource or statement.
#[derive(Clone, Copy)]
pub struct ResourceQueries<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> ResourceQueries<'a> {
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// DiSCO graphs among `contexts`, in first-seen order.
    fn disco_contexts(&self, contexts: impl IntoIterator<Item = Iri>) -> Result<Vec<Iri>> {
        let mut out = Vec::new();
        for ctx in contexts {
            if !out.contains(&ctx) && status::is_rmap_type(self.graph, &ctx, vocab::RMAP_DISCO)? {
                out.push(ctx);
            }
        }
        Ok(out)
    }

    fn mentioning(&self, resource: &Iri) -> Result<Vec<Quad>> {
        let value = Value::Iri(resource.clone());
        let mut quads = self.graph.get_quads(Some(&value), None, None, None)?;
        quads.extend(self.graph.get_quads(None, None, Some(&value), None)?);
        Ok(quads)
    }

    /// DiSCOs whose graph mentions `resource` as subject or object.
    pub fn discos(&self, resource: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        let contexts = self.mentioning(resource)?.into_iter().map(|q| q.context);
        let discos = self.disco_contexts(contexts)?;
        filter_discos(self.graph, discos, params)
    }

    /// Events that touched any DiSCO mentioning `resource`, filtered by event end time.
    pub fn events(&self, resource: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        let unfiltered = SearchParams {
            status: params.status,
            ..SearchParams::default()
        };
        let mut out = Vec::new();
        for disco in self.discos(resource, &unfiltered)? {
            for event in status::events_asserting_any(self.graph, &vocab::DISCO_EVENT_PREDICATES, &disco)? {
                if params.has_date_window() {
                    let ended = status::event_time(self.graph, &event, vocab::PROV_ENDED_AT_TIME)?;
                    if !ended.is_some_and(|ts| params.in_window(ts)) {
                        continue;
                    }
                }
                push_unique(&mut out, event);
            }
        }
        Ok(params.page(out))
    }

    /// Agents that asserted a DiSCO mentioning `resource`.
    pub fn agents(&self, resource: &Iri, params: &SearchParams) -> Result<Vec<Iri>> {
        let mut out = Vec::new();
        let unpaged = SearchParams {
            limit: None,
            offset: 0,
            ..params.clone()
        };
        for disco in self.discos(resource, &unpaged)? {
            push_unique(&mut out, status::asserting_agent(self.graph, &disco)?);
        }
        Ok(params.page(out))
    }

    /// Statements mentioning `resource` across the matching DiSCOs.
    pub fn triples(&self, resource: &Iri, params: &SearchParams) -> Result<Vec<Triple>> {
        let unpaged = SearchParams {
            limit: None,
            offset: 0,
            ..params.clone()
        };
        let discos = self.discos(resource, &unpaged)?;
        let mut out = Vec::new();
        for quad in self.mentioning(resource)? {
            if discos.contains(&quad.context) {
                push_unique(&mut out, quad.triple());
            }
        }
        Ok(params.page(out))
    }

    /// `rdf:type`s asserted for `resource` in any DiSCO.
    pub fn types(&self, resource: &Iri) -> Result<Vec<Iri>> {
        let quads = self.graph.get_quads(
            Some(&Value::Iri(resource.clone())),
            Some(&Iri::new(vocab::RDF_TYPE)),
            None,
            None,
        )?;
        let discos = self.disco_contexts(quads.iter().map(|q| q.context.clone()))?;
        let mut out = Vec::new();
        for quad in quads {
            if let (true, Some(t)) = (discos.contains(&quad.context), quad.object.as_iri()) {
                push_unique(&mut out, t.clone());
            }
        }
        Ok(out)
    }

    /// DiSCOs asserting the statement `(subject, predicate, object)`.
    pub fn statement_discos(
        &self,
        subject: &Value,
        predicate: &Iri,
        object: &Value,
        params: &SearchParams,
    ) -> Result<Vec<Iri>> {
        let quads = self.graph.get_quads(Some(subject), Some(predicate), Some(object), None)?;
        let discos = self.disco_contexts(quads.into_iter().map(|q| q.context))?;
        filter_discos(self.graph, discos, params)
    }

    /// Agents that asserted a DiSCO containing the statement.
    pub fn statement_agents(
        &self,
        subject: &Value,
        predicate: &Iri,
        object: &Value,
        params: &SearchParams,
    ) -> Result<Vec<Iri>> {
        let unpaged = SearchParams {
            limit: None,
            offset: 0,
            ..params.clone()
        };
        let mut out = Vec::new();
        for disco in self.statement_discos(subject, predicate, object, &unpaged)? {
            push_unique(&mut out, status::asserting_agent(self.graph, &disco)?);
        }
        Ok(params.page(out))
    }

    /// Latest version of each DiSCO lineage mentioning `resource`.
    pub fn latest_discos(&self, resource: &Iri) -> Result<Vec<Iri>> {
        let mut out = Vec::new();
        for disco in self.discos(resource, &SearchParams::default())? {
            push_unique(&mut out, lineage::latest_version(self.graph, &disco)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_page_applies_offset_then_limit() {
        let params = SearchParams::new().offset(1).limit(2);
        assert_eq!(params.page(vec![1, 2, 3, 4]), vec![2, 3]);
        assert_eq!(SearchParams::new().page(vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn test_date_window() {
        let now = Utc::now();
        let params = SearchParams::new().from(now - Duration::hours(1)).until(now);
        assert!(params.in_window(now - Duration::minutes(5)));
        assert!(!params.in_window(now + Duration::minutes(5)));
        assert!(SearchParams::new().in_window(now));
    }

    #[test]
    fn test_status_filter() {
        let params = SearchParams::new().status(Status::Active);
        assert!(params.accepts_status(Status::Active));
        assert!(!params.accepts_status(Status::Inactive));
        assert!(SearchParams::new().accepts_status(Status::Deleted));
    }
}
