//! Structural checks run on a DiSCO before it is written.

use crate::id::IdService;
use crate::model::Disco;
use crate::store::StoreError;
use crate::types::{Iri, Triple, Value};
use eyre::Result;
use std::collections::{HashMap, VecDeque};

/// Structural defects in a submitted DiSCO.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyId,
    EmptyAggregation,
    /// Related-statement nodes not reachable from any aggregated resource.
    DisconnectedGraph { unreachable: Vec<String> },
    NoAggregateReference,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyId => write!(f, "DiSCO id cannot be empty"),
            ValidationError::EmptyAggregation => write!(f, "DiSCO must aggregate at least one resource"),
            ValidationError::DisconnectedGraph { unreachable } => write!(
                f,
                "related statements are not connected to the aggregated resources: {}",
                unreachable.join(", ")
            ),
            ValidationError::NoAggregateReference => {
                write!(f, "no related statement has an aggregated resource as its subject")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

pub fn check_aggregation(disco: &Disco) -> Result<(), ValidationError> {
    if disco.id.is_empty() {
        return Err(ValidationError::EmptyId);
    }
    if disco.aggregated_resources.is_empty() {
        return Err(ValidationError::EmptyAggregation);
    }
    Ok(())
}

/// Replace every blank node in the related statements with a minted identifier.
///
/// The same label maps to the same identifier within one DiSCO. Returns the
/// label-to-identifier mapping.
pub fn resolve_blank_nodes(disco: &mut Disco, ids: &dyn IdService) -> Result<HashMap<String, Iri>> {
    let mut mapping: HashMap<String, Iri> = HashMap::new();
    let mut resolve = |value: &mut Value| -> Result<()> {
        if let Value::BlankNode(label) = value {
            let minted = match mapping.get(label.as_str()) {
                Some(iri) => iri.clone(),
                None => {
                    let iri = ids.create_id()?;
                    mapping.insert(label.clone(), iri.clone());
                    iri
                }
            };
            *value = Value::Iri(minted);
        }
        Ok(())
    };

    for stmt in disco.related_statements.iter_mut() {
        resolve(&mut stmt.subject)?;
        resolve(&mut stmt.object)?;
    }
    Ok(mapping)
}

/// Index-based undirected graph over statement terms.
#[derive(Default)]
struct Adjacency<'a> {
    index: HashMap<&'a Value, usize>,
    nodes: Vec<&'a Value>,
    edges: Vec<Vec<usize>>,
}

impl<'a> Adjacency<'a> {
    fn node(&mut self, value: &'a Value) -> usize {
        if let Some(&i) = self.index.get(value) {
            return i;
        }
        self.nodes.push(value);
        self.edges.push(Vec::new());
        let i = self.nodes.len() - 1;
        self.index.insert(value, i);
        i
    }
}

/// Every node of the related statements must be reachable, ignoring edge
/// direction, from at least one aggregated resource.
pub fn check_connectivity(disco: &Disco) -> Result<(), ValidationError> {
    if disco.related_statements.is_empty() {
        return Ok(());
    }

    let mut graph = Adjacency::default();
    for Triple { subject, object, .. } in &disco.related_statements {
        let s = graph.node(subject);
        let o = graph.node(object);
        graph.edges[s].push(o);
        graph.edges[o].push(s);
    }
    let Adjacency { nodes, edges: adjacency, .. } = graph;

    let mut visited = vec![false; nodes.len()];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.as_iri().is_some_and(|iri| disco.aggregated_resources.contains(iri)) {
            visited[i] = true;
            queue.push_back(i);
        }
    }
    while let Some(current) = queue.pop_front() {
        for &next in &adjacency[current] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }

    let unreachable: Vec<String> = nodes
        .iter()
        .zip(&visited)
        .filter(|(_, seen)| !**seen)
        .map(|(node, _)| node.to_term())
        .collect();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::DisconnectedGraph { unreachable })
    }
}

pub fn check_aggregate_reference(disco: &Disco) -> Result<(), ValidationError> {
    if disco.related_statements.is_empty() {
        return Ok(());
    }
    let referenced = disco
        .related_statements
        .iter()
        .any(|t| t.subject.as_iri().is_some_and(|s| disco.aggregated_resources.contains(s)));
    if referenced {
        Ok(())
    } else {
        Err(ValidationError::NoAggregateReference)
    }
}

/// Run every structural check, resolving blank nodes in place first.
pub fn validate_disco(disco: &mut Disco, ids: &dyn IdService) -> Result<()> {
    let invalid = |e: ValidationError| eyre::eyre!(StoreError::Validation(e));
    check_aggregation(disco).map_err(invalid)?;
    resolve_blank_nodes(disco, ids)?;
    check_connectivity(disco).map_err(invalid)?;
    check_aggregate_reference(disco).map_err(invalid)?;
    Ok(())
}
