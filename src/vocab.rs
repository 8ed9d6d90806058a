//! Vocabulary IRIs used by the object and event encodings.

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const ORE_AGGREGATES: &str = "http://www.openarchives.org/ore/terms/aggregates";
pub const DC_DESCRIPTION: &str = "http://purl.org/dc/elements/1.1/description";
pub const DCTERMS_CREATOR: &str = "http://purl.org/dc/terms/creator";
pub const FOAF_NAME: &str = "http://xmlns.com/foaf/0.1/name";

// Object classes
pub const RMAP_DISCO: &str = "http://purl.org/ontology/rmap#DiSCO";
pub const RMAP_AGENT: &str = "http://purl.org/ontology/rmap#Agent";
pub const RMAP_EVENT: &str = "http://purl.org/ontology/rmap#Event";

// Event descriptors
pub const RMAP_EVENT_TYPE: &str = "http://purl.org/ontology/rmap#eventType";
pub const RMAP_EVENT_TARGET_TYPE: &str = "http://purl.org/ontology/rmap#eventTargetType";
pub const RMAP_LINEAGE_PROGENITOR: &str = "http://purl.org/ontology/rmap#lineageProgenitor";

// Event type values
pub const RMAP_CREATION: &str = "http://purl.org/ontology/rmap#creation";
pub const RMAP_UPDATE: &str = "http://purl.org/ontology/rmap#update";
pub const RMAP_DERIVATION: &str = "http://purl.org/ontology/rmap#derivation";
pub const RMAP_INACTIVATION: &str = "http://purl.org/ontology/rmap#inactivation";
pub const RMAP_TOMBSTONE: &str = "http://purl.org/ontology/rmap#tombstone";
pub const RMAP_DELETION: &str = "http://purl.org/ontology/rmap#deletion";
pub const RMAP_REPLACE: &str = "http://purl.org/ontology/rmap#replace";

// Event relationship predicates
pub const RMAP_DERIVED_OBJECT: &str = "http://purl.org/ontology/rmap#derivedObject";
pub const RMAP_HAS_SOURCE_OBJECT: &str = "http://purl.org/ontology/rmap#hasSourceObject";
pub const RMAP_INACTIVATED_OBJECT: &str = "http://purl.org/ontology/rmap#inactivatedObject";
pub const RMAP_TOMBSTONED_OBJECT: &str = "http://purl.org/ontology/rmap#tombstonedObject";
pub const RMAP_DELETED_OBJECT: &str = "http://purl.org/ontology/rmap#deletedObject";
pub const RMAP_UPDATED_OBJECT: &str = "http://purl.org/ontology/rmap#updatedObject";

// Agent and DiSCO fields
pub const RMAP_IDENTITY_PROVIDER: &str = "http://purl.org/ontology/rmap#identityProvider";
pub const RMAP_USER_AUTH_ID: &str = "http://purl.org/ontology/rmap#userAuthId";
pub const RMAP_PROVIDER_ID: &str = "http://purl.org/ontology/rmap#providerId";

// PROV-O
pub const PROV_STARTED_AT_TIME: &str = "http://www.w3.org/ns/prov#startedAtTime";
pub const PROV_ENDED_AT_TIME: &str = "http://www.w3.org/ns/prov#endedAtTime";
pub const PROV_WAS_ASSOCIATED_WITH: &str = "http://www.w3.org/ns/prov#wasAssociatedWith";
pub const PROV_WAS_GENERATED_BY: &str = "http://www.w3.org/ns/prov#wasGeneratedBy";
pub const PROV_GENERATED: &str = "http://www.w3.org/ns/prov#generated";
pub const PROV_USED: &str = "http://www.w3.org/ns/prov#used";

/// Predicates an Event uses to point at a DiSCO it touched.
pub const DISCO_EVENT_PREDICATES: [&str; 6] = [
    RMAP_DELETED_OBJECT,
    RMAP_TOMBSTONED_OBJECT,
    RMAP_INACTIVATED_OBJECT,
    RMAP_DERIVED_OBJECT,
    RMAP_HAS_SOURCE_OBJECT,
    PROV_GENERATED,
];

/// Predicates an Event uses to point at an Agent it touched.
pub const AGENT_EVENT_PREDICATES: [&str; 4] = [
    RMAP_DELETED_OBJECT,
    RMAP_TOMBSTONED_OBJECT,
    RMAP_UPDATED_OBJECT,
    PROV_GENERATED,
];
