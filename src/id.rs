//! Identifier minting for Agents, DiSCOs, Events and resolved blank nodes.

use crate::types::Iri;
use chrono::Utc;
use eyre::Result;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default prefix of minted identifiers.
pub const DEFAULT_PREFIX: &str = "rmap:";

/// Default length of the random part of an identifier.
pub const DEFAULT_ID_LENGTH: usize = 10;

/// Mints globally unique identifiers.
pub trait IdService: Send + Sync {
    fn create_id(&self) -> Result<Iri>;

    /// Whether `id` has the shape this service mints.
    fn is_valid_id(&self, id: &Iri) -> bool;
}

/// Mints `<prefix><hex>` ids from SHA-256 of a timestamp, a counter and random bytes.
#[derive(Debug)]
pub struct RandomIdService {
    prefix: String,
    length: usize,
    counter: AtomicU64,
}

impl RandomIdService {
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            // a sha256 digest has 64 hex chars
            length: length.clamp(4, 64),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for RandomIdService {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, DEFAULT_ID_LENGTH)
    }
}

impl IdService for RandomIdService {
    fn create_id(&self) -> Result<Iri> {
        let mut hasher = Sha256::new();
        hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());
        hasher.update(self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        hasher.update(rand::rng().random::<[u8; 16]>());
        let hash = hasher.finalize();

        let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
        let id = Iri::new(format!("{}{}", self.prefix, &hex[..self.length]));
        if !self.is_valid_id(&id) {
            eyre::bail!("minted identifier {} failed validation", id);
        }
        Ok(id)
    }

    fn is_valid_id(&self, id: &Iri) -> bool {
        match id.as_str().strip_prefix(&self.prefix) {
            Some(rest) => rest.len() == self.length && rest.chars().all(|c| c.is_ascii_hexdigit()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_id_format() {
        let ids = RandomIdService::default();
        let id = ids.create_id().unwrap();
        assert!(id.as_str().starts_with("rmap:"));
        assert_eq!(id.as_str().len(), 15); // "rmap:" + 10 hex chars
    }

    #[test]
    fn test_create_id_uniqueness() {
        let ids = RandomIdService::default();
        let minted: HashSet<Iri> = (0..1000).map(|_| ids.create_id().unwrap()).collect();
        assert_eq!(minted.len(), 1000);
    }

    #[test]
    fn test_custom_prefix_and_length() {
        let ids = RandomIdService::new("https://rmap.example/", 16);
        let id = ids.create_id().unwrap();
        assert!(ids.is_valid_id(&id));
        assert_eq!(id.as_str().len(), "https://rmap.example/".len() + 16);
    }

    #[test]
    fn test_is_valid_id_rejects_foreign_ids() {
        let ids = RandomIdService::default();
        assert!(!ids.is_valid_id(&Iri::new("ark:/12345/abc")));
        assert!(!ids.is_valid_id(&Iri::new("rmap:short")));
        assert!(!ids.is_valid_id(&Iri::new("rmap:zzzzzzzzzz")));
    }
}
