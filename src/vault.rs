// Credential vault abstraction. The classifier and collectors never see
// credential material directly; they type-assert required fields out of the
// decrypted map this trait returns, per credential id.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{ReconError, Result};

#[async_trait]
pub trait CredentialVault: Send + Sync {
    async fn fetch(&self, credential_id: &str) -> Result<HashMap<String, String>>;
}

/// Fetches a required field from a decrypted credential map, mapping a miss
/// to the collector-protocol error the SNMP client is expected to raise.
pub fn require_field<'a>(
    map: &'a HashMap<String, String>,
    credential_id: &str,
    field: &'static str,
) -> Result<&'a str> {
    map.get(field).map(String::as_str).ok_or_else(|| ReconError::MissingCredentialField {
        credential_id: credential_id.to_string(),
        field,
    })
}

/// In-memory vault good enough to exercise the core end to end; a real
/// deployment backs this with an encrypted store.
#[derive(Default)]
pub struct InMemoryVault {
    credentials: DashMap<String, HashMap<String, String>>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        InMemoryVault::default()
    }

    pub fn insert(&self, credential_id: impl Into<String>, fields: HashMap<String, String>) {
        self.credentials.insert(credential_id.into(), fields);
    }
}

#[async_trait]
impl CredentialVault for InMemoryVault {
    async fn fetch(&self, credential_id: &str) -> Result<HashMap<String, String>> {
        self.credentials
            .get(credential_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ReconError::MissingCredentialField {
                credential_id: credential_id.to_string(),
                field: "credential_id",
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_missing_credential() {
        let vault = InMemoryVault::new();
        let err = vault.fetch("nope").await.unwrap_err();
        assert!(matches!(err, ReconError::MissingCredentialField { .. }));
    }

    #[tokio::test]
    async fn test_fetch_and_require_field() {
        let vault = InMemoryVault::new();
        let mut fields = HashMap::new();
        fields.insert("community".to_string(), "public".to_string());
        vault.insert("snmp-default", fields);

        let map = vault.fetch("snmp-default").await.unwrap();
        let community = require_field(&map, "snmp-default", "community").unwrap();
        assert_eq!(community, "public");

        let err = require_field(&map, "snmp-default", "auth_key").unwrap_err();
        assert!(matches!(err, ReconError::MissingCredentialField { .. }));
    }
}
