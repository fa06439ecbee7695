// Device identity & merge engine: `upsert_device` is the semantic heart of
// the system. Matching order is MAC first, then IP substring containment,
// else `IdentityUnresolved`. Field-level merge rules follow spec §4.3
// exactly: scalars only replace on a non-empty incoming value, IPs/tags
// union, device_type never downgrades from a known value, and the
// classification triple keeps whichever side has higher confidence.

pub mod hierarchy;
pub mod lost;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{ReconError, Result};
use crate::events::{EventBus, TOPIC_DEVICE_CREATED, TOPIC_DEVICE_STATUS_CHANGED};
use crate::store::Store;
use crate::types::{Device, DeviceBuilder, DeviceStatus};

/// Result of an upsert: the device's id and whether it was newly created.
pub struct UpsertOutcome {
    pub device_id: Uuid,
    pub created: bool,
}

pub async fn upsert_device(
    store: &Store,
    events: &EventBus,
    candidate: DeviceBuilder,
) -> Result<UpsertOutcome> {
    let existing = match &candidate.mac_address {
        Some(mac) if !mac.is_empty() => store.get_device_by_mac(mac).await?,
        _ => match candidate.ip_addresses.first() {
            Some(ip) => store.get_device_by_ip(ip).await?,
            None => return Err(ReconError::IdentityUnresolved),
        },
    };

    let mut conn = store.writer_guard().await;
    let now = Utc::now();

    match existing {
        None => {
            let device = Device {
                id: Uuid::new_v4(),
                mac_address: candidate.mac_address,
                ip_addresses: dedup(candidate.ip_addresses),
                hostname: candidate.hostname,
                device_type: candidate.device_type.unwrap_or_default(),
                classification_confidence: candidate.classification_confidence.unwrap_or(0),
                classification_source: candidate
                    .classification_source
                    .unwrap_or(crate::types::ClassificationSource::None),
                classification_signals: candidate.classification_signals,
                status: DeviceStatus::Online,
                first_seen: now,
                last_seen: now,
                discovery_method: candidate
                    .discovery_method
                    .unwrap_or(crate::types::DiscoveryMethod::Manual),
                agent_id: candidate.agent_id,
                manufacturer: candidate.manufacturer,
                os: candidate.os,
                location: candidate.location,
                category: candidate.category,
                primary_role: candidate.primary_role,
                owner: candidate.owner,
                notes: candidate.notes,
                tags: candidate.tags,
                custom_fields: Default::default(),
                parent_device_id: None,
                network_layer: 0,
                connection_type: crate::types::ConnectionType::Unknown,
            };
            store.insert_device(&mut conn, &device).await?;
            drop(conn);
            events.publish(TOPIC_DEVICE_CREATED, json!({"id": device.id.to_string()}));
            Ok(UpsertOutcome { device_id: device.id, created: true })
        }
        Some(mut device) => {
            let old_status = device.status;

            device.ip_addresses = dedup(device.ip_addresses.into_iter().chain(candidate.ip_addresses).collect());
            device.tags.extend(candidate.tags);

            replace_if_nonempty(&mut device.mac_address, candidate.mac_address);
            replace_if_nonempty(&mut device.manufacturer, candidate.manufacturer);
            replace_if_nonempty(&mut device.hostname, candidate.hostname);
            replace_if_nonempty(&mut device.os, candidate.os);
            replace_if_nonempty(&mut device.location, candidate.location);
            replace_if_nonempty(&mut device.category, candidate.category);
            replace_if_nonempty(&mut device.primary_role, candidate.primary_role);
            replace_if_nonempty(&mut device.owner, candidate.owner);
            replace_if_nonempty(&mut device.notes, candidate.notes);
            if let Some(dm) = candidate.discovery_method {
                device.discovery_method = dm;
            }

            if device.device_type == crate::types::DeviceType::Unknown {
                if let Some(incoming_type) = candidate.device_type {
                    if incoming_type != crate::types::DeviceType::Unknown {
                        device.device_type = incoming_type;
                    }
                }
            }

            if let Some(incoming_confidence) = candidate.classification_confidence {
                if incoming_confidence > device.classification_confidence {
                    device.classification_confidence = incoming_confidence;
                    if let Some(source) = candidate.classification_source {
                        device.classification_source = source;
                    }
                    device.classification_signals = candidate.classification_signals;
                }
            }

            device.status = DeviceStatus::Online;
            device.last_seen = now;

            store.update_device(&mut conn, &device).await?;
            if old_status != device.status {
                store
                    .record_status_change(&mut conn, device.id, old_status, device.status)
                    .await?;
            }
            drop(conn);

            if old_status != device.status {
                events.publish(
                    TOPIC_DEVICE_STATUS_CHANGED,
                    json!({"id": device.id.to_string(), "old_status": old_status.to_string(), "new_status": device.status.to_string()}),
                );
            }
            Ok(UpsertOutcome { device_id: device.id, created: false })
        }
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

fn replace_if_nonempty(existing: &mut Option<String>, incoming: Option<String>) {
    if let Some(v) = incoming {
        if !v.is_empty() {
            *existing = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceBuilder;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::connect(path.to_str().unwrap()).await.unwrap();
        store.migrate_recon().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_upsert_with_no_identity_fails() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();
        let candidate = DeviceBuilder::default();
        let err = upsert_device(&store, &events, candidate).await.unwrap_err();
        assert!(matches!(err, ReconError::IdentityUnresolved));
    }

    #[tokio::test]
    async fn test_upsert_merges_ip_by_mac() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();

        let first = DeviceBuilder::default().mac("AA:BB:CC:DD:EE:FF").ip("192.168.1.10");
        let outcome1 = upsert_device(&store, &events, first).await.unwrap();
        assert!(outcome1.created);

        let second = DeviceBuilder::default().mac("AA:BB:CC:DD:EE:FF").ip("192.168.1.20");
        let outcome2 = upsert_device(&store, &events, second).await.unwrap();
        assert!(!outcome2.created);
        assert_eq!(outcome1.device_id, outcome2.device_id);

        let device = store.get_device(outcome2.device_id).await.unwrap().unwrap();
        assert_eq!(device.ip_addresses.len(), 2);
        assert!(device.ip_addresses.contains(&"192.168.1.10".to_string()));
        assert!(device.ip_addresses.contains(&"192.168.1.20".to_string()));
    }

    #[tokio::test]
    async fn test_upsert_matches_by_ip_when_mac_absent() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();

        let first = DeviceBuilder::default().ip("10.0.0.5").hostname("host-a");
        let outcome1 = upsert_device(&store, &events, first).await.unwrap();

        let second = DeviceBuilder::default().ip("10.0.0.5").hostname("host-a-renamed");
        let outcome2 = upsert_device(&store, &events, second).await.unwrap();
        assert_eq!(outcome1.device_id, outcome2.device_id);

        let device = store.get_device(outcome2.device_id).await.unwrap().unwrap();
        assert_eq!(device.hostname, Some("host-a-renamed".to_string()));
    }
}
