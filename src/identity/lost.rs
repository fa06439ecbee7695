// Lost-device detector: a periodic sweep that marks devices offline once
// they've gone quiet for longer than `device_lost_after`, driven by the
// orchestrator's background ticker at one-quarter of that interval.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::events::{EventBus, TOPIC_DEVICE_LOST};
use crate::store::Store;
use crate::types::DeviceStatus;

/// Marks every online device whose `last_seen` predates `now - lost_after`
/// as offline, recording a history row and publishing `device.lost` for
/// each. Returns the ids of devices marked lost.
pub async fn sweep_lost_devices(
    store: &Store,
    events: &EventBus,
    lost_after: Duration,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let cutoff = now - lost_after;
    let online = store.list_devices_by_status(DeviceStatus::Online).await?;
    let mut lost = Vec::new();

    for device in online {
        if device.last_seen >= cutoff {
            continue;
        }
        let mut conn = store.writer_guard().await;
        let mut updated = device.clone();
        updated.status = DeviceStatus::Offline;
        store.update_device(&mut conn, &updated).await?;
        store
            .record_status_change(&mut conn, device.id, device.status, updated.status)
            .await?;
        drop(conn);

        events.publish(TOPIC_DEVICE_LOST, json!({"id": device.id.to_string()}));
        debug!(device_id = %device.id, last_seen = %device.last_seen, "device marked lost");
        lost.push(device.id);
    }
    Ok(lost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::upsert_device;
    use crate::types::DeviceBuilder;

    async fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::connect(path.to_str().unwrap()).await.unwrap();
        store.migrate_recon().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_device_offline() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();

        let candidate = DeviceBuilder::default().mac("AA:AA:AA:AA:AA:01").ip("10.0.0.1");
        let outcome = upsert_device(&store, &events, candidate).await.unwrap();

        // Backdate last_seen beyond the lost-after window.
        let mut device = store.get_device(outcome.device_id).await.unwrap().unwrap();
        device.last_seen = Utc::now() - Duration::hours(2);
        let mut conn = store.writer_guard().await;
        store.update_device(&mut conn, &device).await.unwrap();
        drop(conn);

        let lost = sweep_lost_devices(&store, &events, Duration::hours(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(lost, vec![outcome.device_id]);

        let refreshed = store.get_device(outcome.device_id).await.unwrap().unwrap();
        assert_eq!(refreshed.status, DeviceStatus::Offline);

        let history = store.list_history_for_device(outcome.device_id).await.unwrap();
        assert!(history.iter().any(|h| h.new_status == DeviceStatus::Offline));
    }

    #[tokio::test]
    async fn test_sweep_leaves_recent_devices_online() {
        let (_dir, store) = temp_store().await;
        let events = EventBus::new();
        let candidate = DeviceBuilder::default().mac("AA:AA:AA:AA:AA:02").ip("10.0.0.2");
        let outcome = upsert_device(&store, &events, candidate).await.unwrap();

        let lost = sweep_lost_devices(&store, &events, Duration::hours(1), Utc::now())
            .await
            .unwrap();
        assert!(lost.is_empty());

        let device = store.get_device(outcome.device_id).await.unwrap().unwrap();
        assert_eq!(device.status, DeviceStatus::Online);
    }
}
