// Device hierarchy (parent/network-layer) operations. Cycles are avoided by
// construction: the layering algorithm only assigns `parent` where
// `layer(child) = layer(parent) + 1`, computed top-down from gateways.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;
use crate::types::TopologyLink;

/// Writes (parent_device_id, network_layer) for a single device.
pub async fn update_device_hierarchy(
    store: &Store,
    device_id: Uuid,
    parent_device_id: Option<Uuid>,
    network_layer: i32,
) -> Result<()> {
    let mut conn = store.writer_guard().await;
    store.update_hierarchy(&mut conn, device_id, parent_device_id, network_layer).await
}

/// Resets every device's inferred hierarchy, including manually-set
/// parents — the store-level SQL applies unconditionally (see
/// `Store::clear_hierarchy`).
pub async fn clear_hierarchy(store: &Store) -> Result<()> {
    store.clear_hierarchy().await
}

/// Infers layers top-down from a set of gateway devices (layer 0) and the
/// ARP/LLDP link graph: a device's layer is one more than its nearest
/// gateway-rooted parent, and `parent` is only set when that relation holds.
/// Returns the (device_id, parent, layer) assignments computed, without
/// persisting — callers pass the result to `update_device_hierarchy`.
pub fn infer_layers(gateways: &[Uuid], links: &[TopologyLink]) -> HashMap<Uuid, (Option<Uuid>, i32)> {
    let mut layer: HashMap<Uuid, (Option<Uuid>, i32)> = HashMap::new();
    for gw in gateways {
        layer.insert(*gw, (None, 0));
    }

    let mut frontier: Vec<Uuid> = gateways.to_vec();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for parent in &frontier {
            let parent_layer = layer.get(parent).map(|(_, l)| *l).unwrap_or(0);
            for link in links {
                let neighbor = if link.source_device_id == *parent {
                    Some(link.target_device_id)
                } else if link.target_device_id == *parent {
                    Some(link.source_device_id)
                } else {
                    None
                };
                if let Some(neighbor) = neighbor {
                    if !layer.contains_key(&neighbor) {
                        layer.insert(neighbor, (Some(*parent), parent_layer + 1));
                        next.push(neighbor);
                    }
                }
            }
        }
        frontier = next;
    }
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LinkType;
    use chrono::Utc;

    #[test]
    fn test_infer_layers_single_hop() {
        let gw = Uuid::new_v4();
        let child = Uuid::new_v4();
        let links = vec![TopologyLink {
            id: 1,
            source_device_id: gw,
            target_device_id: child,
            link_type: LinkType::Arp,
            last_confirmed: Utc::now(),
        }];
        let layers = infer_layers(&[gw], &links);
        assert_eq!(layers.get(&gw).unwrap().1, 0);
        assert_eq!(layers.get(&child).unwrap(), &(Some(gw), 1));
    }

    #[test]
    fn test_infer_layers_two_hops() {
        let gw = Uuid::new_v4();
        let sw = Uuid::new_v4();
        let host = Uuid::new_v4();
        let links = vec![
            TopologyLink {
                id: 1,
                source_device_id: gw,
                target_device_id: sw,
                link_type: LinkType::Arp,
                last_confirmed: Utc::now(),
            },
            TopologyLink {
                id: 2,
                source_device_id: sw,
                target_device_id: host,
                link_type: LinkType::Fdb,
                last_confirmed: Utc::now(),
            },
        ];
        let layers = infer_layers(&[gw], &links);
        assert_eq!(layers.get(&host).unwrap(), &(Some(sw), 2));
    }
}
