// Service-movement detection: diffs the previous scan's port-to-device map
// against the current scan's, flagging a movement only when a port
// disappeared from exactly one device and appeared on exactly one other
// (spec.md §4.5). Replication (the port stays on the old device too) and
// plain disappearance (no new owner) are both excluded by construction.

use std::collections::HashMap;

use uuid::Uuid;

/// Fixed well-known TCP service names, consulted only for the record's
/// `service_name` label — the movement itself is keyed on the port number.
pub fn well_known_service_name(port: i32) -> &'static str {
    match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 => "smtp",
        53 => "dns",
        80 => "http",
        110 => "pop3",
        143 => "imap",
        161 => "snmp",
        443 => "https",
        445 => "smb",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        8080 => "http-alt",
        8291 => "mikrotik-winbox",
        8443 => "https-alt",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub port: i32,
    pub from_device_id: Uuid,
    pub to_device_id: Uuid,
}

/// `port_owners` maps a port to the set of devices observed serving it, for
/// the previous and current scan respectively. Returns one `Movement` per
/// port whose owner set changed by exactly one removal and one addition.
pub fn detect_movements(
    previous: &HashMap<i32, Vec<Uuid>>,
    current: &HashMap<i32, Vec<Uuid>>,
) -> Vec<Movement> {
    let mut movements = Vec::new();
    let mut ports: Vec<&i32> = previous.keys().chain(current.keys()).collect();
    ports.sort_unstable();
    ports.dedup();

    for port in ports {
        let before: Vec<Uuid> = previous.get(port).cloned().unwrap_or_default();
        let after: Vec<Uuid> = current.get(port).cloned().unwrap_or_default();

        let removed: Vec<Uuid> = before.iter().filter(|d| !after.contains(d)).copied().collect();
        let added: Vec<Uuid> = after.iter().filter(|d| !before.contains(d)).copied().collect();

        if removed.len() == 1 && added.len() == 1 {
            movements.push(Movement {
                port: *port,
                from_device_id: removed[0],
                to_device_id: added[0],
            });
        }
    }
    movements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_move_detected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut previous = HashMap::new();
        previous.insert(80, vec![a]);
        let mut current = HashMap::new();
        current.insert(80, vec![b]);

        let movements = detect_movements(&previous, &current);
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].from_device_id, a);
        assert_eq!(movements[0].to_device_id, b);
    }

    #[test]
    fn test_replication_is_not_a_movement() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut previous = HashMap::new();
        previous.insert(80, vec![a]);
        let mut current = HashMap::new();
        current.insert(80, vec![a, b]);

        assert!(detect_movements(&previous, &current).is_empty());
    }

    #[test]
    fn test_plain_disappearance_is_not_a_movement() {
        let a = Uuid::new_v4();
        let mut previous = HashMap::new();
        previous.insert(80, vec![a]);
        let current = HashMap::new();

        assert!(detect_movements(&previous, &current).is_empty());
    }

    #[test]
    fn test_unchanged_port_is_not_a_movement() {
        let a = Uuid::new_v4();
        let mut previous = HashMap::new();
        previous.insert(80, vec![a]);
        let current = previous.clone();

        assert!(detect_movements(&previous, &current).is_empty());
    }
}
