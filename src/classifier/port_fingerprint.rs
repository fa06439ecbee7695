// Port fingerprint: a priority-ordered rule list evaluated against a host's
// open-port set (spec.md §6). Each rule names required ports (all must be
// present) and, optionally, optional ports (at least one must match). The
// first matching rule wins.

use std::collections::HashSet;

use crate::types::DeviceType;

struct Rule {
    required: &'static [u16],
    optional: &'static [u16],
    device_type: DeviceType,
}

const RULES: &[Rule] = &[
    Rule { required: &[22, 80, 8443], optional: &[], device_type: DeviceType::Switch }, // UniFi
    Rule { required: &[80, 8291], optional: &[], device_type: DeviceType::Router }, // MikroTik
    Rule { required: &[22, 23, 80], optional: &[], device_type: DeviceType::Switch }, // Cisco-like
    Rule { required: &[22, 80], optional: &[161, 443], device_type: DeviceType::Switch },
    Rule { required: &[22, 80], optional: &[], device_type: DeviceType::Switch }, // generic managed
    Rule { required: &[80, 443], optional: &[], device_type: DeviceType::Router }, // consumer
    Rule { required: &[22], optional: &[161], device_type: DeviceType::Switch }, // SSH-managed w/ SNMP
];

/// Evaluates `open_ports` against the rule list in priority order. The
/// first rule whose `required` set is fully present, and whose `optional`
/// set (if non-empty) has at least one match, wins. No match yields `None`
/// (the caller maps that to `unknown`).
pub fn classify_ports(open_ports: &[u16]) -> Option<DeviceType> {
    let ports: HashSet<u16> = open_ports.iter().copied().collect();
    for rule in RULES {
        let required_ok = rule.required.iter().all(|p| ports.contains(p));
        if !required_ok {
            continue;
        }
        let optional_ok = rule.optional.is_empty() || rule.optional.iter().any(|p| ports.contains(p));
        if optional_ok {
            return Some(rule.device_type);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unifi_rule_wins_before_generic_managed() {
        assert_eq!(classify_ports(&[22, 80, 8443]), Some(DeviceType::Switch));
    }

    #[test]
    fn test_mikrotik_rule() {
        assert_eq!(classify_ports(&[80, 8291]), Some(DeviceType::Router));
    }

    #[test]
    fn test_optional_port_requirement() {
        assert_eq!(classify_ports(&[22, 80, 161]), Some(DeviceType::Switch));
        assert_eq!(classify_ports(&[22, 80]), Some(DeviceType::Switch)); // falls to generic managed rule
    }

    #[test]
    fn test_consumer_router_rule() {
        assert_eq!(classify_ports(&[80, 443]), Some(DeviceType::Router));
    }

    #[test]
    fn test_no_match_is_none() {
        assert_eq!(classify_ports(&[3389]), None);
    }
}
