// Composite classifier: fuses independent signals (OUI, sysDescr,
// sysServices, BRIDGE-MIB, LLDP capabilities, port fingerprint, TTL, manual
// override) into a single `(device_type, confidence, primary_source,
// signals)`. Pure function, no I/O, no side effects — every input arrives
// pre-collected via `ClassifierInput`.

pub mod oui;
pub mod port_fingerprint;
pub mod sys_descr;

use crate::types::{ClassificationSignal, ClassificationSource, DeviceType, device_type_rank};

/// Bitmask values from the SNMP `sysServices` object (RFC 1213 §6, applied
/// bit-for-bit): bit 0x02 = layer 2 (a repeater/bridge implements it), bit
/// 0x04 = layer 3 (a router implements it).
pub const SYS_SERVICES_L2: u32 = 0x02;
pub const SYS_SERVICES_L3: u32 = 0x04;

/// LLDP `capEnabled`/`capSupported` bitmap bits, per spec.md §4.2.
pub const LLDP_CAP_ROUTER: u16 = 0x10;
pub const LLDP_CAP_ACCESS_POINT: u16 = 0x08;
pub const LLDP_CAP_SWITCH: u16 = 0x04;
pub const LLDP_CAP_DESKTOP: u16 = 0x80;

/// Every independently-observable signal the classifier can fuse. Absent
/// fields simply don't fire; nothing here performs I/O.
#[derive(Debug, Clone, Default)]
pub struct ClassifierInput {
    /// A non-`unknown` operator-set type short-circuits everything else.
    pub manual_type: Option<DeviceType>,

    pub manufacturer: Option<String>,

    pub bridge_mib_address: Option<String>,
    pub bridge_mib_num_ports: Option<u32>,

    pub sys_services: Option<u32>,
    pub sys_descr: Option<String>,

    pub lldp_cap_enabled: Option<u16>,

    pub open_ports: Vec<u16>,

    pub ttl: Option<u8>,

    pub upnp_device_type: Option<String>,
    pub mdns_service: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub device_type: DeviceType,
    pub confidence: u8,
    pub primary_source: ClassificationSource,
    pub signals: Vec<ClassificationSignal>,
}

/// Runs the full fusion algorithm described in spec.md §4.4.
pub fn classify(input: &ClassifierInput) -> Classification {
    if let Some(manual) = input.manual_type {
        if manual != DeviceType::Unknown {
            return Classification {
                device_type: manual,
                confidence: 100,
                primary_source: ClassificationSource::Manual,
                signals: vec![ClassificationSignal {
                    source: ClassificationSource::Manual,
                    device_type: manual,
                    weight: 100,
                    detail: "manually set device type".to_string(),
                }],
            };
        }
    }

    let mut signals = Vec::new();

    if let Some(t) = lldp_signal(input.lldp_cap_enabled) {
        signals.push(t);
    }
    if let Some(t) = bridge_mib_signal(input) {
        signals.push(t);
    }
    if let Some(t) = sys_services_signal(input.sys_services) {
        signals.push(t);
    }
    if let Some(manufacturer) = &input.manufacturer {
        if let Some(class) = oui::classify_vendor(manufacturer) {
            signals.push(ClassificationSignal {
                source: ClassificationSource::OuiVendor,
                device_type: class,
                weight: 25,
                detail: format!("OUI vendor '{manufacturer}' resolves to {class}"),
            });
        }
    }
    if let Some(urn) = &input.upnp_device_type {
        if let Some(class) = upnp_device_class(urn) {
            signals.push(ClassificationSignal {
                source: ClassificationSource::UpnpDeviceType,
                device_type: class,
                weight: 25,
                detail: format!("UPnP device type '{urn}'"),
            });
        }
    }
    if let Some(service) = &input.mdns_service {
        if let Some(class) = mdns_service_class(service) {
            signals.push(ClassificationSignal {
                source: ClassificationSource::MdnsService,
                device_type: class,
                weight: 20,
                detail: format!("mDNS service '{service}'"),
            });
        }
    }
    if !input.open_ports.is_empty() {
        if let Some(class) = port_fingerprint::classify_ports(&input.open_ports) {
            signals.push(ClassificationSignal {
                source: ClassificationSource::PortFingerprint,
                device_type: class,
                weight: 15,
                detail: format!("open ports {:?} match a fingerprint", input.open_ports),
            });
        }
    }
    if input.ttl == Some(255) {
        signals.push(ClassificationSignal {
            source: ClassificationSource::TtlHint,
            device_type: DeviceType::Router,
            weight: 10,
            detail: "TTL=255".to_string(),
        });
    }
    if let Some(descr) = &input.sys_descr {
        if let Some(class) = sys_descr::classify_keyword(descr) {
            signals.push(ClassificationSignal {
                source: ClassificationSource::SnmpSysDescr,
                device_type: class,
                weight: 10,
                detail: format!("sysDescr keyword match in '{descr}'"),
            });
        }
    }

    fuse(signals)
}

fn lldp_signal(cap_enabled: Option<u16>) -> Option<ClassificationSignal> {
    let caps = cap_enabled?;
    // Priority order per spec.md §4.2: Router, AccessPoint, Switch, Desktop.
    let (device_type, bit) = if caps & LLDP_CAP_ROUTER != 0 {
        (DeviceType::Router, LLDP_CAP_ROUTER)
    } else if caps & LLDP_CAP_ACCESS_POINT != 0 {
        (DeviceType::AccessPoint, LLDP_CAP_ACCESS_POINT)
    } else if caps & LLDP_CAP_SWITCH != 0 {
        (DeviceType::Switch, LLDP_CAP_SWITCH)
    } else if caps & LLDP_CAP_DESKTOP != 0 {
        (DeviceType::Desktop, LLDP_CAP_DESKTOP)
    } else {
        return None;
    };
    Some(ClassificationSignal {
        source: ClassificationSource::LldpCaps,
        device_type,
        weight: 40,
        detail: format!("LLDP capability bit 0x{bit:02x}"),
    })
}

/// BRIDGE-MIB present (non-empty base bridge address, or more than one
/// port) signals a bridge. When combined with an L3 `sysServices` bit, the
/// device is a router (it both bridges and routes); otherwise a switch.
fn bridge_mib_signal(input: &ClassifierInput) -> Option<ClassificationSignal> {
    let present = input
        .bridge_mib_address
        .as_ref()
        .map(|a| !a.is_empty())
        .unwrap_or(false)
        || input.bridge_mib_num_ports.map(|n| n > 1).unwrap_or(false);
    if !present {
        return None;
    }
    let l3 = input.sys_services.map(|s| s & SYS_SERVICES_L3 != 0).unwrap_or(false);
    let device_type = if l3 { DeviceType::Router } else { DeviceType::Switch };
    Some(ClassificationSignal {
        source: ClassificationSource::SnmpBridgeMib,
        device_type,
        weight: 35,
        detail: "BRIDGE-MIB present".to_string(),
    })
}

fn sys_services_signal(sys_services: Option<u32>) -> Option<ClassificationSignal> {
    let bits = sys_services?;
    let l3 = bits & SYS_SERVICES_L3 != 0;
    let l2 = bits & SYS_SERVICES_L2 != 0;
    let device_type = if l3 && !l2 {
        DeviceType::Router
    } else if l2 {
        DeviceType::Switch
    } else {
        return None;
    };
    Some(ClassificationSignal {
        source: ClassificationSource::SnmpSysServices,
        device_type,
        weight: 30,
        detail: format!("sysServices bitmask 0x{bits:02x}"),
    })
}

fn upnp_device_class(urn: &str) -> Option<DeviceType> {
    let urn = urn.to_ascii_lowercase();
    if urn.contains("internetgatewaydevice") {
        Some(DeviceType::Router)
    } else if urn.contains("mediarenderer") || urn.contains("mediaserver") {
        Some(DeviceType::Iot)
    } else if urn.contains("printer") {
        Some(DeviceType::Printer)
    } else if urn.contains("camera") {
        Some(DeviceType::Camera)
    } else {
        None
    }
}

fn mdns_service_class(service: &str) -> Option<DeviceType> {
    let s = service.to_ascii_lowercase();
    if s.contains("_printer") || s.contains("_ipp") || s.contains("_pdl-datastream") {
        Some(DeviceType::Printer)
    } else if s.contains("_airplay") || s.contains("_raop") {
        Some(DeviceType::Desktop)
    } else if s.contains("_homekit") || s.contains("_hap") {
        Some(DeviceType::Iot)
    } else if s.contains("_googlecast") {
        Some(DeviceType::Iot)
    } else {
        None
    }
}

/// Sums the weights of supporting signals per candidate device type, picks
/// the highest aggregate, breaks ties deterministically by `DeviceType`
/// rank (REDESIGN FLAG: the source iterates an unordered map and produces a
/// non-deterministic tie-break; this implementation sorts instead), clamps
/// confidence to `[0, 100]`, and returns the signal list sorted by weight
/// descending.
fn fuse(mut signals: Vec<ClassificationSignal>) -> Classification {
    signals.sort_by(|a, b| b.weight.cmp(&a.weight));

    if signals.is_empty() {
        return Classification {
            device_type: DeviceType::Unknown,
            confidence: 0,
            primary_source: ClassificationSource::None,
            signals,
        };
    }

    use std::collections::HashMap;
    let mut totals: HashMap<DeviceType, u32> = HashMap::new();
    for s in &signals {
        *totals.entry(s.device_type).or_insert(0) += s.weight;
    }

    let winner = totals
        .into_iter()
        .max_by(|(ta, wa), (tb, wb)| {
            wa.cmp(wb).then_with(|| device_type_rank(*tb).cmp(&device_type_rank(*ta)))
        })
        .map(|(t, w)| (t, w))
        .unwrap();

    let (device_type, aggregate) = winner;
    let confidence = aggregate.min(100) as u8;

    let primary_source = signals
        .iter()
        .filter(|s| s.device_type == device_type)
        .max_by_key(|s| s.weight)
        .map(|s| s.source)
        .unwrap_or(ClassificationSource::None);

    Classification {
        device_type,
        confidence,
        primary_source,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_override_is_exclusive() {
        let input = ClassifierInput {
            manual_type: Some(DeviceType::Nas),
            sys_services: Some(SYS_SERVICES_L2 | SYS_SERVICES_L3),
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.device_type, DeviceType::Nas);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.primary_source, ClassificationSource::Manual);
        assert_eq!(result.signals.len(), 1);
    }

    #[test]
    fn test_no_signals_is_unknown() {
        let result = classify(&ClassifierInput::default());
        assert_eq!(result.device_type, DeviceType::Unknown);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.primary_source, ClassificationSource::None);
    }

    #[test]
    fn test_bridge_mib_and_l3_sys_services_is_router() {
        let input = ClassifierInput {
            bridge_mib_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            sys_services: Some(SYS_SERVICES_L3),
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.device_type, DeviceType::Router);
    }

    #[test]
    fn test_bridge_mib_without_l3_is_switch() {
        let input = ClassifierInput {
            bridge_mib_num_ports: Some(24),
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.device_type, DeviceType::Switch);
    }

    #[test]
    fn test_ttl_255_is_a_boost_not_sole_determinant() {
        let input = ClassifierInput { ttl: Some(255), ..Default::default() };
        let result = classify(&input);
        assert_eq!(result.device_type, DeviceType::Router);
        assert_eq!(result.confidence, 10);
        assert_eq!(result.primary_source, ClassificationSource::TtlHint);
    }

    /// Seed test 8 from spec.md §8: OUI=Switch(25), BRIDGE-MIB-Switch(35),
    /// sysServices L2=Switch(30), LLDP=Switch(40), Port=Switch(15). Aggregate
    /// = 145, clamped to 100; primary_source = lldp_caps.
    #[test]
    fn test_classifier_fusion_seed_scenario() {
        let input = ClassifierInput {
            manufacturer: Some("Cisco Systems".to_string()),
            bridge_mib_num_ports: Some(48),
            sys_services: Some(SYS_SERVICES_L2),
            lldp_cap_enabled: Some(LLDP_CAP_SWITCH),
            open_ports: vec![22, 80, 8443],
            ..Default::default()
        };
        let result = classify(&input);
        assert_eq!(result.device_type, DeviceType::Switch);
        assert_eq!(result.confidence, 100);
        assert_eq!(result.primary_source, ClassificationSource::LldpCaps);
        // sorted by weight descending
        for pair in result.signals.windows(2) {
            assert!(pair[0].weight >= pair[1].weight);
        }
    }

    #[test]
    fn test_signals_sorted_by_weight_descending() {
        let input = ClassifierInput {
            ttl: Some(255),
            sys_services: Some(SYS_SERVICES_L2),
            ..Default::default()
        };
        let result = classify(&input);
        for pair in result.signals.windows(2) {
            assert!(pair[0].weight >= pair[1].weight);
        }
    }
}
