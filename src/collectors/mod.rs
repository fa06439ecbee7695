// Collectors: independent probe drivers producing typed observation sets.
// Each collector exposes `{available() -> bool, enumerate(..) -> Vec<Obs>}`
// (spec.md §9 "Polymorphic collectors"); platform-absent collectors return
// `available = false` and an empty set rather than an error.

pub mod arp;
pub mod icmp;
pub mod lldp;
pub mod mdns_upnp;
pub mod portscan;
pub mod proxmox;
pub mod snmp;
pub mod wifi;

/// The fixed TCP probe set the port scanner and fingerprinter agree on
/// (spec.md §4.2/§6).
pub const PROBE_PORTS: &[u16] = &[22, 23, 80, 161, 443, 8080, 8291, 8443];
