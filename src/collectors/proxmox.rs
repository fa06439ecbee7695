// Proxmox VE collector: polls a cluster node's REST API for VM/LXC
// inventory. Every endpoint response is wrapped in a `{"data": ...}`
// envelope (the PVE API convention); authentication is via API token
// rather than a ticket/cookie, since tokens don't need renewal.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ReconError, Result};

#[derive(Debug, Clone)]
pub struct ProxmoxCredential {
    pub token_id: String,
    pub token_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskType {
    Ssd,
    Hdd,
    Nvme,
    Unknown,
}

/// Maps the PVE `type` field on a storage volume to the coarse disk type
/// the hardware profile stores (spec.md §4.2): anything outside the three
/// recognized spellings is `Unknown` rather than an error.
pub fn classify_disk_type(raw: &str) -> DiskType {
    match raw.to_ascii_lowercase().as_str() {
        "ssd" => DiskType::Ssd,
        "hdd" => DiskType::Hdd,
        "nvme" => DiskType::Nvme,
        _ => DiskType::Unknown,
    }
}

#[derive(Debug, Clone, Default)]
pub struct VmResource {
    pub vmid: u32,
    pub name: Option<String>,
    pub status: String,
    pub node: String,
    pub cpu_fraction: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub mem_bytes: Option<u64>,
    pub disk_mb: Option<u64>,
    pub disk_gb: Option<f64>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ClusterResource {
    #[serde(default)]
    vmid: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    node: Option<String>,
    #[serde(rename = "type", default)]
    resource_type: Option<String>,
    #[serde(default)]
    cpu: Option<f64>,
    #[serde(default)]
    maxmem: Option<u64>,
    #[serde(default)]
    maxdisk: Option<u64>,
}

pub struct ProxmoxClient {
    client: Client,
    base_url: String,
    token_header: String,
}

impl ProxmoxClient {
    /// Builds a client that trusts self-signed node certificates — the
    /// overwhelming default for small PVE clusters that never provision a
    /// CA-signed cert for the management interface.
    pub fn new(base_url: impl Into<String>, credential: ProxmoxCredential, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ReconError::CollectorProtocol {
                collector: "proxmox",
                target: "client".to_string(),
                detail: e.to_string(),
            })?;
        Ok(ProxmoxClient {
            client,
            base_url: base_url.into(),
            token_header: format!("PVEAPIToken={}={}", credential.token_id, credential.token_secret),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.token_header)
            .send()
            .await
            .map_err(|e| ReconError::CollectorTimeout {
                collector: "proxmox",
                target: url.clone(),
            }.with_detail(e))?;

        if !response.status().is_success() {
            return Err(ReconError::CollectorProtocol {
                collector: "proxmox",
                target: url,
                detail: format!("unexpected status {}", response.status()),
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| ReconError::CollectorProtocol {
            collector: "proxmox",
            target: url,
            detail: format!("decoding response: {e}"),
        })?;
        Ok(envelope.data)
    }

    /// Lists every VM/LXC resource visible cluster-wide via
    /// `/cluster/resources?type=vm`.
    pub async fn list_vms(&self) -> Result<Vec<VmResource>> {
        let raw: Vec<ClusterResource> = self.get("/api2/json/cluster/resources?type=vm").await?;
        Ok(raw
            .into_iter()
            .filter(|r| r.resource_type.as_deref() != Some("qemu") || r.vmid.is_some())
            .map(|r| {
                let cpu_fraction = r.cpu;
                VmResource {
                    vmid: r.vmid.unwrap_or(0),
                    name: r.name,
                    status: r.status.unwrap_or_else(|| "unknown".to_string()),
                    node: r.node.unwrap_or_default(),
                    cpu_fraction,
                    cpu_percent: cpu_fraction.map(|f| f * 100.0),
                    mem_bytes: r.maxmem,
                    disk_mb: r.maxdisk.map(|b| b / (1024 * 1024)),
                    disk_gb: r.maxdisk.map(|b| b as f64 / (1024.0 * 1024.0 * 1024.0)),
                }
            })
            .collect())
    }

    /// Best-effort: a cluster/node that can't be reached yields an empty
    /// inventory rather than failing the enclosing sweep.
    pub async fn list_vms_lenient(&self) -> Vec<VmResource> {
        match self.list_vms().await {
            Ok(vms) => vms,
            Err(e) => {
                warn!(error = %e, "proxmox inventory unavailable");
                Vec::new()
            }
        }
    }
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
    fn test_classify_disk_type() {
        assert_eq!(classify_disk_type("ssd"), DiskType::Ssd);
        assert_eq!(classify_disk_type("SSD"), DiskType::Ssd);
        assert_eq!(classify_disk_type("hdd"), DiskType::Hdd);
        assert_eq!(classify_disk_type("nvme"), DiskType::Nvme);
        assert_eq!(classify_disk_type("ramdisk"), DiskType::Unknown);
    }

    #[test]
    fn test_disk_byte_truncation() {
        let bytes: u64 = 5 * 1024 * 1024 * 1024 + 500;
        let mb = bytes / (1024 * 1024);
        let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        assert_eq!(mb, 5120);
        assert!((gb - 5.0004).abs() < 0.001);
    }

    #[test]
    fn test_cpu_fraction_to_percentage() {
        let fraction = 0.37_f64;
        assert!((fraction * 100.0 - 37.0).abs() < f64::EPSILON);
    }
}
