// Scan Orchestrator: drives the three-phase sweep -> enrich -> post-process
// pipeline, the lost-device checker, the metrics rollup loop and the
// supplemented scheduler. This is the component that ties every other
// module (collectors, identity, classifier, store) together into one scan.

pub mod cancellation;
pub mod services;
pub mod subnet;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Timelike, Utc};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::classifier::{self, ClassifierInput};
use crate::collectors::{self, arp, icmp, lldp, mdns_upnp, portscan, proxmox, snmp};
use crate::config::Config;
use crate::error::{ReconError, Result};
use crate::events::{EventBus, TOPIC_SCAN_COMPLETED, TOPIC_SCAN_FAILED, TOPIC_SCAN_STARTED, TOPIC_SERVICE_MOVEMENT_DETECTED};
use crate::identity::{self, lost::sweep_lost_devices};
use crate::store::hardware::ServiceRecord;
use crate::store::Store;
use crate::types::{DeviceBuilder, DeviceType, LinkType, ScanStatus};
use crate::vault::CredentialVault;

pub use cancellation::CancellationToken;

pub struct Orchestrator {
    store: Store,
    events: EventBus,
    vault: Arc<dyn CredentialVault>,
    config: Config,
}

/// Everything learned about one alive host during the enrich phase, carried
/// forward into post-process so classification and topology don't have to
/// re-probe anything.
struct HostEnrichment {
    ip: Ipv4Addr,
    device_id: Uuid,
    mac: Option<String>,
    ttl: Option<u8>,
    manufacturer: Option<String>,
    classifier_input: ClassifierInput,
    open_ports: Vec<i32>,
    bridge_ports: Vec<(String, u32)>,
    lldp_neighbors: Vec<lldp::LldpNeighbor>,
    is_bridge: bool,
}

impl Orchestrator {
    pub fn new(store: Store, events: EventBus, vault: Arc<dyn CredentialVault>, config: Config) -> Self {
        Orchestrator { store, events, vault, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// `RunScan(subnet, options) -> ScanResult`. Creates the scan row,
    /// drives the three phases under `cancel`, and always leaves the scan
    /// in `completed` or `failed` with the appropriate fields set.
    #[instrument(skip(self, cancel), fields(subnet = %subnet))]
    pub async fn run_scan(&self, subnet: &str, cancel: CancellationToken) -> Result<crate::types::ScanResult> {
        let scan = self.store.create_scan(subnet).await?;
        self.events.publish(TOPIC_SCAN_STARTED, json!({"scan_id": scan.id.to_string(), "subnet": subnet}));

        match self.run_scan_inner(subnet, scan.id, &cancel).await {
            Ok((total, online)) => {
                self.store.finish_scan(scan.id, ScanStatus::Completed, total, online, None).await?;
                self.events.publish(TOPIC_SCAN_COMPLETED, json!({"scan_id": scan.id.to_string(), "total": total, "online": online}));
                Ok(crate::types::ScanResult {
                    id: scan.id,
                    subnet: scan.subnet,
                    started_at: scan.started_at,
                    ended_at: Some(Utc::now()),
                    status: ScanStatus::Completed,
                    total,
                    online,
                    error_msg: None,
                })
            }
            Err(e) => {
                let msg = e.to_string();
                self.store.finish_scan(scan.id, ScanStatus::Failed, 0, 0, Some(&msg)).await?;
                self.events.publish(TOPIC_SCAN_FAILED, json!({"scan_id": scan.id.to_string(), "error": msg}));
                Err(e)
            }
        }
    }

    async fn run_scan_inner(
        &self,
        subnet: &str,
        scan_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(i32, i32)> {
        let started = std::time::Instant::now();

        let hosts = subnet::hosts_in_subnet(subnet)?;
        let hosts_scanned = hosts.len() as i32;
        let (alive, ping_elapsed) = self.sweep(hosts, cancel).await?;
        let hosts_alive = alive.len() as i32;
        info!(alive = alive.len(), "sweep phase complete");

        let (enrichment, enrich_elapsed, devices_created, devices_updated) =
            self.enrich(alive, scan_id, cancel).await?;
        info!(enriched = enrichment.len(), "enrich phase complete");

        let post_process_start = std::time::Instant::now();
        let movements = self.post_process(&enrichment, scan_id).await?;
        let post_process_elapsed = post_process_start.elapsed();

        for m in &movements {
            self.events.publish(
                TOPIC_SERVICE_MOVEMENT_DETECTED,
                json!({"port": m.port, "from_device_id": m.from_device_id.to_string(), "to_device_id": m.to_device_id.to_string()}),
            );
        }

        let total = enrichment.len() as i32;
        let online = enrichment.len() as i32;

        self.store
            .record_scan_metrics(&crate::types::ScanMetrics {
                id: 0,
                scan_id,
                duration_ms: started.elapsed().as_millis() as i64,
                ping_ms: ping_elapsed.as_millis() as i64,
                enrich_ms: enrich_elapsed.as_millis() as i64,
                post_process_ms: post_process_elapsed.as_millis() as i64,
                hosts_scanned,
                hosts_alive,
                devices_created,
                devices_updated,
                created_at: Utc::now(),
            })
            .await?;

        Ok((total, online))
    }

    /// Phase 1: ICMP-probe every host under the configured semaphore.
    async fn sweep(
        &self,
        hosts: Vec<Ipv4Addr>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<icmp::PingResult>, Duration)> {
        if cancel.is_cancelled() {
            return Err(ReconError::Cancelled);
        }
        let start = std::time::Instant::now();
        let results = icmp::sweep(
            hosts,
            self.config.concurrency,
            Duration::from_millis(self.config.ping_timeout_ms),
            self.config.ping_count,
        )
        .await;
        let alive: Vec<icmp::PingResult> = results.into_iter().filter(|r| r.alive).collect();
        Ok((alive, start.elapsed()))
    }

    /// Phase 2: for every alive host, read ARP, attempt SNMP/LLDP, port-probe
    /// infrastructure vendors, merge evidence and upsert.
    async fn enrich(
        &self,
        alive: Vec<icmp::PingResult>,
        scan_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(Vec<HostEnrichment>, Duration, i32, i32)> {
        let start = std::time::Instant::now();
        let arp_table: HashMap<Ipv4Addr, String> = if self.config.arp_enabled {
            arp::snapshot().into_iter().map(|e| (e.ip, e.mac)).collect()
        } else {
            HashMap::new()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = Vec::with_capacity(alive.len());

        for ping in alive {
            if cancel.is_cancelled() {
                break;
            }
            let permit = semaphore.clone();
            let arp_mac = arp_table.get(&ping.ip).cloned();
            let config = self.config.clone();
            let vault = self.vault.clone();
            let ip = ping.ip;
            let ttl = ping.ttl;

            tasks.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                enrich_one_host(ip, ttl, arp_mac, &config, vault.as_ref()).await
            }));
        }

        let mut enrichments = Vec::new();
        let mut created_count = 0i32;
        let mut updated_count = 0i32;
        for task in tasks {
            match task.await {
                Ok(Some(partial)) => {
                    let outcome = self.upsert_host(&partial).await;
                    match outcome {
                        Ok(identity::UpsertOutcome { device_id, created }) => {
                            if created {
                                created_count += 1;
                            } else {
                                updated_count += 1;
                            }
                            self.store.link_scan_device(scan_id, device_id).await.unwrap_or_else(|e| {
                                warn!(error = %e, "failed to link scan to device");
                            });
                            enrichments.push(partial.into_enrichment(device_id));
                        }
                        Err(e) => warn!(ip = %partial.ip, error = %e, "upsert failed, skipping host"),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "enrich task panicked"),
            }
        }
        Ok((enrichments, start.elapsed(), created_count, updated_count))
    }

    async fn upsert_host(&self, partial: &PartialHost) -> Result<identity::UpsertOutcome> {
        let mut candidate = DeviceBuilder::default().ip(partial.ip.to_string());
        if let Some(mac) = &partial.mac {
            candidate = candidate.mac(mac.clone());
        }
        if let Some(manufacturer) = &partial.manufacturer {
            candidate = candidate.manufacturer(manufacturer.clone());
        }
        candidate = candidate.discovery_method(crate::types::DiscoveryMethod::Icmp);

        identity::upsert_device(&self.store, &self.events, candidate).await
    }

    /// Phase 3: classify, write back improved classifications, build
    /// topology links, detect service movements, done.
    async fn post_process(
        &self,
        enrichment: &[HostEnrichment],
        scan_id: Uuid,
    ) -> Result<Vec<services::Movement>> {
        // Snapshot each host's previously recorded ports before
        // `replace_services` overwrites them below, so the movement diff
        // compares against the prior scan's state rather than this one's.
        let mut previous: HashMap<i32, Vec<Uuid>> = HashMap::new();
        for host in enrichment {
            let existing = self.store.list_services(host.device_id).await.unwrap_or_default();
            for svc in existing {
                previous.entry(svc.port).or_default().push(host.device_id);
            }
        }

        for host in enrichment {
            let classification = classifier::classify(&host.classifier_input);
            if let Some(mut device) = self.store.get_device(host.device_id).await? {
                if classification.confidence > device.classification_confidence {
                    device.device_type = classification.device_type;
                    device.classification_confidence = classification.confidence;
                    device.classification_source = classification.primary_source;
                    device.classification_signals = classification.signals;
                    let mut conn = self.store.writer_guard().await;
                    self.store.update_device(&mut conn, &device).await?;
                }
            }

            if !host.open_ports.is_empty() {
                let services: Vec<ServiceRecord> = host
                    .open_ports
                    .iter()
                    .map(|&port| ServiceRecord {
                        port,
                        protocol: "tcp".to_string(),
                        service_name: Some(services::well_known_service_name(port).to_string()),
                        collection_source: "auto".to_string(),
                    })
                    .collect();
                let mut conn = self.store.writer_guard().await;
                self.store.replace_services(&mut conn, host.device_id, &services).await?;
            }
        }

        self.build_topology(enrichment).await?;
        self.detect_and_record_movements(enrichment, scan_id, previous).await
    }

    /// ARP-derived host<->gateway links, FDB-derived switch->host links,
    /// and LLDP-derived links with the documented removal priority: an
    /// LLDP link for a device removes its ARP-derived links; fresh FDB for
    /// a switch removes its previous FDB links before reinsertion.
    async fn build_topology(&self, enrichment: &[HostEnrichment]) -> Result<()> {
        let gateways: Vec<&HostEnrichment> = enrichment
            .iter()
            .filter(|h| {
                matches!(h.classifier_input.manual_type, Some(DeviceType::Router))
                    || h.classifier_input.ttl == Some(255)
            })
            .collect();

        for host in enrichment {
            for gw in &gateways {
                if gw.device_id == host.device_id {
                    continue;
                }
                self.store.upsert_topology_link(host.device_id, gw.device_id, LinkType::Arp).await?;
            }
        }

        for switch in enrichment.iter().filter(|h| h.is_bridge) {
            if switch.bridge_ports.is_empty() {
                continue;
            }
            self.store.delete_links_for_device_of_type(switch.device_id, LinkType::Fdb).await?;
            for (mac, _port) in &switch.bridge_ports {
                if let Some(learned) = enrichment.iter().find(|h| h.mac.as_deref() == Some(mac.as_str())) {
                    if learned.device_id != switch.device_id {
                        self.store.upsert_topology_link(switch.device_id, learned.device_id, LinkType::Fdb).await?;
                    }
                }
            }
        }

        for host in enrichment {
            if host.lldp_neighbors.is_empty() {
                continue;
            }
            self.store.delete_links_for_device_of_type(host.device_id, LinkType::Arp).await?;
            for neighbor in &host.lldp_neighbors {
                if let Some(mac) = &neighbor.port_id_as_mac {
                    if let Some(peer) = enrichment.iter().find(|h| h.mac.as_deref() == Some(mac.as_str())) {
                        if peer.device_id != host.device_id {
                            self.store.upsert_topology_link(host.device_id, peer.device_id, LinkType::Lldp).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn detect_and_record_movements(
        &self,
        enrichment: &[HostEnrichment],
        _scan_id: Uuid,
        previous: HashMap<i32, Vec<Uuid>>,
    ) -> Result<Vec<services::Movement>> {
        let mut current: HashMap<i32, Vec<Uuid>> = HashMap::new();
        for host in enrichment {
            for &port in &host.open_ports {
                current.entry(port).or_default().push(host.device_id);
            }
        }

        let movements = services::detect_movements(&previous, &current);
        for m in &movements {
            self.store
                .record_service_movement(m.port, services::well_known_service_name(m.port), m.from_device_id, m.to_device_id)
                .await?;
        }
        Ok(movements)
    }

    /// Background loop: every `device_lost_after / 4`, sweeps for devices
    /// that have gone quiet and marks them offline. Stops on cancellation.
    pub fn spawn_lost_checker(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        let interval = Duration::from_secs((self.config.device_lost_after_secs / 4).max(1) as u64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let lost_after = chrono::Duration::seconds(this.config.device_lost_after_secs.max(0));
                        if let Err(e) = sweep_lost_devices(&this.store, &this.events, lost_after, Utc::now()).await {
                            warn!(error = %e, "lost-device sweep failed");
                        }
                    }
                }
            }
        })
    }

    /// Background loop ticking daily: weekly/monthly consolidation, then
    /// retention pruning.
    pub fn spawn_metrics_loop(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 3600));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        if let Err(e) = this.store.consolidate_weekly(now).await {
                            warn!(error = %e, "weekly consolidation failed");
                        }
                        if now.day() <= 7 {
                            if let Err(e) = this.store.consolidate_monthly(now).await {
                                warn!(error = %e, "monthly consolidation failed");
                            }
                        }
                        let cutoff = now - chrono::Duration::days(this.config.metrics_retention_days);
                        if let Err(e) = this.store.prune_metrics_older_than(cutoff).await {
                            warn!(error = %e, "metrics retention prune failed");
                        }
                    }
                }
            }
        })
    }

    /// Supplemented scheduler: calls `run_scan` on `schedule.interval`,
    /// skipping ticks inside the configured quiet window.
    pub fn spawn_scheduler(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.schedule.enabled {
                return;
            }
            let Some(subnet) = this.config.schedule.subnet.clone() else {
                warn!("scheduler enabled with no configured subnet, exiting");
                return;
            };
            let interval = Duration::from_secs(this.config.schedule.interval_minutes.max(1) * 60);
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if in_quiet_window(&this.config.schedule, Utc::now()) {
                            debug!("scheduler tick skipped: inside quiet window");
                            continue;
                        }
                        if let Err(e) = this.run_scan(&subnet, CancellationToken::new()).await {
                            warn!(error = %e, "scheduled scan failed");
                        }
                    }
                }
            }
        })
    }

    /// Passive mDNS listener: browses a fixed set of common service types
    /// every `mdns_interval_secs` and feeds resolved (ip, hostname)
    /// observations into the identity engine with origin `mdns`.
    pub fn spawn_mdns_listener(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        const SERVICE_TYPES: &[&str] =
            &["_http._tcp.local.", "_ipp._tcp.local.", "_airplay._tcp.local.", "_ssh._tcp.local."];
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.mdns_enabled {
                return;
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(this.config.mdns_interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let window = Duration::from_secs(5);
                        let observations = mdns_upnp::browse_mdns(SERVICE_TYPES, window).await;
                        for obs in observations {
                            this.upsert_passive_observation(obs).await;
                        }
                    }
                }
            }
        })
    }

    /// Passive UPnP/SSDP listener: sends an `ssdp:all` M-SEARCH every
    /// `upnp_interval_secs` and feeds responders into the identity engine
    /// with origin `upnp`.
    pub fn spawn_upnp_listener(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.upnp_enabled {
                return;
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(this.config.upnp_interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let window = Duration::from_secs(5);
                        let observations = mdns_upnp::browse_ssdp(window).await;
                        for obs in observations {
                            this.upsert_passive_observation(obs).await;
                        }
                    }
                }
            }
        })
    }

    async fn upsert_passive_observation(&self, obs: mdns_upnp::ServiceObservation) {
        let Some(ip) = obs.ip else { return };
        let mut candidate = DeviceBuilder::default().ip(ip.to_string()).discovery_method(obs.discovery_method);
        if let Some(hostname) = obs.hostname {
            candidate = candidate.hostname(hostname);
        }
        if let Err(e) = identity::upsert_device(&self.store, &self.events, candidate).await {
            debug!(%ip, service = %obs.service, error = %e, "passive observation upsert failed");
        }
    }

    /// WiFi-AP syncer: enumerates stations on the configured AP interface
    /// every `wifi_sync_interval_secs`, upserts the device by MAC, and
    /// records a client snapshot row.
    pub fn spawn_wifi_sync(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.wifi_enabled || !collectors::wifi::available() {
                return;
            }
            let mut ticker = tokio::time::interval(Duration::from_secs(this.config.wifi_sync_interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let clients = collectors::wifi::enumerate(&this.config.wifi_interface).await;
                        for client in clients {
                            if client.mac.is_empty() {
                                continue;
                            }
                            let candidate = DeviceBuilder::default()
                                .mac(client.mac.clone())
                                .discovery_method(crate::types::DiscoveryMethod::Wifi);
                            match identity::upsert_device(&this.store, &this.events, candidate).await {
                                Ok(outcome) => {
                                    let snapshot = crate::store::wifi::WifiClientSnapshot {
                                        device_id: Some(outcome.device_id),
                                        client_mac: client.mac.clone(),
                                        signal_dbm: client.signal_dbm,
                                        signal_avg_dbm: client.signal_avg_dbm,
                                        connected_secs: client.connected_time.map(|d| d.as_secs() as i64),
                                        inactive_ms: client.inactive_time.map(|d| d.as_millis() as i64),
                                        rx_bitrate_kbps: client.rx_bitrate_mbps.map(|m| (m * 1000.0) as i64),
                                        tx_bitrate_kbps: client.tx_bitrate_mbps.map(|m| (m * 1000.0) as i64),
                                        rx_bytes: client.rx_bytes.map(|v| v as i64),
                                        tx_bytes: client.tx_bytes.map(|v| v as i64),
                                        ap_bssid: client.ap_bssid.clone(),
                                        ap_ssid: client.ap_ssid.clone(),
                                    };
                                    if let Err(e) = this.store.insert_wifi_snapshot(&snapshot).await {
                                        warn!(error = %e, "wifi snapshot insert failed");
                                    }
                                }
                                Err(e) => warn!(mac = %client.mac, error = %e, "wifi client upsert failed"),
                            }
                        }
                    }
                }
            }
        })
    }

    /// Proxmox syncer: polls the configured cluster node every
    /// `proxmox_sync_interval_secs` and records each VM/LXC as a resource
    /// correlated to the device matching its reported node/name.
    pub fn spawn_proxmox_sync(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if !this.config.proxmox_enabled {
                return;
            }
            let (Some(url), Some(token_id), Some(credential_id)) = (
                this.config.proxmox_url.clone(),
                this.config.proxmox_token_id.clone(),
                this.config.proxmox_credential_id.clone(),
            ) else {
                warn!("proxmox sync enabled but url/token_id/credential_id not fully configured, exiting");
                return;
            };
            let Ok(fields) = this.vault.fetch(&credential_id).await else {
                warn!(credential_id, "proxmox credential not found in vault, exiting");
                return;
            };
            let Some(token_secret) = fields.get("token_secret").cloned() else {
                warn!(credential_id, "proxmox credential missing token_secret field, exiting");
                return;
            };
            let client = match proxmox::ProxmoxClient::new(
                url,
                proxmox::ProxmoxCredential { token_id, token_secret },
                Duration::from_secs(30),
            ) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "failed to build proxmox client, exiting sync loop");
                    return;
                }
            };

            let mut ticker = tokio::time::interval(Duration::from_secs(this.config.proxmox_sync_interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // Resources are correlated to an already-discovered device by
                        // hostname match (the VM's configured name); a guest that has
                        // never answered ICMP/SNMP has no positive identity to attach
                        // the resource to and is skipped rather than invented.
                        let devices = this.store.list_devices().await.unwrap_or_default();
                        for vm in client.list_vms_lenient().await {
                            let matched = vm.name.as_ref().and_then(|name| {
                                devices.iter().find(|d| d.hostname.as_deref() == Some(name.as_str()))
                            });
                            let Some(device) = matched else {
                                debug!(vmid = vm.vmid, node = %vm.node, "no matching device for proxmox resource, skipping");
                                continue;
                            };
                            let device_id = device.id;
                            let resource = crate::store::proxmox::ProxmoxResource {
                                device_id,
                                node: vm.node.clone(),
                                vmid: Some(vm.vmid as i64),
                                resource_type: "qemu".to_string(),
                                status: Some(vm.status.clone()),
                                cpu_percent: vm.cpu_percent,
                                mem_mb: vm.mem_bytes.map(|b| (b / (1024 * 1024)) as i64),
                                disk_gb: vm.disk_gb.map(|g| g as i64),
                            };
                            if let Err(e) = this.store.upsert_proxmox_resource(&resource).await {
                                warn!(error = %e, "proxmox resource upsert failed");
                            }
                        }
                    }
                }
            }
        })
    }
}

/// True when `now`'s local-time-of-day falls within
/// `[quiet_start, quiet_end)`, both `"HH:MM"`. A schedule with no quiet
/// window configured never skips a tick.
fn in_quiet_window(schedule: &crate::config::ScheduleConfig, now: chrono::DateTime<Utc>) -> bool {
    let (Some(start), Some(end)) = (&schedule.quiet_start, &schedule.quiet_end) else {
        return false;
    };
    let Some(start_minutes) = parse_hhmm(start) else { return false };
    let Some(end_minutes) = parse_hhmm(end) else { return false };
    let now_minutes = now.hour() * 60 + now.minute();

    if start_minutes <= end_minutes {
        (start_minutes..end_minutes).contains(&now_minutes)
    } else {
        // Window wraps past midnight.
        now_minutes >= start_minutes || now_minutes < end_minutes
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let mut parts = s.split(':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Evidence collected for one host before it's turned into an upsert
/// candidate; kept separate from `HostEnrichment` because the device id
/// doesn't exist until after the upsert.
struct PartialHost {
    ip: Ipv4Addr,
    mac: Option<String>,
    ttl: Option<u8>,
    manufacturer: Option<String>,
    classifier_input: ClassifierInput,
    open_ports: Vec<i32>,
    bridge_ports: Vec<(String, u32)>,
    lldp_neighbors: Vec<lldp::LldpNeighbor>,
    is_bridge: bool,
}

impl PartialHost {
    fn into_enrichment(self, device_id: Uuid) -> HostEnrichment {
        HostEnrichment {
            ip: self.ip,
            device_id,
            mac: self.mac,
            ttl: self.ttl,
            manufacturer: self.manufacturer,
            classifier_input: self.classifier_input,
            open_ports: self.open_ports,
            bridge_ports: self.bridge_ports,
            lldp_neighbors: self.lldp_neighbors,
            is_bridge: self.is_bridge,
        }
    }
}

/// Enrich a single host: ARP MAC is already known by the caller; this adds
/// SNMP system/bridge/LLDP info when a credential is configured, and an
/// infrastructure-gated port probe. Never fails the enclosing scan — a
/// collector error here is logged and the host still gets upserted with
/// whatever evidence was gathered.
async fn enrich_one_host(
    ip: Ipv4Addr,
    ttl: Option<u8>,
    arp_mac: Option<String>,
    config: &Config,
    vault: &dyn CredentialVault,
) -> Option<PartialHost> {
    let mut classifier_input = ClassifierInput { ttl, ..Default::default() };
    let mut bridge_ports = Vec::new();
    let mut lldp_neighbors = Vec::new();
    let mut is_bridge = false;

    if config.snmp_enabled {
        for credential_id in &config.snmp_credentials {
            let Ok(fields) = vault.fetch(credential_id).await else { continue };
            let Ok(credential) = snmp::credential_from_map(credential_id, &fields) else { continue };
            let target = SocketAddr::new(IpAddr::V4(ip), 161);
            let timeout = Duration::from_millis(config.snmp_timeout_ms);

            match snmp::get_system_info(target, credential.clone(), timeout).await {
                Ok(info) => {
                    classifier_input.sys_descr = info.sys_descr;
                    classifier_input.sys_services = info.sys_services;

                    if let Some(bridge) = snmp::get_bridge_mib(target, credential.clone(), timeout).await {
                        is_bridge = bridge.num_ports.map(|n| n > 1).unwrap_or(false)
                            || bridge.base_bridge_address.as_deref().map(|a| !a.is_empty()).unwrap_or(false);
                        classifier_input.bridge_mib_address = bridge.base_bridge_address;
                        classifier_input.bridge_mib_num_ports = bridge.num_ports;
                        if is_bridge {
                            bridge_ports = snmp::walk_fdb_table(target, credential.clone(), timeout).await;
                        }
                    }

                    lldp_neighbors = lldp::enumerate(target, credential.clone(), timeout).await;
                    if let Some(first) = lldp_neighbors.first() {
                        classifier_input.lldp_cap_enabled = first.cap_enabled;
                    }
                    break;
                }
                Err(e) => debug!(%ip, credential_id, error = %e, "snmp probe failed"),
            }
        }
    }

    let manufacturer = arp_mac.as_deref().and_then(oui_lookup);
    classifier_input.manufacturer = manufacturer.clone();

    let mut open_ports = Vec::new();
    if config.portscan_enabled {
        let infra = manufacturer
            .as_deref()
            .map(crate::classifier::oui::is_infrastructure_vendor)
            .unwrap_or(false)
            || is_bridge;
        if infra {
            let ports = portscan::scan_probe_set(IpAddr::V4(ip), 10, Duration::from_millis(config.portscan_timeout_ms)).await;
            classifier_input.open_ports = ports.clone();
            open_ports = ports.into_iter().map(|p| p as i32).collect();
        }
    }

    Some(PartialHost {
        ip,
        mac: arp_mac,
        ttl,
        manufacturer,
        classifier_input,
        open_ports,
        bridge_ports,
        lldp_neighbors,
        is_bridge,
    })
}

/// Vendor lookup from a MAC's OUI. The classifier only needs a manufacturer
/// *name* to run `oui::classify_vendor` against; actual OUI-database
/// resolution is out of scope, so this recognizes the handful of
/// virtualization/embedded prefixes the teacher's own `MacAddress::vendor`
/// helper already carried.
fn oui_lookup(mac: &str) -> Option<String> {
    let octets: Vec<&str> = mac.split(|c| c == ':' || c == '-').collect();
    if octets.len() != 6 {
        return None;
    }
    let prefix = (
        u8::from_str_radix(octets[0], 16).ok()?,
        u8::from_str_radix(octets[1], 16).ok()?,
        u8::from_str_radix(octets[2], 16).ok()?,
    );
    let vendor = match prefix {
        (0x00, 0x50, 0x56) | (0x00, 0x0c, 0x29) => "VMware",
        (0x08, 0x00, 0x27) => "VirtualBox",
        (0x52, 0x54, 0x00) => "QEMU/KVM",
        (0xdc, 0xa6, 0x32) | (0xb8, 0x27, 0xeb) => "Raspberry Pi Foundation",
        (0xf0, 0x18, 0x98) | (0x00, 0x1b, 0x63) => "Apple",
        (0x00, 0x1f, 0xca) | (0x68, 0x7f, 0x74) | (0x00, 0x26, 0x99) => "Ubiquiti Networks",
        (0x00, 0x0c, 0x42) => "MikroTik",
        _ => return None,
    };
    Some(vendor.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use chrono::TimeZone;

    #[test]
    fn test_in_quiet_window_simple_range() {
        let schedule = ScheduleConfig {
            quiet_start: Some("22:00".to_string()),
            quiet_end: Some("23:00".to_string()),
            ..Default::default()
        };
        let inside = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 22, 30, 0).unwrap();
        let outside = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(in_quiet_window(&schedule, inside));
        assert!(!in_quiet_window(&schedule, outside));
    }

    #[test]
    fn test_in_quiet_window_wraps_midnight() {
        let schedule = ScheduleConfig {
            quiet_start: Some("23:00".to_string()),
            quiet_end: Some("06:00".to_string()),
            ..Default::default()
        };
        let late_night = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 23, 30, 0).unwrap();
        let early_morning = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let midday = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(in_quiet_window(&schedule, late_night));
        assert!(in_quiet_window(&schedule, early_morning));
        assert!(!in_quiet_window(&schedule, midday));
    }

    #[test]
    fn test_no_quiet_window_configured_never_skips() {
        let schedule = ScheduleConfig::default();
        assert!(!in_quiet_window(&schedule, Utc::now()));
    }

    #[test]
    fn test_oui_lookup_recognizes_vmware() {
        assert_eq!(oui_lookup("00:50:56:aa:bb:cc"), Some("VMware".to_string()));
        assert_eq!(oui_lookup("aa:bb:cc:dd:ee:ff"), None);
    }
}
