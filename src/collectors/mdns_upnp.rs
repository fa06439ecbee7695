// mDNS/UPnP discovery: short-lived listeners over `mdns-sd` and
// `ssdp-client` that collect whatever announces itself within a fixed
// window, rather than the poll-target model the other collectors use —
// these protocols are broadcast/multicast, so there's no host to dial.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::types::DiscoveryMethod;

#[derive(Debug, Clone)]
pub struct ServiceObservation {
    pub ip: Option<IpAddr>,
    pub hostname: Option<String>,
    pub service: String,
    pub discovery_method: DiscoveryMethod,
}

pub fn available() -> bool {
    true
}

/// Browses `_services._dns-sd._udp.local` style mDNS service types for
/// `window`, collecting one observation per `(ip, service)` pair seen.
pub async fn browse_mdns(service_types: &[&str], window: Duration) -> Vec<ServiceObservation> {
    let daemon = match mdns_sd::ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "mdns-sd daemon init failed");
            return Vec::new();
        }
    };

    let mut receivers = Vec::with_capacity(service_types.len());
    for service_type in service_types {
        match daemon.browse(service_type) {
            Ok(receiver) => receivers.push((service_type.to_string(), receiver)),
            Err(e) => debug!(error = %e, service_type, "mdns browse failed to start"),
        }
    }

    let mut seen: HashMap<(IpAddr, String), ServiceObservation> = HashMap::new();
    let deadline = tokio::time::Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        let mut progressed = false;
        for (service_type, receiver) in &receivers {
            if let Ok(event) = receiver.try_recv() {
                progressed = true;
                if let mdns_sd::ServiceEvent::ServiceResolved(info) = event {
                    for addr in info.get_addresses() {
                        let ip = *addr;
                        let obs = ServiceObservation {
                            ip: Some(ip),
                            hostname: Some(info.get_hostname().trim_end_matches('.').to_string()),
                            service: service_type.clone(),
                            discovery_method: DiscoveryMethod::Mdns,
                        };
                        seen.insert((ip, service_type.clone()), obs);
                    }
                }
            }
        }
        if !progressed {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    for (service_type, _) in &receivers {
        let _ = daemon.stop_browse(service_type);
    }

    seen.into_values().collect()
}

/// Sends an SSDP M-SEARCH for `ssdp:all` and collects responses for
/// `window`, mapping each `LOCATION`/`ST` pair into an observation keyed
/// by the responder's address.
pub async fn browse_ssdp(window: Duration) -> Vec<ServiceObservation> {
    let search_target = ssdp_client::SearchTarget::All;
    let responses = match ssdp_client::search(&search_target, window, 2, None).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "ssdp search failed to start");
            return Vec::new();
        }
    };
    tokio::pin!(responses);

    let mut observations = Vec::new();
    while let Some(next) = responses.next().await {
        match next {
            Ok(response) => {
                let ip = host_from_location(response.location());
                observations.push(ServiceObservation {
                    ip,
                    hostname: None,
                    service: response.search_target().to_string(),
                    discovery_method: DiscoveryMethod::Upnp,
                });
            }
            Err(e) => debug!(error = %e, "ssdp response decode failed"),
        }
    }
    observations
}

/// Pulls the host out of a `LOCATION` URL (`http://<host>:<port>/desc.xml`)
/// without pulling in a full URL-parsing crate for one field.
fn host_from_location(location: &str) -> Option<IpAddr> {
    let without_scheme = location.split("://").nth(1)?;
    let authority = without_scheme.split('/').next()?;
    let host = authority.split(':').next()?;
    host.parse::<IpAddr>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_observation_carries_discovery_method() {
        let obs = ServiceObservation {
            ip: None,
            hostname: Some("printer.local".to_string()),
            service: "_ipp._tcp.local.".to_string(),
            discovery_method: DiscoveryMethod::Mdns,
        };
        assert_eq!(obs.discovery_method, DiscoveryMethod::Mdns);
    }

    #[test]
    fn test_host_from_location() {
        assert_eq!(
            host_from_location("http://192.168.1.10:1900/desc.xml"),
            Some("192.168.1.10".parse().unwrap())
        );
        assert_eq!(host_from_location("not a url"), None);
    }
}
