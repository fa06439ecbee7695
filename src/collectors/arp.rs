// ARP snapshot: reads the kernel's neighbor table. On Linux this parses
// `/proc/net/arp` (the same information `pnet_datalink`'s interface list
// would otherwise require a raw socket to observe passively); non-Linux
// targets return an empty snapshot rather than failing the scan, per the
// collector contract in spec.md §9.

use std::net::Ipv4Addr;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: String,
}

pub fn available() -> bool {
    cfg!(target_os = "linux")
}

/// Returns the current kernel ARP/neighbor table. Never fails the caller:
/// a read error or an unsupported platform both come back as an empty
/// snapshot.
pub fn snapshot() -> Vec<ArpEntry> {
    if !available() {
        return Vec::new();
    }
    read_proc_net_arp().unwrap_or_else(|e| {
        warn!(error = %e, "failed to read ARP table");
        Vec::new()
    })
}

#[cfg(target_os = "linux")]
fn read_proc_net_arp() -> std::io::Result<Vec<ArpEntry>> {
    let text = std::fs::read_to_string("/proc/net/arp")?;
    Ok(parse_proc_net_arp(&text))
}

#[cfg(not(target_os = "linux"))]
fn read_proc_net_arp() -> std::io::Result<Vec<ArpEntry>> {
    Ok(Vec::new())
}

/// Parses the `/proc/net/arp` table format:
/// `IP address  HW type  Flags  HW address  Mask  Device`.
fn parse_proc_net_arp(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .skip(1) // header row
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let ip = cols.next()?.parse::<Ipv4Addr>().ok()?;
            let _hw_type = cols.next()?;
            let _flags = cols.next()?;
            let mac = cols.next()?.to_string();
            if mac == "00:00:00:00:00:00" {
                return None;
            }
            Some(ArpEntry { ip, mac })
        })
        .collect()
}

/// True if the MAC's first octet has the locally-administered bit set
/// (0x02, 0x06, 0x0A, 0x0E mod 0x10) — spec.md §8 boundary behavior,
/// regardless of `:` or `-` separator.
pub fn is_locally_administered_mac(mac: &str) -> bool {
    let first_octet = mac.split(|c| c == ':' || c == '-').next().unwrap_or("");
    match u8::from_str_radix(first_octet, 16) {
        Ok(byte) => matches!(byte & 0x0f, 0x02 | 0x06 | 0x0a | 0x0e),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_net_arp() {
        let sample = "IP address       HW type     Flags       HW address            Mask     Device\n\
                       192.168.1.1      0x1         0x2         aa:bb:cc:dd:ee:ff     *        eth0\n\
                       192.168.1.2      0x1         0x0         00:00:00:00:00:00     *        eth0\n";
        let entries = parse_proc_net_arp(sample);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ip, "192.168.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(entries[0].mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_locally_administered_mac_colon_and_dash() {
        assert!(is_locally_administered_mac("02:11:22:33:44:55"));
        assert!(is_locally_administered_mac("06-11-22-33-44-55"));
        assert!(is_locally_administered_mac("0a:11:22:33:44:55"));
        assert!(is_locally_administered_mac("0e:11:22:33:44:55"));
        assert!(!is_locally_administered_mac("00:11:22:33:44:55"));
        assert!(!is_locally_administered_mac("ac:de:48:00:11:22"));
    }
}
