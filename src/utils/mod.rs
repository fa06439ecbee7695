use std::net::Ipv4Addr;

/// Expands a CIDR block into every address in its range (network and
/// broadcast addresses included; callers that need host-only addresses
/// trim those themselves, as `orchestrator::subnet` does).
pub fn cidr_to_range(ip: Ipv4Addr, prefix: u8) -> Vec<Ipv4Addr> {
    let ip_num = u32::from(ip);
    let mask = !0u32 << (32 - prefix);
    let network = ip_num & mask;
    let broadcast = network | !mask;

    (network..=broadcast).map(Ipv4Addr::from).collect()
}

/// True when running as root/effective uid 0, which raw ICMP and ARP
/// collection require (`CAP_NET_RAW` on Linux is the finer-grained
/// alternative, but isn't checkable generically from here).
pub fn is_privileged() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_to_range_slash_24() {
        let range = cidr_to_range("192.168.1.0".parse().unwrap(), 24);
        assert_eq!(range.len(), 256);
        assert_eq!(range[0], "192.168.1.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(range[255], "192.168.1.255".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn test_cidr_to_range_slash_32_is_single_host() {
        let range = cidr_to_range("10.0.0.5".parse().unwrap(), 32);
        assert_eq!(range, vec!["10.0.0.5".parse::<Ipv4Addr>().unwrap()]);
    }
}
