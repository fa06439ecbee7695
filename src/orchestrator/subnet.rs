// Subnet parsing for the sweep phase: CIDR string to a host-address
// enumeration, excluding network/broadcast addresses (spec.md §4.5 step 1).

use std::net::Ipv4Addr;

use crate::error::{ReconError, Result};
use crate::utils::cidr_to_range;

/// Parses `cidr` and returns every usable IPv4 host address in it, in
/// ascending order. Fails with `InvalidSubnet` on a malformed string or a
/// prefix outside `0..=32`.
///
/// `cidr_to_range` returns the full network..=broadcast span; the network
/// and broadcast addresses are trimmed off here unless the block is too
/// small to have distinct ones (a /31 or /32), in which case there's
/// nothing to trim.
pub fn hosts_in_subnet(cidr: &str) -> Result<Vec<Ipv4Addr>> {
    let (ip, prefix) = parse_cidr(cidr)?;
    let range = cidr_to_range(ip, prefix);
    if range.len() > 2 {
        Ok(range[1..range.len() - 1].to_vec())
    } else {
        Ok(range)
    }
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8)> {
    let mut parts = cidr.split('/');
    let ip_part = parts.next().ok_or_else(|| ReconError::InvalidSubnet(cidr.to_string()))?;
    let prefix_part = parts.next().ok_or_else(|| ReconError::InvalidSubnet(cidr.to_string()))?;
    if parts.next().is_some() {
        return Err(ReconError::InvalidSubnet(cidr.to_string()));
    }

    let ip: Ipv4Addr = ip_part.parse().map_err(|_| ReconError::InvalidSubnet(cidr.to_string()))?;
    let prefix: u8 = prefix_part.parse().map_err(|_| ReconError::InvalidSubnet(cidr.to_string()))?;
    if prefix > 32 {
        return Err(ReconError::InvalidSubnet(cidr.to_string()));
    }
    Ok((ip, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slash_24_excludes_network_and_broadcast() {
        let hosts = hosts_in_subnet("192.168.1.0/24").unwrap();
        assert_eq!(hosts.len(), 254);
        assert!(!hosts.contains(&"192.168.1.0".parse().unwrap()));
        assert!(!hosts.contains(&"192.168.1.255".parse().unwrap()));
        assert!(hosts.contains(&"192.168.1.1".parse().unwrap()));
        assert!(hosts.contains(&"192.168.1.254".parse().unwrap()));
    }

    #[test]
    fn test_invalid_cidr_rejected() {
        assert!(hosts_in_subnet("not-a-subnet").is_err());
        assert!(hosts_in_subnet("192.168.1.0/33").is_err());
        assert!(hosts_in_subnet("192.168.1.0/24/extra").is_err());
    }
}
