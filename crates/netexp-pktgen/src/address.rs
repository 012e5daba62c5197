//! Contiguous address ranges for generated flows.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use netexp_core::{Error, Result};

/// Last address of a range of `count` addresses starting at `base`.
///
/// Fails when `count` is zero or the range runs past the end of the
/// address family.
pub fn range_end(base: IpAddr, count: u32) -> Result<IpAddr> {
    let offset = count
        .checked_sub(1)
        .ok_or_else(|| Error::AddressRange(format!("empty range starting at {base}")))?;

    let overflow =
        || Error::AddressRange(format!("{count} addresses starting at {base} overflow"));

    match base {
        IpAddr::V4(v4) => u32::from(v4)
            .checked_add(offset)
            .map(|end| IpAddr::V4(Ipv4Addr::from(end)))
            .ok_or_else(overflow),
        IpAddr::V6(v6) => u128::from(v6)
            .checked_add(u128::from(offset))
            .map(|end| IpAddr::V6(Ipv6Addr::from(end)))
            .ok_or_else(overflow),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn test_range_end() {
        assert_eq!(range_end(ip("10.0.0.0"), 4).unwrap(), ip("10.0.0.3"));
        assert_eq!(range_end(ip("10.0.0.0"), 2).unwrap(), ip("10.0.0.1"));
        assert_eq!(range_end(ip("192.168.0.0"), 1).unwrap(), ip("192.168.0.0"));
    }

    #[test]
    fn test_range_end_carries_into_next_octet() {
        assert_eq!(range_end(ip("192.168.0.200"), 100).unwrap(), ip("192.168.1.43"));
    }

    #[test]
    fn test_range_end_ipv6() {
        assert_eq!(range_end(ip("fd00::"), 256).unwrap(), ip("fd00::ff"));
    }

    #[test]
    fn test_empty_range() {
        assert!(matches!(
            range_end(ip("10.0.0.0"), 0),
            Err(Error::AddressRange(_))
        ));
    }

    #[test]
    fn test_range_overflow() {
        assert!(matches!(
            range_end(ip("255.255.255.254"), 3),
            Err(Error::AddressRange(_))
        ));
    }
}
