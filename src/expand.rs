use crate::error::DescriptorError;
use ipnet::Ipv4Net;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::warn;

/// A registry allocation: base address plus number of addresses in the block.
///
/// Written as `"<ipv4>/<count>"`, e.g. `203.0.113.0/256`. Note the number after
/// the slash is a host count, not a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeDescriptor {
    pub base: Ipv4Addr,
    pub count: u64,
}

impl RangeDescriptor {
    pub fn new(base: Ipv4Addr, count: u64) -> Result<Self, DescriptorError> {
        if count == 0 || !count.is_power_of_two() || count > (1u64 << 32) {
            return Err(DescriptorError::NotPowerOfTwo(count));
        }
        Ok(Self { base, count })
    }

    /// `32 - log2(count)`.
    pub fn prefix_len(&self) -> u8 {
        32 - self.count.trailing_zeros() as u8
    }

    /// The CIDR network containing `base`, with host bits cleared.
    pub fn network(&self) -> Ipv4Net {
        // prefix_len is always within 0..=32 thanks to the constructor check
        Ipv4Net::new(self.base, self.prefix_len())
            .map(|n| n.trunc())
            .unwrap_or_else(|_| Ipv4Net::from(self.base))
    }

    /// Lazily enumerate usable host addresses (network and broadcast excluded).
    pub fn hosts(&self) -> Hosts {
        let net = self.network();
        let start = u32::from(net.network());
        let end = u32::from(net.broadcast());
        Hosts {
            next: start.saturating_add(1),
            end,
        }
    }
}

impl FromStr for RangeDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr, count) = s
            .split_once('/')
            .ok_or_else(|| DescriptorError::MissingSeparator(s.to_string()))?;
        let base = addr
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|e| DescriptorError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let count: u64 = count
            .trim()
            .parse()
            .map_err(|_| DescriptorError::InvalidCount(count.to_string()))?;
        RangeDescriptor::new(base, count)
    }
}

impl fmt::Display for RangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.count)
    }
}

/// Iterator over the host addresses of one descriptor. Cheap to recreate.
#[derive(Debug, Clone)]
pub struct Hosts {
    next: u32,
    // exclusive: the broadcast address
    end: u32,
}

impl Hosts {
    pub fn empty() -> Self {
        Self { next: 0, end: 0 }
    }
}

impl Iterator for Hosts {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next >= self.end {
            return None;
        }
        let ip = Ipv4Addr::from(self.next);
        self.next += 1;
        Some(ip)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.end.saturating_sub(self.next) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Hosts {}

/// Expand one descriptor line into its host addresses.
///
/// A malformed line is reported and yields nothing, so callers can keep going
/// with the next descriptor.
pub fn expand_descriptor(line: &str) -> Hosts {
    match line.parse::<RangeDescriptor>() {
        Ok(desc) => desc.hosts(),
        Err(e) => {
            warn!(descriptor = line, error = %e, "skipping range descriptor");
            Hosts::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_from_count() {
        let d: RangeDescriptor = "10.0.0.0/256".parse().unwrap();
        assert_eq!(d.prefix_len(), 24);
        let d: RangeDescriptor = "10.0.0.0/1".parse().unwrap();
        assert_eq!(d.prefix_len(), 32);
        let d: RangeDescriptor = "0.0.0.0/4294967296".parse().unwrap();
        assert_eq!(d.prefix_len(), 0);
    }

    #[test]
    fn count_four_gives_two_hosts() {
        let hosts: Vec<_> = expand_descriptor("203.0.113.0/4").collect();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(203, 0, 113, 1), Ipv4Addr::new(203, 0, 113, 2)]
        );
    }

    #[test]
    fn host_count_is_count_minus_two() {
        for k in 0..=12u32 {
            let count = 1u64 << k;
            let d = RangeDescriptor::new(Ipv4Addr::new(172, 16, 0, 0), count).unwrap();
            let hosts: Vec<_> = d.hosts().collect();
            assert_eq!(hosts.len() as u64, count.saturating_sub(2), "count={count}");
            assert_eq!(d.hosts().len(), hosts.len());
            let net = d.network();
            assert!(hosts.iter().all(|h| net.contains(h)));
            assert!(!hosts.contains(&net.network()));
            assert!(!hosts.contains(&net.broadcast()));
        }
    }

    #[test]
    fn unaligned_base_is_truncated() {
        let d: RangeDescriptor = "192.168.1.77/4".parse().unwrap();
        assert_eq!(d.network().to_string(), "192.168.1.76/30");
        let hosts: Vec<_> = d.hosts().collect();
        assert_eq!(
            hosts,
            vec![Ipv4Addr::new(192, 168, 1, 77), Ipv4Addr::new(192, 168, 1, 78)]
        );
    }

    #[test]
    fn top_of_address_space_does_not_overflow() {
        assert_eq!(expand_descriptor("255.255.255.255/1").count(), 0);
        assert_eq!(expand_descriptor("255.255.255.254/2").count(), 0);
        let last: Vec<_> = expand_descriptor("255.255.255.252/4").collect();
        assert_eq!(last.len(), 2);
    }

    #[test]
    fn rejects_bad_descriptors() {
        assert_eq!(
            "10.0.0.0/3".parse::<RangeDescriptor>(),
            Err(DescriptorError::NotPowerOfTwo(3))
        );
        assert_eq!(
            "10.0.0.0/0".parse::<RangeDescriptor>(),
            Err(DescriptorError::NotPowerOfTwo(0))
        );
        assert!(matches!(
            "10.0.0.0".parse::<RangeDescriptor>(),
            Err(DescriptorError::MissingSeparator(_))
        ));
        assert!(matches!(
            "10.0.0.300/4".parse::<RangeDescriptor>(),
            Err(DescriptorError::InvalidAddress { .. })
        ));
        assert!(matches!(
            "10.0.0.0/abc".parse::<RangeDescriptor>(),
            Err(DescriptorError::InvalidCount(_))
        ));
    }

    #[test]
    fn malformed_descriptor_expands_to_nothing() {
        assert_eq!(expand_descriptor("not-a-range").count(), 0);
        assert_eq!(expand_descriptor("10.0.0.0/12").count(), 0);
    }

    #[test]
    fn expansion_is_restartable() {
        let d: RangeDescriptor = "198.51.100.0/8".parse().unwrap();
        let a: Vec<_> = d.hosts().collect();
        let b: Vec<_> = d.hosts().collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }
}
