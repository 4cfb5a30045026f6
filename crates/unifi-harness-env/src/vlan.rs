//! VLAN ID and subnet allocation for concurrently running tests.
//!
//! Each allocation pairs a VLAN ID with a subnet carved out of a base
//! network. The base is split into `ceil(log2(vlan_max))` bits worth of
//! equally sized blocks and VLAN `n` gets block `n`, so subnets of distinct
//! VLANs never overlap.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Highest VLAN ID usable on a trunk.
const MAX_VLAN_ID: u16 = 4095;

/// Default network the test subnets are carved from.
pub const DEFAULT_BASE: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8);

/// Settings for a [`VlanAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanAllocatorConfig {
    /// Network the per-VLAN subnets are carved from.
    pub base: Ipv4Net,
    /// First VLAN ID handed out.
    pub vlan_min: u16,
    /// One past the last VLAN ID handed out.
    pub vlan_max: u16,
}

impl Default for VlanAllocatorConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            vlan_min: 2,
            vlan_max: MAX_VLAN_ID,
        }
    }
}

/// A VLAN ID together with its subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VlanAllocation {
    /// The VLAN ID.
    pub vlan_id: u16,
    /// Subnet reserved for the VLAN.
    pub subnet: Ipv4Net,
}

impl fmt::Display for VlanAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vlan {} ({})", self.vlan_id, self.subnet)
    }
}

/// Hands out unique VLAN IDs and subnets.
///
/// IDs are issued in increasing order starting at `vlan_min` and are never
/// returned to the pool. Safe to share between threads.
#[derive(Debug)]
pub struct VlanAllocator {
    config: VlanAllocatorConfig,
    subnet_bits: u8,
    next: Mutex<u16>,
}

impl Default for VlanAllocator {
    fn default() -> Self {
        let config = VlanAllocatorConfig::default();
        Self {
            subnet_bits: subnet_bits(config.vlan_max),
            next: Mutex::new(config.vlan_min),
            config,
        }
    }
}

impl VlanAllocator {
    /// Create an allocator.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the VLAN range is empty or outside
    /// `1..=4095`, or if the base network is too small to hold one block per
    /// VLAN ID.
    pub fn new(config: VlanAllocatorConfig) -> Result<Self> {
        let VlanAllocatorConfig {
            base,
            vlan_min,
            vlan_max,
        } = config;

        if vlan_min < 1 {
            return Err(config_error("vlan_min must be at least 1"));
        }
        if vlan_max <= vlan_min {
            return Err(config_error(format!(
                "vlan_max ({vlan_max}) must be greater than vlan_min ({vlan_min})"
            )));
        }
        if vlan_max > MAX_VLAN_ID {
            return Err(config_error(format!(
                "vlan_max ({vlan_max}) must not exceed {MAX_VLAN_ID}"
            )));
        }

        let bits = subnet_bits(vlan_max);
        if base.prefix_len() + bits > 32 {
            return Err(config_error(format!(
                "{base} cannot be split into {bits} more bits of subnets"
            )));
        }

        Ok(Self {
            config: VlanAllocatorConfig {
                base: base.trunc(),
                vlan_min,
                vlan_max,
            },
            subnet_bits: bits,
            next: Mutex::new(vlan_min),
        })
    }

    /// The effective configuration (base network truncated to its prefix).
    #[must_use]
    pub const fn config(&self) -> &VlanAllocatorConfig {
        &self.config
    }

    /// Number of bits the base network is subdivided by.
    #[must_use]
    pub const fn subnet_bits(&self) -> u8 {
        self.subnet_bits
    }

    /// Prefix length of every allocated subnet.
    #[must_use]
    pub fn subnet_prefix_len(&self) -> u8 {
        self.config.base.prefix_len() + self.subnet_bits
    }

    /// IDs still available.
    #[must_use]
    pub fn remaining(&self) -> u16 {
        self.config.vlan_max - *self.next.lock()
    }

    /// Allocate the next VLAN ID and its subnet.
    ///
    /// # Errors
    ///
    /// Returns `AllocatorExhausted` once every ID in `[vlan_min, vlan_max)`
    /// has been handed out. Later calls keep failing the same way.
    pub fn allocate(&self) -> Result<VlanAllocation> {
        let mut next = self.next.lock();
        let vlan_id = *next;
        if vlan_id >= self.config.vlan_max {
            return Err(HarnessError::AllocatorExhausted {
                vlan_min: self.config.vlan_min,
                vlan_max: self.config.vlan_max,
            });
        }

        let subnet = self.subnet_for(vlan_id)?;
        *next = vlan_id + 1;
        drop(next);

        debug!(vlan_id, %subnet, "allocated test VLAN");
        Ok(VlanAllocation { vlan_id, subnet })
    }

    /// The subnet VLAN `vlan_id` maps to, whether or not it has been allocated.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `vlan_id` is outside the allocator's range.
    pub fn subnet_for(&self, vlan_id: u16) -> Result<Ipv4Net> {
        if !(self.config.vlan_min..self.config.vlan_max).contains(&vlan_id) {
            return Err(config_error(format!(
                "vlan {vlan_id} is outside [{}, {})",
                self.config.vlan_min, self.config.vlan_max
            )));
        }

        let prefix_len = self.subnet_prefix_len();
        let host_bits = 32 - u32::from(prefix_len);
        let network = u32::from(self.config.base.network()) | (u32::from(vlan_id) << host_bits);
        Ipv4Net::new(Ipv4Addr::from(network), prefix_len).map_err(|e| config_error(e.to_string()))
    }
}

/// `ceil(log2(vlan_max))` for `vlan_max >= 2`.
fn subnet_bits(vlan_max: u16) -> u8 {
    let bits = u16::BITS - (vlan_max.saturating_sub(1)).leading_zeros();
    u8::try_from(bits).unwrap_or(16)
}

fn config_error(msg: impl Into<String>) -> HarnessError {
    HarnessError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use unifi_harness_core::ErrorKind;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn small(vlan_min: u16, vlan_max: u16) -> VlanAllocator {
        VlanAllocator::new(VlanAllocatorConfig {
            base: net("10.0.0.0/8"),
            vlan_min,
            vlan_max,
        })
        .unwrap()
    }

    #[test]
    fn default_first_allocation() {
        let alloc = VlanAllocator::default();
        assert_eq!(alloc.subnet_bits(), 12);
        assert_eq!(alloc.subnet_prefix_len(), 20);

        let first = alloc.allocate().unwrap();
        assert_eq!(first.vlan_id, 2);
        assert_eq!(first.subnet, net("10.0.32.0/20"));
        assert_eq!(first.to_string(), "vlan 2 (10.0.32.0/20)");

        let second = alloc.allocate().unwrap();
        assert_eq!(second.vlan_id, 3);
        assert_eq!(second.subnet, net("10.0.48.0/20"));
    }

    #[test]
    fn default_matches_explicit_config() {
        let explicit = VlanAllocator::new(VlanAllocatorConfig::default()).unwrap();
        assert_eq!(explicit.config(), VlanAllocator::default().config());
        assert_eq!(explicit.subnet_bits(), 12);
    }

    #[test]
    fn subnet_bits_rounds_up() {
        assert_eq!(subnet_bits(2), 1);
        assert_eq!(subnet_bits(4), 2);
        assert_eq!(subnet_bits(5), 3);
        assert_eq!(subnet_bits(4095), 12);
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let alloc = VlanAllocator::default();
        let base = alloc.config().base;

        let results: Vec<VlanAllocation> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| (0..50).map(|_| alloc.allocate().unwrap()).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(results.len(), 400);
        let ids: HashSet<u16> = results.iter().map(|a| a.vlan_id).collect();
        assert_eq!(ids.len(), 400);

        let subnets: HashSet<Ipv4Net> = results.iter().map(|a| a.subnet).collect();
        assert_eq!(subnets.len(), 400);
        for a in &results {
            assert!((2..4095).contains(&a.vlan_id));
            assert!(base.contains(&a.subnet));
            assert_eq!(a.subnet, alloc.subnet_for(a.vlan_id).unwrap());
        }
        // Equal-sized aligned blocks at distinct addresses cannot overlap.
        assert!(results.iter().all(|a| a.subnet.prefix_len() == 20));
    }

    #[test]
    fn exhaustion_is_sticky() {
        let alloc = small(2, 6);
        for expected in 2..6 {
            assert_eq!(alloc.allocate().unwrap().vlan_id, expected);
        }
        assert_eq!(alloc.remaining(), 0);

        for _ in 0..2 {
            let err = alloc.allocate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AllocatorExhausted);
        }
        assert_eq!(alloc.remaining(), 0);
    }

    #[test]
    fn concurrent_exhaustion_fails_only_the_overflow() {
        let alloc = small(2, 6);
        let results: Vec<Result<VlanAllocation>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..10).map(|_| s.spawn(|| alloc.allocate())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let ok: HashSet<u16> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|a| a.vlan_id))
            .collect();
        assert_eq!(ok, HashSet::from([2, 3, 4, 5]));
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 6);
    }

    #[test]
    fn base_host_bits_are_truncated() {
        let alloc = VlanAllocator::new(VlanAllocatorConfig {
            base: net("172.16.5.9/16"),
            vlan_min: 10,
            vlan_max: 20,
        })
        .unwrap();
        assert_eq!(alloc.config().base, net("172.16.0.0/16"));
        assert_eq!(alloc.subnet_bits(), 5);
        assert_eq!(alloc.allocate().unwrap().subnet, net("172.16.80.0/21"));
    }

    #[test]
    fn rejects_bad_config() {
        let cases = [
            ("10.0.0.0/8", 0, 10),
            ("10.0.0.0/8", 10, 10),
            ("10.0.0.0/8", 2, 4096),
            ("10.0.0.0/24", 2, 4095),
        ];
        for (base, vlan_min, vlan_max) in cases {
            let err = VlanAllocator::new(VlanAllocatorConfig {
                base: net(base),
                vlan_min,
                vlan_max,
            })
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config, "{base} [{vlan_min}, {vlan_max})");
        }
    }

    #[test]
    fn subnet_for_rejects_out_of_range() {
        let alloc = small(2, 6);
        assert!(alloc.subnet_for(1).is_err());
        assert!(alloc.subnet_for(6).is_err());
        assert!(alloc.subnet_for(5).is_ok());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: VlanAllocatorConfig =
            serde_json::from_str(r#"{"base":"192.168.0.0/16","vlan_max":100}"#).unwrap();
        assert_eq!(config.base, net("192.168.0.0/16"));
        assert_eq!(config.vlan_min, 2);
        assert_eq!(config.vlan_max, 100);
    }
}
