//! IPv4 and IPv6 prefix values.
//!
//! A prefix is an address plus a mask length with all host bits clear.
//! IRR feeds are known to carry prefixes with host bits set; those are
//! repaired on ingest and the correction is logged, since the discrepancy
//! is a data-quality signal rather than an error.

use crate::{CoreError, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::warn;

/// Address family selector for origin-bucket and expansion queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// An IPv4 prefix, host bits clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Prefix4 {
    pub addr: Ipv4Addr,
    pub len: u8,
}

/// An IPv6 prefix, host bits clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Prefix6 {
    pub addr: Ipv6Addr,
    pub len: u8,
}

/// A prefix of either family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
}

impl Prefix4 {
    /// Width of the snapshot wire form: four address octets plus the length.
    pub const WIRE_LEN: usize = 5;

    fn mask(addr: Ipv4Addr, len: u8) -> Ipv4Addr {
        let raw = u32::from(addr);
        let masked = if len == 0 {
            0
        } else {
            raw & (u32::MAX << (32 - u32::from(len)))
        };
        Ipv4Addr::from(masked)
    }

    /// Build a canonical prefix, clearing host bits. Logs when the input
    /// had to be repaired.
    pub fn repair(addr: Ipv4Addr, len: u8) -> Result<Self> {
        if len > 32 {
            return Err(CoreError::InvalidPrefix(format!("{addr}/{len}")));
        }
        let canon = Self::mask(addr, len);
        if canon != addr {
            warn!(given = %addr, len, canonical = %canon, "repaired non-canonical IPv4 prefix");
        }
        Ok(Self { addr: canon, len })
    }

    /// Parse `a.b.c.d/p`, canonicalizing host bits.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, len) = split_slash(s)?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| CoreError::InvalidPrefix(s.trim().to_string()))?;
        Self::repair(addr, len)
    }

    /// Snapshot wire form: the address octets followed by the length.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let o = self.addr.octets();
        [o[0], o[1], o[2], o[3], self.len]
    }

    /// Rebuild from the wire form, re-canonicalizing host bits.
    pub fn from_wire(w: [u8; Self::WIRE_LEN]) -> Result<Self> {
        Self::repair(Ipv4Addr::new(w[0], w[1], w[2], w[3]), w[4])
    }
}

impl Prefix6 {
    /// Width of the snapshot wire form: sixteen address octets plus the length.
    pub const WIRE_LEN: usize = 17;

    fn mask(addr: Ipv6Addr, len: u8) -> Ipv6Addr {
        let raw = u128::from(addr);
        let masked = if len == 0 {
            0
        } else {
            raw & (u128::MAX << (128 - u32::from(len)))
        };
        Ipv6Addr::from(masked)
    }

    /// Build a canonical prefix, clearing host bits. Logs when the input
    /// had to be repaired.
    pub fn repair(addr: Ipv6Addr, len: u8) -> Result<Self> {
        if len > 128 {
            return Err(CoreError::InvalidPrefix(format!("{addr}/{len}")));
        }
        let canon = Self::mask(addr, len);
        if canon != addr {
            warn!(given = %addr, len, canonical = %canon, "repaired non-canonical IPv6 prefix");
        }
        Ok(Self { addr: canon, len })
    }

    /// Parse `hhhh:.../p`, canonicalizing host bits.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, len) = split_slash(s)?;
        let addr: Ipv6Addr = addr
            .parse()
            .map_err(|_| CoreError::InvalidPrefix(s.trim().to_string()))?;
        Self::repair(addr, len)
    }

    /// Snapshot wire form: the address octets followed by the length.
    pub fn to_wire(&self) -> [u8; Self::WIRE_LEN] {
        let mut w = [0u8; Self::WIRE_LEN];
        w[..16].copy_from_slice(&self.addr.octets());
        w[16] = self.len;
        w
    }

    /// Rebuild from the wire form, re-canonicalizing host bits.
    pub fn from_wire(w: [u8; Self::WIRE_LEN]) -> Result<Self> {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&w[..16]);
        Self::repair(Ipv6Addr::from(octets), w[16])
    }
}

impl Prefix {
    /// Parse either family; a `:` in the string selects IPv6.
    pub fn parse(s: &str) -> Result<Self> {
        if s.contains(':') {
            Prefix6::parse(s).map(Prefix::V6)
        } else {
            Prefix4::parse(s).map(Prefix::V4)
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Prefix::V4(_) => Family::V4,
            Prefix::V6(_) => Family::V6,
        }
    }
}

fn split_slash(s: &str) -> Result<(&str, u8)> {
    let s = s.trim();
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| CoreError::InvalidPrefix(s.to_string()))?;
    let len: u8 = len
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidPrefix(s.to_string()))?;
    Ok((addr.trim(), len))
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl fmt::Display for Prefix6 {
    // RFC 5952 form via the std Ipv6Addr renderer; stable, so clients can
    // deduplicate lexically.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
        }
    }
}

impl Serialize for Prefix4 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Prefix6 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
