//! Per-registry in-memory tables.
//!
//! One `RegistryIndex` holds everything the cache knows about a single
//! registry: the committed mirror serial, the as-set macro table and the
//! per-family origin buckets. The index is mutated only by its registry's
//! synchronizer; queries read it through the shared lock.

use crate::prefix::{Family, Prefix, Prefix4, Prefix6};
use crate::rpsl::RpslObject;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// In-memory tables for one registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RegistryIndex {
    /// Last committed mirror serial.
    pub serial: u32,
    /// as-set name to member tokens, both uppercased.
    pub macros: HashMap<String, Vec<String>>,
    /// Origin ASN to IPv4 prefixes. Duplicates in the feed are preserved.
    pub asnv4: HashMap<u32, Vec<Prefix4>>,
    /// Origin ASN to IPv6 prefixes.
    pub asnv6: HashMap<u32, Vec<Prefix6>>,
}

impl RegistryIndex {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            ..Self::default()
        }
    }

    /// Insert or remove a macro definition.
    pub fn apply_macro(&mut self, name: &str, members: Vec<String>, remove: bool) {
        if remove {
            if self.macros.remove(name).is_none() {
                warn!(name, "delete of unknown as-set");
            }
        } else {
            self.macros.insert(name.to_string(), members);
        }
    }

    /// Append or remove one prefix in its origin bucket.
    pub fn apply_route(&mut self, prefix: Prefix, origin: u32, remove: bool) {
        match prefix {
            Prefix::V4(p) => apply_to_bucket(&mut self.asnv4, p, origin, remove),
            Prefix::V6(p) => apply_to_bucket(&mut self.asnv6, p, origin, remove),
        }
    }

    /// Route one parsed object into the tables.
    pub fn apply_object(&mut self, obj: RpslObject, remove: bool) {
        match obj {
            RpslObject::MacroDef { name, members } => self.apply_macro(&name, members, remove),
            RpslObject::RouteV4 { prefix, origin } => {
                self.apply_route(Prefix::V4(prefix), origin, remove);
            }
            RpslObject::RouteV6 { prefix, origin } => {
                self.apply_route(Prefix::V6(prefix), origin, remove);
            }
        }
    }

    /// Member tokens of one as-set.
    pub fn macro_members(&self, name: &str) -> Option<&[String]> {
        self.macros.get(name).map(Vec::as_slice)
    }

    /// Prefixes stored under one origin, family-selected.
    pub fn prefixes_by_origin(&self, origin: u32, family: Family) -> Vec<Prefix> {
        match family {
            Family::V4 => self
                .asnv4
                .get(&origin)
                .map(|b| b.iter().copied().map(Prefix::V4).collect())
                .unwrap_or_default(),
            Family::V6 => self
                .asnv6
                .get(&origin)
                .map(|b| b.iter().copied().map(Prefix::V6).collect())
                .unwrap_or_default(),
        }
    }
}

// Deletion targets the first entry equal to the prefix. A delete that
// matches nothing is logged and otherwise ignored.
fn apply_to_bucket<P>(table: &mut HashMap<u32, Vec<P>>, prefix: P, origin: u32, remove: bool)
where
    P: PartialEq + Copy + fmt::Display,
{
    if remove {
        let removed = table.get_mut(&origin).is_some_and(|bucket| {
            match bucket.iter().position(|p| *p == prefix) {
                Some(pos) => {
                    bucket.remove(pos);
                    true
                }
                None => false,
            }
        });
        if !removed {
            warn!(origin, prefix = %prefix, "delete of prefix not present in bucket");
        }
    } else {
        table.entry(origin).or_default().push(prefix);
    }
}
