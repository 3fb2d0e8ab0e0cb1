//! Macro expansion: a name becomes the prefixes authorized under it.
//!
//! A query name is either `ASnnn`, answered straight from the origin
//! bucket, or an as-set whose member graph is walked depth-first. Member
//! graphs in the wild contain cycles; the visited set suppresses re-entry.

use crate::index::RegistryIndex;
use crate::prefix::{Family, Prefix};
use crate::rpsl::parse_asn;
use std::collections::HashSet;

/// Result of expanding one name against one registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expansion {
    /// Accumulated prefixes in traversal order. Duplicates are preserved,
    /// matching what the registries publish.
    pub prefixes: Vec<Prefix>,
    /// Sub-macros visited during expansion, in traversal order.
    pub macros: Vec<String>,
}

/// Expand `name` (an `ASnnn` or an as-set name) into its prefix set.
///
/// Unknown member macros are skipped silently. The walk uses an explicit
/// stack of member iterators, so pathological registries cannot overflow
/// the call stack; order matches a recursive pre-order walk.
pub fn expand(index: &RegistryIndex, name: &str, family: Family) -> Expansion {
    let name = name.to_ascii_uppercase();
    if let Some(asn) = parse_asn(&name) {
        return Expansion {
            prefixes: index.prefixes_by_origin(asn, family),
            macros: Vec::new(),
        };
    }

    let mut out = Expansion::default();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(name.clone());

    let mut stack: Vec<std::vec::IntoIter<String>> = Vec::new();
    if let Some(members) = index.macro_members(&name) {
        stack.push(members.to_vec().into_iter());
    }
    while let Some(top) = stack.last_mut() {
        let Some(token) = top.next() else {
            stack.pop();
            continue;
        };
        if let Some(asn) = parse_asn(&token) {
            out.prefixes
                .extend(index.prefixes_by_origin(asn, family));
        } else if visited.insert(token.clone()) {
            out.macros.push(token.clone());
            if let Some(members) = index.macro_members(&token) {
                stack.push(members.to_vec().into_iter());
            }
        }
    }
    out
}
