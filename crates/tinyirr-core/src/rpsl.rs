//! RPSL object parsing.
//!
//! A packet is the run of non-empty `attribute: value` lines making up one
//! registry object; the surrounding stream separates packets with blank
//! lines. Only `as-set`, `route` and `route6` objects are interpreted, and
//! only when the defining attribute comes first. Everything else is noise
//! as far as the cache is concerned.

use crate::prefix::{Prefix4, Prefix6};
use tracing::debug;

/// One semantically interpreted RPSL object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpslObject {
    /// An `as-set` definition and its member tokens (uppercased).
    MacroDef { name: String, members: Vec<String> },
    /// An IPv4 `route` object.
    RouteV4 { prefix: Prefix4, origin: u32 },
    /// An IPv6 `route6` object.
    RouteV6 { prefix: Prefix6, origin: u32 },
}

/// Parse `ASnnn` (case-insensitive) into the numeric ASN.
pub fn parse_asn(s: &str) -> Option<u32> {
    let t = s.trim();
    if !t.get(..2)?.eq_ignore_ascii_case("as") {
        return None;
    }
    t[2..].parse().ok()
}

enum Kind {
    Macro,
    RouteV4,
    RouteV6,
}

/// Split an `attribute: value` line, stripping a trailing `# comment`.
/// Returns `None` for continuation lines (no attribute pattern).
fn split_attribute(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    let value = match rest.find('#') {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    Some((key, value.trim()))
}

/// Parse one packet. Returns `None` when the leading attribute is none of
/// `as-set`, `route`, `route6`, or when a route object is unusable.
pub fn parse_packet(lines: &[String]) -> Option<RpslObject> {
    let mut kind: Option<Kind> = None;
    let mut name = String::new();
    let mut prefix_str = String::new();
    let mut members: Vec<String> = Vec::new();
    let mut origin: Option<u32> = None;
    let mut last_key = String::new();

    for (i, raw) in lines.iter().enumerate() {
        let (key, value) = match split_attribute(raw) {
            Some((k, v)) => (k.to_ascii_lowercase(), v.to_string()),
            // Continuation: inherit the previous attribute's key.
            None => (last_key.clone(), raw.trim().to_string()),
        };
        if i == 0 {
            match key.as_str() {
                "as-set" => {
                    kind = Some(Kind::Macro);
                    name = value.to_ascii_uppercase();
                }
                "route" => {
                    kind = Some(Kind::RouteV4);
                    prefix_str = value;
                }
                "route6" => {
                    kind = Some(Kind::RouteV6);
                    prefix_str = value;
                }
                _ => return None,
            }
        } else {
            match key.as_str() {
                "members" => {
                    for token in value.split(',') {
                        let token = token.trim();
                        if !token.is_empty() {
                            members.push(token.to_ascii_uppercase());
                        }
                    }
                }
                "origin" => match parse_asn(&value) {
                    Some(asn) => origin = Some(asn),
                    None => debug!(value = %value, "unparseable origin attribute"),
                },
                _ => {}
            }
        }
        last_key = key;
    }

    match kind? {
        Kind::Macro => Some(RpslObject::MacroDef { name, members }),
        Kind::RouteV4 => {
            let prefix = match Prefix4::parse(&prefix_str) {
                Ok(p) => p,
                Err(err) => {
                    debug!(value = %prefix_str, error = %err, "unparseable route prefix");
                    return None;
                }
            };
            Some(RpslObject::RouteV4 {
                prefix,
                origin: origin?,
            })
        }
        Kind::RouteV6 => {
            let prefix = match Prefix6::parse(&prefix_str) {
                Ok(p) => p,
                Err(err) => {
                    debug!(value = %prefix_str, error = %err, "unparseable route6 prefix");
                    return None;
                }
            };
            Some(RpslObject::RouteV6 {
                prefix,
                origin: origin?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_parse_asn() {
        assert_eq!(parse_asn("AS64500"), Some(64500));
        assert_eq!(parse_asn("as64500"), Some(64500));
        assert_eq!(parse_asn(" AS1 "), Some(1));
        assert_eq!(parse_asn("AS-CHAOS"), None);
        assert_eq!(parse_asn("64500"), None);
        assert_eq!(parse_asn("AS"), None);
    }

    #[test]
    fn test_route_object() {
        let obj = parse_packet(&packet(&[
            "route: 10.0.0.0/8",
            "descr: test network",
            "origin: AS64500",
            "mnt-by: MAINT-TEST",
        ]))
        .unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV4 {
                prefix: Prefix4::parse("10.0.0.0/8").unwrap(),
                origin: 64500,
            }
        );
    }

    #[test]
    fn test_route6_object() {
        let obj = parse_packet(&packet(&["route6: 2001:db8::/32", "origin: AS64501"])).unwrap();
        assert_eq!(
            obj,
            RpslObject::RouteV6 {
                prefix: Prefix6::parse("2001:db8::/32").unwrap(),
                origin: 64501,
            }
        );
    }

    #[test]
    fn test_as_set_with_comments_and_continuation() {
        let obj = parse_packet(&packet(&[
            "as-set: as-chaos # the macro",
            "descr: example",
            "members: AS64500, as64501 # two members",
            "  AS-NESTED, ,",
            "members: AS64502",
        ]))
        .unwrap();
        assert_eq!(
            obj,
            RpslObject::MacroDef {
                name: "AS-CHAOS".into(),
                members: vec![
                    "AS64500".into(),
                    "AS64501".into(),
                    "AS-NESTED".into(),
                    "AS64502".into(),
                ],
            }
        );
    }

    #[test]
    fn test_defining_attribute_must_come_first() {
        assert_eq!(
            parse_packet(&packet(&["descr: test", "route: 10.0.0.0/8", "origin: AS1"])),
            None
        );
        assert_eq!(parse_packet(&packet(&["person: Some Body"])), None);
    }

    #[test]
    fn test_route_without_origin_dropped() {
        assert_eq!(parse_packet(&packet(&["route: 10.0.0.0/8"])), None);
        assert_eq!(
            parse_packet(&packet(&["route: 10.0.0.0/8", "origin: ASxyz"])),
            None
        );
    }

    #[test]
    fn test_route_prefix_canonicalized() {
        let obj = parse_packet(&packet(&["route: 192.0.2.5/24", "origin: AS64500"])).unwrap();
        match obj {
            RpslObject::RouteV4 { prefix, .. } => assert_eq!(prefix.to_string(), "192.0.2.0/24"),
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn test_empty_member_list() {
        let obj = parse_packet(&packet(&["as-set: AS-EMPTY", "descr: nothing here"])).unwrap();
        assert_eq!(
            obj,
            RpslObject::MacroDef {
                name: "AS-EMPTY".into(),
                members: vec![],
            }
        );
    }

    #[test]
    fn test_ipv6_continuation_not_treated_as_attribute() {
        // A continuation line starting with a hex group has a ':' but no
        // attribute name in front of it; it inherits the previous key.
        let obj = parse_packet(&packet(&[
            "as-set: AS-X",
            "remarks: backbone addresses",
            "2001:db8::1 and friends",
        ]))
        .unwrap();
        assert_eq!(
            obj,
            RpslObject::MacroDef {
                name: "AS-X".into(),
                members: vec![],
            }
        );
    }
}
