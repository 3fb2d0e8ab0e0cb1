//! Binary snapshot codec and atomic file persistence.
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! magic "ECXD" | serial u32 | record... | terminator u32 = 0
//! record: length u32 (type byte + payload) | type u8 | payload
//!   type 1 macro:     nameLen u16 | name | jsonLen u32 | json member array
//!   type 2 v4 bucket: asn u32 | count u32 | count * 5-byte prefix
//!   type 3 v6 bucket: asn u32 | count u32 | count * 17-byte prefix
//! ```
//!
//! Decode re-canonicalizes every prefix: legacy snapshots may carry host
//! bits, and the repair is logged the same way it is on ingest. Files are
//! replaced by writing a sibling temp file and renaming it into place, so
//! a crashed writer never leaves a torn snapshot behind.

use crate::index::RegistryIndex;
use crate::prefix::{Prefix4, Prefix6};
use crate::{CoreError, Result};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

const MAGIC: [u8; 4] = *b"ECXD";

const REC_MACRO: u8 = 1;
const REC_V4: u8 = 2;
const REC_V6: u8 = 3;

/// Encode a registry index into the framed snapshot form.
///
/// The buffer grows as needed; nothing here assumes an upper bound on
/// registry size.
pub fn encode(index: &RegistryIndex) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4096);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&index.serial.to_be_bytes());

    for (name, members) in &index.macros {
        let json = serde_json::to_vec(members)?;
        let payload = 2 + name.len() + 4 + json.len();
        push_header(&mut out, REC_MACRO, payload);
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(json.len() as u32).to_be_bytes());
        out.extend_from_slice(&json);
    }
    for (asn, bucket) in &index.asnv4 {
        push_header(&mut out, REC_V4, 8 + bucket.len() * Prefix4::WIRE_LEN);
        out.extend_from_slice(&asn.to_be_bytes());
        out.extend_from_slice(&(bucket.len() as u32).to_be_bytes());
        for prefix in bucket {
            out.extend_from_slice(&prefix.to_wire());
        }
    }
    for (asn, bucket) in &index.asnv6 {
        push_header(&mut out, REC_V6, 8 + bucket.len() * Prefix6::WIRE_LEN);
        out.extend_from_slice(&asn.to_be_bytes());
        out.extend_from_slice(&(bucket.len() as u32).to_be_bytes());
        for prefix in bucket {
            out.extend_from_slice(&prefix.to_wire());
        }
    }

    out.extend_from_slice(&0u32.to_be_bytes());
    Ok(out)
}

fn push_header(out: &mut Vec<u8>, tag: u8, payload: usize) {
    out.extend_from_slice(&(1 + payload as u32).to_be_bytes());
    out.push(tag);
}

/// Decode a snapshot buffer back into a registry index.
pub fn decode(buf: &[u8]) -> Result<RegistryIndex> {
    let mut cur = Cursor { buf, pos: 0 };
    let magic = cur.take(4)?;
    if magic != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic);
        return Err(CoreError::SnapshotMagic { found });
    }
    let serial = cur.u32()?;
    let mut index = RegistryIndex::new(serial);

    loop {
        let len = cur.u32()?;
        if len == 0 {
            break;
        }
        let tag = cur.u8()?;
        let payload = cur.take(len as usize - 1)?;
        let mut rec = Cursor {
            buf: payload,
            pos: 0,
        };
        match tag {
            REC_MACRO => {
                let name_len = rec.u16()? as usize;
                let name = std::str::from_utf8(rec.take(name_len)?)
                    .map_err(|_| CoreError::SnapshotRecord("macro name is not utf-8".into()))?
                    .to_string();
                let json_len = rec.u32()? as usize;
                let members: Vec<String> = serde_json::from_slice(rec.take(json_len)?)?;
                index.macros.insert(name, members);
            }
            REC_V4 => {
                let asn = rec.u32()?;
                let count = rec.u32()? as usize;
                let mut bucket = Vec::with_capacity(rec.remaining() / Prefix4::WIRE_LEN);
                for _ in 0..count {
                    let wire = rec.take(Prefix4::WIRE_LEN)?;
                    let mut w = [0u8; Prefix4::WIRE_LEN];
                    w.copy_from_slice(wire);
                    bucket.push(Prefix4::from_wire(w)?);
                }
                index.asnv4.insert(asn, bucket);
            }
            REC_V6 => {
                let asn = rec.u32()?;
                let count = rec.u32()? as usize;
                let mut bucket = Vec::with_capacity(rec.remaining() / Prefix6::WIRE_LEN);
                for _ in 0..count {
                    let wire = rec.take(Prefix6::WIRE_LEN)?;
                    let mut w = [0u8; Prefix6::WIRE_LEN];
                    w.copy_from_slice(wire);
                    bucket.push(Prefix6::from_wire(w)?);
                }
                index.asnv6.insert(asn, bucket);
            }
            other => return Err(CoreError::SnapshotRecordType { tag: other }),
        }
    }
    Ok(index)
}

/// Read and decode a snapshot file.
pub fn read_file(path: &Path) -> Result<RegistryIndex> {
    let buf = std::fs::read(path)?;
    let index = decode(&buf)?;
    debug!(path = %path.display(), serial = index.serial, "loaded snapshot");
    Ok(index)
}

/// Encode and atomically replace `path`.
///
/// On failure the previous snapshot file is left untouched.
pub fn write_file(path: &Path, index: &RegistryIndex) -> Result<()> {
    let buf = encode(index)?;
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
    tmp.write_all(&buf)?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    info!(
        path = %path.display(),
        serial = index.serial,
        bytes = buf.len(),
        "wrote snapshot"
    );
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(CoreError::SnapshotTruncated { offset: self.pos });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;

    fn sample_index() -> RegistryIndex {
        let mut index = RegistryIndex::new(4242);
        index.apply_macro("AS-CHAOS", vec!["AS64500".into(), "AS-SUB".into()], false);
        index.apply_macro("AS-SUB", vec!["AS64501".into()], false);
        index.apply_route(
            Prefix::V4(Prefix4::parse("10.0.0.0/8").unwrap()),
            64500,
            false,
        );
        index.apply_route(
            Prefix::V4(Prefix4::parse("10.0.0.0/8").unwrap()),
            64500,
            false,
        );
        index.apply_route(
            Prefix::V6(Prefix6::parse("2001:db8::/32").unwrap()),
            64501,
            false,
        );
        index
    }

    #[test]
    fn test_round_trip() {
        let index = sample_index();
        let decoded = decode(&encode(&index).unwrap()).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_empty_round_trip() {
        let index = RegistryIndex::new(7);
        let decoded = decode(&encode(&index).unwrap()).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = encode(&sample_index()).unwrap();
        buf[..4].copy_from_slice(b"EXXD");
        match decode(&buf) {
            Err(CoreError::SnapshotMagic { found }) => assert_eq!(&found, b"EXXD"),
            other => panic!("expected magic mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_rejected() {
        let buf = encode(&sample_index()).unwrap();
        assert!(matches!(
            decode(&buf[..buf.len() - 6]),
            Err(CoreError::SnapshotTruncated { .. })
        ));
        assert!(decode(&buf[..3]).is_err());
    }

    #[test]
    fn test_unknown_record_type_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(9);
        buf.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            decode(&buf),
            Err(CoreError::SnapshotRecordType { tag: 9 })
        ));
    }

    #[test]
    fn test_decode_recanonicalizes_legacy_prefixes() {
        // Hand-build a v4 bucket record carrying host bits.
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&1u32.to_be_bytes());
        push_header(&mut buf, REC_V4, 8 + Prefix4::WIRE_LEN);
        buf.extend_from_slice(&64500u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&[192, 0, 2, 5, 24]);
        buf.extend_from_slice(&0u32.to_be_bytes());

        let index = decode(&buf).unwrap();
        assert_eq!(index.asnv4[&64500][0].to_string(), "192.0.2.0/24");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.tiny");
        let index = sample_index();
        write_file(&path, &index).unwrap();
        assert_eq!(read_file(&path).unwrap(), index);
        // No stray temp files left next to the snapshot.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_file(&dir.path().join("absent.tiny")),
            Err(CoreError::Io(_))
        ));
    }
}
