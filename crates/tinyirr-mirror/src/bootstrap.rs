//! Initial load: fetch the mirror serial and full dump, build a fresh index.

use crate::config::RegistryConfig;
use crate::stream::{LineSink, PacketAssembler};
use crate::{MirrorError, Result};
use flate2::write::GzDecoder;
use futures_util::StreamExt;
use std::io::Write;
use tinyirr_core::rpsl;
use tinyirr_core::RegistryIndex;
use tracing::info;

/// Fetch the mirror's current serial.
pub async fn fetch_serial(client: &reqwest::Client, url: &str) -> Result<u32> {
    let body = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(http_err)?
        .text()
        .await
        .map_err(http_err)?;
    let trimmed = body.trim();
    trimmed
        .parse()
        .map_err(|_| MirrorError::Serial(format!("{url}: unusable serial body {trimmed:?}")))
}

/// Fetch the full dump and stream it into a fresh index.
///
/// The response body is consumed chunk-wise, inflating gzipped dumps as
/// they arrive, so memory stays proportional to one RPSL object rather
/// than the dump size.
pub async fn load(
    client: &reqwest::Client,
    registry: &str,
    cfg: &RegistryConfig,
) -> Result<RegistryIndex> {
    let serial = fetch_serial(client, &cfg.serial_url).await?;
    let mut ingest = Ingest::new(RegistryIndex::new(serial));

    let response = client
        .get(&cfg.dump_url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(http_err)?;
    let gzipped = response.url().path().ends_with(".gz");
    let mut body = response.bytes_stream();

    {
        let sink = LineSink::new(|line| ingest.line(line));
        if gzipped {
            let mut decoder = GzDecoder::new(sink);
            while let Some(chunk) = body.next().await {
                decoder.write_all(&chunk.map_err(http_err)?)?;
            }
            let mut sink = decoder.finish()?;
            sink.finish();
        } else {
            let mut sink = sink;
            while let Some(chunk) = body.next().await {
                sink.write_all(&chunk.map_err(http_err)?)?;
            }
            sink.finish();
        }
    }

    let index = ingest.into_index();
    info!(
        registry,
        serial,
        macros = index.macros.len(),
        v4_origins = index.asnv4.len(),
        v6_origins = index.asnv6.len(),
        "bootstrap complete"
    );
    Ok(index)
}

fn http_err(err: reqwest::Error) -> MirrorError {
    MirrorError::Http(err.to_string())
}

/// Line-by-line dump consumer: assembles packets, parses them, applies
/// the result to the index under construction.
struct Ingest {
    assembler: PacketAssembler,
    index: RegistryIndex,
}

impl Ingest {
    fn new(index: RegistryIndex) -> Self {
        Self {
            assembler: PacketAssembler::default(),
            index,
        }
    }

    fn line(&mut self, line: &str) {
        if let Some(packet) = self.assembler.push_line(line) {
            if let Some(obj) = rpsl::parse_packet(&packet) {
                self.index.apply_object(obj, false);
            }
        }
    }

    fn into_index(mut self) -> RegistryIndex {
        if let Some(packet) = self.assembler.finish() {
            if let Some(obj) = rpsl::parse_packet(&packet) {
                self.index.apply_object(obj, false);
            }
        }
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyirr_core::{Family, Prefix, Prefix4};

    const DUMP: &str = "\
% example dump banner

route: 10.0.0.0/8
descr: first
origin: AS64500

as-set: as-test
members: AS64500, AS-OTHER

person: Not Interpreted
address: nowhere

route6: 2001:db8::/32
origin: AS64500
";

    #[test]
    fn test_ingest_dump_text() {
        let mut ingest = Ingest::new(RegistryIndex::new(100));
        for line in DUMP.lines() {
            ingest.line(line);
        }
        let index = ingest.into_index();

        assert_eq!(index.serial, 100);
        assert_eq!(
            index.prefixes_by_origin(64500, Family::V4),
            vec![Prefix::V4(Prefix4::parse("10.0.0.0/8").unwrap())]
        );
        assert_eq!(
            index.macro_members("AS-TEST"),
            Some(&["AS64500".to_string(), "AS-OTHER".to_string()][..])
        );
        assert_eq!(index.asnv6[&64500].len(), 1);
    }

    #[test]
    fn test_trailing_packet_without_blank_line() {
        let mut ingest = Ingest::new(RegistryIndex::new(1));
        ingest.line("route: 192.0.2.0/24");
        ingest.line("origin: AS64501");
        let index = ingest.into_index();
        assert_eq!(index.asnv4[&64501].len(), 1);
    }
}
