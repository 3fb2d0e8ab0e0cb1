//! NRTM realtime session.
//!
//! Protocol v3, line-oriented over a raw TCP connection: we send
//! `-g <db>:3:<from>-LAST`, the mirror answers a `%START` banner, then
//! serial-tagged `ADD`/`DEL` blocks separated by blank lines, closed by
//! `%END`. The serial is committed at `%END`; deltas whose serial does
//! not move past the session's starting point are replays and skipped.
//!
//! The state machine is kept free of socket I/O so the protocol logic can
//! be exercised by feeding it lines.

use crate::{MirrorError, Result};
use std::time::Duration;
use tinyirr_core::{rpsl, RegistryIndex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Abort the session when a packet grows beyond this many lines.
const MAX_PACKET_LINES: usize = 512;
/// ... or beyond this many accumulated bytes (malicious-mirror guard).
const MAX_PACKET_BYTES: usize = 256 * 1024;

/// Tear the session down after this long without a line from the mirror,
/// so a silent but open connection still gets re-polled.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// What a completed session did, reported to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// The committed serial.
    pub serial: u32,
    /// Number of delta objects applied to the index.
    pub applied: u64,
}

enum State {
    AwaitStart,
    AwaitOp,
    ReadPacket,
}

enum Step {
    /// Keep reading.
    Continue,
    /// A packet finished; apply it under the index lock.
    Dispatch,
    /// The mirror closed the stream with `%END`; commit.
    End,
}

/// Line-driven NRTM session state machine.
pub struct Session {
    state: State,
    start_serial: u32,
    latest_serial: u32,
    remove: bool,
    packet: Vec<String>,
    packet_bytes: usize,
    applied: u64,
}

impl Session {
    pub fn new(start_serial: u32) -> Self {
        Self {
            state: State::AwaitStart,
            start_serial,
            latest_serial: start_serial,
            remove: false,
            packet: Vec::new(),
            packet_bytes: 0,
            applied: 0,
        }
    }

    /// The request line that opens a session from `serial`.
    pub fn request_line(db: &str, serial: u32) -> String {
        format!("-g {db}:3:{}-LAST\n", serial.saturating_add(1))
    }

    fn on_line(&mut self, line: &str) -> Result<Step> {
        match self.state {
            State::AwaitStart => {
                if line.starts_with("%START") {
                    debug!(line, "mirror opened the stream");
                    self.state = State::AwaitOp;
                } else {
                    warn!(line, "expected %START");
                }
                Ok(Step::Continue)
            }
            State::AwaitOp => {
                if line.starts_with("%END") {
                    return Ok(Step::End);
                }
                if let Some(serial) = op_serial(line, "ADD ") {
                    self.remove = false;
                    self.latest_serial = serial;
                    self.state = State::ReadPacket;
                } else if let Some(serial) = op_serial(line, "DEL ") {
                    self.remove = true;
                    self.latest_serial = serial;
                    self.state = State::ReadPacket;
                } else if line.starts_with('%') {
                    // Includes a second %START mid-stream; tolerated.
                    warn!(line, "unexpected mirror notice");
                }
                Ok(Step::Continue)
            }
            State::ReadPacket => {
                if line.is_empty() {
                    if self.packet.is_empty() {
                        // Padding before the object; keep waiting.
                        return Ok(Step::Continue);
                    }
                    self.state = State::AwaitOp;
                    return Ok(Step::Dispatch);
                }
                self.packet_bytes += line.len();
                if self.packet.len() >= MAX_PACKET_LINES || self.packet_bytes > MAX_PACKET_BYTES {
                    return Err(MirrorError::Protocol(format!(
                        "oversized packet at serial {}",
                        self.latest_serial
                    )));
                }
                self.packet.push(line.to_string());
                Ok(Step::Continue)
            }
        }
    }

    /// Apply the finished packet. Serials at or below the session start
    /// are replays of data the index already has.
    fn dispatch(&mut self, index: &mut RegistryIndex) {
        let packet = std::mem::take(&mut self.packet);
        self.packet_bytes = 0;
        if self.latest_serial <= self.start_serial {
            debug!(serial = self.latest_serial, "skipping replayed delta");
            return;
        }
        match rpsl::parse_packet(&packet) {
            Some(obj) => {
                index.apply_object(obj, self.remove);
                self.applied += 1;
            }
            None => debug!(
                serial = self.latest_serial,
                "delta object not interpretable"
            ),
        }
    }

    fn commit(&self, index: &mut RegistryIndex) -> SessionSummary {
        index.serial = self.latest_serial;
        SessionSummary {
            serial: self.latest_serial,
            applied: self.applied,
        }
    }

    /// Drive the session over a connected stream until `%END` or error.
    ///
    /// The index lock is taken once per finished packet, so queries
    /// interleave freely with a long-running session.
    pub async fn run<S>(
        mut self,
        stream: S,
        db: &str,
        index: &RwLock<RegistryIndex>,
    ) -> Result<SessionSummary>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(Self::request_line(db, self.start_serial).as_bytes())
            .await?;
        write_half.flush().await?;

        loop {
            let line = tokio::time::timeout(IDLE_TIMEOUT, lines.next_line())
                .await
                .map_err(|_| MirrorError::Idle)??;
            let Some(line) = line else {
                return Err(MirrorError::Protocol(
                    "connection closed before %END".into(),
                ));
            };
            match self.on_line(&line)? {
                Step::Continue => {}
                Step::Dispatch => {
                    let mut guard = index.write().await;
                    self.dispatch(&mut guard);
                }
                Step::End => {
                    let mut guard = index.write().await;
                    let summary = self.commit(&mut guard);
                    info!(
                        serial = summary.serial,
                        applied = summary.applied,
                        "session committed"
                    );
                    return Ok(summary);
                }
            }
        }
    }
}

fn op_serial(line: &str, op: &str) -> Option<u32> {
    line.strip_prefix(op)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyirr_core::{Family, Prefix, Prefix4};

    /// Synchronous driver mirroring the `run` loop.
    fn feed(session: &mut Session, index: &mut RegistryIndex, lines: &[&str]) -> Option<SessionSummary> {
        for line in lines {
            match session.on_line(line).unwrap() {
                Step::Continue => {}
                Step::Dispatch => session.dispatch(index),
                Step::End => return Some(session.commit(index)),
            }
        }
        None
    }

    #[test]
    fn test_session_applies_add_deltas() {
        let mut index = RegistryIndex::new(100);
        let mut session = Session::new(100);
        let summary = feed(
            &mut session,
            &mut index,
            &[
                "%START Version: 3 test 100-102",
                "ADD 101",
                "route: 10.0.0.0/8",
                "origin: AS1",
                "",
                "ADD 102",
                "as-set: AS-FOO",
                "members: AS1",
                "",
                "%END test",
            ],
        )
        .unwrap();

        assert_eq!(summary, SessionSummary { serial: 102, applied: 2 });
        assert_eq!(index.serial, 102);
        assert_eq!(
            index.prefixes_by_origin(1, Family::V4),
            vec![Prefix::V4(Prefix4::parse("10.0.0.0/8").unwrap())]
        );
        assert_eq!(index.macro_members("AS-FOO"), Some(&["AS1".to_string()][..]));
    }

    #[test]
    fn test_empty_session_commits_without_deltas() {
        let mut index = RegistryIndex::new(50);
        let mut session = Session::new(50);
        let summary = feed(
            &mut session,
            &mut index,
            &["%START Version: 3 test 50-50", "%END test"],
        )
        .unwrap();
        assert_eq!(summary, SessionSummary { serial: 50, applied: 0 });
        assert_eq!(index.serial, 50);
    }

    #[test]
    fn test_del_delta_removes_prefix() {
        let mut index = RegistryIndex::new(10);
        index.apply_route(
            Prefix::V4(Prefix4::parse("10.0.0.0/8").unwrap()),
            1,
            false,
        );
        let mut session = Session::new(10);
        let summary = feed(
            &mut session,
            &mut index,
            &[
                "%START Version: 3 test 11-11",
                "DEL 11",
                "route: 10.0.0.0/8",
                "origin: AS1",
                "",
                "%END test",
            ],
        )
        .unwrap();
        assert_eq!(summary.serial, 11);
        assert!(index.prefixes_by_origin(1, Family::V4).is_empty());
    }

    #[test]
    fn test_replayed_serials_are_skipped() {
        let mut index = RegistryIndex::new(100);
        let mut session = Session::new(100);
        let summary = feed(
            &mut session,
            &mut index,
            &[
                "%START Version: 3 test 99-100",
                "ADD 99",
                "route: 10.0.0.0/8",
                "origin: AS1",
                "",
                "ADD 100",
                "route: 172.16.0.0/12",
                "origin: AS1",
                "",
                "%END test",
            ],
        )
        .unwrap();
        assert_eq!(summary.applied, 0);
        assert!(index.prefixes_by_origin(1, Family::V4).is_empty());
        assert_eq!(index.serial, 100);
    }

    #[test]
    fn test_second_start_tolerated() {
        let mut index = RegistryIndex::new(1);
        let mut session = Session::new(1);
        let summary = feed(
            &mut session,
            &mut index,
            &[
                "%START Version: 3 test 2-2",
                "%START Version: 3 test 2-2",
                "ADD 2",
                "route: 10.0.0.0/8",
                "origin: AS1",
                "",
                "%END test",
            ],
        )
        .unwrap();
        assert_eq!(summary, SessionSummary { serial: 2, applied: 1 });
    }

    #[test]
    fn test_noise_before_start_is_reported_not_fatal() {
        let mut index = RegistryIndex::new(1);
        let mut session = Session::new(1);
        assert!(feed(
            &mut session,
            &mut index,
            &["% some banner", "nonsense", "%START Version: 3 test 2-2"],
        )
        .is_none());
        assert!(matches!(session.state, State::AwaitOp));
    }

    #[test]
    fn test_oversized_packet_aborts() {
        let mut session = Session::new(1);
        session.on_line("%START Version: 3 test 2-2").unwrap();
        session.on_line("ADD 2").unwrap();
        let long = "x".repeat(1024);
        let result = (0..=MAX_PACKET_LINES).try_for_each(|_| session.on_line(&long).map(|_| ()));
        assert!(matches!(result, Err(MirrorError::Protocol(_))));
    }

    #[test]
    fn test_request_line() {
        assert_eq!(Session::request_line("radb", 1041), "-g radb:3:1042-LAST\n");
        assert_eq!(
            Session::request_line("radb", u32::MAX),
            format!("-g radb:3:{}-LAST\n", u32::MAX)
        );
    }

    #[tokio::test]
    async fn test_run_over_duplex_stream() {
        let (ours, theirs) = tokio::io::duplex(4096);
        let index = RwLock::new(RegistryIndex::new(100));

        let mirror = tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(theirs);
            let mut lines = BufReader::new(read_half).lines();
            let request = lines.next_line().await.unwrap().unwrap();
            assert_eq!(request, "-g test:3:101-LAST");
            write_half
                .write_all(
                    b"%START Version: 3 test 101-101\n\
                      ADD 101\n\
                      route: 192.0.2.0/24\n\
                      origin: AS64500\n\
                      \n\
                      %END test\n",
                )
                .await
                .unwrap();
        });

        let summary = Session::new(100)
            .run(ours, "test", &index)
            .await
            .unwrap();
        assert_eq!(summary, SessionSummary { serial: 101, applied: 1 });
        assert_eq!(index.read().await.serial, 101);
        mirror.await.unwrap();
    }
}
