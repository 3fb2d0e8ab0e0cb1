//! Incremental line and packet framing for dump ingestion.
//!
//! Dumps arrive as arbitrary byte chunks (and usually gzipped), so the
//! ingest path re-frames them into lines and blank-line-separated RPSL
//! packets without ever staging the whole database in memory.

/// Accumulates RPSL packet lines; a blank line closes the packet.
#[derive(Debug, Default)]
pub struct PacketAssembler {
    lines: Vec<String>,
}

impl PacketAssembler {
    /// Feed one line (already stripped of its terminator); returns the
    /// finished packet when `line` is blank and something was buffered.
    pub fn push_line(&mut self, line: &str) -> Option<Vec<String>> {
        if line.is_empty() {
            if self.lines.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.lines))
            }
        } else {
            self.lines.push(line.to_string());
            None
        }
    }

    /// Whatever is still buffered at end of stream.
    pub fn finish(&mut self) -> Option<Vec<String>> {
        if self.lines.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.lines))
        }
    }
}

/// `Write` adapter that re-frames byte chunks into lines.
///
/// Lines are split on `\n` with an optional preceding `\r` stripped.
/// Sitting under `flate2::write::GzDecoder`, this lets gzipped dumps
/// stream straight through to the parser.
pub struct LineSink<F: FnMut(&str)> {
    buf: Vec<u8>,
    on_line: F,
}

impl<F: FnMut(&str)> LineSink<F> {
    pub fn new(on_line: F) -> Self {
        Self {
            buf: Vec::new(),
            on_line,
        }
    }

    /// Flush a trailing unterminated line at end of stream.
    pub fn finish(&mut self) {
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            (self.on_line)(line.trim_end_matches('\r'));
            self.buf.clear();
        }
    }
}

impl<F: FnMut(&str)> std::io::Write for LineSink<F> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let total = data.len();
        let mut rest = data;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.buf.extend_from_slice(&rest[..pos]);
            let line = String::from_utf8_lossy(&self.buf);
            (self.on_line)(line.trim_end_matches('\r'));
            self.buf.clear();
            rest = &rest[pos + 1..];
        }
        self.buf.extend_from_slice(rest);
        Ok(total)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
