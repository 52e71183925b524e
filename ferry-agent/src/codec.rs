// ABOUTME: Newline framing for agent stdout that tolerates invalid UTF-8 and partial reads.
// ABOUTME: Partial lines stay buffered until their newline (or EOF) arrives.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::Decoder;

/// Splits a byte stream into lines.
///
/// Unlike `LinesCodec` this never fails on bad UTF-8: a diagnostic line with
/// garbage bytes is decoded lossily and later discarded by the event decoder.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Where the next newline scan should start, so a long partial line isn't rescanned
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        match buf[self.next_index..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline = self.next_index + offset;
                self.next_index = 0;
                let line = buf.split_to(newline + 1);
                Ok(Some(to_line(&line[..newline])))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if buf.is_empty() {
            return Ok(None);
        }
        let rest = buf.split_to(buf.len());
        Ok(Some(to_line(&rest)))
    }
}
