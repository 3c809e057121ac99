//! Minimal OSC 1.0 framing
//!
//! Covers exactly what the VMC dialect needs: string, float32, and int32
//! arguments, plus `#bundle` containers. Strings are null-terminated and
//! zero-padded to 4 bytes; scalars are big-endian.

use bytes::BufMut;

use marionette_core::{MarionetteError, MarionetteResult};

/// Address prefix of an OSC bundle container.
pub const BUNDLE_TAG: &str = "#bundle";

/// Bundles nested deeper than this are rejected as malformed.
const MAX_BUNDLE_DEPTH: usize = 8;

/// Length of an OSC string on the wire: content + terminator, rounded up
/// to the next multiple of 4.
fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

/// One OSC argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscArg<'a> {
    Str(&'a str),
    Float(f32),
    Int(i32),
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    for _ in s.len()..padded_len(s.len()) {
        buf.put_u8(0);
    }
}

/// Encode a single OSC message.
pub fn encode_message(address: &str, args: &[OscArg<'_>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    put_str(&mut buf, address);

    let mut tags = String::with_capacity(args.len() + 1);
    tags.push(',');
    for arg in args {
        tags.push(match arg {
            OscArg::Str(_) => 's',
            OscArg::Float(_) => 'f',
            OscArg::Int(_) => 'i',
        });
    }
    put_str(&mut buf, &tags);

    for arg in args {
        match arg {
            OscArg::Str(s) => put_str(&mut buf, s),
            OscArg::Float(v) => buf.put_f32(*v),
            OscArg::Int(v) => buf.put_i32(*v),
        }
    }
    buf
}

/// Cursor over a received OSC packet.
pub struct OscReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> OscReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        OscReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> MarionetteResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(MarionetteError::BufferTooShort {
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a padded OSC string.
    pub fn read_str(&mut self) -> MarionetteResult<&'a str> {
        let tail = &self.buf[self.pos..];
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| MarionetteError::InvalidPacket("unterminated string".into()))?;
        let s = std::str::from_utf8(&tail[..len])
            .map_err(|_| MarionetteError::InvalidPacket("string is not UTF-8".into()))?;

        let advance = padded_len(len);
        if self.pos + advance > self.buf.len() {
            return Err(MarionetteError::BufferTooShort {
                expected: self.pos + advance,
                actual: self.buf.len(),
            });
        }
        self.pos += advance;
        Ok(s)
    }

    pub fn read_f32(&mut self) -> MarionetteResult<f32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(f32::from_be_bytes(raw))
    }

    pub fn read_i32(&mut self) -> MarionetteResult<i32> {
        let bytes = self.take(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Ok(i32::from_be_bytes(raw))
    }
}

/// Is this packet a `#bundle` container?
pub fn is_bundle(buf: &[u8]) -> bool {
    buf.starts_with(BUNDLE_TAG.as_bytes()) && buf.get(BUNDLE_TAG.len()) == Some(&0)
}

/// Walk a packet, invoking `visit` for every plain message it contains.
///
/// Bundles are flattened recursively; their 8-byte timetags are skipped
/// (the bridge samples against its own clock).
pub fn for_each_message<F>(buf: &[u8], visit: &mut F) -> MarionetteResult<()>
where
    F: FnMut(&[u8]) -> MarionetteResult<()>,
{
    walk(buf, visit, 0)
}

fn walk<F>(buf: &[u8], visit: &mut F, depth: usize) -> MarionetteResult<()>
where
    F: FnMut(&[u8]) -> MarionetteResult<()>,
{
    if depth > MAX_BUNDLE_DEPTH {
        return Err(MarionetteError::InvalidPacket("bundle nesting too deep".into()));
    }
    if !is_bundle(buf) {
        return visit(buf);
    }

    let mut reader = OscReader::new(buf);
    reader.read_str()?; // "#bundle"
    reader.take(8)?; // timetag

    while reader.remaining() > 0 {
        let size = reader.read_i32()?;
        if size < 0 {
            return Err(MarionetteError::InvalidPacket("negative bundle element size".into()));
        }
        let element = reader.take(size as usize)?;
        walk(element, visit, depth + 1)?;
    }
    Ok(())
}

/// Build a `#bundle` packet from pre-encoded messages.
pub fn encode_bundle(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + messages.iter().map(|m| m.len() + 4).sum::<usize>());
    put_str(&mut buf, BUNDLE_TAG);
    buf.put_u64(1); // immediate timetag
    for message in messages {
        buf.put_i32(message.len() as i32);
        buf.extend_from_slice(message);
    }
    buf
}
