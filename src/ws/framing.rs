// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WebSocket frame codec (§4.6 RFC 6455-subset framing): opcode policing,
//! masking, and length encoding. Fragment assembly/emission only; the
//! session loop in [`super::session`] owns message-level semantics.

use std::io::{self, Read, Write};

use thiserror::Error;

/// The GUID RFC 6455 mixes into the handshake accept-key computation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Outgoing frames are split at this boundary (§4.6 "Outgoing
/// fragmentation").
pub const MAX_OUTGOING_FRAGMENT: usize = 65_535;

/// One WebSocket frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// A single decoded frame off the wire.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Frame-level protocol violations (§4.6 "Policing").
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FrameError {
    #[error("reserved bits used")]
    ReservedBitsUsed,
    #[error("nesting")]
    Nesting,
    #[error("unstarted continuation")]
    UnstartedContinuation,
    #[error("fragment too large")]
    FragmentTooLarge,
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("non-final control frame")]
    NonFinalControlFrame,
    #[error("control frame payload too large")]
    ControlFramePayloadTooLarge,
    #[error("connection closed")]
    Closed,
    #[error("io error")]
    Io,
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Closed
        } else {
            FrameError::Io
        }
    }
}

/// Reads one frame from `source`. Client frames are always masked; this
/// unmasks in place before returning.
pub fn read_frame<R: Read>(source: &mut R, max_fragment: usize) -> Result<Frame, FrameError> {
    let mut header = [0u8; 2];
    source.read_exact(&mut header)?;

    let fin = header[0] & 0b1000_0000 != 0;
    let reserved = header[0] & 0b0111_0000;
    if reserved != 0 {
        return Err(FrameError::ReservedBitsUsed);
    }
    let opcode = Opcode::from_byte(header[0] & 0b0000_1111).ok_or(FrameError::UnknownOpcode(header[0] & 0x0F))?;

    let masked = header[1] & 0b1000_0000 != 0;
    let len_field = header[1] & 0b0111_1111;

    let payload_len: u64 = match len_field {
        126 => {
            let mut ext = [0u8; 2];
            source.read_exact(&mut ext)?;
            u16::from_be_bytes(ext) as u64
        }
        127 => {
            let mut ext = [0u8; 8];
            source.read_exact(&mut ext)?;
            u64::from_be_bytes(ext)
        }
        n => n as u64,
    };

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::NonFinalControlFrame);
        }
        if payload_len > 125 {
            return Err(FrameError::ControlFramePayloadTooLarge);
        }
    }

    if payload_len as usize > max_fragment {
        return Err(FrameError::FragmentTooLarge);
    }

    let mask_key = if masked {
        let mut key = [0u8; 4];
        source.read_exact(&mut key)?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len as usize];
    source.read_exact(&mut payload)?;

    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }

    Ok(Frame { fin, opcode, payload })
}

/// Returns true if at least one more byte is immediately available without
/// blocking — used by the session loop to decide whether to keep reading
/// fragments in the same pass (§4.7 step 6).
pub fn has_buffered_input<R: std::io::BufRead>(source: &mut R) -> io::Result<bool> {
    Ok(!source.fill_buf()?.is_empty())
}

/// Writes one unmasked server-to-client frame.
fn write_one_frame<W: Write>(sink: &mut W, fin: bool, opcode: Opcode, payload: &[u8]) -> io::Result<()> {
    let mut header = Vec::with_capacity(10 + payload.len());
    let fin_bit = if fin { 0b1000_0000 } else { 0 };
    header.push(fin_bit | opcode.to_byte());

    let len = payload.len();
    if len <= 125 {
        header.push(len as u8);
    } else if len <= u16::MAX as usize {
        header.push(126);
        header.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        header.push(127);
        header.extend_from_slice(&(len as u64).to_be_bytes());
    }

    sink.write_all(&header)?;
    sink.write_all(payload)?;
    Ok(())
}

/// Writes a whole message, fragmenting at [`MAX_OUTGOING_FRAGMENT`] when
/// needed (§4.6 "Outgoing fragmentation").
pub fn write_message<W: Write>(sink: &mut W, opcode: Opcode, payload: &[u8]) -> io::Result<()> {
    if payload.len() <= MAX_OUTGOING_FRAGMENT {
        return write_one_frame(sink, true, opcode, payload);
    }

    let mut chunks = payload.chunks(MAX_OUTGOING_FRAGMENT).peekable();
    let mut first = true;
    while let Some(chunk) = chunks.next() {
        let is_last = chunks.peek().is_none();
        let chunk_opcode = if first { opcode } else { Opcode::Continuation };
        write_one_frame(sink, is_last, chunk_opcode, chunk)?;
        first = false;
    }
    Ok(())
}

/// Writes a control frame (always a single, final frame, payload ≤ 125).
pub fn write_control<W: Write>(sink: &mut W, opcode: Opcode, payload: &[u8]) -> io::Result<()> {
    debug_assert!(payload.len() <= 125);
    write_one_frame(sink, true, opcode, payload)
}

/// Assembles a sequence of data frames into one message, enforcing the
/// nesting/continuation rules (§4.6).
#[derive(Default)]
pub struct MessageAssembler {
    in_progress: Option<(Opcode, Vec<u8>)>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one data frame in. Returns `Some((opcode, payload))` once a
    /// complete message has been assembled.
    pub fn feed(&mut self, frame: Frame) -> Result<Option<(Opcode, Vec<u8>)>, FrameError> {
        match frame.opcode {
            Opcode::Continuation => {
                let (opcode, mut buffer) = self.in_progress.take().ok_or(FrameError::UnstartedContinuation)?;
                buffer.extend_from_slice(&frame.payload);
                if frame.fin {
                    Ok(Some((opcode, buffer)))
                } else {
                    self.in_progress = Some((opcode, buffer));
                    Ok(None)
                }
            }
            Opcode::Text | Opcode::Binary => {
                if self.in_progress.is_some() {
                    return Err(FrameError::Nesting);
                }
                if frame.fin {
                    Ok(Some((frame.opcode, frame.payload)))
                } else {
                    self.in_progress = Some((frame.opcode, frame.payload));
                    Ok(None)
                }
            }
            Opcode::Close | Opcode::Ping | Opcode::Pong => Ok(Some((frame.opcode, frame.payload))),
        }
    }
}

/// Computes the `Sec-WebSocket-Accept` header value (§4.6 "Handshake
/// response").
pub fn accept_key(client_key: &str) -> String {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mask(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]).collect()
    }

    fn client_frame(fin: bool, opcode: Opcode, payload: &[u8]) -> Vec<u8> {
        let key = [0x12, 0x34, 0x56, 0x78];
        let mut out = Vec::new();
        out.push((if fin { 0x80 } else { 0 }) | opcode.to_byte());
        let masked_len = 0x80 | (payload.len() as u8);
        out.push(masked_len);
        out.extend_from_slice(&key);
        out.extend_from_slice(&mask(payload, key));
        out
    }

    #[test]
    fn accept_key_matches_rfc6455_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn reads_a_masked_text_frame() {
        let bytes = client_frame(true, Opcode::Text, b"hello");
        let mut cursor = Cursor::new(bytes);
        let frame = read_frame(&mut cursor, 1024 * 1024).unwrap();
        assert!(frame.fin);
        assert_eq!(frame.opcode, Opcode::Text);
        assert_eq!(frame.payload, b"hello");
    }

    #[test]
    fn reserved_bits_are_rejected() {
        let mut bytes = client_frame(true, Opcode::Text, b"x");
        bytes[0] |= 0b0100_0000;
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor, 1024).unwrap_err(), FrameError::ReservedBitsUsed);
    }

    #[test]
    fn non_final_control_frame_is_rejected() {
        let bytes = client_frame(false, Opcode::Ping, b"x");
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor, 1024).unwrap_err(), FrameError::NonFinalControlFrame);
    }

    #[test]
    fn oversized_fragment_is_rejected() {
        let bytes = client_frame(true, Opcode::Binary, &vec![0u8; 100]);
        let mut cursor = Cursor::new(bytes);
        assert_eq!(read_frame(&mut cursor, 10).unwrap_err(), FrameError::FragmentTooLarge);
    }

    #[test]
    fn assembler_rejects_continuation_without_start() {
        let mut assembler = MessageAssembler::new();
        let frame = Frame {
            fin: true,
            opcode: Opcode::Continuation,
            payload: vec![],
        };
        assert_eq!(assembler.feed(frame).unwrap_err(), FrameError::UnstartedContinuation);
    }

    #[test]
    fn assembler_rejects_nested_data_frame() {
        let mut assembler = MessageAssembler::new();
        assembler
            .feed(Frame {
                fin: false,
                opcode: Opcode::Text,
                payload: b"a".to_vec(),
            })
            .unwrap();
        let err = assembler
            .feed(Frame {
                fin: true,
                opcode: Opcode::Binary,
                payload: b"b".to_vec(),
            })
            .unwrap_err();
        assert_eq!(err, FrameError::Nesting);
    }

    #[test]
    fn assembler_reassembles_fragmented_message() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler
            .feed(Frame {
                fin: false,
                opcode: Opcode::Text,
                payload: b"hel".to_vec(),
            })
            .unwrap()
            .is_none());
        let (opcode, payload) = assembler
            .feed(Frame {
                fin: true,
                opcode: Opcode::Continuation,
                payload: b"lo".to_vec(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(opcode, Opcode::Text);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn write_message_fragments_long_payloads() {
        let payload = vec![0xABu8; MAX_OUTGOING_FRAGMENT + 10];
        let mut out = Vec::new();
        write_message(&mut out, Opcode::Binary, &payload).unwrap();
        assert_eq!(out[0] & 0b1000_0000, 0);
        assert_eq!(out[0] & 0x0F, Opcode::Binary.to_byte());
    }
}
