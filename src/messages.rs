// Copyright 2025 Dustin McAfee
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

//! Reading and writing of the auxiliary RFB messages handled by the
//! pipeline: cut-text, the extended clipboard extension, fences, and
//! the framebuffer-update framing records.
//!
//! The surrounding message router consumes each message's one-byte type
//! tag; [`MsgReader`] handles message bodies only. Oversized payloads
//! are skipped on the wire so parsing stays framed, and the message is
//! dropped. Writers check the peer's capability bits and fail without
//! emitting anything when the peer cannot accept the message.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::config;
use crate::connparams::ConnParams;
use crate::error::{Result, VncError};
use crate::geometry::Rect;
use crate::io::{InStream, OutStream};
use crate::protocol::*;

/// Receiver of decoded auxiliary messages.
///
/// All methods default to ignoring the message, so implementations only
/// override what they care about.
pub trait MsgHandler {
    /// Plain cut-text from the peer. Lines are LF-terminated.
    fn cut_text(&mut self, _text: &str) {}

    /// A fence message.
    fn fence(&mut self, _flags: u32, _data: &[u8]) {}

    /// Extended clipboard capability announcement. `lengths` holds one
    /// maximum size per set format bit, in ascending bit order.
    fn clipboard_caps(&mut self, _flags: u32, _lengths: &[u32]) {}

    /// Peer requests clipboard data in the given formats.
    fn clipboard_request(&mut self, _formats: u32) {}

    /// Peer asks to be notified of available clipboard formats.
    fn clipboard_peek(&mut self) {}

    /// Peer announces the formats it can provide.
    fn clipboard_notify(&mut self, _formats: u32) {}

    /// Peer delivers clipboard data. `buffers` holds one payload per
    /// set format bit, in ascending bit order.
    fn clipboard_provide(&mut self, _flags: u32, _buffers: &[Vec<u8>]) {}
}

/// Decoder for incoming auxiliary message bodies.
pub struct MsgReader<R> {
    is: InStream<R>,
}

impl<R: Read> MsgReader<R> {
    /// Create a reader over the connection's input bytes.
    pub fn new(reader: R) -> Self {
        Self {
            is: InStream::new(reader),
        }
    }

    /// Read a cut-text message body.
    ///
    /// A negative length field (high bit set) reroutes the body to the
    /// extended clipboard extension.
    pub fn read_cut_text(&mut self, handler: &mut dyn MsgHandler) -> Result<()> {
        self.is.skip(3)?;
        let len = self.is.read_u32()?;

        if len & 0x8000_0000 != 0 {
            let body_len = (len as i32).unsigned_abs() as usize;
            return self.read_extended_clipboard(body_len, handler);
        }

        let len = len as usize;
        if len > config::max_cut_text() {
            log::error!("cut text too long ({len} bytes) - ignoring");
            self.is.skip(len)?;
            return Ok(());
        }

        let data = self.is.read_vec(len)?;
        handler.cut_text(&String::from_utf8_lossy(&data));
        Ok(())
    }

    /// Read a fence message body.
    pub fn read_fence(&mut self, handler: &mut dyn MsgHandler) -> Result<()> {
        self.is.skip(3)?;
        let flags = self.is.read_u32()?;
        let len = self.is.read_u8()? as usize;

        if len > FENCE_MAX_DATA_LEN {
            log::error!("ignoring fence with too large payload ({len} bytes)");
            self.is.skip(len)?;
            return Ok(());
        }

        let mut data = [0u8; FENCE_MAX_DATA_LEN];
        self.is.read_bytes(&mut data[..len])?;

        handler.fence(flags, &data[..len]);
        Ok(())
    }

    /// Read an extended clipboard message of `len` body bytes.
    fn read_extended_clipboard(&mut self, len: usize, handler: &mut dyn MsgHandler) -> Result<()> {
        if len < 4 {
            return Err(VncError::Protocol(
                "invalid extended clipboard message length".into(),
            ));
        }
        if len > config::max_cut_text() {
            log::error!("extended clipboard message too long ({len} bytes) - ignoring");
            self.is.skip(len)?;
            return Ok(());
        }

        let flags = self.is.read_u32()?;

        match flags & CLIPBOARD_ACTION_MASK {
            CLIPBOARD_CAPS => {
                let num = (flags & CLIPBOARD_FORMAT_MASK).count_ones() as usize;
                if len != 4 + 4 * num {
                    return Err(VncError::Protocol(
                        "invalid extended clipboard caps message".into(),
                    ));
                }
                let mut lengths = Vec::with_capacity(num);
                for _ in 0..num {
                    lengths.push(self.is.read_u32()?);
                }
                handler.clipboard_caps(flags, &lengths);
            }
            CLIPBOARD_PROVIDE => {
                let body = self.is.read_vec(len - 4)?;
                self.deliver_clipboard_provide(flags, &body, handler)?;
            }
            // These actions carry no payload beyond the flags word; a
            // longer body would leave unread bytes in the stream and
            // desync every following message.
            CLIPBOARD_REQUEST | CLIPBOARD_PEEK | CLIPBOARD_NOTIFY if len != 4 => {
                return Err(VncError::Protocol(
                    "invalid extended clipboard action length".into(),
                ));
            }
            CLIPBOARD_REQUEST => handler.clipboard_request(flags & CLIPBOARD_FORMAT_MASK),
            CLIPBOARD_PEEK => handler.clipboard_peek(),
            CLIPBOARD_NOTIFY => handler.clipboard_notify(flags & CLIPBOARD_FORMAT_MASK),
            _ => {
                return Err(VncError::Protocol(
                    "invalid extended clipboard action".into(),
                ));
            }
        }

        Ok(())
    }

    /// Inflate and unpack a Provide body: one `(u32 length, bytes)`
    /// record per set format bit, in ascending bit order.
    fn deliver_clipboard_provide(
        &mut self,
        flags: u32,
        body: &[u8],
        handler: &mut dyn MsgHandler,
    ) -> Result<()> {
        let corrupt = || VncError::Protocol("corrupt extended clipboard data".into());

        let mut decoder = ZlibDecoder::new(body);
        let mut flags = flags;
        let mut buffers = Vec::new();

        for bit in 0..16 {
            if flags & (1 << bit) == 0 {
                continue;
            }

            let mut len_buf = [0u8; 4];
            decoder.read_exact(&mut len_buf).map_err(|_| corrupt())?;
            let data_len = u32::from_be_bytes(len_buf) as usize;

            if data_len > config::max_cut_text() {
                log::error!("clipboard format {bit} too long ({data_len} bytes) - dropping");
                // The record is still consumed so later formats stay
                // readable.
                let mut remaining = data_len;
                let mut chunk = [0u8; 4096];
                while remaining > 0 {
                    let step = remaining.min(chunk.len());
                    decoder
                        .read_exact(&mut chunk[..step])
                        .map_err(|_| corrupt())?;
                    remaining -= step;
                }
                flags &= !(1 << bit);
                continue;
            }

            let mut data = vec![0u8; data_len];
            decoder.read_exact(&mut data).map_err(|_| corrupt())?;
            buffers.push(data);
        }

        handler.clipboard_provide(flags, &buffers);
        Ok(())
    }
}

/// Encoder for outgoing messages: the auxiliary codec plus the
/// framebuffer-update framing the pipeline drains rectangles through.
pub struct MsgWriter<W: Write> {
    os: OutStream<W>,
    client: bool,
}

impl<W: Write> MsgWriter<W> {
    /// Create a server-side writer over the connection's output bytes.
    pub fn new(writer: W) -> Self {
        Self {
            os: OutStream::new(writer),
            client: false,
        }
    }

    /// Create a client-side writer (message type tags differ).
    pub fn new_client(writer: W) -> Self {
        Self {
            os: OutStream::new(writer),
            client: true,
        }
    }

    /// Total bytes accepted so far, including buffered bytes. Used by
    /// the pipeline's statistics to size individual rectangles.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.os.length()
    }

    /// Push buffered bytes to the transport.
    pub fn flush(&mut self) -> Result<()> {
        self.os.flush()
    }

    // --- Framebuffer update framing ---

    /// Begin a framebuffer update with the given rectangle count
    /// (`0xFFFF` in LastRect mode).
    pub fn write_framebuffer_update_start(&mut self, n_rects: u16) {
        self.os.write_u8(SERVER_MSG_FRAMEBUFFER_UPDATE);
        self.os.pad(1);
        self.os.write_u16(n_rects);
    }

    /// Finish a framebuffer update. In LastRect mode this emits the
    /// sentinel rectangle the peer is waiting for.
    pub fn write_framebuffer_update_end(&mut self, cp: &ConnParams) -> Result<()> {
        if cp.supports_last_rect {
            self.write_rect_header(Rect::default(), PSEUDO_ENCODING_LAST_RECT);
        }
        self.flush()
    }

    /// Emit one CopyRect record.
    pub fn write_copy_rect(&mut self, rect: Rect, src_x: u16, src_y: u16) {
        self.write_rect_header(rect, ENCODING_COPYRECT);
        self.os.write_u16(src_x);
        self.os.write_u16(src_y);
    }

    /// Begin an encoded rectangle.
    pub fn start_rect(&mut self, rect: Rect, encoding: i32) {
        self.write_rect_header(rect, encoding);
    }

    /// Finish an encoded rectangle.
    pub fn end_rect(&mut self) {}

    /// Append an encoded rectangle's payload bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.os.write_bytes(bytes);
    }

    fn write_rect_header(&mut self, rect: Rect, encoding: i32) {
        self.os.write_u16(rect.tl.x as u16);
        self.os.write_u16(rect.tl.y as u16);
        self.os.write_u16(rect.width() as u16);
        self.os.write_u16(rect.height() as u16);
        self.os.write_i32(encoding);
    }

    // --- Auxiliary codec ---

    /// Write a fence message.
    ///
    /// # Errors
    ///
    /// Fails when the peer lacks fence support, the payload exceeds 64
    /// bytes, or `flags` carries unknown bits.
    pub fn write_fence(&mut self, cp: &ConnParams, flags: u32, data: &[u8]) -> Result<()> {
        if !cp.supports_fence {
            return Err(VncError::PeerUnsupported("fences"));
        }
        if data.len() > FENCE_MAX_DATA_LEN {
            return Err(VncError::InvalidOperation("too large fence payload".into()));
        }
        if flags & !FENCE_FLAGS_SUPPORTED != 0 {
            return Err(VncError::InvalidOperation("unknown fence flags".into()));
        }

        self.os.write_u8(if self.client {
            CLIENT_MSG_FENCE
        } else {
            SERVER_MSG_FENCE
        });
        self.os.pad(3);
        self.os.write_u32(flags);
        self.os.write_u8(data.len() as u8);
        self.os.write_bytes(data);
        self.flush()
    }

    /// Write a plain cut-text message.
    pub fn write_cut_text(&mut self, text: &str) -> Result<()> {
        self.os.write_u8(if self.client {
            CLIENT_MSG_CLIENT_CUT_TEXT
        } else {
            SERVER_MSG_SERVER_CUT_TEXT
        });
        self.os.pad(3);
        self.os.write_u32(text.len() as u32);
        self.os.write_bytes(text.as_bytes());
        self.flush()
    }

    /// Announce our extended clipboard capabilities: one maximum length
    /// per set format bit in `caps`, ascending bit order.
    pub fn write_clipboard_caps(
        &mut self,
        cp: &ConnParams,
        caps: u32,
        lengths: &[u32],
    ) -> Result<()> {
        if !cp.supports_extended_clipboard {
            return Err(VncError::PeerUnsupported("extended clipboard"));
        }
        let num = (caps & CLIPBOARD_FORMAT_MASK).count_ones() as usize;
        if lengths.len() != num {
            return Err(VncError::InvalidOperation(
                "clipboard caps length count mismatch".into(),
            ));
        }

        self.start_extended_clipboard(4 + 4 * num);
        self.os.write_u32(caps | CLIPBOARD_CAPS);
        for &len in lengths {
            self.os.write_u32(len);
        }
        self.flush()
    }

    /// Request clipboard data in the given formats.
    pub fn write_clipboard_request(&mut self, cp: &ConnParams, formats: u32) -> Result<()> {
        self.write_clipboard_action(cp, CLIPBOARD_REQUEST, formats)
    }

    /// Ask the peer to notify us of its available formats.
    pub fn write_clipboard_peek(&mut self, cp: &ConnParams) -> Result<()> {
        self.write_clipboard_action(cp, CLIPBOARD_PEEK, 0)
    }

    /// Announce the formats we can provide.
    pub fn write_clipboard_notify(&mut self, cp: &ConnParams, formats: u32) -> Result<()> {
        self.write_clipboard_action(cp, CLIPBOARD_NOTIFY, formats)
    }

    /// Deliver clipboard data: one payload per set format bit in
    /// `formats`, ascending bit order, zlib-compressed on the wire.
    pub fn write_clipboard_provide(
        &mut self,
        cp: &ConnParams,
        formats: u32,
        buffers: &[Vec<u8>],
    ) -> Result<()> {
        if !cp.supports_extended_clipboard {
            return Err(VncError::PeerUnsupported("extended clipboard"));
        }
        if cp.clipboard_flags() & CLIPBOARD_PROVIDE == 0 {
            return Err(VncError::PeerUnsupported("clipboard provide"));
        }
        let num = (formats & CLIPBOARD_FORMAT_MASK).count_ones() as usize;
        if buffers.len() != num {
            return Err(VncError::InvalidOperation(
                "clipboard provide buffer count mismatch".into(),
            ));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        for data in buffers {
            encoder.write_all(&(data.len() as u32).to_be_bytes())?;
            encoder.write_all(data)?;
        }
        let compressed = encoder.finish()?;

        self.start_extended_clipboard(4 + compressed.len());
        self.os.write_u32(formats | CLIPBOARD_PROVIDE);
        self.os.write_bytes(&compressed);
        self.flush()
    }

    fn write_clipboard_action(&mut self, cp: &ConnParams, action: u32, formats: u32) -> Result<()> {
        if !cp.supports_extended_clipboard {
            return Err(VncError::PeerUnsupported("extended clipboard"));
        }
        if cp.clipboard_flags() & action == 0 {
            return Err(VncError::PeerUnsupported("clipboard action"));
        }

        self.start_extended_clipboard(4);
        self.os.write_u32(action | formats);
        self.flush()
    }

    /// Write the cut-text header for an extended clipboard message: the
    /// body length goes on the wire as a negative value.
    fn start_extended_clipboard(&mut self, body_len: usize) {
        self.os.write_u8(if self.client {
            CLIENT_MSG_CLIENT_CUT_TEXT
        } else {
            SERVER_MSG_SERVER_CUT_TEXT
        });
        self.os.pad(3);
        self.os.write_i32(-(body_len as i32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        cut_text: Option<String>,
        fence: Option<(u32, Vec<u8>)>,
        caps: Option<(u32, Vec<u32>)>,
        request: Option<u32>,
        peeked: bool,
        notify: Option<u32>,
        provide: Option<(u32, Vec<Vec<u8>>)>,
    }

    impl MsgHandler for Recorder {
        fn cut_text(&mut self, text: &str) {
            self.cut_text = Some(text.to_string());
        }
        fn fence(&mut self, flags: u32, data: &[u8]) {
            self.fence = Some((flags, data.to_vec()));
        }
        fn clipboard_caps(&mut self, flags: u32, lengths: &[u32]) {
            self.caps = Some((flags, lengths.to_vec()));
        }
        fn clipboard_request(&mut self, formats: u32) {
            self.request = Some(formats);
        }
        fn clipboard_peek(&mut self) {
            self.peeked = true;
        }
        fn clipboard_notify(&mut self, formats: u32) {
            self.notify = Some(formats);
        }
        fn clipboard_provide(&mut self, flags: u32, buffers: &[Vec<u8>]) {
            self.provide = Some((flags, buffers.to_vec()));
        }
    }

    fn clipboard_cp() -> ConnParams {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[PSEUDO_ENCODING_FENCE, PSEUDO_ENCODING_EXTENDED_CLIPBOARD]);
        cp.set_clipboard_caps(
            CLIPBOARD_REQUEST | CLIPBOARD_PEEK | CLIPBOARD_NOTIFY | CLIPBOARD_PROVIDE
                | CLIPBOARD_UTF8
                | CLIPBOARD_HTML,
        );
        cp
    }

    /// Run writer output back through a reader, dropping the type byte
    /// the message router would consume.
    fn read_back(wire: &[u8], read: impl Fn(&mut MsgReader<Cursor<Vec<u8>>>, &mut Recorder)) -> Recorder {
        let mut handler = Recorder::default();
        let mut reader = MsgReader::new(Cursor::new(wire[1..].to_vec()));
        read(&mut reader, &mut handler);
        handler
    }

    #[test]
    fn test_cut_text_round_trip() {
        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_cut_text("hello\nworld")
            .unwrap();
        assert_eq!(wire[0], SERVER_MSG_SERVER_CUT_TEXT);

        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        assert_eq!(handler.cut_text.as_deref(), Some("hello\nworld"));
    }

    #[test]
    fn test_oversized_cut_text_dropped() {
        let text = "x".repeat(config::max_cut_text() + 1);
        let mut wire = Vec::new();
        MsgWriter::new(&mut wire).write_cut_text(&text).unwrap();

        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        assert_eq!(handler.cut_text, None);
    }

    #[test]
    fn test_fence_round_trip() {
        let cp = clipboard_cp();
        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_fence(&cp, FENCE_FLAG_REQUEST, b"ping")
            .unwrap();
        assert_eq!(wire[0], SERVER_MSG_FENCE);

        let handler = read_back(&wire, |r, h| r.read_fence(h).unwrap());
        assert_eq!(handler.fence, Some((FENCE_FLAG_REQUEST, b"ping".to_vec())));
    }

    #[test]
    fn test_fence_rejects_unsupported_peer() {
        let cp = ConnParams::new();
        let mut wire = Vec::new();
        let err = MsgWriter::new(&mut wire).write_fence(&cp, 0, b"").unwrap_err();
        assert!(matches!(err, VncError::PeerUnsupported(_)));
        assert!(wire.is_empty());
    }

    #[test]
    fn test_fence_rejects_unknown_flags() {
        let cp = clipboard_cp();
        let mut wire = Vec::new();
        let err = MsgWriter::new(&mut wire)
            .write_fence(&cp, 1 << 10, b"")
            .unwrap_err();
        assert!(matches!(err, VncError::InvalidOperation(_)));
    }

    #[test]
    fn test_fence_oversized_payload_skipped_on_read() {
        // Hand-build a fence with a 70-byte payload.
        let mut wire = vec![SERVER_MSG_FENCE, 0, 0, 0];
        wire.extend_from_slice(&0u32.to_be_bytes());
        wire.push(70);
        wire.extend_from_slice(&[0u8; 70]);

        let handler = read_back(&wire, |r, h| r.read_fence(h).unwrap());
        assert_eq!(handler.fence, None);
    }

    #[test]
    fn test_clipboard_caps_round_trip() {
        let cp = clipboard_cp();
        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_clipboard_caps(&cp, CLIPBOARD_UTF8 | CLIPBOARD_HTML, &[1024, 2048])
            .unwrap();

        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        let (flags, lengths) = handler.caps.unwrap();
        assert_ne!(flags & CLIPBOARD_CAPS, 0);
        assert_eq!(lengths, vec![1024, 2048]);
    }

    #[test]
    fn test_clipboard_provide_round_trip() {
        let cp = clipboard_cp();
        let bufs = vec![b"utf8 text".to_vec(), b"<b>html</b>".to_vec()];
        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_clipboard_provide(&cp, CLIPBOARD_UTF8 | CLIPBOARD_HTML, &bufs)
            .unwrap();

        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        let (flags, buffers) = handler.provide.unwrap();
        assert_ne!(flags & CLIPBOARD_UTF8, 0);
        assert_ne!(flags & CLIPBOARD_HTML, 0);
        assert_eq!(buffers, bufs);
    }

    #[test]
    fn test_clipboard_provide_oversized_format_cleared() {
        // Build a Provide whose first format exceeds the limit; the
        // second must still be delivered.
        let big = vec![0u8; config::max_cut_text() + 1];
        let small = b"still here".to_vec();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        for data in [&big, &small] {
            encoder.write_all(&(data.len() as u32).to_be_bytes()).unwrap();
            encoder.write_all(data).unwrap();
        }
        let compressed = encoder.finish().unwrap();

        let mut wire = vec![SERVER_MSG_SERVER_CUT_TEXT, 0, 0, 0];
        wire.extend_from_slice(&(-((4 + compressed.len()) as i32)).to_be_bytes());
        wire.extend_from_slice(
            &(CLIPBOARD_PROVIDE | CLIPBOARD_UTF8 | CLIPBOARD_HTML).to_be_bytes(),
        );
        wire.extend_from_slice(&compressed);

        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        let (flags, buffers) = handler.provide.unwrap();
        assert_eq!(flags & CLIPBOARD_UTF8, 0, "oversized format bit not cleared");
        assert_ne!(flags & CLIPBOARD_HTML, 0);
        assert_eq!(buffers, vec![small]);
    }

    #[test]
    fn test_clipboard_request_peek_notify() {
        let cp = clipboard_cp();

        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_clipboard_request(&cp, CLIPBOARD_UTF8)
            .unwrap();
        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        assert_eq!(handler.request, Some(CLIPBOARD_UTF8));

        let mut wire = Vec::new();
        MsgWriter::new(&mut wire).write_clipboard_peek(&cp).unwrap();
        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        assert!(handler.peeked);

        let mut wire = Vec::new();
        MsgWriter::new(&mut wire)
            .write_clipboard_notify(&cp, CLIPBOARD_UTF8)
            .unwrap();
        let handler = read_back(&wire, |r, h| r.read_cut_text(h).unwrap());
        assert_eq!(handler.notify, Some(CLIPBOARD_UTF8));
    }

    #[test]
    fn test_clipboard_action_requires_peer_cap() {
        let mut cp = clipboard_cp();
        cp.set_clipboard_caps(0);
        let mut wire = Vec::new();
        let err = MsgWriter::new(&mut wire)
            .write_clipboard_request(&cp, CLIPBOARD_UTF8)
            .unwrap_err();
        assert!(matches!(err, VncError::PeerUnsupported(_)));
    }

    #[test]
    fn test_clipboard_action_with_payload_is_protocol_error() {
        // A Request whose declared body carries bytes beyond the flags
        // word must fail fast instead of desyncing the stream.
        let mut wire = vec![0, 0, 0]; // pad (type already consumed)
        wire.extend_from_slice(&(-8i32).to_be_bytes());
        wire.extend_from_slice(&(CLIPBOARD_REQUEST | CLIPBOARD_UTF8).to_be_bytes());
        wire.extend_from_slice(&[0u8; 4]);

        let mut reader = MsgReader::new(Cursor::new(wire));
        let mut handler = Recorder::default();
        let err = reader.read_cut_text(&mut handler).unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
        assert_eq!(handler.request, None);

        // Peek and Notify are bounded the same way.
        for action in [CLIPBOARD_PEEK, CLIPBOARD_NOTIFY] {
            let mut wire = vec![0, 0, 0];
            wire.extend_from_slice(&(-5i32).to_be_bytes());
            wire.extend_from_slice(&action.to_be_bytes());
            wire.push(0);

            let mut reader = MsgReader::new(Cursor::new(wire));
            let mut handler = Recorder::default();
            assert!(reader.read_cut_text(&mut handler).is_err());
            assert!(!handler.peeked);
            assert_eq!(handler.notify, None);
        }
    }

    #[test]
    fn test_unknown_clipboard_action_is_protocol_error() {
        let mut wire = vec![0, 0, 0]; // pad (type already consumed)
        wire.extend_from_slice(&(-4i32).to_be_bytes());
        wire.extend_from_slice(&(1u32 << 30).to_be_bytes());

        let mut reader = MsgReader::new(Cursor::new(wire));
        let mut handler = Recorder::default();
        let err = reader.read_cut_text(&mut handler).unwrap_err();
        assert!(matches!(err, VncError::Protocol(_)));
    }

    #[test]
    fn test_short_extended_clipboard_is_protocol_error() {
        let mut wire = vec![0, 0, 0];
        wire.extend_from_slice(&(-2i32).to_be_bytes());
        wire.extend_from_slice(&[0, 0]);

        let mut reader = MsgReader::new(Cursor::new(wire));
        let mut handler = Recorder::default();
        assert!(reader.read_cut_text(&mut handler).is_err());
    }

    #[test]
    fn test_framebuffer_update_framing() {
        let mut wire = Vec::new();
        let mut writer = MsgWriter::new(&mut wire);
        let cp = ConnParams::new();

        writer.write_framebuffer_update_start(2);
        writer.write_copy_rect(Rect::from_xywh(10, 10, 50, 50), 0, 10);
        writer.start_rect(Rect::from_xywh(0, 0, 4, 4), ENCODING_RAW);
        writer.write_bytes(&[0u8; 64]);
        writer.end_rect();
        writer.write_framebuffer_update_end(&cp).unwrap();

        assert_eq!(wire[0], SERVER_MSG_FRAMEBUFFER_UPDATE);
        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 2);
        // CopyRect header follows: x=10.
        assert_eq!(u16::from_be_bytes([wire[4], wire[5]]), 10);
        // No LastRect sentinel without the capability.
        assert_eq!(wire.len(), 4 + 12 + 4 + 12 + 64);
    }

    #[test]
    fn test_last_rect_sentinel() {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[PSEUDO_ENCODING_LAST_RECT]);

        let mut wire = Vec::new();
        let mut writer = MsgWriter::new(&mut wire);
        writer.write_framebuffer_update_start(0xFFFF);
        writer.write_framebuffer_update_end(&cp).unwrap();

        assert_eq!(u16::from_be_bytes([wire[2], wire[3]]), 0xFFFF);
        let encoding = i32::from_be_bytes([wire[12], wire[13], wire[14], wire[15]]);
        assert_eq!(encoding, PSEUDO_ENCODING_LAST_RECT);
    }
}
