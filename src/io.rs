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

//! Buffered byte streams for RFB protocol communication.
//!
//! Thin buffering layers over `std::io::{Read, Write}` with type-safe
//! methods for primitive values in network byte order. The caller owns
//! the underlying transport; these streams never buffer across message
//! boundaries on the read side and flush whole messages on the write
//! side.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Result;

const READ_CHUNK: usize = 8192;

/// Buffered input stream reading RFB protocol data.
pub struct InStream<R> {
    reader: R,
    buffer: BytesMut,
}

impl<R: Read> InStream<R> {
    /// Create an input stream over `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Ensure at least `n` bytes are buffered.
    fn ensure_bytes(&mut self, n: usize) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.buffer.len() < n {
            let want = (n - self.buffer.len()).min(READ_CHUNK);
            let got = self.reader.read(&mut chunk[..want.max(1)])?;
            if got == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-message",
                )
                .into());
            }
            self.buffer.put_slice(&chunk[..got]);
        }
        Ok(())
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_bytes(1)?;
        Ok(self.buffer.get_u8())
    }

    /// Read a big-endian 16-bit value.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure_bytes(2)?;
        Ok(self.buffer.get_u16())
    }

    /// Read a big-endian 32-bit value.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.ensure_bytes(4)?;
        Ok(self.buffer.get_u32())
    }

    /// Fill `dst` completely.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure_bytes(dst.len())?;
        self.buffer.copy_to_slice(dst);
        Ok(())
    }

    /// Read exactly `n` bytes into a new vector.
    pub fn read_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; n];
        self.read_bytes(&mut out)?;
        Ok(out)
    }

    /// Discard `n` bytes from the stream.
    pub fn skip(&mut self, mut n: usize) -> Result<()> {
        while n > 0 {
            let step = n.min(READ_CHUNK);
            self.ensure_bytes(step)?;
            self.buffer.advance(step);
            n -= step;
        }
        Ok(())
    }
}

/// Buffered output stream writing RFB protocol data.
///
/// Tracks the total number of bytes accepted, which the pipeline's
/// statistics use to measure per-rectangle output sizes.
pub struct OutStream<W> {
    writer: W,
    buffer: BytesMut,
    flushed: u64,
}

impl<W: Write> OutStream<W> {
    /// Create an output stream over `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            flushed: 0,
        }
    }

    /// Total bytes written so far, including bytes still buffered.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.flushed + self.buffer.len() as u64
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buffer.put_u8(v);
    }

    /// Write a big-endian 16-bit value.
    pub fn write_u16(&mut self, v: u16) {
        self.buffer.put_u16(v);
    }

    /// Write a big-endian 32-bit value.
    pub fn write_u32(&mut self, v: u32) {
        self.buffer.put_u32(v);
    }

    /// Write a big-endian signed 32-bit value.
    pub fn write_i32(&mut self, v: i32) {
        self.buffer.put_i32(v);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.put_slice(bytes);
    }

    /// Write `n` zero bytes of padding.
    pub fn pad(&mut self, n: usize) {
        self.buffer.put_bytes(0, n);
    }

    /// Push all buffered bytes to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.flushed += self.buffer.len() as u64;
            self.buffer.clear();
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_primitives() {
        let data = vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut is = InStream::new(Cursor::new(data));
        assert_eq!(is.read_u8().unwrap(), 0x01);
        assert_eq!(is.read_u16().unwrap(), 0x0203);
        assert_eq!(is.read_u32().unwrap(), 0x0405_0607);
    }

    #[test]
    fn test_skip_then_read() {
        let data = vec![0u8; 10].into_iter().chain([0xAB]).collect::<Vec<_>>();
        let mut is = InStream::new(Cursor::new(data));
        is.skip(10).unwrap();
        assert_eq!(is.read_u8().unwrap(), 0xAB);
    }

    #[test]
    fn test_eof_is_error() {
        let mut is = InStream::new(Cursor::new(vec![0x01]));
        assert_eq!(is.read_u8().unwrap(), 0x01);
        assert!(is.read_u8().is_err());
    }

    #[test]
    fn test_write_and_length() {
        let mut sink = Vec::new();
        let mut os = OutStream::new(&mut sink);
        os.write_u8(0xFF);
        os.write_u16(0x1234);
        os.pad(3);
        assert_eq!(os.length(), 6);
        os.flush().unwrap();
        assert_eq!(os.length(), 6);
        assert_eq!(sink, vec![0xFF, 0x12, 0x34, 0, 0, 0]);
    }
}
