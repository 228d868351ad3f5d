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

//! Tight encoding (lossless modes).
//!
//! Routes each rectangle to one of four sub-encodings based on the
//! analyzer's palette: solid fill (1 colour), mono rect (2 colours,
//! 1-bit bitmap), indexed palette, or full-colour zlib. The zlib
//! streams maintain dictionary state across rectangles, which is why
//! this encoder carries the `ORDERED` flag: rectangles must reach it in
//! submission order, one at a time.

use std::sync::atomic::{AtomicI32, Ordering};

use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression};
use parking_lot::Mutex;

use super::common::{compress_stream, pixel_words, write_pixel};
use crate::connparams::ConnParams;
use crate::encoder::{flags, Encoder};
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::{Palette, MAX_PALETTE_SIZE};
use crate::protocol::{PixelFormat, ENCODING_TIGHT};

// Tight control-byte constants.
const TIGHT_EXPLICIT_FILTER: u8 = 0x04;
const TIGHT_FILL: u8 = 0x08;
const TIGHT_FILTER_PALETTE: u8 = 0x01;

/// Stream ID for full-colour data.
const STREAM_ID_FULL_COLOUR: u8 = 0;
/// Stream ID for mono-rect bitmaps.
const STREAM_ID_MONO: u8 = 1;
/// Stream ID for indexed-palette data.
const STREAM_ID_INDEXED: u8 = 2;

/// Minimum data size worth compressing; smaller payloads go on the wire
/// uncompressed with no length header.
const TIGHT_MIN_TO_COMPRESS: usize = 12;

/// Implements the Tight encoding's lossless modes over persistent zlib
/// streams.
pub struct TightEncoder {
    compress_level: AtomicI32,
    streams: Mutex<[Option<Compress>; 3]>,
}

impl TightEncoder {
    /// Create an encoder with fresh zlib streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compress_level: AtomicI32::new(-1),
            streams: Mutex::new([None, None, None]),
        }
    }

    /// Compress `data` through the given persistent stream and append
    /// it with a compact length, or append it raw when too small to be
    /// worth compressing.
    fn compress_into(&self, stream_id: u8, data: &[u8], out: &mut BytesMut) -> Result<()> {
        if data.len() < TIGHT_MIN_TO_COMPRESS {
            out.put_slice(data);
            return Ok(());
        }

        let mut streams = self.streams.lock();
        let stream = streams[stream_id as usize].get_or_insert_with(|| {
            let level = match self.compress_level.load(Ordering::Relaxed) {
                -1 => Compression::default(),
                l => Compression::new(l.clamp(0, 9) as u32),
            };
            Compress::new(level, true)
        });

        let compressed = compress_stream(stream, data)?;
        write_compact_length(out, compressed.len());
        out.put_slice(&compressed);
        Ok(())
    }

    /// Current stream-creation compression level, for tests.
    #[cfg(test)]
    pub(crate) fn compress_level(&self) -> i32 {
        self.compress_level.load(Ordering::Relaxed)
    }
}

impl Default for TightEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for TightEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_TIGHT
    }

    fn flags(&self) -> u32 {
        flags::ORDERED
    }

    fn max_palette_size(&self) -> usize {
        MAX_PALETTE_SIZE
    }

    fn is_supported(&self, cp: &ConnParams) -> bool {
        cp.supports_encoding(ENCODING_TIGHT)
    }

    fn set_compress_level(&self, level: i32) {
        // Applies to streams created after this point; live streams
        // keep their dictionary (and level) so the peer stays in sync.
        self.compress_level.store(level, Ordering::Relaxed);
    }

    fn write_rect(
        &self,
        pb: &dyn PixelBuffer,
        palette: &Palette,
        cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        let pf = cp.pf();
        let pixels = pixel_words(pb);
        let width = pb.width() as usize;

        match palette.size() {
            0 => {
                // Full-colour zlib, stream 0, no filter.
                out.put_u8(STREAM_ID_FULL_COLOUR << 4);
                let packed = pack_pixels(&pixels, pf);
                self.compress_into(STREAM_ID_FULL_COLOUR, &packed, out)
            }
            1 => {
                write_fill(pf, palette.colour(0), out);
                Ok(())
            }
            2 => {
                let bg = palette.colour(0);
                let fg = palette.colour(1);
                let bitmap = encode_mono_bitmap(&pixels, width, bg);

                out.put_u8((STREAM_ID_MONO | TIGHT_EXPLICIT_FILTER) << 4);
                out.put_u8(TIGHT_FILTER_PALETTE);
                out.put_u8(1); // palette size minus one
                write_packed_pixel(out, pf, bg);
                write_packed_pixel(out, pf, fg);
                self.compress_into(STREAM_ID_MONO, &bitmap, out)
            }
            size => {
                let indices: Vec<u8> = pixels
                    .iter()
                    .map(|&p| palette.index_of(p).unwrap_or(0) as u8)
                    .collect();

                out.put_u8((STREAM_ID_INDEXED | TIGHT_EXPLICIT_FILTER) << 4);
                out.put_u8(TIGHT_FILTER_PALETTE);
                out.put_u8((size - 1) as u8);
                for i in 0..size {
                    write_packed_pixel(out, pf, palette.colour(i));
                }
                self.compress_into(STREAM_ID_INDEXED, &indices, out)
            }
        }
    }

    fn write_solid_rect(
        &self,
        _width: i32,
        _height: i32,
        pf: &PixelFormat,
        colour: &[u8],
        _cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        write_fill(pf, pf.pixel_from_bytes(colour), out);
        Ok(())
    }
}

/// Emit a fill sub-rectangle: control byte plus one packed pixel.
fn write_fill(pf: &PixelFormat, pixel: u32, out: &mut BytesMut) {
    out.put_u8(TIGHT_FILL << 4);
    write_packed_pixel(out, pf, pixel);
}

/// Write one pixel, using Tight's 3-byte packed form when the peer
/// format allows it.
fn write_packed_pixel(out: &mut BytesMut, pf: &PixelFormat, pixel: u32) {
    if pf.is_tight_packable() {
        out.put_u8((pixel >> pf.red_shift) as u8);
        out.put_u8((pixel >> pf.green_shift) as u8);
        out.put_u8((pixel >> pf.blue_shift) as u8);
    } else {
        write_pixel(out, pf, pixel);
    }
}

/// Pack a rectangle's pixels for the full-colour path.
fn pack_pixels(pixels: &[u32], pf: &PixelFormat) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(pixels.len() * pf.bytes_per_pixel());
    for &pixel in pixels {
        write_packed_pixel(&mut out, pf, pixel);
    }
    out.to_vec()
}

/// Encode pixels as a 1-bit bitmap: 0 = background, 1 = foreground.
/// MSB first, each row byte-aligned.
fn encode_mono_bitmap(pixels: &[u32], width: usize, bg: u32) -> Vec<u8> {
    let height = pixels.len() / width;
    let bytes_per_row = width.div_ceil(8);
    let mut bitmap = Vec::with_capacity(bytes_per_row * height);

    for row in pixels.chunks_exact(width) {
        let mut byte_val = 0u8;
        let mut bit_pos = 7i32;

        for &pixel in row {
            if pixel != bg {
                byte_val |= 1 << bit_pos;
            }

            if bit_pos == 0 {
                bitmap.push(byte_val);
                byte_val = 0;
                bit_pos = 7;
            } else {
                bit_pos -= 1;
            }
        }

        if width % 8 != 0 {
            bitmap.push(byte_val);
        }
    }

    bitmap
}

/// Write Tight's compact length encoding (1-3 bytes).
fn write_compact_length(out: &mut BytesMut, len: usize) {
    if len < 128 {
        out.put_u8(len as u8);
    } else if len < 16384 {
        out.put_u8(((len & 0x7F) | 0x80) as u8);
        out.put_u8((len >> 7) as u8);
    } else {
        out.put_u8(((len & 0x7F) | 0x80) as u8);
        out.put_u8((((len >> 7) & 0x7F) | 0x80) as u8);
        out.put_u8((len >> 14) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::geometry::Rect;

    fn cp_with_tight() -> ConnParams {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[ENCODING_TIGHT]);
        cp
    }

    #[test]
    fn test_solid_rect_is_fill() {
        let pf = PixelFormat::rgba32();
        let mut colour = [0u8; 4];
        pf.pixel_to_bytes(0x00AA_BBCC, &mut colour);

        let mut out = BytesMut::new();
        TightEncoder::new()
            .write_solid_rect(64, 64, &pf, &colour, &cp_with_tight(), &mut out)
            .unwrap();

        assert_eq!(out[0], TIGHT_FILL << 4);
        // Packed 24-bit pixel: B, G, R order follows the shifts (0/8/16).
        assert_eq!(&out[1..], &[0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_mono_rect_filter_header() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 16, 16);
        pb.fill_rect(Rect::from_xywh(0, 0, 16, 16), 1);
        pb.fill_rect(Rect::from_xywh(0, 0, 16, 4), 2);

        let mut palette = Palette::new();
        palette.insert(1, 192);
        palette.insert(2, 64);

        let mut out = BytesMut::new();
        TightEncoder::new()
            .write_rect(&pb, &palette, &cp_with_tight(), &mut out)
            .unwrap();

        assert_eq!(out[0], (STREAM_ID_MONO | TIGHT_EXPLICIT_FILTER) << 4);
        assert_eq!(out[1], TIGHT_FILTER_PALETTE);
        assert_eq!(out[2], 1);
    }

    #[test]
    fn test_indexed_rect_lists_palette() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 8, 8);
        let mut palette = Palette::new();
        for y in 0..8 {
            pb.fill_rect(Rect::from_xywh(0, y, 8, 1), (y % 4) as u32);
        }
        for c in 0..4u32 {
            palette.insert(c, 16);
        }

        let mut out = BytesMut::new();
        TightEncoder::new()
            .write_rect(&pb, &palette, &cp_with_tight(), &mut out)
            .unwrap();

        assert_eq!(out[0], (STREAM_ID_INDEXED | TIGHT_EXPLICIT_FILTER) << 4);
        assert_eq!(out[2], 3); // 4 colours
    }

    #[test]
    fn test_full_colour_small_rect_uncompressed() {
        // 2x1 packs to 6 bytes: below the compression threshold the
        // payload is emitted as-is with no length header.
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 2, 1);
        pb.set_pixel(0, 0, 0x00010203);
        pb.set_pixel(1, 0, 0x00040506);

        let mut out = BytesMut::new();
        TightEncoder::new()
            .write_rect(&pb, &Palette::new(), &cp_with_tight(), &mut out)
            .unwrap();

        assert_eq!(out[0], 0x00);
        assert_eq!(out.len(), 1 + 6);
    }

    #[test]
    fn test_mono_bitmap_layout() {
        // 9 pixels wide: rows are byte-aligned to 2 bytes.
        let mut pixels = vec![0u32; 18];
        pixels[0] = 1; // first pixel foreground
        pixels[17] = 1; // last pixel foreground
        let bitmap = encode_mono_bitmap(&pixels, 9, 0);
        assert_eq!(bitmap.len(), 4);
        assert_eq!(bitmap[0], 0x80);
        assert_eq!(bitmap[3], 0x80); // 9th pixel of row 1 -> second byte, MSB
    }

    #[test]
    fn test_compact_length() {
        let mut out = BytesMut::new();
        write_compact_length(&mut out, 100);
        assert_eq!(&out[..], &[100]);

        let mut out = BytesMut::new();
        write_compact_length(&mut out, 130);
        assert_eq!(&out[..], &[0x82, 0x01]);

        let mut out = BytesMut::new();
        write_compact_length(&mut out, 20000);
        assert_eq!(out.len(), 3);
    }
}
