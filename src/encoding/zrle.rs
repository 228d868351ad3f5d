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

//! ZRLE (Zlib Run-Length Encoding).
//!
//! Divides the rectangle into 64x64 tiles, encodes each with the best
//! of raw / solid / packed-palette / plain-RLE sub-encodings, and
//! deflates the concatenated tile data through one zlib stream that
//! lives for the whole connection. The persistent dictionary is what
//! makes this encoder `ORDERED`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression};
use parking_lot::Mutex;

use super::common::{compress_stream, pixel_words, write_cpixel};
use crate::connparams::ConnParams;
use crate::encoder::{flags, Encoder};
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::Palette;
use crate::protocol::{PixelFormat, ENCODING_ZRLE};

const TILE_SIZE: usize = 64;

// Tile sub-encoding tags.
const SUBENC_RAW: u8 = 0;
const SUBENC_SOLID: u8 = 1;
const SUBENC_PLAIN_RLE: u8 = 128;

/// Largest tile palette the packed-palette sub-encoding can express.
const MAX_TILE_PALETTE: usize = 16;

/// Implements the ZRLE encoding.
pub struct ZrleEncoder {
    compress_level: AtomicI32,
    stream: Mutex<Option<Compress>>,
}

impl ZrleEncoder {
    /// Create an encoder with a fresh zlib stream.
    #[must_use]
    pub fn new() -> Self {
        Self {
            compress_level: AtomicI32::new(-1),
            stream: Mutex::new(None),
        }
    }

    /// Deflate tile data through the persistent stream and append it
    /// with ZRLE's length prefix.
    fn compress_into(&self, plain: &[u8], out: &mut BytesMut) -> Result<()> {
        let mut guard = self.stream.lock();
        let stream = guard.get_or_insert_with(|| {
            let level = match self.compress_level.load(Ordering::Relaxed) {
                -1 => Compression::default(),
                l => Compression::new(l.clamp(0, 9) as u32),
            };
            Compress::new(level, true)
        });

        let compressed = compress_stream(stream, plain)?;
        out.put_u32(compressed.len() as u32);
        out.put_slice(&compressed);
        Ok(())
    }
}

impl Default for ZrleEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for ZrleEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_ZRLE
    }

    fn flags(&self) -> u32 {
        flags::ORDERED
    }

    fn max_palette_size(&self) -> usize {
        127
    }

    fn is_supported(&self, cp: &ConnParams) -> bool {
        cp.supports_encoding(ENCODING_ZRLE)
    }

    fn set_compress_level(&self, level: i32) {
        // Applies when the stream is first created; an existing stream
        // keeps its dictionary so the peer stays in sync.
        self.compress_level.store(level, Ordering::Relaxed);
    }

    fn write_rect(
        &self,
        pb: &dyn PixelBuffer,
        _palette: &Palette,
        cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        let pf = cp.pf();
        let pixels = pixel_words(pb);
        let width = pb.width() as usize;
        let height = pb.height() as usize;

        let mut plain = BytesMut::new();

        for tile_y in (0..height).step_by(TILE_SIZE) {
            for tile_x in (0..width).step_by(TILE_SIZE) {
                let tile_w = TILE_SIZE.min(width - tile_x);
                let tile_h = TILE_SIZE.min(height - tile_y);

                let mut tile = Vec::with_capacity(tile_w * tile_h);
                for dy in 0..tile_h {
                    let row = (tile_y + dy) * width + tile_x;
                    tile.extend_from_slice(&pixels[row..row + tile_w]);
                }

                encode_tile(&mut plain, &tile, tile_w, pf);
            }
        }

        self.compress_into(&plain, out)
    }

    fn write_solid_rect(
        &self,
        width: i32,
        height: i32,
        pf: &PixelFormat,
        colour: &[u8],
        _cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        let pixel = pf.pixel_from_bytes(colour);

        let mut plain = BytesMut::new();
        let tiles_x = (width as usize).div_ceil(TILE_SIZE);
        let tiles_y = (height as usize).div_ceil(TILE_SIZE);
        for _ in 0..tiles_x * tiles_y {
            plain.put_u8(SUBENC_SOLID);
            write_cpixel(&mut plain, pf, pixel);
        }

        self.compress_into(&plain, out)
    }
}

/// Encode one tile with the cheapest applicable sub-encoding.
fn encode_tile(plain: &mut BytesMut, tile: &[u32], tile_w: usize, pf: &PixelFormat) {
    // Census of the tile, capped just past the packed-palette limit.
    let mut index: HashMap<u32, usize> = HashMap::new();
    let mut order = Vec::new();
    for &pixel in tile {
        if !index.contains_key(&pixel) {
            if order.len() > MAX_TILE_PALETTE {
                break;
            }
            index.insert(pixel, order.len());
            order.push(pixel);
        }
    }

    if order.len() == 1 {
        plain.put_u8(SUBENC_SOLID);
        write_cpixel(plain, pf, order[0]);
        return;
    }

    if order.len() <= MAX_TILE_PALETTE {
        encode_packed_palette(plain, tile, tile_w, pf, &order, &index);
        return;
    }

    // Too many colours: RLE when runs pay for themselves, raw otherwise.
    let runs = count_runs(tile);
    if runs * 2 <= tile.len() {
        encode_plain_rle(plain, tile, pf);
    } else {
        plain.put_u8(SUBENC_RAW);
        for &pixel in tile {
            write_cpixel(plain, pf, pixel);
        }
    }
}

/// Packed-palette sub-encoding: palette then bit-packed indices, rows
/// padded to byte boundaries.
fn encode_packed_palette(
    plain: &mut BytesMut,
    tile: &[u32],
    tile_w: usize,
    pf: &PixelFormat,
    order: &[u32],
    index: &HashMap<u32, usize>,
) {
    let palette_size = order.len();
    plain.put_u8(palette_size as u8);
    for &colour in order {
        write_cpixel(plain, pf, colour);
    }

    let bits = match palette_size {
        2 => 1,
        3..=4 => 2,
        _ => 4,
    };

    for row in tile.chunks(tile_w) {
        let mut byte = 0u8;
        let mut filled = 0u8;
        for &pixel in row {
            let idx = index.get(&pixel).copied().unwrap_or(0) as u8;
            byte = (byte << bits) | idx;
            filled += bits;
            if filled == 8 {
                plain.put_u8(byte);
                byte = 0;
                filled = 0;
            }
        }
        if filled > 0 {
            plain.put_u8(byte << (8 - filled));
        }
    }
}

/// Plain RLE sub-encoding: runs continue across row boundaries; the
/// length is encoded minus one in base-255.
fn encode_plain_rle(plain: &mut BytesMut, tile: &[u32], pf: &PixelFormat) {
    plain.put_u8(SUBENC_PLAIN_RLE);

    let mut i = 0;
    while i < tile.len() {
        let colour = tile[i];
        let mut len = 1;
        while i + len < tile.len() && tile[i + len] == colour {
            len += 1;
        }
        i += len;

        write_cpixel(plain, pf, colour);
        let mut rem = len - 1;
        while rem >= 255 {
            plain.put_u8(255);
            rem -= 255;
        }
        plain.put_u8(rem as u8);
    }
}

fn count_runs(tile: &[u32]) -> usize {
    let mut runs = 0;
    let mut i = 0;
    while i < tile.len() {
        let colour = tile[i];
        while i < tile.len() && tile[i] == colour {
            i += 1;
        }
        runs += 1;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::geometry::Rect;
    use std::io::Read;

    fn cp_with_zrle() -> ConnParams {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[ENCODING_ZRLE]);
        cp
    }

    /// Inflate the ZRLE payload back to tile data.
    fn inflate(out: &[u8]) -> Vec<u8> {
        let len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(out.len(), 4 + len);
        let mut decoder = flate2::read::ZlibDecoder::new(&out[4..]);
        let mut plain = Vec::new();
        // A sync-flushed stream has no terminator; read what is there.
        let mut chunk = [0u8; 4096];
        loop {
            match decoder.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => plain.extend_from_slice(&chunk[..n]),
                Err(_) => break,
            }
        }
        plain
    }

    #[test]
    fn test_solid_rect_single_tile() {
        let pf = PixelFormat::rgba32();
        let mut colour = [0u8; 4];
        pf.pixel_to_bytes(0x00AA_BBCC, &mut colour);

        let mut out = BytesMut::new();
        ZrleEncoder::new()
            .write_solid_rect(64, 64, &pf, &colour, &cp_with_zrle(), &mut out)
            .unwrap();

        let plain = inflate(&out);
        assert_eq!(plain.len(), 1 + 3);
        assert_eq!(plain[0], SUBENC_SOLID);
        assert_eq!(&plain[1..], &[0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_solid_rect_tile_count() {
        let pf = PixelFormat::rgba32();
        let colour = [0u8; 4];

        let mut out = BytesMut::new();
        ZrleEncoder::new()
            .write_solid_rect(130, 65, &pf, &colour, &cp_with_zrle(), &mut out)
            .unwrap();

        // 3x2 tiles, 4 bytes each.
        let plain = inflate(&out);
        assert_eq!(plain.len(), 6 * 4);
    }

    #[test]
    fn test_two_colour_tile_uses_packed_palette() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 8, 8);
        pb.fill_rect(Rect::from_xywh(0, 0, 8, 8), 1);
        pb.fill_rect(Rect::from_xywh(0, 0, 4, 8), 2);

        let mut out = BytesMut::new();
        ZrleEncoder::new()
            .write_rect(&pb, &Palette::new(), &cp_with_zrle(), &mut out)
            .unwrap();

        let plain = inflate(&out);
        assert_eq!(plain[0], 2); // packed palette of two colours
                                 // Palette cpixels follow, then 1 byte per 8-pixel row.
        assert_eq!(plain.len(), 1 + 2 * 3 + 8);
    }

    #[test]
    fn test_stream_persists_across_rects() {
        let enc = ZrleEncoder::new();
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 16, 16);
        pb.fill_rect(Rect::from_xywh(0, 0, 16, 16), 0x00123456);

        let mut first = BytesMut::new();
        enc.write_rect(&pb, &Palette::new(), &cp_with_zrle(), &mut first)
            .unwrap();
        let mut second = BytesMut::new();
        enc.write_rect(&pb, &Palette::new(), &cp_with_zrle(), &mut second)
            .unwrap();

        // Both decode against one continuous inflate stream.
        let mut wire = first[4..].to_vec();
        wire.extend_from_slice(&second[4..]);
        let mut decoder = flate2::read::ZlibDecoder::new(&wire[..]);
        let mut plain = vec![0u8; 2 * 4];
        decoder.read_exact(&mut plain).unwrap();
        assert_eq!(plain[0], SUBENC_SOLID);
        assert_eq!(plain[4], SUBENC_SOLID);
    }

    #[test]
    fn test_plain_rle_run_lengths() {
        let mut plain = BytesMut::new();
        let tile: Vec<u32> = std::iter::repeat(7).take(300).collect();
        encode_plain_rle(&mut plain, &tile, &PixelFormat::rgba32());

        assert_eq!(plain[0], SUBENC_PLAIN_RLE);
        // One run of 300: cpixel then 255 + 44.
        assert_eq!(plain[4], 255);
        assert_eq!(plain[5], 44);
        assert_eq!(plain.len(), 6);
    }
}
