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

//! Common helper functions shared across multiple encoders.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};
use flate2::{Compress, FlushCompress, Status};

use crate::error::{Result, VncError};
use crate::framebuffer::PixelBuffer;
use crate::protocol::PixelFormat;

/// Represents a subrectangle in RRE/Hextile encoding.
#[derive(Debug)]
pub struct Subrect {
    /// The pixel value of this subrectangle.
    pub colour: u32,
    /// The X coordinate of the subrectangle's top-left corner.
    pub x: u16,
    /// The Y coordinate of the subrectangle's top-left corner.
    pub y: u16,
    /// The width of the subrectangle in pixels.
    pub w: u16,
    /// The height of the subrectangle in pixels.
    pub h: u16,
}

/// Read a whole pixel buffer into packed pixel words.
pub fn pixel_words(pb: &dyn PixelBuffer) -> Vec<u32> {
    let pf = *pb.format();
    let bpp = pf.bytes_per_pixel();
    let rect = pb.rect();
    let (buf, stride) = pb.get_buffer(rect);

    let w = rect.width() as usize;
    let h = rect.height() as usize;
    let mut out = Vec::with_capacity(w * h);

    for y in 0..h {
        let row = y * stride * bpp;
        for x in 0..w {
            let off = row + x * bpp;
            out.push(pf.pixel_from_bytes(&buf[off..off + bpp]));
        }
    }
    out
}

/// Write a pixel word to the wire in the peer's format.
pub fn write_pixel(out: &mut BytesMut, pf: &PixelFormat, pixel: u32) {
    let mut bytes = [0u8; 4];
    let n = pf.pixel_to_bytes(pixel, &mut bytes);
    out.put_slice(&bytes[..n]);
}

/// Write a compressed pixel (CPIXEL): 3 bytes when the format's colour
/// bits fit in 24 of its 32, the full pixel otherwise.
pub fn write_cpixel(out: &mut BytesMut, pf: &PixelFormat, pixel: u32) {
    if pf.bits_per_pixel == 32 && pf.depth <= 24 {
        let mut bytes = [0u8; 4];
        pf.pixel_to_bytes(pixel, &mut bytes);
        if pf.big_endian_flag != 0 {
            out.put_slice(&bytes[1..4]);
        } else {
            out.put_slice(&bytes[0..3]);
        }
    } else {
        write_pixel(out, pf, pixel);
    }
}

/// Number of wire bytes one CPIXEL occupies in `pf`.
#[must_use]
pub fn cpixel_len(pf: &PixelFormat) -> usize {
    if pf.bits_per_pixel == 32 && pf.depth <= 24 {
        3
    } else {
        pf.bytes_per_pixel()
    }
}

/// Find the most common pixel value.
#[must_use]
pub fn background_colour(pixels: &[u32]) -> u32 {
    if pixels.is_empty() {
        return 0;
    }

    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &pixel in pixels {
        *counts.entry(pixel).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(colour, _)| colour)
        .unwrap_or(pixels[0])
}

/// Find subrectangles of non-background pixels.
///
/// Greedy cover: for each unclaimed pixel, grow the larger of a
/// width-first and a height-first rectangle of its colour.
pub fn find_subrects(pixels: &[u32], width: usize, height: usize, bg: u32) -> Vec<Subrect> {
    let mut subrects = Vec::new();
    let mut marked = vec![false; pixels.len()];

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if marked[idx] || pixels[idx] == bg {
                continue;
            }

            let colour = pixels[idx];

            // Width-first growth.
            let mut max_w = 0;
            for test_x in x..width {
                let test_idx = y * width + test_x;
                if marked[test_idx] || pixels[test_idx] != colour {
                    break;
                }
                max_w = test_x - x + 1;
            }

            let mut h = 1;
            'rows: for test_y in (y + 1)..height {
                for test_x in x..(x + max_w) {
                    let test_idx = test_y * width + test_x;
                    if marked[test_idx] || pixels[test_idx] != colour {
                        break 'rows;
                    }
                }
                h = test_y - y + 1;
            }

            let mut best_w = max_w;
            let mut best_h = h;

            // Height-first growth.
            let mut max_h = 0;
            for test_y in y..height {
                let test_idx = test_y * width + x;
                if marked[test_idx] || pixels[test_idx] != colour {
                    break;
                }
                max_h = test_y - y + 1;
            }

            let mut w2 = 1;
            'cols: for test_x in (x + 1)..width {
                for test_y in y..(y + max_h) {
                    let test_idx = test_y * width + test_x;
                    if marked[test_idx] || pixels[test_idx] != colour {
                        break 'cols;
                    }
                }
                w2 = test_x - x + 1;
            }

            if w2 * max_h > best_w * best_h {
                best_w = w2;
                best_h = max_h;
            }

            for dy in 0..best_h {
                for dx in 0..best_w {
                    marked[(y + dy) * width + (x + dx)] = true;
                }
            }

            subrects.push(Subrect {
                colour,
                x: x as u16,
                y: y as u16,
                w: best_w as u16,
                h: best_h as u16,
            });
        }
    }

    subrects
}

/// Push `input` through a persistent zlib stream with a sync flush, so
/// the peer can decode the rectangle without closing its stream.
pub fn compress_stream(comp: &mut Compress, input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() / 2 + 64);
    let mut buf = vec![0u8; 16 * 1024];
    let mut pos = 0usize;

    loop {
        let before_in = comp.total_in();
        let before_out = comp.total_out();

        let status = comp
            .compress(&input[pos..], &mut buf, FlushCompress::Sync)
            .map_err(|e| VncError::Encoding(format!("zlib compression failed: {e}")))?;

        pos += (comp.total_in() - before_in) as usize;
        let produced = (comp.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);

        match status {
            Status::StreamEnd => break,
            Status::BufError => {
                return Err(VncError::Encoding("zlib buffer error".into()));
            }
            Status::Ok => {
                // The sync flush is complete once all input is consumed
                // and the output no longer fills the scratch buffer.
                if pos >= input.len() && produced < buf.len() {
                    break;
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;

    #[test]
    fn test_background_colour() {
        assert_eq!(background_colour(&[1, 2, 2, 3, 2]), 2);
        assert_eq!(background_colour(&[]), 0);
    }

    #[test]
    fn test_find_subrects_covers_foreground() {
        // 4x2: background 0 with a 2x2 block of 5 at (1,0).
        let pixels = vec![0, 5, 5, 0, 0, 5, 5, 0];
        let subrects = find_subrects(&pixels, 4, 2, 0);
        assert_eq!(subrects.len(), 1);
        let sr = &subrects[0];
        assert_eq!((sr.x, sr.y, sr.w, sr.h), (1, 0, 2, 2));
        assert_eq!(sr.colour, 5);
    }

    #[test]
    fn test_cpixel_packing() {
        let pf = crate::protocol::PixelFormat::rgba32();
        assert_eq!(cpixel_len(&pf), 3);

        let mut out = BytesMut::new();
        write_cpixel(&mut out, &pf, 0x00AA_BBCC);
        assert_eq!(&out[..], &[0xCC, 0xBB, 0xAA]);

        let pf16 = crate::protocol::PixelFormat::rgb565();
        assert_eq!(cpixel_len(&pf16), 2);
    }

    #[test]
    fn test_compress_stream_round_trips() {
        use std::io::Read;

        let mut comp = Compress::new(Compression::default(), true);
        let first = compress_stream(&mut comp, b"hello hello hello").unwrap();
        let second = compress_stream(&mut comp, b"hello again").unwrap();

        // Both chunks decode against one continuous inflate stream.
        let mut wire = first;
        wire.extend_from_slice(&second);
        let mut decoder = flate2::read::ZlibDecoder::new(&wire[..]);
        let expected = b"hello hello hellohello again";
        let mut out = vec![0u8; expected.len()];
        decoder.read_exact(&mut out).unwrap();
        assert_eq!(&out, expected);
    }
}
