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

//! Hextile encoding.
//!
//! Divides the rectangle into 16x16 tiles and encodes each
//! independently. Each tile can be: raw, solid, monochrome with
//! subrects, or coloured with subrects. Background and foreground
//! colours carry over between tiles when unchanged.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::common::{find_subrects, pixel_words, write_pixel};
use crate::connparams::ConnParams;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::{Palette, MAX_PALETTE_SIZE};
use crate::protocol::{PixelFormat, ENCODING_HEXTILE};

// Hextile subencoding flags.
const HEXTILE_RAW: u8 = 1 << 0;
const HEXTILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;
const HEXTILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;
const HEXTILE_ANY_SUBRECTS: u8 = 1 << 3;
const HEXTILE_SUBRECTS_COLOURED: u8 = 1 << 4;

const TILE_SIZE: usize = 16;

/// Implements the Hextile encoding.
pub struct HextileEncoder;

/// Classify tile content.
/// Returns: (is_solid, is_mono, bg_colour, fg_colour)
fn analyze_tile_colours(pixels: &[u32]) -> (bool, bool, u32, u32) {
    let mut colours: HashMap<u32, usize> = HashMap::new();
    for &pixel in pixels {
        *colours.entry(pixel).or_insert(0) += 1;
    }

    match colours.len() {
        0 | 1 => (true, true, pixels.first().copied().unwrap_or(0), 0),
        2 => {
            let mut sorted: Vec<_> = colours.into_iter().collect();
            sorted.sort_by_key(|&(colour, count)| (std::cmp::Reverse(count), colour));
            (false, true, sorted[0].0, sorted[1].0)
        }
        _ => {
            let bg = colours
                .into_iter()
                .max_by_key(|&(_, count)| count)
                .map(|(colour, _)| colour)
                .unwrap_or(0);
            (false, false, bg, 0)
        }
    }
}

fn extract_tile(
    pixels: &[u32],
    width: usize,
    x: usize,
    y: usize,
    tw: usize,
    th: usize,
) -> Vec<u32> {
    let mut tile = Vec::with_capacity(tw * th);
    for dy in 0..th {
        for dx in 0..tw {
            tile.push(pixels[(y + dy) * width + (x + dx)]);
        }
    }
    tile
}

impl Encoder for HextileEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_HEXTILE
    }

    fn max_palette_size(&self) -> usize {
        MAX_PALETTE_SIZE
    }

    fn is_supported(&self, cp: &ConnParams) -> bool {
        cp.supports_encoding(ENCODING_HEXTILE)
    }

    #[allow(clippy::cast_possible_truncation)] // coordinates within a tile fit in a nibble
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

        let mut last_bg: Option<u32> = None;
        let mut last_fg: Option<u32> = None;

        for tile_y in (0..height).step_by(TILE_SIZE) {
            for tile_x in (0..width).step_by(TILE_SIZE) {
                let tile_w = TILE_SIZE.min(width - tile_x);
                let tile_h = TILE_SIZE.min(height - tile_y);

                let tile_pixels = extract_tile(&pixels, width, tile_x, tile_y, tile_w, tile_h);
                let (is_solid, is_mono, bg, fg) = analyze_tile_colours(&tile_pixels);

                let mut subencoding: u8 = 0;
                let tile_start = out.len();
                out.put_u8(0); // patched below

                if is_solid {
                    if Some(bg) != last_bg {
                        subencoding |= HEXTILE_BACKGROUND_SPECIFIED;
                        write_pixel(out, pf, bg);
                        last_bg = Some(bg);
                    }
                } else {
                    let subrects = find_subrects(&tile_pixels, tile_w, tile_h, bg);

                    // Fall back to raw when subrects cannot win.
                    let bpp = pf.bytes_per_pixel();
                    let raw_size = tile_w * tile_h * bpp;
                    let bg_overhead = if Some(bg) == last_bg { 0 } else { bpp };
                    let fg_overhead = if is_mono && Some(fg) != last_fg { bpp } else { 0 };
                    let subrect_data = subrects.len() * if is_mono { 2 } else { 2 + bpp };
                    let encoded_size = bg_overhead + fg_overhead + 1 + subrect_data;

                    if subrects.is_empty() || subrects.len() > 255 || encoded_size > raw_size {
                        out.truncate(tile_start);
                        out.put_u8(HEXTILE_RAW);
                        for &pixel in &tile_pixels {
                            write_pixel(out, pf, pixel);
                        }
                        last_bg = None;
                        last_fg = None;
                        continue;
                    }

                    if Some(bg) != last_bg {
                        subencoding |= HEXTILE_BACKGROUND_SPECIFIED;
                        write_pixel(out, pf, bg);
                        last_bg = Some(bg);
                    }

                    subencoding |= HEXTILE_ANY_SUBRECTS;

                    if is_mono {
                        if Some(fg) != last_fg {
                            subencoding |= HEXTILE_FOREGROUND_SPECIFIED;
                            write_pixel(out, pf, fg);
                            last_fg = Some(fg);
                        }

                        out.put_u8(subrects.len() as u8);
                        for sr in &subrects {
                            out.put_u8(((sr.x as u8) << 4) | (sr.y as u8));
                            out.put_u8((((sr.w - 1) as u8) << 4) | ((sr.h - 1) as u8));
                        }
                    } else {
                        subencoding |= HEXTILE_SUBRECTS_COLOURED;
                        last_fg = None;

                        out.put_u8(subrects.len() as u8);
                        for sr in &subrects {
                            write_pixel(out, pf, sr.colour);
                            out.put_u8(((sr.x as u8) << 4) | (sr.y as u8));
                            out.put_u8((((sr.w - 1) as u8) << 4) | ((sr.h - 1) as u8));
                        }
                    }
                }

                out[tile_start] = subencoding;
            }
        }
        Ok(())
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

        // Background carries over, so only the first tile names it.
        let tiles_x = (width as usize).div_ceil(TILE_SIZE);
        let tiles_y = (height as usize).div_ceil(TILE_SIZE);
        for i in 0..tiles_x * tiles_y {
            if i == 0 {
                out.put_u8(HEXTILE_BACKGROUND_SPECIFIED);
                write_pixel(out, pf, pixel);
            } else {
                out.put_u8(0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::geometry::Rect;

    fn cp_with_hextile() -> ConnParams {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[ENCODING_HEXTILE]);
        cp
    }

    #[test]
    fn test_solid_rect_tiles() {
        let pf = PixelFormat::rgba32();
        let mut colour = [0u8; 4];
        pf.pixel_to_bytes(0x77, &mut colour);

        let mut out = BytesMut::new();
        HextileEncoder
            .write_solid_rect(33, 17, &pf, &colour, &cp_with_hextile(), &mut out)
            .unwrap();

        // 3x2 tiles: first carries the background pixel, rest a single
        // zero subencoding byte.
        assert_eq!(out.len(), (1 + 4) + 5);
        assert_eq!(out[0], HEXTILE_BACKGROUND_SPECIFIED);
    }

    #[test]
    fn test_solid_tile_reuses_background() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 32, 16);
        pb.fill_rect(Rect::from_xywh(0, 0, 32, 16), 0xAB);

        let mut out = BytesMut::new();
        HextileEncoder
            .write_rect(&pb, &Palette::new(), &cp_with_hextile(), &mut out)
            .unwrap();

        // Two tiles; second inherits the background.
        assert_eq!(out.len(), (1 + 4) + 1);
        assert_eq!(out[5], 0);
    }

    #[test]
    fn test_mono_tile_has_subrects() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 16, 16);
        pb.fill_rect(Rect::from_xywh(0, 0, 16, 16), 1);
        pb.fill_rect(Rect::from_xywh(4, 4, 4, 4), 2);

        let mut out = BytesMut::new();
        HextileEncoder
            .write_rect(&pb, &Palette::new(), &cp_with_hextile(), &mut out)
            .unwrap();

        let subencoding = out[0];
        assert_ne!(subencoding & HEXTILE_ANY_SUBRECTS, 0);
        assert_ne!(subencoding & HEXTILE_FOREGROUND_SPECIFIED, 0);
        assert_eq!(subencoding & HEXTILE_SUBRECTS_COLOURED, 0);
    }

    #[test]
    fn test_noisy_tile_falls_back_to_raw() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 16, 16);
        for y in 0..16 {
            for x in 0..16 {
                pb.set_pixel(x, y, (y * 16 + x) as u32);
            }
        }

        let mut out = BytesMut::new();
        HextileEncoder
            .write_rect(&pb, &Palette::new(), &cp_with_hextile(), &mut out)
            .unwrap();

        assert_eq!(out[0], HEXTILE_RAW);
        assert_eq!(out.len(), 1 + 16 * 16 * 4);
    }
}
