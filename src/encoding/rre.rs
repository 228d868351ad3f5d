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

//! RRE (Rise-and-Run-length Encoding).
//!
//! Encodes a rectangle as a background colour plus a list of
//! solid-coloured subrectangles. Effective for simple flat content,
//! poor for anything high-frequency.

use bytes::{BufMut, BytesMut};

use super::common::{background_colour, find_subrects, pixel_words, write_pixel};
use crate::connparams::ConnParams;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::{Palette, MAX_PALETTE_SIZE};
use crate::protocol::{PixelFormat, ENCODING_RRE};

/// Implements the RRE encoding.
pub struct RreEncoder;

impl Encoder for RreEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_RRE
    }

    fn max_palette_size(&self) -> usize {
        MAX_PALETTE_SIZE
    }

    fn is_supported(&self, cp: &ConnParams) -> bool {
        cp.supports_encoding(ENCODING_RRE)
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
        let height = pb.height() as usize;

        // The analyzer's palette already ranks colours by frequency;
        // fall back to a scan when it overflowed.
        let bg = if palette.is_empty() {
            background_colour(&pixels)
        } else {
            palette.colour(0)
        };

        let subrects = find_subrects(&pixels, width, height, bg);

        out.put_u32(subrects.len() as u32);
        write_pixel(out, pf, bg);

        for sr in &subrects {
            write_pixel(out, pf, sr.colour);
            out.put_u16(sr.x);
            out.put_u16(sr.y);
            out.put_u16(sr.w);
            out.put_u16(sr.h);
        }
        Ok(())
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
        out.put_u32(0);
        write_pixel(out, pf, pf.pixel_from_bytes(colour));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::geometry::Rect;

    fn cp_with_rre() -> ConnParams {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[ENCODING_RRE]);
        cp
    }

    #[test]
    fn test_solid_rect_has_no_subrects() {
        let pf = PixelFormat::rgba32();
        let mut colour = [0u8; 4];
        pf.pixel_to_bytes(0x1234, &mut colour);

        let mut out = BytesMut::new();
        RreEncoder
            .write_solid_rect(64, 64, &pf, &colour, &cp_with_rre(), &mut out)
            .unwrap();

        assert_eq!(u32::from_be_bytes([out[0], out[1], out[2], out[3]]), 0);
        assert_eq!(out.len(), 4 + 4);
    }

    #[test]
    fn test_two_colour_rect() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 8, 8);
        pb.fill_rect(Rect::from_xywh(0, 0, 8, 8), 1);
        pb.fill_rect(Rect::from_xywh(2, 2, 3, 3), 2);

        let mut out = BytesMut::new();
        RreEncoder
            .write_rect(&pb, &Palette::new(), &cp_with_rre(), &mut out)
            .unwrap();

        let n = u32::from_be_bytes([out[0], out[1], out[2], out[3]]);
        assert_eq!(n, 1);
        // Background is the majority colour.
        assert_eq!(PixelFormat::rgba32().pixel_from_bytes(&out[4..8]), 1);
        // One subrect record: pixel + 4 u16 fields.
        assert_eq!(out.len(), 4 + 4 + (4 + 8));
    }

    #[test]
    fn test_unsupported_without_encoding() {
        assert!(!RreEncoder.is_supported(&ConnParams::new()));
        assert!(RreEncoder.is_supported(&cp_with_rre()));
    }
}
