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

//! Raw encoding: uncompressed pixel data in the peer's format.
//!
//! The fallback every peer accepts. Bandwidth-heavy, but free of CPU
//! cost and always available, which is why unassigned roles default to
//! it.

use bytes::BytesMut;

use super::common::write_pixel;
use crate::connparams::ConnParams;
use crate::encoder::Encoder;
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::{Palette, MAX_PALETTE_SIZE};
use crate::protocol::{PixelFormat, ENCODING_RAW};

/// Implements the Raw encoding.
pub struct RawEncoder;

impl Encoder for RawEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_RAW
    }

    fn max_palette_size(&self) -> usize {
        MAX_PALETTE_SIZE
    }

    fn is_supported(&self, _cp: &ConnParams) -> bool {
        true
    }

    fn write_rect(
        &self,
        pb: &dyn PixelBuffer,
        _palette: &Palette,
        _cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        let bpp = pb.format().bytes_per_pixel();
        let rect = pb.rect();
        let (buf, stride) = pb.get_buffer(rect);

        let row_bytes = rect.width() as usize * bpp;
        let stride_bytes = stride * bpp;

        out.reserve(row_bytes * rect.height() as usize);
        for y in 0..rect.height() as usize {
            let off = y * stride_bytes;
            out.extend_from_slice(&buf[off..off + row_bytes]);
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
        out.reserve(width as usize * height as usize * pf.bytes_per_pixel());
        for _ in 0..width as usize * height as usize {
            write_pixel(out, pf, pixel);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::geometry::Rect;

    #[test]
    fn test_raw_output_size() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 4, 3);
        pb.fill_rect(Rect::from_xywh(0, 0, 4, 3), 0x00AB_CDEF);

        let mut out = BytesMut::new();
        RawEncoder
            .write_rect(&pb, &Palette::new(), &ConnParams::new(), &mut out)
            .unwrap();
        assert_eq!(out.len(), 4 * 3 * 4);
        assert_eq!(
            PixelFormat::rgba32().pixel_from_bytes(&out[..4]),
            0x00AB_CDEF
        );
    }

    #[test]
    fn test_raw_solid_rect() {
        let pf = PixelFormat::rgb565();
        let mut colour = [0u8; 4];
        pf.pixel_to_bytes(0xF800, &mut colour);

        let mut out = BytesMut::new();
        RawEncoder
            .write_solid_rect(8, 2, &pf, &colour, &ConnParams::new(), &mut out)
            .unwrap();
        assert_eq!(out.len(), 8 * 2 * 2);
        assert_eq!(pf.pixel_from_bytes(&out[..2]), 0xF800);
    }
}
