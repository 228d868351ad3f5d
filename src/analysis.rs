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

//! Pixel content analysis, specialized per bits-per-pixel.
//!
//! Both the rectangle analyzer (palette + RLE-run estimate) and the
//! solid-tile uniformity test are generic over the pixel word width and
//! monomorphized for 8, 16 and 32 bits per pixel, so the inner loops
//! compile to plain byte/word/dword loads with no per-pixel dispatch.

use crate::framebuffer::PixelBuffer;
use crate::geometry::Rect;
use crate::palette::Palette;

/// A pixel word as stored in framebuffer memory.
pub trait Pixel: Copy + Eq {
    /// Storage size of one pixel in bytes.
    const BYTES: usize;

    /// Load a pixel from its in-memory byte representation.
    fn load(bytes: &[u8]) -> Self;

    /// Widen to the 32-bit colour key used by palettes.
    fn to_word(self) -> u32;
}

impl Pixel for u8 {
    const BYTES: usize = 1;

    #[inline]
    fn load(bytes: &[u8]) -> Self {
        bytes[0]
    }

    #[inline]
    fn to_word(self) -> u32 {
        u32::from(self)
    }
}

impl Pixel for u16 {
    const BYTES: usize = 2;

    #[inline]
    fn load(bytes: &[u8]) -> Self {
        u16::from_ne_bytes([bytes[0], bytes[1]])
    }

    #[inline]
    fn to_word(self) -> u32 {
        u32::from(self)
    }
}

impl Pixel for u32 {
    const BYTES: usize = 4;

    #[inline]
    fn load(bytes: &[u8]) -> Self {
        u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline]
    fn to_word(self) -> u32 {
        self
    }
}

/// Analyze a whole pixel buffer: build a palette of up to `max_colours`
/// distinct colours and count horizontal RLE runs.
///
/// Returns `None` when the rectangle holds more than `max_colours`
/// distinct colours; the caller treats that as full-colour content.
#[must_use]
pub fn analyse_rect(pb: &dyn PixelBuffer, max_colours: usize) -> Option<(usize, Palette)> {
    let rect = pb.rect();
    let (buf, stride) = pb.get_buffer(rect);
    let w = rect.width() as usize;
    let h = rect.height() as usize;

    match pb.format().bits_per_pixel {
        32 => analyse_rect_typed::<u32>(buf, stride, w, h, max_colours),
        16 => analyse_rect_typed::<u16>(buf, stride, w, h, max_colours),
        _ => analyse_rect_typed::<u8>(buf, stride, w, h, max_colours),
    }
}

/// Test whether every pixel of `rect` equals the reference colour.
///
/// `colour` is the colour's in-memory byte representation, as read with
/// [`PixelBuffer::get_image`] on a single pixel.
#[must_use]
pub fn check_solid_rect(pb: &dyn PixelBuffer, rect: Rect, colour: &[u8; 4]) -> bool {
    let (buf, stride) = pb.get_buffer(rect);
    let w = rect.width() as usize;
    let h = rect.height() as usize;

    match pb.format().bits_per_pixel {
        32 => check_solid_typed(buf, stride, w, h, u32::load(colour)),
        16 => check_solid_typed(buf, stride, w, h, u16::load(colour)),
        _ => check_solid_typed(buf, stride, w, h, u8::load(colour)),
    }
}

fn analyse_rect_typed<P: Pixel>(
    buf: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    max_colours: usize,
) -> Option<(usize, Palette)> {
    let mut palette = Palette::new();
    let mut rle_runs = 0usize;

    for y in 0..height {
        let row = y * stride * P::BYTES;
        let mut x = 0usize;
        while x < width {
            let colour = P::load(&buf[row + x * P::BYTES..]);
            let mut count = 0u32;
            while x < width && P::load(&buf[row + x * P::BYTES..]) == colour {
                count += 1;
                x += 1;
            }
            rle_runs += 1;

            if !palette.insert(colour.to_word(), count) || palette.size() > max_colours {
                return None;
            }
        }
    }

    Some((rle_runs, palette))
}

fn check_solid_typed<P: Pixel>(
    buf: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    colour: P,
) -> bool {
    for y in 0..height {
        let row = y * stride * P::BYTES;
        for x in 0..width {
            if P::load(&buf[row + x * P::BYTES..]) != colour {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::ManagedPixelBuffer;
    use crate::protocol::PixelFormat;

    fn solid_buffer(pf: PixelFormat, w: i32, h: i32, pixel: u32) -> ManagedPixelBuffer {
        let mut pb = ManagedPixelBuffer::new(pf, w, h);
        pb.fill_rect(Rect::from_xywh(0, 0, w, h), pixel);
        pb
    }

    #[test]
    fn test_analyse_solid_rect() {
        let pb = solid_buffer(PixelFormat::rgba32(), 16, 16, 0x00AB_CDEF);
        let (rle_runs, palette) = analyse_rect(&pb, 256).unwrap();
        assert_eq!(palette.size(), 1);
        assert_eq!(palette.colour(0), 0x00AB_CDEF);
        // One run per scanline.
        assert_eq!(rle_runs, 16);
    }

    #[test]
    fn test_analyse_two_colour_rect() {
        let mut pb = solid_buffer(PixelFormat::rgba32(), 8, 4, 1);
        pb.fill_rect(Rect::from_xywh(4, 0, 4, 4), 2);
        let (rle_runs, palette) = analyse_rect(&pb, 256).unwrap();
        assert_eq!(palette.size(), 2);
        assert_eq!(rle_runs, 8);
    }

    #[test]
    fn test_analyse_overflow_returns_none() {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), 8, 8);
        for y in 0..8 {
            for x in 0..8 {
                pb.set_pixel(x, y, (y * 8 + x) as u32);
            }
        }
        assert!(analyse_rect(&pb, 16).is_none());
        assert!(analyse_rect(&pb, 64).is_some());
    }

    #[test]
    fn test_analyse_16bpp() {
        let pb = solid_buffer(PixelFormat::rgb565(), 4, 4, 0xF800);
        let (_, palette) = analyse_rect(&pb, 256).unwrap();
        assert_eq!(palette.size(), 1);
        assert_eq!(palette.colour(0), 0xF800);
    }

    #[test]
    fn test_check_solid_rect() {
        let mut pb = solid_buffer(PixelFormat::rgba32(), 16, 16, 0x1234);
        let mut colour = [0u8; 4];
        pb.get_image(Rect::from_xywh(0, 0, 1, 1), &mut colour);

        assert!(check_solid_rect(&pb, Rect::from_xywh(0, 0, 16, 16), &colour));

        pb.set_pixel(15, 15, 0x4321);
        assert!(check_solid_rect(&pb, Rect::from_xywh(0, 0, 8, 8), &colour));
        assert!(!check_solid_rect(&pb, Rect::from_xywh(8, 8, 8, 8), &colour));
    }

    #[test]
    fn test_check_solid_8bpp() {
        let pb = solid_buffer(PixelFormat::bgr233(), 4, 4, 0x3F);
        let mut colour = [0u8; 4];
        pb.get_image(Rect::from_xywh(0, 0, 1, 1), &mut colour);
        assert!(check_solid_rect(&pb, Rect::from_xywh(0, 0, 4, 4), &colour));
    }

    #[test]
    fn test_run_weights_accumulate_in_palette() {
        let mut pb = solid_buffer(PixelFormat::rgba32(), 8, 1, 7);
        pb.set_pixel(0, 0, 9);
        let (_, palette) = analyse_rect(&pb, 256).unwrap();
        // 7 occurrences of colour 7 vs one of colour 9.
        assert_eq!(palette.colour(0), 7);
        assert_eq!(palette.colour(1), 9);
    }
}
