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

//! Pixel format translation between framebuffer and peer formats.
//!
//! This module converts pixels between arbitrary true-colour formats
//! (8/16/32 bpp, either endianness) using direct runtime conversion
//! instead of lookup tables. Modern Rust's optimizer generates very
//! efficient code for this approach, trading a small amount of CPU for
//! significantly simpler code and lower memory usage.

use crate::protocol::PixelFormat;

/// Translates a rectangle of pixels from `src_format` to `dst_format`.
///
/// # Arguments
///
/// * `src` - Source pixel bytes starting at the rectangle's top-left.
/// * `src_stride` - Source row stride in **pixels**.
/// * `width`, `height` - Rectangle dimensions in pixels.
/// * `src_format` - Format of the source pixels.
/// * `dst_format` - Desired output format.
///
/// # Returns
///
/// Packed pixel data in `dst_format` (stride equals width).
#[must_use]
pub fn translate_rect(
    src: &[u8],
    src_stride: usize,
    width: usize,
    height: usize,
    src_format: &PixelFormat,
    dst_format: &PixelFormat,
) -> Vec<u8> {
    let src_bpp = src_format.bytes_per_pixel();
    let dst_bpp = dst_format.bytes_per_pixel();
    let mut dst = vec![0u8; width * height * dst_bpp];

    // Fast path: identical layouts reduce to a row copy.
    if src_format.equal(dst_format) {
        for y in 0..height {
            let src_off = y * src_stride * src_bpp;
            let dst_off = y * width * dst_bpp;
            dst[dst_off..dst_off + width * dst_bpp]
                .copy_from_slice(&src[src_off..src_off + width * src_bpp]);
        }
        return dst;
    }

    for y in 0..height {
        for x in 0..width {
            let src_off = (y * src_stride + x) * src_bpp;
            let pixel = src_format.pixel_from_bytes(&src[src_off..src_off + src_bpp]);
            let (r, g, b) = src_format.extract_rgb(pixel);

            let dst_off = (y * width + x) * dst_bpp;
            pack_pixel(r, g, b, dst_format, &mut dst[dst_off..dst_off + dst_bpp]);
        }
    }

    dst
}

/// Translates a single pixel value between formats.
///
/// Used for solid-colour rectangles, where only one colour needs
/// converting to the peer's format.
///
/// # Returns
///
/// The translated pixel bytes; only the first
/// `dst_format.bytes_per_pixel()` entries are meaningful.
#[must_use]
pub fn translate_pixel(
    src_pixel: &[u8],
    src_format: &PixelFormat,
    dst_format: &PixelFormat,
) -> [u8; 4] {
    let mut out = [0u8; 4];

    if src_format.equal(dst_format) {
        out[..src_format.bytes_per_pixel()]
            .copy_from_slice(&src_pixel[..src_format.bytes_per_pixel()]);
        return out;
    }

    let pixel = src_format.pixel_from_bytes(src_pixel);
    let (r, g, b) = src_format.extract_rgb(pixel);
    let bpp = dst_format.bytes_per_pixel();
    pack_pixel(r, g, b, dst_format, &mut out[..bpp]);
    out
}

/// Packs 8-bit RGB components into `format` and writes them to `dst`.
fn pack_pixel(r: u8, g: u8, b: u8, format: &PixelFormat, dst: &mut [u8]) {
    let r_scaled = downscale_component(r, format.red_max);
    let g_scaled = downscale_component(g, format.green_max);
    let b_scaled = downscale_component(b, format.blue_max);

    let pixel_value = (u32::from(r_scaled) << format.red_shift)
        | (u32::from(g_scaled) << format.green_shift)
        | (u32::from(b_scaled) << format.blue_shift);

    format.pixel_to_bytes(pixel_value, dst);
}

/// Downscales a color component from 8-bit (0-255) to the format-specific
/// range.
#[inline]
fn downscale_component(value: u8, max: u16) -> u16 {
    if max == 0 {
        return 0;
    }
    if max == 255 {
        return u16::from(value);
    }

    // Downscale: value * max / 255. Use 32-bit to avoid overflow.
    ((u32::from(value) * u32::from(max)) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_translation() {
        let pf = PixelFormat::rgba32();
        let src = vec![255u8, 0, 0, 0, 0, 255, 0, 0]; // Red, Green pixels
        let dst = translate_rect(&src, 2, 2, 1, &pf, &pf);
        assert_eq!(&src[..], &dst[..]);
    }

    #[test]
    fn test_rgba32_to_rgb565() {
        let server_format = PixelFormat::rgba32();
        let client_format = PixelFormat::rgb565();

        // Pure red: R=255, G=0, B=0 in RGBA32.
        let src = vec![255u8, 0, 0, 0];
        let dst = translate_rect(&src, 1, 1, 1, &server_format, &client_format);

        // In RGB565: red=(255*31/255)<<11 = 31<<11 = 0xF800.
        assert_eq!(dst.len(), 2);
        let value = u16::from_le_bytes([dst[0], dst[1]]);
        assert_eq!(value, 0xF800);
    }

    #[test]
    fn test_stride_larger_than_width() {
        let pf = PixelFormat::rgba32();
        // Two rows of a 4-pixel-wide buffer, translating a 2-wide rect.
        let mut src = vec![0u8; 4 * 4 * 2];
        src[0] = 0x11; // (0,0) red component
        src[16] = 0x22; // (0,1) red component
        let dst = translate_rect(&src, 4, 2, 2, &pf, &pf);
        assert_eq!(dst.len(), 2 * 2 * 4);
        assert_eq!(dst[0], 0x11);
        assert_eq!(dst[8], 0x22);
    }

    #[test]
    fn test_translate_to_bgr233() {
        let server_format = PixelFormat::rgba32();
        let client_format = PixelFormat::bgr233();

        // White maps to all channel maxima.
        let src = vec![255u8, 255, 255, 0];
        let dst = translate_rect(&src, 1, 1, 1, &server_format, &client_format);
        assert_eq!(dst.len(), 1);
        assert_eq!(dst[0], 7 | (7 << 3) | (3 << 6));
    }

    #[test]
    fn test_translate_single_pixel() {
        let server_format = PixelFormat::rgba32();
        let client_format = PixelFormat::rgb565();

        let src = [0u8, 255, 0, 0]; // Pure green
        let out = translate_pixel(&src, &server_format, &client_format);
        let value = u16::from_le_bytes([out[0], out[1]]);
        assert_eq!(value, 63 << 5);
    }

    #[test]
    fn test_downscale_component() {
        assert_eq!(downscale_component(0, 31), 0);
        assert_eq!(downscale_component(255, 31), 31);
        assert_eq!(downscale_component(128, 31), 15);
        assert_eq!(downscale_component(128, 255), 128);
    }
}
