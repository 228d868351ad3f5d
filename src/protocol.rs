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

//! RFB protocol constants and pixel format definitions.
//!
//! This module provides the wire-level constants used by the encoding
//! pipeline and its auxiliary messages: encoding identifiers, the
//! pseudo-encodings a peer uses to advertise capabilities and tuning,
//! message type tags, fence flags, and the extended clipboard bit
//! layout. It implements the relevant parts of the RFB protocol as
//! specified in RFC 6143 plus the community extensions for fences and
//! the extended clipboard.

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
///
/// Contains one or more rectangles of pixel data representing screen
/// changes. This is the primary message for transmitting visual updates
/// to the client.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: Server sends cut text (clipboard data).
///
/// Also carries the extended clipboard extension when the length field
/// is negative.
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

/// Message type: Server-initiated fence.
pub const SERVER_MSG_FENCE: u8 = 248;

// Client-to-Server Message Types

/// Message type: Client sends cut text (clipboard data).
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

/// Message type: Client-initiated fence.
pub const CLIENT_MSG_FENCE: u8 = 248;

// Encoding Types

/// Encoding type: Raw pixel data.
///
/// The simplest encoding that sends uncompressed pixel data directly.
/// High bandwidth but universally supported.
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Copy Rectangle.
///
/// Instructs the client to copy a rectangular region from one location
/// to another on the screen. Highly efficient for scrolling operations.
pub const ENCODING_COPYRECT: i32 = 1;

/// Encoding type: Rise-and-Run-length Encoding.
///
/// A simple compression scheme for rectangular regions.
pub const ENCODING_RRE: i32 = 2;

/// Encoding type: Hextile.
///
/// Divides rectangles into 16x16 tiles for efficient encoding.
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Tight.
///
/// A highly efficient encoding using JPEG compression for photographic
/// content and palette/zlib compression for other screen content.
pub const ENCODING_TIGHT: i32 = 7;

/// Encoding type: Zlib compressed TRLE.
pub const ENCODING_ZRLE: i32 = 16;

// Pseudo-encodings

/// Pseudo-encoding: LastRect.
///
/// Lets the server write `0xFFFF` for the rectangle count and signal
/// frame end with a sentinel rectangle, avoiding a pre-pass count.
pub const PSEUDO_ENCODING_LAST_RECT: i32 = -224;

/// Pseudo-encoding: client supports the fence extension.
pub const PSEUDO_ENCODING_FENCE: i32 = -312;

/// Pseudo-encoding: client supports the extended clipboard extension.
pub const PSEUDO_ENCODING_EXTENDED_CLIPBOARD: i32 = 0xc0a1_e5ce_u32 as i32;

/// Pseudo-encoding: Compression Level 0 (no compression, fastest).
pub const PSEUDO_ENCODING_COMPRESS_LEVEL_0: i32 = -256;

/// Pseudo-encoding: Compression Level 9 (maximum compression, slowest).
pub const PSEUDO_ENCODING_COMPRESS_LEVEL_9: i32 = -247;

/// Pseudo-encoding: JPEG Quality Level 0 (lowest quality).
pub const PSEUDO_ENCODING_QUALITY_LEVEL_0: i32 = -32;

/// Pseudo-encoding: JPEG Quality Level 9 (highest quality).
pub const PSEUDO_ENCODING_QUALITY_LEVEL_9: i32 = -23;

/// Pseudo-encoding: fine-grained JPEG quality, 0%.
pub const PSEUDO_ENCODING_FINE_QUALITY_LEVEL_0: i32 = -512;

/// Pseudo-encoding: fine-grained JPEG quality, 100%.
pub const PSEUDO_ENCODING_FINE_QUALITY_LEVEL_100: i32 = -412;

/// Pseudo-encoding: no chrominance subsampling (1X).
pub const PSEUDO_ENCODING_SUBSAMP_1X: i32 = -768;

/// Pseudo-encoding: 16X chrominance subsampling.
pub const PSEUDO_ENCODING_SUBSAMP_16X: i32 = -763;

// Fence flags

/// Fence flag: all messages before the fence must be processed before
/// the fence is responded to.
pub const FENCE_FLAG_BLOCK_BEFORE: u32 = 1 << 0;

/// Fence flag: no messages after the fence may be processed before the
/// fence is responded to.
pub const FENCE_FLAG_BLOCK_AFTER: u32 = 1 << 1;

/// Fence flag: the message following the fence is tied to it.
pub const FENCE_FLAG_SYNC_NEXT: u32 = 1 << 2;

/// Fence flag: this fence is a request and must be echoed back.
pub const FENCE_FLAG_REQUEST: u32 = 1 << 31;

/// All fence flags this implementation understands.
pub const FENCE_FLAGS_SUPPORTED: u32 =
    FENCE_FLAG_BLOCK_BEFORE | FENCE_FLAG_BLOCK_AFTER | FENCE_FLAG_SYNC_NEXT | FENCE_FLAG_REQUEST;

/// Maximum fence payload length, in bytes.
pub const FENCE_MAX_DATA_LEN: usize = 64;

// Extended clipboard bits

/// Extended clipboard format: plain UTF-8 text.
pub const CLIPBOARD_UTF8: u32 = 1 << 0;

/// Extended clipboard format: rich text format.
pub const CLIPBOARD_RTF: u32 = 1 << 1;

/// Extended clipboard format: HTML.
pub const CLIPBOARD_HTML: u32 = 1 << 2;

/// Extended clipboard format: device-independent bitmap.
pub const CLIPBOARD_DIB: u32 = 1 << 3;

/// Extended clipboard format: file list.
pub const CLIPBOARD_FILES: u32 = 1 << 4;

/// Mask covering the 16 possible format bits.
pub const CLIPBOARD_FORMAT_MASK: u32 = 0x0000_ffff;

/// Extended clipboard action: capability announcement.
pub const CLIPBOARD_CAPS: u32 = 1 << 24;

/// Extended clipboard action: request data in the given formats.
pub const CLIPBOARD_REQUEST: u32 = 1 << 25;

/// Extended clipboard action: ask for a notify of available formats.
pub const CLIPBOARD_PEEK: u32 = 1 << 26;

/// Extended clipboard action: announce available formats.
pub const CLIPBOARD_NOTIFY: u32 = 1 << 27;

/// Extended clipboard action: deliver data for the given formats.
pub const CLIPBOARD_PROVIDE: u32 = 1 << 28;

/// Mask covering the action bits.
pub const CLIPBOARD_ACTION_MASK: u32 = 0xff00_0000;

/// Represents the pixel format of a framebuffer.
///
/// This struct defines how pixel data is interpreted, including color
/// depth, endianness, and RGB component details. Only true-colour
/// formats take part in the encoding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel (8, 16 or 32).
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// Flag indicating if the pixel data is big-endian (1) or little-endian (0).
    pub big_endian_flag: u8,
    /// Flag indicating if the pixel format is true-colour (1) or colormapped (0).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Number of shifts to apply to get the red color component.
    pub red_shift: u8,
    /// Number of shifts to apply to get the green color component.
    pub green_shift: u8,
    /// Number of shifts to apply to get the blue color component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// Creates a standard 32-bit RGBA pixel format.
    #[must_use]
    pub fn rgba32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Creates a 16-bit RGB565 pixel format.
    ///
    /// RGB565 uses 5 bits for red, 6 bits for green, and 5 bits for blue.
    /// This is a common format for embedded displays and bandwidth-constrained
    /// clients.
    #[must_use]
    pub fn rgb565() -> Self {
        Self {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 31,   // 5 bits
            green_max: 63, // 6 bits
            blue_max: 31,  // 5 bits
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        }
    }

    /// Creates an 8-bit BGR233 pixel format.
    ///
    /// BGR233 uses 3 bits for red, 3 bits for green, and 2 bits for blue.
    /// This format is used for very low bandwidth connections and legacy
    /// clients.
    #[must_use]
    pub fn bgr233() -> Self {
        Self {
            bits_per_pixel: 8,
            depth: 8,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 7,   // 3 bits
            green_max: 7, // 3 bits
            blue_max: 3,  // 2 bits
            red_shift: 0,
            green_shift: 3,
            blue_shift: 6,
        }
    }

    /// Returns the storage size of one pixel in bytes.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bits_per_pixel as usize).div_ceil(8)
    }

    /// Validates that this pixel format can be produced by the pipeline.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.bits_per_pixel != 8 && self.bits_per_pixel != 16 && self.bits_per_pixel != 32 {
            return false;
        }

        if self.depth == 0 || self.depth > 32 {
            return false;
        }

        if self.true_colour_flag == 0 {
            return false;
        }

        self.red_max > 0 && self.green_max > 0 && self.blue_max > 0
    }

    /// Assembles a pixel word from its in-memory byte representation.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than `bytes_per_pixel()`.
    #[must_use]
    pub fn pixel_from_bytes(&self, bytes: &[u8]) -> u32 {
        match self.bits_per_pixel {
            8 => u32::from(bytes[0]),
            16 => {
                if self.big_endian_flag != 0 {
                    u32::from(u16::from_be_bytes([bytes[0], bytes[1]]))
                } else {
                    u32::from(u16::from_le_bytes([bytes[0], bytes[1]]))
                }
            }
            _ => {
                if self.big_endian_flag != 0 {
                    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                } else {
                    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
                }
            }
        }
    }

    /// Writes a pixel word into its in-memory byte representation.
    ///
    /// Returns the number of bytes written into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than `bytes_per_pixel()`.
    pub fn pixel_to_bytes(&self, pixel: u32, dst: &mut [u8]) -> usize {
        match self.bits_per_pixel {
            8 => {
                dst[0] = pixel as u8;
                1
            }
            16 => {
                let bytes = if self.big_endian_flag != 0 {
                    (pixel as u16).to_be_bytes()
                } else {
                    (pixel as u16).to_le_bytes()
                };
                dst[..2].copy_from_slice(&bytes);
                2
            }
            _ => {
                let bytes = if self.big_endian_flag != 0 {
                    pixel.to_be_bytes()
                } else {
                    pixel.to_le_bytes()
                };
                dst[..4].copy_from_slice(&bytes);
                4
            }
        }
    }

    /// Extracts the RGB components of a pixel word, scaled to 0-255.
    #[must_use]
    pub fn extract_rgb(&self, pixel: u32) -> (u8, u8, u8) {
        let scale = |value: u32, max: u16| -> u8 {
            if max == 0 {
                0
            } else if max == 255 {
                value as u8
            } else {
                ((u64::from(value) * 255) / u64::from(max)) as u8
            }
        };

        let r = (pixel >> self.red_shift) & u32::from(self.red_max);
        let g = (pixel >> self.green_shift) & u32::from(self.green_max);
        let b = (pixel >> self.blue_shift) & u32::from(self.blue_max);

        (
            scale(r, self.red_max),
            scale(g, self.green_max),
            scale(b, self.blue_max),
        )
    }

    /// Checks whether two formats describe the same in-memory layout.
    ///
    /// Endianness is ignored for single-byte pixels.
    #[must_use]
    pub fn equal(&self, other: &PixelFormat) -> bool {
        self.bits_per_pixel == other.bits_per_pixel
            && self.depth == other.depth
            && (self.big_endian_flag == other.big_endian_flag || self.bits_per_pixel == 8)
            && self.true_colour_flag == other.true_colour_flag
            && self.red_max == other.red_max
            && self.green_max == other.green_max
            && self.blue_max == other.blue_max
            && self.red_shift == other.red_shift
            && self.green_shift == other.green_shift
            && self.blue_shift == other.blue_shift
    }

    /// True when pixels can be packed as 3 bytes on the wire (Tight's
    /// 24-bit mode): 32 bits per pixel, 24-bit depth, 8 bits per channel.
    #[must_use]
    pub fn is_tight_packable(&self) -> bool {
        self.bits_per_pixel == 32
            && self.depth == 24
            && self.red_max == 255
            && self.green_max == 255
            && self.blue_max == 255
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(PixelFormat::rgba32().bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::rgb565().bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::bgr233().bytes_per_pixel(), 1);
    }

    #[test]
    fn test_pixel_round_trip_little_endian() {
        let pf = PixelFormat::rgba32();
        let mut buf = [0u8; 4];
        pf.pixel_to_bytes(0x00AA_BBCC, &mut buf);
        assert_eq!(buf, [0xCC, 0xBB, 0xAA, 0x00]);
        assert_eq!(pf.pixel_from_bytes(&buf), 0x00AA_BBCC);
    }

    #[test]
    fn test_pixel_round_trip_big_endian() {
        let pf = PixelFormat {
            big_endian_flag: 1,
            ..PixelFormat::rgba32()
        };
        let mut buf = [0u8; 4];
        pf.pixel_to_bytes(0x00AA_BBCC, &mut buf);
        assert_eq!(buf, [0x00, 0xAA, 0xBB, 0xCC]);
        assert_eq!(pf.pixel_from_bytes(&buf), 0x00AA_BBCC);
    }

    #[test]
    fn test_extract_rgb_scales_to_8bit() {
        let pf = PixelFormat::rgb565();
        // Full red in RGB565 is 31 << 11.
        let (r, g, b) = pf.extract_rgb(31 << 11);
        assert_eq!((r, g, b), (255, 0, 0));
    }

    #[test]
    fn test_equal_ignores_endianness_at_8bpp() {
        let a = PixelFormat::bgr233();
        let b = PixelFormat {
            big_endian_flag: 1,
            ..a
        };
        assert!(a.equal(&b));
    }

    #[test]
    fn test_tight_packable() {
        assert!(PixelFormat::rgba32().is_tight_packable());
        assert!(!PixelFormat::rgb565().is_tight_packable());
    }

    #[test]
    fn test_extended_clipboard_pseudo_encoding_is_negative() {
        assert!(PSEUDO_ENCODING_EXTENDED_CLIPBOARD < 0);
    }
}
