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

//! Tight encoding, JPEG mode.
//!
//! Compresses full-colour content with libjpeg-turbo and emits it under
//! Tight's JPEG sub-encoding. Works on the framebuffer's native pixel
//! format (`USE_NATIVE_PF`): pixels are expanded to RGB888 here rather
//! than translated to the peer's format first, which both avoids a
//! conversion pass and lets grayscale subsampling reduce everything the
//! peer sees.
//!
//! Requires the `turbojpeg` cargo feature; without it the encoder
//! reports itself unsupported and is never selected.

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;

use crate::connparams::{ConnParams, Subsampling};
use crate::encoder::{flags, Encoder};
use crate::error::Result;
use crate::framebuffer::{ManagedPixelBuffer, PixelBuffer};
use crate::palette::Palette;
use crate::protocol::{PixelFormat, ENCODING_TIGHT};

/// Tight sub-encoding tag for JPEG data.
const TIGHT_JPEG: u8 = 0x09;

/// Maps the coarse quality bands (0-9) onto libjpeg quality settings.
const TIGHT2TURBO_QUAL: [u8; 10] = [15, 29, 41, 42, 62, 77, 79, 86, 92, 100];

/// Default JPEG quality when the peer asked for JPEG without a level.
const DEFAULT_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy)]
struct JpegTuning {
    quality_level: i32,
    fine_quality_level: i32,
    subsampling: Subsampling,
}

/// Implements the Tight encoding's JPEG mode.
pub struct TightJpegEncoder {
    tuning: Mutex<JpegTuning>,
}

impl TightJpegEncoder {
    /// Create an encoder with default tuning.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tuning: Mutex::new(JpegTuning {
                quality_level: -1,
                fine_quality_level: -1,
                subsampling: Subsampling::Undefined,
            }),
        }
    }

    /// Resolve tuning into a concrete libjpeg quality setting.
    fn jpeg_quality(&self) -> u8 {
        let tuning = self.tuning.lock();
        if (0..=100).contains(&tuning.fine_quality_level) {
            return tuning.fine_quality_level as u8;
        }
        if (0..=9).contains(&tuning.quality_level) {
            return TIGHT2TURBO_QUAL[tuning.quality_level as usize];
        }
        DEFAULT_QUALITY
    }

    #[cfg(feature = "turbojpeg")]
    fn compress(&self, rgb: &[u8], width: u16, height: u16) -> Result<Vec<u8>> {
        use crate::error::VncError;
        use crate::jpeg::TurboJpegEncoder;

        let subsampling = self.tuning.lock().subsampling;
        let mut encoder = TurboJpegEncoder::new().map_err(VncError::Encoding)?;
        encoder
            .compress_rgb(rgb, width, height, self.jpeg_quality(), subsampling)
            .map_err(VncError::Encoding)
    }

    #[cfg(not(feature = "turbojpeg"))]
    fn compress(&self, _rgb: &[u8], _width: u16, _height: u16) -> Result<Vec<u8>> {
        Err(crate::error::VncError::Encoding(
            "JPEG support not compiled in".into(),
        ))
    }

    /// Current tuning state, for tests.
    #[cfg(test)]
    pub(crate) fn tuning(&self) -> (i32, i32, Subsampling) {
        let tuning = self.tuning.lock();
        (
            tuning.quality_level,
            tuning.fine_quality_level,
            tuning.subsampling,
        )
    }
}

impl Default for TightJpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for TightJpegEncoder {
    fn encoding(&self) -> i32 {
        ENCODING_TIGHT
    }

    fn flags(&self) -> u32 {
        flags::USE_NATIVE_PF
    }

    fn max_palette_size(&self) -> usize {
        96
    }

    fn is_supported(&self, cp: &ConnParams) -> bool {
        cfg!(feature = "turbojpeg")
            && cp.supports_encoding(ENCODING_TIGHT)
            && cp.quality_level >= 0
    }

    fn set_quality_level(&self, level: i32) {
        self.tuning.lock().quality_level = level;
    }

    fn set_fine_quality_level(&self, level: i32, subsampling: Subsampling) {
        let mut tuning = self.tuning.lock();
        tuning.fine_quality_level = level;
        tuning.subsampling = subsampling;
    }

    fn write_rect(
        &self,
        pb: &dyn PixelBuffer,
        _palette: &Palette,
        _cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        let pf = *pb.format();
        let bpp = pf.bytes_per_pixel();
        let rect = pb.rect();
        let (buf, stride) = pb.get_buffer(rect);

        let width = rect.width() as usize;
        let height = rect.height() as usize;

        let mut rgb = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            let row = y * stride * bpp;
            for x in 0..width {
                let off = row + x * bpp;
                let pixel = pf.pixel_from_bytes(&buf[off..off + bpp]);
                let (r, g, b) = pf.extract_rgb(pixel);
                rgb.push(r);
                rgb.push(g);
                rgb.push(b);
            }
        }

        let jpeg = self.compress(&rgb, width as u16, height as u16)?;

        out.put_u8(TIGHT_JPEG << 4);
        write_compact_length(out, jpeg.len());
        out.put_slice(&jpeg);
        Ok(())
    }

    fn write_solid_rect(
        &self,
        width: i32,
        height: i32,
        pf: &PixelFormat,
        colour: &[u8],
        cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()> {
        // JPEG cannot beat a flat image; still emit valid JPEG data so
        // the peer needs nothing beyond this sub-encoding.
        let mut pb = ManagedPixelBuffer::new(*pf, width, height);
        pb.fill_rect(pb.rect(), pf.pixel_from_bytes(colour));
        self.write_rect(&pb, &Palette::new(), cp, out)
    }
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
