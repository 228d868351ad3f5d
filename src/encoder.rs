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

//! The contract concrete encoders satisfy, and the role/class naming
//! used by encoder selection.
//!
//! The pipeline maps six logical *roles* (what kind of content a
//! rectangle holds) onto six concrete encoder *classes* (how bytes get
//! produced). Roles are chosen per rectangle by the analyzer; the
//! role-to-class mapping is chosen per update from the peer's
//! capabilities.

use bytes::BytesMut;

use crate::connparams::{ConnParams, Subsampling};
use crate::error::Result;
use crate::framebuffer::PixelBuffer;
use crate::palette::Palette;
use crate::protocol::PixelFormat;

/// Encoder capability flags.
pub mod flags {
    /// Output depends on prior output within the connection (e.g. a
    /// long-lived zlib dictionary); rectangles must be encoded in
    /// submission order by one thread at a time.
    pub const ORDERED: u32 = 1 << 0;

    /// The encoder wants pixels in the framebuffer's native format and
    /// performs any conversion itself.
    pub const USE_NATIVE_PF: u32 = 1 << 1;
}

/// The concrete encoder implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderClass {
    /// Uncompressed pixel data.
    Raw = 0,
    /// Rise-and-run-length encoding.
    Rre,
    /// 16x16 tiled encoding.
    Hextile,
    /// Tight's lossless modes.
    Tight,
    /// Tight's JPEG mode.
    TightJpeg,
    /// Zlib run-length encoding.
    Zrle,
}

/// Number of encoder classes.
pub const ENCODER_CLASS_COUNT: usize = 6;

impl EncoderClass {
    /// All classes, in index order.
    pub const ALL: [EncoderClass; ENCODER_CLASS_COUNT] = [
        EncoderClass::Raw,
        EncoderClass::Rre,
        EncoderClass::Hextile,
        EncoderClass::Tight,
        EncoderClass::TightJpeg,
        EncoderClass::Zrle,
    ];

    /// Human-readable name for statistics output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EncoderClass::Raw => "Raw",
            EncoderClass::Rre => "RRE",
            EncoderClass::Hextile => "Hextile",
            EncoderClass::Tight => "Tight",
            EncoderClass::TightJpeg => "Tight (JPEG)",
            EncoderClass::Zrle => "ZRLE",
        }
    }
}

/// The logical roles a rectangle can be encoded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderType {
    /// A single colour.
    Solid = 0,
    /// Two colours, low redundancy.
    Bitmap,
    /// Two colours, high redundancy.
    BitmapRle,
    /// A bounded palette, low redundancy.
    Indexed,
    /// A bounded palette, high redundancy.
    IndexedRle,
    /// Too many colours for a palette.
    FullColour,
}

/// Number of encoder roles.
pub const ENCODER_TYPE_COUNT: usize = 6;

impl EncoderType {
    /// All roles, in index order.
    pub const ALL: [EncoderType; ENCODER_TYPE_COUNT] = [
        EncoderType::Solid,
        EncoderType::Bitmap,
        EncoderType::BitmapRle,
        EncoderType::Indexed,
        EncoderType::IndexedRle,
        EncoderType::FullColour,
    ];

    /// Human-readable name for statistics output.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            EncoderType::Solid => "Solid",
            EncoderType::Bitmap => "Bitmap",
            EncoderType::BitmapRle => "Bitmap RLE",
            EncoderType::Indexed => "Indexed",
            EncoderType::IndexedRle => "Indexed RLE",
            EncoderType::FullColour => "Full Colour",
        }
    }
}

/// A concrete rectangle encoder.
///
/// One instance of each class lives for the lifetime of the pipeline.
/// `write_rect` may be called from worker threads; implementations with
/// stream state must set [`flags::ORDERED`], which guarantees a single
/// caller at a time in submission order.
pub trait Encoder: Send + Sync {
    /// The wire encoding identifier emitted in rectangle headers.
    fn encoding(&self) -> i32;

    /// Capability flags; see [`flags`].
    fn flags(&self) -> u32 {
        0
    }

    /// Largest palette this encoder can represent.
    fn max_palette_size(&self) -> usize;

    /// Whether the peer can accept this encoder's output.
    fn is_supported(&self, cp: &ConnParams) -> bool;

    /// Update the zlib effort for subsequent rectangles.
    fn set_compress_level(&self, _level: i32) {}

    /// Update the coarse lossy-quality band for subsequent rectangles.
    fn set_quality_level(&self, _level: i32) {}

    /// Update fine-grained quality and subsampling for subsequent
    /// rectangles.
    fn set_fine_quality_level(&self, _level: i32, _subsampling: Subsampling) {}

    /// Encode the pixels of `pb` into `out`.
    ///
    /// `pb` is rect-sized and already in the peer's pixel format unless
    /// this encoder sets [`flags::USE_NATIVE_PF`]. `palette` holds the
    /// analyzer's colour census (possibly empty for full-colour
    /// content).
    fn write_rect(
        &self,
        pb: &dyn PixelBuffer,
        palette: &Palette,
        cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()>;

    /// Encode a `width x height` rectangle of one solid colour.
    ///
    /// `colour` is the pixel's byte representation in `pf`.
    fn write_solid_rect(
        &self,
        width: i32,
        height: i32,
        pf: &PixelFormat,
        colour: &[u8],
        cp: &ConnParams,
        out: &mut BytesMut,
    ) -> Result<()>;
}
