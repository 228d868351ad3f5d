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

//! Per-connection parameters negotiated with the peer.
//!
//! [`ConnParams`] records what the peer advertised through its encoding
//! list and clipboard capability messages. The encoding pipeline only
//! ever reads this state; connection code owns and mutates it.

use std::collections::HashSet;

use crate::error::{Result, VncError};
use crate::manager::EncodeManager;
use crate::protocol::{self, PixelFormat};

/// Chrominance subsampling requested for JPEG compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subsampling {
    /// Peer did not express a preference.
    #[default]
    Undefined,
    /// No subsampling (1X).
    None,
    /// 4X subsampling.
    FourX,
    /// 2X subsampling.
    TwoX,
    /// Grayscale output.
    Gray,
    /// 8X subsampling.
    EightX,
    /// 16X subsampling.
    SixteenX,
}

/// The peer's negotiated capabilities and tuning preferences.
#[derive(Debug, Clone)]
pub struct ConnParams {
    pf: PixelFormat,
    encodings: HashSet<i32>,

    /// The peer's preferred encoding (first supported entry of its
    /// encoding list), or Raw if it never sent one.
    pub preferred_encoding: i32,
    /// Requested zlib effort, -1 (unset) or 0..=9.
    pub compress_level: i32,
    /// Requested JPEG quality band, -1 (lossless preference) or 0..=9.
    pub quality_level: i32,
    /// Fine-grained JPEG quality, -1 (unset) or 0..=100.
    pub fine_quality_level: i32,
    /// Requested chrominance subsampling.
    pub subsampling: Subsampling,

    /// Peer understands the LastRect sentinel.
    pub supports_last_rect: bool,
    /// Peer understands fence messages.
    pub supports_fence: bool,
    /// Peer understands the extended clipboard extension.
    pub supports_extended_clipboard: bool,

    clipboard_flags: u32,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            pf: PixelFormat::rgba32(),
            encodings: HashSet::new(),
            preferred_encoding: protocol::ENCODING_RAW,
            compress_level: -1,
            quality_level: -1,
            fine_quality_level: -1,
            subsampling: Subsampling::Undefined,
            supports_last_rect: false,
            supports_fence: false,
            supports_extended_clipboard: false,
            clipboard_flags: 0,
        }
    }
}

impl ConnParams {
    /// Parameters for a fresh connection: Raw encoding, 32-bit RGBA,
    /// no extensions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer's pixel format.
    #[must_use]
    pub fn pf(&self) -> &PixelFormat {
        &self.pf
    }

    /// Replace the peer's pixel format.
    ///
    /// # Errors
    ///
    /// Returns [`VncError::InvalidPixelFormat`] for formats the pipeline
    /// cannot produce.
    pub fn set_pf(&mut self, pf: PixelFormat) -> Result<()> {
        if !pf.is_valid() {
            return Err(VncError::InvalidPixelFormat);
        }
        self.pf = pf;
        Ok(())
    }

    /// True when the peer listed `encoding` in its encoding set.
    #[must_use]
    pub fn supports_encoding(&self, encoding: i32) -> bool {
        self.encodings.contains(&encoding)
    }

    /// Record the peer's encoding list.
    ///
    /// Real encodings are kept as the supported set; pseudo-encodings
    /// are folded into the capability and tuning fields. The first
    /// listed encoding the pipeline can produce becomes the preferred
    /// encoding.
    pub fn set_encodings(&mut self, encodings: &[i32]) {
        self.encodings.clear();
        self.preferred_encoding = protocol::ENCODING_RAW;
        self.supports_last_rect = false;
        self.supports_fence = false;
        self.supports_extended_clipboard = false;

        let mut preferred_set = false;

        for &enc in encodings {
            match enc {
                protocol::PSEUDO_ENCODING_LAST_RECT => self.supports_last_rect = true,
                protocol::PSEUDO_ENCODING_FENCE => self.supports_fence = true,
                protocol::PSEUDO_ENCODING_EXTENDED_CLIPBOARD => {
                    self.supports_extended_clipboard = true;
                }
                protocol::PSEUDO_ENCODING_COMPRESS_LEVEL_0
                    ..=protocol::PSEUDO_ENCODING_COMPRESS_LEVEL_9 => {
                    self.compress_level = enc - protocol::PSEUDO_ENCODING_COMPRESS_LEVEL_0;
                }
                protocol::PSEUDO_ENCODING_QUALITY_LEVEL_0
                    ..=protocol::PSEUDO_ENCODING_QUALITY_LEVEL_9 => {
                    self.quality_level = enc - protocol::PSEUDO_ENCODING_QUALITY_LEVEL_0;
                }
                protocol::PSEUDO_ENCODING_FINE_QUALITY_LEVEL_0
                    ..=protocol::PSEUDO_ENCODING_FINE_QUALITY_LEVEL_100 => {
                    self.fine_quality_level =
                        enc - protocol::PSEUDO_ENCODING_FINE_QUALITY_LEVEL_0;
                }
                protocol::PSEUDO_ENCODING_SUBSAMP_1X..=protocol::PSEUDO_ENCODING_SUBSAMP_16X => {
                    self.subsampling = match enc - protocol::PSEUDO_ENCODING_SUBSAMP_1X {
                        0 => Subsampling::None,
                        1 => Subsampling::FourX,
                        2 => Subsampling::TwoX,
                        3 => Subsampling::Gray,
                        4 => Subsampling::EightX,
                        _ => Subsampling::SixteenX,
                    };
                }
                e if e >= 0 => {
                    self.encodings.insert(e);
                    if !preferred_set && EncodeManager::supported(e) {
                        self.preferred_encoding = e;
                        preferred_set = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// The clipboard capability bits the peer announced (format bits
    /// plus action bits).
    #[must_use]
    pub fn clipboard_flags(&self) -> u32 {
        self.clipboard_flags
    }

    /// Record the peer's clipboard capabilities.
    pub fn set_clipboard_caps(&mut self, flags: u32) {
        self.clipboard_flags = flags;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::*;

    #[test]
    fn test_default_is_raw_only() {
        let cp = ConnParams::new();
        assert_eq!(cp.preferred_encoding, ENCODING_RAW);
        assert_eq!(cp.compress_level, -1);
        assert!(!cp.supports_last_rect);
    }

    #[test]
    fn test_set_encodings_parses_pseudo_encodings() {
        let mut cp = ConnParams::new();
        cp.set_encodings(&[
            ENCODING_TIGHT,
            ENCODING_ZRLE,
            PSEUDO_ENCODING_LAST_RECT,
            PSEUDO_ENCODING_FENCE,
            PSEUDO_ENCODING_EXTENDED_CLIPBOARD,
            PSEUDO_ENCODING_COMPRESS_LEVEL_0 + 6,
            PSEUDO_ENCODING_QUALITY_LEVEL_0 + 8,
            PSEUDO_ENCODING_SUBSAMP_1X + 3,
        ]);

        assert_eq!(cp.preferred_encoding, ENCODING_TIGHT);
        assert!(cp.supports_encoding(ENCODING_ZRLE));
        assert!(cp.supports_last_rect);
        assert!(cp.supports_fence);
        assert!(cp.supports_extended_clipboard);
        assert_eq!(cp.compress_level, 6);
        assert_eq!(cp.quality_level, 8);
        assert_eq!(cp.subsampling, Subsampling::Gray);
    }

    #[test]
    fn test_preferred_encoding_skips_unknown() {
        let mut cp = ConnParams::new();
        // 999 is not an encoding the pipeline can produce.
        cp.set_encodings(&[999, ENCODING_HEXTILE]);
        assert_eq!(cp.preferred_encoding, ENCODING_HEXTILE);
        assert!(cp.supports_encoding(999));
    }

    #[test]
    fn test_invalid_pixel_format_rejected() {
        let mut cp = ConnParams::new();
        let mut pf = PixelFormat::rgba32();
        pf.bits_per_pixel = 24;
        assert!(cp.set_pf(pf).is_err());
    }
}
