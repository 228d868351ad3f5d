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

//! # rustvncencoder
//!
//! The server-side frame-update encoding pipeline of an RFB (Remote
//! Framebuffer) protocol server, following RFC 6143 plus the community
//! extensions for fences and the extended clipboard.
//!
//! Given a pixel buffer, a description of what changed since the last
//! transmitted frame, and the negotiated capabilities of a remote peer,
//! the pipeline produces a sequence of protocol-framed rectangles that
//! reconstruct the change on the peer's display while minimizing bytes
//! on the wire and CPU time spent encoding.
//!
//! ## Features
//!
//! - **Six encoder classes**: Raw, RRE, Hextile, Tight, Tight-JPEG,
//!   ZRLE, selected per rectangle from the peer's capabilities and the
//!   rectangle's content
//! - **Solid-region discovery**: uniformly-coloured areas are carved
//!   out and sent as single fills before general encoding
//! - **Parallel encoding**: up to four worker threads analyze and
//!   encode rectangles concurrently while stream-stateful encoders
//!   keep their required ordering
//! - **All pixel formats**: 8/16/32-bit true colour, either endianness
//! - **Optional TurboJPEG**: hardware-accelerated JPEG compression via
//!   the `turbojpeg` feature
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rustvncencoder::{
//!     ConnParams, EncodeManager, ManagedPixelBuffer, MsgWriter, PixelBuffer,
//!     PixelFormat, Rect, Region, UpdateInfo,
//! };
//!
//! # fn main() -> rustvncencoder::Result<()> {
//! let mut manager = EncodeManager::new()?;
//!
//! // Negotiated peer state, owned by the connection.
//! let mut cp = ConnParams::new();
//! cp.set_encodings(&[16 /* ZRLE */, -224 /* LastRect */]);
//!
//! // The frame and what changed in it.
//! let frame: Arc<dyn PixelBuffer> =
//!     Arc::new(ManagedPixelBuffer::new(PixelFormat::rgba32(), 1920, 1080));
//! let ui = UpdateInfo {
//!     changed: Region::from_rect(Rect::from_xywh(0, 0, 640, 480)),
//!     ..Default::default()
//! };
//!
//! // Encode one update onto the connection's byte stream.
//! let mut writer = MsgWriter::new(Vec::new());
//! manager.write_update(&ui, &frame, None, &cp, &mut writer)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! write_update(ui, pb, cursor)
//!     │
//!     ├── CopyRect records (ui.copied, ordered for in-place copy)
//!     ├── solid finder ──── solid rects, subtracted from ui.changed
//!     └── remaining region ── split into sub-rectangles
//!               │
//!               ▼            workers (min(4, cores))
//!         ┌──────────┐   analyze → pick role → encode
//!         │ workQueue ├──────────────────────────────┐
//!         └──────────┘                               ▼
//!                                            ┌─────────────┐
//!         drained in FIFO push order  ◄──────┤ outputQueue │
//!         (startRect / payload / endRect)    └─────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod connparams;
pub mod encoder;
pub mod encoding;
pub mod error;
pub mod framebuffer;
pub mod geometry;
pub mod io;
pub mod manager;
pub mod messages;
pub mod palette;
pub mod protocol;
pub mod translate;

// Internal modules
pub mod jpeg;

// Re-exports
pub use connparams::{ConnParams, Subsampling};
pub use encoder::{Encoder, EncoderClass, EncoderType};
pub use error::{Result, VncError};
pub use framebuffer::{BufferView, ManagedPixelBuffer, PixelBuffer, RenderedCursor};
pub use geometry::{Point, Rect, Region};
pub use manager::{EncodeManager, EncoderStats, UpdateInfo};
pub use messages::{MsgHandler, MsgReader, MsgWriter};
pub use palette::Palette;
pub use protocol::PixelFormat;

#[cfg(feature = "turbojpeg")]
pub use jpeg::TurboJpegEncoder;
