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

//! Read-only pixel buffer views consumed by the encoding pipeline.
//!
//! The pipeline never owns the frame it encodes; it receives a
//! [`PixelBuffer`] borrowed for the duration of one update. When a
//! pixel-format conversion is needed, a derived [`ManagedPixelBuffer`]
//! is allocated and owned by the work item that carries it.
//!
//! # Stride is in pixels, not bytes
//!
//! Stride values throughout this API count **pixels**. When computing
//! byte offsets, always multiply by `format().bytes_per_pixel()`.

use std::sync::Arc;

use crate::geometry::{Point, Rect};
use crate::protocol::PixelFormat;

/// A rectangular, read-only view of pixels in a single [`PixelFormat`].
pub trait PixelBuffer: Send + Sync {
    /// The in-memory format of the pixels.
    fn format(&self) -> &PixelFormat;

    /// Width of the buffer in pixels.
    fn width(&self) -> i32;

    /// Height of the buffer in pixels.
    fn height(&self) -> i32;

    /// The buffer's bounds as a rectangle at the origin.
    fn rect(&self) -> Rect {
        Rect::from_xywh(0, 0, self.width(), self.height())
    }

    /// Direct access to the pixels of `rect`.
    ///
    /// Returns the raw bytes starting at the rectangle's top-left pixel
    /// together with the row stride in pixels. Rows after the first may
    /// carry `stride - rect.width()` trailing pixels that are not part
    /// of the rectangle.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not entirely within the buffer's bounds.
    fn get_buffer(&self, rect: Rect) -> (&[u8], usize);

    /// Packed copy of `rect` into `dst` (rows are contiguous).
    ///
    /// # Panics
    ///
    /// Panics if `rect` is out of bounds or `dst` is too small.
    fn get_image(&self, rect: Rect, dst: &mut [u8]) {
        let bpp = self.format().bytes_per_pixel();
        let (src, stride) = self.get_buffer(rect);
        let row_bytes = rect.width() as usize * bpp;
        let stride_bytes = stride * bpp;

        assert!(dst.len() >= row_bytes * rect.height() as usize);

        for y in 0..rect.height() as usize {
            let src_off = y * stride_bytes;
            dst[y * row_bytes..(y + 1) * row_bytes]
                .copy_from_slice(&src[src_off..src_off + row_bytes]);
        }
    }
}

/// A pixel buffer backed by memory it owns.
#[derive(Debug, Clone)]
pub struct ManagedPixelBuffer {
    format: PixelFormat,
    width: i32,
    height: i32,
    data: Vec<u8>,
}

impl ManagedPixelBuffer {
    /// Allocate a zero-filled buffer.
    #[must_use]
    pub fn new(format: PixelFormat, width: i32, height: i32) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            format,
            width,
            height,
            data: vec![0; len],
        }
    }

    /// Wrap packed pixel data (stride equals width).
    ///
    /// # Panics
    ///
    /// Panics if `data` does not hold exactly `width * height` pixels.
    #[must_use]
    pub fn from_data(format: PixelFormat, width: i32, height: i32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "pixel data length does not match dimensions"
        );
        Self {
            format,
            width,
            height,
            data,
        }
    }

    /// Mutable access to the underlying pixel bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrite a single pixel.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn set_pixel(&mut self, x: i32, y: i32, pixel: u32) {
        assert!(x >= 0 && x < self.width && y >= 0 && y < self.height);
        let bpp = self.format.bytes_per_pixel();
        let off = (y as usize * self.width as usize + x as usize) * bpp;
        let format = self.format;
        format.pixel_to_bytes(pixel, &mut self.data[off..off + bpp]);
    }

    /// Fill a rectangle with a single pixel value.
    pub fn fill_rect(&mut self, rect: Rect, pixel: u32) {
        for y in rect.tl.y..rect.br.y {
            for x in rect.tl.x..rect.br.x {
                self.set_pixel(x, y, pixel);
            }
        }
    }
}

impl PixelBuffer for ManagedPixelBuffer {
    fn format(&self) -> &PixelFormat {
        &self.format
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn get_buffer(&self, rect: Rect) -> (&[u8], usize) {
        assert!(
            self.rect().encloses(&rect) && !rect.is_empty(),
            "rect {rect:?} outside buffer {}x{}",
            self.width,
            self.height
        );

        let bpp = self.format.bytes_per_pixel();
        let stride = self.width as usize;
        let start = (rect.tl.y as usize * stride + rect.tl.x as usize) * bpp;
        let end = start
            + ((rect.height() as usize - 1) * stride + rect.width() as usize) * bpp;
        (&self.data[start..end], stride)
    }
}

/// A borrowed sub-rectangle view of another pixel buffer.
///
/// Coordinates on the view are local: `(0, 0)` maps to the top-left of
/// the viewed rectangle.
#[derive(Clone)]
pub struct BufferView {
    parent: Arc<dyn PixelBuffer>,
    rect: Rect,
}

impl BufferView {
    /// Create a view of `rect` within `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `rect` is not entirely within the parent's bounds.
    #[must_use]
    pub fn new(parent: Arc<dyn PixelBuffer>, rect: Rect) -> Self {
        assert!(parent.rect().encloses(&rect));
        Self { parent, rect }
    }
}

impl PixelBuffer for BufferView {
    fn format(&self) -> &PixelFormat {
        self.parent.format()
    }

    fn width(&self) -> i32 {
        self.rect.width()
    }

    fn height(&self) -> i32 {
        self.rect.height()
    }

    fn get_buffer(&self, rect: Rect) -> (&[u8], usize) {
        assert!(self.rect().encloses(&rect));
        self.parent
            .get_buffer(rect.translated(self.rect.tl.x, self.rect.tl.y))
    }
}

/// An already-rendered cursor overlay.
///
/// The pipeline does not render cursors; it accepts one pre-composited
/// by the caller and encodes it as a single ordinary sub-rectangle.
#[derive(Clone)]
pub struct RenderedCursor {
    buffer: Arc<ManagedPixelBuffer>,
    position: Point,
}

impl RenderedCursor {
    /// Wrap a rendered cursor placed at `position` on the screen.
    #[must_use]
    pub fn new(buffer: Arc<ManagedPixelBuffer>, position: Point) -> Self {
        Self { buffer, position }
    }

    /// The screen rectangle the cursor covers.
    #[must_use]
    pub fn effective_rect(&self) -> Rect {
        Rect::from_xywh(
            self.position.x,
            self.position.y,
            self.buffer.width(),
            self.buffer.height(),
        )
    }

    /// The cursor pixels.
    #[must_use]
    pub fn buffer(&self) -> Arc<ManagedPixelBuffer> {
        Arc::clone(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: i32, h: i32) -> ManagedPixelBuffer {
        let mut pb = ManagedPixelBuffer::new(PixelFormat::rgba32(), w, h);
        for y in 0..h {
            for x in 0..w {
                pb.set_pixel(x, y, if (x + y) % 2 == 0 { 0x00FF_FFFF } else { 0 });
            }
        }
        pb
    }

    #[test]
    fn test_get_buffer_stride_and_offset() {
        let pb = checkerboard(8, 8);
        let (buf, stride) = pb.get_buffer(Rect::from_xywh(2, 3, 4, 2));
        assert_eq!(stride, 8);
        // First pixel of the slice is (2,3): odd parity, so zero.
        assert_eq!(pb.format().pixel_from_bytes(&buf[..4]), 0);
    }

    #[test]
    fn test_get_image_packs_rows() {
        let pb = checkerboard(8, 8);
        let rect = Rect::from_xywh(0, 0, 3, 2);
        let mut dst = vec![0u8; 3 * 2 * 4];
        pb.get_image(rect, &mut dst);
        let pf = *pb.format();
        assert_eq!(pf.pixel_from_bytes(&dst[0..4]), 0x00FF_FFFF);
        assert_eq!(pf.pixel_from_bytes(&dst[4..8]), 0);
        // Row 1 starts immediately after the 3 pixels of row 0.
        assert_eq!(pf.pixel_from_bytes(&dst[12..16]), 0);
    }

    #[test]
    fn test_buffer_view_local_coordinates() {
        let pb = Arc::new(checkerboard(8, 8)) as Arc<dyn PixelBuffer>;
        let view = BufferView::new(pb, Rect::from_xywh(1, 1, 4, 4));
        assert_eq!(view.width(), 4);
        let (buf, _) = view.get_buffer(Rect::from_xywh(0, 0, 1, 1));
        // (0,0) of the view is (1,1) of the parent: even parity.
        assert_eq!(view.format().pixel_from_bytes(&buf[..4]), 0x00FF_FFFF);
    }

    #[test]
    #[should_panic(expected = "outside buffer")]
    fn test_out_of_bounds_rect_panics() {
        let pb = checkerboard(8, 8);
        pb.get_buffer(Rect::from_xywh(4, 4, 8, 8));
    }

    #[test]
    fn test_rendered_cursor_rect() {
        let pb = Arc::new(ManagedPixelBuffer::new(PixelFormat::rgba32(), 16, 20));
        let cursor = RenderedCursor::new(pb, Point::new(100, 50));
        assert_eq!(cursor.effective_rect(), Rect::from_xywh(100, 50, 16, 20));
    }
}
