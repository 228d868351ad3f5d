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

//! Rectangle and region arithmetic for update tracking.
//!
//! A [`Rect`] is a half-open axis-aligned integer rectangle
//! `[tl.x, br.x) x [tl.y, br.y)`. A [`Region`] is a set of pixels kept
//! as a union of non-overlapping rectangles; the pipeline only relies
//! on union, subtraction and enumeration, not on any particular
//! internal representation.

/// A 2D point with integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A half-open rectangle defined by its top-left and bottom-right corners.
///
/// The invariant `tl.x <= br.x && tl.y <= br.y` holds for every rectangle
/// produced by this module; a rectangle with a zero-length side is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Top-left corner (inclusive).
    pub tl: Point,
    /// Bottom-right corner (exclusive).
    pub br: Point,
}

impl Rect {
    /// Create a rectangle from two corners.
    #[must_use]
    pub const fn new(tl: Point, br: Point) -> Self {
        Self { tl, br }
    }

    /// Create a rectangle from a position and dimensions.
    #[must_use]
    pub const fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            tl: Point::new(x, y),
            br: Point::new(x + w, y + h),
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.br.x - self.tl.x
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.br.y - self.tl.y
    }

    /// Area in pixels.
    #[must_use]
    pub const fn area(&self) -> u64 {
        if self.is_empty() {
            return 0;
        }
        self.width() as u64 * self.height() as u64
    }

    /// True when the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.br.x <= self.tl.x || self.br.y <= self.tl.y
    }

    /// True when `other` lies entirely within this rectangle.
    #[must_use]
    pub const fn encloses(&self, other: &Rect) -> bool {
        other.tl.x >= self.tl.x
            && other.tl.y >= self.tl.y
            && other.br.x <= self.br.x
            && other.br.y <= self.br.y
    }

    /// The overlap of two rectangles; empty when they do not intersect.
    #[must_use]
    pub fn intersection(&self, other: &Rect) -> Rect {
        let tl = Point::new(self.tl.x.max(other.tl.x), self.tl.y.max(other.tl.y));
        let br = Point::new(self.br.x.min(other.br.x), self.br.y.min(other.br.y));
        if br.x <= tl.x || br.y <= tl.y {
            Rect::default()
        } else {
            Rect::new(tl, br)
        }
    }

    /// The rectangle shifted by `(dx, dy)`.
    #[must_use]
    pub const fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            tl: Point::new(self.tl.x + dx, self.tl.y + dy),
            br: Point::new(self.br.x + dx, self.br.y + dy),
        }
    }
}

/// A set of pixels kept as a union of non-overlapping rectangles.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// The empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A region covering a single rectangle.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(rect);
        region
    }

    /// True when the region covers no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Number of rectangles the region currently decomposes into.
    #[must_use]
    pub fn num_rects(&self) -> usize {
        self.rects.len()
    }

    /// Total number of pixels covered.
    #[must_use]
    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// True when the point is covered by the region.
    #[must_use]
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        self.rects
            .iter()
            .any(|r| x >= r.tl.x && x < r.br.x && y >= r.tl.y && y < r.br.y)
    }

    /// Add a rectangle to the region.
    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }

        // Keep only the parts of the new rectangle not already covered,
        // so the union stays a disjoint set.
        let mut pieces = vec![rect];
        for existing in &self.rects {
            let mut next = Vec::with_capacity(pieces.len());
            for piece in pieces {
                split_around(&piece, existing, &mut next);
            }
            pieces = next;
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }

    /// Add another region to this one.
    pub fn union(&mut self, other: &Region) {
        for rect in &other.rects {
            self.union_rect(*rect);
        }
    }

    /// Remove a rectangle from the region.
    pub fn subtract_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }

        let mut remaining = Vec::with_capacity(self.rects.len());
        for existing in &self.rects {
            split_around(existing, &rect, &mut remaining);
        }
        self.rects = remaining;
    }

    /// Remove another region from this one.
    pub fn subtract(&mut self, other: &Region) {
        for rect in &other.rects {
            self.subtract_rect(*rect);
        }
    }

    /// Enumerate the region as rectangles in raster order.
    #[must_use]
    pub fn rects(&self) -> Vec<Rect> {
        self.rects_ordered(true, true)
    }

    /// Enumerate the region as rectangles with an explicit traversal
    /// direction.
    ///
    /// `x_ascending`/`y_ascending` select the ordering of the result;
    /// descending order is used when emitting CopyRect entries that must
    /// be safe for in-place copies.
    #[must_use]
    pub fn rects_ordered(&self, x_ascending: bool, y_ascending: bool) -> Vec<Rect> {
        let mut out = self.rects.clone();
        out.sort_by(|a, b| {
            let ya = if y_ascending { a.tl.y } else { -a.tl.y };
            let yb = if y_ascending { b.tl.y } else { -b.tl.y };
            let xa = if x_ascending { a.tl.x } else { -a.tl.x };
            let xb = if x_ascending { b.tl.x } else { -b.tl.x };
            ya.cmp(&yb).then(xa.cmp(&xb))
        });
        out
    }
}

/// Push the parts of `rect` that do not overlap `hole` onto `out`.
///
/// Splits into at most four rectangles: the bands above and below the
/// hole, and the left/right remnants of the middle band.
fn split_around(rect: &Rect, hole: &Rect, out: &mut Vec<Rect>) {
    let overlap = rect.intersection(hole);
    if overlap.is_empty() {
        out.push(*rect);
        return;
    }

    if overlap.tl.y > rect.tl.y {
        out.push(Rect::new(rect.tl, Point::new(rect.br.x, overlap.tl.y)));
    }
    if overlap.br.y < rect.br.y {
        out.push(Rect::new(Point::new(rect.tl.x, overlap.br.y), rect.br));
    }
    if overlap.tl.x > rect.tl.x {
        out.push(Rect::new(
            Point::new(rect.tl.x, overlap.tl.y),
            Point::new(overlap.tl.x, overlap.br.y),
        ));
    }
    if overlap.br.x < rect.br.x {
        out.push(Rect::new(
            Point::new(overlap.br.x, overlap.tl.y),
            Point::new(rect.br.x, overlap.br.y),
        ));
    }
}
