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

//! The frame-update encoding pipeline.
//!
//! [`EncodeManager::write_update`] turns a dirty-region description and
//! a pixel buffer into one framed framebuffer update: CopyRect records
//! first, then solid rectangles carved out by the solid finder, then
//! the remaining region split into sub-rectangles which worker threads
//! analyze and encode in parallel. Outputs drain to the connection in
//! the order rectangles were queued, never in completion order, so
//! stream-stateful encoders stay in sync with the peer.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::BytesMut;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::analysis::{analyse_rect, check_solid_rect};
use crate::connparams::{ConnParams, Subsampling};
use crate::encoder::{
    flags, Encoder, EncoderClass, EncoderType, ENCODER_CLASS_COUNT, ENCODER_TYPE_COUNT,
};
use crate::encoding::{
    HextileEncoder, RawEncoder, RreEncoder, TightEncoder, TightJpegEncoder, ZrleEncoder,
};
use crate::error::Result;
use crate::framebuffer::{BufferView, ManagedPixelBuffer, PixelBuffer, RenderedCursor};
use crate::geometry::{Point, Rect, Region};
use crate::messages::MsgWriter;
use crate::palette::Palette;
use crate::protocol::{
    ENCODING_HEXTILE, ENCODING_RAW, ENCODING_RRE, ENCODING_TIGHT, ENCODING_ZRLE,
};
use crate::translate::{translate_pixel, translate_rect};

// Split each rectangle into smaller ones no larger than this area,
// and no wider than this width.
const SUB_RECT_MAX_AREA: u64 = 65536;
const SUB_RECT_MAX_WIDTH: i32 = 2048;

// The size in pixels of either side of each block tested when looking
// for solid blocks.
const SOLID_SEARCH_BLOCK: i32 = 16;
// Don't bother with blocks smaller than this.
const SOLID_BLOCK_MIN_AREA: u64 = 2048;

// More worker threads than this just fight over the queue lock.
const MAX_ENCODE_THREADS: usize = 4;

/// What changed since the last transmitted frame.
#[derive(Debug, Clone, Default)]
pub struct UpdateInfo {
    /// Pixels whose content changed and must be re-encoded.
    pub changed: Region,
    /// Pixels that moved from elsewhere in the previous frame and are
    /// still valid there.
    pub copied: Region,
    /// The shift applied to `copied`: each copied rect's source is its
    /// position minus this delta.
    pub copy_delta: Point,
}

/// Byte and pixel counters for one (class, role) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncoderStats {
    /// Rectangles written.
    pub rects: u64,
    /// Encoded bytes on the wire.
    pub bytes: u64,
    /// Pixels covered.
    pub pixels: u64,
    /// Bytes a Raw rendition would have cost (12-byte header plus
    /// area times bytes per pixel).
    pub equivalent: u64,
}

impl EncoderStats {
    fn add_rect(&mut self, area: u64, bpp: u64) {
        self.rects += 1;
        self.pixels += area;
        self.equivalent += 12 + area * bpp / 8;
    }
}

struct WorkItem {
    /// Where the rectangle lands on the peer's screen.
    wire_rect: Rect,
    /// The same pixels in `pb` coordinates (differs for the cursor
    /// overlay, whose buffer is its own coordinate space).
    src_rect: Rect,
    pb: Arc<dyn PixelBuffer>,
    cp: Arc<ConnParams>,
}

/// The pixels a worker hands to an encoder: either a borrowed view of
/// the frame, or a derived buffer owned by this item when a pixel
/// format conversion was needed.
enum PreparedPixels {
    Owned(ManagedPixelBuffer),
    View(BufferView),
}

impl PreparedPixels {
    fn as_pixel_buffer(&self) -> &dyn PixelBuffer {
        match self {
            PreparedPixels::Owned(pb) => pb,
            PreparedPixels::View(view) => view,
        }
    }
}

struct PreparedItem {
    rect: Rect,
    pixels: PreparedPixels,
    cp: Arc<ConnParams>,
    ty: EncoderType,
    palette: Palette,
}

struct OutputItem {
    rect: Rect,
    ty: EncoderType,
    buffer: Result<BytesMut>,
}

#[derive(Default)]
struct ClassQueue {
    queue: VecDeque<PreparedItem>,
    /// A worker currently owns this queue and will drain it.
    busy: bool,
}

#[derive(Default)]
struct Queues {
    work: VecDeque<WorkItem>,
    per_class: Vec<ClassQueue>,
    output: VecDeque<OutputItem>,
    rect_count: usize,
    stop: bool,
}

/// State shared between the driver and the worker threads. One mutex
/// guards every queue; the two condvars separate "work arrived" from
/// "output arrived" wakeups.
struct Shared {
    queues: Mutex<Queues>,
    consumer: Condvar,
    producer: Condvar,
    encoders: Vec<Arc<dyn Encoder>>,
    active: RwLock<[EncoderClass; ENCODER_TYPE_COUNT]>,

    // Concrete handles to the tunable encoders so tests can observe
    // the tuning push-down.
    #[cfg(test)]
    tight: Arc<TightEncoder>,
    #[cfg(test)]
    tight_jpeg: Arc<TightJpegEncoder>,
}

impl Shared {
    fn active_class(&self, ty: EncoderType) -> EncoderClass {
        self.active.read()[ty as usize]
    }

    fn encoder_for(&self, ty: EncoderType) -> Arc<dyn Encoder> {
        Arc::clone(&self.encoders[self.active_class(ty) as usize])
    }

    /// Analyze one rectangle and pick its encoder role.
    fn prepare_rect(&self, item: WorkItem) -> PreparedItem {
        let cp = &item.cp;
        let area = item.src_rect.area();

        // This is roughly the palette-effort heuristic long used by the
        // Tight encoder: higher compression settings spend less effort
        // building a palette, on the assumption the zlib setting makes
        // up for it.
        let divisor = if cp.compress_level == -1 {
            2 * 8
        } else {
            (cp.compress_level as u64 * 8).max(4)
        };

        let mut max_colours = area / divisor;

        // Special exception inherited from the Tight encoder.
        if self.active_class(EncoderType::FullColour) == EncoderClass::TightJpeg {
            max_colours = if cp.compress_level != -1 && cp.compress_level < 2 {
                24
            } else {
                96
            };
        }

        let mut max_colours = (max_colours.max(2) as usize)
            .min(self.encoder_for(EncoderType::IndexedRle).max_palette_size())
            .min(self.encoder_for(EncoderType::Indexed).max_palette_size());
        if max_colours < 2 {
            max_colours = 2;
        }

        let mut pixels = prepare_pixel_buffer(item.src_rect, &item.pb, cp, true);

        let (rle_runs, palette) = match analyse_rect(pixels.as_pixel_buffer(), max_colours) {
            Some((runs, palette)) => (runs, palette),
            None => (0, Palette::new()),
        };

        // RLE wins when it at least halves the effective pixel count.
        let use_rle = rle_runs as u64 * 2 <= area;

        let ty = match palette.size() {
            0 => EncoderType::FullColour,
            // The solid finder normally carves these out first; kept as
            // a safety net for peers without LastRect.
            1 => EncoderType::Solid,
            2 => {
                if use_rle {
                    EncoderType::BitmapRle
                } else {
                    EncoderType::Bitmap
                }
            }
            _ => {
                if use_rle {
                    EncoderType::IndexedRle
                } else {
                    EncoderType::Indexed
                }
            }
        };

        if self.encoder_for(ty).flags() & flags::USE_NATIVE_PF != 0 {
            pixels = prepare_pixel_buffer(item.src_rect, &item.pb, cp, false);
        }

        PreparedItem {
            rect: item.wire_rect,
            pixels,
            cp: Arc::clone(&item.cp),
            ty,
            palette,
        }
    }
}

fn prepare_pixel_buffer(
    rect: Rect,
    pb: &Arc<dyn PixelBuffer>,
    cp: &ConnParams,
    convert: bool,
) -> PreparedPixels {
    if convert && !cp.pf().equal(pb.format()) {
        let (buf, stride) = pb.get_buffer(rect);
        let data = translate_rect(
            buf,
            stride,
            rect.width() as usize,
            rect.height() as usize,
            pb.format(),
            cp.pf(),
        );
        PreparedPixels::Owned(ManagedPixelBuffer::from_data(
            *cp.pf(),
            rect.width(),
            rect.height(),
            data,
        ))
    } else {
        PreparedPixels::View(BufferView::new(Arc::clone(pb), rect))
    }
}

fn encode_rect(encoder: &dyn Encoder, prep: PreparedItem) -> OutputItem {
    let mut buf = BytesMut::new();
    let buffer = encoder
        .write_rect(prep.pixels.as_pixel_buffer(), &prep.palette, &prep.cp, &mut buf)
        .map(|()| buf);

    OutputItem {
        rect: prep.rect,
        ty: prep.ty,
        buffer,
    }
}

/// Worker loop: pull a rectangle, analyze it, encode it, and queue the
/// output.
///
/// Stream-stateful encoders must produce bytes in submission order, so
/// the first worker to push onto an `ORDERED` class's queue takes
/// ownership of it and drains everything the other workers add, one
/// rectangle at a time.
fn worker(shared: Arc<Shared>) {
    let mut q = shared.queues.lock();

    loop {
        if q.stop {
            break;
        }

        let item = match q.work.pop_front() {
            Some(item) => item,
            None => {
                shared.consumer.wait(&mut q);
                continue;
            }
        };
        drop(q);

        let prep = shared.prepare_rect(item);
        let class = shared.active_class(prep.ty);
        let encoder = Arc::clone(&shared.encoders[class as usize]);

        if encoder.flags() & flags::ORDERED != 0 {
            q = shared.queues.lock();
            let class_queue = &mut q.per_class[class as usize];
            class_queue.queue.push_back(prep);

            // Someone else already owns this queue; they will encode
            // our entry in order.
            if class_queue.busy {
                continue;
            }
            class_queue.busy = true;

            loop {
                let prep = match q.per_class[class as usize].queue.pop_front() {
                    Some(prep) => prep,
                    None => {
                        q.per_class[class as usize].busy = false;
                        break;
                    }
                };
                drop(q);

                let output = encode_rect(&*encoder, prep);

                q = shared.queues.lock();
                q.output.push_back(output);
                shared.producer.notify_one();
            }
        } else {
            let output = encode_rect(&*encoder, prep);

            q = shared.queues.lock();
            q.output.push_back(output);
            shared.producer.notify_one();
        }
    }
}

/// The server-side frame-update encoding pipeline.
///
/// One instance serves one connection. Worker threads are created at
/// construction and live until the manager is dropped.
pub struct EncodeManager {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,

    updates: u64,
    copy_stats: EncoderStats,
    stats: Vec<Vec<EncoderStats>>,

    active_type: EncoderType,
    before_length: u64,
}

impl EncodeManager {
    /// Create a pipeline and start its worker threads
    /// (`min(4, CPU cores)`, one when detection fails).
    ///
    /// # Errors
    ///
    /// Fails when no worker thread could be spawned.
    pub fn new() -> Result<Self> {
        let tight = Arc::new(TightEncoder::new());
        let tight_jpeg = Arc::new(TightJpegEncoder::new());

        let encoders: Vec<Arc<dyn Encoder>> = vec![
            Arc::new(RawEncoder),
            Arc::new(RreEncoder),
            Arc::new(HextileEncoder),
            Arc::clone(&tight) as Arc<dyn Encoder>,
            Arc::clone(&tight_jpeg) as Arc<dyn Encoder>,
            Arc::new(ZrleEncoder::new()),
        ];

        let mut queues = Queues::default();
        queues
            .per_class
            .resize_with(ENCODER_CLASS_COUNT, ClassQueue::default);

        let shared = Arc::new(Shared {
            queues: Mutex::new(queues),
            consumer: Condvar::new(),
            producer: Condvar::new(),
            encoders,
            active: RwLock::new([EncoderClass::Raw; ENCODER_TYPE_COUNT]),
            #[cfg(test)]
            tight,
            #[cfg(test)]
            tight_jpeg,
        });

        let cpu_count = thread::available_parallelism().map_or(0, |n| n.get());
        let worker_count = if cpu_count == 0 {
            log::error!("Unable to determine the number of CPU cores on this system");
            1
        } else {
            log::info!("Detected {cpu_count} CPU core(s)");
            cpu_count.min(MAX_ENCODE_THREADS)
        };
        log::info!("Creating {worker_count} encoder thread(s)");

        let mut threads = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("encode-{i}"))
                .spawn(move || worker(shared))?;
            threads.push(handle);
        }

        Ok(Self {
            shared,
            threads,
            updates: 0,
            copy_stats: EncoderStats::default(),
            stats: vec![vec![EncoderStats::default(); ENCODER_TYPE_COUNT]; ENCODER_CLASS_COUNT],
            active_type: EncoderType::Solid,
            before_length: 0,
        })
    }

    /// Whether the pipeline can produce `encoding` at all. Connection
    /// code uses this to pick the peer's preferred encoding.
    #[must_use]
    pub fn supported(encoding: i32) -> bool {
        matches!(
            encoding,
            ENCODING_RAW | ENCODING_RRE | ENCODING_HEXTILE | ENCODING_ZRLE | ENCODING_TIGHT
        )
    }

    /// Number of framebuffer updates written so far.
    #[must_use]
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Aggregate statistics over every encoder class and role,
    /// excluding CopyRect.
    #[must_use]
    pub fn total_stats(&self) -> EncoderStats {
        let mut total = EncoderStats::default();
        for class_stats in &self.stats {
            for s in class_stats {
                total.rects += s.rects;
                total.bytes += s.bytes;
                total.pixels += s.pixels;
                total.equivalent += s.equivalent;
            }
        }
        total
    }

    /// CopyRect statistics.
    #[must_use]
    pub fn copy_stats(&self) -> EncoderStats {
        self.copy_stats
    }

    /// Encode and write one framebuffer update.
    ///
    /// The sole per-frame entry point: emits CopyRect records for
    /// `ui.copied`, carves and writes solid rectangles, encodes the
    /// remaining changed region through the worker pool, and appends
    /// the cursor overlay when supplied.
    pub fn write_update<W: Write>(
        &mut self,
        ui: &UpdateInfo,
        pb: &Arc<dyn PixelBuffer>,
        cursor: Option<&RenderedCursor>,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) -> Result<()> {
        self.updates += 1;

        self.prepare_encoders(cp);

        let n_rects = if cp.supports_last_rect {
            0xFFFF
        } else {
            let mut n = ui.copied.num_rects() + Self::compute_num_rects(&ui.changed);
            if cursor.is_some() {
                n += 1;
            }
            n as u16
        };

        writer.write_framebuffer_update_start(n_rects);

        self.write_copy_rects(ui, cp, writer);

        // Search for solid rects first; they are removed from the
        // changed region as they are written.
        let mut changed = ui.changed.clone();
        if cp.supports_last_rect {
            self.write_solid_rects(&mut changed, pb, cp, writer)?;
        }

        let cp_shared = Arc::new(cp.clone());
        self.write_rects(&changed, pb, &cp_shared, cp, writer)?;

        if let Some(cursor) = cursor {
            let buffer: Arc<dyn PixelBuffer> = cursor.buffer();
            let src_rect = buffer.rect();
            self.queue_sub_rect(cursor.effective_rect(), src_rect, &buffer, &cp_shared);
            self.flush(cp, writer)?;
        }

        writer.write_framebuffer_update_end(cp)
    }

    /// Map the six encoder roles onto concrete classes for this update
    /// and push the peer's tuning into the selected classes.
    fn prepare_encoders(&mut self, cp: &ConnParams) {
        use EncoderClass::*;

        let supported =
            |class: EncoderClass| self.shared.encoders[class as usize].is_supported(cp);
        let jpeg_usable = supported(TightJpeg) && cp.pf().bits_per_pixel >= 16;

        let mut solid = Raw;
        let mut bitmap = Raw;
        let mut bitmap_rle = Raw;
        let mut indexed = Raw;
        let mut indexed_rle = Raw;
        let mut full_colour = Raw;

        // Try to respect the client's wishes.
        match cp.preferred_encoding {
            // Horrible for anything high frequency and/or lots of colours.
            ENCODING_RRE => {
                bitmap_rle = Rre;
                indexed_rle = Rre;
            }
            // Slightly less horrible.
            ENCODING_HEXTILE => {
                bitmap_rle = Hextile;
                indexed_rle = Hextile;
                full_colour = Hextile;
            }
            ENCODING_TIGHT => {
                full_colour = if jpeg_usable { TightJpeg } else { Tight };
                indexed = Tight;
                indexed_rle = Tight;
                bitmap = Tight;
                bitmap_rle = Tight;
            }
            ENCODING_ZRLE => {
                full_colour = Zrle;
                bitmap_rle = Zrle;
                indexed_rle = Zrle;
                bitmap = Zrle;
                indexed = Zrle;
            }
            _ => {}
        }

        // Any roles still unassigned fall through the capability ladder.
        if full_colour == Raw {
            full_colour = if jpeg_usable {
                TightJpeg
            } else if supported(Zrle) {
                Zrle
            } else if supported(Tight) {
                Tight
            } else if supported(Hextile) {
                Hextile
            } else {
                Raw
            };
        }

        if indexed == Raw {
            indexed = if supported(Zrle) {
                Zrle
            } else if supported(Tight) {
                Tight
            } else if supported(Hextile) {
                Hextile
            } else {
                Raw
            };
        }

        if indexed_rle == Raw {
            indexed_rle = indexed;
        }
        if bitmap == Raw {
            bitmap = indexed;
        }
        if bitmap_rle == Raw {
            bitmap_rle = bitmap;
        }

        if solid == Raw {
            solid = if supported(Tight) {
                Tight
            } else if supported(Rre) {
                Rre
            } else if supported(Zrle) {
                Zrle
            } else if supported(Hextile) {
                Hextile
            } else {
                Raw
            };
        }

        // JPEG is the only encoder that can reduce things to grayscale.
        if cp.subsampling == Subsampling::Gray && supported(TightJpeg) {
            solid = TightJpeg;
            bitmap = TightJpeg;
            bitmap_rle = TightJpeg;
            indexed = TightJpeg;
            indexed_rle = TightJpeg;
            full_colour = TightJpeg;
        }

        let active = [solid, bitmap, bitmap_rle, indexed, indexed_rle, full_colour];
        *self.shared.active.write() = active;

        for class in active {
            let encoder = &self.shared.encoders[class as usize];
            encoder.set_compress_level(cp.compress_level);
            encoder.set_quality_level(cp.quality_level);
            encoder.set_fine_quality_level(cp.fine_quality_level, cp.subsampling);
        }
    }

    /// Rectangle count of `changed` after sub-rectangle splitting; used
    /// for the update header when the peer lacks LastRect.
    fn compute_num_rects(changed: &Region) -> usize {
        let mut num_rects = 0;

        for rect in changed.rects() {
            let w = rect.width();
            let h = rect.height();

            // No split necessary?
            if rect.area() < SUB_RECT_MAX_AREA && w < SUB_RECT_MAX_WIDTH {
                num_rects += 1;
                continue;
            }

            let sw = w.min(SUB_RECT_MAX_WIDTH);
            let sh = (SUB_RECT_MAX_AREA / sw as u64) as i32;

            // ceil(w/sw) * ceil(h/sh)
            num_rects += (((w - 1) / sw + 1) * ((h - 1) / sh + 1)) as usize;
        }

        num_rects
    }

    /// Record the start of one wire rectangle and write its header.
    fn start_rect<W: Write>(
        &mut self,
        rect: Rect,
        ty: EncoderType,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) {
        self.active_type = ty;
        let class = self.shared.active_class(ty);

        self.before_length = writer.bytes_written();
        self.stats[class as usize][ty as usize]
            .add_rect(rect.area(), u64::from(cp.pf().bits_per_pixel));

        let encoding = self.shared.encoders[class as usize].encoding();
        writer.start_rect(rect, encoding);
    }

    /// Record the end of the current wire rectangle.
    fn end_rect<W: Write>(&mut self, writer: &mut MsgWriter<W>) {
        writer.end_rect();

        let length = writer.bytes_written() - self.before_length;
        let class = self.shared.active_class(self.active_type);
        self.stats[class as usize][self.active_type as usize].bytes += length;
    }

    /// Emit the CopyRect records, ordered so in-place copies are safe.
    fn write_copy_rects<W: Write>(
        &mut self,
        ui: &UpdateInfo,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) {
        let before = writer.bytes_written();

        let rects = ui
            .copied
            .rects_ordered(ui.copy_delta.x <= 0, ui.copy_delta.y <= 0);
        for rect in rects {
            self.copy_stats
                .add_rect(rect.area(), u64::from(cp.pf().bits_per_pixel));

            writer.write_copy_rect(
                rect,
                (rect.tl.x - ui.copy_delta.x) as u16,
                (rect.tl.y - ui.copy_delta.y) as u16,
            );
        }

        self.copy_stats.bytes += writer.bytes_written() - before;
    }

    /// Scan the changed region for solid-coloured areas and write them
    /// out, subtracting each from `changed`.
    fn write_solid_rects<W: Write>(
        &mut self,
        changed: &mut Region,
        pb: &Arc<dyn PixelBuffer>,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) -> Result<()> {
        for rect in changed.clone().rects() {
            self.find_solid_rect(rect, changed, pb, cp, writer)?;
        }
        Ok(())
    }

    fn find_solid_rect<W: Write>(
        &mut self,
        rect: Rect,
        changed: &mut Region,
        pb: &Arc<dyn PixelBuffer>,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) -> Result<()> {
        // We start by looking for a solid 16x16 block.
        let mut dy = rect.tl.y;
        while dy < rect.br.y {
            let dh = SOLID_SEARCH_BLOCK.min(rect.br.y - dy);

            let mut dx = rect.tl.x;
            while dx < rect.br.x {
                let dw = SOLID_SEARCH_BLOCK.min(rect.br.x - dx);

                let mut colour = [0u8; 4];
                pb.get_image(Rect::from_xywh(dx, dy, 1, 1), &mut colour);

                let block = Rect::from_xywh(dx, dy, dw, dh);
                if check_solid_rect(pb.as_ref(), block, &colour) {
                    // Try extending the area by adding more blocks in
                    // both directions, keeping the combination that
                    // gives the largest area.
                    let search = Rect::new(Point::new(dx, dy), rect.br);
                    let erb = extend_solid_area_by_block(search, &colour, pb.as_ref());

                    let erp = if erb == rect {
                        erb
                    } else {
                        if erb.area() < SOLID_BLOCK_MIN_AREA {
                            dx += dw;
                            continue;
                        }
                        // Extend again, one pixel row/column at a time.
                        extend_solid_area_by_pixel(rect, erb, &colour, pb.as_ref())
                    };

                    self.write_one_solid_rect(erp, pb, &colour, cp, writer)?;
                    changed.subtract_rect(erp);

                    // Search the remainders by recursion. The strip
                    // left of the found area has already been scanned
                    // to a block's height.
                    if erp.tl.x != rect.tl.x && erp.height() > SOLID_SEARCH_BLOCK {
                        let sr = Rect::from_xywh(
                            rect.tl.x,
                            erp.tl.y + SOLID_SEARCH_BLOCK,
                            erp.tl.x - rect.tl.x,
                            erp.height() - SOLID_SEARCH_BLOCK,
                        );
                        self.find_solid_rect(sr, changed, pb, cp, writer)?;
                    }

                    if erp.br.x != rect.br.x {
                        let sr = Rect::from_xywh(
                            erp.br.x,
                            erp.tl.y,
                            rect.br.x - erp.br.x,
                            erp.height(),
                        );
                        self.find_solid_rect(sr, changed, pb, cp, writer)?;
                    }

                    if erp.br.y != rect.br.y {
                        let sr = Rect::from_xywh(
                            rect.tl.x,
                            erp.br.y,
                            rect.width(),
                            rect.br.y - erp.br.y,
                        );
                        self.find_solid_rect(sr, changed, pb, cp, writer)?;
                    }

                    return Ok(());
                }

                dx += dw;
            }

            dy += dh;
        }

        Ok(())
    }

    fn write_one_solid_rect<W: Write>(
        &mut self,
        rect: Rect,
        pb: &Arc<dyn PixelBuffer>,
        colour: &[u8; 4],
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) -> Result<()> {
        self.start_rect(rect, EncoderType::Solid, cp, writer);

        let encoder = self.shared.encoder_for(EncoderType::Solid);
        let mut buf = BytesMut::new();

        if encoder.flags() & flags::USE_NATIVE_PF != 0 {
            encoder.write_solid_rect(
                rect.width(),
                rect.height(),
                pb.format(),
                colour,
                cp,
                &mut buf,
            )?;
        } else {
            let converted = translate_pixel(colour, pb.format(), cp.pf());
            encoder.write_solid_rect(
                rect.width(),
                rect.height(),
                cp.pf(),
                &converted,
                cp,
                &mut buf,
            )?;
        }

        writer.write_bytes(&buf);
        self.end_rect(writer);
        Ok(())
    }

    /// Split the remaining region into bounded sub-rectangles, queue
    /// them for the workers, and drain the results.
    fn write_rects<W: Write>(
        &mut self,
        changed: &Region,
        pb: &Arc<dyn PixelBuffer>,
        cp_shared: &Arc<ConnParams>,
        cp: &ConnParams,
        writer: &mut MsgWriter<W>,
    ) -> Result<()> {
        debug_assert!(self.shared.queues.lock().work.is_empty());

        for rect in changed.rects() {
            let w = rect.width();
            let h = rect.height();

            // No split necessary?
            if rect.area() < SUB_RECT_MAX_AREA && w < SUB_RECT_MAX_WIDTH {
                self.queue_sub_rect(rect, rect, pb, cp_shared);
                continue;
            }

            let sw = w.min(SUB_RECT_MAX_WIDTH);
            let sh = (SUB_RECT_MAX_AREA / sw as u64) as i32;

            let mut ty = rect.tl.y;
            while ty < rect.br.y {
                let by = (ty + sh).min(rect.br.y);

                let mut tx = rect.tl.x;
                while tx < rect.br.x {
                    let bx = (tx + sw).min(rect.br.x);

                    let sub = Rect::new(Point::new(tx, ty), Point::new(bx, by));
                    self.queue_sub_rect(sub, sub, pb, cp_shared);

                    tx = bx;
                }

                ty = by;
            }
        }

        self.flush(cp, writer)
    }

    /// Hand one rectangle to the worker pool.
    fn queue_sub_rect(
        &self,
        wire_rect: Rect,
        src_rect: Rect,
        pb: &Arc<dyn PixelBuffer>,
        cp: &Arc<ConnParams>,
    ) {
        let item = WorkItem {
            wire_rect,
            src_rect,
            pb: Arc::clone(pb),
            cp: Arc::clone(cp),
        };

        let mut q = self.shared.queues.lock();
        q.work.push_back(item);
        q.rect_count += 1;
        self.shared.consumer.notify_one();
    }

    /// Drain worker outputs to the connection, in the order rectangles
    /// were queued, until every queued rectangle has been written.
    fn flush<W: Write>(&mut self, cp: &ConnParams, writer: &mut MsgWriter<W>) -> Result<()> {
        let mut q = self.shared.queues.lock();

        while q.rect_count > 0 {
            let output = match q.output.pop_front() {
                Some(output) => output,
                None => {
                    self.shared.producer.wait(&mut q);
                    continue;
                }
            };
            q.rect_count -= 1;
            drop(q);

            let buffer = output.buffer?;
            self.start_rect(output.rect, output.ty, cp, writer);
            writer.write_bytes(&buffer);
            self.end_rect(writer);

            q = self.shared.queues.lock();
        }

        Ok(())
    }

    /// Emit a per-class summary of everything written so far.
    pub fn log_stats(&self) {
        let mut total = EncoderStats::default();

        log::info!("Framebuffer updates: {}", self.updates);

        if self.copy_stats.rects != 0 {
            total = accumulate(total, &self.copy_stats);
            log::info!("  CopyRect:");
            log_stat_line("Copies", &self.copy_stats);
        }

        for (class_idx, class_stats) in self.stats.iter().enumerate() {
            if class_stats.iter().all(|s| s.rects == 0) {
                continue;
            }

            log::info!("  {}:", EncoderClass::ALL[class_idx].name());

            for (ty_idx, s) in class_stats.iter().enumerate() {
                if s.rects == 0 {
                    continue;
                }
                total = accumulate(total, s);
                log_stat_line(EncoderType::ALL[ty_idx].name(), s);
            }
        }

        let ratio = ratio(total.equivalent, total.bytes);
        log::info!(
            "  Total: {}, {}",
            si_prefix(total.rects as f64, "rects"),
            si_prefix(total.pixels as f64, "pixels")
        );
        log::info!(
            "         {} (1:{ratio:.3} ratio)",
            iec_prefix(total.bytes as f64, "B")
        );
    }
}

impl Drop for EncodeManager {
    fn drop(&mut self) {
        {
            let mut q = self.shared.queues.lock();
            q.stop = true;
            // We can't wake just one thread, so wake everyone.
            self.shared.consumer.notify_all();
        }

        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }

        self.log_stats();
    }
}

fn accumulate(mut total: EncoderStats, s: &EncoderStats) -> EncoderStats {
    total.rects += s.rects;
    total.bytes += s.bytes;
    total.pixels += s.pixels;
    total.equivalent += s.equivalent;
    total
}

fn ratio(equivalent: u64, bytes: u64) -> f64 {
    if bytes == 0 {
        0.0
    } else {
        equivalent as f64 / bytes as f64
    }
}

fn log_stat_line(label: &str, s: &EncoderStats) {
    log::info!(
        "    {label}: {}, {}",
        si_prefix(s.rects as f64, "rects"),
        si_prefix(s.pixels as f64, "pixels")
    );
    log::info!(
        "    {:width$}  {} (1:{:.3} ratio)",
        "",
        iec_prefix(s.bytes as f64, "B"),
        ratio(s.equivalent, s.bytes),
        width = label.len()
    );
}

fn si_prefix(mut value: f64, unit: &str) -> String {
    const PREFIXES: [&str; 5] = ["", "k", "M", "G", "T"];
    let mut idx = 0;
    while value >= 1000.0 && idx < PREFIXES.len() - 1 {
        value /= 1000.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{value:.0} {unit}")
    } else {
        format!("{value:.2} {}{unit}", PREFIXES[idx])
    }
}

fn iec_prefix(mut value: f64, unit: &str) -> String {
    const PREFIXES: [&str; 5] = ["", "Ki", "Mi", "Gi", "Ti"];
    let mut idx = 0;
    while value >= 1024.0 && idx < PREFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{value:.0} {unit}")
    } else {
        format!("{value:.2} {}{unit}", PREFIXES[idx])
    }
}

/// Grow a solid area block by block, width first, retaining the
/// width/height combination with the largest area.
fn extend_solid_area_by_block(r: Rect, colour: &[u8; 4], pb: &dyn PixelBuffer) -> Rect {
    let mut w_prev = r.width();
    let mut w_best = 0;
    let mut h_best = 0;

    let mut dy = r.tl.y;
    while dy < r.br.y {
        let dh = SOLID_SEARCH_BLOCK.min(r.br.y - dy);

        // Test one block outside the x loop so a failing first block
        // breaks the y loop right away.
        let mut dw = SOLID_SEARCH_BLOCK.min(w_prev);
        if !check_solid_rect(pb, Rect::from_xywh(r.tl.x, dy, dw, dh), colour) {
            break;
        }

        let mut dx = r.tl.x + dw;
        while dx < r.tl.x + w_prev {
            dw = SOLID_SEARCH_BLOCK.min(r.tl.x + w_prev - dx);
            if !check_solid_rect(pb, Rect::from_xywh(dx, dy, dw, dh), colour) {
                break;
            }
            dx += dw;
        }

        w_prev = dx - r.tl.x;
        if w_prev * (dy + dh - r.tl.y) > w_best * h_best {
            w_best = w_prev;
            h_best = dy + dh - r.tl.y;
        }

        dy += dh;
    }

    Rect::from_xywh(r.tl.x, r.tl.y, w_best, h_best)
}

/// Grow a solid area one pixel row/column at a time within `r`,
/// starting from the block-aligned rectangle `sr`.
fn extend_solid_area_by_pixel(
    r: Rect,
    sr: Rect,
    colour: &[u8; 4],
    pb: &dyn PixelBuffer,
) -> Rect {
    let mut er = sr;

    // Upwards.
    let mut cy = sr.tl.y - 1;
    while cy >= r.tl.y {
        if !check_solid_rect(pb, Rect::from_xywh(sr.tl.x, cy, sr.width(), 1), colour) {
            break;
        }
        cy -= 1;
    }
    er.tl.y = cy + 1;

    // Downwards.
    let mut cy = sr.br.y;
    while cy < r.br.y {
        if !check_solid_rect(pb, Rect::from_xywh(sr.tl.x, cy, sr.width(), 1), colour) {
            break;
        }
        cy += 1;
    }
    er.br.y = cy;

    // To the left.
    let mut cx = sr.tl.x - 1;
    while cx >= r.tl.x {
        if !check_solid_rect(pb, Rect::from_xywh(cx, er.tl.y, 1, er.height()), colour) {
            break;
        }
        cx -= 1;
    }
    er.tl.x = cx + 1;

    // To the right.
    let mut cx = sr.br.x;
    while cx < r.br.x {
        if !check_solid_rect(pb, Rect::from_xywh(cx, er.tl.y, 1, er.height()), colour) {
            break;
        }
        cx += 1;
    }
    er.br.x = cx;

    er
}
