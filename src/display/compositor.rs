/*
 *  display/compositor.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Background + overlay merge and hand-off to the output sink
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use log::{debug, error};
use tiny_skia::{Pixmap, PixmapPaint, PremultipliedColorU8, Transform};

use crate::display::background::BackgroundImage;
use crate::display::error::DisplayError;
use crate::display::traits::BoxedSink;

/// One complete display image, premultiplied RGBA.
#[derive(Debug, Clone)]
pub struct Frame {
    pixmap: Pixmap,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<PremultipliedColorU8> {
        self.pixmap.pixel(x, y)
    }

    pub fn pixels(&self) -> &[PremultipliedColorU8] {
        self.pixmap.pixels()
    }

    /// Straight-alpha RGBA bytes, row-major, for image encoders.
    pub fn to_rgba_unmultiplied(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.pixels().len() * 4);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }
}

impl From<Pixmap> for Frame {
    fn from(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }
}

/// Copy the background, then draw the overlay over it.
pub fn compose(background: &Pixmap, overlay: &Pixmap) -> Result<Frame, DisplayError> {
    let expected = (background.width(), background.height());
    let actual = (overlay.width(), overlay.height());
    if expected != actual {
        return Err(DisplayError::BufferSizeMismatch { expected, actual });
    }

    let mut pixmap = background.clone();
    pixmap.draw_pixmap(0, 0, overlay.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
    Ok(Frame { pixmap })
}

pub struct DisplayCompositor {
    sink: BoxedSink,
    frames: u64,
}

impl DisplayCompositor {
    pub fn new(sink: BoxedSink) -> Self {
        Self { sink, frames: 0 }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.sink.dimensions()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Compose and write one frame. A failed write is reported to the
    /// caller; the next render simply tries again.
    pub fn present(&mut self, background: &BackgroundImage, overlay: &Pixmap) -> Result<(), DisplayError> {
        let frame = compose(background.pixmap(), overlay)?;
        self.sink.check_frame(&frame)?;

        if let Err(e) = self.sink.write_frame(0, 0, &frame) {
            error!("{} write failed: {}", self.sink.name(), e);
            return Err(e);
        }

        self.frames += 1;
        debug!("frame {} -> {}", self.frames, self.sink.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockSink;
    use tiny_skia::{Color, Paint, Rect};

    fn solid(w: u32, h: u32, color: Color) -> Pixmap {
        let mut p = Pixmap::new(w, h).unwrap();
        p.fill(color);
        p
    }

    #[test]
    fn test_transparent_overlay_keeps_background() {
        let bg = solid(4, 4, Color::from_rgba8(10, 20, 30, 255));
        let overlay = Pixmap::new(4, 4).unwrap();
        let frame = compose(&bg, &overlay).unwrap();
        assert_eq!(frame.pixels(), bg.pixels());
    }

    #[test]
    fn test_opaque_overlay_wins() {
        let bg = solid(4, 4, Color::from_rgba8(10, 20, 30, 255));
        let mut overlay = Pixmap::new(4, 4).unwrap();
        let mut paint = Paint::default();
        paint.set_color_rgba8(255, 255, 255, 255);
        overlay.fill_rect(Rect::from_xywh(0.0, 0.0, 2.0, 4.0).unwrap(), &paint, Transform::identity(), None);

        let frame = compose(&bg, &overlay).unwrap();
        let left = frame.pixel(0, 0).unwrap();
        let right = frame.pixel(3, 0).unwrap();
        assert_eq!((left.red(), left.green(), left.blue()), (255, 255, 255));
        assert_eq!((right.red(), right.green(), right.blue()), (10, 20, 30));

        let rgba = frame.to_rgba_unmultiplied();
        assert_eq!(rgba.len(), 4 * 4 * 4);
        assert_eq!(&rgba[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let bg = solid(4, 4, Color::BLACK);
        let overlay = Pixmap::new(4, 3).unwrap();
        assert!(matches!(
            compose(&bg, &overlay),
            Err(DisplayError::BufferSizeMismatch { expected: (4, 4), actual: (4, 3) })
        ));
    }

    #[test]
    fn test_present_writes_to_sink() {
        let sink = MockSink::new(4, 4);
        let state = sink.state();
        let mut compositor = DisplayCompositor::new(Box::new(sink));

        let bg = crate::display::background::compose_background(
            &crate::display::background::fake::png_bytes(4, 4, [0, 128, 0, 255]),
            "/art/x",
            &crate::display::layout::DisplayGeometry::for_resolution(4, 4),
            &crate::display::color::PaletteExtractor::default(),
            true,
        )
        .unwrap();
        let overlay = Pixmap::new(4, 4).unwrap();

        compositor.present(&bg, &overlay).unwrap();
        compositor.present(&bg, &overlay).unwrap();
        assert_eq!(compositor.frames_presented(), 2);
        assert_eq!(state.lock().unwrap().writes, 2);
        assert_eq!(state.lock().unwrap().last_size, Some((4, 4)));

        state.lock().unwrap().simulate_write_failure = true;
        assert!(compositor.present(&bg, &overlay).is_err());
        assert_eq!(compositor.frames_presented(), 2);
    }
}
