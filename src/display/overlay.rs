/*
 *  display/overlay.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Text and progress bar layer, rendered through resvg
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

//! The overlay is built as a small SVG document and rasterized by resvg into
//! a transparent pixmap the size of the display. Text uses the one font face
//! loaded at startup.

use log::{debug, info};
use usvg::{fontdb, Options, Tree};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{Pixmap, Transform};

use crate::deutils::seconds_to_hms;
use crate::display::color::{Palette, Rgb};
use crate::display::error::DisplayError;
use crate::display::layout::DisplayGeometry;
use crate::playback::PlaybackState;

/// Fill width of the progress bar. Whole elapsed seconds over the duration,
/// clamped to the track. Zero duration means nothing to measure against.
pub fn progress_fill_width(seek_ms: u64, duration_sec: u64, track_width: u32) -> u32 {
    if duration_sec == 0 {
        return 0;
    }
    let elapsed = seek_ms / 1000;
    let fill = (track_width as u64).saturating_mul(elapsed) / duration_sec;
    fill.min(track_width as u64) as u32
}

/// "elapsed / total", or just elapsed when the total is unknown.
pub fn readout(state: &PlaybackState) -> String {
    let elapsed = seconds_to_hms(state.elapsed_sec());
    if state.duration_sec == 0 {
        elapsed
    } else {
        format!("{} / {}", elapsed, seconds_to_hms(state.duration_sec))
    }
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

fn push_text(svg: &mut String, x: u32, y: f32, size: f32, color: Rgb, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{:.1}" font-size="{}" fill="{}">{}</text>"#,
        x,
        y,
        size,
        color.hex(),
        xml_escape(text)
    );
}

fn push_rect(svg: &mut String, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
    if w == 0 || h == 0 {
        return;
    }
    let _ = writeln!(
        svg,
        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
        x,
        y,
        w,
        h,
        color.hex()
    );
}

/// Build the overlay document for one frame.
pub fn compose_svg(state: &PlaybackState, palette: &Palette, geometry: &DisplayGeometry, family: &str) -> String {
    let g = geometry;
    let lh = g.line_height();
    let mut svg = String::with_capacity(1024);

    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = g.width,
        h = g.height
    );
    let _ = writeln!(svg, r#"<g font-family="{}">"#, xml_escape(family));

    let mut y = g.pad_y as f32;
    push_text(&mut svg, g.pad_x, y, g.title_size, palette.text, &state.title);
    y += lh * 1.5;
    push_text(&mut svg, g.pad_x, y, g.text_size, palette.text, &state.artist);
    y += lh;
    push_text(&mut svg, g.pad_x, y, g.text_size, palette.text, &state.album);
    y += lh * 1.5;
    push_text(&mut svg, g.pad_x, y, g.text_size, palette.lighter, &state.quality_label());

    let readout_y = g.bar_y as f32 - g.text_size * 0.5;
    push_text(&mut svg, g.pad_x, readout_y, g.text_size, palette.text, &readout(state));

    let track = g.track_width();
    push_rect(&mut svg, g.pad_x, g.bar_y, track, g.bar_height, palette.base);
    let fill = progress_fill_width(state.seek_ms, state.duration_sec, track);
    push_rect(&mut svg, g.pad_x, g.bar_y, fill, g.bar_height, palette.text);

    svg.push_str("</g>\n</svg>\n");
    svg
}

pub struct OverlayRenderer {
    fontdb: Arc<fontdb::Database>,
    family: String,
    geometry: DisplayGeometry,
    rotate: bool,
}

impl OverlayRenderer {
    /// Load the single font face the overlay uses. A missing or unreadable
    /// font is a startup failure.
    pub fn from_font_file<P: AsRef<Path>>(
        path: P,
        geometry: DisplayGeometry,
        rotate: bool,
    ) -> Result<Self, DisplayError> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| DisplayError::FontUnavailable(format!("{}: {}", path.display(), e)))?;

        let mut db = fontdb::Database::new();
        db.load_font_data(data);
        if db.faces().next().is_none() {
            return Err(DisplayError::FontUnavailable(format!(
                "{}: no usable face",
                path.display()
            )));
        }

        let renderer = Self::with_fontdb(geometry, rotate, db);
        info!("Overlay font {} ({})", renderer.family, path.display());
        Ok(renderer)
    }

    pub fn with_fontdb(geometry: DisplayGeometry, rotate: bool, db: fontdb::Database) -> Self {
        let family = db
            .faces()
            .next()
            .and_then(|face| face.families.first())
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "sans-serif".to_string());

        Self {
            fontdb: Arc::new(db),
            family,
            geometry,
            rotate,
        }
    }

    pub fn geometry(&self) -> &DisplayGeometry {
        &self.geometry
    }

    /// Rasterize the overlay for `state` onto a fresh transparent layer.
    pub fn render(&self, state: &PlaybackState, palette: &Palette) -> Result<Pixmap, DisplayError> {
        let g = &self.geometry;
        let svg = compose_svg(state, palette, g, &self.family);

        let mut options = Options::default();
        options.fontdb = Arc::clone(&self.fontdb);
        options.font_family = self.family.clone();

        let tree = Tree::from_str(&svg, &options)
            .map_err(|e| DisplayError::DrawingError(format!("overlay markup: {}", e)))?;

        let mut pixmap = Pixmap::new(g.width, g.height)
            .ok_or_else(|| DisplayError::DrawingError(format!("cannot allocate {}x{}", g.width, g.height)))?;

        // panel is mounted upside down
        let transform = if self.rotate {
            Transform::from_rotate_at(180.0, g.width as f32 / 2.0, g.height as f32 / 2.0)
        } else {
            Transform::identity()
        };

        resvg::render(&tree, transform, &mut pixmap.as_mut());
        debug!("overlay rendered, readout {}", readout(state));
        Ok(pixmap)
    }
}
