/*
 *  display/layout.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Resolution derived geometry
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

/// Everything the renderers need to place things on screen. Derived once
/// from the sink resolution and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Left/right padding
    pub pad_x: u32,

    /// Top padding, also the first title baseline
    pub pad_y: u32,

    /// Title font size in pixels
    pub title_size: f32,

    /// Artist/album/quality/readout font size in pixels
    pub text_size: f32,

    /// Progress bar thickness
    pub bar_height: u32,

    /// Progress bar top edge
    pub bar_y: u32,
}

impl DisplayGeometry {
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            width,
            height,
            pad_x: (w * 0.0625) as u32,
            pad_y: (h * 0.15625) as u32,
            title_size: (h * 0.1).floor().max(1.0),
            text_size: (h * 0.078125).floor().max(1.0),
            bar_height: ((h * 0.00625) as u32).max(1),
            bar_y: (h * 0.8) as u32,
        }
    }

    /// Line height the text block steps by.
    pub fn line_height(&self) -> f32 {
        self.title_size
    }

    /// Full width of the progress track.
    pub fn track_width(&self) -> u32 {
        self.width.saturating_sub(self.pad_x * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_480x320() {
        let g = DisplayGeometry::for_resolution(480, 320);
        assert_eq!(g.pad_x, 30);
        assert_eq!(g.pad_y, 50);
        assert_eq!(g.title_size, 32.0);
        assert_eq!(g.text_size, 25.0);
        assert_eq!(g.bar_height, 2);
        assert_eq!(g.bar_y, 256);
        assert_eq!(g.track_width(), 420);
    }

    #[test]
    fn test_geometry_tiny_display_keeps_bar() {
        let g = DisplayGeometry::for_resolution(64, 32);
        assert_eq!(g.bar_height, 1);
        assert!(g.title_size >= 1.0);
        assert!(g.bar_y < g.height);
    }
}
