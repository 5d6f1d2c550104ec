/*
 *  display/mod.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - background, overlay, composite, sink
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

// Core trait definitions
pub mod traits;
pub mod error;

// Geometry and color
pub mod layout;
pub mod color;

// Frame layers
pub mod background;
pub mod overlay;
pub mod compositor;

// Output sinks
pub mod drivers;

// Re-exports for convenience
pub use traits::{BoxedSink, FrameSink};
pub use error::DisplayError;
pub use layout::DisplayGeometry;
pub use color::{Palette, PaletteExtractor, Rgb};
pub use background::{ArtworkError, ArtworkFetcher, BackgroundImage, BackgroundImageCache, HttpArtworkFetcher};
pub use overlay::OverlayRenderer;
pub use compositor::{DisplayCompositor, Frame};
pub use drivers::open_sink;
