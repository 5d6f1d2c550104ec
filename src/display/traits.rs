/*
 *  display/traits.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Output sink abstraction
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

use crate::display::compositor::Frame;
use crate::display::error::DisplayError;

/// Minimal output abstraction - every sink the frames can go to implements this.
///
/// Sinks only ever take full-frame replacements. Width and height are fixed
/// when the sink is opened and never change afterwards.
pub trait FrameSink: Send {
    /// Returns the sink dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32);

    /// Write a complete frame with its top-left corner at (x, y)
    fn write_frame(&mut self, x: i32, y: i32, frame: &Frame) -> Result<(), DisplayError>;

    /// Human readable name for logging
    fn name(&self) -> &str {
        "sink"
    }

    /// Reject frames that are not exactly the sink size
    fn check_frame(&self, frame: &Frame) -> Result<(), DisplayError> {
        let expected = self.dimensions();
        let actual = (frame.width(), frame.height());
        if expected != actual {
            return Err(DisplayError::BufferSizeMismatch { expected, actual });
        }
        Ok(())
    }
}

pub type BoxedSink = Box<dyn FrameSink>;
