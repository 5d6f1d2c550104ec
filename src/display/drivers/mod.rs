/*
 *  display/drivers/mod.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Frame sinks
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

pub mod framebuffer;
pub mod snapshot;

// Mock sink for testing
#[cfg(test)]
pub mod mock;

use crate::display::error::DisplayError;
use crate::display::traits::BoxedSink;

/// Device prefix selecting the PNG snapshot sink
pub const SNAPSHOT_PREFIX: &str = "snapshot:";

/// Open the sink named by `device`. A framebuffer reports its own size;
/// a snapshot needs one given.
pub fn open_sink(device: &str, width: Option<u32>, height: Option<u32>) -> Result<BoxedSink, DisplayError> {
    if let Some(path) = device.strip_prefix(SNAPSHOT_PREFIX) {
        let (Some(w), Some(h)) = (width, height) else {
            return Err(DisplayError::InitializationFailed(
                "snapshot sink needs display.width and display.height".to_string(),
            ));
        };
        return Ok(Box::new(snapshot::SnapshotSink::new(path, w, h)?));
    }

    Ok(Box::new(framebuffer::FramebufferSink::open(device)?))
}
