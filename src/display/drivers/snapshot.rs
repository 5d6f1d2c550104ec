/*
 *  display/drivers/snapshot.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  PNG snapshot sink for desktop use
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

use image::ExtendedColorType;
use log::info;
use std::path::{Path, PathBuf};

use crate::display::compositor::Frame;
use crate::display::error::DisplayError;
use crate::display::traits::FrameSink;

/// Overwrites one PNG file with every frame.
pub struct SnapshotSink {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl SnapshotSink {
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self, DisplayError> {
        if width == 0 || height == 0 {
            return Err(DisplayError::InitializationFailed(format!(
                "snapshot size {}x{} is empty",
                width, height
            )));
        }
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(DisplayError::InitializationFailed(format!(
                    "snapshot directory {} missing",
                    parent.display()
                )));
            }
        }
        info!("Snapshot sink {} {}x{}", path.display(), width, height);
        Ok(Self { path, width, height })
    }
}

impl FrameSink for SnapshotSink {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn write_frame(&mut self, _x: i32, _y: i32, frame: &Frame) -> Result<(), DisplayError> {
        self.check_frame(frame)?;
        image::save_buffer(
            &self.path,
            &frame.to_rgba_unmultiplied(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::{Color, Pixmap};

    #[test]
    fn test_snapshot_roundtrips_through_png() {
        let path = std::env::temp_dir().join(format!("nowframe-snap-{}.png", std::process::id()));
        let mut sink = SnapshotSink::new(&path, 3, 2).unwrap();

        let mut p = Pixmap::new(3, 2).unwrap();
        p.fill(Color::from_rgba8(40, 80, 120, 255));
        sink.write_frame(0, 0, &Frame::from(p)).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [40, 80, 120, 255]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_snapshot_needs_size() {
        assert!(SnapshotSink::new("/tmp/x.png", 0, 10).is_err());
        assert!(SnapshotSink::new("/nonexistent-dir/x.png", 10, 10).is_err());
    }
}
