/*
 *  display/drivers/mock.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock frame sink for testing without hardware
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
use crate::display::traits::FrameSink;

use std::sync::{Arc, Mutex};

/// Mock sink for testing
///
/// Records every write and keeps a copy of the last frame so tests can
/// look at what would have reached the glass.
#[derive(Debug, Clone)]
pub struct MockSink {
    width: u32,
    height: u32,

    /// Shared state for testing
    state: Arc<Mutex<MockSinkState>>,
}

/// Internal state for the mock sink (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockSinkState {
    /// Number of successful write_frame calls
    pub writes: usize,

    /// Size of the last frame written
    pub last_size: Option<(u32, u32)>,

    /// Straight RGBA of the last frame written
    pub last_frame: Option<Vec<u8>>,

    /// Simulate failures (for error testing)
    pub simulate_write_failure: bool,
}

impl MockSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            state: Arc::new(Mutex::new(MockSinkState::default())),
        }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockSinkState>> {
        Arc::clone(&self.state)
    }
}

impl FrameSink for MockSink {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn write_frame(&mut self, _x: i32, _y: i32, frame: &Frame) -> Result<(), DisplayError> {
        self.check_frame(frame)?;

        let mut state = self.state.lock().unwrap();
        if state.simulate_write_failure {
            return Err(DisplayError::WriteFailed("Simulated write failure".to_string()));
        }

        state.writes += 1;
        state.last_size = Some((frame.width(), frame.height()));
        state.last_frame = Some(frame.to_rgba_unmultiplied());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_skia::{Color, Pixmap};

    fn frame(w: u32, h: u32) -> Frame {
        let mut p = Pixmap::new(w, h).unwrap();
        p.fill(Color::from_rgba8(1, 2, 3, 255));
        Frame::from(p)
    }

    #[test]
    fn test_mock_sink_records_writes() {
        let mut sink = MockSink::new(8, 4);
        sink.write_frame(0, 0, &frame(8, 4)).unwrap();

        let state = sink.state();
        let state = state.lock().unwrap();
        assert_eq!(state.writes, 1);
        assert_eq!(state.last_size, Some((8, 4)));
        assert_eq!(&state.last_frame.as_ref().unwrap()[0..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn test_mock_sink_rejects_wrong_size() {
        let mut sink = MockSink::new(8, 4);
        assert!(matches!(
            sink.write_frame(0, 0, &frame(4, 4)),
            Err(DisplayError::BufferSizeMismatch { .. })
        ));
        assert_eq!(sink.state().lock().unwrap().writes, 0);
    }

    #[test]
    fn test_mock_sink_failure() {
        let mut sink = MockSink::new(2, 2);
        sink.state().lock().unwrap().simulate_write_failure = true;
        assert!(sink.write_frame(0, 0, &frame(2, 2)).is_err());
    }
}
