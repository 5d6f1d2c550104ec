/*
 *  clock.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	Local progress interpolation between server pushes
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use std::time::Duration;

use crate::playback::PlaybackState;

pub const TICK: Duration = Duration::from_millis(1000);

/// Advances `seek_ms` by one tick while playing. The server value always
/// wins: every accepted state re-seeds the clock.
#[derive(Debug, Default)]
pub struct ProgressClock {
    ticking: bool,
}

impl ProgressClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    /// Called with every newly accepted state.
    pub fn sync(&mut self, state: &PlaybackState) {
        self.ticking = state.is_playing();
    }

    /// Transport went away; hold position until the next accepted state.
    pub fn suspend(&mut self) {
        self.ticking = false;
    }

    /// Returns true when the position moved and the overlay needs redrawing.
    pub fn tick(&mut self, state: &mut PlaybackState) -> bool {
        if !self.ticking {
            return false;
        }
        state.seek_ms = state.seek_ms.saturating_add(TICK.as_millis() as u64);
        true
    }
}
