/*
 *  backlight.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	Backlight power with an idle timeout
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
use log::{debug, info, warn};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::playback::PlayStatus;

pub const DEFAULT_TIMEOUT_TICKS: i32 = 60;
pub const COUNTDOWN_DISABLED: i32 = -1;

/// A named control line driving the backlight.
pub trait BacklightLine: Send {
    fn set_high(&mut self);
    fn set_low(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklightPower {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklightState {
    pub power: BacklightPower,
    /// ticks left before power-down, -1 when no countdown is running
    pub countdown: i32,
}

/// ON -> COUNTING(n) -> OFF, with any playing state returning to ON.
/// Without a line the transitions still run, the side effects do not.
pub struct BacklightTimeoutController {
    line: Option<Box<dyn BacklightLine>>,
    state: BacklightState,
    timeout_ticks: i32,
}

impl BacklightTimeoutController {
    pub fn new(mut line: Option<Box<dyn BacklightLine>>, timeout_ticks: i32) -> Self {
        if let Some(l) = line.as_mut() {
            l.set_high();
        }
        Self {
            line,
            state: BacklightState { power: BacklightPower::On, countdown: COUNTDOWN_DISABLED },
            timeout_ticks: timeout_ticks.max(1),
        }
    }

    pub fn has_capability(&self) -> bool {
        self.line.is_some()
    }

    pub fn state(&self) -> BacklightState {
        self.state
    }

    /// Feed the status of every accepted state.
    pub fn on_status(&mut self, status: &PlayStatus) {
        if status.is_playing() {
            if self.state.power == BacklightPower::Off {
                info!("Backlight on");
                if let Some(l) = self.line.as_mut() {
                    l.set_high();
                }
            }
            self.state = BacklightState { power: BacklightPower::On, countdown: COUNTDOWN_DISABLED };
            return;
        }

        // already dark, or already counting: leave the countdown alone
        if self.state.power == BacklightPower::On && self.state.countdown == COUNTDOWN_DISABLED {
            debug!("Backlight countdown started ({} ticks)", self.timeout_ticks);
            self.state.countdown = self.timeout_ticks;
        }
    }

    pub fn tick(&mut self) {
        if self.state.power != BacklightPower::On || self.state.countdown <= COUNTDOWN_DISABLED {
            return;
        }
        self.state.countdown -= 1;
        if self.state.countdown <= 0 {
            info!("Backlight off after idle timeout");
            if let Some(l) = self.line.as_mut() {
                l.set_low();
            }
            self.state = BacklightState { power: BacklightPower::Off, countdown: COUNTDOWN_DISABLED };
        }
    }
}

#[derive(Debug, Error)]
pub enum BacklightError {
    #[cfg(feature = "gpio")]
    #[error("gpio: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("{path}: {source}")]
    Sysfs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("built without gpio support")]
    Unsupported,
}

#[cfg(feature = "gpio")]
mod gpio {
    use super::{BacklightError, BacklightLine};
    use rppal::gpio::{Gpio, OutputPin};

    pub struct GpioBacklight {
        pin: OutputPin,
    }

    impl GpioBacklight {
        pub fn open(bcm: u8) -> Result<Self, BacklightError> {
            let mut pin = Gpio::new()?.get(bcm)?.into_output();
            // leave the panel lit if we exit
            pin.set_reset_on_drop(false);
            Ok(Self { pin })
        }
    }

    impl BacklightLine for GpioBacklight {
        fn set_high(&mut self) {
            self.pin.set_high();
        }

        fn set_low(&mut self) {
            self.pin.set_low();
        }
    }
}

/// Backlight exposed as a sysfs attribute taking "1"/"0", as some panel
/// drivers do instead of a raw GPIO line.
pub struct SysfsBacklight {
    path: PathBuf,
}

impl SysfsBacklight {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BacklightError> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|source| BacklightError::Sysfs { path: path.clone(), source })?;
        Ok(Self { path })
    }

    fn write(&self, value: &str) {
        if let Err(e) = std::fs::write(&self.path, value) {
            warn!("backlight write to {} failed: {}", self.path.display(), e);
        }
    }
}

impl BacklightLine for SysfsBacklight {
    fn set_high(&mut self) {
        self.write("1");
    }

    fn set_low(&mut self) {
        self.write("0");
    }
}

#[cfg(feature = "gpio")]
fn open_gpio(bcm: u8) -> Result<Box<dyn BacklightLine>, BacklightError> {
    Ok(Box::new(gpio::GpioBacklight::open(bcm)?))
}

#[cfg(not(feature = "gpio"))]
fn open_gpio(_bcm: u8) -> Result<Box<dyn BacklightLine>, BacklightError> {
    Err(BacklightError::Unsupported)
}

/// Probe for a usable backlight line, GPIO first then sysfs. Never fails:
/// no line means the controller runs without side effects.
pub fn detect(pin: Option<u8>, sysfs_path: Option<&Path>) -> Option<Box<dyn BacklightLine>> {
    if let Some(bcm) = pin {
        match open_gpio(bcm) {
            Ok(line) => {
                info!("Backlight control on GPIO{}", bcm);
                return Some(line);
            }
            Err(e) => info!("Backlight GPIO{} unavailable ({})", bcm, e),
        }
    }

    if let Some(path) = sysfs_path {
        match SysfsBacklight::open(path) {
            Ok(line) => {
                info!("Backlight control via {}", path.display());
                return Some(Box::new(line));
            }
            Err(e) => info!("Backlight sysfs unavailable ({})", e),
        }
    }

    info!("No backlight line, backlight control disabled");
    None
}
