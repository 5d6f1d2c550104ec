/*
 *  display/error.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for display subsystem
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

use std::fmt;
use std::error::Error;

/// Unified error type for all display operations
#[derive(Debug)]
pub enum DisplayError {
    /// Output device could not be opened or probed
    InitializationFailed(String),

    /// Font asset missing or unusable
    FontUnavailable(String),

    /// Pixel format the device reports that we cannot pack
    UnsupportedFormat(u32),

    /// Frame size does not match the device
    BufferSizeMismatch { expected: (u32, u32), actual: (u32, u32) },

    /// Overlay or composite could not be produced
    DrawingError(String),

    /// Writing the frame out failed
    WriteFailed(String),

    /// Device I/O
    Io(std::io::Error),
}

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayError::InitializationFailed(msg) =>
                write!(f, "Display initialization failed: {}", msg),
            DisplayError::FontUnavailable(msg) =>
                write!(f, "Font unavailable: {}", msg),
            DisplayError::UnsupportedFormat(bpp) =>
                write!(f, "Unsupported pixel format: {} bits per pixel", bpp),
            DisplayError::BufferSizeMismatch { expected, actual } =>
                write!(f, "Frame size mismatch: expected {}x{}, got {}x{}",
                    expected.0, expected.1, actual.0, actual.1),
            DisplayError::DrawingError(msg) =>
                write!(f, "Drawing error: {}", msg),
            DisplayError::WriteFailed(msg) =>
                write!(f, "Frame write failed: {}", msg),
            DisplayError::Io(err) =>
                write!(f, "Display I/O error: {}", err),
        }
    }
}

impl Error for DisplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DisplayError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DisplayError {
    fn from(err: std::io::Error) -> Self {
        DisplayError::Io(err)
    }
}

impl From<image::ImageError> for DisplayError {
    fn from(err: image::ImageError) -> Self {
        DisplayError::WriteFailed(err.to_string())
    }
}
