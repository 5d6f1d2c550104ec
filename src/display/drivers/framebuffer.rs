/*
 *  display/drivers/framebuffer.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Linux fbdev sink, memory mapped
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

use log::info;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::display::compositor::Frame;
use crate::display::error::DisplayError;
use crate::display::traits::FrameSink;

const SYSFS_GRAPHICS: &str = "/sys/class/graphics";

/// Pixel layouts we know how to pack into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32 bpp, little endian B G R X
    Bgra8888,
    /// 24 bpp, B G R
    Bgr888,
    /// 16 bpp, little endian 5-6-5
    Rgb565,
}

impl PixelFormat {
    pub fn from_bpp(bpp: u32) -> Result<Self, DisplayError> {
        match bpp {
            32 => Ok(PixelFormat::Bgra8888),
            24 => Ok(PixelFormat::Bgr888),
            16 => Ok(PixelFormat::Rgb565),
            other => Err(DisplayError::UnsupportedFormat(other)),
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgra8888 => 4,
            PixelFormat::Bgr888 => 3,
            PixelFormat::Rgb565 => 2,
        }
    }
}

/// Pack one opaque pixel into `out`, which is exactly one pixel long.
pub fn pack_pixel(format: PixelFormat, r: u8, g: u8, b: u8, out: &mut [u8]) {
    match format {
        PixelFormat::Bgra8888 => out.copy_from_slice(&[b, g, r, 0xff]),
        PixelFormat::Bgr888 => out.copy_from_slice(&[b, g, r]),
        PixelFormat::Rgb565 => {
            let mut v: u16 = (r as u16 & 0b1111_1000) << 8;
            v |= (g as u16 & 0b1111_1100) << 3;
            v |= (b as u16) >> 3;
            out.copy_from_slice(&v.to_le_bytes());
        }
    }
}

/// "480,320" from virtual_size
pub fn parse_virtual_size(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

/// "U:480x320p-0" from modes, first line only
pub fn parse_mode(s: &str) -> Option<(u32, u32)> {
    let line = s.lines().next()?;
    let res = line.split_once(':').map(|(_, r)| r).unwrap_or(line);
    let (w, rest) = res.split_once('x')?;
    let h: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some((w.trim().parse().ok()?, h.parse().ok()?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FbGeometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: usize,
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name)).ok()
}

/// Geometry for /dev/fbN from its sysfs node.
pub fn probe_geometry(sysfs_dir: &Path) -> Result<FbGeometry, DisplayError> {
    let (width, height) = read_attr(sysfs_dir, "virtual_size")
        .and_then(|s| parse_virtual_size(&s))
        .or_else(|| read_attr(sysfs_dir, "modes").and_then(|s| parse_mode(&s)))
        .ok_or_else(|| {
            DisplayError::InitializationFailed(format!("no resolution under {}", sysfs_dir.display()))
        })?;

    let bpp = read_attr(sysfs_dir, "bits_per_pixel")
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(32);
    let format = PixelFormat::from_bpp(bpp)?;

    let stride = read_attr(sysfs_dir, "stride")
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(width as usize * format.bytes_per_pixel());

    Ok(FbGeometry { width, height, format, stride })
}

pub struct FramebufferSink {
    device: PathBuf,
    name: String,
    geometry: FbGeometry,
    map: MmapMut,
}

impl FramebufferSink {
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self, DisplayError> {
        let device = device.as_ref().to_path_buf();
        let node = device
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| DisplayError::InitializationFailed(format!("bad device {}", device.display())))?;

        let geometry = probe_geometry(&Path::new(SYSFS_GRAPHICS).join(&node))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&device)
            .map_err(|e| DisplayError::InitializationFailed(format!("{}: {}", device.display(), e)))?;

        let len = geometry.stride * geometry.height as usize;
        // the mapping lives as long as the sink and nothing else maps the device
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        info!(
            "Framebuffer {} {}x{} {:?} stride {}",
            device.display(),
            geometry.width,
            geometry.height,
            geometry.format,
            geometry.stride
        );

        Ok(Self { device, name: node, geometry, map })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

/// Blit `frame` into `buf` laid out as `geometry`, clipped to the screen.
pub fn blit(geometry: &FbGeometry, buf: &mut [u8], x: i32, y: i32, frame: &Frame) {
    let bpp = geometry.format.bytes_per_pixel();
    let fw = frame.width() as i32;
    let pixels = frame.pixels();

    for row in 0..frame.height() as i32 {
        let dy = y + row;
        if dy < 0 || dy >= geometry.height as i32 {
            continue;
        }
        for col in 0..fw {
            let dx = x + col;
            if dx < 0 || dx >= geometry.width as i32 {
                continue;
            }
            let c = pixels[(row * fw + col) as usize].demultiply();
            let off = dy as usize * geometry.stride + dx as usize * bpp;
            if let Some(out) = buf.get_mut(off..off + bpp) {
                pack_pixel(geometry.format, c.red(), c.green(), c.blue(), out);
            }
        }
    }
}

impl FrameSink for FramebufferSink {
    fn dimensions(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    fn write_frame(&mut self, x: i32, y: i32, frame: &Frame) -> Result<(), DisplayError> {
        blit(&self.geometry, &mut self.map[..], x, y, frame);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
