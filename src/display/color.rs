/*
 *  display/color.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Artwork palette: dominant color, lighter accent and text color
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

use image::RgbaImage;

/// Lightness at and above which text switches to black
pub const DARK_TEXT_THRESHOLD: u8 = 127;

/// Per-channel lift applied to get the lighter accent
pub const LIGHTEN_AMOUNT: u8 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Perceptual luma (Rec. 601 weights), 0-255
    pub fn lightness(&self) -> u8 {
        let y = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        y.round().clamp(0.0, 255.0) as u8
    }

    /// Blend toward white by `amount` per channel, clamped
    pub fn lighten(&self, amount: u8) -> Rgb {
        Rgb {
            r: self.r.saturating_add(amount),
            g: self.g.saturating_add(amount),
            b: self.b.saturating_add(amount),
        }
    }

    /// `#rrggbb` for the overlay markup
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Text is black on light backgrounds and white on dark ones.
pub fn text_color_for(lightness: u8) -> Rgb {
    if lightness >= DARK_TEXT_THRESHOLD {
        Rgb::BLACK
    } else {
        Rgb::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub base: Rgb,
    pub lighter: Rgb,
    pub text: Rgb,
    pub lightness: u8,
}

impl Palette {
    pub fn from_base(base: Rgb) -> Self {
        let lightness = base.lightness();
        Self {
            base,
            lighter: base.lighten(LIGHTEN_AMOUNT),
            text: text_color_for(lightness),
            lightness,
        }
    }
}

#[derive(Clone, Copy)]
struct Cluster {
    centroid: [f32; 3],
    count: usize,
}

/// Dominant color by k-means over sampled pixels. The biggest cluster wins,
/// which keeps a large flat region from dragging the answer toward a mean
/// color that is not actually in the picture.
#[derive(Debug, Clone, Copy)]
pub struct PaletteExtractor {
    pub max_samples: usize,
    pub k: usize,
    pub max_iter: usize,
}

impl Default for PaletteExtractor {
    fn default() -> Self {
        Self { max_samples: 6_000, k: 4, max_iter: 12 }
    }
}

impl PaletteExtractor {
    pub fn extract(&self, image: &RgbaImage) -> Palette {
        Palette::from_base(self.dominant_color(image))
    }

    pub fn dominant_color(&self, image: &RgbaImage) -> Rgb {
        let samples = self.sample_pixels(image);
        let clusters = kmeans_clusters(&samples, self.k, self.max_iter);
        clusters
            .iter()
            .max_by_key(|c| c.count)
            .map(|c| color_from_centroid(c.centroid))
            .unwrap_or(Rgb::BLACK)
    }

    fn sample_pixels(&self, image: &RgbaImage) -> Vec<[f32; 3]> {
        let total = (image.width() * image.height()) as usize;
        if total == 0 || self.max_samples == 0 {
            return Vec::new();
        }

        let step = total.div_ceil(self.max_samples).max(1);
        image
            .pixels()
            .step_by(step)
            .filter(|p| p.0[3] >= 16)
            .take(self.max_samples)
            .map(|p| [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32])
            .collect()
    }
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

fn kmeans_clusters(samples: &[[f32; 3]], k: usize, max_iter: usize) -> Vec<Cluster> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }

    // spread the seeds over the sample order
    let mut centroids: Vec<[f32; 3]> = (0..k)
        .map(|i| samples[((i * samples.len()) / k).min(samples.len() - 1)])
        .collect();
    let mut assignments = vec![0usize; samples.len()];

    for iter in 0..max_iter {
        let mut sums = vec![[0f32; 3]; k];
        let mut counts = vec![0usize; k];

        for (sample_idx, sample) in samples.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for (centroid_idx, centroid) in centroids.iter().enumerate() {
                let dist = squared_distance(sample, centroid);
                if dist < best_dist {
                    best_dist = dist;
                    best = centroid_idx;
                }
            }
            assignments[sample_idx] = best;
            for channel in 0..3 {
                sums[best][channel] += sample[channel];
            }
            counts[best] += 1;
        }

        let mut changed = false;
        for i in 0..k {
            if counts[i] == 0 {
                centroids[i] = samples[(i + iter) % samples.len()];
                changed = true;
                continue;
            }
            let n = counts[i] as f32;
            let next = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            if squared_distance(&centroids[i], &next) > 1e-2 {
                changed = true;
            }
            centroids[i] = next;
        }

        if !changed {
            break;
        }
    }

    let mut counts = vec![0usize; k];
    for &a in &assignments {
        counts[a] += 1;
    }

    centroids
        .into_iter()
        .zip(counts)
        .map(|(centroid, count)| Cluster { centroid, count })
        .collect()
}

fn color_from_centroid(centroid: [f32; 3]) -> Rgb {
    Rgb::new(
        centroid[0].clamp(0.0, 255.0).round() as u8,
        centroid[1].clamp(0.0, 255.0).round() as u8,
        centroid[2].clamp(0.0, 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_text_color_boundary() {
        assert_eq!(text_color_for(126), Rgb::WHITE);
        assert_eq!(text_color_for(127), Rgb::BLACK);
    }

    #[test]
    fn test_text_color_all_lightness() {
        for l in 0..=255u8 {
            let expected = if l >= 127 { Rgb::BLACK } else { Rgb::WHITE };
            assert_eq!(text_color_for(l), expected, "lightness {}", l);
        }
    }

    #[test]
    fn test_lightness() {
        assert_eq!(Rgb::BLACK.lightness(), 0);
        assert_eq!(Rgb::WHITE.lightness(), 255);
        assert_eq!(Rgb::new(127, 127, 127).lightness(), 127);
        // pure green reads much lighter than pure blue
        assert!(Rgb::new(0, 255, 0).lightness() > Rgb::new(0, 0, 255).lightness());
    }

    #[test]
    fn test_lighten_clamps() {
        assert_eq!(Rgb::new(10, 220, 255).lighten(40), Rgb::new(50, 255, 255));
    }

    #[test]
    fn test_palette_from_base() {
        let dark = Palette::from_base(Rgb::new(20, 30, 90));
        assert_eq!(dark.text, Rgb::WHITE);
        assert_eq!(dark.lighter, Rgb::new(60, 70, 130));

        let light = Palette::from_base(Rgb::new(240, 230, 200));
        assert_eq!(light.text, Rgb::BLACK);
    }

    #[test]
    fn test_dominant_is_largest_region_not_mean() {
        // 70% red, 30% blue: a mean would be purple
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([200, 20, 20, 255]));
        for y in 70..100 {
            for x in 0..100 {
                img.put_pixel(x, y, Rgba([10, 10, 220, 255]));
            }
        }
        let c = PaletteExtractor::default().dominant_color(&img);
        assert!(c.r > 180 && c.g < 40 && c.b < 40, "{:?}", c);
    }

    #[test]
    fn test_uniform_image() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([90, 140, 60, 255]));
        let p = PaletteExtractor::default().extract(&img);
        assert_eq!(p.base, Rgb::new(90, 140, 60));
        assert_eq!(p.lightness, Rgb::new(90, 140, 60).lightness());
    }

    #[test]
    fn test_transparent_image_falls_back_to_black() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 0]));
        assert_eq!(PaletteExtractor::default().dominant_color(&img), Rgb::BLACK);
    }
}
