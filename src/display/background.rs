/*
 *  display/background.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Album art background: fetch, cover-fit, palette, gradient tint, cache
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

use image::imageops::FilterType;
use image::RgbaImage;
use log::{debug, info, warn};
use reqwest::{header, Client};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiny_skia::{ColorU8, Pixmap, PixmapPaint, Transform};
use tokio::time::Instant;

use crate::display::color::{Palette, PaletteExtractor, Rgb};
use crate::display::layout::DisplayGeometry;

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("artwork request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("artwork server answered HTTP {0}")]
    Status(u16),
    #[error("artwork file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("artwork decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("pixmap error: {0}")]
    Pixmap(String),
    #[error("background build aborted: {0}")]
    Join(String),
    #[error("last attempt failed, next retry in {0:?}")]
    Backoff(Duration),
}

/// Where artwork bytes come from. Kept behind a trait so the cache can be
/// exercised without a server.
pub trait ArtworkFetcher: Send + Sync {
    fn fetch(&self, artwork_ref: &str) -> impl Future<Output = Result<Vec<u8>, ArtworkError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkSource {
    Url(String),
    File(PathBuf),
}

/// Fetches artwork from the media service, absolute URLs, or local files.
#[derive(Debug, Clone)]
pub struct HttpArtworkFetcher {
    client: Client,
    base_url: String,
}

impl HttpArtworkFetcher {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, ArtworkError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("image/*"));

        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(2)))
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    pub fn resolve(&self, artwork_ref: &str) -> ArtworkSource {
        resolve_source(&self.base_url, artwork_ref)
    }
}

fn resolve_source(base_url: &str, artwork_ref: &str) -> ArtworkSource {
    let r = artwork_ref.trim();
    if r.starts_with("http://") || r.starts_with("https://") {
        return ArtworkSource::Url(r.to_string());
    }
    if let Some(path) = r.strip_prefix("file://") {
        return ArtworkSource::File(PathBuf::from(path));
    }
    let local = PathBuf::from(r);
    if local.is_absolute() && local.is_file() {
        return ArtworkSource::File(local);
    }
    if r.starts_with('/') {
        ArtworkSource::Url(format!("{}{}", base_url, r))
    } else {
        ArtworkSource::Url(format!("{}/{}", base_url, r))
    }
}

impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, artwork_ref: &str) -> Result<Vec<u8>, ArtworkError> {
        match self.resolve(artwork_ref) {
            ArtworkSource::File(path) => {
                debug!("Reading artwork from {}", path.display());
                Ok(tokio::fs::read(path).await?)
            }
            ArtworkSource::Url(url) => {
                debug!("Fetching artwork {}", url);
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(ArtworkError::Status(response.status().as_u16()));
                }
                Ok(response.bytes().await?.to_vec())
            }
        }
    }
}

/// A finished background: cover-fit photo with the tint already applied.
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    pub artwork_ref: String,
    pub palette: Palette,
    pixmap: Pixmap,
}

impl BackgroundImage {
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

/// Alpha of the tint at (x, y): two linear ramps, 127.5 at the top/left
/// edge falling to 0 at the bottom/right, summed. 255 top-left, 0 bottom-right.
pub fn gradient_alpha(x: u32, y: u32, width: u32, height: u32) -> u8 {
    let ramp = |v: u32, len: u32| {
        if len > 1 {
            127.5 * (1.0 - v as f32 / (len - 1) as f32)
        } else {
            127.5
        }
    };
    (ramp(x, width) + ramp(y, height)).round().clamp(0.0, 255.0) as u8
}

fn pixmap_from_rgba(img: &RgbaImage) -> Result<Pixmap, ArtworkError> {
    let mut pixmap = Pixmap::new(img.width(), img.height())
        .ok_or_else(|| ArtworkError::Pixmap(format!("cannot allocate {}x{}", img.width(), img.height())))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        *dst = ColorU8::from_rgba(src.0[0], src.0[1], src.0[2], src.0[3]).premultiply();
    }
    Ok(pixmap)
}

fn gradient_tint(width: u32, height: u32, base: Rgb) -> Result<Pixmap, ArtworkError> {
    let mut tint = Pixmap::new(width, height)
        .ok_or_else(|| ArtworkError::Pixmap(format!("cannot allocate {}x{}", width, height)))?;
    let w = width as usize;
    for (i, px) in tint.pixels_mut().iter_mut().enumerate() {
        let x = (i % w) as u32;
        let y = (i / w) as u32;
        let a = gradient_alpha(x, y, width, height);
        *px = ColorU8::from_rgba(base.r, base.g, base.b, a).premultiply();
    }
    Ok(tint)
}

/// Decode, cover-fit to the display, pull the palette and tint. `plain`
/// keeps the photo untouched (the "nothing queued" placeholder).
pub fn compose_background(
    bytes: &[u8],
    artwork_ref: &str,
    geometry: &DisplayGeometry,
    extractor: &PaletteExtractor,
    plain: bool,
) -> Result<BackgroundImage, ArtworkError> {
    let decoded = image::load_from_memory(bytes)?;
    let fitted = decoded
        .resize_to_fill(geometry.width, geometry.height, FilterType::Lanczos3)
        .to_rgba8();

    let palette = extractor.extract(&fitted);
    let mut pixmap = pixmap_from_rgba(&fitted)?;

    if !plain {
        let tint = gradient_tint(geometry.width, geometry.height, palette.base)?;
        pixmap.draw_pixmap(0, 0, tint.as_ref(), &PixmapPaint::default(), Transform::identity(), None);
    }

    Ok(BackgroundImage {
        artwork_ref: artwork_ref.to_string(),
        palette,
        pixmap,
    })
}

#[derive(Debug, Clone)]
struct FailedBuild {
    artwork_ref: String,
    attempts: u32,
    retry_at: Instant,
}

/// Holds the one valid background, keyed by artwork reference. Rebuilds
/// only when asked for a different reference; failed references back off
/// exponentially before being fetched again.
pub struct BackgroundImageCache<F: ArtworkFetcher> {
    fetcher: F,
    extractor: PaletteExtractor,
    placeholder_ref: String,
    current: Option<Arc<BackgroundImage>>,
    failure: Option<FailedBuild>,
    retry_base: Duration,
    retry_max: Duration,
    builds: u64,
}

impl<F: ArtworkFetcher> BackgroundImageCache<F> {
    pub fn new(fetcher: F, placeholder_ref: &str, retry_base: Duration, retry_max: Duration) -> Self {
        Self {
            fetcher,
            extractor: PaletteExtractor::default(),
            placeholder_ref: placeholder_ref.to_string(),
            current: None,
            failure: None,
            retry_base,
            retry_max: retry_max.max(retry_base),
            builds: 0,
        }
    }

    pub fn current(&self) -> Option<Arc<BackgroundImage>> {
        self.current.clone()
    }

    /// The cached background, but only if it was built for `artwork_ref`.
    pub fn current_for(&self, artwork_ref: &str) -> Option<Arc<BackgroundImage>> {
        self.current
            .as_ref()
            .filter(|bg| bg.artwork_ref == artwork_ref)
            .cloned()
    }

    pub fn build_count(&self) -> u64 {
        self.builds
    }

    /// Hands back the background for `artwork_ref`, building it if the cache
    /// holds a different one. On failure the previous background is kept.
    pub async fn ensure(
        &mut self,
        artwork_ref: &str,
        geometry: &DisplayGeometry,
    ) -> Result<Arc<BackgroundImage>, ArtworkError> {
        if let Some(bg) = self.current_for(artwork_ref) {
            return Ok(bg);
        }

        if let Some(failed) = self.failure.as_ref().filter(|f| f.artwork_ref == artwork_ref) {
            let now = Instant::now();
            if now < failed.retry_at {
                return Err(ArtworkError::Backoff(failed.retry_at - now));
            }
        }

        match self.build(artwork_ref, geometry).await {
            Ok(bg) => {
                info!("Background rebuilt for {} (base {})", artwork_ref, bg.palette.base.hex());
                let bg = Arc::new(bg);
                self.current = Some(Arc::clone(&bg));
                self.failure = None;
                self.builds += 1;
                Ok(bg)
            }
            Err(e) => {
                let attempts = match self.failure.as_ref() {
                    Some(f) if f.artwork_ref == artwork_ref => f.attempts + 1,
                    _ => 1,
                };
                let delay = self.backoff_for(attempts);
                warn!("Artwork {} unavailable ({}), retry in {:?}", artwork_ref, e, delay);
                self.failure = Some(FailedBuild {
                    artwork_ref: artwork_ref.to_string(),
                    attempts,
                    retry_at: Instant::now() + delay,
                });
                Err(e)
            }
        }
    }

    fn backoff_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1).min(16));
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }

    async fn build(&self, artwork_ref: &str, geometry: &DisplayGeometry) -> Result<BackgroundImage, ArtworkError> {
        let bytes = self.fetcher.fetch(artwork_ref).await?;
        let plain = artwork_ref == self.placeholder_ref;
        let extractor = self.extractor;
        let geometry = *geometry;
        let key = artwork_ref.to_string();

        tokio::task::spawn_blocking(move || compose_background(&bytes, &key, &geometry, &extractor, plain))
            .await
            .map_err(|e| ArtworkError::Join(e.to_string()))?
    }
}
