/*
 *  controller.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Single consumer control loop: accepted states, transport, 1 Hz tick
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

use log::{debug, error, info, warn};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

use crate::backlight::{BacklightState, BacklightTimeoutController};
use crate::clock::{ProgressClock, TICK};
use crate::dedup::{Accepted, StateDeduplicator};
use crate::display::{
    ArtworkError, ArtworkFetcher, BackgroundImageCache, DisplayCompositor, DisplayGeometry, OverlayRenderer,
};
use crate::playback::PlaybackState;
use crate::transport::TransportEvent;

/// Owns the whole presentation aggregate. Only the control loop touches it,
/// so a render always sees one consistent state.
pub struct Controller<F: ArtworkFetcher> {
    state: Option<PlaybackState>,
    geometry: DisplayGeometry,
    clock: ProgressClock,
    backlight: BacklightTimeoutController,
    backgrounds: BackgroundImageCache<F>,
    overlay: OverlayRenderer,
    compositor: DisplayCompositor,
    dedup: StateDeduplicator,
    connected: bool,
}

impl<F: ArtworkFetcher> Controller<F> {
    pub fn new(
        backlight: BacklightTimeoutController,
        backgrounds: BackgroundImageCache<F>,
        overlay: OverlayRenderer,
        compositor: DisplayCompositor,
        dedup: StateDeduplicator,
    ) -> Self {
        let geometry = *overlay.geometry();
        Self {
            state: None,
            geometry,
            clock: ProgressClock::new(),
            backlight,
            backgrounds,
            overlay,
            compositor,
            dedup,
            connected: false,
        }
    }

    pub fn state(&self) -> Option<&PlaybackState> {
        self.state.as_ref()
    }

    pub fn backlight_state(&self) -> BacklightState {
        self.backlight.state()
    }

    pub fn frames_presented(&self) -> u64 {
        self.compositor.frames_presented()
    }

    pub fn background_builds(&self) -> u64 {
        self.backgrounds.build_count()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// A state made it through the deduplicator: replace, re-seed, redraw.
    pub async fn on_accepted(&mut self, accepted: Accepted) {
        if accepted.artwork_changed {
            debug!("artwork now {}", accepted.state.artwork_ref);
        }
        self.clock.sync(&accepted.state);
        self.backlight.on_status(&accepted.state.status);
        self.state = Some(accepted.state);
        self.render().await;
    }

    pub async fn on_tick(&mut self) {
        self.backlight.tick();

        let moved = match self.state.as_mut() {
            Some(state) => self.clock.tick(state),
            None => false,
        };
        if moved || self.background_missing() {
            self.render().await;
        }
    }

    pub fn on_transport(&mut self, event: TransportEvent, accepted_tx: &mpsc::UnboundedSender<Accepted>) {
        match event {
            TransportEvent::Connected => {
                info!("Media service connected");
                self.connected = true;
            }
            TransportEvent::Disconnected => {
                warn!("Media service disconnected, holding position");
                self.connected = false;
                self.clock.suspend();
            }
            TransportEvent::State(raw) => {
                let dedup = self.dedup.clone();
                let tx = accepted_tx.clone();
                let stamp = dedup.stamp();
                tokio::spawn(async move {
                    dedup.process_logged(stamp, raw, Some(&tx)).await;
                });
            }
        }
    }

    // last artwork build failed, the tick retries once backoff allows
    fn background_missing(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| self.backgrounds.current_for(&s.artwork_ref).is_none())
    }

    /// Background (cached), overlay, composite, write. Returns true when a
    /// frame reached the sink; otherwise the previous frame stays up.
    pub async fn render(&mut self) -> bool {
        let Some(state) = self.state.as_ref() else {
            return false;
        };

        let background = match self.backgrounds.ensure(&state.artwork_ref, &self.geometry).await {
            Ok(bg) => bg,
            Err(ArtworkError::Backoff(wait)) => {
                debug!("artwork {} backing off {:?}", state.artwork_ref, wait);
                return false;
            }
            Err(e) => {
                warn!("No background for {}: {}", state.artwork_ref, e);
                return false;
            }
        };

        let layer = match self.overlay.render(state, &background.palette) {
            Ok(layer) => layer,
            Err(e) => {
                error!("Overlay failed: {}", e);
                return false;
            }
        };

        match self.compositor.present(&background, &layer) {
            Ok(()) => true,
            Err(e) => {
                warn!("Frame dropped: {}", e);
                false
            }
        }
    }

    /// The control loop. Runs until `shutdown` resolves or the transport
    /// goes away.
    pub async fn run<S>(&mut self, mut events: mpsc::Receiver<TransportEvent>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel::<Accepted>();
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down control loop");
                    break;
                }
                Some(accepted) = accepted_rx.recv() => {
                    self.on_accepted(accepted).await;
                }
                event = events.recv() => match event {
                    Some(event) => self.on_transport(event, &accepted_tx),
                    None => {
                        error!("Transport task ended");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
            }
        }
    }
}
