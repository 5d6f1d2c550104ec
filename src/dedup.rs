/*
 *  dedup.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	Filters the noisy push stream down to accepted state changes
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
use log::{debug, info};
use rand::Rng;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokMutex};

use crate::playback::{PlaybackState, RawEvent};

/// A state that made it through every rejection rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub state: PlaybackState,
    /// artwork differs from the previously accepted state
    pub artwork_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// lossless track type with no bit depth, an upstream artifact
    MalformedLossless,
    /// playing at seek 0 without having been there already
    SpuriousInitialPlay,
    /// same status/title/artist/seek as the accepted state
    Duplicate,
    /// identical to a state committed while we were waiting
    RaceDuplicate,
    /// a later push was committed while we were waiting
    Superseded,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MalformedLossless => write!(f, "lossless track without bit depth"),
            Rejection::SpuriousInitialPlay => write!(f, "spurious play at seek 0"),
            Rejection::Duplicate => write!(f, "duplicate of accepted state"),
            Rejection::RaceDuplicate => write!(f, "duplicate committed during debounce"),
            Rejection::Superseded => write!(f, "newer state committed during debounce"),
        }
    }
}

/// Rules 1-3, no waiting involved.
pub fn screen(candidate: &PlaybackState, prev: Option<&PlaybackState>) -> Result<(), Rejection> {
    if candidate.is_lossless() && candidate.bit_depth.trim().is_empty() {
        return Err(Rejection::MalformedLossless);
    }

    let prev_at_zero = prev.is_some_and(|p| p.is_playing() && p.seek_ms == 0);
    if candidate.is_playing() && candidate.seek_ms == 0 && !prev_at_zero {
        return Err(Rejection::SpuriousInitialPlay);
    }

    if prev.is_some_and(|p| p.same_headline(candidate)) {
        return Err(Rejection::Duplicate);
    }
    Ok(())
}

/// Debounced state filter. Clones share the accepted state, so events
/// processed concurrently race against each other the way the pushes do.
///
/// The random wait only narrows the window for near-simultaneous duplicate
/// pushes. Ordering comes from the arrival stamp: a push never overwrites
/// one that arrived after it.
#[derive(Debug, Clone)]
pub struct StateDeduplicator {
    accepted: Arc<TokMutex<Committed>>,
    arrivals: Arc<AtomicU64>,
    max_jitter_ms: u64,
}

#[derive(Debug, Default)]
struct Committed {
    state: Option<PlaybackState>,
    /// arrival stamp of `state`, 0 before anything is accepted
    stamp: u64,
}

impl StateDeduplicator {
    pub fn new(max_jitter_ms: u64) -> Self {
        Self {
            accepted: Arc::new(TokMutex::new(Committed::default())),
            arrivals: Arc::new(AtomicU64::new(0)),
            max_jitter_ms,
        }
    }

    pub async fn current(&self) -> Option<PlaybackState> {
        self.accepted.lock().await.state.clone()
    }

    /// Arrival stamp for the next push. Take it where pushes are still in
    /// wire order, before handing the event to a task.
    pub fn stamp(&self) -> u64 {
        self.arrivals.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn jitter(&self) -> Duration {
        if self.max_jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.max_jitter_ms))
    }

    /// Runs a raw event through the rules, stamping it on arrival.
    pub async fn process_into(
        &self,
        raw: RawEvent,
        sink: Option<&mpsc::UnboundedSender<Accepted>>,
    ) -> Result<Accepted, Rejection> {
        let stamp = self.stamp();
        self.process_stamped(stamp, raw, sink).await
    }

    /// Accepted states are committed and, when `sink` is given, forwarded
    /// while the commit lock is still held so the consumer sees them in
    /// commit order.
    pub async fn process_stamped(
        &self,
        stamp: u64,
        raw: RawEvent,
        sink: Option<&mpsc::UnboundedSender<Accepted>>,
    ) -> Result<Accepted, Rejection> {
        let candidate = PlaybackState::from(raw);

        {
            let accepted = self.accepted.lock().await;
            screen(&candidate, accepted.state.as_ref())?;
        }

        let wait = self.jitter();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        let mut accepted = self.accepted.lock().await;
        if accepted.state.as_ref() == Some(&candidate) {
            return Err(Rejection::RaceDuplicate);
        }
        if stamp < accepted.stamp {
            return Err(Rejection::Superseded);
        }

        let artwork_changed = accepted
            .state
            .as_ref()
            .is_none_or(|p| p.artwork_ref != candidate.artwork_ref);
        accepted.state = Some(candidate.clone());
        accepted.stamp = stamp;

        let result = Accepted { state: candidate, artwork_changed };
        if let Some(tx) = sink {
            let _ = tx.send(result.clone());
        }
        Ok(result)
    }

    /// Accept-or-ignore entry point; rejections are logged and swallowed.
    pub async fn process(&self, raw: RawEvent) -> Option<Accepted> {
        let stamp = self.stamp();
        self.process_logged(stamp, raw, None).await
    }

    pub async fn process_logged(
        &self,
        stamp: u64,
        raw: RawEvent,
        sink: Option<&mpsc::UnboundedSender<Accepted>>,
    ) -> Option<Accepted> {
        let label = format!("{} '{}' @{}ms", raw.status, raw.title, raw.seek);
        match self.process_stamped(stamp, raw, sink).await {
            Ok(accepted) => {
                info!(
                    "Accepted state: {} '{}' by '{}'",
                    accepted.state.status.as_str(),
                    accepted.state.title,
                    accepted.state.artist
                );
                Some(accepted)
            }
            Err(reason) => {
                debug!("Ignored {}: {}", label, reason);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: &str, title: &str, seek: u64) -> RawEvent {
        RawEvent {
            status: status.into(),
            title: title.into(),
            artist: "Eagles".into(),
            albumart: "/art/1.jpg".into(),
            seek,
            duration: 240,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_repeated_play_at_zero_rejected() {
        let dedup = StateDeduplicator::new(0);
        assert!(dedup.process(raw("play", "A", 0)).await.is_none());
        let second = dedup.process_into(raw("play", "A", 0), None).await;
        assert!(second.is_err());
        assert!(dedup.current().await.is_none());
    }

    #[tokio::test]
    async fn test_lossless_without_bitdepth_rejected() {
        let dedup = StateDeduplicator::new(0);
        let mut ev = raw("pause", "A", 1200);
        ev.track_type = "flac".into();
        ev.bitdepth = "".into();
        assert_eq!(
            dedup.process_into(ev.clone(), None).await,
            Err(Rejection::MalformedLossless)
        );

        ev.bitdepth = "24 bit".into();
        assert!(dedup.process(ev).await.is_some());
    }

    #[tokio::test]
    async fn test_lossless_rejected_regardless_of_other_fields() {
        let dedup = StateDeduplicator::new(0);
        for status in ["play", "pause", "stop"] {
            let mut ev = raw(status, "Whatever", 5000);
            ev.track_type = "FLAC".into();
            assert_eq!(
                dedup.process_into(ev, None).await,
                Err(Rejection::MalformedLossless)
            );
        }
    }

    #[tokio::test]
    async fn test_headline_duplicate_rejected() {
        let dedup = StateDeduplicator::new(0);
        assert!(dedup.process(raw("play", "A", 1000)).await.is_some());

        // album differs but the headline fields do not
        let mut ev = raw("play", "A", 1000);
        ev.album = "Other".into();
        assert_eq!(dedup.process_into(ev, None).await, Err(Rejection::Duplicate));

        assert!(dedup.process(raw("play", "A", 2000)).await.is_some());
    }

    #[tokio::test]
    async fn test_never_accepts_consecutive_headline_duplicates() {
        let dedup = StateDeduplicator::new(0);
        let events = [
            raw("play", "A", 1000),
            raw("play", "A", 1000),
            raw("pause", "A", 1000),
            raw("pause", "A", 1000),
            raw("play", "B", 3000),
            raw("play", "B", 3000),
            raw("stop", "B", 3000),
        ];
        let mut accepted: Vec<PlaybackState> = Vec::new();
        for ev in events {
            if let Some(a) = dedup.process(ev).await {
                accepted.push(a.state);
            }
        }
        assert_eq!(accepted.len(), 4);
        for pair in accepted.windows(2) {
            assert!(!pair[0].same_headline(&pair[1]));
        }
    }

    #[tokio::test]
    async fn test_artwork_change_flag() {
        let dedup = StateDeduplicator::new(0);
        let first = dedup.process(raw("play", "A", 1000)).await.unwrap();
        assert!(first.artwork_changed);

        let same = dedup.process(raw("play", "A", 2000)).await.unwrap();
        assert!(!same.artwork_changed);

        let mut ev = raw("play", "B", 1000);
        ev.albumart = "/art/2.jpg".into();
        assert!(dedup.process(ev).await.unwrap().artwork_changed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_duplicates_collapse() {
        let dedup = StateDeduplicator::new(50);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let d = dedup.clone();
            let tx = tx.clone();
            let stamp = d.stamp();
            handles.push(tokio::spawn(async move {
                d.process_logged(stamp, raw("play", "A", 4000), Some(&tx)).await
            }));
        }
        let mut committed = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                committed += 1;
            }
        }
        drop(tx);

        assert_eq!(committed, 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_push_never_overwrites_newer() {
        let mut stale = 0;
        for _ in 0..100 {
            let dedup = StateDeduplicator::new(50);
            let (tx, mut rx) = mpsc::unbounded_channel();

            let mut handles = Vec::new();
            for ev in [raw("play", "A", 5000), raw("pause", "A", 6000)] {
                let d = dedup.clone();
                let tx = tx.clone();
                let stamp = d.stamp();
                handles.push(tokio::spawn(async move {
                    d.process_logged(stamp, ev, Some(&tx)).await
                }));
            }
            for h in handles {
                h.await.unwrap();
            }
            drop(tx);

            let current = dedup.current().await.unwrap();
            if current.status != crate::playback::PlayStatus::Paused {
                stale += 1;
            }
            // whatever reached the consumer ends on the pause
            let mut last = None;
            while let Some(a) = rx.recv().await {
                last = Some(a.state.status);
            }
            assert_eq!(last, Some(crate::playback::PlayStatus::Paused));
        }
        assert_eq!(stale, 0);
    }

    #[tokio::test]
    async fn test_late_stamp_rejected_as_superseded() {
        let dedup = StateDeduplicator::new(0);
        let early = dedup.stamp();
        let late = dedup.stamp();
        assert!(dedup.process_stamped(late, raw("pause", "A", 6000), None).await.is_ok());
        assert_eq!(
            dedup.process_stamped(early, raw("play", "A", 5000), None).await,
            Err(Rejection::Superseded)
        );
        assert_eq!(dedup.current().await.unwrap().seek_ms, 6000);
    }

    #[test]
    fn test_play_at_zero_allowed_once_already_there() {
        let prev = PlaybackState {
            status: crate::playback::PlayStatus::Playing,
            title: "A".into(),
            seek_ms: 0,
            ..Default::default()
        };
        let next = PlaybackState { title: "B".into(), ..prev.clone() };
        assert_eq!(screen(&next, Some(&prev)), Ok(()));
        assert_eq!(screen(&next, None), Err(Rejection::SpuriousInitialPlay));
    }
}
