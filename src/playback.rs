/*
 *  playback.rs
 *
 *  nowframe - now playing, on the glass
 *	(c) 2020-26 Stuart Hunter
 *
 *	Playback state as pushed by the media service
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
use serde::Deserialize;

use crate::deutils::{deserialize_lenient_string, deserialize_lenient_u64};

// track types the upstream reports for lossless sources
const LOSSLESS_TYPES: [&str; 9] = ["flac", "alac", "wav", "aiff", "aif", "ape", "wv", "dsf", "dff"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlayStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
    Other(String),
}

impl PlayStatus {
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "play" => PlayStatus::Playing,
            "pause" => PlayStatus::Paused,
            "stop" => PlayStatus::Stopped,
            _ => PlayStatus::Other(s.to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        *self == PlayStatus::Playing
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlayStatus::Playing => "play",
            PlayStatus::Paused => "pause",
            PlayStatus::Stopped => "stop",
            PlayStatus::Other(s) => s.as_str(),
        }
    }
}

/// `pushState` payload exactly as it comes off the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawEvent {
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub title: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub artist: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub album: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub albumart: String,
    #[serde(rename = "trackType", deserialize_with = "deserialize_lenient_string")]
    pub track_type: String,
    /// milliseconds
    #[serde(deserialize_with = "deserialize_lenient_u64")]
    pub seek: u64,
    /// seconds
    #[serde(deserialize_with = "deserialize_lenient_u64")]
    pub duration: u64,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub samplerate: String,
    #[serde(deserialize_with = "deserialize_lenient_string")]
    pub bitdepth: String,
}

/// The one current playback state. Replaced wholesale on every accepted
/// event, only `seek_ms` is advanced locally in between.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub status: PlayStatus,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_ref: String,
    pub track_type: String,
    pub seek_ms: u64,
    pub duration_sec: u64,
    pub sample_rate: String,
    pub bit_depth: String,
}

impl From<RawEvent> for PlaybackState {
    fn from(raw: RawEvent) -> Self {
        PlaybackState {
            status: PlayStatus::from_wire(&raw.status),
            title: raw.title,
            artist: raw.artist,
            album: raw.album,
            artwork_ref: raw.albumart,
            track_type: raw.track_type,
            seek_ms: raw.seek,
            duration_sec: raw.duration,
            sample_rate: raw.samplerate,
            bit_depth: raw.bitdepth,
        }
    }
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    pub fn is_lossless(&self) -> bool {
        let t = self.track_type.trim().to_lowercase();
        LOSSLESS_TYPES.contains(&t.as_str())
    }

    /// "sampleRate | bitDepth", skipping whichever half is missing.
    pub fn quality_label(&self) -> String {
        [self.sample_rate.trim(), self.bit_depth.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Whole seconds elapsed; the bar and the readout both use this.
    pub fn elapsed_sec(&self) -> u64 {
        self.seek_ms / 1000
    }

    /// The fields the immediate duplicate check looks at.
    pub fn same_headline(&self, other: &PlaybackState) -> bool {
        self.status == other.status
            && self.title == other.title
            && self.artist == other.artist
            && self.seek_ms == other.seek_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_state_decodes() {
        let json = r#"{
            "status": "play", "title": "One Of These Nights", "artist": "Eagles",
            "album": "One Of These Nights", "albumart": "/albumart?path=x",
            "trackType": "flac", "seek": 65231, "duration": 412,
            "samplerate": "192 kHz", "bitdepth": "24 bit",
            "volume": 40, "random": null, "service": "mpd"
        }"#;
        let raw: RawEvent = serde_json::from_str(json).unwrap();
        let state = PlaybackState::from(raw);
        assert_eq!(state.status, PlayStatus::Playing);
        assert_eq!(state.seek_ms, 65231);
        assert_eq!(state.duration_sec, 412);
        assert_eq!(state.elapsed_sec(), 65);
        assert_eq!(state.artwork_ref, "/albumart?path=x");
        assert!(state.is_lossless());
        assert_eq!(state.quality_label(), "192 kHz | 24 bit");
    }

    #[test]
    fn test_sparse_payload_defaults() {
        let raw: RawEvent = serde_json::from_str(r#"{"status": "stop", "seek": null}"#).unwrap();
        let state = PlaybackState::from(raw);
        assert_eq!(state.status, PlayStatus::Stopped);
        assert_eq!(state.seek_ms, 0);
        assert_eq!(state.title, "");
        assert_eq!(state.quality_label(), "");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PlayStatus::from_wire("pause"), PlayStatus::Paused);
        assert_eq!(PlayStatus::from_wire("PLAY"), PlayStatus::Playing);
        assert_eq!(PlayStatus::from_wire("buffering"), PlayStatus::Other("buffering".into()));
        assert!(!PlayStatus::from_wire("buffering").is_playing());
    }

    #[test]
    fn test_quality_label_partial() {
        let state = PlaybackState { sample_rate: "44.1 kHz".into(), ..Default::default() };
        assert_eq!(state.quality_label(), "44.1 kHz");
    }
}
