/*
 *  transport.rs
 *
 *  nowframe - now playing, on the glass
 *  (c) 2020-26 Stuart Hunter
 *
 *  Push client for the media service: socket.io over engine.io v3 polling
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

use chrono::Utc;
use log::{debug, info, warn};
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::playback::RawEvent;

pub const PUSH_STATE_EVENT: &str = "pushState";
pub const GET_STATE_EVENT: &str = "getState";

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("server closed the session")]
    Closed,
    #[error("event channel closed")]
    ChannelClosed,
}

/// What the controller hears from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    State(RawEvent),
    Disconnected,
}

/// engine.io v3 packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(String),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn parse(packet: &str) -> Result<Self, TransportError> {
        let mut chars = packet.chars();
        let kind = chars
            .next()
            .ok_or_else(|| TransportError::Payload("empty packet".to_string()))?;
        let data = chars.as_str().to_string();
        match kind {
            '0' => Ok(EnginePacket::Open(data)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data)),
            '3' => Ok(EnginePacket::Pong(data)),
            '4' => Ok(EnginePacket::Message(data)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            // base64 binary attachments, nothing we subscribe to carries them
            'b' => Ok(EnginePacket::Noop),
            other => Err(TransportError::Payload(format!("unknown packet type '{}'", other))),
        }
    }
}

/// Split a polling payload `<len>:<packet><len>:<packet>...`. Lengths count
/// UTF-16 code units, as the server is JavaScript.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, TransportError> {
    let mut packets = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let colon = rest
            .find(':')
            .ok_or_else(|| TransportError::Payload(format!("missing length in {:?}", rest)))?;
        let len: usize = rest[..colon]
            .parse()
            .map_err(|_| TransportError::Payload(format!("bad length {:?}", &rest[..colon])))?;
        let after = &rest[colon + 1..];

        let mut units = 0usize;
        let mut end = after.len();
        for (i, c) in after.char_indices() {
            if units >= len {
                end = i;
                break;
            }
            units += c.len_utf16();
        }
        if units != len {
            return Err(TransportError::Payload(format!("truncated packet, wanted {} units", len)));
        }

        packets.push(EnginePacket::parse(&after[..end])?);
        rest = &after[end..];
    }

    Ok(packets)
}

pub fn encode_payload(packets: &[String]) -> String {
    packets
        .iter()
        .map(|p| format!("{}:{}", p.encode_utf16().count(), p))
        .collect()
}

/// socket.io packet carried inside an engine.io message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(String),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Other(char),
}

impl SocketPacket {
    pub fn parse(message: &str) -> Result<Self, TransportError> {
        let mut chars = message.chars();
        let kind = chars
            .next()
            .ok_or_else(|| TransportError::Payload("empty message".to_string()))?;
        let mut body = chars.as_str();

        // optional "/nsp," prefix
        let mut namespace = "/";
        if body.starts_with('/') {
            match body.find(',') {
                Some(i) => {
                    namespace = &body[..i];
                    body = &body[i + 1..];
                }
                None => {
                    namespace = body;
                    body = "";
                }
            }
        }

        match kind {
            '0' => Ok(SocketPacket::Connect(namespace.to_string())),
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                // optional ack id before the array
                let json = body.trim_start_matches(|c: char| c.is_ascii_digit());
                let mut items: Vec<Value> = serde_json::from_str(json)
                    .map_err(|e| TransportError::Payload(format!("event body: {}", e)))?;
                if items.is_empty() {
                    return Err(TransportError::Payload("event without a name".to_string()));
                }
                let name = match items.remove(0) {
                    Value::String(s) => s,
                    other => return Err(TransportError::Payload(format!("event name {}", other))),
                };
                Ok(SocketPacket::Event { name, args: items })
            }
            other => Ok(SocketPacket::Other(other)),
        }
    }
}

/// `42["name",arg]`, a socket.io event wrapped as an engine.io message
pub fn encode_event(name: &str, arg: Value) -> String {
    format!("42{}", json!([name, arg]))
}

/// First argument of a pushState event as a raw state.
pub fn decode_push_state(args: &[Value]) -> Result<RawEvent, TransportError> {
    let first = args
        .first()
        .ok_or_else(|| TransportError::Payload("pushState without payload".to_string()))?;
    serde_json::from_value(first.clone()).map_err(|e| TransportError::Payload(format!("pushState: {}", e)))
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Handshake {
    pub sid: String,
    #[serde(rename = "pingInterval", default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(rename = "pingTimeout", default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    5_000
}

/// 1s doubling to 30s, back to 1s after a good connection.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    next: Duration,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, next: base }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(RECONNECT_BASE, RECONNECT_MAX)
    }
}

/// HTTP long-polling socket.io client for the media service.
#[derive(Debug, Clone)]
pub struct PushClient {
    client: Client,
    base_url: String,
}

impl PushClient {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Accept", header::HeaderValue::from_static("*/*"));

        let client = Client::builder()
            .http1_only()
            .connect_timeout(Duration::from_secs(3))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    fn url(&self, sid: Option<&str>) -> String {
        let mut url = format!(
            "{}/socket.io/?EIO=3&transport=polling&b64=1&t={}",
            self.base_url,
            Utc::now().timestamp_millis()
        );
        if let Some(sid) = sid {
            url.push_str("&sid=");
            url.push_str(sid);
        }
        url
    }

    async fn handshake(&self) -> Result<(Handshake, Vec<EnginePacket>), TransportError> {
        let body = self
            .client
            .get(self.url(None))
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut packets = decode_payload(&body)?;
        if packets.is_empty() {
            return Err(TransportError::Handshake("empty open payload".to_string()));
        }
        let handshake = match packets.remove(0) {
            EnginePacket::Open(json) => serde_json::from_str::<Handshake>(&json)
                .map_err(|e| TransportError::Handshake(e.to_string()))?,
            other => return Err(TransportError::Handshake(format!("expected open, got {:?}", other))),
        };
        Ok((handshake, packets))
    }

    async fn poll(&self, sid: &str, timeout: Duration) -> Result<Vec<EnginePacket>, TransportError> {
        let body = self
            .client
            .get(self.url(Some(sid)))
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        decode_payload(&body)
    }

    async fn send(&self, sid: &str, packets: &[String]) -> Result<(), TransportError> {
        self.client
            .post(self.url(Some(sid)))
            .header("Content-Type", "text/plain;charset=UTF-8")
            .timeout(Duration::from_secs(10))
            .body(encode_payload(packets))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn handle(
        &self,
        sid: &str,
        packet: EnginePacket,
        tx: &mpsc::Sender<TransportEvent>,
        connected: &mut bool,
    ) -> Result<(), TransportError> {
        match packet {
            EnginePacket::Close => return Err(TransportError::Closed),
            EnginePacket::Ping(data) => self.send(sid, &[format!("3{}", data)]).await?,
            EnginePacket::Pong(_) => debug!("pong"),
            EnginePacket::Message(msg) => match SocketPacket::parse(&msg) {
                Ok(SocketPacket::Connect(ns)) => {
                    info!("Connected to {} namespace {}", self.base_url, ns);
                    *connected = true;
                    tx.send(TransportEvent::Connected)
                        .await
                        .map_err(|_| TransportError::ChannelClosed)?;
                    self.send(sid, &[encode_event(GET_STATE_EVENT, json!(""))]).await?;
                }
                Ok(SocketPacket::Disconnect) => return Err(TransportError::Closed),
                Ok(SocketPacket::Event { name, args }) if name == PUSH_STATE_EVENT => {
                    match decode_push_state(&args) {
                        Ok(raw) => tx
                            .send(TransportEvent::State(raw))
                            .await
                            .map_err(|_| TransportError::ChannelClosed)?,
                        Err(e) => warn!("Ignoring {}", e),
                    }
                }
                Ok(SocketPacket::Event { name, .. }) => debug!("ignoring event {}", name),
                Ok(SocketPacket::Other(kind)) => debug!("ignoring socket packet type {}", kind),
                Err(e) => warn!("Ignoring message: {}", e),
            },
            EnginePacket::Open(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        Ok(())
    }

    /// One engine.io session, from handshake until it fails or closes.
    async fn session(&self, tx: &mpsc::Sender<TransportEvent>, connected: &mut bool) -> Result<(), TransportError> {
        let (hs, early) = self.handshake().await?;
        debug!(
            "session {} ping {}ms timeout {}ms",
            hs.sid, hs.ping_interval, hs.ping_timeout
        );

        for packet in early {
            self.handle(&hs.sid, packet, tx, connected).await?;
        }

        let ping_every = Duration::from_millis(hs.ping_interval.max(1_000));
        let poll_timeout = Duration::from_millis(hs.ping_interval + hs.ping_timeout);
        let mut ping = interval_at(Instant::now() + ping_every, ping_every);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut poll = Box::pin(self.poll(&hs.sid, poll_timeout));
        loop {
            tokio::select! {
                _ = ping.tick() => {
                    self.send(&hs.sid, &["2".to_string()]).await?;
                }
                polled = &mut poll => {
                    for packet in polled? {
                        self.handle(&hs.sid, packet, tx, connected).await?;
                    }
                    poll = Box::pin(self.poll(&hs.sid, poll_timeout));
                }
            }
        }
    }

    /// Keep a session alive forever, reconnecting with backoff. Returns once
    /// the receiving side is gone.
    pub async fn run(self, tx: mpsc::Sender<TransportEvent>) {
        let mut backoff = ReconnectBackoff::default();

        loop {
            let mut connected = false;
            let result = self.session(&tx, &mut connected).await;

            if tx.is_closed() {
                debug!("transport receiver gone, stopping");
                return;
            }
            if let Err(e) = result {
                warn!("Push transport to {}: {}", self.base_url, e);
            }
            if connected {
                if tx.send(TransportEvent::Disconnected).await.is_err() {
                    return;
                }
                backoff.reset();
            }

            let delay = backoff.next_delay();
            info!("Reconnecting in {:?}", delay);
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlayStatus;
    use crate::playback::PlaybackState;

    #[test]
    fn test_decode_open_and_connect() {
        let body = r#"79:0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}2:40"#;
        let packets = decode_payload(body).unwrap();
        assert_eq!(packets.len(), 2);
        let EnginePacket::Open(json) = &packets[0] else {
            panic!("expected open, got {:?}", packets[0]);
        };
        let hs: Handshake = serde_json::from_str(json).unwrap();
        assert_eq!(hs, Handshake { sid: "abc".into(), ping_interval: 25000, ping_timeout: 5000 });
        assert_eq!(packets[1], EnginePacket::Message("0".into()));
    }

    #[test]
    fn test_decode_counts_utf16_units() {
        // the emoji is two UTF-16 units
        let msg = "42[\"pushState\",{\"title\":\"\u{1F3B5}\"}]";
        let body = format!("{}:{}1:6", msg.encode_utf16().count(), msg);
        let packets = decode_payload(&body).unwrap();
        assert_eq!(packets, vec![EnginePacket::Message(msg[1..].to_string()), EnginePacket::Noop]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_payload("5:4abc").is_err());
        assert!(decode_payload("x:4").is_err());
        assert!(decode_payload("40").is_err());
        assert_eq!(decode_payload("").unwrap(), vec![]);
    }

    #[test]
    fn test_encode_payload() {
        assert_eq!(encode_payload(&["2".to_string()]), "1:2");
        let ev = encode_event(GET_STATE_EVENT, json!(""));
        assert_eq!(ev, r#"42["getState",""]"#);
        assert_eq!(encode_payload(&[ev.clone(), "2".into()]), format!("{}:{}1:2", ev.len(), ev));
    }

    #[test]
    fn test_socket_packets() {
        assert_eq!(SocketPacket::parse("0").unwrap(), SocketPacket::Connect("/".into()));
        assert_eq!(SocketPacket::parse("0/volumio,").unwrap(), SocketPacket::Connect("/volumio".into()));
        assert_eq!(SocketPacket::parse("1").unwrap(), SocketPacket::Disconnect);

        let ev = SocketPacket::parse(r#"2/volumio,17["pushState",{"status":"play"}]"#).unwrap();
        assert_eq!(
            ev,
            SocketPacket::Event { name: "pushState".into(), args: vec![json!({"status": "play"})] }
        );
        assert!(SocketPacket::parse("2[]").is_err());
        assert!(SocketPacket::parse("2{nope").is_err());
    }

    #[test]
    fn test_push_state_to_raw_event() {
        let SocketPacket::Event { args, .. } = SocketPacket::parse(
            r#"2["pushState",{"status":"play","title":"T","seek":"12000","duration":245,"albumart":"/albumart?x","samplerate":"44.1 kHz","bitdepth":"16 bit","trackType":"flac"}]"#,
        )
        .unwrap() else {
            panic!("expected event");
        };
        let state = PlaybackState::from(decode_push_state(&args).unwrap());
        assert_eq!(state.status, PlayStatus::Playing);
        assert_eq!(state.seek_ms, 12_000);
        assert_eq!(state.duration_sec, 245);
        assert_eq!(state.artwork_ref, "/albumart?x");
        assert!(state.is_lossless());

        assert!(decode_push_state(&[]).is_err());
    }

    #[test]
    fn test_reconnect_backoff() {
        let mut b = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..7).map(|_| b.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_url_carries_session() {
        let c = PushClient::new("volumio.local", 3000).unwrap();
        let url = c.url(Some("abc"));
        assert!(url.starts_with("http://volumio.local:3000/socket.io/?EIO=3&transport=polling&b64=1&t="));
        assert!(url.ends_with("&sid=abc"));
        assert!(!c.url(None).contains("sid="));
    }
}
