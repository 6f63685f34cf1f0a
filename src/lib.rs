#![deny(missing_debug_implementations)]
//! # meshcall
//! meshcall is the peer connection core of a full mesh video call client. Every participant of a room
//! keeps one WebRTC connection to every other participant; this crate turns the relay's join, leave and
//! signal notifications into those connections.
//!
//! A call is driven by [`call::Call`]: acquire local media, connect to the relay through a
//! [`signaling::SignalingChannel`], then run the event loop while a UI watches the [`call::CallHandle`].
//! `src/bin/mesh-relay.rs` is a relay server and `src/bin/mesh-client.rs` a headless client.

/// The event loop of one client in one room.
pub mod call;
/// Chat history and unread counter.
pub mod chat;
/// Configuration for [`rtc::RtcConnection`] and placeholder media.
pub mod config;
/// Media transport abstraction the state machine drives.
pub mod connection;
mod driver;
pub mod error;
/// Local capture tracks and the devices they come from.
pub mod media;
pub mod media_engine;
/// Per participant negotiation state machine.
pub mod peer;
/// Black video and silent audio for missing devices.
pub mod placeholder;
/// JSON messages exchanged with the relay.
pub mod protocol;
/// The mesh coordinator.
pub mod registry;
/// In-process signaling relay.
pub mod relay;
/// [`connection::MediaConnection`] on top of [`webrtc::peer_connection::RTCPeerConnection`].
pub mod rtc;
pub mod signaling;
pub mod track;
/// WebSocket [`signaling::SignalingChannel`].
pub mod websocket;

#[cfg(test)]
mod testing;
