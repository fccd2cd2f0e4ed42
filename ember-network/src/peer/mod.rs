//! The per-connection state machine: handshake, ping/pong RTT tracking,
//! inventory filtering, block download requests, and address exchange.
//!
//! A connection is split into a cheaply-clonable [`Client`] handle (a
//! `tower::Service<Request>`) and a background [`Connection`] task that owns
//! the socket; [`handshake`] performs the `version`/`verack` exchange and
//! wires the two together.

mod client;
mod connection;
mod handshake;

pub use client::{Client, Request, Response};
pub use connection::{Connection, PeerEvent};
pub use handshake::{handshake, PeerInfo};
