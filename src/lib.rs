#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::missing_safety_doc
)]

mod config;
mod error;
pub mod frames;
pub mod handshake;
mod hijack;
mod http;
pub mod protocol;
pub mod role;
mod server;
mod ws;

pub use config::Config;
pub use error::{CloseReason, Error, FrameError, Result, UpgradeError, Violation};
pub use frames::CloseFrame;
pub use handshake::{HandshakeResult, UpgradeRequest, accept_key, negotiate};
pub use hijack::{Connection, Hijack, Refused};
pub use http::HttpExchange;
pub use protocol::Message;
pub use server::{MessageHandler, WebSocketServer, accept};
pub use ws::{Event, WebSocket};
