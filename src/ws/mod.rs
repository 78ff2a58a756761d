//! Live notification push over WebSocket

pub mod hub;

pub use hub::{serve_ws, Hub, WsMessage};
