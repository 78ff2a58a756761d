//! Docportal - an internal document sharing portal
//!
//! Folders carry per-user permission grants, file bodies live in a local
//! blob store, deletions go to a trash before purge, and actions land in an
//! activity ledger that feeds notifications over WebSocket.

pub mod config;
pub mod credential;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod mail;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod service;
pub mod state;
pub mod storage;
pub mod tree;
pub mod ws;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
