//! Entity module - SeaORM entity definitions
//!
//! One module per table of the portal

pub mod activity;
pub mod favorite;
pub mod file;
pub mod folder;
pub mod folder_permission;
pub mod notification;
pub mod user;
