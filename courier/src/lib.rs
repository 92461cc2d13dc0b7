//! `Courier` — reliable asynchronous message delivery core.
//!
//! Takes a user-authored message, renders it optimistically into the
//! conversation record store, transmits it with bounded retry, reconciles
//! the local identifier with the server-assigned one, and keeps
//! delivery-failure state durable across restarts.

pub mod config;
pub mod delivery;
pub mod history;
pub mod records;
pub mod registry;
pub mod transport;
