//! `Courier` — message and record types for the delivery core.

pub mod message;
pub mod record;
