//! Core data model types: messages, MIME parts, addresses, and archive outcomes.

pub mod address;
pub mod message;
pub mod outcome;
pub mod part;
