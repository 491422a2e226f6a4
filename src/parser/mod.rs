//! Parsers for MBOX files and MIME messages.

pub mod mbox;
pub mod mime;
