//! `mailsnap`: archive a sender's email threads as durable document snapshots.
//!
//! For every message a given sender wrote inside a date window, the crate
//! stores the raw source, a self-contained HTML rendering, a PDF rendering,
//! and every attachment and inline image in a destination container.
//!
//! The pipeline lives in [`archive`]; it talks to its collaborators through
//! the [`mailbox::Mailbox`], [`store::DocumentStore`], and
//! [`pdf::PdfConverter`] traits.

pub mod archive;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod pdf;
pub mod query;
pub mod store;
