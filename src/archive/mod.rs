//! The archive pipeline.
//!
//! For each message of each matching thread:
//!
//! 1. skip it unless it was sent by the target address (and, with
//!    `strict_window`, dated inside the window),
//! 2. [`walker::walk`] the part tree and acquire attachment bytes,
//! 3. [`resolver::resolve`] the parts into the container and build the
//!    content-ID map,
//! 4. [`snapshot::render`] the HTML snapshot,
//! 5. [`persist::persist`] the source, HTML, and PDF artifacts.
//!
//! Preconditions are checked before any collaborator is called. After that,
//! failures are contained to the part, artifact, or message they belong to.

pub mod persist;
pub mod resolver;
pub mod sanitize;
pub mod snapshot;
pub mod walker;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{info, warn};

use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::mailbox::Mailbox;
use crate::model::message::MessageRecord;
use crate::model::outcome::{RunReport, SkipReason, SkippedMessage};
use crate::model::part::strip_angle_brackets;
use crate::pdf::PdfConverter;
use crate::query::{plan_range, plan_year, SearchSpec};
use crate::store::{ContainerId, DocumentStore};

use persist::PersistOptions;
use resolver::ResolveOptions;
use snapshot::{RenderOptions, DATE_FORMAT};

/// Characters of the message identifier used in short ids.
const SHORT_ID_LEN: usize = 8;

/// Date window of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateWindow {
    /// `[start, end)`, both `YYYY-MM-DD`.
    Range { start: String, end: String },
    /// One calendar year.
    Year(i64),
}

/// What to archive and where.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub sender: Option<String>,
    pub window: DateWindow,
    pub subject_keyword: Option<String>,
    /// Existing container to write into. When absent, the container named
    /// after the sender is created or reused.
    pub container_id: Option<String>,
}

impl ArchiveRequest {
    /// Validate the request into a search.
    pub fn plan(&self) -> Result<SearchSpec> {
        let sender = self.sender.as_deref();
        let subject = self.subject_keyword.as_deref();
        match &self.window {
            DateWindow::Range { start, end } => plan_range(start, end, sender, subject),
            DateWindow::Year(year) => plan_year(*year, sender, subject),
        }
    }
}

/// Per-message facts shared by naming, descriptions, and rendering.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub message: &'a MessageRecord,
    /// Offset the message's calendar day is taken in.
    pub offset: FixedOffset,
}

impl<'a> MessageContext<'a> {
    pub fn new(message: &'a MessageRecord, offset: FixedOffset) -> Self {
        Self { message, offset }
    }

    /// `YYYY-MM-DD` of the message in the configured offset.
    pub fn day(&self) -> String {
        self.message
            .date
            .with_timezone(&self.offset)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Short, filename-safe identifier derived from the Message-ID.
    pub fn short_id(&self) -> String {
        let id = strip_angle_brackets(&self.message.id);
        let local = id.split('@').next().unwrap_or(id);
        let pick = |s: &str| -> String {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(SHORT_ID_LEN)
                .collect()
        };
        let short = pick(local);
        if !short.is_empty() {
            return short;
        }
        let short = pick(id);
        if short.is_empty() {
            "msg".to_string()
        } else {
            short
        }
    }

    /// Description line identifying the message; used to recognise earlier runs.
    pub fn marker(&self) -> String {
        format!("Message-ID: <{}>", strip_angle_brackets(&self.message.id))
    }

    /// Description attached to every file stored for this message.
    pub fn description(&self) -> String {
        format!(
            "Archived email\nDate: {}\nFrom: {}\nSubject: {}\n{}",
            self.message
                .date
                .with_timezone(&self.offset)
                .format(DATE_FORMAT),
            self.message.from.display(),
            self.message.subject,
            self.marker()
        )
    }
}

/// Runs archive requests against a mailbox and a document store.
pub struct Archiver<'a> {
    mailbox: &'a mut dyn Mailbox,
    store: &'a mut dyn DocumentStore,
    pdf: Option<&'a dyn PdfConverter>,
    config: &'a ArchiveConfig,
    archived_at: Option<DateTime<Utc>>,
    progress: Option<&'a dyn Fn(usize, usize)>,
}

impl<'a> Archiver<'a> {
    pub fn new(
        mailbox: &'a mut dyn Mailbox,
        store: &'a mut dyn DocumentStore,
        config: &'a ArchiveConfig,
    ) -> Self {
        Self {
            mailbox,
            store,
            pdf: None,
            config,
            archived_at: None,
            progress: None,
        }
    }

    /// Produce a PDF artifact with `converter`. Without one the PDF is recorded as disabled.
    pub fn with_pdf(mut self, converter: &'a dyn PdfConverter) -> Self {
        self.pdf = Some(converter);
        self
    }

    /// Fix the timestamp shown in snapshot footers (defaults to the run's start time).
    pub fn with_archived_at(mut self, archived_at: DateTime<Utc>) -> Self {
        self.archived_at = Some(archived_at);
        self
    }

    /// Report `(messages_done, messages_total)` after each message.
    pub fn with_progress(mut self, progress: &'a dyn Fn(usize, usize)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Archive everything `request` selects.
    ///
    /// Returns `Err` only for invalid requests and for failures before any
    /// message is processed (container or search). Everything later ends
    /// up in the report.
    pub fn run(&mut self, request: &ArchiveRequest) -> Result<RunReport> {
        let spec = request.plan()?;
        let offset = self.config.offset();

        let container = match request.container_id.as_deref() {
            Some(id) => self.store.open_container(id)?,
            None => self
                .store
                .get_or_create_container(&spec.container_name(&self.config.container_suffix))?,
        };

        let query = spec.expression();
        info!(query = %query, container = %container.name, "Starting archive run");

        let result = self.mailbox.search(&spec, self.config.max_threads)?;
        if result.truncated {
            warn!(
                limit = self.config.max_threads,
                "Thread limit reached, remaining threads were not processed"
            );
        }

        let mut report = RunReport {
            query,
            container: container.id.clone(),
            threads: result.threads.len(),
            truncated: result.truncated,
            ..RunReport::default()
        };

        let render = RenderOptions {
            archived_at: self.archived_at.unwrap_or_else(Utc::now),
            offset,
            include_recipients: self.config.include_recipients,
        };
        let total: usize = result.threads.iter().map(|t| t.messages.len()).sum();
        let mut done = 0;

        for thread in &result.threads {
            for message in &thread.messages {
                self.archive_message(message, &spec, &container, &render, &mut report);
                done += 1;
                if let Some(cb) = self.progress {
                    cb(done, total);
                }
            }
        }

        info!(
            archived = report.outcomes.len(),
            skipped = report.skipped.len(),
            incomplete = report.incomplete(),
            "Archive run finished"
        );
        Ok(report)
    }

    fn archive_message(
        &mut self,
        message: &MessageRecord,
        spec: &SearchSpec,
        container: &ContainerId,
        render: &RenderOptions,
        report: &mut RunReport,
    ) {
        let skip = if !walker::sender_matches(message, &spec.sender) {
            Some(SkipReason::SenderMismatch)
        } else if self.config.strict_window && !spec.contains(message.date, render.offset) {
            Some(SkipReason::OutsideWindow)
        } else {
            None
        };
        if let Some(reason) = skip {
            info!(
                message_id = %message.id,
                from = %message.from.address,
                reason = ?reason,
                "Skipping message"
            );
            report.skipped.push(SkippedMessage {
                message_id: message.id.clone(),
                from: message.from.address.clone(),
                reason,
            });
            return;
        }

        let ctx = MessageContext::new(message, render.offset);
        let parts = walker::walk(message, &mut *self.mailbox);
        let resolution = resolver::resolve(
            parts,
            &ctx,
            &mut *self.store,
            container,
            ResolveOptions::from(self.config),
        );
        let html = snapshot::render(message, &resolution.attachments, &resolution.cid_map, render);

        let mut outcome = persist::persist(
            &ctx,
            &html,
            &mut *self.store,
            container,
            self.pdf,
            PersistOptions::from(self.config),
        );
        outcome.attachments = resolution
            .attachments
            .iter()
            .map(|a| a.stored_name.clone())
            .collect();
        outcome.failed_parts = resolution.failed;
        if outcome.last_error.is_none() {
            outcome.last_error = resolution.last_error;
        }

        info!(
            stem = %outcome.stem,
            attachments = outcome.attachments.len(),
            complete = outcome.is_complete(),
            "Archived message"
        );
        report.outcomes.push(outcome);
    }
}
