//! Per-message and per-run results of the archive pipeline.

use serde::Serialize;

/// Which artifact of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Source,
    Html,
    Pdf,
}

impl ArtifactKind {
    /// File extension used for this artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Source => "eml",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }

    /// Content type the artifact is stored with.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Source => "message/rfc822",
            Self::Html => "text/html",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Result of one persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Written under the given name.
    Stored { name: String },
    /// A file for the same message already existed and was reused.
    AlreadyPresent { name: String },
    /// The attempt failed; the error is kept for the outcome log.
    Failed { error: String },
    /// Turned off by configuration.
    Disabled,
}

impl ArtifactStatus {
    /// `true` when the artifact exists in the container after the attempt.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Stored { .. } | Self::AlreadyPresent { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Stored name of a present artifact.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Stored { name } | Self::AlreadyPresent { name } => Some(name),
            Self::Failed { .. } | Self::Disabled => None,
        }
    }
}

/// What happened to one archived message.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub message_id: String,
    /// Shared filename stem of the three artifacts.
    pub stem: String,
    pub source: ArtifactStatus,
    pub html: ArtifactStatus,
    pub pdf: ArtifactStatus,
    /// Stored names of extracted attachments and inline images, in discovery order.
    pub attachments: Vec<String>,
    /// Parts that could not be extracted or stored.
    pub failed_parts: usize,
    /// Last error seen while processing this message.
    pub last_error: Option<String>,
}

impl ArchiveOutcome {
    /// A fresh outcome; every artifact starts as disabled until attempted.
    pub fn new(message_id: impl Into<String>, stem: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            stem: stem.into(),
            source: ArtifactStatus::Disabled,
            html: ArtifactStatus::Disabled,
            pdf: ArtifactStatus::Disabled,
            attachments: Vec::new(),
            failed_parts: 0,
            last_error: None,
        }
    }

    /// Record the status of one artifact, remembering its error if it failed.
    pub fn record(&mut self, kind: ArtifactKind, status: ArtifactStatus) {
        if let ArtifactStatus::Failed { error } = &status {
            self.last_error = Some(error.clone());
        }
        match kind {
            ArtifactKind::Source => self.source = status,
            ArtifactKind::Html => self.html = status,
            ArtifactKind::Pdf => self.pdf = status,
        }
    }

    pub fn status(&self, kind: ArtifactKind) -> &ArtifactStatus {
        match kind {
            ArtifactKind::Source => &self.source,
            ArtifactKind::Html => &self.html,
            ArtifactKind::Pdf => &self.pdf,
        }
    }

    /// `true` when no artifact and no part failed.
    pub fn is_complete(&self) -> bool {
        self.failed_parts == 0
            && !self.source.is_failed()
            && !self.html.is_failed()
            && !self.pdf.is_failed()
    }
}

/// Why a message from a matching thread was not archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Sent by someone other than the target sender.
    SenderMismatch,
    /// Dated outside the requested window.
    OutsideWindow,
}

/// A message that was intentionally not archived.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedMessage {
    pub message_id: String,
    pub from: String,
    pub reason: SkipReason,
}

/// Everything one archive run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Search expression handed to the mailbox.
    pub query: String,
    /// Identifier of the destination container.
    pub container: String,
    pub threads: usize,
    /// The thread cap cut the search result short.
    pub truncated: bool,
    pub outcomes: Vec<ArchiveOutcome>,
    pub skipped: Vec<SkippedMessage>,
}

impl RunReport {
    /// Number of messages that ended with at least one failed artifact or part.
    pub fn incomplete(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_complete()).count()
    }
}
