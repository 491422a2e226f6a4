//! Artifact persister: writes the source, HTML, and PDF artifacts of a message.

use tracing::{debug, warn};

use super::sanitize::sanitize;
use super::MessageContext;
use crate::config::{ArchiveConfig, ExistingPolicy};
use crate::error::Result;
use crate::model::outcome::{ArchiveOutcome, ArtifactKind, ArtifactStatus};
use crate::pdf::PdfConverter;
use crate::store::{ContainerId, DocumentStore, StoredFile};

/// How artifacts are named and re-stored.
#[derive(Debug, Clone, Copy)]
pub struct PersistOptions {
    pub stem_includes_id: bool,
    pub on_existing: ExistingPolicy,
}

impl From<&ArchiveConfig> for PersistOptions {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            stem_includes_id: config.stem_includes_id,
            on_existing: config.on_existing,
        }
    }
}

/// Whether [`place_file`] wrote a new file or found one from an earlier run.
#[derive(Debug)]
pub(crate) enum Placement {
    Created(StoredFile),
    Existing(StoredFile),
}

/// Shared filename stem of a message's artifacts.
///
/// `"<date> - <subject>"`, plus `" - <short id>"` when `include_id` is set.
pub fn stem(ctx: &MessageContext<'_>, include_id: bool) -> String {
    let mut stem = format!("{} - {}", ctx.day(), sanitize(&ctx.message.subject));
    if include_id {
        stem.push_str(" - ");
        stem.push_str(&ctx.short_id());
    }
    stem
}

/// Write the three artifacts of one message.
///
/// Each artifact is attempted independently: a failure is logged with the
/// stem and recorded in the outcome, and the next artifact is still tried.
/// Passing no converter records the PDF as disabled.
pub fn persist(
    ctx: &MessageContext<'_>,
    html: &str,
    store: &mut dyn DocumentStore,
    container: &ContainerId,
    pdf: Option<&dyn PdfConverter>,
    options: PersistOptions,
) -> ArchiveOutcome {
    let stem = stem(ctx, options.stem_includes_id);
    let mut outcome = ArchiveOutcome::new(ctx.message.id.clone(), stem.clone());

    let source = place_file(
        store,
        container,
        ctx,
        &artifact_name(&stem, ArtifactKind::Source),
        ArtifactKind::Source.content_type(),
        &ctx.message.raw,
        options.on_existing,
    );
    outcome.record(ArtifactKind::Source, status(&stem, ArtifactKind::Source, source));

    let rendered = place_file(
        store,
        container,
        ctx,
        &artifact_name(&stem, ArtifactKind::Html),
        ArtifactKind::Html.content_type(),
        html.as_bytes(),
        options.on_existing,
    );
    outcome.record(ArtifactKind::Html, status(&stem, ArtifactKind::Html, rendered));

    if let Some(converter) = pdf {
        let placed = place_pdf(store, container, ctx, &stem, html, converter, options);
        outcome.record(ArtifactKind::Pdf, status(&stem, ArtifactKind::Pdf, placed));
    }

    outcome
}

fn place_pdf(
    store: &mut dyn DocumentStore,
    container: &ContainerId,
    ctx: &MessageContext<'_>,
    stem: &str,
    html: &str,
    converter: &dyn PdfConverter,
    options: PersistOptions,
) -> Result<Placement> {
    let name = artifact_name(stem, ArtifactKind::Pdf);
    // Skip the conversion when a previous run already stored this PDF
    if options.on_existing == ExistingPolicy::Skip {
        if let Some(existing) = find_existing(store, container, ctx, &name)? {
            return Ok(Placement::Existing(existing));
        }
    }
    let bytes = converter.convert(html)?;
    place_file(
        store,
        container,
        ctx,
        &name,
        ArtifactKind::Pdf.content_type(),
        &bytes,
        ExistingPolicy::KeepBoth,
    )
}

/// Store `data` under `name`, describing it with the message context.
///
/// With [`ExistingPolicy::Skip`], a file of the same name whose description
/// carries this message's `Message-ID` is reused instead.
pub(crate) fn place_file(
    store: &mut dyn DocumentStore,
    container: &ContainerId,
    ctx: &MessageContext<'_>,
    name: &str,
    content_type: &str,
    data: &[u8],
    policy: ExistingPolicy,
) -> Result<Placement> {
    if policy == ExistingPolicy::Skip {
        if let Some(existing) = find_existing(store, container, ctx, name)? {
            debug!(name, "Already archived, reusing");
            return Ok(Placement::Existing(existing));
        }
    }

    let file = store.create_file(container, name, content_type, data)?;
    if let Err(e) = store.set_description(container, &file, &ctx.description()) {
        warn!(name = %file.name, error = %e, "Failed to set file description");
    }
    Ok(Placement::Created(file))
}

fn find_existing(
    store: &dyn DocumentStore,
    container: &ContainerId,
    ctx: &MessageContext<'_>,
    name: &str,
) -> Result<Option<StoredFile>> {
    let marker = ctx.marker();
    Ok(store.find_files(container, name)?.into_iter().find(|file| {
        file.description
            .as_deref()
            .is_some_and(|d| d.lines().any(|line| line.trim() == marker))
    }))
}

fn artifact_name(stem: &str, kind: ArtifactKind) -> String {
    format!("{stem}.{}", kind.extension())
}

fn status(stem: &str, kind: ArtifactKind, placed: Result<Placement>) -> ArtifactStatus {
    match placed {
        Ok(Placement::Created(file)) => ArtifactStatus::Stored { name: file.name },
        Ok(Placement::Existing(file)) => ArtifactStatus::AlreadyPresent { name: file.name },
        Err(e) => {
            warn!(stem, artifact = ?kind, error = %e, "Failed to store artifact");
            ArtifactStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}
