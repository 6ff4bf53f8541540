//! Generation Request Dispatcher.
//!
//! Validates a request, records the polling baseline, sends the mutation and
//! resets the affected selection. Validation failures never reach the
//! backend; a backend failure cancels the session it just started.

use shared_types::{
    CriticId, CriticRequest, DocumentKey, DocumentType, GenerationKind, GenerationRequest,
    JobAck, KeyError, PollState, RegionName, SelectionRange,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::actors::poller::{PollerError, PollingController};
use crate::backend::{BackendError, WriterBackend};
use crate::selection::SelectionContext;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Select some text before requesting notes on a selection")]
    EmptySelection,

    #[error("The selection no longer matches the displayed text")]
    StaleSelection,

    #[error("Provide notes or choose at least one critic")]
    MissingNotes,

    #[error("Provide either notes or critics, not both")]
    ConflictingSources,

    #[error("{0} cannot be empty")]
    EmptyText(&'static str),

    #[error("Invalid document key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("A rewrite needs a Scene key and a Script key of the same scene")]
    RewriteMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Poller error: {0}")]
    Poller(#[from] PollerError),

    /// The Scene half of a rewrite was queued and is polling; only the
    /// Script regeneration failed.
    #[error("Scene rewrite queued but script regeneration failed: {source}")]
    ScriptAfterScene {
        scene: Box<DispatchReceipt>,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Either free-text notes or a set of preset critics, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteSource {
    Notes(String),
    Critics(Vec<CriticId>),
}

impl NoteSource {
    pub fn from_parts(
        notes: Option<String>,
        critic_ids: Vec<CriticId>,
    ) -> Result<Self, ValidationError> {
        let notes = notes.filter(|text| !text.trim().is_empty());
        match (notes, critic_ids.is_empty()) {
            (Some(_), false) => Err(ValidationError::ConflictingSources),
            (Some(text), true) => Ok(Self::Notes(text)),
            (None, false) => Ok(Self::Critics(critic_ids)),
            (None, true) => Err(ValidationError::MissingNotes),
        }
    }

    pub fn notes(text: impl Into<String>) -> Result<Self, ValidationError> {
        Self::from_parts(Some(text.into()), Vec::new())
    }

    pub fn critics(ids: Vec<CriticId>) -> Result<Self, ValidationError> {
        Self::from_parts(None, ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Text { kind: GenerationKind, text: String },
    Critics(Vec<CriticId>),
}

impl From<NoteSource> for Payload {
    fn from(source: NoteSource) -> Self {
        match source {
            NoteSource::Notes(text) => Payload::Text {
                kind: GenerationKind::Notes,
                text,
            },
            NoteSource::Critics(ids) => Payload::Critics(ids),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub request_id: Uuid,
    pub key: DocumentKey,
    pub ack: JobAck,
    /// Polling state recorded before the mutation was sent
    pub polling: PollState,
}

#[derive(Clone)]
pub struct GenerationDispatcher {
    backend: Arc<dyn WriterBackend>,
    poller: PollingController,
}

impl GenerationDispatcher {
    pub fn new(backend: Arc<dyn WriterBackend>, poller: PollingController) -> Self {
        Self { backend, poller }
    }

    /// Notes or critics applied to the whole current document.
    pub async fn dispatch_whole(
        &self,
        key: &DocumentKey,
        source: NoteSource,
        selection: &mut SelectionContext,
    ) -> Result<DispatchReceipt, DispatchError> {
        key.validate().map_err(ValidationError::from)?;
        let receipt = self.send(key, source.into(), None).await?;
        selection.reset(key.region());
        Ok(receipt)
    }

    /// Notes or critics applied to the range currently selected in the
    /// document's region.
    pub async fn dispatch_selected(
        &self,
        key: &DocumentKey,
        source: NoteSource,
        selection: &mut SelectionContext,
    ) -> Result<DispatchReceipt, DispatchError> {
        key.validate().map_err(ValidationError::from)?;
        let range = current_range(selection, key.region())?;
        let receipt = self.send(key, source.into(), Some(&range)).await?;
        selection.reset(range.region);
        Ok(receipt)
    }

    /// First generation from a seed (`versionType=new`).
    pub async fn submit_seed(
        &self,
        key: &DocumentKey,
        seed: &str,
        selection: &mut SelectionContext,
    ) -> Result<DispatchReceipt, DispatchError> {
        self.submit_text(key, GenerationKind::Seed, seed, "Seed", selection)
            .await
    }

    /// User-edited content submitted as a new version (`versionType=edit`).
    pub async fn submit_edit(
        &self,
        key: &DocumentKey,
        content: &str,
        selection: &mut SelectionContext,
    ) -> Result<DispatchReceipt, DispatchError> {
        self.submit_text(key, GenerationKind::Edit, content, "Content", selection)
            .await
    }

    /// Submit a Scene edit and regenerate the Script from it. Both keys get
    /// their own polling session; if the Script request fails the Scene
    /// session keeps running and the error is
    /// [`DispatchError::ScriptAfterScene`] carrying the Scene receipt.
    pub async fn rewrite_scene(
        &self,
        scene_key: &DocumentKey,
        content: &str,
        script_key: &DocumentKey,
        selection: &mut SelectionContext,
    ) -> Result<(DispatchReceipt, DispatchReceipt), DispatchError> {
        if scene_key.document_type != DocumentType::Scene
            || script_key.document_type != DocumentType::Script
            || scene_key.project_id != script_key.project_id
            || scene_key.scene_key != script_key.scene_key
        {
            return Err(ValidationError::RewriteMismatch.into());
        }
        script_key.validate().map_err(ValidationError::from)?;

        let scene = self.submit_edit(scene_key, content, selection).await?;
        match self
            .submit_text(script_key, GenerationKind::Seed, content, "Content", selection)
            .await
        {
            Ok(script) => Ok((scene, script)),
            Err(e) => {
                tracing::warn!(
                    document = %script_key,
                    error = %e,
                    "Script regeneration failed after scene rewrite"
                );
                Err(DispatchError::ScriptAfterScene {
                    scene: Box::new(scene),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn submit_text(
        &self,
        key: &DocumentKey,
        kind: GenerationKind,
        text: &str,
        label: &'static str,
        selection: &mut SelectionContext,
    ) -> Result<DispatchReceipt, DispatchError> {
        key.validate().map_err(ValidationError::from)?;
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyText(label).into());
        }
        let payload = Payload::Text {
            kind,
            text: text.to_string(),
        };
        let receipt = self.send(key, payload, None).await?;
        selection.reset(key.region());
        Ok(receipt)
    }

    async fn send(
        &self,
        key: &DocumentKey,
        payload: Payload,
        range: Option<&SelectionRange>,
    ) -> Result<DispatchReceipt, DispatchError> {
        let request_id = Uuid::new_v4();
        let polling = self.poller.start(key).await?;

        let (start, end) = range.map(|r| (r.start, r.end)).unzip();
        let result = match payload {
            Payload::Text { kind, text } => {
                let request = GenerationRequest {
                    key: key.clone(),
                    kind,
                    text,
                    select_text_start: start,
                    select_text_end: end,
                };
                self.backend.generate(&request).await
            }
            Payload::Critics(critic_ids) => {
                let request = CriticRequest {
                    key: key.clone(),
                    critic_ids,
                    select_text_start: start,
                    select_text_end: end,
                };
                self.backend.generate_with_critics(&request).await
            }
        };

        match result {
            Ok(ack) => {
                tracing::info!(
                    request_id = %request_id,
                    document = %key,
                    task_id = %ack.task_id,
                    select_start = ?start,
                    select_end = ?end,
                    "Generation request accepted"
                );
                Ok(DispatchReceipt {
                    request_id,
                    key: key.clone(),
                    ack,
                    polling,
                })
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    document = %key,
                    error = %e,
                    "Generation request failed; cancelling poll"
                );
                if let Err(cancel_err) = self.poller.cancel(key) {
                    tracing::warn!(document = %key, error = %cancel_err, "Failed to cancel poll");
                }
                Err(e.into())
            }
        }
    }
}

fn current_range(
    selection: &SelectionContext,
    region: RegionName,
) -> Result<SelectionRange, ValidationError> {
    let active = selection
        .active_range()
        .filter(|range| range.region == region)
        .ok_or(ValidationError::EmptySelection)?;
    if !selection.is_current(&active) {
        return Err(ValidationError::StaleSelection);
    }
    Ok(active)
}
