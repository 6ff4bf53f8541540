//! Shared types between the sync engine and the writing UI
//!
//! These types are used by both:
//! - the native sync engine (version store, poller, dispatcher)
//! - the web UI that renders documents and note dialogs
//!
//! Serializable with serde for JSON over GraphQL/HTTP, exported to
//! TypeScript with ts-rs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, TS)]
        #[ts(export, export_to = "screenplay.ts")]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of one version, unique within its chain
    VersionId
);
string_id!(ProjectId);
string_id!(
    /// Stable key of a scene inside a project
    SceneKey
);
string_id!(
    /// Backend-stored note-generation preset
    CriticId
);

// ============================================================================
// Versions
// ============================================================================

/// Provenance of a version snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export, export_to = "screenplay.ts")]
pub enum VersionType {
    New,
    Edit,
    Note,
    MagicNote,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Edit => "edit",
            Self::Note => "note",
            Self::MagicNote => "magic-note",
        }
    }
}

/// One immutable snapshot of a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct DocumentVersion {
    pub id: VersionId,
    /// 1-based; version 1 is the seed/empty state
    pub version_number: u32,
    pub version_type: VersionType,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub text_notes: Option<String>,
    #[serde(default)]
    pub text_seed: Option<String>,
    #[serde(default)]
    pub source_version_number: Option<u32>,
}

impl DocumentVersion {
    /// True while the backend has appended the version but not filled its text
    pub fn is_pending(&self) -> bool {
        self.text_content.is_none()
    }
}

// ============================================================================
// Document keys
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[ts(export, export_to = "screenplay.ts")]
pub enum DocumentType {
    Story,
    Scene,
    Script,
    BeatSheet,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "Story",
            Self::Scene => "Scene",
            Self::Script => "Script",
            Self::BeatSheet => "BeatSheet",
        }
    }

    pub fn requires_scene(&self) -> bool {
        !matches!(self, Self::Story)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("{0} keys require a scene key")]
    MissingScene(DocumentType),
    #[error("Story keys must not carry a scene key")]
    UnexpectedScene,
    #[error("Script keys require the scene version they belong to")]
    MissingSceneText,
    #[error("{0} keys must not carry a scene version")]
    UnexpectedSceneText(DocumentType),
    #[error("project id is empty")]
    EmptyProject,
}

/// Composite identity of one version chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct DocumentKey {
    pub document_type: DocumentType,
    pub project_id: ProjectId,
    #[serde(default)]
    pub scene_key: Option<SceneKey>,
    /// Script chains belong to exactly one scene version
    #[serde(default)]
    pub scene_text_id: Option<VersionId>,
}

impl DocumentKey {
    pub fn story(project_id: impl Into<ProjectId>) -> Self {
        Self {
            document_type: DocumentType::Story,
            project_id: project_id.into(),
            scene_key: None,
            scene_text_id: None,
        }
    }

    pub fn scene(project_id: impl Into<ProjectId>, scene_key: impl Into<SceneKey>) -> Self {
        Self {
            document_type: DocumentType::Scene,
            project_id: project_id.into(),
            scene_key: Some(scene_key.into()),
            scene_text_id: None,
        }
    }

    pub fn beat_sheet(project_id: impl Into<ProjectId>, scene_key: impl Into<SceneKey>) -> Self {
        Self {
            document_type: DocumentType::BeatSheet,
            project_id: project_id.into(),
            scene_key: Some(scene_key.into()),
            scene_text_id: None,
        }
    }

    pub fn script(
        project_id: impl Into<ProjectId>,
        scene_key: impl Into<SceneKey>,
        scene_text_id: impl Into<VersionId>,
    ) -> Self {
        Self {
            document_type: DocumentType::Script,
            project_id: project_id.into(),
            scene_key: Some(scene_key.into()),
            scene_text_id: Some(scene_text_id.into()),
        }
    }

    pub fn validate(&self) -> Result<(), KeyError> {
        if self.project_id.as_str().trim().is_empty() {
            return Err(KeyError::EmptyProject);
        }
        match (self.document_type.requires_scene(), &self.scene_key) {
            (true, None) => return Err(KeyError::MissingScene(self.document_type)),
            (false, Some(_)) => return Err(KeyError::UnexpectedScene),
            _ => {}
        }
        match (self.document_type, &self.scene_text_id) {
            (DocumentType::Script, None) => Err(KeyError::MissingSceneText),
            (DocumentType::Script, Some(_)) | (_, None) => Ok(()),
            (other, Some(_)) => Err(KeyError::UnexpectedSceneText(other)),
        }
    }

    /// Durable storage key of the selected-version pointer.
    ///
    /// Scene-scoped documents use the scene key so pointers never collide
    /// across scenes of the same project.
    pub fn storage_key(&self) -> String {
        let scope = self
            .scene_key
            .as_ref()
            .map(SceneKey::as_str)
            .unwrap_or_else(|| self.project_id.as_str());
        format!("{scope}_selected{}Version", self.document_type.as_str())
    }

    /// Region that renders this document's text
    pub fn region(&self) -> RegionName {
        RegionName::for_document(self.document_type)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.document_type, self.project_id)?;
        if let Some(scene) = &self.scene_key {
            write!(f, "/{scene}")?;
        }
        if let Some(scene_text) = &self.scene_text_id {
            write!(f, "@{scene_text}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Named on-screen text region
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub enum RegionName {
    StoryText,
    SceneText,
    ScriptText,
    BeatSheetText,
}

impl RegionName {
    pub const ALL: [RegionName; 4] = [
        RegionName::StoryText,
        RegionName::SceneText,
        RegionName::ScriptText,
        RegionName::BeatSheetText,
    ];

    pub fn for_document(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Story => Self::StoryText,
            DocumentType::Scene => Self::SceneText,
            DocumentType::Script => Self::ScriptText,
            DocumentType::BeatSheet => Self::BeatSheetText,
        }
    }

    /// Scene and Script text share one document view
    pub fn sibling(&self) -> Option<Self> {
        match self {
            Self::SceneText => Some(Self::ScriptText),
            Self::ScriptText => Some(Self::SceneText),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoryText => "storyText",
            Self::SceneText => "sceneText",
            Self::ScriptText => "scriptText",
            Self::BeatSheetText => "beatSheetText",
        }
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty character range inside a region's plain text.
///
/// Offsets count Unicode scalar values. `revision` identifies the render of
/// the region the range was captured against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct SelectionRange {
    pub region: RegionName,
    pub start: usize,
    pub end: usize,
    #[ts(type = "number")]
    pub revision: u64,
}

impl SelectionRange {
    /// Returns `None` for collapsed or inverted ranges.
    pub fn new(region: RegionName, start: usize, end: usize, revision: u64) -> Option<Self> {
        (start < end).then_some(Self {
            region,
            start,
            end,
            revision,
        })
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn fits(&self, text_len: usize) -> bool {
        !self.is_empty() && self.end <= text_len
    }
}

// ============================================================================
// Generation requests
// ============================================================================

/// Text payload carried by a generation mutation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub enum GenerationKind {
    /// `textSeed`
    Seed,
    /// `textContent`
    Edit,
    /// `textNotes`
    Notes,
}

impl GenerationKind {
    pub fn version_type(&self) -> VersionType {
        match self {
            Self::Seed => VersionType::New,
            Self::Edit => VersionType::Edit,
            Self::Notes => VersionType::Note,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct GenerationRequest {
    pub key: DocumentKey,
    pub kind: GenerationKind,
    pub text: String,
    pub select_text_start: Option<usize>,
    pub select_text_end: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct CriticRequest {
    pub key: DocumentKey,
    pub critic_ids: Vec<CriticId>,
    pub select_text_start: Option<usize>,
    pub select_text_end: Option<usize>,
}

/// Backend acknowledgment of a queued job. Never carries the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct JobAck {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct Critic {
    pub id: CriticId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Polling / settlement
// ============================================================================

/// Emitted once per polling session when its new version appears
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub struct SettlementEvent {
    pub key: DocumentKey,
    pub version_id: VersionId,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(tag = "state", rename_all = "camelCase")]
#[ts(export, export_to = "screenplay.ts")]
pub enum PollState {
    Idle,
    Polling { baseline: Option<VersionId> },
    Settled {
        #[serde(rename = "versionId")]
        version_id: VersionId,
    },
}

impl PollState {
    pub fn is_polling(&self) -> bool {
        matches!(self, Self::Polling { .. })
    }
}
