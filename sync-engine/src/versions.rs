//! Version Store - ordered version chains and the selected-version pointer
//! per document key.
//!
//! The store keeps only the last list fetched from the backend. The selected
//! pointer is written through to [`SelectionStorage`]; when storage fails the
//! pointer lives on for the session only.

use dashmap::DashMap;
use shared_types::{DocumentKey, DocumentVersion, KeyError, VersionId};
use std::sync::Arc;

use crate::backend::{BackendError, WriterBackend};
use crate::persistence::SelectionStorage;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum VersionStoreError {
    #[error("Version {version_id} not found in chain {key}")]
    UnknownVersion { key: String, version_id: VersionId },

    #[error("Invalid document key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Debug, Default)]
struct ChainState {
    versions: Vec<DocumentVersion>,
    /// Last ticket handed to a refresh call
    issued: u64,
    /// Ticket of the refresh whose list is currently held
    applied: u64,
    /// In-session pointer, authoritative when durable storage is unavailable
    selected: Option<VersionId>,
    /// Set once a backend list has been applied; an empty `versions` only
    /// means an empty chain when this is true
    fetched: bool,
}

impl ChainState {
    fn contains(&self, id: &VersionId) -> bool {
        self.versions.iter().any(|v| &v.id == id)
    }

    fn latest_id(&self) -> Option<VersionId> {
        self.versions.last().map(|v| v.id.clone())
    }
}

pub struct VersionStore {
    backend: Arc<dyn WriterBackend>,
    storage: Arc<dyn SelectionStorage>,
    chains: DashMap<DocumentKey, ChainState>,
}

impl VersionStore {
    pub fn new(backend: Arc<dyn WriterBackend>, storage: Arc<dyn SelectionStorage>) -> Self {
        Self {
            backend,
            storage,
            chains: DashMap::new(),
        }
    }

    /// Fetch the authoritative chain for `key`.
    ///
    /// Versions are ordered by `version_number` (stable, so equal numbers keep
    /// backend order). A response that resolves after a newer refresh of the
    /// same key has already been applied is dropped, and the held list is
    /// returned instead.
    pub async fn refresh(
        &self,
        key: &DocumentKey,
    ) -> Result<Vec<DocumentVersion>, VersionStoreError> {
        key.validate()?;

        let ticket = {
            let mut chain = self.chains.entry(key.clone()).or_default();
            chain.issued += 1;
            chain.issued
        };

        let mut versions = self.backend.list_versions(key).await?;
        versions.sort_by_key(|version| version.version_number);

        let current = {
            let mut chain = self.chains.entry(key.clone()).or_default();
            if ticket < chain.applied {
                tracing::debug!(
                    document = %key,
                    ticket = ticket,
                    applied = chain.applied,
                    "Dropping stale version list"
                );
                return Ok(chain.versions.clone());
            }
            chain.applied = ticket;
            chain.fetched = true;
            chain.versions = versions;
            chain.versions.clone()
        };

        // Absent or dangling pointers default to latest and are written back.
        self.get_selected(key);
        Ok(current)
    }

    /// Last-known chain, empty if never refreshed.
    pub fn versions(&self, key: &DocumentKey) -> Vec<DocumentVersion> {
        self.chains
            .get(key)
            .map(|chain| chain.versions.clone())
            .unwrap_or_default()
    }

    /// Whether a backend list for `key` has been applied since it was last
    /// cleared.
    pub fn is_fetched(&self, key: &DocumentKey) -> bool {
        self.chains.get(key).is_some_and(|chain| chain.fetched)
    }

    pub fn latest_id(&self, key: &DocumentKey) -> Option<VersionId> {
        self.chains.get(key).and_then(|chain| chain.latest_id())
    }

    pub fn latest(&self, key: &DocumentKey) -> Option<DocumentVersion> {
        self.chains
            .get(key)
            .and_then(|chain| chain.versions.last().cloned())
    }

    /// Selected version id for `key`.
    ///
    /// Returns the persisted pointer if it is still in the last-known list,
    /// otherwise falls back to the latest version and persists that.
    pub fn get_selected(&self, key: &DocumentKey) -> Option<VersionId> {
        let persisted = self.read_pointer(key);

        let (valid, latest) = {
            let chain = self.chains.get(key)?;
            let valid = persisted
                .clone()
                .or_else(|| chain.selected.clone())
                .filter(|id| chain.contains(id));
            (valid, chain.latest_id())
        };

        if let Some(id) = valid {
            if let Some(mut chain) = self.chains.get_mut(key) {
                chain.selected = Some(id.clone());
            }
            if persisted.as_ref() != Some(&id) {
                self.write_pointer(key, &id);
            }
            return Some(id);
        }

        let latest = latest?;
        tracing::debug!(
            document = %key,
            version_id = %latest,
            "Selected version missing, defaulting to latest"
        );
        if let Some(mut chain) = self.chains.get_mut(key) {
            chain.selected = Some(latest.clone());
        }
        self.write_pointer(key, &latest);
        Some(latest)
    }

    pub fn selected_version(&self, key: &DocumentKey) -> Option<DocumentVersion> {
        let id = self.get_selected(key)?;
        self.chains
            .get(key)
            .and_then(|chain| chain.versions.iter().find(|v| v.id == id).cloned())
    }

    /// Point `key` at `id`; `id` must be in the last-known list.
    pub fn select(&self, key: &DocumentKey, id: &VersionId) -> Result<(), VersionStoreError> {
        {
            let mut chain =
                self.chains
                    .get_mut(key)
                    .ok_or_else(|| VersionStoreError::UnknownVersion {
                        key: key.to_string(),
                        version_id: id.clone(),
                    })?;
            if !chain.contains(id) {
                return Err(VersionStoreError::UnknownVersion {
                    key: key.to_string(),
                    version_id: id.clone(),
                });
            }
            chain.selected = Some(id.clone());
        }
        self.write_pointer(key, id);
        tracing::debug!(document = %key, version_id = %id, "Selected version");
        Ok(())
    }

    /// Step the pointer one version back. Returns the new selection, or
    /// `None` when already at the first version.
    pub fn select_previous(&self, key: &DocumentKey) -> Option<VersionId> {
        self.step_selection(key, -1)
    }

    pub fn select_next(&self, key: &DocumentKey) -> Option<VersionId> {
        self.step_selection(key, 1)
    }

    fn step_selection(&self, key: &DocumentKey, delta: isize) -> Option<VersionId> {
        let current = self.get_selected(key)?;
        let target = {
            let chain = self.chains.get(key)?;
            let index = chain.versions.iter().position(|v| v.id == current)?;
            let next = index.checked_add_signed(delta)?;
            chain.versions.get(next)?.id.clone()
        };
        self.select(key, &target).ok()?;
        Some(target)
    }

    /// Forget the cached chain for `key`. The durable pointer is kept.
    pub fn clear(&self, key: &DocumentKey) {
        self.chains.remove(key);
    }

    fn read_pointer(&self, key: &DocumentKey) -> Option<VersionId> {
        match self.storage.get(&key.storage_key()) {
            Ok(value) => value.map(VersionId::from),
            Err(e) => {
                tracing::warn!(
                    document = %key,
                    error = %e,
                    "Selection storage read failed; using in-session pointer"
                );
                None
            }
        }
    }

    fn write_pointer(&self, key: &DocumentKey, id: &VersionId) {
        if let Err(e) = self.storage.set(&key.storage_key(), id.as_str()) {
            tracing::warn!(
                document = %key,
                version_id = %id,
                error = %e,
                "Selection storage write failed; pointer kept for this session only"
            );
        }
    }
}
