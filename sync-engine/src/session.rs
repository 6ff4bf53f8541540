//! ProjectSession - everything one document view needs, wired together.
//!
//! The session owns the [`SelectionContext`] for its regions and remembers
//! which keys it started polling, so tearing the view down cancels exactly
//! those sessions and leaves no timer behind.

use shared_types::{
    DocumentKey, DocumentVersion, PollState, RegionName, SelectionRange, SettlementEvent,
    VersionId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::actors::poller::{PollerError, PollingController};
use crate::backend::WriterBackend;
use crate::dispatch::{DispatchError, DispatchReceipt, GenerationDispatcher, NoteSource};
use crate::persistence::SelectionStorage;
use crate::selection::{ScreenSelection, SelectionContext};
use crate::versions::{VersionStore, VersionStoreError};

pub struct ProjectSession {
    store: Arc<VersionStore>,
    poller: PollingController,
    poller_handle: Option<JoinHandle<()>>,
    dispatcher: GenerationDispatcher,
    selection: SelectionContext,
    owned: HashSet<DocumentKey>,
}

impl ProjectSession {
    /// Build a store, spawn a poller and wire the dispatcher to both.
    pub async fn spawn(
        backend: Arc<dyn WriterBackend>,
        storage: Arc<dyn SelectionStorage>,
        poll_interval: Duration,
    ) -> Result<Self, PollerError> {
        let store = Arc::new(VersionStore::new(backend.clone(), storage));
        let (poller, handle) = PollingController::spawn(store.clone(), poll_interval).await?;
        let mut session = Self::with_parts(store, poller, backend);
        session.poller_handle = Some(handle);
        Ok(session)
    }

    /// Attach to an existing store and poller shared with other views.
    pub fn with_parts(
        store: Arc<VersionStore>,
        poller: PollingController,
        backend: Arc<dyn WriterBackend>,
    ) -> Self {
        let dispatcher = GenerationDispatcher::new(backend, poller.clone());
        Self {
            store,
            poller,
            poller_handle: None,
            dispatcher,
            selection: SelectionContext::new(),
            owned: HashSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<VersionStore> {
        &self.store
    }

    pub fn poller(&self) -> &PollingController {
        &self.poller
    }

    pub fn selection(&self) -> &SelectionContext {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionContext {
        &mut self.selection
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.poller.subscribe()
    }

    /// Refresh `key` and render its selected version into the key's region.
    pub async fn open(
        &mut self,
        key: &DocumentKey,
    ) -> Result<Option<DocumentVersion>, VersionStoreError> {
        self.store.refresh(key).await?;
        Ok(self.render_selected(key))
    }

    /// Switch the displayed version of `key`.
    pub fn show_version(
        &mut self,
        key: &DocumentKey,
        id: &VersionId,
    ) -> Result<Option<DocumentVersion>, VersionStoreError> {
        self.store.select(key, id)?;
        Ok(self.render_selected(key))
    }

    /// React to a settlement: the new version is already selected in the
    /// store, so re-render it. Events for keys this view does not own are
    /// ignored.
    pub fn apply_settlement(&mut self, event: &SettlementEvent) -> Option<DocumentVersion> {
        if !self.owned.contains(&event.key) {
            return None;
        }
        self.render_selected(&event.key)
    }

    fn render_selected(&mut self, key: &DocumentKey) -> Option<DocumentVersion> {
        let version = self.store.selected_version(key);
        let text = version
            .as_ref()
            .and_then(|v| v.text_content.as_deref())
            .unwrap_or_default();
        self.selection.on_version_rendered(key.region(), text);
        version
    }

    pub fn capture_selection(
        &mut self,
        region: RegionName,
        selection: &ScreenSelection,
    ) -> Option<SelectionRange> {
        self.selection.select_and_highlight(region, selection)
    }

    pub async fn request_notes(
        &mut self,
        key: &DocumentKey,
        source: NoteSource,
    ) -> Result<DispatchReceipt, DispatchError> {
        let receipt = self
            .dispatcher
            .dispatch_whole(key, source, &mut self.selection)
            .await?;
        self.owned.insert(key.clone());
        Ok(receipt)
    }

    pub async fn request_notes_on_selection(
        &mut self,
        key: &DocumentKey,
        source: NoteSource,
    ) -> Result<DispatchReceipt, DispatchError> {
        let receipt = self
            .dispatcher
            .dispatch_selected(key, source, &mut self.selection)
            .await?;
        self.owned.insert(key.clone());
        Ok(receipt)
    }

    pub async fn submit_seed(
        &mut self,
        key: &DocumentKey,
        seed: &str,
    ) -> Result<DispatchReceipt, DispatchError> {
        let receipt = self
            .dispatcher
            .submit_seed(key, seed, &mut self.selection)
            .await?;
        self.owned.insert(key.clone());
        Ok(receipt)
    }

    pub async fn submit_edit(
        &mut self,
        key: &DocumentKey,
        content: &str,
    ) -> Result<DispatchReceipt, DispatchError> {
        let receipt = self
            .dispatcher
            .submit_edit(key, content, &mut self.selection)
            .await?;
        self.owned.insert(key.clone());
        Ok(receipt)
    }

    pub async fn rewrite_scene(
        &mut self,
        scene_key: &DocumentKey,
        content: &str,
        script_key: &DocumentKey,
    ) -> Result<(DispatchReceipt, DispatchReceipt), DispatchError> {
        let result = self
            .dispatcher
            .rewrite_scene(scene_key, content, script_key, &mut self.selection)
            .await;
        match &result {
            Ok((scene, script)) => {
                self.owned.insert(scene.key.clone());
                self.owned.insert(script.key.clone());
            }
            Err(DispatchError::ScriptAfterScene { scene, .. }) => {
                self.owned.insert(scene.key.clone());
            }
            Err(_) => {}
        }
        result
    }

    /// Whether this view started the polling session for `key`.
    pub fn owns(&self, key: &DocumentKey) -> bool {
        self.owned.contains(key)
    }

    pub async fn poll_state(&self, key: &DocumentKey) -> Result<PollState, PollerError> {
        self.poller.state(key).await
    }

    pub fn cancel(&mut self, key: &DocumentKey) -> Result<(), PollerError> {
        self.poller.cancel(key)
    }

    /// Cancel every session this view started; stops the poller too when
    /// this session spawned it. Returns how many sessions were still polling.
    pub async fn shutdown(&mut self) -> Result<usize, PollerError> {
        let keys: Vec<DocumentKey> = self.owned.drain().collect();
        let cancelled = self.poller.cancel_many(keys).await?;
        self.selection.reset_all();
        if let Some(handle) = self.poller_handle.take() {
            self.poller.stop();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Poller task ended abnormally");
            }
        }
        tracing::info!(cancelled = cancelled, "Project session closed");
        Ok(cancelled)
    }
}
