//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use shared_types::{
    Critic, CriticRequest, DocumentKey, DocumentVersion, GenerationRequest, JobAck, ProjectId,
    VersionType,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_engine::{
    BackendError, MemoryStorage, PollingController, SelectionStorage, StorageError, VersionStore,
    WriterBackend,
};

pub fn version(id: &str, number: u32, text: &str) -> DocumentVersion {
    DocumentVersion {
        id: id.into(),
        version_number: number,
        version_type: if number == 1 {
            VersionType::New
        } else {
            VersionType::Note
        },
        text_content: Some(text.to_string()),
        text_notes: None,
        text_seed: None,
        source_version_number: number.checked_sub(1).filter(|n| *n > 0),
    }
}

/// Backend whose version lists are scripted per key.
///
/// Each key holds a queue of responses; `list_versions` pops the front until
/// one response is left, which then repeats forever.
#[derive(Default)]
pub struct ScriptedBackend {
    chains: Mutex<HashMap<DocumentKey, VecDeque<Vec<DocumentVersion>>>>,
    list_delays: Mutex<VecDeque<Duration>>,
    generated: Mutex<Vec<GenerationRequest>>,
    critic_requests: Mutex<Vec<CriticRequest>>,
    list_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    fail_generate: AtomicBool,
    failing_generates: Mutex<HashSet<DocumentKey>>,
    failing_lists: Mutex<HashSet<DocumentKey>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace every queued response for `key` with `versions`.
    pub fn set_chain(&self, key: &DocumentKey, versions: Vec<DocumentVersion>) {
        let mut chains = self.chains.lock().unwrap();
        chains.insert(key.clone(), VecDeque::from([versions]));
    }

    /// Queue a response served after the ones already queued.
    pub fn push_chain(&self, key: &DocumentKey, versions: Vec<DocumentVersion>) {
        let mut chains = self.chains.lock().unwrap();
        chains.entry(key.clone()).or_default().push_back(versions);
    }

    /// Delay the next `list_versions` calls, one entry per call.
    pub fn delay_lists(&self, delays: impl IntoIterator<Item = Duration>) {
        self.list_delays.lock().unwrap().extend(delays);
    }

    pub fn fail_generate(&self, fail: bool) {
        self.fail_generate.store(fail, Ordering::SeqCst);
    }

    /// Fail generation mutations for `key` only.
    pub fn fail_generate_for(&self, key: &DocumentKey) {
        self.failing_generates.lock().unwrap().insert(key.clone());
    }

    /// Make `list_versions` for `key` fail until switched back.
    pub fn fail_list(&self, key: &DocumentKey, fail: bool) {
        let mut failing = self.failing_lists.lock().unwrap();
        if fail {
            failing.insert(key.clone());
        } else {
            failing.remove(key);
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Generation mutations of either flavour.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn generated(&self) -> Vec<GenerationRequest> {
        self.generated.lock().unwrap().clone()
    }

    pub fn critic_requests(&self) -> Vec<CriticRequest> {
        self.critic_requests.lock().unwrap().clone()
    }

    fn next_chain(&self, key: &DocumentKey) -> Vec<DocumentVersion> {
        let mut chains = self.chains.lock().unwrap();
        match chains.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn ack(&self, key: &DocumentKey) -> Result<JobAck, BackendError> {
        let n = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate.load(Ordering::SeqCst)
            || self.failing_generates.lock().unwrap().contains(key)
        {
            return Err(BackendError::Status {
                status: 503,
                message: "queue unavailable".to_string(),
            });
        }
        Ok(JobAck {
            task_id: format!("task-{}", n + 1),
        })
    }
}

#[async_trait]
impl WriterBackend for ScriptedBackend {
    async fn list_versions(
        &self,
        key: &DocumentKey,
    ) -> Result<Vec<DocumentVersion>, BackendError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        // Decide the response before any delay so overlapping calls see the
        // chain as it was when they were issued.
        let failing = self.failing_lists.lock().unwrap().contains(key);
        let chain = self.next_chain(key);
        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(BackendError::Transport("connection reset".to_string()));
        }
        Ok(chain)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<JobAck, BackendError> {
        self.generated.lock().unwrap().push(request.clone());
        self.ack(&request.key)
    }

    async fn generate_with_critics(
        &self,
        request: &CriticRequest,
    ) -> Result<JobAck, BackendError> {
        self.critic_requests.lock().unwrap().push(request.clone());
        self.ack(&request.key)
    }

    async fn list_critics(&self, _project_id: &ProjectId) -> Result<Vec<Critic>, BackendError> {
        Ok(vec![Critic {
            id: "c-structure".into(),
            name: "Structure".to_string(),
            description: None,
        }])
    }
}

/// Storage that is never available, like a browser with storage disabled.
#[derive(Debug, Default)]
pub struct FailingStorage;

impl SelectionStorage for FailingStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage disabled".to_string()))
    }
}

pub fn store_with(
    backend: Arc<ScriptedBackend>,
    storage: Arc<dyn SelectionStorage>,
) -> Arc<VersionStore> {
    Arc::new(VersionStore::new(backend, storage))
}

pub fn memory_store(backend: Arc<ScriptedBackend>) -> (Arc<VersionStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (store_with(backend, storage.clone()), storage)
}

pub async fn spawn_poller(
    store: Arc<VersionStore>,
    interval: Duration,
) -> (PollingController, tokio::task::JoinHandle<()>) {
    PollingController::spawn(store, interval)
        .await
        .expect("poller should spawn")
}

/// Let spawned tasks and actor mailboxes drain without moving the clock.
pub async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
