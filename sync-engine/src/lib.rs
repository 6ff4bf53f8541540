//! Screenplay sync engine
//!
//! Client-side bookkeeping around asynchronous document generation:
//! version chains and the selected-version pointer per document, polling
//! for job completion, mapping on-screen selections to stable character
//! offsets, and dispatching note/generation requests.

pub mod actors;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod persistence;
pub mod selection;
pub mod session;
pub mod versions;

pub use actors::poller::{PollSession, PollerError, PollingController, DEFAULT_POLL_INTERVAL};
pub use backend::{BackendError, GraphqlBackend, WriterBackend};
pub use config::EngineConfig;
pub use dispatch::{DispatchError, DispatchReceipt, GenerationDispatcher, NoteSource, ValidationError};
pub use persistence::{JsonFileStorage, MemoryStorage, SelectionStorage, StorageError};
pub use selection::{Boundary, ScreenSelection, SelectionContext, SelectionPoint};
pub use session::ProjectSession;
pub use versions::{VersionStore, VersionStoreError};
