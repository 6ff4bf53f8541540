//! PollerActor message types.

use ractor::RpcReplyPort;
use shared_types::{DocumentKey, PollState};

use crate::versions::VersionStoreError;

#[derive(Debug)]
pub enum PollerMsg {
    /// Begin (or restart) polling `key`; replies with the recorded state so
    /// callers know the baseline is in place before they dispatch.
    Start {
        key: DocumentKey,
        reply: RpcReplyPort<PollState>,
    },
    /// Timer fired for session `generation` of `key`.
    Tick { key: DocumentKey, generation: u64 },
    /// Background refresh for session `generation` finished.
    Refreshed {
        key: DocumentKey,
        generation: u64,
        result: Result<(), VersionStoreError>,
    },
    Cancel {
        key: DocumentKey,
    },
    CancelMany {
        keys: Vec<DocumentKey>,
        reply: RpcReplyPort<usize>,
    },
    GetState {
        key: DocumentKey,
        reply: RpcReplyPort<PollState>,
    },
    ActiveKeys {
        reply: RpcReplyPort<Vec<DocumentKey>>,
    },
}

#[derive(Debug, thiserror::Error, Clone)]
pub enum PollerError {
    #[error("Poller RPC error: {0}")]
    Rpc(String),

    #[error("Poller spawn failed: {0}")]
    Spawn(String),

    #[error("Could not fetch the chain to take a baseline: {0}")]
    Baseline(#[from] VersionStoreError),
}
