//! Backend collaborator boundary.
//!
//! Generation mutations only acknowledge a queued job; the produced text
//! becomes visible through a later `list_versions` call returning a longer
//! chain. Polling exists because of this contract.

mod graphql;

use async_trait::async_trait;
use shared_types::{
    Critic, CriticRequest, DocumentKey, DocumentVersion, GenerationRequest, JobAck, ProjectId,
};

pub use graphql::GraphqlBackend;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {status} ({message})")]
    Status { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WriterBackend: Send + Sync + 'static {
    /// Authoritative chain for `key`; array order as returned by the backend.
    async fn list_versions(&self, key: &DocumentKey)
        -> Result<Vec<DocumentVersion>, BackendError>;

    async fn generate(&self, request: &GenerationRequest) -> Result<JobAck, BackendError>;

    async fn generate_with_critics(&self, request: &CriticRequest)
        -> Result<JobAck, BackendError>;

    async fn list_critics(&self, project_id: &ProjectId) -> Result<Vec<Critic>, BackendError>;
}
