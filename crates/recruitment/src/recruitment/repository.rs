use crate::access::IdentityId;

use super::domain::{Application, ApplicationId, Posting, PostingId};

/// Storage abstraction for postings so the service can be exercised in isolation.
pub trait PostingRepository: Send + Sync {
    fn insert(&self, posting: Posting) -> Result<Posting, RepositoryError>;
    fn update(&self, posting: Posting) -> Result<(), RepositoryError>;
    fn remove(&self, id: PostingId) -> Result<Posting, RepositoryError>;
    fn fetch(&self, id: PostingId) -> Result<Option<Posting>, RepositoryError>;
    fn list(&self) -> Result<Vec<Posting>, RepositoryError>;
}

/// Storage abstraction for applications. `insert` must reject a second
/// application by the same candidate for the same posting with `Conflict`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    fn update(&self, application: Application) -> Result<(), RepositoryError>;
    fn remove(&self, id: ApplicationId) -> Result<Application, RepositoryError>;
    fn fetch(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn list(&self) -> Result<Vec<Application>, RepositoryError>;
    fn for_candidate(&self, candidate: IdentityId) -> Result<Vec<Application>, RepositoryError>;
    fn for_posting(&self, posting: PostingId) -> Result<Vec<Application>, RepositoryError>;
    /// Drops every application filed against `posting` and returns them.
    fn remove_for_posting(&self, posting: PostingId) -> Result<Vec<Application>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
