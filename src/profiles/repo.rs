use async_trait::async_trait;
use std::time::Duration;

use crate::profiles::repo_types::{ImageAsset, ProfileRecord, UserType};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("profile not found: {0}")]
    NotFound(String),
    #[error("email already in use: {0}")]
    AlreadyExists(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProfileError {
    /// Wraps any driver error as a store failure.
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, ProfileError>;

/// Storage port. One implementation is selected at startup and shared by
/// every request for the lifetime of the process.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Persists a new record. `AlreadyExists` if the email is taken.
    async fn create(&self, record: ProfileRecord) -> RepoResult<ProfileRecord>;

    async fn find_by_email(&self, email: &str) -> RepoResult<ProfileRecord>;

    /// Returns the record as it is after the update.
    async fn update_state(&self, email: &str, state: bool) -> RepoResult<ProfileRecord>;

    /// Replaces any existing picture wholesale.
    async fn attach_image(&self, email: &str, asset: ImageAsset) -> RepoResult<ProfileRecord>;

    /// Returns the number of deleted records; `NotFound` when it would be zero.
    async fn delete(&self, email: &str) -> RepoResult<u64>;

    /// Order is backend-defined.
    async fn list_all(&self) -> RepoResult<Vec<ProfileRecord>>;

    async fn list_by_type(&self, user_type: UserType) -> RepoResult<Vec<ProfileRecord>>;

    /// Drops every record and leaves an empty, usable schema behind.
    async fn reset(&self) -> RepoResult<()>;
}
