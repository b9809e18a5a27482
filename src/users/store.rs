use async_trait::async_trait;
use uuid::Uuid;

use super::model::User;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(Uuid),
    Email(&'a str),
    ExternalId(&'a str),
    /// SHA-256 hex digest of a raw reset token.
    ResetToken(&'a str),
}

/// Which fields a read returns. Password hash and reset-ticket fields are
/// only loaded on explicit request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Public,
    WithSecrets,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value for {field}: {value}")]
    Duplicate { field: String, value: String },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field, value } => AppError::DuplicateKey { field, value },
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

/// Persistent user records. Every read hides deactivated accounts; writes are
/// single-record and rely on the backend for atomicity.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_one(
        &self,
        lookup: Lookup<'_>,
        selection: Selection,
    ) -> Result<Option<User>, StoreError>;

    async fn insert(&self, user: User) -> Result<User, StoreError>;

    async fn save(&self, user: &User) -> Result<(), StoreError>;
}
