use std::{future::Future, sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    model::{before_save, User, UserDraft},
    store::{Lookup, Selection, StoreError, UserStore},
};
use crate::error::AppError;

/// Identity resolver: the only way handlers reach the user store.
#[derive(Clone)]
pub struct Users {
    store: Arc<dyn UserStore>,
    timeout: Duration,
}

impl Users {
    pub fn new(store: Arc<dyn UserStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(AppError::from),
            Err(_) => Err(AppError::Internal(anyhow::anyhow!(
                "user store timed out during {op}"
            ))),
        }
    }

    async fn find(&self, lookup: Lookup<'_>, selection: Selection) -> Result<User, AppError> {
        self.bounded("find", self.store.find_one(lookup, selection))
            .await?
            .ok_or_else(|| AppError::NotFound("No user found".into()))
    }

    pub async fn by_id(&self, id: Uuid, selection: Selection) -> Result<User, AppError> {
        self.find(Lookup::Id(id), selection).await
    }

    pub async fn by_email(&self, email: &str, selection: Selection) -> Result<User, AppError> {
        self.find(Lookup::Email(email), selection).await
    }

    pub async fn by_external_id(&self, provider_id: &str) -> Result<User, AppError> {
        self.find(Lookup::ExternalId(provider_id), Selection::Public)
            .await
    }

    pub async fn by_reset_token(&self, token_hash: &str) -> Result<User, AppError> {
        self.find(Lookup::ResetToken(token_hash), Selection::WithSecrets)
            .await
    }

    /// Runs `before_save` on the draft, then persists it.
    pub async fn create(&self, draft: UserDraft) -> Result<User, AppError> {
        let user = before_save(draft, OffsetDateTime::now_utc())?;
        self.bounded("insert", self.store.insert(user)).await
    }

    /// Writes the record as-is, without re-running draft validation.
    pub async fn save(&self, user: &User) -> Result<(), AppError> {
        self.bounded("save", self.store.save(user)).await
    }
}
