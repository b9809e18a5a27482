use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    model::User,
    store::{Lookup, Selection, StoreError, UserStore},
};

/// Process-local store backing `AppState::fake()`.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Deactivated accounts are invisible to every read.
fn active_only(user: &User) -> bool {
    user.active
}

/// Drops the fields only `Selection::WithSecrets` may return.
fn public_copy(mut user: User) -> User {
    user.password_hash = None;
    user.password_reset_token = None;
    user.password_reset_token_expire = None;
    user
}

fn matches(user: &User, lookup: &Lookup<'_>) -> bool {
    match lookup {
        Lookup::Id(id) => user.id == *id,
        Lookup::Email(email) => user.email.as_deref() == Some(*email),
        Lookup::ExternalId(gid) => user.google_id.as_deref() == Some(*gid),
        Lookup::ResetToken(hash) => user.password_reset_token.as_deref() == Some(*hash),
    }
}

fn check_unique(users: &HashMap<Uuid, User>, candidate: &User) -> Result<(), StoreError> {
    for other in users.values().filter(|u| u.id != candidate.id) {
        if let (Some(a), Some(b)) = (&candidate.email, &other.email) {
            if a == b {
                return Err(StoreError::Duplicate {
                    field: "email".into(),
                    value: a.clone(),
                });
            }
        }
        if let (Some(a), Some(b)) = (&candidate.google_id, &other.google_id) {
            if a == b {
                return Err(StoreError::Duplicate {
                    field: "google_id".into(),
                    value: a.clone(),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_one(
        &self,
        lookup: Lookup<'_>,
        selection: Selection,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        let found = users
            .values()
            .filter(|u| active_only(u))
            .find(|u| matches(u, &lookup))
            .cloned();
        Ok(match selection {
            Selection::WithSecrets => found,
            Selection::Public => found.map(public_copy),
        })
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        check_unique(&users, &user)?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        check_unique(&users, user)?;
        let Some(stored) = users.get_mut(&user.id) else {
            return Err(StoreError::Backend(anyhow::anyhow!("user {} does not exist", user.id)));
        };
        // A public read carries no secrets; keep the stored hash in that case.
        let password_hash = user.password_hash.clone().or_else(|| stored.password_hash.take());
        *stored = User {
            password_hash,
            ..user.clone()
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::{before_save, UserDraft};
    use time::OffsetDateTime;

    fn draft(email: &str) -> UserDraft {
        UserDraft {
            name: Some("Tester".into()),
            email: Some(email.into()),
            password: Some("secret12".into()),
            confirm_password: Some("secret12".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn public_reads_strip_the_hash() {
        let store = InMemoryUserStore::new();
        let user = before_save(draft("a@x.com"), OffsetDateTime::now_utc()).unwrap();
        store.insert(user.clone()).await.unwrap();

        let public = store
            .find_one(Lookup::Email("a@x.com"), Selection::Public)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(public.password_hash, None);

        let secret = store
            .find_one(Lookup::Id(user.id), Selection::WithSecrets)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(secret.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        store.insert(before_save(draft("a@x.com"), now).unwrap()).await.unwrap();
        let err = store
            .insert(before_save(draft("a@x.com"), now).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn inactive_users_are_hidden() {
        let store = InMemoryUserStore::new();
        let mut user = before_save(draft("a@x.com"), OffsetDateTime::now_utc()).unwrap();
        store.insert(user.clone()).await.unwrap();
        user.active = false;
        store.save(&user).await.unwrap();

        for lookup in [Lookup::Id(user.id), Lookup::Email("a@x.com")] {
            let found = store.find_one(lookup, Selection::WithSecrets).await.unwrap();
            assert!(found.is_none());
        }
    }

    #[tokio::test]
    async fn saving_a_public_copy_keeps_the_hash() {
        let store = InMemoryUserStore::new();
        let user = before_save(draft("a@x.com"), OffsetDateTime::now_utc()).unwrap();
        store.insert(user.clone()).await.unwrap();

        let mut public = store
            .find_one(Lookup::Id(user.id), Selection::Public)
            .await
            .unwrap()
            .unwrap();
        public.name = "Renamed".into();
        store.save(&public).await.unwrap();

        let stored = store
            .find_one(Lookup::Id(user.id), Selection::WithSecrets)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.password_hash, user.password_hash);
    }
}
