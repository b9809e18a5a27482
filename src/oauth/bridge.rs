use tracing::info;

use super::ExternalIdentity;
use crate::{
    error::AppError,
    users::{model::UserDraft, User, Users},
};

/// Maps an external identity to a local account, creating one on first
/// login. Never touches passwords; deactivated accounts stay locked out.
pub async fn resolve_external_identity(
    users: &Users,
    identity: ExternalIdentity,
) -> Result<User, AppError> {
    match users.by_external_id(&identity.provider_id).await {
        Ok(user) => return Ok(user),
        Err(AppError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let name = match identity.display_name.trim() {
        "" => "Google user".to_string(),
        name => name.to_string(),
    };
    let draft = UserDraft {
        name: Some(name),
        google_id: Some(identity.provider_id.clone()),
        photo: identity.avatar_url,
        ..Default::default()
    };
    match users.create(draft).await {
        Ok(user) => {
            info!(user_id = %user.id, "user created from external identity");
            Ok(user)
        }
        // Only an inactive account can hold this provider id and still be
        // invisible to the lookup above.
        Err(AppError::DuplicateKey { .. }) => Err(AppError::unauthorized(
            "This account has been deactivated",
        )),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{memory::InMemoryUserStore, Role};
    use std::{sync::Arc, time::Duration};

    fn users() -> Users {
        Users::new(Arc::new(InMemoryUserStore::new()), Duration::from_secs(5))
    }

    fn identity() -> ExternalIdentity {
        ExternalIdentity {
            provider_id: "g-42".into(),
            display_name: "Grace Hopper".into(),
            avatar_url: Some("https://img/g.png".into()),
        }
    }

    #[tokio::test]
    async fn first_login_creates_account() {
        let users = users();
        let user = resolve_external_identity(&users, identity()).await.unwrap();
        assert_eq!(user.name, "Grace Hopper");
        assert_eq!(user.google_id.as_deref(), Some("g-42"));
        assert_eq!(user.photo.as_deref(), Some("https://img/g.png"));
        assert_eq!(user.role, Role::User);
        assert!(user.password_hash.is_none());
        assert!(user.email.is_none());
    }

    #[tokio::test]
    async fn repeat_login_reuses_account() {
        let users = users();
        let first = resolve_external_identity(&users, identity()).await.unwrap();
        let second = resolve_external_identity(&users, identity()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn deactivated_account_cannot_sign_in() {
        let users = users();
        let mut user = resolve_external_identity(&users, identity()).await.unwrap();
        user.active = false;
        users.save(&user).await.unwrap();
        let err = resolve_external_identity(&users, identity()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn blank_display_name_gets_a_fallback() {
        let users = users();
        let user = resolve_external_identity(
            &users,
            ExternalIdentity {
                display_name: "  ".into(),
                ..identity()
            },
        )
        .await
        .unwrap();
        assert_eq!(user.name, "Google user");
    }
}
