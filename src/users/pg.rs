use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    model::User,
    store::{Lookup, Selection, StoreError, UserStore},
};

/// User row as stored in Postgres.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    google_id: Option<String>,
    photo: Option<String>,
    role: String,
    password_hash: Option<String>,
    active: bool,
    password_changed_at: Option<OffsetDateTime>,
    password_reset_token: Option<String>,
    password_reset_token_expire: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            google_id: r.google_id,
            photo: r.photo,
            role: r.role.parse()?,
            password_hash: r.password_hash,
            active: r.active,
            password_changed_at: r.password_changed_at,
            password_reset_token: r.password_reset_token,
            password_reset_token_expire: r.password_reset_token_expire,
            created_at: r.created_at,
        })
    }
}

const PUBLIC_COLUMNS: &str = "id, name, email, google_id, photo, role, \
     NULL::text AS password_hash, active, password_changed_at, \
     NULL::text AS password_reset_token, \
     NULL::timestamptz AS password_reset_token_expire, created_at";

const SECRET_COLUMNS: &str = "id, name, email, google_id, photo, role, \
     password_hash, active, password_changed_at, \
     password_reset_token, password_reset_token_expire, created_at";

/// Appended to every read.
const ACTIVE_ONLY: &str = "active = TRUE";

fn columns(selection: Selection) -> &'static str {
    match selection {
        Selection::Public => PUBLIC_COLUMNS,
        Selection::WithSecrets => SECRET_COLUMNS,
    }
}

fn map_write_error(err: sqlx::Error, user: &User) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let (field, value) = match db.constraint() {
                Some(c) if c.contains("google") => ("google_id", &user.google_id),
                _ => ("email", &user.email),
            };
            return StoreError::Duplicate {
                field: field.into(),
                value: value.clone().unwrap_or_default(),
            };
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context("write user"))
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        Ok(Self { db })
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(
        &self,
        lookup: Lookup<'_>,
        selection: Selection,
    ) -> Result<Option<User>, StoreError> {
        let predicate = match lookup {
            Lookup::Id(_) => "id = $1",
            Lookup::Email(_) => "email = $1",
            Lookup::ExternalId(_) => "google_id = $1",
            Lookup::ResetToken(_) => "password_reset_token = $1",
        };
        let sql = format!(
            "SELECT {} FROM users WHERE {} AND {}",
            columns(selection),
            predicate,
            ACTIVE_ONLY
        );
        let query = sqlx::query_as::<_, UserRow>(&sql);
        let query = match lookup {
            Lookup::Id(id) => query.bind(id),
            Lookup::Email(v) | Lookup::ExternalId(v) | Lookup::ResetToken(v) => query.bind(v),
        };
        let row = query
            .fetch_optional(&self.db)
            .await
            .context("find user")?;
        Ok(row.map(User::try_from).transpose()?)
    }

    async fn insert(&self, user: User) -> Result<User, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, google_id, photo, role, password_hash,
                               active, password_changed_at, password_reset_token,
                               password_reset_token_expire, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.photo)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_token_expire)
        .bind(user.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, &user))?;
        Ok(user)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        // password_hash is kept when the caller holds a public copy.
        sqlx::query(
            r#"
            UPDATE users
               SET name = $2, email = $3, google_id = $4, photo = $5, role = $6,
                   password_hash = COALESCE($7, password_hash), active = $8,
                   password_changed_at = $9, password_reset_token = $10,
                   password_reset_token_expire = $11
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.google_id)
        .bind(&user.photo)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(user.active)
        .bind(user.password_changed_at)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_token_expire)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, user))?;
        Ok(())
    }
}
