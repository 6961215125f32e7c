use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

/// Provider name of the account that ties a password user to its identity.
pub const CREDENTIALS_PROVIDER: &str = "credentials";

/// The signed-in identity a session resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
}

/// Provider account linked to an adapter user.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub provider: &'a str,
    pub provider_account_id: &'a str,
    pub access_token: Option<&'a str>,
    pub scope: Option<&'a str>,
    pub token_type: Option<&'a str>,
}

/// Persistence for sign-in state: adapter users, linked provider accounts,
/// sessions and one-time email verification tokens.
#[async_trait]
pub trait AuthAdapter: Send + Sync {
    /// Creates the user for a proven `email` or returns the existing one,
    /// stamping `email_verified`. When the row was unproven until now its
    /// password link and sessions are revoked.
    async fn upsert_user(&self, email: &str, name: Option<&str>) -> anyhow::Result<SessionUser>;

    /// Creates or returns the user for an unproven `email`. `None` when the
    /// address already belongs to a verified identity.
    async fn claim_unverified_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> anyhow::Result<Option<SessionUser>>;

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<SessionUser>>;

    async fn link_account(&self, user_id: Uuid, account: &NewAccount<'_>) -> anyhow::Result<()>;

    async fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// `None` for unknown and expired sessions alike.
    async fn get_session_user(&self, token: &str) -> anyhow::Result<Option<SessionUser>>;

    async fn delete_session(&self, token: &str) -> anyhow::Result<()>;

    async fn create_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Consumes the token and returns its expiry. A token can be used once.
    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> anyhow::Result<Option<OffsetDateTime>>;

    /// Removes expired sessions and verification tokens; returns the count.
    async fn delete_expired(&self) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgAuthAdapter {
    db: PgPool,
}

impl PgAuthAdapter {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuthAdapter for PgAuthAdapter {
    async fn upsert_user(&self, email: &str, name: Option<&str>) -> anyhow::Result<SessionUser> {
        let mut tx = self.db.begin().await?;
        let prior = sqlx::query_scalar::<_, Option<OffsetDateTime>>(
            r#"SELECT email_verified FROM auth_users WHERE email = $1 FOR UPDATE"#,
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        let user = sqlx::query_as::<_, SessionUser>(
            r#"
            INSERT INTO auth_users (email, name, email_verified)
            VALUES ($1, $2, now())
            ON CONFLICT (email) DO UPDATE
               SET name = COALESCE(auth_users.name, EXCLUDED.name),
                   email_verified = COALESCE(auth_users.email_verified, EXCLUDED.email_verified)
            RETURNING id, name, email
            "#,
        )
        .bind(email)
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        // Existing row nobody had proven: whoever set a password on it loses it.
        if let Some(None) = prior {
            let unlinked = sqlx::query(r#"DELETE FROM accounts WHERE user_id = $1 AND provider = $2"#)
                .bind(user.id)
                .bind(CREDENTIALS_PROVIDER)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if unlinked > 0 {
                sqlx::query(r#"DELETE FROM sessions WHERE user_id = $1"#)
                    .bind(user.id)
                    .execute(&mut *tx)
                    .await?;
                warn!(user_id = %user.id, "unproven password link revoked by verified sign-in");
            }
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn claim_unverified_user(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> anyhow::Result<Option<SessionUser>> {
        let user = sqlx::query_as::<_, SessionUser>(
            r#"
            INSERT INTO auth_users (email, name)
            VALUES ($1, $2)
            ON CONFLICT (email) DO UPDATE
               SET name = COALESCE(auth_users.name, EXCLUDED.name)
             WHERE auth_users.email_verified IS NULL
            RETURNING id, name, email
            "#,
        )
        .bind(email)
        .bind(name)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> anyhow::Result<Option<SessionUser>> {
        let user = sqlx::query_as::<_, SessionUser>(
            r#"
            SELECT u.id, u.name, u.email
              FROM accounts a
              JOIN auth_users u ON u.id = a.user_id
             WHERE a.provider = $1 AND a.provider_account_id = $2
            "#,
        )
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn link_account(&self, user_id: Uuid, account: &NewAccount<'_>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, provider, provider_account_id, access_token, scope, token_type)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user_id)
        .bind(account.provider)
        .bind(account.provider_account_id)
        .bind(account.access_token)
        .bind(account.scope)
        .bind(account.token_type)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn create_session(
        &self,
        token: &str,
        user_id: Uuid,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_token, user_id, expires)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token)
        .bind(user_id)
        .bind(expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_session_user(&self, token: &str) -> anyhow::Result<Option<SessionUser>> {
        let user = sqlx::query_as::<_, SessionUser>(
            r#"
            SELECT u.id, u.name, u.email
              FROM sessions s
              JOIN auth_users u ON u.id = s.user_id
             WHERE s.session_token = $1 AND s.expires > now()
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_session(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query(r#"DELETE FROM sessions WHERE session_token = $1"#)
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn create_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
        expires: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_token (identifier, token, expires)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(identifier)
        .bind(token_hash)
        .bind(expires)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &str,
    ) -> anyhow::Result<Option<OffsetDateTime>> {
        let expires = sqlx::query_scalar::<_, OffsetDateTime>(
            r#"
            DELETE FROM verification_token
             WHERE identifier = $1 AND token = $2
            RETURNING expires
            "#,
        )
        .bind(identifier)
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(expires)
    }

    async fn delete_expired(&self) -> anyhow::Result<u64> {
        let sessions = sqlx::query(r#"DELETE FROM sessions WHERE expires <= now()"#)
            .execute(&self.db)
            .await?
            .rows_affected();
        let tokens = sqlx::query(r#"DELETE FROM verification_token WHERE expires <= now()"#)
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok(sessions + tokens)
    }
}
