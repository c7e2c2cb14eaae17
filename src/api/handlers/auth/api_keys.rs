//! API key lifecycle: generation, hashed storage, validation, cleanup.
//!
//! Only the SHA-256 of the full plaintext is ever persisted; the plaintext
//! is returned exactly once at creation. Validation failures are
//! indistinguishable to callers: "not found", "expired", and "inactive
//! owner" all come back as `None`.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::{error, Instrument};
use uuid::Uuid;

use super::error::AuthError;
use super::user_store::{UserRecord, UserStore};
use super::utils::{
    ct_eq, derive_key_prefix, generate_api_key_body, hash_api_key, key_fingerprint,
    valid_api_key_format,
};

/// API key metadata as exposed to its owner. The plaintext and the full
/// hash are never part of this shape.
#[derive(Clone, Debug)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub fingerprint: String,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub expires_at: Option<String>,
}

/// Result of creating a key: metadata plus the one-time plaintext.
#[derive(Debug)]
pub struct GeneratedApiKey {
    pub record: ApiKeyRecord,
    pub plaintext: String,
}

/// A key that passed validation, joined to its live owner.
#[derive(Debug)]
pub struct ValidatedApiKey {
    pub key_id: Uuid,
    pub user: UserRecord,
}

#[derive(Clone)]
pub struct ApiKeyManager {
    pool: PgPool,
    users: UserStore,
}

impl ApiKeyManager {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let users = UserStore::new(pool.clone());
        Self { pool, users }
    }

    /// Create a key for `user_id` and return the plaintext exactly once.
    ///
    /// The acting user must exist and be active. Keys are only mintable
    /// through a session-authenticated request; the HTTP layer enforces
    /// that a leaked key cannot mint further keys.
    ///
    /// # Errors
    /// `UserNotFound` / `AccountDisabled` for a bad acting user, otherwise
    /// internal failures from the database.
    pub async fn create_api_key(
        &self,
        user_id: Uuid,
        name: Option<String>,
        expires_at_unix: Option<i64>,
    ) -> Result<GeneratedApiKey, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        let prefix = derive_key_prefix(&user.email);
        let query = r#"
            INSERT INTO api_keys (user_id, name, key_hash, expires_at)
            VALUES ($1, $2, $3, to_timestamp($4))
            RETURNING
                id,
                to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
                CASE
                    WHEN expires_at IS NULL THEN NULL
                    ELSE to_char(expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
                END AS expires_at
        "#;
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );

        // Hash collisions are vanishingly rare; the retry covers the unique
        // index on key_hash all the same.
        for _ in 0..3 {
            let body = generate_api_key_body().map_err(AuthError::Internal)?;
            let plaintext = if prefix.is_empty() {
                body
            } else {
                format!("{prefix}_{body}")
            };
            let key_hash = hash_api_key(&plaintext);

            let row = sqlx::query(query)
                .bind(user_id)
                .bind(name.as_deref())
                .bind(&key_hash)
                .bind(expires_at_unix)
                .fetch_one(&self.pool)
                .instrument(span.clone())
                .await;

            match row {
                Ok(row) => {
                    let record = ApiKeyRecord {
                        id: row.get("id"),
                        user_id,
                        name: name.clone(),
                        fingerprint: key_fingerprint(&key_hash),
                        created_at: row.get("created_at"),
                        last_used_at: None,
                        expires_at: row.get("expires_at"),
                    };
                    return Ok(GeneratedApiKey { record, plaintext });
                }
                Err(err) if is_unique_violation(&err) => {}
                Err(err) => {
                    return Err(AuthError::Internal(
                        anyhow::Error::new(err).context("failed to insert API key"),
                    ))
                }
            }
        }

        Err(AuthError::Internal(anyhow!(
            "failed to generate unique API key"
        )))
    }

    /// Validate a presented plaintext key.
    ///
    /// Malformed input is rejected before any store access. On success the
    /// key's live owner is returned; every failure mode collapses to
    /// `Ok(None)` so callers cannot enumerate keys.
    pub async fn validate_api_key(&self, plaintext: &str) -> Result<Option<ValidatedApiKey>> {
        if !valid_api_key_format(plaintext) {
            return Ok(None);
        }
        let key_hash = hash_api_key(plaintext);

        let query = r"
            SELECT
                api_keys.id AS key_id,
                api_keys.key_hash,
                users.id,
                users.email,
                users.display_name,
                users.roles,
                users.is_active
            FROM api_keys
            JOIN users ON users.id = api_keys.user_id
            WHERE api_keys.key_hash = $1
              AND (api_keys.expires_at IS NULL OR api_keys.expires_at > NOW())
              AND users.is_active
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&key_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup API key")?;

        let Some(row) = row else {
            return Ok(None);
        };

        // The lookup is already exact-match; this guards any future
        // non-indexed comparison path against timing side-channels.
        let stored_hash: String = row.get("key_hash");
        if !ct_eq(key_hash.as_bytes(), stored_hash.as_bytes()) {
            return Ok(None);
        }

        let stored_roles: Vec<String> = row.get("roles");
        Ok(Some(ValidatedApiKey {
            key_id: row.get("key_id"),
            user: UserRecord {
                id: row.get("id"),
                email: row.get("email"),
                display_name: row.get("display_name"),
                roles: super::roles::parse_roles(&stored_roles),
                is_active: row.get("is_active"),
            },
        }))
    }

    /// Best-effort last-used bump; failures are logged and swallowed so
    /// authentication never fails over bookkeeping.
    pub async fn update_last_used(&self, key_id: Uuid) {
        let query = "UPDATE api_keys SET last_used_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        if let Err(err) = sqlx::query(query)
            .bind(key_id)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            error!("Failed to update API key last_used_at: {err}");
        }
    }

    /// Launch `update_last_used` without awaiting it.
    pub fn spawn_update_last_used(&self, key_id: Uuid) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.update_last_used(key_id).await;
        });
    }

    /// List the user's keys, newest first, fingerprints only.
    pub async fn list_user_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyRecord>> {
        let query = r#"
            SELECT
                id,
                user_id,
                name,
                RIGHT(key_hash, 6) AS fingerprint,
                to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
                CASE
                    WHEN last_used_at IS NULL THEN NULL
                    ELSE to_char(last_used_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
                END AS last_used_at,
                CASE
                    WHEN expires_at IS NULL THEN NULL
                    ELSE to_char(expires_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"')
                END AS expires_at
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
        "#;
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list API keys")?;

        Ok(rows
            .into_iter()
            .map(|row| ApiKeyRecord {
                id: row.get("id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                fingerprint: row.get("fingerprint"),
                created_at: row.get("created_at"),
                last_used_at: row.get("last_used_at"),
                expires_at: row.get("expires_at"),
            })
            .collect())
    }

    /// Delete one key if it belongs to `user_id`. Ownership is part of the
    /// delete predicate, so there is no check-then-act race.
    pub async fn delete_api_key(&self, key_id: Uuid, user_id: Uuid) -> Result<bool> {
        let query = "DELETE FROM api_keys WHERE id = $1 AND user_id = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(key_id)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete API key")?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every key owned by `user_id`; returns how many were removed.
    pub async fn delete_all_user_api_keys(&self, user_id: Uuid) -> Result<u64> {
        let query = "DELETE FROM api_keys WHERE user_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete user API keys")?;
        Ok(result.rows_affected())
    }

    /// Remove keys past their expiry. Intended for periodic invocation;
    /// failures are logged and reported as zero removals.
    pub async fn cleanup_expired_api_keys(&self) -> u64 {
        let query = "DELETE FROM api_keys WHERE expires_at IS NOT NULL AND expires_at <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        match sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
        {
            Ok(result) => result.rows_affected(),
            Err(err) => {
                error!("Failed to clean up expired API keys: {err}");
                0
            }
        }
    }
}

/// Periodically sweep expired keys in the background.
pub fn spawn_expiry_sweeper(manager: ApiKeyManager, interval_seconds: u64) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = manager.cleanup_expired_api_keys().await;
            if removed > 0 {
                tracing::info!(removed, "expired API keys removed");
            }
        }
    });
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
