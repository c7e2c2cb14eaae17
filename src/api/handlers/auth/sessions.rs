//! Session lifecycle against the credential store.
//!
//! Sessions are opaque random tokens naming JSON records under
//! `session:{token}`, with a per-user index set under
//! `user-sessions:{user_id}`. The store's native TTL removes expired
//! records; reads still check `expires_at` defensively and prune index
//! entries whose record has vanished.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::roles::Role;
use super::store::{Clock, CredentialStore, SystemClock};
use super::utils::{generate_session_token, token_prefix};

/// Optional fingerprint metadata captured when a session is created.
#[derive(Clone, Debug, Default)]
pub struct SessionMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
}

/// Session record as persisted in the credential store.
///
/// Timestamps are unix seconds; the record's remaining store TTL always
/// equals `expires_at - now` at write time. `roles` is a snapshot taken at
/// creation and is not authoritative for authorization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub roles: Vec<Role>,
    pub created_at: i64,
    pub last_used_at: i64,
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// A session paired with its token for enumeration and revocation APIs.
/// The token doubles as the session's public identifier.
#[derive(Clone, Debug)]
pub struct ListedSession {
    pub token: String,
    pub record: SessionRecord,
}

pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
    renewal_threshold_seconds: i64,
}

impl SessionManager {
    /// Build a manager over `store`. `renewal_threshold_seconds` must be
    /// strictly smaller than `ttl_seconds` or sessions could expire between
    /// renewals; the server wiring validates this at startup.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        ttl_seconds: i64,
        renewal_threshold_seconds: i64,
    ) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ttl_seconds,
            renewal_threshold_seconds,
        }
    }

    /// Replace the clock; tests drive expiry with simulated time.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    fn session_key(token: &str) -> String {
        format!("session:{token}")
    }

    fn index_key(user_id: Uuid) -> String {
        format!("user-sessions:{user_id}")
    }

    /// Issue a new session for `user_id` and return its token.
    ///
    /// # Errors
    /// Fails when the credential store is unreachable; callers surface this
    /// as an internal error without retrying.
    pub async fn create_session(
        &self,
        user_id: Uuid,
        roles: Vec<Role>,
        metadata: SessionMetadata,
    ) -> Result<String> {
        let now = self.clock.now_unix();
        let token = generate_session_token()?;
        let record = SessionRecord {
            user_id,
            roles,
            created_at: now,
            last_used_at: now,
            expires_at: now + self.ttl_seconds,
            ip: metadata.ip,
            user_agent: metadata.user_agent,
            country: metadata.country,
        };
        let payload = serde_json::to_string(&record).context("failed to serialize session")?;

        self.store
            .set_with_ttl(&Self::session_key(&token), &payload, self.ttl_seconds)
            .await
            .context("failed to write session record")?;
        self.store
            .set_add(&Self::index_key(user_id), &token, self.ttl_seconds)
            .await
            .context("failed to index session")?;

        debug!(
            token = token_prefix(&token),
            user_id = %user_id,
            "session created"
        );
        Ok(token)
    }

    /// Resolve a token to its record, applying sliding expiration.
    ///
    /// Returns `None` for unknown and expired tokens alike. When the time
    /// since `last_used_at` has reached the renewal threshold, the record is
    /// rewritten with a fresh TTL before this call returns; a failed renewal
    /// is logged and does not fail the read.
    pub async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let key = Self::session_key(token);
        let Some(payload) = self
            .store
            .get(&key)
            .await
            .context("failed to read session record")?
        else {
            return Ok(None);
        };

        let mut record: SessionRecord = match serde_json::from_str(&payload) {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    token = token_prefix(token),
                    "dropping undecodable session record: {err}"
                );
                self.discard(token, None).await;
                return Ok(None);
            }
        };

        let now = self.clock.now_unix();
        if record.expires_at <= now {
            // The store's TTL normally removes these before we see them.
            self.discard(token, Some(record.user_id)).await;
            return Ok(None);
        }

        if now - record.last_used_at >= self.renewal_threshold_seconds {
            record.last_used_at = now;
            record.expires_at = now + self.ttl_seconds;
            if let Err(err) = self.renew(token, &record).await {
                warn!(
                    token = token_prefix(token),
                    "failed to renew session: {err:#}"
                );
            }
        }

        Ok(Some(record))
    }

    async fn renew(&self, token: &str, record: &SessionRecord) -> Result<()> {
        let payload = serde_json::to_string(record).context("failed to serialize session")?;
        self.store
            .set_with_ttl(&Self::session_key(token), &payload, self.ttl_seconds)
            .await
            .context("failed to rewrite session record")?;
        self.store
            .set_add(&Self::index_key(record.user_id), token, self.ttl_seconds)
            .await
            .context("failed to refresh session index")?;
        Ok(())
    }

    /// Best-effort removal of a dead record and its index entry.
    async fn discard(&self, token: &str, owner: Option<Uuid>) {
        if let Err(err) = self.store.delete(&Self::session_key(token)).await {
            warn!(
                token = token_prefix(token),
                "failed to delete expired session: {err}"
            );
        }
        if let Some(user_id) = owner {
            if let Err(err) = self
                .store
                .set_remove(&Self::index_key(user_id), token)
                .await
            {
                warn!(
                    token = token_prefix(token),
                    "failed to unindex expired session: {err}"
                );
            }
        }
    }

    /// Revoke one session. Idempotent: deleting an unknown token is a no-op,
    /// and index cleanup is skipped when the record is already gone.
    pub async fn delete_session(&self, token: &str) -> Result<()> {
        let key = Self::session_key(token);
        if let Some(payload) = self
            .store
            .get(&key)
            .await
            .context("failed to read session record")?
        {
            if let Ok(record) = serde_json::from_str::<SessionRecord>(&payload) {
                if let Err(err) = self
                    .store
                    .set_remove(&Self::index_key(record.user_id), token)
                    .await
                {
                    warn!(
                        token = token_prefix(token),
                        "failed to unindex session: {err}"
                    );
                }
            }
        }
        self.store
            .delete(&key)
            .await
            .context("failed to delete session record")?;
        debug!(token = token_prefix(token), "session deleted");
        Ok(())
    }

    /// Revoke every session belonging to `user_id`, then drop the index.
    ///
    /// A concurrent `get_session` during the sweep sees either a live
    /// session or none; partial visibility is accepted.
    pub async fn delete_all_user_sessions(&self, user_id: Uuid) -> Result<()> {
        let index = Self::index_key(user_id);
        let tokens = self
            .store
            .set_members(&index)
            .await
            .context("failed to enumerate user sessions")?;
        let keys: Vec<String> = tokens.iter().map(|token| Self::session_key(token)).collect();
        self.store
            .delete_many(&keys)
            .await
            .context("failed to delete user sessions")?;
        self.store
            .delete(&index)
            .await
            .context("failed to delete session index")?;
        debug!(user_id = %user_id, count = tokens.len(), "deleted all user sessions");
        Ok(())
    }

    /// Enumerate the user's active sessions, most recently used first.
    ///
    /// Index entries whose record already expired are silently skipped and
    /// pruned from the index.
    pub async fn list_user_sessions(&self, user_id: Uuid) -> Result<Vec<ListedSession>> {
        let index = Self::index_key(user_id);
        let tokens = self
            .store
            .set_members(&index)
            .await
            .context("failed to enumerate user sessions")?;

        let now = self.clock.now_unix();
        let mut sessions = Vec::with_capacity(tokens.len());
        for token in tokens {
            let payload = self
                .store
                .get(&Self::session_key(&token))
                .await
                .context("failed to read session record")?;
            let record = payload.and_then(|payload| {
                serde_json::from_str::<SessionRecord>(&payload)
                    .ok()
                    .filter(|record| record.expires_at > now)
            });
            match record {
                Some(record) => sessions.push(ListedSession { token, record }),
                None => {
                    // Record vanished between index read and record read.
                    if let Err(err) = self.store.set_remove(&index, &token).await {
                        warn!(
                            token = token_prefix(&token),
                            "failed to prune stale index entry: {err}"
                        );
                    }
                }
            }
        }
        sessions.sort_by(|a, b| b.record.last_used_at.cmp(&a.record.last_used_at));
        Ok(sessions)
    }
}
