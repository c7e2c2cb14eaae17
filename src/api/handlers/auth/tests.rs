//! Session lifecycle tests over the in-memory store with simulated time.

use anyhow::{Context, Result};
use std::sync::Arc;
use uuid::Uuid;

use super::roles::Role;
use super::sessions::{SessionManager, SessionMetadata};
use super::store::{ManualClock, MemoryStore};

const TTL: i64 = 86_400;
const RENEWAL_THRESHOLD: i64 = 3_600;
const START: i64 = 1_700_000_000;

fn manager_with_clock() -> (SessionManager, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let manager = SessionManager::new(store, TTL, RENEWAL_THRESHOLD).with_clock(clock.clone());
    (manager, clock)
}

fn metadata() -> SessionMetadata {
    SessionMetadata {
        ip: Some("203.0.113.7".to_string()),
        user_agent: Some("gardisto-tests".to_string()),
        country: Some("EO".to_string()),
    }
}

#[tokio::test]
async fn fresh_session_has_aligned_timestamps() -> Result<()> {
    let (manager, _clock) = manager_with_clock();
    let user = Uuid::new_v4();

    let token = manager
        .create_session(user, vec![Role::User], metadata())
        .await?;
    let record = manager
        .get_session(&token)
        .await?
        .context("session should exist right after creation")?;

    assert_eq!(record.user_id, user);
    assert_eq!(record.roles, vec![Role::User]);
    assert_eq!(record.created_at, START);
    assert_eq!(record.last_used_at, record.created_at);
    assert_eq!(record.expires_at, record.created_at + TTL);
    assert_eq!(record.ip.as_deref(), Some("203.0.113.7"));
    Ok(())
}

#[tokio::test]
async fn read_within_renewal_window_is_idempotent() -> Result<()> {
    let (manager, clock) = manager_with_clock();
    let token = manager
        .create_session(Uuid::new_v4(), vec![Role::User], SessionMetadata::default())
        .await?;

    clock.advance(RENEWAL_THRESHOLD - 1);
    let record = manager
        .get_session(&token)
        .await?
        .context("session should still exist")?;
    assert_eq!(record.last_used_at, START);
    assert_eq!(record.expires_at, START + TTL);

    // A second read inside the window changes nothing either.
    let record = manager
        .get_session(&token)
        .await?
        .context("session should still exist")?;
    assert_eq!(record.expires_at, START + TTL);
    Ok(())
}

#[tokio::test]
async fn read_past_threshold_slides_expiry_forward() -> Result<()> {
    let (manager, clock) = manager_with_clock();
    let token = manager
        .create_session(Uuid::new_v4(), vec![Role::User], SessionMetadata::default())
        .await?;

    clock.advance(RENEWAL_THRESHOLD + 1);
    let read_time = START + RENEWAL_THRESHOLD + 1;
    let record = manager
        .get_session(&token)
        .await?
        .context("session should still exist")?;
    assert_eq!(record.last_used_at, read_time);
    assert_eq!(record.expires_at, read_time + TTL);

    // The renewal was persisted, not just returned.
    let record = manager
        .get_session(&token)
        .await?
        .context("session should still exist")?;
    assert_eq!(record.expires_at, read_time + TTL);
    Ok(())
}

#[tokio::test]
async fn expired_session_is_gone() -> Result<()> {
    let (manager, clock) = manager_with_clock();
    let token = manager
        .create_session(Uuid::new_v4(), vec![Role::User], SessionMetadata::default())
        .await?;

    clock.advance(TTL + 1);
    assert!(manager.get_session(&token).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn record_past_expiry_is_discarded_on_read() -> Result<()> {
    // The store TTL normally removes expired records; plant one whose
    // payload says expired while the store entry is still alive to cover
    // the defensive read-time path.
    let (manager, _clock) = manager_with_clock();
    let user = Uuid::new_v4();
    let record = super::sessions::SessionRecord {
        user_id: user,
        roles: vec![Role::User],
        created_at: START - TTL - 10,
        last_used_at: START - TTL - 10,
        expires_at: START - 10,
        ip: None,
        user_agent: None,
        country: None,
    };
    let payload = serde_json::to_string(&record)?;
    manager
        .store()
        .set_with_ttl("session:planted", &payload, TTL)
        .await?;

    assert!(manager.get_session("planted").await?.is_none());
    // The defensive cleanup removed the stale entry itself.
    assert!(manager.store().get("session:planted").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn deleted_session_is_unfindable_and_unlisted() -> Result<()> {
    let (manager, _clock) = manager_with_clock();
    let user = Uuid::new_v4();
    let token = manager
        .create_session(user, vec![Role::User], SessionMetadata::default())
        .await?;

    manager.delete_session(&token).await?;
    assert!(manager.get_session(&token).await?.is_none());
    assert!(manager.list_user_sessions(user).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_session_is_idempotent() -> Result<()> {
    let (manager, _clock) = manager_with_clock();
    let token = manager
        .create_session(Uuid::new_v4(), vec![Role::User], SessionMetadata::default())
        .await?;
    manager.delete_session(&token).await?;
    manager.delete_session(&token).await?;
    Ok(())
}

#[tokio::test]
async fn two_sessions_listed_and_individually_revocable() -> Result<()> {
    let (manager, clock) = manager_with_clock();
    let user = Uuid::new_v4();

    let first = manager
        .create_session(user, vec![Role::User], SessionMetadata::default())
        .await?;
    clock.advance(5);
    let second = manager
        .create_session(user, vec![Role::User], SessionMetadata::default())
        .await?;
    assert_ne!(first, second);

    let listed = manager.list_user_sessions(user).await?;
    assert_eq!(listed.len(), 2);
    // Most recently used first.
    assert_eq!(listed[0].token, second);
    assert_eq!(listed[1].token, first);

    manager.delete_session(&first).await?;
    let listed = manager.list_user_sessions(user).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].token, second);
    Ok(())
}

#[tokio::test]
async fn delete_all_user_sessions_empties_listing() -> Result<()> {
    let (manager, _clock) = manager_with_clock();
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();

    for _ in 0..3 {
        manager
            .create_session(user, vec![Role::User], SessionMetadata::default())
            .await?;
    }
    let other_token = manager
        .create_session(other, vec![Role::User], SessionMetadata::default())
        .await?;

    manager.delete_all_user_sessions(user).await?;
    assert!(manager.list_user_sessions(user).await?.is_empty());
    // Unrelated users are untouched.
    assert!(manager.get_session(&other_token).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn listing_prunes_index_entries_without_records() -> Result<()> {
    let (manager, _clock) = manager_with_clock();
    let user = Uuid::new_v4();
    let token = manager
        .create_session(user, vec![Role::User], SessionMetadata::default())
        .await?;

    // Simulate the record expiring while the index entry survives.
    manager.store().delete(&format!("session:{token}")).await?;

    assert!(manager.list_user_sessions(user).await?.is_empty());
    assert!(manager
        .store()
        .set_members(&format!("user-sessions:{user}"))
        .await?
        .is_empty());
    Ok(())
}
