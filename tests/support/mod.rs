#![allow(dead_code)]
//! Shared helpers for the integration tests: a throwaway database per test and an in-memory message channel.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use delivery_pool_engine::{
    db_types::{Patron, PatronId},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{MessageChannel, MessageChannelError, PatronManagement},
    SqliteDatabase,
};

/// Creates and migrates a fresh throwaway database for one test.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url).await.expect("Error creating connection to database")
}

/// Registers the patron and activates them at the given time.
pub async fn active_patron(db: &SqliteDatabase, id: &str, activated_at: DateTime<Utc>) -> Patron {
    let id = PatronId::from(id);
    let _ = db.fetch_or_create_patron(&id).await.expect("Error creating patron");
    db.activate_patron(&id, activated_at).await.expect("Error activating patron")
}

/// An in-memory [`MessageChannel`] that records every delivered message and can be configured to fail or stall.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    sent: Arc<Mutex<Vec<(PatronId, String)>>>,
    fail_with: Option<String>,
    delay: Option<std::time::Duration>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose every delivery attempt fails with the given message.
    pub fn failing(msg: &str) -> Self {
        Self { fail_with: Some(msg.to_string()), ..Self::default() }
    }

    /// A channel that sleeps for `delay` before delivering.
    pub fn slow(delay: std::time::Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn messages(&self) -> Vec<(PatronId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn deliver_direct_message(&self, to: &PatronId, body: &str) -> Result<(), MessageChannelError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(msg) = &self.fail_with {
            return Err(MessageChannelError::DeliveryFailed(msg.clone()));
        }
        self.sent.lock().unwrap().push((to.clone(), body.to_string()));
        Ok(())
    }
}
