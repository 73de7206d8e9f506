use crate::services::idempotency::IdempotencyKey;
use crate::services::traits::{IdempotencyError, IdempotencyStore};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of offering an event to the deduplicator
pub enum Admission {
    Accepted(AdmissionGuard),
    RejectedDuplicate,
}

/// Admits each event id at most once across all instances sharing the store
#[derive(Clone)]
pub struct EventDeduplicator {
    store: Arc<dyn IdempotencyStore>,
    in_flight_ttl: Duration,
    processed_ttl: Duration,
}

impl EventDeduplicator {
    /// `in_flight_ttl` bounds how long a crashed worker can block redelivery;
    /// `processed_ttl` is how long replays of a finished event are rejected.
    pub fn new(store: Arc<dyn IdempotencyStore>, in_flight_ttl: Duration, processed_ttl: Duration) -> Self {
        Self {
            store,
            in_flight_ttl,
            processed_ttl,
        }
    }

    pub async fn admit(&self, event_id: &str) -> Result<Admission, IdempotencyError> {
        let key = IdempotencyKey::event(event_id);

        if !self.store.try_claim(&key, self.in_flight_ttl).await? {
            return Ok(Admission::RejectedDuplicate);
        }

        Ok(Admission::Accepted(AdmissionGuard {
            store: self.store.clone(),
            key,
            processed_ttl: self.processed_ttl,
            armed: true,
        }))
    }
}

/// Claim on an admitted event
///
/// Must end in [`complete`](Self::complete) or [`release`](Self::release).
/// Dropping an armed guard (the request was cancelled) releases the claim in
/// the background.
pub struct AdmissionGuard {
    store: Arc<dyn IdempotencyStore>,
    key: String,
    processed_ttl: Duration,
    armed: bool,
}

impl AdmissionGuard {
    /// Record success so every later delivery is rejected. The write is tried
    /// twice; on failure the claim stays in flight until its TTL runs out.
    pub async fn complete(mut self) -> Result<(), IdempotencyError> {
        self.armed = false;
        match self.store.mark_processed(&self.key, self.processed_ttl).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Failed to mark {} as processed, retrying: {}", self.key, e);
                self.store.mark_processed(&self.key, self.processed_ttl).await
            }
        }
    }

    /// Give the event back so a redelivery can retry it
    pub async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.store.release(&self.key).await {
            tracing::warn!("Failed to release idempotency key {}, it will expire instead: {}", self.key, e);
        }
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Abandoned event, releasing {}", key);
                handle.spawn(async move {
                    if let Err(e) = store.release(&key).await {
                        tracing::warn!("Failed to release idempotency key {}: {}", key, e);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime to release {}, it will expire instead", key),
        }
    }
}
