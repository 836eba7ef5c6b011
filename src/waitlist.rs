use crate::domain::NewSubscriber;
use crate::fallback::FallbackLog;
use crate::retry::RetryPolicy;
use crate::store::{InsertOutcome, StoreError, SubscriberStore};

/// Single entry point for persisting signups.
///
/// Inserts go to the store through the retry policy. When the store stays
/// unreachable and a fallback log is configured, the signup is queued there
/// instead of being lost.
pub struct Waitlist {
    store: Option<SubscriberStore>,
    fallback: Option<FallbackLog>,
    retry_policy: RetryPolicy,
}

impl Waitlist {
    pub fn new(
        store: Option<SubscriberStore>,
        fallback: Option<FallbackLog>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            fallback,
            retry_policy,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&SubscriberStore, StoreError> {
        self.store.as_ref().ok_or(StoreError::NotConfigured)
    }

    /// Inserts through the retry policy. A retry only follows an
    /// unavailable store, and the lost attempt may still have written the
    /// row, so a duplicate on a later attempt counts as our own insert.
    async fn insert(
        &self,
        store: &SubscriberStore,
        subscriber: &NewSubscriber,
    ) -> Result<InsertOutcome, StoreError> {
        self.retry_policy
            .run(move |attempt| async move {
                match store.insert(subscriber).await {
                    Ok(InsertOutcome::Duplicate) if attempt > 1 => {
                        tracing::info!(
                            attempt,
                            "Duplicate after an unavailable attempt, treating it as inserted"
                        );
                        Ok(InsertOutcome::Inserted)
                    }
                    outcome => outcome,
                }
            })
            .await
    }

    #[tracing::instrument(name = "Adding subscriber to the waitlist", skip(self, subscriber))]
    pub async fn add(&self, subscriber: &NewSubscriber) -> Result<InsertOutcome, StoreError> {
        let store = self.store()?;
        match self.insert(store, subscriber).await {
            Err(StoreError::Unavailable(e)) => match &self.fallback {
                Some(fallback) => match fallback.append(subscriber).await {
                    Ok(()) => {
                        tracing::warn!(
                            path = %fallback.path().display(),
                            error.cause_chain = ?e,
                            "Store unreachable, subscriber queued locally"
                        );
                        Ok(InsertOutcome::Queued)
                    }
                    Err(fallback_error) => {
                        tracing::error!(
                            error.cause_chain = ?fallback_error,
                            "Failed to queue subscriber locally"
                        );
                        Err(StoreError::Unavailable(e))
                    }
                },
                None => Err(StoreError::Unavailable(e)),
            },
            outcome => outcome,
        }
    }

    /// Like [`Waitlist::add`] but never queues locally.
    #[tracing::instrument(name = "Syncing subscriber into the store", skip(self, subscriber))]
    pub async fn sync(&self, subscriber: &NewSubscriber) -> Result<InsertOutcome, StoreError> {
        let store = self.store()?;
        self.insert(store, subscriber).await
    }
}
