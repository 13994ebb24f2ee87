use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::time::timeout;

use crate::config::PollConfig;
use crate::error::{NotificationError, Result};
use crate::metrics::PollMetrics;
use crate::notification::NotificationService;

use super::{
    subscriber_key, PollItem, PollOptions, PollSubscription, Publisher, Subscriber, Subscription,
};

struct Registration<T: PollItem> {
    subscriber: Arc<dyn Subscriber<T>>,
    subscription: Arc<PollSubscription<T>>,
}

/// Outcome of [`PollService::shutdown`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownResult {
    /// Subscriptions that were cancelled
    pub cancelled: usize,
    /// Whether every subscription closed before the timeout
    pub all_closed: bool,
    pub duration: Duration,
}

/// Poll service: the registry of active subscriptions.
///
/// Subscriptions are keyed by subscriber identity, so a subscriber can hold
/// at most one active subscription per service. The registry keeps the
/// subscriber alive while it is subscribed; the subscription itself only
/// holds weak references back to the subscriber and this service.
pub struct PollService<T: PollItem> {
    me: Weak<PollService<T>>,
    registry: DashMap<usize, Registration<T>>,
    service: Arc<NotificationService>,
    options: PollOptions,
}

impl<T: PollItem> PollService<T> {
    pub fn new(service: Arc<NotificationService>, options: PollOptions) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            registry: DashMap::new(),
            service,
            options,
        })
    }

    pub fn from_config(service: Arc<NotificationService>, config: &PollConfig) -> Arc<Self> {
        Self::new(service, PollOptions::from(config))
    }

    pub fn notification_service(&self) -> &Arc<NotificationService> {
        &self.service
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Active subscription for a subscriber, if any
    pub fn subscription_for(
        &self,
        subscriber: &Arc<dyn Subscriber<T>>,
    ) -> Option<Arc<PollSubscription<T>>> {
        self.registry
            .get(&subscriber_key(subscriber))
            .map(|r| r.subscription.clone())
    }

    /// Cancel every subscription and wait, bounded by `wait`, for them to close
    pub async fn shutdown(&self, wait: Duration) -> ShutdownResult {
        let start = Instant::now();
        let subscriptions: Vec<Arc<PollSubscription<T>>> = self
            .registry
            .iter()
            .map(|r| r.subscription.clone())
            .collect();
        let cancelled = subscriptions.len();

        tracing::info!(subscriptions = cancelled, "Shutting down poll service");

        for subscription in &subscriptions {
            subscription.cancel();
        }

        let all_closed = timeout(
            wait,
            join_all(subscriptions.iter().map(|s| s.closed())),
        )
        .await
        .is_ok();

        if !all_closed {
            tracing::warn!(
                timeout_ms = wait.as_millis() as u64,
                "Timed out waiting for subscriptions to close"
            );
        }

        ShutdownResult {
            cancelled,
            all_closed,
            duration: start.elapsed(),
        }
    }

    fn remove(&self, key: usize) -> Option<Registration<T>> {
        let removed = self.registry.remove(&key).map(|(_, r)| r);
        if let Some(registration) = &removed {
            PollMetrics::subscription_closed();
            tracing::info!(
                subscription_id = %registration.subscription.id(),
                subscribers = self.registry.len(),
                "Subscriber unsubscribed"
            );
        }
        removed
    }
}

impl<T: PollItem> Publisher<T> for PollService<T> {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Result<Arc<PollSubscription<T>>> {
        let key = subscriber_key(&subscriber);
        let publisher: Weak<dyn Publisher<T>> = self.me.clone();
        let subscription = PollSubscription::new(
            publisher,
            Arc::downgrade(&subscriber),
            self.service.clone(),
            self.options.clone(),
        )?;

        match self.registry.entry(key) {
            Entry::Occupied(_) => return Err(NotificationError::AlreadySubscribed),
            Entry::Vacant(slot) => {
                slot.insert(Registration {
                    subscriber: subscriber.clone(),
                    subscription: subscription.clone(),
                });
            }
        }
        PollMetrics::subscription_opened();

        tracing::info!(
            subscription_id = %subscription.id(),
            subscribers = self.registry.len(),
            "Subscriber subscribed"
        );

        if let Err(e) = subscriber.on_subscribe(subscription.clone()) {
            tracing::warn!(
                subscription_id = %subscription.id(),
                code = e.code(),
                error = %e,
                "Subscriber rejected subscription"
            );
            self.remove(key);
            subscription.reject();
            return Err(e);
        }

        Ok(subscription)
    }

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber<T>>) -> Result<()> {
        if let Some(registration) = self.remove(subscriber_key(subscriber)) {
            registration.subscription.cancel();
        }
        Ok(())
    }

    fn number_of_subscribers(&self) -> usize {
        self.registry.len()
    }

    fn subscribers(&self) -> Vec<Arc<dyn Subscriber<T>>> {
        self.registry.iter().map(|r| r.subscriber.clone()).collect()
    }
}
