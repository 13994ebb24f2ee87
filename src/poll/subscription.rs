use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::config::PollConfig;
use crate::error::{NotificationError, Result};
use crate::metrics::PollMetrics;
use crate::notification::NotificationService;

use super::{PollItem, Publisher, Subscriber, Subscription};

/// Lifecycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    /// Registered, waiting for `request`
    Created = 0,
    /// Poll task running
    Polling = 1,
    /// Cancelled; terminal
    Terminated = 2,
}

impl From<u8> for SubscriptionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SubscriptionState::Created,
            1 => SubscriptionState::Polling,
            _ => SubscriptionState::Terminated,
        }
    }
}

/// Poll loop tuning shared by every subscription of a publisher
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Consecutive fetch failures before the subscription cancels itself (0 = never)
    pub max_consecutive_failures: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollOptions {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

enum CycleOutcome {
    Continue,
    Stop,
}

/// Subscription driving one cancellable poll task.
///
/// Holds only weak references to its publisher and subscriber. The
/// `on_complete` signal is emitted by the poll task once its in-flight
/// cycle has finished, or directly by `cancel` if polling never started.
pub struct PollSubscription<T: PollItem> {
    id: Uuid,
    me: Weak<PollSubscription<T>>,
    publisher: Weak<dyn Publisher<T>>,
    subscriber: Weak<dyn Subscriber<T>>,
    service: Arc<NotificationService>,
    options: PollOptions,
    state: AtomicU8,
    demand: AtomicI64,
    /// Subscriber captured at cancellation, consumed when `on_complete` fires
    completion: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    wake: Notify,
    closed: watch::Sender<bool>,
}

impl<T: PollItem> PollSubscription<T> {
    pub fn new(
        publisher: Weak<dyn Publisher<T>>,
        subscriber: Weak<dyn Subscriber<T>>,
        service: Arc<NotificationService>,
        options: PollOptions,
    ) -> Result<Arc<Self>> {
        if publisher.upgrade().is_none() {
            return Err(NotificationError::validation("publisher is required"));
        }
        if subscriber.upgrade().is_none() {
            return Err(NotificationError::validation("subscriber is required"));
        }
        if options.interval.is_zero() {
            return Err(NotificationError::validation("polling interval must be positive"));
        }

        let (closed, _) = watch::channel(false);
        Ok(Arc::new_cyclic(|me| Self {
            id: Uuid::new_v4(),
            me: me.clone(),
            publisher,
            subscriber,
            service,
            options,
            state: AtomicU8::new(SubscriptionState::Created as u8),
            demand: AtomicI64::new(0),
            completion: Mutex::new(None),
            wake: Notify::new(),
            closed,
        }))
    }

    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == SubscriptionState::Terminated
    }

    /// Demand recorded by the first `request`, 0 before that
    pub fn demand(&self) -> i64 {
        self.demand.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> Duration {
        self.options.interval
    }

    /// Wait until the subscription has terminated and `on_complete` was emitted
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Terminate without `on_complete` or unsubscribing; used when the
    /// subscriber rejected the subscription in `on_subscribe`
    pub(crate) fn reject(&self) {
        self.terminate(None);
    }

    /// Move to TERMINATED and stop the poll task. `completion` receives
    /// `on_complete` once the task is done. Returns the previous state, or
    /// `None` if the subscription was already terminated.
    fn terminate(&self, completion: Option<Arc<dyn Subscriber<T>>>) -> Option<SubscriptionState> {
        let previous = {
            let mut slot = self.completion.lock();
            let previous = SubscriptionState::from(
                self.state
                    .swap(SubscriptionState::Terminated as u8, Ordering::AcqRel),
            );
            if previous == SubscriptionState::Terminated {
                return None;
            }
            *slot = completion;
            previous
        };

        tracing::info!(subscription_id = %self.id, from = ?previous, "Subscription cancelled");

        match previous {
            SubscriptionState::Created => self.finish(),
            _ => self.wake.notify_one(),
        }
        Some(previous)
    }

    async fn run(self: Arc<Self>, demand: i64) {
        tracing::info!(
            subscription_id = %self.id,
            demand = demand,
            interval_ms = self.options.interval.as_millis() as u64,
            "Polling started"
        );

        let mut failures = 0u32;
        loop {
            if self.is_terminated() {
                break;
            }

            if let CycleOutcome::Stop = self.run_cycle(demand, &mut failures).await {
                self.cancel();
                break;
            }

            if self.is_terminated() {
                break;
            }

            tokio::select! {
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.options.interval) => {}
            }
        }

        self.finish();
        tracing::info!(subscription_id = %self.id, "Polling stopped");
    }

    async fn run_cycle(&self, demand: i64, failures: &mut u32) -> CycleOutcome {
        let Some(subscriber) = self.subscriber.upgrade() else {
            tracing::debug!(subscription_id = %self.id, "Subscriber dropped, stopping poll loop");
            return CycleOutcome::Stop;
        };

        match self.service.fetch_demand(demand).await {
            Ok(batch) if batch.is_empty() => {
                *failures = 0;
                PollMetrics::record_empty_cycle();
            }
            Ok(batch) => {
                *failures = 0;
                let count = batch.len();
                // The cursor already covers the whole page, so it is delivered
                // in full even if the subscription is cancelled part way.
                for item in T::from_batch(batch) {
                    subscriber.on_next(item).await;
                }
                PollMetrics::record_delivered_cycle(count);
                tracing::debug!(subscription_id = %self.id, count = count, "Delivered notifications");
            }
            Err(e) => {
                *failures += 1;
                PollMetrics::record_failed_cycle();
                tracing::warn!(
                    subscription_id = %self.id,
                    error = %e,
                    consecutive_failures = *failures,
                    "Notification fetch failed"
                );

                if !self.is_terminated() {
                    subscriber.on_error(NotificationError::Fetch(e)).await;
                }

                let max = self.options.max_consecutive_failures;
                if max > 0 && *failures >= max {
                    tracing::warn!(
                        subscription_id = %self.id,
                        consecutive_failures = *failures,
                        "Too many consecutive fetch failures, cancelling subscription"
                    );
                    return CycleOutcome::Stop;
                }
            }
        }

        CycleOutcome::Continue
    }

    /// Emit `on_complete` (once) and release anyone waiting on `closed`
    fn finish(&self) {
        if let Some(subscriber) = self.completion.lock().take() {
            subscriber.on_complete();
        }
        self.closed.send_replace(true);
    }
}

impl<T: PollItem> Subscription for PollSubscription<T> {
    fn id(&self) -> Uuid {
        self.id
    }

    fn request(&self, n: i64) -> Result<()> {
        if n == 0 {
            return Err(NotificationError::validation(
                "demand must be positive, or negative for the default page size",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| NotificationError::Internal(format!("no async runtime: {}", e)))?;
        let Some(me) = self.me.upgrade() else {
            return Err(NotificationError::Internal("subscription released".into()));
        };

        if self
            .state
            .compare_exchange(
                SubscriptionState::Created as u8,
                SubscriptionState::Polling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::warn!(
                subscription_id = %self.id,
                state = ?self.state(),
                requested = n,
                demand = self.demand(),
                "Ignoring request on a subscription that is not awaiting demand"
            );
            return Ok(());
        }

        self.demand.store(n, Ordering::Release);
        runtime.spawn(me.run(n));
        Ok(())
    }

    fn cancel(&self) {
        let subscriber = self.subscriber.upgrade();
        if self.terminate(subscriber.clone()).is_none() {
            return;
        }

        if let (Some(publisher), Some(subscriber)) = (self.publisher.upgrade(), subscriber) {
            if let Err(e) = publisher.unsubscribe(&subscriber) {
                tracing::warn!(subscription_id = %self.id, error = %e, "Failed to unsubscribe");
            }
        }
    }
}
