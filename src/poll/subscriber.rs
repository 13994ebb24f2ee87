//! Reusable subscriber behavior: default demand on subscribe, a captured
//! subscription for later cancellation, and dispatch to a handler.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::PollConfig;
use crate::error::{NotificationError, Result};

use super::{PollItem, Subscriber, Subscription, DEFAULT_NUM_NOTIFICATIONS};

/// Demand bookkeeping any [`Subscriber`] implementation can embed
pub struct DemandControl {
    num_notifications: i64,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
}

impl DemandControl {
    pub fn new() -> Self {
        Self::with_num_notifications(DEFAULT_NUM_NOTIFICATIONS)
    }

    pub fn with_num_notifications(num_notifications: i64) -> Self {
        Self {
            num_notifications,
            subscription: Mutex::new(None),
        }
    }

    pub fn num_notifications(&self) -> i64 {
        self.num_notifications
    }

    /// Capture the subscription and request the configured demand
    pub fn on_subscribe(&self, subscription: Arc<dyn Subscription>) -> Result<()> {
        *self.subscription.lock() = Some(subscription.clone());
        subscription.request(self.num_notifications)
    }

    pub fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.subscription.lock().clone()
    }

    /// Cancel the captured subscription. Returns false if none was captured.
    pub fn cancel_subscription(&self) -> bool {
        // Clone out so cancel() never runs under our lock
        let subscription = self.subscription.lock().clone();
        match subscription {
            Some(subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }
}

impl Default for DemandControl {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&PollConfig> for DemandControl {
    fn from(config: &PollConfig) -> Self {
        Self::with_num_notifications(config.num_notifications)
    }
}

/// Business logic plugged into a [`HandlerSubscriber`]
#[async_trait]
pub trait NotificationHandler<T: Send + 'static>: Send + Sync {
    async fn handle(&self, item: T);

    async fn handle_error(&self, error: NotificationError) {
        tracing::warn!(code = error.code(), error = %error, "Subscriber received error");
    }

    fn handle_complete(&self) {}
}

#[async_trait]
impl<T, H> NotificationHandler<T> for Arc<H>
where
    T: Send + 'static,
    H: NotificationHandler<T> + ?Sized,
{
    async fn handle(&self, item: T) {
        (**self).handle(item).await;
    }

    async fn handle_error(&self, error: NotificationError) {
        (**self).handle_error(error).await;
    }

    fn handle_complete(&self) {
        (**self).handle_complete();
    }
}

/// Subscriber that requests its demand on subscribe and forwards every
/// signal to a [`NotificationHandler`].
///
/// ```rust,ignore
/// let subscriber = Arc::new(HandlerSubscriber::with_num_notifications(MyHandler, 50));
/// poll_service.subscribe(subscriber.clone())?;
/// // later
/// subscriber.cancel_subscription();
/// ```
pub struct HandlerSubscriber<T, H> {
    handler: H,
    demand: DemandControl,
    _item: PhantomData<fn(T)>,
}

impl<T, H> HandlerSubscriber<T, H> {
    pub fn new(handler: H) -> Self {
        Self::with_demand(handler, DemandControl::new())
    }

    pub fn with_num_notifications(handler: H, num_notifications: i64) -> Self {
        Self::with_demand(handler, DemandControl::with_num_notifications(num_notifications))
    }

    /// Request `poll.num_notifications` on subscribe
    pub fn from_config(handler: H, config: &PollConfig) -> Self {
        Self::with_demand(handler, DemandControl::from(config))
    }

    fn with_demand(handler: H, demand: DemandControl) -> Self {
        Self {
            handler,
            demand,
            _item: PhantomData,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn num_notifications(&self) -> i64 {
        self.demand.num_notifications()
    }

    pub fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        self.demand.subscription()
    }

    pub fn cancel_subscription(&self) -> bool {
        self.demand.cancel_subscription()
    }
}

#[async_trait]
impl<T, H> Subscriber<T> for HandlerSubscriber<T, H>
where
    T: PollItem,
    H: NotificationHandler<T>,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) -> Result<()> {
        self.demand.on_subscribe(subscription)
    }

    async fn on_next(&self, item: T) {
        self.handler.handle(item).await;
    }

    async fn on_error(&self, error: NotificationError) {
        self.handler.handle_error(error).await;
    }

    fn on_complete(&self) {
        self.handler.handle_complete();
    }
}
