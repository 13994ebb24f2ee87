//! Pull-based publish/subscribe over a polled notification queue.
//!
//! A [`Publisher`] hands out one [`PollSubscription`] per subscriber. The
//! subscription owns an independent tokio task that fetches pages from a
//! shared [`NotificationService`](crate::notification::NotificationService)
//! and delivers them in order, never starting the next cycle before the
//! subscriber's callbacks for the previous one have returned.
//!
//! Two delivery shapes exist, selected by the item type:
//!
//! - `ChangeNotification`: one `on_next` per notification
//! - `Vec<ChangeNotification>`: one `on_next` per non-empty page

mod publisher;
mod subscriber;
mod subscription;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{NotificationError, Result};
use crate::notification::ChangeNotification;

pub use publisher::{PollService, ShutdownResult};
pub use subscriber::{DemandControl, HandlerSubscriber, NotificationHandler};
pub use subscription::{PollOptions, PollSubscription, SubscriptionState};

/// Demand a subscriber requests on subscribe unless configured otherwise.
/// Negative demand means "the source's default page size".
pub const DEFAULT_NUM_NOTIFICATIONS: i64 = -1;

/// Publisher delivering notifications one at a time
pub type NotificationPollService = PollService<ChangeNotification>;

/// Publisher delivering whole pages
pub type NotificationListPollService = PollService<Vec<ChangeNotification>>;

/// Item type a subscription delivers through `on_next`
pub trait PollItem: Send + Sized + 'static {
    /// Split a non-empty page into the items to deliver, in order
    fn from_batch(batch: Vec<ChangeNotification>) -> Vec<Self>;
}

impl PollItem for ChangeNotification {
    fn from_batch(batch: Vec<ChangeNotification>) -> Vec<Self> {
        batch
    }
}

impl PollItem for Vec<ChangeNotification> {
    fn from_batch(batch: Vec<ChangeNotification>) -> Vec<Self> {
        vec![batch]
    }
}

/// Receiver of subscription signals.
///
/// `on_next` and `on_error` are never called concurrently for the same
/// subscription, and `on_complete` is called at most once, after the last
/// `on_next`.
///
/// Returning an error from `on_subscribe` rejects the subscription: it is
/// removed from the publisher and no further signal, `on_complete`
/// included, is delivered.
#[async_trait]
pub trait Subscriber<T: Send + 'static>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) -> Result<()>;

    async fn on_next(&self, item: T);

    async fn on_error(&self, error: NotificationError);

    fn on_complete(&self);
}

/// Handle a subscriber uses to control delivery
pub trait Subscription: Send + Sync {
    fn id(&self) -> Uuid;

    /// Start polling with the given demand (negative = default page size)
    fn request(&self, n: i64) -> Result<()>;

    /// Stop polling; safe to call repeatedly and from inside callbacks
    fn cancel(&self);
}

/// Registry of active subscriptions
pub trait Publisher<T: PollItem>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) -> Result<Arc<PollSubscription<T>>>;

    fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber<T>>) -> Result<()>;

    fn number_of_subscribers(&self) -> usize;

    fn subscribers(&self) -> Vec<Arc<dyn Subscriber<T>>>;
}

/// Identity of a subscriber object, independent of its trait-object vtable
pub(crate) fn subscriber_key<T: Send + 'static>(subscriber: &Arc<dyn Subscriber<T>>) -> usize {
    Arc::as_ptr(subscriber) as *const () as usize
}
