//! Change-notification subscription engine.
//!
//! Polls a remote notification queue on behalf of independent subscribers,
//! with per-subscriber demand, ordered delivery, cooperative cancellation,
//! and optional rewriting of payloads to a different resource version.

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain
pub mod notification;
pub mod paging;
pub mod poll;

pub use error::{FetchError, NotificationError, Result};
pub use notification::{ChangeNotification, NotificationService, Operation};
pub use poll::{
    HandlerSubscriber, NotificationHandler, NotificationListPollService, NotificationPollService,
    PollService, Publisher, Subscriber, Subscription,
};
