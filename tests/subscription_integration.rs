//! End-to-end tests for the poll service, subscriptions, and overrides
//!
//! These tests run real poll loops against in-process sources with short
//! intervals; every wait is bounded by a timeout.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use change_notifications::error::FetchError;
use change_notifications::notification::{
    ChangeNotification, MemoryNotificationSource, NotificationService, NotificationSource,
    Operation, RawNotification, ResourceFetcher, VersionedResource,
};
use change_notifications::poll::{
    HandlerSubscriber, NotificationHandler, PollOptions, PollService, Publisher, Subscriber,
    Subscription,
};
use change_notifications::NotificationError;

const INTERVAL: Duration = Duration::from_millis(10);

/// Source that generates `limit` fresh notifications per fetch
struct GeneratingSource {
    next_id: AtomicU64,
    default_page: u32,
    limits: Mutex<Vec<Option<u32>>>,
}

impl GeneratingSource {
    fn new(default_page: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            default_page,
            limits: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NotificationSource for GeneratingSource {
    async fn fetch(
        &self,
        limit: Option<u32>,
        _last_processed_id: Option<&str>,
    ) -> Result<Vec<RawNotification>, FetchError> {
        self.limits.lock().push(limit);
        let count = limit.unwrap_or(self.default_page);
        Ok((0..count)
            .map(|_| {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                RawNotification::from(
                    &ChangeNotification::builder("persons", format!("p-{}", id), Operation::Updated)
                        .id(id.to_string())
                        .version("v12")
                        .build(),
                )
            })
            .collect())
    }
}

/// Source that fails until told to recover
struct FailingSource {
    failing: AtomicBool,
}

#[async_trait]
impl NotificationSource for FailingSource {
    async fn fetch(
        &self,
        _limit: Option<u32>,
        _last_processed_id: Option<&str>,
    ) -> Result<Vec<RawNotification>, FetchError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(FetchError::Transport("503 Service Unavailable".into()))
        } else {
            Ok(vec![RawNotification::from(
                &ChangeNotification::builder("persons", "p-1", Operation::Created)
                    .id("1")
                    .build(),
            )])
        }
    }
}

struct BodyFetcher {
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ResourceFetcher for BodyFetcher {
    async fn get_versioned_resource(
        &self,
        resource_name: &str,
        resource_id: &str,
        version: &str,
    ) -> Result<VersionedResource, FetchError> {
        self.calls.lock().push((
            resource_name.to_string(),
            resource_id.to_string(),
            version.to_string(),
        ));
        Ok(VersionedResource::new(json!({ "id": resource_id, "schema": version })))
    }
}

fn body_fetcher() -> Arc<BodyFetcher> {
    Arc::new(BodyFetcher {
        calls: Mutex::new(Vec::new()),
    })
}

fn options() -> PollOptions {
    PollOptions {
        interval: INTERVAL,
        max_consecutive_failures: 0,
    }
}

/// Records deliveries and checks that callbacks never overlap
#[derive(Default)]
struct Recorder {
    ids: Mutex<Vec<u64>>,
    batches: Mutex<Vec<usize>>,
    items: Mutex<Vec<ChangeNotification>>,
    errors: AtomicUsize,
    completes: AtomicUsize,
    in_flight: AtomicBool,
    overlapped: AtomicBool,
}

impl Recorder {
    async fn enter(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn record(&self, notification: &ChangeNotification) {
        if let Ok(id) = notification.id.parse() {
            self.ids.lock().push(id);
        }
        self.items.lock().push(notification.clone());
    }

    fn strictly_increasing(&self) -> bool {
        self.ids.lock().windows(2).all(|w| w[0] < w[1])
    }
}

#[async_trait]
impl NotificationHandler<ChangeNotification> for Recorder {
    async fn handle(&self, item: ChangeNotification) {
        self.enter().await;
        self.record(&item);
    }

    async fn handle_error(&self, _error: NotificationError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_complete(&self) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationHandler<Vec<ChangeNotification>> for Recorder {
    async fn handle(&self, batch: Vec<ChangeNotification>) {
        self.enter().await;
        self.batches.lock().push(batch.len());
        for item in &batch {
            self.record(item);
        }
    }

    async fn handle_error(&self, _error: NotificationError) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_complete(&self) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Override resolution
// =============================================================================

#[tokio::test]
async fn test_override_rewrites_persons_to_v14() {
    let fetcher = body_fetcher();
    let service = NotificationService::new(
        Arc::new(MemoryNotificationSource::default()),
        fetcher.clone(),
    )
    .with_override("persons", "v14")
    .unwrap();

    let input = ChangeNotification::builder("persons", "abc-123", Operation::Created)
        .version("v12")
        .content(json!({ "legacy": true }))
        .build();

    let output = service.resolve_override(input).await.unwrap();

    assert_eq!(output.resource.version, "v14");
    assert_eq!(output.content, json!({ "id": "abc-123", "schema": "v14" }));
    assert_eq!(output.content_type, "resource-representation");
    assert_eq!(
        fetcher.calls.lock().as_slice(),
        &[(
            "persons".to_string(),
            "abc-123".to_string(),
            "v14".to_string()
        )]
    );
}

#[tokio::test]
async fn test_abbreviated_overrides_normalize_identically() {
    let service = NotificationService::new(
        Arc::new(MemoryNotificationSource::default()),
        body_fetcher(),
    );

    let mut seen = Vec::new();
    for version in ["v16", "16", "v16.0.0"] {
        assert_ok!(service.add_abbreviated_override("persons", version));
        seen.push(service.get_override("persons").unwrap());
    }

    assert!(seen.windows(2).all(|w| w[0] == w[1]));
    assert_err!(service.add_abbreviated_override("", "v16"));
    assert_err!(service.add_override("persons", "  "));
}

#[tokio::test]
async fn test_subscriber_receives_overridden_notifications() {
    let source = Arc::new(MemoryNotificationSource::default());
    for i in 1..=3 {
        source.publish_notification(
            &ChangeNotification::builder("Persons", format!("p-{}", i), Operation::Updated)
                .id(i.to_string())
                .version("v12")
                .build(),
        );
    }
    source.publish_notification(
        &ChangeNotification::builder("persons", "p-4", Operation::Deleted)
            .id("4")
            .version("v12")
            .build(),
    );

    let fetcher = body_fetcher();
    let service = Arc::new(
        NotificationService::new(source.clone(), fetcher.clone())
            .with_override("persons", "v14")
            .unwrap(),
    );
    let publisher = PollService::<ChangeNotification>::new(service, options());

    let recorder = Arc::new(Recorder::default());
    let subscriber: Arc<HandlerSubscriber<ChangeNotification, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(recorder.clone(), 10));
    publisher.subscribe(subscriber.clone()).unwrap();

    wait_until(|| recorder.items.lock().len() >= 4).await;
    subscriber.cancel_subscription();
    wait_until(|| recorder.completes.load(Ordering::SeqCst) == 1).await;

    let items = recorder.items.lock();
    assert_eq!(items[0].resource.version, "v14");
    assert_eq!(items[2].content, json!({ "id": "p-3", "schema": "v14" }));
    // Deleted notifications are never re-fetched
    assert_eq!(items[3].resource.version, "v12");
    assert_eq!(fetcher.calls.lock().len(), 3);
}

// =============================================================================
// Delivery and demand
// =============================================================================

#[tokio::test]
async fn test_single_item_delivery_in_order_without_overlap() {
    let source = Arc::new(GeneratingSource::new(4));
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<ChangeNotification>::new(service, options());

    let recorder = Arc::new(Recorder::default());
    let subscriber: Arc<HandlerSubscriber<ChangeNotification, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(recorder.clone(), 3));
    publisher.subscribe(subscriber.clone()).unwrap();

    wait_until(|| recorder.ids.lock().len() >= 9).await;
    subscriber.cancel_subscription();
    wait_until(|| recorder.completes.load(Ordering::SeqCst) == 1).await;

    assert!(recorder.strictly_increasing());
    assert!(!recorder.overlapped.load(Ordering::SeqCst));
    assert!(source.limits.lock().iter().all(|l| *l == Some(3)));
}

#[tokio::test]
async fn test_list_delivery_uses_default_page_for_negative_demand() {
    let source = Arc::new(GeneratingSource::new(4));
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<Vec<ChangeNotification>>::new(service, options());

    let recorder = Arc::new(Recorder::default());
    let subscriber: Arc<HandlerSubscriber<Vec<ChangeNotification>, _>> =
        Arc::new(HandlerSubscriber::new(recorder.clone()));
    publisher.subscribe(subscriber.clone()).unwrap();

    wait_until(|| recorder.batches.lock().len() >= 2).await;
    subscriber.cancel_subscription();
    wait_until(|| recorder.completes.load(Ordering::SeqCst) == 1).await;

    assert!(recorder.batches.lock().iter().all(|len| *len == 4));
    assert!(source.limits.lock().iter().all(|l| l.is_none()));
    assert!(recorder.strictly_increasing());
}

#[tokio::test]
async fn test_empty_source_never_calls_on_next() {
    let service = Arc::new(NotificationService::new(
        Arc::new(MemoryNotificationSource::default()),
        body_fetcher(),
    ));
    let publisher = PollService::<ChangeNotification>::new(service, options());

    let recorder = Arc::new(Recorder::default());
    let subscriber: Arc<HandlerSubscriber<ChangeNotification, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(recorder.clone(), 5));
    let subscription = publisher.subscribe(subscriber.clone()).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    subscription.cancel();
    tokio::time::timeout(Duration::from_secs(2), subscription.closed())
        .await
        .unwrap();

    assert!(recorder.items.lock().is_empty());
    assert_eq!(recorder.completes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_two_subscribers_are_independent() {
    let source = Arc::new(GeneratingSource::new(10));
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<Vec<ChangeNotification>>::new(service, options());

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let first_subscriber: Arc<HandlerSubscriber<Vec<ChangeNotification>, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(first.clone(), 2));
    let second_subscriber: Arc<HandlerSubscriber<Vec<ChangeNotification>, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(second.clone(), 5));

    publisher.subscribe(first_subscriber.clone()).unwrap();
    publisher.subscribe(second_subscriber.clone()).unwrap();
    assert_eq!(publisher.number_of_subscribers(), 2);

    wait_until(|| first.batches.lock().len() >= 2 && second.batches.lock().len() >= 2).await;

    first_subscriber.cancel_subscription();
    wait_until(|| first.completes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(publisher.number_of_subscribers(), 1);

    // The second subscriber keeps polling after the first one left
    let before = second.batches.lock().len();
    wait_until(|| second.batches.lock().len() > before).await;
    assert_eq!(second.completes.load(Ordering::SeqCst), 0);

    second_subscriber.cancel_subscription();
    wait_until(|| second.completes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(publisher.number_of_subscribers(), 0);

    assert!(first.batches.lock().iter().all(|len| *len == 2));
    assert!(second.batches.lock().iter().all(|len| *len == 5));
    assert!(first.strictly_increasing());
    assert!(second.strictly_increasing());
    assert_eq!(first.completes.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failures and cancellation
// =============================================================================

#[tokio::test]
async fn test_fetch_errors_reach_subscriber_and_polling_recovers() {
    let source = Arc::new(FailingSource {
        failing: AtomicBool::new(true),
    });
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<ChangeNotification>::new(service, options());

    let recorder = Arc::new(Recorder::default());
    let subscriber: Arc<HandlerSubscriber<ChangeNotification, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(recorder.clone(), 1));
    publisher.subscribe(subscriber.clone()).unwrap();

    wait_until(|| recorder.errors.load(Ordering::SeqCst) >= 2).await;
    assert!(recorder.items.lock().is_empty());

    source.failing.store(false, Ordering::SeqCst);
    wait_until(|| !recorder.items.lock().is_empty()).await;

    subscriber.cancel_subscription();
    wait_until(|| recorder.completes.load(Ordering::SeqCst) == 1).await;
    assert_eq!(publisher.number_of_subscribers(), 0);
}

/// Subscriber that cancels itself from inside `on_next`
struct SelfCancelling {
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    next: AtomicUsize,
    completes: AtomicUsize,
}

#[async_trait]
impl Subscriber<ChangeNotification> for SelfCancelling {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) -> change_notifications::Result<()> {
        *self.subscription.lock() = Some(subscription.clone());
        subscription.request(5)
    }

    async fn on_next(&self, _item: ChangeNotification) {
        self.next.fetch_add(1, Ordering::SeqCst);
        let subscription = self.subscription.lock().clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    async fn on_error(&self, _error: NotificationError) {}

    fn on_complete(&self) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_cancel_from_on_next_finishes_the_page() {
    let source = Arc::new(GeneratingSource::new(5));
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<ChangeNotification>::new(service, options());

    let subscriber = Arc::new(SelfCancelling {
        subscription: Mutex::new(None),
        next: AtomicUsize::new(0),
        completes: AtomicUsize::new(0),
    });
    let subscription = publisher.subscribe(subscriber.clone()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), subscription.closed())
        .await
        .unwrap();

    assert_eq!(subscriber.next.load(Ordering::SeqCst), 5);
    assert_eq!(subscriber.completes.load(Ordering::SeqCst), 1);
    assert_eq!(source.limits.lock().len(), 1);
    assert_eq!(publisher.number_of_subscribers(), 0);
}

#[tokio::test]
async fn test_cancelled_page_is_not_lost_from_shared_queue() {
    let source = Arc::new(MemoryNotificationSource::default());
    for i in 1..=5 {
        source.publish_notification(
            &ChangeNotification::builder("persons", format!("p-{}", i), Operation::Created)
                .id(i.to_string())
                .build(),
        );
    }
    let service = Arc::new(NotificationService::new(source.clone(), body_fetcher()));
    let publisher = PollService::<ChangeNotification>::new(service.clone(), options());

    let first = Arc::new(SelfCancelling {
        subscription: Mutex::new(None),
        next: AtomicUsize::new(0),
        completes: AtomicUsize::new(0),
    });
    let subscription = publisher.subscribe(first.clone()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), subscription.closed())
        .await
        .unwrap();
    assert_eq!(first.next.load(Ordering::SeqCst), 5);

    // A later subscriber on the same service picks up where the first stopped
    source.publish_notification(
        &ChangeNotification::builder("persons", "p-6", Operation::Created)
            .id("6")
            .build(),
    );
    let recorder = Arc::new(Recorder::default());
    let second: Arc<HandlerSubscriber<ChangeNotification, _>> =
        Arc::new(HandlerSubscriber::with_num_notifications(recorder.clone(), 5));
    publisher.subscribe(second.clone()).unwrap();

    wait_until(|| !recorder.ids.lock().is_empty()).await;
    second.cancel_subscription();

    assert_eq!(recorder.ids.lock()[0], 6);
    assert_eq!(service.last_processed_id(), Some("6".to_string()));
}
