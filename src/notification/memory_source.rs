//! In-process notification queue.
//!
//! Notifications stay queued until a later fetch acknowledges them by
//! passing the id of the last one it processed. Useful for embedding the
//! engine without a remote queue, and as a deterministic source in tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::paging::page_count;

use super::{ChangeNotification, NotificationSource, RawNotification};

pub struct MemoryNotificationSource {
    queue: Mutex<VecDeque<RawNotification>>,
    config: SourceConfig,
}

impl MemoryNotificationSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn publish(&self, raw: RawNotification) {
        let mut queue = self.queue.lock();
        queue.push_back(raw);
        tracing::trace!(queue_size = queue.len(), "Notification queued");
    }

    pub fn publish_notification(&self, notification: &ChangeNotification) {
        self.publish(RawNotification::from(notification));
    }

    /// Number of notifications not yet acknowledged
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Pages of `page_size` needed to drain the backlog
    pub fn pending_pages(&self, page_size: u32) -> u64 {
        page_count(self.pending() as u64, page_size as u64, 0)
    }

    fn acknowledge(queue: &mut VecDeque<RawNotification>, last_processed_id: &str) -> usize {
        match queue.iter().position(|n| n.id() == Some(last_processed_id)) {
            Some(index) => {
                queue.drain(..=index);
                index + 1
            }
            None => 0,
        }
    }
}

impl Default for MemoryNotificationSource {
    fn default() -> Self {
        Self::new(SourceConfig::default())
    }
}

#[async_trait]
impl NotificationSource for MemoryNotificationSource {
    async fn fetch(
        &self,
        limit: Option<u32>,
        last_processed_id: Option<&str>,
    ) -> Result<Vec<RawNotification>, FetchError> {
        let max = self.config.max_page_size;
        let limit = match limit {
            Some(limit) if limit == 0 || limit > max => {
                return Err(FetchError::InvalidLimit { limit, max });
            }
            Some(limit) => limit,
            None => self.config.default_page_size,
        };

        let mut queue = self.queue.lock();
        if let Some(id) = last_processed_id {
            let acknowledged = Self::acknowledge(&mut queue, id);
            if acknowledged > 0 {
                tracing::debug!(acknowledged, last_processed_id = %id, "Acknowledged notifications");
            }
        }

        Ok(queue.iter().take(limit as usize).cloned().collect())
    }
}
