// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prime_activity_listener::broadcast::{ActivityMessage, PublishSink};
use prime_activity_listener::error::{FetchError, PublishError};
use prime_activity_listener::listen::types::{
    Activity, ActivitySource, ListActivitiesRequest, ListActivitiesResponse, Pagination,
};
use prime_activity_listener::ListenerConfig;

pub fn activity(id: &str) -> Activity {
    Activity {
        id: id.to_string(),
        reference_id: format!("ref-{id}"),
        category: "ACTIVITY_CATEGORY_ORDER".into(),
        primary_type: "ACTIVITY_TYPE_BUY".into(),
        secondary_type: "NO_SECONDARY_TYPE".into(),
        status: "ACTIVITY_STATUS_COMPLETED".into(),
        symbols: vec!["BTC".into()],
        ..Default::default()
    }
}

pub fn page(ids: &[&str], next: Option<&str>) -> ListActivitiesResponse {
    ListActivitiesResponse {
        activities: ids.iter().map(|id| activity(id)).collect(),
        pagination: Some(Pagination {
            next_cursor: next.unwrap_or_default().to_string(),
            has_next: next.is_some(),
        }),
    }
}

pub fn fast_config() -> ListenerConfig {
    ListenerConfig {
        portfolio_id: "p-1".into(),
        cache_capacity: 1_000,
        poll_interval: Duration::from_millis(10),
        fetch_timeout: Duration::from_secs(2),
        publish_timeout: Duration::from_secs(2),
        page_limit: 100,
    }
}

/// Serves pages keyed by incoming cursor ("" for the first page).
#[derive(Default)]
pub struct PagedSource {
    pages: Mutex<HashMap<String, ListActivitiesResponse>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    pub requests: Mutex<Vec<ListActivitiesRequest>>,
}

impl PagedSource {
    pub fn new(pages: Vec<(&str, ListActivitiesResponse)>) -> Self {
        Self {
            pages: Mutex::new(
                pages
                    .into_iter()
                    .map(|(c, p)| (c.to_string(), p))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_cursor(&self, cursor: &str) {
        self.failing.lock().insert(cursor.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ActivitySource for PagedSource {
    async fn list_activities(
        &self,
        req: &ListActivitiesRequest,
    ) -> Result<ListActivitiesResponse, FetchError> {
        self.requests.lock().push(req.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }

        let key = req.cursor.clone().unwrap_or_default();
        if self.failing.lock().contains(&key) {
            return Err(FetchError::Transport(format!("boom at cursor {key:?}")));
        }
        Ok(self.pages.lock().get(&key).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "paged"
    }
}

/// Records ids of published activities in call order.
#[derive(Default)]
pub struct RecordingSink {
    pub published: Mutex<Vec<String>>,
    pub attempts: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_id(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn published_ids(&self) -> Vec<String> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, msg: &ActivityMessage) -> Result<(), PublishError> {
        let activity: Activity = serde_json::from_slice(&msg.body)
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        self.attempts.lock().push(activity.id.clone());

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.lock().contains(&activity.id) {
            return Err(PublishError::Rejected(format!("refused {}", activity.id)));
        }
        self.published.lock().push(activity.id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
