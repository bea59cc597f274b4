// src/listen/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tracing::{debug, error, warn};

use crate::broadcast::{ActivityMessage, PublishSink};
use crate::cache::DedupCache;
use crate::error::{ConfigError, FetchError, PublishError};
use crate::fingerprint::fingerprint;
use crate::listen::types::{
    Activity, ActivitySource, ListActivitiesRequest, ListActivitiesResponse, LookbackWindow,
    DEFAULT_PAGE_LIMIT,
};

pub use scheduler::{ActivityListener, ListenerState};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "listener_activities_fetched_total",
            "Activities returned by the feed, duplicates included."
        );
        describe_counter!(
            "listener_activities_published_total",
            "Activities forwarded to the topic."
        );
        describe_counter!(
            "listener_duplicates_total",
            "Activities skipped because their digest was cached."
        );
        describe_counter!(
            "listener_fingerprint_errors_total",
            "Activities skipped because they could not be encoded."
        );
        describe_counter!(
            "listener_publish_errors_total",
            "Publish calls that failed or timed out."
        );
        describe_counter!(
            "listener_fetch_errors_total",
            "Poll cycles abandoned on a feed error."
        );
        describe_counter!("listener_cycles_total", "Poll cycles started.");
        describe_gauge!("listener_cache_entries", "Digests currently cached.");
        describe_gauge!(
            "listener_last_cycle_ts",
            "Unix ts when the last poll cycle completed."
        );
    });
}

/// Tunables the poll loop needs. Read once, before start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub portfolio_id: String,
    pub cache_capacity: usize,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub publish_timeout: Duration,
    pub page_limit: u32,
}

impl ListenerConfig {
    pub fn new(portfolio_id: impl Into<String>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            cache_capacity: 100_000,
            poll_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Counters for a single poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub pages: usize,
    pub fetched: usize,
    pub published: usize,
    pub duplicates: usize,
    pub unencodable: usize,
    pub publish_failures: usize,
}

/// What happened to one activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Published,
    Duplicate,
    Unencodable,
    PublishFailed,
}

/// Pagination, dedup and forwarding. Owned by exactly one task, which is why
/// the cache needs no lock.
pub struct ActivityPoller {
    cfg: ListenerConfig,
    source: Arc<dyn ActivitySource>,
    sink: Arc<dyn PublishSink>,
    cache: DedupCache,
}

impl ActivityPoller {
    pub fn new(
        cfg: ListenerConfig,
        source: Arc<dyn ActivitySource>,
        sink: Arc<dyn PublishSink>,
    ) -> Result<Self, ConfigError> {
        ensure_metrics_described();
        let cache = DedupCache::new(cfg.cache_capacity)?;
        Ok(Self {
            cfg,
            source,
            sink,
            cache,
        })
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Page through the current lookback window once. A fetch error ends the
    /// cycle right away; the next cycle re-reads the same history anyway.
    pub async fn poll_cycle(&mut self) -> Result<CycleStats, FetchError> {
        counter!("listener_cycles_total").increment(1);
        let mut stats = CycleStats::default();
        let mut cursor: Option<String> = None;

        loop {
            let response = match self.list_activities(cursor.as_deref()).await {
                Ok(r) => r,
                Err(e) => {
                    counter!("listener_fetch_errors_total").increment(1);
                    error!(
                        target: "listener",
                        source = self.source.name(),
                        pages = stats.pages,
                        cursor = cursor.as_deref().unwrap_or(""),
                        error = %e,
                        "unable to list activities, abandoning cycle"
                    );
                    return Err(e);
                }
            };
            stats.pages += 1;

            self.handle_activities(&response.activities, &mut stats)
                .await;

            match response.next_cursor() {
                None => break,
                Some("") => {
                    warn!(
                        target: "listener",
                        pages = stats.pages,
                        "feed reported more pages without a cursor, ending cycle"
                    );
                    break;
                }
                Some(next) => cursor = Some(next.to_string()),
            }
        }

        gauge!("listener_cache_entries").set(self.cache.len() as f64);
        gauge!("listener_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);
        Ok(stats)
    }

    async fn list_activities(
        &self,
        cursor: Option<&str>,
    ) -> Result<ListActivitiesResponse, FetchError> {
        // Fresh window per page request.
        let window = LookbackWindow::now(self.cfg.poll_interval);
        let req = ListActivitiesRequest {
            portfolio_id: self.cfg.portfolio_id.clone(),
            start: window.start,
            end: window.end,
            cursor: cursor.filter(|c| !c.is_empty()).map(str::to_string),
            limit: self.cfg.page_limit,
        };

        match tokio::time::timeout(self.cfg.fetch_timeout, self.source.list_activities(&req)).await
        {
            Ok(res) => res,
            Err(_) => Err(FetchError::Timeout(self.cfg.fetch_timeout.as_millis() as u64)),
        }
    }

    /// Handle one page in feed order.
    pub async fn handle_activities(&mut self, activities: &[Activity], stats: &mut CycleStats) {
        debug!(target: "listener", found = activities.len(), "list activities");
        counter!("listener_activities_fetched_total").increment(activities.len() as u64);
        stats.fetched += activities.len();

        for activity in activities {
            match self.handle_activity(activity).await {
                Outcome::Published => stats.published += 1,
                Outcome::Duplicate => stats.duplicates += 1,
                Outcome::Unencodable => stats.unencodable += 1,
                Outcome::PublishFailed => stats.publish_failures += 1,
            }
        }
    }

    /// Digest, dedup check, forward, and only then remember the digest.
    pub async fn handle_activity(&mut self, activity: &Activity) -> Outcome {
        let digest = match fingerprint(activity) {
            Ok(d) => d,
            // Only reachable through a failing Serialize impl, which the
            // current `Activity` fields cannot produce.
            Err(e) => {
                counter!("listener_fingerprint_errors_total").increment(1);
                error!(
                    target: "listener",
                    activity_id = %activity.id,
                    reference_id = %activity.reference_id,
                    error = %e,
                    "cannot fingerprint activity"
                );
                return Outcome::Unencodable;
            }
        };

        if self.cache.contains(&digest) {
            counter!("listener_duplicates_total").increment(1);
            return Outcome::Duplicate;
        }

        debug!(target: "listener", activity_id = %activity.id, digest = %digest, "new activity");

        match self.publish_activity(activity).await {
            Ok(()) => {
                counter!("listener_activities_published_total").increment(1);
                self.cache.add(digest);
                Outcome::Published
            }
            Err(e) => {
                counter!("listener_publish_errors_total").increment(1);
                warn!(
                    target: "listener",
                    sink = self.sink.name(),
                    activity_id = %activity.id,
                    reference_id = %activity.reference_id,
                    error = %e,
                    "unable to publish activity, will retry on a later cycle"
                );
                Outcome::PublishFailed
            }
        }
    }

    async fn publish_activity(&self, activity: &Activity) -> Result<(), PublishError> {
        let msg = ActivityMessage::from_activity(activity)?;
        match tokio::time::timeout(self.cfg.publish_timeout, self.sink.publish(&msg)).await {
            Ok(res) => res,
            Err(_) => Err(PublishError::Timeout(
                self.cfg.publish_timeout.as_millis() as u64,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listen::types::Pagination;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct OnePage(Vec<Activity>);

    #[async_trait]
    impl ActivitySource for OnePage {
        async fn list_activities(
            &self,
            _req: &ListActivitiesRequest,
        ) -> Result<ListActivitiesResponse, FetchError> {
            Ok(ListActivitiesResponse {
                activities: self.0.clone(),
                pagination: Some(Pagination {
                    next_cursor: String::new(),
                    has_next: false,
                }),
            })
        }

        fn name(&self) -> &'static str {
            "one-page"
        }
    }

    #[derive(Default)]
    struct Recorder {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PublishSink for Recorder {
        async fn publish(&self, msg: &ActivityMessage) -> Result<(), PublishError> {
            let a: Activity = serde_json::from_slice(&msg.body).unwrap();
            self.ids.lock().push(a.id);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    fn activity(id: &str) -> Activity {
        Activity {
            id: id.into(),
            category: "ACTIVITY_CATEGORY_ORDER".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn duplicates_within_a_page_publish_once() {
        let sink = Arc::new(Recorder::default());
        let source = Arc::new(OnePage(vec![activity("a"), activity("a"), activity("b")]));
        let mut poller =
            ActivityPoller::new(ListenerConfig::new("p-1"), source, sink.clone()).unwrap();

        let stats = poller.poll_cycle().await.unwrap();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(*sink.ids.lock(), vec!["a", "b"]);
    }

    #[test]
    fn zero_capacity_fails_construction() {
        let mut cfg = ListenerConfig::new("p-1");
        cfg.cache_capacity = 0;
        let res = ActivityPoller::new(
            cfg,
            Arc::new(OnePage(vec![])),
            Arc::new(Recorder::default()),
        );
        assert!(res.is_err());
    }
}
