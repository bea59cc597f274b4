// src/listen/types.rs
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// How many poll intervals of history every page request re-fetches.
pub const LOOKBACK_INTERVALS: u32 = 400;

pub const DEFAULT_PAGE_LIMIT: u32 = 100;

/// One portfolio activity as returned by the feed. Never mutated after retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub reference_id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub primary_type: String,
    #[serde(default)]
    pub secondary_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub user_actions: Vec<UserAction>,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orders_metadata: Option<serde_json::Value>,
    /// Fields the feed added that this struct does not name; kept so they still
    /// count towards identity and reach subscribers.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAction {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    #[serde(default)]
    pub next_cursor: String,
    #[serde(default)]
    pub has_next: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListActivitiesRequest {
    pub portfolio_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `None` for the first page of a cycle.
    pub cursor: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListActivitiesResponse {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

impl ListActivitiesResponse {
    /// Cursor for the next page, or `None` when this was the last one.
    /// A response without pagination info is treated as the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        match &self.pagination {
            Some(p) if p.has_next => Some(p.next_cursor.as_str()),
            _ => None,
        }
    }
}

/// Paginated upstream feed. At-least-once: overlapping windows return the same
/// activities again, which is what the dedup cache is for.
#[async_trait::async_trait]
pub trait ActivitySource: Send + Sync {
    async fn list_activities(
        &self,
        req: &ListActivitiesRequest,
    ) -> Result<ListActivitiesResponse, FetchError>;

    fn name(&self) -> &'static str;
}

/// `[now - poll_interval * 400, now]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookbackWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LookbackWindow {
    pub fn ending_at(now: DateTime<Utc>, poll_interval: Duration) -> Self {
        let span = poll_interval.saturating_mul(LOOKBACK_INTERVALS);
        let span = chrono::Duration::from_std(span).unwrap_or(chrono::Duration::MAX);
        let start = now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn now(poll_interval: Duration) -> Self {
        Self::ending_at(Utc::now(), poll_interval)
    }
}
