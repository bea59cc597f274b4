use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

use crate::error::{ConfigError, FetchError};
use crate::listen::types::{ActivitySource, ListActivitiesRequest, ListActivitiesResponse};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_PRIME_API_URL: &str = "https://api.prime.coinbase.com/v1";
pub const ENV_PRIME_CREDENTIALS: &str = "PRIME_CREDENTIALS";

const HEADER_KEY: &str = "X-CB-ACCESS-KEY";
const HEADER_PASSPHRASE: &str = "X-CB-ACCESS-PASSPHRASE";
const HEADER_SIGNATURE: &str = "X-CB-ACCESS-SIGNATURE";
const HEADER_TIMESTAMP: &str = "X-CB-ACCESS-TIMESTAMP";

/// API credentials, parsed from the `PRIME_CREDENTIALS` JSON blob.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimeCredentials {
    pub access_key: String,
    pub passphrase: String,
    pub signing_key: String,
    pub portfolio_id: String,
    #[serde(default)]
    pub svc_account_id: String,
    #[serde(default)]
    pub entity_id: String,
}

impl fmt::Debug for PrimeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secrets, only the scope.
        f.debug_struct("PrimeCredentials")
            .field("access_key_len", &self.access_key.len())
            .field("portfolio_id", &self.portfolio_id)
            .field("entity_id", &self.entity_id)
            .finish_non_exhaustive()
    }
}

impl PrimeCredentials {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let creds: Self = serde_json::from_str(raw).map_err(|e| ConfigError::Invalid {
            name: ENV_PRIME_CREDENTIALS,
            reason: e.to_string(),
        })?;
        if creds.portfolio_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: ENV_PRIME_CREDENTIALS,
                reason: "portfolioId is empty".to_string(),
            });
        }
        Ok(creds)
    }
}

/// base64(HMAC-SHA256(key, timestamp + method + path + body)).
pub fn sign_request(
    signing_key: &str,
    timestamp: i64,
    method: &str,
    path: &str,
    body: &str,
) -> Result<String, FetchError> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes())
        .map_err(|e| FetchError::Transport(format!("signing key: {e}")))?;
    mac.update(format!("{timestamp}{method}{path}{body}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn query_params(req: &ListActivitiesRequest) -> Vec<(&'static str, String)> {
    let mut q = vec![
        ("start_time", rfc3339(req.start)),
        ("end_time", rfc3339(req.end)),
        ("limit", req.limit.to_string()),
    ];
    if let Some(cursor) = req.cursor.as_deref().filter(|c| !c.is_empty()) {
        q.push(("cursor", cursor.to_string()));
    }
    q
}

/// Feed source backed by the Prime REST API.
pub struct PrimeActivitySource {
    client: Client,
    base_url: String,
    creds: PrimeCredentials,
    header_timeout: Option<Duration>,
}

impl PrimeActivitySource {
    pub fn new(client: Client, base_url: impl Into<String>, creds: PrimeCredentials) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            creds,
            header_timeout: None,
        }
    }

    /// Fail with `FetchError::Timeout` when the response headers take longer
    /// than `timeout`. A body that is slow after the headers is not cut off.
    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = Some(timeout);
        self
    }

    fn activities_url(&self, portfolio_id: &str) -> Result<Url, FetchError> {
        let raw = format!("{}/portfolios/{}/activities", self.base_url, portfolio_id);
        Url::parse(&raw).map_err(|e| FetchError::Transport(format!("bad url {raw}: {e}")))
    }
}

#[async_trait]
impl ActivitySource for PrimeActivitySource {
    async fn list_activities(
        &self,
        req: &ListActivitiesRequest,
    ) -> Result<ListActivitiesResponse, FetchError> {
        let url = self.activities_url(&req.portfolio_id)?;
        let timestamp = Utc::now().timestamp();
        let signature = sign_request(&self.creds.signing_key, timestamp, "GET", url.path(), "")?;

        debug!(
            target: "listener",
            path = url.path(),
            cursor = req.cursor.as_deref().unwrap_or(""),
            "GET activities"
        );

        let pending = self
            .client
            .get(url)
            .query(&query_params(req))
            .header(HEADER_KEY, &self.creds.access_key)
            .header(HEADER_PASSPHRASE, &self.creds.passphrase)
            .header(HEADER_SIGNATURE, signature)
            .header(HEADER_TIMESTAMP, timestamp.to_string())
            .send();

        // `send` resolves once the status line and headers are in.
        let sent = match self.header_timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| FetchError::Timeout(limit.as_millis() as u64))?,
            None => pending.await,
        };
        let resp = sent.map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(format!("read body: {e}")))?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "prime"
    }
}
