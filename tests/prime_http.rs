// tests/prime_http.rs
use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use prime_activity_listener::config::AppConfig;
use prime_activity_listener::error::FetchError;
use prime_activity_listener::listen::providers::prime::{PrimeActivitySource, PrimeCredentials};
use prime_activity_listener::listen::types::{ActivitySource, ListActivitiesRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const CREDS: &str = r#"{"accessKey":"ak","passphrase":"pp","signingKey":"sk","portfolioId":"p-1"}"#;
const BODY: &str = r#"{"activities":[{"id":"a-1","category":"ACTIVITY_CATEGORY_ORDER"}],"pagination":{"next_cursor":"","has_next":false}}"#;

/// One-shot HTTP server. Headers go out after `header_delay` (never, if `None`),
/// the body after a further `body_delay`.
async fn serve_once(header_delay: Option<Duration>, body_delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let Some(header_delay) = header_delay else {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return;
        };
        tokio::time::sleep(header_delay).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
            BODY.len()
        );
        sock.write_all(head.as_bytes()).await.unwrap();
        sock.flush().await.unwrap();

        tokio::time::sleep(body_delay).await;
        let _ = sock.write_all(BODY.as_bytes()).await;
        let _ = sock.flush().await;
    });

    addr
}

fn source(addr: SocketAddr, header_timeout: Duration) -> PrimeActivitySource {
    let cfg = AppConfig::from_lookup(|key| match key {
        "PRIME_CREDENTIALS" => Some(CREDS.to_string()),
        "ACTIVITY_TOPIC_ARN" => Some("arn:aws:sns:us-east-1:000000000000:activities".to_string()),
        _ => None,
    })
    .unwrap();
    let client = cfg.http.build_client().unwrap();

    PrimeActivitySource::new(
        client,
        format!("http://{addr}/v1"),
        PrimeCredentials::from_json(CREDS).unwrap(),
    )
    .with_header_timeout(header_timeout)
}

fn request() -> ListActivitiesRequest {
    let end = Utc::now();
    ListActivitiesRequest {
        portfolio_id: "p-1".into(),
        start: end - chrono::Duration::seconds(2000),
        end,
        cursor: None,
        limit: 100,
    }
}

#[tokio::test]
async fn slow_body_after_prompt_headers_is_not_cut_off() {
    let addr = serve_once(Some(Duration::ZERO), Duration::from_millis(1500)).await;
    let src = source(addr, Duration::from_millis(300));

    let resp = tokio::time::timeout(Duration::from_secs(10), src.list_activities(&request()))
        .await
        .expect("fetch timeout should not fire")
        .unwrap();

    assert_eq!(resp.activities.len(), 1);
    assert_eq!(resp.activities[0].id, "a-1");
    assert_eq!(resp.next_cursor(), None);
}

#[tokio::test]
async fn missing_headers_hit_header_timeout() {
    let addr = serve_once(None, Duration::ZERO).await;
    let src = source(addr, Duration::from_millis(200));

    let err = tokio::time::timeout(Duration::from_secs(10), src.list_activities(&request()))
        .await
        .expect("header timeout should fire first")
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout(200)));
}
