use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::models::{DrawRecord, PICK_COUNT};
use super::source::DrawSource;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; lotto-picker)";
const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Why a single upstream attempt produced no draw.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {0}")]
    Status(StatusCode),
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("draw not available upstream")]
    NotDrawn,
}

impl FetchError {
    /// An explicit "not drawn" answer is final; everything else may be transient.
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotDrawn)
    }
}

/// Client for the official draw-result JSON endpoint
/// (`common.do?method=getLottoNumber&drwNo=N`).
#[derive(Clone)]
pub struct LottoApiClient {
    http: Client,
    api_url: String,
    retries: u32,
    backoff: Duration,
}

impl LottoApiClient {
    pub fn new(api_url: &str, timeout: Duration, retries: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(LottoApiClient {
            http,
            api_url: api_url.to_string(),
            retries,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the base retry delay (doubles per attempt, plus up to half of it as jitter).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn fetch_once(&self, draw_no: u32) -> Result<DrawRecord, FetchError> {
        let no = draw_no.to_string();
        let resp = self
            .http
            .get(&self.api_url)
            .query(&[("method", "getLottoNumber"), ("drwNo", no.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status()));
        }

        // The endpoint answers with an HTML page when it is unhappy, so decode by hand
        let body = resp.text().await?;
        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("not JSON: {}", e)))?;

        parse_draw(&raw, draw_no)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
        let max_jitter = u64::try_from(self.backoff.as_millis() / 2).unwrap_or(0);
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        base + Duration::from_millis(jitter)
    }
}

#[async_trait]
impl DrawSource for LottoApiClient {
    fn name(&self) -> &str {
        "dhlottery"
    }

    async fn fetch(&self, draw_no: u32) -> Option<DrawRecord> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(draw_no).await {
                Ok(record) => {
                    debug!("Fetched draw {} {:?}", draw_no, record.numbers);
                    return Some(record);
                }
                Err(e) if !e.is_retryable() => {
                    debug!("Draw {} not available: {}", draw_no, e);
                    return None;
                }
                Err(e) if attempt < self.retries => {
                    let delay = self.retry_delay(attempt);
                    debug!(
                        "Draw {} attempt {} failed ({}), retrying in {:?}",
                        draw_no,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "Draw {} unavailable after {} attempt(s): {}",
                        draw_no,
                        attempt + 1,
                        e
                    );
                    return None;
                }
            }
        }
    }
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

/// Turn one upstream payload into a validated draw.
///
/// Upstream shape: `{ "returnValue": "success", "drwNo": 1122, "drwNoDate": "2024-06-01",
/// "drwtNo1": 3, ..., "drwtNo6": 44, "bnusNo": 9 }`. Fields sometimes arrive as strings.
pub fn parse_draw(raw: &serde_json::Value, requested: u32) -> Result<DrawRecord, FetchError> {
    if raw["returnValue"].as_str() != Some("success") {
        return Err(FetchError::NotDrawn);
    }

    if let Some(reported) = as_int(&raw["drwNo"]) {
        if reported != i64::from(requested) {
            return Err(FetchError::Malformed(format!(
                "asked for draw {} but got {}",
                requested, reported
            )));
        }
    }

    let numbers = (1..=PICK_COUNT)
        .map(|i| {
            let key = format!("drwtNo{}", i);
            as_int(&raw[key.as_str()]).ok_or_else(|| FetchError::Malformed(format!("missing {}", key)))
        })
        .collect::<Result<Vec<i64>, FetchError>>()?;

    let bonus = as_int(&raw["bnusNo"]);
    let date = raw["drwNoDate"].as_str().map(str::to_string);

    DrawRecord::new(requested, numbers, bonus, date)
        .map_err(|e| FetchError::Malformed(e.to_string()))
}

fn as_int(v: &serde_json::Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        routing::get,
        Router,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn payload(no: u32) -> serde_json::Value {
        json!({
            "returnValue": "success",
            "drwNo": no,
            "drwNoDate": "2024-06-01",
            "drwtNo1": 44, "drwtNo2": 3, "drwtNo3": 21,
            "drwtNo4": 9, "drwtNo5": 15, "drwtNo6": 33,
            "bnusNo": 12,
            "totSellamnt": 115_000_000_000u64
        })
    }

    #[test]
    fn test_parse_success_sorts_numbers() {
        let d = parse_draw(&payload(1122), 1122).unwrap();
        assert_eq!(d.draw_no, 1122);
        assert_eq!(d.numbers, [3, 9, 15, 21, 33, 44]);
        assert_eq!(d.bonus, Some(12));
        assert_eq!(d.date.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = payload(77);
        assert_eq!(parse_draw(&raw, 77).unwrap(), parse_draw(&raw, 77).unwrap());
    }

    #[test]
    fn test_parse_accepts_string_fields() {
        let mut raw = payload(5);
        raw["drwtNo1"] = json!("44");
        raw["drwNo"] = json!("5");
        assert_eq!(parse_draw(&raw, 5).unwrap().numbers[5], 44);
    }

    #[test]
    fn test_parse_fail_flag_is_not_drawn() {
        let raw = json!({ "returnValue": "fail" });
        assert!(matches!(parse_draw(&raw, 9999), Err(FetchError::NotDrawn)));
    }

    #[test]
    fn test_parse_rejects_missing_or_duplicate_numbers() {
        let mut missing = payload(5);
        missing.as_object_mut().unwrap().remove("drwtNo4");
        assert!(matches!(parse_draw(&missing, 5), Err(FetchError::Malformed(_))));

        let mut dup = payload(5);
        dup["drwtNo2"] = json!(44);
        assert!(matches!(parse_draw(&dup, 5), Err(FetchError::Malformed(_))));

        let mut out_of_range = payload(5);
        out_of_range["drwtNo2"] = json!(46);
        assert!(matches!(parse_draw(&out_of_range, 5), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_draw_no() {
        assert!(matches!(parse_draw(&payload(6), 5), Err(FetchError::Malformed(_))));
    }

    // ── Against a local upstream ──────────────────────────────────────────────

    type Responder = fn(u32, usize) -> (StatusCode, String);

    #[derive(Clone)]
    struct Upstream {
        hits: Arc<AtomicUsize>,
        respond: Responder,
    }

    async fn upstream_handler(
        State(up): State<Upstream>,
        Query(q): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        let hit = up.hits.fetch_add(1, Ordering::SeqCst);
        assert_eq!(q.get("method").map(String::as_str), Some("getLottoNumber"));
        let no = q.get("drwNo").and_then(|s| s.parse().ok()).unwrap_or(0);
        (up.respond)(no, hit)
    }

    async fn spawn_upstream(respond: Responder) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/common.do", get(upstream_handler))
            .with_state(Upstream {
                hits: hits.clone(),
                respond,
            });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/common.do", addr), hits)
    }

    fn client(url: &str, retries: u32) -> LottoApiClient {
        LottoApiClient::new(url, Duration::from_secs(2), retries)
            .unwrap()
            .with_backoff(Duration::from_millis(2))
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let (url, hits) = spawn_upstream(|no, _| (StatusCode::OK, payload(no).to_string())).await;
        let d = client(&url, 1).fetch(1122).await.unwrap();
        assert_eq!(d.numbers, [3, 9, 15, 21, 33, 44]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_twice_is_identical() {
        let (url, _) = spawn_upstream(|no, _| (StatusCode::OK, payload(no).to_string())).await;
        let c = client(&url, 0);
        assert_eq!(c.fetch(800).await, c.fetch(800).await);
    }

    #[tokio::test]
    async fn test_not_drawn_is_not_retried() {
        let (url, hits) = spawn_upstream(|_, _| {
            (StatusCode::OK, json!({ "returnValue": "fail" }).to_string())
        })
        .await;
        assert!(client(&url, 2).fetch(5000).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_then_success_is_retried() {
        let (url, hits) = spawn_upstream(|no, hit| {
            if hit == 0 {
                (StatusCode::INTERNAL_SERVER_ERROR, "boom".into())
            } else {
                (StatusCode::OK, payload(no).to_string())
            }
        })
        .await;
        assert!(client(&url, 1).fetch(10).await.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_failure_gives_up() {
        let (url, hits) =
            spawn_upstream(|_, _| (StatusCode::OK, "<html>maintenance</html>".into())).await;
        assert!(client(&url, 1).fetch(10).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_absent() {
        // Nothing listens on port 9 locally
        let c = client("http://127.0.0.1:9/common.do", 0);
        assert!(c.fetch(1).await.is_none());
    }
}
