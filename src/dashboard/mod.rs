use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::models::{DrawInput, DrawRecord};
use crate::db::DrawStore;
use crate::error::AppError;
use crate::lotto::{DrawSource, TtlCache};
use crate::picker::{
    range_frequency, rng_from_seed, score_strategies, FrequencyTable, RangeSummary, ScorerConfig,
    StrategyReport,
};
use crate::sync::{window_bounds, DrawLocator, FillPolicy, LocatePolicy, WindowMaterializer};

/// Cache key for the located newest draw number.
const LATEST_KEY: &str = "latest";
/// Upper bound for `count` on `/api/predict`.
const MAX_PREDICT_COUNT: usize = 50;
const SCORE_LABEL: &str = "Higher score = better (Reward ÷ (1+Risk))";

/// Request-path knobs, taken from `Config` once at startup.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub live_fetch: bool,
    pub sync_fetch: bool,
    pub locate_policy: LocatePolicy,
    pub max_sync_fetches: usize,
    pub default_window: u32,
    pub max_window: u32,
    pub scorer: ScorerConfig,
}

impl ApiSettings {
    pub fn from_config(config: &Config) -> Self {
        ApiSettings {
            live_fetch: config.live_fetch,
            sync_fetch: config.sync_fetch,
            locate_policy: config.locate_policy(),
            max_sync_fetches: config.max_sync_fetches,
            default_window: config.default_window,
            max_window: config.max_window,
            scorer: ScorerConfig {
                top_k: config.top_k,
                pool_size: config.pool_size,
            },
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            live_fetch: true,
            sync_fetch: true,
            locate_policy: LocatePolicy::default(),
            max_sync_fetches: 20,
            default_window: 10,
            max_window: 200,
            scorer: ScorerConfig::default(),
        }
    }
}

pub struct AppState {
    pub store: DrawStore,
    pub source: Arc<dyn DrawSource>,
    pub latest_cache: TtlCache<&'static str, u32>,
    pub settings: ApiSettings,
}

impl AppState {
    /// Whether a request handler may call upstream at all.
    fn network_allowed(&self) -> bool {
        self.settings.live_fetch && self.settings.sync_fetch
    }

    /// Newest known draw number: the store's max, raised by a bounded probe
    /// whose result is cached, misses included. 0 when nothing is known.
    async fn latest_draw_no(&self) -> u32 {
        let stored = self.store.max_draw_no();
        if !self.network_allowed() {
            return stored;
        }
        if let Some(cached) = self.latest_cache.get(&LATEST_KEY).await {
            return cached.max(stored);
        }

        let located = DrawLocator::new(&self.store, self.source.as_ref(), self.settings.locate_policy)
            .locate()
            .await;
        self.latest_cache.insert(LATEST_KEY, located).await;
        located.max(stored)
    }

    /// One draw from the store, or a single upstream lookup when allowed.
    async fn draw(&self, draw_no: u32) -> Option<DrawRecord> {
        if draw_no == 0 {
            return None;
        }
        if let Some(record) = self.store.get(draw_no) {
            return Some(record);
        }
        if !self.network_allowed() {
            return None;
        }
        let record = self.source.fetch(draw_no).await?;
        self.store.upsert(record.clone());
        Some(record)
    }

    async fn window(&self, end_no: u32, n: u32) -> Vec<DrawRecord> {
        let policy = if self.network_allowed() {
            FillPolicy::FetchMissing {
                max_fetches: self.settings.max_sync_fetches,
            }
        } else {
            FillPolicy::StoreOnly
        };
        WindowMaterializer::new(&self.store, self.source.as_ref(), policy)
            .materialize(end_no, n)
            .await
    }

    fn clamp_window(&self, n: Option<u32>) -> u32 {
        n.unwrap_or(self.settings.default_window)
            .clamp(1, self.settings.max_window.max(1))
    }

    /// Explicit positive `end_no`, else the newest known draw.
    async fn resolve_end(&self, end_no: Option<u32>) -> u32 {
        match end_no.filter(|&e| e > 0) {
            Some(end_no) => end_no,
            None => self.latest_draw_no().await,
        }
    }
}

/// Build the Axum router for the API and landing page.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/latest", get(latest_handler))
        .route("/api/draw/:draw_no", get(draw_handler))
        .route("/api/recent", get(recent_handler))
        .route("/api/range_freq", get(range_freq_handler))
        .route("/api/predict", post(predict_handler))
        .route("/api/last_draw", post(last_draw_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Serve the landing page, injecting the live-fetch flag.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let html = INDEX_HTML.replace(
        r#"<body>"#,
        &format!(r#"<body data-livefetch="{}">"#, state.settings.live_fetch),
    );
    Html(html)
}

/// GET /api/health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "live_fetch": state.settings.live_fetch,
        "stored_draws": state.store.len(),
    }))
}

/// GET /api/latest
async fn latest_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let latest = state.latest_draw_no().await;
    let record = match state.draw(latest).await {
        Some(record) => record,
        None => state.store.latest().unwrap_or_else(DrawRecord::placeholder),
    };
    if record.is_placeholder() {
        debug!("No draws known yet, serving placeholder");
    }
    Json(record)
}

/// GET /api/draw/:draw_no
async fn draw_handler(
    State(state): State<Arc<AppState>>,
    draw_no: Option<Path<u32>>,
) -> impl IntoResponse {
    let item = match draw_no {
        Some(Path(no)) => state.draw(no).await,
        None => None,
    };
    Json(json!({ "item": item }))
}

#[derive(Debug, Default)]
pub struct WindowQuery {
    pub end_no: Option<u32>,
    pub n: Option<u32>,
}

impl WindowQuery {
    /// Each parameter is parsed on its own; an unparsable one is dropped
    /// without discarding the others.
    fn from_params(params: Option<Query<HashMap<String, String>>>) -> Self {
        let Some(Query(params)) = params else {
            return WindowQuery::default();
        };
        let field = |key: &str| params.get(key).and_then(|v| v.trim().parse::<u32>().ok());
        WindowQuery {
            end_no: field("end_no"),
            n: field("n"),
        }
    }
}

#[derive(Debug, Serialize)]
struct RecentResponse {
    end_no: u32,
    n: u32,
    items: Vec<DrawRecord>,
}

/// GET /api/recent?end_no=1122&n=10
async fn recent_handler(
    State(state): State<Arc<AppState>>,
    params: Option<Query<HashMap<String, String>>>,
) -> impl IntoResponse {
    let query = WindowQuery::from_params(params);
    let n = state.clamp_window(query.n);
    let end_no = state.resolve_end(query.end_no).await;
    let items = state.window(end_no, n).await;
    Json(RecentResponse { end_no, n, items })
}

#[derive(Debug, Serialize)]
struct RangeFreqResponse {
    end_no: u32,
    draws: usize,
    #[serde(flatten)]
    summary: RangeSummary,
}

/// GET /api/range_freq?end_no=1122&n=10
async fn range_freq_handler(
    State(state): State<Arc<AppState>>,
    params: Option<Query<HashMap<String, String>>>,
) -> impl IntoResponse {
    let query = WindowQuery::from_params(params);
    let n = state.clamp_window(query.n);
    let end_no = state.resolve_end(query.end_no).await;
    let window = state.window(end_no, n).await;
    Json(RangeFreqResponse {
        end_no,
        draws: window.len(),
        summary: range_frequency(&FrequencyTable::from_draws(&window)),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    pub seed: Option<u64>,
    pub count: Option<usize>,
    pub window: Option<u32>,
    pub end_no: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WindowInfo {
    start_no: u32,
    end_no: u32,
    requested: u32,
    draws: usize,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    label: &'static str,
    basis_draw: u32,
    window: WindowInfo,
    range_freq: RangeSummary,
    #[serde(flatten)]
    report: StrategyReport,
}

/// POST /api/predict
///
/// A missing or malformed body falls back to defaults rather than failing.
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<PredictRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let n = state.clamp_window(req.window);
    let end_no = state.resolve_end(req.end_no).await;
    let window = state.window(end_no, n).await;

    let mut scorer = state.settings.scorer;
    if let Some(count) = req.count {
        scorer.top_k = count.clamp(1, MAX_PREDICT_COUNT);
        scorer.pool_size = scorer.pool_size.max(scorer.top_k);
    }

    let mut rng = rng_from_seed(req.seed);
    let report = score_strategies(&window, &scorer, &mut rng);
    let start_no = window_bounds(end_no, n).map(|(start, _)| start).unwrap_or(0);
    debug!(
        "Predict over draws {}..={} ({} available), best strategy {:?}",
        start_no,
        end_no,
        window.len(),
        report.best_strategy
    );

    Json(PredictResponse {
        label: SCORE_LABEL,
        basis_draw: end_no,
        window: WindowInfo {
            start_no,
            end_no,
            requested: n,
            draws: window.len(),
        },
        range_freq: range_frequency(&FrequencyTable::from_draws(&window)),
        report,
    })
}

/// POST /api/last_draw: the only write endpoint.
async fn last_draw_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DrawInput>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = body.map_err(|_| AppError::BadBody)?;
    let record = DrawRecord::try_from(input)?;

    state.store.upsert(record.clone());
    state.latest_cache.invalidate(&LATEST_KEY).await;
    info!("Stored draw {} via API", record.draw_no);
    Ok(Json(record))
}

/// Embedded single-file landing page (HTML + CSS + JS)
const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Lotto Picker</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; text-transform: uppercase; }
  .badge.offline { background: #ff9800; color: #000; }
  .badge.live { background: var(--green); color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  .panel-body { padding: 1rem 1.2rem; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  tr:last-child td { border-bottom: none; }
  .ball { display: inline-flex; width: 2rem; height: 2rem; border-radius: 50%; align-items: center; justify-content: center; font-weight: 700; margin-right: .25rem; background: var(--accent); color: #fff; }
  .ball.bonus { background: #ff9800; color: #000; }
  .two-col { display: grid; grid-template-columns: 1fr 1fr; gap: 1.5rem; }
  @media (max-width: 768px) { .two-col { grid-template-columns: 1fr; } }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
  button { background: var(--accent); color: #fff; border: none; border-radius: 6px; padding: .45rem 1rem; font-weight: 600; cursor: pointer; }
  .muted { color: var(--muted); font-size: .8rem; }
</style>
</head>
<body>
<header>
  <h1>Lotto Picker</h1>
  <span id="mode-badge" class="badge">…</span>
  <span id="last-updated" class="muted"></span>
</header>
<main>
  <div class="panel">
    <div class="panel-header"><span>최신 회차</span><span id="latest-no" class="muted"></span></div>
    <div class="panel-body" id="latest-balls">Loading…</div>
  </div>
  <div class="two-col">
    <div class="panel">
      <div class="panel-header"><span>최근 당첨 번호</span></div>
      <table>
        <thead><tr><th>회차</th><th>번호</th><th>보너스</th></tr></thead>
        <tbody id="recent-tbody"><tr><td colspan="3" class="empty">Loading…</td></tr></tbody>
      </table>
    </div>
    <div class="panel">
      <div class="panel-header"><span>구간별 빈도</span></div>
      <table>
        <thead><tr><th>구간</th><th>합계</th></tr></thead>
        <tbody id="range-tbody"><tr><td colspan="2" class="empty">Loading…</td></tr></tbody>
      </table>
    </div>
  </div>
  <div class="panel">
    <div class="panel-header"><span>추천 조합</span><button id="predict-btn">추천 받기</button></div>
    <div class="panel-body muted" id="predict-label"></div>
    <table>
      <thead><tr><th>전략</th><th>번호</th><th>Reward</th><th>Risk</th><th>Score</th></tr></thead>
      <tbody id="predict-tbody"><tr><td colspan="5" class="empty">버튼을 눌러 추천을 받으세요</td></tr></tbody>
    </table>
  </div>
</main>

<script>
const balls = (nums, bonus) =>
  nums.map(n => `<span class="ball">${n}</span>`).join('') +
  (bonus ? `<span class="ball bonus">${bonus}</span>` : '');

async function loadLatest() {
  const r = await fetch('/api/latest');
  if (!r.ok) return;
  const d = await r.json();
  document.getElementById('latest-no').textContent = d.draw_no > 0 ? `${d.draw_no}회 ${d.date || ''}` : '데이터 없음';
  document.getElementById('latest-balls').innerHTML = balls(d.numbers, d.bonus);
}

async function loadRecent() {
  const r = await fetch('/api/recent?n=10');
  if (!r.ok) return;
  const d = await r.json();
  const tbody = document.getElementById('recent-tbody');
  if (!d.items.length) { tbody.innerHTML = '<tr><td colspan="3" class="empty">저장된 회차가 없습니다</td></tr>'; return; }
  tbody.innerHTML = d.items.slice().reverse().map(i => `<tr>
    <td>${i.draw_no}</td><td>${i.numbers.join(', ')}</td><td>${i.bonus ?? '–'}</td></tr>`).join('');
}

async function loadRanges() {
  const r = await fetch('/api/range_freq?n=10');
  if (!r.ok) return;
  const d = await r.json();
  document.getElementById('range-tbody').innerHTML = d.ranges.map(b => `<tr>
    <td>${b.label}${d.top_ranges.includes(b.label) ? ' ▲' : ''}${d.bottom_range === b.label ? ' ▼' : ''}</td>
    <td>${b.total}</td></tr>`).join('');
}

async function predict() {
  const r = await fetch('/api/predict', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ count: 5 }),
  });
  if (!r.ok) return;
  const d = await r.json();
  document.getElementById('predict-label').textContent =
    `${d.label} · 기준 ${d.basis_draw}회 · ${d.window.draws}개 회차`;
  const tbody = document.getElementById('predict-tbody');
  if (!d.best_overall.length) { tbody.innerHTML = '<tr><td colspan="5" class="empty">후보가 없습니다</td></tr>'; return; }
  tbody.innerHTML = d.best_overall.map(c => `<tr>
    <td>${c.name_ko}</td><td>${balls(c.numbers)}</td>
    <td>${c.reward.toFixed(2)}</td><td>${c.risk.toFixed(2)}</td><td>${c.score.toFixed(3)}</td></tr>`).join('');
}

async function loadAll() {
  await Promise.all([loadLatest(), loadRecent(), loadRanges()]);
  document.getElementById('last-updated').textContent = 'Updated ' + new Date().toLocaleTimeString();
}

document.getElementById('predict-btn').addEventListener('click', predict);
loadAll();
setInterval(loadAll, 60000);

document.addEventListener('DOMContentLoaded', () => {
  const live = document.body.dataset.livefetch === 'true';
  const badge = document.getElementById('mode-badge');
  badge.textContent = live ? 'Live' : 'Offline';
  badge.className = 'badge ' + (live ? 'live' : 'offline');
});
</script>
</body>
</html>"#;
