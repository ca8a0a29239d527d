use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Parser};
use std::time::Duration;

use crate::sync::LocatePolicy;

/// Date of draw #1; one draw per week since.
const FIRST_DRAW_DATE: (i32, u32, u32) = (2002, 12, 7);

/// Lotto draw cache and number recommendation service
#[derive(Parser, Debug, Clone)]
#[command(name = "lotto-picker", version, about)]
pub struct Config {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8000")]
    pub listen_addr: String,

    /// Directory holding the draw store (draws.json)
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: String,

    /// Upstream draw-result endpoint (queried with method=getLottoNumber&drwNo=N)
    #[arg(
        long,
        env = "LOTTO_API_URL",
        default_value = "https://www.dhlottery.co.kr/common.do"
    )]
    pub lotto_api_url: String,

    /// Allow any remote fetch at all (false = serve cached draws only)
    #[arg(long, env = "LIVE_FETCH", default_value_t = true, action = ArgAction::Set)]
    pub live_fetch: bool,

    /// Allow request handlers to fill gaps from upstream (bounded)
    #[arg(long, env = "SYNC_FETCH", default_value_t = true, action = ArgAction::Set)]
    pub sync_fetch: bool,

    /// Cold-start anchor guess for the newest draw number (estimated from the calendar if unset)
    #[arg(long, env = "ANCHOR_DRAW_NO")]
    pub anchor_draw_no: Option<u32>,

    /// Per-request upstream timeout in milliseconds
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value = "3000")]
    pub fetch_timeout_ms: u64,

    /// Base delay before an upstream retry in milliseconds (doubles per attempt)
    #[arg(long, env = "FETCH_BACKOFF_MS", default_value = "200")]
    pub fetch_backoff_ms: u64,

    /// Retries after the first upstream attempt
    #[arg(long, env = "FETCH_RETRIES", default_value = "1")]
    pub fetch_retries: u32,

    /// How many draws past the newest stored one a request may probe
    #[arg(long, env = "FORWARD_PROBES", default_value = "5")]
    pub forward_probes: u32,

    /// How many draws below the anchor a cold start may probe
    #[arg(long, env = "COLD_START_PROBES", default_value = "8")]
    pub cold_start_probes: u32,

    /// Cap on upstream fills per request window
    #[arg(long, env = "MAX_SYNC_FETCHES", default_value = "20")]
    pub max_sync_fetches: usize,

    /// Background refresh period in seconds
    #[arg(long, env = "REFRESH_INTERVAL_SECS", default_value = "300")]
    pub refresh_interval_secs: u64,

    /// Number of recent draws the background refresher keeps warm
    #[arg(long, env = "REFRESH_WINDOW", default_value = "100")]
    pub refresh_window: u32,

    /// Default window size for /api/recent, /api/range_freq and /api/predict
    #[arg(long, env = "DEFAULT_WINDOW", default_value = "10")]
    pub default_window: u32,

    /// Largest window a request may ask for
    #[arg(long, env = "MAX_WINDOW", default_value = "200")]
    pub max_window: u32,

    /// Candidates kept per strategy
    #[arg(long, env = "TOP_K", default_value = "5")]
    pub top_k: usize,

    /// Distinct candidates generated per strategy before ranking
    #[arg(long, env = "POOL_SIZE", default_value = "64")]
    pub pool_size: usize,

    /// How long a located latest draw number is trusted, in seconds
    #[arg(long, env = "LATEST_CACHE_TTL_SECS", default_value = "300")]
    pub latest_cache_ttl_secs: u64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.live_fetch {
            let url = url::Url::parse(&self.lotto_api_url)
                .map_err(|e| anyhow::anyhow!("LOTTO_API_URL is not a valid URL: {}", e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("LOTTO_API_URL must be http or https");
            }
        }
        if self.fetch_timeout_ms == 0 {
            anyhow::bail!("fetch_timeout_ms must be positive");
        }
        if self.fetch_retries > 2 {
            anyhow::bail!("fetch_retries must be between 0 and 2");
        }
        if !(1..=8).contains(&self.forward_probes) {
            anyhow::bail!("forward_probes must be between 1 and 8");
        }
        if !(1..=64).contains(&self.cold_start_probes) {
            anyhow::bail!("cold_start_probes must be between 1 and 64");
        }
        if self.refresh_interval_secs < 10 {
            anyhow::bail!("refresh_interval_secs must be at least 10");
        }
        if self.max_window == 0 || self.default_window == 0 {
            anyhow::bail!("window sizes must be positive");
        }
        if self.default_window > self.max_window {
            anyhow::bail!("default_window must not exceed max_window");
        }
        if !(1..=50).contains(&self.top_k) {
            anyhow::bail!("top_k must be between 1 and 50");
        }
        if self.pool_size < self.top_k {
            anyhow::bail!("pool_size must be at least top_k");
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }

    /// Configured anchor, or a calendar estimate for today.
    pub fn anchor(&self) -> u32 {
        self.anchor_draw_no
            .unwrap_or_else(|| estimate_draw_no(Utc::now().date_naive()))
    }

    pub fn locate_policy(&self) -> LocatePolicy {
        LocatePolicy {
            forward_probes: self.forward_probes,
            cold_start_anchor: self.anchor(),
            cold_start_probes: self.cold_start_probes,
            ..LocatePolicy::default()
        }
    }
}

/// Rough draw number for `today`: weekly draws counted from draw #1.
/// Returns 0 for dates before the first draw.
pub fn estimate_draw_no(today: NaiveDate) -> u32 {
    let (y, m, d) = FIRST_DRAW_DATE;
    let Some(first) = NaiveDate::from_ymd_opt(y, m, d) else {
        return 0;
    };
    let days = (today - first).num_days();
    if days < 0 {
        return 0;
    }
    u32::try_from(days / 7 + 1).unwrap_or(u32::MAX)
}
