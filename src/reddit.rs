use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Result};
use parking_lot::RwLock;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://oauth.reddit.com/";

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Result<OAuthToken>;
}

#[derive(Debug, Clone)]
pub struct OAuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: Option<SystemTime>,
}

/// Serves one fixed bearer token. Enough for scripts and tests; interactive
/// apps plug in a session-backed provider instead.
pub struct StaticTokenProvider {
    token: OAuthToken,
}

impl StaticTokenProvider {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            token: OAuthToken {
                access_token: access_token.into(),
                token_type: "bearer".into(),
                expires_at: None,
            },
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<OAuthToken> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<u32>,
    pub time_range: Option<TimeRange>,
    pub extra: Vec<(String, String)>,
}

impl ListingOptions {
    fn into_params(self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(after) = self.after {
            params.push(("after".into(), after));
        }
        if let Some(before) = self.before {
            params.push(("before".into(), before));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(range) = self.time_range {
            params.push(("t".into(), range.as_str().into()));
        }
        params.extend(self.extra);
        params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Hot,
    New,
    Top,
    Best,
    Rising,
}

impl SortOption {
    fn as_str(&self) -> &'static str {
        match self {
            SortOption::Hot => "hot",
            SortOption::New => "new",
            SortOption::Top => "top",
            SortOption::Best => "best",
            SortOption::Rising => "rising",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeRange {
    fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Hour => "hour",
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
            TimeRange::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommentSortOption {
    #[default]
    Confidence,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSortOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSortOption::Confidence => "confidence",
            CommentSortOption::Top => "top",
            CommentSortOption::New => "new",
            CommentSortOption::Controversial => "controversial",
            CommentSortOption::Old => "old",
            CommentSortOption::Qa => "qa",
        }
    }
}

/// Parameters shared by the three comment-fetch shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommentOptions {
    pub limit: Option<u32>,
    pub depth: Option<u32>,
    pub sort: CommentSortOption,
}

impl CommentOptions {
    fn into_params(self) -> Vec<(String, String)> {
        let mut params = vec![("sort".to_string(), self.sort.as_str().to_string())];
        if let Some(limit) = self.limit {
            params.push(("limit".into(), limit.to_string()));
        }
        if let Some(depth) = self.depth {
            params.push(("depth".into(), depth.to_string()));
        }
        params
    }
}

pub struct Client {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    rate: RwLock<RateLimit>,
}

#[derive(Debug, Clone, Default)]
pub struct RateLimit {
    pub used: f64,
    pub remaining: f64,
    pub reset_at: Option<SystemTime>,
}

impl Client {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("reddit: client user agent required");
        }
        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            token_provider,
            http,
            user_agent: config.user_agent,
            base_url,
            rate: RwLock::new(RateLimit::default()),
        })
    }

    pub fn rate_limit(&self) -> RateLimit {
        self.rate.read().clone()
    }

    pub fn subreddit_listing(
        &self,
        subreddit: &str,
        sort: SortOption,
        opts: ListingOptions,
    ) -> Result<Listing<Post>> {
        let path = if subreddit.is_empty() {
            format!("/{}.json", sort.as_str())
        } else {
            format!(
                "/r/{}/{}.json",
                subreddit.trim_start_matches("r/"),
                sort.as_str()
            )
        };
        self.fetch_listing(&path, opts)
    }

    pub fn front_page(&self, sort: SortOption, opts: ListingOptions) -> Result<Listing<Post>> {
        self.subreddit_listing("", sort, opts)
    }

    /// Initial post-detail fetch. Returns the raw two-element payload
    /// (post listing + comment listing); the pagination layer owns its
    /// interpretation because `more` stubs interleave with real comments.
    pub fn post_detail(
        &self,
        subreddit: &str,
        article: &str,
        opts: CommentOptions,
    ) -> Result<Vec<Value>> {
        if article.trim().is_empty() {
            bail!("reddit: post detail requires an article id");
        }
        self.fetch_comment_pair(&comments_path(subreddit, article), opts)
    }

    /// Focused single-thread fetch; `path` comes from the pagination cursor
    /// (permalink plus target comment id). Same wire shape as `post_detail`.
    pub fn focused_thread(&self, path: &str, opts: CommentOptions) -> Result<Vec<Value>> {
        self.fetch_comment_pair(&json_path(path), opts)
    }

    /// Batch children hydration via `/api/morechildren`. Returns the raw
    /// `things` element array.
    pub fn more_children(
        &self,
        link_fullname: &str,
        children_csv: &str,
        opts: CommentOptions,
    ) -> Result<Value> {
        if children_csv.trim().is_empty() {
            bail!("reddit: morechildren requires child ids");
        }
        let mut params = vec![
            ("api_type".to_string(), "json".to_string()),
            ("link_id".to_string(), link_fullname.to_string()),
            ("children".to_string(), children_csv.to_string()),
        ];
        params.extend(opts.into_params());

        let resp = self.request(Method::GET, "/api/morechildren.json", &params)?;
        let payload: MoreChildrenResponse = resp.json()?;
        if let Some(err) = payload.json.errors.first() {
            let joined = err
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            bail!("reddit: morechildren error: {}", joined);
        }
        Ok(payload.json.data.things)
    }

    fn fetch_comment_pair(&self, path: &str, opts: CommentOptions) -> Result<Vec<Value>> {
        let resp = self.request(Method::GET, path, &opts.into_params())?;
        let payload: Vec<Value> = resp.json()?;
        if payload.len() < 2 {
            bail!("reddit: comments payload missing elements");
        }
        Ok(payload)
    }

    fn fetch_listing<T>(&self, path: &str, opts: ListingOptions) -> Result<Listing<T>>
    where
        T: DeserializeOwned,
    {
        let params = opts.into_params();
        let resp = self.request(Method::GET, path, &params)?;
        let listing: ListingEnvelope<T> = resp.json()?;
        Ok(listing.data)
    }

    fn request(&self, method: Method, path: &str, params: &[(String, String)]) -> Result<Response> {
        let token = self.token_provider.token()?;
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        debug!(%method, path, "reddit request");

        let req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token.access_token));

        let resp = req.send()?;
        self.capture_rate(resp.headers());
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            debug!(%status, "reddit request failed");
            match status.as_u16() {
                401 => Err(anyhow!("reddit: unauthorized")),
                403 => Err(anyhow!("reddit: forbidden")),
                429 => Err(anyhow!("reddit: rate limited: {}", body)),
                _ => Err(anyhow!("reddit: api error {}: {}", status, body)),
            }
        }
    }

    fn capture_rate(&self, headers: &HeaderMap) {
        let remaining = header_float(headers, "x-ratelimit-remaining");
        let used = header_float(headers, "x-ratelimit-used");
        let reset = header_float(headers, "x-ratelimit-reset");
        if remaining == 0.0 && used == 0.0 && reset == 0.0 {
            return;
        }
        if remaining < 10.0 {
            warn!(remaining, "reddit rate limit nearly exhausted");
        }
        let reset_at = SystemTime::now().checked_add(Duration::from_secs_f64(reset.max(0.0)));
        let mut rate = self.rate.write();
        rate.remaining = remaining;
        rate.used = used;
        rate.reset_at = reset_at;
    }
}

fn comments_path(subreddit: &str, article: &str) -> String {
    let base = subreddit.trim_start_matches("r/");
    if base.is_empty() {
        format!("/comments/{}.json", article)
    } else {
        format!("/r/{}/comments/{}.json", base, article)
    }
}

fn json_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.ends_with(".json") {
        trimmed.to_string()
    } else {
        format!("{}.json", trimmed)
    }
}

fn header_float(headers: &HeaderMap, key: &str) -> f64 {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub after: Option<String>,
    pub before: Option<String>,
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub name: String,
    pub title: String,
    pub subreddit: String,
    pub author: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub spoiler: bool,
}

impl Post {
    pub fn created_at(&self) -> Option<SystemTime> {
        if self.created_utc == 0.0 {
            return None;
        }
        let secs = self.created_utc.trunc() as u64;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ListingEnvelope<T> {
    pub kind: String,
    pub data: Listing<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct MoreChildrenResponse {
    json: MoreChildrenBody,
}

#[derive(Debug, Clone, Deserialize)]
struct MoreChildrenBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    data: MoreChildrenData,
}

#[derive(Debug, Clone, Deserialize)]
struct MoreChildrenData {
    things: Value,
}
