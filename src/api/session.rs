//! One network's live credentials and authenticated HTTP access.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_TYPE, PRAGMA, REFERER,
};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::extract;
use crate::api::resolver;
use crate::api::{AppConfig, Channel, PlaylistProgress, PlaylistSearch, PlaylistSearchResult, Routine, Track};
use crate::utils::query::encode_query;
use crate::utils::urls::https_url;

pub const DEFAULT_ENTRY_URL: &str = "https://www.di.fm";
pub const DEFAULT_RETRIES: u32 = 2;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json, text/javascript, */*; q=0.01";

/// Knobs shared by every session a manager creates.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub entry_url: String,
    pub blocked_networks: Vec<String>,
    /// 401 retry budget granted to each top-level request.
    pub retries: u32,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            entry_url: DEFAULT_ENTRY_URL.to_string(),
            blocked_networks: vec!["zenradio".to_string()],
            retries: DEFAULT_RETRIES,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientSettings {
    /// Client for bootstrap pages and API calls: bounded end to end.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(browser_headers())
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()
    }

    /// Client for audio downloads. A track may take an hour to arrive at
    /// playback speed, so only connecting and individual reads are bounded.
    pub fn media_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .default_headers(browser_headers())
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.timeout)
            .build()
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
    headers
}

/// How a single API call should be built.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    /// Address the API root instead of the network-scoped base.
    pub root: bool,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            root: false,
            query: None,
            body: None,
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get()
        }
    }

    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }
}

/// Everything one bootstrap produced. Replaced as a whole, never patched.
#[derive(Debug)]
struct SessionState {
    generation: u64,
    csrf_token: String,
    config: Arc<AppConfig>,
    network_id: u64,
}

pub struct NetworkSession {
    url: String,
    client: reqwest::Client,
    retries: u32,
    state: RwLock<Option<Arc<SessionState>>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for NetworkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSession")
            .field("url", &self.url)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl NetworkSession {
    pub fn new(url: impl Into<String>, settings: &ClientSettings) -> ApiResult<Self> {
        let url = url.into();
        let client = settings
            .http_client()
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self::with_client(url, client, settings.retries))
    }

    /// Builds a session on top of an existing client (the manager shares one
    /// connection pool between all networks).
    pub fn with_client(url: impl Into<String>, client: reqwest::Client, retries: u32) -> Self {
        Self {
            url: url.into(),
            client,
            retries,
            state: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn website_url(&self) -> &str {
        &self.url
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    pub fn config(&self) -> ApiResult<Arc<AppConfig>> {
        Ok(Arc::clone(&self.snapshot()?.config))
    }

    pub fn network_id(&self) -> ApiResult<u64> {
        Ok(self.snapshot()?.network_id)
    }

    pub fn network_key(&self) -> ApiResult<String> {
        Ok(self.snapshot()?.config.network_key.clone())
    }

    /// Display name of the network, falling back to its key.
    pub fn network_name(&self) -> ApiResult<String> {
        let state = self.snapshot()?;
        let config = &state.config;
        let name = config
            .self_network()
            .map(|n| n.name.as_str())
            .filter(|n| !n.is_empty())
            .or(Some(config.network_name.as_str()).filter(|n| !n.is_empty()))
            .unwrap_or(config.network_key.as_str());
        Ok(name.to_string())
    }

    pub fn csrf_token(&self) -> ApiResult<String> {
        Ok(self.snapshot()?.csrf_token.clone())
    }

    /// Re-scrapes the bootstrap page and swaps in the new credentials and catalog.
    pub async fn refresh_credentials(&self) -> ApiResult<Arc<AppConfig>> {
        let _guard = self.refresh_lock.lock().await;
        self.bootstrap().await
    }

    /// Refreshes unless somebody else already did since `seen` was issued.
    async fn refresh_after(&self, seen: u64) -> ApiResult<()> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(state) = self.current() {
            if state.generation != seen {
                debug!("Credentials of {} already refreshed, reusing them", self.url);
                return Ok(());
            }
        }

        self.bootstrap().await.map(|_| ())
    }

    // Callers must hold `refresh_lock`.
    async fn bootstrap(&self) -> ApiResult<Arc<AppConfig>> {
        debug!("Request: GET {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, ACCEPT_HTML)
            .header(REFERER, self.url.as_str())
            .send()
            .await
            .map_err(|source| self.transport(&self.url, source))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Error response {} {}", status.as_u16(), status_text(status));
            return Err(ApiError::BootstrapFetch {
                url: self.url.clone(),
                status: status.as_u16(),
                status_text: status_text(status),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| self.transport(&self.url, source))?;

        let document = extract(&body).map_err(|source| ApiError::BootstrapParse {
            url: self.url.clone(),
            source,
        })?;

        let config: AppConfig =
            serde_json::from_value(document.config).map_err(|source| ApiError::ConfigShape {
                url: self.url.clone(),
                source,
            })?;

        let network_id = config
            .self_network()
            .map(|n| n.id)
            .ok_or_else(|| ApiError::SelfNetworkNotFound {
                url: self.url.clone(),
                network_key: config.network_key.clone(),
            })?;

        let config = Arc::new(config);
        let mut slot = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let generation = slot.as_ref().map_or(0, |s| s.generation + 1);
        *slot = Some(Arc::new(SessionState {
            generation,
            csrf_token: document.csrf_token,
            config: Arc::clone(&config),
            network_id,
        }));
        drop(slot);

        info!(
            "Network {} initialized: {}#{}, {} channels",
            self.url,
            config.network_key,
            network_id,
            config.channels.len()
        );

        Ok(config)
    }

    /// Performs an authenticated API call.
    ///
    /// A 401 answer refreshes the credentials and re-issues the call, at most
    /// `retries` times per invocation. Any other non-2xx status, or a 401 once
    /// the budget is spent, becomes [`ApiError::ApiRequest`].
    pub async fn request(&self, path: &str, options: RequestOptions) -> ApiResult<Response> {
        let mut retries_left = self.retries;

        loop {
            let state = self.snapshot()?;
            let url = self.api_url(&state, path, &options);

            debug!("Request: {} {}", options.method, url);

            let mut builder = self
                .client
                .request(options.method.clone(), &url)
                .header(ACCEPT, ACCEPT_JSON)
                .header(CONTENT_TYPE, "application/json")
                .header(REFERER, self.url.as_str())
                .header("x-csrf-token", state.csrf_token.as_str());

            let session_key = &state.config.user.session_key;
            if !session_key.is_empty() {
                builder = builder.header("x-session-key", session_key.as_str());
            }
            if let Some(body) = &options.body {
                builder = builder.body(body.to_string());
            }

            let response = builder
                .send()
                .await
                .map_err(|source| self.transport(&url, source))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            warn!("Error response {} {}", status.as_u16(), status_text(status));

            if status == StatusCode::UNAUTHORIZED && retries_left > 0 {
                info!(
                    "Update credentials and retry... Retries: {}",
                    retries_left
                );
                retries_left -= 1;
                self.refresh_after(state.generation).await?;
                continue;
            }

            return Err(ApiError::ApiRequest {
                url,
                status: status.as_u16(),
                status_text: status_text(status),
            });
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let response = self.request(path, options).await?;
        let url = response.url().to_string();
        response
            .json()
            .await
            .map_err(|source| ApiError::Decode { url, source })
    }

    pub async fn ping(&self) -> ApiResult<Value> {
        self.request_json("/ping", RequestOptions::get().root()).await
    }

    pub async fn channel(&self, channel_id: u64) -> ApiResult<Channel> {
        self.request_json(&format!("/channels/{channel_id}"), RequestOptions::get())
            .await
    }

    /// Current routine (track queue) of a channel.
    pub async fn tune_in(&self, channel_id: u64) -> ApiResult<Routine> {
        let audio_token = self.snapshot()?.config.user.audio_token.clone();
        let options = RequestOptions::get().query(json!({
            "tune_in": true,
            "audio_token": audio_token,
        }));
        self.request_json(&format!("/routines/channel/{channel_id}"), options)
            .await
    }

    pub async fn listen_history_channel(&self, channel_id: u64, track_id: u64) -> ApiResult<()> {
        let body = json!({ "track_id": track_id, "channel_id": channel_id });
        self.request("/listen_history", RequestOptions::post(body))
            .await
            .map(|_| ())
    }

    pub async fn listen_history_playlist(&self, playlist_id: u64, track_id: u64) -> ApiResult<()> {
        let body = json!({ "track_id": track_id, "playlist_id": playlist_id });
        self.request("/listen_history", RequestOptions::post(body))
            .await
            .map(|_| ())
    }

    pub async fn search_playlists(&self, search: &PlaylistSearch) -> ApiResult<PlaylistSearchResult> {
        let options = RequestOptions::get().query(json!({
            "page": search.page,
            "per_page": search.per_page,
            "facets": { "tag_name": search.facets },
        }));
        self.request_json("/search/playlists", options).await
    }

    pub async fn playlist(&self, playlist_id: u64) -> ApiResult<Vec<Track>> {
        self.request_json(
            &format!("/playlist_collections/{playlist_id}"),
            RequestOptions::get(),
        )
        .await
    }

    pub async fn play_playlist(&self, playlist_id: u64) -> ApiResult<PlaylistProgress> {
        self.request_json(&format!("/playlists/{playlist_id}/play"), RequestOptions::get())
            .await
    }

    /// Resolves a human search string against the current catalog.
    pub fn find_channel_id(&self, search: &str) -> ApiResult<Option<u64>> {
        Ok(resolver::resolve(search, &self.snapshot()?.config.channels))
    }

    pub fn channel_names(&self) -> ApiResult<Vec<String>> {
        Ok(self.snapshot()?.config.channel_names())
    }

    fn current(&self) -> Option<Arc<SessionState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self) -> ApiResult<Arc<SessionState>> {
        self.current().ok_or_else(|| ApiError::NotInitialized {
            url: self.url.clone(),
        })
    }

    fn api_url(&self, state: &SessionState, path: &str, options: &RequestOptions) -> String {
        let root = https_url(&state.config.api.url_root);
        let root = root.trim_end_matches('/');

        let mut url = if options.root {
            format!("{root}{path}")
        } else {
            format!("{root}/{}{path}", state.config.network_key)
        };

        if let Some(query) = &options.query {
            let encoded = encode_query(query);
            if !encoded.is_empty() {
                url.push('?');
                url.push_str(&encoded);
            }
        }

        url
    }

    fn transport(&self, url: &str, source: reqwest::Error) -> ApiError {
        warn!("Request error: {source}");
        ApiError::Transport {
            url: url.to_string(),
            source,
        }
    }
}

fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}
