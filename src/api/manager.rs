//! Discovers and bootstraps every network reachable from one entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::{info, warn};
use tokio::sync::Mutex;

use crate::api::error::{ApiError, ApiResult};
use crate::api::session::{ClientSettings, NetworkSession};

pub struct NetworkManager {
    settings: ClientSettings,
    client: reqwest::Client,
    sessions: RwLock<Vec<Arc<NetworkSession>>>,
    init_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl NetworkManager {
    pub fn new(settings: ClientSettings) -> ApiResult<Self> {
        let client = settings
            .http_client()
            .map_err(|source| ApiError::Transport {
                url: settings.entry_url.clone(),
                source,
            })?;

        Ok(Self {
            settings,
            client,
            sessions: RwLock::new(Vec::new()),
            init_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Bootstraps the entry network, then every active, non-blocked sibling it
    /// lists. Any failure aborts the whole initialization. Calling it again
    /// after success only logs a warning.
    pub async fn init(&self) -> ApiResult<()> {
        let _guard = self.init_lock.lock().await;

        if self.is_initialized() {
            warn!("Trying to double-initialize network manager, ignoring");
            return Ok(());
        }

        let entry = self.session_for(&self.settings.entry_url);
        entry.refresh_credentials().await.map_err(|e| {
            warn!("Can not make first-fetch: {e}");
            ApiError::initialization(self.settings.entry_url.clone(), e)
        })?;

        let entry_id = entry.network_id()?;
        let config = entry.config()?;
        let mut sessions = vec![Arc::new(entry)];

        for network in &config.networks {
            if !network.active
                || network.id == entry_id
                || network.is_blocked(&self.settings.blocked_networks)
            {
                continue;
            }

            let session = self.session_for(&network.url);
            session.refresh_credentials().await.map_err(|e| {
                let name = format!("{}#{}", network.key, network.id);
                warn!("Network {name} initializing error: {e}");
                ApiError::initialization(name, e)
            })?;

            sessions.push(Arc::new(session));
        }

        info!("Initialized {} networks", sessions.len());

        *self.sessions.write().unwrap_or_else(PoisonError::into_inner) = sessions;
        self.initialized.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Sessions in listing order, entry network first.
    pub fn active_networks(&self) -> Vec<Arc<NetworkSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn network(&self, network_id: u64) -> Option<Arc<NetworkSession>> {
        self.active_networks()
            .into_iter()
            .find(|s| s.network_id().ok() == Some(network_id))
    }

    pub fn network_by_key(&self, key: &str) -> Option<Arc<NetworkSession>> {
        self.active_networks()
            .into_iter()
            .find(|s| s.network_key().is_ok_and(|k| k.eq_ignore_ascii_case(key)))
    }

    fn session_for(&self, url: &str) -> NetworkSession {
        NetworkSession::with_client(url, self.client.clone(), self.settings.retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::session::tests::bootstrap_page;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn listing(server: &MockServer) -> Value {
        json!([
            { "id": 1, "key": "a", "name": "A", "url": server.uri(), "active": true },
            { "id": 2, "key": "b", "name": "B", "url": format!("{}/b", server.uri()), "active": false },
            { "id": 3, "key": "c", "name": "C", "url": format!("{}/c", server.uri()), "active": true }
        ])
    }

    fn config(server: &MockServer, key: &str) -> Value {
        json!({
            "network_key": key,
            "networks": listing(server),
            "channels": [{ "id": 10, "name": format!("{key} channel"), "network_id": 1 }],
            "user": { "audio_token": "t", "session_key": "s" },
            "api": { "urlRoot": format!("{}/v1", server.uri()) }
        })
    }

    async fn mount_network(server: &MockServer, at: &str, key: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(bootstrap_page(&config(server, key), "tok")),
            )
            .expect(times)
            .mount(server)
            .await;
    }

    fn settings(server: &MockServer, blocked: &[&str]) -> ClientSettings {
        ClientSettings {
            entry_url: server.uri(),
            blocked_networks: blocked.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(5),
            ..ClientSettings::default()
        }
    }

    fn ids(manager: &NetworkManager) -> Vec<u64> {
        manager
            .active_networks()
            .iter()
            .map(|s| s.network_id().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_inactive_and_blocked_networks_are_skipped() {
        let server = MockServer::start().await;
        mount_network(&server, "/", "a", 1).await;
        mount_network(&server, "/b", "b", 0).await;
        mount_network(&server, "/c", "c", 0).await;

        let manager = NetworkManager::new(settings(&server, &["c"])).unwrap();
        manager.init().await.unwrap();

        assert_eq!(ids(&manager), vec![1]);
    }

    #[tokio::test]
    async fn test_active_networks_follow_listing_order() {
        let server = MockServer::start().await;
        mount_network(&server, "/", "a", 1).await;
        mount_network(&server, "/b", "b", 0).await;
        mount_network(&server, "/c", "c", 1).await;

        let manager = NetworkManager::new(settings(&server, &[])).unwrap();
        manager.init().await.unwrap();

        assert_eq!(ids(&manager), vec![1, 3]);
        assert_eq!(
            manager.network(3).unwrap().channel_names().unwrap(),
            vec!["c channel".to_string()]
        );
        assert_eq!(manager.network_by_key("C").unwrap().network_id().unwrap(), 3);
        assert!(manager.network(2).is_none());
    }

    #[tokio::test]
    async fn test_double_init_is_a_no_op() {
        let server = MockServer::start().await;
        mount_network(&server, "/", "a", 1).await;

        let manager = NetworkManager::new(settings(&server, &["c"])).unwrap();
        manager.init().await.unwrap();
        manager.init().await.unwrap();

        assert!(manager.is_initialized());
        assert_eq!(ids(&manager), vec![1]);
    }

    #[tokio::test]
    async fn test_failing_sibling_aborts_initialization() {
        let server = MockServer::start().await;
        mount_network(&server, "/", "a", 1).await;
        Mock::given(method("GET"))
            .and(path("/c"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let manager = NetworkManager::new(settings(&server, &[])).unwrap();
        let err = manager.init().await.unwrap_err();

        match err {
            ApiError::Initialization { network, source } => {
                assert_eq!(network, "c#3");
                assert_eq!(source.status(), Some(500));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!manager.is_initialized());
        assert!(manager.active_networks().is_empty());
    }

    #[tokio::test]
    async fn test_failing_entry_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let manager = NetworkManager::new(settings(&server, &[])).unwrap();
        let err = manager.init().await.unwrap_err();
        assert!(matches!(err, ApiError::Initialization { .. }));
    }
}
