//! Client for the AudioAddict family of radio networks.
//!
//! The websites only expose their session configuration inside server
//! rendered HTML, so every [`session::NetworkSession`] scrapes its own
//! bootstrap page and then talks to the JSON API with the scraped
//! credentials.

pub mod error;
pub mod extract;
pub mod manager;
pub mod media;
pub mod resolver;
pub mod session;

use serde::{Deserialize, Deserializer, Serialize};

use crate::utils::urls::https_url;

pub use error::{ApiError, ApiResult};
pub use manager::NetworkManager;
pub use session::{ClientSettings, NetworkSession};

/// A peer network listed in every network's configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NetworkDescriptor {
    pub id: u64,
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

impl NetworkDescriptor {
    pub fn is_blocked(&self, blocklist: &[String]) -> bool {
        blocklist.iter().any(|key| key == &self.key)
    }
}

/// One channel of a network. Catalog entries and `/channels/{id}` share this shape.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Channel {
    pub id: u64,
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub network_id: u64,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub description_short: Option<String>,
}

impl Channel {
    pub fn cover_url(&self) -> Option<String> {
        self.asset_url.as_deref().filter(|u| !u.is_empty()).map(https_url)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserCredentials {
    #[serde(default)]
    pub audio_token: String,
    #[serde(default)]
    pub session_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiEndpoint {
    #[serde(rename = "urlRoot")]
    pub url_root: String,
}

/// The configuration object a network embeds in its bootstrap page.
///
/// Only the fields the client reads are modelled; everything else in the
/// (large) upstream object is ignored. A value is never mutated after it is
/// parsed: sessions hand out `Arc<AppConfig>` snapshots and replace them
/// wholesale on refresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub network_key: String,
    #[serde(default)]
    pub network_name: String,
    pub networks: Vec<NetworkDescriptor>,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub user: UserCredentials,
    pub api: ApiEndpoint,
}

impl AppConfig {
    /// The entry of `networks` describing the network this config belongs to.
    pub fn self_network(&self) -> Option<&NetworkDescriptor> {
        self.networks.iter().find(|n| n.key == self.network_key)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TrackAsset {
    pub url: String,
    #[serde(default)]
    pub content_format_id: Option<u64>,
    #[serde(default)]
    pub content_quality_id: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TrackContent {
    #[serde(default, deserialize_with = "deserialize_seconds")]
    pub length: f64,
    #[serde(default)]
    pub assets: Vec<TrackAsset>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Track {
    pub id: u64,
    #[serde(default)]
    pub display_artist: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub content: TrackContent,
}

impl Track {
    pub fn length_seconds(&self) -> f64 {
        self.content.length
    }

    /// Stream asset URLs in backend order, normalised to absolute https URLs.
    pub fn stream_urls(&self) -> Vec<String> {
        self.content.assets.iter().map(|a| https_url(&a.url)).collect()
    }

    pub fn stream_url(&self) -> Option<String> {
        self.content.assets.first().map(|a| https_url(&a.url))
    }

    pub fn cover_url(&self) -> Option<String> {
        self.asset_url.as_deref().filter(|u| !u.is_empty()).map(https_url)
    }
}

/// A channel's current track queue snapshot.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Routine {
    pub channel_id: u64,
    #[serde(default)]
    pub expires_on: Option<String>,
    #[serde(default)]
    pub routine_id: Option<u64>,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlaylistProgressCounters {
    #[serde(default)]
    pub played_tracks: u32,
    #[serde(default)]
    pub remaining_tracks: u32,
    #[serde(default)]
    pub percent_complete: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistProgress {
    pub id: u64,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub last_tracks: bool,
    #[serde(default)]
    pub current_progress: PlaylistProgressCounters,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchFacet {
    pub label: String,
    pub field: String,
    pub name: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchMetadata {
    #[serde(default)]
    pub facets: Vec<SearchFacet>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaylistSearchResult {
    #[serde(default)]
    pub metadata: SearchMetadata,
    #[serde(default)]
    pub results: Vec<PlaylistSummary>,
}

/// Parameters for `/search/playlists`.
#[derive(Debug, Clone)]
pub struct PlaylistSearch {
    pub page: u32,
    pub per_page: u32,
    pub facets: Vec<String>,
}

impl Default for PlaylistSearch {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            facets: Vec::new(),
        }
    }
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(f64),
        Null(()),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::Null(()) => Ok(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_track_normalises_protocol_relative_assets() {
        let track: Track = serde_json::from_value(json!({
            "id": 11,
            "display_artist": "Artist",
            "display_title": "Title",
            "asset_url": "//cdn.example.com/cover.jpg",
            "content": {
                "length": "312.5",
                "assets": [
                    { "url": "//streams.example.com/a.mp4" },
                    { "url": "https://streams.example.com/b.mp4" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(track.length_seconds(), 312.5);
        assert_eq!(
            track.stream_urls(),
            vec![
                "https://streams.example.com/a.mp4".to_string(),
                "https://streams.example.com/b.mp4".to_string()
            ]
        );
        assert_eq!(track.cover_url().as_deref(), Some("https://cdn.example.com/cover.jpg"));
    }

    #[test]
    fn test_track_without_content_has_no_stream() {
        let track: Track = serde_json::from_value(json!({ "id": 3 })).unwrap();
        assert_eq!(track.stream_url(), None);
        assert_eq!(track.length_seconds(), 0.0);
    }

    #[test]
    fn test_self_network_lookup() {
        let config: AppConfig = serde_json::from_value(json!({
            "network_key": "rockradio",
            "networks": [
                { "id": 1, "key": "di", "url": "https://www.di.fm", "active": true },
                { "id": 13, "key": "rockradio", "url": "https://www.rockradio.com", "active": true }
            ],
            "channels": [],
            "user": { "audio_token": "a", "session_key": "s" },
            "api": { "urlRoot": "//api.example.com/v1" }
        }))
        .unwrap();

        assert_eq!(config.self_network().map(|n| n.id), Some(13));
    }

    #[test]
    fn test_blocklist_matches_by_key() {
        let network = NetworkDescriptor {
            id: 4,
            key: "zenradio".to_string(),
            name: "ZenRadio".to_string(),
            url: "https://www.zenradio.com".to_string(),
            active: true,
        };
        assert!(network.is_blocked(&["zenradio".to_string()]));
        assert!(!network.is_blocked(&["di".to_string()]));
    }
}
