//! Error types for the network client

use crate::api::extract::ExtractError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// DNS, TLS, timeout, connection reset...
    #[error("Request error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Bootstrap page {url} answered {status} {status_text}")]
    BootstrapFetch {
        url: String,
        status: u16,
        status_text: String,
    },

    #[error("Can not read bootstrap page {url}: {source}")]
    BootstrapParse {
        url: String,
        #[source]
        source: ExtractError,
    },

    #[error("Unexpected app config structure from {url}: {source}")]
    ConfigShape {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("App config from {url} does not contain info about self network {network_key} (config structure was changed?)")]
    SelfNetworkNotFound { url: String, network_key: String },

    #[error("Error response {status} {status_text} from {url}")]
    ApiRequest {
        url: String,
        status: u16,
        status_text: String,
    },

    #[error("Can not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Network {url} is not initialized")]
    NotInitialized { url: String },

    #[error("Network {network} initializing error: {source}")]
    Initialization {
        network: String,
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiRequest { status, .. } | Self::BootstrapFetch { status, .. } => Some(*status),
            Self::Initialization { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::ApiRequest { status: 401, .. })
    }

    pub(crate) fn initialization(network: impl Into<String>, source: ApiError) -> Self {
        Self::Initialization {
            network: network.into(),
            source: Box::new(source),
        }
    }
}
