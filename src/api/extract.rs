//! Pulls the embedded app config and the CSRF token out of a bootstrap page.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The `di.app.start(...)` call is absent or its argument is not JSON.
    #[error("can not find or parse appConfig in page body")]
    MalformedBootstrap {
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("can not find CSRF-token in page body")]
    MissingToken,
}

/// Raw result of scraping one bootstrap page.
///
/// `config` is only known to be syntactically valid JSON; its shape is
/// checked by whoever deserializes it.
#[derive(Debug, Clone)]
pub struct BootstrapDocument {
    pub config: Value,
    pub csrf_token: String,
}

fn config_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"di\.app\.start\((\{.*\})\);").expect("config marker regex"))
}

fn csrf_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<meta[^>]+name\s*=\s*"csrf-token" content="(.*?)""#)
            .expect("csrf marker regex")
    })
}

pub fn extract(html: &str) -> Result<BootstrapDocument, ExtractError> {
    let raw_config = config_marker()
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(ExtractError::MalformedBootstrap { source: None })?;

    let csrf_token = csrf_marker()
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(ExtractError::MissingToken)?
        .as_str()
        .to_string();

    let config = serde_json::from_str(raw_config.as_str())
        .map_err(|e| ExtractError::MalformedBootstrap { source: Some(e) })?;

    Ok(BootstrapDocument { config, csrf_token })
}
