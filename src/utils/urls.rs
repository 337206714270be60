use url::Url;

/// Turns the protocol-relative URLs the backend likes (`//cdn.host/x`) into
/// absolute https URLs. Anything that already parses is returned as is.
pub fn https_url(url: &str) -> String {
    if Url::parse(url).is_ok() {
        return url.to_string();
    }

    let prefixed = if url.starts_with("//") {
        format!("https:{url}")
    } else {
        format!("https://{}", url.trim_start_matches('/'))
    };

    match Url::parse(&prefixed) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => prefixed,
    }
}
