use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PollError;
use crate::ingest::{parse_pushes, PushPayload};

/// Where the poller reads pushes and forest listings from.
#[async_trait]
pub trait PushSource: Send + Sync {
    /// Pushes after `start`, at most `limit` of them, ordered by id.
    async fn fetch_pushes(
        &self,
        url: &str,
        start: i64,
        limit: usize,
    ) -> Result<Vec<PushPayload>, PollError>;

    /// Repository links listed by a forest.
    async fn fetch_forest(&self, url: &str) -> Result<Vec<String>, PollError>;
}

/// [`PushSource`] reading hg web endpoints over HTTP.
pub struct HttpPushSource {
    client: reqwest::Client,
}

impl HttpPushSource {
    pub fn new(timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pushlog/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(PollError::Client)?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, PollError> {
        let fetch_error = |source| PollError::Fetch {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?
            .text()
            .await
            .map_err(fetch_error)
    }
}

#[async_trait]
impl PushSource for HttpPushSource {
    async fn fetch_pushes(
        &self,
        url: &str,
        start: i64,
        limit: usize,
    ) -> Result<Vec<PushPayload>, PollError> {
        let url = pushes_url(url, start, limit);
        debug!(url = %url, "Fetching pushes");
        let body = self.get_text(&url).await?;
        parse_pushes(&body).map_err(|source| PollError::InvalidPayload { url, source })
    }

    async fn fetch_forest(&self, url: &str) -> Result<Vec<String>, PollError> {
        let url = format!("{}?style=raw", url);
        debug!(url = %url, "Fetching forest");
        let body = self.get_text(&url).await?;
        Ok(parse_forest(&body))
    }
}

/// `json-pushes` query for the pushes after `start`.
pub fn pushes_url(url: &str, start: i64, limit: usize) -> String {
    let separator = if url.ends_with('/') { "" } else { "/" };
    format!(
        "{}{}json-pushes?startID={}&endID={}",
        url,
        separator,
        start,
        start + limit as i64
    )
}

pub fn parse_forest(body: &str) -> Vec<String> {
    body.split_whitespace().map(str::to_string).collect()
}

/// Name and clone URL of a repository listed by the forest at `forest_url`.
///
/// Links resolve like relative URLs against the listing; the name is the
/// link without surrounding slashes.
pub fn forest_repository(forest_url: &str, link: &str) -> (String, String) {
    let name = link.trim_matches('/').to_string();

    let url = if link.contains("://") {
        link.to_string()
    } else if let Some(path) = link.strip_prefix('/') {
        format!("{}/{}", origin(forest_url), path)
    } else {
        let base = match forest_url.rfind('/') {
            Some(idx) if idx + 1 > scheme_end(forest_url) => &forest_url[..=idx],
            _ => forest_url,
        };
        let separator = if base.ends_with('/') { "" } else { "/" };
        format!("{}{}{}", base, separator, link)
    };

    (name, url)
}

/// Byte offset just past `scheme://host`'s `//`.
fn scheme_end(url: &str) -> usize {
    url.find("://").map(|idx| idx + 3).unwrap_or(0)
}

/// `scheme://host[:port]` part of a URL.
fn origin(url: &str) -> &str {
    let start = scheme_end(url);
    match url[start..].find('/') {
        Some(idx) => &url[..start + idx],
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pushes_url() {
        assert_eq!(
            pushes_url("https://hg.example.com/l10n/de/", 40, 200),
            "https://hg.example.com/l10n/de/json-pushes?startID=40&endID=240"
        );
        assert_eq!(
            pushes_url("https://hg.example.com/l10n/de", 0, 10),
            "https://hg.example.com/l10n/de/json-pushes?startID=0&endID=10"
        );
    }

    #[test]
    fn test_parse_forest() {
        assert_eq!(parse_forest("de/\nfr/\n\n  it/ \n"), vec!["de/", "fr/", "it/"]);
        assert!(parse_forest("").is_empty());
    }

    #[test]
    fn test_forest_relative_links() {
        assert_eq!(
            forest_repository("https://hg.example.com/l10n-central/", "de/"),
            (
                "de".to_string(),
                "https://hg.example.com/l10n-central/de/".to_string()
            )
        );
        assert_eq!(
            forest_repository("https://hg.example.com/l10n-central/", "/releases/l10n/fr/"),
            (
                "releases/l10n/fr".to_string(),
                "https://hg.example.com/releases/l10n/fr/".to_string()
            )
        );
    }

    #[test]
    fn test_forest_base_without_trailing_slash() {
        let (_, url) = forest_repository("https://hg.example.com/l10n-central", "de/");
        assert_eq!(url, "https://hg.example.com/de/");

        let (_, url) = forest_repository("https://hg.example.com", "de/");
        assert_eq!(url, "https://hg.example.com/de/");
    }

    #[test]
    fn test_forest_absolute_link() {
        let (name, url) = forest_repository(
            "https://hg.example.com/l10n-central/",
            "https://mirror.example.com/de/",
        );
        assert_eq!(url, "https://mirror.example.com/de/");
        assert_eq!(name, "https://mirror.example.com/de");
    }
}
