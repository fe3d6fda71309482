//! Release source backed by a GitHub releases page.

use super::{
    parse_release_datetime, ProcessedVersion, Release, ReleaseAsset, ReleaseError, ReleaseSource,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct ReleaseDto {
    name: String,
    id: i64,
    updated_at: DateTime<Utc>,
    assets: Vec<AssetDto>,
}

#[derive(Debug, Deserialize)]
struct AssetDto {
    name: String,
    #[serde(rename = "browser_download_url")]
    download_url: String,
}

/// Lists releases of one GitHub repository, newest first.
pub struct GithubReleaseSource {
    api_url: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl GithubReleaseSource {
    /// Builds a source from a releases page URL like
    /// `https://github.com/owner/repo/releases`.
    ///
    /// An optional token lifts the strict unauthenticated rate limits.
    pub fn new(releases_url: &str, token: Option<String>) -> Result<Self, ReleaseError> {
        let (owner, repo) = parse_owner_repo(releases_url)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("tilevault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReleaseError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            api_url: format!("https://api.github.com/repos/{owner}/{repo}/releases"),
            token: token.filter(|t| !t.is_empty()),
            client,
        })
    }
}

impl ReleaseSource for GithubReleaseSource {
    fn list(&self, all_pages: bool) -> Result<Vec<Release>, ReleaseError> {
        let mut raw = Vec::new();
        let mut page = 1usize;

        loop {
            let url = format!("{}?per_page={PER_PAGE}&page={page}", self.api_url);
            let mut request = self
                .client
                .get(&url)
                .header("Accept", "application/vnd.github.v3+json");
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("token {token}"));
            }

            let response = request
                .send()
                .map_err(|e| ReleaseError::Http(format!("request failed: {e}")))?;
            let link = response
                .headers()
                .get("link")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(ReleaseError::Http(format!("HTTP {status}: {body}")));
            }

            let releases: Vec<ReleaseDto> = response
                .json()
                .map_err(|e| ReleaseError::Http(format!("failed to parse response: {e}")))?;
            debug!(page, count = releases.len(), "fetched releases page");
            if releases.is_empty() {
                break;
            }
            let page_len = releases.len();
            raw.extend(releases);

            if !all_pages {
                break;
            }
            // Prefer the Link header; fall back to the page-size heuristic
            match link.as_deref() {
                Some(link) if !link.is_empty() => {
                    if !has_next_link(link) {
                        break;
                    }
                }
                _ => {
                    if page_len < PER_PAGE {
                        break;
                    }
                }
            }
            page += 1;
        }

        // Anything updated within the last hour may still be uploading
        let one_hour_ago = Utc::now() - Duration::hours(1);
        raw.iter()
            .filter(|dto| dto.updated_at < one_hour_ago)
            .map(|dto| {
                let datetime = parse_release_datetime(&dto.name)?;
                Ok(Release {
                    name: dto.name.clone(),
                    id: dto.id,
                    updated_at: dto.updated_at,
                    assets: dto
                        .assets
                        .iter()
                        .map(|a| ReleaseAsset {
                            name: a.name.clone(),
                            download_url: a.download_url.clone(),
                        })
                        .collect(),
                    datetime,
                    version: ProcessedVersion::from_datetime(datetime),
                })
            })
            .collect()
    }
}

/// Extracts `owner/repo` from a forge releases URL.
fn parse_owner_repo(releases_url: &str) -> Result<(String, String), ReleaseError> {
    if releases_url.is_empty() {
        return Err(ReleaseError::BadUrl("empty releases URL".to_string()));
    }
    let url = reqwest::Url::parse(releases_url)
        .map_err(|_| ReleaseError::BadUrl(releases_url.to_string()))?;
    let mut segments = url
        .path_segments()
        .ok_or_else(|| ReleaseError::BadUrl(releases_url.to_string()))?
        .filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(owner), Some(repo)) => Ok((owner.to_string(), repo.to_string())),
        _ => Err(ReleaseError::BadUrl(releases_url.to_string())),
    }
}

/// True when a Link header advertises a `rel="next"` page.
fn has_next_link(link: &str) -> bool {
    link.split(',').any(|part| part.contains(r#"rel="next""#))
}
