//! GitHub-style release registry client

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::ReleaseDescriptor;
use crate::config::RegistryConfig;

/// Request timeout for a single registry lookup
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const GITHUB_JSON: &str = "application/vnd.github+json";

/// Why a registry lookup produced nothing
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Registry answered with status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Invalid release JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Release has no tag")]
    MissingTag,
}

/// Source of the latest published release
pub trait ReleaseSource {
    /// Latest release, or `None` if it cannot be determined right now
    fn latest(&self) -> Option<ReleaseDescriptor>;
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    browser_download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    zipball_url: Option<String>,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

impl GithubRelease {
    /// Download URL of the update package
    ///
    /// An asset named `package_name` wins, then the first `.zip` asset, then
    /// the source archive.
    fn package(&self, package_name: &str) -> String {
        let downloads = || {
            self.assets.iter().filter_map(|asset| {
                asset
                    .browser_download_url
                    .as_deref()
                    .filter(|url| !url.is_empty())
                    .map(|url| (asset.name.as_deref().unwrap_or_default(), url))
            })
        };

        downloads()
            .find(|(name, _)| *name == package_name)
            .or_else(|| downloads().find(|(_, url)| url.to_lowercase().ends_with(".zip")))
            .map(|(_, url)| url.to_string())
            .or_else(|| self.zipball_url.clone())
            .unwrap_or_default()
    }
}

/// Parse a `releases/latest` response body
///
/// # Errors
///
/// Returns `ReleaseError::JsonError` for malformed JSON and
/// `ReleaseError::MissingTag` if the release has no usable tag.
pub fn parse_release(json: &str, package_name: &str) -> Result<ReleaseDescriptor, ReleaseError> {
    let release: GithubRelease = serde_json::from_str(json)?;

    let tag = release.tag_name.as_deref().unwrap_or_default();
    let version = tag.trim().trim_start_matches(['v', 'V']).to_string();
    if version.is_empty() {
        return Err(ReleaseError::MissingTag);
    }

    Ok(ReleaseDescriptor {
        version,
        package: release.package(package_name),
        url: release.html_url.clone().unwrap_or_default(),
        body: release.body.clone().unwrap_or_default(),
    })
}

/// Looks up `releases/latest` of one repository
pub struct GithubRegistry {
    client: Client,
    url: String,
    package_name: String,
}

impl GithubRegistry {
    /// Build a client for `config`'s repository
    ///
    /// `user_agent` identifies this installation to the registry.
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError::HttpError` if the HTTP client cannot be built.
    pub fn new(config: &RegistryConfig, user_agent: &str) -> Result<Self, ReleaseError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            url: latest_release_url(config),
            package_name: config.package_name.clone(),
        })
    }

    /// Fetch and parse the latest release, in a single attempt
    ///
    /// # Errors
    ///
    /// Returns `ReleaseError` on transport failure, a non-200 status or an
    /// unparseable body.
    pub fn fetch(&self) -> Result<ReleaseDescriptor, ReleaseError> {
        debug!(url = %self.url, "querying release registry");
        let response = self.client.get(&self.url).header(ACCEPT, GITHUB_JSON).send()?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ReleaseError::UnexpectedStatus(status));
        }

        parse_release(&response.text()?, &self.package_name)
    }
}

impl ReleaseSource for GithubRegistry {
    fn latest(&self) -> Option<ReleaseDescriptor> {
        match self.fetch() {
            Ok(release) => Some(release),
            Err(e) => {
                warn!("release lookup failed: {e}");
                None
            }
        }
    }
}

/// `{api_base}/repos/{owner}/{repo}/releases/latest`
#[must_use]
pub fn latest_release_url(config: &RegistryConfig) -> String {
    format!(
        "{}/repos/{}/{}/releases/latest",
        config.api_base.trim_end_matches('/'),
        config.owner,
        config.repo
    )
}
