//! Update metadata for the host's updater

use serde::Serialize;
use tracing::{debug, info};

use super::ReleaseDescriptor;
use super::registry::ReleaseSource;
use super::version::is_newer;
use crate::config::SlugshotConfig;
use crate::options::Settings;
use crate::{MIN_HOST_VERSION, MIN_RUNTIME_VERSION, PLUGIN_FILE, PLUGIN_NAME, PLUGIN_SLUG};

const DEFAULT_DESCRIPTION: &str = "Automated updates via GitHub Releases.";

/// The installation asking for updates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// Host version, reported as the version this release was tested with
    pub version: String,
    /// Public URL of the installation
    pub home_url: String,
    /// Project page advertised in update metadata
    pub homepage: String,
}

impl HostInfo {
    /// This installation, as described by its configuration
    #[must_use]
    pub fn from_config(config: &SlugshotConfig) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            home_url: config.storage.base_url.clone(),
            homepage: config.registry.homepage(),
        }
    }

    /// `User-Agent` sent to the registry
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("{PLUGIN_SLUG}/{}; {}", self.version, self.home_url)
    }
}

/// An update advertised to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOffer {
    pub slug: String,
    pub plugin: String,
    pub new_version: String,
    pub tested: String,
    pub requires: String,
    pub url: String,
    pub package: String,
}

/// Details shown when the host asks about this package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub author: String,
    pub homepage: String,
    pub requires: String,
    pub tested: String,
    /// Minimum runtime version of the host
    #[serde(rename = "requires_php")]
    pub requires_runtime: String,
    pub download_link: String,
    pub description_html: String,
}

/// Escape text for HTML and turn line breaks into `<br />`
///
/// ```
/// use slugshot::release::nl2br;
/// assert_eq!(nl2br("a < b\nc"), "a &lt; b<br />\nc");
/// ```
#[must_use]
pub fn nl2br(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '&' => html.push_str("&amp;"),
            '<' => html.push_str("&lt;"),
            '>' => html.push_str("&gt;"),
            '"' => html.push_str("&quot;"),
            '\'' => html.push_str("&#039;"),
            '\r' => {
                html.push_str("<br />\r");
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    html.push('\n');
                }
            }
            '\n' => html.push_str("<br />\n"),
            _ => html.push(c),
        }
    }
    html
}

fn author_name() -> &'static str {
    let authors = env!("CARGO_PKG_AUTHORS");
    authors
        .split(':')
        .next()
        .and_then(|first| first.split('<').next())
        .map_or(authors, str::trim)
}

/// Decides whether an update is available and what to tell the host
pub struct UpdateResolver<'a, S: ?Sized> {
    source: &'a S,
    settings: &'a Settings,
    host: HostInfo,
}

impl<'a, S: ReleaseSource + ?Sized> UpdateResolver<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S, settings: &'a Settings, host: HostInfo) -> Self {
        Self {
            source,
            settings,
            host,
        }
    }

    /// The latest release, through whatever caching `source` does
    #[must_use]
    pub fn latest(&self) -> Option<ReleaseDescriptor> {
        self.source.latest()
    }

    /// An offer if the latest release is strictly newer than `installed`
    #[must_use]
    pub fn check_for_update(&self, installed: &str) -> Option<UpdateOffer> {
        let release = self.source.latest()?;
        if !is_newer(&release.version, installed) {
            debug!(remote = %release.version, installed, "no newer release");
            return None;
        }

        info!(remote = %release.version, installed, "update available");
        Some(UpdateOffer {
            slug: PLUGIN_SLUG.to_string(),
            plugin: PLUGIN_FILE.to_string(),
            new_version: release.version,
            tested: self.host.version.clone(),
            requires: MIN_HOST_VERSION.to_string(),
            url: self.host.homepage.clone(),
            package: release.package,
        })
    }

    /// Package details, only for our own slug
    #[must_use]
    pub fn release_info(&self, slug: &str) -> Option<ReleaseInfo> {
        if slug != PLUGIN_SLUG {
            return None;
        }
        let release = self.source.latest()?;

        let version = if release.version.is_empty() {
            crate::VERSION.to_string()
        } else {
            release.version
        };
        let body = if release.body.trim().is_empty() {
            DEFAULT_DESCRIPTION
        } else {
            release.body.as_str()
        };

        Some(ReleaseInfo {
            name: PLUGIN_NAME.to_string(),
            slug: PLUGIN_SLUG.to_string(),
            version,
            author: format!(
                "<a href=\"{}\">{}</a>",
                self.host.homepage,
                nl2br(author_name())
            ),
            homepage: self.host.homepage.clone(),
            requires: MIN_HOST_VERSION.to_string(),
            tested: self.host.version.clone(),
            requires_runtime: MIN_RUNTIME_VERSION.to_string(),
            download_link: release.package,
            description_html: nl2br(body),
        })
    }

    /// Whether the host may install updates of `slug` unattended
    ///
    /// Other packages keep the host's own decision.
    #[must_use]
    pub fn should_auto_update(&self, slug: &str, default: bool) -> bool {
        if slug == PLUGIN_SLUG {
            self.settings.auto_update
        } else {
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct StubSource {
        release: Option<ReleaseDescriptor>,
        calls: Cell<usize>,
    }

    impl StubSource {
        fn tagged(version: &str, body: &str) -> Self {
            Self {
                release: Some(ReleaseDescriptor {
                    version: version.into(),
                    package: "https://dl.test/slugshot.zip".into(),
                    url: "https://github.com/xerinox/slugshot/releases/latest".into(),
                    body: body.into(),
                }),
                calls: Cell::new(0),
            }
        }
    }

    impl ReleaseSource for StubSource {
        fn latest(&self) -> Option<ReleaseDescriptor> {
            self.calls.set(self.calls.get() + 1);
            self.release.clone()
        }
    }

    fn host() -> HostInfo {
        HostInfo {
            version: "6.9.0".into(),
            home_url: "https://example.com".into(),
            homepage: "https://github.com/xerinox/slugshot".into(),
        }
    }

    #[test]
    fn test_newer_release_is_offered() {
        let source = StubSource::tagged("2.0.0", "");
        let settings = Settings::default();
        let resolver = UpdateResolver::new(&source, &settings, host());

        let offer = resolver.check_for_update("1.7.2").unwrap();
        assert_eq!(offer.new_version, "2.0.0");
        assert_eq!(offer.slug, PLUGIN_SLUG);
        assert_eq!(offer.plugin, PLUGIN_FILE);
        assert_eq!(offer.package, "https://dl.test/slugshot.zip");
        assert_eq!(offer.tested, "6.9.0");
        assert_eq!(offer.requires, MIN_HOST_VERSION);
    }

    #[test]
    fn test_equal_or_older_release_is_not_offered() {
        let settings = Settings::default();
        let equal = StubSource::tagged("1.7.2", "");
        assert!(UpdateResolver::new(&equal, &settings, host()).check_for_update("1.7.2").is_none());

        let older = StubSource::tagged("1.7.1", "");
        assert!(UpdateResolver::new(&older, &settings, host()).check_for_update("1.7.2").is_none());
    }

    #[test]
    fn test_no_release_no_offer() {
        let source = StubSource {
            release: None,
            calls: Cell::new(0),
        };
        let settings = Settings::default();
        let resolver = UpdateResolver::new(&source, &settings, host());
        assert!(resolver.check_for_update("1.0.0").is_none());
        assert!(resolver.release_info(PLUGIN_SLUG).is_none());
    }

    #[test]
    fn test_release_info() {
        let source = StubSource::tagged("2.0.0", "Line one\nLine <two>");
        let settings = Settings::default();
        let resolver = UpdateResolver::new(&source, &settings, host());

        assert!(resolver.release_info("someone-else").is_none());
        assert_eq!(source.calls.get(), 0);

        let info = resolver.release_info(PLUGIN_SLUG).unwrap();
        assert_eq!(info.version, "2.0.0");
        assert_eq!(info.download_link, "https://dl.test/slugshot.zip");
        assert_eq!(info.requires_runtime, MIN_RUNTIME_VERSION);
        assert_eq!(info.description_html, "Line one<br />\nLine &lt;two&gt;");
        assert!(info.author.contains("Rainer Kildal"));
    }

    #[test]
    fn test_release_info_default_description() {
        let source = StubSource::tagged("2.0.0", "  ");
        let settings = Settings::default();
        let info = UpdateResolver::new(&source, &settings, host())
            .release_info(PLUGIN_SLUG)
            .unwrap();
        assert_eq!(info.description_html, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_should_auto_update() {
        let source = StubSource::tagged("2.0.0", "");
        let on = Settings::default();
        let off = Settings {
            auto_update: false,
            ..Settings::default()
        };

        assert!(UpdateResolver::new(&source, &on, host()).should_auto_update(PLUGIN_SLUG, false));
        assert!(!UpdateResolver::new(&source, &off, host()).should_auto_update(PLUGIN_SLUG, true));
        assert!(UpdateResolver::new(&source, &off, host()).should_auto_update("other", true));
        assert!(!UpdateResolver::new(&source, &on, host()).should_auto_update("other", false));
    }

    #[test]
    fn test_nl2br() {
        assert_eq!(nl2br("a\r\nb"), "a<br />\r\nb");
        assert_eq!(nl2br("\"x\" & 'y'"), "&quot;x&quot; &amp; &#039;y&#039;");
    }

    #[test]
    fn test_user_agent() {
        assert_eq!(host().user_agent(), "slugshot/6.9.0; https://example.com");
    }
}
