//! Self-hosted update discovery
//!
//! Looks up the latest release in a GitHub-style registry, caches it for an
//! hour and turns it into the update metadata the host's updater consumes.

mod cache;
mod registry;
mod resolver;
mod version;

pub use cache::{RELEASE_TTL, ReleaseCache};
pub use registry::{
    GithubRegistry, REQUEST_TIMEOUT, ReleaseError, ReleaseSource, latest_release_url,
    parse_release,
};
pub use resolver::{HostInfo, ReleaseInfo, UpdateOffer, UpdateResolver, nl2br};
pub use version::{Version, is_newer};

use serde::{Deserialize, Serialize};

/// The latest published release, as far as the registry knows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Version with any `v` prefix removed
    pub version: String,
    /// Download URL of the update package
    pub package: String,
    /// Release page
    pub url: String,
    /// Release notes
    pub body: String,
}
