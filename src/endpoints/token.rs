//! Scoped anti-replay tokens
//!
//! A token is an HMAC-SHA256 of `scope|user|tick`, hex encoded, where
//! `tick` advances every half lifetime. A token verifies during the tick it
//! was issued in and the one after, so it lives between half and one full
//! lifetime.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::library::LibraryError;
use crate::options::OptionStore;

type HmacSha256 = Hmac<Sha256>;

/// Option key holding the hex-encoded signing secret
pub const SECRET_OPTION: &str = "token_secret";

/// Default token lifetime
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

const SECRET_LEN: usize = 32;

/// Issues and verifies tokens bound to a scope and a user
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: Vec<u8>, lifetime: Duration) -> Self {
        Self { secret, lifetime }
    }

    /// Issuer keyed by the store's secret, creating one on first use
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the secret cannot be read or stored.
    pub fn load_or_create(store: &impl OptionStore) -> Result<Self, LibraryError> {
        if let Some(secret) = store
            .get_option(SECRET_OPTION)?
            .and_then(|hex_secret| hex::decode(hex_secret).ok())
            .filter(|secret| !secret.is_empty())
        {
            return Ok(Self::new(secret, TOKEN_LIFETIME));
        }

        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        store.set_option(SECRET_OPTION, &hex::encode(&secret))?;
        Ok(Self::new(secret, TOKEN_LIFETIME))
    }

    fn tick(&self, now: u64) -> u64 {
        let half = (self.lifetime.as_secs() / 2).max(1);
        now / half
    }

    fn mac(&self, scope: &str, user: &str, tick: u64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(scope.as_bytes());
        mac.update(b"|");
        mac.update(user.as_bytes());
        mac.update(b"|");
        mac.update(tick.to_string().as_bytes());
        Some(mac)
    }

    /// Token for `scope` and `user`, valid from now
    #[must_use]
    pub fn issue(&self, scope: &str, user: &str) -> String {
        self.issue_at(scope, user, now_secs())
    }

    /// Token as issued at `now` seconds since the epoch
    #[must_use]
    pub fn issue_at(&self, scope: &str, user: &str, now: u64) -> String {
        self.mac(scope, user, self.tick(now))
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Whether `token` was issued for `scope` and `user` and has not expired
    #[must_use]
    pub fn verify(&self, token: &str, scope: &str, user: &str) -> bool {
        self.verify_at(token, scope, user, now_secs())
    }

    /// [`verify`](Self::verify) at `now` seconds since the epoch
    #[must_use]
    pub fn verify_at(&self, token: &str, scope: &str, user: &str, now: u64) -> bool {
        let Ok(signature) = hex::decode(token.trim()) else {
            return false;
        };
        let tick = self.tick(now);
        [Some(tick), tick.checked_sub(1)]
            .into_iter()
            .flatten()
            .filter_map(|t| self.mac(scope, user, t))
            .any(|mac| mac.verify_slice(&signature).is_ok())
    }
}
