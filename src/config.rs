//! Session configuration

use std::time::Duration;

/// Default idle lifetime of a session (24 hours).
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// How a record's expiration deadline is computed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpirationMode {
    /// Deadline moves forward on every access: `last_accessed_at + idle_ttl`
    #[default]
    Sliding,
    /// Deadline is fixed at creation: `created_at + idle_ttl`
    Absolute,
}

/// Settings owned by the store itself
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// How long a session may live without being touched
    pub idle_ttl: Duration,

    /// Sliding or absolute expiration
    pub expiration: ExpirationMode,

    /// Number of independently locked shards (default: 16)
    pub shards: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            idle_ttl: DEFAULT_IDLE_TTL,
            expiration: ExpirationMode::Sliding,
            shards: 16,
        }
    }
}

impl StoreConfig {
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    pub fn with_expiration(mut self, mode: ExpirationMode) -> Self {
        self.expiration = mode;
        self
    }

    /// Set the shard count; zero is bumped to one.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards.max(1);
        self
    }
}

/// Configuration for the session middleware
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Secret key(s) for signing cookies.
    /// The first secret is used for signing new cookies.
    /// All secrets are tried when verifying signatures (for secret rotation).
    pub secrets: Vec<String>,

    /// Name of the session cookie (default: "connect.sid")
    pub cookie_name: String,

    /// Cookie path (default: "/")
    pub cookie_path: String,

    /// Cookie domain (default: None - current domain only)
    pub cookie_domain: Option<String>,

    /// HttpOnly flag for cookie (default: true)
    pub cookie_http_only: bool,

    /// Secure flag for cookie (default: false)
    pub cookie_secure: bool,

    /// SameSite attribute for cookie
    pub cookie_same_site: SameSite,

    /// Store settings; `idle_ttl` is also the cookie Max-Age
    pub store: StoreConfig,

    /// Interval of the background sweep (default: None - lazy expiration only)
    pub sweep_interval: Option<Duration>,

    /// Whether to refresh the cookie on every request that has a session (default: false)
    pub rolling: bool,
}

/// SameSite cookie attribute
#[derive(Clone, Debug, PartialEq)]
pub enum SameSite {
    /// Strict - cookie only sent for same-site requests
    Strict,
    /// Lax - cookie sent for same-site requests and top-level navigations
    Lax,
    /// None - cookie sent for all requests (requires Secure)
    None,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secrets: vec!["keyboard cat".to_string()],
            cookie_name: "connect.sid".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            cookie_http_only: true,
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
            store: StoreConfig::default(),
            sweep_interval: None,
            rolling: false,
        }
    }
}

impl SessionConfig {
    /// Create a new session configuration with the given secret
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self {
            secrets: vec![secret.into()],
            ..Default::default()
        }
    }

    /// Create a new session configuration with multiple secrets for rotation
    pub fn with_secrets<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            secrets: secrets.into_iter().map(|s| s.into()).collect(),
            ..Default::default()
        }
    }

    /// Set the cookie name (default: "connect.sid")
    pub fn with_cookie_name<S: Into<String>>(mut self, name: S) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Set the cookie path (default: "/")
    pub fn with_cookie_path<S: Into<String>>(mut self, path: S) -> Self {
        self.cookie_path = path.into();
        self
    }

    /// Set the cookie domain
    pub fn with_cookie_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.cookie_http_only = http_only;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Set the idle TTL (default: 24 hours)
    pub fn with_idle_ttl(mut self, ttl: Duration) -> Self {
        self.store.idle_ttl = ttl;
        self
    }

    /// Set sliding or absolute expiration (default: sliding)
    pub fn with_expiration(mut self, mode: ExpirationMode) -> Self {
        self.store.expiration = mode;
        self
    }

    /// Run a background sweep at the given interval
    pub fn with_sweep_interval(mut self, interval: impl Into<Option<Duration>>) -> Self {
        self.sweep_interval = interval.into();
        self
    }

    /// Set whether to refresh the cookie on every request (default: false)
    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    /// Cookie Max-Age in whole seconds, rounded up and never zero
    ///
    /// Max-Age=0 means "delete", so a live session always gets at least one second.
    pub fn max_age_secs(&self) -> i64 {
        let ttl = self.store.idle_ttl;
        let secs = ttl
            .as_secs()
            .saturating_add(u64::from(ttl.subsec_nanos() > 0))
            .max(1);
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}
