//! Sync engine configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ORDER_SYNC_BASE_URL | http://localhost:3000 | REST API base URL |
//! | ORDER_SYNC_TOKEN | (none) | Bearer token |
//! | ORDER_SYNC_REQUEST_TIMEOUT_MS | 10000 | Per-request timeout |
//! | ORDER_SYNC_HEALTH_CHECK_MS | 5000 | Push health check interval |
//! | ORDER_SYNC_POLL_INTERVAL_MS | 30000 | Polling interval |
//! | ORDER_SYNC_POLL_MAX_BACKOFF_MS | 300000 | Polling backoff ceiling |
//! | ORDER_SYNC_PER_PAGE | 20 | Page size |
//! | ORDER_SYNC_SOURCE_ID | order-sync | Handler registration identity |
//! | ORDER_SYNC_PUSH_ADDR | (none) | Message bus `host:port`; unset means polling only |
//! | ORDER_SYNC_PUSH_TLS_DOMAIN | (none) | Enables TLS with this server name |
//! | ORDER_SYNC_PUSH_CA_CERT | (none) | PEM file with the CA to trust (TLS) |
//! | ORDER_SYNC_CLIENT_NAME | order-sync | Name sent in the handshake |

use std::time::Duration;

use shared::query::DEFAULT_PER_PAGE;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST API base URL (e.g., "http://localhost:3000")
    pub base_url: String,
    /// Bearer token for the REST API
    pub token: Option<String>,
    /// Upper bound for every REST call
    pub request_timeout: Duration,
    /// How often push connectivity is re-sampled
    pub health_check_interval: Duration,
    /// Polling cadence while push is unavailable
    pub poll_interval: Duration,
    /// Ceiling for the polling delay after consecutive failures
    pub poll_max_backoff: Duration,
    /// Default page size
    pub per_page: u32,
    /// Identity under which the context registers its handlers
    pub source_id: String,
    /// Push channel settings
    pub push: PushConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
            poll_max_backoff: Duration::from_secs(300),
            per_page: DEFAULT_PER_PAGE,
            source_id: "order-sync".to_string(),
            push: PushConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ORDER_SYNC_BASE_URL").unwrap_or(defaults.base_url),
            token: std::env::var("ORDER_SYNC_TOKEN").ok().filter(|t| !t.is_empty()),
            request_timeout: env_millis("ORDER_SYNC_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            health_check_interval: env_millis("ORDER_SYNC_HEALTH_CHECK_MS")
                .unwrap_or(defaults.health_check_interval),
            poll_interval: env_millis("ORDER_SYNC_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval),
            poll_max_backoff: env_millis("ORDER_SYNC_POLL_MAX_BACKOFF_MS")
                .unwrap_or(defaults.poll_max_backoff),
            per_page: std::env::var("ORDER_SYNC_PER_PAGE")
                .ok()
                .and_then(|p| p.parse().ok())
                .filter(|p| *p > 0)
                .unwrap_or(defaults.per_page),
            source_id: std::env::var("ORDER_SYNC_SOURCE_ID").unwrap_or(defaults.source_id),
            push: PushConfig::from_env(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_max_backoff(mut self, max: Duration) -> Self {
        self.poll_max_backoff = max;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn with_push(mut self, push: PushConfig) -> Self {
        self.push = push;
        self
    }
}

/// Push channel configuration
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Message bus address (`host:port`); `None` disables push
    pub addr: Option<String>,
    /// TLS server name; `None` means plain TCP
    pub tls_domain: Option<String>,
    /// Path to a PEM CA bundle; `None` uses the webpki roots
    pub ca_cert_path: Option<String>,
    /// Name sent in the handshake
    pub client_name: String,
    /// How long to wait for the handshake response
    pub handshake_timeout: Duration,
    /// Reconnect automatically after a read failure
    pub auto_reconnect: bool,
    /// First reconnect delay
    pub reconnect_delay: Duration,
    /// Exponential backoff ceiling
    pub max_reconnect_delay: Duration,
    /// Reconnect attempts before giving up (0 = unlimited)
    pub max_reconnect_attempts: u32,
    /// Broadcast buffer for received frames
    pub channel_capacity: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            addr: None,
            tls_domain: None,
            ca_cert_path: None,
            client_name: "order-sync".to_string(),
            handshake_timeout: Duration::from_secs(5),
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(10),
            max_reconnect_attempts: 20,
            channel_capacity: 1024,
        }
    }
}

impl PushConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            addr: std::env::var("ORDER_SYNC_PUSH_ADDR").ok().filter(|a| !a.is_empty()),
            tls_domain: std::env::var("ORDER_SYNC_PUSH_TLS_DOMAIN")
                .ok()
                .filter(|d| !d.is_empty()),
            ca_cert_path: std::env::var("ORDER_SYNC_PUSH_CA_CERT")
                .ok()
                .filter(|p| !p.is_empty()),
            client_name: std::env::var("ORDER_SYNC_CLIENT_NAME").unwrap_or(defaults.client_name),
            ..defaults
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    pub fn with_tls(mut self, domain: impl Into<String>, ca_cert_path: Option<String>) -> Self {
        self.tls_domain = Some(domain.into());
        self.ca_cert_path = ca_cert_path;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the reconnect backoff (first delay, ceiling)
    pub fn with_reconnect_delay(mut self, delay: Duration, max: Duration) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_delay = max;
        self
    }

    /// 0 means unlimited
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
