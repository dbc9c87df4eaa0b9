//! Connection and session configuration.

use std::time::Duration;

use super::framed::{MAX_LINE_LENGTH, MAX_LITERAL_SIZE};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Per-command completion timeout.
    pub command_timeout: Duration,
    /// Inject a NOOP into `refresh` when the link has been quiet for
    /// this long.
    pub keepalive_interval: Duration,
    /// Drain outstanding STORE completions after this many batched
    /// commands.
    pub store_drain_interval: usize,
    /// Folder listing recursion cap; depth 0 lists only direct
    /// matches of the pattern.
    pub list_depth: u32,
    /// Cap on a single response line.
    pub max_line_length: usize,
    /// Cap on a single literal payload.
    pub max_literal_size: usize,
}

impl SessionConfig {
    /// Configuration with implicit TLS on port 993 and default limits.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::builder(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    command_timeout: Duration,
    keepalive_interval: Duration,
    store_drain_interval: usize,
    list_depth: u32,
    max_line_length: usize,
    max_literal_size: usize,
}

impl SessionConfigBuilder {
    /// Creates a builder with the given hostname and defaults.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(25 * 60),
            store_drain_interval: 100,
            list_depth: 2,
            max_line_length: MAX_LINE_LENGTH,
            max_literal_size: MAX_LITERAL_SIZE,
        }
    }

    /// Sets the port. Defaults to the security mode's port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub const fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Sets the STORE drain interval.
    #[must_use]
    pub const fn store_drain_interval(mut self, every: usize) -> Self {
        self.store_drain_interval = every;
        self
    }

    /// Sets the folder listing recursion cap.
    #[must_use]
    pub const fn list_depth(mut self, depth: u32) -> Self {
        self.list_depth = depth;
        self
    }

    /// Sets the response line cap.
    #[must_use]
    pub const fn max_line_length(mut self, bytes: usize) -> Self {
        self.max_line_length = bytes;
        self
    }

    /// Sets the literal payload cap.
    #[must_use]
    pub const fn max_literal_size(mut self, bytes: usize) -> Self {
        self.max_literal_size = bytes;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            host: self.host,
            security: self.security,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            keepalive_interval: self.keepalive_interval,
            store_drain_interval: self.store_drain_interval.max(1),
            list_depth: self.list_depth,
            max_line_length: self.max_line_length,
            max_literal_size: self.max_literal_size,
        }
    }
}
