use std::io;
use std::net::{SocketAddr, ToSocketAddrs as _};
use std::time::Duration;

use thiserror::Error;

use crate::forwarder::{Forwarder, HttpForwarder, UdpForwarder};
use crate::payload::{AttributeValue, Attributes, Resources};
use crate::relay::MetricRelay;

/// Host the relay targets when none is configured.
pub const DEFAULT_AGENT_HOST: &str = "127.0.0.1";

/// Well-known port of the ffwd agent's JSON protocol.
pub const DEFAULT_AGENT_PORT: u16 = 19000;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that could occur while building a [`MetricRelay`].
///
/// These are configuration errors and surface immediately; once a relay is
/// built, delivery failures are silent by design.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The agent host/port did not resolve to a usable address.
    #[error("invalid agent address: {reason}")]
    InvalidAgentAddress {
        /// Details about the resolution failure.
        reason: String,
    },

    /// The HTTP endpoint did not form a valid URL.
    #[error("invalid HTTP endpoint: {reason}")]
    InvalidHttpEndpoint {
        /// Details about the parsing failure.
        reason: String,
    },

    /// The local datagram socket could not be set up.
    #[error("failed to set up agent socket: {0}")]
    Socket(#[from] io::Error),

    /// The blocking HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    HttpClient {
        /// Details about the client construction failure.
        reason: String,
    },
}

/// Builder for a [`MetricRelay`].
///
/// The transport is chosen here and fixed for the relay's lifetime: UDP
/// datagrams by default, or HTTP POST after [`with_http_transport`] or
/// [`with_http_path`].
///
/// [`with_http_transport`]: MetricRelayBuilder::with_http_transport
/// [`with_http_path`]: MetricRelayBuilder::with_http_path
pub struct MetricRelayBuilder {
    service: String,
    host: String,
    port: u16,
    use_http: bool,
    http_path: Option<String>,
    write_timeout: Duration,
    http_timeout: Duration,
    default_attributes: Attributes,
    default_resources: Resources,
}

impl MetricRelayBuilder {
    /// Creates a builder for a relay owned by `service`.
    ///
    /// Defaults to sending datagrams to `127.0.0.1:19000`.
    pub fn new(service: impl Into<String>) -> Self {
        MetricRelayBuilder {
            service: service.into(),
            host: DEFAULT_AGENT_HOST.to_string(),
            port: DEFAULT_AGENT_PORT,
            use_http: false,
            http_path: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            default_attributes: Attributes::new(),
            default_resources: Resources::new(),
        }
    }

    /// Sets the agent host.
    ///
    /// For the HTTP transport the host may carry an explicit scheme
    /// (`https://metrics.example.net`); otherwise `http` is assumed, or
    /// `https` when the port is 443.
    #[must_use]
    pub fn with_agent_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the agent port.
    #[must_use]
    pub fn with_agent_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Switches the relay to the HTTP transport, posting to the root path.
    #[must_use]
    pub fn with_http_transport(mut self) -> Self {
        self.use_http = true;
        self
    }

    /// Switches the relay to the HTTP transport, posting to `path`.
    #[must_use]
    pub fn with_http_path(mut self, path: impl Into<String>) -> Self {
        self.use_http = true;
        self.http_path = Some(path.into());
        self
    }

    /// Sets the datagram write timeout.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the HTTP request timeout.
    ///
    /// Must stay short: a metrics library may not stall caller logic waiting
    /// on a dead agent. Defaults to 2 seconds.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Adds one default attribute, merged into every metric the relay creates.
    #[must_use]
    pub fn with_default_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.default_attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a map of default attributes.
    #[must_use]
    pub fn with_default_attributes(mut self, attributes: Attributes) -> Self {
        self.default_attributes.extend(attributes);
        self
    }

    /// Adds one default resource identifier.
    #[must_use]
    pub fn with_default_resource(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_resources.insert(key.into(), value.into());
        self
    }

    /// Adds a map of default resource identifiers.
    #[must_use]
    pub fn with_default_resources(mut self, resources: Resources) -> Self {
        self.default_resources.extend(resources);
        self
    }

    /// Builds the relay, setting up its transport.
    ///
    /// This is the fail-fast boundary: address resolution, URL parsing, and
    /// socket/client setup errors all surface here.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the agent address does not resolve, the
    /// HTTP endpoint is not a valid URL, or the transport cannot be set up.
    pub fn build(self) -> Result<MetricRelay, BuildError> {
        let forwarder = if self.use_http {
            let url = http_url(&self.host, self.port, self.http_path.as_deref())?;
            let http = HttpForwarder::new(url, self.http_timeout)
                .map_err(|e| BuildError::HttpClient { reason: e.to_string() })?;
            Forwarder::Http(http)
        } else {
            let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
                .to_socket_addrs()
                .map_err(|e| BuildError::InvalidAgentAddress { reason: e.to_string() })?
                .collect();
            if addrs.is_empty() {
                return Err(BuildError::InvalidAgentAddress {
                    reason: "host resolved to no addresses".to_string(),
                });
            }

            Forwarder::Udp(UdpForwarder::new(&addrs, self.write_timeout)?)
        };

        Ok(MetricRelay::new(
            self.service,
            self.default_attributes,
            self.default_resources,
            forwarder,
        ))
    }
}

fn http_url(host: &str, port: u16, path: Option<&str>) -> Result<reqwest::Url, BuildError> {
    let base = if host.contains("://") {
        format!("{host}:{port}")
    } else if port == 443 {
        format!("https://{host}:{port}")
    } else {
        format!("http://{host}:{port}")
    };

    let endpoint = match path {
        Some(path) => format!("{base}{path}"),
        None => base,
    };

    reqwest::Url::parse(&endpoint)
        .map_err(|e| BuildError::InvalidHttpEndpoint { reason: e.to_string() })
}
