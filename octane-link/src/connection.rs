//! The channel to the renderer process.
//!
//! A [`ConnectionManager`] owns one lazily created channel. The channel is
//! built on the first [`channel`](ConnectionManager::channel) call and reused
//! until the server address changes. Building goes through a [`Connector`],
//! so the manager itself knows nothing about gRPC; [`GrpcConnector`] is the
//! real one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tonic::transport::{Channel, Endpoint};

use crate::error::{Error, Result};

/// Where the renderer listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// `http://host:port` or `https://host:port`.
    Tcp(String),
    /// Path of a local socket.
    Unix(String),
}

impl FromStr for ServerAddress {
    type Err = Error;

    /// Accepts `host:port`, `http(s)://host:port` and `unix:/path/to/socket`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            let path = path.trim_start_matches("//");
            if path.is_empty() {
                return Err(Error::InvalidAddress(format!("{s}: missing socket path")));
            }
            return Ok(ServerAddress::Unix(path.to_string()));
        }
        let uri = if s.starts_with("http://") || s.starts_with("https://") {
            s.to_string()
        } else {
            format!("http://{s}")
        };
        let parsed: http::Uri = uri
            .parse()
            .map_err(|e| Error::InvalidAddress(format!("{s}: {e}")))?;
        if parsed.host().is_none() {
            return Err(Error::InvalidAddress(format!("{s}: missing host")));
        }
        Ok(ServerAddress::Tcp(uri))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Tcp(uri) => f.write_str(uri),
            ServerAddress::Unix(path) => write!(f, "unix:{path}"),
        }
    }
}

/// Builds channels for a [`ConnectionManager`].
pub trait Connector: Send + Sync + 'static {
    type Channel: Send + Sync + 'static;

    /// Create a channel to `address`. Must not block on the network.
    fn connect(&self, address: &ServerAddress) -> Result<Self::Channel>;
}

/// Lazily connecting tonic channels.
///
/// `connect` spawns tonic's buffer worker, so it has to run inside a tokio
/// runtime.
#[derive(Debug, Clone, Default)]
pub struct GrpcConnector {
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl GrpcConnector {
    fn endpoint(&self, endpoint: Endpoint) -> Endpoint {
        let mut endpoint = endpoint;
        if let Some(t) = self.connect_timeout {
            endpoint = endpoint.connect_timeout(t);
        }
        if let Some(t) = self.request_timeout {
            endpoint = endpoint.timeout(t);
        }
        endpoint
    }
}

impl Connector for GrpcConnector {
    type Channel = Channel;

    fn connect(&self, address: &ServerAddress) -> Result<Channel> {
        match address {
            ServerAddress::Tcp(uri) => {
                let endpoint = Endpoint::from_shared(uri.clone())
                    .map_err(|e| Error::InvalidAddress(format!("{uri}: {e}")))?;
                Ok(self.endpoint(endpoint).connect_lazy())
            }
            #[cfg(unix)]
            ServerAddress::Unix(path) => {
                // The URI is required by tonic but never resolved.
                let endpoint = self.endpoint(Endpoint::from_static("http://[::]:51022"));
                let path = path.clone();
                Ok(endpoint.connect_with_connector_lazy(tower::service_fn(
                    move |_: http::Uri| {
                        let path = path.clone();
                        async move {
                            let stream = tokio::net::UnixStream::connect(path).await?;
                            Ok::<_, std::io::Error>(hyper_util::rt::TokioIo::new(stream))
                        }
                    },
                )))
            }
            #[cfg(not(unix))]
            ServerAddress::Unix(path) => Err(Error::InvalidAddress(format!(
                "unix:{path}: local sockets are not supported on this platform"
            ))),
        }
    }
}

/// Whether a manager currently holds a usable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Initialized,
}

/// Holds the configured address and the cached channel built from it.
///
/// Readers of the cached channel never lock: it sits in an [`ArcSwapOption`].
/// The address mutex serializes creation and address changes only.
pub struct ConnectionManager<C: Connector = GrpcConnector> {
    connector: C,
    channel: ArcSwapOption<C::Channel>,
    address: Mutex<String>,
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("address", &*self.address.lock())
            .field("initialized", &self.channel.load().is_some())
            .finish()
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, address: impl Into<String>) -> Self {
        Self {
            connector,
            channel: ArcSwapOption::empty(),
            address: Mutex::new(address.into()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn address(&self) -> String {
        self.address.lock().clone()
    }

    /// Point the manager at a new address. The cached channel is dropped and
    /// rebuilt on the next [`channel`](Self::channel) call; nothing connects
    /// here.
    pub fn set_server_address(&self, address: impl Into<String>) {
        let address = address.into();
        let mut current = self.address.lock();
        let old = std::mem::replace(&mut *current, address.clone());
        self.channel.store(None);
        tracing::debug!(%old, new = %address, "server address changed");
    }

    /// The cached channel, creating it first if needed.
    ///
    /// Once initialized this is a lock-free load. Creation takes the address
    /// mutex and re-checks, so concurrent first calls connect once.
    pub fn channel(&self) -> Result<Arc<C::Channel>> {
        if let Some(channel) = self.channel.load_full() {
            return Ok(channel);
        }

        let current = self.address.lock();
        if let Some(channel) = self.channel.load_full() {
            return Ok(channel);
        }
        let address: ServerAddress = current.parse()?;
        let channel = Arc::new(self.connector.connect(&address)?);
        tracing::info!(%address, "renderer channel created");
        self.channel.store(Some(Arc::clone(&channel)));
        Ok(channel)
    }

    pub fn state(&self) -> ChannelState {
        if self.channel.load().is_some() {
            ChannelState::Initialized
        } else {
            ChannelState::Uninitialized
        }
    }
}
