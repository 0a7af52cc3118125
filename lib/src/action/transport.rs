use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::Error;
use crate::error::Phase;
use crate::error::Result;
use crate::inventory::Node;

/// Default time allowed for a TCP connection to be established.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory that builds TCP connections to nodes.
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpTransport {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Dials the node's `host:port`, resolving the host name if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] in [`Phase::Dial`] if the connection fails or
    ///   does not complete within the connect timeout
    pub async fn connect(&self, node: &Node) -> Result<TcpStream> {
        let address = node.address();
        let connect = TcpStream::connect((node.host.as_str(), node.port));

        let stream = timeout(self.connect_timeout, connect)
            .await
            .map_err(|_elapsed| {
                let message = format!("TCP connect timed out after {:?}", self.connect_timeout);
                let error = io::Error::new(io::ErrorKind::TimedOut, message);
                Error::transport(&address, Phase::Dial, error)
            })?
            .map_err(|error| Error::transport(&address, Phase::Dial, error))?;

        if let Err(error) = stream.set_nodelay(true) {
            debug!(?error, %address, "unable to set TCP_NODELAY");
        }

        Ok(stream)
    }
}
