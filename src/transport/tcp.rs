use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::core::codec::{handshake_eof, NscaCodec};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::channel::Channel;
use crate::protocol::handshake::HandshakeInfo;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::{with_timeout_error, with_timeout_or};

/// Connection establishments tried before a send is abandoned
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Lifecycle of one NSCA connection.
///
/// `Failed` is absorbing: once entered, the connection accepts no further
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    HandshakeRead,
    Sending,
    Closed,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::HandshakeRead => "handshake_read",
            ConnectionState::Sending => "sending",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A single client connection to an NSCA daemon: greeting in, one packet out.
///
/// Protocol I/O only; building and obfuscating the packet is the caller's job.
/// The socket is released when the connection is closed or dropped, whichever
/// comes first.
pub struct NscaConnection {
    framed: Framed<TcpStream, NscaCodec>,
    address: String,
    timeout: Duration,
    state: ConnectionState,
    metrics: Option<Arc<Metrics>>,
}

impl NscaConnection {
    /// Connect to the channel's daemon, trying up to [`CONNECT_ATTEMPTS`] times.
    ///
    /// Each attempt has its own timeout budget. The connected socket has
    /// keep-alive and `TCP_NODELAY` enabled.
    pub async fn open(channel: &Channel) -> Result<Self> {
        Self::open_with_metrics(channel, None).await
    }

    #[instrument(skip(channel, metrics), fields(address = %channel.address()))]
    pub async fn open_with_metrics(channel: &Channel, metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let address = channel.address();
        let timeout = channel.socket_timeout();
        debug!(state = %ConnectionState::Connecting, "Opening connection");

        let mut last_error = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            let connect = async {
                TcpStream::connect((channel.target_host(), channel.target_port()))
                    .await
                    .map_err(ProtocolError::from)
            };

            if let Some(m) = &metrics {
                m.connect_attempted();
            }
            match with_timeout_error(connect, timeout).await {
                Ok(stream) => {
                    if let Err(e) = configure_socket(&stream) {
                        debug!(attempt, error = %e, "Socket setup failed");
                        last_error = e.to_string();
                        continue;
                    }
                    if let Some(m) = &metrics {
                        m.connection_established();
                    }
                    debug!(attempt, state = %ConnectionState::Connected, "Connected");
                    return Ok(Self {
                        framed: Framed::new(stream, NscaCodec),
                        address,
                        timeout,
                        state: ConnectionState::Connected,
                        metrics,
                    });
                }
                Err(ProtocolError::Timeout) => {
                    debug!(attempt, "Connection attempt timed out");
                    last_error = constants::ERR_CONNECT_TIMEOUT.to_string();
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(ProtocolError::ConnectionError {
            address,
            attempts: CONNECT_ATTEMPTS,
            reason: last_error,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Read the 128-byte IV and 4-byte timestamp the server sends first.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn read_handshake(&mut self) -> Result<HandshakeInfo> {
        self.expect_state(ConnectionState::Connected)?;

        let framed = &mut self.framed;
        let read = async {
            match framed.next().await {
                Some(frame) => frame,
                None => Err(handshake_eof()),
            }
        };
        let result = with_timeout_or(
            read,
            self.timeout,
            ProtocolError::HandshakeError(constants::ERR_HANDSHAKE_TIMEOUT.to_string()),
        )
        .await
        .map_err(|e| match e {
            ProtocolError::Io(io) => ProtocolError::HandshakeError(io.to_string()),
            other => other,
        });

        match result {
            Ok(handshake) => {
                self.state = ConnectionState::HandshakeRead;
                debug!(timestamp = handshake.timestamp, state = %self.state, "Handshake received");
                Ok(handshake)
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    /// Write the finished packet in one framed write and flush it.
    #[instrument(skip(self, packet), fields(address = %self.address, bytes = packet.len()))]
    pub async fn send_packet(&mut self, packet: Bytes) -> Result<usize> {
        self.expect_state(ConnectionState::HandshakeRead)?;
        self.state = ConnectionState::Sending;

        let len = packet.len();
        let framed = &mut self.framed;
        let result = with_timeout_error(async { framed.send(packet).await }, self.timeout).await;

        match result {
            Ok(()) => {
                debug!(bytes = len, "Packet written");
                Ok(len)
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    /// Shut the socket down. Errors during shutdown are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.framed.get_mut().shutdown().await {
            debug!(error = %e, "Socket shutdown failed");
        }
        if self.state != ConnectionState::Failed {
            self.state = ConnectionState::Closed;
        }
        debug!(state = %self.state, "Connection closed");
    }

    fn expect_state(&mut self, expected: ConnectionState) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        let err = ProtocolError::UnexpectedState(format!(
            "operation requires state {expected}, connection is {}",
            self.state
        ));
        warn!(error = %err, "Connection used out of order");
        self.state = ConnectionState::Failed;
        Err(err)
    }
}

impl Drop for NscaConnection {
    fn drop(&mut self) {
        if let Some(m) = &self.metrics {
            m.connection_closed();
        }
    }
}

impl fmt::Debug for NscaConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NscaConnection")
            .field("address", &self.address)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish()
    }
}

fn configure_socket(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    socket2::SockRef::from(stream).set_keepalive(true)?;
    Ok(())
}
