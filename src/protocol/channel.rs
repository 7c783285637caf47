//! Immutable destination and policy shared by every alert sent to one
//! service on one NSCA daemon.

use crate::config::ChannelConfig;
use crate::core::obfuscation::ObfuscationMethod;
use crate::error::{constants, ProtocolError, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Where and how alerts are delivered.
///
/// Built once, validated at construction and shared by `Arc` across sends.
#[derive(Clone, PartialEq, Eq)]
pub struct Channel {
    target_host: String,
    target_port: u16,
    service_name: String,
    obfuscation: ObfuscationMethod,
    shared_secret: String,
    reporting_host: Option<String>,
    socket_timeout: Duration,
}

impl Channel {
    /// Validate `config` and resolve the reporting host.
    ///
    /// Fails with `InvalidConfiguration` for an empty host or service name and
    /// with `UnsupportedObfuscationMethod` for an unknown method code.
    ///
    /// When no `reporting_host` is configured the target host name is
    /// resolved with blocking DNS. Inside a runtime prefer
    /// [`Channel::from_config_async`].
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let mut channel = Self::validated(config)?;
        if channel.reporting_host.is_none() {
            let targets: Vec<SocketAddr> = match (channel.target_host.as_str(), channel.target_port).to_socket_addrs() {
                Ok(addrs) => addrs.collect(),
                Err(e) => {
                    debug!(error = %e, host = %channel.target_host, "Could not resolve target host");
                    Vec::new()
                }
            };
            channel.reporting_host = Some(local_address_towards(&targets));
        }
        channel.log_created();
        Ok(channel)
    }

    /// Same as [`Channel::from_config`], resolving the target host with
    /// `tokio::net::lookup_host` instead of blocking the calling thread.
    pub async fn from_config_async(config: &ChannelConfig) -> Result<Self> {
        let mut channel = Self::validated(config)?;
        if channel.reporting_host.is_none() {
            let lookup = tokio::net::lookup_host((channel.target_host.as_str(), channel.target_port)).await;
            let targets: Vec<SocketAddr> = match lookup {
                Ok(addrs) => addrs.collect(),
                Err(e) => {
                    debug!(error = %e, host = %channel.target_host, "Could not resolve target host");
                    Vec::new()
                }
            };
            channel.reporting_host = Some(local_address_towards(&targets));
        }
        channel.log_created();
        Ok(channel)
    }

    /// Checks shared by both constructors; `reporting_host` is only set when
    /// configured.
    fn validated(config: &ChannelConfig) -> Result<Self> {
        let target_host = config.host.trim();
        if target_host.is_empty() {
            return Err(ProtocolError::InvalidConfiguration(
                constants::ERR_EMPTY_HOST.to_string(),
            ));
        }

        let service_name = config.service_name.trim();
        if service_name.is_empty() {
            return Err(ProtocolError::InvalidConfiguration(
                constants::ERR_EMPTY_SERVICE.to_string(),
            ));
        }

        if config.port == 0 {
            return Err(ProtocolError::InvalidConfiguration(
                constants::ERR_ZERO_PORT.to_string(),
            ));
        }

        let obfuscation = ObfuscationMethod::try_from(config.obfuscation_method)?;

        let reporting_host = match config.reporting_host.as_deref().map(str::trim) {
            Some(host) if !host.is_empty() => Some(host.to_string()),
            _ => None,
        };

        Ok(Self {
            target_host: target_host.to_string(),
            target_port: config.port,
            service_name: service_name.to_string(),
            obfuscation,
            shared_secret: config.shared_secret.clone(),
            reporting_host,
            socket_timeout: config.socket_timeout,
        })
    }

    fn log_created(&self) {
        debug!(
            host = %self.target_host,
            port = self.target_port,
            service = %self.service_name,
            obfuscation = %self.obfuscation,
            reporting_host = ?self.reporting_host,
            "Channel created"
        );
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    pub fn target_port(&self) -> u16 {
        self.target_port
    }

    /// `host:port` for log lines and errors; IPv6 literals are bracketed.
    pub fn address(&self) -> String {
        if self.target_host.contains(':') {
            format!("[{}]:{}", self.target_host, self.target_port)
        } else {
            format!("{}:{}", self.target_host, self.target_port)
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn obfuscation(&self) -> ObfuscationMethod {
        self.obfuscation
    }

    pub fn shared_secret(&self) -> &str {
        &self.shared_secret
    }

    /// Local address reported to the daemon, if one could be determined.
    pub fn reporting_host(&self) -> Option<&str> {
        self.reporting_host.as_deref()
    }

    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Replace the resolved reporting host; `None` reports `UNKNOWN`.
    pub fn with_reporting_host(mut self, host: Option<String>) -> Self {
        self.reporting_host = host;
        self
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("target_host", &self.target_host)
            .field("target_port", &self.target_port)
            .field("service_name", &self.service_name)
            .field("obfuscation", &self.obfuscation)
            .field("shared_secret", &"<redacted>")
            .field("reporting_host", &self.reporting_host)
            .field("socket_timeout", &self.socket_timeout)
            .finish()
    }
}

/// Find the local address this machine would use to reach one of `targets`.
///
/// A connected UDP socket picks a route without sending anything. The socket
/// is bound in the family of each target. Falls back to the loopback address
/// of the first target's family (IPv4 when there are no targets).
fn local_address_towards(targets: &[SocketAddr]) -> String {
    for target in targets {
        let bind: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let local = UdpSocket::bind(bind)
            .and_then(|socket| socket.connect(target).map(|()| socket))
            .and_then(|socket| socket.local_addr());
        match local {
            Ok(addr) if !addr.ip().is_unspecified() => return addr.ip().to_string(),
            Ok(_) => {}
            Err(e) => debug!(error = %e, target = %target, "No route to target"),
        }
    }

    let loopback = match targets.first() {
        Some(SocketAddr::V6(_)) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        _ => IpAddr::V4(Ipv4Addr::LOCALHOST),
    };
    debug!(fallback = %loopback, "Reporting host falls back to loopback");
    loopback.to_string()
}
