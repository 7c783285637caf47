use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::{obfuscation, packet};
use crate::error::Result;
use crate::protocol::channel::Channel;
use crate::protocol::message::Alert;
use crate::transport::tcp::NscaConnection;
use crate::utils::metrics::{Metrics, Timer};

/// Deliver one alert over a fresh connection.
///
/// Connects, reads the greeting, builds and obfuscates the packet, writes it
/// and closes the socket. Returns the number of bytes written. On error
/// nothing has been written, except when the write itself failed part way.
#[instrument(skip_all, fields(address = %channel.address(), service = %channel.service_name(), severity = %alert.severity))]
pub async fn deliver(channel: &Channel, alert: &Alert, metrics: Option<Arc<Metrics>>) -> Result<usize> {
    let _timer = Timer::start("nsca_deliver");

    let mut conn = NscaConnection::open_with_metrics(channel, metrics).await?;
    let handshake = conn.read_handshake().await?;

    let mut buf = packet::encode(channel, &handshake, alert);
    obfuscation::transform(
        channel.obfuscation(),
        &mut buf,
        &handshake.iv,
        channel.shared_secret().as_bytes(),
    );

    let written = conn.send_packet(buf.freeze()).await?;
    conn.close().await;

    debug!(bytes = written, "Alert delivered");
    Ok(written)
}
