//! In-process stand-ins for an NSCA daemon.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use nsca_protocol::config::ChannelConfig;
use nsca_protocol::core::packet::PACKET_SIZE;
use nsca_protocol::protocol::handshake::{HandshakeInfo, IV_SIZE};
use nsca_protocol::Channel;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How the fake daemon treats each connection.
#[derive(Clone, Copy)]
pub enum Behaviour {
    /// Send the greeting, then read one full packet
    Normal,
    /// Accept and hold the socket open without saying anything
    Silent,
    /// Send only part of the IV, then hang up
    ShortHandshake,
}

pub struct MockDaemon {
    pub addr: SocketAddr,
    pub packets: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<()>,
}

impl MockDaemon {
    pub async fn start(behaviour: Behaviour, handshake: HandshakeInfo) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, packets) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                let greeting = handshake.to_bytes();
                tokio::spawn(async move {
                    match behaviour {
                        Behaviour::Normal => {
                            if stream.write_all(&greeting).await.is_err() {
                                return;
                            }
                            let mut buf = vec![0u8; PACKET_SIZE];
                            if stream.read_exact(&mut buf).await.is_ok() {
                                let _ = tx.send(buf);
                            }
                        }
                        Behaviour::Silent => {
                            let mut sink = Vec::new();
                            let _ = stream.read_to_end(&mut sink).await;
                            if !sink.is_empty() {
                                let _ = tx.send(sink);
                            }
                        }
                        Behaviour::ShortHandshake => {
                            let _ = stream.write_all(&greeting[..IV_SIZE / 2]).await;
                            let _ = stream.shutdown().await;
                            let mut sink = Vec::new();
                            let _ = stream.read_to_end(&mut sink).await;
                            if !sink.is_empty() {
                                let _ = tx.send(sink);
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            packets,
            task,
        }
    }

    pub async fn next_packet(&mut self) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(5), self.packets.recv())
            .await
            .expect("daemon received nothing")
            .expect("daemon channel closed")
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            host: "127.0.0.1".into(),
            port: self.addr.port(),
            service_name: "domainBus".into(),
            reporting_host: Some("app-server-01".into()),
            socket_timeout: Duration::from_millis(500),
            ..ChannelConfig::default()
        }
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port on localhost with nothing listening.
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn refused_channel(port: u16) -> Channel {
    Channel::from_config(&ChannelConfig {
        host: "127.0.0.1".into(),
        port,
        service_name: "domainBus".into(),
        reporting_host: Some("app-server-01".into()),
        socket_timeout: Duration::from_millis(500),
        ..ChannelConfig::default()
    })
    .unwrap()
}

pub fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap()
}
