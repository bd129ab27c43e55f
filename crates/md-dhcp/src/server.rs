use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Result;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::SharedDhcpState;
use crate::config::DhcpConfig;
use crate::error::InitError;
use crate::packet::DhcpMessage;

/// Largest datagram accepted; anything past the options region is ignored anyway.
const RECV_BUF_LEN: usize = 1500;

/// UDP front end of the dispatcher.
pub struct DhcpServer {
    socket: UdpSocket,
    state: SharedDhcpState,
}

impl DhcpServer {
    /// Build fresh state from `config` and bind the server port.
    pub async fn init(config: &DhcpConfig) -> Result<Self, InitError> {
        let state = crate::new_state(config)?;
        Self::bind(config, state).await
    }

    /// Bind `0.0.0.0:<port>` with SO_BROADCAST for an existing state.
    pub async fn bind(config: &DhcpConfig, state: SharedDhcpState) -> Result<Self, InitError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;

        let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), config.port);
        socket.bind(&addr.into())?;

        #[cfg(target_os = "linux")]
        if !config.interface.is_empty() {
            socket.bind_device(Some(config.interface.as_bytes()))?;
            info!("DHCP bound to interface {}", config.interface);
        }

        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self { socket, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn state(&self) -> &SharedDhcpState {
        &self.state
    }

    /// Serve requests forever. Receive and send errors are logged and skipped.
    pub async fn run(self) -> Result<()> {
        info!("DHCP server listening on {}", self.local_addr()?);

        let mut buf = [0u8; RECV_BUF_LEN];

        loop {
            let (len, src) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    warn!("DHCP recv error: {}", e);
                    continue;
                }
            };

            if let Some((reply, dest)) = self.handle_datagram(&buf[..len], src).await {
                if let Err(e) = self.socket.send_to(&reply, dest).await {
                    warn!("Failed to send DHCP reply to {}: {}", dest, e);
                }
            }
        }
    }

    /// Parse and dispatch one datagram, returning the encoded reply and where to send it.
    async fn handle_datagram(
        &self,
        data: &[u8],
        src: SocketAddr,
    ) -> Option<(Vec<u8>, SocketAddr)> {
        let msg = match DhcpMessage::parse(data) {
            Ok(m) => m,
            Err(e) => {
                debug!("Invalid DHCP packet from {}: {}", src, e);
                return None;
            }
        };

        let reply = self.state.write().await.dispatcher.handle(msg)?;
        Some((reply.to_bytes(), reply_destination(src)))
    }
}

/// Replies are broadcast back to the port the request came from.
fn reply_destination(src: SocketAddr) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::BROADCAST.into(), src.port())
}

/// Bind and serve with a state that outlives the socket (used by supervisors).
pub async fn run_dhcp_server(config: DhcpConfig, state: SharedDhcpState) -> Result<()> {
    if !config.enabled {
        info!("DHCP server disabled");
        return Ok(());
    }

    DhcpServer::bind(&config, state).await?.run().await
}
