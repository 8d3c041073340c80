//! Outbound TCP dialing for the connection pool controller (§4.7).

use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::domain::identity::SocketAddr;
use crate::domain::DisconnectReason;
use crate::ports::{ChannelController, NetworkError, TcpDialer};

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTcpDialer;

#[async_trait::async_trait]
impl TcpDialer for TokioTcpDialer {
    async fn dial(&self, addr: SocketAddr) -> Result<(), NetworkError> {
        let std_addr: std::net::SocketAddr = addr.into();
        match timeout(DIAL_TIMEOUT, TcpStream::connect(std_addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Err(NetworkError::ConnectionRefused)
            }
            Ok(Err(_)) => Err(NetworkError::InvalidAddress),
            Err(_) => Err(NetworkError::Timeout),
        }
    }
}

/// Dialer that always reports success without opening a socket, for
/// exercising connection-pool selection logic in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTcpDialer;

#[async_trait::async_trait]
impl TcpDialer for NoOpTcpDialer {
    async fn dial(&self, _addr: SocketAddr) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// Logs the teardown and otherwise does nothing. Real channel teardown
/// lives in the host's own TCP server loop, which owns the actual
/// socket/channel map this crate never holds a handle to; the host wires
/// its own [`ChannelController`] there.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpChannelController;

impl ChannelController for NoOpChannelController {
    fn disconnect(&self, addr: SocketAddr, reason: DisconnectReason) {
        tracing::debug!(?addr, ?reason, "channel controller disconnect (no-op adapter)");
    }
}
