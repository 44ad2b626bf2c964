//! Length-prefixed stream transport
//!
//! Stands in for an L2CAP channel over TCP: every frame is preceded by its
//! length as a big-endian u16.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sdpd_core::PeerAddress;
use sdpd_runtime::{FrameTransport, TransportError};

/// Frame transport over any byte stream
pub struct LengthPrefixedTransport<S> {
    stream: S,
    peer: PeerAddress,
    mtu: Option<u16>,
}

impl<S> LengthPrefixedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: PeerAddress, mtu: Option<u16>) -> Self {
        Self { stream, peer, mtu }
    }
}

/// Peer address for a socket: the IPv4 octets then the port
///
/// IPv6 peers use the last four octets of the address.
pub fn peer_from_socket(addr: &SocketAddr) -> PeerAddress {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(v6) => {
            let octets = v6.ip().octets();
            [octets[12], octets[13], octets[14], octets[15]]
        }
    };
    let [hi, lo] = addr.port().to_be_bytes();
    PeerAddress::new([ip[0], ip[1], ip[2], ip[3], hi, lo])
}

#[async_trait]
impl<S> FrameTransport for LengthPrefixedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut len = [0u8; 2];
        match self.stream.read_exact(&mut len).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        }
        let mut frame = vec![0u8; usize::from(u16::from_be_bytes(len))];
        self.stream.read_exact(&mut frame).await?;
        Ok(Some(frame))
    }

    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        let len = u16::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
            len: frame.len(),
            mtu: self.mtu.unwrap_or(u16::MAX),
        })?;
        self.stream.write_all(&len.to_be_bytes()).await?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    fn peer(&self) -> PeerAddress {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_round_trip_over_duplex() {
        let (server_side, mut client_side) = tokio::io::duplex(256);
        let peer = PeerAddress::new([127, 0, 0, 1, 0x13, 0x89]);
        let mut transport = LengthPrefixedTransport::new(server_side, peer, Some(48));

        client_side.write_all(&[0x00, 0x03, 0x02, 0x00, 0x01]).await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), Some(vec![0x02, 0x00, 0x01]));

        transport.send(vec![0xAA, 0xBB]).await.unwrap();
        let mut reply = [0u8; 4];
        client_side.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x00, 0x02, 0xAA, 0xBB]);

        drop(client_side);
        assert_eq!(transport.recv().await.unwrap(), None);
    }

    #[test]
    fn test_socket_maps_to_peer_address() {
        let addr: SocketAddr = "10.1.2.3:5001".parse().unwrap();
        assert_eq!(
            peer_from_socket(&addr),
            PeerAddress::new([10, 1, 2, 3, 0x13, 0x89])
        );
    }
}
