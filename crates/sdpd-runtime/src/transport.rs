//! Frame transports
//!
//! A connection's transport moves whole SDP frames. The server never sees
//! partial frames; framing is the transport's job.

use async_trait::async_trait;
use sdpd_core::PeerAddress;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

// ----------------------------------------------------------------------------
// Frame Transport
// ----------------------------------------------------------------------------

/// One peer connection carrying whole frames
#[async_trait]
pub trait FrameTransport: Send {
    /// Next request frame, or `None` once the peer has closed
    async fn recv(&mut self) -> Result<Option<Vec<u8>>>;

    /// Send one response frame
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Negotiated MTU, if the transport knows one
    fn mtu(&self) -> Option<u16>;

    /// Address of the remote peer
    fn peer(&self) -> PeerAddress;
}

// ----------------------------------------------------------------------------
// Channel Transport
// ----------------------------------------------------------------------------

/// In-memory transport built on a pair of mpsc channels
pub struct ChannelTransport {
    peer: PeerAddress,
    mtu: Option<u16>,
    inbound: mpsc::Receiver<Vec<u8>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

/// Client half of a [`ChannelTransport`]
pub struct ChannelClient {
    requests: mpsc::Sender<Vec<u8>>,
    responses: mpsc::Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a connected server/client pair
    pub fn pair(peer: PeerAddress, mtu: Option<u16>, buffer: usize) -> (Self, ChannelClient) {
        let (request_tx, request_rx) = mpsc::channel(buffer);
        let (response_tx, response_rx) = mpsc::channel(buffer);
        let transport = Self {
            peer,
            mtu,
            inbound: request_rx,
            outbound: response_tx,
        };
        let client = ChannelClient {
            requests: request_tx,
            responses: response_rx,
        };
        (transport, client)
    }
}

#[async_trait]
impl FrameTransport for ChannelTransport {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        if let Some(mtu) = self.mtu {
            if frame.len() > usize::from(mtu) {
                return Err(TransportError::FrameTooLarge {
                    len: frame.len(),
                    mtu,
                });
            }
        }
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::ChannelClosed { peer: self.peer })
    }

    fn mtu(&self) -> Option<u16> {
        self.mtu
    }

    fn peer(&self) -> PeerAddress {
        self.peer
    }
}

impl ChannelClient {
    /// Send a request frame to the server
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.requests
            .send(frame)
            .await
            .map_err(|_| TransportError::ReceiveFailed {
                reason: "server side closed".to_string(),
            })
    }

    /// Wait for the next response frame, `None` once the server closed
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.responses.recv().await
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, frame: Vec<u8>) -> Result<Vec<u8>> {
        self.send(frame).await?;
        self.recv().await.ok_or_else(|| TransportError::ReceiveFailed {
            reason: "connection closed before response".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_pair_moves_frames_both_ways() {
        let peer = PeerAddress::new([1, 2, 3, 4, 5, 6]);
        let (mut transport, mut client) = ChannelTransport::pair(peer, Some(48), 4);

        client.send(vec![1, 2, 3]).await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), Some(vec![1, 2, 3]));

        transport.send(vec![4, 5]).await.unwrap();
        assert_eq!(client.recv().await, Some(vec![4, 5]));
        assert_eq!(transport.peer(), peer);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused() {
        let peer = PeerAddress::new([1; 6]);
        let (mut transport, _client) = ChannelTransport::pair(peer, Some(48), 4);
        let err = transport.send(vec![0; 49]).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { len: 49, mtu: 48 }));
    }

    #[tokio::test]
    async fn test_dropped_client_reads_as_close() {
        let (mut transport, client) = ChannelTransport::pair(PeerAddress::new([1; 6]), None, 4);
        drop(client);
        assert_eq!(transport.recv().await.unwrap(), None);
    }
}
