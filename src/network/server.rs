//! TCP server and connection handling
//!
//! Accepts incoming peer connections and frames messages on the wire.

use crate::network::message::{Message, MAGIC, MAX_MESSAGE_SIZE};
use crate::network::peer::{PeerError, PeerHandle, PeerManager};
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

const HEADER_LEN: usize = 8;

/// Message codec for length-prefixed framing
pub struct MessageCodec;

fn invalid_data(msg: impl Into<String>) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.into())
}

impl Encoder<Message> for MessageCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = item.to_bytes().map_err(|e| invalid_data(e.to_string()))?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(invalid_data(format!(
                "Message too large: {} bytes",
                data.len()
            )));
        }

        // Magic (4) + Length (4) + Data
        dst.reserve(HEADER_LEN + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            if src[..4] != MAGIC {
                return Err(invalid_data("Invalid magic bytes"));
            }

            let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
            if len > MAX_MESSAGE_SIZE {
                return Err(invalid_data(format!("Frame too large: {} bytes", len)));
            }

            if src.len() < HEADER_LEN + len {
                src.reserve(HEADER_LEN + len - src.len());
                return Ok(None);
            }

            src.advance(HEADER_LEN);
            let data = src.split_to(len);

            // The frame is consumed either way; a bad payload only loses itself
            match Message::from_bytes(&data) {
                Ok(msg) => return Ok(Some(msg)),
                Err(e) => log::warn!("Dropping undecodable {} byte frame: {}", len, e),
            }
        }
    }
}

/// TCP server for accepting peer connections
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Bind to a port and create the server
    pub async fn bind(port: u16) -> Result<Self, std::io::Error> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr).await?;
        log::info!("Listening for peers on {}", addr);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Accept incoming connections
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), std::io::Error> {
        self.listener.accept().await
    }
}

/// Connect to a peer
pub async fn connect_to_peer(addr: &str) -> Result<(TcpStream, SocketAddr), PeerError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PeerError::ConnectionFailed(format!("{}: {}", addr, e)))?;
    let peer_addr = stream
        .peer_addr()
        .map_err(|e| PeerError::ConnectionFailed(e.to_string()))?;
    Ok((stream, peer_addr))
}

/// Handle a peer connection (both inbound and outbound).
/// Opens by asking the peer for its head and its pool.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    peer_manager: Arc<PeerManager>,
    message_tx: mpsc::Sender<(SocketAddr, Message)>,
    outbound: bool,
) -> Result<(), PeerError> {
    let framed = Framed::new(stream, MessageCodec);
    let (mut writer, mut reader) = framed.split();

    // Create channel for sending to this peer
    let (tx, mut rx) = mpsc::channel::<Message>(100);
    peer_manager
        .add_peer(PeerHandle { addr, outbound, tx })
        .await?;

    for opening in [Message::QueryLatest, Message::QueryTransactionPool] {
        if let Err(e) = writer.send(opening).await {
            peer_manager.remove_peer(&addr).await;
            return Err(PeerError::IoError(e));
        }
    }

    let write_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if writer.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        match reader.next().await {
            Some(Ok(msg)) => {
                if message_tx.send((addr, msg)).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                log::warn!("Error reading from {}: {}", addr, e);
                break;
            }
            None => {
                log::info!("Peer {} disconnected", addr);
                break;
            }
        }
    }

    write_handle.abort();
    peer_manager.remove_peer(&addr).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Block;

    #[test]
    fn test_message_codec() {
        let mut codec = MessageCodec;
        let msg = Message::blockchain(vec![Block::genesis()]);
        let mut buf = BytesMut::new();

        codec.encode(msg.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..4], &MAGIC);

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = MessageCodec;
        let mut full = BytesMut::new();
        codec.encode(Message::QueryAll, &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_frames() {
        let mut codec = MessageCodec;

        let mut bad_magic = BytesMut::from(&b"XXXX\x00\x00\x00\x02{}"[..]);
        assert!(codec.decode(&mut bad_magic).is_err());

        let mut oversized = BytesMut::new();
        oversized.put_slice(&MAGIC);
        oversized.put_u32(MAX_MESSAGE_SIZE as u32 + 1);
        assert!(codec.decode(&mut oversized).is_err());
    }

    #[test]
    fn test_undecodable_payload_skipped() {
        let mut codec = MessageCodec;
        let junk = br#"{"type":"NOT_A_MESSAGE"}"#;

        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32(junk.len() as u32);
        buf.put_slice(junk);
        codec.encode(Message::QueryAll, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Message::QueryAll));
        assert!(buf.is_empty());

        // A lone bad frame leaves nothing to yield but no error either
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u32(junk.len() as u32);
        buf.put_slice(junk);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
