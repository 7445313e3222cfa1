//! UDP transport for RTP datagrams.
//!
//! A [`Transport`] is constructed in `Pending` state before any socket is
//! bound, so it can be handed to a [`crate::stream::Stream`] and shared
//! with the [`crate::scheduler::Scheduler`] immediately; [`Transport::open`]
//! later binds the socket and starts the background receive task. Sending
//! before `open` (or after the transport is closed) returns
//! [`RtpError::NotReady`] rather than panicking.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::codec::{ReceivedPacket, RtpHeader};
use crate::error::{Result, RtpError};

enum TransportState {
    Pending,
    Ready {
        socket: Arc<UdpSocket>,
        remote: SocketAddr,
    },
    Closed,
}

/// A bound (or not-yet-bound) UDP socket dedicated to one RTP stream.
pub struct Transport {
    id: Uuid,
    state: RwLock<TransportState>,
    sender: mpsc::UnboundedSender<ReceivedPacket>,
    receiver: std::sync::Mutex<Option<mpsc::UnboundedReceiver<ReceivedPacket>>>,
    recv_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: RwLock::new(TransportState::Pending),
            sender,
            receiver: std::sync::Mutex::new(Some(receiver)),
            recv_handle: std::sync::Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bind `bind_addr` and start receiving datagrams from `remote_addr`.
    /// Spawns the background receive task; safe to call only once per
    /// transport (a second call rebinds and leaks the previous socket's
    /// receive task, so callers should not retry `open` on a live transport).
    pub async fn open(self: &Arc<Self>, bind_addr: SocketAddr, remote_addr: SocketAddr) -> Result<()> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| RtpError::NegotiationFailed(format!("bind {bind_addr}: {e}")))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| RtpError::NegotiationFailed(e.to_string()))?;
        tracing::info!(%local_addr, %remote_addr, "transport bound");

        let socket = Arc::new(socket);
        *self.state.write().expect("transport state lock poisoned") = TransportState::Ready {
            socket: socket.clone(),
            remote: remote_addr,
        };

        let sender = self.sender.clone();
        let handle = tokio::spawn(recv_loop(socket, sender));
        *self.recv_handle.lock().expect("recv handle lock poisoned") = Some(handle);

        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            *self.state.read().expect("transport state lock poisoned"),
            TransportState::Ready { .. }
        )
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &*self.state.read().expect("transport state lock poisoned") {
            TransportState::Ready { socket, .. } => {
                socket.local_addr().map_err(|e| RtpError::NegotiationFailed(e.to_string()))
            }
            _ => Err(RtpError::NotReady),
        }
    }

    /// Send one packed RTP datagram. Non-blocking: uses `try_send_to` so a
    /// scheduler tick never suspends on a full send buffer — a transient
    /// `WouldBlock` silently drops the packet, matching UDP's own
    /// best-effort delivery semantics.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        let guard = self.state.read().expect("transport state lock poisoned");
        match &*guard {
            TransportState::Ready { socket, remote } => match socket.try_send_to(data, *remote) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    tracing::debug!("transport send would block, dropping datagram");
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "transport send failed");
                    Ok(())
                }
            },
            _ => Err(RtpError::NotReady),
        }
    }

    /// Take ownership of the stream of received packets. Can only be
    /// called once; subsequent calls return `None`.
    pub fn packets(&self) -> Option<UnboundedReceiverStream<ReceivedPacket>> {
        self.receiver
            .lock()
            .expect("receiver lock poisoned")
            .take()
            .map(UnboundedReceiverStream::new)
    }

    pub fn close(&self) {
        *self.state.write().expect("transport state lock poisoned") = TransportState::Closed;
        if let Some(handle) = self.recv_handle.lock().expect("recv handle lock poisoned").take() {
            handle.abort();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(handle) = self.recv_handle.lock().expect("recv handle lock poisoned").take() {
            handle.abort();
        }
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, sender: mpsc::UnboundedSender<ReceivedPacket>) {
    let mut buf = [0u8; 2048];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => {
                let arrival = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);

                match RtpHeader::unpack(&buf[..len]) {
                    Ok(header) => {
                        if sender.send(ReceivedPacket { arrival, header }).is_err() {
                            // receiving half dropped; stream no longer cares.
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(%from, error = %e, "dropped malformed RTP datagram");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport recv_from failed");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_open_is_not_ready() {
        let transport = Transport::new();
        assert!(!transport.is_ready());
        assert!(matches!(transport.send(&[0u8; 12]), Err(RtpError::NotReady)));
    }

    #[tokio::test]
    async fn open_binds_and_becomes_ready() {
        let transport = Transport::new();
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        transport.open(any, any).await.unwrap();
        assert!(transport.is_ready());
        assert!(transport.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn loopback_datagram_is_received() {
        let a = Transport::new();
        let b = Transport::new();
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();

        a.open(any, any).await.unwrap();
        let a_addr = a.local_addr().unwrap();
        b.open(any, a_addr).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        // rebind `a`'s notion of remote to `b` by reopening is not supported;
        // instead send directly via a fresh socket pair semantics: send from b to a.
        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_items: 0,
            marker: false,
            payload_type: 0,
            sequence: 1,
            timestamp: 160,
            ssrc: 42,
            payload: vec![0xFF; 160],
        };

        b.send(&header.pack()).unwrap();

        let mut stream = a.packets().unwrap();
        use tokio_stream::StreamExt;
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("timed out waiting for packet")
            .expect("stream ended");
        assert_eq!(received.header.sequence, 1);
        assert_eq!(received.header.ssrc, 42);
        let _ = b_addr;
    }
}
