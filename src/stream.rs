//! A single RTP media stream: one local UDP endpoint, one scheduled
//! source, one peer.
//!
//! The typical lifecycle is `describe` (produce an SDP offer) →
//! `negotiate` (consume the peer's answer, bind the transport) →
//! `schedule` (hand a source to the scheduler) → `packets`/`wait`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::codec::ReceivedPacket;
use crate::error::{Result, RtpError};
use crate::scheduler::{Completion, Scheduler};
use crate::sdp::{self, Sdp};
use crate::source::Source;
use crate::transport::Transport;

/// One scheduled RTP endpoint.
pub struct Stream {
    scheduler: Arc<Scheduler>,
    local_addr: SocketAddr,
    ptime: u32,
    transport: Arc<Transport>,
    remote_addr: Option<SocketAddr>,
    registration: Option<(Uuid, oneshot::Receiver<Completion>)>,
}

impl Stream {
    pub(crate) fn new(scheduler: Arc<Scheduler>, local_addr: SocketAddr, ptime: u32) -> Self {
        Self {
            scheduler,
            local_addr,
            ptime,
            transport: Transport::new(),
            remote_addr: None,
            registration: None,
        }
    }

    /// Produce an SDP offer/answer describing this stream's local endpoint.
    pub fn describe(&self) -> Sdp {
        Sdp::new(self.local_addr, self.ptime)
    }

    /// Consume the peer's SDP, extract its RTP endpoint, and bind the
    /// local transport to it. Must be called before [`Stream::schedule`].
    pub async fn negotiate(&mut self, peer_sdp: &str) -> Result<()> {
        let remote_addr = sdp::negotiate(peer_sdp)?;
        self.transport.open(self.local_addr, remote_addr).await?;
        self.remote_addr = Some(remote_addr);
        Ok(())
    }

    /// Hand `source` to the scheduler. Requires a prior successful
    /// [`Stream::negotiate`].
    pub fn schedule(&mut self, source: Box<dyn Source>) -> Result<()> {
        if self.remote_addr.is_none() {
            return Err(RtpError::NotReady);
        }
        let (id, rx) = self.scheduler.register(source, self.transport.clone());
        self.registration = Some((id, rx));
        Ok(())
    }

    /// The local address this stream is actually bound to. Only
    /// meaningful after a successful [`Stream::negotiate`].
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The stream of packets received from the peer. Can only be taken
    /// once.
    pub fn packets(&self) -> Option<UnboundedReceiverStream<ReceivedPacket>> {
        self.transport.packets()
    }

    /// Wait for the scheduled source to finish, be cancelled, or fail.
    pub async fn wait(&mut self) -> Result<Completion> {
        match self.registration.take() {
            Some((_, rx)) => rx.await.map_err(|_| RtpError::Cancelled),
            None => Err(RtpError::NotReady),
        }
    }

    /// Stop the stream early, releasing its scheduler registration.
    pub fn stop(&mut self) {
        if let Some((id, _)) = self.registration.take() {
            self.scheduler.unregister(id);
        }
        self.transport.close();
    }
}
