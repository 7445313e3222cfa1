//! The single ticker driving every active stream.
//!
//! One [`Scheduler`] owns a list of active sources in registration order,
//! keyed by transport identity: registering an already-registered
//! transport replaces its entry in place rather than driving it twice.
//! A background task fires [`crate::ticker::Ticker`] once per `interval`
//! and calls [`Scheduler::tick`] synchronously — every active source is
//! asked for its next packet, in insertion order, and the packet (if any)
//! is handed to its transport's non-blocking `send`. A tick never
//! `.await`s: packing a packet and a `try_send_to` are the only work done
//! while the entry list is locked, so one slow source can never push
//! another source's packet late.
//!
//! Finished sources are removed in a compaction pass *after* the full
//! iteration completes — the list is never mutated while it's being
//! walked. A [`crate::ticker::Ticker`] overrun is treated as fatal: every
//! registered stream is failed with [`Completion::Failed`] and the
//! scheduler's background task exits.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::RtpError;
use crate::source::{Source, SourceState};
use crate::stream::Stream;
use crate::ticker::Ticker;
use crate::transport::Transport;

/// How a scheduled stream's source run ended.
#[derive(Debug, Clone)]
pub enum Completion {
    /// The source ran out of media on its own.
    Exhausted,
    /// The stream was stopped from the outside (`Stream::stop` /
    /// `Scheduler::unregister`/`stop`).
    Cancelled,
    /// The scheduler itself failed (currently only a timer overrun).
    Failed(RtpError),
}

struct Entry {
    source: Box<dyn Source>,
    transport: Arc<Transport>,
    completion_tx: Option<oneshot::Sender<Completion>>,
}

/// Drives every registered source at a fixed cadence.
pub struct Scheduler {
    entries: Mutex<Vec<(Uuid, Entry)>>,
    ticker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            ticker_handle: Mutex::new(None),
        })
    }

    /// Create a new stream bound (eventually) to `local_addr`, ready for
    /// `describe`/`negotiate`/`schedule`.
    pub fn create_new_stream(self: &Arc<Self>, local_addr: SocketAddr, ptime: u32) -> Stream {
        Stream::new(self.clone(), local_addr, ptime)
    }

    /// Register a source/transport pair. Idempotent over `transport`
    /// (spec §4.5): registering the same transport again cancels whatever
    /// was previously scheduled on it and replaces the entry in place,
    /// rather than creating a second tick-driven duplicate. Returns the
    /// transport's id (for [`Scheduler::unregister`]) and a future that
    /// resolves once the stream ends, whatever the reason.
    pub fn register(
        &self,
        source: Box<dyn Source>,
        transport: Arc<Transport>,
    ) -> (Uuid, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        let id = transport.id();
        let entry = Entry {
            source,
            transport,
            completion_tx: Some(tx),
        };

        let mut entries = self.entries.lock().expect("scheduler lock poisoned");
        if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
            let (_, mut previous) = entries.remove(pos);
            previous.source.stop();
            if let Some(previous_tx) = previous.completion_tx.take() {
                let _ = previous_tx.send(Completion::Cancelled);
            }
            entries.insert(pos, (id, entry));
        } else {
            entries.push((id, entry));
        }
        (id, rx)
    }

    /// Stop and remove one stream early.
    pub fn unregister(&self, id: Uuid) {
        let mut entries = self.entries.lock().expect("scheduler lock poisoned");
        if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
            let (_, mut entry) = entries.remove(pos);
            entry.source.stop();
            if let Some(tx) = entry.completion_tx.take() {
                let _ = tx.send(Completion::Cancelled);
            }
        }
    }

    /// Stop and remove every currently-registered stream.
    pub fn stop(&self) {
        let mut entries = self.entries.lock().expect("scheduler lock poisoned");
        for (_, mut entry) in entries.drain(..) {
            entry.source.stop();
            if let Some(tx) = entry.completion_tx.take() {
                let _ = tx.send(Completion::Cancelled);
            }
        }
    }

    /// One synchronous tick: every active source is polled once, in
    /// insertion order, and finished sources are compacted out afterward.
    fn tick(&self) {
        let mut entries = self.entries.lock().expect("scheduler lock poisoned");
        let mut finished_ids = Vec::new();

        for (id, entry) in entries.iter_mut() {
            match entry.source.next() {
                Some(packet) => {
                    let _ = entry.transport.send(&packet.pack());
                }
                None => finished_ids.push(*id),
            }
        }

        if finished_ids.is_empty() {
            return;
        }

        let mut finished_set: HashMap<Uuid, ()> = HashMap::with_capacity(finished_ids.len());
        for id in finished_ids {
            finished_set.insert(id, ());
        }

        let mut remaining = Vec::with_capacity(entries.len());
        for (id, mut entry) in entries.drain(..) {
            if finished_set.contains_key(&id) {
                let completion = match entry.source.state() {
                    SourceState::Stopped => Completion::Cancelled,
                    _ => Completion::Exhausted,
                };
                if let Some(tx) = entry.completion_tx.take() {
                    let _ = tx.send(completion);
                }
            } else {
                remaining.push((id, entry));
            }
        }
        *entries = remaining;
    }

    fn fail_all(&self, err: RtpError) {
        let mut entries = self.entries.lock().expect("scheduler lock poisoned");
        for (_, mut entry) in entries.drain(..) {
            if let Some(tx) = entry.completion_tx.take() {
                let _ = tx.send(Completion::Failed(err.clone()));
            }
        }
    }

    /// Start the background ticker task, firing every `interval`. Stores
    /// the join handle so a second call can be detected by callers if
    /// they choose to track it; this scheduler only ever expects one.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = Ticker::new(interval);
            loop {
                match ticker.tick().await {
                    Ok(()) => scheduler.tick(),
                    Err(e) => {
                        tracing::error!(error = %e, "scheduler timer overrun, failing all streams");
                        scheduler.fail_all(e);
                        break;
                    }
                }
            }
        });
        *self.ticker_handle.lock().expect("scheduler lock poisoned") = Some(handle);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker_handle.lock().expect("scheduler lock poisoned").take() {
            handle.abort();
        }
    }
}
