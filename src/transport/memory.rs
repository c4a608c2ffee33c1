//! In-process transport over tokio channels.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

use super::Transport;
use crate::error::TransportError;
use crate::request::Request;
use crate::response::Response;

/// An in-process transport built on tokio channels.
///
/// Requests are routed by [`Envelope::service`](crate::Envelope::service) to
/// the listener registered under that name; responses are matched back to
/// the caller by request id.
pub struct MemoryTransport {
    ready: watch::Sender<bool>,
    listeners: Mutex<HashMap<String, mpsc::Sender<Request>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Response>>>,
}

impl MemoryTransport {
    /// A transport that is ready immediately.
    pub fn new() -> Self {
        Self::with_readiness(true)
    }

    /// A transport that stays unready until [`set_ready`](Self::set_ready).
    pub fn unready() -> Self {
        Self::with_readiness(false)
    }

    fn with_readiness(ready: bool) -> Self {
        let (ready, _) = watch::channel(ready);
        Self {
            ready,
            listeners: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.send_replace(ready);
    }

    pub fn is_listening(&self, service: &str) -> bool {
        self.listeners.lock().contains_key(service)
    }

    /// Drops the inbound channel of `service`, as a broken connection would.
    /// The listener sees its channel close once buffered requests drain.
    pub fn disconnect(&self, service: &str) -> bool {
        self.listeners.lock().remove(service).is_some()
    }

    /// Delivers `req` to its service and returns a receiver for the reply.
    pub async fn send(&self, req: Request) -> Result<oneshot::Receiver<Response>, TransportError> {
        let service = req.service().to_owned();
        let id = req.id().to_owned();
        let inbound = self
            .listeners
            .lock()
            .get(&service)
            .cloned()
            .ok_or(TransportError::NoListener(service))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            // Callers that gave up, or whose reply was never sent.
            pending.retain(|_, caller| !caller.is_closed());
            pending.insert(id.clone(), tx);
        }
        if inbound.send(req).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(TransportError::Closed);
        }
        Ok(rx)
    }

    /// Sends `req` and waits for its reply.
    pub async fn call(&self, req: Request) -> Result<Response, TransportError> {
        let rx = self.send(req).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as `self`, so this only returns once ready.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn listen(&self, service: &str, inbound: mpsc::Sender<Request>) -> Result<(), TransportError> {
        self.listeners.lock().insert(service.to_owned(), inbound);
        Ok(())
    }

    async fn stop_listening(&self, service: &str) -> bool {
        self.listeners.lock().remove(service).is_some()
    }

    async fn respond(&self, req: &Request, rsp: Response) -> Result<(), TransportError> {
        let caller = self
            .pending
            .lock()
            .remove(req.id())
            .ok_or_else(|| TransportError::NoPendingCall(req.id().to_owned()))?;
        caller.send(rsp).map_err(|_| TransportError::Closed)
    }
}
