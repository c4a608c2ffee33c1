//! The RPC server and its supervised worker loop.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start──▶ Starting ──ready + listen──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                       │                            │
//!                       └── timeout / stop ──────────┴── reconnect failed ──────▶ Stopped
//! ```
//!
//! One guarded slot holds the current run. [`Server::start`] claims it or
//! fails with [`Error::AlreadyRunning`]; nothing else can create a second
//! worker loop for the same server.
//!
//! While running, one task consumes the inbound channel. Every request is
//! handed to its own task and the loop moves on without waiting, so replies
//! leave in completion order, not arrival order. If the transport drops the
//! inbound channel the loop listens again once; if that fails the run ends
//! with [`Error::Reconnect`].
//!
//! [`Server::stop`] ends the loop and waits until it has fully exited.
//! Requests already dispatched keep running to completion; use
//! [`Server::drain`] to wait for them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::codec::CodecRegistry;
use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::fault::{endpoint_not_found, error_response};
use crate::middleware::{self, BoxedMiddleware, Chain, Middleware};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::transport::Transport;

/// Where a server is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Final outcome of a run; `None` until the run has exited.
type Outcome = Option<Result<(), Error>>;

/// What `stop` and `run` need to observe a run.
#[derive(Clone)]
struct RunHandle {
    id: u64,
    stop: CancellationToken,
    finished: watch::Receiver<Outcome>,
}

/// Owned by whoever drives the run. Publishes the outcome exactly once.
struct Run {
    id: u64,
    stop: CancellationToken,
    finished: watch::Sender<Outcome>,
}

/// `run` is `Some` exactly when `state` is not `Stopped`.
struct Slot {
    state: State,
    run: Option<RunHandle>,
}

/// An RPC server: endpoint registry, middleware chain, codec registry and
/// the worker that feeds them from a [`Transport`].
///
/// Cheap to clone; clones share everything.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use courier::{Endpoint, Fault, MemoryTransport, Request, Server};
///
/// # async fn demo() -> Result<(), courier::Error> {
/// let server = Server::new("svc.echo");
/// server.add_endpoints([Endpoint::new("ping", |req: Request| async move {
///     Ok::<_, Fault>(req.reply("pong"))
/// })]);
///
/// let transport = Arc::new(MemoryTransport::new());
/// server.run(transport).await
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    router: Router,
    middleware: Chain,
    codecs: CodecRegistry,
    slot: Mutex<Slot>,
    tasks: TaskTracker,
    runs: AtomicU64,
}

impl Server {
    /// A server with default configuration, the process-wide default
    /// middleware and the process-wide codec registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// A builder whose chain starts as a copy of [`middleware::defaults`].
    pub fn builder(name: impl Into<String>) -> ServerBuilder {
        ServerBuilder {
            config: ServerConfig::new(name),
            middleware: middleware::defaults(),
            codecs: None,
        }
    }

    pub fn name(&self) -> &str { &self.inner.config.name }
    pub fn config(&self) -> &ServerConfig { &self.inner.config }
    pub fn codecs(&self) -> &CodecRegistry { &self.inner.codecs }

    // ── Endpoints ─────────────────────────────────────────────────────────────

    /// Registers endpoints by name, replacing any existing binding.
    pub fn add_endpoints(&self, eps: impl IntoIterator<Item = Endpoint>) {
        self.inner.router.add_endpoints(eps);
    }

    pub fn remove_endpoints<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.router.remove_endpoints(names);
    }

    pub fn endpoint(&self, name: &str) -> Option<Endpoint> {
        self.inner.router.endpoint(name)
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.router.endpoints()
    }

    // ── Middleware ────────────────────────────────────────────────────────────

    /// A copy of the current chain.
    pub fn middleware(&self) -> Vec<BoxedMiddleware> {
        Vec::clone(&self.inner.middleware.snapshot())
    }

    pub fn set_middleware(&self, layers: Vec<BoxedMiddleware>) {
        self.inner.middleware.set(layers);
    }

    pub fn add_middleware(&self, layer: impl Middleware) {
        self.inner.middleware.push(Arc::new(layer));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.inner.slot.lock().state
    }

    /// Requests dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Waits until every request dispatched so far has finished.
    pub async fn drain(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.tasks.reopen();
    }

    /// Runs `req` through the middleware chain and its endpoint in the
    /// calling task, without a transport. Returns the reply that would have
    /// been sent, if any.
    pub async fn handle(&self, req: Request) -> Option<Response> {
        self.inner.process(req).await.1
    }

    /// Connects to `transport` and starts the worker loop in the background.
    ///
    /// Returns once the server is listening. Fails with
    /// [`Error::AlreadyRunning`] if a run is active (leaving it untouched),
    /// [`Error::ConnectTimeout`] if the transport is not ready within the
    /// configured timeout, or [`Error::Stopped`] if [`stop`](Self::stop) was
    /// called meanwhile.
    pub async fn start(&self, transport: Arc<dyn Transport>) -> Result<(), Error> {
        self.launch(transport).await.map(|_| ())
    }

    /// [`start`](Self::start), then waits for the worker loop to exit.
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop), or the error that ended
    /// the loop.
    pub async fn run(&self, transport: Arc<dyn Transport>) -> Result<(), Error> {
        let mut finished = self.launch(transport).await?;
        match finished.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            // The loop task vanished without reporting: the runtime is shutting down.
            Err(_) => Ok(()),
        }
    }

    /// Ends the worker loop and waits for it to exit. A no-op when stopped.
    ///
    /// Does not cancel requests already dispatched.
    pub async fn stop(&self) {
        let handle = {
            let mut slot = self.inner.slot.lock();
            let Some(handle) = slot.run.clone() else { return };
            slot.state = State::Stopping;
            handle
        };
        info!(server = %self.name(), run = handle.id, "stopping server");
        handle.stop.cancel();
        let mut finished = handle.finished;
        let _ = finished.wait_for(Option::is_some).await;
    }

    async fn launch(&self, transport: Arc<dyn Transport>) -> Result<watch::Receiver<Outcome>, Error> {
        let run = self.inner.begin()?;
        let finished = run.finished.subscribe();

        let inbound = match self.inner.connect(transport.as_ref(), &run.stop).await {
            Ok(inbound) => inbound,
            Err(err) => {
                self.inner.finish(run, transport.as_ref(), Ok(())).await;
                return Err(err);
            }
        };

        self.inner.mark_running(run.id);
        info!(server = %self.name(), run = run.id, "server listening");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.supervise(&transport, inbound, &run.stop).await;
            inner.finish(run, transport.as_ref(), outcome).await;
        });
        Ok(finished)
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("endpoints", &self.inner.router.len())
            .field("middleware", &self.inner.middleware.len())
            .finish()
    }
}

impl Inner {
    /// Claims the run slot: `Stopped → Starting`.
    fn begin(&self) -> Result<Run, Error> {
        let mut slot = self.slot.lock();
        if slot.run.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let stop = CancellationToken::new();
        let (finished, rx) = watch::channel(None);
        slot.state = State::Starting;
        slot.run = Some(RunHandle { id, stop: stop.clone(), finished: rx });
        Ok(Run { id, stop, finished })
    }

    /// `Starting → Running`, unless a stop got in first.
    fn mark_running(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.state == State::Starting && slot.run.as_ref().is_some_and(|h| h.id == id) {
            slot.state = State::Running;
        }
    }

    /// Releases the slot and publishes the outcome. The slot is free before
    /// any waiter wakes, so a caller returning from `stop` can start again.
    async fn finish(&self, run: Run, transport: &dyn Transport, outcome: Result<(), Error>) {
        transport.stop_listening(&self.config.name).await;
        {
            let mut slot = self.slot.lock();
            if slot.run.as_ref().is_some_and(|h| h.id == run.id) {
                slot.run = None;
                slot.state = State::Stopped;
            }
        }
        match &outcome {
            Ok(()) => info!(server = %self.config.name, run = run.id, "server stopped"),
            Err(err) => error!(server = %self.config.name, run = run.id, error = %err, "server loop failed"),
        }
        run.finished.send_replace(Some(outcome));
    }

    /// Waits for readiness, then listens on a fresh bounded channel.
    async fn connect(
        &self,
        transport: &dyn Transport,
        stop: &CancellationToken,
    ) -> Result<mpsc::Receiver<Request>, Error> {
        let timeout: Duration = self.config.connect_timeout;
        tokio::select! {
            biased;

            () = stop.cancelled() => return Err(Error::Stopped),

            ready = tokio::time::timeout(timeout, transport.ready()) => {
                if ready.is_err() {
                    warn!(server = %self.config.name, ?timeout, "timed out waiting for transport readiness");
                    return Err(Error::ConnectTimeout(timeout));
                }
            }
        }

        let (tx, rx) = mpsc::channel(self.config.inbound_capacity.max(1));
        transport.listen(&self.config.name, tx).await?;
        Ok(rx)
    }

    /// The worker loop.
    async fn supervise(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        mut inbound: mpsc::Receiver<Request>,
        stop: &CancellationToken,
    ) -> Result<(), Error> {
        loop {
            tokio::select! {
                // Check stop first so a stop request is honoured even while
                // requests keep arriving.
                biased;

                () = stop.cancelled() => return Ok(()),

                received = inbound.recv() => match received {
                    Some(req) => self.spawn_dispatch(transport, req),
                    None => {
                        warn!(server = %self.config.name, "inbound channel closed; trying to reconnect");
                        match self.connect(transport.as_ref(), stop).await {
                            Ok(rx) => {
                                inbound = rx;
                                info!(server = %self.config.name, "reconnected");
                            }
                            Err(Error::Stopped) => return Ok(()),
                            Err(err) => {
                                error!(server = %self.config.name, error = %err, "could not reconnect after channel close");
                                return Err(Error::Reconnect(Box::new(err)));
                            }
                        }
                    }
                },
            }
        }
    }

    fn spawn_dispatch(self: &Arc<Self>, transport: &Arc<dyn Transport>, req: Request) {
        let inner = Arc::clone(self);
        let transport = Arc::clone(transport);
        self.tasks.spawn(async move {
            inner.dispatch(transport.as_ref(), req).await;
        });
    }

    /// Handles one request from arrival to reply.
    async fn dispatch(&self, transport: &dyn Transport, req: Request) {
        let (req, rsp) = self.process(req).await;
        let Some(rsp) = rsp else {
            debug!(id = %req.id(), endpoint = %req.endpoint(), "no response to send");
            return;
        };
        if let Err(err) = transport.respond(&req, rsp).await {
            warn!(id = %req.id(), error = %err, "failed to deliver response");
        }
    }

    /// Middleware request phase, routing, middleware response phase. The
    /// chain is read once so both phases see the same layers.
    async fn process(&self, req: Request) -> (Request, Option<Response>) {
        let req = req.with_codecs(self.codecs.clone());
        let layers = self.middleware.snapshot();

        let (mut req, short_circuit) = middleware::apply_request(&layers, req);
        let rsp = match short_circuit {
            Some(rsp) => Some(rsp),
            None => self.route(&mut req).await,
        };
        let rsp = middleware::apply_response(&layers, rsp, &req);
        (req, rsp)
    }

    async fn route(&self, req: &mut Request) -> Option<Response> {
        let Some(ep) = self.router.endpoint(req.endpoint()) else {
            warn!(id = %req.id(), endpoint = %req.endpoint(), "request for unknown endpoint");
            return error_response(req, endpoint_not_found());
        };

        match ep.handle(req).await {
            Ok(Some(mut rsp)) => {
                rsp.set_id(req.id());
                Some(rsp)
            }
            Ok(None) => Some(req.response(None)),
            Err(err) => {
                info!(
                    id = %req.id(),
                    endpoint = %ep.name(),
                    error = %err,
                    request_payload = %String::from_utf8_lossy(req.payload()),
                    "error from endpoint"
                );
                error_response(req, err)
            }
        }
    }
}

// ── ServerBuilder ─────────────────────────────────────────────────────────────

/// Fluent builder for [`Server`].
///
/// Obtain via [`Server::builder`]. Defaults come from [`ServerConfig`].
pub struct ServerBuilder {
    config: ServerConfig,
    middleware: Vec<BoxedMiddleware>,
    codecs: Option<CodecRegistry>,
}

impl ServerBuilder {
    /// Replaces the whole configuration, keeping the name given to
    /// [`Server::builder`] if `config.name` is empty.
    pub fn config(mut self, config: ServerConfig) -> Self {
        let name = std::mem::take(&mut self.config.name);
        self.config = config;
        if self.config.name.is_empty() {
            self.config.name = name;
        }
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    /// Appends a middleware to the initial chain.
    pub fn middleware(mut self, layer: impl Middleware) -> Self {
        self.middleware.push(Arc::new(layer));
        self
    }

    /// Uses `codecs` instead of the process-wide registry.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    pub fn build(self) -> Server {
        Server {
            inner: Arc::new(Inner {
                config: self.config,
                router: Router::new(),
                middleware: Chain::new(self.middleware),
                codecs: self.codecs.unwrap_or_else(|| CodecRegistry::global().clone()),
                slot: Mutex::new(Slot { state: State::Stopped, run: None }),
                tasks: TaskTracker::new(),
                runs: AtomicU64::new(0),
            }),
        }
    }
}
