//! Per-request log line with latency.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Middleware;
use crate::request::Request;
use crate::response::Response;

/// When the request entered the chain. Stored in the request context.
#[derive(Clone, Copy, Debug)]
struct Started(Instant);

/// Logs one line per request with id, endpoint, outcome and latency.
///
/// Register it first so the measured latency covers the rest of the chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn process_request(&self, mut req: Request) -> (Request, Option<Response>) {
        debug!(id = %req.id(), endpoint = %req.endpoint(), origin = %req.origin(), "request received");
        let ctx = req.context().with_value(Started(Instant::now()));
        req.set_context(ctx);
        (req, None)
    }

    fn process_response(&self, rsp: Option<Response>, req: &Request) -> Option<Response> {
        let elapsed = req.value::<Started>().map(|started| started.0.elapsed());
        match &rsp {
            Some(r) => info!(
                id = %req.id(),
                endpoint = %req.endpoint(),
                is_error = r.is_error(),
                elapsed = ?elapsed,
                "request handled"
            ),
            None => warn!(id = %req.id(), endpoint = %req.endpoint(), elapsed = ?elapsed, "request handled without reply"),
        }
        rsp
    }
}
