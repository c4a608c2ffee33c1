//! Error classifications as a typed enum.
//!
//! Every [`Fault`](crate::Fault) carries a [`Status`]. The split that matters
//! to callers is [`is_client_fault`](Status::is_client_fault): retrying a
//! client fault with the same input will fail again, retrying a server fault
//! might not.
//!
//! ```rust
//! use courier::Status;
//!
//! assert!(Status::BadRequest.is_client_fault());
//! assert!(Status::InternalService.is_server_fault());
//! assert_eq!(Status::NotFound.as_str(), "not_found");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classification of a per-request failure.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    // ── Client faults ─────────────────────────────────────────────────────────
    BadRequest,         // malformed or undecodable input, unknown endpoint
    Unauthorized,
    Forbidden,
    NotFound,
    PreconditionFailed,
    RateLimited,

    // ── Server faults ─────────────────────────────────────────────────────────
    InternalService,    // handler failure, anything unclassified
    BadResponse,        // a downstream dependency answered with garbage
    Timeout,
}

impl Status {
    /// Returns the wire representation (e.g. `"bad_request"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest         => "bad_request",
            Self::Unauthorized       => "unauthorized",
            Self::Forbidden          => "forbidden",
            Self::NotFound           => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::RateLimited        => "rate_limited",
            Self::InternalService    => "internal_service",
            Self::BadResponse        => "bad_response",
            Self::Timeout            => "timeout",
        }
    }

    pub fn is_client_fault(self) -> bool {
        matches!(
            self,
            Self::BadRequest
                | Self::Unauthorized
                | Self::Forbidden
                | Self::NotFound
                | Self::PreconditionFailed
                | Self::RateLimited
        )
    }

    pub fn is_server_fault(self) -> bool {
        !self.is_client_fault()
    }
}

/// The closest HTTP status code, used by the [`compat`](crate::compat) adapter.
impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        match s {
            Status::BadRequest         => 400,
            Status::Unauthorized       => 401,
            Status::Forbidden          => 403,
            Status::NotFound           => 404,
            Status::PreconditionFailed => 412,
            Status::RateLimited        => 429,
            Status::InternalService    => 500,
            Status::BadResponse        => 502,
            Status::Timeout            => 504,
        }
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bad_request"         => Ok(Self::BadRequest),
            "unauthorized"        => Ok(Self::Unauthorized),
            "forbidden"           => Ok(Self::Forbidden),
            "not_found"           => Ok(Self::NotFound),
            "precondition_failed" => Ok(Self::PreconditionFailed),
            "rate_limited"        => Ok(Self::RateLimited),
            "internal_service"    => Ok(Self::InternalService),
            "bad_response"        => Ok(Self::BadResponse),
            "timeout"             => Ok(Self::Timeout),
            _                     => Err(()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
