//! Field mapping between envelopes and [`http`] messages.
//!
//! Older clients speak plain HTTP: the host names the service, the path
//! names the endpoint and the `Legacy-Id` header carries the request id.
//! These helpers translate both ways without doing any I/O.

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderMap, Method};

use crate::headers::{Headers, LEGACY_ID};
use crate::request::Request;
use crate::response::Response;
use crate::server::Server;

/// Builds a [`Request`] from an HTTP request.
///
/// The service comes from the URI authority or the `Host` header, without
/// port; the endpoint is the URI path. Only the first value of a repeated
/// header is kept, and values that are not visible ASCII are skipped. A
/// non-empty `Legacy-Id` header becomes the request id.
pub fn from_http(req: http::Request<Bytes>) -> Request {
    let (parts, payload) = req.into_parts();

    let service = parts
        .uri
        .host()
        .map(str::to_owned)
        .or_else(|| {
            let host = parts.headers.get(HOST)?.to_str().ok()?;
            Some(host.split(':').next().unwrap_or(host).to_owned())
        })
        .unwrap_or_default();

    let mut out = Request::new()
        .with_service(service)
        .with_endpoint(parts.uri.path())
        .with_payload(payload);
    out.set_headers(first_values(&parts.headers));

    if let Some(id) = out.header(LEGACY_ID).filter(|id| !id.is_empty()).map(str::to_owned) {
        out.set_id(id);
    }
    out
}

/// Builds an HTTP `POST` carrying `req`, with its id in `Legacy-Id`.
pub fn to_http(req: &Request) -> Result<http::Request<Bytes>, http::Error> {
    let path = req.endpoint().trim_start_matches('/');
    let mut builder = http::Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}/{path}", req.service()));

    for (name, value) in req.headers().iter() {
        if !name.eq_ignore_ascii_case(LEGACY_ID) {
            builder = builder.header(name, value);
        }
    }
    builder.header(LEGACY_ID, req.id()).body(req.payload().clone())
}

/// Builds an HTTP response from `rsp`.
///
/// Success maps to `200`. An error response takes its status from the
/// attached fault, or `500` when none is attached.
pub fn into_http_response(rsp: Response) -> Result<http::Response<Bytes>, http::Error> {
    let status: u16 = match (rsp.is_error(), rsp.error()) {
        (false, _)          => 200,
        (true, Some(fault)) => fault.status.into(),
        (true, None)        => 500,
    };

    let mut builder = http::Response::builder().status(status);
    for (name, value) in rsp.headers().iter() {
        if !name.eq_ignore_ascii_case(LEGACY_ID) {
            builder = builder.header(name, value);
        }
    }
    builder.header(LEGACY_ID, rsp.id()).body(rsp.payload().clone())
}

/// Serves one HTTP request through `server`, bypassing any transport.
///
/// The endpoint is resolved from the method and path by trying
/// `"<METHOD> /path"`, then `"<METHOD> path"`, then (for `POST` only) the
/// bare `"path"`. When none is registered the request goes through with the
/// first candidate and gets the usual not-found reply.
pub async fn dispatch_http(
    server: &Server,
    req: http::Request<Bytes>,
) -> Result<Option<http::Response<Bytes>>, http::Error> {
    let method = req.method().clone();
    let mut req = from_http(req);

    let names = candidate_names(&method, req.endpoint());
    let resolved = names
        .iter()
        .find(|name| server.endpoint(name).is_some())
        .or_else(|| names.first());
    if let Some(name) = resolved {
        req.set_endpoint(name.as_str());
    }

    server.handle(req).await.map(into_http_response).transpose()
}

fn candidate_names(method: &Method, path: &str) -> Vec<String> {
    let bare = path.strip_prefix('/').unwrap_or(path);
    let mut names = vec![format!("{method} /{bare}"), format!("{method} {bare}")];
    if method == Method::POST {
        names.push(bare.to_owned());
    }
    names
}

fn first_values(map: &HeaderMap) -> Headers {
    map.keys()
        .filter_map(|name| {
            let value = map.get(name)?.to_str().ok()?;
            Some((name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::endpoint::Endpoint;
    use crate::fault::Fault;
    use crate::headers::CONTENT_TYPE;

    fn http_request(method: Method, uri: &str) -> http::request::Builder {
        http::Request::builder().method(method).uri(uri)
    }

    #[test]
    fn maps_host_path_headers_and_legacy_id() {
        let req = http_request(Method::POST, "/users/lookup")
            .header("host", "svc.users:8080")
            .header("x-tag", "first")
            .header("x-tag", "second")
            .header("legacy-id", "old-42")
            .body(Bytes::from_static(b"{}"))
            .unwrap();

        let req = from_http(req);
        assert_eq!(req.service(), "svc.users");
        assert_eq!(req.endpoint(), "/users/lookup");
        assert_eq!(req.id(), "old-42");
        assert_eq!(req.header("X-Tag"), Some("first"));
        assert_eq!(req.payload().as_ref(), b"{}");
    }

    #[test]
    fn keeps_generated_id_without_legacy_header() {
        let req = from_http(http_request(Method::GET, "http://svc/x").body(Bytes::new()).unwrap());
        assert_eq!(req.service(), "svc");
        assert!(!req.id().is_empty());
    }

    #[test]
    fn to_http_posts_to_service_and_endpoint() {
        let req = Request::new()
            .with_id("r-7")
            .with_service("svc.users")
            .with_endpoint("lookup")
            .with_header(CONTENT_TYPE, "application/json")
            .with_payload(&b"[]"[..]);

        let out = to_http(&req).unwrap();
        assert_eq!(out.method(), Method::POST);
        assert_eq!(out.uri(), "http://svc.users/lookup");
        assert_eq!(out.headers()["legacy-id"], "r-7");
        assert_eq!(out.headers()["content-type"], "application/json");
        assert_eq!(out.body().as_ref(), b"[]");
    }

    #[test]
    fn error_responses_carry_fault_status() {
        let req = Request::new().with_id("e-1");
        let rsp = crate::fault::error_response(&req, Fault::not_found("no_user", "No such user")).unwrap();

        let out = into_http_response(rsp).unwrap();
        assert_eq!(out.status(), 404);
        assert_eq!(out.headers()["legacy-id"], "e-1");

        let ok = into_http_response(req.response(None)).unwrap();
        assert_eq!(ok.status(), 200);
    }

    #[test]
    fn candidates_follow_method_rules() {
        assert_eq!(candidate_names(&Method::GET, "/a/b"), ["GET /a/b", "GET a/b"]);
        assert_eq!(candidate_names(&Method::POST, "/a"), ["POST /a", "POST a", "a"]);
    }

    #[tokio::test]
    async fn dispatch_resolves_names_in_order() {
        let server = Server::new("svc.http");
        server.add_endpoints([
            Endpoint::new("GET /users", |req: Request| async move { req.reply(json!("get")) }),
            Endpoint::new("create", |req: Request| async move { req.reply(json!("create")) }),
        ]);

        let get = http_request(Method::GET, "http://svc.http/users").body(Bytes::new()).unwrap();
        let out = dispatch_http(&server, get).await.unwrap().unwrap();
        assert_eq!(out.status(), 200);
        assert_eq!(serde_json::from_slice::<Value>(out.body()).unwrap(), json!("get"));

        let post = http_request(Method::POST, "http://svc.http/create").body(Bytes::new()).unwrap();
        let out = dispatch_http(&server, post).await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(out.body()).unwrap(), json!("create"));

        // A bare name is only a candidate for POST.
        let get = http_request(Method::GET, "http://svc.http/create").body(Bytes::new()).unwrap();
        let out = dispatch_http(&server, get).await.unwrap().unwrap();
        assert_eq!(out.status(), 400);
        let fault = Fault::decode(out.body()).unwrap();
        assert_eq!(fault.code, "endpoint_not_found");
    }
}
