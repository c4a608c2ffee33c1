use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier::headers::CONTENT_TYPE;
use courier::{
    Endpoint, Error, Fault, MemoryTransport, Middleware, Request, Response, Server, State, Status,
    error_response,
};
use serde_json::{Value, json};

const SERVICE: &str = "svc.test";

fn echo() -> Endpoint {
    Endpoint::new("echo", |req: Request| async move {
        let body = req.body_as::<Value>().cloned().unwrap_or(Value::Null);
        req.reply(body)
    })
    .with_request::<Value>()
}

fn sleeper() -> Endpoint {
    Endpoint::new("sleep", |req: Request| async move {
        let ms = req.body_as::<u64>().copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        req.reply(ms)
    })
    .with_request::<u64>()
}

fn server() -> Server {
    let server = Server::builder(SERVICE)
        .connect_timeout(Duration::from_millis(100))
        .build();
    server.add_endpoints([echo(), sleeper()]);
    server
}

fn request(endpoint: &str, payload: &'static str) -> Request {
    Request::new()
        .with_service(SERVICE)
        .with_origin("svc.caller")
        .with_endpoint(endpoint)
        .with_header(CONTENT_TYPE, "application/json")
        .with_payload(payload)
}

async fn until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn echoes_json_payload() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();
    assert_eq!(server.state(), State::Running);

    let req = request("echo", r#"{"x":1}"#);
    let id = req.id().to_owned();
    let rsp = transport.call(req).await.unwrap();

    assert!(!rsp.is_error());
    assert_eq!(rsp.id(), id);
    assert_eq!(rsp.service(), "svc.caller");
    assert_eq!(serde_json::from_slice::<Value>(rsp.payload()).unwrap(), json!({ "x": 1 }));

    server.stop().await;
    assert_eq!(server.state(), State::Stopped);
    assert!(!transport.is_listening(SERVICE));
}

#[tokio::test]
async fn unknown_endpoint_gets_bad_request() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let req = request("nope", "{}");
    let id = req.id().to_owned();
    let rsp = transport.call(req).await.unwrap();

    assert!(rsp.is_error());
    assert_eq!(rsp.id(), id);
    assert_eq!(rsp.header(CONTENT_TYPE), Some("application/json"));
    let fault = Fault::decode(rsp.payload()).unwrap();
    assert_eq!(fault.status, Status::BadRequest);
    assert_eq!(fault.code, "endpoint_not_found");
    assert_eq!(rsp.error(), Some(&fault));

    server.stop().await;
}

#[tokio::test]
async fn legacy_slash_names_still_route() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let rsp = transport.call(request("/echo", "[1]")).await.unwrap();
    assert!(!rsp.is_error());
    assert_eq!(rsp.payload().as_ref(), b"[1]");

    server.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_a_client_fault() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let rsp = transport.call(request("echo", "{not json")).await.unwrap();
    let fault = Fault::decode(rsp.payload()).unwrap();
    assert!(fault.is_client_fault());
    assert_eq!(fault.code, "invalid_payload");

    server.stop().await;
}

#[tokio::test]
async fn second_start_is_rejected() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let err = server.start(transport.clone()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    // The first run is untouched.
    assert_eq!(server.state(), State::Running);
    let rsp = transport.call(request("echo", "2")).await.unwrap();
    assert_eq!(rsp.payload().as_ref(), b"2");

    server.stop().await;
}

#[tokio::test]
async fn restarts_after_stop() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();

    server.start(transport.clone()).await.unwrap();
    server.stop().await;
    assert_eq!(server.state(), State::Stopped);

    server.start(transport.clone()).await.unwrap();
    let rsp = transport.call(request("echo", "3")).await.unwrap();
    assert_eq!(rsp.payload().as_ref(), b"3");
    server.stop().await;
}

#[tokio::test]
async fn start_times_out_on_unready_transport() {
    let transport = Arc::new(MemoryTransport::unready());
    let server = server();

    let err = server.start(transport.clone()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout(d) if d == Duration::from_millis(100)));
    assert_eq!(server.state(), State::Stopped);
    assert!(!transport.is_listening(SERVICE));
}

#[tokio::test]
async fn stop_while_starting_aborts_start() {
    let transport = Arc::new(MemoryTransport::unready());
    let server = Server::builder(SERVICE)
        .connect_timeout(Duration::from_secs(30))
        .build();

    let starting = tokio::spawn({
        let server = server.clone();
        let transport = transport.clone();
        async move { server.start(transport).await }
    });
    until(|| server.state() == State::Starting).await;

    server.stop().await;
    let err = starting.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Stopped));
    assert_eq!(server.state(), State::Stopped);
}

#[tokio::test]
async fn reconnects_after_channel_loss() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    assert!(transport.disconnect(SERVICE));
    until(|| transport.is_listening(SERVICE)).await;

    assert_eq!(server.state(), State::Running);
    let rsp = transport.call(request("echo", "4")).await.unwrap();
    assert_eq!(rsp.payload().as_ref(), b"4");

    server.stop().await;
}

#[tokio::test]
async fn failed_reconnect_ends_the_run() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();

    let running = tokio::spawn({
        let server = server.clone();
        let transport = transport.clone();
        async move { server.run(transport).await }
    });
    until(|| transport.is_listening(SERVICE)).await;

    transport.set_ready(false);
    transport.disconnect(SERVICE);

    let err = running.await.unwrap().unwrap_err();
    match err {
        Error::Reconnect(cause) => assert!(matches!(*cause, Error::ConnectTimeout(_))),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(server.state(), State::Stopped);
}

#[tokio::test]
async fn run_returns_ok_after_stop() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();

    let running = tokio::spawn({
        let server = server.clone();
        let transport = transport.clone();
        async move { server.run(transport).await }
    });
    until(|| server.state() == State::Running).await;

    server.stop().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn replies_leave_in_completion_order() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let mut slow = transport.send(request("sleep", "300")).await.unwrap();
    let fast = transport.send(request("sleep", "10")).await.unwrap();

    let fast = fast.await.unwrap();
    assert_eq!(fast.payload().as_ref(), b"10");
    assert!(slow.try_recv().is_err());

    let slow = slow.await.unwrap();
    assert_eq!(slow.payload().as_ref(), b"300");

    server.stop().await;
}

#[tokio::test]
async fn stop_does_not_cancel_dispatched_requests() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.start(transport.clone()).await.unwrap();

    let pending = transport.send(request("sleep", "100")).await.unwrap();
    until(|| server.in_flight() == 1).await;

    server.stop().await;
    let rsp = pending.await.unwrap();
    assert!(!rsp.is_error());

    server.drain().await;
    assert_eq!(server.in_flight(), 0);
}

#[tokio::test]
async fn empty_handler_result_is_an_empty_success() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.add_endpoints([Endpoint::new("fire", |_req: Request| async {})]);
    server.start(transport.clone()).await.unwrap();

    let rsp = transport.call(request("fire", "")).await.unwrap();
    assert!(!rsp.is_error());
    assert!(rsp.payload().is_empty());
    assert_eq!(rsp.endpoint(), "fire");

    server.stop().await;
}

#[tokio::test]
async fn handler_errors_become_faults() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.add_endpoints([
        Endpoint::new("missing", |_req: Request| async {
            Err::<Response, _>(Fault::not_found("no_user", "No such user").with_param("id", "7"))
        }),
        Endpoint::new("broken", |_req: Request| async {
            Err::<Response, _>(std::io::Error::other("disk on fire"))
        }),
    ]);
    server.start(transport.clone()).await.unwrap();

    let rsp = transport.call(request("missing", "")).await.unwrap();
    let fault = Fault::decode(rsp.payload()).unwrap();
    assert_eq!(fault.status, Status::NotFound);
    assert_eq!(fault.params["id"], "7");

    let rsp = transport.call(request("broken", "")).await.unwrap();
    let fault = Fault::decode(rsp.payload()).unwrap();
    assert_eq!(fault.status, Status::InternalService);
    assert_eq!(fault.message, "disk on fire");
    assert!(fault.code.is_empty());

    server.stop().await;
}

/// Answers every request with `forbidden`.
struct Deny;

impl Middleware for Deny {
    fn process_request(&self, req: Request) -> (Request, Option<Response>) {
        let rsp = error_response(&req, Fault::forbidden("denied", "Go away"));
        (req, rsp)
    }

    fn process_response(&self, rsp: Option<Response>, _req: &Request) -> Option<Response> {
        rsp
    }
}

/// Tags every outgoing response.
struct Stamp;

impl Middleware for Stamp {
    fn process_request(&self, req: Request) -> (Request, Option<Response>) {
        (req, None)
    }

    fn process_response(&self, rsp: Option<Response>, _req: &Request) -> Option<Response> {
        rsp.map(|mut rsp| {
            rsp.set_header("X-Stamp", "yes");
            rsp
        })
    }
}

#[tokio::test]
async fn short_circuit_skips_handler_but_not_response_phase() {
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = Arc::new(MemoryTransport::new());
    let server = Server::builder(SERVICE).middleware(Stamp).middleware(Deny).build();
    server.add_endpoints([Endpoint::new("count", {
        let calls = calls.clone();
        move |req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { req.reply(true) }
        }
    })]);
    server.start(transport.clone()).await.unwrap();

    let rsp = transport.call(request("count", "")).await.unwrap();
    assert!(rsp.is_error());
    assert_eq!(rsp.header("x-stamp"), Some("yes"));
    assert_eq!(Fault::decode(rsp.payload()).unwrap().status, Status::Forbidden);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    server.stop().await;
}

/// Suppresses the reply to any request carrying `X-Silent`.
struct Silence;

impl Middleware for Silence {
    fn process_request(&self, req: Request) -> (Request, Option<Response>) {
        (req, None)
    }

    fn process_response(&self, rsp: Option<Response>, req: &Request) -> Option<Response> {
        if req.header("x-silent").is_some() { None } else { rsp }
    }
}

#[tokio::test]
async fn suppressed_reply_is_never_sent() {
    let transport = Arc::new(MemoryTransport::new());
    let server = server();
    server.add_middleware(Silence);
    server.start(transport.clone()).await.unwrap();

    let silent = transport
        .send(request("echo", "1").with_header("X-Silent", "yes"))
        .await
        .unwrap();
    let waited = tokio::time::timeout(Duration::from_millis(150), silent).await;
    assert!(waited.is_err());
    until(|| server.in_flight() == 0).await;

    // The server keeps serving.
    let rsp = transport.call(request("echo", "2")).await.unwrap();
    assert_eq!(rsp.payload().as_ref(), b"2");

    server.stop().await;
}

#[tokio::test]
async fn handle_runs_without_transport() {
    let server = server();
    server.add_middleware(Stamp);

    let rsp = server.handle(request("echo", "true")).await.unwrap();
    assert_eq!(rsp.payload().as_ref(), b"true");
    assert_eq!(rsp.header("x-stamp"), Some("yes"));
}
