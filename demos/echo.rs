//! Minimal courier example: an echo service on the in-memory transport.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example echo

use std::sync::Arc;
use std::time::Duration;

use courier::headers::{ACCEPT, CONTENT_TYPE};
use courier::{Endpoint, Fault, MemoryTransport, Request, Response, Server};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Serialize)]
struct Shout {
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    courier::CodecRegistry::global().register_msgpack();

    let server = Server::builder("svc.echo")
        .description("echoes whatever it is sent")
        .connect_timeout(Duration::from_secs(5))
        .middleware(courier::middleware::Trace)
        .build();

    server.add_endpoints([
        Endpoint::new("echo",  echo).with_request::<Value>(),
        Endpoint::new("shout", shout).with_request::<Shout>().with_response::<Shout>(),
    ]);

    let transport = Arc::new(MemoryTransport::new());
    server.start(transport.clone()).await?;

    let calls = [
        call("echo",  "application/json", r#"{"hello":"world"}"#),
        call("shout", "application/json", r#"{"text":"quiet please"}"#),
        call("shout", "application/json", r#"{"wrong":"shape"}"#),
        call("nope",  "application/json", "{}"),
    ];
    for req in calls {
        let endpoint = req.endpoint().to_owned();
        let rsp = transport.call(req).await?;
        if rsp.is_error() {
            println!("{endpoint:>6} -> error   {}", Fault::decode(rsp.payload())?);
        } else {
            println!("{endpoint:>6} -> ok      {}", String::from_utf8_lossy(rsp.payload()));
        }
    }

    // Same endpoint, MessagePack reply.
    let req = call("echo", "application/json", "[1,2,3]").with_header(ACCEPT, "application/msgpack");
    let rsp = transport.call(req).await?;
    let decoded: Value = rmp_serde::from_slice(rsp.payload())?;
    println!("  echo -> msgpack {decoded} ({} bytes)", rsp.payload().len());

    server.stop().await;
    Ok(())
}

fn call(endpoint: &str, content_type: &str, payload: &'static str) -> Request {
    Request::new()
        .with_service("svc.echo")
        .with_origin("demo")
        .with_endpoint(endpoint)
        .with_header(CONTENT_TYPE, content_type)
        .with_payload(payload)
}

async fn echo(req: Request) -> Response {
    let body = req.body_as::<Value>().cloned().unwrap_or(Value::Null);
    req.reply(body)
}

async fn shout(req: Request) -> Result<Response, Fault> {
    let shout = req
        .body_as::<Shout>()
        .ok_or_else(|| Fault::bad_request("missing_body", "Nothing to shout"))?;
    Ok(req.reply(Shout { text: shout.text.to_uppercase() }))
}
