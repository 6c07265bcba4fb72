//! Minimal echo server. Accepts one client and echoes request bodies back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal (use the base printed by the server):
//!   cargo run --features cli -- send <BASE> --path /echo --data hello

use std::fs;

use pipemux::protocol::{handler_fn, Connection, PipeAcceptor, ReceiveRequest, Response};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join(format!("pipemux-echo-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let base = dir.join("echo");

    let server = Connection::builder()
        .source(PipeAcceptor::bind(&base)?)
        .handler(handler_fn(|request: ReceiveRequest| async move {
            let body = request.body_as_string().unwrap_or_default();
            eprintln!("{} {} ({} bytes)", request.method, request.path, body.len());
            Some(Response::ok().with_body(body))
        }))
        .build();
    eprintln!("Listening on {}", base.display());

    // Serve one client until it disconnects.
    let mut events = server.subscribe();
    server.connect().await?;
    eprintln!("Client connected");
    let event = events.recv().await?;
    eprintln!("Client disconnected: {:?}", event.reason);

    drop(server);
    let _ = fs::remove_dir_all(&dir);
    Ok(())
}
