//! Ping round-trip over an in-process transport pair.
//!
//! Starts a guest-access server with the ping auto-responder, connects a
//! supervised client, and processes one `get /ping` command.
//!
//! ```text
//! cargo run --example ping
//! ```

use std::sync::Arc;

use lime::client::ClientBuilder;
use lime::protocol::{Command, CommandMethod, LimeUri};
use lime::server::ServerBuilder;
use lime::transport::PairListener;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lime=debug")),
        )
        .init();

    let (listener, connector) = PairListener::new(8);

    let server = Arc::new(
        ServerBuilder::new("postmaster@localhost/server1".parse()?)
            .listener(Arc::new(listener))
            .auto_ping()
            .on_established(Arc::new(|session_id, _channel| {
                println!("session established: {session_id}");
            }))
            .build(),
    );
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.listen_and_serve().await })
    };

    let client = ClientBuilder::new("demo@localhost".parse()?, Arc::new(connector))
        .instance("example")
        .build();

    let request = Command::new_request(CommandMethod::Get, LimeUri::ping())
        .with_to("postmaster@localhost".parse()?);
    let response = client.process_command(request).await?;
    println!(
        "ping answered: status={:?} resource={:?}",
        response.status, response.resource
    );

    client.close().await?;
    server.close().await?;
    serving.await??;
    Ok(())
}
