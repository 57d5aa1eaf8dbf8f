//! Shared helpers for the integration suites.

use std::sync::Arc;

use lime::channel::Channel;
use lime::protocol::{Identity, Node};
use lime::session::{ClientEstablishment, ServerEstablishment};
use lime::transport::PairTransport;

/// Install the test subscriber once; `RUST_LOG` controls output
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The identity the test client presents
pub fn client_identity() -> Identity {
    "golang@limeprotocol.org".parse().unwrap()
}

/// The node the test server announces
pub fn server_node() -> Node {
    "postmaster@limeprotocol.org/server1".parse().unwrap()
}

/// Run the full guest handshake over an in-process pair, returning both
/// established channels.
#[allow(dead_code)]
pub async fn established_pair() -> (Arc<Channel>, Arc<Channel>) {
    init_tracing();
    let (client_transport, server_transport) = PairTransport::pair(16);
    let client_channel = Arc::new(Channel::new(Arc::new(client_transport)));
    let server_channel = Arc::new(Channel::for_server(
        Arc::new(server_transport),
        uuid::Uuid::new_v4().to_string(),
    ));

    let client = ClientEstablishment::new(client_identity(), "default");
    let server = ServerEstablishment::new(server_node());

    let (client_result, server_result) = tokio::join!(
        client.establish(&client_channel),
        server.establish(&server_channel),
    );
    client_result.unwrap();
    server_result.unwrap();

    (client_channel, server_channel)
}
