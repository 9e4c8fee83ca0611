//! Plugin entry point. The host spawns this binary and reads the handshake
//! line from stdout.

use linux_provider::{init_logging, provider, serve, PROVIDER_NAME, VERSION};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!(name = PROVIDER_NAME, version = VERSION, "starting provider");
    serve(provider()).await
}
