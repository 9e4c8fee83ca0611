//! Linux Provider
//!
//! A resource-provider plugin that manages files on the host it runs on.
//! An infrastructure engine spawns it as a subprocess, reads the handshake
//! line from stdout and drives it over gRPC.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **The `File` resource** (`linux:index:File`): creates or truncates a file
//! - **Inference layer**: typed resources whose schema and lifecycle wiring
//!   are derived from their Rust types
//! - **ProviderService trait**: the JSON-level operations served over gRPC
//! - **Server helpers**: Functions to start the gRPC server with the handshake protocol
//! - **Error types**, **schema validation** and **logging** via `tracing`
//!
//! # Quick Start
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     linux_provider::init_logging();
//!     linux_provider::serve(linux_provider::provider()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it outputs a handshake string to stdout:
//!
//! ```text
//! PROVIDER_PLUGIN|1|127.0.0.1:50051
//! ```
//!
//! Format: `PROVIDER_PLUGIN|<protocol_version>|<address>`
//!
//! # Provider Protocol
//!
//! - **GetMetadata**: Returns the provider name, version and resource tokens
//! - **GetSchema**: Returns the schema of every registered resource
//! - **Configure**: Validates provider configuration (the provider takes none)
//! - **Stop**: Gracefully shuts down the provider
//! - **ValidateResourceConfig**: Checks resource inputs
//! - **Plan**: Previews a create, update or replacement
//! - **Create/Read/Update/Delete**: Resource lifecycle

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod file;
pub mod infer;
pub mod logging;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

// Re-export main types at crate root
pub use error::ProviderError;
pub use file::{File, FileArgs, FileState};
pub use infer::{Context, InferredProvider, Resource};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, CreateError, CreateResult, Created, PlanResult, ProviderMetadata,
    ServerCapabilities, HANDSHAKE_PREFIX, PROTOCOL_VERSION, PROVIDER_NAME, VERSION,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;

/// The `linux` provider with every resource it serves registered.
pub fn provider() -> InferredProvider {
    InferredProvider::builder(PROVIDER_NAME, VERSION)
        .resource(File)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_registers_file() {
        let provider = provider();
        let metadata = provider.metadata();
        assert_eq!(metadata.name, "linux");
        assert_eq!(metadata.version, VERSION);
        assert_eq!(metadata.resources, vec!["linux:index:File".to_string()]);
    }
}
