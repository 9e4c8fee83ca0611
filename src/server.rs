//! Server helpers for running the provider as a plugin.
//!
//! This module provides the `ProviderService` trait, its gRPC adapter, and
//! the `serve` functions that start the server and print the handshake.
//!
//! # Signal Handling
//!
//! The server handles SIGTERM and SIGINT. When a signal arrives it:
//! 1. Stops accepting new connections
//! 2. Waits for in-flight requests, up to [`ServeOptions::shutdown_timeout`]
//! 3. Calls the provider's `stop()` method
//! 4. Returns

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tracing::{debug, error, info, instrument, warn};

use crate::error::ProviderError;
use crate::generated as pb;
use crate::schema::{has_errors, Diagnostic, DiagnosticSeverity, ProviderSchema, Schema};
use crate::types::{
    CreateResult, PlanResult, ProviderMetadata, HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};

/// The operations a provider plugin serves, in JSON terms.
///
/// [`InferredProvider`](crate::infer::InferredProvider) implements this on
/// top of typed resources; implement it directly only to bypass inference.
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// The provider name.
    fn name(&self) -> &str;

    /// The provider version.
    fn version(&self) -> &str {
        crate::types::VERSION
    }

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.into_keys().collect();
        resources.sort();
        ProviderMetadata {
            name: self.name().to_string(),
            version: self.version().to_string(),
            resources,
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Configure the provider. Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Plan changes for a resource. This is the preview of create and update.
    async fn plan(
        &self,
        resource_type: &str,
        name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, name: &str, planned_state: Value) -> CreateResult;

    /// Read the current state of a resource.
    async fn read(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(
        &self,
        resource_type: &str,
        id: &str,
        current_state: Value,
    ) -> Result<(), ProviderError>;
}

/// Wrapper that implements the generated gRPC trait.
struct ProviderGrpcService<P: ProviderService> {
    provider: Arc<P>,
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<pb::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|d| pb::Diagnostic {
            severity: match d.severity {
                DiagnosticSeverity::Error => pb::diagnostic::Severity::Error as i32,
                DiagnosticSeverity::Warning => pb::diagnostic::Severity::Warning as i32,
            },
            summary: d.summary,
            detail: d.detail.unwrap_or_default(),
            attribute: d.attribute.unwrap_or_default(),
        })
        .collect()
}

fn error_to_diagnostics(err: &ProviderError) -> Vec<pb::Diagnostic> {
    vec![pb::Diagnostic {
        severity: pb::diagnostic::Severity::Error as i32,
        summary: err.to_string(),
        detail: String::new(),
        attribute: String::new(),
    }]
}

fn schema_to_proto(schema: &Schema) -> pb::Schema {
    pb::Schema {
        version: schema.version as i64,
        description: schema.description.clone().unwrap_or_default(),
        attributes: schema
            .attributes
            .iter()
            .map(|(name, attr)| pb::Attribute {
                name: name.clone(),
                r#type: serde_json::to_vec(&attr.attr_type).unwrap_or_default(),
                required: attr.flags.required,
                optional: attr.flags.optional,
                computed: attr.flags.computed,
                sensitive: attr.flags.sensitive,
                description: attr.description.clone().unwrap_or_default(),
                force_new: attr.force_new,
            })
            .collect(),
    }
}

/// Decode a JSON payload field. Empty bytes mean "no value".
fn decode_json(bytes: &[u8]) -> Result<Value, tonic::Status> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| ProviderError::Serialization(e).into())
}

fn encode_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

#[tonic::async_trait]
impl<P: ProviderService> pb::provider_server::Provider for ProviderGrpcService<P> {
    #[instrument(skip(self, _request), name = "grpc.get_metadata")]
    async fn get_metadata(
        &self,
        _request: tonic::Request<pb::GetMetadataRequest>,
    ) -> Result<tonic::Response<pb::GetMetadataResponse>, tonic::Status> {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(
            name = %metadata.name,
            version = %metadata.version,
            resources = metadata.resources.len(),
            "GetMetadata completed"
        );
        Ok(tonic::Response::new(pb::GetMetadataResponse {
            name: metadata.name,
            version: metadata.version,
            server_capabilities: Some(pb::ServerCapabilities {
                plan_destroy: metadata.capabilities.plan_destroy,
            }),
            resources: metadata.resources,
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, _request), name = "grpc.get_schema")]
    async fn get_schema(
        &self,
        _request: tonic::Request<pb::GetSchemaRequest>,
    ) -> Result<tonic::Response<pb::GetSchemaResponse>, tonic::Status> {
        debug!("GetSchema called");
        let schema = self.provider.schema();
        info!(resources = schema.resources.len(), "GetSchema completed");
        Ok(tonic::Response::new(pb::GetSchemaResponse {
            provider: Some(schema_to_proto(&schema.provider)),
            resources: schema
                .resources
                .iter()
                .map(|(k, v)| (k.clone(), schema_to_proto(v)))
                .collect(),
            diagnostics: vec![],
        }))
    }

    #[instrument(skip(self, request), name = "grpc.configure")]
    async fn configure(
        &self,
        request: tonic::Request<pb::ConfigureRequest>,
    ) -> Result<tonic::Response<pb::ConfigureResponse>, tonic::Status> {
        debug!("Configure called");
        let config = decode_json(&request.into_inner().config)?;

        let diagnostics = match self.provider.configure(config).await {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(
                        diagnostics = diagnostics.len(),
                        "Configure completed with errors"
                    );
                } else {
                    info!("Configure completed successfully");
                }
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(error = %e, "Configure failed");
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(pb::ConfigureResponse { diagnostics }))
    }

    #[instrument(skip(self, _request), name = "grpc.stop")]
    async fn stop(
        &self,
        _request: tonic::Request<pb::StopRequest>,
    ) -> Result<tonic::Response<pb::StopResponse>, tonic::Status> {
        info!("Stop called");
        let error = match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                String::new()
            },
            Err(e) => {
                error!(error = %e, "Stop failed");
                e.to_string()
            },
        };
        Ok(tonic::Response::new(pb::StopResponse { error }))
    }

    #[instrument(skip(self, request), name = "grpc.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        request: tonic::Request<pb::ValidateResourceConfigRequest>,
    ) -> Result<tonic::Response<pb::ValidateResourceConfigResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, "ValidateResourceConfig called");
        let config = decode_json(&req.config)?;

        let diagnostics = match self
            .provider
            .validate_resource_config(&req.resource_type, config)
            .await
        {
            Ok(diagnostics) => {
                if has_errors(&diagnostics) {
                    warn!(
                        resource_type = %req.resource_type,
                        diagnostics = diagnostics.len(),
                        "ValidateResourceConfig completed with errors"
                    );
                } else {
                    info!(
                        resource_type = %req.resource_type,
                        "ValidateResourceConfig completed successfully"
                    );
                }
                diagnostics_to_proto(diagnostics)
            },
            Err(e) => {
                error!(
                    resource_type = %req.resource_type,
                    error = %e,
                    "ValidateResourceConfig failed"
                );
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(pb::ValidateResourceConfigResponse {
            diagnostics,
        }))
    }

    #[instrument(skip(self, request), name = "grpc.plan")]
    async fn plan(
        &self,
        request: tonic::Request<pb::PlanRequest>,
    ) -> Result<tonic::Response<pb::PlanResponse>, tonic::Status> {
        let req = request.into_inner();
        let prior_state = match decode_json(&req.prior_state)? {
            Value::Null => None,
            state => Some(state),
        };
        debug!(
            resource_type = %req.resource_type,
            name = %req.name,
            is_create = prior_state.is_none(),
            "Plan called"
        );
        let proposed_state = decode_json(&req.proposed_state)?;
        let config = decode_json(&req.config)?;

        match self
            .provider
            .plan(
                &req.resource_type,
                &req.name,
                prior_state,
                proposed_state,
                config,
            )
            .await
        {
            Ok(result) => {
                info!(
                    resource_type = %req.resource_type,
                    name = %req.name,
                    changes = result.changes.len(),
                    requires_replace = result.requires_replace,
                    "Plan completed"
                );
                Ok(tonic::Response::new(pb::PlanResponse {
                    planned_state: encode_json(&result.planned_state),
                    changes: result.changes.into_iter().map(Into::into).collect(),
                    requires_replace: result.requires_replace,
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(
                    resource_type = %req.resource_type,
                    name = %req.name,
                    error = %e,
                    "Plan failed"
                );
                Ok(tonic::Response::new(pb::PlanResponse {
                    planned_state: vec![],
                    changes: vec![],
                    requires_replace: false,
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.create")]
    async fn create(
        &self,
        request: tonic::Request<pb::CreateRequest>,
    ) -> Result<tonic::Response<pb::CreateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, name = %req.name, "Create called");
        let planned_state = decode_json(&req.planned_state)?;

        match self
            .provider
            .create(&req.resource_type, &req.name, planned_state)
            .await
        {
            Ok(created) => {
                info!(
                    resource_type = %req.resource_type,
                    id = %created.id,
                    "Create completed successfully"
                );
                Ok(tonic::Response::new(pb::CreateResponse {
                    id: created.id,
                    state: encode_json(&created.state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(
                    resource_type = %req.resource_type,
                    name = %req.name,
                    partial = e.partial.is_some(),
                    error = %e,
                    "Create failed"
                );
                let diagnostics = error_to_diagnostics(&e.error);
                let (id, state) = match e.partial {
                    Some(partial) => (partial.id, encode_json(&partial.state)),
                    None => (String::new(), vec![]),
                };
                Ok(tonic::Response::new(pb::CreateResponse {
                    id,
                    state,
                    diagnostics,
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.read")]
    async fn read(
        &self,
        request: tonic::Request<pb::ReadRequest>,
    ) -> Result<tonic::Response<pb::ReadResponse>, tonic::Status> {
        let req = request.into_inner();
        debug!(resource_type = %req.resource_type, id = %req.id, "Read called");
        let current_state = decode_json(&req.current_state)?;

        match self
            .provider
            .read(&req.resource_type, &req.id, current_state)
            .await
        {
            Ok(state) => {
                debug!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    "Read completed successfully"
                );
                Ok(tonic::Response::new(pb::ReadResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(resource_type = %req.resource_type, id = %req.id, error = %e, "Read failed");
                Ok(tonic::Response::new(pb::ReadResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.update")]
    async fn update(
        &self,
        request: tonic::Request<pb::UpdateRequest>,
    ) -> Result<tonic::Response<pb::UpdateResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "Update called");
        let prior_state = decode_json(&req.prior_state)?;
        let planned_state = decode_json(&req.planned_state)?;

        match self
            .provider
            .update(&req.resource_type, &req.id, prior_state, planned_state)
            .await
        {
            Ok(state) => {
                info!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    "Update completed successfully"
                );
                Ok(tonic::Response::new(pb::UpdateResponse {
                    state: encode_json(&state),
                    diagnostics: vec![],
                }))
            },
            Err(e) => {
                error!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    error = %e,
                    "Update failed"
                );
                Ok(tonic::Response::new(pb::UpdateResponse {
                    state: vec![],
                    diagnostics: error_to_diagnostics(&e),
                }))
            },
        }
    }

    #[instrument(skip(self, request), name = "grpc.delete")]
    async fn delete(
        &self,
        request: tonic::Request<pb::DeleteRequest>,
    ) -> Result<tonic::Response<pb::DeleteResponse>, tonic::Status> {
        let req = request.into_inner();
        info!(resource_type = %req.resource_type, id = %req.id, "Delete called");
        let current_state = decode_json(&req.current_state)?;

        let diagnostics = match self
            .provider
            .delete(&req.resource_type, &req.id, current_state)
            .await
        {
            Ok(()) => {
                info!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    "Delete completed successfully"
                );
                vec![]
            },
            Err(e) => {
                error!(
                    resource_type = %req.resource_type,
                    id = %req.id,
                    error = %e,
                    "Delete failed"
                );
                error_to_diagnostics(&e)
            },
        };
        Ok(tonic::Response::new(pb::DeleteResponse { diagnostics }))
    }
}

/// Options for configuring the provider server.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long in-flight requests may run after a shutdown signal.
    /// Default: 30 seconds.
    pub shutdown_timeout: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServeOptions {
    /// Create new serve options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT; CTRL+C on Windows).
///
/// If the handlers cannot be installed this never resolves and the host is
/// left to kill the process.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return std::future::pending().await;
                },
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    }

    #[cfg(windows)]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received CTRL+C, initiating graceful shutdown"),
            Err(e) => {
                error!(error = %e, "Failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::future::pending::<()>().await;
    }
}

/// The line printed to stdout so the host can find the server.
///
/// Format: `PROVIDER_PLUGIN|<protocol_version>|<address>`
pub fn handshake_line(addr: SocketAddr) -> String {
    format!("{}|{}|{}", HANDSHAKE_PREFIX, PROTOCOL_VERSION, addr)
}

/// Serve a provider implementation as a gRPC server.
///
/// This function:
/// 1. Binds an available loopback port
/// 2. Starts the gRPC server
/// 3. Prints the handshake line to stdout
/// 4. Handles shutdown signals (SIGTERM/SIGINT) gracefully
///
/// For custom configuration, use [`serve_with_options`].
pub async fn serve<P: ProviderService>(provider: P) -> Result<(), Box<dyn std::error::Error>> {
    serve_with_options(provider, ServeOptions::default()).await
}

/// Serve a provider with custom options.
pub async fn serve_with_options<P: ProviderService>(
    provider: P,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    serve_on_listener(provider, listener, options).await
}

/// Serve a provider on a specific address.
pub async fn serve_on<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    serve_on_with_options(provider, addr, ServeOptions::default()).await
}

/// Serve a provider on a specific address with custom options.
pub async fn serve_on_with_options<P: ProviderService>(
    provider: P,
    addr: SocketAddr,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    serve_on_listener(provider, listener, options).await
}

async fn serve_on_listener<P: ProviderService>(
    provider: P,
    listener: TcpListener,
    options: ServeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = listener.local_addr()?;
    println!("{}", handshake_line(addr));
    info!(address = %addr, "Provider server starting");

    run_until(
        Arc::new(provider),
        listener,
        options,
        wait_for_shutdown_signal(),
    )
    .await
}

/// Run the gRPC server on `listener` until `shutdown` resolves, then drain
/// in-flight requests for at most `options.shutdown_timeout` and stop the
/// provider.
async fn run_until<P, F>(
    provider: Arc<P>,
    listener: TcpListener,
    options: ServeOptions,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    P: ProviderService,
    F: Future<Output = ()> + Send,
{
    let (signalled_tx, mut signalled_rx) = tokio::sync::oneshot::channel::<()>();

    let grpc_service = ProviderGrpcService {
        provider: Arc::clone(&provider),
    };
    let server = Server::builder()
        .add_service(pb::provider_server::ProviderServer::new(grpc_service))
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::TcpListenerStream::new(listener),
            async move {
                shutdown.await;
                let _ = signalled_tx.send(());
            },
        );
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            if let Err(e) = result {
                error!(error = %e, "Server error");
                return Err(e.into());
            }
        }
        Ok(()) = &mut signalled_rx => {
            match tokio::time::timeout(options.shutdown_timeout, &mut server).await {
                Ok(Ok(())) => info!("Server shutdown complete"),
                Ok(Err(e)) => {
                    error!(error = %e, "Server error during shutdown");
                    return Err(e.into());
                },
                Err(_) => warn!(
                    timeout = ?options.shutdown_timeout,
                    "Shutdown timeout exceeded, forcing shutdown"
                ),
            }
        }
    }

    debug!("Calling provider stop()");
    if let Err(e) = provider.stop().await {
        warn!(error = %e, "Provider stop() returned error");
    }

    info!("Provider shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::File;
    use crate::infer::InferredProvider;
    use crate::infer::Resource;
    use crate::types::VERSION;
    use pb::provider_client::ProviderClient;
    use serde_json::json;

    fn linux_provider() -> InferredProvider {
        InferredProvider::builder("linux", VERSION).resource(File).build()
    }

    #[test]
    fn test_handshake_line() {
        let addr: SocketAddr = "127.0.0.1:50051".parse().unwrap();
        assert_eq!(handshake_line(addr), "PROVIDER_PLUGIN|1|127.0.0.1:50051");
    }

    #[test]
    fn test_serve_options() {
        assert_eq!(ServeOptions::new().shutdown_timeout, Duration::from_secs(30));
        let options = ServeOptions::new().with_shutdown_timeout(Duration::from_millis(5));
        assert_eq!(options.shutdown_timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_decode_json() {
        assert_eq!(decode_json(b"").unwrap(), Value::Null);
        assert_eq!(decode_json(br#"{"path":"/x"}"#).unwrap()["path"], "/x");
        let status = decode_json(b"{oops").unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_schema_to_proto() {
        let proto = schema_to_proto(&File::schema());
        let names: Vec<_> = proto.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["path", "result"]);
        assert!(proto.attributes[0].required);
        assert!(proto.attributes[0].force_new);
        assert!(proto.attributes[1].computed);
        assert_eq!(proto.attributes[0].r#type, b"\"string\"".to_vec());
    }

    #[test]
    fn test_error_to_diagnostics_keeps_message() {
        let err = ProviderError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "Permission denied (os error 13)",
        ));
        let diagnostics = error_to_diagnostics(&err);
        assert_eq!(diagnostics[0].summary, "Permission denied (os error 13)");
        assert_eq!(
            diagnostics[0].severity,
            pb::diagnostic::Severity::Error as i32
        );
    }

    #[tokio::test]
    async fn test_grpc_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x");
        let missing = dir.path().join("missing").join("x");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            run_until(
                Arc::new(linux_provider()),
                listener,
                ServeOptions::new().with_shutdown_timeout(Duration::from_secs(5)),
                async {
                    let _ = stop_rx.await;
                },
            )
            .await
            .map_err(|e| e.to_string())
        });

        let mut client = ProviderClient::connect(format!("http://{}", addr))
            .await
            .unwrap();

        let metadata = client
            .get_metadata(pb::GetMetadataRequest {})
            .await
            .unwrap()
            .into_inner();
        assert_eq!(metadata.name, "linux");
        assert_eq!(metadata.version, VERSION);
        assert_eq!(metadata.resources, vec![File::TOKEN.to_string()]);
        assert_eq!(
            metadata.server_capabilities,
            Some(pb::ServerCapabilities { plan_destroy: true })
        );

        let destroy = client
            .plan(pb::PlanRequest {
                resource_type: File::TOKEN.to_string(),
                name: "my-file".to_string(),
                prior_state: serde_json::to_vec(&json!({
                    "path": "/tmp/x",
                    "result": "not working",
                }))
                .unwrap(),
                proposed_state: vec![],
                config: vec![],
            })
            .await
            .unwrap()
            .into_inner();
        assert!(destroy.diagnostics.is_empty());
        assert_eq!(destroy.changes.len(), 2);
        assert_eq!(destroy.planned_state, b"null".to_vec());

        let schema = client
            .get_schema(pb::GetSchemaRequest {})
            .await
            .unwrap()
            .into_inner();
        assert!(schema.resources.contains_key(File::TOKEN));

        let inputs = serde_json::to_vec(&json!({"path": path.to_string_lossy()})).unwrap();
        let plan = client
            .plan(pb::PlanRequest {
                resource_type: File::TOKEN.to_string(),
                name: "my-file".to_string(),
                prior_state: vec![],
                proposed_state: inputs.clone(),
                config: vec![],
            })
            .await
            .unwrap()
            .into_inner();
        assert!(plan.diagnostics.is_empty());
        assert!(!path.exists());

        let created = client
            .create(pb::CreateRequest {
                resource_type: File::TOKEN.to_string(),
                name: "my-file".to_string(),
                planned_state: plan.planned_state,
            })
            .await
            .unwrap()
            .into_inner();
        assert!(created.diagnostics.is_empty());
        assert_eq!(created.id, "my-file");
        assert!(path.is_file());
        let state: Value = serde_json::from_slice(&created.state).unwrap();
        assert_eq!(state["result"], "not working");

        let failed = client
            .create(pb::CreateRequest {
                resource_type: File::TOKEN.to_string(),
                name: "other".to_string(),
                planned_state: serde_json::to_vec(&json!({"path": missing.to_string_lossy()}))
                    .unwrap(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(failed.diagnostics.len(), 1);
        assert_eq!(failed.id, "other");
        let state: Value = serde_json::from_slice(&failed.state).unwrap();
        assert_eq!(state["result"], "not working");

        let bad = client
            .read(pb::ReadRequest {
                resource_type: File::TOKEN.to_string(),
                id: "my-file".to_string(),
                current_state: b"{not json".to_vec(),
            })
            .await
            .unwrap_err();
        assert_eq!(bad.code(), tonic::Code::InvalidArgument);

        let unknown = client
            .delete(pb::DeleteRequest {
                resource_type: "linux:index:Directory".to_string(),
                id: "d".to_string(),
                current_state: vec![],
            })
            .await
            .unwrap()
            .into_inner();
        assert!(unknown.diagnostics[0].summary.contains("Unknown resource type"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
