//! Convenience types shared by the inference layer and the gRPC server.
//!
//! These types provide a more ergonomic API over the raw protobuf types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::ProviderError;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<serde_json::Value>,
    /// The value after the change (None if deleting).
    pub after: Option<serde_json::Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(
        path: impl Into<String>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(
        path: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            path: proto.path,
            before: decode_optional(&proto.before),
            after: decode_optional(&proto.after),
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: encode_optional(change.before.as_ref()),
            after: encode_optional(change.after.as_ref()),
        }
    }
}

fn decode_optional(bytes: &[u8]) -> Option<serde_json::Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

fn encode_optional(value: Option<&serde_json::Value>) -> Vec<u8> {
    value
        .map(|v| serde_json::to_vec(v).unwrap_or_default())
        .unwrap_or_default()
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: serde_json::Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: serde_json::Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: serde_json::Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }
}

/// A resource that was created, identified by the id the provider assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created<S = serde_json::Value> {
    /// The provider-assigned id.
    pub id: String,
    /// The state reported for the new resource.
    pub state: S,
}

impl<S> Created<S> {
    /// Create a new created-resource record.
    pub fn new(id: impl Into<String>, state: S) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }
}

impl<S: Serialize> Created<S> {
    /// Encode the state as JSON for the wire.
    pub fn into_json(self) -> Result<Created, ProviderError> {
        Ok(Created {
            id: self.id,
            state: serde_json::to_value(self.state)?,
        })
    }
}

/// A failed create.
///
/// A create may fail after it has already produced state (the resource is
/// partially initialized). That state travels with the error so the host can
/// still record it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CreateError<S: fmt::Debug = serde_json::Value> {
    /// State produced before the failure, if any.
    pub partial: Option<Created<S>>,
    /// The failure itself.
    #[source]
    pub error: ProviderError,
}

impl<S: fmt::Debug> CreateError<S> {
    /// A failure that still produced state.
    pub fn partial(id: impl Into<String>, state: S, error: ProviderError) -> Self {
        Self {
            partial: Some(Created::new(id, state)),
            error,
        }
    }
}

impl<S: fmt::Debug + Serialize> CreateError<S> {
    /// Encode the partial state as JSON for the wire.
    ///
    /// If the partial state cannot be encoded it is dropped; the original
    /// error is kept either way.
    pub fn into_json(self) -> CreateError {
        let partial = self.partial.and_then(|created| {
            let id = created.id.clone();
            match created.into_json() {
                Ok(created) => Some(created),
                Err(err) => {
                    warn!(id = %id, error = %err, "dropping partial state that failed to encode");
                    None
                },
            }
        });
        CreateError {
            partial,
            error: self.error,
        }
    }
}

impl<S: fmt::Debug> From<ProviderError> for CreateError<S> {
    fn from(error: ProviderError) -> Self {
        Self {
            partial: None,
            error,
        }
    }
}

/// Outcome of a create operation.
pub type CreateResult<S = serde_json::Value> = Result<Created<S>, CreateError<S>>;

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// The provider name (the package part of resource tokens).
    pub name: String,
    /// The provider version reported to the host.
    pub version: String,
    /// Registered resource type tokens.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

/// The protocol version for the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// The handshake prefix printed by the plugin on startup.
pub const HANDSHAKE_PREFIX: &str = "PROVIDER_PLUGIN";

/// Name under which this plugin registers with the host.
pub const PROVIDER_NAME: &str = "linux";

/// Version reported to the host.
///
/// Injected at build time through `LINUX_PROVIDER_VERSION`, falling back to
/// the crate version.
pub const VERSION: &str = match option_env!("LINUX_PROVIDER_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("path", json!("/tmp/x"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("/tmp/x")));

        let removed = AttributeChange::removed("path", json!("/tmp/x"));
        assert_eq!(removed.before, Some(json!("/tmp/x")));
        assert!(removed.after.is_none());
    }

    #[test]
    fn test_attribute_change_conversion() {
        let change = AttributeChange::modified("path", json!("/tmp/a"), json!("/tmp/b"));

        let proto: crate::generated::AttributeChange = change.clone().into();
        assert_eq!(proto.path, "path");

        let back: AttributeChange = proto.into();
        assert_eq!(back, change);
    }

    #[test]
    fn test_added_change_encodes_empty_before() {
        let proto: crate::generated::AttributeChange =
            AttributeChange::added("result", json!("")).into();
        assert!(proto.before.is_empty());
        assert_eq!(proto.after, b"\"\"".to_vec());
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"path": "/tmp/x"}));
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);

        let replace = PlanResult::with_changes(
            json!({"path": "/tmp/y", "result": ""}),
            vec![AttributeChange::modified("path", json!("/tmp/x"), json!("/tmp/y"))],
            true,
        );
        assert_eq!(replace.changes.len(), 1);
        assert!(replace.requires_replace);
    }

    #[test]
    fn test_created_into_json() {
        #[derive(Serialize)]
        struct State {
            path: &'static str,
        }

        let created = Created::new("my-file", State { path: "/tmp/x" })
            .into_json()
            .unwrap();
        assert_eq!(created.id, "my-file");
        assert_eq!(created.state, json!({"path": "/tmp/x"}));
    }

    #[test]
    fn test_create_error_keeps_partial_state() {
        let err: CreateError<String> = CreateError::partial(
            "my-file",
            "half done".to_string(),
            ProviderError::Validation("boom".to_string()),
        );
        assert_eq!(err.to_string(), "Validation error: boom");

        let err = err.into_json();
        let partial = err.partial.unwrap();
        assert_eq!(partial.id, "my-file");
        assert_eq!(partial.state, json!("half done"));
    }

    #[test]
    fn test_create_error_drops_unencodable_partial_state() {
        #[derive(Debug)]
        struct Unencodable;

        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("not encodable"))
            }
        }

        let err = CreateError::partial(
            "my-file",
            Unencodable,
            ProviderError::Validation("boom".to_string()),
        )
        .into_json();
        assert!(err.partial.is_none());
        assert!(matches!(err.error, ProviderError::Validation(ref msg) if msg == "boom"));
    }

    #[test]
    fn test_create_error_from_provider_error() {
        let err: CreateError = ProviderError::UnknownResource("x".to_string()).into();
        assert!(err.partial.is_none());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_protocol_constants() {
        assert_eq!(PROTOCOL_VERSION, 1);
        assert_eq!(HANDSHAKE_PREFIX, "PROVIDER_PLUGIN");
        assert_eq!(PROVIDER_NAME, "linux");
        assert!(!VERSION.is_empty());
    }
}
