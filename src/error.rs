//! Error types for the linux provider.

use thiserror::Error;

/// Errors that can occur while serving provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Resource inputs failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested resource type is not registered with the provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A filesystem operation failed. The underlying error is kept verbatim.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Operation not implemented for this resource.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Io(err) => tonic::Status::unknown(err.to_string()),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_display() {
        let err = ProviderError::UnknownResource("linux:index:Directory".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: linux:index:Directory"
        );

        let err = ProviderError::Validation("missing path".to_string());
        assert_eq!(format!("{}", err), "Validation error: missing path");
    }

    #[test]
    fn test_io_error_is_verbatim() {
        let source = io::Error::new(
            io::ErrorKind::PermissionDenied,
            "Permission denied (os error 13)",
        );
        let err = ProviderError::from(source);
        assert_eq!(err.to_string(), "Permission denied (os error 13)");
        assert!(
            matches!(err, ProviderError::Io(ref e) if e.kind() == io::ErrorKind::PermissionDenied)
        );
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status =
            ProviderError::UnknownResource("linux:index:Directory".to_string()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = ProviderError::Validation("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = ProviderError::Unimplemented("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        let status: tonic::Status =
            ProviderError::Io(io::Error::new(io::ErrorKind::Other, "disk full")).into();
        assert_eq!(status.code(), tonic::Code::Unknown);
        assert_eq!(status.message(), "disk full");
    }

    #[test]
    fn test_serialization_error_to_status() {
        let source = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let status: tonic::Status = ProviderError::from(source).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().starts_with("Serialization error"));
    }
}
