//! Typed error handling for the docrest framework
//!
//! Every failure a request can run into is expressed as a [`DocrestError`] so
//! that the outermost boundary can turn it into a structured `{code, ...}`
//! payload with the right status.
//!
//! # Error Categories
//!
//! - [`ResourceError`]: unknown resources, disallowed verbs, missing items or paths
//! - [`ConfigError`]: configuration parsing and validation (fatal at startup)
//! - [`ValidationError`]: request body validation
//! - [`ProjectionError`]: malformed or conflicting projections
//! - [`AuthError`]: bearer token checks
//! - [`RequestError`]: malformed query envelope
//! - [`StorageError`]: document store failures
//!
//! # Example
//!
//! ```rust,ignore
//! use docrest::prelude::*;
//!
//! fn lookup(name: &str, registry: &ResourceRegistry) -> DocrestResult<()> {
//!     registry
//!         .get(name)
//!         .ok_or_else(|| ResourceError::not_found(name))?;
//!     Ok(())
//! }
//! ```

use crate::core::projection::ProjectionError;
use crate::core::schema::SchemaError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for the docrest framework
#[derive(Debug)]
pub enum DocrestError {
    /// Resource resolution errors (not found, conflict)
    Resource(ResourceError),

    /// Configuration errors
    Config(ConfigError),

    /// Validation errors
    Validation(ValidationError),

    /// Projection errors
    Projection(ProjectionError),

    /// Authorization errors
    Auth(AuthError),

    /// Query envelope errors
    Request(RequestError),

    /// Storage backend errors
    Storage(StorageError),

    /// Internal framework errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for DocrestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocrestError::Resource(e) => write!(f, "{}", e),
            DocrestError::Config(e) => write!(f, "{}", e),
            DocrestError::Validation(e) => write!(f, "{}", e),
            DocrestError::Projection(e) => write!(f, "{}", e),
            DocrestError::Auth(e) => write!(f, "{}", e),
            DocrestError::Request(e) => write!(f, "{}", e),
            DocrestError::Storage(e) => write!(f, "{}", e),
            DocrestError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for DocrestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocrestError::Resource(e) => Some(e),
            DocrestError::Config(e) => Some(e),
            DocrestError::Validation(e) => Some(e),
            DocrestError::Projection(e) => Some(e),
            DocrestError::Auth(e) => Some(e),
            DocrestError::Request(e) => Some(e),
            DocrestError::Storage(e) => Some(e),
            DocrestError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DocrestError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DocrestError::Resource(e) => e.status_code(),
            DocrestError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DocrestError::Validation(_) => StatusCode::BAD_REQUEST,
            DocrestError::Projection(_) => StatusCode::BAD_REQUEST,
            DocrestError::Auth(e) => e.status_code(),
            DocrestError::Request(_) => StatusCode::BAD_REQUEST,
            DocrestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DocrestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            DocrestError::Resource(e) => e.error_code(),
            DocrestError::Config(_) => "internal:error",
            DocrestError::Validation(e) => e.error_code(),
            DocrestError::Projection(ProjectionError::Conflict) => "projection:conflict",
            DocrestError::Projection(_) => "projection:invalid",
            DocrestError::Auth(e) => e.error_code(),
            DocrestError::Request(_) => "query:invalid",
            DocrestError::Storage(_) => "internal:error",
            DocrestError::Internal(_) => "internal:error",
        }
    }

    /// Whether this error is an unexpected failure whose cause must stay server-side
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Convert to an error response
    ///
    /// Internal failures are reported generically; their cause is only logged.
    pub fn to_response(&self) -> ErrorResponse {
        let message = if self.is_internal() {
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        ErrorResponse {
            code: self.error_code().to_string(),
            message,
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            DocrestError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for DocrestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_internal() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors related to resource resolution
///
/// An unknown resource, a verb the resource does not allow, a missing item and
/// an unresolvable sub-path all surface as the same `NotFound`.
#[derive(Debug)]
pub enum ResourceError {
    /// Nothing addressable at this location
    NotFound { resource: String },

    /// The resource already holds content (create on a simple resource)
    Conflict { resource: String },
}

impl ResourceError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ResourceError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>) -> Self {
        ResourceError::Conflict {
            resource: resource.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "resource:not-found",
            ResourceError::Conflict { .. } => "resource:conflict",
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound { resource } => write!(f, "'{}' not found", resource),
            ResourceError::Conflict { resource } => {
                write!(f, "'{}' already has content", resource)
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for DocrestError {
    fn from(err: ResourceError) -> Self {
        DocrestError::Resource(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration file
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// The configuration does not satisfy the settings grammar
    Invalid(Vec<FieldValidationError>),

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// A schema references a named definition that does not exist
    UnresolvedSchema { name: String },

    /// A user schema uses an unknown rule, type or a broken regex
    InvalidSchema { resource: String, message: String },

    /// A declared method names a handler that was never registered
    MissingHandler {
        resource: String,
        method: String,
        handler: String,
    },

    /// Configuration file not found
    FileNotFound { path: String },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::Invalid(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors on resource schema: {}", msgs.join(", "))
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::UnresolvedSchema { name } => {
                write!(f, "Schema reference '{}' cannot be resolved", name)
            }
            ConfigError::InvalidSchema { resource, message } => {
                write!(f, "Invalid schema for '{}': {}", resource, message)
            }
            ConfigError::MissingHandler {
                resource,
                method,
                handler,
            } => {
                write!(
                    f,
                    "Method '{}' of resource '{}' uses unregistered handler '{}'",
                    method, resource, handler
                )
            }
            ConfigError::FileNotFound { path } => {
                write!(f, "Configuration file not found: {}", path)
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for DocrestError {
    fn from(err: ConfigError) -> Self {
        DocrestError::Config(err)
    }
}

impl ConfigError {
    /// Attach a schema failure to the resource (or named schema) it came from
    pub fn schema(resource: impl Into<String>, err: SchemaError) -> Self {
        match err {
            SchemaError::Unresolved(name) => ConfigError::UnresolvedSchema { name },
            other => ConfigError::InvalidSchema {
                resource: resource.into(),
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to request body validation
#[derive(Debug)]
pub enum ValidationError {
    /// The body does not satisfy the document schema
    FieldErrors(Vec<FieldValidationError>),

    /// The body is not JSON, or not the JSON shape the operation needs
    InvalidJson { message: String },
}

/// A single field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl FieldValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::FieldErrors(_) => "schema:invalid",
            ValidationError::InvalidJson { .. } => "format:unexpected",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for DocrestError {
    fn from(err: ValidationError) -> Self {
        DocrestError::Validation(err)
    }
}

// =============================================================================
// Auth Errors
// =============================================================================

/// Errors produced by bearer token checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    MissingHeader,

    /// The scheme is not `Bearer`
    BadScheme,

    /// The header is not `<scheme> <token>`
    SyntaxError,

    /// The token is unknown or expired
    TokenNotFound,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            AuthError::BadScheme => StatusCode::BAD_REQUEST,
            AuthError::SyntaxError => StatusCode::BAD_REQUEST,
            AuthError::TokenNotFound => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "authorization:missing-header",
            AuthError::BadScheme => "authorization:bad-scheme",
            AuthError::SyntaxError => "authorization:syntax-error",
            AuthError::TokenNotFound => "authorization:not-found",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingHeader => write!(f, "Missing Authorization header"),
            AuthError::BadScheme => write!(f, "Authorization scheme must be Bearer"),
            AuthError::SyntaxError => write!(f, "Malformed Authorization header"),
            AuthError::TokenNotFound => write!(f, "Unknown or expired token"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for DocrestError {
    fn from(err: AuthError) -> Self {
        DocrestError::Auth(err)
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors related to the query envelope (offset, limit, order_by, projection)
#[derive(Debug)]
pub enum RequestError {
    InvalidQuery { parameter: String, message: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidQuery { parameter, message } => {
                write!(f, "Invalid query parameter '{}': {}", parameter, message)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl From<RequestError> for DocrestError {
    fn from(err: RequestError) -> Self {
        DocrestError::Request(err)
    }
}

impl From<ProjectionError> for DocrestError {
    fn from(err: ProjectionError) -> Self {
        DocrestError::Projection(err)
    }
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors related to storage backends
#[derive(Debug)]
pub enum StorageError {
    /// Connection error
    ConnectionError { backend: String, message: String },

    /// Query execution error
    QueryError { backend: String, message: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionError { backend, message } => {
                write!(f, "Failed to connect to {}: {}", backend, message)
            }
            StorageError::QueryError { backend, message } => {
                write!(f, "{} query error: {}", backend, message)
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for DocrestError {
    fn from(err: StorageError) -> Self {
        DocrestError::Storage(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for DocrestError {
    fn from(err: serde_json::Error) -> Self {
        DocrestError::Validation(ValidationError::InvalidJson {
            message: err.to_string(),
        })
    }
}

/// Store and handler failures arrive as `anyhow::Error`; the whole cause chain
/// is kept for the operator log.
impl From<anyhow::Error> for DocrestError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<DocrestError>() {
            Ok(known) => known,
            Err(err) => match err.downcast::<StorageError>() {
                Ok(storage) => DocrestError::Storage(storage),
                Err(err) => DocrestError::Internal(format!("{:#}", err)),
            },
        }
    }
}

/// A specialized Result type for docrest operations
pub type DocrestResult<T> = Result<T, DocrestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_conflict_status() {
        assert_eq!(
            ResourceError::not_found("items").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ResourceError::conflict("profile").status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_auth_codes_are_distinct() {
        let codes = [
            AuthError::MissingHeader.error_code(),
            AuthError::BadScheme.error_code(),
            AuthError::SyntaxError.error_code(),
            AuthError::TokenNotFound.error_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(AuthError::BadScheme.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_error_does_not_leak() {
        let err = DocrestError::Internal("connection string mongodb://secret".to_string());
        let response = err.to_response();
        assert_eq!(response.code, "internal:error");
        assert!(!response.message.contains("secret"));
    }

    #[test]
    fn test_storage_error_is_generic() {
        let err: DocrestError = StorageError::QueryError {
            backend: "MongoDB".to_string(),
            message: "cursor killed".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_response().message, "Internal error");
    }

    #[test]
    fn test_field_errors_carry_details() {
        let err: DocrestError = ValidationError::FieldErrors(vec![FieldValidationError::new(
            "name",
            "required field",
        )])
        .into();
        let response = err.to_response();
        assert_eq!(response.code, "schema:invalid");
        assert_eq!(
            response.details.unwrap()["fields"][0]["field"],
            serde_json::json!("name")
        );
    }

    #[test]
    fn test_anyhow_roundtrip_keeps_known_errors() {
        let err = anyhow::Error::new(DocrestError::from(ResourceError::not_found("x")));
        let back: DocrestError = err.into();
        assert_eq!(back.error_code(), "resource:not-found");
    }

    #[test]
    fn test_anyhow_recovers_storage_errors() {
        let err = anyhow::Error::new(StorageError::ConnectionError {
            backend: "MongoDB".to_string(),
            message: "refused".to_string(),
        });
        let back: DocrestError = err.into();
        assert!(matches!(back, DocrestError::Storage(StorageError::ConnectionError { .. })));
        assert_eq!(back.error_code(), "internal:error");
    }

    #[test]
    fn test_anyhow_keeps_cause_chain() {
        let err = anyhow::anyhow!("socket closed").context("replace_one failed");
        let back: DocrestError = err.into();
        let DocrestError::Internal(msg) = back else {
            panic!("expected internal error");
        };
        assert!(msg.contains("replace_one failed"));
        assert!(msg.contains("socket closed"));
    }
}
