// ABOUTME: Unified error handling with standard error codes for the ingestion pipeline
// ABOUTME: Error codes carry HTTP status mapping and transient/permanent classification
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! Every fallible operation in the pipeline returns [`AppResult`]. The
//! [`ErrorCode`] attached to an [`AppError`] decides two things:
//!
//! - the HTTP status used when the error escapes an ingress handler
//! - whether the consumer worker treats the failure as transient (leave the
//!   message in the queue for redelivery) or permanent (acknowledge it and
//!   record the error on the raw webhook row)

/// Database error conversions (`sqlx::Error` to `AppError`)
#[cfg(feature = "database-errors")]
mod database;

/// `IntoResponse` support for axum handlers
#[cfg(feature = "http-response")]
mod http;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication (1000-1999)
    /// Request carried no usable credentials (missing signature header)
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired = 1000,
    /// Credentials were present but did not verify
    #[serde(rename = "AUTH_INVALID")]
    AuthInvalid = 1001,

    // Validation (3000-3999)
    /// Input failed validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,
    /// A required field is absent
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField = 3001,
    /// A field exists but is not in the expected format
    #[serde(rename = "INVALID_FORMAT")]
    InvalidFormat = 3002,

    // Resource Management (4000-4999)
    /// Resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4000,
    /// Resource exists but cannot be used right now
    #[serde(rename = "RESOURCE_UNAVAILABLE")]
    ResourceUnavailable = 4003,

    // Configuration (6000-6999)
    /// Configuration value is present but invalid
    #[serde(rename = "CONFIG_INVALID")]
    ConfigInvalid = 6002,

    // Queue (7000-7999)
    /// Queue backend could not be reached
    #[serde(rename = "QUEUE_UNAVAILABLE")]
    QueueUnavailable = 7000,
    /// Queue message body could not be decoded
    #[serde(rename = "QUEUE_MESSAGE_MALFORMED")]
    QueueMessageMalformed = 7001,

    // Internal Errors (9000-9999)
    /// Unexpected internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Database reported an error
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError = 9001,
    /// Data could not be serialized or deserialized
    #[serde(rename = "SERIALIZATION_ERROR")]
    SerializationError = 9003,
    /// Storage is temporarily unreachable (timeouts, resets, busy database)
    #[serde(rename = "STORAGE_UNAVAILABLE")]
    StorageUnavailable = 9004,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidInput | Self::MissingRequiredField | Self::InvalidFormat => 400,
            Self::AuthRequired | Self::AuthInvalid => 401,
            Self::ResourceNotFound => 404,
            Self::ResourceUnavailable | Self::QueueUnavailable | Self::StorageUnavailable => 503,
            Self::QueueMessageMalformed
            | Self::InternalError
            | Self::DatabaseError
            | Self::SerializationError
            | Self::ConfigInvalid => 500,
        }
    }

    /// Get a human-readable description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::AuthInvalid => "The provided authentication credentials are invalid",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::InvalidFormat => "The data format is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::ResourceUnavailable => "The resource is temporarily unavailable",
            Self::ConfigInvalid => "Configuration is invalid",
            Self::QueueUnavailable => "The message queue is temporarily unavailable",
            Self::QueueMessageMalformed => "The queue message could not be decoded",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
            Self::SerializationError => "Data serialization/deserialization failed",
            Self::StorageUnavailable => "Storage is temporarily unavailable",
        }
    }

    /// Whether a failure with this code may succeed if the same work is retried.
    ///
    /// Database failures count as transient; the dead-letter bound caps them.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ResourceUnavailable
                | Self::QueueUnavailable
                | Self::DatabaseError
                | Self::StorageUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialized names are the stable, log-friendly identifiers
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&name)
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Correlation id of the HTTP request that failed, echoed in the response body
    pub request_id: Option<String>,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
            source: None,
        }
    }

    /// Attach the request correlation id
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Whether retrying the failed operation may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code.is_transient()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Body of an [`ErrorResponse`]
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Request ID, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message.clone(),
                request_id: error.request_id.clone(),
            },
        }
    }
}

/// Convenience functions for creating common errors
impl AppError {
    /// Authentication required
    #[must_use]
    pub fn auth_required() -> Self {
        Self::new(ErrorCode::AuthRequired, "Authentication required")
    }

    /// Invalid authentication
    #[must_use]
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthInvalid, message)
    }

    /// Resource not found
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Invalid format
    #[must_use]
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidFormat, message)
    }

    /// Internal server error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Storage temporarily unavailable
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageUnavailable, message)
    }

    /// Queue temporarily unavailable
    #[must_use]
    pub fn queue_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueueUnavailable, message)
    }

    /// Queue message body could not be decoded
    #[must_use]
    pub fn malformed_message(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::QueueMessageMalformed, message)
    }

    /// Serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthInvalid.http_status(), 401);
        assert_eq!(ErrorCode::ResourceNotFound.http_status(), 404);
        assert_eq!(ErrorCode::StorageUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ErrorCode::StorageUnavailable.is_transient());
        assert!(ErrorCode::QueueUnavailable.is_transient());
        assert!(ErrorCode::DatabaseError.is_transient());
        assert!(!ErrorCode::InvalidInput.is_transient());
        assert!(!ErrorCode::ResourceNotFound.is_transient());
        assert!(!ErrorCode::SerializationError.is_transient());
    }

    #[test]
    fn test_not_found_message_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error = AppError::not_found("Raw webhook").with_source(io);

        assert_eq!(error.code, ErrorCode::ResourceNotFound);
        assert_eq!(error.message, "Raw webhook not found");
        assert!(std::error::Error::source(&error).is_some());
        assert!(error.request_id.is_none());
    }

    #[test]
    fn test_missing_signature_is_auth_required() {
        let error = AppError::auth_required();
        assert_eq!(error.code, ErrorCode::AuthRequired);
        assert_eq!(error.http_status(), 401);
        assert!(serde_json::from_str::<ErrorCode>("\"STORAGE_ERROR\"").is_err());
    }

    #[test]
    fn test_error_code_display_uses_wire_name() {
        assert_eq!(ErrorCode::StorageUnavailable.to_string(), "STORAGE_UNAVAILABLE");
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::auth_invalid("signature mismatch").with_request_id("req-1");
        let json = serde_json::to_string(&ErrorResponse::from(&error)).unwrap_or_default();
        assert!(json.contains("AUTH_INVALID"));
        assert!(json.contains("req-1"));
    }
}
