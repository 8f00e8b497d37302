// ⚠️ Registry Errors
// Three recoverable failure kinds, each with a stable numeric code

use crate::access::Principal;
use crate::entities::EntityKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure returned by every registry operation.
///
/// The numeric codes (403/404/400) are a wire contract: the CLI and HTTP
/// API expose them unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unauthorized: {0} does not hold the registrar role")]
    Unauthorized(Principal),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidArgument,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidArgument => 400,
        }
    }
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, id: u64) -> Self {
        RegistryError::NotFound { kind, id }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        RegistryError::InvalidArgument(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Unauthorized(_) => ErrorKind::Unauthorized,
            RegistryError::NotFound { .. } => ErrorKind::NotFound,
            RegistryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// HTTP-like status code for this failure
    pub fn code(&self) -> u16 {
        self.kind().code()
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let unauthorized = RegistryError::Unauthorized(Principal::new("ST2CY5V39"));
        let not_found = RegistryError::not_found(EntityKind::Owner, 9);
        let invalid = RegistryError::invalid("status `lost` is not recognised");

        assert_eq!(unauthorized.code(), 403);
        assert_eq!(not_found.code(), 404);
        assert_eq!(invalid.code(), 400);
    }

    #[test]
    fn test_error_messages() {
        let err = RegistryError::not_found(EntityKind::ContainerType, 3);
        assert_eq!(err.to_string(), "container type 3 not found");

        let err = RegistryError::Unauthorized(Principal::new("ST2CY5V39"));
        assert!(err.to_string().contains("ST2CY5V39"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidArgument).unwrap();
        assert_eq!(json, "\"invalid_argument\"");
    }
}
