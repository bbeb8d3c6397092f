use serde::Deserialize;
use std::fmt::{self, Display};

use crate::{signing::SigningError, transport::TransportError, validation::ValidationError};

/// An error when interacting with nilauth.
///
/// Every operation either returns a validated value or one of these. Callers decide on retries based
/// on the variant, see [`NilauthError::is_retryable`].
#[derive(Debug, thiserror::Error)]
pub enum NilauthError {
    /// The service could not be reached.
    #[error(transparent)]
    Unreachable(#[from] NilauthUnreachable),

    /// The nilauth service returned an error.
    #[error(transparent)]
    ErrorResponse(#[from] NilauthErrorResponse),

    /// The service responded with something that doesn't match the expected shape.
    #[error("invalid response: {0}")]
    Validation(#[from] ValidationError),

    /// The service reports a different public key than the one pinned when the client was created.
    #[error("nilauth public key changed: pinned {pinned}, reported {reported}")]
    PublicKeyMismatch {
        /// The key pinned at creation time.
        pinned: String,

        /// The key the service reports now.
        reported: String,
    },

    /// Failed to sign the request.
    #[error("signing request: {0}")]
    Signing(#[from] SigningError),

    /// The base URL could not be turned into an endpoint URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl NilauthError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::ErrorResponse(e) => e.error_code.is_retryable(),
            Self::Validation(_) | Self::PublicKeyMismatch { .. } | Self::Signing(_) | Self::InvalidUrl(_) => false,
        }
    }

    /// The service's error code, if the service rejected the request.
    pub fn error_code(&self) -> Option<&NilauthErrorCode> {
        match self {
            Self::ErrorResponse(e) => Some(&e.error_code),
            _ => None,
        }
    }
}

/// The service could not be reached.
#[derive(Debug, thiserror::Error)]
#[error("nilauth unreachable at {url}: {cause}")]
pub struct NilauthUnreachable {
    /// The URL that was being requested.
    pub url: String,

    /// Why the service is considered unreachable.
    #[source]
    pub cause: UnreachableCause,
}

/// The underlying reason for a [`NilauthUnreachable`].
#[derive(Debug, thiserror::Error)]
pub enum UnreachableCause {
    /// The HTTP exchange itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered with a status that doesn't carry an error body.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,

        /// The response body, lossily decoded.
        body: String,
    },

    /// The health endpoint answered with something other than `OK`.
    #[error("unhealthy: {0}")]
    Unhealthy(String),
}

/// An error body returned by the nilauth service.
#[derive(Clone, Debug, Deserialize)]
pub struct NilauthErrorResponseBody {
    /// The error code.
    #[serde(alias = "errorCode")]
    pub error_code: NilauthErrorCode,

    /// The error message.
    pub message: String,
}

/// The nilauth service rejected a request.
#[derive(Clone, Debug, thiserror::Error)]
#[error("nilauth returned {error_code} (status {status}): {message}")]
pub struct NilauthErrorResponse {
    /// The HTTP status code.
    pub status: u16,

    /// The error code.
    pub error_code: NilauthErrorCode,

    /// The error message.
    pub message: String,
}

impl NilauthErrorResponse {
    pub(crate) fn new(status: u16, body: NilauthErrorResponseBody) -> Self {
        let NilauthErrorResponseBody { error_code, message } = body;
        Self { status, error_code, message }
    }
}

/// An error code returned by the nilauth service.
///
/// Codes this client doesn't know about deserialize into [`NilauthErrorCode::Unrecognized`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum NilauthErrorCode {
    AlreadySubscribed,
    CannotRenewYet,
    ExpiredPayload,
    HashMismatch,
    InsufficientPayment,
    Internal,
    InvalidPublicKey,
    InvalidSignature,
    InvalidTargetPublicKey,
    MalformedPayload,
    MalformedTransaction,
    NotSubscribed,
    PaymentAlreadyProcessed,
    RateLimited,
    TransactionLookup,
    TransactionNotCommitted,
    UnknownPublicKey,

    /// A code this client doesn't know about.
    Unrecognized(String),
}

impl NilauthErrorCode {
    /// Whether the condition this code describes can clear up without the caller changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionNotCommitted | Self::RateLimited)
    }

    /// The code as the service spells it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            Self::CannotRenewYet => "CANNOT_RENEW_YET",
            Self::ExpiredPayload => "EXPIRED_PAYLOAD",
            Self::HashMismatch => "HASH_MISMATCH",
            Self::InsufficientPayment => "INSUFFICIENT_PAYMENT",
            Self::Internal => "INTERNAL",
            Self::InvalidPublicKey => "INVALID_PUBLIC_KEY",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidTargetPublicKey => "INVALID_TARGET_PUBLIC_KEY",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::MalformedTransaction => "MALFORMED_TRANSACTION",
            Self::NotSubscribed => "NOT_SUBSCRIBED",
            Self::PaymentAlreadyProcessed => "PAYMENT_ALREADY_PROCESSED",
            Self::RateLimited => "RATE_LIMITED",
            Self::TransactionLookup => "TRANSACTION_LOOKUP",
            Self::TransactionNotCommitted => "TRANSACTION_NOT_COMMITTED",
            Self::UnknownPublicKey => "UNKNOWN_PUBLIC_KEY",
            Self::Unrecognized(code) => code,
        }
    }
}

impl From<String> for NilauthErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "ALREADY_SUBSCRIBED" => Self::AlreadySubscribed,
            "CANNOT_RENEW_YET" => Self::CannotRenewYet,
            "EXPIRED_PAYLOAD" => Self::ExpiredPayload,
            "HASH_MISMATCH" => Self::HashMismatch,
            "INSUFFICIENT_PAYMENT" => Self::InsufficientPayment,
            "INTERNAL" => Self::Internal,
            "INVALID_PUBLIC_KEY" => Self::InvalidPublicKey,
            "INVALID_SIGNATURE" => Self::InvalidSignature,
            "INVALID_TARGET_PUBLIC_KEY" => Self::InvalidTargetPublicKey,
            "MALFORMED_PAYLOAD" => Self::MalformedPayload,
            "MALFORMED_TRANSACTION" => Self::MalformedTransaction,
            "NOT_SUBSCRIBED" => Self::NotSubscribed,
            "PAYMENT_ALREADY_PROCESSED" => Self::PaymentAlreadyProcessed,
            "RATE_LIMITED" => Self::RateLimited,
            "TRANSACTION_LOOKUP" => Self::TransactionLookup,
            "TRANSACTION_NOT_COMMITTED" => Self::TransactionNotCommitted,
            "UNKNOWN_PUBLIC_KEY" => Self::UnknownPublicKey,
            _ => Self::Unrecognized(code),
        }
    }
}

impl Display for NilauthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error when loading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to something that can't be parsed.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// The variable name.
        name: &'static str,

        /// The value it was set to.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_roundtrip() {
        for code in ["CANNOT_RENEW_YET", "TRANSACTION_NOT_COMMITTED", "INSUFFICIENT_PAYMENT"] {
            let parsed = NilauthErrorCode::from(code.to_string());
            assert!(!matches!(parsed, NilauthErrorCode::Unrecognized(_)));
            assert_eq!(parsed.as_str(), code);
        }
    }

    #[test]
    fn unknown_code_is_kept() {
        let body: NilauthErrorResponseBody =
            serde_json::from_str(r#"{"error_code": "SOMETHING_NEW", "message": "hi"}"#).unwrap();
        assert_eq!(body.error_code, NilauthErrorCode::Unrecognized("SOMETHING_NEW".into()));
        assert_eq!(body.error_code.to_string(), "SOMETHING_NEW");
    }

    #[test]
    fn camel_case_body() {
        let body: NilauthErrorResponseBody =
            serde_json::from_str(r#"{"errorCode": "NOT_SUBSCRIBED", "message": "no"}"#).unwrap();
        assert_eq!(body.error_code, NilauthErrorCode::NotSubscribed);
        assert_eq!(body.message, "no");
    }

    #[test]
    fn retryability() {
        let response = |code: &str| {
            NilauthError::ErrorResponse(NilauthErrorResponse {
                status: 400,
                error_code: code.to_string().into(),
                message: String::new(),
            })
        };
        assert!(response("TRANSACTION_NOT_COMMITTED").is_retryable());
        assert!(!response("INSUFFICIENT_PAYMENT").is_retryable());
        assert_eq!(response("HASH_MISMATCH").error_code(), Some(&NilauthErrorCode::HashMismatch));

        let mismatch = NilauthError::PublicKeyMismatch { pinned: "aa".into(), reported: "bb".into() };
        assert!(!mismatch.is_retryable());
        assert!(mismatch.error_code().is_none());

        let unreachable = NilauthError::Unreachable(NilauthUnreachable {
            url: "http://localhost/health".into(),
            cause: UnreachableCause::Status { status: 503, body: String::new() },
        });
        assert!(unreachable.is_retryable());
    }
}
