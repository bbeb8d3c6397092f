//! Typed parsing of nilauth responses.
//!
//! Every response body goes through [`parse`] before any of its fields reach the caller. A type
//! opts in by implementing [`ResponseSchema`], which adds checks serde can't express on its own.

use serde::de::DeserializeOwned;

use crate::{
    error::NilauthErrorResponseBody,
    models::{
        CreateTokenResponse, LookupRevokedTokenResponse, NilauthAboutResponse, NilauthHealthResponse,
        RevokeTokenResponse, SubscriptionCostResponse, SubscriptionStatusResponse, ValidatePaymentResponse,
    },
};

const MAX_BODY_EXCERPT: usize = 512;

/// A response did not match the expected shape.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{shape}: {reason}")]
pub struct ValidationError {
    /// The name of the expected shape.
    pub shape: &'static str,

    /// What didn't match.
    pub reason: String,

    /// The offending body, lossily decoded and truncated.
    pub body: String,
}

impl ValidationError {
    fn new(shape: &'static str, reason: impl Into<String>, body: &[u8]) -> Self {
        let excerpt = &body[..body.len().min(MAX_BODY_EXCERPT)];
        Self { shape, reason: reason.into(), body: String::from_utf8_lossy(excerpt).into_owned() }
    }
}

/// A response shape that can be validated.
pub trait ResponseSchema: DeserializeOwned {
    /// The name used in validation errors.
    const NAME: &'static str;

    /// Checks on an already deserialized value.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }

    /// The value to use when the service answers with an empty body, if that is acceptable.
    fn from_empty() -> Option<Self> {
        None
    }
}

/// Parse a response body into `T`.
pub fn parse<T: ResponseSchema>(body: &[u8]) -> Result<T, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return T::from_empty().ok_or_else(|| ValidationError::new(T::NAME, "empty body", body));
    }
    let value: T = serde_json::from_slice(body).map_err(|e| ValidationError::new(T::NAME, e.to_string(), body))?;
    value.check().map_err(|reason| ValidationError::new(T::NAME, reason, body))?;
    Ok(value)
}

/// Parse the plain text body of the health endpoint.
pub fn parse_health(body: &[u8]) -> Option<NilauthHealthResponse> {
    let body = std::str::from_utf8(body).ok()?;
    (body.trim() == NilauthHealthResponse::OK).then_some(NilauthHealthResponse::Ok)
}

/// Parse a nilauth error body, if this is one.
pub fn parse_error_body(body: &[u8]) -> Option<NilauthErrorResponseBody> {
    serde_json::from_slice(body).ok()
}

impl ResponseSchema for NilauthAboutResponse {
    const NAME: &'static str = "NilauthAboutResponse";

    fn check(&self) -> Result<(), String> {
        let key = self.public_key_bytes().map_err(|e| format!("public_key: {e}"))?;
        if !matches!(key.len(), 32 | 33) {
            return Err(format!("public_key: expected 32 or 33 bytes, got {}", key.len()));
        }
        if self.build.commit.is_empty() {
            return Err("build.commit: empty".into());
        }
        Ok(())
    }
}

impl ResponseSchema for SubscriptionCostResponse {
    const NAME: &'static str = "SubscriptionCostResponse";
}

impl ResponseSchema for SubscriptionStatusResponse {
    const NAME: &'static str = "SubscriptionStatusResponse";

    fn check(&self) -> Result<(), String> {
        if self.subscribed && self.details.is_none() {
            return Err("details: missing for an active subscription".into());
        }
        Ok(())
    }
}

impl ResponseSchema for ValidatePaymentResponse {
    const NAME: &'static str = "ValidatePaymentResponse";

    fn from_empty() -> Option<Self> {
        Some(Self::default())
    }
}

impl ResponseSchema for CreateTokenResponse {
    const NAME: &'static str = "CreateTokenResponse";

    fn check(&self) -> Result<(), String> {
        if self.token.is_empty() {
            return Err("token: empty".into());
        }
        Ok(())
    }
}

impl ResponseSchema for RevokeTokenResponse {
    const NAME: &'static str = "RevokeTokenResponse";

    fn from_empty() -> Option<Self> {
        Some(Self::default())
    }
}

impl ResponseSchema for LookupRevokedTokenResponse {
    const NAME: &'static str = "LookupRevokedTokenResponse";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenHash;

    const PUBLIC_KEY: &str = "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29";

    fn about_json(public_key: &str) -> String {
        format!(
            r#"{{"started":"2024-01-15T08:00:00Z","public_key":"{public_key}","build":{{"commit":"abc123","timestamp":"2024-01-14T12:00:00Z"}}}}"#
        )
    }

    #[test]
    fn about() {
        let about: NilauthAboutResponse = parse(about_json(PUBLIC_KEY).as_bytes()).unwrap();
        assert_eq!(about.public_key, PUBLIC_KEY);
        assert_eq!(about.build.commit, "abc123");
        assert_eq!(about.started.to_rfc3339(), "2024-01-15T08:00:00+00:00");
    }

    #[test]
    fn about_with_bad_key() {
        let err = parse::<NilauthAboutResponse>(about_json("zz").as_bytes()).unwrap_err();
        assert_eq!(err.shape, "NilauthAboutResponse");
        assert!(err.reason.starts_with("public_key"));

        let err = parse::<NilauthAboutResponse>(about_json("abcd").as_bytes()).unwrap_err();
        assert!(err.reason.contains("32 or 33"));
    }

    #[test]
    fn about_missing_build() {
        let err = parse::<NilauthAboutResponse>(br#"{"started":"2024-01-15T08:00:00Z","public_key":"00"}"#).unwrap_err();
        assert!(err.reason.contains("build"), "{}", err.reason);
    }

    #[test]
    fn cost_is_exact() {
        let cost: SubscriptionCostResponse = parse(br#"{"cost_unils": 1000}"#).unwrap();
        assert_eq!(cost.cost_unils, 1000);
        assert!(parse::<SubscriptionCostResponse>(br#"{"cost_unils": -1}"#).is_err());
        assert!(parse::<SubscriptionCostResponse>(br#"{"cost_unils": 10.5}"#).is_err());
        assert!(parse::<SubscriptionCostResponse>(br#"{"cost": 10}"#).is_err());
    }

    #[test]
    fn status() {
        let status: SubscriptionStatusResponse = parse(br#"{"subscribed": false, "details": null}"#).unwrap();
        assert!(!status.subscribed);

        let status: SubscriptionStatusResponse =
            parse(br#"{"subscribed": true, "details": {"expires_at": 1700000000, "renewable_at": 1699000000}}"#)
                .unwrap();
        assert_eq!(status.details.unwrap().expires_at.timestamp(), 1700000000);

        assert!(parse::<SubscriptionStatusResponse>(br#"{"subscribed": true, "details": null}"#).is_err());
    }

    #[test]
    fn empty_bodies() {
        assert!(parse::<ValidatePaymentResponse>(b"").is_ok());
        assert!(parse::<ValidatePaymentResponse>(b"{}").is_ok());
        assert!(parse::<RevokeTokenResponse>(b" ").is_ok());
        assert!(parse::<RevokeTokenResponse>(br#"{"revoked": true}"#).is_ok());
    }

    #[test]
    fn acknowledgements_must_be_objects() {
        assert!(parse::<ValidatePaymentResponse>(b"[]").is_err());
        assert!(parse::<RevokeTokenResponse>(b"[1]").is_err());
        assert!(parse::<ValidatePaymentResponse>(b"42").is_err());
        assert!(parse::<RevokeTokenResponse>(b"null").is_err());
    }

    #[test]
    fn missing_body_is_rejected_where_required() {
        let err = parse::<CreateTokenResponse>(b"").unwrap_err();
        assert_eq!(err.reason, "empty body");
    }

    #[test]
    fn token() {
        assert!(parse::<CreateTokenResponse>(br#"{"token": ""}"#).is_err());
        let token: CreateTokenResponse = parse(br#"{"token": "abc.def"}"#).unwrap();
        assert_eq!(token.token, "abc.def");
    }

    #[test]
    fn revoked() {
        let hash = TokenHash::compute("token");
        let body = format!(r#"{{"revoked": [{{"token_hash": "{hash}", "revoked_at": 1700000000}}]}}"#);
        let response: LookupRevokedTokenResponse = parse(body.as_bytes()).unwrap();
        assert_eq!(response.revoked[0].token_hash, hash);

        let body = r#"{"revoked": [{"token_hash": "abcd", "revoked_at": 1700000000}]}"#;
        assert!(parse::<LookupRevokedTokenResponse>(body.as_bytes()).is_err());
    }

    #[test]
    fn health() {
        assert_eq!(parse_health(b"OK"), Some(NilauthHealthResponse::Ok));
        assert_eq!(parse_health(b"OK\n"), Some(NilauthHealthResponse::Ok));
        assert_eq!(parse_health(b"ok"), None);
        assert_eq!(parse_health(b"\"OK\""), None);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = vec![b'x'; 4096];
        let err = parse::<CreateTokenResponse>(&body).unwrap_err();
        assert_eq!(err.body.len(), MAX_BODY_EXCERPT);
    }
}
