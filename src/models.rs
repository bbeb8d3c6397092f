use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::{
    fmt::{self, Display},
    str::FromStr,
};

use crate::signing::{canonical_bytes, SigningError};

/// A nillion blind module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlindModule {
    /// The nildb blind module.
    NilDb,

    /// The nilai blind module.
    NilAi,
}

impl Display for BlindModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NilDb => write!(f, "nildb"),
            Self::NilAi => write!(f, "nilai"),
        }
    }
}

/// An unknown blind module name.
#[derive(Debug, thiserror::Error)]
#[error("unknown blind module: {0}")]
pub struct UnknownBlindModule(pub String);

impl FromStr for BlindModule {
    type Err = UnknownBlindModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nildb" => Ok(Self::NilDb),
            "nilai" => Ok(Self::NilAi),
            other => Err(UnknownBlindModule(other.to_string())),
        }
    }
}

/// A transaction hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The hash that identifies a token in revocation lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenHash(#[serde(with = "hex::serde")] pub [u8; 32]);

impl TokenHash {
    /// Compute the hash of a serialized token.
    pub fn compute(token: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(token.as_ref()).into())
    }
}

impl Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Information about a nilauth server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NilauthAboutResponse {
    /// The time at which the server started.
    pub started: DateTime<Utc>,

    /// The server's hex encoded public key.
    pub public_key: String,

    /// The server's build information.
    pub build: BuildInfo,
}

impl NilauthAboutResponse {
    /// The decoded public key.
    ///
    /// This is only guaranteed to succeed on a response that went through validation.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.public_key)
    }
}

/// The build a nilauth server is running.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// The git commit the server was built from.
    pub commit: String,

    /// The time at which the server was built.
    pub timestamp: DateTime<Utc>,
}

/// A successful health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NilauthHealthResponse {
    /// The service is up.
    Ok,
}

impl NilauthHealthResponse {
    /// The literal body a healthy service responds with.
    pub const OK: &'static str = "OK";

    /// The literal body for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => Self::OK,
        }
    }
}

impl Display for NilauthHealthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The cost of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCostResponse {
    /// The cost in unils.
    pub cost_unils: u64,
}

/// A subscription's status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStatusResponse {
    /// Whether the user is actively subscribed.
    pub subscribed: bool,

    /// The details about the subscription.
    pub details: Option<SubscriptionDetails>,
}

/// The subscription information.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionDetails {
    /// The timestamp at which the subscription expires.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// The timestamp at which the subscription can be renewed.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub renewable_at: DateTime<Utc>,
}

impl SubscriptionDetails {
    /// Whether a new payment would be accepted at `now`.
    pub fn is_renewable_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.renewable_at
    }
}

/// The plaintext payload that is hashed and stored on-chain when paying for a subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentPayload {
    /// The public key of the nilauth service this payment is for.
    #[serde(with = "hex::serde")]
    pub service_public_key: Vec<u8>,

    /// A random value to ensure the hash of this payload is unique.
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 16],

    /// The blind module being subscribed to.
    pub blind_module: BlindModule,

    /// The public key of the identity paying for the subscription.
    #[serde(with = "hex::serde")]
    pub payer_public_key: Vec<u8>,

    /// The public key of the identity the subscription is for.
    #[serde(with = "hex::serde")]
    pub subscriber_public_key: Vec<u8>,
}

impl PaymentPayload {
    /// The canonical encoding of this payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SigningError> {
        canonical_bytes(self)
    }

    /// The SHA-256 digest of the canonical encoding, which must be attached to the payment transaction.
    pub fn digest(&self) -> Result<[u8; 32], SigningError> {
        Ok(Sha256::digest(self.to_bytes()?).into())
    }
}

/// The service's acknowledgement of a validated payment.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct ValidatePaymentResponse {}

impl From<Map<String, Value>> for ValidatePaymentResponse {
    fn from(_: Map<String, Value>) -> Self {
        Self {}
    }
}

/// A newly minted token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTokenResponse {
    /// The serialized token.
    pub token: String,
}

/// The service's acknowledgement of a revocation.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct RevokeTokenResponse {}

impl From<Map<String, Value>> for RevokeTokenResponse {
    fn from(_: Map<String, Value>) -> Self {
        Self {}
    }
}

/// A revoked token.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RevokedToken {
    /// The token hash.
    pub token_hash: TokenHash,

    /// The timestamp at which the token was revoked.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub revoked_at: DateTime<Utc>,
}

/// The result of looking up revoked tokens.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LookupRevokedTokenResponse {
    /// The subset of the queried tokens that were revoked.
    pub revoked: Vec<RevokedToken>,
}
