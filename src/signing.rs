//! Signed requests: the envelope privileged nilauth endpoints use to authenticate a caller.
//!
//! A [`SignedRequest`] carries the canonical encoding of a payload, the caller's public key, and a
//! signature over the payload bytes made with the matching private key. The signature scheme is
//! abstracted behind [`RequestSigner`]; [`Ed25519Signer`] is the implementation provided here.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// An error when signing or verifying a request.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Failed to serialize the payload for signing.
    #[error("payload serialization: {0}")]
    PayloadSerde(#[from] serde_json::Error),

    /// The provided public key was invalid.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature is malformed or does not match the payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// The signer could not produce a signature.
    #[error("signer: {0}")]
    Signer(String),
}

/// A capability to sign requests on behalf of an identity.
///
/// The client never generates or stores keys itself: a signer is handed in for every privileged call.
pub trait RequestSigner: Send + Sync {
    /// The public key that verifies this signer's signatures.
    fn public_key(&self) -> Vec<u8>;

    /// Sign a message.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError>;
}

/// A [`RequestSigner`] backed by an ed25519 key.
#[derive(Clone)]
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Create a signer from a 32 byte secret key.
    pub fn from_bytes(secret_key: &[u8; 32]) -> Self {
        Self { key: SigningKey::from_bytes(secret_key) }
    }

    /// Generate a signer with a random key.
    pub fn generate() -> Self {
        Self { key: SigningKey::generate(&mut OsRng) }
    }

    /// The hex encoded public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().as_bytes())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer").field("public_key", &self.public_key_hex()).finish()
    }
}

impl RequestSigner for Ed25519Signer {
    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }
}

/// A request signed by the caller's key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedRequest {
    /// The signer's public key.
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,

    /// The signature over `payload`.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,

    /// The canonically encoded payload.
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
}

impl SignedRequest {
    /// Encode `payload` canonically and sign it.
    pub fn new<T: Serialize>(payload: &T, signer: &dyn RequestSigner) -> Result<Self, SigningError> {
        let payload = canonical_bytes(payload)?;
        let signature = signer.sign(&payload)?;
        Ok(Self { public_key: signer.public_key(), signature, payload })
    }

    /// Verify the signature, assuming the public key is an ed25519 key.
    pub fn verify_ed25519(&self) -> Result<(), SigningError> {
        let public_key: [u8; 32] = self.public_key.as_slice().try_into().map_err(|_| SigningError::InvalidPublicKey)?;
        let key = VerifyingKey::from_bytes(&public_key).map_err(|_| SigningError::InvalidPublicKey)?;
        let signature = Signature::from_slice(&self.signature).map_err(|_| SigningError::InvalidSignature)?;
        key.verify(&self.payload, &signature).map_err(|_| SigningError::InvalidSignature)
    }
}

/// Encode a value as JSON with object keys sorted at every level and no insignificant whitespace.
///
/// Two values that are equal as JSON always produce the same bytes.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SigningError> {
    let value = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let map: Map<String, Value> = entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(map)
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedSigner;

    impl RequestSigner for FixedSigner {
        fn public_key(&self) -> Vec<u8> {
            vec![0xaa; 4]
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SigningError> {
            Ok(message.iter().rev().copied().collect())
        }
    }

    #[test]
    fn canonical_encoding_sorts_keys() {
        let a = json!({"b": 1, "a": {"d": [{"y": 1, "x": 2}], "c": null}});
        let b = json!({"a": {"c": null, "d": [{"x": 2, "y": 1}]}, "b": 1});
        let bytes = canonical_bytes(&a).unwrap();
        assert_eq!(bytes, canonical_bytes(&b).unwrap());
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"a":{"c":null,"d":[{"x":2,"y":1}]},"b":1}"#);
    }

    #[test]
    fn envelope_uses_signer_capability() {
        let request = SignedRequest::new(&json!({"k": "v"}), &FixedSigner).unwrap();
        assert_eq!(request.payload, br#"{"k":"v"}"#);
        assert_eq!(request.public_key, vec![0xaa; 4]);
        assert_eq!(request.signature, br#"}"v":"k"{"#);
    }

    #[test]
    fn envelope_serializes_as_hex() {
        let request = SignedRequest::new(&json!({}), &FixedSigner).unwrap();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"public_key": "aaaaaaaa", "signature": "7d7b", "payload": "7b7d"}));
    }

    #[test]
    fn ed25519_signature_verifies() {
        let signer = Ed25519Signer::from_bytes(&[7; 32]);
        let request = SignedRequest::new(&json!({"nonce": "00"}), &signer).unwrap();
        assert_eq!(hex::encode(&request.public_key), signer.public_key_hex());
        request.verify_ed25519().unwrap();

        let again = SignedRequest::new(&json!({"nonce": "00"}), &signer).unwrap();
        assert_eq!(again, request);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let signer = Ed25519Signer::generate();
        let mut request = SignedRequest::new(&json!({"amount": 1}), &signer).unwrap();
        request.payload = canonical_bytes(&json!({"amount": 2})).unwrap();
        assert!(matches!(request.verify_ed25519(), Err(SigningError::InvalidSignature)));
    }

    #[test]
    fn foreign_public_key_is_rejected() {
        let signer = Ed25519Signer::generate();
        let mut request = SignedRequest::new(&json!({}), &signer).unwrap();
        request.public_key = Ed25519Signer::generate().public_key();
        assert!(matches!(request.verify_ed25519(), Err(SigningError::InvalidSignature)));
        request.public_key = vec![1, 2, 3];
        assert!(matches!(request.verify_ed25519(), Err(SigningError::InvalidPublicKey)));
    }
}
