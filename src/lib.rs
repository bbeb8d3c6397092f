//! A Rust client for interacting with [nilauth](https://github.com/NillionNetwork/nilauth),
//! a service that manages blind module subscriptions and issues access tokens for
//! the [Nillion Network](https://nillion.com).
//!
//! # Getting Started
//!
//! The primary entry point is [`NilauthClient`], created with [`NilauthClient::create`]. Creating a
//! client fetches the service's `about` information once and pins its public key; every privileged
//! call afterwards checks the service still reports that key.
//!
//! Privileged calls are authenticated with a [`RequestSigner`]. [`Ed25519Signer`] is provided, any
//! other signature scheme can be plugged in by implementing the trait.
//!
//! ## Example: Validating a Payment and Requesting a Token
//!
//! ```no_run
//! use nilauth_client::{BlindModule, Ed25519Signer, NilauthClient, NilauthClientOptions, RequestSigner, TxHash};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Connect to nilauth, pinning its identity
//!     let client = NilauthClient::create(NilauthClientOptions::new("http://127.0.0.1:30921", 1)).await?;
//!     let signer = Ed25519Signer::from_bytes(&[1; 32]);
//!     let product = BlindModule::NilDb;
//!
//!     // 2. Find out how much a subscription costs and build the payload to attach to the payment
//!     let cost = client.subscription_cost(product).await?;
//!     let payload = client.payment_payload(product, &signer, &signer.public_key());
//!     println!("Pay {cost} unils with digest {}", hex::encode(payload.digest()?));
//!
//!     // 3. Once the payment is committed, prove it to nilauth
//!     let tx_hash = TxHash("...".into());
//!     client.validate_payment(&signer, &tx_hash, &payload).await?;
//!
//!     // 4. Request a token for the blind module
//!     let token = client.create_token(&signer, product).await?;
//!     println!("Received root token: {}", token.token);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Errors
//!
//! Every operation returns a [`NilauthError`]. Callers can tell apart a service that can't be
//! reached ([`NilauthError::Unreachable`]), a service that rejected the request
//! ([`NilauthError::ErrorResponse`], carrying the service's [`NilauthErrorCode`]) and a service that
//! answered with something unexpected ([`NilauthError::Validation`]). No call is retried internally;
//! [`NilauthError::is_retryable`] helps deciding whether to.

mod classify;
pub mod client;
pub mod error;
pub mod logger;
pub mod models;
pub mod signing;
pub mod transport;
pub mod urls;
pub mod validation;

pub use client::{NilauthClient, NilauthClientOptions, NilauthEndpoint};
pub use error::{
    ConfigError, NilauthError, NilauthErrorCode, NilauthErrorResponse, NilauthErrorResponseBody, NilauthUnreachable,
    UnreachableCause,
};
pub use logger::{FileLogLevelStore, Log, LogLevel, LogLevelStore, MemoryLogLevelStore};
pub use models::{
    BlindModule, BuildInfo, CreateTokenResponse, LookupRevokedTokenResponse, NilauthAboutResponse,
    NilauthHealthResponse, PaymentPayload, RevokeTokenResponse, RevokedToken, SubscriptionCostResponse,
    SubscriptionDetails, SubscriptionStatusResponse, TokenHash, TxHash, ValidatePaymentResponse,
};
pub use signing::{Ed25519Signer, RequestSigner, SignedRequest, SigningError};
pub use transport::{HttpTransport, ReqwestTransport, TransportError};
pub use urls::NilauthUrl;
pub use validation::ValidationError;
