use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::{env, fmt, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

use crate::{
    classify,
    error::{ConfigError, NilauthError, UnreachableCause},
    models::{
        BlindModule, CreateTokenResponse, LookupRevokedTokenResponse, NilauthAboutResponse, NilauthHealthResponse,
        PaymentPayload, RevokeTokenResponse, RevokedToken, SubscriptionCostResponse, SubscriptionStatusResponse,
        TokenHash, TxHash, ValidatePaymentResponse,
    },
    signing::{RequestSigner, SignedRequest, SigningError},
    transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError},
    urls::NilauthUrl,
    validation::{self, ResponseSchema},
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const SIGNED_REQUEST_VALIDITY_SECS: i64 = 60;

const BASE_URL_ENV: &str = "NILAUTH_BASE_URL";
const CHAIN_ID_ENV: &str = "NILAUTH_CHAIN_ID";
const TIMEOUT_ENV: &str = "NILAUTH_TIMEOUT_SECS";

/// The options used to create a [`NilauthClient`].
#[derive(Clone)]
pub struct NilauthClientOptions {
    /// The nilauth instance's base URL.
    pub base_url: String,

    /// The chain payments are made on.
    pub chain_id: u64,

    /// The request timeout. Only used by the default transport.
    pub timeout: Duration,

    transport: Option<Arc<dyn HttpTransport>>,
}

impl NilauthClientOptions {
    pub fn new(base_url: impl Into<String>, chain_id: u64) -> Self {
        Self { base_url: base_url.into(), chain_id, timeout: DEFAULT_TIMEOUT, transport: None }
    }

    /// Load options from `NILAUTH_BASE_URL`, `NILAUTH_CHAIN_ID` and the optional `NILAUTH_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var(BASE_URL_ENV).map_err(|_| ConfigError::Missing(BASE_URL_ENV))?;
        let chain_id = env::var(CHAIN_ID_ENV).map_err(|_| ConfigError::Missing(CHAIN_ID_ENV))?;
        let chain_id =
            chain_id.parse().map_err(|_| ConfigError::Invalid { name: CHAIN_ID_ENV, value: chain_id.clone() })?;
        let mut options = Self::new(base_url, chain_id);
        if let Ok(timeout) = env::var(TIMEOUT_ENV) {
            let seconds =
                timeout.parse().map_err(|_| ConfigError::Invalid { name: TIMEOUT_ENV, value: timeout.clone() })?;
            options.timeout = Duration::from_secs(seconds);
        }
        Ok(options)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom transport instead of the default `reqwest` based one.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn endpoint(&self) -> Result<NilauthEndpoint, NilauthError> {
        match &self.transport {
            Some(transport) => Ok(NilauthEndpoint::new(self.base_url.clone(), transport.clone())),
            None => NilauthEndpoint::with_timeout(self.base_url.clone(), self.timeout),
        }
    }
}

impl fmt::Debug for NilauthClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NilauthClientOptions")
            .field("base_url", &self.base_url)
            .field("chain_id", &self.chain_id)
            .field("timeout", &self.timeout)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

/// The unauthenticated endpoints of a nilauth instance.
///
/// These don't need a pinned identity, so they can be used before (or instead of) creating a
/// [`NilauthClient`].
#[derive(Clone)]
pub struct NilauthEndpoint {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
}

impl NilauthEndpoint {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { base_url: base_url.into(), transport }
    }

    /// Create an endpoint that uses the default transport.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NilauthError> {
        let base_url = base_url.into();
        let transport = match ReqwestTransport::new(timeout) {
            Ok(transport) => transport,
            Err(e) => return Err(setup_failure(&base_url, e)),
        };
        Ok(Self::new(base_url, Arc::new(transport)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get information about the nilauth instance.
    pub async fn about(&self) -> Result<NilauthAboutResponse, NilauthError> {
        self.get(NilauthUrl::About).await
    }

    /// Check whether the service is up.
    pub async fn health(&self) -> Result<NilauthHealthResponse, NilauthError> {
        let url = NilauthUrl::Health.build(&self.base_url)?;
        let response = self.dispatch(HttpRequest { method: Method::GET, url: url.clone(), body: None }).await?;
        if !response.is_success() {
            return Err(classify::unexpected_status(&url, response.status, &response.body));
        }
        validation::parse_health(&response.body).ok_or_else(|| {
            let body = String::from_utf8_lossy(&response.body).into_owned();
            classify::unreachable(&url, UnreachableCause::Unhealthy(body))
        })
    }

    /// Get the cost of a subscription, in unils.
    pub async fn subscription_cost(&self, blind_module: BlindModule) -> Result<u64, NilauthError> {
        let response: SubscriptionCostResponse = self.get(NilauthUrl::SubscriptionCost(blind_module)).await?;
        Ok(response.cost_unils)
    }

    /// Lookup which of the given tokens have been revoked.
    pub async fn lookup_revoked_tokens(&self, hashes: &[TokenHash]) -> Result<Vec<RevokedToken>, NilauthError> {
        let request = LookupRevokedTokensRequest { hashes };
        let response: LookupRevokedTokenResponse = self.post(NilauthUrl::LookupRevokedTokens, &request).await?;
        Ok(response.revoked)
    }

    async fn get<T: ResponseSchema>(&self, endpoint: NilauthUrl) -> Result<T, NilauthError> {
        let url = endpoint.build(&self.base_url)?;
        self.execute(HttpRequest { method: Method::GET, url, body: None }).await
    }

    async fn post<R, T>(&self, endpoint: NilauthUrl, request: &R) -> Result<T, NilauthError>
    where
        R: Serialize,
        T: ResponseSchema,
    {
        let url = endpoint.build(&self.base_url)?;
        let body = serde_json::to_vec(request).map_err(SigningError::from)?;
        self.execute(HttpRequest { method: Method::POST, url, body: Some(body) }).await
    }

    async fn execute<T: ResponseSchema>(&self, request: HttpRequest) -> Result<T, NilauthError> {
        let url = request.url.clone();
        let response = self.dispatch(request).await?;
        let body = classify::success_body(&url, response)?;
        Ok(validation::parse(&body)?)
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, NilauthError> {
        debug!("Sending {} request to {}", request.method, request.url);
        let url = request.url.clone();
        self.transport.send(request).await.map_err(|e| classify::transport_failure(&url, e))
    }
}

/// A client for a nilauth instance whose identity was pinned at creation time.
#[derive(Clone)]
pub struct NilauthClient {
    endpoint: NilauthEndpoint,
    public_key: String,
    public_key_bytes: Vec<u8>,
    chain_id: u64,
}

impl NilauthClient {
    /// Connect to a nilauth instance and pin its public key.
    pub async fn create(options: NilauthClientOptions) -> Result<Self, NilauthError> {
        let endpoint = options.endpoint()?;
        let about = endpoint.about().await?;
        let public_key_bytes = decode_public_key(&about)?;
        info!(
            "Connected to nilauth at {}: public_key={}, commit={}",
            endpoint.base_url(),
            about.public_key,
            about.build.commit
        );
        Ok(Self { endpoint, public_key: about.public_key, public_key_bytes, chain_id: options.chain_id })
    }

    /// Check whether the nilauth instance at `base_url` is up, without creating a client.
    pub async fn check_health(base_url: &str) -> Result<NilauthHealthResponse, NilauthError> {
        NilauthEndpoint::with_timeout(base_url, DEFAULT_TIMEOUT)?.health().await
    }

    /// Get the cost of a subscription from the nilauth instance at `base_url`, without creating a client.
    pub async fn fetch_subscription_cost(base_url: &str, blind_module: BlindModule) -> Result<u64, NilauthError> {
        NilauthEndpoint::with_timeout(base_url, DEFAULT_TIMEOUT)?.subscription_cost(blind_module).await
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    /// The hex encoded public key pinned when this client was created.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The unauthenticated endpoints of this instance.
    pub fn endpoint(&self) -> &NilauthEndpoint {
        &self.endpoint
    }

    /// Check whether the service is up.
    pub async fn health(&self) -> Result<NilauthHealthResponse, NilauthError> {
        self.endpoint.health().await
    }

    /// Get information about the nilauth instance.
    pub async fn about(&self) -> Result<NilauthAboutResponse, NilauthError> {
        self.endpoint.about().await
    }

    /// Fetch the service's current information and ensure it still uses the pinned public key.
    pub async fn verify_identity(&self) -> Result<NilauthAboutResponse, NilauthError> {
        let about = self.endpoint.about().await?;
        if decode_public_key(&about)? != self.public_key_bytes {
            return Err(NilauthError::PublicKeyMismatch {
                pinned: self.public_key.clone(),
                reported: about.public_key,
            });
        }
        Ok(about)
    }

    /// Get the cost of a subscription, in unils.
    pub async fn subscription_cost(&self, blind_module: BlindModule) -> Result<u64, NilauthError> {
        self.endpoint.subscription_cost(blind_module).await
    }

    /// Get the subscription status of the signer's identity.
    pub async fn subscription_status(
        &self,
        signer: &dyn RequestSigner,
        blind_module: BlindModule,
    ) -> Result<SubscriptionStatusResponse, NilauthError> {
        let body = BlindModuleBody { blind_module };
        self.signed_post(NilauthUrl::SubscriptionStatus, signer, body).await
    }

    /// Build the payload to attach to a subscription payment.
    ///
    /// The payment transaction must carry [`PaymentPayload::digest`]; once it is committed the
    /// payload is submitted through [`NilauthClient::validate_payment`].
    pub fn payment_payload(
        &self,
        blind_module: BlindModule,
        payer: &dyn RequestSigner,
        subscriber_public_key: &[u8],
    ) -> PaymentPayload {
        PaymentPayload {
            service_public_key: self.public_key_bytes.clone(),
            nonce: rand::random(),
            blind_module,
            payer_public_key: payer.public_key(),
            subscriber_public_key: subscriber_public_key.to_vec(),
        }
    }

    /// Submit proof of a subscription payment made on this client's chain.
    pub async fn validate_payment(
        &self,
        payer: &dyn RequestSigner,
        tx_hash: &TxHash,
        payload: &PaymentPayload,
    ) -> Result<ValidatePaymentResponse, NilauthError> {
        info!("Validating payment tx_hash={tx_hash} on chain {}", self.chain_id);
        let body = ValidatePaymentBody { tx_hash, chain_id: self.chain_id, payload };
        self.signed_post(NilauthUrl::ValidatePayment, payer, body).await
    }

    /// Request a token for the signer's identity.
    pub async fn create_token(
        &self,
        signer: &dyn RequestSigner,
        blind_module: BlindModule,
    ) -> Result<CreateTokenResponse, NilauthError> {
        let body = BlindModuleBody { blind_module };
        self.signed_post(NilauthUrl::CreateToken, signer, body).await
    }

    /// Revoke a token previously issued to the signer.
    pub async fn revoke_token(
        &self,
        signer: &dyn RequestSigner,
        token: &str,
    ) -> Result<RevokeTokenResponse, NilauthError> {
        let body = RevokeTokenBody { token };
        self.signed_post(NilauthUrl::RevokeToken, signer, body).await
    }

    /// Lookup which of the given tokens have been revoked.
    pub async fn lookup_revoked_tokens(&self, hashes: &[TokenHash]) -> Result<Vec<RevokedToken>, NilauthError> {
        self.endpoint.lookup_revoked_tokens(hashes).await
    }

    async fn signed_post<B, T>(
        &self,
        endpoint: NilauthUrl,
        signer: &dyn RequestSigner,
        body: B,
    ) -> Result<T, NilauthError>
    where
        B: Serialize,
        T: ResponseSchema,
    {
        self.verify_identity().await?;
        let payload = SignedPayload {
            nonce: rand::random(),
            target_public_key: &self.public_key,
            expires_at: Utc::now() + ChronoDuration::seconds(SIGNED_REQUEST_VALIDITY_SECS),
            body,
        };
        let request = SignedRequest::new(&payload, signer)?;
        self.endpoint.post(endpoint, &request).await
    }
}

impl fmt::Debug for NilauthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NilauthClient")
            .field("base_url", &self.base_url())
            .field("public_key", &self.public_key)
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

/// Report a transport that couldn't be built against the base URL, as no endpoint was requested yet.
fn setup_failure(base_url: &str, error: TransportError) -> NilauthError {
    match Url::parse(base_url) {
        Ok(url) => classify::transport_failure(&url, error),
        Err(e) => e.into(),
    }
}

fn decode_public_key(about: &NilauthAboutResponse) -> Result<Vec<u8>, NilauthError> {
    // Already checked by the about schema, a failure here means the validation was bypassed.
    about.public_key_bytes().map_err(|e| {
        NilauthError::Validation(validation::ValidationError {
            shape: NilauthAboutResponse::NAME,
            reason: format!("public_key: {e}"),
            body: about.public_key.clone(),
        })
    })
}

/// The envelope every signed payload is wrapped in.
#[derive(Serialize)]
struct SignedPayload<'a, B> {
    #[serde(with = "hex::serde")]
    nonce: [u8; 16],
    target_public_key: &'a str,
    #[serde(with = "chrono::serde::ts_seconds")]
    expires_at: DateTime<Utc>,
    #[serde(flatten)]
    body: B,
}

#[derive(Serialize)]
struct BlindModuleBody {
    blind_module: BlindModule,
}

#[derive(Serialize)]
struct ValidatePaymentBody<'a> {
    tx_hash: &'a TxHash,
    chain_id: u64,
    payload: &'a PaymentPayload,
}

#[derive(Serialize)]
struct RevokeTokenBody<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct LookupRevokedTokensRequest<'a> {
    hashes: &'a [TokenHash],
}
