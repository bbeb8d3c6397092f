use nilauth_client::{
    BlindModule, Ed25519Signer, Log, MemoryLogLevelStore, NilauthClient, NilauthClientOptions, RequestSigner, TokenHash,
    TxHash,
};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Log::new(Arc::new(MemoryLogLevelStore::default())).init()?;

    // nilauth must be running, see docker-compose.yml in nilauth
    let options =
        NilauthClientOptions::from_env().unwrap_or_else(|_| NilauthClientOptions::new("http://localhost:30921", 1));
    let health = NilauthClient::check_health(&options.base_url).await?;
    println!("Health: {health}");

    let client = NilauthClient::create(options).await?;
    println!("Connected: public_key={}, chain_id={}", client.public_key(), client.chain_id());

    let signer = Ed25519Signer::from_bytes(&[42; 32]);
    let product = BlindModule::NilDb;

    let cost = client.subscription_cost(product).await?;
    let payload = client.payment_payload(product, &signer, &signer.public_key());
    println!("Cost: product={product}, cost={cost}, digest={}", hex::encode(payload.digest()?));

    // In this demo the payer and the subscriber are the same identity, and the payment
    // transaction hash is provided by whoever made the payment.
    if let Ok(tx_hash) = env::var("PAYMENT_TX_HASH") {
        client.validate_payment(&signer, &TxHash(tx_hash), &payload).await?;
        println!("Payment validated");
    }

    let status = client.subscription_status(&signer, product).await?;
    println!("Subscribed: {}", status.subscribed);

    let token = client.create_token(&signer, product).await?;
    println!("Root token: {}", token.token);

    let revoked = client.lookup_revoked_tokens(&[TokenHash::compute(&token.token)]).await?;
    println!("Revoked: {}", !revoked.is_empty());
    Ok(())
}
