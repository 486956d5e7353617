use std::sync::Arc;

use gatehouse::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

/// (token, user id, nickname)
const USERS: &[(&str, &str, &str)] = &[
    ("dev-alice", "alice", "Alice"),
    ("dev-bob", "bob", "Bob"),
];

struct Backends {
    validator: StaticTokenValidator,
    identities: MemoryIdentityStore,
    cache: MemoryCache,
    state: Arc<MemoryGameState>,
}

async fn seed() -> Result<Backends, Box<dyn std::error::Error>> {
    let validator = USERS.iter().fold(StaticTokenValidator::new(), |v, (token, user, _)| {
        v.with_token(*token, UserId::new(*user))
    });
    let identities = MemoryIdentityStore::with_accounts(
        USERS
            .iter()
            .map(|(_, user, nick)| Account::active(UserId::new(*user), *nick)),
    );

    let cache = MemoryCache::new();
    for (_, user, _) in USERS {
        // Bindings are normally written by the lobby service.
        let user = UserId::new(*user);
        cache
            .set(&Namespace::WebSocket.key(&user), format!("ws-{user}"))
            .await?;
    }
    let state = Arc::new(MemoryGameState::new(cache.clone()));

    Ok(Backends {
        validator,
        identities,
        cache,
        state,
    })
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug,dev_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let bind = std::env::var("GATEHOUSE_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let backends = seed().await?;

    let retry = spawn_flush_worker(Arc::clone(&backends.state), RetryConfig::default());
    let interceptor = FrameInterceptor::new(
        backends.validator,
        backends.identities,
        backends.cache,
        backends.state,
    )
    .with_retry(retry);

    let (broker, mut delivered) = ChannelBroker::new();
    tokio::spawn(async move {
        while let Some((session, frame)) = delivered.recv().await {
            tracing::info!(%session, command = %frame.command, "frame delivered to broker");
        }
    });

    let server = GatehouseServer::builder()
        .bind(&bind)
        .config(InterceptorConfig::default())
        .build(interceptor, broker)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "dev server ready, try ?userId=alice or token dev-alice");
    server.run().await?;
    Ok(())
}
