use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use parley_gateway::ChatService;
use parley_store::MessageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_gateway=debug,parley_store=debug,tower_http=debug"
                    .into()
            }),
        )
        .init();

    // Config
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let socket_path =
        std::env::var("PARLEY_SOCKET_PATH").unwrap_or_else(|_| "/api/socket_io".into());

    // Open the message store
    let store = Arc::new(MessageStore::open(&PathBuf::from(&db_path))?);

    // One service for the whole process: the WebSocket gateway and the
    // polling fallback share the same store and dispatcher.
    let service = ChatService::new(store);

    let app = parley_server::app(service, &socket_path);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley listening on {} (chat socket at {})", addr, socket_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
