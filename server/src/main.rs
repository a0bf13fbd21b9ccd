use std::sync::Arc;
use tokio::net::TcpListener;

use shopchat_server::chat::store::SqliteMessageStore;
use shopchat_server::config::{generate_config_template, Config};
use shopchat_server::routes;
use shopchat_server::state::ChatState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shopchat_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter).init();
    }

    tracing::info!("shopchat server v{} starting", env!("CARGO_PKG_VERSION"));

    let store = SqliteMessageStore::open(&config.data_dir)?;
    let chat = config.chat_config();
    tracing::info!(
        admin_id = %chat.admin_id,
        max_text_length = chat.max_text_length,
        "Chat settings loaded"
    );

    // Presence lives in this process only; a second instance would not see it
    let state = ChatState::new(Arc::new(store), chat);
    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
