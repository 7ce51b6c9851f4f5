use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use wiki_content::api::{self, AppState};
use wiki_content::config::Config;
use wiki_content::db::Database;
use wiki_content::gateway::{HttpFileGateway, HttpMediaGateway, HttpUserGateway};
use wiki_content::service::WikiService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wiki_content=info".parse()?),
        )
        .init();

    info!("Starting wiki content service");

    let config = Config::from_env()?;
    let db = Database::connect(&config.database_url).await?;

    let http = config.http_client()?;
    let token = config.gateway_service_token.clone();
    let service = WikiService::new(
        db,
        HttpFileGateway::new(http.clone(), &config.file_service_url, token.clone()),
        HttpMediaGateway::new(http.clone(), &config.media_service_url, token),
        HttpUserGateway::new(http, &config.user_service_url),
        config.service_settings(),
    );

    let state = Arc::new(AppState {
        service,
        default_page_limit: config.default_page_limit,
        default_app_language: config.default_app_language,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    api::serve(listener, api::router(state)).await?;

    info!("Wiki content service stopped");
    Ok(())
}
