//! Provision binary - stores a template and bulk-creates its records
//!
//! Usage:
//!   cargo run --bin provision -- <type> <template.json>
//!
//! The template file holds `{"elements": [...]}` (a `type` field in the file
//! is overridden by the command line).
//!
//! Required environment variables:
//! - DATABASE_URL, FILE_SERVICE_URL, MEDIA_SERVICE_URL, USER_SERVICE_URL
//! - WIKI_USER_TOKEN (bearer token of the user recorded as creator)
//!
//! Optional:
//! - WIKI_PROVISION_COUNT (defaults to 6000)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::info;
use wiki_content::config::Config;
use wiki_content::db::Database;
use wiki_content::gateway::{HttpFileGateway, HttpMediaGateway, HttpUserGateway};
use wiki_content::model::CreateTemplateRequest;
use wiki_content::service::WikiService;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wiki_content=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [wiki_type, template_path] = args.as_slice() else {
        bail!("usage: provision <type> <template.json>");
    };

    let mut request = CreateTemplateRequest::from_file(&PathBuf::from(template_path))?;
    request.wiki_type = wiki_type.clone();

    let token = std::env::var("WIKI_USER_TOKEN").context("WIKI_USER_TOKEN not set")?;
    let config = Config::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    let http = config.http_client()?;
    let gateway_token = config.gateway_service_token.clone();

    let service = WikiService::new(
        db,
        HttpFileGateway::new(http.clone(), &config.file_service_url, gateway_token.clone()),
        HttpMediaGateway::new(http.clone(), &config.media_service_url, gateway_token),
        HttpUserGateway::new(http, &config.user_service_url),
        config.service_settings(),
    );

    info!(
        "Provisioning {} records of type '{}' from {}",
        config.provision_count, wiki_type, template_path
    );
    let report = service.create_template(request, Some(&token)).await?;
    info!(
        "Stored template with {} elements and created {} records",
        report.elements, report.created
    );
    Ok(())
}
