use crate::service::ServiceSettings;
use crate::validation::MAX_PAGE_LIMIT;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,

    // Peer services
    pub file_service_url: String,
    pub media_service_url: String,
    pub user_service_url: String,
    pub gateway_service_token: Option<String>,
    pub gateway_timeout: Duration,

    // HTTP
    pub port: u16,
    pub default_page_limit: i64,
    pub default_app_language: i32,

    // Content
    pub provision_count: usize,
    pub supported_languages: Vec<i32>,
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list of language ids. Blank entries are skipped.
pub fn parse_languages(raw: &str) -> Result<Vec<i32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .with_context(|| format!("Invalid language id '{}' in SUPPORTED_LANGUAGES", s))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,

            file_service_url: std::env::var("FILE_SERVICE_URL")
                .context("FILE_SERVICE_URL not set")?,
            media_service_url: std::env::var("MEDIA_SERVICE_URL")
                .context("MEDIA_SERVICE_URL not set")?,
            user_service_url: std::env::var("USER_SERVICE_URL")
                .context("USER_SERVICE_URL not set")?,
            gateway_service_token: std::env::var("GATEWAY_SERVICE_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            gateway_timeout: Duration::from_secs(parsed_or("GATEWAY_TIMEOUT_SECS", 10)),

            port: parsed_or("PORT", 8080),
            default_page_limit: parsed_or("DEFAULT_PAGE_LIMIT", 20).clamp(1, MAX_PAGE_LIMIT),
            default_app_language: parsed_or("DEFAULT_APP_LANGUAGE", 1),

            provision_count: parsed_or("WIKI_PROVISION_COUNT", 6000),
            supported_languages: parse_languages(
                &std::env::var("SUPPORTED_LANGUAGES").unwrap_or_default(),
            )?,
        })
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            provision_count: self.provision_count,
            supported_languages: self.supported_languages.clone(),
        }
    }

    /// Shared client for every peer gateway.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.gateway_timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const REQUIRED: [(&str, &str); 4] = [
        ("DATABASE_URL", "postgres://localhost/wiki"),
        ("FILE_SERVICE_URL", "http://files.local"),
        ("MEDIA_SERVICE_URL", "http://media.local"),
        ("USER_SERVICE_URL", "http://users.local"),
    ];

    const OPTIONAL: [&str; 7] = [
        "GATEWAY_SERVICE_TOKEN",
        "GATEWAY_TIMEOUT_SECS",
        "PORT",
        "DEFAULT_PAGE_LIMIT",
        "DEFAULT_APP_LANGUAGE",
        "WIKI_PROVISION_COUNT",
        "SUPPORTED_LANGUAGES",
    ];

    fn reset_env() {
        for (name, value) in REQUIRED {
            std::env::set_var(name, value);
        }
        for name in OPTIONAL {
            std::env::remove_var(name);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        reset_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/wiki");
        assert_eq!(config.port, 8080);
        assert_eq!(config.provision_count, 6000);
        assert_eq!(config.default_page_limit, 20);
        assert_eq!(config.default_app_language, 1);
        assert_eq!(config.gateway_timeout, Duration::from_secs(10));
        assert!(config.gateway_service_token.is_none());
        assert!(config.supported_languages.is_empty());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        reset_env();
        std::env::set_var("PORT", "9000");
        std::env::set_var("WIKI_PROVISION_COUNT", "25");
        std::env::set_var("SUPPORTED_LANGUAGES", "1, 2,,5");
        std::env::set_var("GATEWAY_SERVICE_TOKEN", "svc-token");

        let config = Config::from_env().unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.provision_count, 25);
        assert_eq!(config.supported_languages, vec![1, 2, 5]);
        assert_eq!(config.gateway_service_token.as_deref(), Some("svc-token"));
        assert_eq!(config.service_settings().provision_count, 25);
        reset_env();
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_fall_back() {
        reset_env();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("DEFAULT_PAGE_LIMIT", "0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.default_page_limit, 1);
        reset_env();
    }

    #[test]
    #[serial]
    fn test_page_limit_is_capped() {
        reset_env();
        std::env::set_var("DEFAULT_PAGE_LIMIT", "50000");

        let config = Config::from_env().unwrap();

        assert_eq!(config.default_page_limit, MAX_PAGE_LIMIT);
        reset_env();
    }

    #[test]
    #[serial]
    fn test_missing_required_variable() {
        reset_env();
        std::env::remove_var("FILE_SERVICE_URL");

        let err = Config::from_env().unwrap_err();

        assert!(err.to_string().contains("FILE_SERVICE_URL"));
        reset_env();
    }

    #[test]
    #[serial]
    fn test_invalid_language_list() {
        reset_env();
        std::env::set_var("SUPPORTED_LANGUAGES", "1,en");
        assert!(Config::from_env().is_err());
        reset_env();
    }

    #[test]
    fn test_parse_languages() {
        assert_eq!(parse_languages("").unwrap(), Vec::<i32>::new());
        assert_eq!(parse_languages("3,1").unwrap(), vec![3, 1]);
        assert!(parse_languages("x").is_err());
    }
}
