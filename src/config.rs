use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::cache::MAX_TTL;
use crate::quran::{ReciterId, TranslationId, VerseOptions, MAX_SEARCH_PAGE_SIZE};
use crate::sources::quran_api::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Upstream content API
    pub api_base_url: String,
    pub request_timeout_secs: u64,

    // Client credentials (all three or none)
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,

    // Cache
    pub cache_default_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,

    // Defaults for content requests
    pub default_translation_id: TranslationId,
    pub default_reciter_id: ReciterId,
    pub search_page_size: u32,

    // Paths
    pub data_dir: PathBuf,
}

/// Upstream client-credential settings, present only when fully configured.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_base_url: std::env::var("QURAN_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            token_url: non_empty_var("QURAN_TOKEN_URL"),
            client_id: non_empty_var("QURAN_CLIENT_ID"),
            client_secret: non_empty_var("QURAN_CLIENT_SECRET"),

            cache_default_ttl_secs: std::env::var("CACHE_DEFAULT_TTL_SECS")
                .unwrap_or_else(|_| "86400".to_string()) // 24 horas
                .parse()?,
            cache_sweep_interval_secs: std::env::var("CACHE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "600".to_string()) // 10 minutos
                .parse()?,

            default_translation_id: std::env::var("DEFAULT_TRANSLATION_ID")
                .unwrap_or_else(|_| "131".to_string()) // Sahih International
                .parse()?,
            default_reciter_id: std::env::var("DEFAULT_RECITER_ID")
                .unwrap_or_else(|_| "7".to_string()) // Mishari al-Afasy
                .parse()?,
            search_page_size: std::env::var("SEARCH_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Timeout, default TTL and sweep interval must be greater than 0
    /// - Default TTL and sweep interval must not exceed 365 days
    /// - Search page size must be between 1 and 50 (upstream cap)
    /// - Client credentials are all-or-nothing
    /// - URLs must be http(s)
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than 0");
        }

        if self.cache_default_ttl_secs == 0 {
            anyhow::bail!("Cache default TTL must be greater than 0");
        }

        if self.cache_sweep_interval_secs == 0 {
            anyhow::bail!("Cache sweep interval must be greater than 0");
        }

        for (name, secs) in [
            ("Cache default TTL", self.cache_default_ttl_secs),
            ("Cache sweep interval", self.cache_sweep_interval_secs),
        ] {
            if secs > MAX_TTL.as_secs() {
                anyhow::bail!("{} must be at most {}s, got: {}", name, MAX_TTL.as_secs(), secs);
            }
        }

        if self.search_page_size == 0 || self.search_page_size > MAX_SEARCH_PAGE_SIZE {
            anyhow::bail!(
                "Search page size must be between 1 and {}, got: {}",
                MAX_SEARCH_PAGE_SIZE,
                self.search_page_size
            );
        }

        if !is_http_url(&self.api_base_url) {
            anyhow::bail!("QURAN_API_BASE_URL must be an http(s) URL, got: {}", self.api_base_url);
        }

        let configured = [&self.token_url, &self.client_id, &self.client_secret]
            .iter()
            .filter(|v| v.is_some())
            .count();
        if configured != 0 && configured != 3 {
            anyhow::bail!(
                "QURAN_TOKEN_URL, QURAN_CLIENT_ID and QURAN_CLIENT_SECRET must be set together"
            );
        }

        if let Some(token_url) = &self.token_url {
            if !is_http_url(token_url) {
                anyhow::bail!("QURAN_TOKEN_URL must be an http(s) URL, got: {}", token_url);
            }
        }

        Ok(())
    }

    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.token_url, &self.client_id, &self.client_secret) {
            (Some(token_url), Some(client_id), Some(client_secret)) => Some(Credentials {
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_default_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_default_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs)
    }

    pub fn verse_options(&self) -> VerseOptions {
        VerseOptions {
            translation: self.default_translation_id,
            reciter: self.default_reciter_id,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The client secret never appears in it.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            API: {} ({}s timeout, {})\n  \
            Cache: {}s default TTL, sweep every {}s\n  \
            Defaults: translation {}, reciter {}, {} results/page\n  \
            Data: {}",
            self.api_base_url,
            self.request_timeout_secs,
            match &self.client_id {
                Some(id) => format!("client {id}"),
                None => "anonymous".to_string(),
            },
            self.cache_default_ttl_secs,
            self.cache_sweep_interval_secs,
            self.default_translation_id,
            self.default_reciter_id,
            self.search_page_size,
            self.data_dir.display()
        )
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn is_http_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 10,

            token_url: None,
            client_id: None,
            client_secret: None,

            cache_default_ttl_secs: 86_400,
            cache_sweep_interval_secs: 600,

            default_translation_id: 131,
            default_reciter_id: 7,
            search_page_size: 20,

            data_dir: "./data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_and_anonymous() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.credentials().is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache_sweep_interval(), Duration::from_secs(600));
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let config = Config {
            client_id: Some("id".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn full_credentials_are_exposed() {
        let config = Config {
            token_url: Some("https://oauth2.example.org/oauth2/token".into()),
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.credentials().unwrap().client_id, "id");
        assert!(!config.summary().contains("secret"));
    }

    #[test]
    fn oversized_page_size_is_rejected() {
        let config = Config {
            search_page_size: 51,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn ttl_beyond_one_year_is_rejected() {
        let config = Config {
            cache_default_ttl_secs: u64::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            cache_default_ttl_secs: MAX_TTL.as_secs(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let config = Config {
            api_base_url: "ftp://example.org".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
