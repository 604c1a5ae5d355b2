use std::collections::HashMap;

use anyhow::Result;
use config::{Config, Environment, File};
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lead store settings
    pub database: DatabaseConfig,
    /// Log level, format and file
    pub logging: LoggingConfig,
    /// SMTP delivery
    pub mail: MailConfig,
    /// Slack announcements
    pub slack: SlackConfig,
    /// Headless CMS holding the mails
    pub cms: CmsConfig,
    /// Dashboard thresholds
    pub dashboard: DashboardConfig,
    /// Rendered view cache
    pub cache: CacheConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, overridden by `DATABASE_URL`
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level
    pub level: String,
    /// Daily rolling log file, if any
    pub file_path: Option<String>,
    /// "json" or "text"
    pub format: String,
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Relay host
    pub smtp_host: String,
    /// Relay port
    pub smtp_port: u16,
    /// Login, if the relay needs one
    pub smtp_user: Option<String>,
    /// Password, usually from `SMTP_PASSWORD`
    pub smtp_password: Option<String>,
    /// Sender mailbox
    pub from_address: String,
    /// Per-message timeout in seconds
    pub timeout_secs: u64,
}

/// Slack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Web API base URL
    pub api_base_url: String,
    /// Bot token, usually from `SLACK_USER_TOKEN`
    pub token: Option<String>,
    /// Channel used when a send names none
    pub default_channel: Option<String>,
}

/// CMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// e.g. `https://<service>.microcms.io/api/v1`
    pub base_url: String,
    /// API key, usually from `MICROCMS_API_KEY`
    pub api_key: Option<String>,
    /// Content endpoint holding the mails
    pub endpoint: String,
    /// Page size for the list call
    pub list_limit: u32,
}

/// Dashboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Days without contact before a company is flagged
    pub stale_after_days: i64,
    /// Items shown per dashboard card
    pub recent_items: usize,
}

/// View cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Serve rendered mail views from the cache
    pub enabled: bool,
    /// sled directory
    pub directory: String,
    /// Seconds a rendered view is served before it is rendered again
    pub ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/leads.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            mail: MailConfig {
                smtp_host: "localhost".to_string(),
                smtp_port: 587,
                smtp_user: None,
                smtp_password: None,
                from_address: "masuda@tamat.jp".to_string(),
                timeout_secs: 30,
            },
            slack: SlackConfig {
                api_base_url: "https://slack.com/api".to_string(),
                token: None,
                default_channel: None,
            },
            cms: CmsConfig {
                base_url: String::new(),
                api_key: None,
                endpoint: "mails".to_string(),
                list_limit: 100,
            },
            dashboard: DashboardConfig {
                stale_after_days: 30,
                recent_items: 5,
            },
            cache: CacheConfig {
                enabled: true,
                directory: ".view_cache".to_string(),
                ttl_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            // LEAD_TRACKER_MAIL__SMTP_HOST -> mail.smtp_host
            .add_source(
                Environment::with_prefix("LEAD_TRACKER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: AppConfig = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.apply_secret_env(&std::env::vars().collect());
        app_config.validate()?;

        Ok(app_config)
    }

    /// Fill secrets from the conventional variables when the layered sources left them unset
    pub fn apply_secret_env(&mut self, vars: &HashMap<String, String>) {
        let secret = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        if self.mail.smtp_password.is_none() {
            self.mail.smtp_password = secret("SMTP_PASSWORD");
        }
        if self.mail.smtp_user.is_none() {
            self.mail.smtp_user = secret("SMTP_USER");
        }
        if self.slack.token.is_none() {
            self.slack.token = secret("SLACK_USER_TOKEN");
        }
        if self.cms.api_key.is_none() {
            self.cms.api_key = secret("MICROCMS_API_KEY");
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }
        crate::validation::InputValidator::validate_database_url(&self.database.url)?;

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate mail config
        self.mail
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| anyhow::anyhow!("Invalid mail.from_address {}: {}", self.mail.from_address, e))?;
        if self.mail.smtp_host.trim().is_empty() {
            return Err(anyhow::anyhow!("smtp_host cannot be empty"));
        }

        // Validate dashboard config
        if self.dashboard.stale_after_days <= 0 {
            return Err(anyhow::anyhow!("stale_after_days must be greater than 0"));
        }
        if self.dashboard.recent_items == 0 {
            return Err(anyhow::anyhow!("recent_items must be greater than 0"));
        }

        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(anyhow::anyhow!("cache.ttl_secs must be greater than 0 when the cache is enabled"));
        }

        if self.cms.list_limit == 0 || self.cms.list_limit > 100 {
            return Err(anyhow::anyhow!("cms.list_limit must be between 1 and 100"));
        }

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite:data/leads.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.dashboard.stale_after_days, 30);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
