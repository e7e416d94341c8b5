use crate::domain::SubscriberEmail;
use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use reqwest::Url;
use secrecy::{ExposeSecret, Secret};
use serde_aux::field_attributes::{
    deserialize_bool_from_anything, deserialize_number_from_string,
    deserialize_option_number_from_string,
};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::time::Duration;

/// Retrive the configuration for the application.
///
/// Values are read from `configuration.yaml` and can be overridden with
/// environment variables prefixed by `APP_`, using `__` to separate nested
/// keys, e.g. `APP_BROADCAST__SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    Config::builder()
        .add_source(File::new("configuration.yaml", FileFormat::Yaml))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()
}

#[derive(Debug, Clone, serde::Deserialize, Getters)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub email_client: EmailClientSettings,
    pub broadcast: BroadcastSettings,
}

#[derive(Debug, Clone, serde::Deserialize, Getters)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, serde::Deserialize, Getters)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_bool_from_anything")]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    /// Connection options for the Postgres instance, without selecting a
    /// database.
    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }

    /// Connection options for the configured database.
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db().database(&self.name)
    }
}

/// Settings for the transactional email provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub sender_name: String,
    pub authorization_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    pub fn sender(&self) -> Result<SubscriberEmail, String> {
        SubscriberEmail::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }
}

/// Settings for the yearly broadcast.
#[derive(Debug, Clone, serde::Deserialize, Getters)]
pub struct BroadcastSettings {
    /// Pre-shared secret required to trigger or reset a broadcast.
    pub secret: Secret<String>,
    /// Maximum amount of pending subscribers handled in a single pass.
    #[serde(
        default = "default_batch_size",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub batch_size: u32,
    /// Pause between two consecutive sends, to stay below the provider's rate
    /// limit.
    #[serde(
        default = "default_send_delay_milliseconds",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub send_delay_milliseconds: u64,
    pub subject: String,
    /// Public url of the landing page, used to build unsubscribe links.
    pub site_url: String,
    /// When set, a background worker runs one broadcast pass on this interval.
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub schedule_interval_seconds: Option<u64>,
}

impl BroadcastSettings {
    /// Refuse a blank secret, which would let any caller trigger a broadcast.
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.expose_secret().trim().is_empty() {
            return Err("The broadcast secret must not be empty".into());
        }
        Ok(())
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_milliseconds)
    }

    pub fn schedule_interval(&self) -> Option<Duration> {
        self.schedule_interval_seconds.map(Duration::from_secs)
    }

    /// Build the link a recipient follows to leave the mailing list.
    pub fn unsubscribe_link(&self, token: &str) -> String {
        format!(
            "{}/subscriptions/unsubscribe?token={token}",
            self.site_url.trim_end_matches('/')
        )
    }
}

fn default_batch_size() -> u32 {
    10
}

fn default_send_delay_milliseconds() -> u64 {
    1000
}
