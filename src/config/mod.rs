use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::services::verifier::DEFAULT_TOLERANCE_SECS;

// Ошибки конфигурации - фатальны при старте
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub payment: PaymentConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки платежного провайдера (вебхуки)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub webhook_secret: String,
    pub signature_tolerance_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Собирает конфигурацию из произвольного источника `key -> value`.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let default_tolerance = DEFAULT_TOLERANCE_SECS.to_string();

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var(&lookup, "PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "marina_booking=debug,tower_http=debug"),
            },
            database: DatabaseConfig {
                url: required(&lookup, "DATABASE_URL")?,
                pool_size: parse_var(&lookup, "DB_POOL_SIZE", "20")?,
            },
            payment: PaymentConfig {
                webhook_secret: required(&lookup, "STRIPE_WEBHOOK_SECRET")?,
                signature_tolerance_secs: parse_var(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS", &default_tolerance)?,
            },
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
