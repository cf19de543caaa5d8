use anyhow::Context;
use bigdecimal::BigDecimal;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

pub const DEFAULT_PROCESSOR_BASE_URL: &str = "https://api.mercadopago.com";
const DEFAULT_CONTACT_FEE: &str = "2.00";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub processor_base_url: String,
    pub processor_access_token: String,
    pub processor_timeout: Duration,
    pub webhook_secret: String,
    pub notification_url: String,
    pub contact_fee: BigDecimal,
    pub charge_expiration_minutes: i64,
    pub cors_allowed_origins: CorsOrigins,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests do not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));

        let contact_fee: BigDecimal = lookup("CONTACT_FEE")
            .unwrap_or_else(|| DEFAULT_CONTACT_FEE.to_string())
            .trim()
            .parse()
            .context("CONTACT_FEE must be a decimal amount")?;
        if contact_fee <= BigDecimal::from(0) {
            anyhow::bail!("CONTACT_FEE must be greater than zero");
        }

        let charge_expiration_minutes: i64 = lookup("CHARGE_EXPIRATION_MINUTES")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("CHARGE_EXPIRATION_MINUTES must be an integer")?;
        if charge_expiration_minutes <= 0 {
            anyhow::bail!("CHARGE_EXPIRATION_MINUTES must be positive");
        }

        Ok(Config {
            server_port: lookup("SERVER_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: required("DATABASE_URL")?,
            processor_base_url: lookup("PROCESSOR_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PROCESSOR_BASE_URL.to_string()),
            processor_access_token: required("PROCESSOR_ACCESS_TOKEN")?,
            processor_timeout: Duration::from_secs(
                lookup("PROCESSOR_TIMEOUT_SECS")
                    .unwrap_or_else(|| "10".to_string())
                    .parse()
                    .context("PROCESSOR_TIMEOUT_SECS must be an integer")?,
            ),
            webhook_secret: required("WEBHOOK_SECRET")?,
            notification_url: required("NOTIFICATION_URL")?,
            contact_fee,
            charge_expiration_minutes,
            cors_allowed_origins: parse_cors_origins(
                &lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            )?,
            log_json: lookup("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

fn parse_cors_origins(raw: &str) -> anyhow::Result<CorsOrigins> {
    let value = raw.trim();
    if value == "*" {
        return Ok(CorsOrigins::Any);
    }

    let origins = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            url::Url::parse(entry)
                .map(|_| entry.trim_end_matches('/').to_string())
                .with_context(|| format!("invalid CORS origin: {entry}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if origins.is_empty() {
        anyhow::bail!("CORS_ALLOWED_ORIGINS must be '*' or a comma-separated list of origins");
    }

    Ok(CorsOrigins::List(origins))
}
