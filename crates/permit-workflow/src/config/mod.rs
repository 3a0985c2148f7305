use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::fees::{
    CheckoutSettings, FeeSchedule, FeeScheduleImportError, WebhookSecret, DEFAULT_CANCEL_URL,
    DEFAULT_CURRENCY, DEFAULT_SUCCESS_URL, DEFAULT_WEBHOOK_SECRET,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the permit service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub fees: FeeConfig,
    pub payments: PaymentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw).ok_or(ConfigError::InvalidLogFormat(raw))?,
            Err(_) => LogFormat::Compact,
        };

        let schedule_path = env::var("FEE_SCHEDULE_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        let currency = env::var("FEE_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.to_string());
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidCurrency(currency));
        }

        let checkout_base_url = env::var("PAYMENT_CHECKOUT_BASE_URL")
            .unwrap_or_else(|_| "https://checkout.sandbox.local/session".to_string());
        let success_url =
            env::var("PAYMENT_SUCCESS_URL").unwrap_or_else(|_| DEFAULT_SUCCESS_URL.to_string());
        let cancel_url =
            env::var("PAYMENT_CANCEL_URL").unwrap_or_else(|_| DEFAULT_CANCEL_URL.to_string());
        let webhook_secret = match env::var("PAYMENT_WEBHOOK_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            Some(secret) => secret,
            None if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingWebhookSecret)
            }
            None => DEFAULT_WEBHOOK_SECRET.to_string(),
        };

        for (name, value) in [
            ("PAYMENT_CHECKOUT_BASE_URL", &checkout_base_url),
            ("PAYMENT_SUCCESS_URL", &success_url),
            ("PAYMENT_CANCEL_URL", &cancel_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl { name });
            }
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level, format },
            fees: FeeConfig {
                schedule_path,
                currency: currency.to_ascii_uppercase(),
            },
            payments: PaymentConfig {
                checkout_base_url,
                success_url,
                cancel_url,
                webhook_secret: WebhookSecret::new(webhook_secret),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Where the fee schedule comes from and which currency invoices are issued in.
#[derive(Debug, Clone)]
pub struct FeeConfig {
    /// CSV export of the fee schedule; the built-in standard schedule is used when unset.
    pub schedule_path: Option<PathBuf>,
    pub currency: String,
}

impl FeeConfig {
    pub fn load_schedule(&self) -> Result<FeeSchedule, FeeScheduleImportError> {
        match &self.schedule_path {
            Some(path) => FeeSchedule::from_path(path),
            None => Ok(FeeSchedule::standard()),
        }
    }
}

/// Redirect targets handed to the payment gateway at checkout, and the secret its callbacks
/// are signed with.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub checkout_base_url: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: WebhookSecret,
}

impl AppConfig {
    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.fees.currency.clone(),
            success_url: self.payments.success_url.clone(),
            cancel_url: self.payments.cancel_url.clone(),
            webhook_secret: self.payments.webhook_secret.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidLogFormat(String),
    InvalidCurrency(String),
    InvalidUrl { name: &'static str },
    MissingWebhookSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'pretty' (found '{value}')")
            }
            ConfigError::InvalidCurrency(value) => {
                write!(f, "FEE_CURRENCY must be a three letter ISO code (found '{value}')")
            }
            ConfigError::InvalidUrl { name } => {
                write!(f, "{name} must be an absolute http(s) URL")
            }
            ConfigError::MissingWebhookSecret => {
                write!(f, "PAYMENT_WEBHOOK_SECRET must be set in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
