use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_CURRENCY: &str = "aed";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Payment-provider settings. The webhook secret gates every order mutation
/// driven by provider callbacks, so it has no development fallback.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    #[validate(length(min = 1))]
    pub secret_key: String,

    /// Shared secret used to verify inbound webhook signatures.
    #[validate(length(min = 1))]
    pub webhook_secret: String,

    /// Maximum age of a signed webhook timestamp before it is rejected.
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: i64,

    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,

    /// Where the hosted checkout redirects the shopper afterwards.
    pub success_url: String,
    pub cancel_url: String,
}

/// Application configuration, layered from `config/default.toml` and
/// `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,

    /// HMAC secret for verifying bearer tokens issued by the auth provider.
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// ISO currency code applied to new orders (minor units everywhere).
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Comma-separated list of allowed CORS origins; permissive when unset.
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[validate]
    pub stripe: StripeConfig,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}
fn default_webhook_tolerance() -> i64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

impl AppConfig {
    /// Direct constructor, mainly for tests where file/env layering is
    /// unnecessary.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: impl Into<String>,
        jwt_secret: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
        stripe: StripeConfig,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            currency: default_currency(),
            cors_allowed_origins: None,
            stripe,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Loads configuration from `config/default.toml` (optional) overlaid with
/// `APP__`-prefixed environment variables, then validates it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;
    Ok(cfg)
}

/// Installs the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
