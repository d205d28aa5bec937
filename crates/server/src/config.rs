//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MARKET_BASE_URL` - Public URL of the marketplace frontend
//! - `MIDTRANS_SERVER_KEY` - Midtrans server key (Snap + notification signatures)
//! - `FLIP_SECRET_KEY` - Flip for Business secret key
//! - `FLIP_VALIDATION_TOKEN` - Token Flip sends with every callback
//! - `XENDIT_SECRET_KEY` - Xendit secret API key
//! - `XENDIT_CALLBACK_TOKEN` - Token Xendit sends in `x-callback-token`
//!
//! ## Optional
//! - `MARKET_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKET_PORT` - Listen port (default: 3000)
//! - `MIDTRANS_IS_PRODUCTION` - Use Midtrans production endpoints (default: false)
//! - `FLIP_IS_PRODUCTION` - Use Flip production endpoints (default: false)
//! - `MIDTRANS_SNAP_URL`, `MIDTRANS_API_URL`, `FLIP_API_URL`, `XENDIT_API_URL` - Base URL overrides
//! - `DISBURSEMENT_PROVIDER` - `flip` or `xendit` (default: flip)
//! - `PLATFORM_FEE_PERCENT` - Fee withheld from each sale, in percent (default: 0)
//! - `AUTO_PAYOUT` - Disburse the seller's share as soon as a payment settles (default: false)
//! - `ALLOWED_EMAIL_DOMAINS` - Comma-separated university domains allowed to register (default: any)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use unimarket_core::{DisbursementProvider, Rupiah};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Smallest amount a seller may withdraw.
pub const MIN_WITHDRAWAL: Rupiah = Rupiah::new(10_000);

const MIDTRANS_SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";
const MIDTRANS_SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const MIDTRANS_PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";
const MIDTRANS_PRODUCTION_API_URL: &str = "https://api.midtrans.com";
const FLIP_SANDBOX_API_URL: &str = "https://bigflip.id/big_sandbox_api";
const FLIP_PRODUCTION_API_URL: &str = "https://bigflip.id/api";
const XENDIT_API_URL: &str = "https://api.xendit.co";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Marketplace server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the frontend (Snap finish redirects, notification links)
    pub base_url: String,
    pub midtrans: MidtransConfig,
    pub flip: FlipConfig,
    pub xendit: XenditConfig,
    pub payouts: PayoutConfig,
    /// University email domains allowed to register; empty allows any domain
    pub allowed_email_domains: Vec<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Midtrans Snap configuration.
///
/// Implements `Debug` manually to redact the server key.
#[derive(Clone)]
pub struct MidtransConfig {
    pub server_key: SecretString,
    pub is_production: bool,
    /// Base URL for Snap (`/snap/v1/transactions`)
    pub snap_url: String,
    /// Base URL for the Core API (`/v2/{order_id}/status`)
    pub api_url: String,
}

impl std::fmt::Debug for MidtransConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidtransConfig")
            .field("server_key", &"[REDACTED]")
            .field("is_production", &self.is_production)
            .field("snap_url", &self.snap_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Flip disbursement configuration.
#[derive(Clone)]
pub struct FlipConfig {
    pub secret_key: SecretString,
    pub validation_token: SecretString,
    pub api_url: String,
}

impl std::fmt::Debug for FlipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipConfig")
            .field("secret_key", &"[REDACTED]")
            .field("validation_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Xendit disbursement configuration.
#[derive(Clone)]
pub struct XenditConfig {
    pub secret_key: SecretString,
    pub callback_token: SecretString,
    pub api_url: String,
}

impl std::fmt::Debug for XenditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XenditConfig")
            .field("secret_key", &"[REDACTED]")
            .field("callback_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Seller payout settings.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Provider used for new withdrawals
    pub provider: DisbursementProvider,
    /// Percentage of each sale kept by the platform
    pub platform_fee_percent: Decimal,
    /// Disburse the net amount right after a payment settles
    pub auto_payout: bool,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            provider: DisbursementProvider::Flip,
            platform_fee_percent: Decimal::ZERO,
            auto_payout: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MARKET_DATABASE_URL")?;
        let host = get_parsed_or_default::<IpAddr>("MARKET_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default::<u16>("MARKET_PORT", "3000")?;
        let base_url = get_required_env("MARKET_BASE_URL")?;
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("MARKET_BASE_URL".to_string(), e.to_string()))?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            midtrans: MidtransConfig::from_env()?,
            flip: FlipConfig::from_env()?,
            xendit: XenditConfig::from_env()?,
            payouts: PayoutConfig::from_env()?,
            allowed_email_domains: parse_domain_list(
                &get_optional_env("ALLOWED_EMAIL_DOMAINS").unwrap_or_default(),
            ),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl MidtransConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let is_production = get_bool_env("MIDTRANS_IS_PRODUCTION")?;
        let (snap_default, api_default) = if is_production {
            (MIDTRANS_PRODUCTION_SNAP_URL, MIDTRANS_PRODUCTION_API_URL)
        } else {
            (MIDTRANS_SANDBOX_SNAP_URL, MIDTRANS_SANDBOX_API_URL)
        };

        Ok(Self {
            server_key: get_validated_secret("MIDTRANS_SERVER_KEY")?,
            is_production,
            snap_url: base_url_or_default("MIDTRANS_SNAP_URL", snap_default),
            api_url: base_url_or_default("MIDTRANS_API_URL", api_default),
        })
    }
}

impl FlipConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let default_url = if get_bool_env("FLIP_IS_PRODUCTION")? {
            FLIP_PRODUCTION_API_URL
        } else {
            FLIP_SANDBOX_API_URL
        };

        Ok(Self {
            secret_key: get_validated_secret("FLIP_SECRET_KEY")?,
            validation_token: get_validated_secret("FLIP_VALIDATION_TOKEN")?,
            api_url: base_url_or_default("FLIP_API_URL", default_url),
        })
    }
}

impl XenditConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret_key: get_validated_secret("XENDIT_SECRET_KEY")?,
            callback_token: get_validated_secret("XENDIT_CALLBACK_TOKEN")?,
            api_url: base_url_or_default("XENDIT_API_URL", XENDIT_API_URL),
        })
    }
}

impl PayoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let provider = get_parsed_or_default::<DisbursementProvider>("DISBURSEMENT_PROVIDER", "flip")?;
        let platform_fee_percent = get_parsed_or_default::<Decimal>("PLATFORM_FEE_PERCENT", "0")?;
        validate_fee_percent(platform_fee_percent)?;

        Ok(Self {
            provider,
            platform_fee_percent,
            auto_payout: get_bool_env("AUTO_PAYOUT")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Read a boolean flag (`true`/`false`/`1`/`0`/`yes`/`no`), default false.
fn get_bool_env(key: &str) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(false), |raw| {
        parse_bool(&raw).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got '{raw}'"))
        })
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Base URL override without a trailing slash.
fn base_url_or_default(key: &str, default: &str) -> String {
    get_env_or_default(key, default)
        .trim_end_matches('/')
        .to_string()
}

/// Split a comma-separated domain list, dropping blanks and leading `@`.
fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().trim_start_matches('@').to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

fn validate_fee_percent(percent: Decimal) -> Result<(), ConfigError> {
    if percent < Decimal::ZERO || percent >= Decimal::ONE_HUNDRED {
        return Err(ConfigError::InvalidEnvVar(
            "PLATFORM_FEE_PERCENT".to_string(),
            format!("must be in [0, 100), got {percent}"),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the gateway dashboard."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            database_url: SecretString::from("postgres://localhost/unimarket"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:5173".to_string(),
            midtrans: MidtransConfig {
                server_key: SecretString::from("SB-Mid-server-q8Zt2LmV0pXc"),
                is_production: false,
                snap_url: MIDTRANS_SANDBOX_SNAP_URL.to_string(),
                api_url: MIDTRANS_SANDBOX_API_URL.to_string(),
            },
            flip: FlipConfig {
                secret_key: SecretString::from("JDJ5JDEzJGZsaXBzZWNyZXQ"),
                validation_token: SecretString::from("$2y$13$flipvalidation"),
                api_url: FLIP_SANDBOX_API_URL.to_string(),
            },
            xendit: XenditConfig {
                secret_key: SecretString::from("xnd_development_R4nd0mK3y"),
                callback_token: SecretString::from("cb_T0k3n_9aZ"),
                api_url: XENDIT_API_URL.to_string(),
            },
            payouts: PayoutConfig::default(),
            allowed_email_domains: vec!["ui.ac.id".to_string()],
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-server-key-here", "MIDTRANS_SERVER_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));

        let result = validate_secret_strength("SB-Mid-server-CHANGEME", "MIDTRANS_SERVER_KEY");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "FLIP_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_real_looking_keys() {
        assert!(validate_secret_strength("SB-Mid-server-q8Zt2LmV0pXcR7wY", "MIDTRANS_SERVER_KEY").is_ok());
        assert!(
            validate_secret_strength("xnd_development_P0fWq9Lz3NbX7cVy", "XENDIT_SECRET_KEY")
                .is_ok()
        );
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_domain_list() {
        assert_eq!(
            parse_domain_list(" ui.ac.id, @ITB.ac.id ,,"),
            vec!["ui.ac.id".to_string(), "itb.ac.id".to_string()]
        );
        assert!(parse_domain_list("").is_empty());
    }

    #[test]
    fn test_validate_fee_percent() {
        assert!(validate_fee_percent(Decimal::ZERO).is_ok());
        assert!(validate_fee_percent(Decimal::new(25, 1)).is_ok());
        assert!(validate_fee_percent(Decimal::ONE_HUNDRED).is_err());
        assert!(validate_fee_percent(Decimal::new(-1, 0)).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug_output = format!("{:?}", test_config());

        assert!(debug_output.contains("api.sandbox.midtrans.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("q8Zt2LmV0pXc"));
        assert!(!debug_output.contains("flipvalidation"));
        assert!(!debug_output.contains("xnd_development"));
        assert!(!debug_output.contains("cb_T0k3n"));
    }
}
