//! Server configuration.
//!
//! Everything is read from `SF_*` environment variables exactly once, at startup, by [`ServerConfig::try_from_env`].
//! Secrets and the settlement limits have no defaults: if any of them is missing or cannot be parsed, the server
//! refuses to start.
use std::{fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use gateway_tools::{GatewayConfig, DEFAULT_GATEWAY_BASE_URL};
use log::*;
use settlement_engine::settlement_objects::SettlementOptions;
use storefront_common::{
    helpers::{non_empty_env, parse_boolean_flag},
    MinorUnits,
    Secret,
};

use crate::errors::ServerError;

const DEFAULT_SF_HOST: &str = "127.0.0.1";
const DEFAULT_SF_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/storefront.db";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MIN_PAYMENT_AMOUNT: i64 = 100;
const DEFAULT_STALE_VERIFICATION_MINUTES: i64 = 30;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub gateway: GatewayConfig,
    /// Key for webhook signatures. Not the same as the API key secret.
    pub webhook_secret: Secret<String>,
    /// Failed payments above this amount (minor units) are escalated to operators
    pub high_value_threshold: MinorUnits,
    pub min_payment_amount: MinorUnits,
    pub auth: AuthConfig,
    pub notifier: NotifierConfig,
    /// How long an order may sit in VERIFICATION_PENDING before the reconciliation worker asks the gateway about it
    pub stale_verification_window: Duration,
    pub reconcile_interval: StdDuration,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// HS256 key for access tokens
    pub jwt_secret: Secret<String>,
}

#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    /// Where outgoing mail is POSTed. If unset, notifications are only logged.
    pub mail_relay_url: Option<String>,
    /// Recipient of fraud and operator alerts
    pub operator_email: Option<String>,
}

impl ServerConfig {
    pub fn try_from_env() -> Result<Self, ServerError> {
        Self::try_from_lookup(non_empty_env)
    }

    /// Builds the configuration from any key-value source. `lookup` returns `None` for unset (or blank) keys.
    pub fn try_from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where F: Fn(&str) -> Option<String> {
        let host = lookup("SF_HOST").unwrap_or_else(|| DEFAULT_SF_HOST.into());
        let port = parse_or_default(&lookup, "SF_PORT", DEFAULT_SF_PORT)?;
        let database_url = lookup("SF_DATABASE_URL").unwrap_or_else(|| {
            info!("🪛️ SF_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.into()
        });
        let base_url = lookup("SF_GATEWAY_BASE_URL").unwrap_or_else(|| DEFAULT_GATEWAY_BASE_URL.into());
        let key_id = required(&lookup, "SF_GATEWAY_KEY_ID")?;
        let key_secret = Secret::new(required(&lookup, "SF_GATEWAY_KEY_SECRET")?);
        let timeout_ms = parse_or_default(&lookup, "SF_GATEWAY_TIMEOUT_MS", DEFAULT_GATEWAY_TIMEOUT_MS)?;
        let gateway = GatewayConfig::new(&key_id, key_secret)
            .with_base_url(&base_url)
            .with_timeout(StdDuration::from_millis(timeout_ms));
        let webhook_secret = Secret::new(required(&lookup, "SF_GATEWAY_WEBHOOK_SECRET")?);
        let threshold: i64 = parse_required(&lookup, "SF_HIGH_VALUE_THRESHOLD")?;
        let min_amount = parse_or_default(&lookup, "SF_MIN_PAYMENT_AMOUNT", DEFAULT_MIN_PAYMENT_AMOUNT)?;
        if threshold < 0 || min_amount < 0 {
            return Err(ServerError::ConfigurationError(
                "SF_HIGH_VALUE_THRESHOLD and SF_MIN_PAYMENT_AMOUNT cannot be negative".into(),
            ));
        }
        let auth = AuthConfig { jwt_secret: Secret::new(required(&lookup, "SF_JWT_SECRET")?) };
        let notifier =
            NotifierConfig { mail_relay_url: lookup("SF_MAIL_RELAY_URL"), operator_email: lookup("SF_OPERATOR_EMAIL") };
        if notifier.mail_relay_url.is_none() {
            warn!("🪛️ SF_MAIL_RELAY_URL is not set. Notifications will be written to the log only.");
        }
        let stale_minutes =
            parse_or_default(&lookup, "SF_STALE_VERIFICATION_MINUTES", DEFAULT_STALE_VERIFICATION_MINUTES)?;
        let reconcile_secs = parse_or_default(&lookup, "SF_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS)?;
        let use_x_forwarded_for = parse_boolean_flag(lookup("SF_USE_X_FORWARDED_FOR"), false);
        let use_forwarded = parse_boolean_flag(lookup("SF_USE_FORWARDED"), false);
        Ok(Self {
            host,
            port,
            database_url,
            gateway,
            webhook_secret,
            high_value_threshold: MinorUnits::from(threshold),
            min_payment_amount: MinorUnits::from(min_amount),
            auth,
            notifier,
            stale_verification_window: Duration::minutes(stale_minutes),
            reconcile_interval: StdDuration::from_secs(reconcile_secs.max(1)),
            use_x_forwarded_for,
            use_forwarded,
        })
    }

    pub fn settlement_options(&self) -> SettlementOptions {
        SettlementOptions::new(
            self.gateway.key_secret.clone(),
            self.webhook_secret.clone(),
            self.high_value_threshold,
        )
        .with_min_amount(self.min_payment_amount)
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ServerError>
where F: Fn(&str) -> Option<String> {
    lookup(name).ok_or_else(|| {
        error!("🪛️ {name} is not set. The server cannot start without it.");
        ServerError::ConfigurationError(format!("{name} is required"))
    })
}

fn parse_required<F, T>(lookup: &F, name: &str) -> Result<T, ServerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let value = required(lookup, name)?;
    parse_value(name, &value)
}

fn parse_or_default<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ServerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) => parse_value(name, &value),
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            Ok(default)
        },
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T, ServerError>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse::<T>().map_err(|e| {
        error!("🪛️ {value} is not a valid value for {name}. {e}");
        ServerError::ConfigurationError(format!("Invalid value for {name}. {e}"))
    })
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that request handlers need. Generally we try to keep this as small as
/// possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { use_x_forwarded_for: config.use_x_forwarded_for, use_forwarded: config.use_forwarded }
    }
}
