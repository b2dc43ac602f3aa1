use std::{env, time::Duration};

use log::*;
use marketplace_payment_engine::retry::{DEFAULT_MAX_TRANSFER_ATTEMPTS, DEFAULT_TRANSFER_BASE_DELAY};
use mpg_common::{parse_boolean_flag, CommissionRate, Secret};

const DEFAULT_MPG_HOST: &str = "127.0.0.1";
const DEFAULT_MPG_PORT: u16 = 8480;

/// The header the session/auth collaborator injects the caller identity into. The server trusts this header
/// blindly; the reverse proxy must strip it from external traffic.
pub const IDENTITY_HEADER: &str = "x-mpg-identity";

/// The header carrying the webhook body's HMAC-SHA256 signature as lowercase hex.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-mpg-signature";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The platform commission applied to seller subtotals.
    pub commission: CommissionRate,
    /// Payout retry tuning for the transfer executor.
    pub max_transfer_attempts: u32,
    pub transfer_retry_delay: Duration,
    /// Shared secret for capture-confirmation webhook signatures.
    pub webhook_secret: Secret<String>,
    /// If false, webhook signatures are not checked. Only for local development.
    pub webhook_signature_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MPG_HOST.to_string(),
            port: DEFAULT_MPG_PORT,
            database_url: String::default(),
            commission: CommissionRate::default(),
            max_transfer_attempts: DEFAULT_MAX_TRANSFER_ATTEMPTS,
            transfer_retry_delay: DEFAULT_TRANSFER_BASE_DELAY,
            webhook_secret: Secret::new(String::default()),
            webhook_signature_checks: true,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MPG_HOST").ok().unwrap_or_else(|| DEFAULT_MPG_HOST.into());
        let port = env::var("MPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for MPG_PORT. {e} Using the default, {DEFAULT_MPG_PORT}, instead."
                    );
                    DEFAULT_MPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_MPG_PORT);
        let database_url = env::var("MPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ MPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let commission = env::var("MPG_COMMISSION_BPS")
            .ok()
            .map(|s| {
                s.parse::<CommissionRate>().unwrap_or_else(|e| {
                    error!("🪛️ MPG_COMMISSION_BPS is invalid ({e}). Using the default commission rate.");
                    CommissionRate::default()
                })
            })
            .unwrap_or_default();
        let max_transfer_attempts = env::var("MPG_MAX_TRANSFER_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TRANSFER_ATTEMPTS);
        let transfer_retry_delay = env::var("MPG_TRANSFER_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TRANSFER_BASE_DELAY);
        let webhook_secret = Secret::new(env::var("MPG_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            warn!("🪛️ MPG_WEBHOOK_SECRET is not set. Capture confirmations will not verify.");
            String::default()
        }));
        let webhook_signature_checks = parse_boolean_flag(env::var("MPG_WEBHOOK_SIGNATURE_CHECKS").ok(), true);
        if !webhook_signature_checks {
            warn!("🪛️ Webhook signature checks are DISABLED. Do not run like this in production.");
        }
        Self {
            host,
            port,
            database_url,
            commission,
            max_transfer_attempts,
            transfer_retry_delay,
            webhook_secret,
            webhook_signature_checks,
        }
    }
}
