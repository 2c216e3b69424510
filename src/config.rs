//! Environment-driven configuration for the relay server and the CLI client.

use crate::error::{ImageGenError, Result};
use crate::image::providers::DEFAULT_TIMEOUT;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Monthly spend cap used when `MONTHLY_BUDGET_USD` is unset.
pub const DEFAULT_MONTHLY_BUDGET: Decimal = dec!(10.00);

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Only origin allowed by CORS.
    pub frontend_url: String,
    /// Spend cap per calendar month, in USD.
    pub monthly_budget: Decimal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            frontend_url: "http://localhost:5173".into(),
            monthly_budget: DEFAULT_MONTHLY_BUDGET,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                 |
    /// |----------------------|-------------------------|
    /// | `HOST`               | `127.0.0.1`             |
    /// | `PORT`               | `5000`                  |
    /// | `FRONTEND_URL`       | `http://localhost:5173` |
    /// | `MONTHLY_BUDGET_USD` | `10.00`                 |
    ///
    /// Provider credentials are read by
    /// [`DalleProviderBuilder::from_env`](crate::image::providers::DalleProviderBuilder::from_env).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let monthly_budget: Decimal =
            parse_var("MONTHLY_BUDGET_USD")?.unwrap_or(defaults.monthly_budget);
        if monthly_budget.is_sign_negative() {
            return Err(ImageGenError::Config(
                "MONTHLY_BUDGET_USD must not be negative".into(),
            ));
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            frontend_url: std::env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            monthly_budget,
        })
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// CLI client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL, `None` to let the relay client pick its default.
    pub api_url: Option<String>,
    /// Where the session state file lives.
    pub state_path: PathBuf,
    pub timeout: Duration,
}

impl ClientConfig {
    /// Reads `IMAGEGEN_API_URL` and `IMAGEGEN_STATE_PATH`.
    ///
    /// The state file defaults to `.imagegen/state.json` under the home
    /// directory, or the working directory when `HOME` is unset.
    pub fn from_env() -> Self {
        let state_path = std::env::var_os("IMAGEGEN_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_path);

        Self {
            api_url: std::env::var("IMAGEGEN_API_URL").ok(),
            state_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn default_state_path() -> PathBuf {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default();
    base.join(".imagegen").join("state.json")
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ImageGenError::Config(format!("{name} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}
