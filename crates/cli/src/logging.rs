//! Logging setup
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: condq crates at `info`)
//! - `CONDQ_LOG_FORMAT`: `json` for structured output, anything else for pretty
//!
//! Logs go to stderr so the run report on stdout stays machine-readable.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "condq_core=info,condq_infra_system=info,condq_cli=info";
const LOG_FORMAT_VAR: &str = "CONDQ_LOG_FORMAT";

pub fn init_logging() -> Result<()> {
    let log_format = std::env::var(LOG_FORMAT_VAR).unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
