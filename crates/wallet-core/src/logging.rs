//! Subscriber setup for applications and tests embedding the wallet core.
//!
//! The crate itself only emits `tracing` spans and events; nothing is
//! printed until one of these installs a subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives, `RUST_LOG` syntax.
pub const FILTER_ENV: &str = "WALLET_LOG";
/// `text` or `json`.
pub const FORMAT_ENV: &str = "WALLET_LOG_FORMAT";

const DEFAULT_DIRECTIVES: &str = "wallet_core=info,warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, with the enclosing span's fields.
    Json,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }

    /// Format named by `WALLET_LOG_FORMAT`, text when unset or unknown.
    pub fn from_env() -> Self {
        std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|raw| Self::parse(&raw))
            .unwrap_or_default()
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs a global stderr subscriber. Returns `false` if one was already
/// installed.
pub fn init_logging(format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter());
    let installed = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.is_ok()
}

/// Like [`init_logging`] with text output, but written through the test
/// harness so output is captured per test.
pub fn init_test_logging() -> bool {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
