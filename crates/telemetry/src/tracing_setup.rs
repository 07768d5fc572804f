//! Structured logging setup.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default filter when neither `RUST_LOG` nor a configured filter parses.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directive, e.g. "info" or "worker=debug,api=info"
    pub filter: String,
    /// Emit one JSON object per line instead of human-readable text
    pub json: bool,
    /// Log span open/close events
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
            span_events: false,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_span_events(mut self, span_events: bool) -> Self {
        self.span_events = span_events;
        self
    }

    /// Reads `RUST_LOG`, `LOG_JSON` and `LOG_SPANS`.
    pub fn from_env() -> Self {
        let flag = |name: &str| {
            std::env::var(name)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        Self {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            json: flag("LOG_JSON"),
            span_events: flag("LOG_SPANS"),
        }
    }
}

/// Installs the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests install
/// their own), in which case the call is a no-op.
pub fn init_tracing(config: TracingConfig) -> bool {
    let env_filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = if config.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_target(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    }
    installed
}

/// Initialize tracing from environment variables.
pub fn init_tracing_from_env() -> bool {
    init_tracing(TracingConfig::from_env())
}
